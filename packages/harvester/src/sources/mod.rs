//! External course sources.
//!
//! A source knows how to enumerate its collection keys, list the items under
//! a key, and fetch one item's detail. Everything source specific (URL
//! shapes, envelopes, HTML structure) stays behind [`CourseSource`]; the
//! pipeline in [`crate::harvester`] only sees the normalized types.

pub mod curriculum_api;
pub mod department_catalog;

pub use curriculum_api::CurriculumApiSource;
pub use department_catalog::DepartmentCatalogSource;

use crate::error::Result;
use crate::types::{CollectionKey, CourseRecord, ItemDescriptor};

/// Result of listing one collection key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Items(Vec<ItemDescriptor>),

    /// The collection could not be listed (non-success response, no table).
    /// Recorded as an empty listing so other keys still make progress.
    Unavailable { reason: String },
}

/// Result of fetching one item's detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detail {
    Found(CourseRecord),

    /// No detail for this item right now. The listing fields are kept.
    Unavailable { reason: String },
}

/// A course source the pipeline can harvest.
///
/// Returning `Err` from any method signals an unexpected failure (a
/// malformed response, a dead connection); the pipeline stops issuing
/// requests for the run when that happens.
pub trait CourseSource {
    /// Name used for logging and the checkpoint directory.
    fn name(&self) -> &str;

    /// Discover the collection keys.
    fn enumerate(&self) -> Result<Vec<CollectionKey>>;

    /// List the items of one collection key.
    fn list_items(&self, key: &CollectionKey) -> Result<Listing>;

    /// Fetch the full record for one item.
    fn fetch_detail(&self, item: &ItemDescriptor) -> Result<Detail>;
}
