//! Core data types for the harvester.
//!
//! These types are what the pipeline stages exchange and what the checkpoint
//! store persists, so all of them derive `Serialize`/`Deserialize`.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// A top-level key the enumerator discovers (a subject or a department).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionKey {
    /// Stable key (subject code or department name).
    pub code: String,

    /// Human readable description.
    pub description: String,

    /// Catalog page for sources that list items per URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CollectionKey {
    /// Create a key without a URL.
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            url: None,
        }
    }

    /// Attach a catalog URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Minimal description of one course as listed by a source.
///
/// Carries enough fields to stand in as the record if the detail fetch
/// fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Stable identifier used in the completion set.
    pub id: String,

    /// Code of the collection this item was listed under.
    pub collection: String,

    /// Course title.
    pub title: String,

    /// Canonical "DEPT NNN" course number.
    pub number: String,

    /// Source course id shared by all offerings of one course.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,

    /// Offering number, dense from 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offering_number: Option<u32>,

    /// Curriculum codes known at listing time.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub codes: BTreeSet<String>,

    /// Page holding the full course detail, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
}

impl ItemDescriptor {
    /// Identifier for an API offering: `"{course_id}-{offering_number}"`.
    #[must_use]
    pub fn offering_id(course_id: &str, offering_number: u32) -> String {
        format!("{course_id}-{offering_number}")
    }

    /// Identifier for a catalog row: `"{department}::{number}"`.
    #[must_use]
    pub fn catalog_id(department: &str, number: &str) -> String {
        format!("{department}::{number}")
    }

    /// The record kept when no detail is available.
    #[must_use]
    pub fn fallback_record(&self) -> CourseRecord {
        CourseRecord {
            item_id: self.id.clone(),
            title: self.title.clone(),
            number: self.number.clone(),
            description: None,
            prerequisites: None,
            typically_offered: None,
            codes: self.codes.clone(),
            cross_listed_as: BTreeSet::new(),
            course_id: self.course_id.clone(),
            offering_number: self.offering_number,
            url: self.detail_url.clone(),
        }
    }
}

/// Normalized output unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Identifier of the descriptor this record was fetched for.
    pub item_id: String,

    pub title: String,

    /// Canonical "DEPT NNN" course number.
    pub number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typically_offered: Option<String>,

    /// Curriculum codes.
    #[serde(default)]
    pub codes: BTreeSet<String>,

    /// Numbers of the records this course is cross-listed as. Symmetric.
    #[serde(default)]
    pub cross_listed_as: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offering_number: Option<u32>,

    /// Course page the record was scraped from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CourseRecord {
    /// A record is complete once it carries a description.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }
}

/// Item descriptors per collection key, in enumeration order.
pub type Listings = IndexMap<String, Vec<ItemDescriptor>>;

/// Records per collection key.
///
/// Records are only ever appended or replaced in place, never removed or
/// reordered: the identity index addresses them by position.
pub type RecordCollection = IndexMap<String, Vec<CourseRecord>>;

/// Insert `record` into its collection, replacing a record with the same
/// `item_id`. Returns the record's position.
pub fn upsert_record(records: &mut RecordCollection, collection: &str, record: CourseRecord) -> usize {
    let sequence = records.entry(collection.to_string()).or_default();
    if let Some(position) = sequence.iter().position(|r| r.item_id == record.item_id) {
        sequence[position] = record;
        position
    } else {
        sequence.push(record);
        sequence.len() - 1
    }
}

/// Identifiers of items fetched at full detail. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionSet(IndexSet<String>);

impl CompletionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Mark an item complete. Returns `false` if it already was.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
