//! Course Harvester - Resumable, checkpointed course catalog harvesting.
//!
//! This crate downloads course catalogs from slow, unreliable sources in
//! small batches. Every stage persists its progress to a checkpoint store,
//! so an interrupted run simply continues where it stopped. After fetching,
//! cross-listed offerings of the same course are linked to each other.
//!
//! # Example
//!
//! ```
//! use course_harvester::text;
//!
//! assert_eq!(text::normalize_course_number("COMPSCI", "101L"), "COMPSCI 101L");
//! assert_eq!(
//!     text::course_document_id("duke_university", "COMPSCI 101L"),
//!     "duke_university-compsci_101l"
//! );
//! ```
//!
//! # Architecture
//!
//! - [`checkpoint`]: Durable blob store (file and in-memory)
//! - [`sources`]: Enumerate, list and fetch against a course source
//! - [`harvester`]: The resumable pipeline and its batch fetcher
//! - [`resolver`]: Identity index and cross-listing resolution
//! - [`export`]: Merge sources into documents for the course store
//! - [`config`]: Configuration file, defaults and validation
//! - [`types`]: Core data types (collection keys, items, records)
//! - [`text`]: Number and whitespace normalization
//! - [`http`]: HTTP client with retries
//! - [`error`]: Error types and Result alias
//! - [`cli`]: Command-line interface

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod harvester;
pub mod http;
pub mod resolver;
pub mod sources;
pub mod text;
pub mod types;

// Re-export commonly used items
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::HarvestConfig;
pub use error::{HarvesterError, Result};
pub use harvester::{BatchReport, HarvestEvent, HarvestState, Harvester, RunSummary};
pub use resolver::{resolve_cross_listings, IdentityIndex};
pub use sources::{CourseSource, Detail, Listing};
pub use types::{CollectionKey, CompletionSet, CourseRecord, ItemDescriptor};
