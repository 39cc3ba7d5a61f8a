//! Export of harvested records for the downstream course store.
//!
//! Records from every source of one university are merged into documents
//! keyed by `{university_id}-{normalized number}`. When two sources produce
//! the same course, a [`SourcePriority`] decides which one is kept.

use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::checkpoint::write_atomic;
use crate::error::Result;
use crate::text::course_document_id;
use crate::types::{CourseRecord, RecordCollection};

/// How to choose between two sources that produced the same course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourcePriority {
    /// A later source only replaces a document that has no description.
    #[default]
    PreferComplete,

    /// A later source always replaces the earlier document.
    LastWriteWins,
}

impl SourcePriority {
    fn replaces(self, existing: &CourseRecord) -> bool {
        match self {
            Self::PreferComplete => !existing.is_complete(),
            Self::LastWriteWins => true,
        }
    }
}

/// One course as handed to the downstream store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub university_id: String,
    pub department: String,
    pub source: String,
    #[serde(flatten)]
    pub record: CourseRecord,
}

/// The record collection of one source, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct SourceRecords<'a> {
    pub source: &'a str,
    pub records: &'a RecordCollection,
}

/// File written by [`write_export`].
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportFile {
    pub exported_at: DateTime<Utc>,
    pub university_id: String,
    pub courses: Vec<ExportDocument>,
}

/// Merge sources in order, earliest first.
#[must_use]
pub fn merge_sources(
    university_id: &str,
    sources: &[SourceRecords<'_>],
    priority: SourcePriority,
) -> Vec<ExportDocument> {
    let mut documents: IndexMap<String, ExportDocument> = IndexMap::new();

    for source in sources {
        for (department, records) in source.records {
            for record in records {
                let id = course_document_id(university_id, &record.number);
                if let Some(existing) = documents.get(&id) {
                    if !priority.replaces(&existing.record) {
                        tracing::debug!(id = %id, source = source.source, "Keeping existing document");
                        continue;
                    }
                }
                documents.insert(
                    id.clone(),
                    ExportDocument {
                        id,
                        university_id: university_id.to_string(),
                        department: department.clone(),
                        source: source.source.to_string(),
                        record: record.clone(),
                    },
                );
            }
        }
    }

    documents.into_values().collect()
}

/// Write merged documents as pretty JSON, atomically.
pub fn write_export(path: &Path, university_id: &str, courses: Vec<ExportDocument>) -> Result<()> {
    let file = ExportFile {
        exported_at: Utc::now(),
        university_id: university_id.to_string(),
        courses,
    };
    let json = serde_json::to_vec_pretty(&file)?;
    write_atomic(path, &json)?;
    tracing::info!(path = %path.display(), courses = file.courses.len(), "Export written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{upsert_record, ItemDescriptor};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn record(id: &str, number: &str, description: Option<&str>) -> CourseRecord {
        let mut record = ItemDescriptor {
            id: id.to_string(),
            collection: String::new(),
            title: number.to_string(),
            number: number.to_string(),
            course_id: None,
            offering_number: None,
            codes: BTreeSet::new(),
            detail_url: None,
        }
        .fallback_record();
        record.description = description.map(String::from);
        record
    }

    fn collection(department: &str, records: Vec<CourseRecord>) -> RecordCollection {
        let mut collection = RecordCollection::new();
        for r in records {
            upsert_record(&mut collection, department, r);
        }
        collection
    }

    #[test]
    fn test_prefer_complete_keeps_complete_record() {
        let api = collection("COMPSCI", vec![record("1-1", "COMPSCI 101", Some("From API"))]);
        let catalog = collection("Computer Science", vec![record("cs", "COMPSCI 101", Some("From page"))]);

        let docs = merge_sources(
            "duke",
            &[
                SourceRecords { source: "curriculum_api", records: &api },
                SourceRecords { source: "department_catalog", records: &catalog },
            ],
            SourcePriority::PreferComplete,
        );

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "duke-compsci_101");
        assert_eq!(docs[0].source, "curriculum_api");
        assert_eq!(docs[0].department, "COMPSCI");
    }

    #[test]
    fn test_prefer_complete_replaces_incomplete_record() {
        let api = collection("COMPSCI", vec![record("1-1", "COMPSCI 101", None)]);
        let catalog = collection("Computer Science", vec![record("cs", "COMPSCI 101", Some("From page"))]);

        let docs = merge_sources(
            "duke",
            &[
                SourceRecords { source: "curriculum_api", records: &api },
                SourceRecords { source: "department_catalog", records: &catalog },
            ],
            SourcePriority::PreferComplete,
        );

        assert_eq!(docs[0].source, "department_catalog");
        assert_eq!(docs[0].record.description.as_deref(), Some("From page"));
    }

    #[test]
    fn test_last_write_wins() {
        let api = collection("COMPSCI", vec![record("1-1", "COMPSCI 101", Some("From API"))]);
        let catalog = collection("Computer Science", vec![record("cs", "COMPSCI 101", None)]);

        let docs = merge_sources(
            "duke",
            &[
                SourceRecords { source: "curriculum_api", records: &api },
                SourceRecords { source: "department_catalog", records: &catalog },
            ],
            SourcePriority::LastWriteWins,
        );

        assert_eq!(docs[0].source, "department_catalog");
    }

    #[test]
    fn test_write_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.json");
        let api = collection("COMPSCI", vec![record("1-1", "COMPSCI 101", Some("Text"))]);
        let docs = merge_sources(
            "duke",
            &[SourceRecords { source: "curriculum_api", records: &api }],
            SourcePriority::default(),
        );

        write_export(&path, "duke", docs).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["university_id"], "duke");
        assert_eq!(value["courses"][0]["_id"], "duke-compsci_101");
        assert_eq!(value["courses"][0]["number"], "COMPSCI 101");
        assert_eq!(value["courses"][0]["department"], "COMPSCI");
    }
}
