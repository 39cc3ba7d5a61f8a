//! Cross-listing resolution.
//!
//! A source that numbers the offerings of one course densely from 1 lets us
//! link every offering to the ones below it without a connected-components
//! pass: for offering `n` we only look up offerings `1..n` of the same
//! course id.
//!
//! Lookups go through an [`IdentityIndex`] that is built once and then
//! persisted. Records fetched after it was built stay invisible to the
//! resolver until the index is rebuilt explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::RecordCollection;

/// Where a record lives in the record collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Course number of the record when the index was built.
    pub number: String,

    /// Collection the record belongs to.
    pub collection: String,

    /// Position within that collection's sequence.
    pub position: usize,
}

/// Map from `"{course_id}-{offering_number}"` to the record's location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityIndex(BTreeMap<String, IndexEntry>);

impl IdentityIndex {
    /// Index every record that has an offering identity.
    #[must_use]
    pub fn build(records: &RecordCollection) -> Self {
        let mut entries = BTreeMap::new();
        for (collection, sequence) in records {
            for (position, record) in sequence.iter().enumerate() {
                let (Some(course_id), Some(offering)) = (&record.course_id, record.offering_number)
                else {
                    continue;
                };
                entries.insert(
                    identity_key(course_id, offering),
                    IndexEntry {
                        number: record.number.clone(),
                        collection: collection.clone(),
                        position,
                    },
                );
            }
        }
        Self(entries)
    }

    #[must_use]
    pub fn get(&self, course_id: &str, offering_number: u32) -> Option<&IndexEntry> {
        self.0.get(&identity_key(course_id, offering_number))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn identity_key(course_id: &str, offering_number: u32) -> String {
    format!("{course_id}-{offering_number}")
}

/// A record's address plus its number.
type Endpoint = (String, usize, String);

/// Link cross-listed offerings, returning how many links were new.
///
/// Set-union semantics: running it again with the same inputs adds nothing.
/// An offering whose lower offerings are not indexed yet is skipped.
pub fn resolve_cross_listings(records: &mut RecordCollection, index: &IdentityIndex) -> usize {
    let mut links: Vec<(Endpoint, Endpoint)> = Vec::new();

    for (collection, sequence) in records.iter() {
        for (position, record) in sequence.iter().enumerate() {
            let (Some(course_id), Some(offering)) = (&record.course_id, record.offering_number)
            else {
                continue;
            };

            for lower in 1..offering {
                let Some(entry) = index.get(course_id, lower) else {
                    continue;
                };
                let Some(target) = records
                    .get(&entry.collection)
                    .and_then(|s| s.get(entry.position))
                else {
                    tracing::warn!(
                        collection = %entry.collection,
                        position = entry.position,
                        "Identity index points past the record collection"
                    );
                    continue;
                };
                if target.course_id.as_deref() != Some(course_id.as_str())
                    || target.offering_number != Some(lower)
                {
                    tracing::warn!(
                        number = %entry.number,
                        "Identity index entry no longer matches its record"
                    );
                    continue;
                }
                if target.number == record.number {
                    continue;
                }

                links.push((
                    (collection.clone(), position, record.number.clone()),
                    (entry.collection.clone(), entry.position, target.number.clone()),
                ));
            }
        }
    }

    let mut added = 0;
    for ((a_collection, a_position, a_number), (b_collection, b_position, b_number)) in links {
        let mut new_link = false;
        if let Some(a) = records
            .get_mut(&a_collection)
            .and_then(|s| s.get_mut(a_position))
        {
            new_link |= a.cross_listed_as.insert(b_number);
        }
        if let Some(b) = records
            .get_mut(&b_collection)
            .and_then(|s| s.get_mut(b_position))
        {
            new_link |= b.cross_listed_as.insert(a_number);
        }
        if new_link {
            added += 1;
        }
    }

    tracing::info!(links = added, "Linked cross-listed courses");
    added
}
