//! Resumable harvest pipeline.
//!
//! A [`Harvester`] drives one [`CourseSource`] through four stages, each of
//! which reads the previous stage's checkpoint and skips work that is
//! already persisted:
//!
//! 1. enumerate collection keys (once per store),
//! 2. list the items of every key (once per key),
//! 3. fetch item details in capped batches, checkpointing after every item,
//! 4. resolve cross-listings between the fetched records.
//!
//! Running the pipeline again after a crash or an aborted batch picks up
//! where the previous run left off.

use std::thread;
use std::time::{Duration, Instant};

use crate::checkpoint::{
    CheckpointStore, COLLECTION_KEYS, COURSES_WITH_DATA, COURSE_DATA, COURSE_LIST,
    IDENTITY_INDEX,
};
use crate::config::validate_batch_size;
use crate::error::Result;
use crate::resolver::{resolve_cross_listings, IdentityIndex};
use crate::sources::{CourseSource, Detail, Listing};
use crate::types::{
    upsert_record, CollectionKey, CompletionSet, ItemDescriptor, Listings, RecordCollection,
};

/// Pipeline state as loaded from, and written back to, the checkpoint store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestState {
    pub collection_keys: Option<Vec<CollectionKey>>,
    pub listings: Listings,
    pub records: RecordCollection,
    pub completed: CompletionSet,
    pub index: Option<IdentityIndex>,
}

impl HarvestState {
    /// Load every blob, treating absent ones as empty.
    pub fn load<C: CheckpointStore>(store: &C) -> Result<Self> {
        Ok(Self {
            collection_keys: store.load(COLLECTION_KEYS)?,
            listings: store.load(COURSE_LIST)?.unwrap_or_default(),
            records: store.load(COURSE_DATA)?.unwrap_or_default(),
            completed: store.load(COURSES_WITH_DATA)?.unwrap_or_default(),
            index: store.load(IDENTITY_INDEX)?,
        })
    }

    /// Number of listed items across all collections.
    #[must_use]
    pub fn listed_items(&self) -> usize {
        self.listings.values().map(Vec::len).sum()
    }

    /// Number of records across all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Listed items not yet in the completion set.
    #[must_use]
    pub fn pending_items(&self) -> usize {
        self.listings
            .values()
            .flatten()
            .filter(|item| !self.completed.contains(&item.id))
            .count()
    }
}

/// Progress notifications emitted while the pipeline runs.
#[derive(Debug)]
pub enum HarvestEvent<'a> {
    /// A collection could not be listed in this run.
    CollectionSkipped { key: &'a CollectionKey, reason: &'a str },

    /// A detail fetch is about to start. `ordinal` counts from 1 per batch.
    ItemStarted { ordinal: usize, item: &'a ItemDescriptor },

    /// The item was stored with its listing fields only.
    ItemFallback { item: &'a ItemDescriptor, reason: &'a str },

    /// The batch stopped on an unexpected error.
    BatchAborted { item: &'a ItemDescriptor, error: &'a str },
}

/// Outcome of one [`Harvester::run_batch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items completed in this call, fallbacks included.
    pub fetched: usize,

    /// Items completed with listing fields only.
    pub fallbacks: usize,

    /// Error that stopped the batch early.
    pub aborted: Option<String>,
}

/// Outcome of one [`Harvester::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub newly_listed_keys: usize,
    pub skipped_keys: usize,
    /// Keys whose listing failed; they are retried on the next run.
    pub failed_keys: Vec<String>,
    pub batch: BatchReport,
    pub links_added: usize,
    pub completed_total: usize,
    pub records_total: usize,
    pub pending: usize,
    pub elapsed: Duration,
}

/// Result of listing the unlisted collection keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListReport {
    pub listed: usize,
    pub skipped: usize,
    /// Keys left unlisted after an error.
    pub failed: Vec<String>,
}

/// Resumable pipeline over one source and one checkpoint store.
///
/// Both collaborators are owned for the lifetime of the run; nothing is
/// shared process-wide.
#[derive(Debug)]
pub struct Harvester<S, C> {
    source: S,
    store: C,
    state: HarvestState,
    request_delay: Option<Duration>,
    fresh_index: bool,
}

impl<S: CourseSource, C: CheckpointStore> Harvester<S, C> {
    /// Load the pipeline state from `store`.
    pub fn new(source: S, store: C) -> Result<Self> {
        let state = HarvestState::load(&store)?;
        tracing::debug!(
            source = source.name(),
            completed = state.completed.len(),
            records = state.record_count(),
            "Loaded checkpoint"
        );
        Ok(Self {
            source,
            store,
            state,
            request_delay: None,
            fresh_index: false,
        })
    }

    /// Pause between successive detail fetches.
    #[must_use]
    pub fn with_request_delay(mut self, delay: Option<Duration>) -> Self {
        self.request_delay = delay;
        self
    }

    /// Rebuild the identity index during [`Self::run`] instead of reusing
    /// the persisted one, so records fetched since it was built are linked.
    #[must_use]
    pub fn with_fresh_index(mut self, fresh_index: bool) -> Self {
        self.fresh_index = fresh_index;
        self
    }

    #[must_use]
    pub fn state(&self) -> &HarvestState {
        &self.state
    }

    #[must_use]
    pub fn store(&self) -> &C {
        &self.store
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Give back the collaborators.
    pub fn into_parts(self) -> (S, C) {
        (self.source, self.store)
    }

    /// Discover collection keys unless a previous run already did.
    ///
    /// Returns whether the source was queried.
    pub fn enumerate(&mut self) -> Result<bool> {
        if self.state.collection_keys.is_some() {
            return Ok(false);
        }
        let keys = self.source.enumerate()?;
        tracing::info!(source = self.source.name(), keys = keys.len(), "Enumerated collections");
        self.store.save(COLLECTION_KEYS, &keys)?;
        self.state.collection_keys = Some(keys);
        Ok(true)
    }

    /// List every collection key that has no listing yet.
    ///
    /// A key the source reports as unavailable is stored as an empty listing
    /// so it does not block the others. A key whose listing fails with an
    /// error is left unlisted, so the next run retries it, and the remaining
    /// keys are still listed. Listings are persisted after each key.
    pub fn list_all<F>(&mut self, mut on_event: F) -> Result<ListReport>
    where
        F: FnMut(HarvestEvent<'_>),
    {
        let keys = self.state.collection_keys.clone().unwrap_or_default();
        let mut report = ListReport::default();

        for key in &keys {
            if self.state.listings.contains_key(&key.code) {
                continue;
            }

            let items = match self.source.list_items(key) {
                Ok(Listing::Items(items)) => items,
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(collection = %key.code, error = %reason, "Listing failed, will retry next run");
                    on_event(HarvestEvent::CollectionSkipped { key, reason: &reason });
                    report.failed.push(key.code.clone());
                    continue;
                }
                Ok(Listing::Unavailable { reason }) => {
                    tracing::warn!(collection = %key.code, reason = %reason, "Collection unavailable, skipping");
                    on_event(HarvestEvent::CollectionSkipped { key, reason: &reason });
                    report.skipped += 1;
                    Vec::new()
                }
            };

            self.state.listings.insert(key.code.clone(), items);
            self.store.save(COURSE_LIST, &self.state.listings)?;
            report.listed += 1;
        }

        Ok(report)
    }

    /// Fetch up to `batch_size` items that are not complete yet.
    pub fn run_batch(&mut self, batch_size: usize) -> Result<BatchReport> {
        self.run_batch_with_progress(batch_size, |_| {})
    }

    /// [`Self::run_batch`] with progress notifications.
    ///
    /// Items are visited in collection order, then listing order. Each item
    /// is checkpointed as soon as it completes: the record collection first,
    /// then the completion set, so every completed id always has a record.
    ///
    /// An `Err` from the source stops the batch. Items completed before it
    /// stay completed and the error is reported in [`BatchReport::aborted`].
    /// Only checkpoint failures are returned as `Err`.
    pub fn run_batch_with_progress<F>(&mut self, batch_size: usize, mut on_event: F) -> Result<BatchReport>
    where
        F: FnMut(HarvestEvent<'_>),
    {
        validate_batch_size(batch_size)?;
        let mut report = BatchReport::default();

        'items: for item in self.state.listings.values().flatten() {
            if report.fetched >= batch_size {
                break;
            }
            if self.state.completed.contains(&item.id) {
                continue;
            }

            if report.fetched > 0 {
                if let Some(delay) = self.request_delay {
                    thread::sleep(delay);
                }
            }

            on_event(HarvestEvent::ItemStarted {
                ordinal: report.fetched + 1,
                item,
            });
            tracing::info!(item = %item.id, number = %item.number, "Getting course data");

            let record = match self.source.fetch_detail(item) {
                Ok(Detail::Found(record)) => record,
                Ok(Detail::Unavailable { reason }) => {
                    tracing::warn!(item = %item.id, reason = %reason, "Using data from course list");
                    on_event(HarvestEvent::ItemFallback { item, reason: &reason });
                    report.fallbacks += 1;
                    item.fallback_record()
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::error!(item = %item.id, error = %error, "Fetch failed, stopping batch");
                    on_event(HarvestEvent::BatchAborted { item, error: &error });
                    report.aborted = Some(error);
                    break 'items;
                }
            };

            upsert_record(&mut self.state.records, &item.collection, record);
            self.state.completed.insert(item.id.clone());
            self.store.save(COURSE_DATA, &self.state.records)?;
            self.store.save(COURSES_WITH_DATA, &self.state.completed)?;
            report.fetched += 1;
        }

        tracing::info!(
            fetched = report.fetched,
            fallbacks = report.fallbacks,
            aborted = report.aborted.is_some(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Build and persist the identity index if there is none yet.
    ///
    /// An empty index counts as missing: it was built before any record
    /// existed.
    pub fn ensure_index(&mut self) -> Result<()> {
        if self.state.index.as_ref().map_or(true, IdentityIndex::is_empty) {
            self.rebuild_index()?;
        }
        Ok(())
    }

    /// Rebuild the identity index from all current records.
    pub fn rebuild_index(&mut self) -> Result<()> {
        tracing::info!("Linking course identities with course numbers and positions");
        let index = IdentityIndex::build(&self.state.records);
        self.store.save(IDENTITY_INDEX, &index)?;
        self.state.index = Some(index);
        Ok(())
    }

    /// Link cross-listed records and persist them. Returns the new links.
    pub fn resolve(&mut self) -> Result<usize> {
        self.ensure_index()?;
        let Some(index) = self.state.index.as_ref() else {
            return Ok(0);
        };
        let added = resolve_cross_listings(&mut self.state.records, index);
        if added > 0 {
            self.store.save(COURSE_DATA, &self.state.records)?;
        }
        Ok(added)
    }

    /// One full pass: enumerate, list, fetch a batch, resolve.
    ///
    /// An aborted batch does not skip resolution; whatever was fetched is
    /// still linked.
    pub fn run<F>(&mut self, batch_size: usize, mut on_event: F) -> Result<RunSummary>
    where
        F: FnMut(HarvestEvent<'_>),
    {
        validate_batch_size(batch_size)?;
        let started = Instant::now();

        self.enumerate()?;
        let listed = self.list_all(&mut on_event)?;
        let batch = self.run_batch_with_progress(batch_size, &mut on_event)?;
        if self.fresh_index {
            self.rebuild_index()?;
        }
        let links_added = self.resolve()?;

        Ok(RunSummary {
            newly_listed_keys: listed.listed,
            skipped_keys: listed.skipped,
            failed_keys: listed.failed,
            batch,
            links_added,
            completed_total: self.state.completed.len(),
            records_total: self.state.record_count(),
            pending: self.state.pending_items(),
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::error::HarvesterError;
    use crate::types::CourseRecord;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::collections::BTreeSet;

    /// Source with two single-item collections; item "b" always fails.
    struct FailingSecond {
        detail_calls: Cell<usize>,
    }

    fn item(id: &str, collection: &str) -> ItemDescriptor {
        ItemDescriptor {
            id: id.to_string(),
            collection: collection.to_string(),
            title: format!("Course {id}"),
            number: format!("{collection} {id}"),
            course_id: None,
            offering_number: None,
            codes: BTreeSet::new(),
            detail_url: None,
        }
    }

    impl CourseSource for FailingSecond {
        fn name(&self) -> &str {
            "failing"
        }

        fn enumerate(&self) -> Result<Vec<CollectionKey>> {
            Ok(vec![CollectionKey::new("X", "X"), CollectionKey::new("Y", "Y")])
        }

        fn list_items(&self, key: &CollectionKey) -> Result<Listing> {
            let id = if key.code == "X" { "a" } else { "b" };
            Ok(Listing::Items(vec![item(id, &key.code)]))
        }

        fn fetch_detail(&self, item: &ItemDescriptor) -> Result<Detail> {
            self.detail_calls.set(self.detail_calls.get() + 1);
            if item.id == "b" {
                return Err(HarvesterError::malformed("/b", "unexpected shape"));
            }
            let mut record: CourseRecord = item.fallback_record();
            record.description = Some("Detailed".to_string());
            Ok(Detail::Found(record))
        }
    }

    fn harvester() -> Harvester<FailingSecond, MemoryCheckpointStore> {
        let source = FailingSecond {
            detail_calls: Cell::new(0),
        };
        Harvester::new(source, MemoryCheckpointStore::new()).unwrap()
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut harvester = harvester();
        assert!(harvester.run_batch(0).is_err());
    }

    #[test]
    fn test_abort_keeps_completed_items() {
        let mut harvester = harvester();
        harvester.enumerate().unwrap();
        harvester.list_all(|_| {}).unwrap();

        let report = harvester.run_batch(10).unwrap();
        assert_eq!(report.fetched, 1);
        assert!(report.aborted.unwrap().contains("unexpected shape"));

        let state = harvester.state();
        assert_eq!(state.completed.iter().collect::<Vec<_>>(), vec!["a"]);
        assert!(state.records["X"][0].is_complete());
        assert!(!state.records.contains_key("Y"));

        // Persisted state matches memory
        let reloaded = HarvestState::load(harvester.store()).unwrap();
        assert_eq!(&reloaded, harvester.state());
    }

    #[test]
    fn test_enumerate_runs_once() {
        let mut harvester = harvester();
        assert!(harvester.enumerate().unwrap());
        assert!(!harvester.enumerate().unwrap());
    }

    #[test]
    fn test_events_emitted_in_order() {
        let mut harvester = harvester();
        let mut seen = Vec::new();
        harvester
            .run(5, |event| {
                seen.push(match event {
                    HarvestEvent::CollectionSkipped { .. } => "skipped".to_string(),
                    HarvestEvent::ItemStarted { ordinal, item } => format!("start {ordinal} {}", item.id),
                    HarvestEvent::ItemFallback { item, .. } => format!("fallback {}", item.id),
                    HarvestEvent::BatchAborted { item, .. } => format!("abort {}", item.id),
                });
            })
            .unwrap();

        assert_eq!(seen, vec!["start 1 a", "start 2 b", "abort b"]);
        assert_eq!(harvester.source().detail_calls.get(), 2);
    }

    #[test]
    fn test_pending_items() {
        let mut harvester = harvester();
        harvester.enumerate().unwrap();
        harvester.list_all(|_| {}).unwrap();
        assert_eq!(harvester.state().pending_items(), 2);
        harvester.run_batch(1).unwrap();
        assert_eq!(harvester.state().pending_items(), 1);
    }
}
