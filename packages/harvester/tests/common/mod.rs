//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use course_harvester::error::{HarvesterError, Result};
use course_harvester::sources::{CourseSource, Detail, Listing};
use course_harvester::types::{CollectionKey, ItemDescriptor};

/// What a scripted source answers for one item's detail.
#[derive(Debug, Clone)]
pub enum DetailScript {
    Found(&'static str),
    Unavailable,
    Fail,
}

/// In-memory source that answers from a script and records every call.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    pub keys: Vec<CollectionKey>,
    pub listings: HashMap<String, Listing>,
    pub details: HashMap<String, DetailScript>,
    pub enumerate_calls: RefCell<usize>,
    pub list_calls: RefCell<Vec<String>>,
    pub detail_calls: RefCell<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection with items, each found with a description.
    pub fn collection(mut self, code: &str, items: Vec<ItemDescriptor>) -> Self {
        for item in &items {
            self.details
                .entry(item.id.clone())
                .or_insert(DetailScript::Found("Course description."));
        }
        self.keys.push(CollectionKey::new(code, code));
        self.listings.insert(code.to_string(), Listing::Items(items));
        self
    }

    /// Add a collection whose listing is unavailable.
    pub fn unavailable_collection(mut self, code: &str) -> Self {
        self.keys.push(CollectionKey::new(code, code));
        self.listings.insert(
            code.to_string(),
            Listing::Unavailable {
                reason: "response status code 404".to_string(),
            },
        );
        self
    }

    /// Add a collection whose listing fails with an error.
    pub fn failing_collection(mut self, code: &str) -> Self {
        self.keys.push(CollectionKey::new(code, code));
        self
    }

    pub fn detail(mut self, id: &str, script: DetailScript) -> Self {
        self.details.insert(id.to_string(), script);
        self
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.borrow().clone()
    }

    pub fn list_calls(&self) -> Vec<String> {
        self.list_calls.borrow().clone()
    }
}

impl CourseSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn enumerate(&self) -> Result<Vec<CollectionKey>> {
        *self.enumerate_calls.borrow_mut() += 1;
        Ok(self.keys.clone())
    }

    fn list_items(&self, key: &CollectionKey) -> Result<Listing> {
        self.list_calls.borrow_mut().push(key.code.clone());
        self.listings
            .get(&key.code)
            .cloned()
            .ok_or_else(|| HarvesterError::malformed(&key.code, "unknown collection"))
    }

    fn fetch_detail(&self, item: &ItemDescriptor) -> Result<Detail> {
        self.detail_calls.borrow_mut().push(item.id.clone());
        match self.details.get(&item.id) {
            Some(DetailScript::Found(description)) => {
                let mut record = item.fallback_record();
                record.description = Some((*description).to_string());
                Ok(Detail::Found(record))
            }
            Some(DetailScript::Unavailable) | None => Ok(Detail::Unavailable {
                reason: "response status code 404".to_string(),
            }),
            Some(DetailScript::Fail) => Err(HarvesterError::malformed(
                format!("/detail/{}", item.id),
                "unexpected response shape",
            )),
        }
    }
}

/// Item of a course-offering source.
pub fn offering(collection: &str, course_id: &str, offering: u32, number: &str) -> ItemDescriptor {
    ItemDescriptor {
        id: ItemDescriptor::offering_id(course_id, offering),
        collection: collection.to_string(),
        title: format!("Title of {number}"),
        number: number.to_string(),
        course_id: Some(course_id.to_string()),
        offering_number: Some(offering),
        codes: BTreeSet::new(),
        detail_url: None,
    }
}

/// Item without an offering identity.
pub fn plain(collection: &str, number: &str) -> ItemDescriptor {
    ItemDescriptor {
        id: ItemDescriptor::catalog_id(collection, number),
        collection: collection.to_string(),
        title: format!("Title of {number}"),
        number: number.to_string(),
        course_id: None,
        offering_number: None,
        codes: BTreeSet::new(),
        detail_url: None,
    }
}
