//! Curriculum API source.
//!
//! The API wraps every payload in a nested envelope and collapses
//! single-element lists into a bare object. [`one_or_many`] normalizes that
//! at this boundary so callers always see a sequence.

use std::collections::BTreeSet;

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde_json::Value;

use super::{CourseSource, Detail, Listing};
use crate::config::HarvestConfig;
use crate::error::{HarvesterError, Result};
use crate::http::{fetch, Fetched};
use crate::text::{collapse_whitespace, normalize_course_number};
use crate::types::{CollectionKey, CourseRecord, ItemDescriptor};

const SUBJECTS_POINTER: &str = "/scc_lov_resp/lovs/lov/values/value";
const SUBJECT_POINTER: &str = "/ssr_get_courses_resp/course_search_result/subjects/subject";
const OFFERING_RESULT_POINTER: &str = "/ssr_get_course_offering_resp/course_offering_result";

/// Decoded API response.
enum ApiResponse {
    Json(Value),
    Status(StatusCode),
}

/// Harvests subjects, course summaries and course offerings.
#[derive(Debug, Clone)]
pub struct CurriculumApiSource {
    client: Client,
    base_url: String,
    api_key: String,
    valid_codes: BTreeSet<String>,
}

impl CurriculumApiSource {
    pub const NAME: &'static str = "curriculum_api";

    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        valid_codes: BTreeSet<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            valid_codes,
        }
    }

    /// Build from configuration. Fails if no API key is configured.
    pub fn from_config(client: Client, config: &HarvestConfig) -> Result<Self> {
        Ok(Self::new(
            client,
            &config.curriculum_api_url,
            config.require_api_key()?,
            config.valid_curriculum_codes(),
        ))
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            HarvesterError::Config(format!("invalid API URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                HarvesterError::Config(format!("API URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("access_token", &self.api_key);
        Ok(url)
    }

    fn get_json(&self, url: &Url) -> Result<ApiResponse> {
        match fetch(&self.client, url.as_str())? {
            Fetched::Body(bytes) => Ok(ApiResponse::Json(serde_json::from_slice(&bytes)?)),
            Fetched::Status(status) => Ok(ApiResponse::Status(status)),
        }
    }
}

impl CourseSource for CurriculumApiSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enumerate(&self) -> Result<Vec<CollectionKey>> {
        let url = self.endpoint(&["list_of_values", "fieldname", "SUBJECT"])?;
        tracing::info!("Getting subjects");
        match self.get_json(&url)? {
            ApiResponse::Json(value) => parse_subjects(&value, url.path()),
            ApiResponse::Status(status) => Err(HarvesterError::malformed(
                url.path(),
                format!("subject list returned status {status}"),
            )),
        }
    }

    fn list_items(&self, key: &CollectionKey) -> Result<Listing> {
        let subject = format!("{} - {}", key.code, key.description);
        let url = self.endpoint(&["courses", "subject", subject.as_str()])?;
        tracing::info!(collection = %key.code, "Getting course list");
        match self.get_json(&url)? {
            ApiResponse::Json(value) => {
                Ok(Listing::Items(parse_course_list(&value, key, url.path())?))
            }
            ApiResponse::Status(status) => Ok(Listing::Unavailable {
                reason: format!("response status code {}", status.as_u16()),
            }),
        }
    }

    fn fetch_detail(&self, item: &ItemDescriptor) -> Result<Detail> {
        let (Some(course_id), Some(offering_number)) = (&item.course_id, item.offering_number)
        else {
            return Ok(Detail::Unavailable {
                reason: "item has no offering identity".to_string(),
            });
        };

        let offering = offering_number.to_string();
        let url = self.endpoint(&[
            "courses",
            "crse_id",
            course_id.as_str(),
            "crse_offer_nbr",
            offering.as_str(),
        ])?;
        match self.get_json(&url)? {
            ApiResponse::Json(value) => {
                match parse_course_offering(&value, item, &self.valid_codes, url.path())? {
                    Some(record) => Ok(Detail::Found(record)),
                    None => Ok(Detail::Unavailable {
                        reason: "no course data available".to_string(),
                    }),
                }
            }
            ApiResponse::Status(status) => Ok(Detail::Unavailable {
                reason: format!("response status code {}", status.as_u16()),
            }),
        }
    }
}

/// Treat a value that may be null, a single object, or a list as a list.
#[must_use]
pub fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Read a string field, accepting numbers too since the API is not
/// consistent about identifier types.
fn str_field(object: &Value, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_str(object: &Value, key: &str, url: &str) -> Result<String> {
    str_field(object, key)
        .ok_or_else(|| HarvesterError::malformed(url, format!("missing field '{key}'")))
}

fn offering_field(object: &Value, url: &str) -> Result<u32> {
    let raw = required_str(object, "crse_offer_nbr", url)?;
    raw.trim().parse().map_err(|_| {
        HarvesterError::malformed(url, format!("invalid crse_offer_nbr '{raw}'"))
    })
}

/// Optional text field; blank strings count as absent.
fn text_field(object: &Value, key: &str) -> Option<String> {
    str_field(object, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract subjects from the list-of-values envelope.
pub fn parse_subjects(value: &Value, url: &str) -> Result<Vec<CollectionKey>> {
    let values = value
        .pointer(SUBJECTS_POINTER)
        .ok_or_else(|| HarvesterError::malformed(url, "missing subject values"))?;

    one_or_many(values)
        .into_iter()
        .map(|subject| {
            Ok(CollectionKey::new(
                required_str(subject, "code", url)?.trim(),
                required_str(subject, "desc", url)?.trim(),
            ))
        })
        .collect()
}

/// Extract course summaries for one subject.
///
/// A subject without courses has a null `course_summaries`; that is an empty
/// list, not an error.
pub fn parse_course_list(
    value: &Value,
    key: &CollectionKey,
    url: &str,
) -> Result<Vec<ItemDescriptor>> {
    let subject = value
        .pointer(SUBJECT_POINTER)
        .ok_or_else(|| HarvesterError::malformed(url, "missing course search result"))?;

    let Some(summaries) = subject
        .get("course_summaries")
        .filter(|s| !s.is_null())
        .and_then(|s| s.get("course_summary"))
    else {
        tracing::info!(collection = %key.code, "No course list available");
        return Ok(Vec::new());
    };

    one_or_many(summaries)
        .into_iter()
        .map(|summary| {
            let course_id = required_str(summary, "crse_id", url)?;
            let offering_number = offering_field(summary, url)?;
            Ok(ItemDescriptor {
                id: ItemDescriptor::offering_id(&course_id, offering_number),
                collection: key.code.clone(),
                title: collapse_whitespace(&required_str(summary, "course_title_long", url)?),
                number: normalize_course_number(
                    &required_str(summary, "subject", url)?,
                    &required_str(summary, "catalog_nbr", url)?,
                ),
                course_id: Some(course_id),
                offering_number: Some(offering_number),
                codes: BTreeSet::new(),
                detail_url: None,
            })
        })
        .collect()
}

/// Extract the full record of one offering.
///
/// Returns `None` when the envelope is intact but holds no offering.
pub fn parse_course_offering(
    value: &Value,
    item: &ItemDescriptor,
    valid_codes: &BTreeSet<String>,
    url: &str,
) -> Result<Option<CourseRecord>> {
    let result = value
        .pointer(OFFERING_RESULT_POINTER)
        .ok_or_else(|| HarvesterError::malformed(url, "missing course offering result"))?;

    let Some(data) = result.get("course_offering").filter(|d| !d.is_null()) else {
        return Ok(None);
    };

    let codes = data
        .get("course_attributes")
        .filter(|a| !a.is_null())
        .and_then(|a| a.get("course_attribute"))
        .map(one_or_many)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|attribute| str_field(attribute, "crse_attr_value"))
        .map(|code| code.trim().to_string())
        .filter(|code| valid_codes.contains(code))
        .collect();

    // Keep the listed identity; it keys the completion set and the index
    let course_id = item.course_id.clone().or_else(|| str_field(data, "crse_id"));
    let offering_number = match item.offering_number {
        Some(n) => Some(n),
        None if data.get("crse_offer_nbr").is_some() => Some(offering_field(data, url)?),
        None => None,
    };

    Ok(Some(CourseRecord {
        item_id: item.id.clone(),
        title: collapse_whitespace(&required_str(data, "course_title_long", url)?),
        number: normalize_course_number(
            &required_str(data, "subject", url)?,
            &required_str(data, "catalog_nbr", url)?,
        ),
        description: text_field(data, "descrlong"),
        prerequisites: text_field(data, "rqrmnt_group_descr"),
        typically_offered: text_field(data, "ssr_crse_typoff_cd_lov_descr"),
        codes,
        cross_listed_as: BTreeSet::new(),
        course_id,
        offering_number,
        url: None,
    }))
}
