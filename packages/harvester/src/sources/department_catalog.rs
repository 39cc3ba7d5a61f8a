//! Department course catalog source.
//!
//! Departments publish their courses as HTML tables on their own sites. The
//! departments themselves are enumerated from a fixed index page.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use reqwest::blocking::Client;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::{CourseSource, Detail, Listing};
use crate::config::HarvestConfig;
use crate::error::{HarvesterError, Result};
use crate::http::{bytes_to_string, fetch, Fetched};
use crate::text::collapse_whitespace;
use crate::types::{CollectionKey, ItemDescriptor};

/// Catalog paths departments use; anything else is mapped to `/courses`.
const KNOWN_CATALOG_PATHS: [&str; 2] = ["/course-catalog", "/courses"];

#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static INDEX_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table tr").expect("valid selector"));

#[allow(clippy::expect_used)]
static ROW_HEADER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("valid selector"));

#[allow(clippy::expect_used)]
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

#[allow(clippy::expect_used)]
static NAV_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("nav > ul > li").expect("valid selector"));

#[allow(clippy::expect_used)]
static NAV_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div a").expect("valid selector"));

#[allow(clippy::expect_used)]
static CATALOG_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.tablesaw").expect("valid selector"));

#[allow(clippy::expect_used)]
static CATALOG_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tbody tr").expect("valid selector"));

#[allow(clippy::expect_used)]
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));

/// Harvests department catalogs.
#[derive(Debug, Clone)]
pub struct DepartmentCatalogSource {
    client: Client,
    index_url: String,
    valid_codes: BTreeSet<String>,
    description_selector: Selector,
}

impl DepartmentCatalogSource {
    pub const NAME: &'static str = "department_catalog";

    pub fn new(
        client: Client,
        index_url: impl Into<String>,
        valid_codes: BTreeSet<String>,
        description_selector: &str,
    ) -> Result<Self> {
        let description_selector = Selector::parse(description_selector)
            .map_err(|e| HarvesterError::InvalidSelector(format!("{description_selector}: {e:?}")))?;
        Ok(Self {
            client,
            index_url: index_url.into(),
            valid_codes,
            description_selector,
        })
    }

    pub fn from_config(client: Client, config: &HarvestConfig) -> Result<Self> {
        Self::new(
            client,
            &config.department_catalog_url,
            config.valid_curriculum_codes(),
            &config.description_selector,
        )
    }

    fn get_html(&self, url: &str, context: &str) -> Result<Option<String>> {
        Ok(fetch(&self.client, url)?
            .into_body()
            .map(|bytes| bytes_to_string(&bytes, context)))
    }

    /// Find the catalog URL of one department.
    fn catalog_url(&self, name: &str, home_url: &str) -> Result<Option<String>> {
        if let Some(html) = self.get_html(home_url, name)? {
            if let Some(url) = parse_courses_link(&html, home_url)? {
                return Ok(Some(url));
            }
        }

        // No "Courses" entry in the navigation: probe the conventional path
        let probe = join_url(home_url, "/courses")?;
        match fetch(&self.client, &probe)? {
            Fetched::Body(_) => Ok(Some(probe)),
            Fetched::Status(status) => {
                tracing::warn!(department = name, status = %status, "No course catalog found, skipping");
                Ok(None)
            }
        }
    }
}

impl CourseSource for DepartmentCatalogSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enumerate(&self) -> Result<Vec<CollectionKey>> {
        tracing::info!("Getting URLs to department course catalogs");
        let html = self
            .get_html(&self.index_url, "department index")?
            .ok_or_else(|| HarvesterError::malformed(&self.index_url, "department index unavailable"))?;

        let mut keys = Vec::new();
        for (name, home_url) in parse_department_index(&html, &self.index_url)? {
            if let Some(catalog_url) = self.catalog_url(&name, &home_url)? {
                keys.push(CollectionKey::new(&name, &name).with_url(catalog_url));
            }
        }
        Ok(keys)
    }

    fn list_items(&self, key: &CollectionKey) -> Result<Listing> {
        let Some(url) = key.url.as_deref() else {
            return Ok(Listing::Unavailable {
                reason: "no catalog URL".to_string(),
            });
        };

        tracing::info!(collection = %key.code, "Getting department course data");
        let Some(html) = self.get_html(url, &key.code)? else {
            return Ok(Listing::Unavailable {
                reason: format!("catalog page {url} unavailable"),
            });
        };

        match parse_catalog_table(&html, url, &key.code, &self.valid_codes)? {
            Some(items) => Ok(Listing::Items(items)),
            None => Ok(Listing::Unavailable {
                reason: "no course table on catalog page".to_string(),
            }),
        }
    }

    fn fetch_detail(&self, item: &ItemDescriptor) -> Result<Detail> {
        let Some(url) = item.detail_url.as_deref() else {
            return Ok(Detail::Unavailable {
                reason: "no detail page".to_string(),
            });
        };

        let Some(html) = self.get_html(url, &item.id)? else {
            return Ok(Detail::Unavailable {
                reason: format!("detail page {url} unavailable"),
            });
        };

        match parse_description(&html, &self.description_selector) {
            Some(description) => {
                let mut record = item.fallback_record();
                record.description = Some(description);
                Ok(Detail::Found(record))
            }
            None => Ok(Detail::Unavailable {
                reason: "no description on detail page".to_string(),
            }),
        }
    }
}

/// Resolve `href` against `base`.
fn join_url(base: &str, href: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| HarvesterError::malformed(base, e.to_string()))?;
    let joined = base
        .join(href)
        .map_err(|e| HarvesterError::malformed(base.as_str(), format!("bad link '{href}': {e}")))?;
    Ok(joined.to_string())
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Extract `(department name, home page URL)` pairs from the index page.
///
/// Rows without a header cell or link (spacers, captions) are skipped.
pub fn parse_department_index(html: &str, index_url: &str) -> Result<Vec<(String, String)>> {
    let document = Html::parse_document(html);
    let mut departments = Vec::new();

    for row in document.select(&INDEX_ROW) {
        let name = row.select(&ROW_HEADER).next().map(element_text);
        let href = row
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"));
        match (name, href) {
            (Some(name), Some(href)) if !name.is_empty() => {
                departments.push((name, join_url(index_url, href)?));
            }
            _ => tracing::debug!("Skipping department index row without name or link"),
        }
    }

    Ok(departments)
}

/// Find the catalog URL in a department home page's navigation.
pub fn parse_courses_link(html: &str, home_url: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);

    for item in document.select(&NAV_ITEM) {
        let Some(link) = item.select(&NAV_LINK).next() else {
            continue;
        };
        if element_text(link) != "Courses" {
            continue;
        }
        let href = link.value().attr("href").unwrap_or_default();
        let path = if KNOWN_CATALOG_PATHS.contains(&href) {
            href
        } else {
            "/courses"
        };
        return join_url(home_url, path).map(Some);
    }

    Ok(None)
}

/// Extract the course rows of a catalog page.
///
/// Returns `None` when the page has no catalog table.
pub fn parse_catalog_table(
    html: &str,
    catalog_url: &str,
    department: &str,
    valid_codes: &BTreeSet<String>,
) -> Result<Option<Vec<ItemDescriptor>>> {
    let document = Html::parse_document(html);
    let Some(table) = document.select(&CATALOG_TABLE).next() else {
        return Ok(None);
    };

    let mut items = Vec::new();
    for row in table.select(&CATALOG_ROW) {
        let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
        let [number_cell, title_cell, codes_cell, ..] = cells.as_slice() else {
            tracing::debug!(department, "Skipping catalog row with too few cells");
            continue;
        };

        let number = element_text(*number_cell);
        if number.is_empty() {
            continue;
        }

        let detail_url = match title_cell.select(&LINK).next().and_then(|a| a.value().attr("href")) {
            Some(href) => Some(join_url(catalog_url, href)?),
            None => None,
        };

        let codes = codes_cell
            .text()
            .collect::<String>()
            .split(',')
            .map(str::trim)
            .filter(|code| valid_codes.contains(*code))
            .map(String::from)
            .collect();

        items.push(ItemDescriptor {
            id: ItemDescriptor::catalog_id(department, &number),
            collection: department.to_string(),
            title: element_text(*title_cell),
            number,
            course_id: None,
            offering_number: None,
            codes,
            detail_url,
        });
    }

    Ok(Some(items))
}

/// First non-empty text matched by `selector` on a course page.
#[must_use]
pub fn parse_description(html: &str, selector: &Selector) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}
