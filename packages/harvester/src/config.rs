//! Configuration constants, the harvest configuration file, and validation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvesterError, Result};

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Items fetched per run unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Base URL of the curriculum API.
pub const DEFAULT_CURRICULUM_API_URL: &str = "https://streamer.oit.duke.edu/curriculum";

/// Page listing the departments and their home pages.
pub const DEFAULT_DEPARTMENT_CATALOG_URL: &str = "https://trinity.duke.edu/departments";

/// Root directory for checkpoint stores.
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// University the harvested courses belong to.
pub const DEFAULT_UNIVERSITY_ID: &str = "duke_university";

/// Selector used to find a course description on a course page.
pub const DEFAULT_DESCRIPTION_SELECTOR: &str = "article p, main p";

/// Environment variable holding the curriculum API access token.
pub const API_KEY_ENV: &str = "CURRICULUM_API_KEY";

/// Harvest settings, usually read from a YAML file.
///
/// Every field has a default so a partial file is valid:
///
/// ```yaml
/// batch_size: 50
/// request_delay_ms: 250
/// curriculum_codes:
///   areas_of_knowledge: [ALP, CZ, NS, QS, SS]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Identifier of the university, used in cache paths and export ids.
    pub university_id: String,

    /// Maximum number of detail fetches per run.
    pub batch_size: usize,

    /// Pause between two successive detail fetches.
    pub request_delay_ms: u64,

    /// Curriculum codes worth keeping, grouped by category.
    pub curriculum_codes: BTreeMap<String, Vec<String>>,

    pub curriculum_api_url: String,

    /// Access token for the curriculum API. Falls back to `CURRICULUM_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curriculum_api_key: Option<String>,

    pub department_catalog_url: String,

    pub description_selector: String,

    pub cache_dir: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        let curriculum_codes = BTreeMap::from([
            (
                "areas_of_knowledge".to_string(),
                ["ALP", "CZ", "NS", "QS", "SS"].map(String::from).to_vec(),
            ),
            (
                "modes_of_inquiry".to_string(),
                ["CCI", "EI", "STS", "FL", "R", "W"].map(String::from).to_vec(),
            ),
        ]);

        Self {
            university_id: DEFAULT_UNIVERSITY_ID.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            request_delay_ms: 0,
            curriculum_codes,
            curriculum_api_url: DEFAULT_CURRICULUM_API_URL.to_string(),
            curriculum_api_key: None,
            department_catalog_url: DEFAULT_DEPARTMENT_CATALOG_URL.to_string(),
            description_selector: DEFAULT_DESCRIPTION_SELECTOR.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl HarvestConfig {
    /// Read a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            HarvesterError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml_ng::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then fill the API key from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if config.curriculum_api_key.is_none() {
            config.curriculum_api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
        Ok(config)
    }

    /// Check values that cannot be expressed in the type.
    pub fn validate(&self) -> Result<()> {
        validate_batch_size(self.batch_size)?;
        if self.university_id.trim().is_empty() {
            return Err(HarvesterError::Config("university_id must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.request_delay_ms = delay_ms;
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.curriculum_api_key = Some(key.into());
        self
    }

    /// All configured curriculum codes, flattened.
    #[must_use]
    pub fn valid_curriculum_codes(&self) -> BTreeSet<String> {
        self.curriculum_codes.values().flatten().cloned().collect()
    }

    /// Delay between fetches, `None` when disabled.
    #[must_use]
    pub fn request_delay(&self) -> Option<Duration> {
        (self.request_delay_ms > 0).then(|| Duration::from_millis(self.request_delay_ms))
    }

    /// Directory of the checkpoint store for one source.
    #[must_use]
    pub fn checkpoint_dir(&self, source_name: &str) -> PathBuf {
        self.cache_dir.join(&self.university_id).join(source_name)
    }

    /// The API key, or a configuration error naming where to set it.
    pub fn require_api_key(&self) -> Result<&str> {
        self.curriculum_api_key.as_deref().ok_or_else(|| {
            HarvesterError::Config(format!(
                "curriculum API key missing; set {API_KEY_ENV} or curriculum_api_key"
            ))
        })
    }
}

/// Validate a batch size. At least one item must be fetched per run.
///
/// # Examples
/// ```
/// use course_harvester::config::validate_batch_size;
///
/// assert!(validate_batch_size(10).is_ok());
/// assert!(validate_batch_size(0).is_err());
/// ```
pub fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(HarvesterError::Config("batch size must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.request_delay().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "batch_size: 25\nrequest_delay_ms: 200\ncurriculum_codes:\n  extra: [XX]\n",
        )
        .unwrap();

        let config = HarvestConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.request_delay(), Some(Duration::from_millis(200)));
        assert_eq!(config.university_id, DEFAULT_UNIVERSITY_ID);
        assert_eq!(
            config.valid_curriculum_codes(),
            BTreeSet::from(["XX".to_string()])
        );
    }

    #[test]
    fn test_file_with_zero_batch_size_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "batch_size: 0\n").unwrap();

        let err = HarvestConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("batch size"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = HarvestConfig::from_file(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, HarvesterError::Config(_)));
    }

    #[test]
    fn test_checkpoint_dir() {
        let config = HarvestConfig::default().with_cache_dir("/tmp/cache");
        assert_eq!(
            config.checkpoint_dir("curriculum_api"),
            PathBuf::from("/tmp/cache/duke_university/curriculum_api")
        );
    }

    #[test]
    fn test_require_api_key() {
        let config = HarvestConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(HarvesterError::Config(_))
        ));
        let config = config.with_api_key("secret");
        assert_eq!(config.require_api_key().unwrap(), "secret");
    }

    #[test]
    fn test_default_codes_flattened() {
        let codes = HarvestConfig::default().valid_curriculum_codes();
        assert!(codes.contains("QS"));
        assert!(codes.contains("W"));
        assert_eq!(codes.len(), 11);
    }
}
