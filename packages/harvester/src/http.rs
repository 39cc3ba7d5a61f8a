//! HTTP client wrapper shared by all sources.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{HarvesterError, Result};

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("course-harvester/", env!("CARGO_PKG_VERSION"));

/// Maximum number of retry attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Outcome of a GET that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// 2xx response body.
    Body(Vec<u8>),

    /// Non-success status. Server errors only end up here once retries
    /// are exhausted.
    Status(StatusCode),
}

impl Fetched {
    /// The body, if the response was a success.
    #[must_use]
    pub fn into_body(self) -> Option<Vec<u8>> {
        match self {
            Self::Body(bytes) => Some(bytes),
            Self::Status(_) => None,
        }
    }
}

/// Create a configured HTTP client.
pub fn create_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// GET a URL with retry logic.
///
/// Server errors (5xx) and connection/timeout failures are retried with
/// exponential backoff. Client errors are returned as
/// [`Fetched::Status`] right away since they won't succeed on retry.
/// Connection failures that outlast the retries are an error.
pub fn fetch(client: &Client, url: &str) -> Result<Fetched> {
    let mut last_error: Option<String> = None;
    let mut last_status: Option<StatusCode> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 500ms, 1000ms
            let delay = RETRY_BASE_DELAY_MS * (1 << (attempt - 1));
            tracing::debug!(attempt, delay_ms = delay, "Retrying after delay");
            thread::sleep(Duration::from_millis(delay));
        }

        match client.get(url).send() {
            Ok(response) => {
                let status = response.status();

                if status.is_server_error() {
                    tracing::warn!(
                        status = %status,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Server error, will retry"
                    );
                    last_status = Some(status);
                    continue;
                }

                if !status.is_success() {
                    tracing::debug!(status = %status, url, "Non-success response");
                    return Ok(Fetched::Status(status));
                }

                let bytes = response.bytes()?;
                return Ok(Fetched::Body(bytes.to_vec()));
            }
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Connection error, will retry"
                    );
                    last_error = Some(e.to_string());
                    last_status = None;
                    continue;
                }
                // Other errors (like invalid URL) - don't retry
                return Err(HarvesterError::Http(e));
            }
        }
    }

    // A server that keeps answering 5xx is a non-success response like any other
    if let Some(status) = last_status {
        return Ok(Fetched::Status(status));
    }

    Err(HarvesterError::RetriesExhausted {
        attempts: MAX_RETRIES,
        message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Convert bytes to a String, logging a warning if invalid UTF-8 had to be
/// replaced.
pub fn bytes_to_string(bytes: &[u8], context: &str) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            tracing::warn!(context, "Response contained invalid UTF-8, replacing");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
