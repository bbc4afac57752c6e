use thiserror::Error;

use crate::config::StartLevel;

/// Failures of a single page fetch, all of them worth retrying.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("Couldn't render {url}: {reason}")]
    Render { url: String, reason: String },
    #[error("Invalid URL {url}: {reason}")]
    Url { url: String, reason: String },
}

impl FetchError {
    pub(crate) fn request(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                source,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base URL {url}: {reason}")]
    BaseUrl { url: String, reason: String },
    #[error("Concurrency bound for {level} must be at least 1")]
    Concurrency { level: &'static str },
    #[error(
        "Request interval must be between 0 and {max} seconds, got {0}",
        max = crate::config::MAX_REQUEST_INTERVAL
    )]
    Interval(f32),
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("Starting at the {level} level requires {needs}")]
    MissingSeeds {
        level: StartLevel,
        needs: &'static str,
    },
}
