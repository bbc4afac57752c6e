use std::cmp;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest pause in seconds allowed between two requests.
pub const MAX_REQUEST_INTERVAL: f32 = 3600.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Seconds before a request is abandoned
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Minimum seconds between two requests to the same host
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval: f32,

    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,

    #[serde(default = "default_render_fallback")]
    pub render_fallback: bool,

    /// Seconds allowed for a rendered navigation
    #[serde(default = "default_render_timeout")]
    pub render_timeout: u64,

    /// Documents shorter than this are treated as application shells
    #[serde(default = "default_min_document_length")]
    pub min_document_length: usize,

    #[serde(default)]
    pub concurrency: Concurrency,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_start_level")]
    pub start_level: StartLevel,

    #[serde(default)]
    pub filters: Filters,

    /// Sports to crawl, discovered from the pop-report index when empty
    #[serde(default)]
    pub sports: Vec<String>,

    /// Card pages crawled when starting at the card level
    #[serde(default)]
    pub seed_card_urls: Vec<String>,

    #[serde(default = "default_on_sport_error")]
    pub on_sport_error: OnError,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            min_request_interval: default_min_request_interval(),
            max_connections_per_host: default_max_connections_per_host(),
            render_fallback: default_render_fallback(),
            render_timeout: default_render_timeout(),
            min_document_length: default_min_document_length(),
            concurrency: Concurrency::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            batch_size: default_batch_size(),
            dry_run: false,
            start_level: default_start_level(),
            filters: Filters::default(),
            sports: vec![],
            seed_card_urls: vec![],
            on_sport_error: default_on_sport_error(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

impl CrawlerConfig {
    /// Rejects settings that cannot run, before any request is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url).map_err(|e| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;

        for (level, bound) in [
            ("years", self.concurrency.years),
            ("sets", self.concurrency.sets),
            ("cards", self.concurrency.cards),
        ] {
            if bound == 0 {
                return Err(ConfigError::Concurrency { level });
            }
        }
        if !(0.0..=MAX_REQUEST_INTERVAL).contains(&self.min_request_interval) {
            return Err(ConfigError::Interval(self.min_request_interval));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Zero("requestTimeout"));
        }
        if self.max_connections_per_host == 0 {
            return Err(ConfigError::Zero("maxConnectionsPerHost"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batchSize"));
        }
        self.retry.validate()?;
        self.cache.validate()?;

        match self.start_level {
            StartLevel::Category => {}
            StartLevel::Year if self.filters.years.is_empty() => {
                return Err(ConfigError::MissingSeeds {
                    level: self.start_level,
                    needs: "a year filter",
                })
            }
            StartLevel::Set if self.filters.years.is_empty() || self.filters.sets.is_empty() => {
                return Err(ConfigError::MissingSeeds {
                    level: self.start_level,
                    needs: "year and set filters",
                })
            }
            StartLevel::Card if self.seed_card_urls.is_empty() => {
                return Err(ConfigError::MissingSeeds {
                    level: self.start_level,
                    needs: "seed card URLs",
                })
            }
            StartLevel::Year | StartLevel::Set | StartLevel::Card => {}
        }
        if matches!(self.start_level, StartLevel::Year | StartLevel::Set) && self.sports.is_empty()
        {
            return Err(ConfigError::MissingSeeds {
                level: self.start_level,
                needs: "at least one sport",
            });
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs_f32(self.min_request_interval.max(0.0))
    }
}

fn default_base_url() -> String {
    String::from("https://my.taggrading.com")
}

fn default_user_agent() -> String {
    String::from(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    )
}

fn default_request_timeout() -> u64 {
    30
}

fn default_min_request_interval() -> f32 {
    1.0
}

fn default_max_connections_per_host() -> usize {
    10
}

fn default_render_fallback() -> bool {
    false
}

fn default_render_timeout() -> u64 {
    60
}

fn default_min_document_length() -> usize {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_start_level() -> StartLevel {
    StartLevel::Category
}

fn default_on_sport_error() -> OnError {
    OnError::SkipAndLog
}

fn default_handle_sigint() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

/// The first level whose pages are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum StartLevel {
    /// Sport pages, discovering years
    Category,
    /// Year pages built from the year filter
    Year,
    /// Set pages built from the year and set filters
    Set,
    /// Card pages given as seed URLs
    Card,
}

impl std::fmt::Display for StartLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Category => "category",
            Self::Year => "year",
            Self::Set => "set",
            Self::Card => "card",
        };
        f.write_str(name)
    }
}

/// Maximum in-flight children per level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concurrency {
    #[serde(default = "default_years_concurrency")]
    pub years: usize,
    #[serde(default = "default_sets_concurrency")]
    pub sets: usize,
    #[serde(default = "default_cards_concurrency")]
    pub cards: usize,
}

impl Concurrency {
    pub fn sequential() -> Self {
        Self {
            years: 1,
            sets: 1,
            cards: 1,
        }
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            years: default_years_concurrency(),
            sets: default_sets_concurrency(),
            cards: default_cards_concurrency(),
        }
    }
}

fn default_years_concurrency() -> usize {
    2
}

fn default_sets_concurrency() -> usize {
    4
}

fn default_cards_concurrency() -> usize {
    cmp::max(2, num_cpus::get())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Upper bound in seconds of the random delay added to each backoff
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("retry.maxAttempts"));
        }
        if !self.backoff_base.is_finite() || self.backoff_base < 0.0 {
            return Err(ConfigError::Negative("retry.backoffBase"));
        }
        if !self.jitter_max.is_finite() || self.jitter_max < 0.0 {
            return Err(ConfigError::Negative("retry.jitterMax"));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            jitter_max: default_jitter_max(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_jitter_max() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    #[serde(default)]
    pub ttl: CacheTtl,
}

impl CacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.memory_capacity == 0 {
            return Err(ConfigError::Zero("cache.memoryCapacity"));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: default_cache_dir(),
            memory_capacity: default_memory_capacity(),
            ttl: CacheTtl::default(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".tagpop-cache")
}

fn default_memory_capacity() -> usize {
    1_000
}

/// Time to live in seconds of each cached level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheTtl {
    #[serde(default = "default_ttl_categories")]
    pub categories: u64,
    #[serde(default = "default_ttl_years")]
    pub years: u64,
    #[serde(default = "default_ttl_sets")]
    pub sets: u64,
    #[serde(default = "default_ttl_cards")]
    pub cards: u64,
    #[serde(default = "default_ttl_card_details")]
    pub card_details: u64,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            categories: default_ttl_categories(),
            years: default_ttl_years(),
            sets: default_ttl_sets(),
            cards: default_ttl_cards(),
            card_details: default_ttl_card_details(),
        }
    }
}

fn default_ttl_categories() -> u64 {
    24 * 3600
}

fn default_ttl_years() -> u64 {
    12 * 3600
}

fn default_ttl_sets() -> u64 {
    6 * 3600
}

fn default_ttl_cards() -> u64 {
    2 * 3600
}

fn default_ttl_card_details() -> u64 {
    3600
}

/// Allow-lists applied to discovered children, empty lists accept everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(default)]
    pub years: Vec<String>,
    #[serde(default)]
    pub sets: Vec<String>,
    #[serde(default)]
    pub cards: Vec<String>,
}

impl Filters {
    pub fn accept_year(&self, year: &str) -> bool {
        accepts(&self.years, year)
    }

    pub fn accept_set(&self, set_title: &str) -> bool {
        accepts(&self.sets, set_title)
    }

    pub fn accept_card(&self, card_name: &str) -> bool {
        accepts(&self.cards, card_name)
    }
}

fn accepts(allowed: &[String], value: &str) -> bool {
    let value = tagpop_extract::text::normalize(value);
    allowed.is_empty()
        || allowed
            .iter()
            .any(|a| tagpop_extract::text::normalize(a).eq_ignore_ascii_case(&value))
}
