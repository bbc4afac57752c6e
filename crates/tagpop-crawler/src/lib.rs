mod cache;
mod config;
mod error;
mod fetch;
mod limiter;
mod pipeline;
mod render;
mod retry;
mod stats;
mod store;

pub use cache::{CacheKey, CacheScope, CacheStats, TieredCache};
pub use config::{
    CacheConfig, CacheTtl, Concurrency, CrawlerConfig, Filters, OnError, RetryConfig, StartLevel,
};
pub use error::{ConfigError, FetchError};
pub use fetch::{classify, FetchClient, Fetched, PageKind, ShellHint};
pub use limiter::HostLimiter;
pub use pipeline::Pipeline;
#[cfg(feature = "chromium")]
pub use render::ChromiumRenderer;
pub use render::{NoopRenderer, Renderer};
pub use retry::Retry;
pub use stats::{CrawlReport, RunStats, RunSummary, SportReport, TableSummary};
pub use store::{NullStore, Records, Store, TableKind, UpsertCounts};

pub use anyhow;
