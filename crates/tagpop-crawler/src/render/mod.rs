//! Full browser rendering for pages served as empty application shells.

#[cfg(feature = "chromium")]
mod chromium;

use std::time::Duration;

use async_trait::async_trait;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumRenderer;

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Loads `url` in a browser and returns the resulting document.
    async fn render(&self, url: &str, timeout: Duration) -> anyhow::Result<String>;
}

/// Renderer used when no browser is available, every render fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn render(&self, url: &str, _timeout: Duration) -> anyhow::Result<String> {
        anyhow::bail!("Rendering is disabled, cannot render {url}")
    }
}
