use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::Renderer;

/// Headless Chromium shared by every render of a run.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launches Chromium, from `TAGPOP_CHROMIUM_PATH` when set.
    pub async fn launch() -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if let Ok(path) = std::env::var("TAGPOP_CHROMIUM_PATH") {
            builder = builder.chrome_executable(PathBuf::from(path));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Couldn't configure Chromium: {e}"))?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .context("Couldn't launch Chromium")?;
        let handler = tokio::spawn(async move { while events.next().await.is_some() {} });

        Ok(Self { browser, handler })
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, url: &str, limit: Duration) -> anyhow::Result<String> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Couldn't open a browser page")?;

        let loaded = timeout(limit, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            page.content().await
        })
        .await;

        let html = match loaded {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(anyhow!("Navigation to {url} failed: {e}")),
            Err(_) => Err(anyhow!("Navigation to {url} timed out after {limit:?}")),
        };
        if let Err(e) = page.close().await {
            log::debug!("Couldn't close page for {url}: {e}");
        }
        html
    }
}
