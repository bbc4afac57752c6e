use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::CrawlerConfig;
use crate::error::FetchError;
use crate::limiter::HostLimiter;
use crate::render::Renderer;

/// Strings only found in documents whose content is built client side.
const SHELL_MARKERS: &[&str] = &[
    "__NEXT_DATA__",
    "window.__INITIAL_STATE__",
    "data-reactroot",
    r#"id="root""#,
    r#"id="app""#,
    r#"class="loading""#,
    "<noscript>",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellHint {
    TooShort(usize),
    /// No table row nor list item, with the first bootstrap marker found if any
    NoContent(Option<&'static str>),
}

impl fmt::Display for ShellHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "only {len} bytes"),
            Self::NoContent(Some(marker)) => write!(f, "no content, found {marker}"),
            Self::NoContent(None) => write!(f, "no content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    Static,
    NeedsRendering(ShellHint),
}

/// Decides whether a plainly fetched document is usable or must be rendered.
pub fn classify(html: &str, min_len: usize) -> PageKind {
    if html.len() < min_len {
        return PageKind::NeedsRendering(ShellHint::TooShort(html.len()));
    }
    if tagpop_extract::has_content(html) {
        return PageKind::Static;
    }
    let marker = SHELL_MARKERS.iter().find(|m| html.contains(*m)).copied();
    PageKind::NeedsRendering(ShellHint::NoContent(marker))
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub html: String,
    pub rendered: bool,
}

/// HTTP client of a crawl run, throttled per host with a browser fallback.
pub struct FetchClient {
    http: reqwest::Client,
    limiter: HostLimiter,
    renderer: Arc<dyn Renderer>,
    render_fallback: bool,
    render_timeout: Duration,
    min_document_length: usize,
    // URLs already known to need rendering
    shells: Mutex<HashSet<String>>,
}

impl FetchClient {
    pub fn new(config: &CrawlerConfig, renderer: Arc<dyn Renderer>) -> anyhow::Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_connections_per_host)
            .redirect(Policy::limited(5))
            .gzip(true)
            .deflate(true)
            .build()
            .context("Couldn't build HTTP client")?;

        Ok(Self {
            http,
            limiter: HostLimiter::new(config.min_request_interval()),
            renderer,
            render_fallback: config.render_fallback,
            render_timeout: config.render_timeout(),
            min_document_length: config.min_document_length,
            shells: Mutex::new(HashSet::new()),
        })
    }

    /// Fetches `url`, rendering it in a browser when the plain document is
    /// an application shell or the plain request failed.
    pub async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::Url {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if self.render_fallback && self.is_shell(url) {
            return self.render(&parsed).await;
        }

        match self.get(&parsed).await {
            Ok(html) => match classify(&html, self.min_document_length) {
                PageKind::Static => Ok(Fetched {
                    html,
                    rendered: false,
                }),
                PageKind::NeedsRendering(hint) if self.render_fallback => {
                    log::info!("Rendering {url}: {hint}");
                    self.remember_shell(url);
                    self.render(&parsed).await
                }
                PageKind::NeedsRendering(hint) => {
                    log::warn!("Keeping plain document of {url} ({hint}), rendering is off");
                    Ok(Fetched {
                        html,
                        rendered: false,
                    })
                }
            },
            Err(e) if self.render_fallback => {
                log::warn!("Plain fetch of {url} failed, rendering instead: {e}");
                self.render(&parsed).await
            }
            Err(e) => Err(e),
        }
    }

    async fn get(&self, url: &Url) -> Result<String, FetchError> {
        self.limiter.wait(&host_key(url)).await;

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::request(url.as_str(), e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text()
            .await
            .map_err(|e| FetchError::request(url.as_str(), e))
    }

    async fn render(&self, url: &Url) -> Result<Fetched, FetchError> {
        self.limiter.wait(&host_key(url)).await;

        let html = self
            .renderer
            .render(url.as_str(), self.render_timeout)
            .await
            .map_err(|e| FetchError::Render {
                url: url.to_string(),
                reason: format!("{e:#}"),
            })?;

        Ok(Fetched {
            html,
            rendered: true,
        })
    }

    fn is_shell(&self, url: &str) -> bool {
        self.shells
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(url)
    }

    fn remember_shell(&self, url: &str) {
        self.shells
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string());
    }
}

fn host_key(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => url.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_documents_are_shells() {
        assert_eq!(
            classify("<html></html>", 1000),
            PageKind::NeedsRendering(ShellHint::TooShort(13))
        );
    }

    #[test]
    fn content_wins_over_markers() {
        let html = r#"<div id="root"><table><tr><td>Baseball</td></tr></table></div>"#;
        assert_eq!(classify(html, 0), PageKind::Static);
    }

    #[test]
    fn empty_bootstrap_page_needs_rendering() {
        let html = r#"<body><div id="app"></div><script src="/main.js"></script></body>"#;
        assert_eq!(
            classify(html, 0),
            PageKind::NeedsRendering(ShellHint::NoContent(Some(r#"id="app""#)))
        );
        assert_eq!(
            classify("<p>Nothing here</p>", 0),
            PageKind::NeedsRendering(ShellHint::NoContent(None))
        );
    }

    #[test]
    fn host_keys_include_port() {
        let url = Url::parse("http://127.0.0.1:8080/pop-report").unwrap();
        assert_eq!(host_key(&url), "127.0.0.1:8080");
        let url = Url::parse("https://my.taggrading.com/pop-report").unwrap();
        assert_eq!(host_key(&url), "my.taggrading.com:443");
    }
}
