//! Page fetcher: scope-checked HTTP fetches with settle delay and bounded retry.
//!
//! Lore pages are rendered client-side. When a render endpoint is configured
//! the fetcher asks it (Browserless `/content` API) for the rendered HTML;
//! otherwise it fetches the raw document directly.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use lorebook_shared::{HarvestConfig, LorebookError, Result};

/// User-Agent string for lore requests.
const USER_AGENT: &str = concat!("Lorebook/", env!("CARGO_PKG_VERSION"));

/// Upper bound on a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// `base * 2^attempt`, capped at [`MAX_BACKOFF`].
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// The fixed set of hosts a harvest may touch.
#[derive(Debug, Clone)]
pub struct HostScope {
    hosts: HashSet<String>,
}

impl HostScope {
    /// Allow the base host and every per-language override host.
    pub fn from_config(config: &HarvestConfig) -> Self {
        let hosts = std::iter::once(&config.base_url)
            .chain(config.host_overrides.values())
            .filter_map(|raw| Url::parse(raw).ok())
            .filter_map(|url| host_key(&url))
            .collect();
        Self { hosts }
    }

    pub fn in_scope(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        host_key(url).is_some_and(|key| self.hosts.contains(&key))
    }
}

/// `host[:port]` identity of a URL.
fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Fetches lore pages for the pipeline.
pub struct Fetcher {
    client: Client,
    scope: HostScope,
    render_endpoint: Option<Url>,
    settle: Duration,
    retries: u32,
    backoff: Duration,
}

impl Fetcher {
    /// Create a fetcher from the harvest configuration.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LorebookError::Network(format!("failed to build HTTP client: {e}")))?;

        let render_endpoint = config
            .render_endpoint
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    LorebookError::config(format!("invalid render endpoint '{raw}': {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            client,
            scope: HostScope::from_config(config),
            render_endpoint,
            settle: config.settle_delay(),
            retries: config.fetch_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Fetch a page body, retrying failures with exponential backoff.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> Result<String> {
        if !self.scope.in_scope(url) {
            return Err(LorebookError::Network(format!("{url}: host out of scope")));
        }

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.retries => {
                    let delay = retry_delay(self.backoff, attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<String> {
        debug!(%url, rendered = self.render_endpoint.is_some(), "fetching page");

        let response = match &self.render_endpoint {
            Some(endpoint) => {
                let content = endpoint
                    .join("content")
                    .map_err(|e| LorebookError::config(format!("invalid render endpoint: {e}")))?;
                let body = serde_json::json!({
                    "url": url.as_str(),
                    "waitForTimeout": self.settle.as_millis() as u64,
                });
                self.client.post(content).json(&body).send().await
            }
            None => self.client.get(url.as_str()).send().await,
        }
        .map_err(|e| LorebookError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LorebookError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LorebookError::Network(format!("{url}: body read failed: {e}")))?;

        // The renderer already waited; raw fetches settle here.
        if self.render_endpoint.is_none() && !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        Ok(body)
    }
}

#[cfg(test)]
mod fetcher_tests {
    use super::*;
    use lorebook_shared::AppConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base_url: &str) -> HarvestConfig {
        let mut config = HarvestConfig::from(&AppConfig::default());
        config.base_url = base_url.to_string();
        config.settle_ms = 0;
        config.retry_backoff_ms = 1;
        config
    }

    #[test]
    fn retry_delay_doubles_then_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 0), base);
        assert_eq!(retry_delay(base, 3), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 40), MAX_BACKOFF);
        assert_eq!(retry_delay(Duration::MAX, 1), MAX_BACKOFF);
    }

    #[test]
    fn scope_allows_configured_hosts_only() {
        let config = HarvestConfig::from(&AppConfig::default());
        let scope = HostScope::from_config(&config);

        let ok = Url::parse("https://universe.leagueoflegends.com/en_US/champions/").unwrap();
        assert!(scope.in_scope(&ok));
        let zh = Url::parse("https://yz.lol.qq.com/zh_CN/champions/").unwrap();
        assert!(scope.in_scope(&zh));

        let other = Url::parse("https://evil.example.com/en_US/champions/").unwrap();
        assert!(!scope.in_scope(&other));
        let file = Url::parse("file:///etc/passwd").unwrap();
        assert!(!scope.in_scope(&file));
    }

    #[tokio::test]
    async fn fetches_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/en_US/champions/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>list</html>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&config_for(&server.uri())).unwrap();
        let url = Url::parse(&format!("{}/en_US/champions/", server.uri())).unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<html>list</html>");
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&config_for(&server.uri())).unwrap();
        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&config_for(&server.uri())).unwrap();
        let url = Url::parse(&format!("{}/down", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn rejects_out_of_scope_hosts() {
        let fetcher = Fetcher::new(&config_for("https://universe.example.com")).unwrap();
        let url = Url::parse("https://elsewhere.example.com/page").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("out of scope"));
    }

    #[tokio::test]
    async fn uses_render_endpoint_when_configured() {
        let renderer = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>rendered</html>"))
            .expect(1)
            .mount(&renderer)
            .await;

        let mut config = config_for("https://universe.example.com");
        config.render_endpoint = Some(format!("{}/", renderer.uri()));
        let fetcher = Fetcher::new(&config).unwrap();

        let url = Url::parse("https://universe.example.com/en_US/champions/").unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<html>rendered</html>");
    }
}
