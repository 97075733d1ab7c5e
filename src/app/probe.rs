//! Network probes used by the scoring engine.
//!
//! Both probes follow the same shape: one HEAD request, then a single
//! streamed GET for hosts that reject or mishandle HEAD. Every request is
//! bounded by the transport's timeout. Failures are returned as typed
//! outcomes instead of errors so the engine can turn them into score deltas.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::trust::{TrustTables, domain_of};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed")]
    Connect,
    #[error("redirect loop or redirect limit reached")]
    Redirect,
    #[error("http status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(String),
    #[error("http client setup failed: {0}")]
    ClientBuild(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else if err.is_connect() {
            ProbeError::Connect
        } else if err.is_redirect() {
            ProbeError::Redirect
        } else {
            ProbeError::Request(err.to_string())
        }
    }
}

/// What a completed request reports back: the status and the URL reached
/// after following redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: u16,
    pub final_url: String,
}

impl HttpOutcome {
    pub fn is_live(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// HTTP(S) capability the scoring engine depends on.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn head(&self, url: &str) -> Result<HttpOutcome, ProbeError>;

    /// GET that never reads the body; the response is dropped once the
    /// status line and headers are in.
    async fn get_streamed(&self, url: &str) -> Result<HttpOutcome, ProbeError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, ProbeError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(timeout)
            .timeout(timeout);
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        } else {
            builder = builder.user_agent(concat!("qrtrust/", env!("CARGO_PKG_VERSION")));
        }
        let client = builder
            .build()
            .map_err(|err| ProbeError::ClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn head(&self, url: &str) -> Result<HttpOutcome, ProbeError> {
        let response = self.client.head(url).send().await?;
        Ok(HttpOutcome {
            status: response.status().as_u16(),
            final_url: response.url().to_string(),
        })
    }

    async fn get_streamed(&self, url: &str) -> Result<HttpOutcome, ProbeError> {
        let response = self.client.get(url).send().await?;
        let outcome = HttpOutcome {
            status: response.status().as_u16(),
            final_url: response.url().to_string(),
        };
        drop(response);
        Ok(outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NotShortened,
    Unchanged,
    Resolved(String),
    Failed(ProbeError),
}

impl Resolution {
    /// The URL scoring continues with; the original on any failure.
    pub fn effective_url<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            Resolution::Resolved(url) => url,
            _ => original,
        }
    }
}

/// Follow a shortener link to its destination. Only URLs on a known
/// shortener domain touch the network.
pub async fn resolve_shortened(
    transport: &dyn HttpTransport,
    tables: &TrustTables,
    url: &str,
) -> Resolution {
    if !tables.is_shortener(&domain_of(url)) {
        return Resolution::NotShortened;
    }

    let final_url = match transport.head(url).await {
        Ok(outcome) => outcome.final_url,
        Err(head_err) => {
            tracing::debug!(url, error = %head_err, "shortener HEAD failed, retrying with GET");
            match transport.get_streamed(url).await {
                Ok(outcome) => outcome.final_url,
                Err(err) => {
                    tracing::debug!(url, error = %err, "shortener resolution failed");
                    return Resolution::Failed(err);
                }
            }
        }
    };

    if final_url == url {
        Resolution::Unchanged
    } else {
        Resolution::Resolved(final_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable(u16),
    Unreachable(ProbeError),
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable(_))
    }
}

pub async fn probe_reachability(transport: &dyn HttpTransport, url: &str) -> Reachability {
    match transport.head(url).await {
        Ok(outcome) if outcome.is_live() => return Reachability::Reachable(outcome.status),
        Ok(outcome) => {
            tracing::debug!(url, status = outcome.status, "HEAD not live, retrying with GET");
        }
        Err(err) => {
            tracing::debug!(url, error = %err, "HEAD failed, retrying with GET");
        }
    }

    match transport.get_streamed(url).await {
        Ok(outcome) if outcome.is_live() => Reachability::Reachable(outcome.status),
        Ok(outcome) => Reachability::Unreachable(ProbeError::Status(outcome.status)),
        Err(err) => Reachability::Unreachable(err),
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Canned HEAD/GET answers keyed by URL. Unknown URLs fail to connect.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        heads: HashMap<String, Result<HttpOutcome, ProbeError>>,
        gets: HashMap<String, Result<HttpOutcome, ProbeError>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        pub(crate) fn head(mut self, url: &str, status: u16, final_url: &str) -> Self {
            self.heads.insert(url.to_string(), Ok(outcome(status, final_url)));
            self
        }

        pub(crate) fn head_err(mut self, url: &str, err: ProbeError) -> Self {
            self.heads.insert(url.to_string(), Err(err));
            self
        }

        pub(crate) fn get(mut self, url: &str, status: u16, final_url: &str) -> Self {
            self.gets.insert(url.to_string(), Ok(outcome(status, final_url)));
            self
        }

        /// Both methods answer `status` without redirecting.
        pub(crate) fn live(self, url: &str, status: u16) -> Self {
            self.head(url, status, url).get(url, status, url)
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    fn outcome(status: u16, final_url: &str) -> HttpOutcome {
        HttpOutcome {
            status,
            final_url: final_url.to_string(),
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn head(&self, url: &str) -> Result<HttpOutcome, ProbeError> {
            self.record(format!("HEAD {url}"));
            self.heads
                .get(url)
                .cloned()
                .unwrap_or(Err(ProbeError::Connect))
        }

        async fn get_streamed(&self, url: &str) -> Result<HttpOutcome, ProbeError> {
            self.record(format!("GET {url}"));
            self.gets
                .get(url)
                .cloned()
                .unwrap_or(Err(ProbeError::Connect))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;

    #[tokio::test]
    async fn non_shortener_is_never_fetched() {
        let transport = FakeTransport::default();
        let tables = TrustTables::default();
        let resolution =
            resolve_shortened(&transport, &tables, "https://www.amazon.in/dp/B0D12345IP").await;
        assert_eq!(resolution, Resolution::NotShortened);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn shortener_resolves_through_head() {
        let transport =
            FakeTransport::default().head("https://bit.ly/abc", 200, "https://www.amazon.in/dp/B0D12345IP");
        let tables = TrustTables::default();
        let resolution = resolve_shortened(&transport, &tables, "https://bit.ly/abc").await;
        assert_eq!(
            resolution,
            Resolution::Resolved("https://www.amazon.in/dp/B0D12345IP".to_string())
        );
        assert_eq!(transport.calls(), vec!["HEAD https://bit.ly/abc"]);
    }

    #[tokio::test]
    async fn shortener_falls_back_to_get_then_to_original() {
        let tables = TrustTables::default();
        let transport = FakeTransport::default()
            .head_err("https://bit.ly/abc", ProbeError::Timeout)
            .get("https://bit.ly/abc", 200, "https://flipkart.com/p/itm1");
        let resolution = resolve_shortened(&transport, &tables, "https://bit.ly/abc").await;
        assert_eq!(
            resolution.effective_url("https://bit.ly/abc"),
            "https://flipkart.com/p/itm1"
        );

        let dead = FakeTransport::default().head_err("https://bit.ly/abc", ProbeError::Timeout);
        let resolution = resolve_shortened(&dead, &tables, "https://bit.ly/abc").await;
        assert_eq!(resolution, Resolution::Failed(ProbeError::Connect));
        assert_eq!(resolution.effective_url("https://bit.ly/abc"), "https://bit.ly/abc");
        assert_eq!(dead.calls().len(), 2);
    }

    #[tokio::test]
    async fn shortener_head_status_does_not_block_resolution() {
        let transport = FakeTransport::default().head(
            "https://bit.ly/z",
            404,
            "https://www.amazon.in/dp/B0D12345IP",
        );
        let tables = TrustTables::default();
        let resolution = resolve_shortened(&transport, &tables, "https://bit.ly/z").await;
        assert_eq!(
            resolution,
            Resolution::Resolved("https://www.amazon.in/dp/B0D12345IP".to_string())
        );
        assert_eq!(transport.calls(), vec!["HEAD https://bit.ly/z"]);
    }

    #[tokio::test]
    async fn shortener_that_does_not_redirect_is_unchanged() {
        let transport = FakeTransport::default().live("https://t.co/x", 200);
        let tables = TrustTables::default();
        let resolution = resolve_shortened(&transport, &tables, "https://t.co/x").await;
        assert_eq!(resolution, Resolution::Unchanged);
    }

    #[tokio::test]
    async fn reachable_on_head_skips_get() {
        let transport = FakeTransport::default().live("https://a.example/", 204);
        let reach = probe_reachability(&transport, "https://a.example/").await;
        assert_eq!(reach, Reachability::Reachable(204));
        assert_eq!(transport.calls(), vec!["HEAD https://a.example/"]);
    }

    #[tokio::test]
    async fn head_rejection_retries_once_with_get() {
        let transport = FakeTransport::default()
            .head("https://a.example/", 405, "https://a.example/")
            .get("https://a.example/", 200, "https://a.example/");
        let reach = probe_reachability(&transport, "https://a.example/").await;
        assert!(reach.is_reachable());
        assert_eq!(transport.calls().len(), 2);

        let errored = FakeTransport::default()
            .head_err("https://a.example/", ProbeError::Timeout)
            .get("https://a.example/", 302, "https://a.example/login");
        assert!(probe_reachability(&errored, "https://a.example/").await.is_reachable());
    }

    #[tokio::test]
    async fn failures_report_their_kind() {
        let transport = FakeTransport::default().live("https://a.example/gone", 404);
        assert_eq!(
            probe_reachability(&transport, "https://a.example/gone").await,
            Reachability::Unreachable(ProbeError::Status(404))
        );

        let silent = FakeTransport::default();
        assert_eq!(
            probe_reachability(&silent, "https://nowhere.example/").await,
            Reachability::Unreachable(ProbeError::Connect)
        );
    }
}
