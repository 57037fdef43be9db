//! Fetch capability used to retrieve certificate chains (and, for tools,
//! whole exchanges).
//!
//! The verifier never reaches for a network client on its own: callers pass
//! a [`Fetcher`]. [`HttpFetcher`] is the real client, [`StaticFetcher`]
//! serves fixed bytes, and any `Fn(&str) -> ExchangeResult<Vec<u8>>` works too.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::version::Version;

pub const USER_AGENT_VALUE: &str = concat!("sxg-verify/", env!("CARGO_PKG_VERSION"));

/// Media type of certificate chains.
pub const CERT_CHAIN_ACCEPT: &str = "application/cert-chain+cbor";


/// Retrieves the bytes behind a URL. Must be safe to call concurrently.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> ExchangeResult<Vec<u8>>;
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> ExchangeResult<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, url: &str) -> ExchangeResult<Vec<u8>> {
        self(url)
    }
}

/// Serves fixed bytes, for offline and deterministic verification.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    routes: BTreeMap<String, Vec<u8>>,
    fallback: Option<Vec<u8>>,
}

impl StaticFetcher {
    /// No routes: every fetch fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for every URL.
    pub fn always(body: impl Into<Vec<u8>>) -> Self {
        Self {
            routes: BTreeMap::new(),
            fallback: Some(body.into()),
        }
    }

    /// Serve `body` for exactly `url`.
    pub fn with_route(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(url.into(), body.into());
        self
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> ExchangeResult<Vec<u8>> {
        self.routes
            .get(url)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ExchangeError::Fetch {
                url: url.to_string(),
                message: "no static response configured".to_string(),
            })
    }
}

/// Blocking HTTP client.
///
/// Do not call from inside an async runtime; wrap the call in
/// `spawn_blocking` there.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// Client asking for `application/cert-chain+cbor`.
    pub fn for_certificates(config: &FetchConfig) -> ExchangeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(CERT_CHAIN_ACCEPT));
        Self::with_headers(config, headers)
    }

    /// Client asking for signed exchanges, the way AMP caches request them.
    pub fn for_exchanges(config: &FetchConfig) -> ExchangeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(Version::B3.mime_type()));
        headers.insert(
            "amp-cache-transform",
            HeaderValue::from_static("google;v=1"),
        );
        Self::with_headers(config, headers)
    }

    fn with_headers(config: &FetchConfig, mut headers: HeaderMap) -> ExchangeResult<Self> {
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ExchangeError::Fetch {
                url: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> ExchangeResult<Vec<u8>> {
        debug!(url = %url, "fetching");

        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(too_large(url, self.max_body_bytes));
            }
        }

        let mut body = Vec::new();
        response
            .take(self.max_body_bytes + 1)
            .read_to_end(&mut body)
            .map_err(|e| ExchangeError::Fetch {
                url: url.to_string(),
                message: format!("failed to read response body: {e}"),
            })?;
        if body.len() as u64 > self.max_body_bytes {
            return Err(too_large(url, self.max_body_bytes));
        }

        debug!(url = %url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

fn too_large(url: &str, limit: u64) -> ExchangeError {
    ExchangeError::Fetch {
        url: url.to_string(),
        message: format!("response exceeds {limit} bytes"),
    }
}
