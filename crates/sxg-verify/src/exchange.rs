//! The decoded exchange and its operations.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use crate::canonical;
use crate::digest::sha256;
use crate::error::{ExchangeError, ExchangeResult};
use crate::fetch::Fetcher;
use crate::framing::{self, parse_https_url, Frame};
use crate::headers::decode_header_block;
use crate::signature::{parse_signatures, SignatureParams};
use crate::verify::{verify_exchange, Verified};
use crate::version::Version;

/// A signed exchange.
///
/// Fields are public so tools can inspect or patch them; every derived value
/// (signature sets, canonical bytes) is recomputed from the current fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub version: Version,

    /// Always `GET`.
    pub request_method: String,

    pub request_uri: String,

    pub response_status: u16,

    /// Response headers in declaration order, names lowercase.
    pub response_headers: Vec<(String, String)>,

    /// Raw signature header text.
    pub signature: String,

    /// Payload bytes. MI-encoded until replaced by a verified decode.
    pub payload: Vec<u8>,
}

impl Exchange {
    /// Decode an exchange from a stream.
    pub fn read_from<R: Read>(reader: R) -> ExchangeResult<Self> {
        Self::from_frame(framing::read_frame(reader)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> ExchangeResult<Self> {
        Self::read_from(bytes)
    }

    /// Decode the header block of an already split frame.
    pub fn from_frame(frame: Frame) -> ExchangeResult<Self> {
        let decoded = decode_header_block(&frame.header_block, frame.version)?;

        let (request_method, request_uri) = match (frame.fallback_url, decoded.request) {
            (Some(url), None) => ("GET".to_string(), url),
            (None, Some(request)) => (request.method, request.url),
            _ => {
                return Err(ExchangeError::format(
                    "request url",
                    "exchange must carry exactly one request URL",
                ))
            }
        };

        debug!(
            version = %frame.version,
            url = %request_uri,
            status = decoded.status,
            headers = decoded.headers.len(),
            "decoded exchange"
        );

        Ok(Self {
            version: frame.version,
            request_method,
            request_uri,
            response_status: decoded.status,
            response_headers: decoded.headers,
            signature: frame.signature,
            payload: frame.payload,
        })
    }

    /// Request URI as a parsed `https` URL.
    pub fn request_url(&self) -> ExchangeResult<Url> {
        parse_https_url(&self.request_uri, "request url")
    }

    /// First value of response header `name`, case-insensitively.
    pub fn header<'a>(&'a self, name: &str) -> Option<&'a str> {
        self.response_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of response header `name` in declaration order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.response_headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parsed signature sets in declaration order.
    pub fn signatures(&self) -> ExchangeResult<Vec<SignatureParams>> {
        parse_signatures(&self.signature)
    }

    pub fn canonical_headers(&self) -> ExchangeResult<Vec<u8>> {
        canonical::canonical_headers(self)
    }

    pub fn signed_message(&self, params: &SignatureParams) -> ExchangeResult<Vec<u8>> {
        canonical::signed_message(self, params)
    }

    /// `sha256-<base64>` digest of the canonical headers, for display.
    pub fn header_integrity(&self) -> ExchangeResult<String> {
        Ok(format!("sha256-{}", STANDARD.encode(sha256(&self.canonical_headers()?))))
    }

    /// Verify with the default policy. See [`verify_exchange`].
    pub fn verify(
        &self,
        now: DateTime<Utc>,
        fetcher: &dyn Fetcher,
        cert_override: Option<&[u8]>,
    ) -> ExchangeResult<Verified> {
        verify_exchange(self, now, fetcher, cert_override)
    }
}
