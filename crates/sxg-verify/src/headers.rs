//! Decoder for the CBOR header block.
//!
//! b2/b3 carry a single response map of byte strings; b1 carries
//! `[request-map, response-map]`. Declaration order and repeated names are
//! preserved. Pseudo-headers are validated and lifted out of the ordinary
//! header list.

use minicbor::Decoder;
use tracing::warn;

use crate::cbor;
use crate::error::{ExchangeError, ExchangeResult};
use crate::framing::parse_https_url;
use crate::version::Version;

const FIELD: &str = "header block";

/// Hop-by-hop headers, meaningless once a response is stored.
const UNCACHED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that would carry per-user state across origins.
const STATEFUL_HEADERS: &[&str] = &[
    "authentication-control",
    "authentication-info",
    "clear-site-data",
    "optional-www-authenticate",
    "proxy-authenticate",
    "proxy-authentication-info",
    "public-key-pins",
    "sec-websocket-accept",
    "set-cookie",
    "set-cookie2",
    "setprofile",
    "strict-transport-security",
    "www-authenticate",
];

/// Request pseudo-headers (b1 only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub url: String,
}

/// Decoded header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeaders {
    pub status: u16,

    /// Response headers without pseudo-headers or `signature`.
    pub headers: Vec<(String, String)>,

    /// Present for b1 only.
    pub request: Option<RequestLine>,
}

pub fn decode_header_block(bytes: &[u8], version: Version) -> ExchangeResult<DecodedHeaders> {
    let mut dec = Decoder::new(bytes);

    let request = if version.has_framed_url() {
        None
    } else {
        let len = cbor::array_len(&mut dec).map_err(format_error)?;
        if len != 2 {
            return Err(format_error(format!(
                "expected [request, response] array, found {len} elements"
            )));
        }
        Some(decode_request_map(&mut dec)?)
    };

    let (status, headers) = decode_response_map(&mut dec)?;
    cbor::expect_end(&dec).map_err(format_error)?;

    Ok(DecodedHeaders {
        status,
        headers,
        request,
    })
}

fn decode_request_map(dec: &mut Decoder<'_>) -> ExchangeResult<RequestLine> {
    let len = cbor::map_len(dec).map_err(format_error)?;
    let mut method = None;
    let mut url = None;

    for _ in 0..len {
        let name = header_name(cbor::bytes(dec).map_err(format_error)?)?;
        let value = header_value(&name, cbor::bytes(dec).map_err(format_error)?)?;
        let slot = match name.as_str() {
            ":method" => &mut method,
            ":url" => &mut url,
            _ => {
                return Err(format_error(format!(
                    "unexpected request header {name:?}"
                )))
            }
        };
        if slot.replace(value).is_some() {
            return Err(format_error(format!("duplicate pseudo-header {name}")));
        }
    }

    let method = method.ok_or_else(|| format_error("request map lacks :method"))?;
    if method != "GET" {
        return Err(format_error(format!(
            "request method must be GET, found {method:?}"
        )));
    }
    let url = url.ok_or_else(|| format_error("request map lacks :url"))?;
    parse_https_url(&url, ":url")?;

    Ok(RequestLine { method, url })
}

fn decode_response_map(dec: &mut Decoder<'_>) -> ExchangeResult<(u16, Vec<(String, String)>)> {
    let len = cbor::map_len(dec).map_err(format_error)?;
    let mut status = None;
    let mut headers = Vec::new();

    for _ in 0..len {
        let name = header_name(cbor::bytes(dec).map_err(format_error)?)?;
        let value = header_value(&name, cbor::bytes(dec).map_err(format_error)?)?;

        if name.starts_with(':') {
            if name != ":status" {
                return Err(format_error(format!("unknown pseudo-header {name}")));
            }
            if status.replace(parse_status(&value)?).is_some() {
                return Err(format_error("duplicate pseudo-header :status"));
            }
            continue;
        }

        if name == "signature" {
            warn!("dropping signature header found inside the signed header block");
            continue;
        }
        if UNCACHED_HEADERS.contains(&name.as_str()) {
            return Err(format_error(format!("hop-by-hop header {name} is not allowed")));
        }
        if STATEFUL_HEADERS.contains(&name.as_str()) {
            return Err(format_error(format!("stateful header {name} is not allowed")));
        }

        headers.push((name, value));
    }

    let status = status.ok_or_else(|| format_error("response map lacks :status"))?;
    Ok((status, headers))
}

fn header_name(raw: &[u8]) -> ExchangeResult<String> {
    let (prefix, token) = match raw.split_first() {
        Some((b':', rest)) => (":", rest),
        _ => ("", raw),
    };
    if token.is_empty() {
        return Err(format_error("empty header name"));
    }
    for &b in token {
        if b.is_ascii_uppercase() {
            return Err(format_error(format!(
                "header name {:?} is not lowercase",
                String::from_utf8_lossy(raw)
            )));
        }
        if !is_tchar(b) {
            return Err(format_error(format!(
                "header name {:?} contains an invalid character",
                String::from_utf8_lossy(raw)
            )));
        }
    }
    // tchar is ASCII, so the token is valid UTF-8.
    Ok(format!("{prefix}{}", String::from_utf8_lossy(token)))
}

fn header_value(name: &str, raw: &[u8]) -> ExchangeResult<String> {
    let value = std::str::from_utf8(raw)
        .map_err(|_| format_error(format!("value of {name} is not valid UTF-8")))?;
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0')) {
        return Err(format_error(format!(
            "value of {name} contains a forbidden control character"
        )));
    }
    Ok(value.to_string())
}

fn parse_status(value: &str) -> ExchangeResult<u16> {
    if value.len() != 3 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format_error(format!(
            ":status must be three digits, found {value:?}"
        )));
    }
    value
        .parse()
        .map_err(|_| format_error(format!("invalid :status {value:?}")))
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

fn format_error(reason: impl Into<String>) -> ExchangeError {
    ExchangeError::format(FIELD, reason)
}
