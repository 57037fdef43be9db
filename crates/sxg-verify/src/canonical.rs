//! Canonical serialization of the signed portion of an exchange.
//!
//! The signed message is
//!
//! ```text
//! 0x20 * 64 | context | 0x00
//! | 0x20 cert-sha256          (or a single 0x00 without a fingerprint)
//! | be64 len | validity-url
//! | be64 date | be64 expires
//! | be64 len | request url    (b2/b3 only)
//! | be64 len | canonical headers
//! ```
//!
//! Canonical headers are the canonical CBOR encoding of the response map
//! (`:status` plus every header except `signature`). b1 signs
//! `[{":method", ":url"}, response-map]` instead. Nothing here is cached:
//! the bytes are recomputed from the exchange's current fields every call.

use std::collections::BTreeMap;

use minicbor::Encoder;

use crate::cbor;
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Exchange;
use crate::signature::SignatureParams;

const PREAMBLE: [u8; 64] = [0x20; 64];

pub fn canonical_headers(exchange: &Exchange) -> ExchangeResult<Vec<u8>> {
    let mut enc = Encoder::new(Vec::new());
    let encode_error = |e: String| ExchangeError::format("canonical headers", e);

    if !exchange.version.has_framed_url() {
        enc.array(2).map_err(|e| encode_error(e.to_string()))?;
        let request = vec![
            (b":method".to_vec(), exchange.request_method.as_bytes().to_vec()),
            (b":url".to_vec(), exchange.request_uri.as_bytes().to_vec()),
        ];
        cbor::write_bytes_map(&mut enc, request).map_err(encode_error)?;
    }

    cbor::write_bytes_map(&mut enc, response_entries(exchange)).map_err(encode_error)?;
    Ok(enc.into_writer())
}

/// `:status` plus the signed response headers, one entry per name.
fn response_entries(exchange: &Exchange) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut merged: BTreeMap<&str, String> = BTreeMap::new();
    for (name, value) in &exchange.response_headers {
        if name.eq_ignore_ascii_case("signature") {
            continue;
        }
        merged
            .entry(name.as_str())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }

    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = merged
        .into_iter()
        .map(|(name, value)| (name.as_bytes().to_vec(), value.into_bytes()))
        .collect();
    entries.push((
        b":status".to_vec(),
        format!("{:03}", exchange.response_status).into_bytes(),
    ));
    entries
}

/// The exact bytes `params.sig` must sign.
pub fn signed_message(exchange: &Exchange, params: &SignatureParams) -> ExchangeResult<Vec<u8>> {
    let headers = canonical_headers(exchange)?;
    let validity_url = params.validity_url.as_deref().unwrap_or_default();

    let mut msg = Vec::with_capacity(
        PREAMBLE.len() + 128 + validity_url.len() + exchange.request_uri.len() + headers.len(),
    );
    msg.extend_from_slice(&PREAMBLE);
    msg.extend_from_slice(exchange.version.signature_context().as_bytes());
    msg.push(0x00);

    if params.cert_sha256.is_empty() {
        msg.push(0x00);
    } else {
        let len = u8::try_from(params.cert_sha256.len())
            .map_err(|_| ExchangeError::format("cert-sha256", "fingerprint too long"))?;
        msg.push(len);
        msg.extend_from_slice(&params.cert_sha256);
    }

    push_len_prefixed(&mut msg, validity_url.as_bytes());
    msg.extend_from_slice(&unix_seconds("date", params.date.timestamp())?.to_be_bytes());
    msg.extend_from_slice(&unix_seconds("expires", params.expires.timestamp())?.to_be_bytes());
    if exchange.version.has_framed_url() {
        push_len_prefixed(&mut msg, exchange.request_uri.as_bytes());
    }
    push_len_prefixed(&mut msg, &headers);

    Ok(msg)
}

fn push_len_prefixed(msg: &mut Vec<u8>, bytes: &[u8]) {
    msg.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    msg.extend_from_slice(bytes);
}

fn unix_seconds(field: &str, secs: i64) -> ExchangeResult<u64> {
    u64::try_from(secs).map_err(|_| ExchangeError::format(field, "must not be negative"))
}
