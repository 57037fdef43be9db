//! Strict CBOR helpers shared by the header and certificate-chain decoders,
//! plus the canonical (RFC 7049 §3.9) map encoder used for signing.
//!
//! Decoding helpers report problems as plain strings; callers attach the
//! error kind that fits their context.

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

/// Definite-length map header.
pub(crate) fn map_len(dec: &mut Decoder<'_>) -> Result<u64, String> {
    match dec.datatype().map_err(|e| e.to_string())? {
        Type::Map => dec
            .map()
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "indefinite-length map".to_string()),
        Type::MapIndef => Err("indefinite-length map".to_string()),
        other => Err(format!("expected map, found {other}")),
    }
}

/// Definite-length array header.
pub(crate) fn array_len(dec: &mut Decoder<'_>) -> Result<u64, String> {
    match dec.datatype().map_err(|e| e.to_string())? {
        Type::Array => dec
            .array()
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "indefinite-length array".to_string()),
        Type::ArrayIndef => Err("indefinite-length array".to_string()),
        other => Err(format!("expected array, found {other}")),
    }
}

/// Definite-length byte string.
pub(crate) fn bytes<'b>(dec: &mut Decoder<'b>) -> Result<&'b [u8], String> {
    match dec.datatype().map_err(|e| e.to_string())? {
        Type::Bytes => dec.bytes().map_err(|e| e.to_string()),
        Type::BytesIndef => Err("indefinite-length byte string".to_string()),
        other => Err(format!("expected byte string, found {other}")),
    }
}

/// Definite-length text string.
pub(crate) fn text<'b>(dec: &mut Decoder<'b>) -> Result<&'b str, String> {
    match dec.datatype().map_err(|e| e.to_string())? {
        Type::String => dec.str().map_err(|e| e.to_string()),
        Type::StringIndef => Err("indefinite-length text string".to_string()),
        other => Err(format!("expected text string, found {other}")),
    }
}

/// Fails when input remains after the top-level item.
pub(crate) fn expect_end(dec: &Decoder<'_>) -> Result<(), String> {
    let trailing = dec.input().len().saturating_sub(dec.position());
    if trailing > 0 {
        return Err(format!("{trailing} trailing bytes after CBOR item"));
    }
    Ok(())
}

/// Sort key/value pairs into canonical order: shorter encoded keys first,
/// then bytewise. For byte-string keys the encoded length grows with the
/// key length, so `(len, bytes)` ordering is the encoded-byte ordering.
pub(crate) fn sort_canonical(entries: &mut [(Vec<u8>, Vec<u8>)]) {
    entries.sort_by(|(ka, va), (kb, vb)| {
        ka.len()
            .cmp(&kb.len())
            .then_with(|| ka.cmp(kb))
            .then_with(|| va.cmp(vb))
    });
}

/// Write a byte-string → byte-string map in canonical order.
pub(crate) fn write_bytes_map(
    enc: &mut Encoder<Vec<u8>>,
    mut entries: Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<(), String> {
    sort_canonical(&mut entries);
    enc.map(entries.len() as u64).map_err(|e| e.to_string())?;
    for (key, value) in &entries {
        enc.bytes(key).map_err(|e| e.to_string())?;
        enc.bytes(value).map_err(|e| e.to_string())?;
    }
    Ok(())
}
