//! Merkle Integrity (`mi-sha256`) content coding.
//!
//! ```text
//! payload = be64(rs) | r0 | p1 | r1 | p2 | ... | r(n-1)
//! p(i)    = sha256(r(i) | p(i+1) | 0x01)   for non-final records
//! p(n-1)  = sha256(r(n-1) | 0x00)
//! ```
//!
//! Every record is exactly `rs` bytes except the last, which holds 1..=rs
//! bytes. The top proof `p0` comes from the response headers; an empty
//! payload has `p0 = sha256(0x00)`. Decoding is streaming: at most one record
//! plus its trailing proof is buffered, and a record is written out only
//! after its proof checks.

use std::io::{self, Read, Write};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::digest::{sha256_parts, SHA256_LEN};
use crate::error::{ExchangeError, ExchangeResult};

const FINAL_RECORD: &[u8] = &[0x00];
const CHAINED_RECORD: &[u8] = &[0x01];

/// MI draft revision, selected by the exchange version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiEncoding {
    /// `mi-sha256-draft2`, declared in an `mi` header.
    Draft02,
    /// `mi-sha256-03`, declared in a `digest` header.
    Draft03,
}

impl MiEncoding {
    /// Token used in `content-encoding` and as the digest algorithm name.
    pub fn coding(self) -> &'static str {
        match self {
            Self::Draft02 => "mi-sha256-draft2",
            Self::Draft03 => "mi-sha256-03",
        }
    }

    /// Header carrying the top-level proof.
    pub fn digest_header(self) -> &'static str {
        match self {
            Self::Draft02 => "mi",
            Self::Draft03 => "digest",
        }
    }

    pub fn encode_proof(self, proof: &[u8]) -> String {
        match self {
            Self::Draft02 => URL_SAFE_NO_PAD.encode(proof),
            Self::Draft03 => STANDARD.encode(proof),
        }
    }

    pub fn decode_proof(self, text: &str) -> ExchangeResult<[u8; SHA256_LEN]> {
        let decoded = match self {
            Self::Draft02 => URL_SAFE_NO_PAD.decode(text.trim_end_matches('=')),
            Self::Draft03 => STANDARD.decode(text),
        }
        .map_err(|e| ExchangeError::integrity(format!("invalid {} value: {e}", self.coding())))?;

        <[u8; SHA256_LEN]>::try_from(decoded.as_slice()).map_err(|_| {
            ExchangeError::integrity(format!(
                "{} value must be {SHA256_LEN} bytes, found {}",
                self.coding(),
                decoded.len()
            ))
        })
    }
}

/// MI-encode `payload` with records of `record_size` bytes. Returns the
/// encoded stream and its top-level proof.
pub fn encode(payload: &[u8], record_size: usize) -> ExchangeResult<(Vec<u8>, [u8; SHA256_LEN])> {
    if record_size == 0 {
        return Err(ExchangeError::integrity("record size must be positive"));
    }

    let mut out = Vec::with_capacity(8 + payload.len() + payload.len() / record_size * SHA256_LEN);
    out.extend_from_slice(&(record_size as u64).to_be_bytes());
    if payload.is_empty() {
        return Ok((out, sha256_parts(&[FINAL_RECORD])));
    }

    // Proofs chain backwards from the last record.
    let records: Vec<&[u8]> = payload.chunks(record_size).collect();
    let mut proofs = vec![[0_u8; SHA256_LEN]; records.len()];
    let last = records.len() - 1;
    proofs[last] = sha256_parts(&[records[last], FINAL_RECORD]);
    for i in (0..last).rev() {
        proofs[i] = sha256_parts(&[records[i], proofs[i + 1].as_slice(), CHAINED_RECORD]);
    }

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(&proofs[i]);
        }
        out.extend_from_slice(record);
    }
    Ok((out, proofs[0]))
}

/// Decode an MI-coded stream into `writer`, checking every record against
/// the proof chain rooted at `top_proof`. Returns the decoded length.
pub fn decode<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    top_proof: &[u8; SHA256_LEN],
) -> ExchangeResult<u64> {
    let mut rs_bytes = [0_u8; 8];
    reader.read_exact(&mut rs_bytes).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ExchangeError::integrity("payload lacks a record size"),
        _ => ExchangeError::from(e),
    })?;
    let record_size = u64::from_be_bytes(rs_bytes);
    if record_size == 0 {
        return Err(ExchangeError::integrity("record size must be positive"));
    }

    // One record, its proof, and one byte of look-ahead to tell a full
    // non-final record from a final one.
    let window = record_size
        .checked_add(SHA256_LEN as u64 + 1)
        .ok_or_else(|| ExchangeError::integrity("record size out of range"))?;

    let mut expected = *top_proof;
    let mut buf: Vec<u8> = Vec::new();
    let mut written = 0_u64;
    let mut index = 0_u64;

    loop {
        let want = window - buf.len() as u64;
        reader.by_ref().take(want).read_to_end(&mut buf)?;

        if (buf.len() as u64) < window {
            if buf.len() as u64 > record_size {
                return Err(ExchangeError::integrity(format!(
                    "record {index} is followed by a truncated proof"
                )));
            }
            if sha256_parts(&[buf.as_slice(), FINAL_RECORD]) != expected {
                return Err(ExchangeError::integrity(format!(
                    "record {index} does not match its proof"
                )));
            }
            writer.write_all(&buf)?;
            written += buf.len() as u64;
            return Ok(written);
        }

        let rs = usize::try_from(record_size)
            .map_err(|_| ExchangeError::integrity("record size out of range"))?;
        let (record, rest) = buf.split_at(rs);
        let mut next = [0_u8; SHA256_LEN];
        next.copy_from_slice(&rest[..SHA256_LEN]);

        if sha256_parts(&[record, next.as_slice(), CHAINED_RECORD]) != expected {
            return Err(ExchangeError::integrity(format!(
                "record {index} does not match its proof"
            )));
        }
        writer.write_all(record)?;
        written += rs as u64;
        expected = next;
        buf.drain(..rs + SHA256_LEN);
        index += 1;
    }
}
