//! Binary framing of `application/signed-exchange`.
//!
//! ```text
//! b2/b3: magic(8) | len2(url) | url | len3(sig) | len3(headers) | sig | headers | payload
//! b1:    magic(8) |                   len3(sig) | len3(headers) | sig | headers | payload
//! ```
//!
//! All lengths are big-endian. The payload is whatever follows the header
//! block. Short reads inside a declared length are reported as format errors
//! naming the field; any other read failure is an I/O error.

use std::io::{self, Read};

use tracing::debug;
use url::Url;

use crate::error::{ExchangeError, ExchangeResult};
use crate::version::{Version, MAGIC_LEN};

/// Largest accepted signature header value.
pub const MAX_SIGNATURE_LEN: usize = 16 * 1024;

/// Largest accepted CBOR header block.
pub const MAX_HEADER_BLOCK_LEN: usize = 512 * 1024;

/// The undecoded sections of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: Version,

    /// Fallback (request) URL; `None` for b1, which carries it in the header block.
    pub fallback_url: Option<String>,

    /// Raw signature header text.
    pub signature: String,

    /// CBOR-encoded header block.
    pub header_block: Vec<u8>,

    /// Payload bytes, still in their integrity encoding.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encode the sections back into an exchange stream.
    pub fn to_bytes(&self) -> ExchangeResult<Vec<u8>> {
        let mut out = Vec::with_capacity(
            MAGIC_LEN + 8 + self.signature.len() + self.header_block.len() + self.payload.len(),
        );
        out.extend_from_slice(self.version.magic());
        if self.version.has_framed_url() {
            let url = self.fallback_url.as_deref().unwrap_or_default();
            push_length(&mut out, url.len(), 2, "fallback url length")?;
            out.extend_from_slice(url.as_bytes());
        }
        push_length(&mut out, self.signature.len(), 3, "signature length")?;
        push_length(&mut out, self.header_block.len(), 3, "header block length")?;
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.header_block);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Split an exchange stream into its sections.
pub fn read_frame<R: Read>(mut reader: R) -> ExchangeResult<Frame> {
    let magic = read_exact_field(&mut reader, MAGIC_LEN, "magic")?;
    let version = Version::from_magic(&magic).ok_or_else(|| {
        ExchangeError::format(
            "magic",
            format!(
                "unrecognized magic {:?}",
                String::from_utf8_lossy(&magic).trim_end_matches('\0')
            ),
        )
    })?;

    let fallback_url = if version.has_framed_url() {
        let len = read_length(&mut reader, 2, "fallback url length")?;
        let raw = read_exact_field(&mut reader, len, "fallback url")?;
        let url = String::from_utf8(raw)
            .map_err(|_| ExchangeError::format("fallback url", "not valid UTF-8"))?;
        parse_https_url(&url, "fallback url")?;
        Some(url)
    } else {
        None
    };

    let sig_len = read_length(&mut reader, 3, "signature length")?;
    if sig_len == 0 {
        return Err(ExchangeError::format(
            "signature length",
            "exchange carries no signature",
        ));
    }
    if sig_len > MAX_SIGNATURE_LEN {
        return Err(ExchangeError::format(
            "signature length",
            format!("{sig_len} bytes exceeds the {MAX_SIGNATURE_LEN} byte limit"),
        ));
    }

    let header_len = read_length(&mut reader, 3, "header block length")?;
    if header_len > MAX_HEADER_BLOCK_LEN {
        return Err(ExchangeError::format(
            "header block length",
            format!("{header_len} bytes exceeds the {MAX_HEADER_BLOCK_LEN} byte limit"),
        ));
    }

    let signature = read_exact_field(&mut reader, sig_len, "signature")?;
    let signature = String::from_utf8(signature)
        .map_err(|_| ExchangeError::format("signature", "not valid UTF-8"))?;

    let header_block = read_exact_field(&mut reader, header_len, "header block")?;

    let mut payload = Vec::new();
    reader.read_to_end(&mut payload)?;

    debug!(
        version = %version,
        signature_len = sig_len,
        header_len,
        payload_len = payload.len(),
        "decoded exchange frame"
    );

    Ok(Frame {
        version,
        fallback_url,
        signature,
        header_block,
        payload,
    })
}

/// Parse `raw` as an absolute `https` URL.
pub(crate) fn parse_https_url(raw: &str, field: &str) -> ExchangeResult<Url> {
    let url =
        Url::parse(raw).map_err(|e| ExchangeError::format(field, format!("{raw:?}: {e}")))?;
    if url.scheme() != "https" {
        return Err(ExchangeError::format(
            field,
            format!("{raw:?} is not an https URL"),
        ));
    }
    Ok(url)
}

fn push_length(out: &mut Vec<u8>, len: usize, width: usize, field: &str) -> ExchangeResult<()> {
    if width < 8 && len >> (width * 8) != 0 {
        return Err(ExchangeError::format(
            field,
            format!("{len} does not fit in {width} bytes"),
        ));
    }
    out.extend_from_slice(&(len as u64).to_be_bytes()[8 - width..]);
    Ok(())
}

fn read_length<R: Read>(reader: &mut R, width: usize, field: &str) -> ExchangeResult<usize> {
    let bytes = read_exact_field(reader, width, field)?;
    Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
}

fn read_exact_field<R: Read>(reader: &mut R, len: usize, field: &str) -> ExchangeResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            ExchangeError::format(field, format!("truncated: expected {len} bytes"))
        }
        _ => ExchangeError::from(e),
    })?;
    Ok(buf)
}
