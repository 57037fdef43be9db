//! Payload digest verification.

use tracing::debug;

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Exchange;
use crate::mice::{self, MiEncoding};

/// Check the payload against the proof declared in the signed headers and
/// return it with the MI record framing stripped.
///
/// `integrity` is the signature set's `integrity` parameter; it must name the
/// scheme of the exchange's version.
pub fn verify_payload(exchange: &Exchange, integrity: &str) -> ExchangeResult<Vec<u8>> {
    let expected_integrity = exchange.version.integrity_identifier();
    if integrity != expected_integrity {
        return Err(ExchangeError::UnsupportedDigest {
            scheme: integrity.to_string(),
        });
    }

    let encoding = exchange.version.mi_encoding();
    check_content_encoding(exchange, encoding)?;
    let proof = declared_proof(exchange, encoding)?;

    let mut decoded = Vec::with_capacity(exchange.payload.len());
    let len = mice::decode(exchange.payload.as_slice(), &mut decoded, &proof)?;
    debug!(
        encoded_len = exchange.payload.len(),
        decoded_len = len,
        "payload integrity verified"
    );
    Ok(decoded)
}

/// MI must be the last content coding applied.
fn check_content_encoding(exchange: &Exchange, encoding: MiEncoding) -> ExchangeResult<()> {
    let last = exchange
        .header_values("content-encoding")
        .flat_map(|v| v.split(','))
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .last();

    match last {
        Some(coding) if coding == encoding.coding() => Ok(()),
        Some(coding) => Err(ExchangeError::integrity(format!(
            "content-encoding must end with {}, found {coding}",
            encoding.coding()
        ))),
        None => Err(ExchangeError::integrity(format!(
            "content-encoding {} is missing",
            encoding.coding()
        ))),
    }
}

fn declared_proof(exchange: &Exchange, encoding: MiEncoding) -> ExchangeResult<[u8; 32]> {
    let mut other_algorithms = Vec::new();

    for entry in exchange
        .header_values(encoding.digest_header())
        .flat_map(|v| v.split(','))
    {
        let Some((alg, value)) = entry.split_once('=') else {
            continue;
        };
        let alg = alg.trim().to_ascii_lowercase();
        if alg == encoding.coding() {
            return encoding.decode_proof(value.trim());
        }
        other_algorithms.push(alg);
    }

    if other_algorithms.is_empty() {
        return Err(ExchangeError::integrity(format!(
            "no {} header declares an {} proof",
            encoding.digest_header(),
            encoding.coding()
        )));
    }
    Err(ExchangeError::UnsupportedDigest {
        scheme: other_algorithms.join(","),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testkit::ExchangeBuilder;
    use crate::version::Version;

    const BODY: &[u8] = b"hello, exchange";

    #[test]
    fn test_decodes_declared_proof() {
        let ex = ExchangeBuilder::new("https://example.com/")
            .payload(BODY)
            .record_size(4)
            .build();
        assert_eq!(verify_payload(&ex, "digest/mi-sha256-03").unwrap(), BODY);
    }

    #[test]
    fn test_b1_uses_mi_header() {
        let ex = ExchangeBuilder::new("https://example.com/")
            .version(Version::B1)
            .payload(BODY)
            .build();
        assert!(ex.header("mi").is_some());
        assert!(ex.header("digest").is_none());
        assert_eq!(verify_payload(&ex, "mi-draft2").unwrap(), BODY);
    }

    #[test]
    fn test_proof_is_picked_from_digest_list() {
        let mut ex = ExchangeBuilder::new("https://example.com/")
            .payload(BODY)
            .build();
        for (name, value) in &mut ex.response_headers {
            if name == "digest" {
                *value = format!("SHA-256=abc, {value}");
            }
        }
        assert_eq!(verify_payload(&ex, "digest/mi-sha256-03").unwrap(), BODY);
    }

    #[test]
    fn test_wrong_proof_is_integrity_error() {
        let mut ex = ExchangeBuilder::new("https://example.com/")
            .payload(BODY)
            .build();
        let other = ExchangeBuilder::new("https://example.com/")
            .payload(b"something else")
            .build();
        ex.response_headers = other.response_headers;
        let err = verify_payload(&ex, "digest/mi-sha256-03").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_content_encoding_must_end_with_mi() {
        let ex = ExchangeBuilder::new("https://example.com/")
            .payload(BODY)
            .header("content-encoding", "gzip")
            .build();
        // Builder appends the MI coding after user headers, so it is last.
        assert!(verify_payload(&ex, "digest/mi-sha256-03").is_ok());

        let mut reordered = ex.clone();
        reordered
            .response_headers
            .push(("content-encoding".into(), "br".into()));
        let err = verify_payload(&reordered, "digest/mi-sha256-03").unwrap_err();
        assert!(err.to_string().contains("found br"));
    }

    #[test]
    fn test_missing_digest_header() {
        let ex = ExchangeBuilder::new("https://example.com/")
            .integrity_headers(false)
            .header("content-encoding", "mi-sha256-03")
            .payload(BODY)
            .build();
        let err = verify_payload(&ex, "digest/mi-sha256-03").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_foreign_integrity_identifier() {
        let ex = ExchangeBuilder::new("https://example.com/")
            .payload(BODY)
            .build();
        let err = verify_payload(&ex, "digest/sha-256").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDigest);
    }
}
