//! Certificate resolution.
//!
//! Resolves a signature set's certificate with the following priority:
//! 1. Override bytes supplied by the caller
//! 2. The fetcher, asked for `cert-url`
//!
//! The leaf is pinned by `cert-sha256` before any of its fields are read.

use std::fmt;

use tracing::debug;
use url::Url;

use crate::certchain::{CertificateChain, LeafCertificate};
use crate::digest::sha256;
use crate::error::{ExchangeError, ExchangeResult};
use crate::fetch::Fetcher;
use crate::signature::SignatureParams;

/// Resolved and leaf-checked certificate chain.
#[derive(Debug, Clone)]
pub struct ResolvedCertificate {
    pub chain: CertificateChain,

    /// Parsed leaf (first chain entry).
    pub leaf: LeafCertificate,

    /// Where the chain came from.
    pub source: CertificateSource,
}

/// Source of a resolved chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// Caller-supplied bytes.
    Override,

    /// Fetched from `cert-url`.
    Fetched(String),
}

impl fmt::Display for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Fetched(url) => write!(f, "fetched:{}", url),
        }
    }
}

/// Resolve the certificate for `params` and check that its leaf may sign
/// exchanges for `request_url`.
pub fn resolve(
    params: &SignatureParams,
    request_url: &Url,
    cert_override: Option<&[u8]>,
    fetcher: &dyn Fetcher,
) -> ExchangeResult<ResolvedCertificate> {
    let (bytes, source) = match cert_override {
        Some(bytes) => {
            debug!(label = %params.label, "using certificate override");
            (bytes.to_vec(), CertificateSource::Override)
        }
        None => {
            debug!(label = %params.label, url = %params.cert_url, "fetching certificate chain");
            (
                fetcher.fetch(&params.cert_url)?,
                CertificateSource::Fetched(params.cert_url.clone()),
            )
        }
    };

    let chain = CertificateChain::from_cbor(&bytes)?;

    let actual = sha256(&chain.leaf().cert);
    if actual.as_slice() != params.cert_sha256.as_slice() {
        return Err(ExchangeError::CertificateFingerprintMismatch {
            expected: hex::encode(&params.cert_sha256),
            actual: hex::encode(actual),
        });
    }

    let leaf = LeafCertificate::from_der(&chain.leaf().cert)?;
    if !leaf.can_sign_exchanges() {
        return Err(ExchangeError::CertificateMissingExtension);
    }

    let host = request_url.host_str().unwrap_or_default();
    if !leaf.matches_host(host) {
        return Err(ExchangeError::OriginMismatch {
            reason: format!(
                "certificate for {} does not cover host {host:?}",
                describe_names(&leaf)
            ),
        });
    }

    debug!(
        label = %params.label,
        source = %source,
        chain_len = chain.entries().len(),
        "certificate resolved"
    );
    Ok(ResolvedCertificate {
        chain,
        leaf,
        source,
    })
}

fn describe_names(leaf: &LeafCertificate) -> String {
    if leaf.dns_names().is_empty() {
        return match leaf.common_name() {
            Some(cn) => format!("CN={cn}"),
            None => "no names".to_string(),
        };
    }
    leaf.dns_names().join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorKind;
    use crate::fetch::StaticFetcher;
    use crate::testkit::{signing_time, TestCertificate};

    fn params_for(cert: &TestCertificate) -> SignatureParams {
        SignatureParams {
            label: "sig".into(),
            sig: vec![0; 8],
            integrity: "digest/mi-sha256-03".into(),
            cert_url: "https://example.com/cert.cbor".into(),
            cert_sha256: cert.fingerprint().to_vec(),
            validity_url: None,
            date: signing_time(),
            expires: signing_time(),
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_fetches_cert_url() {
        let cert = TestCertificate::p256("example.com");
        let fetcher = StaticFetcher::new()
            .with_route("https://example.com/cert.cbor", cert.chain_cbor());
        let resolved = resolve(
            &params_for(&cert),
            &url("https://example.com/page"),
            None,
            &fetcher,
        )
        .unwrap();
        assert_eq!(
            resolved.source,
            CertificateSource::Fetched("https://example.com/cert.cbor".into())
        );
        assert_eq!(resolved.leaf.fingerprint(), &cert.fingerprint());
    }

    #[test]
    fn test_override_skips_fetcher() {
        let cert = TestCertificate::p256("example.com");
        let calls = AtomicUsize::new(0);
        let fetcher = |_: &str| -> ExchangeResult<Vec<u8>> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        };
        let chain = cert.chain_cbor();
        let resolved = resolve(
            &params_for(&cert),
            &url("https://example.com/"),
            Some(&chain),
            &fetcher,
        )
        .unwrap();
        assert_eq!(resolved.source, CertificateSource::Override);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fingerprint_checked_before_leaf_is_parsed() {
        let cert = TestCertificate::p256("example.com");
        let mut params = params_for(&cert);
        params.cert_sha256 = vec![0; 32];

        let err = resolve(
            &params,
            &url("https://example.com/"),
            Some(&cert.chain_cbor()),
            &StaticFetcher::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::CertificateFingerprintMismatch { .. }
        ));
    }

    #[test]
    fn test_missing_extension() {
        let cert = TestCertificate::builder("example.com")
            .can_sign_exchanges(false)
            .build();
        let err = resolve(
            &params_for(&cert),
            &url("https://example.com/"),
            Some(&cert.chain_cbor()),
            &StaticFetcher::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExchangeError::CertificateMissingExtension));
    }

    #[test]
    fn test_wrong_host() {
        let cert = TestCertificate::p256("example.com");
        let err = resolve(
            &params_for(&cert),
            &url("https://example.org/"),
            Some(&cert.chain_cbor()),
            &StaticFetcher::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Certificate);
        assert!(err.to_string().contains("example.org"));
    }

    #[test]
    fn test_fetch_failure_propagates() {
        let cert = TestCertificate::p256("example.com");
        let err = resolve(
            &params_for(&cert),
            &url("https://example.com/"),
            None,
            &StaticFetcher::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }
}
