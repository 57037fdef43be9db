//! Exchange verification.
//!
//! This module is the public facade; the per-set checks live in
//! `policy.rs`. Signature sets are tried in declaration order and the first
//! set that passes every check wins. Failures of the sets tried before it
//! are kept for diagnostics.

mod policy;
#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::VerifyConfig;
use crate::crypto::SignatureAlgorithm;
use crate::error::{ExchangeError, ExchangeResult, SetFailure};
use crate::exchange::Exchange;
use crate::fetch::Fetcher;
use crate::resolver::CertificateSource;
use crate::trust::{AcceptAnyChain, TrustEvaluator};

/// Outcome of a successful verification.
#[derive(Debug)]
pub struct Verified {
    /// Label of the winning signature set.
    pub label: String,

    /// Payload with the integrity framing removed.
    pub payload: Vec<u8>,

    /// Sets rejected before the winner, in declaration order.
    pub failures: Vec<SetFailure>,

    pub algorithm: SignatureAlgorithm,

    /// `cert-url` of the winning set.
    pub cert_url: String,

    pub certificate_source: CertificateSource,

    /// SHA-256 fingerprint of the winning leaf, hex.
    pub certificate_fingerprint: String,
}

/// Summary of a verification for reports.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedSummary {
    pub label: String,
    pub algorithm: SignatureAlgorithm,
    pub cert_url: String,
    pub certificate_fingerprint: String,
    pub payload_len: usize,
}

impl Verified {
    pub fn summary(&self) -> VerifiedSummary {
        VerifiedSummary {
            label: self.label.clone(),
            algorithm: self.algorithm,
            cert_url: self.cert_url.clone(),
            certificate_fingerprint: self.certificate_fingerprint.clone(),
            payload_len: self.payload.len(),
        }
    }
}

/// Configurable verifier.
///
/// ```no_run
/// use sxg_verify::{Exchange, HttpFetcher, FetchConfig, Verifier, VerifyConfig};
///
/// # fn example(bytes: &[u8]) -> Result<(), sxg_verify::ExchangeError> {
/// let exchange = Exchange::from_bytes(bytes)?;
/// let fetcher = HttpFetcher::for_certificates(&FetchConfig::from_env())?;
/// let verified = Verifier::new(&fetcher)
///     .with_config(VerifyConfig::from_env())
///     .verify(&exchange, chrono::Utc::now())?;
/// println!("verified by {}", verified.label);
/// # Ok(())
/// # }
/// ```
pub struct Verifier<'a> {
    fetcher: &'a dyn Fetcher,
    trust: &'a dyn TrustEvaluator,
    cert_override: Option<&'a [u8]>,
    config: VerifyConfig,
}

impl<'a> Verifier<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self {
            fetcher,
            trust: &AcceptAnyChain,
            cert_override: None,
            config: VerifyConfig::default(),
        }
    }

    pub fn with_trust(mut self, trust: &'a dyn TrustEvaluator) -> Self {
        self.trust = trust;
        self
    }

    /// Use these chain bytes instead of fetching `cert-url`.
    pub fn with_certificate_override(mut self, chain: Option<&'a [u8]>) -> Self {
        self.cert_override = chain;
        self
    }

    pub fn with_config(mut self, config: VerifyConfig) -> Self {
        self.config = config;
        self
    }

    /// Verify `exchange` at time `now`.
    ///
    /// Malformed signature headers and request URLs fail immediately with a
    /// format error. Otherwise every set is tried until one passes; if none
    /// does the result is [`ExchangeError::VerificationFailed`].
    pub fn verify(&self, exchange: &Exchange, now: DateTime<Utc>) -> ExchangeResult<Verified> {
        let sets = exchange.signatures()?;
        let request_url = exchange.request_url()?;

        let ctx = policy::Context {
            fetcher: self.fetcher,
            trust: self.trust,
            cert_override: self.cert_override,
            config: &self.config,
        };

        let mut failures = Vec::new();
        for params in &sets {
            match policy::verify_set(exchange, params, &request_url, now, &ctx) {
                Ok(outcome) => {
                    info!(
                        label = %params.label,
                        url = %exchange.request_uri,
                        algorithm = %outcome.algorithm,
                        rejected = failures.len(),
                        "signature set verified"
                    );
                    return Ok(Verified {
                        label: params.label.clone(),
                        payload: outcome.payload,
                        failures,
                        algorithm: outcome.algorithm,
                        cert_url: params.cert_url.clone(),
                        certificate_source: outcome.certificate.source,
                        certificate_fingerprint: hex::encode(outcome.certificate.leaf.fingerprint()),
                    });
                }
                Err(error) => {
                    warn!(label = %params.label, error = %error, "signature set rejected");
                    failures.push(SetFailure {
                        label: params.label.clone(),
                        error,
                    });
                }
            }
        }

        Err(ExchangeError::VerificationFailed { failures })
    }
}

/// Verify `exchange` at `now` with the default policy and trust evaluator.
pub fn verify_exchange(
    exchange: &Exchange,
    now: DateTime<Utc>,
    fetcher: &dyn Fetcher,
    cert_override: Option<&[u8]>,
) -> ExchangeResult<Verified> {
    Verifier::new(fetcher)
        .with_certificate_override(cert_override)
        .verify(exchange, now)
}
