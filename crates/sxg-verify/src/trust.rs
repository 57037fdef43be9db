//! Chain-of-trust evaluation.
//!
//! The verifier itself only pins the leaf by fingerprint and checks its
//! extension and origin. Anything beyond that (path building, root stores)
//! plugs in here. Evaluators see every chain after the leaf checks pass.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::certchain::CertificateChain;
use crate::digest::{sha256, SHA256_LEN};
use crate::error::{ExchangeError, ExchangeResult};

/// Decides whether a certificate chain is trusted.
pub trait TrustEvaluator: Send + Sync {
    fn evaluate(&self, chain: &CertificateChain, now: DateTime<Utc>) -> ExchangeResult<()>;
}

/// Trusts every chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyChain;

impl TrustEvaluator for AcceptAnyChain {
    fn evaluate(&self, _chain: &CertificateChain, _now: DateTime<Utc>) -> ExchangeResult<()> {
        Ok(())
    }
}

/// Trusts chains containing at least one pinned certificate.
#[derive(Debug, Clone, Default)]
pub struct PinnedRoots {
    pins: BTreeSet<[u8; SHA256_LEN]>,
}

impl PinnedRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a DER certificate.
    pub fn add_der(&mut self, der: &[u8]) {
        self.pins.insert(sha256(der));
    }

    /// Pin a hex SHA-256 fingerprint (colons allowed).
    pub fn add_fingerprint_hex(&mut self, fingerprint: &str) -> ExchangeResult<()> {
        let cleaned: String = fingerprint.chars().filter(|c| *c != ':').collect();
        let bytes = hex::decode(&cleaned).map_err(|e| ExchangeError::Untrusted {
            reason: format!("invalid pinned fingerprint {fingerprint:?}: {e}"),
        })?;
        let pin = <[u8; SHA256_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
            ExchangeError::Untrusted {
                reason: format!("pinned fingerprint {fingerprint:?} is not {SHA256_LEN} bytes"),
            }
        })?;
        self.pins.insert(pin);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl TrustEvaluator for PinnedRoots {
    fn evaluate(&self, chain: &CertificateChain, _now: DateTime<Utc>) -> ExchangeResult<()> {
        for (depth, entry) in chain.entries().iter().enumerate() {
            if self.pins.contains(&sha256(&entry.cert)) {
                debug!(depth, "chain anchored at pinned certificate");
                return Ok(());
            }
        }
        Err(ExchangeError::Untrusted {
            reason: format!(
                "none of {} certificates is pinned ({} pins)",
                chain.entries().len(),
                self.pins.len()
            ),
        })
    }
}
