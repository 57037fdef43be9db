//! Reader and verifier for Signed HTTP Exchanges (`application/signed-exchange`).
//!
//! This crate provides:
//!
//! - Decoding of the b1, b2 and b3 binary formats and their CBOR header blocks
//! - Parsing of the `Signature` header into parameter sets
//! - Reconstruction of the signed message from the exchange's current fields
//! - Certificate chain resolution (`application/cert-chain+cbor`) and leaf checks
//! - ECDSA P-256 / P-384 signature verification
//! - Merkle Integrity (`mi-sha256`) payload decoding
//!
//! # Quick Start
//!
//! ```no_run
//! use sxg_verify::{Exchange, FetchConfig, HttpFetcher};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("page.sxg")?;
//! let exchange = Exchange::from_bytes(&bytes)?;
//!
//! let fetcher = HttpFetcher::for_certificates(&FetchConfig::from_env())?;
//! let verified = exchange.verify(chrono::Utc::now(), &fetcher, None)?;
//! println!("valid signature {:?}, {} payload bytes", verified.label, verified.payload.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `SXG_MAX_SIGNATURE_LIFETIME_SECS` | Longest accepted `expires - date` (default: 604800) |
//! | `SXG_CLOCK_SKEW_SECS` | Tolerance applied to the signing date (default: 0) |
//! | `SXG_MAX_CERT_LIFETIME_SECS` | Longest leaf validity for certificates issued after 2019-05-01 (default: 7776000) |
//! | `SXG_ENFORCE_VALIDITY_ORIGIN` | Require `validity-url` to be same-origin (default: true) |
//! | `SXG_FETCH_TIMEOUT` | HTTP timeout in seconds (default: 30) |
//! | `SXG_FETCH_MAX_BYTES` | HTTP response size limit (default: 16 MiB) |

mod cbor;
pub mod canonical;
pub mod certchain;
pub mod config;
pub mod crypto;
mod digest;
pub mod error;
pub mod exchange;
pub mod fetch;
pub mod framing;
pub mod headers;
pub mod mice;
pub mod payload;
pub mod resolver;
pub mod signature;
pub mod trust;
pub mod verify;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod testkit;

// Re-export main types
pub use certchain::{CertificateChain, ChainEntry, LeafCertificate};
pub use config::{FetchConfig, VerifyConfig};
pub use crypto::SignatureAlgorithm;
pub use digest::fingerprint_hex;
pub use error::{ErrorKind, ExchangeError, ExchangeResult, SetFailure};
pub use exchange::Exchange;
pub use fetch::{Fetcher, HttpFetcher, StaticFetcher};
pub use mice::MiEncoding;
pub use resolver::{CertificateSource, ResolvedCertificate};
pub use signature::SignatureParams;
pub use trust::{AcceptAnyChain, PinnedRoots, TrustEvaluator};
pub use verify::{verify_exchange, Verified, VerifiedSummary, Verifier};
pub use version::Version;
