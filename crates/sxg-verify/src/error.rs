//! Error types for exchange parsing and verification.

use std::fmt;

use chrono::{DateTime, Utc};

/// Exchange errors.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Malformed framing, header block or signature header.
    #[error("format error in {field}: {reason}")]
    Format { field: String, reason: String },

    /// I/O failure while reading the exchange stream.
    #[error("i/o error: {message}")]
    Io { message: String },

    /// Fetching an exchange or certificate chain failed.
    #[error("fetch of {url} failed: {message}")]
    Fetch { url: String, message: String },

    /// Certificate chain container could not be decoded.
    #[error("invalid certificate chain: {reason}")]
    CertificateChain { reason: String },

    /// Leaf certificate does not match the pinned `cert-sha256`.
    #[error("certificate fingerprint mismatch: expected {expected}, got {actual}")]
    CertificateFingerprintMismatch { expected: String, actual: String },

    /// Leaf certificate lacks the CanSignHttpExchanges extension.
    #[error("certificate lacks the CanSignHttpExchanges extension")]
    CertificateMissingExtension,

    /// Leaf certificate (or validity URL) does not bind to the request origin.
    #[error("origin mismatch: {reason}")]
    OriginMismatch { reason: String },

    /// The trust evaluator rejected the chain.
    #[error("certificate chain not trusted: {reason}")]
    Untrusted { reason: String },

    /// `expires - date` exceeds the configured signature lifetime.
    #[error("signature lifetime of {lifetime_secs}s exceeds the {max_secs}s ceiling")]
    SignatureTooLongLived { lifetime_secs: i64, max_secs: u64 },

    /// `expires` precedes `date`.
    #[error("signature expires ({expires}) before it was signed ({date})")]
    SignatureWindowInverted {
        date: DateTime<Utc>,
        expires: DateTime<Utc>,
    },

    /// Verification time precedes the signing date.
    #[error("signature not yet valid: signed at {date}, now {now}")]
    SignatureNotYetValid {
        date: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Verification time is past the signature expiry.
    #[error("signature expired at {expires}, now {now}")]
    SignatureExpired {
        expires: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Verification time precedes the leaf's notBefore.
    #[error("certificate not valid before {not_before}, now {now}")]
    CertificateNotYetValid {
        not_before: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Verification time is past the leaf's notAfter.
    #[error("certificate expired at {not_after}, now {now}")]
    CertificateExpired {
        not_after: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Leaf validity period exceeds the maximum certificate lifetime.
    #[error("certificate validity period of {lifetime_secs}s exceeds the {max_secs}s ceiling")]
    CertificateTooLongLived { lifetime_secs: i64, max_secs: u64 },

    /// Signature does not verify over the signed message.
    #[error("signature verification failed: {reason}")]
    Crypto { reason: String },

    /// Payload does not match its declared integrity proof.
    #[error("payload integrity check failed: {reason}")]
    Integrity { reason: String },

    /// Integrity scheme this engine does not implement.
    #[error("unsupported digest scheme: {scheme}")]
    UnsupportedDigest { scheme: String },

    /// Public key or signature algorithm this engine does not implement.
    #[error("unsupported signature algorithm: {reason}")]
    UnsupportedAlgorithm { reason: String },

    /// No signature set passed.
    #[error("no signature set verified ({})", FailureList(.failures))]
    VerificationFailed { failures: Vec<SetFailure> },
}

/// Coarse classification of [`ExchangeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    Io,
    Fetch,
    Certificate,
    Temporal,
    Crypto,
    Integrity,
    UnsupportedDigest,
    UnsupportedAlgorithm,
    Verification,
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } => ErrorKind::Format,
            Self::Io { .. } => ErrorKind::Io,
            Self::Fetch { .. } => ErrorKind::Fetch,

            Self::CertificateChain { .. }
            | Self::CertificateFingerprintMismatch { .. }
            | Self::CertificateMissingExtension
            | Self::OriginMismatch { .. }
            | Self::Untrusted { .. } => ErrorKind::Certificate,

            Self::SignatureTooLongLived { .. }
            | Self::SignatureWindowInverted { .. }
            | Self::SignatureNotYetValid { .. }
            | Self::SignatureExpired { .. }
            | Self::CertificateNotYetValid { .. }
            | Self::CertificateExpired { .. }
            | Self::CertificateTooLongLived { .. } => ErrorKind::Temporal,

            Self::Crypto { .. } => ErrorKind::Crypto,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::UnsupportedDigest { .. } => ErrorKind::UnsupportedDigest,
            Self::UnsupportedAlgorithm { .. } => ErrorKind::UnsupportedAlgorithm,
            Self::VerificationFailed { .. } => ErrorKind::Verification,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            // Input problems
            ErrorKind::Format => 1,
            ErrorKind::Io => 1,

            // Network/transient
            ErrorKind::Fetch => 5,

            // Security failures
            ErrorKind::Certificate
            | ErrorKind::Temporal
            | ErrorKind::Crypto
            | ErrorKind::Integrity
            | ErrorKind::Verification => 4,

            // Valid input this engine cannot check
            ErrorKind::UnsupportedDigest | ErrorKind::UnsupportedAlgorithm => 6,
        }
    }

    /// Whether retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Io { .. })
    }

    /// Per-set failures carried by [`ExchangeError::VerificationFailed`].
    pub fn set_failures(&self) -> &[SetFailure] {
        match self {
            Self::VerificationFailed { failures } => failures,
            _ => &[],
        }
    }

    pub(crate) fn format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn integrity(reason: impl Into<String>) -> Self {
        Self::Integrity {
            reason: reason.into(),
        }
    }

    pub(crate) fn crypto(reason: impl Into<String>) -> Self {
        Self::Crypto {
            reason: reason.into(),
        }
    }

    pub(crate) fn chain(reason: impl Into<String>) -> Self {
        Self::CertificateChain {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Why one signature set was rejected.
#[derive(Debug)]
pub struct SetFailure {
    /// Label of the rejected set.
    pub label: String,

    /// First check the set failed.
    pub error: ExchangeError,
}

impl fmt::Display for SetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

struct FailureList<'a>(&'a [SetFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no signature sets");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
