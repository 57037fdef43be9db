//! Verification outcome, rendered as text or JSON.

use std::io::{self, Write};

use serde::Serialize;
use sxg_verify::{ErrorKind, Exchange, ExchangeError, SetFailure, Verified, VerifiedSummary};

use crate::exit_codes;

pub const VALID_SIGNATURE: &str = "The exchange has a valid signature.";

#[derive(Debug, Serialize)]
pub struct FailureEntry {
    pub label: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SetFailure> for FailureEntry {
    fn from(failure: &SetFailure) -> Self {
        Self {
            label: failure.label.clone(),
            kind: failure.error.kind(),
            message: failure.error.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerificationReport {
    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<VerifiedSummary>,

    /// Rejected signature sets, in declaration order.
    pub failures: Vec<FailureEntry>,

    /// Error that stopped verification before any set was tried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub exit_code: i32,
}

impl VerificationReport {
    pub fn from_result(result: &Result<Verified, ExchangeError>) -> Self {
        match result {
            Ok(verified) => Self {
                valid: true,
                verified: Some(verified.summary()),
                failures: verified.failures.iter().map(FailureEntry::from).collect(),
                error: None,
                exit_code: exit_codes::SUCCESS,
            },
            Err(err) => Self {
                valid: false,
                verified: None,
                failures: err.set_failures().iter().map(FailureEntry::from).collect(),
                error: match err {
                    ExchangeError::VerificationFailed { .. } => None,
                    other => Some(other.to_string()),
                },
                exit_code: exit_codes::for_exchange_error(err),
            },
        }
    }

    /// One line per rejected set, then the verdict.
    pub fn write_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for failure in &self.failures {
            writeln!(w, "{}: {}", failure.label, failure.message)?;
        }
        if let Some(error) = &self.error {
            writeln!(w, "{error}")?;
        }
        if self.valid {
            writeln!(w, "{VALID_SIGNATURE}")?;
        }
        Ok(())
    }
}

/// Everything `--json` prints.
#[derive(Debug, Serialize)]
pub struct DumpReport {
    pub version: String,
    pub request_method: String,
    pub request_uri: String,
    pub response_status: u16,
    pub response_headers: Vec<(String, String)>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_integrity: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    pub payload_len: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

impl DumpReport {
    pub fn new(exchange: &Exchange) -> Self {
        Self {
            version: exchange.version.to_string(),
            request_method: exchange.request_method.clone(),
            request_uri: exchange.request_uri.clone(),
            response_status: exchange.response_status,
            response_headers: exchange.response_headers.clone(),
            header_integrity: exchange.header_integrity().ok(),
            signature: None,
            payload_len: exchange.payload.len(),
            payload: None,
            verification: None,
        }
    }
}
