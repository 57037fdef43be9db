//! Checks applied to one signature set.
//!
//! Order:
//! - lifetime ceiling and validity-url origin (no I/O)
//! - certificate resolution, then the trust evaluator
//! - signature over the signed message
//! - signature and certificate time windows
//! - payload integrity
//!
//! The first failing check ends the set.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;
use url::Url;

use crate::config::VerifyConfig;
use crate::crypto::{verify_signature, SignatureAlgorithm};
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Exchange;
use crate::fetch::Fetcher;
use crate::payload::verify_payload;
use crate::resolver::{resolve, ResolvedCertificate};
use crate::signature::SignatureParams;
use crate::trust::TrustEvaluator;

pub(super) struct Context<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub trust: &'a dyn TrustEvaluator,
    pub cert_override: Option<&'a [u8]>,
    pub config: &'a VerifyConfig,
}

pub(super) struct SetOutcome {
    pub payload: Vec<u8>,
    pub algorithm: SignatureAlgorithm,
    pub certificate: ResolvedCertificate,
}

pub(super) fn verify_set(
    exchange: &Exchange,
    params: &SignatureParams,
    request_url: &Url,
    now: DateTime<Utc>,
    ctx: &Context<'_>,
) -> ExchangeResult<SetOutcome> {
    check_signature_lifetime(params, ctx.config)?;
    if ctx.config.enforce_validity_origin {
        check_validity_origin(params, request_url)?;
    }

    let certificate = resolve(params, request_url, ctx.cert_override, ctx.fetcher)?;
    ctx.trust.evaluate(&certificate.chain, now)?;

    let message = exchange.signed_message(params)?;
    let algorithm = verify_signature(certificate.leaf.public_key_der(), &message, &params.sig)?;
    debug!(label = %params.label, algorithm = %algorithm, "signature matches");

    check_signature_window(params, now, ctx.config)?;
    check_certificate_window(&certificate, now, ctx.config)?;

    let payload = verify_payload(exchange, &params.integrity)?;

    Ok(SetOutcome {
        payload,
        algorithm,
        certificate,
    })
}

fn check_signature_lifetime(params: &SignatureParams, config: &VerifyConfig) -> ExchangeResult<()> {
    if params.expires < params.date {
        return Err(ExchangeError::SignatureWindowInverted {
            date: params.date,
            expires: params.expires,
        });
    }
    let lifetime_secs = params.lifetime_secs();
    if lifetime_secs as u64 > config.max_signature_lifetime_secs {
        return Err(ExchangeError::SignatureTooLongLived {
            lifetime_secs,
            max_secs: config.max_signature_lifetime_secs,
        });
    }
    Ok(())
}

fn check_validity_origin(params: &SignatureParams, request_url: &Url) -> ExchangeResult<()> {
    let Some(validity_url) = &params.validity_url else {
        return Ok(());
    };
    let parsed = Url::parse(validity_url)
        .map_err(|e| ExchangeError::format("validity-url", format!("{validity_url:?}: {e}")))?;
    if parsed.origin() != request_url.origin() {
        return Err(ExchangeError::OriginMismatch {
            reason: format!(
                "validity-url {validity_url} is not same-origin with {request_url}"
            ),
        });
    }
    Ok(())
}

fn check_signature_window(
    params: &SignatureParams,
    now: DateTime<Utc>,
    config: &VerifyConfig,
) -> ExchangeResult<()> {
    let skew = i64::try_from(config.clock_skew_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    let earliest = params
        .date
        .checked_sub_signed(skew)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    if now < earliest {
        return Err(ExchangeError::SignatureNotYetValid {
            date: params.date,
            now,
        });
    }
    if now > params.expires {
        return Err(ExchangeError::SignatureExpired {
            expires: params.expires,
            now,
        });
    }
    Ok(())
}

/// Certificates issued from this date on are bound by the lifetime ceiling.
fn lifetime_rule_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 5, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn check_certificate_window(
    certificate: &ResolvedCertificate,
    now: DateTime<Utc>,
    config: &VerifyConfig,
) -> ExchangeResult<()> {
    let leaf = &certificate.leaf;
    if now < leaf.not_before() {
        return Err(ExchangeError::CertificateNotYetValid {
            not_before: leaf.not_before(),
            now,
        });
    }
    if now > leaf.not_after() {
        return Err(ExchangeError::CertificateExpired {
            not_after: leaf.not_after(),
            now,
        });
    }

    if leaf.not_before() >= lifetime_rule_start() {
        let lifetime_secs = (leaf.not_after() - leaf.not_before()).num_seconds();
        if lifetime_secs as u64 > config.max_certificate_lifetime_secs {
            return Err(ExchangeError::CertificateTooLongLived {
                lifetime_secs,
                max_secs: config.max_certificate_lifetime_secs,
            });
        }
    }
    Ok(())
}
