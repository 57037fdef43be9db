//! `application/cert-chain+cbor` decoding and leaf certificate inspection.
//!
//! ```text
//! [ "📜⛓", { "cert": bstr, "ocsp": bstr, "sct": bstr }, { "cert": bstr }, ... ]
//! ```
//!
//! The first certificate is the leaf.

use chrono::{DateTime, Utc};
use minicbor::{Decoder, Encoder};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::cbor;
use crate::digest::{sha256, SHA256_LEN};
use crate::error::{ExchangeError, ExchangeResult};

/// First element of every chain container.
pub const CHAIN_MAGIC: &str = "\u{1F4DC}\u{26D3}";

/// CanSignHttpExchanges extension.
pub const CAN_SIGN_HTTP_EXCHANGES_OID: &str = "1.3.6.1.4.1.11129.2.1.22";

/// One certificate with its side data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    /// DER-encoded certificate.
    pub cert: Vec<u8>,
    pub ocsp: Option<Vec<u8>>,
    pub sct: Option<Vec<u8>>,
}

/// Ordered certificate chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    entries: Vec<ChainEntry>,
}

impl CertificateChain {
    pub fn new(entries: Vec<ChainEntry>) -> ExchangeResult<Self> {
        if entries.is_empty() {
            return Err(ExchangeError::chain("chain holds no certificates"));
        }
        Ok(Self { entries })
    }

    pub fn from_cbor(bytes: &[u8]) -> ExchangeResult<Self> {
        let mut dec = Decoder::new(bytes);
        let len = cbor::array_len(&mut dec).map_err(ExchangeError::chain)?;
        if len < 2 {
            return Err(ExchangeError::chain("chain holds no certificates"));
        }

        let magic = cbor::text(&mut dec).map_err(ExchangeError::chain)?;
        if magic != CHAIN_MAGIC {
            return Err(ExchangeError::chain(format!(
                "unexpected chain magic {magic:?}"
            )));
        }

        let mut entries = Vec::new();
        for index in 1..len {
            entries.push(decode_entry(&mut dec, index)?);
        }
        cbor::expect_end(&dec).map_err(ExchangeError::chain)?;

        Self::new(entries)
    }

    pub fn to_cbor(&self) -> ExchangeResult<Vec<u8>> {
        let mut enc = Encoder::new(Vec::new());
        write_chain(&mut enc, &self.entries).map_err(ExchangeError::chain)?;
        Ok(enc.into_writer())
    }

    pub fn leaf(&self) -> &ChainEntry {
        &self.entries[0]
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }
}

fn decode_entry(dec: &mut Decoder<'_>, index: u64) -> ExchangeResult<ChainEntry> {
    let context = |e: String| ExchangeError::chain(format!("entry {index}: {e}"));
    let len = cbor::map_len(dec).map_err(context)?;

    let mut cert = None;
    let mut ocsp = None;
    let mut sct = None;
    for _ in 0..len {
        let key = cbor::text(dec).map_err(context)?;
        let slot = match key {
            "cert" => &mut cert,
            "ocsp" => &mut ocsp,
            "sct" => &mut sct,
            other => {
                return Err(context(format!("unexpected key {other:?}")));
            }
        };
        let value = cbor::bytes(dec).map_err(context)?.to_vec();
        if slot.replace(value).is_some() {
            return Err(context(format!("duplicate key {key:?}")));
        }
    }

    let cert = cert.ok_or_else(|| context("missing \"cert\"".to_string()))?;
    Ok(ChainEntry { cert, ocsp, sct })
}

fn write_chain(enc: &mut Encoder<Vec<u8>>, entries: &[ChainEntry]) -> Result<(), String> {
    enc.array(entries.len() as u64 + 1)
        .and_then(|e| e.str(CHAIN_MAGIC))
        .map_err(|e| e.to_string())?;
    for entry in entries {
        let fields = 1 + u64::from(entry.ocsp.is_some()) + u64::from(entry.sct.is_some());
        // Canonical key order: "sct" < "cert" < "ocsp".
        enc.map(fields).map_err(|e| e.to_string())?;
        if let Some(sct) = &entry.sct {
            enc.str("sct").and_then(|e| e.bytes(sct)).map_err(|e| e.to_string())?;
        }
        enc.str("cert")
            .and_then(|e| e.bytes(&entry.cert))
            .map_err(|e| e.to_string())?;
        if let Some(ocsp) = &entry.ocsp {
            enc.str("ocsp").and_then(|e| e.bytes(ocsp)).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

/// Fields of the leaf certificate the verifier relies on.
#[derive(Debug, Clone)]
pub struct LeafCertificate {
    fingerprint: [u8; SHA256_LEN],
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    dns_names: Vec<String>,
    common_name: Option<String>,
    can_sign_exchanges: bool,
    public_key_der: Vec<u8>,
}

impl LeafCertificate {
    pub fn from_der(der: &[u8]) -> ExchangeResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ExchangeError::chain(format!("leaf certificate: {e}")))?;

        let validity = cert.validity();
        let not_before = asn1_time(validity.not_before.timestamp())?;
        let not_after = asn1_time(validity.not_after.timestamp())?;

        let dns_names = cert
            .subject_alternative_name()
            .map_err(|e| ExchangeError::chain(format!("subjectAltName: {e}")))?
            .map(|san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_ascii_lowercase()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_ascii_lowercase);

        let can_sign_exchanges = cert
            .extensions()
            .iter()
            .any(|ext| ext.oid.to_id_string() == CAN_SIGN_HTTP_EXCHANGES_OID);

        Ok(Self {
            fingerprint: sha256(der),
            not_before,
            not_after,
            dns_names,
            common_name,
            can_sign_exchanges,
            public_key_der: cert.public_key().raw.to_vec(),
        })
    }

    pub fn fingerprint(&self) -> &[u8; SHA256_LEN] {
        &self.fingerprint
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn can_sign_exchanges(&self) -> bool {
        self.can_sign_exchanges
    }

    /// DER SubjectPublicKeyInfo.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Whether the certificate is valid for `host`. Subject alternative
    /// names take precedence; the subject CN is consulted only when the
    /// certificate has none. A wildcard covers exactly one label.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if self.dns_names.is_empty() {
            return self
                .common_name
                .as_deref()
                .is_some_and(|cn| name_matches(cn, &host));
        }
        self.dns_names.iter().any(|name| name_matches(name, &host))
    }
}

fn name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix),
        None => pattern == host,
    }
}

fn asn1_time(ts: i64) -> ExchangeResult<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| ExchangeError::chain(format!("certificate time {ts} out of range")))
}
