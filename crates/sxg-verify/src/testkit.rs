//! Builders for certificates and signed exchanges in tests.
//!
//! Available to this crate's tests and, through the `test-support` feature,
//! to downstream test suites. Everything here panics on failure.

use chrono::{DateTime, Duration, TimeZone, Utc};
use minicbor::Encoder;
use rcgen::{
    date_time_ymd, CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair,
    PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384,
};

use crate::certchain::{CertificateChain, ChainEntry};
use crate::digest::{sha256, SHA256_LEN};
use crate::exchange::Exchange;
use crate::framing::Frame;
use crate::mice;
use crate::signature::SignatureParams;
use crate::version::Version;

/// CanSignHttpExchanges, as OID arcs.
const CAN_SIGN_OID_ARCS: &[u64] = &[1, 3, 6, 1, 4, 1, 11129, 2, 1, 22];

/// Signing date used by [`ExchangeBuilder`]: 2024-02-01T00:00:00Z.
pub fn signing_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
}

/// A time inside both the default signature and certificate windows.
pub fn verification_time() -> DateTime<Utc> {
    signing_time() + Duration::hours(12)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    P256,
    P384,
}

/// Self-signed leaf certificate with its private key.
#[derive(Debug, Clone)]
pub struct TestCertificate {
    pub der: Vec<u8>,
    pub key_pkcs8: Vec<u8>,
    pub curve: Curve,
}

impl TestCertificate {
    /// P-256 certificate for `host`, valid 2024-01-01 to 2024-03-01.
    pub fn p256(host: &str) -> Self {
        Self::builder(host).build()
    }

    pub fn builder(host: &str) -> TestCertificateBuilder {
        TestCertificateBuilder {
            host: host.to_string(),
            curve: Curve::P256,
            can_sign_exchanges: true,
            with_san: true,
            not_before: (2024, 1, 1),
            not_after: (2024, 3, 1),
        }
    }

    pub fn fingerprint(&self) -> [u8; SHA256_LEN] {
        sha256(&self.der)
    }

    /// Single-entry `application/cert-chain+cbor`.
    pub fn chain_cbor(&self) -> Vec<u8> {
        CertificateChain::new(vec![ChainEntry {
            cert: self.der.clone(),
            ocsp: Some(b"ocsp".to_vec()),
            sct: None,
        }])
        .unwrap()
        .to_cbor()
        .unwrap()
    }

    /// DER ECDSA signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use p256::ecdsa::signature::Signer;
        use p256::pkcs8::DecodePrivateKey;

        match self.curve {
            Curve::P256 => {
                let key = p256::ecdsa::SigningKey::from_pkcs8_der(&self.key_pkcs8).unwrap();
                let sig: p256::ecdsa::Signature = key.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
            Curve::P384 => {
                let key = p384::ecdsa::SigningKey::from_pkcs8_der(&self.key_pkcs8).unwrap();
                let sig: p384::ecdsa::Signature = key.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
        }
    }
}

pub struct TestCertificateBuilder {
    host: String,
    curve: Curve,
    can_sign_exchanges: bool,
    with_san: bool,
    not_before: (i32, u8, u8),
    not_after: (i32, u8, u8),
}

impl TestCertificateBuilder {
    pub fn curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    pub fn can_sign_exchanges(mut self, yes: bool) -> Self {
        self.can_sign_exchanges = yes;
        self
    }

    /// Leave out the subjectAltName so only the CN names the host.
    pub fn without_san(mut self) -> Self {
        self.with_san = false;
        self
    }

    /// Validity period as `(year, month, day)` dates.
    pub fn validity(mut self, not_before: (i32, u8, u8), not_after: (i32, u8, u8)) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn build(self) -> TestCertificate {
        let names = if self.with_san {
            vec![self.host.clone()]
        } else {
            Vec::new()
        };
        let mut params = CertificateParams::new(names).expect("certificate params");
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.host.as_str());
        params.distinguished_name = dn;
        params.not_before = date_time_ymd(self.not_before.0, self.not_before.1, self.not_before.2);
        params.not_after = date_time_ymd(self.not_after.0, self.not_after.1, self.not_after.2);
        if self.can_sign_exchanges {
            params
                .custom_extensions
                .push(CustomExtension::from_oid_content(CAN_SIGN_OID_ARCS, vec![0x05, 0x00]));
        }

        let alg = match self.curve {
            Curve::P256 => &PKCS_ECDSA_P256_SHA256,
            Curve::P384 => &PKCS_ECDSA_P384_SHA384,
        };
        let key = KeyPair::generate_for(alg).expect("key generation");
        let cert = params.self_signed(&key).expect("self-signed certificate");

        TestCertificate {
            der: cert.der().to_vec(),
            key_pkcs8: key.serialize_der(),
            curve: self.curve,
        }
    }
}

/// One signature set to attach to a built exchange.
#[derive(Debug, Clone)]
pub struct SignatureSpec {
    pub label: String,
    pub cert: TestCertificate,
    pub cert_url: String,
    pub validity_url: Option<String>,
    pub date: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    /// Defaults to the version's identifier.
    pub integrity: Option<String>,
}

impl SignatureSpec {
    /// Set signed at [`signing_time`], expiring a day later.
    pub fn new(label: &str, cert: &TestCertificate) -> Self {
        Self {
            label: label.to_string(),
            cert: cert.clone(),
            cert_url: "https://example.com/cert.cbor".to_string(),
            validity_url: Some("https://example.com/resource.validity".to_string()),
            date: signing_time(),
            expires: signing_time() + Duration::days(1),
            integrity: None,
        }
    }

    pub fn window(mut self, date: DateTime<Utc>, expires: DateTime<Utc>) -> Self {
        self.date = date;
        self.expires = expires;
        self
    }
}

/// Builds signed exchanges.
///
/// The payload is MI-encoded and the matching `content-encoding` and digest
/// headers are added unless [`ExchangeBuilder::integrity_headers`] turns
/// that off.
#[derive(Debug, Clone)]
pub struct ExchangeBuilder {
    version: Version,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    payload: Vec<u8>,
    record_size: usize,
    integrity_headers: bool,
    signatures: Vec<SignatureSpec>,
}

impl ExchangeBuilder {
    pub fn new(url: &str) -> Self {
        Self {
            version: Version::B3,
            url: url.to_string(),
            status: 200,
            headers: Vec::new(),
            payload: Vec::new(),
            record_size: 16,
            integrity_headers: true,
            signatures: Vec::new(),
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn record_size(mut self, record_size: usize) -> Self {
        self.record_size = record_size;
        self
    }

    /// When false the payload is stored as given and no integrity headers
    /// are added.
    pub fn integrity_headers(mut self, yes: bool) -> Self {
        self.integrity_headers = yes;
        self
    }

    pub fn sign(self, label: &str, cert: &TestCertificate) -> Self {
        self.sign_with(SignatureSpec::new(label, cert))
    }

    pub fn sign_with(mut self, spec: SignatureSpec) -> Self {
        self.signatures.push(spec);
        self
    }

    pub fn build(&self) -> Exchange {
        let mut headers = self.headers.clone();
        let payload = if self.integrity_headers {
            let encoding = self.version.mi_encoding();
            let (encoded, proof) = mice::encode(&self.payload, self.record_size).unwrap();
            headers.push(("content-encoding".into(), encoding.coding().into()));
            headers.push((
                encoding.digest_header().into(),
                format!("{}={}", encoding.coding(), encoding.encode_proof(&proof)),
            ));
            encoded
        } else {
            self.payload.clone()
        };

        let mut exchange = Exchange {
            version: self.version,
            request_method: "GET".into(),
            request_uri: self.url.clone(),
            response_status: self.status,
            response_headers: headers,
            signature: String::new(),
            payload,
        };

        let sets: Vec<String> = self
            .signatures
            .iter()
            .map(|spec| signed_params(&exchange, spec).to_string())
            .collect();
        exchange.signature = sets.join(", ");
        exchange
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_exchange(&self.build())
    }
}

fn signed_params(exchange: &Exchange, spec: &SignatureSpec) -> SignatureParams {
    let mut params = SignatureParams {
        label: spec.label.clone(),
        sig: Vec::new(),
        integrity: spec
            .integrity
            .clone()
            .unwrap_or_else(|| exchange.version.integrity_identifier().to_string()),
        cert_url: spec.cert_url.clone(),
        cert_sha256: spec.cert.fingerprint().to_vec(),
        validity_url: spec.validity_url.clone(),
        date: spec.date,
        expires: spec.expires,
    };
    let message = exchange.signed_message(&params).unwrap();
    params.sig = spec.cert.sign(&message);
    params
}

/// Serialize `exchange` into the binary format, header map in declaration
/// order.
pub fn encode_exchange(exchange: &Exchange) -> Vec<u8> {
    let mut enc = Encoder::new(Vec::new());
    if !exchange.version.has_framed_url() {
        enc.array(2).unwrap();
        enc.map(2).unwrap();
        enc.bytes(b":method").unwrap();
        enc.bytes(exchange.request_method.as_bytes()).unwrap();
        enc.bytes(b":url").unwrap();
        enc.bytes(exchange.request_uri.as_bytes()).unwrap();
    }
    enc.map(exchange.response_headers.len() as u64 + 1).unwrap();
    enc.bytes(b":status").unwrap();
    enc.bytes(exchange.response_status.to_string().as_bytes())
        .unwrap();
    for (name, value) in &exchange.response_headers {
        enc.bytes(name.as_bytes()).unwrap();
        enc.bytes(value.as_bytes()).unwrap();
    }

    Frame {
        version: exchange.version,
        fallback_url: exchange
            .version
            .has_framed_url()
            .then(|| exchange.request_uri.clone()),
        signature: exchange.signature.clone(),
        header_block: enc.into_writer(),
        payload: exchange.payload.clone(),
    }
    .to_bytes()
    .unwrap()
}
