//! Parser for the `Signature` header value.
//!
//! ```text
//! sig1; sig=*MEUCIQ...*; integrity="digest/mi-sha256-03";
//!       cert-url="https://example.com/cert.cbor"; cert-sha256=*W7uB...*;
//!       validity-url="https://example.com/resource.validity"; date=1511128380; expires=1511733180,
//! sig2; ...
//! ```
//!
//! Byte sequences are accepted with either `*...*` or `:...:` delimiters and
//! with or without base64 padding. Unknown parameters are skipped; a missing
//! required parameter is reported by name.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{ExchangeError, ExchangeResult};
use crate::framing::parse_https_url;

const FIELD: &str = "signature";

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One signature parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub label: String,

    /// DER-encoded ECDSA signature.
    pub sig: Vec<u8>,

    /// Integrity scheme identifier, e.g. `digest/mi-sha256-03`.
    pub integrity: String,

    pub cert_url: String,

    /// SHA-256 of the leaf certificate's DER.
    pub cert_sha256: Vec<u8>,

    /// Absent validity URLs are signed as the empty string.
    pub validity_url: Option<String>,

    pub date: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl SignatureParams {
    /// `expires - date`, in seconds.
    pub fn lifetime_secs(&self) -> i64 {
        self.expires.timestamp() - self.date.timestamp()
    }
}

impl fmt::Display for SignatureParams {
    /// Serializes back into header syntax (b3 byte-sequence form).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};sig=*{}*;integrity={};cert-url={};cert-sha256=*{}*",
            self.label,
            base64::engine::general_purpose::STANDARD.encode(&self.sig),
            quote(&self.integrity),
            quote(&self.cert_url),
            base64::engine::general_purpose::STANDARD.encode(&self.cert_sha256),
        )?;
        if let Some(validity_url) = &self.validity_url {
            write!(f, ";validity-url={}", quote(validity_url))?;
        }
        write!(
            f,
            ";date={};expires={}",
            self.date.timestamp(),
            self.expires.timestamp()
        )
    }
}

/// Parse every parameter set in declaration order.
pub fn parse_signatures(text: &str) -> ExchangeResult<Vec<SignatureParams>> {
    let mut cursor = Cursor::new(text);
    let mut sets = Vec::new();

    cursor.skip_ows();
    if cursor.at_end() {
        return Err(ExchangeError::format(FIELD, "signature header is empty"));
    }

    loop {
        sets.push(parse_set(&mut cursor)?);
        cursor.skip_ows();
        if cursor.at_end() {
            break;
        }
        cursor.expect(',')?;
        cursor.skip_ows();
    }

    Ok(sets)
}

#[derive(Debug)]
enum Value {
    Token,
    Text(String),
    Bytes(Vec<u8>),
    Integer(i64),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Text(_) => "string",
            Self::Bytes(_) => "byte sequence",
            Self::Integer(_) => "integer",
        }
    }
}

#[derive(Default)]
struct RawSet {
    sig: Option<Vec<u8>>,
    integrity: Option<String>,
    cert_url: Option<String>,
    cert_sha256: Option<Vec<u8>>,
    validity_url: Option<String>,
    date: Option<i64>,
    expires: Option<i64>,
}

fn parse_set(cursor: &mut Cursor<'_>) -> ExchangeResult<SignatureParams> {
    let label = cursor.token()?;
    let mut raw = RawSet::default();
    let mut seen: Vec<String> = Vec::new();

    loop {
        cursor.skip_ows();
        if !cursor.eat(';') {
            break;
        }
        cursor.skip_ows();
        let key = cursor.key()?;
        if seen.contains(&key) {
            return Err(ExchangeError::format(
                FIELD,
                format!("duplicate parameter {key:?} in set {label:?}"),
            ));
        }
        let value = if cursor.eat('=') {
            cursor.value()?
        } else {
            Value::Token
        };

        match key.as_str() {
            "sig" => raw.sig = Some(expect_bytes(&key, value)?),
            "integrity" => raw.integrity = Some(expect_text(&key, value)?),
            "cert-url" => raw.cert_url = Some(expect_text(&key, value)?),
            "cert-sha256" => raw.cert_sha256 = Some(expect_bytes(&key, value)?),
            "validity-url" => raw.validity_url = Some(expect_text(&key, value)?),
            "date" => raw.date = Some(expect_integer(&key, value)?),
            "expires" => raw.expires = Some(expect_integer(&key, value)?),
            _ => {}
        }
        seen.push(key);
    }

    let sig = required(raw.sig, "sig", &label)?;
    let integrity = required(raw.integrity, "integrity", &label)?;
    let cert_url = required(raw.cert_url, "cert-url", &label)?;
    let cert_sha256 = required(raw.cert_sha256, "cert-sha256", &label)?;
    let date = required(raw.date, "date", &label)?;
    let expires = required(raw.expires, "expires", &label)?;

    parse_https_url(&cert_url, "cert-url")?;
    if let Some(validity_url) = &raw.validity_url {
        Url::parse(validity_url).map_err(|e| {
            ExchangeError::format("validity-url", format!("{validity_url:?}: {e}"))
        })?;
    }
    if cert_sha256.len() != 32 {
        return Err(ExchangeError::format(
            "cert-sha256",
            format!("expected 32 bytes, found {}", cert_sha256.len()),
        ));
    }

    Ok(SignatureParams {
        label,
        sig,
        integrity,
        cert_url,
        cert_sha256,
        validity_url: raw.validity_url,
        date: timestamp("date", date)?,
        expires: timestamp("expires", expires)?,
    })
}

fn required<T>(value: Option<T>, key: &str, label: &str) -> ExchangeResult<T> {
    value.ok_or_else(|| {
        ExchangeError::format(
            key,
            format!("required parameter missing from signature set {label:?}"),
        )
    })
}

fn expect_bytes(key: &str, value: Value) -> ExchangeResult<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b),
        other => Err(type_mismatch(key, "byte sequence", &other)),
    }
}

fn expect_text(key: &str, value: Value) -> ExchangeResult<String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(type_mismatch(key, "string", &other)),
    }
}

fn expect_integer(key: &str, value: Value) -> ExchangeResult<i64> {
    match value {
        Value::Integer(n) => Ok(n),
        other => Err(type_mismatch(key, "integer", &other)),
    }
}

fn type_mismatch(key: &str, expected: &str, found: &Value) -> ExchangeError {
    ExchangeError::format(
        key,
        format!("expected {expected}, found {}", found.type_name()),
    )
}

fn timestamp(key: &str, secs: i64) -> ExchangeResult<DateTime<Utc>> {
    if secs < 0 {
        return Err(ExchangeError::format(key, "must not be negative"));
    }
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ExchangeError::format(key, format!("{secs} is out of range")))
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> ExchangeResult<()> {
        if self.eat(expected) {
            return Ok(());
        }
        Err(self.error(format!("expected {expected:?}")))
    }

    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    /// Set label.
    fn token(&mut self) -> ExchangeResult<String> {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '*' => {}
            _ => return Err(self.error("expected a label token")),
        }
        let token = self.take_while(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '%' | '*' | '/')
        });
        Ok(token.to_string())
    }

    /// Parameter key.
    fn key(&mut self) -> ExchangeResult<String> {
        match self.peek() {
            Some(c) if c.is_ascii_lowercase() || c == '*' => {}
            _ => return Err(self.error("expected a parameter key")),
        }
        let key = self.take_while(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.' | '*')
        });
        Ok(key.to_string())
    }

    fn value(&mut self) -> ExchangeResult<Value> {
        match self.peek() {
            Some('"') => self.text().map(Value::Text),
            Some(delim @ ('*' | ':')) => self.bytes(delim).map(Value::Bytes),
            Some(c) if c == '-' || c.is_ascii_digit() => self.integer().map(Value::Integer),
            Some(c) if c.is_ascii_alphabetic() => self.token().map(|_| Value::Token),
            _ => Err(self.error("expected a parameter value")),
        }
    }

    fn text(&mut self) -> ExchangeResult<String> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => out.push(c),
                    _ => return Err(self.error("invalid escape in string")),
                },
                Some(c) if (' '..='~').contains(&c) => out.push(c),
                Some(_) => return Err(self.error("invalid character in string")),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn bytes(&mut self, delim: char) -> ExchangeResult<Vec<u8>> {
        self.expect(delim)?;
        let encoded =
            self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='));
        if !self.eat(delim) {
            return Err(self.error("unterminated byte sequence"));
        }
        LENIENT_BASE64
            .decode(encoded)
            .map_err(|e| self.error(format!("invalid base64: {e}")))
    }

    fn integer(&mut self) -> ExchangeResult<i64> {
        let start = self.pos;
        self.eat('-');
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() || digits.len() > 15 {
            return Err(self.error("invalid integer"));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error("invalid integer"))
    }

    fn error(&self, reason: impl Into<String>) -> ExchangeError {
        ExchangeError::format(FIELD, format!("{} at offset {}", reason.into(), self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SIG_B64: &str = "MEUCIQDXlI2gN3RNBlgFiuRNFpZXcDIaUpX6HIEwcZEc0cZYLAIga9DsVOMM+g5YpwEBdGW3sS+bvnmAJJiSMwhuBdqp5UY=";
    const FP_B64: &str = "W7uB969dFW3Mb5ZefPS9Tq5ZbH5iSmOILpjv2qEArmI=";

    fn header(extra: &str) -> String {
        format!(
            "sig1; sig=*{SIG_B64}*; integrity=\"digest/mi-sha256-03\"; \
             cert-url=\"https://example.com/cert.cbor\"; cert-sha256=*{FP_B64}*; \
             validity-url=\"https://example.com/resource.validity\"; \
             date=1511128380; expires=1511733180{extra}"
        )
    }

    #[test]
    fn test_parses_single_set() {
        let sets = parse_signatures(&header("")).unwrap();
        assert_eq!(sets.len(), 1);
        let set = &sets[0];
        assert_eq!(set.label, "sig1");
        assert_eq!(set.integrity, "digest/mi-sha256-03");
        assert_eq!(set.cert_url, "https://example.com/cert.cbor");
        assert_eq!(set.cert_sha256.len(), 32);
        assert_eq!(
            set.validity_url.as_deref(),
            Some("https://example.com/resource.validity")
        );
        assert_eq!(set.date.timestamp(), 1511128380);
        assert_eq!(set.expires.timestamp(), 1511733180);
        assert_eq!(set.lifetime_secs(), 604800);
    }

    #[test]
    fn test_parses_multiple_sets_in_order() {
        let text = format!("{}, {}", header(""), header("").replace("sig1", "sig2"));
        let labels: Vec<_> = parse_signatures(&text)
            .unwrap()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, ["sig1", "sig2"]);
    }

    #[test]
    fn test_accepts_colon_byte_sequences_and_missing_padding() {
        let text = header("")
            .replace(&format!("*{SIG_B64}*"), &format!(":{SIG_B64}:"))
            .replace(&format!("*{FP_B64}*"), &format!("*{}*", FP_B64.trim_end_matches('=')));
        let sets = parse_signatures(&text).unwrap();
        assert_eq!(sets[0].cert_sha256.len(), 32);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let sets = parse_signatures(&header(";future-key=\"x\";flag;n=7")).unwrap();
        assert_eq!(sets[0].label, "sig1");
    }

    #[test]
    fn test_missing_required_key_is_named() {
        for key in ["sig", "integrity", "cert-url", "cert-sha256", "date", "expires"] {
            let text = header("")
                .split(';')
                .filter(|part| !part.trim_start().starts_with(&format!("{key}=")))
                .collect::<Vec<_>>()
                .join(";");
            let err = parse_signatures(&text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format);
            match err {
                ExchangeError::Format { field, .. } => assert_eq!(field, key),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_validity_url_is_optional() {
        let text = header("").replace(
            "validity-url=\"https://example.com/resource.validity\"; ",
            "",
        );
        let sets = parse_signatures(&text).unwrap();
        assert_eq!(sets[0].validity_url, None);
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = parse_signatures(&header(";date=1")).unwrap_err();
        assert!(err.to_string().contains("duplicate parameter"));
    }

    #[test]
    fn test_wrong_value_type_rejected() {
        let text = header("").replace("date=1511128380", "date=\"1511128380\"");
        let err = parse_signatures(&text).unwrap_err();
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn test_token_and_bare_values_report_token_type() {
        let text = header("").replace("date=1511128380", "date=today");
        let err = parse_signatures(&text).unwrap_err();
        assert!(err.to_string().contains("expected integer, found token"), "{err}");

        let text = header("").replace("date=1511128380", "date");
        let err = parse_signatures(&text).unwrap_err();
        assert!(err.to_string().contains("expected integer, found token"), "{err}");
    }

    #[test]
    fn test_rejects_short_fingerprint_and_bad_urls() {
        let text = header("").replace(FP_B64, "AAAA");
        assert!(parse_signatures(&text).unwrap_err().to_string().contains("32 bytes"));

        let text = header("").replace("https://example.com/cert.cbor", "http://example.com/c");
        assert!(parse_signatures(&text).is_err());
    }

    #[test]
    fn test_rejects_empty_and_garbage() {
        assert!(parse_signatures("").is_err());
        assert!(parse_signatures("   ").is_err());
        assert!(parse_signatures("sig1; sig=*AAA").is_err());
        assert!(parse_signatures(&format!("{},", header(""))).is_err());
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let set = parse_signatures(&header("")).unwrap().remove(0);
        let reparsed = parse_signatures(&set.to_string()).unwrap().remove(0);
        assert_eq!(set, reparsed);
    }
}
