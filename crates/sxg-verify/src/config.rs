//! Verification policy and fetch configuration.

use serde::{Deserialize, Serialize};

/// Policy knobs for signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Longest accepted `expires - date`, in seconds.
    #[serde(default = "default_max_signature_lifetime")]
    pub max_signature_lifetime_secs: u64,

    /// Tolerance applied to the signing date, in seconds.
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// Longest accepted leaf validity period, in seconds.
    #[serde(default = "default_max_certificate_lifetime")]
    pub max_certificate_lifetime_secs: u64,

    /// Require `validity-url` to share the request URL's origin.
    #[serde(default = "default_true")]
    pub enforce_validity_origin: bool,
}

fn default_max_signature_lifetime() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_certificate_lifetime() -> u64 {
    90 * 24 * 60 * 60
}

fn default_true() -> bool {
    true
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_signature_lifetime_secs: default_max_signature_lifetime(),
            clock_skew_secs: 0,
            max_certificate_lifetime_secs: default_max_certificate_lifetime(),
            enforce_validity_origin: default_true(),
        }
    }
}

impl VerifyConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SXG_MAX_SIGNATURE_LIFETIME_SECS` | Signature lifetime ceiling (default: 604800) |
    /// | `SXG_CLOCK_SKEW_SECS` | Signing-date tolerance (default: 0) |
    /// | `SXG_MAX_CERT_LIFETIME_SECS` | Certificate lifetime ceiling (default: 7776000) |
    /// | `SXG_ENFORCE_VALIDITY_ORIGIN` | Same-origin check for `validity-url` (default: true) |
    pub fn from_env() -> Self {
        Self {
            max_signature_lifetime_secs: env_parse("SXG_MAX_SIGNATURE_LIFETIME_SECS")
                .unwrap_or_else(default_max_signature_lifetime),
            clock_skew_secs: env_parse("SXG_CLOCK_SKEW_SECS").unwrap_or(0),
            max_certificate_lifetime_secs: env_parse("SXG_MAX_CERT_LIFETIME_SECS")
                .unwrap_or_else(default_max_certificate_lifetime),
            enforce_validity_origin: std::env::var("SXG_ENFORCE_VALIDITY_ORIGIN")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(true),
        }
    }

    pub fn with_clock_skew_secs(mut self, secs: u64) -> Self {
        self.clock_skew_secs = secs;
        self
    }

    pub fn with_max_signature_lifetime_secs(mut self, secs: u64) -> Self {
        self.max_signature_lifetime_secs = secs;
        self
    }

    pub fn with_max_certificate_lifetime_secs(mut self, secs: u64) -> Self {
        self.max_certificate_lifetime_secs = secs;
        self
    }

    pub fn with_enforce_validity_origin(mut self, enforce: bool) -> Self {
        self.enforce_validity_origin = enforce;
        self
    }
}

/// HTTP fetch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Largest accepted response body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> u64 {
    16 * 1024 * 1024
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl FetchConfig {
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SXG_FETCH_TIMEOUT` | Request timeout in seconds (default: 30) |
    /// | `SXG_FETCH_MAX_BYTES` | Response size limit (default: 16 MiB) |
    pub fn from_env() -> Self {
        Self {
            timeout_secs: env_parse("SXG_FETCH_TIMEOUT").unwrap_or_else(default_timeout),
            max_body_bytes: env_parse("SXG_FETCH_MAX_BYTES")
                .unwrap_or_else(default_max_body_bytes),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_body_bytes(mut self, bytes: u64) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

fn env_parse(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const VARS: &[&str] = &[
        "SXG_MAX_SIGNATURE_LIFETIME_SECS",
        "SXG_CLOCK_SKEW_SECS",
        "SXG_MAX_CERT_LIFETIME_SECS",
        "SXG_ENFORCE_VALIDITY_ORIGIN",
        "SXG_FETCH_TIMEOUT",
        "SXG_FETCH_MAX_BYTES",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = VerifyConfig::default();
        assert_eq!(config.max_signature_lifetime_secs, 604800);
        assert_eq!(config.clock_skew_secs, 0);
        assert_eq!(config.max_certificate_lifetime_secs, 7776000);
        assert!(config.enforce_validity_origin);
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let config: VerifyConfig = serde_json::from_str(r#"{"clock_skew_secs": 60}"#).unwrap();
        assert_eq!(config, VerifyConfig::default().with_clock_skew_secs(60));

        let fetch: FetchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(fetch, FetchConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_without_vars() {
        clear_env();
        assert_eq!(VerifyConfig::from_env(), VerifyConfig::default());
        assert_eq!(FetchConfig::from_env(), FetchConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("SXG_CLOCK_SKEW_SECS", "120");
        std::env::set_var("SXG_ENFORCE_VALIDITY_ORIGIN", "false");
        std::env::set_var("SXG_FETCH_TIMEOUT", "5");
        std::env::set_var("SXG_MAX_SIGNATURE_LIFETIME_SECS", "not-a-number");

        let config = VerifyConfig::from_env();
        assert_eq!(config.clock_skew_secs, 120);
        assert!(!config.enforce_validity_origin);
        assert_eq!(config.max_signature_lifetime_secs, 604800);
        assert_eq!(FetchConfig::from_env().timeout_secs, 5);

        clear_env();
    }
}
