use chrono::Duration;

use super::*;
use crate::error::ErrorKind;
use crate::fetch::StaticFetcher;
use crate::testkit::{
    signing_time, verification_time, Curve, ExchangeBuilder, SignatureSpec, TestCertificate,
};
use crate::trust::PinnedRoots;
use crate::version::Version;

const URL: &str = "https://example.com/index.html";
const CERT_URL: &str = "https://example.com/cert.cbor";
const BODY: &[u8] = b"<!doctype html><p>When I grow up, I want to be a watermelon</p>";

fn cert() -> TestCertificate {
    TestCertificate::p256("example.com")
}

fn fetcher_for(cert: &TestCertificate) -> StaticFetcher {
    StaticFetcher::new().with_route(CERT_URL, cert.chain_cbor())
}

fn signed(cert: &TestCertificate) -> Exchange {
    ExchangeBuilder::new(URL)
        .header("content-type", "text/html")
        .payload(BODY)
        .sign("sig", cert)
        .build()
}

/// Kinds of the per-set failures of a failed verification.
fn failure_kinds(err: &ExchangeError) -> Vec<ErrorKind> {
    assert_eq!(err.kind(), ErrorKind::Verification, "unexpected error: {err}");
    err.set_failures().iter().map(|f| f.error.kind()).collect()
}

fn first_failure(err: &ExchangeError) -> &ExchangeError {
    &err.set_failures()
        .first()
        .unwrap_or_else(|| panic!("no set failures in {err}"))
        .error
}

mod accepts {
    use super::*;

    #[test]
    fn test_b3_exchange_verifies() {
        let cert = cert();
        let exchange = signed(&cert);

        let verified =
            verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None).unwrap();
        assert_eq!(verified.label, "sig");
        assert_eq!(verified.payload, BODY);
        assert!(verified.failures.is_empty());
        assert_eq!(verified.algorithm, SignatureAlgorithm::EcdsaP256Sha256);
        assert_eq!(verified.cert_url, CERT_URL);
        assert_eq!(
            verified.certificate_source,
            CertificateSource::Fetched(CERT_URL.into())
        );
        assert_eq!(
            verified.certificate_fingerprint,
            hex::encode(cert.fingerprint())
        );
    }

    #[test]
    fn test_every_version_verifies() {
        let cert = cert();
        for version in Version::ALL {
            let bytes = ExchangeBuilder::new(URL)
                .version(version)
                .payload(BODY)
                .sign("sig", &cert)
                .to_bytes();
            let exchange = Exchange::from_bytes(&bytes).unwrap();
            let verified = exchange
                .verify(verification_time(), &fetcher_for(&cert), None)
                .unwrap_or_else(|e| panic!("{version}: {e}"));
            assert_eq!(verified.payload, BODY, "{version}");
        }
    }

    #[test]
    fn test_p384_leaf() {
        let cert = TestCertificate::builder("example.com")
            .curve(Curve::P384)
            .build();
        let verified =
            verify_exchange(&signed(&cert), verification_time(), &fetcher_for(&cert), None)
                .unwrap();
        assert_eq!(verified.algorithm, SignatureAlgorithm::EcdsaP384Sha384);
    }

    #[test]
    fn test_override_is_used_without_fetching() {
        let cert = cert();
        let chain = cert.chain_cbor();
        let verified = verify_exchange(
            &signed(&cert),
            verification_time(),
            &StaticFetcher::new(),
            Some(&chain),
        )
        .unwrap();
        assert_eq!(verified.certificate_source, CertificateSource::Override);
    }

    #[test]
    fn test_common_name_binds_origin_without_san() {
        let cert = TestCertificate::builder("example.com").without_san().build();
        assert!(verify_exchange(&signed(&cert), verification_time(), &fetcher_for(&cert), None)
            .is_ok());
    }

    #[test]
    fn test_empty_payload_and_large_records() {
        let cert = cert();
        for (payload, rs) in [(&b""[..], 16), (BODY, 4096), (BODY, 1)] {
            let exchange = ExchangeBuilder::new(URL)
                .payload(payload)
                .record_size(rs)
                .sign("sig", &cert)
                .build();
            let verified =
                verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
                    .unwrap();
            assert_eq!(verified.payload, payload, "rs={rs}");
        }
    }

    #[test]
    fn test_parallel_verification_shares_fetcher() {
        let cert = cert();
        let exchange = signed(&cert);
        let fetcher = fetcher_for(&cert);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        verify_exchange(&exchange, verification_time(), &fetcher, None)
                            .map(|v| v.label)
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().unwrap(), "sig");
            }
        });
    }
}

mod time_windows {
    use super::*;

    #[test]
    fn test_inside_window_verifies_outside_fails_temporally() {
        let cert = cert();
        let exchange = signed(&cert);
        let fetcher = fetcher_for(&cert);
        let date = signing_time();
        let expires = date + Duration::days(1);

        for now in [date, date + Duration::seconds(1), expires - Duration::seconds(1), expires] {
            assert!(
                verify_exchange(&exchange, now, &fetcher, None).is_ok(),
                "{now} should verify"
            );
        }
        for now in [
            date - Duration::seconds(1),
            date - Duration::days(3),
            expires + Duration::seconds(1),
            expires + Duration::days(5),
        ] {
            let err = verify_exchange(&exchange, now, &fetcher, None).unwrap_err();
            assert_eq!(failure_kinds(&err), [ErrorKind::Temporal], "{now}");
        }
    }

    #[test]
    fn test_clock_skew_admits_early_verification() {
        let cert = cert();
        let exchange = signed(&cert);
        let fetcher = fetcher_for(&cert);
        let now = signing_time() - Duration::seconds(30);

        let err = verify_exchange(&exchange, now, &fetcher, None).unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::SignatureNotYetValid { .. }
        ));

        let verified = Verifier::new(&fetcher)
            .with_config(VerifyConfig::default().with_clock_skew_secs(60))
            .verify(&exchange, now)
            .unwrap();
        assert_eq!(verified.label, "sig");
    }

    #[test]
    fn test_signature_lifetime_ceiling() {
        let cert = cert();
        let date = signing_time();
        let exchange = ExchangeBuilder::new(URL)
            .payload(BODY)
            .sign_with(SignatureSpec::new("long", &cert).window(date, date + Duration::days(8)))
            .build();

        let err = verify_exchange(&exchange, verification_time(), &StaticFetcher::new(), None)
            .unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::SignatureTooLongLived {
                lifetime_secs: 691200,
                max_secs: 604800
            }
        ));
    }

    #[test]
    fn test_inverted_window() {
        let cert = cert();
        let date = signing_time();
        let exchange = ExchangeBuilder::new(URL)
            .sign_with(SignatureSpec::new("inverted", &cert).window(date, date - Duration::hours(1)))
            .build();

        let err = verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
            .unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::SignatureWindowInverted { .. }
        ));
    }

    #[test]
    fn test_expired_certificate() {
        let cert = cert();
        // Signature window straddles the certificate's notAfter (2024-03-01).
        let date = signing_time() + Duration::days(29);
        let exchange = ExchangeBuilder::new(URL)
            .sign_with(SignatureSpec::new("sig", &cert).window(date, date + Duration::days(2)))
            .build();

        let now = date + Duration::days(1);
        let err = verify_exchange(&exchange, now, &fetcher_for(&cert), None).unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::CertificateExpired { .. }
        ));
    }

    #[test]
    fn test_certificate_lifetime_ceiling_applies_after_2019() {
        let long = TestCertificate::builder("example.com")
            .validity((2024, 1, 1), (2024, 6, 1))
            .build();
        let err = verify_exchange(&signed(&long), verification_time(), &fetcher_for(&long), None)
            .unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::CertificateTooLongLived { .. }
        ));

        let legacy = TestCertificate::builder("example.com")
            .validity((2019, 1, 1), (2026, 1, 1))
            .build();
        assert!(verify_exchange(
            &signed(&legacy),
            verification_time(),
            &fetcher_for(&legacy),
            None
        )
        .is_ok());
    }
}

mod tampering {
    use super::*;

    const MASKS: [u8; 3] = [0x01, 0x80, 0xff];

    #[test]
    fn test_every_signature_byte_flip_is_crypto_failure() {
        let cert = cert();
        let fetcher = fetcher_for(&cert);
        let original = signed(&cert);
        let sets = original.signatures().unwrap();

        for index in 0..sets[0].sig.len() {
            for mask in MASKS {
                let mut tampered = sets[0].clone();
                tampered.sig[index] ^= mask;
                let mut exchange = original.clone();
                exchange.signature = tampered.to_string();

                let err = verify_exchange(&exchange, verification_time(), &fetcher, None)
                    .unwrap_err();
                assert_eq!(
                    failure_kinds(&err),
                    [ErrorKind::Crypto],
                    "signature byte {index} ^ {mask:#04x}"
                );
            }
        }
    }

    #[test]
    fn test_signed_header_change_is_crypto_failure() {
        let cert = cert();
        let mut exchange = signed(&cert);
        exchange.response_headers[0].1 = "text/plain".into();

        let err = verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
            .unwrap_err();
        assert_eq!(failure_kinds(&err), [ErrorKind::Crypto]);
    }

    #[test]
    fn test_every_payload_byte_flip_is_integrity_failure() {
        let cert = cert();
        let fetcher = fetcher_for(&cert);
        let original = signed(&cert);

        // Covers the record-size prefix as well as the body.
        for index in 0..original.payload.len() {
            for mask in MASKS {
                let mut exchange = original.clone();
                exchange.payload[index] ^= mask;

                let err = verify_exchange(&exchange, verification_time(), &fetcher, None)
                    .unwrap_err();
                assert_eq!(
                    failure_kinds(&err),
                    [ErrorKind::Integrity],
                    "payload byte {index} ^ {mask:#04x}"
                );
            }
        }
    }

    #[test]
    fn test_fingerprint_mismatch_is_certificate_failure() {
        let signer = cert();
        let other = cert();
        let err = verify_exchange(
            &signed(&signer),
            verification_time(),
            &fetcher_for(&other),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::CertificateFingerprintMismatch { .. }
        ));
    }

    #[test]
    fn test_certificate_without_extension() {
        let cert = TestCertificate::builder("example.com")
            .can_sign_exchanges(false)
            .build();
        let err = verify_exchange(&signed(&cert), verification_time(), &fetcher_for(&cert), None)
            .unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::CertificateMissingExtension
        ));
    }

    #[test]
    fn test_certificate_for_other_host() {
        let cert = TestCertificate::p256("example.org");
        let exchange = ExchangeBuilder::new(URL)
            .sign_with(SignatureSpec {
                validity_url: None,
                ..SignatureSpec::new("sig", &cert)
            })
            .build();
        let err = verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
            .unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::OriginMismatch { .. }
        ));
    }
}

mod signature_sets {
    use super::*;

    #[test]
    fn test_expired_then_valid_set_reports_first_failure() {
        let cert = cert();
        let old = signing_time() - Duration::days(3);
        let exchange = ExchangeBuilder::new(URL)
            .payload(BODY)
            .sign_with(SignatureSpec::new("old", &cert).window(old, old + Duration::days(1)))
            .sign("new", &cert)
            .build();

        let verified =
            verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None).unwrap();
        assert_eq!(verified.label, "new");
        assert_eq!(verified.failures.len(), 1);
        assert_eq!(verified.failures[0].label, "old");
        assert_eq!(verified.failures[0].error.kind(), ErrorKind::Temporal);
    }

    #[test]
    fn test_first_passing_set_wins() {
        let cert = cert();
        let exchange = ExchangeBuilder::new(URL)
            .payload(BODY)
            .sign("a", &cert)
            .sign("b", &cert)
            .build();
        for _ in 0..3 {
            let verified =
                verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
                    .unwrap();
            assert_eq!(verified.label, "a");
        }
    }

    #[test]
    fn test_all_sets_failing_lists_each() {
        let cert = cert();
        let exchange = ExchangeBuilder::new(URL)
            .sign("a", &cert)
            .sign("b", &cert)
            .build();
        let err = verify_exchange(&exchange, verification_time(), &StaticFetcher::new(), None)
            .unwrap_err();
        let labels: Vec<_> = err.set_failures().iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["a", "b"]);
        assert_eq!(failure_kinds(&err), [ErrorKind::Fetch, ErrorKind::Fetch]);
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_malformed_signature_header_aborts() {
        let mut exchange = signed(&cert());
        exchange.signature = "sig;sig=*AAA=*;integrity=\"digest/mi-sha256-03\"".into();
        let err = verify_exchange(&exchange, verification_time(), &StaticFetcher::new(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_failed_fetch_leaves_payload_untouched() {
        let exchange = signed(&cert());
        let before = exchange.payload.clone();
        let err = verify_exchange(&exchange, verification_time(), &StaticFetcher::new(), None)
            .unwrap_err();
        assert_eq!(failure_kinds(&err), [ErrorKind::Fetch]);
        assert_eq!(exchange.payload, before);
    }
}

mod policy_options {
    use super::*;

    #[test]
    fn test_pinned_roots() {
        let cert = cert();
        let exchange = signed(&cert);
        let fetcher = fetcher_for(&cert);

        let mut pinned = PinnedRoots::new();
        pinned.add_der(&cert.der);
        assert!(Verifier::new(&fetcher)
            .with_trust(&pinned)
            .verify(&exchange, verification_time())
            .is_ok());

        let mut other = PinnedRoots::new();
        other.add_der(b"some other root");
        let err = Verifier::new(&fetcher)
            .with_trust(&other)
            .verify(&exchange, verification_time())
            .unwrap_err();
        assert!(matches!(first_failure(&err), ExchangeError::Untrusted { .. }));
    }

    #[test]
    fn test_cross_origin_validity_url() {
        let cert = cert();
        let exchange = ExchangeBuilder::new(URL)
            .payload(BODY)
            .sign_with(SignatureSpec {
                validity_url: Some("https://validity.example.net/v".into()),
                ..SignatureSpec::new("sig", &cert)
            })
            .build();
        let fetcher = fetcher_for(&cert);

        let err = verify_exchange(&exchange, verification_time(), &fetcher, None).unwrap_err();
        assert_eq!(failure_kinds(&err), [ErrorKind::Certificate]);
        assert!(matches!(
            first_failure(&err),
            ExchangeError::OriginMismatch { .. }
        ));

        assert!(Verifier::new(&fetcher)
            .with_config(VerifyConfig::default().with_enforce_validity_origin(false))
            .verify(&exchange, verification_time())
            .is_ok());
    }

    #[test]
    fn test_unsupported_digest_scheme() {
        let cert = cert();
        let exchange = ExchangeBuilder::new(URL)
            .integrity_headers(false)
            .header("content-encoding", "mi-sha256-03")
            .header("digest", "sha-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=")
            .payload(BODY)
            .sign("sig", &cert)
            .build();
        let err = verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
            .unwrap_err();
        assert_eq!(failure_kinds(&err), [ErrorKind::UnsupportedDigest]);
    }

    #[test]
    fn test_integrity_parameter_must_match_version() {
        let cert = cert();
        let exchange = ExchangeBuilder::new(URL)
            .payload(BODY)
            .sign_with(SignatureSpec {
                integrity: Some("mi-draft2".into()),
                ..SignatureSpec::new("sig", &cert)
            })
            .build();
        let err = verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
            .unwrap_err();
        assert!(matches!(
            first_failure(&err),
            ExchangeError::UnsupportedDigest { scheme } if scheme == "mi-draft2"
        ));
    }

    #[test]
    fn test_missing_mi_content_encoding() {
        let cert = cert();
        let exchange = ExchangeBuilder::new(URL)
            .integrity_headers(false)
            .header("content-encoding", "gzip")
            .payload(BODY)
            .sign("sig", &cert)
            .build();
        let err = verify_exchange(&exchange, verification_time(), &fetcher_for(&cert), None)
            .unwrap_err();
        assert_eq!(failure_kinds(&err), [ErrorKind::Integrity]);
    }

    #[test]
    fn test_summary_serializes() {
        let cert = cert();
        let verified =
            verify_exchange(&signed(&cert), verification_time(), &fetcher_for(&cert), None)
                .unwrap();
        let json = serde_json::to_value(verified.summary()).unwrap();
        assert_eq!(json["label"], "sig");
        assert_eq!(json["algorithm"], "ecdsa_secp256r1_sha256");
        assert_eq!(json["payload_len"], BODY.len());
    }
}
