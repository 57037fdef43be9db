//! Signature checks over the signed message.
//!
//! The algorithm is implied by the leaf key: P-256 keys verify
//! ecdsa_secp256r1_sha256, P-384 keys verify ecdsa_secp384r1_sha384.
//! Signatures are DER-encoded.

use std::fmt;

use p256::pkcs8::DecodePublicKey;
use serde::Serialize;

use crate::error::{ExchangeError, ExchangeResult};

/// Algorithm a signature was checked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "ecdsa_secp256r1_sha256")]
    EcdsaP256Sha256,
    #[serde(rename = "ecdsa_secp384r1_sha384")]
    EcdsaP384Sha384,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EcdsaP256Sha256 => "ecdsa_secp256r1_sha256",
            Self::EcdsaP384Sha384 => "ecdsa_secp384r1_sha384",
        })
    }
}

enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

impl PublicKey {
    fn from_spki(spki_der: &[u8]) -> ExchangeResult<Self> {
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
            return Ok(Self::P256(key));
        }
        if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
            return Ok(Self::P384(key));
        }
        Err(ExchangeError::UnsupportedAlgorithm {
            reason: "leaf public key is neither ECDSA P-256 nor P-384".to_string(),
        })
    }
}

/// Verify a DER `signature` over `message` with the key in `spki_der`.
pub fn verify_signature(
    spki_der: &[u8],
    message: &[u8],
    signature: &[u8],
) -> ExchangeResult<SignatureAlgorithm> {
    use p256::ecdsa::signature::Verifier;

    match PublicKey::from_spki(spki_der)? {
        PublicKey::P256(key) => {
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| ExchangeError::crypto(format!("malformed P-256 signature: {e}")))?;
            key.verify(message, &sig)
                .map_err(|_| ExchangeError::crypto("signature does not match the signed message"))?;
            Ok(SignatureAlgorithm::EcdsaP256Sha256)
        }
        PublicKey::P384(key) => {
            let sig = p384::ecdsa::Signature::from_der(signature)
                .map_err(|e| ExchangeError::crypto(format!("malformed P-384 signature: {e}")))?;
            key.verify(message, &sig)
                .map_err(|_| ExchangeError::crypto("signature does not match the signed message"))?;
            Ok(SignatureAlgorithm::EcdsaP384Sha384)
        }
    }
}
