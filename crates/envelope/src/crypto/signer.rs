//! SHA-256 RSASSA-PKCS1-v1_5 signatures.
//!
//! Signatures are standard base64 **with** padding, unlike the URL-safe
//! framing of [`super::segmented`]. Signing reuses the segmented cipher's raw
//! private-exponent transform over an EMSA-PKCS1-v1_5 encoded digest, so no
//! CRT factors are required; verification goes through the `rsa` crate.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use super::keys::KeyMaterial;
use super::segmented::{pad_type1, raw_transform, PADDING_OVERHEAD};

/// DER `DigestInfo` header for SHA-256 (RFC 8017 §9.2, note 1).
const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

/// Sign the UTF-8 bytes of `data`.
///
/// Returns an empty string if `data` is empty, the key has no private
/// exponent, or the modulus is too short for the encoded digest.
pub fn sign(data: &str, key: &KeyMaterial) -> String {
    if data.is_empty() {
        return String::new();
    }
    let Some(d) = key.private_exponent() else {
        error!("signing requires a private key");
        return String::new();
    };

    let k = key.modulus_len();
    let mut encoded = Vec::with_capacity(SHA256_DIGEST_INFO.len() + 32);
    encoded.extend_from_slice(&SHA256_DIGEST_INFO);
    encoded.extend_from_slice(&Sha256::digest(data.as_bytes()));
    if encoded.len() + PADDING_OVERHEAD > k {
        error!(k, "modulus too short for a SHA-256 signature");
        return String::new();
    }

    let signature = raw_transform(&pad_type1(&encoded, k), d, key.modulus(), k);
    debug!(len = signature.len(), "signature produced");
    STANDARD.encode(signature)
}

/// Verify a base64 signature over the UTF-8 bytes of `data`.
///
/// Never panics or errors: any malformed input yields `false`.
pub fn verify(data: &str, signature_b64: &str, key: &KeyMaterial) -> bool {
    if data.is_empty() || signature_b64.trim().is_empty() {
        return false;
    }
    let Ok(signature) = STANDARD.decode(signature_b64.trim()) else {
        return false;
    };
    let Ok(public) = key.to_rsa_public_key() else {
        return false;
    };
    let digest = Sha256::digest(data.as_bytes());
    public
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
        .is_ok()
}
