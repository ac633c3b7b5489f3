//! RSA key import, export, and generation.
//!
//! Keys arrive as base64 DER blobs, optionally still wrapped in PEM markers or
//! split across lines. Private keys are PKCS#8 (PKCS#1 accepted as a
//! fallback); public keys are SubjectPublicKeyInfo (PKCS#1 fallback).
//!
//! Import errors are configuration errors and always propagate.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

/// Default modulus size for [`generate_key_pair`].
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus (in bytes) that can carry a SHA-256 PKCS#1 v1.5 signature.
pub const MIN_MODULUS_LEN: usize = 64;

/// Errors produced while importing or generating key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key string was empty after PEM cleanup.
    #[error("key material is empty")]
    Empty,

    /// The cleaned key string is not valid standard base64.
    #[error("key is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The DER blob is not a recognised RSA key encoding.
    #[error("key is not a recognised RSA encoding: {0}")]
    Malformed(String),

    /// The key components are out of range for this protocol.
    #[error("key components rejected: {0}")]
    InvalidComponents(String),

    /// Key pair generation or re-encoding failed.
    #[error("key encoding failed: {0}")]
    Encoding(String),
}

impl From<KeyError> for common::SdkError {
    fn from(e: KeyError) -> Self {
        common::SdkError::KeyFormat(e.to_string())
    }
}

/// Raw RSA key components.
///
/// Either public-only (`n`, `e`) or a full pair (`n`, `e`, `d`). Only a full
/// pair may encrypt with the private exponent or sign. Immutable after
/// construction and safe to share across threads.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    modulus: BigUint,
    public_exponent: BigUint,
    private_exponent: Option<BigUint>,
}

impl KeyMaterial {
    /// Build key material from raw components.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidComponents`] if the modulus is shorter than
    /// [`MIN_MODULUS_LEN`] bytes or an exponent is zero.
    pub fn from_components(
        modulus: BigUint,
        public_exponent: BigUint,
        private_exponent: Option<BigUint>,
    ) -> Result<Self, KeyError> {
        let k = byte_len(&modulus);
        if k < MIN_MODULUS_LEN {
            return Err(KeyError::InvalidComponents(format!(
                "modulus is {k} bytes, need at least {MIN_MODULUS_LEN}"
            )));
        }
        let zero = BigUint::from(0u8);
        if public_exponent == zero {
            return Err(KeyError::InvalidComponents("public exponent is zero".into()));
        }
        if private_exponent.as_ref() == Some(&zero) {
            return Err(KeyError::InvalidComponents("private exponent is zero".into()));
        }
        Ok(Self {
            modulus,
            public_exponent,
            private_exponent,
        })
    }

    /// The modulus `n`.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// The public exponent `e`.
    pub fn public_exponent(&self) -> &BigUint {
        &self.public_exponent
    }

    /// The private exponent `d`, if this is a full key pair.
    pub fn private_exponent(&self) -> Option<&BigUint> {
        self.private_exponent.as_ref()
    }

    /// Byte length `k` of the modulus; the size of every ciphertext block.
    pub fn modulus_len(&self) -> usize {
        byte_len(&self.modulus)
    }

    /// Returns `true` if the private exponent is present.
    pub fn is_private(&self) -> bool {
        self.private_exponent.is_some()
    }

    /// The public half of this key.
    pub fn public_only(&self) -> Self {
        Self {
            modulus: self.modulus.clone(),
            public_exponent: self.public_exponent.clone(),
            private_exponent: None,
        }
    }

    /// Convert to an `rsa` public key for signature verification.
    pub(crate) fn to_rsa_public_key(&self) -> Result<RsaPublicKey, KeyError> {
        RsaPublicKey::new(self.modulus.clone(), self.public_exponent.clone())
            .map_err(|e| KeyError::InvalidComponents(e.to_string()))
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bits", &self.modulus.bits())
            .field("public_exponent", &self.public_exponent)
            .field(
                "private_exponent",
                &self.private_exponent.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl TryFrom<&RsaPrivateKey> for KeyMaterial {
    type Error = KeyError;

    fn try_from(key: &RsaPrivateKey) -> Result<Self, Self::Error> {
        Self::from_components(key.n().clone(), key.e().clone(), Some(key.d().clone()))
    }
}

impl TryFrom<&RsaPublicKey> for KeyMaterial {
    type Error = KeyError;

    fn try_from(key: &RsaPublicKey) -> Result<Self, Self::Error> {
        Self::from_components(key.n().clone(), key.e().clone(), None)
    }
}

/// Strip PEM header/footer markers, literal `\n` escapes, and whitespace.
///
/// Idempotent: cleaning an already-clean key returns it unchanged.
pub fn clean_key(raw: &str) -> String {
    // Removing one artefact can splice together another (`\` + newline + `n`).
    let mut current = clean_pass(raw);
    loop {
        let next = clean_pass(&current);
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

fn clean_pass(raw: &str) -> String {
    let mut body = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("-----") {
        body.push_str(&rest[..start]);
        let after = &rest[start + 5..];
        rest = match after.find("-----") {
            Some(end) => &after[end + 5..],
            None => after,
        };
    }
    body.push_str(rest);
    body.replace("\\n", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Decode a PKCS#8 (or PKCS#1) private key blob into a full key pair.
///
/// # Errors
///
/// Returns a [`KeyError`] if the input is empty, not base64, or not an RSA
/// private key.
pub fn import_private_key(encoded: &str) -> Result<KeyMaterial, KeyError> {
    let der = decode_blob(encoded)?;
    let key = match RsaPrivateKey::from_pkcs8_der(&der) {
        Ok(k) => k,
        Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_der(&der).map_err(|_| {
            KeyError::Malformed(format!("private key is neither PKCS#8 nor PKCS#1: {pkcs8_err}"))
        })?,
    };
    KeyMaterial::try_from(&key)
}

/// Decode a SubjectPublicKeyInfo (or PKCS#1) public key blob.
///
/// # Errors
///
/// Returns a [`KeyError`] if the input is empty, not base64, or not an RSA
/// public key.
pub fn import_public_key(encoded: &str) -> Result<KeyMaterial, KeyError> {
    let der = decode_blob(encoded)?;
    let key = match RsaPublicKey::from_public_key_der(&der) {
        Ok(k) => k,
        Err(spki_err) => RsaPublicKey::from_pkcs1_der(&der).map_err(|_| {
            KeyError::Malformed(format!("public key is neither SPKI nor PKCS#1: {spki_err}"))
        })?,
    };
    KeyMaterial::try_from(&key)
}

/// Re-encode the public half of `key` as single-line SPKI base64.
pub fn export_public_key(key: &KeyMaterial) -> Result<String, KeyError> {
    let der = key
        .to_rsa_public_key()?
        .to_public_key_der()
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    Ok(STANDARD.encode(der.as_bytes()))
}

/// Generate a fresh key pair, returned as `(public SPKI base64, private PKCS#8 base64)`.
///
/// For bootstrapping and tests only; never called on the request path.
pub fn generate_key_pair(bits: usize) -> Result<(String, String), KeyError> {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    let private_der = private
        .to_pkcs8_der()
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    let public_der = public
        .to_public_key_der()
        .map_err(|e| KeyError::Encoding(e.to_string()))?;

    Ok((
        STANDARD.encode(public_der.as_bytes()),
        STANDARD.encode(private_der.as_bytes()),
    ))
}

fn decode_blob(encoded: &str) -> Result<Vec<u8>, KeyError> {
    let cleaned = clean_key(encoded);
    if cleaned.is_empty() {
        return Err(KeyError::Empty);
    }
    Ok(STANDARD.decode(cleaned)?)
}

fn byte_len(n: &BigUint) -> usize {
    (n.bits() + 7) / 8
}
