//! Block-wise raw RSA over messages longer than one modulus.
//!
//! Encryption uses the **private** exponent and decryption the **public**
//! exponent, the inverse of conventional RSA usage. Each block carries
//! deterministic PKCS#1 v1.5 type-1 padding so that every SDK given the same
//! key and plaintext emits byte-identical ciphertext.
//!
//! # Block layout
//!
//! ```text
//! encrypt:  00 01 FF..FF 00 <data>          (exactly k bytes, data <= k - 11)
//! decrypt:  00 (01|02) <non-zero..> 00 <data>
//! ```
//!
//! # Framing
//!
//! Concatenated ciphertext blocks are base64-encoded with `-`/`_` in place of
//! `+`/`/` and no `=` padding.
//!
//! # Failure policy
//!
//! [`encrypt_with_private_key`] and [`decrypt_with_public_key`] never fail:
//! errors are logged and collapse to an empty string. The `try_*` methods on
//! [`SegmentedCipher`] return the typed [`CipherError`] instead.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use rsa::BigUint;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::keys::KeyMaterial;

/// Padding bytes consumed per block: `00 01`, at least eight `FF`, and `00`.
pub const PADDING_OVERHEAD: usize = 11;

/// Errors produced by the segmented cipher.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Encryption requires the private exponent.
    #[error("key has no private exponent")]
    MissingPrivateExponent,

    /// The ciphertext is not decodable base64 after normalisation.
    #[error("ciphertext is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Strict mode only: the block has no recognisable PKCS#1 v1.5 padding.
    #[error("ciphertext block {index} has no PKCS#1 v1.5 padding")]
    Padding {
        /// Zero-based block position.
        index: usize,
    },

    /// The recovered plaintext is not UTF-8.
    #[error("decrypted plaintext is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// How decryption treats a block whose padding markers are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    /// Skip leading zero bytes and keep the rest, logging a warning.
    /// Matches the deployed platform.
    #[default]
    Lenient,
    /// Reject the block.
    Strict,
}

impl std::str::FromStr for PaddingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(PaddingMode::Lenient),
            "strict" => Ok(PaddingMode::Strict),
            other => Err(format!("unknown padding mode: {other}")),
        }
    }
}

/// Segmented RSA cipher. Stateless; the only setting is the decrypt-side
/// [`PaddingMode`]. Encryption is identical in every mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentedCipher {
    padding_mode: PaddingMode,
}

impl SegmentedCipher {
    /// Create a cipher with the given decrypt-side padding policy.
    pub fn new(padding_mode: PaddingMode) -> Self {
        Self { padding_mode }
    }

    /// The configured padding policy.
    pub fn padding_mode(&self) -> PaddingMode {
        self.padding_mode
    }

    /// Encrypt `plaintext`, collapsing any failure to an empty string.
    pub fn encrypt(&self, plaintext: &str, key: &KeyMaterial) -> String {
        match self.try_encrypt(plaintext.as_bytes(), key) {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                error!(error = %e, "segmented encryption failed");
                String::new()
            }
        }
    }

    /// Decrypt `ciphertext`, collapsing any failure to an empty string.
    pub fn decrypt(&self, ciphertext: &str, key: &KeyMaterial) -> String {
        let result = self
            .try_decrypt(ciphertext, key)
            .and_then(|bytes| String::from_utf8(bytes).map_err(CipherError::from));
        match result {
            Ok(plaintext) => plaintext,
            Err(e) => {
                error!(error = %e, "segmented decryption failed");
                String::new()
            }
        }
    }

    /// Encrypt raw bytes with the private exponent and frame the result.
    ///
    /// Empty input yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MissingPrivateExponent`] for a public-only key.
    pub fn try_encrypt(&self, plaintext: &[u8], key: &KeyMaterial) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let d = key
            .private_exponent()
            .ok_or(CipherError::MissingPrivateExponent)?;
        let k = key.modulus_len();

        let mut out = Vec::with_capacity(block_count(plaintext.len(), k) * k);
        for chunk in plaintext.chunks(max_chunk_len(k)) {
            let padded = pad_type1(chunk, k);
            out.extend_from_slice(&raw_transform(&padded, d, key.modulus(), k));
        }
        debug!(blocks = out.len() / k, "segmented encryption complete");
        Ok(encode_ciphertext(&out))
    }

    /// Unframe `ciphertext` and decrypt it with the public exponent.
    ///
    /// Empty input yields empty output.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Base64`] for undecodable input and
    /// [`CipherError::Padding`] in strict mode. A short final block is
    /// transformed as-is.
    pub fn try_decrypt(&self, ciphertext: &str, key: &KeyMaterial) -> Result<Vec<u8>, CipherError> {
        let raw = decode_ciphertext(ciphertext)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let k = key.modulus_len();
        if raw.len() % k != 0 {
            warn!(
                len = raw.len(),
                k,
                "ciphertext length is not a multiple of the modulus length"
            );
        }

        let mut out = Vec::with_capacity(raw.len());
        for (index, chunk) in raw.chunks(k).enumerate() {
            let block = raw_transform(chunk, key.public_exponent(), key.modulus(), k);
            out.extend_from_slice(unpad(&block, index, self.padding_mode)?);
        }
        debug!(blocks = raw.len().div_ceil(k), "segmented decryption complete");
        Ok(out)
    }
}

/// Encrypt with the default cipher. See [`SegmentedCipher::encrypt`].
pub fn encrypt_with_private_key(plaintext: &str, key: &KeyMaterial) -> String {
    SegmentedCipher::default().encrypt(plaintext, key)
}

/// Decrypt with the default (lenient) cipher. See [`SegmentedCipher::decrypt`].
pub fn decrypt_with_public_key(ciphertext: &str, key: &KeyMaterial) -> String {
    SegmentedCipher::default().decrypt(ciphertext, key)
}

/// Largest plaintext chunk that fits one block of a `k`-byte modulus.
pub fn max_chunk_len(k: usize) -> usize {
    k.saturating_sub(PADDING_OVERHEAD).max(1)
}

fn block_count(len: usize, k: usize) -> usize {
    len.div_ceil(max_chunk_len(k))
}

/// Base64 with `-`/`_` and no `=` padding.
pub fn encode_ciphertext(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Reverse [`encode_ciphertext`]. Tolerates embedded CR/LF/spaces, either
/// alphabet, and present or missing `=` padding.
pub fn decode_ciphertext(text: &str) -> Result<Vec<u8>, CipherError> {
    let mut normalised: String = text
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | ' ' | '\t'))
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalised.len() % 4 != 0 {
        normalised.push('=');
    }
    Ok(STANDARD.decode(normalised)?)
}

/// `00 01 FF.. 00 data`, exactly `k` bytes. `data` must fit [`max_chunk_len`].
pub(crate) fn pad_type1(data: &[u8], k: usize) -> Vec<u8> {
    debug_assert!(data.len() + PADDING_OVERHEAD <= k);
    let mut block = Vec::with_capacity(k);
    block.push(0x00);
    block.push(0x01);
    block.resize(k - data.len() - 1, 0xFF);
    block.push(0x00);
    block.extend_from_slice(data);
    block
}

/// `block^exponent mod modulus`, left-padded with zeros to `k` bytes.
pub(crate) fn raw_transform(
    block: &[u8],
    exponent: &BigUint,
    modulus: &BigUint,
    k: usize,
) -> Vec<u8> {
    let m = BigUint::from_bytes_be(block);
    let c = m.modpow(exponent, modulus);
    left_pad(c.to_bytes_be(), k)
}

fn left_pad(bytes: Vec<u8>, k: usize) -> Vec<u8> {
    if bytes.len() >= k {
        return bytes;
    }
    let mut out = vec![0u8; k - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

fn unpad(block: &[u8], index: usize, mode: PaddingMode) -> Result<&[u8], CipherError> {
    if block.len() > 2 && block[0] == 0x00 && matches!(block[1], 0x01 | 0x02) {
        if let Some(sep) = block[2..].iter().position(|&b| b == 0x00) {
            return Ok(&block[2 + sep + 1..]);
        }
    }
    match mode {
        PaddingMode::Strict => Err(CipherError::Padding { index }),
        PaddingMode::Lenient => {
            warn!(
                block = index,
                "ciphertext block lacks PKCS#1 v1.5 padding; falling back to leading-zero strip"
            );
            let start = block.iter().position(|&b| b != 0x00).unwrap_or(block.len());
            Ok(&block[start..])
        }
    }
}
