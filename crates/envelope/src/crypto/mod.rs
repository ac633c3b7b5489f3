//! RSA primitives behind the request envelope.
//!
//! - [`keys`]: key import/export/generation ([`KeyMaterial`]).
//! - [`segmented`]: block-wise private-key encryption / public-key decryption.
//! - [`signer`]: SHA-256 PKCS#1 v1.5 signatures.
//!
//! Every operation is a pure function of its inputs. [`KeyMaterial`] is
//! read-only after import and can be shared freely between threads.

pub mod keys;
pub mod segmented;
pub mod signer;

pub use keys::{KeyError, KeyMaterial};
pub use segmented::{
    decrypt_with_public_key, encrypt_with_private_key, CipherError, PaddingMode, SegmentedCipher,
};
