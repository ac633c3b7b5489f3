//! Request confidentiality and authentication for the WaaS custody API.
//!
//! - [`crypto`]: key codec, segmented RSA cipher, SHA-256 signer.
//! - [`canonical`]: canonical parameter strings for transaction signatures.
//! - [`envelope`]: outer `app_id`/`data`/`time`/`sign` request wire format
//!   and response parsing.
//! - [`client`]: generic `invoke` over a pluggable [`client::Transport`].
//! - [`config`]: `WAAS_*` environment configuration.
//! - [`telemetry`]: tracing subscriber for binaries.

pub mod canonical;
pub mod client;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod telemetry;

pub use canonical::{canonicalize, sign_params, verify_params, SignablePayload};
pub use client::{Credentials, Method, Transport, TransportError, WaasClient};
pub use common::{ApiResponse, Envelope, SdkError};
pub use config::SdkConfig;
pub use crypto::{
    decrypt_with_public_key, encrypt_with_private_key, KeyError, KeyMaterial, PaddingMode,
    SegmentedCipher,
};
