//! Caller-facing error taxonomy shared across crates.

use thiserror::Error;

/// Top-level SDK error type.
///
/// Variants fall into two propagation classes:
/// - [`SdkError::KeyFormat`] is a configuration-time failure and always fails fast.
/// - Everything else is a per-message failure surfaced as a typed result so that
///   high-volume polling loops can log and continue.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Key material could not be decoded (bad base64, bad DER, wrong key type).
    #[error("malformed key material: {0}")]
    KeyFormat(String),

    /// Segmented encryption produced no ciphertext.
    #[error("envelope encryption failed")]
    EncryptionFailed,

    /// The response payload could not be decrypted with the platform public key.
    #[error("envelope decryption failed")]
    DecryptionFailed,

    /// The transaction-parameter signature could not be produced.
    #[error("parameter signing failed")]
    SigningFailed,

    /// The platform answered with a non-zero business code.
    #[error("api error {code}: {msg}")]
    Api {
        /// Business code from the response body.
        code: i64,
        /// Human-readable message from the response body.
        msg: String,
    },

    /// The response body is not the expected `{code, msg, data}` JSON object,
    /// or the decrypted payload does not match the requested type.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request object could not be serialised to JSON.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request never produced a response body.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl SdkError {
    /// Short machine-readable error kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            SdkError::KeyFormat(_) => "key_format",
            SdkError::EncryptionFailed => "encryption_failed",
            SdkError::DecryptionFailed => "decryption_failed",
            SdkError::SigningFailed => "signing_failed",
            SdkError::Api { .. } => "api_error",
            SdkError::MalformedResponse(_) => "malformed_response",
            SdkError::InvalidRequest(_) => "invalid_request",
            SdkError::Transport(_) => "transport",
        }
    }

    /// Returns `true` for configuration errors that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SdkError::KeyFormat(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(SdkError::KeyFormat("x".into()).kind(), "key_format");
        assert_eq!(SdkError::EncryptionFailed.kind(), "encryption_failed");
        assert_eq!(SdkError::DecryptionFailed.kind(), "decryption_failed");
        assert_eq!(SdkError::SigningFailed.kind(), "signing_failed");
        assert_eq!(
            SdkError::Api {
                code: 1,
                msg: "x".into()
            }
            .kind(),
            "api_error"
        );
        assert_eq!(SdkError::MalformedResponse("x".into()).kind(), "malformed_response");
        assert_eq!(SdkError::InvalidRequest("x".into()).kind(), "invalid_request");
        assert_eq!(SdkError::Transport("x".into()).kind(), "transport");
    }

    #[test]
    fn only_key_errors_are_fatal() {
        assert!(SdkError::KeyFormat("bad pem".into()).is_fatal());
        assert!(!SdkError::DecryptionFailed.is_fatal());
        assert!(!SdkError::Transport("timeout".into()).is_fatal());
    }

    #[test]
    fn display_includes_api_code_and_message() {
        let e = SdkError::Api {
            code: 10032,
            msg: "insufficient balance".into(),
        };
        let s = e.to_string();
        assert!(s.contains("10032"));
        assert!(s.contains("insufficient balance"));
    }
}
