//! Wire types exchanged with the custody platform.
//!
//! Requests travel as an [`Envelope`] serialised into a querystring (GET) or a
//! form body (POST). Responses are a JSON [`ApiResponse`] whose `data` field
//! carries the encrypted payload.

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// Outer request container.
///
/// `time` is unix **seconds**. Inner payloads that carry their own timestamp
/// use milliseconds; the two are never interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Merchant application id issued by the platform.
    pub app_id: String,
    /// Segmented-RSA ciphertext, URL-safe base64 without padding.
    pub data: String,
    /// Build time in unix seconds.
    pub time: i64,
    /// Transaction-parameter signature, standard base64 with padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

// ---------------------------------------------------------------------------
// Response body
// ---------------------------------------------------------------------------

/// Business code meaning success.
pub const SUCCESS_CODE: i64 = 0;

/// Top-level response body: `{ "code": .., "msg": .., "data": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Business code; `0` on success. Accepted as a number or numeric string.
    #[serde(deserialize_with = "code_from_number_or_string")]
    pub code: i64,
    /// Message accompanying the code.
    #[serde(default)]
    pub msg: String,
    /// Encrypted payload on success. Error responses may carry `null` or
    /// arbitrary JSON here.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    /// Returns `true` when `code` is [`SUCCESS_CODE`].
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// The encrypted payload, if `data` is a non-empty string.
    pub fn encrypted_data(&self) -> Option<&str> {
        match &self.data {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

fn code_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Number(i64),
        Text(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Number(n) => Ok(n),
        Code::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric response code: {s}"))),
    }
}
