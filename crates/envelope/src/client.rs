//! Generic `invoke`: serialise a request, wrap it in an envelope, dispatch it
//! through a [`Transport`], and open the response.
//!
//! Concrete HTTP clients live outside this crate; they only need to implement
//! [`Transport`].

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use common::SdkError;

use crate::canonical::SignablePayload;
use crate::crypto::{KeyMaterial, SegmentedCipher};
use crate::envelope::{self, inner_timestamp_millis};

/// Failure reported by a [`Transport`] implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<TransportError> for SdkError {
    fn from(e: TransportError) -> Self {
        SdkError::Transport(e.0)
    }
}

/// Issues HTTP requests and returns the raw response body.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// `GET url?query`.
    fn get(&self, url: &str, query: &str) -> Result<String, TransportError>;

    /// `POST url` with an `application/x-www-form-urlencoded` body.
    fn post_form(&self, url: &str, body: &str) -> Result<String, TransportError>;
}

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Envelope goes in the querystring.
    Get,
    /// Envelope goes in the form body.
    Post,
}

/// Imported keys and identity for one merchant application.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Merchant application id.
    pub app_id: String,
    /// Merchant private key: encrypts requests and, by default, signs them.
    pub private_key: KeyMaterial,
    /// Platform public key: decrypts responses.
    pub platform_public_key: KeyMaterial,
    /// Optional dedicated key for transaction-parameter signatures.
    pub sign_key: Option<KeyMaterial>,
}

impl Credentials {
    /// The key used for transaction-parameter signatures.
    pub fn signing_key(&self) -> &KeyMaterial {
        self.sign_key.as_ref().unwrap_or(&self.private_key)
    }
}

/// Envelope-speaking client over an arbitrary [`Transport`].
pub struct WaasClient<T> {
    transport: T,
    api_base: String,
    charset: String,
    credentials: Credentials,
    cipher: SegmentedCipher,
}

impl<T: Transport> WaasClient<T> {
    /// Create a client rooted at `api_base` (e.g. `https://host/api/v2`).
    pub fn new(transport: T, api_base: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            transport,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            charset: "utf-8".into(),
            credentials,
            cipher: SegmentedCipher::default(),
        }
    }

    /// Override the response cipher (padding policy).
    pub fn with_cipher(mut self, cipher: SegmentedCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Override the `charset` stamped into request payloads.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Call an endpoint without a transaction signature.
    ///
    /// # Errors
    ///
    /// Any [`SdkError`] from request serialisation, envelope building,
    /// transport, or response parsing.
    pub fn invoke<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        request: &Req,
    ) -> Result<Resp, SdkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Default,
    {
        self.dispatch(method, path, request, false)
    }

    /// Call a money-moving endpoint. The request's top-level scalar fields
    /// are canonicalised and signed with [`Credentials::signing_key`].
    pub fn invoke_signed<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        request: &Req,
    ) -> Result<Resp, SdkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Default,
    {
        self.dispatch(method, path, request, true)
    }

    #[instrument(skip(self, request), fields(app_id = %self.credentials.app_id))]
    fn dispatch<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        request: &Req,
        signed: bool,
    ) -> Result<Resp, SdkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Default,
    {
        let payload = self.request_payload(request)?;
        let plaintext = payload.to_string();

        let creds = &self.credentials;
        let envelope = if signed {
            let params = SignablePayload::from_json(&payload);
            envelope::build_signed_with(
                &creds.app_id,
                &plaintext,
                &creds.private_key,
                &params,
                creds.signing_key(),
            )?
        } else {
            envelope::build(&creds.app_id, &plaintext, &creds.private_key, None)?
        };

        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        let form = envelope::encode_form(&envelope);
        debug!(?method, %url, signed, "dispatching request");

        let body = match method {
            Method::Get => self.transport.get(&url, &form)?,
            Method::Post => self.transport.post_form(&url, &form)?,
        };

        envelope::parse_into(&self.cipher, &body, &creds.platform_public_key)
    }

    /// Serialise `request` and stamp `time` (milliseconds) and `charset` if absent.
    fn request_payload<Req: Serialize>(&self, request: &Req) -> Result<Value, SdkError> {
        let mut payload = serde_json::to_value(request)
            .map_err(|e| SdkError::InvalidRequest(e.to_string()))?;
        if let Value::Object(map) = &mut payload {
            map.entry("time")
                .or_insert_with(|| Value::from(inner_timestamp_millis()));
            map.entry("charset")
                .or_insert_with(|| Value::from(self.charset.clone()));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, function};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::crypto::keys::test_keys;
    use crate::crypto::{decrypt_with_public_key, encrypt_with_private_key, signer};

    #[derive(Serialize)]
    struct WithdrawRequest {
        request_id: String,
        symbol: String,
        amount: String,
        to_address: String,
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct WithdrawResponse {
        id: u64,
    }

    /// The platform reuses the merchant's test pair for both directions here.
    fn credentials() -> Credentials {
        let (private, public, _) = test_keys::small();
        Credentials {
            app_id: "app-7".into(),
            private_key: private.clone(),
            platform_public_key: public.clone(),
            sign_key: None,
        }
    }

    fn form_field(form: &str, name: &str) -> Option<String> {
        url::form_urlencoded::parse(form.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn success_body(payload: serde_json::Value) -> String {
        let (private, _, _) = test_keys::small();
        let data = encrypt_with_private_key(&payload.to_string(), private);
        json!({"code": 0, "msg": "ok", "data": data}).to_string()
    }

    #[test]
    fn invoke_get_round_trip() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .with(
                function(|url: &str| url == "https://example.test/api/v2/user/info"),
                always(),
            )
            .times(1)
            .returning(|_, query| {
                let (_, public, _) = test_keys::small();
                let data = form_field(query, "data").unwrap();
                let inner: serde_json::Value =
                    serde_json::from_str(&decrypt_with_public_key(&data, public)).unwrap();
                assert_eq!(inner["charset"], "utf-8");
                assert!(inner["time"].as_i64().unwrap() > 1_000_000_000_000);
                assert!(form_field(query, "sign").is_none());
                Ok(success_body(json!({"id": 9})))
            });

        let client = WaasClient::new(transport, "https://example.test/api/v2/", credentials());
        let resp: WithdrawResponse = client
            .invoke(Method::Get, "/user/info", &json!({"uid": 1}))
            .unwrap();
        assert_eq!(resp, WithdrawResponse { id: 9 });
    }

    #[test]
    fn invoke_signed_post_carries_signature() {
        let mut transport = MockTransport::new();
        transport
            .expect_post_form()
            .times(1)
            .returning(|_, body| {
                let (_, public, _) = test_keys::small();
                let data = form_field(body, "data").unwrap();
                let sign = form_field(body, "sign").unwrap();
                let inner: serde_json::Value =
                    serde_json::from_str(&decrypt_with_public_key(&data, public)).unwrap();
                let params = SignablePayload::from_json(&inner);
                assert!(signer::verify(&params.digest(), &sign, public));
                Ok(success_body(json!({"id": 42})))
            });

        let client = WaasClient::new(transport, "https://example.test/api/v2", credentials());
        let req = WithdrawRequest {
            request_id: "R-1".into(),
            symbol: "ETH".into(),
            amount: "1.500000".into(),
            to_address: "0xABC".into(),
        };
        let resp: WithdrawResponse = client
            .invoke_signed(Method::Post, "billing/withdraw", &req)
            .unwrap();
        assert_eq!(resp.id, 42);
    }

    #[test]
    fn api_error_is_surfaced() {
        let mut transport = MockTransport::new();
        transport.expect_post_form().returning(|_, _| {
            Ok(r#"{"code":"10032","msg":"insufficient balance","data":null}"#.into())
        });

        let client = WaasClient::new(transport, "https://example.test", credentials());
        let err = client
            .invoke::<_, WithdrawResponse>(Method::Post, "billing/withdraw", &json!({"a": "b"}))
            .unwrap_err();
        assert!(matches!(err, SdkError::Api { code: 10032, .. }));
    }

    #[test]
    fn transport_error_is_surfaced() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .returning(|_, _| Err(TransportError("connection reset".into())));

        let client = WaasClient::new(transport, "https://example.test", credentials());
        let err = client
            .invoke::<_, WithdrawResponse>(Method::Get, "user/info", &json!({}))
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn caller_supplied_time_is_kept() {
        let client = WaasClient::new(MockTransport::new(), "https://example.test", credentials())
            .with_charset("gbk");
        let payload = client.request_payload(&json!({"time": 5})).unwrap();
        assert_eq!(payload["time"], 5);
        assert_eq!(payload["charset"], "gbk");
    }

    #[test]
    fn signing_key_defaults_to_private_key() {
        let creds = credentials();
        assert_eq!(creds.signing_key(), &creds.private_key);
    }
}
