//! Building request envelopes and opening response bodies.
//!
//! ```text
//! request:   app_id=<id>&data=<segmented ciphertext>&time=<unix secs>[&sign=<b64>]
//! response:  {"code": 0, "msg": "...", "data": "<segmented ciphertext>"}
//! ```

use common::{ApiResponse, Envelope, SdkError};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::canonical::{sign_params, SignablePayload};
use crate::crypto::{KeyMaterial, SegmentedCipher};

/// Current unix time in seconds, the unit of the outer envelope `time`.
pub fn now_unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current unix time in milliseconds, the unit of inner payload timestamps.
pub fn inner_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Encrypt `plaintext_json` into a request envelope stamped with the current time.
///
/// When `signing` is given, the payload is signed with `private_key` as a
/// transaction authorisation.
///
/// # Errors
///
/// - [`SdkError::EncryptionFailed`] if segmented encryption yields nothing
///   (empty plaintext or a public-only key).
/// - [`SdkError::SigningFailed`] if the signature is empty.
pub fn build(
    app_id: &str,
    plaintext_json: &str,
    private_key: &KeyMaterial,
    signing: Option<&SignablePayload>,
) -> Result<Envelope, SdkError> {
    assemble(
        app_id,
        plaintext_json,
        private_key,
        signing.map(|params| (params, private_key)),
        now_unix_seconds(),
    )
}

/// Like [`build`], but the transaction signature uses a dedicated `sign_key`.
pub fn build_signed_with(
    app_id: &str,
    plaintext_json: &str,
    private_key: &KeyMaterial,
    params: &SignablePayload,
    sign_key: &KeyMaterial,
) -> Result<Envelope, SdkError> {
    assemble(
        app_id,
        plaintext_json,
        private_key,
        Some((params, sign_key)),
        now_unix_seconds(),
    )
}

pub(crate) fn assemble(
    app_id: &str,
    plaintext_json: &str,
    private_key: &KeyMaterial,
    signing: Option<(&SignablePayload, &KeyMaterial)>,
    time: i64,
) -> Result<Envelope, SdkError> {
    let data = SegmentedCipher::default().encrypt(plaintext_json, private_key);
    if data.is_empty() {
        return Err(SdkError::EncryptionFailed);
    }

    let sign = match signing {
        Some((params, key)) => {
            let signature = sign_params(params, key);
            if signature.is_empty() {
                return Err(SdkError::SigningFailed);
            }
            Some(signature)
        }
        None => None,
    };

    debug!(app_id, time, signed = sign.is_some(), "envelope built");
    Ok(Envelope {
        app_id: app_id.to_owned(),
        data,
        time,
        sign,
    })
}

/// Envelope fields in wire order, ready for a querystring or form body.
pub fn form_pairs(envelope: &Envelope) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("app_id", envelope.app_id.clone()),
        ("data", envelope.data.clone()),
        ("time", envelope.time.to_string()),
    ];
    if let Some(sign) = &envelope.sign {
        pairs.push(("sign", sign.clone()));
    }
    pairs
}

/// `application/x-www-form-urlencoded` encoding of [`form_pairs`]; serves as
/// both the GET querystring and the POST body.
pub fn encode_form(envelope: &Envelope) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form_pairs(envelope))
        .finish()
}

/// Open a response body with the default (lenient) cipher.
///
/// Returns the decrypted JSON, or an empty string if the platform reported
/// success without a payload.
///
/// # Errors
///
/// - [`SdkError::MalformedResponse`] if the body is not `{code, msg, data}`.
/// - [`SdkError::Api`] if `code` is non-zero; nothing is decrypted.
/// - [`SdkError::DecryptionFailed`] if `data` does not decrypt.
pub fn parse(response_json: &str, public_key: &KeyMaterial) -> Result<String, SdkError> {
    parse_with(&SegmentedCipher::default(), response_json, public_key)
}

/// [`parse`] with an explicit cipher (padding policy).
pub fn parse_with(
    cipher: &SegmentedCipher,
    response_json: &str,
    public_key: &KeyMaterial,
) -> Result<String, SdkError> {
    let response: ApiResponse = serde_json::from_str(response_json)
        .map_err(|e| SdkError::MalformedResponse(e.to_string()))?;

    if !response.is_success() {
        warn!(code = response.code, msg = %response.msg, "platform returned an error");
        return Err(SdkError::Api {
            code: response.code,
            msg: response.msg,
        });
    }

    let Some(data) = response.encrypted_data() else {
        return Ok(String::new());
    };

    let plaintext = cipher.decrypt(data, public_key);
    if plaintext.is_empty() {
        return Err(SdkError::DecryptionFailed);
    }
    Ok(plaintext)
}

/// [`parse_with`] followed by deserialisation into `T`.
///
/// An empty success payload yields `T::default()`.
pub fn parse_into<T>(
    cipher: &SegmentedCipher,
    response_json: &str,
    public_key: &KeyMaterial,
) -> Result<T, SdkError>
where
    T: DeserializeOwned + Default,
{
    let plaintext = parse_with(cipher, response_json, public_key)?;
    if plaintext.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&plaintext).map_err(|e| SdkError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::crypto::keys::test_keys;
    use crate::crypto::{encrypt_with_private_key, signer, PaddingMode};

    const PAYLOAD: &str = r#"{"time":1234567890,"charset":"utf-8","symbol":"ETH","amount":"1.5"}"#;

    fn response(code: i64, msg: &str, data: serde_json::Value) -> String {
        json!({"code": code, "msg": msg, "data": data}).to_string()
    }

    #[test]
    fn build_encrypts_and_stamps_seconds() {
        let (private, public, _) = test_keys::small();
        let before = now_unix_seconds();
        let env = build("app-1", PAYLOAD, private, None).unwrap();
        let after = now_unix_seconds();

        assert_eq!(env.app_id, "app-1");
        assert!(env.time >= before && env.time <= after);
        assert!(env.sign.is_none());
        assert_eq!(crate::crypto::decrypt_with_public_key(&env.data, public), PAYLOAD);
    }

    #[test]
    fn build_with_signature() {
        let (private, public, _) = test_keys::small();
        let params = SignablePayload::new()
            .with("symbol", "ETH")
            .with("amount", "1.500000");
        let env = build("app-1", PAYLOAD, private, Some(&params)).unwrap();

        let sign = env.sign.expect("signature present");
        assert!(signer::verify(&params.digest(), &sign, public));
    }

    #[test]
    fn build_signed_with_uses_dedicated_key() {
        let (private, _, _) = test_keys::small();
        let other = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let sign_key = KeyMaterial::try_from(&other).unwrap();

        let params = SignablePayload::new().with("to", "0xabc");
        let env = build_signed_with("app", PAYLOAD, private, &params, &sign_key).unwrap();
        let sign = env.sign.unwrap();
        assert!(signer::verify(&params.digest(), &sign, &sign_key.public_only()));
        assert!(!signer::verify(&params.digest(), &sign, &private.public_only()));
    }

    #[test]
    fn build_fails_on_empty_plaintext() {
        let (private, _, _) = test_keys::small();
        assert!(matches!(build("app", "", private, None), Err(SdkError::EncryptionFailed)));
    }

    #[test]
    fn build_fails_with_public_key() {
        let (_, public, _) = test_keys::small();
        assert!(matches!(build("app", PAYLOAD, public, None), Err(SdkError::EncryptionFailed)));
    }

    #[test]
    fn build_fails_when_params_are_empty() {
        let (private, _, _) = test_keys::small();
        let params = SignablePayload::new().with("memo", "");
        assert!(matches!(
            build("app", PAYLOAD, private, Some(&params)),
            Err(SdkError::SigningFailed)
        ));
    }

    #[test]
    fn form_encoding_is_ordered_and_escaped() {
        let env = Envelope {
            app_id: "app 1".into(),
            data: "ab-_c".into(),
            time: 1_700_000_000,
            sign: Some("a+b/c==".into()),
        };
        assert_eq!(
            encode_form(&env),
            "app_id=app+1&data=ab-_c&time=1700000000&sign=a%2Bb%2Fc%3D%3D"
        );

        let unsigned = Envelope { sign: None, ..env };
        let pairs = form_pairs(&unsigned);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[2], ("time", "1700000000".to_string()));
    }

    #[test]
    fn assemble_uses_supplied_time() {
        let (private, _, _) = test_keys::small();
        let env = assemble("app", PAYLOAD, private, None, 42).unwrap();
        assert_eq!(env.time, 42);
    }

    #[test]
    fn parse_decrypts_success_payload() {
        let (private, public, _) = test_keys::small();
        let body = response(0, "success", json!(encrypt_with_private_key(PAYLOAD, private)));
        assert_eq!(parse(&body, public).unwrap(), PAYLOAD);
    }

    #[test]
    fn parse_returns_api_error_without_decrypting() {
        let (_, public, _) = test_keys::small();
        let body = response(10001, "sign error", json!("not even ciphertext"));
        match parse(&body, public) {
            Err(SdkError::Api { code, msg }) => {
                assert_eq!(code, 10001);
                assert_eq!(msg, "sign error");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn parse_empty_data_is_success() {
        let (_, public, _) = test_keys::small();
        assert_eq!(parse(&response(0, "ok", json!(null)), public).unwrap(), "");
        assert_eq!(parse(&response(0, "ok", json!("")), public).unwrap(), "");
        assert_eq!(parse(r#"{"code":"0","msg":"ok"}"#, public).unwrap(), "");
    }

    #[test]
    fn parse_rejects_undecryptable_data() {
        let (_, public, _) = test_keys::small();
        let body = response(0, "ok", json!("%%%garbage%%%"));
        assert!(matches!(parse(&body, public), Err(SdkError::DecryptionFailed)));
    }

    #[test]
    fn parse_rejects_non_json() {
        let (_, public, _) = test_keys::small();
        assert!(matches!(parse("<html>", public), Err(SdkError::MalformedResponse(_))));
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Balance {
        symbol: String,
        amount: String,
    }

    #[test]
    fn parse_into_typed_response() {
        let (private, public, _) = test_keys::small();
        let cipher = SegmentedCipher::new(PaddingMode::Strict);

        let body = response(0, "ok", json!(encrypt_with_private_key(PAYLOAD, private)));
        let balance: Balance = parse_into(&cipher, &body, public).unwrap();
        assert_eq!(balance.symbol, "ETH");
        assert_eq!(balance.amount, "1.5");

        let empty: Balance = parse_into(&cipher, &response(0, "ok", json!(null)), public).unwrap();
        assert_eq!(empty, Balance::default());
    }

    #[test]
    fn inner_millis_are_not_outer_seconds() {
        let secs = now_unix_seconds();
        let millis = inner_timestamp_millis();
        assert!(millis / 1000 >= secs);
        assert!(millis > secs * 100);
    }
}
