//! Canonical parameter strings for withdrawal and Web3 transaction signatures.
//!
//! ```text
//! {"symbol": "ETH", "amount": "1.500000", "memo": ""}  ->  "amount=1.5&symbol=eth"
//! ```
//!
//! 1. Entries with an empty value are dropped.
//! 2. Plain decimals containing a `.` lose trailing fractional zeros. At least
//!    one fractional digit is kept, so `"1.0"` stays `"1.0"`.
//! 3. Entries are sorted by key in byte order.
//! 4. `key=value` pairs are joined with `&` and the whole string is lower-cased.
//!
//! The transaction signature is `sign(hex(md5(canonical)))`. The MD5 step is a
//! wire-compatibility requirement of the platform.

use std::borrow::Cow;

use md5::{Digest, Md5};
use serde_json::{Number, Value};

use crate::crypto::{signer, KeyMaterial};

/// An ordered collection of `(key, value)` pairs to be signed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignablePayload {
    entries: Vec<(String, String)>,
}

impl SignablePayload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Flatten the top-level scalar fields of a JSON object.
    ///
    /// Strings are taken verbatim and booleans as `true`/`false`. Numbers are
    /// written as plain decimals, never in exponent form, and floats always
    /// carry a fractional digit (`100.0`). `null`, arrays, and nested objects
    /// are skipped, as is any input that is not an object.
    pub fn from_json(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        map.iter()
            .filter_map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => plain_number(n),
                    Value::Bool(b) => b.to_string(),
                    Value::Null | Value::Array(_) | Value::Object(_) => return None,
                };
                Some((k.clone(), text))
            })
            .collect()
    }

    /// Number of entries, including empty-valued ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries were added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The canonical signing string. See the module docs.
    pub fn canonicalize(&self) -> String {
        canonicalize(self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Hex MD5 of the canonical string: the exact preimage that gets signed.
    pub fn digest(&self) -> String {
        md5_hex(&self.canonicalize())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SignablePayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Build the canonical signing string from any sequence of pairs.
///
/// Returns an empty string when every value is empty.
pub fn canonicalize<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut entries: Vec<(String, String)> = params
        .into_iter()
        .filter(|(_, v)| !v.as_ref().is_empty())
        .map(|(k, v)| (k.as_ref().to_owned(), trim_decimal(v.as_ref()).into_owned()))
        .collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    entries
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
        .to_lowercase()
}

/// Remove trailing zeros from the fractional part of a plain decimal.
///
/// Anything that is not `[+-]digits.digits` (exponents included) is returned
/// unchanged.
pub fn trim_decimal(value: &str) -> Cow<'_, str> {
    let Some((int, frac)) = value.split_once('.') else {
        return Cow::Borrowed(value);
    };
    let digits = int
        .strip_prefix('-')
        .or_else(|| int.strip_prefix('+'))
        .unwrap_or(int);
    let is_decimal = !(digits.is_empty() && frac.is_empty())
        && digits.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit());
    if !is_decimal || frac.is_empty() {
        return Cow::Borrowed(value);
    }

    let kept = frac.trim_end_matches('0');
    if kept.len() == frac.len() {
        return Cow::Borrowed(value);
    }
    let kept = if kept.is_empty() { "0" } else { kept };
    Cow::Owned(format!("{int}.{kept}"))
}

/// Integers verbatim; floats via `f64`'s `Display`, which never uses
/// exponent notation.
fn plain_number(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() => {
            let text = f.to_string();
            if text.contains('.') {
                text
            } else {
                format!("{text}.0")
            }
        }
        _ => n.to_string(),
    }
}

/// Lower-case hex MD5 of the UTF-8 bytes of `s`.
pub fn md5_hex(s: &str) -> String {
    hex::encode(Md5::digest(s.as_bytes()))
}

/// Sign a transaction payload: `sign(hex(md5(canonical)))`.
///
/// Returns an empty string if the payload canonicalises to nothing or the key
/// cannot sign.
pub fn sign_params(payload: &SignablePayload, key: &KeyMaterial) -> String {
    let canonical = payload.canonicalize();
    if canonical.is_empty() {
        return String::new();
    }
    signer::sign(&md5_hex(&canonical), key)
}

/// Verify a signature produced by [`sign_params`].
pub fn verify_params(payload: &SignablePayload, signature: &str, key: &KeyMaterial) -> bool {
    let canonical = payload.canonicalize();
    !canonical.is_empty() && signer::verify(&md5_hex(&canonical), signature, key)
}
