//! Subcommand definitions and handlers.

use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use waas_envelope::crypto::{keys, signer};
use waas_envelope::{envelope, PaddingMode, SegmentedCipher, SignablePayload};

#[derive(Debug, Parser)]
#[command(name = "waas-keytool", version, about = "WaaS envelope key and payload tool")]
pub struct Cli {
    /// Tracing log level; `RUST_LOG` takes precedence.
    #[arg(long, env = "WAAS_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Positional `INPUT` arguments accept `-` to read from stdin.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate an RSA key pair (SPKI public, PKCS#8 private, base64).
    Generate {
        /// Modulus size in bits.
        #[arg(long, default_value_t = keys::DEFAULT_KEY_BITS)]
        bits: usize,
    },

    /// Encrypt plaintext with the merchant private key.
    Encrypt {
        #[arg(long, env = "WAAS_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        input: String,
    },

    /// Decrypt a response payload with the platform public key.
    Decrypt {
        #[arg(long, env = "WAAS_PLATFORM_PUBLIC_KEY")]
        public_key: String,
        /// Reject blocks without PKCS#1 v1.5 padding instead of falling back.
        #[arg(long)]
        strict: bool,
        input: String,
    },

    /// SHA-256 sign arbitrary data.
    Sign {
        #[arg(long, env = "WAAS_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        input: String,
    },

    /// Verify a signature produced by `sign`.
    Verify {
        #[arg(long, env = "WAAS_PLATFORM_PUBLIC_KEY")]
        public_key: String,
        input: String,
        signature: String,
    },

    /// Canonicalise a JSON object's parameters, optionally signing them.
    Canonicalize {
        /// Also produce the transaction signature.
        #[arg(long, requires = "private_key")]
        sign: bool,
        #[arg(long, env = "WAAS_SIGN_PRIVATE_KEY", hide_env_values = true)]
        private_key: Option<String>,
        input: String,
    },

    /// Build a request envelope and print it form-encoded.
    Envelope {
        #[arg(long, env = "WAAS_APP_ID")]
        app_id: String,
        #[arg(long, env = "WAAS_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        /// Sign the payload's top-level parameters.
        #[arg(long)]
        sign: bool,
        input: String,
    },
}

/// Execute `command` and return what should be printed.
pub fn run(command: Command) -> Result<String> {
    match command {
        Command::Generate { bits } => {
            let (public_key, private_key) = keys::generate_key_pair(bits)?;
            info!(bits, "generated key pair");
            Ok(json!({ "public_key": public_key, "private_key": private_key }).to_string())
        }

        Command::Encrypt { private_key, input } => {
            let key = keys::import_private_key(&private_key)?;
            let plaintext = read_input(&input)?;
            let ciphertext = SegmentedCipher::default().try_encrypt(plaintext.as_bytes(), &key)?;
            if ciphertext.is_empty() {
                bail!("nothing to encrypt");
            }
            Ok(ciphertext)
        }

        Command::Decrypt {
            public_key,
            strict,
            input,
        } => {
            let key = keys::import_public_key(&public_key)?;
            let mode = if strict {
                PaddingMode::Strict
            } else {
                PaddingMode::Lenient
            };
            let bytes = SegmentedCipher::new(mode).try_decrypt(&read_input(&input)?, &key)?;
            String::from_utf8(bytes).context("decrypted payload is not UTF-8")
        }

        Command::Sign { private_key, input } => {
            let key = keys::import_private_key(&private_key)?;
            let signature = signer::sign(&read_input(&input)?, &key);
            if signature.is_empty() {
                bail!("signing failed");
            }
            Ok(signature)
        }

        Command::Verify {
            public_key,
            input,
            signature,
        } => {
            let key = keys::import_public_key(&public_key)?;
            let valid = signer::verify(&read_input(&input)?, &signature, &key);
            if !valid {
                bail!("signature does not verify");
            }
            Ok("ok".into())
        }

        Command::Canonicalize {
            sign,
            private_key,
            input,
        } => {
            let params = parse_params(&read_input(&input)?)?;
            let mut out = json!({
                "canonical": params.canonicalize(),
                "digest": params.digest(),
            });
            if sign {
                let key = keys::import_private_key(private_key.as_deref().unwrap_or_default())?;
                let signature = waas_envelope::sign_params(&params, &key);
                if signature.is_empty() {
                    bail!("no parameters to sign");
                }
                out["sign"] = Value::from(signature);
            }
            Ok(out.to_string())
        }

        Command::Envelope {
            app_id,
            private_key,
            sign,
            input,
        } => {
            let key = keys::import_private_key(&private_key)?;
            let plaintext = read_input(&input)?;
            let params = if sign {
                Some(parse_params(&plaintext)?)
            } else {
                None
            };
            let env = envelope::build(&app_id, &plaintext, &key, params.as_ref())?;
            Ok(envelope::encode_form(&env))
        }
    }
}

fn parse_params(text: &str) -> Result<SignablePayload> {
    let value: Value = serde_json::from_str(text).context("input is not JSON")?;
    if !value.is_object() {
        bail!("input must be a JSON object");
    }
    Ok(SignablePayload::from_json(&value))
}

fn read_input(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_owned());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_owned())
}
