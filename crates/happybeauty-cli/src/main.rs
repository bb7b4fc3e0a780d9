// HappyBeauty CLI - operator tool for payment provider keys, redeem codes
// and simulated provider callbacks

mod fields;
mod keystore;

use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use happybeauty_crypto::{
    encode_rsa2_private_key, encode_rsa2_public_key, encode_signing_key, encode_verifying_key,
    generate_keypair, generate_rsa2_keypair, verify_notification, CallbackParams, ParamSigner,
    SignType, SIGN_FIELD, SIGN_TYPE_FIELD,
};

/// HappyBeauty - payment and credit operations tool
#[derive(Parser)]
#[command(name = "happybeauty")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair for the merchant app or a test provider
    Keygen {
        /// Signature scheme: RSA2 or ED25519
        #[arg(short = 't', long, default_value = "RSA2")]
        sign_type: SignType,

        /// Write <PREFIX>.key and <PREFIX>.pub instead of printing
        #[arg(short, long, value_name = "PREFIX")]
        out: Option<PathBuf>,

        /// Overwrite existing key files
        #[arg(short, long)]
        force: bool,
    },
    /// Mint a redeem code valid for one day
    MintCode {
        /// Credits the code grants
        #[arg(short, long)]
        credits: i32,

        /// Day the code is valid on (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Sign provider callback fields, playing the payment provider
    SignCallback {
        /// Signature scheme: RSA2 or ED25519
        #[arg(short = 't', long, default_value = "RSA2")]
        sign_type: SignType,

        /// Provider signing key as base64, or @path to a key file
        #[arg(short, long)]
        key: String,

        /// Callback fields (can be specified multiple times)
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// POST the signed form to this notify URL and print the reply
        #[arg(long, value_name = "URL")]
        send: Option<String>,
    },
    /// Verify a form-encoded callback body
    VerifyCallback {
        /// Signature scheme: RSA2 or ED25519
        #[arg(short = 't', long, default_value = "RSA2")]
        sign_type: SignType,

        /// Provider public key as base64, or @path to a key file
        #[arg(short, long)]
        public_key: String,

        /// The form-encoded body, e.g. "out_trade_no=PAY_1&...&sign=..."
        body: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Keygen {
            sign_type,
            out,
            force,
        } => handle_keygen(sign_type, out, force),
        Commands::MintCode { credits, date } => handle_mint_code(credits, date),
        Commands::SignCallback {
            sign_type,
            key,
            fields,
            send,
        } => handle_sign_callback(sign_type, &key, &fields, send.as_deref()),
        Commands::VerifyCallback {
            sign_type,
            public_key,
            body,
        } => handle_verify_callback(sign_type, &public_key, &body),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Fresh base64 private and public keys for `sign_type`.
fn generate_encoded_keypair(sign_type: SignType) -> anyhow::Result<(String, String)> {
    match sign_type {
        SignType::Rsa2 => {
            let (private_key, public_key) = generate_rsa2_keypair()?;
            Ok((
                encode_rsa2_private_key(&private_key)?,
                encode_rsa2_public_key(&public_key)?,
            ))
        }
        SignType::Ed25519 => {
            let (signing_key, verifying_key) = generate_keypair();
            Ok((
                encode_signing_key(&signing_key),
                encode_verifying_key(&verifying_key),
            ))
        }
    }
}

fn handle_keygen(sign_type: SignType, out: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    use colored::Colorize;

    let (private_key, public_key) = generate_encoded_keypair(sign_type)?;

    match out {
        Some(prefix) => {
            let files = keystore::write_keypair(&prefix, &private_key, &public_key, force)?;
            println!(
                "{} {}",
                "✓".green().bold(),
                format!("{} keypair generated", sign_type).green()
            );
            println!();
            println!("  Private key: {}", files.private_key.display());
            println!("  Public key:  {}", files.public_key.display());
        }
        None => {
            let json = serde_json::json!({
                "private_key": private_key,
                "public_key": public_key,
                "sign_type": sign_type.as_str(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}

fn handle_mint_code(credits: i32, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let day = date.unwrap_or_else(|| Local::now().date_naive());
    let code = happybeauty_redeem::mint(credits, day)
        .map_err(|e| anyhow::anyhow!("Cannot mint code for {} credits: {}", credits, e))?;

    println!("{}", code);
    Ok(())
}

/// Signs `fields` as a provider notification, adding `sign_type` if
/// absent, and returns the form body.
fn signed_form(
    sign_type: SignType,
    key_arg: &str,
    field_args: &[String],
) -> anyhow::Result<(CallbackParams, String)> {
    let signer = ParamSigner::from_base64(sign_type, &keystore::load_key_text(key_arg)?)
        .context("Failed to parse signing key")?;
    let mut params = fields::parse_fields(field_args)?;

    if params.get(SIGN_FIELD).is_some() {
        anyhow::bail!("Do not pass a '{}' field; it is computed", SIGN_FIELD);
    }
    if params.get(SIGN_TYPE_FIELD).is_none() {
        params.insert(SIGN_TYPE_FIELD, sign_type.as_str());
    }

    let signature = signer.sign_notification(&params)?;
    params.insert(SIGN_FIELD, signature);

    let body = serde_urlencoded::to_string(&params).context("Failed to encode form body")?;
    Ok((params, body))
}

fn handle_sign_callback(
    sign_type: SignType,
    key: &str,
    field_args: &[String],
    send: Option<&str>,
) -> anyhow::Result<()> {
    use colored::Colorize;

    let (params, body) = signed_form(sign_type, key, field_args)?;

    let Some(url) = send else {
        println!("{}", body);
        return Ok(());
    };

    let form: Vec<(&str, &str)> = params.iter().collect();
    let reply = match ureq::post(url).send_form(&form) {
        Ok(response) => response.into_string()?,
        Err(ureq::Error::Status(code, response)) => {
            let text = response.into_string().unwrap_or_default();
            anyhow::bail!("Server answered HTTP {}: {}", code, text);
        }
        Err(e) => return Err(e).context("Failed to send callback"),
    };

    if reply.trim() == "success" {
        println!("{} Server replied {}", "✓".green().bold(), reply.trim().green());
    } else {
        println!("{} Server replied {}", "✗".red().bold(), reply.trim().red());
    }
    Ok(())
}

fn handle_verify_callback(sign_type: SignType, public_key: &str, body: &str) -> anyhow::Result<()> {
    use colored::Colorize;

    let public_key = keystore::load_key_text(public_key)?;
    let fields: Vec<(String, String)> =
        serde_urlencoded::from_str(body.trim()).context("Failed to parse form body")?;
    let (params, signature) = fields.into_iter().collect::<CallbackParams>().take_signature();

    let signature = signature.context("Body has no 'sign' field")?;
    if verify_notification(sign_type, &public_key, &params, &signature) {
        println!("{} {}", "✓".green().bold(), "Signature verified".green());
        if let Some(order) = params.get("out_trade_no") {
            println!();
            println!("  Order:  {}", order);
            println!("  Status: {}", params.get("trade_status").unwrap_or("-"));
            println!("  Amount: {}", params.get("total_amount").unwrap_or("-"));
        }
        Ok(())
    } else {
        eprintln!("{} {}", "✗".red().bold(), "Signature verification failed".red());
        anyhow::bail!("invalid signature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER_KEY: &str = include_str!("../../../fixtures/keys/provider_rsa2.key");
    const PROVIDER_PUB: &str = include_str!("../../../fixtures/keys/provider_rsa2.pub");

    fn callback_fields() -> Vec<String> {
        vec![
            "out_trade_no=PAY_1".to_string(),
            "trade_status=TRADE_SUCCESS".to_string(),
            "total_amount=9.90".to_string(),
        ]
    }

    #[test]
    fn test_signed_form_verifies() {
        let (params, body) = signed_form(SignType::Rsa2, PROVIDER_KEY, &callback_fields()).unwrap();
        assert_eq!(params.get(SIGN_TYPE_FIELD), Some("RSA2"));
        assert!(body.contains("sign="));

        let (rest, signature) = params.take_signature();
        assert!(verify_notification(
            SignType::Rsa2,
            PROVIDER_PUB,
            &rest,
            &signature.unwrap()
        ));
    }

    #[test]
    fn test_signed_form_ed25519() {
        let (signing_key, verifying_key) = generate_keypair();
        let (params, _) = signed_form(
            SignType::Ed25519,
            &encode_signing_key(&signing_key),
            &callback_fields(),
        )
        .unwrap();
        assert_eq!(params.get(SIGN_TYPE_FIELD), Some("ED25519"));

        let (rest, signature) = params.take_signature();
        assert!(verify_notification(
            SignType::Ed25519,
            &encode_verifying_key(&verifying_key),
            &rest,
            &signature.unwrap()
        ));
    }

    #[test]
    fn test_signed_form_rejects_sign_field() {
        let fields = vec!["sign=forged".to_string()];
        assert!(signed_form(SignType::Rsa2, PROVIDER_KEY, &fields).is_err());
    }

    #[test]
    fn test_signed_form_rejects_key_of_other_scheme() {
        assert!(signed_form(SignType::Ed25519, PROVIDER_KEY, &callback_fields()).is_err());
    }

    #[test]
    fn test_sign_type_flag_parses() {
        let cli = Cli::try_parse_from(["happybeauty", "keygen", "--sign-type", "ed25519"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Keygen {
                sign_type: SignType::Ed25519,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["happybeauty", "verify-callback", "-p", "key", "a=1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::VerifyCallback {
                sign_type: SignType::Rsa2,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["happybeauty", "keygen", "-t", "RSA"]).is_err());
    }
}
