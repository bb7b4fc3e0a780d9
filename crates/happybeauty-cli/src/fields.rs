// Callback field parsing for --field flags
//
// Parses key=value pairs into a flat provider parameter map.
// Example: --field out_trade_no=PAY_1 --field total_amount=9.90

use anyhow::{anyhow, Result};
use happybeauty_crypto::CallbackParams;

/// Parses a list of key=value strings into callback parameters.
///
/// Values may contain `=`; only the first one splits. A key given twice
/// is an error.
pub fn parse_fields(args: &[String]) -> Result<CallbackParams> {
    let mut params = CallbackParams::new();

    for arg in args {
        let (key, value) = parse_key_value(arg)?;
        if params.insert(key.clone(), value).is_some() {
            return Err(anyhow!("Duplicate field: '{}'", key));
        }
    }

    Ok(params)
}

/// Parses a single "key=value" string.
fn parse_key_value(arg: &str) -> Result<(String, String)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid field format: '{}'. Expected 'key=value'", arg))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Empty key in field: '{}'", arg));
    }

    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_fields() {
        let params = parse_fields(&args(&["out_trade_no=PAY_1", "total_amount=9.90"])).unwrap();
        assert_eq!(params.get("out_trade_no"), Some("PAY_1"));
        assert_eq!(params.get("total_amount"), Some("9.90"));
    }

    #[test]
    fn test_value_with_equals_sign() {
        let params = parse_fields(&args(&["passback_params=a=b"])).unwrap();
        assert_eq!(params.get("passback_params"), Some("a=b"));
    }

    #[test]
    fn test_empty_value_kept() {
        let params = parse_fields(&args(&["buyer_id="])).unwrap();
        assert_eq!(params.get("buyer_id"), Some(""));
    }

    #[test]
    fn test_invalid_format_no_equals() {
        let err = parse_fields(&args(&["trade_status"])).unwrap_err();
        assert!(err.to_string().contains("Expected 'key=value'"));
    }

    #[test]
    fn test_invalid_format_empty_key() {
        assert!(parse_fields(&args(&[" =value"])).is_err());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = parse_fields(&args(&["a=1", "a=2"])).unwrap_err();
        assert!(err.to_string().contains("Duplicate field"));
    }

    #[test]
    fn test_whitespace_trimming() {
        let params = parse_fields(&args(&["  trade_no  =  2026  "])).unwrap();
        assert_eq!(params.get("trade_no"), Some("2026"));
    }
}
