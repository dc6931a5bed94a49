use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::app_error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

fn hmac_hex(secret: &str, timestamp: &str, body: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(format!("{}.{}", timestamp, body).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Produces a `t=<unix>,v1=<hex>` header the way the gateway signs deliveries.
pub fn sign_webhook_payload(secret: &str, timestamp: i64, body: &str) -> AppResult<String> {
    let signature = hmac_hex(secret, &timestamp.to_string(), body)?;
    Ok(format!("t={},v1={}", timestamp, signature))
}

/// Checks a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against `payload`.
///
/// Any matching `v1` is accepted. Comparison runs over decoded bytes in
/// constant time, and the timestamp must be within `tolerance_secs` of
/// `now_ts` in either direction.
pub fn verify_webhook_signature(
    payload: &str,
    signature_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now_ts: i64,
) -> AppResult<()> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::SignatureInvalid("Missing timestamp in signature".into()))?;
    if signatures.is_empty() {
        return Err(AppError::SignatureInvalid("Missing signature".into()));
    }
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| AppError::SignatureInvalid("Invalid timestamp".into()))?;

    let expected = hex::decode(hmac_hex(secret, timestamp, payload)?)
        .map_err(|_| AppError::Internal("HMAC error".into()))?;

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| bool::from(bytes.ct_eq(&expected)))
            .unwrap_or(false)
    });
    if !matched {
        return Err(AppError::SignatureInvalid("Invalid signature".into()));
    }
    if (now_ts - ts).abs() > tolerance_secs {
        return Err(AppError::SignatureInvalid(
            "Timestamp outside tolerance".into(),
        ));
    }
    Ok(())
}
