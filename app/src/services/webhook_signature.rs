// storefront/src/services/webhook_signature.rs

//! `t=<unix>,v1=<hex>` signatures: HMAC-SHA256 over `"{t}.{body}"`.

use crate::errors::AppError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const TOLERANCE_SECS: i64 = 300;

fn mac_for(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, AppError> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
    .map_err(|e| AppError::Config(format!("Webhook secret unusable: {}", e)))?;
  mac.update(timestamp.to_string().as_bytes());
  mac.update(b".");
  mac.update(body);
  Ok(mac)
}

/// Header value for `body` signed at `timestamp`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, AppError> {
  let tag = mac_for(secret, timestamp, body)?.finalize().into_bytes();
  Ok(format!("t={},v1={}", timestamp, hex::encode(tag)))
}

/// Checks `header` against `body`. Any `v1` entry may match.
pub fn verify(secret: &str, header: &str, body: &[u8], now: i64) -> Result<(), AppError> {
  let mut timestamp: Option<i64> = None;
  let mut candidates: Vec<Vec<u8>> = Vec::new();
  for part in header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", v)) => timestamp = v.parse().ok(),
      Some(("v1", v)) => {
        if let Ok(bytes) = hex::decode(v) {
          candidates.push(bytes);
        }
      }
      _ => {}
    }
  }

  let timestamp = timestamp.ok_or_else(|| AppError::Auth("Webhook signature has no timestamp.".to_string()))?;
  if candidates.is_empty() {
    return Err(AppError::Auth("Webhook signature has no v1 entry.".to_string()));
  }
  if now.abs_diff(timestamp) > TOLERANCE_SECS.unsigned_abs() {
    return Err(AppError::Auth("Webhook signature timestamp outside tolerance.".to_string()));
  }

  let mac = mac_for(secret, timestamp, body)?;
  // verify_slice compares in constant time.
  if candidates.iter().any(|c| mac.clone().verify_slice(c).is_ok()) {
    Ok(())
  } else {
    Err(AppError::Auth("Webhook signature mismatch.".to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECRET: &str = "whsec_unit";
  const BODY: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;

  #[test]
  fn signed_body_verifies() {
    let header = sign(SECRET, 1_700_000_000, BODY).unwrap();
    assert!(verify(SECRET, &header, BODY, 1_700_000_100).is_ok());
  }

  #[test]
  fn tampered_body_or_wrong_secret_fails() {
    let header = sign(SECRET, 1_700_000_000, BODY).unwrap();
    assert!(verify(SECRET, &header, b"{}", 1_700_000_000).is_err());
    assert!(verify("whsec_other", &header, BODY, 1_700_000_000).is_err());
  }

  #[test]
  fn stale_signatures_are_rejected() {
    let header = sign(SECRET, 1_700_000_000, BODY).unwrap();
    let err = verify(SECRET, &header, BODY, 1_700_000_000 + TOLERANCE_SECS + 1).unwrap_err();
    assert!(matches!(err, AppError::Auth(ref m) if m.contains("tolerance")));
  }

  #[test]
  fn malformed_headers_are_rejected() {
    assert!(verify(SECRET, "garbage", BODY, 0).is_err());
    assert!(verify(SECRET, "t=5", BODY, 5).is_err());
    assert!(verify(SECRET, "t=5,v1=zz", BODY, 5).is_err());
  }

  #[test]
  fn extreme_timestamps_fall_outside_tolerance() {
    for t in [i64::MIN, i64::MAX] {
      let header = format!("t={},v1={}", t, "00".repeat(32));
      let err = verify(SECRET, &header, BODY, 1_700_000_000).unwrap_err();
      assert!(matches!(err, AppError::Auth(ref m) if m.contains("tolerance")));
    }
    let err = verify(SECRET, "t=0,v1=00", BODY, i64::MIN).unwrap_err();
    assert!(matches!(err, AppError::Auth(ref m) if m.contains("tolerance")));
  }

  #[test]
  fn any_v1_entry_may_match() {
    let good = sign(SECRET, 10, BODY).unwrap();
    let good_tag = good.split_once("v1=").unwrap().1;
    let header = format!("t=10,v1={},v1={}", "00".repeat(32), good_tag);
    assert!(verify(SECRET, &header, BODY, 10).is_ok());
  }
}
