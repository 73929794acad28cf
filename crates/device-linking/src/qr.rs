//! §6 "Device-linking QR": `Base64(UTF-8(JSON))` of
//! `{ device2PublicKey, accountId?, timestamp, version }`.

use base64ct::Encoding;
use serde::{Deserialize, Serialize};
use wallet_core::config::QR_CODE_MAX_AGE_MS;
use wallet_core::error::{DeviceLinkingErrorCode, WalletError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub device2_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub timestamp: u64,
    pub version: String,
}

impl QrPayload {
    pub fn new(device2_public_key: String, account_id: Option<String>, timestamp_ms: u64) -> Self {
        QrPayload { device2_public_key, account_id, timestamp: timestamp_ms, version: "1.0".to_string() }
    }

    /// Base64-encode the canonical JSON form, the literal QR code payload.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("QrPayload always serializes");
        base64ct::Base64::encode_string(&json)
    }

    /// Decode and validate timestamp freshness (spec §6 rejection reasons,
    /// §8 boundary behavior "QR with timestamp older than QR_CODE_MAX_AGE_MS
    /// yields DeviceLinkingError{code: SESSION_EXPIRED}").
    pub fn decode_and_validate(encoded: &str, now_ms: u64) -> Result<Self, WalletError> {
        let bytes = base64ct::Base64::decode_vec(encoded)
            .map_err(|e| invalid_qr(format!("invalid base64: {}", e)))?;
        let payload: QrPayload =
            serde_json::from_slice(&bytes).map_err(|e| invalid_qr(format!("invalid JSON: {}", e)))?;

        if payload.device2_public_key.is_empty() {
            return Err(invalid_qr("missing device2PublicKey".to_string()));
        }
        if let Some(account_id) = &payload.account_id {
            if account_id.is_empty() || !account_id.contains('.') && account_id.len() < 2 {
                return Err(invalid_qr(format!("invalid accountId syntax: {}", account_id)));
            }
        }
        if now_ms.saturating_sub(payload.timestamp) > QR_CODE_MAX_AGE_MS {
            return Err(WalletError::DeviceLinking(
                DeviceLinkingErrorCode::SessionExpired,
                "QR code has expired".to_string(),
            ));
        }
        Ok(payload)
    }
}

fn invalid_qr(message: String) -> WalletError {
    WalletError::DeviceLinking(DeviceLinkingErrorCode::InvalidQrData, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let payload = QrPayload::new("ed25519:abc".to_string(), Some("alice.near".to_string()), 1_000);
        let encoded = payload.encode();
        let decoded = QrPayload::decode_and_validate(&encoded, 1_500).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn missing_account_id_is_allowed_option_f() {
        let payload = QrPayload::new("ed25519:abc".to_string(), None, 1_000);
        let decoded = QrPayload::decode_and_validate(&payload.encode(), 1_000).unwrap();
        assert!(decoded.account_id.is_none());
    }

    #[test]
    fn expired_timestamp_is_rejected() {
        let payload = QrPayload::new("ed25519:abc".to_string(), None, 0);
        let err = QrPayload::decode_and_validate(&payload.encode(), QR_CODE_MAX_AGE_MS + 1).unwrap_err();
        assert!(matches!(
            err,
            WalletError::DeviceLinking(DeviceLinkingErrorCode::SessionExpired, _)
        ));
    }

    #[test]
    fn malformed_base64_is_rejected_as_invalid_qr_data() {
        let err = QrPayload::decode_and_validate("not-base64!!!", 0).unwrap_err();
        assert!(matches!(
            err,
            WalletError::DeviceLinking(DeviceLinkingErrorCode::InvalidQrData, _)
        ));
    }
}
