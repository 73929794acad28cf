//! Wire message envelope exchanged with the worker's `postMessage` boundary.
//! Mirrors `VrfWorkerMessage`/`VrfWorkerResponse` from the teacher worker,
//! scoped to the operations spec §4.6 names.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{MessageError, VrfWorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrfRequestType {
    Ping,
    CheckVrfStatus,
    Logout,
    BootstrapGenerate,
    DeriveVrfFromPrf,
    UnlockVrf,
    MintSessionKeysAndSendToSigner,
    DispenseSessionKey,
    Shamir3PassEncrypt,
    Shamir3PassDecrypt,
}

impl VrfRequestType {
    pub fn name(&self) -> &'static str {
        match self {
            VrfRequestType::Ping => "PING",
            VrfRequestType::CheckVrfStatus => "CHECK_VRF_STATUS",
            VrfRequestType::Logout => "LOGOUT",
            VrfRequestType::BootstrapGenerate => "BOOTSTRAP_GENERATE",
            VrfRequestType::DeriveVrfFromPrf => "DERIVE_VRF_FROM_PRF",
            VrfRequestType::UnlockVrf => "UNLOCK_VRF",
            VrfRequestType::MintSessionKeysAndSendToSigner => "MINT_SESSION_KEYS_AND_SEND_TO_SIGNER",
            VrfRequestType::DispenseSessionKey => "DISPENSE_SESSION_KEY",
            VrfRequestType::Shamir3PassEncrypt => "SHAMIR_3PASS_ENCRYPT",
            VrfRequestType::Shamir3PassDecrypt => "SHAMIR_3PASS_DECRYPT",
        }
    }
}

impl TryFrom<&str> for VrfRequestType {
    type Error = VrfWorkerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(match value {
            "PING" => VrfRequestType::Ping,
            "CHECK_VRF_STATUS" => VrfRequestType::CheckVrfStatus,
            "LOGOUT" => VrfRequestType::Logout,
            "BOOTSTRAP_GENERATE" => VrfRequestType::BootstrapGenerate,
            "DERIVE_VRF_FROM_PRF" => VrfRequestType::DeriveVrfFromPrf,
            "UNLOCK_VRF" => VrfRequestType::UnlockVrf,
            "MINT_SESSION_KEYS_AND_SEND_TO_SIGNER" => VrfRequestType::MintSessionKeysAndSendToSigner,
            "DISPENSE_SESSION_KEY" => VrfRequestType::DispenseSessionKey,
            "SHAMIR_3PASS_ENCRYPT" => VrfRequestType::Shamir3PassEncrypt,
            "SHAMIR_3PASS_DECRYPT" => VrfRequestType::Shamir3PassDecrypt,
            other => return Err(VrfWorkerError::MissingRequiredData(format!("unknown request type: {}", other))),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VrfWorkerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub id: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl VrfWorkerMessage {
    pub fn parse_payload<T: DeserializeOwned>(&self, request_type: VrfRequestType) -> Result<T, VrfWorkerError> {
        let payload = self.payload.as_ref().ok_or_else(|| {
            VrfWorkerError::MissingRequiredData(format!("{}: missing payload", request_type.name()))
        })?;
        serde_json::from_value(payload.clone()).map_err(|e| {
            VrfWorkerError::MessageParsingError(MessageError::JsonParsingFailed(format!(
                "{}: {}",
                request_type.name(),
                e
            )))
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VrfWorkerResponse {
    pub id: Option<String>,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl VrfWorkerResponse {
    pub fn success(id: Option<String>, data: Option<serde_json::Value>) -> Self {
        Self { id, success: true, data, error: None, error_code: None }
    }

    pub fn fail(id: Option<String>, err: &VrfWorkerError) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_code: Some(err.wire_code().to_string()),
        }
    }
}

/// Rejects any payload that smuggles a raw NEAR private key across the
/// worker boundary, regardless of where in the JSON it appears.
pub fn find_forbidden_near_secret(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                if key == "near_sk" || key == "nearPrivateKey" || key == "near_private_key" {
                    return Some(key.clone());
                }
                if let Some(found) = find_forbidden_near_secret(v) {
                    return Some(found);
                }
            }
            None
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_forbidden_near_secret),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_type_names_round_trip() {
        for t in [
            VrfRequestType::BootstrapGenerate,
            VrfRequestType::DeriveVrfFromPrf,
            VrfRequestType::UnlockVrf,
            VrfRequestType::MintSessionKeysAndSendToSigner,
            VrfRequestType::DispenseSessionKey,
            VrfRequestType::Shamir3PassEncrypt,
            VrfRequestType::Shamir3PassDecrypt,
        ] {
            assert_eq!(VrfRequestType::try_from(t.name()).unwrap().name(), t.name());
        }
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        assert!(VrfRequestType::try_from("NOT_A_REAL_TYPE").is_err());
    }

    #[test]
    fn finds_forbidden_near_secret_key_nested_in_payload() {
        let payload = serde_json::json!({ "outer": { "near_sk": "ed25519:abc" } });
        assert_eq!(find_forbidden_near_secret(&payload), Some("near_sk".to_string()));
    }

    #[test]
    fn allows_payloads_without_forbidden_fields() {
        let payload = serde_json::json!({ "prfOutput": "abcd", "nearAccountId": "alice.near" });
        assert_eq!(find_forbidden_near_secret(&payload), None);
    }
}
