//! Wire message envelope exchanged with the worker's `postMessage` boundary.
//! Mirrors `vrf_worker::messages::{VrfWorkerMessage, VrfWorkerResponse}`,
//! scoped to the operations spec §4.7 names.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{MessageError, SignerWorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRequestType {
    DeriveNearKeypairAndEncrypt,
    DecryptPrivateKeyWithPrf,
    SignTransactionsWithActions,
    SignDelegateAction,
    SignNep413Message,
    RegisterDevice2WithDerivedKey,
    RecoverKeypairFromPasskey,
    SignTransactionWithKeyPair,
}

impl SignerRequestType {
    pub fn name(&self) -> &'static str {
        match self {
            SignerRequestType::DeriveNearKeypairAndEncrypt => "DERIVE_NEAR_KEYPAIR_AND_ENCRYPT",
            SignerRequestType::DecryptPrivateKeyWithPrf => "DECRYPT_PRIVATE_KEY_WITH_PRF",
            SignerRequestType::SignTransactionsWithActions => "SIGN_TRANSACTIONS_WITH_ACTIONS",
            SignerRequestType::SignDelegateAction => "SIGN_DELEGATE_ACTION",
            SignerRequestType::SignNep413Message => "SIGN_NEP413_MESSAGE",
            SignerRequestType::RegisterDevice2WithDerivedKey => "REGISTER_DEVICE2_WITH_DERIVED_KEY",
            SignerRequestType::RecoverKeypairFromPasskey => "RECOVER_KEYPAIR_FROM_PASSKEY",
            SignerRequestType::SignTransactionWithKeyPair => "SIGN_TRANSACTION_WITH_KEYPAIR",
        }
    }

    /// Whether this operation needs `WrapKeySeed` (received via the
    /// per-session `MessagePort`) to decrypt or derive key material.
    /// `SignTransactionWithKeyPair` is the one exception: the caller already
    /// supplies a plaintext private key, so no VRF worker round trip is
    /// required.
    pub fn requires_wrap_key(&self) -> bool {
        !matches!(self, SignerRequestType::SignTransactionWithKeyPair)
    }
}

impl TryFrom<&str> for SignerRequestType {
    type Error = SignerWorkerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(match value {
            "DERIVE_NEAR_KEYPAIR_AND_ENCRYPT" => SignerRequestType::DeriveNearKeypairAndEncrypt,
            "DECRYPT_PRIVATE_KEY_WITH_PRF" => SignerRequestType::DecryptPrivateKeyWithPrf,
            "SIGN_TRANSACTIONS_WITH_ACTIONS" => SignerRequestType::SignTransactionsWithActions,
            "SIGN_DELEGATE_ACTION" => SignerRequestType::SignDelegateAction,
            "SIGN_NEP413_MESSAGE" => SignerRequestType::SignNep413Message,
            "REGISTER_DEVICE2_WITH_DERIVED_KEY" => SignerRequestType::RegisterDevice2WithDerivedKey,
            "RECOVER_KEYPAIR_FROM_PASSKEY" => SignerRequestType::RecoverKeypairFromPasskey,
            "SIGN_TRANSACTION_WITH_KEYPAIR" => SignerRequestType::SignTransactionWithKeyPair,
            other => {
                return Err(SignerWorkerError::MissingRequiredData(format!(
                    "unknown request type: {}",
                    other
                )))
            }
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignerWorkerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub id: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl SignerWorkerMessage {
    pub fn parse_payload<T: DeserializeOwned>(&self, request_type: SignerRequestType) -> Result<T, SignerWorkerError> {
        let payload = self.payload.as_ref().ok_or_else(|| {
            SignerWorkerError::MissingRequiredData(format!("{}: missing payload", request_type.name()))
        })?;
        serde_json::from_value(payload.clone()).map_err(|e| {
            SignerWorkerError::MessageParsingError(MessageError::JsonParsingFailed(format!(
                "{}: {}",
                request_type.name(),
                e
            )))
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignerWorkerResponse {
    pub id: Option<String>,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl SignerWorkerResponse {
    pub fn success(id: Option<String>, data: Option<serde_json::Value>) -> Self {
        Self { id, success: true, data, error: None, error_code: None }
    }

    pub fn fail(id: Option<String>, err: &SignerWorkerError) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(crate::errors::scrub_secret_fields(&err.to_string())),
            error_code: Some(err.wire_code().to_string()),
        }
    }
}

/// Rejects any payload that smuggles a raw NEAR private key across the
/// manager→worker boundary (other than via `SignTransactionWithKeyPair`,
/// which is the one operation expected to carry it).
pub fn find_forbidden_field(value: &serde_json::Value, forbidden: &[&str]) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                if forbidden.contains(&key.as_str()) {
                    return Some(key.clone());
                }
                if let Some(found) = find_forbidden_field(v, forbidden) {
                    return Some(found);
                }
            }
            None
        }
        serde_json::Value::Array(items) => items.iter().find_map(|v| find_forbidden_field(v, forbidden)),
        _ => None,
    }
}
