//! JSON-friendly action schema accepted from the manager (`ActionParams`),
//! validated and converted into the Borsh [`crate::types::Action`] enum that
//! actually gets signed.

use base64ct::Encoding;
use serde::{Deserialize, Serialize};

use crate::errors::SignerWorkerError;
use crate::types::{
    AccessKey, AccessKeyPermission, Action, AddKeyAction, CreateAccountAction, DeleteAccountAction,
    DeleteKeyAction, DeployContractAction, FunctionCallAction, FunctionCallPermission, PublicKey,
    StakeAction, TransferAction,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "actionType")]
pub enum ActionParams {
    CreateAccount,
    DeployContract {
        code: String, // base64-encoded
    },
    FunctionCall {
        method_name: String,
        args: serde_json::Value,
        gas: String,
        deposit: String,
    },
    Transfer {
        deposit: String,
    },
    Stake {
        stake: String,
        public_key: String,
    },
    AddKey {
        public_key: String,
        access_key: AccessKeyParams,
    },
    DeleteKey {
        public_key: String,
    },
    DeleteAccount {
        beneficiary_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyParams {
    pub nonce: Option<u64>,
    pub permission: AccessKeyPermissionParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AccessKeyPermissionParams {
    FullAccess,
    FunctionCall {
        receiver_id: String,
        method_names: Vec<String>,
        allowance: Option<String>,
    },
}

impl ActionParams {
    /// Validates and converts this request-shaped action into the on-chain
    /// [`Action`] that actually gets Borsh-serialized and signed.
    pub fn to_action(&self) -> Result<Action, SignerWorkerError> {
        Ok(match self {
            ActionParams::CreateAccount => Action::CreateAccount(CreateAccountAction),
            ActionParams::DeployContract { code } => {
                let code = base64ct::Base64::decode_vec(code).map_err(|e| {
                    SignerWorkerError::ActionValidationError(format!("invalid contract code base64: {}", e))
                })?;
                Action::DeployContract(DeployContractAction { code })
            }
            ActionParams::FunctionCall { method_name, args, gas, deposit } => {
                if method_name.is_empty() {
                    return Err(SignerWorkerError::ActionValidationError(
                        "methodName must not be empty".to_string(),
                    ));
                }
                let args_bytes = serde_json::to_vec(args).map_err(|e| {
                    SignerWorkerError::ActionValidationError(format!("failed to serialize args: {}", e))
                })?;
                Action::FunctionCall(Box::new(FunctionCallAction {
                    method_name: method_name.clone(),
                    args: args_bytes,
                    gas: parse_u64(gas, "gas")?,
                    deposit: parse_u128(deposit, "deposit")?,
                }))
            }
            ActionParams::Transfer { deposit } => Action::Transfer(TransferAction {
                deposit: parse_u128(deposit, "deposit")?,
            }),
            ActionParams::Stake { stake, public_key } => Action::Stake(Box::new(StakeAction {
                stake: parse_u128(stake, "stake")?,
                public_key: parse_public_key(public_key)?,
            })),
            ActionParams::AddKey { public_key, access_key } => {
                let permission = match &access_key.permission {
                    AccessKeyPermissionParams::FullAccess => AccessKeyPermission::FullAccess,
                    AccessKeyPermissionParams::FunctionCall { receiver_id, method_names, allowance } => {
                        AccessKeyPermission::FunctionCall(FunctionCallPermission {
                            allowance: allowance
                                .as_ref()
                                .map(|a| parse_u128(a, "allowance"))
                                .transpose()?,
                            receiver_id: receiver_id.parse().map_err(SignerWorkerError::ActionValidationError)?,
                            method_names: method_names.clone(),
                        })
                    }
                };
                Action::AddKey(Box::new(AddKeyAction {
                    public_key: parse_public_key(public_key)?,
                    access_key: AccessKey { nonce: access_key.nonce.unwrap_or(0), permission },
                }))
            }
            ActionParams::DeleteKey { public_key } => Action::DeleteKey(Box::new(DeleteKeyAction {
                public_key: parse_public_key(public_key)?,
            })),
            ActionParams::DeleteAccount { beneficiary_id } => Action::DeleteAccount(DeleteAccountAction {
                beneficiary_id: beneficiary_id.parse().map_err(SignerWorkerError::ActionValidationError)?,
            }),
        })
    }
}

fn parse_public_key(s: &str) -> Result<PublicKey, SignerWorkerError> {
    PublicKey::from_ed25519_near_str(s).map_err(SignerWorkerError::ActionValidationError)
}

fn parse_u64(s: &str, field: &str) -> Result<u64, SignerWorkerError> {
    s.parse()
        .map_err(|_| SignerWorkerError::ActionValidationError(format!("invalid {}: {}", field, s)))
}

fn parse_u128(s: &str, field: &str) -> Result<u128, SignerWorkerError> {
    s.parse()
        .map_err(|_| SignerWorkerError::ActionValidationError(format!("invalid {}: {}", field, s)))
}

/// Converts a batch of request-shaped actions, failing on the first invalid
/// one rather than producing a partially-built transaction.
pub fn build_actions_from_params(params: Vec<ActionParams>) -> Result<Vec<Action>, SignerWorkerError> {
    params.iter().map(ActionParams::to_action).collect()
}
