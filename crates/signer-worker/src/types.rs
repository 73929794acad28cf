//! Hand-rolled NEAR wire types (no `near-primitives`/`near-crypto`
//! dependency, mirroring the teacher's own choice to keep this worker's
//! dependency footprint small): account ids, keys, signatures, actions, and
//! the `Transaction`/`SignedTransaction`/`DelegateAction` envelopes.

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Nonce = u64;
pub type Gas = u64;
pub type Balance = u128;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl FromStr for AccountId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 64 {
            return Err(format!("invalid account id length: {}", s.len()));
        }
        Ok(AccountId(s.to_string()))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CryptoHash(pub [u8; 32]);

impl fmt::Display for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PublicKey {
    pub key_type: u8,
    pub key_data: [u8; 32],
}

impl PublicKey {
    pub fn from_ed25519_bytes(bytes: [u8; 32]) -> Self {
        PublicKey { key_type: 0, key_data: bytes }
    }

    pub fn from_ed25519_near_str(s: &str) -> Result<Self, String> {
        let stripped = s
            .strip_prefix("ed25519:")
            .ok_or_else(|| "public key must be in ed25519: format".to_string())?;
        let decoded = bs58::decode(stripped)
            .into_vec()
            .map_err(|e| format!("invalid public key base58: {}", e))?;
        if decoded.len() != 32 {
            return Err(format!("public key must be 32 bytes, got {}", decoded.len()));
        }
        let key_data: [u8; 32] = decoded.try_into().unwrap();
        Ok(PublicKey::from_ed25519_bytes(key_data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Signature {
    pub key_type: u8,
    pub signature_data: [u8; 64],
}

impl Signature {
    pub fn from_ed25519_bytes(bytes: [u8; 64]) -> Self {
        Signature { key_type: 0, signature_data: bytes }
    }
}

/// `u128` has no native JSON representation; the wire format is a decimal
/// string, mirroring how NEAR RPC encodes deposits/balances.
pub mod balance_as_str {
    use super::Balance;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Balance, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Balance, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<Balance>().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallAction {
    pub method_name: String,
    #[serde(with = "serde_bytes")]
    pub args: Vec<u8>,
    pub gas: Gas,
    #[serde(with = "balance_as_str")]
    pub deposit: Balance,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAction {
    #[serde(with = "balance_as_str")]
    pub deposit: Balance,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeAction {
    #[serde(with = "balance_as_str")]
    pub stake: Balance,
    pub public_key: PublicKey,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountAction;

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountAction {
    pub beneficiary_id: AccountId,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployContractAction {
    #[serde(with = "serde_bytes")]
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallPermission {
    #[serde(skip_serializing_if = "Option::is_none", with = "option_balance_as_str")]
    pub allowance: Option<Balance>,
    pub receiver_id: AccountId,
    pub method_names: Vec<String>,
}

mod option_balance_as_str {
    use super::Balance;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Balance>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Balance>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|v| v.parse::<Balance>().map_err(serde::de::Error::custom)).transpose()
    }
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AccessKeyPermission {
    FunctionCall(FunctionCallPermission),
    FullAccess,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    pub nonce: Nonce,
    pub permission: AccessKeyPermission,
}

impl AccessKey {
    pub fn full_access() -> Self {
        AccessKey { nonce: 0, permission: AccessKeyPermission::FullAccess }
    }
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddKeyAction {
    pub public_key: PublicKey,
    pub access_key: AccessKey,
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteKeyAction {
    pub public_key: PublicKey,
}

/// One NEAR action. Borsh-discriminated in declaration order, matching the
/// on-chain `Action` enum; Serde tag is only used for internal debugging
/// (actions never round-trip through JSON on the wire, only through Borsh).
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "actionType")]
pub enum Action {
    CreateAccount(CreateAccountAction),
    DeployContract(DeployContractAction),
    FunctionCall(Box<FunctionCallAction>),
    Transfer(TransferAction),
    Stake(Box<StakeAction>),
    AddKey(Box<AddKeyAction>),
    DeleteKey(Box<DeleteKeyAction>),
    DeleteAccount(DeleteAccountAction),
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub signer_id: AccountId,
    pub public_key: PublicKey,
    pub nonce: Nonce,
    pub receiver_id: AccountId,
    pub block_hash: CryptoHash,
    pub actions: Vec<Action>,
}

impl Transaction {
    /// Borsh-serializes the unsigned transaction and SHA-256 hashes it; the
    /// hash is what gets ed25519-signed, not a re-hash of the signed bytes.
    pub fn get_hash_and_size(&self) -> (CryptoHash, u64) {
        let bytes = borsh::to_vec(self).expect("Transaction Borsh serialization is infallible");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash: [u8; 32] = hasher.finalize().into();
        (CryptoHash(hash), bytes.len() as u64)
    }
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
}

impl SignedTransaction {
    pub fn to_borsh_bytes(&self) -> Result<Vec<u8>, String> {
        borsh::to_vec(self).map_err(|e| format!("failed to Borsh-serialize SignedTransaction: {}", e))
    }

    pub fn from_borsh_bytes(bytes: &[u8]) -> Result<Self, String> {
        borsh::from_slice(bytes).map_err(|e| format!("failed to Borsh-deserialize SignedTransaction: {}", e))
    }
}

/// NEP-461 meta-transaction delegate action.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct DelegateAction {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub actions: Vec<Action>,
    pub nonce: Nonce,
    pub max_block_height: u64,
    pub public_key: PublicKey,
}

impl DelegateAction {
    /// NEP-461 hashing: the delegate action is Borsh-serialized with a
    /// discriminant prefix (`SIGN_DELEGATE_NUMBER = 2^30 + 366`) before
    /// SHA-256 hashing, matching the convention used for NEP-413 messages.
    pub fn hash(&self) -> [u8; 32] {
        const SIGN_DELEGATE_NUMBER: u32 = (1u32 << 30) + 366;
        let mut prefixed = SIGN_DELEGATE_NUMBER.to_le_bytes().to_vec();
        prefixed.extend_from_slice(&borsh::to_vec(self).expect("DelegateAction Borsh serialization is infallible"));
        let mut hasher = Sha256::new();
        hasher.update(&prefixed);
        hasher.finalize().into()
    }
}

#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct SignedDelegate {
    pub delegate_action: DelegateAction,
    pub signature: Signature,
}
