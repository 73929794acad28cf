//! The 8 in-scope signer-worker operations (spec §4.7), as plain synchronous
//! functions over typed request/result structs — host-testable without any
//! `wasm-bindgen` glue. The wasm32 dispatch in [`crate`] decodes the wire
//! envelope into these request types, calls the matching handler, and
//! re-encodes the result.

use ed25519_dalek::Signer as _;
use serde::{Deserialize, Serialize};

use crate::actions::{build_actions_from_params, ActionParams};
use crate::crypto::{
    derive_ed25519_key_from_prf_output, encrypt_data_chacha20, signing_key_from_near_private_key, WrapKey,
};
use crate::errors::SignerWorkerError;
use crate::nonce_manager::NonceManager;
use crate::transaction::{build_transaction_with_actions, calculate_transaction_hash, hash_delegate_action, sign_transaction};
use crate::types::{DelegateAction, PublicKey, Signature, SignedDelegate};

/// Shared ciphertext + nonce for an already-derived/encrypted NEAR private
/// key, as persisted by the caller after `DeriveNearKeypairAndEncrypt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionPayload {
    pub encrypted_private_key_data: String,
    pub encrypted_private_key_chacha20_nonce_b64u: String,
}

fn decrypt_signing_key(
    decryption: &DecryptionPayload,
    wrap_key: &WrapKey,
) -> Result<(ed25519_dalek::SigningKey, [u8; 32]), SignerWorkerError> {
    let kek = wrap_key.derive_kek()?;
    let private_key_str = crate::crypto::decrypt_data_chacha20(
        &decryption.encrypted_private_key_data,
        &decryption.encrypted_private_key_chacha20_nonce_b64u,
        &kek,
    )?;
    signing_key_from_near_private_key(&private_key_str)
}

// ---------------------------------------------------------------------
// 1. DeriveNearKeypairAndEncrypt
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveNearKeypairAndEncryptRequest {
    pub near_account_id: String,
    pub prf_second_b64u: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveNearKeypairAndEncryptResult {
    pub near_account_id: String,
    pub public_key: String,
    pub encrypted_data: String,
    pub iv: String,
    pub wrap_key_salt: String,
}

/// **Handles:** `DeriveNearKeypairAndEncrypt`. Derives the NEAR ed25519
/// keypair from `PRF.second`, encrypts the private key under a key derived
/// from `WrapKeySeed`, and returns the public key plus ciphertext for
/// persistence.
pub fn derive_near_keypair_and_encrypt(
    request: DeriveNearKeypairAndEncryptRequest,
    wrap_key: &WrapKey,
) -> Result<DeriveNearKeypairAndEncryptResult, SignerWorkerError> {
    let (private_key, public_key) =
        derive_ed25519_key_from_prf_output(&request.prf_second_b64u, &request.near_account_id)?;

    let kek = wrap_key.derive_kek()?;
    let wrap_key_salt_bytes = crate::crypto::base64_url_decode(wrap_key.salt_b64u())?;
    let encrypted = encrypt_data_chacha20(&private_key, &kek)?.with_wrap_key_salt(&wrap_key_salt_bytes);

    Ok(DeriveNearKeypairAndEncryptResult {
        near_account_id: request.near_account_id,
        public_key,
        encrypted_data: encrypted.encrypted_near_key_data_b64u,
        iv: encrypted.chacha20_nonce_b64u,
        wrap_key_salt: wrap_key.salt_b64u().to_string(),
    })
}

// ---------------------------------------------------------------------
// 2. DecryptPrivateKeyWithPrf
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptPrivateKeyRequest {
    pub near_account_id: String,
    #[serde(flatten)]
    pub decryption: DecryptionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptPrivateKeyResult {
    pub private_key: String,
    pub near_account_id: String,
}

/// **Handles:** `DecryptPrivateKeyWithPrf`. Decrypts a previously-stored NEAR
/// private key using `WrapKeySeed`, returning it in NEAR wire format.
pub fn decrypt_private_key_with_prf(
    request: DecryptPrivateKeyRequest,
    wrap_key: &WrapKey,
) -> Result<DecryptPrivateKeyResult, SignerWorkerError> {
    let (signing_key, public_key_bytes) = decrypt_signing_key(&request.decryption, wrap_key)?;
    let mut full = Vec::with_capacity(64);
    full.extend_from_slice(signing_key.as_bytes());
    full.extend_from_slice(&public_key_bytes);
    let private_key_near = format!("ed25519:{}", bs58::encode(&full).into_string());
    Ok(DecryptPrivateKeyResult { private_key: private_key_near, near_account_id: request.near_account_id })
}

// ---------------------------------------------------------------------
// 3. SignTransactionsWithActions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub receiver_id: String,
    pub actions: Vec<ActionParams>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionsWithActionsRequest {
    pub near_account_id: String,
    pub next_nonce: u64,
    pub block_hash_b58: String,
    pub tx_signing_requests: Vec<TransactionInput>,
    pub decryption: DecryptionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSignResult {
    pub success: bool,
    pub transaction_hashes: Vec<String>,
    pub signed_transactions_borsh_b64u: Vec<String>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

impl TransactionSignResult {
    fn failed(logs: Vec<String>, error: String) -> Self {
        TransactionSignResult { success: false, transaction_hashes: vec![], signed_transactions_borsh_b64u: vec![], logs, error: Some(error) }
    }
}

/// **Handles:** `SignTransactionsWithActions`. Decrypts the private key once,
/// reserves a contiguous nonce range from `NonceManager` for the batch, and
/// signs each `TransactionInput` in order, releasing the reservation if any
/// transaction fails to build or sign.
pub fn sign_transactions_with_actions(
    request: SignTransactionsWithActionsRequest,
    wrap_key: &WrapKey,
    nonce_manager: &mut NonceManager,
) -> Result<TransactionSignResult, SignerWorkerError> {
    let mut logs = Vec::new();
    if request.tx_signing_requests.is_empty() {
        return Ok(TransactionSignResult::failed(logs, "no transactions provided".to_string()));
    }

    let (signing_key, public_key_bytes) = decrypt_signing_key(&request.decryption, wrap_key)?;
    let public_key_str = format!("ed25519:{}", bs58::encode(public_key_bytes).into_string());

    let count = request.tx_signing_requests.len() as u64;
    nonce_manager.reserve(&public_key_str, request.next_nonce, count)?;

    let block_hash_bytes = bs58::decode(&request.block_hash_b58)
        .into_vec()
        .map_err(|e| SignerWorkerError::invalid_format(format!("invalid block hash: {}", e)))?;

    let mut hashes = Vec::with_capacity(request.tx_signing_requests.len());
    let mut signed = Vec::with_capacity(request.tx_signing_requests.len());

    for (index, tx_input) in request.tx_signing_requests.iter().enumerate() {
        let nonce = nonce_manager.nonce_at(&public_key_str, index as u64).expect("reserved above");
        let actions = match build_actions_from_params(tx_input.actions.clone()) {
            Ok(a) => a,
            Err(e) => {
                nonce_manager.release(&public_key_str);
                return Ok(TransactionSignResult::failed(logs, format!("transaction {}: {}", index + 1, e)));
            }
        };
        let tx = match build_transaction_with_actions(
            &request.near_account_id,
            &tx_input.receiver_id,
            nonce,
            &block_hash_bytes,
            &public_key_bytes,
            actions,
        ) {
            Ok(tx) => tx,
            Err(e) => {
                nonce_manager.release(&public_key_str);
                return Ok(TransactionSignResult::failed(logs, format!("transaction {}: {}", index + 1, e)));
            }
        };
        let signed_bytes = match sign_transaction(tx, &signing_key) {
            Ok(b) => b,
            Err(e) => {
                nonce_manager.release(&public_key_str);
                return Ok(TransactionSignResult::failed(logs, format!("transaction {}: {}", index + 1, e)));
            }
        };
        hashes.push(calculate_transaction_hash(&signed_bytes));
        signed.push(crate::crypto::base64_url_encode(&signed_bytes));
        logs.push(format!("transaction {} signed (nonce {})", index + 1, nonce));
    }

    nonce_manager.commit(&public_key_str);
    Ok(TransactionSignResult { success: true, transaction_hashes: hashes, signed_transactions_borsh_b64u: signed, logs, error: None })
}

// ---------------------------------------------------------------------
// 4. SignDelegateAction (NEP-461)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignDelegateActionRequest {
    pub sender_id: String,
    pub receiver_id: String,
    pub actions: Vec<ActionParams>,
    pub nonce: u64,
    pub max_block_height: u64,
    pub decryption: DecryptionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateSignResult {
    pub success: bool,
    pub hash_hex: Option<String>,
    pub signed_delegate_borsh_b64u: Option<String>,
    pub error: Option<String>,
}

/// **Handles:** `SignDelegateAction`. Builds and signs a NEP-461 delegate
/// action for relayer submission.
pub fn sign_delegate_action(
    request: SignDelegateActionRequest,
    wrap_key: &WrapKey,
) -> Result<DelegateSignResult, SignerWorkerError> {
    if request.nonce == 0 {
        return Ok(DelegateSignResult { success: false, hash_hex: None, signed_delegate_borsh_b64u: None, error: Some("delegate nonce must be non-zero".to_string()) });
    }

    let (signing_key, public_key_bytes) = decrypt_signing_key(&request.decryption, wrap_key)?;
    let actions = build_actions_from_params(request.actions)?;

    let delegate_action = DelegateAction {
        sender_id: request.sender_id.parse().map_err(SignerWorkerError::invalid_format)?,
        receiver_id: request.receiver_id.parse().map_err(SignerWorkerError::invalid_format)?,
        actions,
        nonce: request.nonce,
        max_block_height: request.max_block_height,
        public_key: PublicKey::from_ed25519_bytes(public_key_bytes),
    };

    let hash = hash_delegate_action(&delegate_action);
    let signature_bytes = signing_key.sign(&hash).to_bytes();
    let signed_delegate = SignedDelegate { delegate_action, signature: Signature::from_ed25519_bytes(signature_bytes) };
    let bytes = borsh::to_vec(&signed_delegate).map_err(|e| SignerWorkerError::invalid_format(e.to_string()))?;

    Ok(DelegateSignResult {
        success: true,
        hash_hex: Some(hash.iter().map(|b| format!("{:02x}", b)).collect()),
        signed_delegate_borsh_b64u: Some(crate::crypto::base64_url_encode(&bytes)),
        error: None,
    })
}

// ---------------------------------------------------------------------
// 5. SignNep413Message
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignNep413Request {
    pub message: String,
    pub recipient: String,
    pub nonce_b64: String,
    pub state: Option<String>,
    pub account_id: String,
    pub decryption: DecryptionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignNep413Result {
    pub account_id: String,
    pub public_key: String,
    pub signature_b64: String,
    pub state: Option<String>,
}

#[derive(borsh::BorshSerialize)]
struct Nep413Payload {
    message: String,
    recipient: String,
    nonce: [u8; 32],
    state: Option<String>,
}

/// **Handles:** `SignNep413Message`. Signs an off-chain NEP-413 message:
/// Borsh-serialize `{message, recipient, nonce, state}`, prefix with the
/// NEP-413 domain separator, SHA-256 hash, and ed25519-sign.
pub fn sign_nep413_message(
    request: SignNep413Request,
    wrap_key: &WrapKey,
) -> Result<SignNep413Result, SignerWorkerError> {
    use sha2::{Digest, Sha256};

    let nonce_bytes = base64ct::Base64::decode_vec(&request.nonce_b64)
        .map_err(|e| SignerWorkerError::invalid_format(format!("invalid nonce base64: {}", e)))?;
    if nonce_bytes.len() != 32 {
        return Err(SignerWorkerError::InvalidNonceLength { expected: 32, actual: nonce_bytes.len() });
    }
    let nonce: [u8; 32] = nonce_bytes.try_into().unwrap();

    let (signing_key, public_key_bytes) = decrypt_signing_key(&request.decryption, wrap_key)?;

    let payload = Nep413Payload { message: request.message, recipient: request.recipient, nonce, state: request.state.clone() };
    let serialized = borsh::to_vec(&payload).map_err(|e| SignerWorkerError::invalid_format(e.to_string()))?;

    let mut prefixed = crate::config::NEP413_PREFIX.to_le_bytes().to_vec();
    prefixed.extend_from_slice(&serialized);

    let mut hasher = Sha256::new();
    hasher.update(&prefixed);
    let hash = hasher.finalize();

    let signature = signing_key.sign(hash.as_slice());
    use base64ct::Encoding;

    Ok(SignNep413Result {
        account_id: request.account_id,
        public_key: format!("ed25519:{}", bs58::encode(public_key_bytes).into_string()),
        signature_b64: base64ct::Base64::encode_string(&signature.to_bytes()),
        state: request.state,
    })
}

// ---------------------------------------------------------------------
// 6. RegisterDevice2WithDerivedKey
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice2WithDerivedKeyRequest {
    pub near_account_id: String,
    pub prf_second_b64u: String,
    pub contract_id: String,
    pub base_nonce: u64,
    pub tx_block_hash_b58: String,
    /// JSON-serialized contract args for `link_device_register_user`.
    pub contract_args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice2WithDerivedKeyResult {
    pub public_key: String,
    pub encrypted_data: String,
    pub iv: String,
    pub wrap_key_salt: String,
    pub signed_transaction_borsh_b64u: String,
}

/// **Handles:** `RegisterDevice2WithDerivedKey`. Derives the Device2 NEAR
/// keypair from `PRF.second`, encrypts it for storage, and signs the
/// `link_device_register_user` `FunctionCall` transaction with the same
/// (not-yet-persisted) key in one step.
pub fn register_device2_with_derived_key(
    request: RegisterDevice2WithDerivedKeyRequest,
    wrap_key: &WrapKey,
) -> Result<RegisterDevice2WithDerivedKeyResult, SignerWorkerError> {
    let (near_private_key, near_public_key) =
        derive_ed25519_key_from_prf_output(&request.prf_second_b64u, &request.near_account_id)?;

    let kek = wrap_key.derive_kek()?;
    let wrap_key_salt_bytes = crate::crypto::base64_url_decode(wrap_key.salt_b64u())?;
    let encrypted = encrypt_data_chacha20(&near_private_key, &kek)?.with_wrap_key_salt(&wrap_key_salt_bytes);

    let (signing_key, public_key_bytes) = signing_key_from_near_private_key(&near_private_key)?;

    let args_bytes = serde_json::to_vec(&request.contract_args)
        .map_err(|e| SignerWorkerError::invalid_format(format!("failed to serialize contract args: {}", e)))?;

    let action = crate::types::Action::FunctionCall(Box::new(crate::types::FunctionCallAction {
        method_name: "link_device_register_user".to_string(),
        args: args_bytes,
        gas: crate::config::LINK_DEVICE_REGISTRATION_GAS,
        deposit: 0,
    }));

    let block_hash_bytes = bs58::decode(&request.tx_block_hash_b58)
        .into_vec()
        .map_err(|e| SignerWorkerError::invalid_format(format!("invalid block hash: {}", e)))?;

    let tx = build_transaction_with_actions(
        &request.near_account_id,
        &request.contract_id,
        request.base_nonce,
        &block_hash_bytes,
        &public_key_bytes,
        vec![action],
    )?;

    let signed_bytes = sign_transaction(tx, &signing_key)?;

    Ok(RegisterDevice2WithDerivedKeyResult {
        public_key: near_public_key,
        encrypted_data: encrypted.encrypted_near_key_data_b64u,
        iv: encrypted.chacha20_nonce_b64u,
        wrap_key_salt: encrypted.wrap_key_salt_b64u.unwrap_or_default(),
        signed_transaction_borsh_b64u: crate::crypto::base64_url_encode(&signed_bytes),
    })
}

// ---------------------------------------------------------------------
// 7. RecoverKeypairFromPasskey
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverKeypairRequest {
    pub ed25519_prf_output_b64u: String,
    pub account_id_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverKeypairResult {
    pub public_key: String,
    pub encrypted_data: String,
    pub iv: String,
    pub wrap_key_salt: String,
    pub account_id_hint: Option<String>,
}

/// **Handles:** `RecoverKeypairFromPasskey`. Re-derives the same keypair
/// produced at registration time from an existing passkey's PRF output, for
/// account recovery when local storage is lost.
pub fn recover_keypair_from_passkey(
    request: RecoverKeypairRequest,
    wrap_key: &WrapKey,
) -> Result<RecoverKeypairResult, SignerWorkerError> {
    let account_id = request.account_id_hint.clone().unwrap_or_else(|| "recovery-account.testnet".to_string());

    let (private_key, public_key) = derive_ed25519_key_from_prf_output(&request.ed25519_prf_output_b64u, &account_id)?;

    let kek = wrap_key.derive_kek()?;
    let wrap_key_salt_bytes = crate::crypto::base64_url_decode(wrap_key.salt_b64u())?;
    let encrypted = encrypt_data_chacha20(&private_key, &kek)?.with_wrap_key_salt(&wrap_key_salt_bytes);

    Ok(RecoverKeypairResult {
        public_key,
        encrypted_data: encrypted.encrypted_near_key_data_b64u,
        iv: encrypted.chacha20_nonce_b64u,
        wrap_key_salt: wrap_key.salt_b64u().to_string(),
        account_id_hint: Some(account_id),
    })
}

// ---------------------------------------------------------------------
// 8. SignTransactionWithKeyPair
// ---------------------------------------------------------------------

#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionWithKeyPairRequest {
    pub near_private_key: String,
    pub signer_account_id: String,
    pub receiver_id: String,
    pub nonce: u64,
    pub block_hash_b58: String,
    pub actions: Vec<ActionParams>,
}

impl std::fmt::Debug for SignTransactionWithKeyPairRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignTransactionWithKeyPairRequest")
            .field("near_private_key", &"[REDACTED]")
            .field("signer_account_id", &self.signer_account_id)
            .field("receiver_id", &self.receiver_id)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// **Handles:** `SignTransactionWithKeyPair`. The one operation that does not
/// require the VRF worker's `WrapKeySeed`: the caller already has a
/// plaintext private key (e.g. during key-replacement flows) and wants it
/// signed immediately.
pub fn sign_transaction_with_keypair(
    request: SignTransactionWithKeyPairRequest,
) -> Result<TransactionSignResult, SignerWorkerError> {
    let (signing_key, public_key_bytes) = signing_key_from_near_private_key(&request.near_private_key)?;
    let actions = build_actions_from_params(request.actions)?;

    let block_hash_bytes = bs58::decode(&request.block_hash_b58)
        .into_vec()
        .map_err(|e| SignerWorkerError::invalid_format(format!("invalid block hash: {}", e)))?;

    let tx = build_transaction_with_actions(
        &request.signer_account_id,
        &request.receiver_id,
        request.nonce,
        &block_hash_bytes,
        &public_key_bytes,
        actions,
    )?;

    let signed_bytes = sign_transaction(tx, &signing_key)?;
    let hash = calculate_transaction_hash(&signed_bytes);

    Ok(TransactionSignResult {
        success: true,
        transaction_hashes: vec![hash],
        signed_transactions_borsh_b64u: vec![crate::crypto::base64_url_encode(&signed_bytes)],
        logs: vec!["transaction signed with supplied keypair".to_string()],
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::base64_url_encode;

    fn test_wrap_key() -> WrapKey {
        WrapKey::new(base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"), base64_url_encode(b"a-wrap-key-salt!"))
    }

    #[test]
    fn derive_then_decrypt_round_trips_the_private_key() {
        let wrap_key = test_wrap_key();
        let prf = base64_url_encode(b"thirty-two-bytes-of-prf-output!!");

        let derived = derive_near_keypair_and_encrypt(
            DeriveNearKeypairAndEncryptRequest { near_account_id: "alice.near".to_string(), prf_second_b64u: prf },
            &wrap_key,
        )
        .unwrap();

        let decrypted = decrypt_private_key_with_prf(
            DecryptPrivateKeyRequest {
                near_account_id: "alice.near".to_string(),
                decryption: DecryptionPayload {
                    encrypted_private_key_data: derived.encrypted_data,
                    encrypted_private_key_chacha20_nonce_b64u: derived.iv,
                },
            },
            &wrap_key,
        )
        .unwrap();

        let (_, recovered_public) = signing_key_from_near_private_key(&decrypted.private_key).unwrap();
        let expected_public = format!("ed25519:{}", bs58::encode(recovered_public).into_string());
        assert_eq!(expected_public, derived.public_key);
    }

    #[test]
    fn sign_transactions_with_actions_signs_a_batch_with_increasing_nonces() {
        let wrap_key = test_wrap_key();
        let prf = base64_url_encode(b"thirty-two-bytes-of-prf-output!!");
        let derived = derive_near_keypair_and_encrypt(
            DeriveNearKeypairAndEncryptRequest { near_account_id: "alice.near".to_string(), prf_second_b64u: prf },
            &wrap_key,
        )
        .unwrap();

        let mut nonce_manager = NonceManager::new();
        let request = SignTransactionsWithActionsRequest {
            near_account_id: "alice.near".to_string(),
            next_nonce: 5,
            block_hash_b58: bs58::encode([1u8; 32]).into_string(),
            tx_signing_requests: vec![
                TransactionInput { receiver_id: "bob.near".to_string(), actions: vec![ActionParams::Transfer { deposit: "1".to_string() }] },
                TransactionInput { receiver_id: "carol.near".to_string(), actions: vec![ActionParams::Transfer { deposit: "2".to_string() }] },
            ],
            decryption: DecryptionPayload {
                encrypted_private_key_data: derived.encrypted_data,
                encrypted_private_key_chacha20_nonce_b64u: derived.iv,
            },
        };

        let result = sign_transactions_with_actions(request, &wrap_key, &mut nonce_manager).unwrap();
        assert!(result.success);
        assert_eq!(result.transaction_hashes.len(), 2);
        assert!(!nonce_manager.has_reservation(&derived.public_key));
    }

    #[test]
    fn sign_transaction_with_keypair_needs_no_wrap_key() {
        let prf = base64_url_encode(b"thirty-two-bytes-of-prf-output!!");
        let (private_key, _) = derive_ed25519_key_from_prf_output(&prf, "alice.near").unwrap();

        let request = SignTransactionWithKeyPairRequest {
            near_private_key: private_key,
            signer_account_id: "alice.near".to_string(),
            receiver_id: "bob.near".to_string(),
            nonce: 1,
            block_hash_b58: bs58::encode([2u8; 32]).into_string(),
            actions: vec![ActionParams::Transfer { deposit: "1".to_string() }],
        };

        let result = sign_transaction_with_keypair(request).unwrap();
        assert!(result.success);
    }

    #[test]
    fn debug_redacts_the_near_private_key() {
        let request = SignTransactionWithKeyPairRequest {
            near_private_key: "ed25519:SECRET".to_string(),
            signer_account_id: "alice.near".to_string(),
            receiver_id: "bob.near".to_string(),
            nonce: 1,
            block_hash_b58: bs58::encode([0u8; 32]).into_string(),
            actions: vec![],
        };
        let dbg = format!("{:?}", request);
        assert!(!dbg.contains("SECRET"));
    }

    #[test]
    fn sign_nep413_message_rejects_wrong_length_nonce() {
        let wrap_key = test_wrap_key();
        let prf = base64_url_encode(b"thirty-two-bytes-of-prf-output!!");
        let derived = derive_near_keypair_and_encrypt(
            DeriveNearKeypairAndEncryptRequest { near_account_id: "alice.near".to_string(), prf_second_b64u: prf },
            &wrap_key,
        )
        .unwrap();

        use base64ct::Encoding;
        let request = SignNep413Request {
            message: "hello".to_string(),
            recipient: "app.near".to_string(),
            nonce_b64: base64ct::Base64::encode_string(b"too-short"),
            state: None,
            account_id: "alice.near".to_string(),
            decryption: DecryptionPayload {
                encrypted_private_key_data: derived.encrypted_data,
                encrypted_private_key_chacha20_nonce_b64u: derived.iv,
            },
        };
        assert!(sign_nep413_message(request, &wrap_key).is_err());
    }
}
