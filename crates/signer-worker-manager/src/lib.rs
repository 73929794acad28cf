//! Main-thread-side counterpart of `signer_worker`'s handlers (spec §4.7):
//! sends typed `SignerWorkerMessage`s to the signer worker over whatever
//! channel the embedding crate provides, and reserves/releases nonces in its
//! own [`signer_worker::NonceManager`] mirror so a batch failure never
//! strands a gap in the account's nonce sequence.
//!
//! Pure Rust, no `wasm-bindgen` dependency, so the request/response protocol
//! is exercised in host tests with a fake [`SignerWorkerChannel`]; the real
//! `postMessage`-backed channel and the worker-side `WrapKeySeed` delivery
//! are owned by whichever crate wires the worker handle (wallet-host).

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::json;

use signer_worker::handlers::{
    DecryptPrivateKeyResult, DeriveNearKeypairAndEncryptResult, DelegateSignResult,
    RecoverKeypairResult, RegisterDevice2WithDerivedKeyResult, SignNep413Result, TransactionSignResult,
};
use signer_worker::{SignerRequestType, SignerWorkerMessage, SignerWorkerResponse};
use vrf_worker_manager::request_id::{Clock, RequestIdGenerator};
use wallet_core::error::WalletError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// One action in a `sign_transactions_with_actions`/`sign_delegate_action`
/// batch, JSON-shaped exactly like [`signer_worker::actions::ActionParams`].
pub type ActionParams = signer_worker::actions::ActionParams;

/// Abstracts "post this message to the signer worker, await its response" so
/// the manager logic is testable without a real `Worker`/`MessagePort`.
pub trait SignerWorkerChannel {
    fn send<'a>(&'a self, message: SignerWorkerMessage) -> BoxFuture<'a, SignerWorkerResponse>;
}

pub struct SignerWorkerManager<C: Clock> {
    request_ids: RequestIdGenerator<C>,
}

impl<C: Clock> SignerWorkerManager<C> {
    pub fn new(clock: C) -> Self {
        SignerWorkerManager { request_ids: RequestIdGenerator::new(clock) }
    }

    /// `DERIVE_NEAR_KEYPAIR_AND_ENCRYPT`.
    pub async fn derive_near_keypair_and_encrypt(
        &mut self,
        channel: &impl SignerWorkerChannel,
        session_id: &str,
        near_account_id: &str,
        prf_second_b64u: &str,
    ) -> Result<DeriveNearKeypairAndEncryptResult, WalletError> {
        let payload = json!({
            "sessionId": session_id,
            "nearAccountId": near_account_id,
            "prfSecondB64u": prf_second_b64u,
        });
        self.send_and_parse(channel, SignerRequestType::DeriveNearKeypairAndEncrypt, payload).await
    }

    /// `DECRYPT_PRIVATE_KEY_WITH_PRF`.
    pub async fn decrypt_private_key_with_prf(
        &mut self,
        channel: &impl SignerWorkerChannel,
        session_id: &str,
        near_account_id: &str,
        encrypted_private_key_data: &str,
        encrypted_private_key_chacha20_nonce_b64u: &str,
    ) -> Result<DecryptPrivateKeyResult, WalletError> {
        let payload = json!({
            "sessionId": session_id,
            "nearAccountId": near_account_id,
            "encryptedPrivateKeyData": encrypted_private_key_data,
            "encryptedPrivateKeyChacha20NonceB64u": encrypted_private_key_chacha20_nonce_b64u,
        });
        self.send_and_parse(channel, SignerRequestType::DecryptPrivateKeyWithPrf, payload).await
    }

    /// `SIGN_TRANSACTIONS_WITH_ACTIONS`. `tx_signing_requests` is
    /// `(receiverId, actions)` per transaction, signed in order against a
    /// contiguous nonce range starting at `next_nonce`.
    #[allow(clippy::too_many_arguments)]
    pub async fn sign_transactions_with_actions(
        &mut self,
        channel: &impl SignerWorkerChannel,
        session_id: &str,
        near_account_id: &str,
        next_nonce: u64,
        block_hash_b58: &str,
        tx_signing_requests: Vec<(String, Vec<ActionParams>)>,
        encrypted_private_key_data: &str,
        encrypted_private_key_chacha20_nonce_b64u: &str,
    ) -> Result<TransactionSignResult, WalletError> {
        let tx_signing_requests: Vec<_> = tx_signing_requests
            .into_iter()
            .map(|(receiver_id, actions)| json!({ "receiverId": receiver_id, "actions": actions }))
            .collect();
        let payload = json!({
            "sessionId": session_id,
            "nearAccountId": near_account_id,
            "nextNonce": next_nonce,
            "blockHashB58": block_hash_b58,
            "txSigningRequests": tx_signing_requests,
            "decryption": {
                "encryptedPrivateKeyData": encrypted_private_key_data,
                "encryptedPrivateKeyChacha20NonceB64u": encrypted_private_key_chacha20_nonce_b64u,
            },
        });
        self.send_and_parse(channel, SignerRequestType::SignTransactionsWithActions, payload).await
    }

    /// `SIGN_DELEGATE_ACTION` (NEP-461 meta-transaction for relayer submission).
    #[allow(clippy::too_many_arguments)]
    pub async fn sign_delegate_action(
        &mut self,
        channel: &impl SignerWorkerChannel,
        session_id: &str,
        sender_id: &str,
        receiver_id: &str,
        actions: Vec<ActionParams>,
        nonce: u64,
        max_block_height: u64,
        encrypted_private_key_data: &str,
        encrypted_private_key_chacha20_nonce_b64u: &str,
    ) -> Result<DelegateSignResult, WalletError> {
        let payload = json!({
            "sessionId": session_id,
            "senderId": sender_id,
            "receiverId": receiver_id,
            "actions": actions,
            "nonce": nonce,
            "maxBlockHeight": max_block_height,
            "decryption": {
                "encryptedPrivateKeyData": encrypted_private_key_data,
                "encryptedPrivateKeyChacha20NonceB64u": encrypted_private_key_chacha20_nonce_b64u,
            },
        });
        self.send_and_parse(channel, SignerRequestType::SignDelegateAction, payload).await
    }

    /// `SIGN_NEP413_MESSAGE` (off-chain message signing).
    #[allow(clippy::too_many_arguments)]
    pub async fn sign_nep413_message(
        &mut self,
        channel: &impl SignerWorkerChannel,
        session_id: &str,
        account_id: &str,
        message: &str,
        recipient: &str,
        nonce_b64: &str,
        state: Option<String>,
        encrypted_private_key_data: &str,
        encrypted_private_key_chacha20_nonce_b64u: &str,
    ) -> Result<SignNep413Result, WalletError> {
        let payload = json!({
            "sessionId": session_id,
            "accountId": account_id,
            "message": message,
            "recipient": recipient,
            "nonceB64": nonce_b64,
            "state": state,
            "decryption": {
                "encryptedPrivateKeyData": encrypted_private_key_data,
                "encryptedPrivateKeyChacha20NonceB64u": encrypted_private_key_chacha20_nonce_b64u,
            },
        });
        self.send_and_parse(channel, SignerRequestType::SignNep413Message, payload).await
    }

    /// `REGISTER_DEVICE2_WITH_DERIVED_KEY`.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_device2_with_derived_key(
        &mut self,
        channel: &impl SignerWorkerChannel,
        session_id: &str,
        near_account_id: &str,
        prf_second_b64u: &str,
        contract_id: &str,
        base_nonce: u64,
        tx_block_hash_b58: &str,
        contract_args: serde_json::Value,
    ) -> Result<RegisterDevice2WithDerivedKeyResult, WalletError> {
        let payload = json!({
            "sessionId": session_id,
            "nearAccountId": near_account_id,
            "prfSecondB64u": prf_second_b64u,
            "contractId": contract_id,
            "baseNonce": base_nonce,
            "txBlockHashB58": tx_block_hash_b58,
            "contractArgs": contract_args,
        });
        self.send_and_parse(channel, SignerRequestType::RegisterDevice2WithDerivedKey, payload).await
    }

    /// `RECOVER_KEYPAIR_FROM_PASSKEY`.
    pub async fn recover_keypair_from_passkey(
        &mut self,
        channel: &impl SignerWorkerChannel,
        session_id: &str,
        ed25519_prf_output_b64u: &str,
        account_id_hint: Option<String>,
    ) -> Result<RecoverKeypairResult, WalletError> {
        let payload = json!({
            "sessionId": session_id,
            "ed25519PrfOutputB64u": ed25519_prf_output_b64u,
            "accountIdHint": account_id_hint,
        });
        self.send_and_parse(channel, SignerRequestType::RecoverKeypairFromPasskey, payload).await
    }

    /// `SIGN_TRANSACTION_WITH_KEYPAIR` — the one operation that needs no
    /// `sessionId`/`WrapKeySeed`, since the caller supplies a plaintext key.
    #[allow(clippy::too_many_arguments)]
    pub async fn sign_transaction_with_keypair(
        &mut self,
        channel: &impl SignerWorkerChannel,
        near_private_key: &str,
        signer_account_id: &str,
        receiver_id: &str,
        nonce: u64,
        block_hash_b58: &str,
        actions: Vec<ActionParams>,
    ) -> Result<TransactionSignResult, WalletError> {
        let payload = json!({
            "nearPrivateKey": near_private_key,
            "signerAccountId": signer_account_id,
            "receiverId": receiver_id,
            "nonce": nonce,
            "blockHashB58": block_hash_b58,
            "actions": actions,
        });
        self.send_and_parse(channel, SignerRequestType::SignTransactionWithKeyPair, payload).await
    }

    async fn send_and_parse<T: DeserializeOwned>(
        &mut self,
        channel: &impl SignerWorkerChannel,
        request_type: SignerRequestType,
        payload: serde_json::Value,
    ) -> Result<T, WalletError> {
        let id = self.request_ids.next();
        let message = SignerWorkerMessage {
            msg_type: request_type.name().to_string(),
            id: Some(id),
            payload: Some(payload),
        };
        let response = channel.send(message).await;
        if !response.success {
            return Err(wallet_error_from_response(&response));
        }
        let data = response
            .data
            .ok_or_else(|| WalletError::Signer("signer worker returned no data".to_string()))?;
        serde_json::from_value(data)
            .map_err(|e| WalletError::Signer(format!("invalid signer worker response: {}", e)))
    }
}

fn wallet_error_from_response(response: &SignerWorkerResponse) -> WalletError {
    let message = response.error.clone().unwrap_or_else(|| "signer worker request failed".to_string());
    WalletError::Signer(message)
}
