//! §4.7 Signer Web Worker: holds no long-lived secrets of its own — it
//! receives `WrapKeySeed`/`PRF.second` per session from the VRF worker over a
//! `MessagePort`, derives or decrypts the NEAR signing key for the duration
//! of one request, and signs transactions, delegate actions, and NEP-413
//! messages. Built as a `cdylib` so it runs inside its own Web Worker,
//! isolated from the main thread and the wallet iframe.

use log::debug;

pub mod actions;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod messages;
pub mod nonce_manager;
pub mod transaction;
pub mod types;

#[cfg(target_arch = "wasm32")]
pub mod wrap_key_store;

pub use errors::{SignerResult, SignerWorkerError};
pub use messages::{find_forbidden_field, SignerRequestType, SignerWorkerMessage, SignerWorkerResponse};
pub use nonce_manager::NonceManager;

/// Fields a signer-worker request must never carry in its JSON payload: a
/// raw `WrapKeySeed` arrives only via the `MessagePort`, never inline.
const FORBIDDEN_PAYLOAD_FIELDS: [&str; 2] = ["wrapKeySeed", "wrap_key_seed"];

#[cfg(target_arch = "wasm32")]
mod wasm_glue {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::Value;
    use wasm_bindgen::prelude::*;
    use web_sys::MessagePort;

    use super::*;
    use crate::crypto::WrapKey;
    use crate::handlers::*;

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = JSON)]
        fn stringify(obj: &JsValue) -> JsValue;
        #[wasm_bindgen(js_namespace = JSON)]
        fn parse(text: &str) -> JsValue;
    }

    thread_local! {
        static NONCE_MANAGER: Rc<RefCell<NonceManager>> = Rc::new(RefCell::new(NonceManager::new()));
    }

    #[wasm_bindgen(start)]
    pub fn main() {
        console_error_panic_hook::set_once();
        wasm_logger::init(wasm_logger::Config::new(config::CURRENT_LOG_LEVEL));
        debug!("signer worker starting up, log level {:?}", config::CURRENT_LOG_LEVEL);
    }

    /// Registers the `MessagePort` half this worker listens on for a given
    /// session, so the VRF worker's `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER`
    /// flow can deliver `WrapKeySeed` here.
    #[wasm_bindgen]
    pub fn attach_wrap_key_port(session_id: String, port: MessagePort) {
        crate::wrap_key_store::attach_wrap_key_port(session_id, port);
    }

    #[wasm_bindgen]
    pub fn clear_wrap_key(session_id: String) {
        crate::wrap_key_store::clear(&session_id);
    }

    #[wasm_bindgen]
    pub async fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
        let message_str = stringify(&message)
            .as_string()
            .ok_or_else(|| JsValue::from_str("failed to stringify message"))?;
        let raw_value: Value = serde_json::from_str(&message_str)
            .map_err(|e| JsValue::from_str(&format!("failed to parse message: {}", e)))?;

        if let Some(key) = find_forbidden_field(&raw_value, &FORBIDDEN_PAYLOAD_FIELDS) {
            return Err(JsValue::from_str(&format!("forbidden field in signer payload: {}", key)));
        }

        let message: SignerWorkerMessage = serde_json::from_value(raw_value)
            .map_err(|e| JsValue::from_str(&format!("failed to parse message: {}", e)))?;
        debug!("received signer worker message: {}", message.msg_type);

        let response = dispatch(message).await;

        let response_json = serde_json::to_string(&response)
            .map_err(|e| JsValue::from_str(&format!("failed to serialize response: {}", e)))?;
        Ok(parse(&response_json))
    }

    fn wrap_key_for(session_id: &str) -> Result<WrapKey, SignerWorkerError> {
        crate::wrap_key_store::get_wrap_key(session_id)
            .ok_or_else(|| SignerWorkerError::WrapKeyUnavailable(session_id.to_string()))
    }

    async fn dispatch(message: SignerWorkerMessage) -> SignerWorkerResponse {
        let id = message.id.clone();
        let request_type = match SignerRequestType::try_from(message.msg_type.as_str()) {
            Ok(t) => t,
            Err(e) => return SignerWorkerResponse::fail(id, &e),
        };

        macro_rules! parse_or_fail {
            ($ty:ty) => {
                match message.parse_payload::<$ty>(request_type) {
                    Ok(r) => r,
                    Err(e) => return SignerWorkerResponse::fail(id, &e),
                }
            };
        }

        // `SignTransactionWithKeyPair` carries its own plaintext key and
        // never touches the per-session wrap key.
        let wrap_key = if request_type.requires_wrap_key() {
            #[derive(serde::Deserialize)]
            struct SessionRef {
                #[serde(rename = "sessionId")]
                session_id: String,
            }
            let session: SessionRef = parse_or_fail!(SessionRef);
            match wrap_key_for(&session.session_id) {
                Ok(w) => Some(w),
                Err(e) => return SignerWorkerResponse::fail(id, &e),
            }
        } else {
            None
        };

        match request_type {
            SignerRequestType::DeriveNearKeypairAndEncrypt => {
                let req = parse_or_fail!(DeriveNearKeypairAndEncryptRequest);
                match derive_near_keypair_and_encrypt(req, wrap_key.as_ref().unwrap()) {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
            SignerRequestType::DecryptPrivateKeyWithPrf => {
                let req = parse_or_fail!(DecryptPrivateKeyRequest);
                match decrypt_private_key_with_prf(req, wrap_key.as_ref().unwrap()) {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
            SignerRequestType::SignTransactionsWithActions => {
                let req = parse_or_fail!(SignTransactionsWithActionsRequest);
                let result = NONCE_MANAGER.with(|mgr| {
                    sign_transactions_with_actions(req, wrap_key.as_ref().unwrap(), &mut mgr.borrow_mut())
                });
                match result {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
            SignerRequestType::SignDelegateAction => {
                let req = parse_or_fail!(SignDelegateActionRequest);
                match sign_delegate_action(req, wrap_key.as_ref().unwrap()) {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
            SignerRequestType::SignNep413Message => {
                let req = parse_or_fail!(SignNep413Request);
                match sign_nep413_message(req, wrap_key.as_ref().unwrap()) {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
            SignerRequestType::RegisterDevice2WithDerivedKey => {
                let req = parse_or_fail!(RegisterDevice2WithDerivedKeyRequest);
                match register_device2_with_derived_key(req, wrap_key.as_ref().unwrap()) {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
            SignerRequestType::RecoverKeypairFromPasskey => {
                let req = parse_or_fail!(RecoverKeypairRequest);
                match recover_keypair_from_passkey(req, wrap_key.as_ref().unwrap()) {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
            SignerRequestType::SignTransactionWithKeyPair => {
                let req = parse_or_fail!(SignTransactionWithKeyPairRequest);
                match sign_transaction_with_keypair(req) {
                    Ok(result) => SignerWorkerResponse::success(id, serde_json::to_value(result).ok()),
                    Err(e) => SignerWorkerResponse::fail(id, &e),
                }
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_glue::{attach_wrap_key_port, clear_wrap_key, handle_message};
