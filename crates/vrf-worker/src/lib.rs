//! §4.6 VRF Web Worker: holds the VRF keypair in memory, derives and mints
//! signer session key material, and runs the client side of Shamir 3-pass
//! with a relay. Built as a `cdylib` so it runs inside its own Web Worker,
//! isolated from the main thread and the wallet iframe.

use log::debug;

pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;
pub mod shamir3pass;
pub mod shamir_client;
pub mod types;
pub mod utils;

#[cfg(target_arch = "wasm32")]
pub mod http;
#[cfg(target_arch = "wasm32")]
pub mod wrap_key_seed_port;

pub use errors::{VrfResult, VrfWorkerError};
pub use manager::VRFKeyManager;
pub use messages::{find_forbidden_near_secret, VrfRequestType, VrfWorkerMessage, VrfWorkerResponse};

#[cfg(target_arch = "wasm32")]
mod wasm_glue {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use serde::Deserialize;
    use serde_json::Value;
    use wasm_bindgen::prelude::*;
    use web_sys::MessagePort;

    use super::*;
    use crate::http::FetchRelay;
    use crate::shamir_client::{shamir3pass_client_decrypt, shamir3pass_client_encrypt, ShamirEncryptedVrfKeypair};
    use crate::types::{EncryptedVRFKeypair, VRFInputData};

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = JSON)]
        fn stringify(obj: &JsValue) -> JsValue;
        #[wasm_bindgen(js_namespace = JSON)]
        fn parse(text: &str) -> JsValue;
    }

    thread_local! {
        static VRF_MANAGER: Rc<RefCell<VRFKeyManager>> =
            Rc::new(RefCell::new(VRFKeyManager::new(None, None, None, None)));
        pub(crate) static WRAP_KEY_SEED_PORTS: RefCell<HashMap<String, MessagePort>> =
            RefCell::new(HashMap::new());
    }

    #[wasm_bindgen(start)]
    pub fn main() {
        console_error_panic_hook::set_once();
        wasm_logger::init(wasm_logger::Config::new(config::CURRENT_LOG_LEVEL));
        debug!("VRF worker starting up, log level {:?}", config::CURRENT_LOG_LEVEL);
    }

    #[wasm_bindgen]
    pub fn configure_shamir_p(p_b64u: String) -> Result<(), JsValue> {
        VRF_MANAGER.with(|m| {
            let mut mgr = m.borrow_mut();
            mgr.shamir3pass = shamir3pass::Shamir3Pass::new(&p_b64u)
                .map_err(|e| JsValue::from_str(&format!("failed to configure Shamir p: {}", e)))?;
            Ok(())
        })
    }

    #[wasm_bindgen]
    pub fn configure_shamir_server_urls(relay_server_url: String, apply_lock_route: String, remove_lock_route: String) {
        VRF_MANAGER.with(|m| {
            let mut mgr = m.borrow_mut();
            mgr.relay_server_url = Some(relay_server_url);
            mgr.apply_lock_route = Some(apply_lock_route);
            mgr.remove_lock_route = Some(remove_lock_route);
        });
    }

    /// Registers the `MessagePort` half the signer worker listens on for a
    /// given session, so `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER` can deliver
    /// `WrapKeySeed` to it later.
    #[wasm_bindgen]
    pub fn attach_wrap_key_seed_port(session_id: String, port: MessagePort) {
        crate::wrap_key_seed_port::put_port(&session_id, port);
    }

    #[wasm_bindgen]
    pub async fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
        let message_str = stringify(&message)
            .as_string()
            .ok_or_else(|| JsValue::from_str("failed to stringify message"))?;
        let raw_value: Value = serde_json::from_str(&message_str)
            .map_err(|e| JsValue::from_str(&format!("failed to parse message: {}", e)))?;

        if let Some(key) = find_forbidden_near_secret(&raw_value) {
            return Err(JsValue::from_str(&format!("forbidden field in VRF payload: {}", key)));
        }

        let message: VrfWorkerMessage = serde_json::from_value(raw_value)
            .map_err(|e| JsValue::from_str(&format!("failed to parse message: {}", e)))?;
        debug!("received VRF worker message: {}", message.msg_type);

        let response = dispatch(message).await;

        let response_json = serde_json::to_string(&response)
            .map_err(|e| JsValue::from_str(&format!("failed to serialize response: {}", e)))?;
        Ok(parse(&response_json))
    }

    async fn dispatch(message: VrfWorkerMessage) -> VrfWorkerResponse {
        let id = message.id.clone();
        let request_type = match VrfRequestType::try_from(message.msg_type.as_str()) {
            Ok(t) => t,
            Err(e) => return VrfWorkerResponse::fail(id, &e),
        };
        let manager = VRF_MANAGER.with(|m| m.clone());

        match request_type {
            VrfRequestType::Ping => {
                VrfWorkerResponse::success(id, Some(serde_json::json!({ "status": "alive" })))
            }
            VrfRequestType::CheckVrfStatus => {
                let status = manager.borrow().get_vrf_status(now_ms());
                VrfWorkerResponse::success(id, Some(status))
            }
            VrfRequestType::Logout => {
                manager.borrow_mut().logout();
                crate::wrap_key_seed_port::close_all_ports();
                VrfWorkerResponse::success(id, None)
            }
            VrfRequestType::BootstrapGenerate => {
                #[derive(Deserialize)]
                struct Req {
                    #[serde(default, rename = "vrfInputData")]
                    vrf_input_data: Option<VRFInputData>,
                }
                let req: Req = match message.parse_payload(request_type) {
                    Ok(r) => r,
                    Err(e) => return VrfWorkerResponse::fail(id, &e),
                };
                let now = now_ms();
                match manager.borrow_mut().generate_vrf_keypair_bootstrap(now, req.vrf_input_data) {
                    Ok(data) => VrfWorkerResponse::success(id, serde_json::to_value(data).ok()),
                    Err(e) => VrfWorkerResponse::fail(id, &e),
                }
            }
            VrfRequestType::DeriveVrfFromPrf => {
                #[derive(Deserialize)]
                struct Req {
                    #[serde(rename = "prfSecond")]
                    prf_second: String,
                    #[serde(rename = "prfFirst")]
                    prf_first: String,
                    #[serde(rename = "nearAccountId")]
                    near_account_id: String,
                    #[serde(default, rename = "vrfInputData")]
                    vrf_input_data: Option<VRFInputData>,
                }
                let req: Req = match message.parse_payload(request_type) {
                    Ok(r) => r,
                    Err(e) => return VrfWorkerResponse::fail(id, &e),
                };
                let (prf_second, prf_first) = match (
                    crate::utils::base64_url_decode(&req.prf_second),
                    crate::utils::base64_url_decode(&req.prf_first),
                ) {
                    (Ok(a), Ok(b)) => (a, b),
                    _ => return VrfWorkerResponse::fail(id, &VrfWorkerError::invalid_format("invalid PRF encoding")),
                };
                let now = now_ms();
                match manager.borrow_mut().derive_vrf_keypair_from_prf(
                    now,
                    prf_second,
                    prf_first,
                    req.near_account_id,
                    req.vrf_input_data,
                ) {
                    Ok(data) => VrfWorkerResponse::success(id, serde_json::to_value(data).ok()),
                    Err(e) => VrfWorkerResponse::fail(id, &e),
                }
            }
            VrfRequestType::UnlockVrf => {
                #[derive(Deserialize)]
                struct Req {
                    #[serde(rename = "encryptedVrfKeypair")]
                    encrypted_vrf_keypair: EncryptedVRFKeypair,
                    #[serde(rename = "prfFirst")]
                    prf_first: String,
                }
                let req: Req = match message.parse_payload(request_type) {
                    Ok(r) => r,
                    Err(e) => return VrfWorkerResponse::fail(id, &e),
                };
                let prf_first = match crate::utils::base64_url_decode(&req.prf_first) {
                    Ok(b) => b,
                    Err(_) => return VrfWorkerResponse::fail(id, &VrfWorkerError::invalid_format("invalid PRF encoding")),
                };
                let now = now_ms();
                match manager.borrow_mut().unlock_vrf_keypair(now, req.encrypted_vrf_keypair, prf_first) {
                    Ok(()) => VrfWorkerResponse::success(id, None),
                    Err(e) => VrfWorkerResponse::fail(id, &e),
                }
            }
            VrfRequestType::MintSessionKeysAndSendToSigner => {
                #[derive(Deserialize)]
                struct Req {
                    #[serde(rename = "sessionId")]
                    session_id: String,
                    #[serde(rename = "prfFirst")]
                    prf_first: String,
                    #[serde(default, rename = "prfSecond")]
                    prf_second: Option<String>,
                    #[serde(default, rename = "wrapKeySalt")]
                    wrap_key_salt: Option<String>,
                    #[serde(default, rename = "ttlMs")]
                    ttl_ms: Option<u64>,
                    #[serde(default, rename = "remainingUses")]
                    remaining_uses: Option<u32>,
                }
                let req: Req = match message.parse_payload(request_type) {
                    Ok(r) => r,
                    Err(e) => return VrfWorkerResponse::fail(id, &e),
                };
                let prf_first = match crate::utils::base64_url_decode(&req.prf_first) {
                    Ok(b) => b,
                    Err(_) => return VrfWorkerResponse::fail(id, &VrfWorkerError::invalid_format("invalid PRF encoding")),
                };
                let prf_second = match req.prf_second.map(|s| crate::utils::base64_url_decode(&s)) {
                    Some(Ok(b)) => Some(b),
                    Some(Err(_)) => {
                        return VrfWorkerResponse::fail(id, &VrfWorkerError::invalid_format("invalid PRF encoding"))
                    }
                    None => None,
                };

                let now = now_ms();
                let minted = match manager.borrow_mut().mint_session_keys(
                    now,
                    req.session_id.clone(),
                    prf_first,
                    prf_second,
                    req.wrap_key_salt,
                    req.ttl_ms,
                    req.remaining_uses,
                ) {
                    Ok(m) => m,
                    Err(e) => return VrfWorkerResponse::fail(id, &e),
                };

                match crate::wrap_key_seed_port::send_wrap_key_seed_to_signer(
                    &req.session_id,
                    &minted.wrap_key_seed_b64u,
                    &minted.wrap_key_salt_b64u,
                    minted.prf_second_b64u.as_deref(),
                ) {
                    Ok(()) => VrfWorkerResponse::success(id, Some(serde_json::json!({ "sessionId": req.session_id }))),
                    Err(e) => VrfWorkerResponse::fail(id, &VrfWorkerError::SessionPortNotAttached(e)),
                }
            }
            VrfRequestType::DispenseSessionKey => {
                #[derive(Deserialize)]
                struct Req {
                    #[serde(rename = "sessionId")]
                    session_id: String,
                }
                let req: Req = match message.parse_payload(request_type) {
                    Ok(r) => r,
                    Err(e) => return VrfWorkerResponse::fail(id, &e),
                };
                let now = now_ms();
                match manager.borrow_mut().dispense_session_key(&req.session_id, now) {
                    Ok(()) => VrfWorkerResponse::success(id, None),
                    Err(e) => VrfWorkerResponse::fail(id, &e),
                }
            }
            VrfRequestType::Shamir3PassEncrypt => {
                let (relay_url, apply_route) = {
                    let m = manager.borrow();
                    (m.relay_server_url.clone(), m.apply_lock_route.clone())
                };
                let (relay_url, apply_route) = match (relay_url, apply_route) {
                    (Some(u), Some(r)) => (u, r),
                    _ => return VrfWorkerResponse::fail(id, &VrfWorkerError::invalid_format("Shamir relay not configured")),
                };
                let relay = FetchRelay;
                let result = {
                    let m = manager.borrow();
                    shamir3pass_client_encrypt(&m, &relay, &relay_url, &apply_route).await
                };
                match result {
                    Ok(blob) => VrfWorkerResponse::success(id, serde_json::to_value(blob).ok()),
                    Err(e) => VrfWorkerResponse::fail(id, &e),
                }
            }
            VrfRequestType::Shamir3PassDecrypt => {
                #[derive(Deserialize)]
                struct Req {
                    blob: ShamirEncryptedVrfKeypair,
                }
                let req: Req = match message.parse_payload(request_type) {
                    Ok(r) => r,
                    Err(e) => return VrfWorkerResponse::fail(id, &e),
                };
                let (relay_url, remove_route) = {
                    let m = manager.borrow();
                    (m.relay_server_url.clone(), m.remove_lock_route.clone())
                };
                let (relay_url, remove_route) = match (relay_url, remove_route) {
                    (Some(u), Some(r)) => (u, r),
                    _ => return VrfWorkerResponse::fail(id, &VrfWorkerError::invalid_format("Shamir relay not configured")),
                };
                let relay = FetchRelay;
                let now = now_ms();
                let mut m = manager.borrow_mut();
                match shamir3pass_client_decrypt(&mut m, &relay, &relay_url, &remove_route, now, req.blob).await {
                    Ok(()) => VrfWorkerResponse::success(id, None),
                    Err(e) => VrfWorkerResponse::fail(id, &e),
                }
            }
        }
    }

    fn now_ms() -> f64 {
        js_sys::Date::now()
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_glue::{
    attach_wrap_key_seed_port, configure_shamir_p, configure_shamir_server_urls, handle_message,
};
#[cfg(target_arch = "wasm32")]
pub(crate) use wasm_glue::WRAP_KEY_SEED_PORTS;
