//! `WrapKeySeed`/`PRF.second` delivery to the signer worker over a one-shot
//! `MessagePort`. wasm32-only: `lib.rs` owns the port map this module reads
//! and writes.

use wasm_bindgen::JsValue;
use web_sys::MessagePort;

pub fn take_port(session_id: &str) -> Option<MessagePort> {
    super::WRAP_KEY_SEED_PORTS.with(|map| map.borrow_mut().remove(session_id))
}

pub fn put_port(session_id: &str, port: MessagePort) {
    super::WRAP_KEY_SEED_PORTS.with(|map| {
        let mut m = map.borrow_mut();
        if let Some(old) = m.remove(session_id) {
            old.close();
        }
        m.insert(session_id.to_string(), port);
    });
}

pub fn send_wrap_key_seed_to_signer(
    session_id: &str,
    wrap_key_seed_b64u: &str,
    wrap_key_salt_b64u: &str,
    prf_second_b64u: Option<&str>,
) -> Result<(), String> {
    let port = take_port(session_id).ok_or_else(|| {
        format!("no wrapKeySeed port attached for session {}", session_id)
    })?;

    let obj = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("ok"), &JsValue::TRUE);
    let _ = js_sys::Reflect::set(
        &obj,
        &JsValue::from_str("wrapKeySeed"),
        &JsValue::from_str(wrap_key_seed_b64u),
    );
    let _ = js_sys::Reflect::set(
        &obj,
        &JsValue::from_str("wrapKeySalt"),
        &JsValue::from_str(wrap_key_salt_b64u),
    );
    if let Some(prf_second) = prf_second_b64u {
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("prfSecond"), &JsValue::from_str(prf_second));
    }
    let result = port.post_message(&obj).map_err(|e| format!("postMessage failed: {:?}", e));
    port.close();
    result
}

pub fn close_all_ports() {
    super::WRAP_KEY_SEED_PORTS.with(|map| {
        for (_sid, port) in map.borrow_mut().drain() {
            port.close();
        }
    });
}
