//! Receives `WrapKeySeed`/`wrapKeySalt`/optional `prfSecond` from the VRF
//! worker over a one-shot `MessagePort`, the receiving-side counterpart to
//! `vrf_worker::wrap_key_seed_port`. wasm32-only: this worker is the
//! `MessagePort` recipient, not the sender, so it listens on `onmessage`
//! instead of calling `post_message`.

use std::cell::RefCell;
use std::collections::HashMap;

use js_sys::Reflect;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, MessagePort};

use crate::crypto::WrapKey;

struct ReceivedWrapKey {
    wrap_key: WrapKey,
    prf_second_b64u: Option<String>,
}

thread_local! {
    static RECEIVED: RefCell<HashMap<String, ReceivedWrapKey>> = RefCell::new(HashMap::new());
    // Keeps each session's onmessage closure alive for as long as the port
    // might still fire; dropped once the message has been received.
    static LISTENERS: RefCell<HashMap<String, Closure<dyn FnMut(MessageEvent)>>> = RefCell::new(HashMap::new());
}

/// Registers `port`'s `onmessage` handler for `session_id`. The VRF worker is
/// expected to post exactly one message on this port, after which the port
/// is closed and the listener dropped.
pub fn attach_wrap_key_port(session_id: String, port: MessagePort) {
    let sid = session_id.clone();
    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        let data = event.data();
        if let Some(received) = parse_wrap_key_message(&data) {
            RECEIVED.with(|map| {
                map.borrow_mut().insert(sid.clone(), received);
            });
        }
        LISTENERS.with(|map| {
            map.borrow_mut().remove(&sid);
        });
    }) as Box<dyn FnMut(MessageEvent)>);

    port.set_onmessage(Some(closure.as_ref().unchecked_ref()));
    LISTENERS.with(|map| {
        map.borrow_mut().insert(session_id, closure);
    });
}

fn parse_wrap_key_message(data: &JsValue) -> Option<ReceivedWrapKey> {
    let ok = Reflect::get(data, &JsValue::from_str("ok")).ok()?.as_bool().unwrap_or(false);
    if !ok {
        return None;
    }
    let wrap_key_seed_b64u = Reflect::get(data, &JsValue::from_str("wrapKeySeed")).ok()?.as_string()?;
    let wrap_key_salt_b64u = Reflect::get(data, &JsValue::from_str("wrapKeySalt")).ok()?.as_string()?;
    let prf_second_b64u = Reflect::get(data, &JsValue::from_str("prfSecond")).ok().and_then(|v| v.as_string());

    Some(ReceivedWrapKey {
        wrap_key: WrapKey::new(wrap_key_seed_b64u, wrap_key_salt_b64u),
        prf_second_b64u,
    })
}

pub fn get_wrap_key(session_id: &str) -> Option<WrapKey> {
    RECEIVED.with(|map| map.borrow().get(session_id).map(|r| r.wrap_key.clone()))
}

pub fn get_prf_second(session_id: &str) -> Option<String> {
    RECEIVED.with(|map| map.borrow().get(session_id).and_then(|r| r.prf_second_b64u.clone()))
}

/// Scrubs a session's received key material once it is no longer needed
/// (session end, logout, or after a one-shot recovery/derivation flow).
pub fn clear(session_id: &str) {
    RECEIVED.with(|map| {
        map.borrow_mut().remove(session_id);
    });
    LISTENERS.with(|map| {
        map.borrow_mut().remove(session_id);
    });
}
