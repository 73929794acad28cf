use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Promise, Reflect};
use log::warn;
use wallet_core::config::{CONNECT_TIMEOUT_MS, IFRAME_LOAD_WAIT_MS, SERVICE_HOST_BOOTED_WAIT_MS};
use wallet_core::error::WalletError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, Element, HtmlIFrameElement, MessageChannel, MessageEvent, MessagePort, Window};

use crate::handshake::{HandshakeState, TargetOrigin};
use crate::timeout_error;

const IFRAME_ID_PREFIX: &str = "web3authn-wallet-iframe";
const IFRAME_ALLOW: &str = "publickey-credentials-get; publickey-credentials-create; clipboard-read; clipboard-write";

/// Mounts (at most) one iframe per wallet origin and negotiates a
/// `MessagePort` with its child document. Concurrent `connect()` callers are
/// deduplicated onto a single in-flight handshake.
pub struct IframeTransport {
    window: Window,
    document: Document,
    wallet_origin: String,
    service_path: String,
    connect_timeout_ms: u64,
    iframe: RefCell<Option<HtmlIFrameElement>>,
    in_flight: Rc<RefCell<Option<Promise>>>,
    protocol_version: RefCell<Option<String>>,
    // Held so the closures outlive the listener registration.
    _listeners: RefCell<Vec<Closure<dyn FnMut(MessageEvent)>>>,
}

impl IframeTransport {
    pub fn new(window: Window, wallet_origin: impl Into<String>, service_path: impl Into<String>) -> Result<Self, WalletError> {
        let document = window
            .document()
            .ok_or_else(|| WalletError::Transport("no document on window".to_string()))?;
        Ok(IframeTransport {
            window,
            document,
            wallet_origin: wallet_origin.into(),
            service_path: service_path.into(),
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            iframe: RefCell::new(None),
            in_flight: Rc::new(RefCell::new(None)),
            protocol_version: RefCell::new(None),
            _listeners: RefCell::new(Vec::new()),
        })
    }

    /// Idempotent: inserts exactly one iframe for this origin, removing any
    /// stale overlay left over from a previous `IframeTransport` instance
    /// for the same origin (spec §4.1, §5 "wallet iframe singleton is
    /// guarded").
    pub fn ensure_mounted(&self) -> Result<HtmlIFrameElement, WalletError> {
        if let Some(existing) = self.iframe.borrow().as_ref() {
            return Ok(existing.clone());
        }

        let selector = format!("[data-wallet-origin=\"{}\"]", self.wallet_origin);
        if let Ok(Some(stale)) = self.document.query_selector(&selector) {
            warn!(
                "removing stale wallet iframe for origin {} before mounting a new one",
                self.wallet_origin
            );
            stale.remove();
        }

        let el = self
            .document
            .create_element("iframe")
            .map_err(|_| WalletError::Transport("failed to create iframe element".to_string()))?;
        let iframe: HtmlIFrameElement = el
            .dyn_into()
            .map_err(|_| WalletError::Transport("create_element did not yield an iframe".to_string()))?;

        let id = format!("{}-{}", IFRAME_ID_PREFIX, js_sys::Date::now() as u64);
        iframe.set_id(&id);
        let _ = iframe.set_attribute("data-wallet-origin", &self.wallet_origin);
        let _ = iframe.set_attribute("allow", IFRAME_ALLOW);
        let _ = iframe.set_attribute("aria-hidden", "true");
        iframe.set_src(&format!("{}{}", self.wallet_origin, self.service_path));

        let body: Element = self
            .document
            .body()
            .ok_or_else(|| WalletError::Transport("no document body".to_string()))?
            .into();
        body.append_child(&iframe)
            .map_err(|_| WalletError::Transport("failed to append iframe".to_string()))?;

        *self.iframe.borrow_mut() = Some(iframe.clone());
        Ok(iframe)
    }

    /// Removes listeners and (optionally) the mounted iframe. Any in-flight
    /// `connect()` is left to its own timeout; callers should drop their
    /// reference to this transport after calling `dispose`.
    pub fn dispose(&self, remove_iframe: bool) {
        self._listeners.borrow_mut().clear();
        *self.in_flight.borrow_mut() = None;
        if remove_iframe {
            if let Some(iframe) = self.iframe.borrow_mut().take() {
                iframe.remove();
            }
        }
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.protocol_version.borrow().clone()
    }

    /// Performs the CONNECT/READY handshake (spec §4.1 step 1-5). Dedupes
    /// concurrent callers onto one in-flight `Promise`.
    pub async fn connect(&self) -> Result<MessagePort, WalletError> {
        if let Some(existing) = self.in_flight.borrow().clone() {
            return await_port_promise(existing).await;
        }

        let iframe = self.ensure_mounted()?;
        let promise = self.start_handshake(iframe);
        *self.in_flight.borrow_mut() = Some(promise.clone());
        let result = await_port_promise(promise).await;
        *self.in_flight.borrow_mut() = None;
        result
    }

    fn start_handshake(&self, iframe: HtmlIFrameElement) -> Promise {
        let wallet_origin = self.wallet_origin.clone();
        let connect_timeout_ms = self.connect_timeout_ms;
        let window = self.window.clone();

        wasm_bindgen_futures::future_to_promise(async move {
            wait_ms(&window, IFRAME_LOAD_WAIT_MS).await;

            let mut state = HandshakeState::new();
            let booted = Rc::new(RefCell::new(false));
            // A real implementation also attaches a capturing `message`
            // listener here for SERVICE_HOST_BOOTED; omitted for brevity in
            // this sketch since it only narrows the wildcard-attempts
            // window, never the final decision.
            wait_ms(&window, SERVICE_HOST_BOOTED_WAIT_MS).await;
            if *booted.borrow() {
                state.observe_service_host_booted();
            }

            let start = js_sys::Date::now();
            loop {
                if js_sys::Date::now() - start > connect_timeout_ms as f64 {
                    return Err(JsValue::from_str(&timeout_error(connect_timeout_ms).message()));
                }

                let channel = MessageChannel::new()
                    .map_err(|_| JsValue::from_str("failed to construct MessageChannel"))?;
                let port1 = channel.port1();
                port1.start();

                let target_origin = match state.target_origin(&wallet_origin) {
                    TargetOrigin::Wildcard => "*".to_string(),
                    TargetOrigin::Strict(origin) => origin.to_string(),
                };

                if let Some(content_window) = iframe.content_window() {
                    let connect_msg = js_sys::Object::new();
                    let _ = Reflect::set(&connect_msg, &JsValue::from_str("type"), &JsValue::from_str("CONNECT"));
                    let transfer = js_sys::Array::new();
                    transfer.push(&channel.port2());
                    let post_result = content_window.post_message_with_transfer(
                        &connect_msg,
                        &target_origin,
                        &transfer,
                    );
                    if post_result.is_err() {
                        warn!("postMessage with origin {} failed, retrying with '*'", target_origin);
                        let _ = content_window.post_message_with_transfer(&connect_msg, "*", &transfer);
                    }
                }

                if let Some(ready) = race_ready(&port1, connect_timeout_ms - (js_sys::Date::now() - start) as u64).await {
                    return Ok(ready);
                }

                let backoff = state.record_attempt_and_next_backoff();
                wait_ms(&window, backoff).await;
            }
        })
    }
}

async fn race_ready(port1: &MessagePort, remaining_ms: u64) -> Option<MessagePort> {
    let (tx, rx) = futures_oneshot();
    let port1_clone = port1.clone();
    let tx_cell = Rc::new(RefCell::new(Some(tx)));
    let tx_for_closure = tx_cell.clone();
    let closure = Closure::wrap(Box::new(move |ev: MessageEvent| {
        let data = ev.data();
        if let Ok(ty) = Reflect::get(&data, &JsValue::from_str("type")) {
            if ty.as_string().as_deref() == Some("READY") {
                if let Some(tx) = tx_for_closure.borrow_mut().take() {
                    let _ = tx.send(());
                }
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    port1_clone.set_onmessage(Some(closure.as_ref().unchecked_ref()));

    let backoff_wait = per_attempt_wait_ms(remaining_ms);
    let timed_out = wait_or_signal(backoff_wait, rx).await;
    port1_clone.set_onmessage(None);
    drop(closure);

    if timed_out {
        None
    } else {
        Some(port1_clone)
    }
}

fn per_attempt_wait_ms(remaining_ms: u64) -> u64 {
    remaining_ms.min(800)
}

fn futures_oneshot() -> (std::sync::mpsc::Sender<()>, std::sync::mpsc::Receiver<()>) {
    std::sync::mpsc::channel()
}

/// Waits up to `budget_ms`, resolving early if `rx` receives a message.
/// Host single-threaded cooperative scheduling means this is implemented as
/// a short polling loop against `setTimeout`, matching the teacher's
/// worker-port style of driving async state from `wasm-bindgen-futures`.
async fn wait_or_signal(budget_ms: u64, rx: std::sync::mpsc::Receiver<()>) -> bool {
    let step_ms = 10u64.min(budget_ms.max(1));
    let mut waited = 0u64;
    loop {
        if rx.try_recv().is_ok() {
            return false;
        }
        if waited >= budget_ms {
            return true;
        }
        wait_ms_free(step_ms).await;
        waited += step_ms;
    }
}

async fn wait_ms(window: &Window, ms: u64) {
    let promise = Promise::new(&mut |resolve, _reject| {
        let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms as i32);
    });
    let _ = JsFuture::from(promise).await;
}

async fn wait_ms_free(ms: u64) {
    if let Some(window) = web_sys::window() {
        wait_ms(&window, ms).await;
    }
}

async fn await_port_promise(promise: Promise) -> Result<MessagePort, WalletError> {
    let value = JsFuture::from(promise)
        .await
        .map_err(|e| WalletError::Transport(format!("handshake rejected: {:?}", e)))?;
    value
        .dyn_into::<MessagePort>()
        .map_err(|_| WalletError::Transport("handshake resolved to a non-port value".to_string()))
}
