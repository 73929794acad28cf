//! wasm32 glue: drives [`crate::core::RouterCore`] over a real
//! `MessagePort`, owns the [`ProgressBus`] and the overlay, and posts/parses
//! the `PM_*` envelope family (spec §4.4, §6).

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Promise, Reflect};
use log::{error, warn};
use overlay_controller::{OverlayController, StyleSheetHandle};
use wallet_core::config::WalletConfig;
use wallet_core::envelope::{ChildEnvelope, EnvelopeOptions, PmOp, PmRequest};
use wallet_core::error::WalletError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::MessagePort;

use crate::core::RouterCore;
use crate::overlay_intent::OverlayIntent;
use crate::request_id::SystemClock;
use progress_bus::ProgressBus;

type ProgressCallback = Box<dyn FnMut(&str, wallet_core::envelope::ProgressPayload)>;

struct Resolution {
    ok: bool,
    result: serde_json::Value,
    error: Option<wallet_core::error::ErrorEnvelope>,
}

/// Typed RPC facade the host application calls. Owns the port, the overlay,
/// and the progress bus; does not own the `IframeTransport` that produced
/// the port (the caller is expected to keep that alive for reconnects).
pub struct WalletIframeRouter<S: StyleSheetHandle + 'static> {
    port: MessagePort,
    core: RefCell<RouterCore<SystemClock>>,
    progress: Rc<RefCell<ProgressBus>>,
    overlay: Rc<RefCell<OverlayController<S>>>,
    resolutions: Rc<RefCell<std::collections::HashMap<String, Resolution>>>,
    init_in_flight: RefCell<Option<Promise>>,
    on_message_closure: RefCell<Option<Closure<dyn FnMut(web_sys::MessageEvent)>>>,
}

impl<S: StyleSheetHandle + 'static> WalletIframeRouter<S> {
    pub fn new(port: MessagePort, overlay: OverlayController<S>) -> Self {
        port.start();
        let router = WalletIframeRouter {
            port,
            core: RefCell::new(RouterCore::new(SystemClock)),
            progress: Rc::new(RefCell::new(ProgressBus::default())),
            overlay: Rc::new(RefCell::new(overlay)),
            resolutions: Rc::new(RefCell::new(std::collections::HashMap::new())),
            init_in_flight: RefCell::new(None),
            on_message_closure: RefCell::new(None),
        };
        router.attach_listener();
        router
    }

    fn attach_listener(&self) {
        let progress = self.progress.clone();
        let overlay = self.overlay.clone();
        let resolutions = self.resolutions.clone();

        let closure = Closure::wrap(Box::new(move |ev: web_sys::MessageEvent| {
            let parsed: Result<ChildEnvelope, _> = serde_wasm_bindgen::from_value(ev.data());
            let envelope = match parsed {
                Ok(e) => e,
                Err(err) => {
                    warn!("dropping unparseable child envelope: {:?}", err);
                    return;
                }
            };
            match envelope {
                ChildEnvelope::Progress { request_id, payload } => {
                    progress.borrow_mut().publish(progress_bus::ProgressEvent {
                        request_id: request_id.clone(),
                        phase: payload.phase.clone(),
                        payload: serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null),
                    });
                    let show = progress.borrow().any_request_demands_show();
                    let mut overlay = overlay.borrow_mut();
                    if show {
                        overlay.show_fullscreen();
                    } else if !overlay.sticky() {
                        overlay.hide();
                    }
                }
                ChildEnvelope::Result { request_id, payload } => {
                    resolutions.borrow_mut().insert(
                        request_id,
                        Resolution {
                            ok: payload.ok,
                            result: payload.result,
                            error: None,
                        },
                    );
                }
                ChildEnvelope::Error { request_id, payload } => {
                    resolutions.borrow_mut().insert(
                        request_id,
                        Resolution {
                            ok: false,
                            result: serde_json::Value::Null,
                            error: Some(payload),
                        },
                    );
                }
            }
        }) as Box<dyn FnMut(web_sys::MessageEvent)>);

        self.port.set_onmessage(Some(closure.as_ref().unchecked_ref()));
        *self.on_message_closure.borrow_mut() = Some(closure);
    }

    /// Sends `PM_SET_CONFIG` after the handshake and is deduplicated via an
    /// in-flight `Promise` so concurrent `init()` callers share one call
    /// (spec §4.4 "Concurrency").
    pub async fn init(&self, config: WalletConfig) -> Result<(), WalletError> {
        if let Some(existing) = self.init_in_flight.borrow().clone() {
            JsFuture::from(existing)
                .await
                .map_err(|e| WalletError::Transport(format!("init failed: {:?}", e)))?;
            return Ok(());
        }

        let payload = serde_json::to_value(&config)
            .map_err(|e| WalletError::Validation(format!("invalid config: {}", e)))?;
        let promise = self.call_fire_and_forget(PmOp::SetConfig, payload, false);
        *self.init_in_flight.borrow_mut() = Some(promise.clone());
        let result = JsFuture::from(promise)
            .await
            .map(|_| ())
            .map_err(|e| WalletError::Transport(format!("init failed: {:?}", e)));
        *self.init_in_flight.borrow_mut() = None;
        result
    }

    /// Generic typed call: prepares the request (overlay intent + options
    /// stripping + requestId), posts it, and resolves/rejects on the
    /// matching `PM_RESULT`/`ERROR` envelope.
    pub async fn call(
        &self,
        op: PmOp,
        payload: serde_json::Value,
        sticky: bool,
        on_progress: Option<ProgressCallback>,
    ) -> Result<serde_json::Value, WalletError> {
        let prepared = self.core.borrow_mut().prepare(op, sticky, now_ms());

        if let Some(cb) = on_progress {
            self.progress.borrow_mut().subscribe(prepared.request_id.clone(), sticky, wrap_progress(cb));
        }

        match prepared.overlay_intent {
            OverlayIntent::Fullscreen => self.overlay.borrow_mut().show_fullscreen(),
            OverlayIntent::Hidden => {
                if !self.overlay.borrow().sticky() {
                    self.overlay.borrow_mut().hide();
                }
            }
        }

        self.post(op, &prepared.request_id, payload, &prepared.options)?;
        let resolution = self.await_resolution(&prepared.request_id).await;

        let settled_cleared = self.core.borrow_mut().settle(&prepared.request_id);
        if settled_cleared || !sticky {
            self.progress.borrow_mut().unregister(&prepared.request_id);
        }

        match resolution {
            Resolution { ok: true, result, .. } => Ok(result),
            Resolution { error: Some(err), .. } => Err(WalletError::from(err)),
            _ => Err(WalletError::Transport("child resolved without a result or error payload".to_string())),
        }
    }

    /// `PM_CANCEL`, best-effort: always clears local state regardless of the
    /// child's response (spec §4.4 "Concurrency").
    pub fn cancel(&self, request_id: Option<&str>) {
        let cleared = self.core.borrow_mut().cancel(request_id);
        for id in &cleared {
            self.progress.borrow_mut().unregister(id);
            self.resolutions.borrow_mut().remove(id);
        }
        let cancel_payload = serde_json::json!({ "requestId": request_id });
        let _ = self.post(PmOp::Cancel, &format!("cancel-{}", now_ms()), cancel_payload, &EnvelopeOptions::default());
    }

    fn call_fire_and_forget(&self, op: PmOp, payload: serde_json::Value, sticky: bool) -> Promise {
        let prepared = self.core.borrow_mut().prepare(op, sticky, now_ms());
        let request_id = prepared.request_id.clone();
        if let Err(err) = self.post(op, &request_id, payload, &prepared.options) {
            return Promise::reject(&JsValue::from_str(&err.message()));
        }
        let resolutions = self.resolutions.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            loop {
                if let Some(res) = resolutions.borrow_mut().remove(&request_id) {
                    return if res.ok {
                        Ok(JsValue::UNDEFINED)
                    } else {
                        Err(JsValue::from_str("request failed"))
                    };
                }
                poll_yield().await;
            }
        })
    }

    async fn await_resolution(&self, request_id: &str) -> Resolution {
        loop {
            if let Some(res) = self.resolutions.borrow_mut().remove(request_id) {
                return res;
            }
            if self.core.borrow().expired_request_ids(now_ms()).contains(&request_id.to_string()) {
                return Resolution {
                    ok: false,
                    result: serde_json::Value::Null,
                    error: Some(wallet_core::error::ErrorEnvelope {
                        code: "transport".to_string(),
                        message: format!("{} timed out waiting for a response", request_id),
                        details: None,
                    }),
                };
            }
            poll_yield().await;
        }
    }

    fn post(
        &self,
        op: PmOp,
        request_id: &str,
        payload: serde_json::Value,
        options: &EnvelopeOptions,
    ) -> Result<(), WalletError> {
        let request = PmRequest {
            op_type: op.wire_type().to_string(),
            request_id: request_id.to_string(),
            payload,
            options: if options.sticky.is_some() { Some(options.clone()) } else { None },
        };
        let js_value = serde_wasm_bindgen::to_value(&request)
            .map_err(|e| WalletError::Validation(format!("failed to serialize request: {}", e)))?;
        self.port
            .post_message(&js_value)
            .map_err(|e| WalletError::Transport(format!("postMessage failed: {:?}", e)))
    }
}

fn wrap_progress(mut cb: ProgressCallback) -> Box<dyn FnMut(&progress_bus::ProgressEvent)> {
    Box::new(move |event| {
        if let Ok(payload) = serde_json::from_value(event.payload.clone()) {
            cb(&event.request_id, payload);
        }
    })
}

fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

async fn poll_yield() {
    let promise = Promise::new(&mut |resolve, _reject| {
        if let Some(window) = web_sys::window() {
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, 0);
        } else {
            let _ = Reflect::apply(&resolve, &JsValue::NULL, &js_sys::Array::new());
        }
    });
    let _ = JsFuture::from(promise).await;
}
