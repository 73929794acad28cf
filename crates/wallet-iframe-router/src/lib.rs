//! §4.4 WalletIframeRouter: typed RPC facade over the wallet iframe's
//! `MessagePort`.

pub mod core;
pub mod overlay_intent;
pub mod pending;
pub mod request_id;
pub mod sse;

#[cfg(target_arch = "wasm32")]
pub mod router;

#[cfg(target_arch = "wasm32")]
pub use router::WalletIframeRouter;

pub use core::{PreparedRequest, RouterCore};
pub use overlay_intent::{overlay_intent_for, OverlayForceFullscreenGuard, OverlayIntent};
pub use sse::{category_for, wrap_on_event, SseCategory, TypedProgressEvent};
