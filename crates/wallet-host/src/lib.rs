//! §4.5 WalletHost: receives `PM_*` envelopes, dispatches to the
//! registration/login/action/device-linking flows, and bridges each flow's
//! internal progress callbacks back out as `PROGRESS` envelopes. Functions
//! from `options` never cross the boundary; progress is the sole streaming
//! surface (spec §4.5, §9 "Callback options crossing a postMessage
//! boundary").
//!
//! Pure Rust, no `wasm-bindgen` dependency — the real `MessagePort` glue
//! lives wherever the host binary/crate wires this up to an actual worker
//! pair, the same split `wallet_iframe_router` uses between its `core` and
//! `router` modules.

pub mod config;
pub mod dispatch;
pub mod login;
pub mod registration;

pub use config::WalletHostConfigState;
pub use dispatch::{classify, error_envelope, result_envelope, OperationKind};
pub use login::{run_login, ClientDataLookup, LoginProgress, LoginRequest, LoginResult, StoredAccountData};
pub use registration::{
    run_registration, AccountVerifier, ClientDataStore, ClientUserDataRecord, ContractRegistrar,
    RegistrationProgress, RegistrationRequest, RegistrationResult, VrfRegistrationSummary,
};
