//! Shared value types for the passkey wallet core: account ids, error kinds,
//! wire-stable phase enumerations, the `PM_*` RPC envelope and configuration.
//! No `wasm-bindgen` dependency so every type here is testable on the host
//! target.

pub mod account_id;
pub mod config;
pub mod envelope;
pub mod error;
pub mod phases;

pub use account_id::{AccountId, AccountIdError};
pub use config::WalletConfig;
pub use error::WalletError;
