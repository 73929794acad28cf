//! §4.8 SecureConfirmFlow: the per-operation confirmation state machine that
//! sits between the wallet host and the VRF/Signer workers. Computes the
//! intent digest the confirmation UI commits to, decides whether the
//! WebAuthn ceremony can auto-proceed or needs an explicit click, and drives
//! the signing request through its nine phases, surfacing a typed
//! [`wallet_core::error::WalletError`] on any failure.

pub mod behavior;
pub mod core;
pub mod flow;
pub mod intent;

pub use behavior::{resolve_behavior, ConfirmationBehavior, Platform};
pub use core::{ActionConfirmCore, ActionProgress};
pub use flow::{
    run_action_confirmation, ActionConfirmRequest, ActionConfirmResult, ContractPreCheck, ConfirmationUi,
    TransactionBroadcaster, WebauthnAssertion, WebauthnAssertionCollector,
};
pub use intent::{compute_intent_digest, TransactionInput};
