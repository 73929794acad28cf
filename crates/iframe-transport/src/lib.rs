//! §4.1 IframeTransport: mounts the wallet iframe and completes the
//! CONNECT/READY handshake into a `MessagePort`.

pub mod handshake;
pub mod webauthn_bridge;
#[cfg(target_arch = "wasm32")]
pub mod transport;

pub use handshake::{HandshakeState, TargetOrigin};
pub use webauthn_bridge::{is_trusted_wallet_origin, BridgedCeremony};

#[cfg(target_arch = "wasm32")]
pub use transport::IframeTransport;

use wallet_core::error::WalletError;

/// Options accepted by [`transport::IframeTransport::connect`].
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    /// When set, connect rejects early if the signal is already aborted, and
    /// aborts the in-flight handshake loop otherwise.
    pub aborted: bool,
}

pub fn timeout_error(connect_timeout_ms: u64) -> WalletError {
    WalletError::Transport(format!(
        "Wallet iframe READY timeout after {}ms",
        connect_timeout_ms
    ))
}
