//! Centralized configuration constants, mirroring `vrf_worker::config`.

/// HKDF info string for deriving the AEAD key (KEK) from `WrapKeySeed` + `wrapKeySalt`.
pub const NEAR_KEK_INFO: &[u8] = b"near-wrap-key-encryption-key";

/// HKDF info string for deriving the NEAR ed25519 signing seed from `PRF.second`.
pub const NEAR_KEY_DERIVATION_INFO: &[u8] = b"ed25519-signing-key-dual-prf-v1";

pub const CHACHA20_KEY_SIZE: usize = 32;
pub const CHACHA20_NONCE_SIZE: usize = 12;

/// NEP-413 message-signing domain prefix: `2**31 + 413`, little-endian.
pub const NEP413_PREFIX: u32 = 2_147_484_061;

/// Upper bound on how long a pre-minted signing session may be used for,
/// measured from the `createdAt` timestamp the caller supplies.
pub const SESSION_MAX_DURATION_MS: f64 = 5.0 * 60.0 * 1000.0;

/// Log level the worker initializes `wasm_logger` with at startup.
pub const CURRENT_LOG_LEVEL: log::Level = log::Level::Debug;

/// Gas attached to the `link_device_register_user` / Device2 registration
/// `FunctionCall`.
pub const LINK_DEVICE_REGISTRATION_GAS: u64 = 50_000_000_000_000;
