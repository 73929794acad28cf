//! Centralized configuration constants, mirroring the pattern used in
//! [`wallet_core::config`] of collecting tunables in one module.

/// Domain separator for VRF challenge generation. Keeps challenges from one
/// protocol version from verifying against another.
pub const VRF_DOMAIN_SEPARATOR: &[u8] = b"web3_authn_challenge_v4";

/// HKDF info string for ChaCha20 key derivation from a PRF output.
pub const HKDF_CHACHA20_KEY_INFO: &[u8] = b"vrf-chacha20-key";

/// HKDF info string for deriving the VRF secret deterministically from
/// `PRF.second`.
pub const HKDF_VRF_KEYPAIR_INFO: &[u8] = b"tatchi:v1:vrf-sk";

/// HKDF info string for deriving `WrapKeySeed` from `PRF.first`.
pub const HKDF_WRAP_KEY_SEED_INFO: &[u8] = b"near-wrap-seed";

pub const CHACHA20_KEY_SIZE: usize = 32;
pub const CHACHA20_NONCE_SIZE: usize = 12;
pub const VRF_SEED_SIZE: usize = 32;

/// HKDF info string for deriving an AEAD key from a Shamir3Pass KEK.
pub const SHAMIR_AEAD_HKDF_INFO: &[u8] = b"web3authn-shamir3pass-kek-to-aead-key-v1";

pub const SHAMIR_MIN_PRIME_BITS: usize = 256;
pub const SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS: u32 = 10;
pub const SHAMIR_RANDOM_BYTES_OVERHEAD: usize = 64;
pub const DEFAULT_SHAMIR_P_B64U: &str = "3N5w46AIGjGT2v5Vua_TMD5Ywfa9U2F7-WzW8SNDsIM";

/// Number of characters to show when truncating keys/hashes in log lines.
pub const DISPLAY_TRUNCATE_LENGTH: usize = 20;

/// Default VRF session TTL (ms). Mirrors `wallet_core::config::VRF_SESSION_DEFAULT_TTL_MS`.
pub const VRF_SESSION_DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

/// Default maximum number of `DISPENSE_SESSION_KEY` uses per session.
pub const VRF_SESSION_DEFAULT_MAX_USES: u32 = 5;

/// Log level the worker initializes `wasm_logger` with at startup.
pub const CURRENT_LOG_LEVEL: log::Level = log::Level::Debug;
