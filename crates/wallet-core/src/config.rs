//! Centralized configuration, mirroring `wasm_vrf_worker::config`'s pattern
//! of collecting constants in one module so updates stay consistent.

use serde::{Deserialize, Serialize};

// === TIMEOUTS / INTERVALS (spec §6, overridable via `WalletConfig`) ===

pub const CONNECT_TIMEOUT_MS: u64 = 8_000;
pub const REQUEST_TIMEOUT_MS: u64 = 20_000;
pub const WILDCARD_CONNECT_ATTEMPTS: u32 = 6;
pub const IFRAME_LOAD_WAIT_MS: u64 = 150;
pub const SERVICE_HOST_BOOTED_WAIT_MS: u64 = 300;

pub const POLLING_INTERVAL_MS: u64 = 2_000;
pub const SESSION_EXPIRATION_MS: u64 = 10 * 60 * 1000;
pub const QR_CODE_MAX_AGE_MS: u64 = 5 * 60 * 1000;
pub const REGISTRATION_RETRY_DELAY_MS: u64 = 1_500;
pub const TEMP_KEY_CLEANUP_MS: u64 = 60 * 1000;
pub const MAX_REGISTRATION_ATTEMPTS: u32 = 5;

pub const VRF_SESSION_DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;
pub const VRF_SESSION_DEFAULT_MAX_USES: u32 = 5;

/// Backoff schedule for the CONNECT retry loop (§4.1 step 3): attempts 1-10
/// use 200ms, 11-20 use 400ms, thereafter 800ms.
pub fn connect_backoff_ms(attempt: u32) -> u64 {
    match attempt {
        0..=10 => 200,
        11..=20 => 400,
        _ => 800,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NearNetwork {
    Testnet,
    Mainnet,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayerConfig {
    pub account_id: String,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Shamir3PassConfig {
    pub p: Option<String>,
    #[serde(rename = "relayServerUrl")]
    pub relay_server_url: Option<String>,
    #[serde(rename = "applyServerLockRoute")]
    pub apply_server_lock_route: Option<String>,
    #[serde(rename = "removeServerLockRoute")]
    pub remove_server_lock_route: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VrfWorkerConfigs {
    pub shamir3pass: Option<Shamir3PassConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthenticatorOptions {
    #[serde(rename = "userVerification", skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<String>,
    #[serde(rename = "originPolicy", skip_serializing_if = "Option::is_none")]
    pub origin_policy: Option<String>,
}

/// Typed counterpart of the `PM_SET_CONFIG` payload (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    pub theme: Theme,
    pub near_rpc_url: String,
    pub near_network: NearNetwork,
    pub contract_id: String,
    #[serde(default)]
    pub relayer: Option<RelayerConfig>,
    #[serde(default)]
    pub vrf_worker_configs: Option<VrfWorkerConfigs>,
    #[serde(default)]
    pub rp_id_override: Option<String>,
    #[serde(default)]
    pub authenticator_options: Option<AuthenticatorOptions>,
    #[serde(default)]
    pub near_explorer_url: Option<String>,
    pub assets_base_url: String,
    #[serde(default)]
    pub ui_registry: Option<serde_json::Value>,
}
