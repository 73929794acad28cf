//! Backing state for `PM_SET_CONFIG`/`PM_SET_THEME`/`PM_SET_CONFIRM_BEHAVIOR`/
//! `PM_SET_CONFIRMATION_CONFIG`/`PM_GET_CONFIRMATION_CONFIG` (spec §6). None
//! of this crosses a worker boundary — it's host-side state the dispatch
//! layer reads before starting a flow and writes in response to the config
//! ops, the same separation `wallet_core::config`'s doc comment describes
//! for the timeout/interval constants.

use secure_confirm::{ConfirmationBehavior, Platform};
use wallet_core::config::WalletConfig;

/// Everything a running wallet host keeps outside of any one request: the
/// active `WalletConfig` plus the confirmation behavior/platform pair that
/// `secure_confirm::resolve_behavior` needs.
pub struct WalletHostConfigState {
    config: WalletConfig,
    confirm_behavior: ConfirmationBehavior,
    platform: Platform,
}

impl WalletHostConfigState {
    pub fn new(config: WalletConfig, platform: Platform) -> Self {
        WalletHostConfigState { config, confirm_behavior: ConfirmationBehavior::RequireClick, platform }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// `PM_SET_CONFIG`: replaces the whole config object.
    pub fn set_config(&mut self, config: WalletConfig) {
        self.config = config;
    }

    /// `PM_SET_THEME`: updates just the theme field.
    pub fn set_theme(&mut self, theme: wallet_core::config::Theme) {
        self.config.theme = theme;
    }

    /// `PM_SET_CONFIRM_BEHAVIOR` / `PM_SET_CONFIRMATION_CONFIG`.
    pub fn set_confirm_behavior(&mut self, behavior: ConfirmationBehavior) {
        self.confirm_behavior = behavior;
    }

    /// `PM_GET_CONFIRMATION_CONFIG`.
    pub fn confirm_behavior(&self) -> ConfirmationBehavior {
        self.confirm_behavior
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// What a confirmation-bearing flow should actually do for the next
    /// request, accounting for the Safari/iOS override (spec §4.8 "the
    /// resolved behavior, not the raw requested one, drives step 2").
    pub fn resolved_confirm_behavior(&self) -> ConfirmationBehavior {
        secure_confirm::resolve_behavior(self.confirm_behavior, self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::config::{NearNetwork, Theme};

    fn sample_config(theme: Theme) -> WalletConfig {
        WalletConfig {
            theme,
            near_rpc_url: "https://rpc.testnet.near.org".to_string(),
            near_network: NearNetwork::Testnet,
            contract_id: "wallet.testnet".to_string(),
            relayer: None,
            vrf_worker_configs: None,
            rp_id_override: None,
            authenticator_options: None,
            near_explorer_url: None,
            assets_base_url: "https://assets.example.com".to_string(),
            ui_registry: None,
        }
    }

    #[test]
    fn set_theme_updates_only_the_theme_field() {
        let mut state = WalletHostConfigState::new(sample_config(Theme::Dark), Platform::default());
        state.set_theme(Theme::Light);
        assert_eq!(state.config().theme, Theme::Light);
        assert_eq!(state.config().contract_id, "wallet.testnet");
    }

    #[test]
    fn safari_ios_forces_require_click_regardless_of_requested_behavior() {
        let mut state = WalletHostConfigState::new(
            sample_config(Theme::Dark),
            Platform { is_safari: true, is_ios: true },
        );
        state.set_confirm_behavior(ConfirmationBehavior::AutoProceed { delay_ms: 500 });
        assert_eq!(state.resolved_confirm_behavior(), ConfirmationBehavior::RequireClick);
    }

    #[test]
    fn non_safari_platform_keeps_the_requested_behavior() {
        let mut state = WalletHostConfigState::new(sample_config(Theme::Dark), Platform::default());
        state.set_confirm_behavior(ConfirmationBehavior::AutoProceed { delay_ms: 500 });
        assert_eq!(
            state.resolved_confirm_behavior(),
            ConfirmationBehavior::AutoProceed { delay_ms: 500 }
        );
    }
}
