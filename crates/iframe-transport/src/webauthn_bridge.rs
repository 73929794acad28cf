//! Parent-assisted WebAuthn bridge (spec §4.1 "Parent-assisted WebAuthn
//! bridge"). The host-testable half: deciding whether an incoming
//! `WALLET_WEBAUTHN_{CREATE,GET}` message is trusted.

/// A message claiming to be from the wallet iframe is only honored if its
/// origin matches the configured wallet origin exactly — same-origin
/// comparison, not prefix/substring matching.
pub fn is_trusted_wallet_origin(message_origin: &str, wallet_origin: &str) -> bool {
    message_origin == wallet_origin
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgedCeremony {
    Create,
    Get,
}

impl BridgedCeremony {
    pub fn request_type(self) -> &'static str {
        match self {
            BridgedCeremony::Create => "WALLET_WEBAUTHN_CREATE",
            BridgedCeremony::Get => "WALLET_WEBAUTHN_GET",
        }
    }

    pub fn result_type(self) -> &'static str {
        match self {
            BridgedCeremony::Create => "WALLET_WEBAUTHN_CREATE_RESULT",
            BridgedCeremony::Get => "WALLET_WEBAUTHN_GET_RESULT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_origin_match_is_trusted() {
        assert!(is_trusted_wallet_origin(
            "https://wallet.example.com",
            "https://wallet.example.com"
        ));
    }

    #[test]
    fn mismatched_or_substring_origin_is_rejected() {
        assert!(!is_trusted_wallet_origin(
            "https://evil.com",
            "https://wallet.example.com"
        ));
        assert!(!is_trusted_wallet_origin(
            "https://wallet.example.com.evil.com",
            "https://wallet.example.com"
        ));
    }

    #[test]
    fn ceremony_wire_types_match_spec() {
        assert_eq!(BridgedCeremony::Create.request_type(), "WALLET_WEBAUTHN_CREATE");
        assert_eq!(BridgedCeremony::Get.result_type(), "WALLET_WEBAUTHN_GET_RESULT");
    }
}
