use std::fmt;

/// One JSON-serializable error, matching the `ERROR` envelope payload in
/// spec §6: `{ code, message, details? }`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error kinds named by semantic in spec §7, not by implementation class.
#[derive(Clone, Debug)]
pub enum WalletError {
    Validation(String),
    NotAllowed(String),
    Transport(String),
    SessionExpired,
    SessionExhausted,
    SessionNotFound,
    Vrf(String),
    Signer(String),
    Contract(String),
    DeviceLinking(DeviceLinkingErrorCode, String),
    Registration { message: String, rollback: RollbackState },
}

/// §7 `DeviceLinkingError` codes, wire-stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceLinkingErrorCode {
    #[serde(rename = "REGISTRATION_FAILED")]
    RegistrationFailed,
    #[serde(rename = "AUTHORIZATION_TIMEOUT")]
    AuthorizationTimeout,
    #[serde(rename = "INVALID_QR_DATA")]
    InvalidQrData,
    #[serde(rename = "SESSION_EXPIRED")]
    SessionExpired,
}

impl fmt::Display for DeviceLinkingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceLinkingErrorCode::RegistrationFailed => "REGISTRATION_FAILED",
            DeviceLinkingErrorCode::AuthorizationTimeout => "AUTHORIZATION_TIMEOUT",
            DeviceLinkingErrorCode::InvalidQrData => "INVALID_QR_DATA",
            DeviceLinkingErrorCode::SessionExpired => "SESSION_EXPIRED",
        };
        f.write_str(s)
    }
}

/// Whether client-side registration state was rolled back, and whether the
/// on-chain account creation (irreversible) already happened.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct RollbackState {
    pub client_records_removed: bool,
    pub delete_key_broadcast: bool,
    pub on_chain_account_created: bool,
}

impl WalletError {
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::Validation(_) => "VALIDATION_ERROR",
            WalletError::NotAllowed(_) => "NOT_ALLOWED",
            WalletError::Transport(_) => "WALLET_TRANSPORT_ERROR",
            WalletError::SessionExpired => "session_expired",
            WalletError::SessionExhausted => "session_exhausted",
            WalletError::SessionNotFound => "session_not_found",
            WalletError::Vrf(_) => "VRF_ERROR",
            WalletError::Signer(_) => "SIGNER_ERROR",
            WalletError::Contract(_) => "CONTRACT_ERROR",
            WalletError::DeviceLinking(_, _) => "DEVICE_LINKING_ERROR",
            WalletError::Registration { .. } => "REGISTRATION_FAILED",
        }
    }

    pub fn message(&self) -> String {
        match self {
            WalletError::Validation(m)
            | WalletError::NotAllowed(m)
            | WalletError::Transport(m)
            | WalletError::Vrf(m)
            | WalletError::Signer(m)
            | WalletError::Contract(m) => m.clone(),
            WalletError::SessionExpired => "session_expired".to_string(),
            WalletError::SessionExhausted => "session_exhausted".to_string(),
            WalletError::SessionNotFound => "session_not_found".to_string(),
            WalletError::DeviceLinking(code, m) => format!("{}: {}", code, m),
            WalletError::Registration { message, .. } => message.clone(),
        }
    }

    /// Build the `{code, message, details?}` envelope sent over the port.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let details = match self {
            WalletError::DeviceLinking(code, _) => {
                Some(serde_json::json!({ "deviceLinkingCode": code }))
            }
            WalletError::Registration { rollback, .. } => serde_json::to_value(rollback).ok(),
            _ => None,
        };
        ErrorEnvelope {
            code: self.code().to_string(),
            message: self.message(),
            details,
        }
    }

    /// Human-readable message for unknown/mapped codes, with a correlation id
    /// equal to the requestId (spec §7 "User-visible failure").
    pub fn user_message(code: &str, request_id: &str) -> String {
        let mapped = match code {
            "VALIDATION_ERROR" => "Some of the information provided was invalid.",
            "NOT_ALLOWED" => "The operation was cancelled or not permitted by your device.",
            "WALLET_TRANSPORT_ERROR" => "Could not reach the wallet. Please try again.",
            "session_expired" => "Your session expired. Please confirm again.",
            "session_exhausted" => "This session can no longer be used. Please confirm again.",
            "session_not_found" => "No active session was found. Please start again.",
            "VRF_ERROR" => "Could not verify your passkey. Please try again.",
            "SIGNER_ERROR" => "Could not sign the transaction.",
            "CONTRACT_ERROR" => "The network rejected this request.",
            "DEVICE_LINKING_ERROR" => "Device linking could not be completed.",
            "REGISTRATION_FAILED" => "Registration could not be completed.",
            _ => "Something went wrong.",
        };
        format!("{} (ref: {})", mapped, request_id)
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for WalletError {}

/// Rehydrates a `WalletError` from a wire `ErrorEnvelope` received from the
/// child — used by the Router when a request settles with an `ERROR`
/// envelope it did not itself construct. Session/device-linking codes map
/// back to their typed variants; anything else degrades to `Transport` so
/// the message still reaches the caller.
impl From<ErrorEnvelope> for WalletError {
    fn from(env: ErrorEnvelope) -> Self {
        match env.code.as_str() {
            "session_expired" => WalletError::SessionExpired,
            "session_exhausted" => WalletError::SessionExhausted,
            "session_not_found" => WalletError::SessionNotFound,
            "VRF_ERROR" => WalletError::Vrf(env.message),
            "SIGNER_ERROR" => WalletError::Signer(env.message),
            "CONTRACT_ERROR" => WalletError::Contract(env.message),
            "NOT_ALLOWED" => WalletError::NotAllowed(env.message),
            "VALIDATION_ERROR" => WalletError::Validation(env.message),
            _ => WalletError::Transport(env.message),
        }
    }
}

/// Redact high-value secret fields from a JSON string before it is logged,
/// mirroring `wasm_signer_worker::error::scrub_js_error_value`'s field list.
pub fn scrub_secret_fields(input: &str) -> String {
    const REDACTED: &str = "[REDACTED]";
    const SECRET_KEYS: [&str; 8] = [
        "nearPrivateKey",
        "near_private_key",
        "wrapKeySeed",
        "wrap_key_seed",
        "prfOutput",
        "prf_output",
        "prfFirst",
        "prfSecond",
    ];

    let mut out = input.to_string();
    for key in SECRET_KEYS {
        let pattern = format!("\"{}\"", key);
        let mut search_from = 0usize;
        while let Some(pos) = out[search_from..].find(&pattern) {
            let key_start = search_from + pos;
            let after_key = key_start + pattern.len();
            let Some(colon_rel) = out[after_key..].find(':') else {
                break;
            };
            let colon_pos = after_key + colon_rel;
            let value_start = out[colon_pos + 1..]
                .find(|c: char| !c.is_whitespace())
                .map(|off| colon_pos + 1 + off);
            let Some(value_start) = value_start else { break };
            if out.as_bytes().get(value_start) != Some(&b'"') {
                search_from = value_start;
                continue;
            }
            let Some(end_rel) = out[value_start + 1..].find('"') else {
                break;
            };
            let value_end = value_start + 1 + end_rel;
            out.replace_range(value_start + 1..value_end, REDACTED);
            search_from = value_start + 1 + REDACTED.len() + 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_carry_wire_stable_codes() {
        assert_eq!(WalletError::SessionExhausted.code(), "session_exhausted");
        assert_eq!(WalletError::SessionExpired.code(), "session_expired");
        assert_eq!(WalletError::SessionNotFound.code(), "session_not_found");
    }

    #[test]
    fn device_linking_envelope_carries_code() {
        let err = WalletError::DeviceLinking(
            DeviceLinkingErrorCode::SessionExpired,
            "qr expired".to_string(),
        );
        let env = err.to_envelope();
        assert_eq!(env.code, "DEVICE_LINKING_ERROR");
        assert!(env.details.is_some());
    }

    #[test]
    fn scrubs_prf_and_wrap_key_fields() {
        let json = r#"{"prfOutput":"abcd1234","other":"keep-me"}"#;
        let scrubbed = scrub_secret_fields(json);
        assert!(!scrubbed.contains("abcd1234"));
        assert!(scrubbed.contains("keep-me"));
        assert!(scrubbed.contains("[REDACTED]"));
    }

    #[test]
    fn user_message_includes_correlation_id() {
        let msg = WalletError::user_message("session_expired", "req-42");
        assert!(msg.contains("req-42"));
    }

    #[test]
    fn wire_envelope_round_trips_back_into_typed_error() {
        let env = ErrorEnvelope {
            code: "session_exhausted".to_string(),
            message: "session_exhausted".to_string(),
            details: None,
        };
        let err: WalletError = env.into();
        assert!(matches!(err, WalletError::SessionExhausted));
    }
}
