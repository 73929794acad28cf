//! The `MessagePort` RPC envelope (spec §6). JSON-serializable in both
//! directions; the wasm-bindgen boundary converts to/from `JsValue` via
//! `serde-wasm-bindgen` at the call site (kept out of this crate so it stays
//! dependency-light and host-testable).

use serde::{Deserialize, Serialize};

use crate::error::ErrorEnvelope;

/// `<OP>` in `PM_<OP>`, spec §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PmOp {
    Register,
    Login,
    Logout,
    GetLoginState,
    SignTxsWithActions,
    SignAndSendTxs,
    ExecuteAction,
    SendTransaction,
    SignNep413,
    ViewAccessKeys,
    HasPasskey,
    DeleteDeviceKey,
    ExportNearKeypairUi,
    LinkDeviceWithScannedQrData,
    StartDevice2LinkingFlow,
    StopDevice2LinkingFlow,
    RecoverAccountFlow,
    SetConfig,
    SetConfirmBehavior,
    SetConfirmationConfig,
    GetConfirmationConfig,
    SetTheme,
    PrefetchBlockheight,
    GetRecentLogins,
    Cancel,
}

impl PmOp {
    /// The envelope `type` string, e.g. `PM_REGISTER`.
    pub fn wire_type(self) -> &'static str {
        match self {
            PmOp::Register => "PM_REGISTER",
            PmOp::Login => "PM_LOGIN",
            PmOp::Logout => "PM_LOGOUT",
            PmOp::GetLoginState => "PM_GET_LOGIN_STATE",
            PmOp::SignTxsWithActions => "PM_SIGN_TXS_WITH_ACTIONS",
            PmOp::SignAndSendTxs => "PM_SIGN_AND_SEND_TXS",
            PmOp::ExecuteAction => "PM_EXECUTE_ACTION",
            PmOp::SendTransaction => "PM_SEND_TRANSACTION",
            PmOp::SignNep413 => "PM_SIGN_NEP413",
            PmOp::ViewAccessKeys => "PM_VIEW_ACCESS_KEYS",
            PmOp::HasPasskey => "PM_HAS_PASSKEY",
            PmOp::DeleteDeviceKey => "PM_DELETE_DEVICE_KEY",
            PmOp::ExportNearKeypairUi => "PM_EXPORT_NEAR_KEYPAIR_UI",
            PmOp::LinkDeviceWithScannedQrData => "PM_LINK_DEVICE_WITH_SCANNED_QR_DATA",
            PmOp::StartDevice2LinkingFlow => "PM_START_DEVICE2_LINKING_FLOW",
            PmOp::StopDevice2LinkingFlow => "PM_STOP_DEVICE2_LINKING_FLOW",
            PmOp::RecoverAccountFlow => "PM_RECOVER_ACCOUNT_FLOW",
            PmOp::SetConfig => "PM_SET_CONFIG",
            PmOp::SetConfirmBehavior => "PM_SET_CONFIRM_BEHAVIOR",
            PmOp::SetConfirmationConfig => "PM_SET_CONFIRMATION_CONFIG",
            PmOp::GetConfirmationConfig => "PM_GET_CONFIRMATION_CONFIG",
            PmOp::SetTheme => "PM_SET_THEME",
            PmOp::PrefetchBlockheight => "PM_PREFETCH_BLOCKHEIGHT",
            PmOp::GetRecentLogins => "PM_GET_RECENT_LOGINS",
            PmOp::Cancel => "PM_CANCEL",
        }
    }

    /// Operations that need user activation before WebAuthn can run, and so
    /// intend a `fullscreen` overlay (§4.4 step 1).
    pub fn intends_fullscreen(self) -> bool {
        matches!(
            self,
            PmOp::Register
                | PmOp::Login
                | PmOp::SignTxsWithActions
                | PmOp::SignAndSendTxs
                | PmOp::ExecuteAction
                | PmOp::SendTransaction
                | PmOp::SignNep413
                | PmOp::LinkDeviceWithScannedQrData
                | PmOp::StartDevice2LinkingFlow
                | PmOp::ExportNearKeypairUi
        )
    }
}

/// Options allowlist the Router keeps when stripping function-valued fields
/// from the caller's `options` object (spec §4.4 step 2, §9 "Callback
/// options crossing a postMessage boundary").
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EnvelopeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<bool>,
}

/// Parent -> Child envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PmRequest {
    #[serde(rename = "type")]
    pub op_type: String,
    pub request_id: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<EnvelopeOptions>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressEnvelopeStatus {
    Progress,
    Success,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub step: u32,
    pub phase: String,
    pub status: ProgressEnvelopeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Child -> Parent envelopes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChildEnvelope {
    #[serde(rename = "PROGRESS")]
    Progress { request_id: String, payload: ProgressPayload },
    #[serde(rename = "PM_RESULT")]
    Result { request_id: String, payload: PmResultPayload },
    #[serde(rename = "ERROR")]
    Error { request_id: String, payload: ErrorEnvelope },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PmResultPayload {
    pub ok: bool,
    pub result: serde_json::Value,
}

/// Out-of-band window messages (outside the `MessagePort`, spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WindowMessage {
    #[serde(rename = "CONNECT")]
    Connect,
    #[serde(rename = "READY")]
    Ready { protocol_version: String },
    #[serde(rename = "SERVICE_HOST_BOOTED")]
    ServiceHostBooted,
    #[serde(rename = "SERVICE_HOST_DEBUG_ORIGIN")]
    ServiceHostDebugOrigin { origin: String },
    #[serde(rename = "SERVICE_HOST_LOG")]
    ServiceHostLog { level: String, message: String },
    #[serde(rename = "WALLET_UI_REGISTER_TYPES")]
    WalletUiRegisterTypes,
    #[serde(rename = "WALLET_UI_MOUNT")]
    WalletUiMount,
    #[serde(rename = "WALLET_UI_UPDATE")]
    WalletUiUpdate,
    #[serde(rename = "WALLET_UI_UNMOUNT")]
    WalletUiUnmount,
    #[serde(rename = "WALLET_UI_CLOSED")]
    WalletUiClosed,
    #[serde(rename = "REGISTER_BUTTON_SUBMIT")]
    RegisterButtonSubmit,
    #[serde(rename = "REGISTER_BUTTON_RESULT")]
    RegisterButtonResult,
    #[serde(rename = "WALLET_WEBAUTHN_CREATE")]
    WalletWebauthnCreate { request_id: String, options: serde_json::Value },
    #[serde(rename = "WALLET_WEBAUTHN_GET")]
    WalletWebauthnGet { request_id: String, options: serde_json::Value },
    #[serde(rename = "WALLET_WEBAUTHN_CREATE_RESULT")]
    WalletWebauthnCreateResult { request_id: String, ok: bool, credential: Option<serde_json::Value> },
    #[serde(rename = "WALLET_WEBAUTHN_GET_RESULT")]
    WalletWebauthnGetResult { request_id: String, ok: bool, credential: Option<serde_json::Value> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_types_match_spec_strings() {
        assert_eq!(PmOp::Register.wire_type(), "PM_REGISTER");
        assert_eq!(PmOp::Cancel.wire_type(), "PM_CANCEL");
        assert_eq!(PmOp::SignTxsWithActions.wire_type(), "PM_SIGN_TXS_WITH_ACTIONS");
    }

    #[test]
    fn overlay_intent_split_matches_spec_4_4() {
        assert!(PmOp::Register.intends_fullscreen());
        assert!(PmOp::SignAndSendTxs.intends_fullscreen());
        assert!(!PmOp::GetLoginState.intends_fullscreen());
        assert!(!PmOp::HasPasskey.intends_fullscreen());
    }

    #[test]
    fn progress_envelope_round_trips() {
        let env = ChildEnvelope::Progress {
            request_id: "1-1".to_string(),
            payload: ProgressPayload {
                step: 2,
                phase: "STEP_2_WEBAUTHN_ASSERTION".to_string(),
                status: ProgressEnvelopeStatus::Progress,
                message: None,
                data: None,
                error: None,
            },
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"PROGRESS\""));
        let back: ChildEnvelope = serde_json::from_str(&json).unwrap();
        match back {
            ChildEnvelope::Progress { request_id, .. } => assert_eq!(request_id, "1-1"),
            _ => panic!("wrong variant"),
        }
    }
}
