//! §4.4 step 4: narrows the generic `ProgressPayload` a child posts into a
//! typed, phase-discriminated event keyed by which flow family produced it,
//! mirroring `wrapOnEvent(onEvent, isExpectedEvent)`.

use wallet_core::envelope::{PmOp, ProgressPayload};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SseCategory {
    Registration,
    Login,
    Action,
    DeviceLinking,
    AccountRecovery,
}

/// `None` for ops that never drive a typed SSE stream (config/theme/
/// read-only queries/cancel) — callers should not register an `onProgress`
/// for these, and `wrap_on_event` must not forward anything for them.
pub fn category_for(op: PmOp) -> Option<SseCategory> {
    match op {
        PmOp::Register | PmOp::ExportNearKeypairUi => Some(SseCategory::Registration),
        PmOp::Login | PmOp::Logout | PmOp::GetLoginState => Some(SseCategory::Login),
        PmOp::SignTxsWithActions
        | PmOp::SignAndSendTxs
        | PmOp::ExecuteAction
        | PmOp::SendTransaction
        | PmOp::SignNep413 => Some(SseCategory::Action),
        PmOp::LinkDeviceWithScannedQrData
        | PmOp::StartDevice2LinkingFlow
        | PmOp::StopDevice2LinkingFlow
        | PmOp::DeleteDeviceKey => Some(SseCategory::DeviceLinking),
        PmOp::RecoverAccountFlow => Some(SseCategory::AccountRecovery),
        _ => None,
    }
}

/// Wire phase strings a given category's flow can emit, per
/// `wallet_core::phases`. `AccountRecovery` has no dedicated phase enum —
/// `RecoverAccountFlow` dispatches through the login flow (see
/// `wallet_host::dispatch::classify`), so its progress events carry
/// `LoginPhase` strings too.
///
/// `STEP_1_PREPARATION`, `REGISTRATION_ERROR` and `LOGIN_ERROR` are each
/// shared by two phase enums, so this is a "could this event belong to
/// `category`" check, not a unique reverse lookup.
fn phase_matches_category(phase: &str, category: SseCategory) -> bool {
    match category {
        SseCategory::Registration => matches!(
            phase,
            "STEP_1_WEBAUTHN_VERIFICATION"
                | "STEP_2_KEY_GENERATION"
                | "STEP_3_ACCESS_KEY_ADDITION"
                | "STEP_4_ACCOUNT_VERIFICATION"
                | "STEP_5_DATABASE_STORAGE"
                | "STEP_6_CONTRACT_REGISTRATION"
                | "STEP_7_REGISTRATION_COMPLETE"
                | "REGISTRATION_ERROR"
        ),
        SseCategory::Login | SseCategory::AccountRecovery => matches!(
            phase,
            "STEP_1_PREPARATION"
                | "STEP_2_WEBAUTHN_ASSERTION"
                | "STEP_3_VRF_UNLOCK"
                | "STEP_4_LOGIN_COMPLETE"
                | "LOGIN_ERROR"
        ),
        SseCategory::Action => matches!(
            phase,
            "STEP_1_PREPARATION"
                | "STEP_2_USER_CONFIRMATION"
                | "STEP_3_CONTRACT_VERIFICATION"
                | "STEP_4_WEBAUTHN_AUTHENTICATION"
                | "STEP_5_AUTHENTICATION_COMPLETE"
                | "STEP_6_TRANSACTION_SIGNING_PROGRESS"
                | "STEP_7_TRANSACTION_SIGNING_COMPLETE"
                | "STEP_8_BROADCASTING"
                | "STEP_9_ACTION_COMPLETE"
                | "ACTION_ERROR"
        ),
        SseCategory::DeviceLinking => matches!(
            phase,
            "IDLE"
                | "STEP_1_QR_CODE_GENERATED"
                | "STEP_2_SCANNING"
                | "STEP_3_AUTHORIZATION"
                | "STEP_4_POLLING"
                | "STEP_5_ADDKEY_DETECTED"
                | "STEP_6_REGISTRATION"
                | "STEP_7_LINKING_COMPLETE"
                | "STEP_8_AUTO_LOGIN"
                | "REGISTRATION_ERROR"
                | "LOGIN_ERROR"
                | "DEVICE_LINKING_ERROR"
        ),
    }
}

#[derive(Clone, Debug)]
pub struct TypedProgressEvent {
    pub category: SseCategory,
    pub request_id: String,
    pub payload: ProgressPayload,
}

/// `isExpectedEvent` guard: only events whose category matches the
/// subscribing request's op are forwarded, so a stray event from one flow
/// family never leaks into a differently-typed callback. Classifies the
/// *incoming* event by its own `payload.phase`, not by re-deriving from the
/// captured `op` — ops with no stream (`category_for` returns `None`) never
/// forward anything.
pub fn wrap_on_event<F: FnMut(TypedProgressEvent)>(
    op: PmOp,
    mut on_event: F,
) -> impl FnMut(&str, ProgressPayload) {
    let expected = category_for(op);
    move |request_id: &str, payload: ProgressPayload| {
        let Some(expected) = expected else { return };
        if phase_matches_category(&payload.phase, expected) {
            on_event(TypedProgressEvent {
                category: expected,
                request_id: request_id.to_string(),
                payload,
            });
        }
    }
}
