//! Spec §4.5 "dispatches PM_* envelopes to the PasskeyManager core, and for
//! each operation emits a stream of PROGRESS envelopes that mirror the
//! core's internal onEvent callbacks." This module is the pure,
//! host-testable half: classifying a `PmOp` into the flow that handles it,
//! and converting each flow's typed progress/result/error into the wire
//! `ChildEnvelope` shapes (spec §6). No transport, no worker managers — just
//! the translation layer `wallet_iframe_router::core` models one level up.

use serde::Serialize;

use wallet_core::envelope::{ChildEnvelope, PmOp, ProgressEnvelopeStatus, ProgressPayload};
use wallet_core::error::WalletError;

use crate::login::LoginProgress;
use crate::registration::RegistrationProgress;
use device_linking::DeviceLinkingProgress;
use secure_confirm::ActionProgress;

/// Which in-process flow owns a `PmOp` (spec §4.5's dispatch table).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Registration,
    Login,
    Logout,
    Action,
    DeviceLinking,
    Query,
    Config,
    Cancel,
}

/// Routes a `PmOp` to the flow responsible for it. Every `PmOp` variant is
/// covered; the match is exhaustive so adding an op without updating this
/// table is a compile error.
pub fn classify(op: PmOp) -> OperationKind {
    match op {
        PmOp::Register => OperationKind::Registration,
        PmOp::Login | PmOp::RecoverAccountFlow => OperationKind::Login,
        PmOp::Logout => OperationKind::Logout,
        PmOp::SignTxsWithActions
        | PmOp::SignAndSendTxs
        | PmOp::ExecuteAction
        | PmOp::SendTransaction
        | PmOp::SignNep413 => OperationKind::Action,
        PmOp::LinkDeviceWithScannedQrData | PmOp::StartDevice2LinkingFlow | PmOp::StopDevice2LinkingFlow => {
            OperationKind::DeviceLinking
        }
        PmOp::GetLoginState
        | PmOp::ViewAccessKeys
        | PmOp::HasPasskey
        | PmOp::ExportNearKeypairUi
        | PmOp::PrefetchBlockheight
        | PmOp::GetRecentLogins
        | PmOp::DeleteDeviceKey => OperationKind::Query,
        PmOp::SetConfig
        | PmOp::SetConfirmBehavior
        | PmOp::SetConfirmationConfig
        | PmOp::GetConfirmationConfig
        | PmOp::SetTheme => OperationKind::Config,
        PmOp::Cancel => OperationKind::Cancel,
    }
}

fn wire_phase<T: Serialize>(phase: T) -> String {
    match serde_json::to_value(phase) {
        Ok(serde_json::Value::String(s)) => s,
        other => other.map(|v| v.to_string()).unwrap_or_default(),
    }
}

/// The fields every flow's progress struct carries, factored out so
/// [`progress_envelope`] doesn't need one function per flow type.
trait ProgressLike {
    fn step(&self) -> u32;
    fn phase_wire(&self) -> String;
    fn status(&self) -> ProgressEnvelopeStatus;
    fn message(&self) -> Option<String>;
    fn data(&self) -> Option<serde_json::Value>;
    fn error(&self) -> Option<String>;
}

impl ProgressLike for RegistrationProgress {
    fn step(&self) -> u32 {
        self.step
    }
    fn phase_wire(&self) -> String {
        wire_phase(self.phase)
    }
    fn status(&self) -> ProgressEnvelopeStatus {
        self.status
    }
    fn message(&self) -> Option<String> {
        self.message.clone()
    }
    fn data(&self) -> Option<serde_json::Value> {
        self.data.clone()
    }
    fn error(&self) -> Option<String> {
        self.error.clone()
    }
}

impl ProgressLike for LoginProgress {
    fn step(&self) -> u32 {
        self.step
    }
    fn phase_wire(&self) -> String {
        wire_phase(self.phase)
    }
    fn status(&self) -> ProgressEnvelopeStatus {
        self.status
    }
    fn message(&self) -> Option<String> {
        self.message.clone()
    }
    fn data(&self) -> Option<serde_json::Value> {
        self.data.clone()
    }
    fn error(&self) -> Option<String> {
        self.error.clone()
    }
}

impl ProgressLike for ActionProgress {
    fn step(&self) -> u32 {
        self.step
    }
    fn phase_wire(&self) -> String {
        wire_phase(self.phase)
    }
    fn status(&self) -> ProgressEnvelopeStatus {
        self.status
    }
    fn message(&self) -> Option<String> {
        self.message.clone()
    }
    fn data(&self) -> Option<serde_json::Value> {
        self.data.clone()
    }
    fn error(&self) -> Option<String> {
        self.error.clone()
    }
}

impl ProgressLike for DeviceLinkingProgress {
    fn step(&self) -> u32 {
        self.step
    }
    fn phase_wire(&self) -> String {
        wire_phase(self.phase)
    }
    fn status(&self) -> ProgressEnvelopeStatus {
        self.status
    }
    fn message(&self) -> Option<String> {
        self.message.clone()
    }
    fn data(&self) -> Option<serde_json::Value> {
        None
    }
    fn error(&self) -> Option<String> {
        self.error.clone()
    }
}

fn progress_envelope(request_id: &str, progress: &impl ProgressLike) -> ChildEnvelope {
    ChildEnvelope::Progress {
        request_id: request_id.to_string(),
        payload: ProgressPayload {
            step: progress.step(),
            phase: progress.phase_wire(),
            status: progress.status(),
            message: progress.message(),
            data: progress.data(),
            error: progress.error(),
        },
    }
}

pub fn registration_progress_envelope(request_id: &str, progress: &RegistrationProgress) -> ChildEnvelope {
    progress_envelope(request_id, progress)
}

pub fn login_progress_envelope(request_id: &str, progress: &LoginProgress) -> ChildEnvelope {
    progress_envelope(request_id, progress)
}

pub fn action_progress_envelope(request_id: &str, progress: &ActionProgress) -> ChildEnvelope {
    progress_envelope(request_id, progress)
}

pub fn device_linking_progress_envelope(request_id: &str, progress: &DeviceLinkingProgress) -> ChildEnvelope {
    progress_envelope(request_id, progress)
}

/// `PM_RESULT`, spec §6.
pub fn result_envelope(request_id: &str, result: serde_json::Value) -> ChildEnvelope {
    ChildEnvelope::Result {
        request_id: request_id.to_string(),
        payload: wallet_core::envelope::PmResultPayload { ok: true, result },
    }
}

/// `ERROR`, spec §6/§7. Secrets in `error`'s details are never attached here
/// — `WalletError::to_envelope` only ever carries structured, non-secret
/// context (rollback flags, a device-linking error code).
pub fn error_envelope(request_id: &str, error: &WalletError) -> ChildEnvelope {
    ChildEnvelope::Error { request_id: request_id.to_string(), payload: error.to_envelope() }
}
