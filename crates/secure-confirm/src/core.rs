//! Host-testable phase/step bookkeeping for [`crate::flow::run_action_confirmation`],
//! split out the way `wallet_iframe_router::core::RouterCore` separates pure
//! decisions from the actual `postMessage` traffic (`crate::flow` is the
//! "router.rs" here: it calls out to real managers and is driven by this
//! struct's decisions rather than tracking phase/step itself).

use wallet_core::envelope::ProgressEnvelopeStatus;
use wallet_core::phases::ActionPhase;

/// One progress observation, pre-`ProgressPayload` so callers can route it
/// through whatever `emit`/`ProgressBus` plumbing they have without this
/// crate depending on `progress-bus` directly.
#[derive(Clone, Debug)]
pub struct ActionProgress {
    pub step: u32,
    pub phase: ActionPhase,
    pub status: ProgressEnvelopeStatus,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

fn step_number(phase: ActionPhase) -> u32 {
    match phase {
        ActionPhase::Preparation => 1,
        ActionPhase::UserConfirmation => 2,
        ActionPhase::ContractVerification => 3,
        ActionPhase::WebauthnAuthentication => 4,
        ActionPhase::AuthenticationComplete => 5,
        ActionPhase::TransactionSigningProgress => 6,
        ActionPhase::TransactionSigningComplete => 7,
        ActionPhase::Broadcasting => 8,
        ActionPhase::ActionComplete => 9,
        ActionPhase::ActionError => 0, // overwritten with the last reached step in `fail`
    }
}

/// Tracks the phase reached so far for one confirmation-bearing request and
/// produces the exact sequence of `ActionProgress` observations the spec
/// names (§4.8, §6 "Action: STEP_1..STEP_9_ACTION_COMPLETE").
pub struct ActionConfirmCore {
    request_id: String,
    sticky: bool,
    last_step: u32,
    settled: bool,
}

impl ActionConfirmCore {
    pub fn new(request_id: String, sticky: bool) -> Self {
        ActionConfirmCore { request_id, sticky, last_step: 0, settled: false }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn sticky(&self) -> bool {
        self.sticky
    }

    /// Entered a new phase but the work it represents hasn't finished yet
    /// (`STEP_N_X progress`).
    pub fn enter(&mut self, phase: ActionPhase, message: Option<String>) -> ActionProgress {
        let step = step_number(phase);
        self.last_step = step;
        ActionProgress {
            step,
            phase,
            status: ProgressEnvelopeStatus::Progress,
            message,
            data: None,
            error: None,
        }
    }

    /// The phase's work finished successfully (`STEP_N_X success`).
    pub fn complete(&mut self, phase: ActionPhase, data: Option<serde_json::Value>) -> ActionProgress {
        let step = step_number(phase);
        self.last_step = step;
        ActionProgress {
            step,
            phase,
            status: ProgressEnvelopeStatus::Success,
            message: None,
            data,
            error: None,
        }
    }

    /// Terminal failure at whatever step was last reached — spec §4.8
    /// "cancellation at any point ... surfaces a typed error" and §6's
    /// `ACTION_ERROR` phase, which carries no step number of its own.
    pub fn fail(&mut self, error: String) -> ActionProgress {
        self.settled = true;
        ActionProgress {
            step: self.last_step,
            phase: ActionPhase::ActionError,
            status: ProgressEnvelopeStatus::Error,
            message: None,
            data: None,
            error: Some(error),
        }
    }

    pub fn finish(&mut self) {
        self.settled = true;
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }
}
