//! Pure, host-testable phase bookkeeping for the device-linking flow (§6
//! "Device linking" phase enumeration; §4.9). No I/O: mirrors
//! `secure_confirm::core::ActionConfirmCore` one level down from
//! `DeviceLinkingPhase` instead of `ActionPhase`.

use wallet_core::envelope::ProgressEnvelopeStatus;
use wallet_core::phases::DeviceLinkingPhase;

/// A single progress tick for a device-linking session.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceLinkingProgress {
    pub step: u32,
    pub phase: DeviceLinkingPhase,
    pub status: ProgressEnvelopeStatus,
    pub message: Option<String>,
    pub error: Option<String>,
}

fn step_number(phase: DeviceLinkingPhase) -> u32 {
    match phase {
        DeviceLinkingPhase::Idle => 0,
        DeviceLinkingPhase::QrCodeGenerated => 1,
        DeviceLinkingPhase::Scanning => 2,
        DeviceLinkingPhase::Authorization => 3,
        DeviceLinkingPhase::Polling => 4,
        DeviceLinkingPhase::AddKeyDetected => 5,
        DeviceLinkingPhase::Registration => 6,
        DeviceLinkingPhase::LinkingComplete => 7,
        DeviceLinkingPhase::AutoLogin => 8,
        DeviceLinkingPhase::RegistrationError
        | DeviceLinkingPhase::LoginError
        | DeviceLinkingPhase::DeviceLinkingError => 0,
    }
}

/// Drives `IDLE → ... → STEP_8_AUTO_LOGIN`, or one of the three terminal
/// error phases, tracking the last step actually reached so a failure report
/// carries that step rather than `0` (spec §4.9 "all paths run a cleanup
/// step").
pub struct DeviceLinkingCore {
    sticky: bool,
    last_step: u32,
    settled: bool,
}

impl DeviceLinkingCore {
    pub fn new(sticky: bool) -> Self {
        DeviceLinkingCore { sticky, last_step: 0, settled: false }
    }

    pub fn sticky(&self) -> bool {
        self.sticky
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Advances to `phase`, returning the progress event to emit.
    pub fn enter(&mut self, phase: DeviceLinkingPhase, message: Option<String>) -> DeviceLinkingProgress {
        let step = step_number(phase);
        self.last_step = step;
        DeviceLinkingProgress {
            step,
            phase,
            status: ProgressEnvelopeStatus::Progress,
            message,
            error: None,
        }
    }

    pub fn finish(&mut self, message: Option<String>) -> DeviceLinkingProgress {
        self.settled = true;
        DeviceLinkingProgress {
            step: step_number(DeviceLinkingPhase::AutoLogin),
            phase: DeviceLinkingPhase::AutoLogin,
            status: ProgressEnvelopeStatus::Success,
            message,
            error: None,
        }
    }

    /// Settles into one of the three terminal error phases, carrying the
    /// last step this session actually reached.
    pub fn fail(&mut self, phase: DeviceLinkingPhase, error: String) -> DeviceLinkingProgress {
        debug_assert!(phase.is_terminal_error());
        self.settled = true;
        DeviceLinkingProgress {
            step: self.last_step,
            phase,
            status: ProgressEnvelopeStatus::Error,
            message: None,
            error: Some(error),
        }
    }
}
