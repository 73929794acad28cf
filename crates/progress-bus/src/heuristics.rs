//! Default [`PhaseHeuristics`] (spec §4.3): maps a wire phase string to an
//! overlay demand. Only the short windows around user activation — WebAuthn
//! ceremonies and explicit click-confirmation — demand `Show`; everything
//! after activation demands `Hide`.

/// Overlay demand a single phase observation expresses for its request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Demand {
    Show,
    Hide,
    None,
}

/// `Fn(&str) -> Demand`, pluggable so a host app can swap in its own
/// activation windows without forking the bus.
pub type PhaseHeuristics = fn(&str) -> Demand;

/// Phases that require a visible, focusable iframe because they straddle a
/// user-activation gesture (`navigator.credentials.create/get`, or an
/// explicit click-to-confirm step).
const SHOW_PHASES: &[&str] = &[
    "STEP_1_WEBAUTHN_VERIFICATION",
    "STEP_2_WEBAUTHN_ASSERTION",
    "STEP_4_WEBAUTHN_AUTHENTICATION",
    "STEP_2_USER_CONFIRMATION",
    "STEP_1_QR_CODE_GENERATED",
    "STEP_2_SCANNING",
    "STEP_3_AUTHORIZATION",
];

pub fn default_phase_heuristics(phase: &str) -> Demand {
    if SHOW_PHASES.contains(&phase) {
        Demand::Show
    } else if phase.is_empty() {
        Demand::None
    } else {
        Demand::Hide
    }
}
