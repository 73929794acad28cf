//! §4.4 step 1: maps an outgoing envelope's op to an overlay intent before
//! it is posted, and tracks the registration-flow's `overlayForceFullscreen`
//! guard (§4.4 "Overlay lifecycle").

use wallet_core::envelope::PmOp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayIntent {
    Fullscreen,
    Hidden,
}

pub fn overlay_intent_for(op: PmOp) -> OverlayIntent {
    if op.intends_fullscreen() {
        OverlayIntent::Fullscreen
    } else {
        OverlayIntent::Hidden
    }
}

/// While set, anchored-mode overlay updates from the host are ignored so a
/// register flow's fullscreen modal is never clipped to an anchor rect
/// mid-ceremony. Set when a `PM_REGISTER` request starts, cleared when it
/// settles.
#[derive(Default)]
pub struct OverlayForceFullscreenGuard {
    engaged_by: Option<String>,
}

impl OverlayForceFullscreenGuard {
    pub fn engage(&mut self, request_id: &str) {
        self.engaged_by = Some(request_id.to_string());
    }

    pub fn release(&mut self, request_id: &str) {
        if self.engaged_by.as_deref() == Some(request_id) {
            self.engaged_by = None;
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged_by.is_some()
    }
}
