//! Host-testable request lifecycle: everything the Router decides before and
//! after posting bytes on the wire, independent of the actual `MessagePort`.

use wallet_core::config::REQUEST_TIMEOUT_MS;
use wallet_core::envelope::{EnvelopeOptions, PmOp};

use crate::overlay_intent::{overlay_intent_for, OverlayForceFullscreenGuard, OverlayIntent};
use crate::pending::PendingRequests;
use crate::request_id::{Clock, RequestIdGenerator};

/// What the Router must do before posting a request: the overlay intent to
/// apply, the stripped options, and the freshly minted `requestId`.
pub struct PreparedRequest {
    pub request_id: String,
    pub overlay_intent: OverlayIntent,
    pub options: EnvelopeOptions,
}

pub struct RouterCore<C: Clock> {
    request_ids: RequestIdGenerator<C>,
    pending: PendingRequests,
    overlay_guard: OverlayForceFullscreenGuard,
}

impl<C: Clock> RouterCore<C> {
    pub fn new(clock: C) -> Self {
        RouterCore {
            request_ids: RequestIdGenerator::new(clock),
            pending: PendingRequests::default(),
            overlay_guard: OverlayForceFullscreenGuard::default(),
        }
    }

    /// Spec §4.4 steps 1-3: compute overlay intent, strip non-allowlisted
    /// option fields, mint a `requestId`, and register the pending request.
    pub fn prepare(&mut self, op: PmOp, sticky: bool, now_ms: u64) -> PreparedRequest {
        let request_id = self.request_ids.next();
        let overlay_intent = overlay_intent_for(op);
        if matches!(op, PmOp::Register) {
            self.overlay_guard.engage(&request_id);
        }
        self.pending
            .register(request_id.clone(), op, sticky, REQUEST_TIMEOUT_MS, now_ms);
        PreparedRequest {
            request_id,
            overlay_intent,
            options: EnvelopeOptions {
                sticky: if sticky { Some(true) } else { None },
            },
        }
    }

    pub fn on_progress(&mut self, request_id: &str, now_ms: u64) {
        self.pending.reset_timeout(request_id, now_ms);
    }

    /// Spec §4.4 step 5: unregisters unless sticky; releases the
    /// fullscreen-force guard for `PM_REGISTER` requests.
    pub fn settle(&mut self, request_id: &str) -> bool {
        self.overlay_guard.release(request_id);
        if self.pending.is_sticky(request_id) {
            false
        } else {
            self.pending.settle(request_id);
            true
        }
    }

    pub fn cancel(&mut self, request_id: Option<&str>) -> Vec<String> {
        if let Some(id) = request_id {
            self.overlay_guard.release(id);
        }
        self.pending.cancel(request_id)
    }

    pub fn expired_request_ids(&self, now_ms: u64) -> Vec<String> {
        self.pending.expired_ids(now_ms)
    }

    pub fn overlay_force_fullscreen(&self) -> bool {
        self.overlay_guard.is_engaged()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
