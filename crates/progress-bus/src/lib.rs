//! §4.3 ProgressBus: routes `{requestId, payload}` progress envelopes to
//! per-request subscribers and aggregates overlay demand across concurrently
//! in-flight requests.

pub mod heuristics;

use std::collections::HashMap;

pub use heuristics::{default_phase_heuristics, Demand, PhaseHeuristics};

pub type RequestId = String;

/// Registered for one in-flight request. `on_progress` is invoked in the
/// order events are published (FIFO per `requestId`); `sticky` requests are
/// not dropped by the bus itself when the Router resolves — the Router
/// decides whether to call [`ProgressBus::unregister`] at that point.
pub struct Subscriber {
    pub on_progress: Box<dyn FnMut(&ProgressEvent)>,
    pub sticky: bool,
    events_delivered: u64,
}

/// A single progress observation for a request.
#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub request_id: RequestId,
    pub phase: String,
    pub payload: serde_json::Value,
}

/// Tracks per-request subscribers and the aggregate overlay demand derived
/// from the phase heuristics. One bus instance lives for the lifetime of the
/// Router (spec §4.4).
pub struct ProgressBus {
    subscribers: HashMap<RequestId, Subscriber>,
    demand: HashMap<RequestId, Demand>,
    heuristics: PhaseHeuristics,
}

impl Default for ProgressBus {
    fn default() -> Self {
        ProgressBus::new(default_phase_heuristics)
    }
}

impl ProgressBus {
    pub fn new(heuristics: PhaseHeuristics) -> Self {
        ProgressBus {
            subscribers: HashMap::new(),
            demand: HashMap::new(),
            heuristics,
        }
    }

    pub fn subscribe(
        &mut self,
        request_id: RequestId,
        sticky: bool,
        on_progress: Box<dyn FnMut(&ProgressEvent)>,
    ) {
        self.subscribers.insert(
            request_id,
            Subscriber {
                on_progress,
                sticky,
                events_delivered: 0,
            },
        );
    }

    /// Routes a progress event to its subscriber (if any is still
    /// registered) and folds the phase's heuristic into the aggregate
    /// overlay demand. Returns `true` when the corresponding pending
    /// request's timeout should be reset, matching the spec's "progress
    /// events also reset the timeout" rule — any delivered event resets it.
    pub fn publish(&mut self, event: ProgressEvent) -> bool {
        let demand = (self.heuristics)(&event.phase);
        if demand != Demand::None {
            self.demand.insert(event.request_id.clone(), demand);
        }

        let mut delivered = false;
        if let Some(sub) = self.subscribers.get_mut(&event.request_id) {
            (sub.on_progress)(&event);
            sub.events_delivered += 1;
            delivered = true;
        }
        delivered
    }

    /// Clears a request's subscriber and overlay demand. The Router calls
    /// this on `PM_RESULT`/`ERROR` unless the request is sticky.
    pub fn unregister(&mut self, request_id: &str) {
        self.subscribers.remove(request_id);
        self.demand.remove(request_id);
    }

    pub fn is_sticky(&self, request_id: &str) -> bool {
        self.subscribers
            .get(request_id)
            .map(|s| s.sticky)
            .unwrap_or(false)
    }

    pub fn events_delivered(&self, request_id: &str) -> u64 {
        self.subscribers
            .get(request_id)
            .map(|s| s.events_delivered)
            .unwrap_or(0)
    }

    /// Overlay visibility equals "any active request whose latest phase
    /// heuristic is Show" — spec §5 invariant 3 (sticky is folded in by the
    /// caller, since stickiness lives on the Router's `PendingRequest`, not
    /// here).
    pub fn any_request_demands_show(&self) -> bool {
        self.demand.values().any(|d| *d == Demand::Show)
    }

    pub fn active_request_count(&self) -> usize {
        self.subscribers.len()
    }
}
