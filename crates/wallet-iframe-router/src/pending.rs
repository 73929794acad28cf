//! Per-`requestId` bookkeeping (spec §4.2 "PendingRequest", §4.4 step 3, 5).
//! The timeout itself is driven by the wasm32 glue in [`crate::router`]; this
//! module only tracks deadlines so the decision of "has this expired" stays
//! host-testable.

use std::collections::HashMap;

use wallet_core::envelope::PmOp;

pub struct PendingRequest {
    pub op: PmOp,
    pub sticky: bool,
    pub timeout_ms: u64,
    pub deadline_ms: u64,
}

#[derive(Default)]
pub struct PendingRequests {
    inner: HashMap<String, PendingRequest>,
}

impl PendingRequests {
    pub fn register(&mut self, request_id: String, op: PmOp, sticky: bool, timeout_ms: u64, now_ms: u64) {
        self.inner.insert(
            request_id,
            PendingRequest {
                op,
                sticky,
                timeout_ms,
                deadline_ms: now_ms + timeout_ms,
            },
        );
    }

    /// Progress events reset the request's timeout (spec §4.3 "Ordering").
    pub fn reset_timeout(&mut self, request_id: &str, now_ms: u64) {
        if let Some(pending) = self.inner.get_mut(request_id) {
            pending.deadline_ms = now_ms + pending.timeout_ms;
        }
    }

    pub fn settle(&mut self, request_id: &str) -> Option<PendingRequest> {
        self.inner.remove(request_id)
    }

    pub fn is_sticky(&self, request_id: &str) -> bool {
        self.inner.get(request_id).map(|p| p.sticky).unwrap_or(false)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.inner.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Cancellation is best-effort and always clears local state regardless
    /// of any child response (spec §4.4 "Concurrency"). `request_id = None`
    /// cancels every pending request.
    pub fn cancel(&mut self, request_id: Option<&str>) -> Vec<String> {
        match request_id {
            Some(id) => {
                if self.inner.remove(id).is_some() {
                    vec![id.to_string()]
                } else {
                    Vec::new()
                }
            }
            None => {
                let ids: Vec<String> = self.inner.keys().cloned().collect();
                self.inner.clear();
                ids
            }
        }
    }

    pub fn expired_ids(&self, now_ms: u64) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(_, p)| now_ms >= p.deadline_ms)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
