//! Reserves contiguous nonce ranges against a signing public key for a
//! transaction batch, releasing the reservation on any failure so a retried
//! batch doesn't skip nonces or collide with one still in flight.
//!
//! No direct teacher counterpart exists for this bookkeeping (the teacher
//! instead threads a single `current_nonce` counter through its batch-signing
//! loop and trusts the caller's `transactionContext.nextNonce`); this mirrors
//! [`vrf_worker::manager::VRFKeyManager`]'s `HashMap`-keyed session-bookkeeping
//! shape instead, scoped to nonce ranges rather than signer sessions.

use std::collections::HashMap;

use crate::errors::SignerWorkerError;

#[derive(Debug, Clone, Copy)]
struct Reservation {
    start: u64,
    count: u64,
}

pub struct NonceManager {
    reservations: HashMap<String, Reservation>,
}

impl NonceManager {
    pub fn new() -> Self {
        NonceManager { reservations: HashMap::new() }
    }

    /// Reserves `count` contiguous nonces starting at `next_nonce` for
    /// `public_key`. Fails if a reservation for this key is already
    /// outstanding — the caller must `commit` or `release` it first.
    pub fn reserve(&mut self, public_key: &str, next_nonce: u64, count: u64) -> Result<u64, SignerWorkerError> {
        if self.reservations.contains_key(public_key) {
            return Err(SignerWorkerError::NonceExhausted(public_key.to_string()));
        }
        if count == 0 {
            return Err(SignerWorkerError::ActionValidationError(
                "nonce reservation count must be non-zero".to_string(),
            ));
        }
        self.reservations.insert(public_key.to_string(), Reservation { start: next_nonce, count });
        Ok(next_nonce)
    }

    /// The `index`-th nonce (0-based) within an outstanding reservation.
    pub fn nonce_at(&self, public_key: &str, index: u64) -> Option<u64> {
        self.reservations.get(public_key).and_then(|r| {
            if index < r.count { Some(r.start + index) } else { None }
        })
    }

    /// Clears the reservation on successful completion of the batch.
    pub fn commit(&mut self, public_key: &str) {
        self.reservations.remove(public_key);
    }

    /// Clears the reservation on failure, so the next attempt can re-reserve
    /// from the same (or a freshly fetched) `next_nonce`.
    pub fn release(&mut self, public_key: &str) {
        self.reservations.remove(public_key);
    }

    pub fn has_reservation(&self, public_key: &str) -> bool {
        self.reservations.contains_key(public_key)
    }
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_a_contiguous_range() {
        let mut mgr = NonceManager::new();
        mgr.reserve("ed25519:alice", 10, 3).unwrap();
        assert_eq!(mgr.nonce_at("ed25519:alice", 0), Some(10));
        assert_eq!(mgr.nonce_at("ed25519:alice", 2), Some(12));
        assert_eq!(mgr.nonce_at("ed25519:alice", 3), None);
    }

    #[test]
    fn second_reservation_for_same_key_fails_until_released() {
        let mut mgr = NonceManager::new();
        mgr.reserve("ed25519:alice", 10, 3).unwrap();
        assert!(mgr.reserve("ed25519:alice", 20, 1).is_err());
        mgr.release("ed25519:alice");
        assert!(mgr.reserve("ed25519:alice", 20, 1).is_ok());
    }

    #[test]
    fn commit_clears_the_reservation() {
        let mut mgr = NonceManager::new();
        mgr.reserve("ed25519:alice", 10, 3).unwrap();
        mgr.commit("ed25519:alice");
        assert!(!mgr.has_reservation("ed25519:alice"));
    }
}
