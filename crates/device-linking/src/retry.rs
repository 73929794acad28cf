//! §9 "Retry logic in registration": `RetryPolicy = { classify(err) →
//! {retryable, delay, attempt} }`, applied to Device2's bounded registration
//! retries (§4.9 "Registration with retries").

use wallet_core::config::{MAX_REGISTRATION_ATTEMPTS, REGISTRATION_RETRY_DELAY_MS};
use wallet_core::error::WalletError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Terminal,
}

/// Distinguishes retryable registration errors — already-pending, focus,
/// transient network — from terminal ones (spec §4.9 "Registration with
/// retries"). `Transport` errors are always transient; `NotAllowed` is
/// retryable only for the specific already-pending/focus-loss messages the
/// WebAuthn ceremony can legitimately surface mid-retry.
pub fn classify_registration_error(err: &WalletError) -> RetryClass {
    match err {
        WalletError::Transport(_) => RetryClass::Retryable,
        WalletError::NotAllowed(message) => {
            let m = message.to_lowercase();
            if m.contains("already") || m.contains("pending") || m.contains("focus") {
                RetryClass::Retryable
            } else {
                RetryClass::Terminal
            }
        }
        _ => RetryClass::Terminal,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay_ms: u64 },
    Exhausted,
    Terminal,
}

/// Bounded fixed-delay retry counter (spec: "bounded attempts with fixed
/// delay"), source polls/retries at a fixed interval rather than backing off
/// (§9 open question (a): left as-is, not changed).
pub struct BoundedRetry {
    max_attempts: u32,
    delay_ms: u64,
    attempt: u32,
}

impl Default for BoundedRetry {
    fn default() -> Self {
        BoundedRetry::new(MAX_REGISTRATION_ATTEMPTS, REGISTRATION_RETRY_DELAY_MS)
    }
}

impl BoundedRetry {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        BoundedRetry { max_attempts, delay_ms, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Call after a failed attempt; decides whether to retry.
    pub fn record_failure(&mut self, err: &WalletError) -> RetryDecision {
        if classify_registration_error(err) == RetryClass::Terminal {
            return RetryDecision::Terminal;
        }
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry { attempt: self.attempt, delay_ms: self.delay_ms }
        }
    }
}
