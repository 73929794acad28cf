//! `sessionId`/`requestId = "${now}-${counter++}"`, mirroring
//! `wallet_iframe_router::request_id`'s pattern. The clock is injected so
//! this stays host-testable; the real wasm32 clock is supplied by whichever
//! crate owns the worker's `postMessage` boundary (this crate has no
//! `wasm-bindgen` dependency of its own).

pub trait Clock {
    fn now_ms(&self) -> u64;
}

pub struct RequestIdGenerator<C: Clock> {
    clock: C,
    counter: u64,
}

impl<C: Clock> RequestIdGenerator<C> {
    pub fn new(clock: C) -> Self {
        RequestIdGenerator { clock, counter: 0 }
    }

    pub fn next(&mut self) -> String {
        let id = format!("{}-{}", self.clock.now_ms(), self.counter);
        self.counter += 1;
        id
    }
}
