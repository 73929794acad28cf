//! Main-thread-side counterpart of `wasm_vrf_worker`'s `VRFKeyManager`
//! (spec §4.6): sends typed `VrfWorkerMessage`s to the VRF worker over
//! whatever channel the embedding crate provides, and mirrors enough of the
//! worker's session bookkeeping locally to avoid a round trip when a cached
//! session is obviously still usable.
//!
//! Pure Rust, no `wasm-bindgen` dependency, so the request/response protocol
//! is exercised in host tests with a fake [`VrfWorkerChannel`]; the real
//! `postMessage`-backed channel is implemented by whichever crate owns the
//! worker handle (signer-worker-manager, wallet-host).

pub mod request_id;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use log::{debug, warn};
use serde::de::DeserializeOwned;

use vrf_worker::messages::{VrfRequestType, VrfWorkerMessage, VrfWorkerResponse};
use vrf_worker::shamir_client::ShamirEncryptedVrfKeypair;
use vrf_worker::types::{DeriveVrfFromPrfResponse, EncryptedVRFKeypair, GenerateVrfKeypairBootstrapResponse, VRFInputData};
use wallet_core::config::{VRF_SESSION_DEFAULT_MAX_USES, VRF_SESSION_DEFAULT_TTL_MS};
use wallet_core::error::WalletError;

use request_id::{Clock, RequestIdGenerator};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Abstracts "post this message to the VRF worker, await its response" so
/// the manager logic is testable without a real `Worker`/`MessagePort`.
pub trait VrfWorkerChannel {
    fn send<'a>(&'a self, message: VrfWorkerMessage) -> BoxFuture<'a, VrfWorkerResponse>;
}

/// Local mirror of one `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER` session,
/// keyed by account id, so repeated signing requests for the same account
/// don't re-mint a session the worker would accept anyway.
#[derive(Clone, Debug)]
struct SessionRecord {
    session_id: String,
    expires_at_ms: u64,
    remaining_uses: u32,
}

impl SessionRecord {
    fn is_usable(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms && self.remaining_uses > 0
    }
}

pub struct VrfWorkerManager<C: Clock> {
    request_ids: RequestIdGenerator<C>,
    sessions: HashMap<String, SessionRecord>,
}

impl<C: Clock> VrfWorkerManager<C> {
    pub fn new(clock: C) -> Self {
        VrfWorkerManager {
            request_ids: RequestIdGenerator::new(clock),
            sessions: HashMap::new(),
        }
    }

    /// `BOOTSTRAP_GENERATE`.
    pub async fn bootstrap_generate(
        &mut self,
        channel: &impl VrfWorkerChannel,
        vrf_input_data: Option<VRFInputData>,
    ) -> Result<GenerateVrfKeypairBootstrapResponse, WalletError> {
        let payload = serde_json::json!({ "vrfInputData": vrf_input_data });
        self.send_and_parse(channel, VrfRequestType::BootstrapGenerate, payload).await
    }

    /// `DERIVE_VRF_FROM_PRF`.
    pub async fn derive_vrf_from_prf(
        &mut self,
        channel: &impl VrfWorkerChannel,
        prf_second_b64u: String,
        prf_first_b64u: String,
        near_account_id: String,
        vrf_input_data: Option<VRFInputData>,
    ) -> Result<DeriveVrfFromPrfResponse, WalletError> {
        let payload = serde_json::json!({
            "prfSecond": prf_second_b64u,
            "prfFirst": prf_first_b64u,
            "nearAccountId": near_account_id,
            "vrfInputData": vrf_input_data,
        });
        self.send_and_parse(channel, VrfRequestType::DeriveVrfFromPrf, payload).await
    }

    /// `UNLOCK_VRF`.
    pub async fn unlock_vrf(
        &mut self,
        channel: &impl VrfWorkerChannel,
        encrypted_vrf_keypair: EncryptedVRFKeypair,
        prf_first_b64u: String,
    ) -> Result<(), WalletError> {
        let payload = serde_json::json!({
            "encryptedVrfKeypair": encrypted_vrf_keypair,
            "prfFirst": prf_first_b64u,
        });
        self.send_and_expect_ok(channel, VrfRequestType::UnlockVrf, payload).await
    }

    pub async fn check_vrf_status(
        &mut self,
        channel: &impl VrfWorkerChannel,
    ) -> Result<serde_json::Value, WalletError> {
        self.send_and_parse(channel, VrfRequestType::CheckVrfStatus, serde_json::Value::Null).await
    }

    /// `LOGOUT`. Clears every locally mirrored session regardless of the
    /// worker's response, matching the Router's best-effort cancel pattern.
    pub async fn logout(&mut self, channel: &impl VrfWorkerChannel) -> Result<(), WalletError> {
        self.sessions.clear();
        self.send_and_expect_ok(channel, VrfRequestType::Logout, serde_json::Value::Null).await
    }

    /// Returns a still-usable `sessionId` for `near_account_id`, minting one
    /// via `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER` only if the local mirror
    /// has none or it's exhausted/expired (spec §4.6, §4.7 step 2).
    ///
    /// `attach_port` must already have been called on the worker for the
    /// minted `sessionId` before this resolves successfully — that's the
    /// caller's responsibility since it requires a real `MessagePort`.
    #[allow(clippy::too_many_arguments)]
    pub async fn ensure_session(
        &mut self,
        channel: &impl VrfWorkerChannel,
        near_account_id: &str,
        prf_first_b64u: String,
        prf_second_b64u: Option<String>,
        wrap_key_salt_b64u: Option<String>,
        now_ms: u64,
        ttl_ms: Option<u64>,
        remaining_uses: Option<u32>,
    ) -> Result<String, WalletError> {
        if let Some(existing) = self.sessions.get(near_account_id) {
            if existing.is_usable(now_ms) {
                debug!("reusing cached VRF session for {}", near_account_id);
                return Ok(existing.session_id.clone());
            }
        }

        let session_id = self.request_ids.next();
        let payload = serde_json::json!({
            "sessionId": session_id,
            "prfFirst": prf_first_b64u,
            "prfSecond": prf_second_b64u,
            "wrapKeySalt": wrap_key_salt_b64u,
            "ttlMs": ttl_ms,
            "remainingUses": remaining_uses,
        });
        self.send_and_expect_ok(channel, VrfRequestType::MintSessionKeysAndSendToSigner, payload)
            .await?;

        self.sessions.insert(
            near_account_id.to_string(),
            SessionRecord {
                session_id: session_id.clone(),
                expires_at_ms: now_ms + ttl_ms.unwrap_or(VRF_SESSION_DEFAULT_TTL_MS),
                remaining_uses: remaining_uses.unwrap_or(VRF_SESSION_DEFAULT_MAX_USES),
            },
        );
        Ok(session_id)
    }

    /// `DISPENSE_SESSION_KEY` for the cached session of `near_account_id`.
    /// On `session_expired`/`session_exhausted` the local mirror is dropped
    /// so the next `ensure_session` call re-mints instead of retrying a dead
    /// session.
    pub async fn dispense_session_key(
        &mut self,
        channel: &impl VrfWorkerChannel,
        near_account_id: &str,
    ) -> Result<(), WalletError> {
        let session_id = self
            .sessions
            .get(near_account_id)
            .map(|s| s.session_id.clone())
            .ok_or(WalletError::SessionNotFound)?;

        let payload = serde_json::json!({ "sessionId": session_id });
        let result = self.send_and_expect_ok(channel, VrfRequestType::DispenseSessionKey, payload).await;

        match &result {
            Ok(()) => {
                if let Some(record) = self.sessions.get_mut(near_account_id) {
                    record.remaining_uses = record.remaining_uses.saturating_sub(1);
                }
            }
            Err(WalletError::SessionExpired) | Err(WalletError::SessionExhausted) => {
                warn!("dropping exhausted/expired VRF session for {}", near_account_id);
                self.sessions.remove(near_account_id);
            }
            _ => {}
        }
        result
    }

    /// `SHAMIR_3PASS_ENCRYPT`.
    pub async fn shamir_encrypt(
        &mut self,
        channel: &impl VrfWorkerChannel,
    ) -> Result<ShamirEncryptedVrfKeypair, WalletError> {
        self.send_and_parse(channel, VrfRequestType::Shamir3PassEncrypt, serde_json::Value::Null)
            .await
    }

    /// `SHAMIR_3PASS_DECRYPT`.
    pub async fn shamir_decrypt(
        &mut self,
        channel: &impl VrfWorkerChannel,
        blob: ShamirEncryptedVrfKeypair,
    ) -> Result<(), WalletError> {
        let payload = serde_json::json!({ "blob": blob });
        self.send_and_expect_ok(channel, VrfRequestType::Shamir3PassDecrypt, payload).await
    }

    async fn send_and_parse<T: DeserializeOwned>(
        &mut self,
        channel: &impl VrfWorkerChannel,
        request_type: VrfRequestType,
        payload: serde_json::Value,
    ) -> Result<T, WalletError> {
        let response = self.dispatch(channel, request_type, payload).await;
        let response = response?;
        let data = response
            .data
            .ok_or_else(|| WalletError::Vrf("VRF worker returned no data".to_string()))?;
        serde_json::from_value(data).map_err(|e| WalletError::Vrf(format!("invalid VRF worker response: {}", e)))
    }

    async fn send_and_expect_ok(
        &mut self,
        channel: &impl VrfWorkerChannel,
        request_type: VrfRequestType,
        payload: serde_json::Value,
    ) -> Result<(), WalletError> {
        self.dispatch(channel, request_type, payload).await.map(|_| ())
    }

    async fn dispatch(
        &mut self,
        channel: &impl VrfWorkerChannel,
        request_type: VrfRequestType,
        payload: serde_json::Value,
    ) -> Result<VrfWorkerResponse, WalletError> {
        let id = self.request_ids.next();
        let message = VrfWorkerMessage {
            msg_type: request_type.name().to_string(),
            id: Some(id),
            payload: Some(payload),
        };
        let response = channel.send(message).await;
        if response.success {
            Ok(response)
        } else {
            Err(wallet_error_from_response(&response))
        }
    }
}

fn wallet_error_from_response(response: &VrfWorkerResponse) -> WalletError {
    let message = response.error.clone().unwrap_or_else(|| "VRF worker request failed".to_string());
    match response.error_code.as_deref() {
        Some("session_expired") => WalletError::SessionExpired,
        Some("session_exhausted") => WalletError::SessionExhausted,
        Some("session_not_found") => WalletError::SessionNotFound,
        _ => WalletError::Vrf(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeClock(Cell<u64>);
    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }

    /// Drives the worker's `VRFKeyManager` in process so the request/response
    /// contract is exercised without a real `postMessage` boundary.
    struct FakeChannel {
        manager: RefCell<vrf_worker::VRFKeyManager>,
        now_ms: Cell<f64>,
    }

    impl FakeChannel {
        fn new() -> Self {
            FakeChannel {
                manager: RefCell::new(vrf_worker::VRFKeyManager::new(None, None, None, None)),
                now_ms: Cell::new(0.0),
            }
        }
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        let waker = unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = Box::pin(fut);
        loop {
            if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    impl VrfWorkerChannel for FakeChannel {
        fn send<'a>(&'a self, message: VrfWorkerMessage) -> BoxFuture<'a, VrfWorkerResponse> {
            Box::pin(async move {
                let request_type = match VrfRequestType::try_from(message.msg_type.as_str()) {
                    Ok(t) => t,
                    Err(e) => return VrfWorkerResponse::fail(message.id, &e),
                };
                let now = self.now_ms.get();
                let id = message.id.clone();
                let mut mgr = self.manager.borrow_mut();

                match request_type {
                    VrfRequestType::BootstrapGenerate => match mgr.generate_vrf_keypair_bootstrap(now, None) {
                        Ok(data) => VrfWorkerResponse::success(id, serde_json::to_value(data).ok()),
                        Err(e) => VrfWorkerResponse::fail(id, &e),
                    },
                    VrfRequestType::MintSessionKeysAndSendToSigner => {
                        #[derive(serde::Deserialize)]
                        struct Req {
                            #[serde(rename = "sessionId")]
                            session_id: String,
                            #[serde(rename = "ttlMs")]
                            ttl_ms: Option<u64>,
                            #[serde(rename = "remainingUses")]
                            remaining_uses: Option<u32>,
                        }
                        let req: Req = message.parse_payload(request_type).unwrap();
                        match mgr.mint_session_keys(
                            now,
                            req.session_id,
                            vec![1u8; 32],
                            None,
                            None,
                            req.ttl_ms,
                            req.remaining_uses,
                        ) {
                            Ok(_) => VrfWorkerResponse::success(id, None),
                            Err(e) => VrfWorkerResponse::fail(id, &e),
                        }
                    }
                    VrfRequestType::DispenseSessionKey => {
                        #[derive(serde::Deserialize)]
                        struct Req {
                            #[serde(rename = "sessionId")]
                            session_id: String,
                        }
                        let req: Req = message.parse_payload(request_type).unwrap();
                        match mgr.dispense_session_key(&req.session_id, now) {
                            Ok(()) => VrfWorkerResponse::success(id, None),
                            Err(e) => VrfWorkerResponse::fail(id, &e),
                        }
                    }
                    VrfRequestType::Logout => {
                        mgr.logout();
                        VrfWorkerResponse::success(id, None)
                    }
                    _ => VrfWorkerResponse::fail(id, &vrf_worker::VrfWorkerError::invalid_format("unsupported in test fake")),
                }
            })
        }
    }

    #[test]
    fn ensure_session_reuses_a_cached_session_within_its_budget() {
        let mut mgr = VrfWorkerManager::new(FakeClock(Cell::new(1_000)));
        let channel = FakeChannel::new();
        block_on(mgr.bootstrap_generate(&channel, None)).unwrap();

        let first = block_on(mgr.ensure_session(
            &channel, "alice.near", "prf".to_string(), None, None, 0, Some(60_000), Some(3),
        ))
        .unwrap();
        let second = block_on(mgr.ensure_session(
            &channel, "alice.near", "prf".to_string(), None, None, 1_000, Some(60_000), Some(3),
        ))
        .unwrap();
        assert_eq!(first, second, "second call should reuse the cached session, not re-mint");
    }

    #[test]
    fn ensure_session_mints_a_fresh_session_once_the_cached_one_expires() {
        let mut mgr = VrfWorkerManager::new(FakeClock(Cell::new(1_000)));
        let channel = FakeChannel::new();
        block_on(mgr.bootstrap_generate(&channel, None)).unwrap();

        let first = block_on(mgr.ensure_session(
            &channel, "bob.near", "prf".to_string(), None, None, 0, Some(1_000), Some(3),
        ))
        .unwrap();
        let second = block_on(mgr.ensure_session(
            &channel, "bob.near", "prf".to_string(), None, None, 5_000, Some(1_000), Some(3),
        ))
        .unwrap();
        assert_ne!(first, second, "expired cached session must be replaced");
    }

    #[test]
    fn dispense_session_key_drops_the_local_mirror_once_exhausted() {
        let mut mgr = VrfWorkerManager::new(FakeClock(Cell::new(1_000)));
        let channel = FakeChannel::new();
        block_on(mgr.bootstrap_generate(&channel, None)).unwrap();
        block_on(mgr.ensure_session(&channel, "carol.near", "prf".to_string(), None, None, 0, Some(60_000), Some(1)))
            .unwrap();

        block_on(mgr.dispense_session_key(&channel, "carol.near")).unwrap();
        assert!(mgr.sessions.contains_key("carol.near"));

        let err = block_on(mgr.dispense_session_key(&channel, "carol.near")).unwrap_err();
        assert!(matches!(err, WalletError::SessionExhausted));
        assert!(!mgr.sessions.contains_key("carol.near"));
    }

    #[test]
    fn dispense_session_key_without_a_cached_session_is_session_not_found() {
        let mgr_channel = FakeChannel::new();
        let mut mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let err = block_on(mgr.dispense_session_key(&mgr_channel, "dave.near")).unwrap_err();
        assert!(matches!(err, WalletError::SessionNotFound));
    }

    #[test]
    fn logout_clears_every_cached_session() {
        let mut mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let channel = FakeChannel::new();
        block_on(mgr.bootstrap_generate(&channel, None)).unwrap();
        block_on(mgr.ensure_session(&channel, "erin.near", "prf".to_string(), None, None, 0, Some(60_000), Some(3)))
            .unwrap();
        assert!(!mgr.sessions.is_empty());
        block_on(mgr.logout(&channel)).unwrap();
        assert!(mgr.sessions.is_empty());
    }
}
