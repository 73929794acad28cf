//! Login flow (spec §4.8/§6 "Login: STEP_1_PREPARATION .. STEP_4_LOGIN_COMPLETE"):
//! looks up the stored encrypted VRF keypair and NEAR private key for an
//! account, unlocks the VRF secret with a fresh WebAuthn PRF assertion,
//! mints a signer session, and decrypts the stored private key once to
//! confirm it still matches the account's recorded public key.

use wallet_core::envelope::ProgressEnvelopeStatus;
use wallet_core::error::WalletError;
use wallet_core::phases::LoginPhase;

use secure_confirm::{BoxFuture, WebauthnAssertion, WebauthnAssertionCollector};
use signer_worker_manager::{SignerWorkerChannel, SignerWorkerManager};
use vrf_worker::types::EncryptedVRFKeypair;
use vrf_worker_manager::request_id::Clock;
use vrf_worker_manager::{VrfWorkerChannel, VrfWorkerManager};

#[derive(Clone, Debug)]
pub struct LoginProgress {
    pub step: u32,
    pub phase: LoginPhase,
    pub status: ProgressEnvelopeStatus,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

fn step_number(phase: LoginPhase) -> u32 {
    match phase {
        LoginPhase::Preparation => 1,
        LoginPhase::WebauthnAssertion => 2,
        LoginPhase::VrfUnlock => 3,
        LoginPhase::LoginComplete => 4,
        LoginPhase::LoginError => 0,
    }
}

struct LoginCore {
    last_step: u32,
}

impl LoginCore {
    fn new() -> Self {
        LoginCore { last_step: 0 }
    }

    fn enter(&mut self, phase: LoginPhase, message: Option<String>) -> LoginProgress {
        let step = step_number(phase);
        self.last_step = step;
        LoginProgress { step, phase, status: ProgressEnvelopeStatus::Progress, message, data: None, error: None }
    }

    fn complete(&mut self, phase: LoginPhase, data: Option<serde_json::Value>) -> LoginProgress {
        let step = step_number(phase);
        self.last_step = step;
        LoginProgress { step, phase, status: ProgressEnvelopeStatus::Success, message: None, data, error: None }
    }

    fn fail(&mut self, error: String) -> LoginProgress {
        LoginProgress {
            step: self.last_step,
            phase: LoginPhase::LoginError,
            status: ProgressEnvelopeStatus::Error,
            message: None,
            data: None,
            error: Some(error),
        }
    }
}

/// What's on file for an account after registration (spec §3 `ClientUserData`).
#[derive(Clone, Debug)]
pub struct StoredAccountData {
    pub near_account_id: String,
    pub client_near_public_key: String,
    pub encrypted_vrf_keypair: EncryptedVRFKeypair,
    pub encrypted_private_key_data: String,
    pub encrypted_private_key_chacha20_nonce_b64u: String,
}

/// Spec §4.5 "looks up the client-stored encrypted keys for the account
/// before starting the unlock sequence."
pub trait ClientDataLookup {
    fn lookup<'a>(&'a self, near_account_id: &'a str) -> BoxFuture<'a, Result<StoredAccountData, WalletError>>;
}

pub struct LoginRequest {
    pub request_id: String,
    pub near_account_id: String,
    pub now_ms: u64,
}

#[derive(Debug)]
pub struct LoginResult {
    pub success: bool,
    pub near_account_id: String,
    pub client_near_public_key: String,
}

/// Runs `STEP_1_PREPARATION` .. `STEP_4_LOGIN_COMPLETE`, emitting every
/// `LoginProgress` in order.
pub async fn run_login<CV: Clock, CS: Clock>(
    request: LoginRequest,
    vrf_mgr: &mut VrfWorkerManager<CV>,
    vrf_channel: &impl VrfWorkerChannel,
    signer_mgr: &mut SignerWorkerManager<CS>,
    signer_channel: &impl SignerWorkerChannel,
    webauthn: &impl WebauthnAssertionCollector,
    data_lookup: &impl ClientDataLookup,
    mut emit: impl FnMut(LoginProgress),
) -> Result<LoginResult, WalletError> {
    let mut core = LoginCore::new();

    // STEP_1_PREPARATION
    emit(core.enter(LoginPhase::Preparation, None));
    let stored = match data_lookup.lookup(&request.near_account_id).await {
        Ok(s) => s,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    emit(core.complete(LoginPhase::Preparation, None));

    // STEP_2_WEBAUTHN_ASSERTION
    emit(core.enter(LoginPhase::WebauthnAssertion, None));
    let assertion: WebauthnAssertion = match webauthn.collect("").await {
        Ok(a) => a,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    emit(core.complete(LoginPhase::WebauthnAssertion, None));

    // STEP_3_VRF_UNLOCK
    emit(core.enter(LoginPhase::VrfUnlock, None));
    if let Err(e) = vrf_mgr
        .unlock_vrf(vrf_channel, stored.encrypted_vrf_keypair.clone(), assertion.prf_first_b64u.clone())
        .await
    {
        emit(core.fail(e.message()));
        return Err(e);
    }

    let session_id = match vrf_mgr
        .ensure_session(
            vrf_channel,
            &request.near_account_id,
            assertion.prf_first_b64u.clone(),
            Some(assertion.prf_second_b64u.clone()),
            None,
            request.now_ms,
            None,
            None,
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };

    let decrypted = match signer_mgr
        .decrypt_private_key_with_prf(
            signer_channel,
            &session_id,
            &request.near_account_id,
            &stored.encrypted_private_key_data,
            &stored.encrypted_private_key_chacha20_nonce_b64u,
        )
        .await
    {
        Ok(r) => r,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    if decrypted.near_account_id != stored.near_account_id {
        let e = WalletError::Validation("decrypted key does not belong to the requested account".to_string());
        emit(core.fail(e.message()));
        return Err(e);
    }
    emit(core.complete(LoginPhase::VrfUnlock, None));

    // STEP_4_LOGIN_COMPLETE
    let result = LoginResult {
        success: true,
        near_account_id: stored.near_account_id.clone(),
        client_near_public_key: stored.client_near_public_key.clone(),
    };
    emit(core.complete(
        LoginPhase::LoginComplete,
        Some(serde_json::json!({ "nearAccountId": result.near_account_id })),
    ));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::future::Future;

    use signer_worker::handlers;
    use signer_worker::{NonceManager, SignerRequestType, SignerWorkerMessage, SignerWorkerResponse};
    use vrf_worker::messages::{VrfRequestType, VrfWorkerMessage, VrfWorkerResponse};
    use vrf_worker::VRFKeyManager;

    struct FakeClock(Cell<u64>);
    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
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

    const PRF_SECOND: &[u8] = b"thirty-two-bytes-of-prf-output!!";

    struct FakeVrfChannel {
        manager: RefCell<VRFKeyManager>,
    }

    impl VrfWorkerChannel for FakeVrfChannel {
        fn send<'a>(&'a self, message: VrfWorkerMessage) -> vrf_worker_manager::BoxFuture<'a, VrfWorkerResponse> {
            Box::pin(async move {
                let request_type = match VrfRequestType::try_from(message.msg_type.as_str()) {
                    Ok(t) => t,
                    Err(e) => return VrfWorkerResponse::fail(message.id, &e),
                };
                let id = message.id.clone();
                let mut mgr = self.manager.borrow_mut();
                match request_type {
                    VrfRequestType::UnlockVrf => {
                        #[derive(serde::Deserialize)]
                        struct Req {
                            #[serde(rename = "encryptedVrfKeypair")]
                            encrypted_vrf_keypair: EncryptedVRFKeypair,
                            #[serde(rename = "prfFirst")]
                            prf_first: String,
                        }
                        let req: Req = message.parse_payload(request_type).unwrap();
                        match mgr.unlock_vrf_keypair(
                            0.0,
                            req.encrypted_vrf_keypair,
                            vrf_worker::utils::base64_url_decode(&req.prf_first).unwrap(),
                        ) {
                            Ok(_) => VrfWorkerResponse::success(id, None),
                            Err(e) => VrfWorkerResponse::fail(id, &e),
                        }
                    }
                    VrfRequestType::MintSessionKeysAndSendToSigner => {
                        #[derive(serde::Deserialize)]
                        struct Req {
                            #[serde(rename = "sessionId")]
                            session_id: String,
                        }
                        let req: Req = message.parse_payload(request_type).unwrap();
                        match mgr.mint_session_keys(0.0, req.session_id, vec![1u8; 32], None, None, None, None) {
                            Ok(_) => VrfWorkerResponse::success(id, None),
                            Err(e) => VrfWorkerResponse::fail(id, &e),
                        }
                    }
                    _ => VrfWorkerResponse::fail(id, &vrf_worker::VrfWorkerError::invalid_format("unsupported in test fake")),
                }
            })
        }
    }

    struct FakeSignerChannel {
        wrap_key: signer_worker::crypto::WrapKey,
        nonce_manager: RefCell<NonceManager>,
    }

    impl SignerWorkerChannel for FakeSignerChannel {
        fn send<'a>(&'a self, message: SignerWorkerMessage) -> signer_worker_manager::BoxFuture<'a, SignerWorkerResponse> {
            Box::pin(async move {
                let id = message.id.clone();
                let request_type = match SignerRequestType::try_from(message.msg_type.as_str()) {
                    Ok(t) => t,
                    Err(e) => return SignerWorkerResponse::fail(id, &e),
                };
                match request_type {
                    SignerRequestType::DecryptPrivateKeyWithPrf => {
                        let req = message.parse_payload(request_type).unwrap();
                        match handlers::decrypt_private_key_with_prf(req, &self.wrap_key) {
                            Ok(r) => SignerWorkerResponse::success(id, serde_json::to_value(r).ok()),
                            Err(e) => SignerWorkerResponse::fail(id, &e),
                        }
                    }
                    _ => SignerWorkerResponse::fail(
                        id,
                        &signer_worker::SignerWorkerError::invalid_format("unsupported in test fake"),
                    ),
                }
            })
        }
    }

    struct FakeWebauthn;
    impl WebauthnAssertionCollector for FakeWebauthn {
        fn collect<'a>(&'a self, _vrf_challenge: &'a str) -> BoxFuture<'a, Result<WebauthnAssertion, WalletError>> {
            Box::pin(async move {
                Ok(WebauthnAssertion {
                    prf_first_b64u: signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                    prf_second_b64u: signer_worker::crypto::base64_url_encode(PRF_SECOND),
                    credential: serde_json::json!({ "id": "cred-1" }),
                })
            })
        }
    }

    struct FixedLookup(StoredAccountData);
    impl ClientDataLookup for FixedLookup {
        fn lookup<'a>(&'a self, _near_account_id: &'a str) -> BoxFuture<'a, Result<StoredAccountData, WalletError>> {
            let data = self.0.clone();
            Box::pin(async move { Ok(data) })
        }
    }

    fn stored_account_data() -> StoredAccountData {
        let wrap_key = signer_worker::crypto::WrapKey::new(
            signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
            signer_worker::crypto::base64_url_encode(b"a-wrap-key-salt!"),
        );
        let (private_key, public_key) =
            signer_worker::crypto::derive_ed25519_key_from_prf_output(
                &signer_worker::crypto::base64_url_encode(PRF_SECOND),
                "alice.near",
            )
            .unwrap();
        let kek = wrap_key.derive_kek().unwrap();
        let encrypted = signer_worker::crypto::encrypt_data_chacha20(&private_key, &kek).unwrap();
        StoredAccountData {
            near_account_id: "alice.near".to_string(),
            client_near_public_key: public_key,
            encrypted_vrf_keypair: EncryptedVRFKeypair {
                encrypted_vrf_data_b64u: "irrelevant-in-fake".to_string(),
                chacha20_nonce_b64u: "irrelevant-in-fake".to_string(),
            },
            encrypted_private_key_data: encrypted.encrypted_near_key_data_b64u,
            encrypted_private_key_chacha20_nonce_b64u: encrypted.chacha20_nonce_b64u,
        }
    }

    #[test]
    fn happy_path_reaches_login_complete() {
        let vrf_channel = FakeVrfChannel { manager: RefCell::new(VRFKeyManager::new(None, None, None, None)) };
        let signer_channel = FakeSignerChannel {
            wrap_key: signer_worker::crypto::WrapKey::new(
                signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                signer_worker::crypto::base64_url_encode(b"a-wrap-key-salt!"),
            ),
            nonce_manager: RefCell::new(NonceManager::new()),
        };
        let mut vrf_mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));

        let mut phases = Vec::new();
        let result = block_on(run_login(
            LoginRequest { request_id: "2-0".to_string(), near_account_id: "alice.near".to_string(), now_ms: 1_000 },
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &FakeWebauthn,
            &FixedLookup(stored_account_data()),
            |p| phases.push(p.phase),
        ))
        .unwrap();

        assert!(result.success);
        assert_eq!(result.near_account_id, "alice.near");
        assert_eq!(phases.last(), Some(&LoginPhase::LoginComplete));
    }

    #[test]
    fn lookup_failure_surfaces_before_any_webauthn_collection() {
        struct FailingLookup;
        impl ClientDataLookup for FailingLookup {
            fn lookup<'a>(&'a self, _near_account_id: &'a str) -> BoxFuture<'a, Result<StoredAccountData, WalletError>> {
                Box::pin(async { Err(WalletError::Validation("no stored account data".to_string())) })
            }
        }
        struct PanicsIfCalled;
        impl WebauthnAssertionCollector for PanicsIfCalled {
            fn collect<'a>(&'a self, _vrf_challenge: &'a str) -> BoxFuture<'a, Result<WebauthnAssertion, WalletError>> {
                panic!("webauthn must not be collected before the account lookup succeeds")
            }
        }

        let vrf_channel = FakeVrfChannel { manager: RefCell::new(VRFKeyManager::new(None, None, None, None)) };
        let signer_channel = FakeSignerChannel {
            wrap_key: signer_worker::crypto::WrapKey::new(
                signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                signer_worker::crypto::base64_url_encode(b"a-wrap-key-salt!"),
            ),
            nonce_manager: RefCell::new(NonceManager::new()),
        };
        let mut vrf_mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));

        let mut phases = Vec::new();
        let err = block_on(run_login(
            LoginRequest { request_id: "2-1".to_string(), near_account_id: "alice.near".to_string(), now_ms: 1_000 },
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &PanicsIfCalled,
            &FailingLookup,
            |p| phases.push(p.phase),
        ))
        .unwrap_err();

        assert!(matches!(err, WalletError::Validation(_)));
        assert_eq!(phases.last(), Some(&LoginPhase::LoginError));
    }
}
