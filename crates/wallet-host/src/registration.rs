//! Registration flow (spec §4.8, §6 "Registration:
//! STEP_1_WEBAUTHN_VERIFICATION .. STEP_7_REGISTRATION_COMPLETE", §8
//! scenarios 2-3): derives the VRF and NEAR keypairs from a single WebAuthn
//! `create()` ceremony's PRF outputs, adds the new NEAR key on-chain,
//! verifies the account, persists the client-side records, and registers
//! with the passkey contract — rolling back the client records and
//! broadcasting a pre-signed `DeleteKey` if contract verification reports
//! `verified: false` (spec §7 "Contract-registered state is explicitly
//! documented as non-rollbackable").

use wallet_core::envelope::ProgressEnvelopeStatus;
use wallet_core::error::{RollbackState, WalletError};
use wallet_core::phases::RegistrationPhase;

use secure_confirm::{BoxFuture, WebauthnAssertion, WebauthnAssertionCollector};
use signer_worker_manager::{ActionParams, SignerWorkerChannel, SignerWorkerManager};
use vrf_worker::types::VRFInputData;
use vrf_worker_manager::request_id::Clock;
use vrf_worker_manager::{VrfWorkerChannel, VrfWorkerManager};

/// One progress observation for a registration request.
#[derive(Clone, Debug)]
pub struct RegistrationProgress {
    pub step: u32,
    pub phase: RegistrationPhase,
    pub status: ProgressEnvelopeStatus,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

fn step_number(phase: RegistrationPhase) -> u32 {
    match phase {
        RegistrationPhase::WebauthnVerification => 1,
        RegistrationPhase::KeyGeneration => 2,
        RegistrationPhase::AccessKeyAddition => 3,
        RegistrationPhase::AccountVerification => 4,
        RegistrationPhase::DatabaseStorage => 5,
        RegistrationPhase::ContractRegistration => 6,
        RegistrationPhase::RegistrationComplete => 7,
        RegistrationPhase::RegistrationError => 0,
    }
}

struct RegistrationCore {
    last_step: u32,
    settled: bool,
}

impl RegistrationCore {
    fn new() -> Self {
        RegistrationCore { last_step: 0, settled: false }
    }

    fn enter(&mut self, phase: RegistrationPhase, message: Option<String>) -> RegistrationProgress {
        let step = step_number(phase);
        self.last_step = step;
        RegistrationProgress { step, phase, status: ProgressEnvelopeStatus::Progress, message, data: None, error: None }
    }

    fn complete(&mut self, phase: RegistrationPhase, data: Option<serde_json::Value>) -> RegistrationProgress {
        let step = step_number(phase);
        self.last_step = step;
        if phase == RegistrationPhase::RegistrationComplete {
            self.settled = true;
        }
        RegistrationProgress { step, phase, status: ProgressEnvelopeStatus::Success, message: None, data, error: None }
    }

    fn fail(&mut self, error: String) -> RegistrationProgress {
        self.settled = true;
        RegistrationProgress {
            step: self.last_step,
            phase: RegistrationPhase::RegistrationError,
            status: ProgressEnvelopeStatus::Error,
            message: None,
            data: None,
            error: Some(error),
        }
    }
}

/// Spec §3 `ClientUserData` + `EncryptedKeyData`, flattened into the one
/// record a single-device registration produces.
#[derive(Clone, Debug)]
pub struct ClientUserDataRecord {
    pub near_account_id: String,
    pub client_near_public_key: String,
    pub encrypted_vrf_keypair: vrf_worker::types::EncryptedVRFKeypair,
    pub encrypted_private_key_data: String,
    pub encrypted_private_key_chacha20_nonce_b64u: String,
    pub wrap_key_salt_b64u: String,
    pub device_number: u32,
}

/// Spec §5 "registration uses an atomic multi-store transaction (`user` +
/// `authenticator` + `nearKeys`) that is rolled back on any error".
pub trait ClientDataStore {
    fn store<'a>(&'a self, record: &'a ClientUserDataRecord) -> BoxFuture<'a, Result<(), WalletError>>;
    fn rollback<'a>(&'a self, near_account_id: &'a str) -> BoxFuture<'a, Result<(), WalletError>>;
}

/// A cheap on-chain existence check (spec §4.8 step "STEP_4_ACCOUNT_VERIFICATION").
pub trait AccountVerifier {
    fn verify<'a>(&'a self, near_account_id: &'a str) -> BoxFuture<'a, Result<bool, WalletError>>;
}

/// The passkey contract's own registration call (spec §6 "STEP_6_CONTRACT_REGISTRATION";
/// §8 scenario 3 "the contract pre-check returns `verified=false`").
pub trait ContractRegistrar {
    fn register<'a>(
        &'a self,
        near_account_id: &'a str,
        vrf_public_key: &'a str,
    ) -> BoxFuture<'a, Result<bool, WalletError>>;
}

pub struct RegistrationRequest {
    pub request_id: String,
    pub near_account_id: String,
    pub next_nonce: u64,
    pub block_hash_b58: String,
    pub now_ms: u64,
}

#[derive(Debug)]
pub struct VrfRegistrationSummary {
    pub contract_verified: bool,
}

#[derive(Debug)]
pub struct RegistrationResult {
    pub success: bool,
    pub near_account_id: String,
    pub client_near_public_key: String,
    pub transaction_id: String,
    pub vrf_registration: VrfRegistrationSummary,
}

/// Runs `STEP_1_WEBAUTHN_VERIFICATION` .. `STEP_7_REGISTRATION_COMPLETE`,
/// emitting every `RegistrationProgress` in order (spec §8 property 1).
#[allow(clippy::too_many_arguments)]
pub async fn run_registration<CV: Clock, CS: Clock>(
    request: RegistrationRequest,
    vrf_mgr: &mut VrfWorkerManager<CV>,
    vrf_channel: &impl VrfWorkerChannel,
    signer_mgr: &mut SignerWorkerManager<CS>,
    signer_channel: &impl SignerWorkerChannel,
    webauthn: &impl WebauthnAssertionCollector,
    broadcaster: &impl secure_confirm::TransactionBroadcaster,
    account_verifier: &impl AccountVerifier,
    client_store: &impl ClientDataStore,
    contract_registrar: &impl ContractRegistrar,
    mut emit: impl FnMut(RegistrationProgress),
) -> Result<RegistrationResult, WalletError> {
    let mut core = RegistrationCore::new();

    // STEP_1_WEBAUTHN_VERIFICATION
    emit(core.enter(RegistrationPhase::WebauthnVerification, None));
    let assertion: WebauthnAssertion = match webauthn.collect("").await {
        Ok(a) => a,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    emit(core.complete(RegistrationPhase::WebauthnVerification, None));

    // STEP_2_KEY_GENERATION
    emit(core.enter(RegistrationPhase::KeyGeneration, None));
    let vrf_input_data = VRFInputData {
        user_id: request.near_account_id.clone(),
        rp_id: String::new(),
        block_height: String::new(),
        block_hash: request.block_hash_b58.clone(),
    };
    let vrf_derived = match vrf_mgr
        .derive_vrf_from_prf(
            vrf_channel,
            assertion.prf_second_b64u.clone(),
            assertion.prf_first_b64u.clone(),
            request.near_account_id.clone(),
            Some(vrf_input_data),
        )
        .await
    {
        Ok(r) => r,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    let encrypted_vrf_keypair = match vrf_derived.encrypted_vrf_keypair {
        Some(blob) => blob,
        None => {
            let e = WalletError::Vrf("derive_vrf_from_prf returned no encrypted keypair".to_string());
            emit(core.fail(e.message()));
            return Err(e);
        }
    };

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
    let near_derived = match signer_mgr
        .derive_near_keypair_and_encrypt(signer_channel, &session_id, &request.near_account_id, &assertion.prf_second_b64u)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    emit(core.complete(
        RegistrationPhase::KeyGeneration,
        Some(serde_json::json!({ "nearPublicKey": near_derived.public_key })),
    ));

    // STEP_3_ACCESS_KEY_ADDITION — sign AddKey and a rollback DeleteKey
    // together so they share a contiguous nonce range, but only ever
    // broadcast the AddKey (mirrors device-linking's Device1 batch).
    emit(core.enter(RegistrationPhase::AccessKeyAddition, None));
    let batch = vec![
        (
            request.near_account_id.clone(),
            vec![ActionParams::AddKey {
                public_key: near_derived.public_key.clone(),
                access_key: signer_worker::actions::AccessKeyParams {
                    nonce: None,
                    permission: signer_worker::actions::AccessKeyPermissionParams::FullAccess,
                },
            }],
        ),
        (
            request.near_account_id.clone(),
            vec![ActionParams::DeleteKey { public_key: near_derived.public_key.clone() }],
        ),
    ];
    let signed = match signer_mgr
        .sign_transactions_with_actions(
            signer_channel,
            &session_id,
            &request.near_account_id,
            request.next_nonce,
            &request.block_hash_b58,
            batch,
            &near_derived.encrypted_data,
            &near_derived.iv,
        )
        .await
    {
        Ok(s) if s.success && s.signed_transactions_borsh_b64u.len() == 2 => s,
        Ok(s) => {
            let e = WalletError::Signer(s.error.unwrap_or_else(|| "access key batch signing failed".to_string()));
            emit(core.fail(e.message()));
            return Err(e);
        }
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    let rollback_delete_key = signed.signed_transactions_borsh_b64u[1].clone();
    let transaction_id = match broadcaster.broadcast(&signed.signed_transactions_borsh_b64u[0]).await {
        Ok(id) => id,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    emit(core.complete(
        RegistrationPhase::AccessKeyAddition,
        Some(serde_json::json!({ "transactionId": transaction_id })),
    ));

    let rollback = |client_records_removed: bool| RollbackState {
        client_records_removed,
        delete_key_broadcast: true,
        on_chain_account_created: true,
    };

    // STEP_4_ACCOUNT_VERIFICATION
    emit(core.enter(RegistrationPhase::AccountVerification, None));
    match account_verifier.verify(&request.near_account_id).await {
        Ok(true) => {}
        Ok(false) => {
            let _ = broadcaster.broadcast(&rollback_delete_key).await;
            let message = "account was not found on chain after AddKey".to_string();
            emit(core.fail(message.clone()));
            return Err(WalletError::Registration { message, rollback: rollback(false) });
        }
        Err(e) => {
            let _ = broadcaster.broadcast(&rollback_delete_key).await;
            emit(core.fail(e.message()));
            return Err(e);
        }
    }
    emit(core.complete(RegistrationPhase::AccountVerification, None));

    // STEP_5_DATABASE_STORAGE
    emit(core.enter(RegistrationPhase::DatabaseStorage, None));
    let record = ClientUserDataRecord {
        near_account_id: request.near_account_id.clone(),
        client_near_public_key: near_derived.public_key.clone(),
        encrypted_vrf_keypair,
        encrypted_private_key_data: near_derived.encrypted_data.clone(),
        encrypted_private_key_chacha20_nonce_b64u: near_derived.iv.clone(),
        wrap_key_salt_b64u: near_derived.wrap_key_salt.clone(),
        device_number: 1,
    };
    if let Err(e) = client_store.store(&record).await {
        let _ = broadcaster.broadcast(&rollback_delete_key).await;
        emit(core.fail(e.message()));
        return Err(e);
    }
    emit(core.complete(RegistrationPhase::DatabaseStorage, None));

    // STEP_6_CONTRACT_REGISTRATION
    emit(core.enter(RegistrationPhase::ContractRegistration, None));
    let contract_verified = match contract_registrar.register(&request.near_account_id, &near_derived.public_key).await {
        Ok(verified) => verified,
        Err(e) => {
            let _ = client_store.rollback(&request.near_account_id).await;
            let _ = broadcaster.broadcast(&rollback_delete_key).await;
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    if !contract_verified {
        let _ = client_store.rollback(&request.near_account_id).await;
        let _ = broadcaster.broadcast(&rollback_delete_key).await;
        let message = "contract registration reported verified=false".to_string();
        emit(core.fail(message.clone()));
        return Err(WalletError::Registration { message, rollback: rollback(true) });
    }
    emit(core.complete(RegistrationPhase::ContractRegistration, None));

    // STEP_7_REGISTRATION_COMPLETE
    let result = RegistrationResult {
        success: true,
        near_account_id: request.near_account_id.clone(),
        client_near_public_key: near_derived.public_key,
        transaction_id,
        vrf_registration: VrfRegistrationSummary { contract_verified },
    };
    emit(core.complete(
        RegistrationPhase::RegistrationComplete,
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
                    VrfRequestType::DeriveVrfFromPrf => {
                        #[derive(serde::Deserialize)]
                        struct Req {
                            #[serde(rename = "prfSecond")]
                            prf_second: String,
                            #[serde(rename = "prfFirst")]
                            prf_first: String,
                            #[serde(rename = "nearAccountId")]
                            near_account_id: String,
                        }
                        let req: Req = message.parse_payload(request_type).unwrap();
                        match mgr.derive_vrf_keypair_from_prf(
                            0.0,
                            vrf_worker::utils::base64_url_decode(&req.prf_second).unwrap(),
                            vrf_worker::utils::base64_url_decode(&req.prf_first).unwrap(),
                            req.near_account_id,
                            None,
                        ) {
                            Ok(data) => VrfWorkerResponse::success(id, serde_json::to_value(data).ok()),
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
                    SignerRequestType::DeriveNearKeypairAndEncrypt => {
                        let req = message.parse_payload(request_type).unwrap();
                        match handlers::derive_near_keypair_and_encrypt(req, &self.wrap_key) {
                            Ok(r) => SignerWorkerResponse::success(id, serde_json::to_value(r).ok()),
                            Err(e) => SignerWorkerResponse::fail(id, &e),
                        }
                    }
                    SignerRequestType::SignTransactionsWithActions => {
                        let req = message.parse_payload(request_type).unwrap();
                        let mut mgr = self.nonce_manager.borrow_mut();
                        match handlers::sign_transactions_with_actions(req, &self.wrap_key, &mut mgr) {
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

    struct FakeWebauthn {
        prf_second_b64u: String,
    }
    impl WebauthnAssertionCollector for FakeWebauthn {
        fn collect<'a>(&'a self, _vrf_challenge: &'a str) -> BoxFuture<'a, Result<WebauthnAssertion, WalletError>> {
            let prf_second_b64u = self.prf_second_b64u.clone();
            Box::pin(async move {
                Ok(WebauthnAssertion {
                    prf_first_b64u: signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                    prf_second_b64u,
                    credential: serde_json::json!({ "id": "cred-1" }),
                })
            })
        }
    }

    struct FakeBroadcaster;
    impl secure_confirm::TransactionBroadcaster for FakeBroadcaster {
        fn broadcast<'a>(&'a self, signed_transaction_borsh_b64u: &'a str) -> BoxFuture<'a, Result<String, WalletError>> {
            let id = format!("broadcast-{}", &signed_transaction_borsh_b64u[..4.min(signed_transaction_borsh_b64u.len())]);
            Box::pin(async move { Ok(id) })
        }
    }

    struct AlwaysVerified;
    impl AccountVerifier for AlwaysVerified {
        fn verify<'a>(&'a self, _near_account_id: &'a str) -> BoxFuture<'a, Result<bool, WalletError>> {
            Box::pin(async { Ok(true) })
        }
    }

    struct RecordingStore {
        stored: RefCell<Vec<String>>,
        rolled_back: RefCell<Vec<String>>,
    }
    impl RecordingStore {
        fn new() -> Self {
            RecordingStore { stored: RefCell::new(Vec::new()), rolled_back: RefCell::new(Vec::new()) }
        }
    }
    impl ClientDataStore for RecordingStore {
        fn store<'a>(&'a self, record: &'a ClientUserDataRecord) -> BoxFuture<'a, Result<(), WalletError>> {
            self.stored.borrow_mut().push(record.near_account_id.clone());
            Box::pin(async { Ok(()) })
        }
        fn rollback<'a>(&'a self, near_account_id: &'a str) -> BoxFuture<'a, Result<(), WalletError>> {
            self.rolled_back.borrow_mut().push(near_account_id.to_string());
            Box::pin(async { Ok(()) })
        }
    }

    struct FixedRegistrar(bool);
    impl ContractRegistrar for FixedRegistrar {
        fn register<'a>(&'a self, _near_account_id: &'a str, _vrf_public_key: &'a str) -> BoxFuture<'a, Result<bool, WalletError>> {
            let verified = self.0;
            Box::pin(async move { Ok(verified) })
        }
    }

    fn new_signer_channel() -> FakeSignerChannel {
        FakeSignerChannel {
            wrap_key: signer_worker::crypto::WrapKey::new(
                signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                signer_worker::crypto::base64_url_encode(b"a-wrap-key-salt!"),
            ),
            nonce_manager: RefCell::new(NonceManager::new()),
        }
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            request_id: "1-0".to_string(),
            near_account_id: "alice.near".to_string(),
            next_nonce: 1,
            block_hash_b58: bs58::encode([7u8; 32]).into_string(),
            now_ms: 1_000,
        }
    }

    #[test]
    fn happy_path_reaches_registration_complete_with_contract_verified() {
        let vrf_channel = FakeVrfChannel { manager: RefCell::new(VRFKeyManager::new(None, None, None, None)) };
        let signer_channel = new_signer_channel();
        let mut vrf_mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));
        let store = RecordingStore::new();

        let mut phases = Vec::new();
        let result = block_on(run_registration(
            request(),
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &FakeWebauthn { prf_second_b64u: signer_worker::crypto::base64_url_encode(b"thirty-two-bytes-of-prf-output!!") },
            &FakeBroadcaster,
            &AlwaysVerified,
            &store,
            &FixedRegistrar(true),
            |p| phases.push(p.phase),
        ))
        .unwrap();

        assert!(result.success);
        assert!(result.vrf_registration.contract_verified);
        assert!(result.client_near_public_key.starts_with("ed25519:"));
        assert_eq!(phases.last(), Some(&RegistrationPhase::RegistrationComplete));
        assert_eq!(store.stored.borrow().as_slice(), ["alice.near"]);
        assert!(store.rolled_back.borrow().is_empty());
    }

    #[test]
    fn contract_verification_false_rolls_back_client_records() {
        let vrf_channel = FakeVrfChannel { manager: RefCell::new(VRFKeyManager::new(None, None, None, None)) };
        let signer_channel = new_signer_channel();
        let mut vrf_mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));
        let store = RecordingStore::new();

        let mut phases = Vec::new();
        let err = block_on(run_registration(
            request(),
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &FakeWebauthn { prf_second_b64u: signer_worker::crypto::base64_url_encode(b"thirty-two-bytes-of-prf-output!!") },
            &FakeBroadcaster,
            &AlwaysVerified,
            &store,
            &FixedRegistrar(false),
            |p| phases.push(p.phase),
        ))
        .unwrap_err();

        match err {
            WalletError::Registration { rollback, .. } => {
                assert!(rollback.client_records_removed);
                assert!(rollback.delete_key_broadcast);
                assert!(rollback.on_chain_account_created);
            }
            other => panic!("expected Registration error, got {other:?}"),
        }
        assert_eq!(phases.last(), Some(&RegistrationPhase::RegistrationError));
        assert_eq!(store.rolled_back.borrow().as_slice(), ["alice.near"]);
    }
}
