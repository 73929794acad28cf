//! §4.8 SecureConfirmFlow: drives one confirmation-bearing signing request
//! through `STEP_1_PREPARATION` .. `STEP_9_ACTION_COMPLETE`, wiring
//! [`vrf_worker_manager::VrfWorkerManager`] and
//! [`signer_worker_manager::SignerWorkerManager`] together the way
//! `signer_worker_manager` itself describes in its module doc: "Acquires the
//! active sessionId ... Instructs the VRF worker to mint session keys ...
//! Sends a typed worker request" (spec §4.7 steps 1-3).
//!
//! Every collaborator that would require a real browser API (rendering the
//! confirmation UI, calling a contract view method, collecting a WebAuthn
//! assertion, broadcasting the signed transaction) is abstracted behind a
//! trait here, the same way `SignerWorkerChannel`/`VrfWorkerChannel` abstract
//! the `postMessage` round trip — so the whole state machine is exercised in
//! host tests with fakes, and only the real implementations of these traits
//! need the wasm32 target.

use std::future::Future;
use std::pin::Pin;

use wallet_core::error::WalletError;
use wallet_core::phases::ActionPhase;

use signer_worker_manager::{ActionParams, SignerWorkerChannel, SignerWorkerManager};
use vrf_worker::types::VRFInputData;
use vrf_worker_manager::request_id::Clock;
use vrf_worker_manager::{VrfWorkerChannel, VrfWorkerManager};

use crate::behavior::{resolve_behavior, ConfirmationBehavior, Platform};
use crate::core::{ActionConfirmCore, ActionProgress};
use crate::intent::{compute_intent_digest, TransactionInput};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A WebAuthn assertion's usable outputs. `credential` is the serialized
/// assertion forwarded to the contract/relay for on-chain verification;
/// `prf_first_b64u`/`prf_second_b64u` never leave this struct except into the
/// VRF/Signer worker calls that need them (spec §8 property 6).
pub struct WebauthnAssertion {
    pub prf_first_b64u: String,
    pub prf_second_b64u: String,
    pub credential: serde_json::Value,
}

/// Spec §4.8 step 3: an optional contract pre-check RPC.
pub trait ContractPreCheck {
    fn verify<'a>(&'a self, transactions: &'a [TransactionInput]) -> BoxFuture<'a, Result<bool, WalletError>>;
}

/// Spec §4.8 step 2: awaits the confirmation UI's resolution per
/// [`ConfirmationBehavior`]. Returns `Err(WalletError::NotAllowed)` if the
/// user declines or cancels.
pub trait ConfirmationUi {
    fn resolve<'a>(&'a self, behavior: ConfirmationBehavior) -> BoxFuture<'a, Result<(), WalletError>>;
}

/// Spec §4.8 step 4: collects a WebAuthn assertion for the given VRF
/// challenge, in-iframe if possible or via the parent-domain bridge
/// (§4.1, §8 scenario 6) — both are the same trait from this flow's view.
pub trait WebauthnAssertionCollector {
    fn collect<'a>(&'a self, vrf_challenge: &'a str) -> BoxFuture<'a, Result<WebauthnAssertion, WalletError>>;
}

/// Spec §4.8 step 7: submits a Borsh-encoded signed transaction to the NEAR
/// client and returns the broadcast transaction id.
pub trait TransactionBroadcaster {
    fn broadcast<'a>(&'a self, signed_transaction_borsh_b64u: &'a str) -> BoxFuture<'a, Result<String, WalletError>>;
}

pub struct ActionConfirmRequest {
    pub request_id: String,
    pub sticky: bool,
    pub near_account_id: String,
    pub transactions: Vec<TransactionInput>,
    pub next_nonce: u64,
    pub block_hash_b58: String,
    pub encrypted_private_key_data: String,
    pub encrypted_private_key_chacha20_nonce_b64u: String,
    pub behavior: ConfirmationBehavior,
    pub platform: Platform,
    pub run_contract_precheck: bool,
}

#[derive(Debug)]
pub struct ActionConfirmResult {
    pub intent_digest: String,
    pub transaction_hashes: Vec<String>,
    pub broadcast_ids: Vec<String>,
}

/// Runs the full flow, invoking `emit` for every `ActionProgress` in order
/// (spec §8 property 1: strictly FIFO, strictly before the terminal result).
#[allow(clippy::too_many_arguments)]
pub async fn run_action_confirmation<CV: Clock, CS: Clock>(
    request: ActionConfirmRequest,
    vrf_mgr: &mut VrfWorkerManager<CV>,
    vrf_channel: &impl VrfWorkerChannel,
    signer_mgr: &mut SignerWorkerManager<CS>,
    signer_channel: &impl SignerWorkerChannel,
    confirmation_ui: &impl ConfirmationUi,
    contract: &impl ContractPreCheck,
    webauthn: &impl WebauthnAssertionCollector,
    broadcaster: &impl TransactionBroadcaster,
    now_ms: u64,
    mut emit: impl FnMut(ActionProgress),
) -> Result<ActionConfirmResult, WalletError> {
    let mut core = ActionConfirmCore::new(request.request_id.clone(), request.sticky);

    // STEP_1_PREPARATION
    emit(core.enter(ActionPhase::Preparation, None));
    let intent_digest = compute_intent_digest(
        &request.near_account_id,
        &request.transactions,
        request.next_nonce,
        &request.block_hash_b58,
    );
    emit(core.complete(ActionPhase::Preparation, Some(serde_json::json!({ "intentDigest": intent_digest }))));

    // STEP_2_USER_CONFIRMATION
    let resolved_behavior = resolve_behavior(request.behavior, request.platform);
    emit(core.enter(ActionPhase::UserConfirmation, None));
    if let Err(e) = confirmation_ui.resolve(resolved_behavior).await {
        emit(core.fail(e.message()));
        return Err(e);
    }
    emit(core.complete(ActionPhase::UserConfirmation, None));

    // STEP_3_CONTRACT_VERIFICATION
    if request.run_contract_precheck {
        emit(core.enter(ActionPhase::ContractVerification, None));
        match contract.verify(&request.transactions).await {
            Ok(true) => emit(core.complete(ActionPhase::ContractVerification, None)),
            Ok(false) => {
                let err = WalletError::Contract("contract pre-check verification failed".to_string());
                emit(core.fail(err.message()));
                return Err(err);
            }
            Err(e) => {
                emit(core.fail(e.message()));
                return Err(e);
            }
        }
    }

    // STEP_4_WEBAUTHN_AUTHENTICATION
    emit(core.enter(ActionPhase::WebauthnAuthentication, None));
    let vrf_input_data = VRFInputData {
        user_id: request.near_account_id.clone(),
        rp_id: String::new(),
        block_height: String::new(),
        block_hash: request.block_hash_b58.clone(),
    };
    let bootstrap = match vrf_mgr.bootstrap_generate(vrf_channel, Some(vrf_input_data)).await {
        Ok(b) => b,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    let challenge = bootstrap
        .vrf_challenge_data
        .as_ref()
        .map(|c| c.vrf_output.clone())
        .unwrap_or_default();
    let assertion = match webauthn.collect(&challenge).await {
        Ok(a) => a,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    emit(core.complete(ActionPhase::WebauthnAuthentication, None));

    // STEP_5_AUTHENTICATION_COMPLETE
    emit(core.enter(ActionPhase::AuthenticationComplete, None));
    let session_id = match vrf_mgr
        .ensure_session(
            vrf_channel,
            &request.near_account_id,
            assertion.prf_first_b64u.clone(),
            Some(assertion.prf_second_b64u.clone()),
            None,
            now_ms,
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
    emit(core.complete(
        ActionPhase::AuthenticationComplete,
        Some(serde_json::json!({ "credential": assertion.credential })),
    ));

    // STEP_6_TRANSACTION_SIGNING_PROGRESS / STEP_7_TRANSACTION_SIGNING_COMPLETE
    emit(core.enter(ActionPhase::TransactionSigningProgress, None));
    let tx_signing_requests: Vec<(String, Vec<ActionParams>)> = request
        .transactions
        .iter()
        .map(|t| (t.receiver_id.clone(), t.actions.clone()))
        .collect();
    let signed = match signer_mgr
        .sign_transactions_with_actions(
            signer_channel,
            &session_id,
            &request.near_account_id,
            request.next_nonce,
            &request.block_hash_b58,
            tx_signing_requests,
            &request.encrypted_private_key_data,
            &request.encrypted_private_key_chacha20_nonce_b64u,
        )
        .await
    {
        Ok(r) => r,
        Err(e) => {
            emit(core.fail(e.message()));
            return Err(e);
        }
    };
    if !signed.success {
        let err = WalletError::Signer(signed.error.unwrap_or_else(|| "signing failed".to_string()));
        emit(core.fail(err.message()));
        return Err(err);
    }
    emit(core.complete(
        ActionPhase::TransactionSigningComplete,
        Some(serde_json::json!({ "transactionHashes": signed.transaction_hashes })),
    ));

    // STEP_8_BROADCASTING
    emit(core.enter(ActionPhase::Broadcasting, None));
    let mut broadcast_ids = Vec::with_capacity(signed.signed_transactions_borsh_b64u.len());
    for tx in &signed.signed_transactions_borsh_b64u {
        match broadcaster.broadcast(tx).await {
            Ok(id) => broadcast_ids.push(id),
            Err(e) => {
                emit(core.fail(e.message()));
                return Err(e);
            }
        }
    }
    emit(core.complete(ActionPhase::Broadcasting, None));

    // STEP_9_ACTION_COMPLETE
    let result = ActionConfirmResult {
        intent_digest,
        transaction_hashes: signed.transaction_hashes,
        broadcast_ids,
    };
    emit(core.complete(
        ActionPhase::ActionComplete,
        Some(serde_json::json!({ "broadcastIds": result.broadcast_ids })),
    ));
    core.finish();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

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
                    VrfRequestType::BootstrapGenerate => match mgr.generate_vrf_keypair_bootstrap(0.0, None) {
                        Ok(data) => VrfWorkerResponse::success(id, serde_json::to_value(data).ok()),
                        Err(e) => VrfWorkerResponse::fail(id, &e),
                    },
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

    struct AlwaysResolve;
    impl ConfirmationUi for AlwaysResolve {
        fn resolve<'a>(&'a self, _behavior: ConfirmationBehavior) -> BoxFuture<'a, Result<(), WalletError>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct AlwaysDecline;
    impl ConfirmationUi for AlwaysDecline {
        fn resolve<'a>(&'a self, _behavior: ConfirmationBehavior) -> BoxFuture<'a, Result<(), WalletError>> {
            Box::pin(async { Err(WalletError::NotAllowed("user declined".to_string())) })
        }
    }

    struct NoPreCheck;
    impl ContractPreCheck for NoPreCheck {
        fn verify<'a>(&'a self, _transactions: &'a [TransactionInput]) -> BoxFuture<'a, Result<bool, WalletError>> {
            Box::pin(async { Ok(true) })
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
    impl TransactionBroadcaster for FakeBroadcaster {
        fn broadcast<'a>(&'a self, signed_transaction_borsh_b64u: &'a str) -> BoxFuture<'a, Result<String, WalletError>> {
            let id = format!("broadcast-{}", &signed_transaction_borsh_b64u[..4.min(signed_transaction_borsh_b64u.len())]);
            Box::pin(async move { Ok(id) })
        }
    }

    fn derived_private_key(account_id: &str) -> (String, String, String) {
        let prf_second_b64u = signer_worker::crypto::base64_url_encode(b"thirty-two-bytes-of-prf-output!!");
        let signer_channel = FakeSignerChannel {
            wrap_key: signer_worker::crypto::WrapKey::new(
                signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                signer_worker::crypto::base64_url_encode(b"a-wrap-key-salt!"),
            ),
            nonce_manager: RefCell::new(NonceManager::new()),
        };
        let req = handlers::DeriveNearKeypairAndEncryptRequest {
            near_account_id: account_id.to_string(),
            prf_second_b64u: prf_second_b64u.clone(),
        };
        let derived = handlers::derive_near_keypair_and_encrypt(req, &signer_channel.wrap_key).unwrap();
        (prf_second_b64u, derived.encrypted_data, derived.iv)
    }

    #[test]
    fn happy_path_reaches_action_complete_with_one_broadcast_id_per_transaction() {
        let (prf_second_b64u, encrypted_data, iv) = derived_private_key("alice.near");

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

        let request = ActionConfirmRequest {
            request_id: "1-0".to_string(),
            sticky: false,
            near_account_id: "alice.near".to_string(),
            transactions: vec![TransactionInput {
                receiver_id: "bob.near".to_string(),
                actions: vec![ActionParams::Transfer { deposit: "1".to_string() }],
            }],
            next_nonce: 1,
            block_hash_b58: bs58::encode([7u8; 32]).into_string(),
            encrypted_private_key_data: encrypted_data,
            encrypted_private_key_chacha20_nonce_b64u: iv,
            behavior: ConfirmationBehavior::RequireClick,
            platform: Platform::default(),
            run_contract_precheck: true,
        };

        let mut phases = Vec::new();
        let result = block_on(run_action_confirmation(
            request,
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &AlwaysResolve,
            &NoPreCheck,
            &FakeWebauthn { prf_second_b64u },
            &FakeBroadcaster,
            0,
            |p| phases.push(p.phase),
        ))
        .unwrap();

        assert_eq!(result.transaction_hashes.len(), 1);
        assert_eq!(result.broadcast_ids.len(), 1);
        assert_eq!(phases.last(), Some(&ActionPhase::ActionComplete));
        assert!(phases.iter().any(|p| *p == ActionPhase::Preparation));
        assert!(phases.iter().any(|p| *p == ActionPhase::Broadcasting));
    }

    #[test]
    fn declining_confirmation_fails_before_any_webauthn_or_signing_call() {
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

        let request = ActionConfirmRequest {
            request_id: "1-0".to_string(),
            sticky: false,
            near_account_id: "alice.near".to_string(),
            transactions: vec![TransactionInput {
                receiver_id: "bob.near".to_string(),
                actions: vec![ActionParams::Transfer { deposit: "1".to_string() }],
            }],
            next_nonce: 1,
            block_hash_b58: bs58::encode([7u8; 32]).into_string(),
            encrypted_private_key_data: "ignored".to_string(),
            encrypted_private_key_chacha20_nonce_b64u: "ignored".to_string(),
            behavior: ConfirmationBehavior::RequireClick,
            platform: Platform::default(),
            run_contract_precheck: false,
        };

        let mut phases = Vec::new();
        let err = block_on(run_action_confirmation(
            request,
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &AlwaysDecline,
            &NoPreCheck,
            &FakeWebauthn { prf_second_b64u: String::new() },
            &FakeBroadcaster,
            0,
            |p| phases.push(p.phase),
        ))
        .unwrap_err();

        assert!(matches!(err, WalletError::NotAllowed(_)));
        assert_eq!(phases.last(), Some(&ActionPhase::ActionError));
        assert!(!phases.iter().any(|p| *p == ActionPhase::WebauthnAuthentication));
    }
}
