//! Device1 (the existing, already-registered device): scans the QR Device2
//! displays, authorizes with a TouchID-backed VRF challenge, then submits the
//! `AddKey` + mapping batch that lets Device2 complete linking (spec §4.9).

use serde_json::json;
use signer_worker_manager::{ActionParams, BoxFuture, SignerWorkerChannel, SignerWorkerManager};
use vrf_worker_manager::request_id::Clock;
use vrf_worker_manager::{VrfWorkerChannel, VrfWorkerManager};
use wallet_core::error::WalletError;
use wallet_core::phases::DeviceLinkingPhase;

use crate::core::{DeviceLinkingCore, DeviceLinkingProgress};
use crate::qr::QrPayload;
use secure_confirm::{ConfirmationUi, ConfirmationBehavior, TransactionBroadcaster, WebauthnAssertionCollector};

/// Next device-number assignment: the contract's current device count + 1
/// (spec §4.9 "monotonically increasing based on the on-chain counter + 1").
pub trait DeviceCounter {
    fn next_device_number(&self, account_id: &str) -> BoxFuture<'_, Result<u32, WalletError>>;
}

pub struct Device1LinkingRequest {
    pub request_id: String,
    pub sticky: bool,
    pub account_id: String,
    pub scanned_qr: String,
    pub mapping_contract_id: String,
    pub next_nonce: u64,
    pub block_hash_b58: String,
    pub encrypted_private_key_data: String,
    pub encrypted_private_key_chacha20_nonce_b64u: String,
    pub now_ms: u64,
}

pub struct Device1LinkingResult {
    pub device2_public_key: String,
    pub device_number: u32,
    pub add_key_transaction_hash: String,
    pub mapping_transaction_hash: String,
    /// Signed but never broadcast unless the operator later chooses to
    /// revoke Device2's access (spec §4.9 "pre-signed DeleteKey retained for
    /// rollback").
    pub rollback_delete_key_signed_borsh_b64u: String,
}

/// Drives the whole Device1 side of linking: QR validation, VRF-backed
/// authorization, device-number assignment, and the three-transaction batch.
#[allow(clippy::too_many_arguments)]
pub async fn run_device1_linking<CV: Clock, CS: Clock>(
    request: Device1LinkingRequest,
    vrf_mgr: &mut VrfWorkerManager<CV>,
    vrf_channel: &impl VrfWorkerChannel,
    signer_mgr: &mut SignerWorkerManager<CS>,
    signer_channel: &impl SignerWorkerChannel,
    confirmation_ui: &impl ConfirmationUi,
    webauthn: &impl WebauthnAssertionCollector,
    device_counter: &impl DeviceCounter,
    broadcaster: &impl TransactionBroadcaster,
    mut emit: impl FnMut(DeviceLinkingProgress),
) -> Result<Device1LinkingResult, WalletError> {
    let mut core = DeviceLinkingCore::new(request.sticky);

    emit(core.enter(DeviceLinkingPhase::Scanning, None));
    let qr = match QrPayload::decode_and_validate(&request.scanned_qr, request.now_ms) {
        Ok(qr) => qr,
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };

    emit(core.enter(DeviceLinkingPhase::Authorization, None));
    if let Err(e) = confirmation_ui.resolve(ConfirmationBehavior::RequireClick).await {
        emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
        return Err(e);
    }

    let bootstrap = match vrf_mgr
        .bootstrap_generate(
            vrf_channel,
            Some(vrf_worker::types::VRFInputData {
                user_id: request.account_id.clone(),
                rp_id: String::new(),
                block_height: String::new(),
                block_hash: request.block_hash_b58.clone(),
            }),
        )
        .await
    {
        Ok(b) => b,
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };
    let vrf_output = bootstrap
        .vrf_challenge_data
        .as_ref()
        .map(|c| c.vrf_output.clone())
        .unwrap_or_default();

    let assertion = match webauthn.collect(&vrf_output).await {
        Ok(a) => a,
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };

    let device_number = match device_counter.next_device_number(&request.account_id).await {
        Ok(n) => n,
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };

    emit(core.enter(
        DeviceLinkingPhase::Registration,
        Some(format!("assigning device {}", device_number)),
    ));

    let session_id = match vrf_mgr
        .ensure_session(
            vrf_channel,
            &request.account_id,
            assertion.prf_first_b64u.clone(),
            Some(assertion.prf_second_b64u.clone()),
            None,
            request.now_ms,
            None,
            None,
        )
        .await
    {
        Ok(s) => s,
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };
    let batch = vec![
        (
            request.account_id.clone(),
            vec![ActionParams::AddKey {
                public_key: qr.device2_public_key.clone(),
                access_key: signer_worker::actions::AccessKeyParams {
                    nonce: None,
                    permission: signer_worker::actions::AccessKeyPermissionParams::FullAccess,
                },
            }],
        ),
        (
            request.mapping_contract_id.clone(),
            vec![ActionParams::FunctionCall {
                method_name: "store_device_linking_mapping".to_string(),
                args: json!({
                    "device_public_key": qr.device2_public_key,
                    "account_id": request.account_id,
                    "device_number": device_number,
                }),
                gas: "30000000000000".to_string(),
                deposit: "0".to_string(),
            }],
        ),
        (
            request.account_id.clone(),
            vec![ActionParams::DeleteKey { public_key: qr.device2_public_key.clone() }],
        ),
    ];

    let signed = signer_mgr
        .sign_transactions_with_actions(
            signer_channel,
            &session_id,
            &request.account_id,
            request.next_nonce,
            &request.block_hash_b58,
            batch,
            &request.encrypted_private_key_data,
            &request.encrypted_private_key_chacha20_nonce_b64u,
        )
        .await;
    let signed = match signed {
        Ok(s) if s.success => s,
        Ok(s) => {
            let e = WalletError::Signer(s.error.unwrap_or_else(|| "device1 batch signing failed".to_string()));
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };

    if signed.signed_transactions_borsh_b64u.len() != 3 {
        let e = WalletError::Signer("expected exactly three signed transactions".to_string());
        emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
        return Err(e);
    }

    let add_key_id = match broadcaster.broadcast(&signed.signed_transactions_borsh_b64u[0]).await {
        Ok(id) => id,
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };
    let mapping_id = match broadcaster.broadcast(&signed.signed_transactions_borsh_b64u[1]).await {
        Ok(id) => id,
        Err(e) => {
            emit(core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message()));
            return Err(e);
        }
    };
    let rollback_delete_key = signed.signed_transactions_borsh_b64u[2].clone();

    emit(core.enter(DeviceLinkingPhase::LinkingComplete, None));
    emit(core.finish(None));

    Ok(Device1LinkingResult {
        device2_public_key: qr.device2_public_key,
        device_number,
        add_key_transaction_hash: add_key_id,
        mapping_transaction_hash: mapping_id,
        rollback_delete_key_signed_borsh_b64u: rollback_delete_key,
    })
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
        fn resolve<'a>(&'a self, _behavior: ConfirmationBehavior) -> secure_confirm::flow::BoxFuture<'a, Result<(), WalletError>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct FakeWebauthn {
        prf_second_b64u: String,
    }
    impl WebauthnAssertionCollector for FakeWebauthn {
        fn collect<'a>(
            &'a self,
            _vrf_challenge: &'a str,
        ) -> secure_confirm::flow::BoxFuture<'a, Result<secure_confirm::WebauthnAssertion, WalletError>> {
            let prf_second_b64u = self.prf_second_b64u.clone();
            Box::pin(async move {
                Ok(secure_confirm::WebauthnAssertion {
                    prf_first_b64u: signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                    prf_second_b64u,
                    credential: serde_json::json!({ "id": "cred-1" }),
                })
            })
        }
    }

    struct FakeBroadcaster;
    impl TransactionBroadcaster for FakeBroadcaster {
        fn broadcast<'a>(&'a self, signed_transaction_borsh_b64u: &'a str) -> secure_confirm::flow::BoxFuture<'a, Result<String, WalletError>> {
            let id = format!("broadcast-{}", &signed_transaction_borsh_b64u[..4.min(signed_transaction_borsh_b64u.len())]);
            Box::pin(async move { Ok(id) })
        }
    }

    struct FixedDeviceCounter(u32);
    impl DeviceCounter for FixedDeviceCounter {
        fn next_device_number(&self, _account_id: &str) -> BoxFuture<'_, Result<u32, WalletError>> {
            let n = self.0;
            Box::pin(async move { Ok(n) })
        }
    }

    fn derived_private_key(account_id: &str) -> (String, String, String) {
        let prf_second_b64u = signer_worker::crypto::base64_url_encode(b"thirty-two-bytes-of-prf-output!!");
        let wrap_key = signer_worker::crypto::WrapKey::new(
            signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
            signer_worker::crypto::base64_url_encode(b"a-wrap-key-salt!"),
        );
        let req = handlers::DeriveNearKeypairAndEncryptRequest {
            near_account_id: account_id.to_string(),
            prf_second_b64u: prf_second_b64u.clone(),
        };
        let derived = handlers::derive_near_keypair_and_encrypt(req, &wrap_key).unwrap();
        (prf_second_b64u, derived.encrypted_data, derived.iv)
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

    #[test]
    fn happy_path_broadcasts_addkey_and_mapping_but_not_the_rollback_delete_key() {
        let (prf_second_b64u, encrypted_data, iv) = derived_private_key("alice.near");

        let vrf_channel = FakeVrfChannel { manager: RefCell::new(VRFKeyManager::new(None, None, None, None)) };
        let signer_channel = new_signer_channel();
        let mut vrf_mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));

        let qr = QrPayload::new("ed25519:device2pub".to_string(), Some("alice.near".to_string()), 1_000);

        let request = Device1LinkingRequest {
            request_id: "1-0".to_string(),
            sticky: false,
            account_id: "alice.near".to_string(),
            scanned_qr: qr.encode(),
            mapping_contract_id: "mapping.near".to_string(),
            next_nonce: 1,
            block_hash_b58: bs58::encode([7u8; 32]).into_string(),
            encrypted_private_key_data: encrypted_data,
            encrypted_private_key_chacha20_nonce_b64u: iv,
            now_ms: 1_500,
        };

        let mut phases = Vec::new();
        let result = block_on(run_device1_linking(
            request,
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &AlwaysResolve,
            &FakeWebauthn { prf_second_b64u },
            &FixedDeviceCounter(3),
            &FakeBroadcaster,
            |p| phases.push(p.phase),
        ))
        .unwrap();

        assert_eq!(result.device_number, 3);
        assert_eq!(result.device2_public_key, "ed25519:device2pub");
        assert!(result.add_key_transaction_hash.starts_with("broadcast-"));
        assert!(result.mapping_transaction_hash.starts_with("broadcast-"));
        assert!(!result.rollback_delete_key_signed_borsh_b64u.is_empty());
        assert_eq!(phases.last(), Some(&DeviceLinkingPhase::AutoLogin));
    }

    #[test]
    fn expired_qr_fails_before_any_authorization() {
        let vrf_channel = FakeVrfChannel { manager: RefCell::new(VRFKeyManager::new(None, None, None, None)) };
        let signer_channel = new_signer_channel();
        let mut vrf_mgr = VrfWorkerManager::new(FakeClock(Cell::new(0)));
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));

        let qr = QrPayload::new("ed25519:device2pub".to_string(), Some("alice.near".to_string()), 0);

        let request = Device1LinkingRequest {
            request_id: "1-0".to_string(),
            sticky: false,
            account_id: "alice.near".to_string(),
            scanned_qr: qr.encode(),
            mapping_contract_id: "mapping.near".to_string(),
            next_nonce: 1,
            block_hash_b58: bs58::encode([7u8; 32]).into_string(),
            encrypted_private_key_data: "ignored".to_string(),
            encrypted_private_key_chacha20_nonce_b64u: "ignored".to_string(),
            now_ms: wallet_core::config::QR_CODE_MAX_AGE_MS + 1,
        };

        let mut phases = Vec::new();
        let err = block_on(run_device1_linking(
            request,
            &mut vrf_mgr,
            &vrf_channel,
            &mut signer_mgr,
            &signer_channel,
            &AlwaysResolve,
            &FakeWebauthn { prf_second_b64u: String::new() },
            &FixedDeviceCounter(1),
            &FakeBroadcaster,
            |p| phases.push(p.phase),
        ))
        .unwrap_err();

        assert!(matches!(
            err,
            WalletError::DeviceLinking(wallet_core::error::DeviceLinkingErrorCode::SessionExpired, _)
        ));
        assert_eq!(phases.last(), Some(&DeviceLinkingPhase::DeviceLinkingError));
        assert!(!phases.iter().any(|p| *p == DeviceLinkingPhase::Authorization));
    }
}
