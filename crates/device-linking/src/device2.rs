//! Device2 (the new device): generates a keypair, encodes the linking QR,
//! polls the contract for the `(publicKey → accountId, deviceNumber)`
//! mapping Device1 writes, then swaps its temporary key for the permanent
//! PRF-derived one and registers (spec §4.9).

use log::warn;
use serde_json::Value;
use signer_worker::crypto::derive_ed25519_key_from_prf_output;
use signer_worker_manager::{ActionParams, BoxFuture, SignerWorkerChannel, SignerWorkerManager};
use vrf_worker_manager::request_id::Clock;
use wallet_core::config::SESSION_EXPIRATION_MS;
use wallet_core::error::{DeviceLinkingErrorCode, WalletError};
use wallet_core::phases::DeviceLinkingPhase;
use zeroize::Zeroize;

use crate::core::{DeviceLinkingCore, DeviceLinkingProgress};
use crate::keypair::TempKeypair;
use crate::qr::QrPayload;
use crate::retry::{BoundedRetry, RetryDecision};
use secure_confirm::TransactionBroadcaster;

/// The mapping the contract exposes once Device1 calls
/// `store_device_linking_mapping`.
#[derive(Clone, Debug)]
pub struct MappingDetected {
    pub account_id: String,
    pub device_number: u32,
}

pub trait MappingPoller {
    fn poll(&self, device_public_key: &str) -> BoxFuture<'_, Result<Option<MappingDetected>, WalletError>>;
}

/// One `POLLING_INTERVAL_MS` tick. The real implementation yields to a
/// `setTimeout`; fakes in tests resolve immediately.
pub trait PollDelay {
    fn delay(&self) -> BoxFuture<'_, ()>;
}

/// Best-effort teardown run on every exit path (spec §4.9 "all paths run a
/// cleanup step that removes authenticators, VRF credentials, and any temp
/// keys for the account").
pub trait DeviceLinkingCleanup {
    fn cleanup(&self, account_id: Option<&str>) -> BoxFuture<'_, Result<(), WalletError>>;
}

/// Either a PRF-derived keypair (account id known up front) or a random
/// temporary one (spec §4.9). The private key material is zeroized on drop.
pub struct Device2Keys {
    public_key: String,
    private_key: String,
    pub is_temporary: bool,
    _temp: Option<TempKeypair>,
}

impl Device2Keys {
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl Drop for Device2Keys {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Resolves the Device2 bootstrap keypair: PRF-derived when both an account
/// id hint and a PRF.second are available, otherwise a fresh random key that
/// gets swapped out once the permanent account id is known.
pub fn resolve_device2_keys(account_id_hint: Option<&str>, prf_second_b64u: Option<&str>) -> Result<Device2Keys, WalletError> {
    match (account_id_hint, prf_second_b64u) {
        (Some(account_id), Some(prf_second)) => {
            let (private_key, public_key) = derive_ed25519_key_from_prf_output(prf_second, account_id)
                .map_err(|e| WalletError::Signer(e.to_string()))?;
            Ok(Device2Keys { public_key, private_key, is_temporary: false, _temp: None })
        }
        _ => {
            let temp = TempKeypair::generate();
            Ok(Device2Keys {
                public_key: temp.public_key().to_string(),
                private_key: temp.private_key().to_string(),
                is_temporary: true,
                _temp: Some(temp),
            })
        }
    }
}

pub struct Device2LinkingRequest {
    pub sticky: bool,
    pub account_id_hint: Option<String>,
    pub prf_second_b64u: Option<String>,
    pub contract_id: String,
    pub vrf_session_id: String,
    pub registration_contract_args: Value,
    pub started_at_ms: u64,
    pub max_polls: u32,
}

pub struct Device2LinkingResult {
    pub account_id: String,
    pub device_number: u32,
    pub public_key: String,
    pub registration_signed_transaction_borsh_b64u: String,
}

/// Drives the whole Device2 side: QR generation, bounded polling, the
/// temporary-to-permanent key swap, and retried registration.
#[allow(clippy::too_many_arguments)]
pub async fn run_device2_linking<C: Clock>(
    request: Device2LinkingRequest,
    keys: Device2Keys,
    signer_mgr: &mut SignerWorkerManager<C>,
    signer_channel: &impl SignerWorkerChannel,
    mapping_poller: &impl MappingPoller,
    delay: &impl PollDelay,
    broadcaster: &impl TransactionBroadcaster,
    cleanup: &impl DeviceLinkingCleanup,
    block_hash_b58: &str,
    base_nonce: u64,
    mut emit: impl FnMut(DeviceLinkingProgress),
) -> Result<Device2LinkingResult, WalletError> {
    let mut core = DeviceLinkingCore::new(request.sticky);
    let result = run_device2_linking_inner(&request, &keys, signer_mgr, signer_channel, mapping_poller, delay, broadcaster, block_hash_b58, base_nonce, &mut core, &mut emit)
        .await;

    let account_id_for_cleanup = match &result {
        Ok(r) => Some(r.account_id.clone()),
        Err(_) => request.account_id_hint.clone(),
    };
    if let Err(e) = cleanup.cleanup(account_id_for_cleanup.as_deref()).await {
        warn!("device-linking cleanup failed: {}", e.message());
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn run_device2_linking_inner<C: Clock>(
    request: &Device2LinkingRequest,
    keys: &Device2Keys,
    signer_mgr: &mut SignerWorkerManager<C>,
    signer_channel: &impl SignerWorkerChannel,
    mapping_poller: &impl MappingPoller,
    delay: &impl PollDelay,
    broadcaster: &impl TransactionBroadcaster,
    block_hash_b58: &str,
    base_nonce: u64,
    core: &mut DeviceLinkingCore,
    emit: &mut impl FnMut(DeviceLinkingProgress),
) -> Result<Device2LinkingResult, WalletError> {
    let qr = QrPayload::new(keys.public_key().to_string(), request.account_id_hint.clone(), request.started_at_ms);
    emit(core.enter(DeviceLinkingPhase::QrCodeGenerated, Some(qr.encode())));

    emit(core.enter(DeviceLinkingPhase::Polling, None));
    let mapping = poll_until_detected(request, keys, mapping_poller, delay).await;
    let mapping = match mapping {
        Ok(m) => m,
        Err(e) => {
            let progress = core.fail(DeviceLinkingPhase::DeviceLinkingError, e.message());
            emit(progress);
            return Err(e);
        }
    };
    emit(core.enter(
        DeviceLinkingPhase::AddKeyDetected,
        Some(format!("mapped to {} as device {}", mapping.account_id, mapping.device_number)),
    ));

    emit(core.enter(DeviceLinkingPhase::Registration, None));
    let registration = register_with_retries(
        request,
        keys,
        &mapping,
        signer_mgr,
        signer_channel,
        broadcaster,
        block_hash_b58,
        base_nonce,
        core,
        emit,
    )
    .await;
    let signed_transaction_borsh_b64u = match registration {
        Ok(signed) => signed,
        Err(e) => {
            let progress = core.fail(DeviceLinkingPhase::RegistrationError, e.message());
            emit(progress);
            return Err(e);
        }
    };

    emit(core.enter(DeviceLinkingPhase::LinkingComplete, None));
    emit(core.finish(None));

    Ok(Device2LinkingResult {
        account_id: mapping.account_id,
        device_number: mapping.device_number,
        public_key: keys.public_key().to_string(),
        registration_signed_transaction_borsh_b64u: signed_transaction_borsh_b64u,
    })
}

async fn poll_until_detected(
    request: &Device2LinkingRequest,
    keys: &Device2Keys,
    mapping_poller: &impl MappingPoller,
    delay: &impl PollDelay,
) -> Result<MappingDetected, WalletError> {
    for _ in 0..request.max_polls {
        match mapping_poller.poll(keys.public_key()).await {
            Ok(Some(mapping)) => return Ok(mapping),
            Ok(None) => delay.delay().await,
            Err(e) => {
                if e.message().to_lowercase().contains("account not found") {
                    return Err(e);
                }
                delay.delay().await;
            }
        }
    }
    Err(WalletError::DeviceLinking(
        DeviceLinkingErrorCode::SessionExpired,
        format!("no mapping detected within {} ms", SESSION_EXPIRATION_MS),
    ))
}

/// Atomically swaps `[AddKey(newKey), DeleteKey(tempKey)]` signed with the
/// temporary key (skipped when the bootstrap keypair was already permanent),
/// then registers with the permanent key, retrying per [`BoundedRetry`].
#[allow(clippy::too_many_arguments)]
async fn register_with_retries<C: Clock>(
    request: &Device2LinkingRequest,
    keys: &Device2Keys,
    mapping: &MappingDetected,
    signer_mgr: &mut SignerWorkerManager<C>,
    signer_channel: &impl SignerWorkerChannel,
    broadcaster: &impl TransactionBroadcaster,
    block_hash_b58: &str,
    base_nonce: u64,
    core: &mut DeviceLinkingCore,
    emit: &mut impl FnMut(DeviceLinkingProgress),
) -> Result<String, WalletError> {
    if keys.is_temporary {
        swap_temporary_key(request, keys, mapping, signer_mgr, signer_channel, broadcaster, block_hash_b58, base_nonce)
            .await?;
    }

    let mut retry = BoundedRetry::default();
    loop {
        let attempt = try_register(request, mapping, signer_mgr, signer_channel, block_hash_b58, base_nonce).await;
        match attempt {
            Ok(signed) => return Ok(signed),
            Err(e) => match retry.record_failure(&e) {
                RetryDecision::Retry { attempt, .. } => {
                    emit(core.enter(
                        DeviceLinkingPhase::AddKeyDetected,
                        Some(format!("registration retry {}", attempt)),
                    ));
                }
                RetryDecision::Exhausted | RetryDecision::Terminal => return Err(e),
            },
        }
    }
}

async fn swap_temporary_key<C: Clock>(
    request: &Device2LinkingRequest,
    keys: &Device2Keys,
    mapping: &MappingDetected,
    signer_mgr: &mut SignerWorkerManager<C>,
    signer_channel: &impl SignerWorkerChannel,
    broadcaster: &impl TransactionBroadcaster,
    block_hash_b58: &str,
    base_nonce: u64,
) -> Result<(), WalletError> {
    let (mut permanent_private_key, permanent_public_key) =
        derive_ed25519_key_from_prf_output(request.prf_second_b64u.as_deref().unwrap_or_default(), &mapping.account_id)
            .map_err(|e| WalletError::Signer(e.to_string()))?;

    let swap_actions = vec![
        ActionParams::AddKey {
            public_key: permanent_public_key,
            access_key: signer_worker::actions::AccessKeyParams {
                nonce: None,
                permission: signer_worker::actions::AccessKeyPermissionParams::FullAccess,
            },
        },
        ActionParams::DeleteKey { public_key: keys.public_key().to_string() },
    ];
    let signed = signer_mgr
        .sign_transaction_with_keypair(
            signer_channel,
            keys.private_key(),
            &mapping.account_id,
            &mapping.account_id,
            base_nonce,
            block_hash_b58,
            swap_actions,
        )
        .await?;
    if !signed.success {
        return Err(WalletError::Signer(
            signed.error.unwrap_or_else(|| "key swap signing failed".to_string()),
        ));
    }
    for tx in signed.signed_transactions_borsh_b64u {
        broadcaster.broadcast(&tx).await?;
    }
    permanent_private_key.zeroize();
    Ok(())
}

async fn try_register<C: Clock>(
    request: &Device2LinkingRequest,
    mapping: &MappingDetected,
    signer_mgr: &mut SignerWorkerManager<C>,
    signer_channel: &impl SignerWorkerChannel,
    block_hash_b58: &str,
    base_nonce: u64,
) -> Result<String, WalletError> {
    let result = signer_mgr
        .register_device2_with_derived_key(
            signer_channel,
            &request.vrf_session_id,
            &mapping.account_id,
            request.prf_second_b64u.as_deref().unwrap_or_default(),
            &request.contract_id,
            base_nonce + 1,
            block_hash_b58,
            request.registration_contract_args.clone(),
        )
        .await?;
    Ok(result.signed_transaction_borsh_b64u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::future::Future;

    use signer_worker::handlers;
    use signer_worker::{NonceManager, SignerRequestType, SignerWorkerMessage, SignerWorkerResponse};

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
                    SignerRequestType::SignTransactionWithKeyPair => {
                        let req = message.parse_payload(request_type).unwrap();
                        match handlers::sign_transaction_with_keypair(req) {
                            Ok(r) => SignerWorkerResponse::success(id, serde_json::to_value(r).ok()),
                            Err(e) => SignerWorkerResponse::fail(id, &e),
                        }
                    }
                    SignerRequestType::RegisterDevice2WithDerivedKey => {
                        let req = message.parse_payload(request_type).unwrap();
                        match handlers::register_device2_with_derived_key(req, &self.wrap_key) {
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

    fn new_signer_channel() -> FakeSignerChannel {
        FakeSignerChannel {
            wrap_key: signer_worker::crypto::WrapKey::new(
                signer_worker::crypto::base64_url_encode(b"thirty-two-byte-wrap-key-seed!!!"),
                signer_worker::crypto::base64_url_encode(b"a-wrap-key-salt!"),
            ),
            nonce_manager: RefCell::new(NonceManager::new()),
        }
    }

    struct ImmediateDelay;
    impl PollDelay for ImmediateDelay {
        fn delay(&self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    struct DetectAfter {
        calls_before_hit: Cell<u32>,
        account_id: String,
        device_number: u32,
    }
    impl MappingPoller for DetectAfter {
        fn poll(&self, _device_public_key: &str) -> BoxFuture<'_, Result<Option<MappingDetected>, WalletError>> {
            let remaining = self.calls_before_hit.get();
            Box::pin(async move {
                if remaining == 0 {
                    Ok(Some(MappingDetected { account_id: self.account_id.clone(), device_number: self.device_number }))
                } else {
                    self.calls_before_hit.set(remaining - 1);
                    Ok(None)
                }
            })
        }
    }

    struct NeverDetects;
    impl MappingPoller for NeverDetects {
        fn poll(&self, _device_public_key: &str) -> BoxFuture<'_, Result<Option<MappingDetected>, WalletError>> {
            Box::pin(async { Ok(None) })
        }
    }

    struct FakeBroadcaster;
    impl TransactionBroadcaster for FakeBroadcaster {
        fn broadcast<'a>(&'a self, signed_transaction_borsh_b64u: &'a str) -> secure_confirm::flow::BoxFuture<'a, Result<String, WalletError>> {
            let id = format!("broadcast-{}", &signed_transaction_borsh_b64u[..4.min(signed_transaction_borsh_b64u.len())]);
            Box::pin(async move { Ok(id) })
        }
    }

    struct NoopCleanup;
    impl DeviceLinkingCleanup for NoopCleanup {
        fn cleanup(&self, _account_id: Option<&str>) -> BoxFuture<'_, Result<(), WalletError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn prf_second() -> String {
        signer_worker::crypto::base64_url_encode(b"thirty-two-bytes-of-prf-output!!")
    }

    #[test]
    fn unknown_account_starts_with_a_temporary_keypair() {
        let keys = resolve_device2_keys(None, None).unwrap();
        assert!(keys.is_temporary);
        assert!(keys.public_key().starts_with("ed25519:"));
    }

    #[test]
    fn known_account_and_prf_derives_a_permanent_keypair() {
        let keys = resolve_device2_keys(Some("alice.near"), Some(&prf_second())).unwrap();
        assert!(!keys.is_temporary);
    }

    #[test]
    fn temporary_key_path_swaps_then_registers_after_mapping_detected() {
        let keys = resolve_device2_keys(None, None).unwrap();
        let signer_channel = new_signer_channel();
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));

        let request = Device2LinkingRequest {
            sticky: false,
            account_id_hint: None,
            prf_second_b64u: Some(prf_second()),
            contract_id: "contract.near".to_string(),
            vrf_session_id: "session-1".to_string(),
            registration_contract_args: serde_json::json!({}),
            started_at_ms: 0,
            max_polls: 5,
        };
        let poller = DetectAfter { calls_before_hit: Cell::new(2), account_id: "alice.near".to_string(), device_number: 2 };

        let mut phases = Vec::new();
        let result = block_on(run_device2_linking(
            request,
            keys,
            &mut signer_mgr,
            &signer_channel,
            &poller,
            &ImmediateDelay,
            &FakeBroadcaster,
            &NoopCleanup,
            &bs58::encode([7u8; 32]).into_string(),
            1,
            |p| phases.push(p.phase),
        ))
        .unwrap();

        assert_eq!(result.account_id, "alice.near");
        assert_eq!(result.device_number, 2);
        assert!(!result.registration_signed_transaction_borsh_b64u.is_empty());
        assert_eq!(phases.last(), Some(&DeviceLinkingPhase::AutoLogin));
        assert!(phases.iter().any(|p| *p == DeviceLinkingPhase::QrCodeGenerated));
    }

    #[test]
    fn polling_exhaustion_settles_into_device_linking_error() {
        let keys = resolve_device2_keys(None, None).unwrap();
        let signer_channel = new_signer_channel();
        let mut signer_mgr = SignerWorkerManager::new(FakeClock(Cell::new(0)));

        let request = Device2LinkingRequest {
            sticky: false,
            account_id_hint: None,
            prf_second_b64u: Some(prf_second()),
            contract_id: "contract.near".to_string(),
            vrf_session_id: "session-1".to_string(),
            registration_contract_args: serde_json::json!({}),
            started_at_ms: 0,
            max_polls: 3,
        };

        let mut phases = Vec::new();
        let err = block_on(run_device2_linking(
            request,
            keys,
            &mut signer_mgr,
            &signer_channel,
            &NeverDetects,
            &ImmediateDelay,
            &FakeBroadcaster,
            &NoopCleanup,
            &bs58::encode([7u8; 32]).into_string(),
            1,
            |p| phases.push(p.phase),
        ))
        .unwrap_err();

        assert!(matches!(
            err,
            WalletError::DeviceLinking(DeviceLinkingErrorCode::SessionExpired, _)
        ));
        assert_eq!(phases.last(), Some(&DeviceLinkingPhase::DeviceLinkingError));
    }
}
