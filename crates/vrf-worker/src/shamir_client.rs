//! `SHAMIR_3PASS_{ENCRYPT,DECRYPT}`: client side of the Shamir 3-pass
//! round trip with a remote relay (spec §4.6). The relay only ever sees
//! locked KEK values, never the plaintext VRF keypair or the client's own
//! lock exponents.
//!
//! The actual POST is behind the [`ShamirRelay`] trait so the protocol
//! arithmetic is host-testable with a fake relay; `lib.rs` wires the wasm32
//! `fetch`-backed implementation.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::errors::{VrfResult, VrfWorkerError};
use crate::manager::VRFKeyManager;
use crate::shamir3pass::{decode_biguint_b64u, encode_biguint_b64u};
use crate::utils::{base64_url_decode, base64_url_encode};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShamirEncryptedVrfKeypair {
    pub ciphertext_b64u: String,
    pub kek_s_b64u: String,
    pub key_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApplyServerLockRequest {
    pub kek_c_b64u: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApplyServerLockResponse {
    pub kek_cs_b64u: String,
    #[serde(default)]
    pub key_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RemoveServerLockRequest {
    pub kek_cs_b64u: String,
    pub key_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RemoveServerLockResponse {
    pub kek_c_b64u: String,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + 'a>>;

/// Abstracts the relay HTTP round trip so the lock/unlock math can be
/// exercised without a network stack in host tests.
pub trait ShamirRelay {
    fn apply_server_lock<'a>(
        &'a self,
        url: &'a str,
        req: ApplyServerLockRequest,
    ) -> BoxFuture<'a, ApplyServerLockResponse>;

    fn remove_server_lock<'a>(
        &'a self,
        url: &'a str,
        req: RemoveServerLockRequest,
    ) -> BoxFuture<'a, RemoveServerLockResponse>;
}

/// `SHAMIR_3PASS_ENCRYPT`: locks the current in-memory VRF keypair under a
/// fresh random KEK, has the relay add its server-side exponent, then
/// removes the client's own lock so only the server-locked KEK (`kek_s`)
/// and the ciphertext are returned — the relay never learns `kek`.
pub async fn shamir3pass_client_encrypt<R: ShamirRelay>(
    manager: &VRFKeyManager,
    relay: &R,
    relay_url: &str,
    apply_lock_route: &str,
) -> VrfResult<ShamirEncryptedVrfKeypair> {
    let plaintext = manager.serialize_current_vrf_keypair()?;
    let sp = manager.shamir3pass();

    let (ciphertext, kek) = sp
        .encrypt_with_random_kek_key(&plaintext)
        .map_err(|e| VrfWorkerError::invalid_format(&e.to_string()))?;
    let client_keys = sp
        .generate_lock_keys()
        .map_err(|e| VrfWorkerError::invalid_format(&e.to_string()))?;

    let kek_c = sp.add_lock(&kek, &client_keys.e);
    let endpoint = format!("{}{}", relay_url, apply_lock_route);
    let resp = relay
        .apply_server_lock(&endpoint, ApplyServerLockRequest { kek_c_b64u: encode_biguint_b64u(&kek_c) })
        .await
        .map_err(VrfWorkerError::invalid_format)?;

    let kek_cs = decode_biguint_b64u(&resp.kek_cs_b64u).map_err(|e| VrfWorkerError::invalid_format(&e))?;
    let kek_s = sp.remove_lock(&kek_cs, &client_keys.d);

    Ok(ShamirEncryptedVrfKeypair {
        ciphertext_b64u: base64_url_encode(&ciphertext),
        kek_s_b64u: encode_biguint_b64u(&kek_s),
        key_id: resp.key_id.unwrap_or_default(),
    })
}

/// `SHAMIR_3PASS_DECRYPT`: reverses the encrypt flow — the client re-locks
/// `kek_s` with a fresh temporary exponent, the relay removes its own lock,
/// and the client removes its temporary lock to recover the original KEK
/// and decrypt the blob.
pub async fn shamir3pass_client_decrypt<R: ShamirRelay>(
    manager: &mut VRFKeyManager,
    relay: &R,
    relay_url: &str,
    remove_lock_route: &str,
    now_ms: f64,
    blob: ShamirEncryptedVrfKeypair,
) -> VrfResult<()> {
    let sp = manager.shamir3pass().clone();

    let kek_s = decode_biguint_b64u(&blob.kek_s_b64u).map_err(|e| VrfWorkerError::invalid_format(&e))?;
    let temp_keys = sp
        .generate_lock_keys()
        .map_err(|e| VrfWorkerError::invalid_format(&e.to_string()))?;

    let kek_st = sp.add_lock(&kek_s, &temp_keys.e);
    let endpoint = format!("{}{}", relay_url, remove_lock_route);
    let resp = relay
        .remove_server_lock(
            &endpoint,
            RemoveServerLockRequest { kek_cs_b64u: encode_biguint_b64u(&kek_st), key_id: blob.key_id.clone() },
        )
        .await
        .map_err(VrfWorkerError::invalid_format)?;

    let kek_t = decode_biguint_b64u(&resp.kek_c_b64u).map_err(|e| VrfWorkerError::invalid_format(&e))?;
    let kek = sp.remove_lock(&kek_t, &temp_keys.d);

    let ciphertext = base64_url_decode(&blob.ciphertext_b64u).map_err(VrfWorkerError::invalid_format)?;
    let plaintext = sp
        .decrypt_with_key(&ciphertext, &kek)
        .map_err(|e| VrfWorkerError::invalid_format(&e.to_string()))?;

    manager.load_plaintext_vrf_keypair(now_ms, &plaintext)
}
