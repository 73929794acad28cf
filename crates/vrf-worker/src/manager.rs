//! Host-testable VRF key manager: keypair lifecycle, challenge generation,
//! and signer-session bookkeeping. Everything here is plain Rust; the
//! wasm32-only `lib.rs` wires it to the worker's `postMessage` boundary and
//! to the `MessagePort` that carries `WrapKeySeed` to the signer worker.

use std::collections::HashMap;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use getrandom::getrandom;
use hkdf::Hkdf;
use log::debug;
use rand_core::SeedableRng;
use sha2::{Digest, Sha256};
use vrf_wasm::ecvrf::ECVRFKeyPair;
use vrf_wasm::traits::WasmRngFromSeed;
use vrf_wasm::vrf::{VRFKeyPair, VRFProof};
use zeroize::ZeroizeOnDrop;

use crate::config::*;
use crate::errors::{AesError, HkdfError, SerializationError, VrfResult, VrfWorkerError};
use crate::shamir3pass::Shamir3Pass;
use crate::types::{
    DeriveVrfFromPrfResponse, EncryptedVRFKeypair, GenerateVrfKeypairBootstrapResponse, Session,
    VRFChallengeData, VRFInputData, VRFKeypairData,
};
use crate::utils::{base64_url_decode, base64_url_encode, parse_block_height};

/// Zeroizing wrapper so the VRF secret scalar never lingers in memory after
/// `logout` or process exit.
#[derive(ZeroizeOnDrop)]
pub struct SecureVRFKeyPair {
    keypair: ECVRFKeyPair,
}

impl SecureVRFKeyPair {
    pub fn new(keypair: ECVRFKeyPair) -> Self {
        Self { keypair }
    }

    pub fn inner(&self) -> &ECVRFKeyPair {
        &self.keypair
    }
}

/// The "mint" result for `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER`: the secret
/// material to hand to the signer worker over its dedicated port, plus the
/// salt the caller should persist alongside the encrypted VRF blob.
pub struct MintedSessionKeys {
    pub wrap_key_seed_b64u: String,
    pub wrap_key_salt_b64u: String,
    pub prf_second_b64u: Option<String>,
}

pub struct VRFKeyManager {
    pub vrf_keypair: Option<SecureVRFKeyPair>,
    pub session_active: bool,
    pub session_start_time: f64,
    pub shamir3pass: Shamir3Pass,
    pub relay_server_url: Option<String>,
    pub apply_lock_route: Option<String>,
    pub remove_lock_route: Option<String>,
    sessions: HashMap<String, Session>,
}

impl VRFKeyManager {
    pub fn new(
        shamir_p_b64u: Option<&str>,
        relay_server_url: Option<String>,
        apply_lock_route: Option<String>,
        remove_lock_route: Option<String>,
    ) -> Self {
        let shamir3pass = match shamir_p_b64u {
            Some(p) => Shamir3Pass::new(p).unwrap_or_else(|_| Shamir3Pass::new_default()),
            None => Shamir3Pass::new_default(),
        };

        Self {
            vrf_keypair: None,
            session_active: false,
            session_start_time: 0.0,
            shamir3pass,
            relay_server_url,
            apply_lock_route,
            remove_lock_route,
            sessions: HashMap::new(),
        }
    }

    pub fn shamir3pass(&self) -> &Shamir3Pass {
        &self.shamir3pass
    }

    pub fn get_vrf_secret_key_bytes(&self) -> VrfResult<Vec<u8>> {
        if !self.session_active {
            return Err(VrfWorkerError::NoVrfKeypair);
        }
        let sk = self.vrf_keypair.as_ref().ok_or(VrfWorkerError::NoVrfKeypair)?;
        Ok(sk.inner().secret_key_bytes().to_vec())
    }

    /// Bincode-serializes the in-memory VRF keypair, the plaintext form the
    /// Shamir 3-pass layer encrypts under a relay-held server key.
    pub fn serialize_current_vrf_keypair(&self) -> VrfResult<Vec<u8>> {
        let keypair = self
            .vrf_keypair
            .as_ref()
            .ok_or(VrfWorkerError::NoVrfKeypair)?
            .inner();
        let vrf_public_key_bytes = bincode::serialize(&keypair.pk)?;
        let data = VRFKeypairData {
            keypair_bytes: bincode::serialize(keypair)?,
            public_key_base64: base64_url_encode(&vrf_public_key_bytes),
        };
        Ok(bincode::serialize(&data)?)
    }

    /// Loads a keypair recovered via Shamir 3-pass unlock (no PRF decryption
    /// step involved) and activates the session.
    pub fn load_plaintext_vrf_keypair(&mut self, now_ms: f64, plaintext: &[u8]) -> VrfResult<()> {
        let data: VRFKeypairData = bincode::deserialize(plaintext).map_err(|e| {
            VrfWorkerError::SerializationError(SerializationError::KeypairDataDeserialization(e.to_string()))
        })?;
        let keypair: ECVRFKeyPair = bincode::deserialize(&data.keypair_bytes).map_err(|e| {
            VrfWorkerError::SerializationError(SerializationError::VrfKeypairDeserialization(e.to_string()))
        })?;
        self.vrf_keypair.take();
        self.vrf_keypair = Some(SecureVRFKeyPair::new(keypair));
        self.session_active = true;
        self.session_start_time = now_ms;
        Ok(())
    }

    /// `BOOTSTRAP_GENERATE`: an in-memory VRF keypair with no encryption yet,
    /// optionally paired with a first challenge.
    pub fn generate_vrf_keypair_bootstrap(
        &mut self,
        now_ms: f64,
        vrf_input_data: Option<VRFInputData>,
    ) -> VrfResult<GenerateVrfKeypairBootstrapResponse> {
        debug!("bootstrapping VRF keypair (unencrypted, in memory)");
        self.vrf_keypair.take();

        let vrf_keypair = self.generate_vrf_keypair()?;
        let vrf_public_key_b64 = encode_public_key(&vrf_keypair)?;

        self.vrf_keypair = Some(SecureVRFKeyPair::new(vrf_keypair));
        self.session_active = true;
        self.session_start_time = now_ms;

        let mut result = GenerateVrfKeypairBootstrapResponse {
            vrf_public_key: vrf_public_key_b64,
            vrf_challenge_data: None,
        };

        if let Some(input) = vrf_input_data {
            let vrf_keypair = self.vrf_keypair.as_ref().unwrap().inner();
            result.vrf_challenge_data = Some(self.generate_vrf_challenge_with_keypair(vrf_keypair, input)?);
        }
        Ok(result)
    }

    /// `DERIVE_VRF_FROM_PRF`: deterministic VRF ed25519 keypair via
    /// HKDF(PRF.second, salt=accountId), then encrypted at rest with a key
    /// derived from PRF.first.
    pub fn derive_vrf_keypair_from_prf(
        &mut self,
        now_ms: f64,
        prf_second: Vec<u8>,
        prf_first: Vec<u8>,
        near_account_id: String,
        vrf_input_params: Option<VRFInputData>,
    ) -> VrfResult<DeriveVrfFromPrfResponse> {
        if prf_second.is_empty() {
            return Err(VrfWorkerError::empty_prf_output());
        }
        let vrf_keypair = self.generate_vrf_keypair_from_seed(&prf_second, &near_account_id)?;
        let vrf_public_key_b64 = encode_public_key(&vrf_keypair)?;

        let encrypted_vrf_keypair = self.encrypt_vrf_keypair_data(&vrf_keypair, &prf_first)?;

        let vrf_challenge_data = vrf_input_params
            .map(|input| self.generate_vrf_challenge_with_keypair(&vrf_keypair, input))
            .transpose()?;

        self.vrf_keypair = Some(SecureVRFKeyPair::new(vrf_keypair));
        self.session_active = true;
        self.session_start_time = now_ms;

        Ok(DeriveVrfFromPrfResponse {
            vrf_public_key: vrf_public_key_b64,
            vrf_challenge_data,
            encrypted_vrf_keypair: Some(encrypted_vrf_keypair),
        })
    }

    /// `UNLOCK_VRF`: decrypt the stored VRF secret with the PRF-derived AES
    /// key and hold it in memory.
    pub fn unlock_vrf_keypair(
        &mut self,
        now_ms: f64,
        encrypted_vrf_keypair: EncryptedVRFKeypair,
        prf_first: Vec<u8>,
    ) -> VrfResult<()> {
        self.vrf_keypair.take();
        let decrypted = self.decrypt_vrf_keypair(encrypted_vrf_keypair, prf_first)?;
        self.vrf_keypair = Some(SecureVRFKeyPair::new(decrypted));
        self.session_active = true;
        self.session_start_time = now_ms;
        Ok(())
    }

    pub fn generate_vrf_challenge(&self, input_data: VRFInputData) -> VrfResult<VRFChallengeData> {
        if !self.session_active || self.vrf_keypair.is_none() {
            return Err(VrfWorkerError::VrfNotUnlocked);
        }
        let vrf_keypair = self.vrf_keypair.as_ref().unwrap().inner();
        self.generate_vrf_challenge_with_keypair(vrf_keypair, input_data)
    }

    pub fn generate_vrf_challenge_with_keypair(
        &self,
        vrf_keypair: &ECVRFKeyPair,
        input_data: VRFInputData,
    ) -> VrfResult<VRFChallengeData> {
        let user_id_bytes = input_data.user_id.as_bytes();
        let rp_id_bytes = input_data.rp_id.as_bytes();
        let block_height_num = parse_block_height(&input_data.block_height)?;
        let block_height_bytes = block_height_num.to_le_bytes();
        let block_hash_bytes = bs58::decode(&input_data.block_hash)
            .into_vec()
            .map_err(|e| VrfWorkerError::invalid_format(&format!("invalid blockHash: {}", e)))?;

        let mut vrf_input_bytes = Vec::new();
        vrf_input_bytes.extend_from_slice(VRF_DOMAIN_SEPARATOR);
        vrf_input_bytes.extend_from_slice(user_id_bytes);
        vrf_input_bytes.extend_from_slice(rp_id_bytes);
        vrf_input_bytes.extend_from_slice(&block_height_bytes);
        vrf_input_bytes.extend_from_slice(&block_hash_bytes);

        let vrf_input = Sha256::digest(&vrf_input_bytes).to_vec();
        let proof = vrf_keypair.prove(&vrf_input);
        let vrf_output = proof.to_hash().to_vec();

        let proof_bytes = bincode::serialize(&proof)?;
        let pk_bytes = bincode::serialize(&vrf_keypair.pk)?;

        Ok(VRFChallengeData {
            vrf_input: base64_url_encode(&vrf_input),
            vrf_output: base64_url_encode(&vrf_output),
            vrf_proof: base64_url_encode(&proof_bytes),
            vrf_public_key: base64_url_encode(&pk_bytes),
            user_id: input_data.user_id,
            rp_id: input_data.rp_id,
            block_height: input_data.block_height,
            block_hash: base64_url_encode(&block_hash_bytes),
        })
    }

    pub fn get_vrf_status(&self, now_ms: f64) -> serde_json::Value {
        let session_duration = if self.session_active { now_ms - self.session_start_time } else { 0.0 };
        serde_json::json!({ "active": self.session_active, "sessionDuration": session_duration })
    }

    pub fn logout(&mut self) {
        self.vrf_keypair.take();
        self.session_active = false;
        self.session_start_time = 0.0;
        self.sessions.clear();
    }

    /// `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER`: derives `WrapKeySeed =
    /// HKDF(PRF.first, wrapKeySalt)`, registers a session with the requested
    /// TTL/uses, and returns the secret bundle the caller must hand to the
    /// signer worker over the session's dedicated `MessagePort` (spec §4.6,
    /// §4.2's WrapKeySeed ordering guarantee).
    pub fn mint_session_keys(
        &mut self,
        now_ms: f64,
        session_id: String,
        prf_first: Vec<u8>,
        prf_second: Option<Vec<u8>>,
        wrap_key_salt_b64u: Option<String>,
        ttl_ms: Option<u64>,
        remaining_uses: Option<u32>,
    ) -> VrfResult<MintedSessionKeys> {
        let wrap_key_salt_b64u = match wrap_key_salt_b64u {
            Some(s) => s,
            None => crate::utils::generate_wrap_key_salt_b64u()
                .map_err(|e| VrfWorkerError::invalid_format(&e))?,
        };
        let wrap_key_salt = base64_url_decode(&wrap_key_salt_b64u)
            .map_err(|e| VrfWorkerError::invalid_format(&e))?;

        let hk = Hkdf::<Sha256>::new(Some(&wrap_key_salt), &prf_first);
        let mut wrap_key_seed = [0u8; 32];
        hk.expand(HKDF_WRAP_KEY_SEED_INFO, &mut wrap_key_seed)?;

        let ttl_ms = ttl_ms.unwrap_or(VRF_SESSION_DEFAULT_TTL_MS);
        let remaining_uses = remaining_uses.unwrap_or(VRF_SESSION_DEFAULT_MAX_USES);
        self.sessions.insert(session_id, Session::new(remaining_uses, now_ms, ttl_ms));

        Ok(MintedSessionKeys {
            wrap_key_seed_b64u: base64_url_encode(&wrap_key_seed),
            wrap_key_salt_b64u,
            prf_second_b64u: prf_second.map(|b| base64_url_encode(&b)),
        })
    }

    /// `DISPENSE_SESSION_KEY`: atomically decrements `remainingUses`. Fails
    /// with `session_exhausted` at zero uses or `session_expired` past TTL,
    /// and an expiry check always runs before the use check (spec §8.2).
    pub fn dispense_session_key(&mut self, session_id: &str, now_ms: f64) -> VrfResult<()> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| VrfWorkerError::SessionNotFound(session_id.to_string()))?;

        if session.is_expired(now_ms) {
            self.sessions.remove(session_id);
            return Err(VrfWorkerError::SessionExpired(session_id.to_string()));
        }
        if session.remaining_uses == 0 {
            return Err(VrfWorkerError::SessionExhausted(session_id.to_string()));
        }
        session.remaining_uses -= 1;
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // === private crypto helpers ===

    fn decrypt_vrf_keypair(
        &self,
        encrypted_vrf_keypair: EncryptedVRFKeypair,
        prf_key: Vec<u8>,
    ) -> VrfResult<ECVRFKeyPair> {
        let hk = Hkdf::<Sha256>::new(None, &prf_key);
        let mut chacha20_key = [0u8; CHACHA20_KEY_SIZE];
        hk.expand(HKDF_CHACHA20_KEY_INFO, &mut chacha20_key)?;

        let encrypted_data = base64_url_decode(&encrypted_vrf_keypair.encrypted_vrf_data_b64u)
            .map_err(|e| VrfWorkerError::SerializationError(SerializationError::Base64Error(e)))?;
        let iv_nonce_bytes = base64_url_decode(&encrypted_vrf_keypair.chacha20_nonce_b64u)
            .map_err(|e| VrfWorkerError::SerializationError(SerializationError::Base64Error(e)))?;

        if iv_nonce_bytes.len() != CHACHA20_NONCE_SIZE {
            return Err(VrfWorkerError::InvalidIvLength {
                expected: CHACHA20_NONCE_SIZE,
                actual: iv_nonce_bytes.len(),
            });
        }

        let key = chacha20poly1305::Key::from_slice(&chacha20_key);
        let cipher = ChaCha20Poly1305::new(key);
        let nonce = Nonce::from_slice(&iv_nonce_bytes);

        let decrypted_data = cipher
            .decrypt(nonce, encrypted_data.as_ref())
            .map_err(|e| VrfWorkerError::AesGcmError(AesError::DecryptionFailed(e.to_string())))?;

        let keypair_data: VRFKeypairData = bincode::deserialize(&decrypted_data).map_err(|e| {
            VrfWorkerError::SerializationError(SerializationError::KeypairDataDeserialization(e.to_string()))
        })?;
        let keypair: ECVRFKeyPair = bincode::deserialize(&keypair_data.keypair_bytes).map_err(|e| {
            VrfWorkerError::SerializationError(SerializationError::VrfKeypairDeserialization(e.to_string()))
        })?;
        Ok(keypair)
    }

    fn generate_vrf_keypair(&self) -> VrfResult<ECVRFKeyPair> {
        let mut rng = WasmRngFromSeed::from_entropy();
        Ok(ECVRFKeyPair::generate(&mut rng))
    }

    fn generate_vrf_keypair_from_seed(&self, seed: &[u8], account_id: &str) -> VrfResult<ECVRFKeyPair> {
        let hk = Hkdf::<Sha256>::new(Some(account_id.as_bytes()), seed);
        let mut vrf_seed = [0u8; VRF_SEED_SIZE];
        hk.expand(HKDF_VRF_KEYPAIR_INFO, &mut vrf_seed)
            .map_err(|_| VrfWorkerError::HkdfDerivationFailed(HkdfError::VrfSeedDerivationFailed))?;
        let mut rng = WasmRngFromSeed::from_seed(vrf_seed);
        Ok(ECVRFKeyPair::generate(&mut rng))
    }

    fn encrypt_vrf_keypair_data(
        &self,
        vrf_keypair: &ECVRFKeyPair,
        prf_key: &[u8],
    ) -> VrfResult<EncryptedVRFKeypair> {
        let vrf_keypair_bytes = bincode::serialize(vrf_keypair)?;
        let vrf_public_key_bytes = bincode::serialize(&vrf_keypair.pk)?;
        let keypair_data = VRFKeypairData {
            keypair_bytes: vrf_keypair_bytes,
            public_key_base64: base64_url_encode(&vrf_public_key_bytes),
        };
        let keypair_data_bytes = bincode::serialize(&keypair_data)?;
        self.encrypt_vrf_keypair(&keypair_data_bytes, prf_key)
    }

    fn encrypt_vrf_keypair(&self, data: &[u8], key: &[u8]) -> VrfResult<EncryptedVRFKeypair> {
        let hk = Hkdf::<Sha256>::new(None, key);
        let mut chacha20_key = [0u8; CHACHA20_KEY_SIZE];
        hk.expand(HKDF_CHACHA20_KEY_INFO, &mut chacha20_key)
            .map_err(|_| VrfWorkerError::HkdfDerivationFailed(HkdfError::KeyDerivationFailed))?;

        let key_slice = chacha20poly1305::Key::from_slice(&chacha20_key);
        let cipher = ChaCha20Poly1305::new(key_slice);

        let mut iv_nonce_bytes = [0u8; CHACHA20_NONCE_SIZE];
        getrandom(&mut iv_nonce_bytes)
            .map_err(|e| VrfWorkerError::AesGcmError(AesError::IvGenerationFailed(e.to_string())))?;
        let nonce = Nonce::from_slice(&iv_nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| VrfWorkerError::AesGcmError(AesError::EncryptionFailed(e.to_string())))?;

        Ok(EncryptedVRFKeypair {
            encrypted_vrf_data_b64u: base64_url_encode(&ciphertext),
            chacha20_nonce_b64u: base64_url_encode(&iv_nonce_bytes),
        })
    }
}

fn encode_public_key(vrf_keypair: &ECVRFKeyPair) -> VrfResult<String> {
    let bytes = bincode::serialize(&vrf_keypair.pk)?;
    Ok(base64_url_encode(&bytes))
}
