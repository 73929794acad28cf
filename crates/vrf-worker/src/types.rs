//! Wire and in-memory types for VRF keypairs, challenges, and session
//! bookkeeping.

use serde::{Deserialize, Serialize};

/// Bincode-serialized `ECVRFKeyPair` plus its public key for convenience.
/// Never leaves the worker except wrapped in [`EncryptedVRFKeypair`].
#[derive(Serialize, Deserialize)]
pub struct VRFKeypairData {
    pub keypair_bytes: Vec<u8>,
    pub public_key_base64: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedVRFKeypair {
    pub encrypted_vrf_data_b64u: String,
    pub chacha20_nonce_b64u: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VRFInputData {
    pub user_id: String,
    pub rp_id: String,
    pub block_height: String,
    pub block_hash: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VRFChallengeData {
    pub vrf_input: String,
    pub vrf_output: String,
    pub vrf_proof: String,
    pub vrf_public_key: String,
    pub user_id: String,
    pub rp_id: String,
    pub block_height: String,
    pub block_hash: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVrfKeypairBootstrapResponse {
    pub vrf_public_key: String,
    pub vrf_challenge_data: Option<VRFChallengeData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveVrfFromPrfResponse {
    pub vrf_public_key: String,
    pub vrf_challenge_data: Option<VRFChallengeData>,
    pub encrypted_vrf_keypair: Option<EncryptedVRFKeypair>,
}

/// One outstanding signer session minted by `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER`
/// (spec §4.6). Enforced VRF-side; the signer worker itself is one-shot per
/// message and trusts the VRF worker's accounting.
#[derive(Clone, Debug)]
pub struct Session {
    pub remaining_uses: u32,
    pub expires_at_ms: f64,
}

impl Session {
    pub fn new(max_uses: u32, now_ms: f64, ttl_ms: u64) -> Self {
        Session {
            remaining_uses: max_uses,
            expires_at_ms: now_ms + ttl_ms as f64,
        }
    }

    pub fn is_expired(&self, now_ms: f64) -> bool {
        now_ms >= self.expires_at_ms
    }
}
