//! Temporary-keypair generation and scrubbing for the Device2 bootstrap path
//! (spec §4.9 "generates ... a random temporary keypair"; "temporary key is
//! scrubbed from memory immediately").

use ed25519_dalek::SigningKey;
use getrandom::getrandom;
use zeroize::Zeroize;

/// A freshly generated ed25519 keypair in NEAR wire format, zeroized on drop.
pub struct TempKeypair {
    private_key_near: String,
    public_key_near: String,
}

impl TempKeypair {
    /// Generates 32 random bytes as an ed25519 seed (Device2 does not yet
    /// know the account id, so this cannot be PRF-derived).
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        getrandom(&mut seed).expect("system RNG must be available");
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();

        let mut full_private_key = Vec::with_capacity(64);
        full_private_key.extend_from_slice(&seed);
        full_private_key.extend_from_slice(verifying_key.as_bytes());

        let private_key_near = format!("ed25519:{}", bs58::encode(&full_private_key).into_string());
        let public_key_near = format!("ed25519:{}", bs58::encode(verifying_key.as_bytes()).into_string());
        seed.zeroize();

        TempKeypair { private_key_near, public_key_near }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key_near
    }

    pub fn private_key(&self) -> &str {
        &self.private_key_near
    }
}

impl Drop for TempKeypair {
    fn drop(&mut self) {
        self.private_key_near.zeroize();
    }
}
