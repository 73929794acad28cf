//! `WrapKeySeed` → KEK derivation, ChaCha20-Poly1305 envelope encryption for
//! the NEAR private key, and PRF.second → ed25519 NEAR keypair derivation.

use base64ct::{Base64UrlUnpadded, Encoding};
use bs58;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use ed25519_dalek::SigningKey;
use getrandom::getrandom;
use hkdf::Hkdf;
use sha2::Sha256;

use crate::config::{CHACHA20_NONCE_SIZE, NEAR_KEK_INFO, NEAR_KEY_DERIVATION_INFO};
use crate::errors::{ChaCha20Error, KdfError, SignerWorkerError};

pub fn base64_url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

pub fn base64_url_decode(s: &str) -> Result<Vec<u8>, SignerWorkerError> {
    Base64UrlUnpadded::decode_vec(s)
        .map_err(|e| SignerWorkerError::invalid_format(format!("base64 decode error: {}", e)))
}

/// `WrapKeySeed` + `wrapKeySalt`, delivered to this worker over the
/// per-session `MessagePort` from the VRF worker. Never logged in full.
#[derive(Clone)]
pub struct WrapKey {
    wrap_key_seed_b64u: String,
    wrap_key_salt_b64u: String,
}

impl WrapKey {
    pub fn new(wrap_key_seed_b64u: String, wrap_key_salt_b64u: String) -> Self {
        WrapKey {
            wrap_key_seed_b64u,
            wrap_key_salt_b64u,
        }
    }

    pub fn salt_b64u(&self) -> &str {
        &self.wrap_key_salt_b64u
    }

    /// `KEK = HKDF-SHA256(salt = wrapKeySalt, ikm = WrapKeySeed, info = NEAR_KEK_INFO)`.
    pub fn derive_kek(&self) -> Result<[u8; 32], SignerWorkerError> {
        let seed = base64_url_decode(&self.wrap_key_seed_b64u)?;
        let salt = base64_url_decode(&self.wrap_key_salt_b64u)?;
        let hk = Hkdf::<Sha256>::new(Some(&salt), &seed);
        let mut kek = [0u8; 32];
        hk.expand(NEAR_KEK_INFO, &mut kek)
            .map_err(|_| SignerWorkerError::KdfError(KdfError::KeyDerivationFailed))?;
        Ok(kek)
    }
}

/// Result of [`encrypt_data_chacha20`]: ciphertext, nonce, and (optionally)
/// the salt used for KEK derivation, all base64url-encoded.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedDataChaCha20Response {
    pub encrypted_near_key_data_b64u: String,
    pub chacha20_nonce_b64u: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap_key_salt_b64u: Option<String>,
}

impl EncryptedDataChaCha20Response {
    pub fn with_wrap_key_salt(mut self, salt: &[u8]) -> Self {
        self.wrap_key_salt_b64u = Some(base64_url_encode(salt));
        self
    }
}

pub fn encrypt_data_chacha20(
    plaintext: &str,
    kek: &[u8; 32],
) -> Result<EncryptedDataChaCha20Response, SignerWorkerError> {
    let cipher = ChaCha20Poly1305::new_from_slice(kek)
        .map_err(|e| SignerWorkerError::ChaCha20Error(ChaCha20Error::EncryptionFailed(e.to_string())))?;

    let mut nonce_bytes = [0u8; CHACHA20_NONCE_SIZE];
    getrandom(&mut nonce_bytes)
        .map_err(|e| SignerWorkerError::ChaCha20Error(ChaCha20Error::EncryptionFailed(e.to_string())))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| SignerWorkerError::ChaCha20Error(ChaCha20Error::EncryptionFailed(e.to_string())))?;

    Ok(EncryptedDataChaCha20Response {
        encrypted_near_key_data_b64u: base64_url_encode(&ciphertext),
        chacha20_nonce_b64u: base64_url_encode(&nonce_bytes),
        wrap_key_salt_b64u: None,
    })
}

pub fn decrypt_data_chacha20(
    ciphertext_b64u: &str,
    nonce_b64u: &str,
    kek: &[u8; 32],
) -> Result<String, SignerWorkerError> {
    let ciphertext = base64_url_decode(ciphertext_b64u)?;
    let nonce_bytes = base64_url_decode(nonce_b64u)?;
    if nonce_bytes.len() != CHACHA20_NONCE_SIZE {
        return Err(SignerWorkerError::InvalidNonceLength {
            expected: CHACHA20_NONCE_SIZE,
            actual: nonce_bytes.len(),
        });
    }

    let cipher = ChaCha20Poly1305::new_from_slice(kek)
        .map_err(|e| SignerWorkerError::ChaCha20Error(ChaCha20Error::DecryptionFailed(e.to_string())))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| SignerWorkerError::ChaCha20Error(ChaCha20Error::DecryptionFailed(e.to_string())))?;

    String::from_utf8(plaintext)
        .map_err(|e| SignerWorkerError::ChaCha20Error(ChaCha20Error::DecryptionFailed(e.to_string())))
}

/// Derives the NEAR ed25519 keypair deterministically from `PRF.second` and
/// the account id: `seed = HKDF-SHA256(salt = "near-key-derivation:{account_id}",
/// ikm = prf_second, info = NEAR_KEY_DERIVATION_INFO)`, 32 bytes. The NEAR
/// private key is the 64-byte `seed || public_key`, bs58-encoded with an
/// `ed25519:` prefix.
///
/// Returns `(near_private_key, near_public_key)`, both in NEAR wire format.
pub fn derive_ed25519_key_from_prf_output(
    prf_second_b64u: &str,
    account_id: &str,
) -> Result<(String, String), SignerWorkerError> {
    if prf_second_b64u.is_empty() {
        return Err(SignerWorkerError::missing("PRF.second cannot be empty"));
    }

    let ikm = base64_url_decode(prf_second_b64u)?;
    let salt = format!("near-key-derivation:{}", account_id);
    let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), &ikm);

    let mut seed = [0u8; 32];
    hk.expand(NEAR_KEY_DERIVATION_INFO, &mut seed)
        .map_err(|_| SignerWorkerError::KdfError(KdfError::NearKeySeedDerivationFailed))?;

    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();

    let mut full_private_key = Vec::with_capacity(64);
    full_private_key.extend_from_slice(&seed);
    full_private_key.extend_from_slice(verifying_key.as_bytes());

    let private_key_near = format!("ed25519:{}", bs58::encode(&full_private_key).into_string());
    let public_key_near = format!(
        "ed25519:{}",
        bs58::encode(verifying_key.as_bytes()).into_string()
    );

    Ok((private_key_near, public_key_near))
}

/// Parses a NEAR-format private key (`ed25519:<base58 64 bytes>`) into a
/// [`SigningKey`] plus its 32-byte public key.
pub fn signing_key_from_near_private_key(
    near_private_key: &str,
) -> Result<(SigningKey, [u8; 32]), SignerWorkerError> {
    let stripped = near_private_key
        .strip_prefix("ed25519:")
        .ok_or_else(|| SignerWorkerError::invalid_format("private key must be in ed25519: format"))?;

    let decoded = bs58::decode(stripped)
        .into_vec()
        .map_err(|e| SignerWorkerError::invalid_format(format!("invalid private key base58: {}", e)))?;

    if decoded.len() != 64 {
        return Err(SignerWorkerError::InvalidKeyLength {
            expected: 64,
            actual: decoded.len(),
        });
    }

    let seed: [u8; 32] = decoded[0..32].try_into().unwrap();
    let public_key: [u8; 32] = decoded[32..64].try_into().unwrap();
    Ok((SigningKey::from_bytes(&seed), public_key))
}
