//! Shamir 3-pass protocol for commutative encryption: client and a remote
//! relay cooperatively re-key a blob without either side ever seeing the
//! other's lock exponent or the plaintext in the clear at the same time.
//!
//! Registration: client encrypts under a random KEK, adds a client lock,
//! sends to relay; relay adds its lock and returns; client removes its lock,
//! storing the result. Unlock reverses the order so only the client ever
//! reconstructs the original KEK.

use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, Key},
    ChaCha20Poly1305, KeyInit,
};
use getrandom::getrandom;
use hkdf::Hkdf;
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use sha2::Sha256;

use crate::config::{
    DEFAULT_SHAMIR_P_B64U, SHAMIR_MIN_PRIME_BITS, SHAMIR_RANDOM_BYTES_OVERHEAD,
    SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS,
};

#[derive(Debug)]
pub enum Shamir3PassError {
    InvalidPrime(String),
    PrimeTooSmall { bits: usize, min_bits: usize },
    ModularInverseNotFound,
    RandomGenerationFailed,
    EncryptionFailed(String),
    DecryptionFailed(String),
}

impl std::fmt::Display for Shamir3PassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug)]
pub struct ClientLockKeys {
    pub e: BigUint,
    pub d: BigUint,
}

#[derive(Clone, Debug)]
pub struct Shamir3Pass {
    p: BigUint,
    p_minus_1: BigUint,
    min_k: BigUint,
    max_k: BigUint,
}

impl Shamir3Pass {
    pub fn new(p_b64u: &str) -> Result<Self, Shamir3PassError> {
        let p = decode_biguint_b64u(p_b64u)
            .map_err(|_| Shamir3PassError::InvalidPrime("invalid base64url encoding".to_string()))?;
        Self::new_with_biguint(p)
    }

    pub fn new_default() -> Self {
        let p = decode_biguint_b64u(DEFAULT_SHAMIR_P_B64U).expect("default prime is valid");
        Self::new_with_biguint_unchecked(p)
    }

    fn new_with_biguint(p: BigUint) -> Result<Self, Shamir3PassError> {
        let bits = p.bits();
        if bits < SHAMIR_MIN_PRIME_BITS as u64 {
            return Err(Shamir3PassError::PrimeTooSmall {
                bits: bits as usize,
                min_bits: SHAMIR_MIN_PRIME_BITS,
            });
        }
        Ok(Self::new_with_biguint_unchecked(p))
    }

    fn new_with_biguint_unchecked(p: BigUint) -> Self {
        let one = BigUint::one();
        let two = &one + &one;
        let p_minus_1 = &p - &one;
        let p_minus_2 = &p - &two;
        let min_k = if p.bits() >= 1024 {
            BigUint::from(1u128 << 64)
        } else {
            BigUint::from(1u64 << 32)
        };
        Shamir3Pass {
            p,
            p_minus_1,
            min_k,
            max_k: p_minus_2,
        }
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn p_b64u(&self) -> String {
        encode_biguint_b64u(&self.p)
    }

    pub fn modexp(&self, base: &BigUint, exp: &BigUint) -> BigUint {
        if self.p.is_zero() {
            return BigUint::zero();
        }
        base.modpow(exp, &self.p)
    }

    pub fn modinv(&self, a: &BigUint) -> Option<BigUint> {
        let a_bigint = BigInt::from_biguint(Sign::Plus, a.clone());
        let m_bigint = BigInt::from_biguint(Sign::Plus, self.p_minus_1.clone());
        let (gcd, x, _) = extended_gcd(a_bigint, m_bigint.clone());
        if gcd != BigInt::one() {
            return None;
        }
        let mut x_mod = x % &m_bigint;
        if x_mod.sign() == Sign::Minus {
            x_mod += &m_bigint;
        }
        Some(x_mod.to_biguint().unwrap())
    }

    pub fn random_k(&self) -> Result<BigUint, Shamir3PassError> {
        let range = &self.max_k - &self.min_k;
        let bytes_needed = ((range.bits() + 7) / 8 + SHAMIR_RANDOM_BYTES_OVERHEAD as u64) as usize;

        for _ in 0..SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS {
            let mut buf = vec![0u8; bytes_needed];
            getrandom(&mut buf).map_err(|_| Shamir3PassError::RandomGenerationFailed)?;
            let candidate = BigUint::from_bytes_be(&buf) % &range;
            let k = &self.min_k + candidate;
            if k.gcd(&self.p_minus_1) == BigUint::one() {
                return Ok(k);
            }
        }
        Err(Shamir3PassError::RandomGenerationFailed)
    }

    pub fn generate_lock_keys(&self) -> Result<ClientLockKeys, Shamir3PassError> {
        let e = self.random_k()?;
        let d = self.modinv(&e).ok_or(Shamir3PassError::ModularInverseNotFound)?;
        Ok(ClientLockKeys { e, d })
    }

    pub fn encrypt_with_random_kek_key(
        &self,
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, BigUint), Shamir3PassError> {
        let kek = self.random_k()?;
        let ciphertext = self.encrypt_with_kek(&kek, plaintext)?;
        Ok((ciphertext, kek))
    }

    pub fn decrypt_with_key(
        &self,
        ciphertext: &[u8],
        kek: &BigUint,
    ) -> Result<Vec<u8>, Shamir3PassError> {
        self.decrypt_with_kek(kek, ciphertext)
    }

    pub fn add_lock(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        self.modexp(base, exponent)
    }

    pub fn remove_lock(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        self.modexp(base, exponent)
    }

    fn derive_aead_key(&self, kek_bytes: &[u8]) -> Result<[u8; 32], Shamir3PassError> {
        let hkdf = Hkdf::<Sha256>::new(None, kek_bytes);
        let mut key = [0u8; 32];
        hkdf.expand(crate::config::SHAMIR_AEAD_HKDF_INFO, &mut key)
            .map_err(|_| Shamir3PassError::EncryptionFailed("HKDF expansion failed".to_string()))?;
        Ok(key)
    }

    fn encrypt_with_kek(&self, kek: &BigUint, plaintext: &[u8]) -> Result<Vec<u8>, Shamir3PassError> {
        let kek_bytes = kek.to_bytes_be();
        let key_bytes = self.derive_aead_key(&kek_bytes)?;
        let cipher = ChaCha20Poly1305::new(Key::<ChaCha20Poly1305>::from_slice(&key_bytes));

        let mut nonce = [0u8; 12];
        getrandom(&mut nonce).map_err(|_| Shamir3PassError::RandomGenerationFailed)?;
        let nonce_ga = GenericArray::from_slice(&nonce);

        let ciphertext = cipher
            .encrypt(nonce_ga, plaintext)
            .map_err(|e| Shamir3PassError::EncryptionFailed(e.to_string()))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt_with_kek(&self, kek: &BigUint, ciphertext: &[u8]) -> Result<Vec<u8>, Shamir3PassError> {
        if ciphertext.len() < 12 {
            return Err(Shamir3PassError::DecryptionFailed("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ct) = ciphertext.split_at(12);
        let kek_bytes = kek.to_bytes_be();
        let key_bytes = self.derive_aead_key(&kek_bytes)?;
        let cipher = ChaCha20Poly1305::new(Key::<ChaCha20Poly1305>::from_slice(&key_bytes));
        let nonce_ga = GenericArray::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce_ga, ct)
            .map_err(|e| Shamir3PassError::DecryptionFailed(e.to_string()))
    }
}

fn extended_gcd(a: BigInt, b: BigInt) -> (BigInt, BigInt, BigInt) {
    if b.is_zero() {
        return (a, BigInt::one(), BigInt::zero());
    }
    let (gcd, x1, y1) = extended_gcd(b.clone(), &a % &b);
    let x = y1.clone();
    let y = x1 - (&a / &b) * y1;
    (gcd, x, y)
}

pub fn encode_biguint_b64u(x: &BigUint) -> String {
    Base64UrlUnpadded::encode_string(&x.to_bytes_be())
}

pub fn decode_biguint_b64u(s: &str) -> Result<BigUint, String> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| "invalid base64url".to_string())?;
    Ok(BigUint::from_bytes_be(&bytes))
}

#[cfg(target_arch = "wasm32")]
mod wasm_exports {
    use super::*;
    use wasm_bindgen::prelude::*;

    #[wasm_bindgen]
    pub fn get_shamir_p_b64u() -> String {
        DEFAULT_SHAMIR_P_B64U.to_string()
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_exports::get_shamir_p_b64u;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_then_unlock_round_trips_kek() {
        let sp = Shamir3Pass::new_default();
        let kek = sp.random_k().unwrap();

        let client_keys = sp.generate_lock_keys().unwrap();
        let relay_keys = sp.generate_lock_keys().unwrap();

        let locked_by_client = sp.add_lock(&kek, &client_keys.e);
        let locked_by_both = sp.add_lock(&locked_by_client, &relay_keys.e);
        let relay_removed = sp.remove_lock(&locked_by_both, &relay_keys.d);
        let client_removed = sp.remove_lock(&relay_removed, &client_keys.d);

        assert_eq!(client_removed, kek);
    }

    #[test]
    fn encrypt_decrypt_round_trips_with_same_kek() {
        let sp = Shamir3Pass::new_default();
        let (ciphertext, kek) = sp.encrypt_with_random_kek_key(b"vrf secret bytes").unwrap();
        let plaintext = sp.decrypt_with_key(&ciphertext, &kek).unwrap();
        assert_eq!(plaintext, b"vrf secret bytes");
    }

    #[test]
    fn rejects_primes_below_the_minimum_bit_length() {
        let tiny = encode_biguint_b64u(&BigUint::from(97u32));
        assert!(matches!(
            Shamir3Pass::new(&tiny),
            Err(Shamir3PassError::PrimeTooSmall { .. })
        ));
    }
}
