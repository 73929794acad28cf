//! Error types for the signer worker, grouped by subsystem so a caller can
//! match on [`SignerWorkerError`] without digging into string messages.

use std::fmt;

#[derive(Debug)]
pub enum ChaCha20Error {
    EncryptionFailed(String),
    DecryptionFailed(String),
}

impl fmt::Display for ChaCha20Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChaCha20Error::EncryptionFailed(e) => write!(f, "ChaCha20 encryption failed: {}", e),
            ChaCha20Error::DecryptionFailed(e) => write!(f, "ChaCha20 decryption failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum KdfError {
    KeyDerivationFailed,
    NearKeySeedDerivationFailed,
}

impl fmt::Display for KdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdfError::KeyDerivationFailed => write!(f, "HKDF key derivation failed"),
            KdfError::NearKeySeedDerivationFailed => write!(f, "HKDF NEAR key seed derivation failed"),
        }
    }
}

#[derive(Debug)]
pub enum MessageError {
    JsonParsingFailed(String),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::JsonParsingFailed(e) => write!(f, "message parsing failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum SignerWorkerError {
    InvalidFormat(String),
    InvalidKeyLength { expected: usize, actual: usize },
    InvalidNonceLength { expected: usize, actual: usize },
    MissingRequiredData(String),
    ChaCha20Error(ChaCha20Error),
    KdfError(KdfError),
    MessageParsingError(MessageError),
    ActionValidationError(String),
    NonceExhausted(String),
    WrapKeyUnavailable(String),
    ForbiddenField(String),
}

impl SignerWorkerError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        SignerWorkerError::InvalidFormat(msg.into())
    }

    pub fn missing(msg: impl Into<String>) -> Self {
        SignerWorkerError::MissingRequiredData(msg.into())
    }
}

impl fmt::Display for SignerWorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerWorkerError::InvalidFormat(m) => write!(f, "invalid format: {}", m),
            SignerWorkerError::InvalidKeyLength { expected, actual } => write!(
                f,
                "invalid key length: expected {}, got {}",
                expected, actual
            ),
            SignerWorkerError::InvalidNonceLength { expected, actual } => write!(
                f,
                "invalid nonce length: expected {}, got {}",
                expected, actual
            ),
            SignerWorkerError::MissingRequiredData(m) => write!(f, "{}", m),
            SignerWorkerError::ChaCha20Error(e) => write!(f, "{}", e),
            SignerWorkerError::KdfError(e) => write!(f, "{}", e),
            SignerWorkerError::MessageParsingError(e) => write!(f, "{}", e),
            SignerWorkerError::ActionValidationError(m) => write!(f, "invalid action: {}", m),
            SignerWorkerError::NonceExhausted(pk) => {
                write!(f, "no nonces reserved for signing key {}", pk)
            }
            SignerWorkerError::WrapKeyUnavailable(sid) => {
                write!(f, "no WrapKeySeed available for session {}", sid)
            }
            SignerWorkerError::ForbiddenField(field) => {
                write!(f, "forbidden field in request payload: {}", field)
            }
        }
    }
}

impl std::error::Error for SignerWorkerError {}

impl From<hkdf::InvalidLength> for SignerWorkerError {
    fn from(_: hkdf::InvalidLength) -> Self {
        SignerWorkerError::KdfError(KdfError::KeyDerivationFailed)
    }
}

/// Stable wire code for the `errorCode` field of a response, independent of
/// the human-readable `Display` message.
impl SignerWorkerError {
    pub fn wire_code(&self) -> &'static str {
        match self {
            SignerWorkerError::NonceExhausted(_) => "nonce_exhausted",
            SignerWorkerError::WrapKeyUnavailable(_) => "wrap_key_unavailable",
            SignerWorkerError::ActionValidationError(_) => "invalid_action",
            _ => "SIGNER_ERROR",
        }
    }
}

pub type SignerResult<T> = Result<T, SignerWorkerError>;

/// Secret field names redacted from logged/returned JSON, extending
/// `wallet_core::error::scrub_secret_fields`'s table with the NEAR-private-key
/// and dual-PRF field names this worker's requests carry.
const SECRET_KEYS: [&str; 10] = [
    "nearPrivateKey",
    "near_private_key",
    "wrapKeySeed",
    "wrap_key_seed",
    "prfOutput",
    "prf_output",
    "prfFirst",
    "prfSecond",
    "chacha20PrfOutput",
    "ed25519PrfOutput",
];

/// Redacts high-value secret fields from a JSON string before it is logged or
/// surfaced in an error message.
pub fn scrub_secret_fields(input: &str) -> String {
    const REDACTED: &str = "[REDACTED]";
    let mut out = input.to_string();
    for key in SECRET_KEYS {
        let pattern = format!("\"{}\"", key);
        let mut search_from = 0usize;
        while let Some(pos) = out[search_from..].find(&pattern) {
            let key_start = search_from + pos;
            let after_key = key_start + pattern.len();
            let Some(colon_rel) = out[after_key..].find(':') else {
                break;
            };
            let colon_pos = after_key + colon_rel;
            let value_start = out[colon_pos + 1..]
                .find(|c: char| !c.is_whitespace())
                .map(|off| colon_pos + 1 + off);
            let Some(value_start) = value_start else { break };
            if out.as_bytes().get(value_start) != Some(&b'"') {
                search_from = value_start;
                continue;
            }
            let Some(end_rel) = out[value_start + 1..].find('"') else {
                break;
            };
            let value_end = value_start + 1 + end_rel;
            out.replace_range(value_start + 1..value_end, REDACTED);
            search_from = value_start + 1 + REDACTED.len() + 1;
        }
    }
    out
}
