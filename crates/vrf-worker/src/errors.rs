//! Error types for the VRF worker, grouped by the subsystem that raises them
//! so a caller can match on `VrfWorkerError` without digging into string
//! messages.

use std::fmt;

#[derive(Debug)]
pub enum AesError {
    EncryptionFailed(String),
    DecryptionFailed(String),
    IvGenerationFailed(String),
}

impl fmt::Display for AesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AesError::EncryptionFailed(e) => write!(f, "AES encryption failed: {}", e),
            AesError::DecryptionFailed(e) => write!(f, "AES decryption failed: {}", e),
            AesError::IvGenerationFailed(e) => write!(f, "IV generation failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum HkdfError {
    KeyDerivationFailed,
    VrfSeedDerivationFailed,
}

impl fmt::Display for HkdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HkdfError::KeyDerivationFailed => write!(f, "HKDF key derivation failed"),
            HkdfError::VrfSeedDerivationFailed => write!(f, "HKDF VRF seed derivation failed"),
        }
    }
}

#[derive(Debug)]
pub enum SerializationError {
    Base64Error(String),
    VrfKeypairSerialization(String),
    VrfKeypairDeserialization(String),
    VrfPublicKeySerialization(String),
    KeypairDataSerialization(String),
    KeypairDataDeserialization(String),
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::Base64Error(e) => write!(f, "base64 error: {}", e),
            SerializationError::VrfKeypairSerialization(e) => {
                write!(f, "VRF keypair serialization failed: {}", e)
            }
            SerializationError::VrfKeypairDeserialization(e) => {
                write!(f, "VRF keypair deserialization failed: {}", e)
            }
            SerializationError::VrfPublicKeySerialization(e) => {
                write!(f, "VRF public key serialization failed: {}", e)
            }
            SerializationError::KeypairDataSerialization(e) => {
                write!(f, "keypair data serialization failed: {}", e)
            }
            SerializationError::KeypairDataDeserialization(e) => {
                write!(f, "keypair data deserialization failed: {}", e)
            }
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
pub enum VrfWorkerError {
    NoVrfKeypair,
    VrfNotUnlocked,
    PublicKeyMismatch { expected: String, actual: String },
    InvalidFormat(String),
    InvalidIvLength { expected: usize, actual: usize },
    BlockHeightParsingError(String),
    MessageParsingError(MessageError),
    MissingRequiredData(String),
    AesGcmError(AesError),
    HkdfDerivationFailed(HkdfError),
    SerializationError(SerializationError),
    SessionNotFound(String),
    SessionExpired(String),
    SessionExhausted(String),
    SessionPortNotAttached(String),
    ForbiddenField(String),
}

impl VrfWorkerError {
    pub fn empty_prf_output() -> Self {
        VrfWorkerError::MissingRequiredData("PRF output cannot be empty".to_string())
    }

    pub fn invalid_format(msg: &str) -> Self {
        VrfWorkerError::InvalidFormat(msg.to_string())
    }

    pub fn public_key_mismatch(expected: &str, actual: &str) -> Self {
        VrfWorkerError::PublicKeyMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for VrfWorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VrfWorkerError::NoVrfKeypair => {
                write!(f, "No VRF keypair in memory - please generate keypair first")
            }
            VrfWorkerError::VrfNotUnlocked => {
                write!(f, "VRF keypair not unlocked - please login first")
            }
            VrfWorkerError::PublicKeyMismatch { expected, actual } => write!(
                f,
                "VRF public key mismatch: expected {}, got {}",
                expected, actual
            ),
            VrfWorkerError::InvalidFormat(m) => write!(f, "invalid format: {}", m),
            VrfWorkerError::InvalidIvLength { expected, actual } => write!(
                f,
                "invalid IV length: expected {}, got {}",
                expected, actual
            ),
            VrfWorkerError::BlockHeightParsingError(m) => write!(f, "{}", m),
            VrfWorkerError::MessageParsingError(e) => write!(f, "{}", e),
            VrfWorkerError::MissingRequiredData(m) => write!(f, "{}", m),
            VrfWorkerError::AesGcmError(e) => write!(f, "{}", e),
            VrfWorkerError::HkdfDerivationFailed(e) => write!(f, "{}", e),
            VrfWorkerError::SerializationError(e) => write!(f, "{}", e),
            VrfWorkerError::SessionNotFound(id) => write!(f, "session_not_found: {}", id),
            VrfWorkerError::SessionExpired(id) => write!(f, "session_expired: {}", id),
            VrfWorkerError::SessionExhausted(id) => write!(f, "session_exhausted: {}", id),
            VrfWorkerError::SessionPortNotAttached(id) => {
                write!(f, "no wrapKeySeed port attached for session {}", id)
            }
            VrfWorkerError::ForbiddenField(field) => {
                write!(f, "forbidden field in request payload: {}", field)
            }
        }
    }
}

impl std::error::Error for VrfWorkerError {}

impl From<bincode::Error> for VrfWorkerError {
    fn from(e: bincode::Error) -> Self {
        VrfWorkerError::SerializationError(SerializationError::KeypairDataSerialization(
            e.to_string(),
        ))
    }
}

impl From<hkdf::InvalidLength> for VrfWorkerError {
    fn from(_: hkdf::InvalidLength) -> Self {
        VrfWorkerError::HkdfDerivationFailed(HkdfError::KeyDerivationFailed)
    }
}

/// Stable wire code for the `code` field of an error response, independent of
/// the human-readable `Display` message.
impl VrfWorkerError {
    pub fn wire_code(&self) -> &'static str {
        match self {
            VrfWorkerError::SessionNotFound(_) => "session_not_found",
            VrfWorkerError::SessionExpired(_) => "session_expired",
            VrfWorkerError::SessionExhausted(_) => "session_exhausted",
            _ => "VRF_ERROR",
        }
    }
}

pub type VrfResult<T> = Result<T, VrfWorkerError>;
