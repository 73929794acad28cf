use crate::errors::VrfWorkerError;
use base64ct::{Base64UrlUnpadded, Encoding};
use getrandom::getrandom;

pub fn base64_url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

pub fn base64_url_decode(s: &str) -> Result<Vec<u8>, String> {
    Base64UrlUnpadded::decode_vec(s).map_err(|e| format!("base64 decode error: {}", e))
}

/// Generates a fresh 32-byte `wrapKeySalt` when the caller doesn't supply one
/// for `MINT_SESSION_KEYS_AND_SEND_TO_SIGNER`.
pub fn generate_wrap_key_salt_b64u() -> Result<String, String> {
    let mut bytes = [0u8; 32];
    getrandom(&mut bytes).map_err(|e| format!("failed to generate wrapKeySalt: {}", e))?;
    Ok(base64_url_encode(&bytes))
}

pub fn parse_block_height(block_height: &str) -> Result<u64, VrfWorkerError> {
    block_height
        .parse()
        .map_err(|_| VrfWorkerError::BlockHeightParsingError(format!(
            "invalid block height: {}",
            block_height
        )))
}
