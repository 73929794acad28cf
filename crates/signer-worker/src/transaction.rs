//! Builds, signs, and hashes NEAR transactions and NEP-461 delegate actions.

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

use crate::errors::SignerWorkerError;
use crate::types::{Action, CryptoHash, DelegateAction, PublicKey, Signature, SignedTransaction, Transaction};

pub fn build_transaction_with_actions(
    signer_id: &str,
    receiver_id: &str,
    nonce: u64,
    block_hash_bytes: &[u8],
    signer_public_key_bytes: &[u8; 32],
    actions: Vec<Action>,
) -> Result<Transaction, SignerWorkerError> {
    if actions.is_empty() {
        return Err(SignerWorkerError::ActionValidationError(
            "transaction must have at least one action".to_string(),
        ));
    }
    let block_hash: [u8; 32] = block_hash_bytes
        .try_into()
        .map_err(|_| SignerWorkerError::invalid_format("block hash must be 32 bytes"))?;

    Ok(Transaction {
        signer_id: signer_id.parse().map_err(SignerWorkerError::invalid_format)?,
        public_key: PublicKey::from_ed25519_bytes(*signer_public_key_bytes),
        nonce,
        receiver_id: receiver_id.parse().map_err(SignerWorkerError::invalid_format)?,
        block_hash: CryptoHash(block_hash),
        actions,
    })
}

/// Signs the transaction's Borsh hash directly (not a re-hash of the signed
/// bytes) and returns the Borsh-serialized `SignedTransaction`.
pub fn sign_transaction(transaction: Transaction, signing_key: &SigningKey) -> Result<Vec<u8>, SignerWorkerError> {
    let (hash, _size) = transaction.get_hash_and_size();
    let signature_bytes = signing_key.sign(&hash.0).to_bytes();
    let signed = SignedTransaction {
        transaction,
        signature: Signature::from_ed25519_bytes(signature_bytes),
    };
    signed.to_borsh_bytes().map_err(SignerWorkerError::invalid_format)
}

/// SHA-256 hash of the Borsh-serialized signed transaction, base58-encoded —
/// this is the hash applications display/compare against RPC responses.
pub fn calculate_transaction_hash(signed_tx_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signed_tx_bytes);
    let hash: [u8; 32] = hasher.finalize().into();
    bs58::encode(hash).into_string()
}

/// NEP-461 delegate action hash, signed the same way a transaction hash is.
pub fn hash_delegate_action(delegate: &DelegateAction) -> [u8; 32] {
    delegate.hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionParams;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[3u8; 32])
    }

    #[test]
    fn builds_and_signs_a_transfer_transaction() {
        let sk = signing_key();
        let pk = sk.verifying_key().to_bytes();
        let action = ActionParams::Transfer { deposit: "1".to_string() }.to_action().unwrap();
        let tx = build_transaction_with_actions("alice.near", "bob.near", 1, &[0u8; 32], &pk, vec![action]).unwrap();
        let signed_bytes = sign_transaction(tx, &sk).unwrap();
        let signed = SignedTransaction::from_borsh_bytes(&signed_bytes).unwrap();
        assert_eq!(signed.transaction.nonce, 1);

        let hash = calculate_transaction_hash(&signed_bytes);
        assert!(!hash.is_empty());
    }

    #[test]
    fn rejects_transaction_with_no_actions() {
        let pk = [0u8; 32];
        let result = build_transaction_with_actions("alice.near", "bob.near", 1, &[0u8; 32], &pk, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_block_hash() {
        let pk = [0u8; 32];
        let action = ActionParams::Transfer { deposit: "1".to_string() }.to_action().unwrap();
        let result = build_transaction_with_actions("alice.near", "bob.near", 1, &[0u8; 10], &pk, vec![action]);
        assert!(result.is_err());
    }
}
