//! §4.8 step 1: the intent digest binds what the user sees in the
//! confirmation UI to what actually gets signed, so a compromised renderer
//! cannot show one transaction and sign another.

use serde::Serialize;
use sha2::{Digest, Sha256};

use signer_worker_manager::ActionParams;

/// One transaction in a signing batch, mirroring
/// `signer_worker_manager::sign_transactions_with_actions`'s
/// `(receiverId, actions)` shape.
#[derive(Clone, Debug, Serialize)]
pub struct TransactionInput {
    pub receiver_id: String,
    pub actions: Vec<ActionParams>,
}

/// Everything the digest is computed over (spec §4.8 step 1: "hash over
/// canonical serialization of `{sender, receiver, actions, nonce,
/// blockHash}`"). A batch's `receiver` is every transaction's receiver, in
/// order, so a reordering or substitution anywhere in the batch changes the
/// digest.
#[derive(Serialize)]
struct CanonicalIntent<'a> {
    sender: &'a str,
    receivers: Vec<&'a str>,
    actions: Vec<&'a Vec<ActionParams>>,
    nonce: u64,
    block_hash: &'a str,
}

/// Hex-encoded SHA-256 of the canonical JSON form of the intent. `serde_json`
/// serializes map keys in sorted order (no `preserve_order` feature enabled
/// in this workspace), so two calls with the same logical intent always
/// produce the same bytes regardless of field declaration order.
pub fn compute_intent_digest(
    sender_id: &str,
    transactions: &[TransactionInput],
    next_nonce: u64,
    block_hash_b58: &str,
) -> String {
    let canonical = CanonicalIntent {
        sender: sender_id,
        receivers: transactions.iter().map(|t| t.receiver_id.as_str()).collect(),
        actions: transactions.iter().map(|t| &t.actions).collect(),
        nonce: next_nonce,
        block_hash: block_hash_b58,
    };
    let bytes = serde_json::to_vec(&canonical).expect("canonical intent is always serializable");
    let digest = Sha256::digest(&bytes);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
