// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Hash-time-locked contract scripts.
//!
//! The redeem script pays whoever reveals the SHA-256 preimage before the
//! timeout height, and refunds the sender afterwards via CLTV:
//!
//! ```text
//! OP_IF
//!     OP_SHA256 <hash_lock> OP_EQUALVERIFY
//!     OP_DUP OP_HASH160 <receiver> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ELSE
//!     <timeout_height> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!     OP_DUP OP_HASH160 <sender> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ENDIF
//! ```
//!
//! Claim scriptSig: `<sig> <pubkey> <preimage> OP_TRUE`.
//! Refund scriptSig: `<sig> <pubkey> OP_FALSE`, with the input sequence set
//! to [`crate::blockdata::transaction::SEQUENCE_LOCKTIME_ENABLED`] and the
//! transaction lock time set to the timeout height.

use hashes::{sha256, Hash};

use crate::hash_types::{HashLock, PubkeyHash};
use crate::blockdata::script::{opcodes::*, Instruction, ScriptBuf};
use crate::blockdata::transaction::TxOut;

/// The size of an HTLC preimage and its hash lock.
pub const HTLC_PREIMAGE_SIZE: usize = 32;

/// Builds the HTLC redeem script.
pub fn create_htlc_script(
    hash_lock: &HashLock,
    receiver: &PubkeyHash,
    sender: &PubkeyHash,
    timeout_height: u32,
) -> ScriptBuf {
    let mut script = ScriptBuf::new();

    script.push_opcode(OP_IF);
    script.push_opcode(OP_SHA256);
    script.push_slice(&hash_lock.to_byte_array());
    script.push_opcode(OP_EQUALVERIFY);
    script.push_opcode(OP_DUP);
    script.push_opcode(OP_HASH160);
    script.push_slice(&receiver.to_byte_array());
    script.push_opcode(OP_EQUALVERIFY);
    script.push_opcode(OP_CHECKSIG);

    script.push_opcode(OP_ELSE);
    script.push_int(timeout_height as i64);
    script.push_opcode(OP_CHECKLOCKTIMEVERIFY);
    script.push_opcode(OP_DROP);
    script.push_opcode(OP_DUP);
    script.push_opcode(OP_HASH160);
    script.push_slice(&sender.to_byte_array());
    script.push_opcode(OP_EQUALVERIFY);
    script.push_opcode(OP_CHECKSIG);
    script.push_opcode(OP_ENDIF);

    script
}

/// The P2SH script paying to an HTLC redeem script.
pub fn htlc_p2sh_script(redeem_script: &ScriptBuf) -> ScriptBuf {
    ScriptBuf::new_p2sh(&redeem_script.script_hash())
}

/// Builds the claim scriptSig revealing `preimage`.
pub fn create_claim_script(signature: &[u8], pubkey: &[u8], preimage: &[u8]) -> ScriptBuf {
    let mut script = ScriptBuf::new();
    script.push_slice(signature);
    script.push_slice(pubkey);
    script.push_slice(preimage);
    script.push_opcode(OP_TRUE);
    script
}

/// Builds the refund scriptSig.
pub fn create_refund_script(signature: &[u8], pubkey: &[u8]) -> ScriptBuf {
    let mut script = ScriptBuf::new();
    script.push_slice(signature);
    script.push_slice(pubkey);
    script.push_opcode(OP_FALSE);
    script
}

/// Extracts the preimage from a claim scriptSig.
///
/// The preimage is the third data push; the scriptSig must take the claim
/// branch (trailing `OP_TRUE`).
pub fn extract_preimage(script_sig: &ScriptBuf) -> Option<Vec<u8>> {
    let instructions: Vec<Instruction> = script_sig.instructions().collect();
    match instructions.last() {
        Some(Instruction::Op(OP_TRUE)) => {}
        _ => return None,
    }
    let pushes: Vec<&[u8]> = instructions
        .iter()
        .filter_map(|instruction| match instruction {
            Instruction::PushBytes(bytes) => Some(*bytes),
            Instruction::Op(_) => None,
        })
        .collect();
    if pushes.len() >= 3 {
        Some(pushes[2].to_vec())
    } else {
        None
    }
}

/// Whether `preimage` opens `hash_lock`.
pub fn verify_preimage(hash_lock: &HashLock, preimage: &[u8]) -> bool {
    if preimage.is_empty() {
        return false;
    }
    sha256::Hash::hash(preimage).to_byte_array() == hash_lock.to_byte_array()
}

/// Hashes a fresh preimage into its lock.
pub fn hash_lock_for(preimage: &[u8]) -> HashLock {
    HashLock::from_raw_hash(sha256::Hash::hash(preimage))
}

/// Checks that `output` is the P2SH commitment of `redeem_script` with the
/// exact expected amount.
pub fn validate_htlc_output(
    output: &TxOut,
    expected_amount: u64,
    redeem_script: &ScriptBuf,
) -> bool {
    output.value == expected_amount && output.script_pubkey == htlc_p2sh_script(redeem_script)
}

/// Whether the refund branch is spendable at `current_height` for a contract
/// timing out at `timeout_height`.
pub fn can_refund(timeout_height: u32, current_height: u32) -> bool {
    current_height >= timeout_height
}
