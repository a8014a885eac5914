//! Atomic-swap HTLC flows.
//!
//! Builders for the funding, claim and refund transactions around the HTLC
//! script, and the preimage extraction that lets the counterparty complete
//! the other leg of a swap once a claim hits the chain.

use hashes::Hash;
use mynta::blockdata::transaction::{SEQUENCE_FINAL, SEQUENCE_LOCKTIME_ENABLED, SIGHASH_ALL};
use mynta::htlc;
use mynta::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use mynta::{HashLock, OutPoint, PubkeyHash, ScriptBuf, Transaction, TxIn, TxOut};
use tracing::debug;

use crate::error::{ValidationError, ValidationResult};
use crate::types::CoinView;

/// One leg of an atomic swap: an HTLC paying `amount` to whoever reveals the
/// preimage before `timeout_height`, refundable by the sender afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcContract {
    pub hash_lock: HashLock,
    pub receiver: PubkeyHash,
    pub sender: PubkeyHash,
    /// Absolute block height, not a timestamp.
    pub timeout_height: u32,
    pub amount: u64,
}

impl HtlcContract {
    /// The redeem script for this contract.
    pub fn redeem_script(&self) -> ScriptBuf {
        htlc::create_htlc_script(
            &self.hash_lock,
            &self.receiver,
            &self.sender,
            self.timeout_height,
        )
    }

    /// The P2SH output that funds this contract.
    pub fn funding_output(&self) -> TxOut {
        TxOut {
            value: self.amount,
            script_pubkey: htlc::htlc_p2sh_script(&self.redeem_script()),
        }
    }

    /// Checks a chain output against this contract: P2SH form, exact script,
    /// exact amount.
    pub fn matches_output(&self, output: &TxOut) -> bool {
        htlc::validate_htlc_output(output, self.amount, &self.redeem_script())
    }

    /// Whether the claim path is still open at `current_height`.
    pub fn can_claim(&self, current_height: u32) -> bool {
        current_height < self.timeout_height
    }

    /// Whether the refund path has opened at `current_height`.
    pub fn can_refund(&self, current_height: u32) -> bool {
        htlc::can_refund(self.timeout_height, current_height)
    }
}

fn signed_input_script(
    tx: &Transaction,
    redeem_script: &ScriptBuf,
    secret_key: &[u8],
) -> ValidationResult<(Vec<u8>, Vec<u8>)> {
    let secp = Secp256k1::signing_only();
    let secret_key = SecretKey::from_slice(secret_key)
        .map_err(|_| ValidationError::CryptoFailure("invalid claim/refund key".into()))?;
    let pubkey = PublicKey::from_secret_key(&secp, &secret_key);

    let sighash = tx.signature_hash(0, redeem_script, SIGHASH_ALL);
    let message = Message::from_digest(sighash.to_byte_array());
    let mut signature = secp.sign_ecdsa(&message, &secret_key).serialize_der().to_vec();
    signature.push(SIGHASH_ALL as u8);

    Ok((signature, pubkey.serialize().to_vec()))
}

/// Builds the transaction claiming an HTLC output with `preimage`.
///
/// The scriptSig is `<sig> <pubkey> <preimage> OP_TRUE`; the signature is
/// SIGHASH_ALL over the redeem script.
pub fn build_claim_transaction(
    contract: &HtlcContract,
    funding: OutPoint,
    destination: ScriptBuf,
    fee: u64,
    preimage: &[u8],
    receiver_secret: &[u8],
) -> ValidationResult<Transaction> {
    if !htlc::verify_preimage(&contract.hash_lock, preimage) {
        return Err(ValidationError::CryptoFailure("preimage does not open the hash lock".into()));
    }
    if fee >= contract.amount {
        return Err(ValidationError::ConsensusReject("fee consumes the whole output".into()));
    }

    let mut tx = Transaction {
        version: 2,
        lock_time: 0,
        input: vec![TxIn {
            previous_output: funding,
            script_sig: ScriptBuf::new(),
            sequence: SEQUENCE_FINAL,
        }],
        output: vec![TxOut { value: contract.amount - fee, script_pubkey: destination }],
        special_transaction_payload: None,
    };

    let redeem_script = contract.redeem_script();
    let (signature, pubkey) = signed_input_script(&tx, &redeem_script, receiver_secret)?;
    tx.input[0].script_sig = htlc::create_claim_script(&signature, &pubkey, preimage);
    debug!(txid = %tx.txid(), "claim transaction built");
    Ok(tx)
}

/// Builds the refund transaction for an expired HTLC.
///
/// CLTV demands a non-final sequence and the lock time set to the timeout
/// height; the scriptSig is `<sig> <pubkey> OP_FALSE`.
pub fn build_refund_transaction(
    contract: &HtlcContract,
    funding: OutPoint,
    destination: ScriptBuf,
    fee: u64,
    sender_secret: &[u8],
) -> ValidationResult<Transaction> {
    if fee >= contract.amount {
        return Err(ValidationError::ConsensusReject("fee consumes the whole output".into()));
    }

    let mut tx = Transaction {
        version: 2,
        lock_time: contract.timeout_height,
        input: vec![TxIn {
            previous_output: funding,
            script_sig: ScriptBuf::new(),
            sequence: SEQUENCE_LOCKTIME_ENABLED,
        }],
        output: vec![TxOut { value: contract.amount - fee, script_pubkey: destination }],
        special_transaction_payload: None,
    };

    let redeem_script = contract.redeem_script();
    let (signature, pubkey) = signed_input_script(&tx, &redeem_script, sender_secret)?;
    tx.input[0].script_sig = htlc::create_refund_script(&signature, &pubkey);
    debug!(txid = %tx.txid(), "refund transaction built");
    Ok(tx)
}

/// Pulls the revealed preimage out of a confirmed claim transaction's input.
pub fn extract_preimage_from_claim(tx: &Transaction, input_index: usize) -> Option<Vec<u8>> {
    let input = tx.input.get(input_index)?;
    htlc::extract_preimage(&input.script_sig)
}

/// Watches a transaction for claims against known contracts: returns every
/// `(input index, preimage)` whose revealed preimage opens `hash_lock`.
pub fn find_preimages_for(tx: &Transaction, hash_lock: &HashLock) -> Vec<(usize, Vec<u8>)> {
    tx.input
        .iter()
        .enumerate()
        .filter_map(|(index, input)| {
            htlc::extract_preimage(&input.script_sig).map(|preimage| (index, preimage))
        })
        .filter(|(_, preimage)| htlc::verify_preimage(hash_lock, preimage))
        .collect()
}

/// Confirms a contract is funded on-chain with the exact amount and script.
pub fn verify_funding(
    contract: &HtlcContract,
    funding: &OutPoint,
    coins: &dyn CoinView,
) -> ValidationResult<()> {
    let coin = coins
        .get_coin(funding)
        .ok_or_else(|| ValidationError::NotFound(format!("htlc funding {}", funding)))?;
    if coin.spent {
        return Err(ValidationError::ConsensusReject("htlc funding already spent".into()));
    }
    let expected = TxOut { value: coin.value, script_pubkey: coin.script_pubkey };
    if !contract.matches_output(&expected) {
        return Err(ValidationError::ConsensusReject(
            "output does not match the htlc contract".into(),
        ));
    }
    Ok(())
}
