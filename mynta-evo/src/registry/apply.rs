//! The deterministic fold: special transactions in, a new snapshot out.

use hashes::Hash;
use mynta::blockdata::transaction::special_transaction::{
    check_special_transaction, SpecialTransactionBasePayloadEncodable, TransactionPayload,
};
use mynta::{signer, BlockHash, ProTxHash, Transaction};

use crate::error::{ValidationError, ValidationResult};
use crate::types::CoinView;

use super::list::{MasternodeEntry, MasternodeList, MasternodeState, NO_HEIGHT};
use super::{COLLATERAL_AMOUNT, COLLATERAL_CONFIRMATIONS};

/// The registry identity of a registration transaction.
pub fn pro_tx_hash_for(tx: &Transaction) -> ProTxHash {
    ProTxHash::from_byte_array(tx.txid().to_byte_array())
}

/// Folds one block's transactions over `prev`, producing the snapshot at
/// `(block_hash, height)`.
///
/// Deterministic: transactions are processed in block order, and any
/// violation rejects the whole block. After the typed transactions are
/// applied, any input spending a tracked collateral deletes its record.
pub fn apply_block(
    prev: &MasternodeList,
    block_hash: BlockHash,
    height: u32,
    transactions: &[Transaction],
    coins: &dyn CoinView,
) -> ValidationResult<MasternodeList> {
    let mut list = prev.at_block(block_hash, height);

    for tx in transactions {
        check_special_transaction(tx)
            .map_err(|e| ValidationError::ConsensusReject(format!("bad special tx: {}", e)))?;

        let Some(payload) = &tx.special_transaction_payload else {
            continue;
        };

        match payload {
            TransactionPayload::ProviderRegistrationPayloadType(payload) => {
                check_register_collateral(payload, height, coins)?;
                signer::verify_hash_signature(
                    &payload.base_payload_hash().to_byte_array(),
                    &payload.signature,
                    &payload.owner_key_hash,
                )
                .map_err(|e| {
                    ValidationError::ConsensusReject(format!("bad proreg owner sig: {}", e))
                })?;

                let entry = MasternodeEntry {
                    pro_tx_hash: pro_tx_hash_for(tx),
                    collateral_outpoint: payload.collateral_outpoint,
                    operator_reward: payload.operator_reward,
                    internal_id: list.total_registered_count(),
                    state: MasternodeState {
                        registered_height: height as i32,
                        last_paid_height: 0,
                        pose_penalty: 0,
                        pose_revived_height: NO_HEIGHT,
                        pose_ban_height: NO_HEIGHT,
                        revocation_reason: 0,
                        owner_key_hash: payload.owner_key_hash,
                        operator_public_key: payload.operator_public_key,
                        voting_key_hash: payload.voting_key_hash,
                        service_address: payload.service_address,
                        script_payout: payload.script_payout.clone(),
                        script_operator_payout: Default::default(),
                    },
                };
                list = list.add_mn(entry)?;
            }

            TransactionPayload::ProviderUpdateServicePayloadType(payload) => {
                let entry = list.get(&payload.pro_tx_hash).ok_or_else(|| {
                    ValidationError::ConsensusReject(format!(
                        "service update for unknown masternode {}",
                        payload.pro_tx_hash
                    ))
                })?;
                if !payload.signature.verify_insecure(
                    &entry.state.operator_public_key,
                    &payload.base_payload_hash().to_byte_array(),
                ) {
                    return Err(ValidationError::ConsensusReject(
                        "bad proupserv operator sig".into(),
                    ));
                }

                let mut new_state = entry.state.clone();
                new_state.service_address = payload.service_address;
                if !payload.script_operator_payout.is_empty() {
                    new_state.script_operator_payout = payload.script_operator_payout.clone();
                }
                list = list.update_mn(&payload.pro_tx_hash, new_state)?;
            }

            TransactionPayload::ProviderUpdateRegistrarPayloadType(payload) => {
                let entry = list.get(&payload.pro_tx_hash).ok_or_else(|| {
                    ValidationError::ConsensusReject(format!(
                        "registrar update for unknown masternode {}",
                        payload.pro_tx_hash
                    ))
                })?;
                signer::verify_hash_signature(
                    &payload.base_payload_hash().to_byte_array(),
                    &payload.signature,
                    &entry.state.owner_key_hash,
                )
                .map_err(|e| {
                    ValidationError::ConsensusReject(format!("bad proupreg owner sig: {}", e))
                })?;

                let mut new_state = entry.state.clone();
                let operator_changed =
                    payload.operator_public_key != entry.state.operator_public_key;
                new_state.operator_public_key = payload.operator_public_key;
                new_state.voting_key_hash = payload.voting_key_hash;
                if !payload.script_payout.is_empty() {
                    new_state.script_payout = payload.script_payout.clone();
                }
                // A new operator starts with a clean PoSe slate.
                if operator_changed {
                    new_state.pose_penalty = 0;
                    new_state.pose_ban_height = NO_HEIGHT;
                    new_state.pose_revived_height = height as i32;
                }
                list = list.update_mn(&payload.pro_tx_hash, new_state)?;
            }

            TransactionPayload::ProviderUpdateRevocationPayloadType(payload) => {
                let entry = list.get(&payload.pro_tx_hash).ok_or_else(|| {
                    ValidationError::ConsensusReject(format!(
                        "revocation for unknown masternode {}",
                        payload.pro_tx_hash
                    ))
                })?;
                if !payload.signature.verify_insecure(
                    &entry.state.operator_public_key,
                    &payload.base_payload_hash().to_byte_array(),
                ) {
                    return Err(ValidationError::ConsensusReject(
                        "bad prouprev operator sig".into(),
                    ));
                }

                let mut new_state = entry.state.clone();
                new_state.revocation_reason = payload.reason;
                new_state.pose_ban_height = height as i32;
                list = list.update_mn(&payload.pro_tx_hash, new_state)?;
            }
        }
    }

    // A spent collateral deletes the registration, whatever kind of
    // transaction spent it.
    for tx in transactions {
        for input in &tx.input {
            if let Some(entry) = list.by_collateral(&input.previous_output) {
                let pro_tx_hash = entry.pro_tx_hash;
                list = list.remove_mn(&pro_tx_hash);
            }
        }
    }

    Ok(list)
}

fn check_register_collateral(
    payload: &mynta::blockdata::transaction::special_transaction::ProviderRegistrationPayload,
    height: u32,
    coins: &dyn CoinView,
) -> ValidationResult<()> {
    let coin = coins.get_coin(&payload.collateral_outpoint).ok_or_else(|| {
        ValidationError::ConsensusReject("collateral outpoint not found".into())
    })?;
    if coin.spent {
        return Err(ValidationError::ConsensusReject("collateral already spent".into()));
    }
    if coin.value != COLLATERAL_AMOUNT {
        return Err(ValidationError::ConsensusReject(format!(
            "collateral value {} != {}",
            coin.value, COLLATERAL_AMOUNT
        )));
    }
    if height.saturating_sub(coin.height) < COLLATERAL_CONFIRMATIONS {
        return Err(ValidationError::ConsensusReject(format!(
            "collateral has {} confirmations, needs {}",
            height.saturating_sub(coin.height),
            COLLATERAL_CONFIRMATIONS
        )));
    }
    Ok(())
}
