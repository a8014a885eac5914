//! Builders for fully signed provider transactions with real keys.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use hashes::Hash;
use mynta::blockdata::transaction::special_transaction::provider_registration::ProviderRegistrationPayload;
use mynta::blockdata::transaction::special_transaction::provider_update_registrar::ProviderUpdateRegistrarPayload;
use mynta::blockdata::transaction::special_transaction::provider_update_revocation::ProviderUpdateRevocationPayload;
use mynta::blockdata::transaction::special_transaction::provider_update_service::ProviderUpdateServicePayload;
use mynta::blockdata::transaction::special_transaction::SpecialTransactionBasePayloadEncodable;
use mynta::blockdata::transaction::SEQUENCE_FINAL;
use mynta::secp256k1::{PublicKey, Secp256k1, SecretKey};
use mynta::{
    signer, BLSSecretKey, OutPoint, ProTxHash, PubkeyHash, ScriptBuf, Transaction,
    TransactionPayload, TxIn, TxOut, Txid,
};
use mynta_evo::registry::COLLATERAL_AMOUNT;

use crate::fixtures::MockCoinView;
use crate::helpers::txid;

/// Deterministic keys and builders for one test masternode.
pub struct TestMasternode {
    pub tag: u8,
    pub owner_secret: [u8; 32],
    pub operator_secret: BLSSecretKey,
    pub collateral: OutPoint,
}

impl TestMasternode {
    /// Derives a masternode's keys from a single tag byte.
    pub fn new(tag: u8) -> Self {
        let mut owner_secret = [tag; 32];
        owner_secret[31] = 1; // keep the scalar in range for any tag
        TestMasternode {
            tag,
            owner_secret,
            operator_secret: BLSSecretKey::keygen(&[tag; 32])
                .expect("test ikm yields a valid scalar"),
            collateral: OutPoint::new(txid(tag), 0),
        }
    }

    /// The owner key id.
    pub fn owner_key_hash(&self) -> PubkeyHash {
        let secp = Secp256k1::signing_only();
        let secret = SecretKey::from_slice(&self.owner_secret).expect("valid secret");
        signer::pubkey_hash(&PublicKey::from_secret_key(&secp, &secret))
    }

    /// The node's service address, unique per tag.
    pub fn service_address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, self.tag), 9999))
    }

    /// The payout script.
    pub fn payout_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([self.tag; 20]))
    }

    /// A fully signed registration transaction. Its txid becomes the
    /// proTxHash.
    pub fn register_transaction(&self) -> Transaction {
        let mut tx = base_special_tx(self.tag);
        let mut payload = ProviderRegistrationPayload {
            version: 1,
            provider_type: 0,
            provider_mode: 0,
            collateral_outpoint: self.collateral,
            service_address: self.service_address(),
            owner_key_hash: self.owner_key_hash(),
            operator_public_key: self.operator_secret.public_key(),
            voting_key_hash: PubkeyHash::from_byte_array([self.tag; 20]),
            operator_reward: 0,
            script_payout: self.payout_script(),
            inputs_hash: tx.hash_inputs(),
            signature: Vec::new(),
        };
        payload.signature = signer::sign_hash(
            &payload.base_payload_hash().to_byte_array(),
            &self.owner_secret,
        )
        .expect("owner key signs");
        tx.special_transaction_payload =
            Some(TransactionPayload::ProviderRegistrationPayloadType(payload));
        tx
    }

    /// A signed service update moving the node to `new_address`.
    pub fn update_service_transaction(
        &self,
        pro_tx_hash: ProTxHash,
        new_address: SocketAddr,
    ) -> Transaction {
        let mut tx = base_special_tx(self.tag.wrapping_add(0x40));
        let mut payload = ProviderUpdateServicePayload {
            version: 1,
            pro_tx_hash,
            service_address: new_address,
            script_operator_payout: ScriptBuf::new(),
            inputs_hash: tx.hash_inputs(),
            signature: Default::default(),
        };
        payload.signature =
            self.operator_secret.sign(&payload.base_payload_hash().to_byte_array());
        tx.special_transaction_payload =
            Some(TransactionPayload::ProviderUpdateServicePayloadType(payload));
        tx
    }

    /// A signed registrar update rotating the operator key.
    pub fn update_registrar_transaction(
        &self,
        pro_tx_hash: ProTxHash,
        new_operator: &BLSSecretKey,
    ) -> Transaction {
        let mut tx = base_special_tx(self.tag.wrapping_add(0x80));
        let mut payload = ProviderUpdateRegistrarPayload {
            version: 1,
            pro_tx_hash,
            provider_mode: 0,
            operator_public_key: new_operator.public_key(),
            voting_key_hash: PubkeyHash::from_byte_array([self.tag; 20]),
            script_payout: self.payout_script(),
            inputs_hash: tx.hash_inputs(),
            signature: Vec::new(),
        };
        payload.signature = signer::sign_hash(
            &payload.base_payload_hash().to_byte_array(),
            &self.owner_secret,
        )
        .expect("owner key signs");
        tx.special_transaction_payload =
            Some(TransactionPayload::ProviderUpdateRegistrarPayloadType(payload));
        tx
    }

    /// A signed revocation.
    pub fn revoke_transaction(&self, pro_tx_hash: ProTxHash, reason: u16) -> Transaction {
        let mut tx = base_special_tx(self.tag.wrapping_add(0xC0));
        let mut payload = ProviderUpdateRevocationPayload {
            version: 1,
            pro_tx_hash,
            reason,
            inputs_hash: tx.hash_inputs(),
            signature: Default::default(),
        };
        payload.signature =
            self.operator_secret.sign(&payload.base_payload_hash().to_byte_array());
        tx.special_transaction_payload =
            Some(TransactionPayload::ProviderUpdateRevocationPayloadType(payload));
        tx
    }

    /// Funds the collateral in `coins` deep enough to be mature at any test
    /// height.
    pub fn fund_collateral(&self, coins: &MockCoinView) {
        coins.add_coin(self.collateral, COLLATERAL_AMOUNT, 0);
    }
}

/// A minimal version-3 transaction spending one synthetic input.
fn base_special_tx(tag: u8) -> Transaction {
    Transaction {
        version: 3,
        lock_time: 0,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([tag ^ 0x5A; 32]), 1),
            script_sig: ScriptBuf::new(),
            sequence: SEQUENCE_FINAL,
        }],
        output: vec![TxOut { value: 1_000, script_pubkey: ScriptBuf::new() }],
        special_transaction_payload: None,
    }
}

/// A plain transaction spending the given outpoints. The tag lands in the
/// output value so different tags give different txids.
pub fn spending_transaction(tag: u8, outpoints: &[OutPoint]) -> Transaction {
    Transaction {
        version: 2,
        lock_time: 0,
        input: outpoints
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: SEQUENCE_FINAL,
            })
            .collect(),
        output: vec![TxOut { value: 900 + tag as u64, script_pubkey: ScriptBuf::new() }],
        special_transaction_payload: None,
    }
}
