//! HTLC flow tests.

use mynta::blockdata::transaction::{SEQUENCE_FINAL, SEQUENCE_LOCKTIME_ENABLED};
use mynta::htlc::hash_lock_for;
use mynta::secp256k1::{PublicKey, Secp256k1, SecretKey};
use mynta::{signer, OutPoint, PubkeyHash, ScriptBuf};

use mynta_evo::swap::{
    build_claim_transaction, build_refund_transaction, extract_preimage_from_claim,
    find_preimages_for, verify_funding, HtlcContract,
};

use mynta_test_utils::{txid, MockCoinView};

fn keypair(tag: u8) -> ([u8; 32], PubkeyHash) {
    let mut secret = [tag; 32];
    secret[31] = 1;
    let secp = Secp256k1::signing_only();
    let secret_key = SecretKey::from_slice(&secret).unwrap();
    let key_id = signer::pubkey_hash(&PublicKey::from_secret_key(&secp, &secret_key));
    (secret, key_id)
}

/// A contract over the preimage 0x01..0x20, timing out 100 blocks out.
fn fixture(current_height: u32) -> (Vec<u8>, HtlcContract, [u8; 32], [u8; 32]) {
    let preimage: Vec<u8> = (1u8..=32).collect();
    let (receiver_secret, receiver) = keypair(0x11);
    let (sender_secret, sender) = keypair(0x22);
    let contract = HtlcContract {
        hash_lock: hash_lock_for(&preimage),
        receiver,
        sender,
        timeout_height: current_height + 100,
        amount: 50_000,
    };
    (preimage, contract, receiver_secret, sender_secret)
}

#[test]
fn claim_reveals_the_exact_preimage() {
    let height = 1000;
    let (preimage, contract, receiver_secret, _) = fixture(height);
    assert!(contract.can_claim(height + 10));

    let claim = build_claim_transaction(
        &contract,
        OutPoint::new(txid(0x77), 0),
        ScriptBuf::new_p2pkh(&contract.receiver),
        1_000,
        &preimage,
        &receiver_secret,
    )
    .unwrap();

    assert_eq!(claim.input[0].sequence, SEQUENCE_FINAL);
    assert_eq!(claim.output[0].value, contract.amount - 1_000);
    assert_eq!(extract_preimage_from_claim(&claim, 0), Some(preimage.clone()));
    assert_eq!(find_preimages_for(&claim, &contract.hash_lock), vec![(0, preimage)]);
}

#[test]
fn claim_with_the_wrong_preimage_is_refused() {
    let (_, contract, receiver_secret, _) = fixture(1000);
    let wrong: Vec<u8> = (33u8..=64).collect();
    assert!(build_claim_transaction(
        &contract,
        OutPoint::new(txid(0x77), 0),
        ScriptBuf::new_p2pkh(&contract.receiver),
        1_000,
        &wrong,
        &receiver_secret,
    )
    .is_err());
}

#[test]
fn refund_sets_cltv_fields() {
    let (_, contract, _, sender_secret) = fixture(1000);

    let refund = build_refund_transaction(
        &contract,
        OutPoint::new(txid(0x78), 0),
        ScriptBuf::new_p2pkh(&contract.sender),
        1_000,
        &sender_secret,
    )
    .unwrap();

    assert_eq!(refund.lock_time, contract.timeout_height);
    assert_eq!(refund.input[0].sequence, SEQUENCE_LOCKTIME_ENABLED);
    // The refund branch never reveals a preimage.
    assert_eq!(extract_preimage_from_claim(&refund, 0), None);
}

#[test]
fn claim_and_refund_windows_meet_at_the_timeout() {
    let (_, contract, _, _) = fixture(1000);
    let timeout = contract.timeout_height;

    assert!(contract.can_claim(timeout - 1));
    assert!(!contract.can_refund(timeout - 1));

    assert!(!contract.can_claim(timeout));
    assert!(contract.can_refund(timeout));
}

#[test]
fn fee_must_leave_something_to_spend() {
    let (preimage, contract, receiver_secret, _) = fixture(1000);
    assert!(build_claim_transaction(
        &contract,
        OutPoint::new(txid(0x79), 0),
        ScriptBuf::new(),
        contract.amount,
        &preimage,
        &receiver_secret,
    )
    .is_err());
}

#[test]
fn funding_verification_needs_the_exact_output() {
    let (_, contract, _, _) = fixture(1000);
    let coins = MockCoinView::new();
    let funding = OutPoint::new(txid(0x7A), 0);

    // Missing.
    assert!(verify_funding(&contract, &funding, &coins).is_err());

    // Wrong script.
    coins.add_coin(funding, contract.amount, 900);
    assert!(verify_funding(&contract, &funding, &coins).is_err());

    // Exact P2SH output.
    let exact = OutPoint::new(txid(0x7B), 0);
    let output = contract.funding_output();
    coins.add_coin_with_script(exact, output.value, 900, output.script_pubkey.clone());
    verify_funding(&contract, &exact, &coins).unwrap();

    // Wrong amount.
    let short = OutPoint::new(txid(0x7C), 0);
    coins.add_coin_with_script(short, output.value - 1, 900, output.script_pubkey);
    assert!(verify_funding(&contract, &short, &coins).is_err());
}

#[test]
fn contract_output_roundtrip() {
    let (_, contract, _, _) = fixture(1000);
    let output = contract.funding_output();
    assert!(output.script_pubkey.is_p2sh());
    assert!(contract.matches_output(&output));

    let redeem = contract.redeem_script();
    assert!(redeem.len() > 50);
}
