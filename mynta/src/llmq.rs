// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Long-living masternode quorum types and parameters.

use std::fmt;
use std::io;

use hashes::{sha256d, Hash, HashEngine};

use crate::consensus::{encode, Decodable, Encodable};
use crate::hash_types::{QuorumHash, QuorumSignHash, QuorumSigningRequestId};

/// A quorum type. The discriminant is the wire byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum LLMQType {
    /// 50 members, 60% threshold. Signs InstantSend locks.
    Llmqtype50_60 = 1,
    /// 400 members, 60% threshold. Signs ChainLocks.
    Llmqtype400_60 = 2,
    /// 400 members, 85% threshold.
    Llmqtype400_85 = 3,
    /// 100 members, 67% threshold. General purpose.
    Llmqtype100_67 = 4,
    /// 3 members, 51% threshold. Regtest and unit tests only.
    LlmqtypeTest = 100,
}

/// Static parameters of a quorum type.
#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct LLMQParams {
    pub quorum_type: LLMQType,
    pub name: &'static str,
    /// Target member count.
    pub size: u32,
    /// Fewest valid members for the quorum to function.
    pub min_size: u32,
    /// Signing threshold in percent.
    pub threshold: u32,
    /// Blocks between quorum constructions.
    pub dkg_interval: u32,
    /// How many recent quorums of this type stay active for signing.
    pub signing_active_quorum_count: u32,
}

pub const LLMQ_50_60: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype50_60,
    name: "llmq_50_60",
    size: 50,
    min_size: 40,
    threshold: 60,
    dkg_interval: 24,
    signing_active_quorum_count: 24,
};

pub const LLMQ_400_60: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype400_60,
    name: "llmq_400_60",
    size: 400,
    min_size: 300,
    threshold: 60,
    dkg_interval: 288,
    signing_active_quorum_count: 4,
};

pub const LLMQ_400_85: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype400_85,
    name: "llmq_400_85",
    size: 400,
    min_size: 350,
    threshold: 85,
    dkg_interval: 576,
    signing_active_quorum_count: 4,
};

pub const LLMQ_100_67: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype100_67,
    name: "llmq_100_67",
    size: 100,
    min_size: 80,
    threshold: 67,
    dkg_interval: 24,
    signing_active_quorum_count: 24,
};

pub const LLMQ_TEST: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeTest,
    name: "llmq_test",
    size: 3,
    min_size: 2,
    threshold: 51,
    dkg_interval: 24,
    signing_active_quorum_count: 2,
};

impl LLMQType {
    /// All recognized quorum types, the test type included.
    pub const ALL: [LLMQType; 5] = [
        LLMQType::Llmqtype50_60,
        LLMQType::Llmqtype400_60,
        LLMQType::Llmqtype400_85,
        LLMQType::Llmqtype100_67,
        LLMQType::LlmqtypeTest,
    ];

    /// The static parameters of this type.
    pub fn params(&self) -> &'static LLMQParams {
        match self {
            LLMQType::Llmqtype50_60 => &LLMQ_50_60,
            LLMQType::Llmqtype400_60 => &LLMQ_400_60,
            LLMQType::Llmqtype400_85 => &LLMQ_400_85,
            LLMQType::Llmqtype100_67 => &LLMQ_100_67,
            LLMQType::LlmqtypeTest => &LLMQ_TEST,
        }
    }

    /// The signing threshold for a quorum of this type with
    /// `valid_member_count` valid members: ⌈count · threshold% / 100⌉.
    pub fn threshold_for(&self, valid_member_count: u32) -> u32 {
        (valid_member_count * self.params().threshold + 99) / 100
    }
}

impl fmt::Display for LLMQType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.params().name)
    }
}

impl TryFrom<u8> for LLMQType {
    type Error = encode::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(LLMQType::Llmqtype50_60),
            2 => Ok(LLMQType::Llmqtype400_60),
            3 => Ok(LLMQType::Llmqtype400_85),
            4 => Ok(LLMQType::Llmqtype100_67),
            100 => Ok(LLMQType::LlmqtypeTest),
            received => Err(encode::Error::InvalidEnumValue {
                max: 4,
                received: received as u64,
                msg: "LLMQType",
            }),
        }
    }
}

impl Encodable for LLMQType {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        (*self as u8).consensus_encode(w)
    }
}

impl Decodable for LLMQType {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        LLMQType::try_from(u8::consensus_decode(r)?)
    }
}

/// The digest a quorum signs for a request:
/// `sha256d(type ‖ quorum_hash ‖ request_id ‖ msg_hash)`.
pub fn build_sign_hash(
    llmq_type: LLMQType,
    quorum_hash: QuorumHash,
    request_id: QuorumSigningRequestId,
    msg_hash: &[u8; 32],
) -> QuorumSignHash {
    let mut engine = sha256d::Hash::engine();
    engine.input(&[llmq_type as u8]);
    engine.input(&quorum_hash.to_byte_array());
    engine.input(&request_id.to_byte_array());
    engine.input(msg_hash);
    QuorumSignHash::from_raw_hash(sha256d::Hash::from_engine(engine))
}

#[cfg(test)]
mod tests {
    use hashes::Hash;

    use super::*;

    #[test]
    fn params_table_matches_consensus() {
        assert_eq!(LLMQ_50_60.size, 50);
        assert_eq!(LLMQ_50_60.min_size, 40);
        assert_eq!(LLMQ_50_60.dkg_interval, 24);
        assert_eq!(LLMQ_400_60.dkg_interval, 288);
        assert_eq!(LLMQ_400_85.dkg_interval, 576);
        assert_eq!(LLMQ_400_85.threshold, 85);
        assert_eq!(LLMQ_100_67.signing_active_quorum_count, 24);
    }

    #[test]
    fn threshold_rounds_up() {
        // ⌈50·60/100⌉ = 30, ⌈45·60/100⌉ = 27, ⌈41·60/100⌉ = 25.
        assert_eq!(LLMQType::Llmqtype50_60.threshold_for(50), 30);
        assert_eq!(LLMQType::Llmqtype50_60.threshold_for(45), 27);
        assert_eq!(LLMQType::Llmqtype50_60.threshold_for(41), 25);
        assert_eq!(LLMQType::Llmqtype100_67.threshold_for(100), 67);
        assert_eq!(LLMQType::Llmqtype100_67.threshold_for(80), 54);
    }

    #[test]
    fn wire_byte_roundtrip() {
        for llmq_type in LLMQType::ALL {
            let encoded = crate::consensus::serialize(&llmq_type);
            assert_eq!(encoded.len(), 1);
            let decoded: LLMQType = crate::consensus::deserialize(&encoded).unwrap();
            assert_eq!(decoded, llmq_type);
        }
        assert!(crate::consensus::deserialize::<LLMQType>(&[0]).is_err());
    }

    #[test]
    fn sign_hash_binds_every_field() {
        let quorum_hash = QuorumHash::from_byte_array([1; 32]);
        let request_id = QuorumSigningRequestId::from_byte_array([2; 32]);
        let msg = [3u8; 32];

        let base = build_sign_hash(LLMQType::Llmqtype50_60, quorum_hash, request_id, &msg);
        assert_ne!(
            base,
            build_sign_hash(LLMQType::Llmqtype400_60, quorum_hash, request_id, &msg)
        );
        assert_ne!(
            base,
            build_sign_hash(
                LLMQType::Llmqtype50_60,
                QuorumHash::from_byte_array([9; 32]),
                request_id,
                &msg
            )
        );
        assert_ne!(
            base,
            build_sign_hash(LLMQType::Llmqtype50_60, quorum_hash, request_id, &[4u8; 32])
        );
    }
}
