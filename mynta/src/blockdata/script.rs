// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Mynta scripts.
//!
//! The subset of Script the service layer needs: building standard payout
//! scripts, P2SH wrapping, and walking data pushes out of a scriptSig.

use std::{fmt, io};

use hashes::{hash160, Hash};

use crate::consensus::{Decodable, Encodable};
use crate::hash_types::{PubkeyHash, ScriptHash};

/// Script opcodes used by this library.
pub mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1: u8 = 0x51;
    pub const OP_IF: u8 = 0x63;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;

    /// `OP_TRUE` is an alias of `OP_1`.
    pub const OP_TRUE: u8 = OP_1;
    /// `OP_FALSE` is an alias of `OP_0`.
    pub const OP_FALSE: u8 = OP_0;
}

use opcodes::*;

/// An owned script.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScriptBuf(pub Vec<u8>);

/// One parsed script item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction<'a> {
    /// A data push.
    PushBytes(&'a [u8]),
    /// Any non-push opcode.
    Op(u8),
}

impl ScriptBuf {
    /// An empty script.
    pub fn new() -> Self {
        ScriptBuf(Vec::new())
    }

    /// Wraps raw script bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ScriptBuf(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Script length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the script is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A standard pay-to-pubkey-hash script.
    pub fn new_p2pkh(pubkey_hash: &PubkeyHash) -> Self {
        let mut script = ScriptBuf::new();
        script.push_opcode(OP_DUP);
        script.push_opcode(OP_HASH160);
        script.push_slice(&pubkey_hash.to_byte_array());
        script.push_opcode(OP_EQUALVERIFY);
        script.push_opcode(OP_CHECKSIG);
        script
    }

    /// A standard pay-to-script-hash script.
    pub fn new_p2sh(script_hash: &ScriptHash) -> Self {
        let mut script = ScriptBuf::new();
        script.push_opcode(OP_HASH160);
        script.push_slice(&script_hash.to_byte_array());
        script.push_opcode(OP_EQUAL);
        script
    }

    /// The HASH160 of this script, as committed in a P2SH output.
    pub fn script_hash(&self) -> ScriptHash {
        ScriptHash::from_raw_hash(hash160::Hash::hash(&self.0))
    }

    /// Whether this is a canonical P2PKH script.
    pub fn is_p2pkh(&self) -> bool {
        self.0.len() == 25
            && self.0[0] == OP_DUP
            && self.0[1] == OP_HASH160
            && self.0[2] == 20
            && self.0[23] == OP_EQUALVERIFY
            && self.0[24] == OP_CHECKSIG
    }

    /// Whether this is a canonical P2SH script.
    pub fn is_p2sh(&self) -> bool {
        self.0.len() == 23 && self.0[0] == OP_HASH160 && self.0[1] == 20 && self.0[22] == OP_EQUAL
    }

    /// For a P2PKH script, the committed pubkey hash.
    pub fn p2pkh_pubkey_hash(&self) -> Option<PubkeyHash> {
        if self.is_p2pkh() {
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&self.0[3..23]);
            Some(PubkeyHash::from_byte_array(bytes))
        } else {
            None
        }
    }

    /// Appends a bare opcode.
    pub fn push_opcode(&mut self, opcode: u8) {
        self.0.push(opcode);
    }

    /// Appends a minimally encoded data push.
    pub fn push_slice(&mut self, data: &[u8]) {
        match data.len() {
            0 => self.0.push(OP_0),
            len @ 1..=0x4b => {
                self.0.push(len as u8);
                self.0.extend_from_slice(data);
            }
            len @ 0x4c..=0xff => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(len as u8);
                self.0.extend_from_slice(data);
            }
            len @ 0x100..=0xffff => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(len as u16).to_le_bytes());
                self.0.extend_from_slice(data);
            }
            len => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(len as u32).to_le_bytes());
                self.0.extend_from_slice(data);
            }
        }
    }

    /// Appends a number encoded as a minimal CScriptNum push.
    pub fn push_int(&mut self, value: i64) {
        if value == 0 {
            self.0.push(OP_0);
        } else if value == -1 || (1..=16).contains(&value) {
            self.0.push((value + (OP_1 as i64 - 1)) as u8);
        } else {
            self.push_slice(&script_num_encode(value));
        }
    }

    /// Iterates over the script's instructions. Malformed pushes terminate
    /// the iterator with `None` for the remainder.
    pub fn instructions(&self) -> Instructions {
        Instructions { data: &self.0 }
    }

    /// All data pushes, in order.
    pub fn push_data(&self) -> Vec<&[u8]> {
        self.instructions()
            .filter_map(|instruction| match instruction {
                Instruction::PushBytes(bytes) => Some(bytes),
                Instruction::Op(_) => None,
            })
            .collect()
    }
}

/// Iterator over script instructions.
pub struct Instructions<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Instruction<'a>> {
        let (&opcode, rest) = self.data.split_first()?;
        match opcode {
            0x01..=0x4b => {
                let len = opcode as usize;
                if rest.len() < len {
                    self.data = &[];
                    return None;
                }
                self.data = &rest[len..];
                Some(Instruction::PushBytes(&rest[..len]))
            }
            OP_PUSHDATA1 => {
                let (&len, rest) = rest.split_first()?;
                let len = len as usize;
                if rest.len() < len {
                    self.data = &[];
                    return None;
                }
                self.data = &rest[len..];
                Some(Instruction::PushBytes(&rest[..len]))
            }
            OP_PUSHDATA2 => {
                if rest.len() < 2 {
                    self.data = &[];
                    return None;
                }
                let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
                let rest = &rest[2..];
                if rest.len() < len {
                    self.data = &[];
                    return None;
                }
                self.data = &rest[len..];
                Some(Instruction::PushBytes(&rest[..len]))
            }
            OP_PUSHDATA4 => {
                if rest.len() < 4 {
                    self.data = &[];
                    return None;
                }
                let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
                let rest = &rest[4..];
                if rest.len() < len {
                    self.data = &[];
                    return None;
                }
                self.data = &rest[len..];
                Some(Instruction::PushBytes(&rest[..len]))
            }
            op => {
                self.data = rest;
                Some(Instruction::Op(op))
            }
        }
    }
}

/// Minimal CScriptNum encoding of `value`.
fn script_num_encode(value: i64) -> Vec<u8> {
    let mut result = Vec::new();
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    while abs > 0 {
        result.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // The most significant bit carries the sign; pad when the value needs it.
    if let Some(&last) = result.last() {
        if last & 0x80 != 0 {
            result.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            let idx = result.len() - 1;
            result[idx] |= 0x80;
        }
    }
    result
}

impl fmt::Debug for ScriptBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Script(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl Encodable for ScriptBuf {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        self.0.consensus_encode(w)
    }
}

impl Decodable for ScriptBuf {
    fn consensus_decode<R: io::Read + ?Sized>(
        r: &mut R,
    ) -> Result<Self, crate::consensus::encode::Error> {
        Ok(ScriptBuf(Decodable::consensus_decode(r)?))
    }
}
