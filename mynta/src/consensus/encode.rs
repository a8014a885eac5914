// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Consensus-encodable types and the encoding machinery.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::{error, fmt, io};

use hashes::{hash160, sha256, sha256d, Hash, HashEngine};

/// The maximum allocation we accept while decoding a length-prefixed vector,
/// to keep a malformed length prefix from exhausting memory.
pub const MAX_VEC_SIZE: usize = 4_000_000;

/// Encoding error.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(io::Error),
    /// A length prefix requested an unreasonable allocation.
    OversizedVectorAllocation {
        /// The requested allocation.
        requested: usize,
        /// The maximum allowed.
        max: usize,
    },
    /// A discriminant did not match any known variant.
    InvalidEnumValue {
        /// Largest admissible value.
        max: u64,
        /// The value found on the wire.
        received: u64,
        /// Which enum was being decoded.
        msg: &'static str,
    },
    /// Parsing failed with a static description.
    ParseFailed(&'static str),
    /// A compact-size integer was not minimally encoded.
    NonMinimalVarInt,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "IO error: {}", e),
            Error::OversizedVectorAllocation { requested, max } => {
                write!(f, "oversized vector allocation: requested {}, max {}", requested, max)
            }
            Error::InvalidEnumValue { max, received, msg } => {
                write!(f, "invalid enum value {} (max {}) while decoding {}", received, max, msg)
            }
            Error::ParseFailed(s) => write!(f, "parse failed: {}", s),
            Error::NonMinimalVarInt => write!(f, "non-minimal compact-size integer"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Data which can be encoded in a consensus-consistent way.
pub trait Encodable {
    /// Encodes the object into `writer`, returning the number of bytes written.
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error>;
}

/// Data which can be decoded in a consensus-consistent way.
pub trait Decodable: Sized {
    /// Decodes an object from `reader`.
    fn consensus_decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error>;
}

/// Adapts a hash engine into an [`io::Write`] sink, so values can be
/// consensus-encoded straight into a digest.
pub struct HashWriter<'a, E: HashEngine>(pub &'a mut E);

impl<'a, E: HashEngine> io::Write for HashWriter<'a, E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.input(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encodes an object into a fresh byte vector.
pub fn serialize<T: Encodable + ?Sized>(data: &T) -> Vec<u8> {
    let mut encoder = Vec::new();
    let len = data.consensus_encode(&mut encoder).expect("in-memory writers don't error");
    debug_assert_eq!(len, encoder.len());
    encoder
}

/// Decodes an object from a byte slice, requiring the whole slice to be consumed.
pub fn deserialize<T: Decodable>(data: &[u8]) -> Result<T, Error> {
    let (rv, consumed) = deserialize_partial(data)?;
    if consumed == data.len() {
        Ok(rv)
    } else {
        Err(Error::ParseFailed("data not consumed entirely when explicitly deserializing"))
    }
}

/// Decodes an object from a byte slice, returning the number of bytes consumed.
pub fn deserialize_partial<T: Decodable>(data: &[u8]) -> Result<(T, usize), Error> {
    let mut decoder = data;
    let before = decoder.len();
    let rv = T::consensus_decode(&mut decoder)?;
    Ok((rv, before - decoder.len()))
}

/// A variable-length unsigned integer (Satoshi-style compact size).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarInt(pub u64);

impl VarInt {
    /// The number of bytes this varint occupies on the wire.
    pub fn len(&self) -> usize {
        match self.0 {
            0..=0xFC => 1,
            0xFD..=0xFFFF => 3,
            0x10000..=0xFFFFFFFF => 5,
            _ => 9,
        }
    }
}

impl Encodable for VarInt {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        match self.0 {
            0..=0xFC => {
                (self.0 as u8).consensus_encode(w)?;
                Ok(1)
            }
            0xFD..=0xFFFF => {
                w.write_all(&[0xFD])?;
                (self.0 as u16).consensus_encode(w)?;
                Ok(3)
            }
            0x10000..=0xFFFFFFFF => {
                w.write_all(&[0xFE])?;
                (self.0 as u32).consensus_encode(w)?;
                Ok(5)
            }
            _ => {
                w.write_all(&[0xFF])?;
                self.0.consensus_encode(w)?;
                Ok(9)
            }
        }
    }
}

impl Decodable for VarInt {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let n = u8::consensus_decode(r)?;
        match n {
            0xFF => {
                let x = u64::consensus_decode(r)?;
                if x < 0x100000000 {
                    Err(Error::NonMinimalVarInt)
                } else {
                    Ok(VarInt(x))
                }
            }
            0xFE => {
                let x = u32::consensus_decode(r)?;
                if x < 0x10000 {
                    Err(Error::NonMinimalVarInt)
                } else {
                    Ok(VarInt(x as u64))
                }
            }
            0xFD => {
                let x = u16::consensus_decode(r)?;
                if x < 0xFD {
                    Err(Error::NonMinimalVarInt)
                } else {
                    Ok(VarInt(x as u64))
                }
            }
            n => Ok(VarInt(n as u64)),
        }
    }
}

macro_rules! impl_int_encodable {
    ($ty:ident, $size:expr) => {
        impl Encodable for $ty {
            #[inline]
            fn consensus_encode<W: io::Write + ?Sized>(
                &self,
                w: &mut W,
            ) -> Result<usize, io::Error> {
                w.write_all(&self.to_le_bytes())?;
                Ok($size)
            }
        }

        impl Decodable for $ty {
            #[inline]
            fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
                let mut buf = [0u8; $size];
                r.read_exact(&mut buf)?;
                Ok(<$ty>::from_le_bytes(buf))
            }
        }
    };
}

impl_int_encodable!(u8, 1);
impl_int_encodable!(u16, 2);
impl_int_encodable!(u32, 4);
impl_int_encodable!(u64, 8);
impl_int_encodable!(i8, 1);
impl_int_encodable!(i16, 2);
impl_int_encodable!(i32, 4);
impl_int_encodable!(i64, 8);

impl Encodable for bool {
    #[inline]
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        w.write_all(&[*self as u8])?;
        Ok(1)
    }
}

impl Decodable for bool {
    #[inline]
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        Ok(u8::consensus_decode(r)? != 0)
    }
}

impl Encodable for String {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let bytes = self.as_bytes();
        let len = VarInt(bytes.len() as u64).consensus_encode(w)?;
        w.write_all(bytes)?;
        Ok(len + bytes.len())
    }
}

impl Decodable for String {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        String::from_utf8(Vec::<u8>::consensus_decode(r)?)
            .map_err(|_| Error::ParseFailed("invalid utf-8 in string"))
    }
}

macro_rules! impl_array_encodable {
    ($size:expr) => {
        impl Encodable for [u8; $size] {
            #[inline]
            fn consensus_encode<W: io::Write + ?Sized>(
                &self,
                w: &mut W,
            ) -> Result<usize, io::Error> {
                w.write_all(self)?;
                Ok($size)
            }
        }

        impl Decodable for [u8; $size] {
            #[inline]
            fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
                let mut buf = [0u8; $size];
                r.read_exact(&mut buf)?;
                Ok(buf)
            }
        }
    };
}

impl_array_encodable!(16);
impl_array_encodable!(20);
impl_array_encodable!(32);
impl_array_encodable!(48);
impl_array_encodable!(96);

macro_rules! impl_hash_encodable {
    ($ty:path) => {
        impl Encodable for $ty {
            fn consensus_encode<W: io::Write + ?Sized>(
                &self,
                w: &mut W,
            ) -> Result<usize, io::Error> {
                self.to_byte_array().consensus_encode(w)
            }
        }

        impl Decodable for $ty {
            fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
                Ok(<$ty>::from_byte_array(Decodable::consensus_decode(r)?))
            }
        }
    };
}

impl_hash_encodable!(sha256::Hash);
impl_hash_encodable!(sha256d::Hash);
impl_hash_encodable!(hash160::Hash);

impl<T: Encodable> Encodable for Vec<T> {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = VarInt(self.len() as u64).consensus_encode(w)?;
        for item in self {
            len += item.consensus_encode(w)?;
        }
        Ok(len)
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let count = VarInt::consensus_decode(r)?.0 as usize;
        // Each element takes at least one byte on the wire.
        if count > MAX_VEC_SIZE {
            return Err(Error::OversizedVectorAllocation { requested: count, max: MAX_VEC_SIZE });
        }
        let mut ret = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ret.push(T::consensus_decode(r)?);
        }
        Ok(ret)
    }
}

/// Service addresses travel as a 16-byte IPv6-mapped address followed by a
/// big-endian port, the netaddr layout shared with the rest of the ecosystem.
impl Encodable for SocketAddr {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let octets = match self.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        w.write_all(&octets)?;
        w.write_all(&self.port().to_be_bytes())?;
        Ok(18)
    }
}

impl Decodable for SocketAddr {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let mut octets = [0u8; 16];
        r.read_exact(&mut octets)?;
        let mut port = [0u8; 2];
        r.read_exact(&mut port)?;
        let v6 = Ipv6Addr::from(octets);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        Ok(SocketAddr::new(ip, u16::from_be_bytes(port)))
    }
}
