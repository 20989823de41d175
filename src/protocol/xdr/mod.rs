//! XDR (External Data Representation, RFC 4506) serialization for the wire
//! protocols spoken by this server.
//!
//! All on-wire data structures implement the [`Serialize`] and [`Deserialize`]
//! traits. Composite types are wired up with the `SerializeStruct!`,
//! `DeserializeStruct!`, `SerializeEnum!`, `DeserializeEnum!` and
//! `*BoolUnion!` macros so that field order stays declared in exactly one
//! place.
//!
//! Every variable-length decode goes through [`read_opaque_max`], which
//! validates the length prefix against a caller-supplied cap *before*
//! allocating. A length over the cap fails with `InvalidData`, which the RPC
//! dispatcher maps to GARBAGE_ARGS.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub mod mount;
pub mod nfs3;
pub mod rpc;

/// Byte order used by XDR: big endian.
pub type XdrEndian = BigEndian;

/// Hard ceiling for any variable-length XDR field this server will decode.
/// The negotiated READ/WRITE transfer size is validated separately by the
/// procedure handlers; nothing on the wire may exceed this.
pub const MAX_OPAQUE_LEN: u32 = 1 << 20;

/// Serializes a value into an XDR byte stream.
pub trait Serialize {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

/// Deserializes a value from an XDR byte stream in place.
pub trait Deserialize: Default {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Reads a complete value of type `T` from the stream.
pub fn deserialize<T: Deserialize>(src: &mut impl Read) -> std::io::Result<T> {
    let mut value = T::default();
    value.deserialize(src)?;
    Ok(value)
}

pub(crate) fn invalid_data(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.into())
}

/// Number of zero bytes needed to pad `len` to the 4-byte XDR boundary.
pub(crate) fn pad_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Reads a length-prefixed opaque field, refusing any length above `max`
/// before a single byte of payload is allocated or consumed.
pub fn read_opaque_max<R: Read>(src: &mut R, max: u32) -> std::io::Result<Vec<u8>> {
    let length = src.read_u32::<XdrEndian>()?;
    if length > max {
        return Err(invalid_data(format!("opaque length {length} exceeds cap {max}")));
    }
    let mut data = vec![0_u8; length as usize];
    src.read_exact(&mut data)?;
    let mut pad = [0_u8; 4];
    src.read_exact(&mut pad[..pad_len(length as usize)])?;
    Ok(data)
}

/// Writes a length-prefixed opaque field with zero padding.
pub fn write_opaque<W: Write>(dest: &mut W, data: &[u8]) -> std::io::Result<()> {
    dest.write_u32::<XdrEndian>(data.len() as u32)?;
    dest.write_all(data)?;
    let zeros = [0_u8; 4];
    dest.write_all(&zeros[..pad_len(data.len())])
}

/// Void: zero bytes on the wire. Used for procedures without arguments.
impl Serialize for () {
    fn serialize<W: Write>(&self, _dest: &mut W) -> std::io::Result<()> {
        Ok(())
    }
}

impl Deserialize for () {
    fn deserialize<R: Read>(&mut self, _src: &mut R) -> std::io::Result<()> {
        Ok(())
    }
}

impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XdrEndian>(u32::from(*self))
    }
}

impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XdrEndian>()? > 0;
        Ok(())
    }
}

impl Serialize for i32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i32::<XdrEndian>(*self)
    }
}

impl Deserialize for i32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i32::<XdrEndian>()?;
        Ok(())
    }
}

impl Serialize for i64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i64::<XdrEndian>(*self)
    }
}

impl Deserialize for i64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i64::<XdrEndian>()?;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XdrEndian>(*self)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XdrEndian>()?;
        Ok(())
    }
}

impl Serialize for u64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u64::<XdrEndian>(*self)
    }
}

impl Deserialize for u64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u64::<XdrEndian>()?;
        Ok(())
    }
}

/// Fixed-size opaque data: raw bytes, no length prefix. All fixed widths used
/// by NFSv3 (verifiers, cookies) are multiples of four, so no padding.
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_all(self)
    }
}

impl<const N: usize> Deserialize for [u8; N]
where
    [u8; N]: Default,
{
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        src.read_exact(self)
    }
}

/// Variable-length opaque data, bounded by [`MAX_OPAQUE_LEN`]. Types with
/// tighter protocol limits (file names, paths, file handles, credential
/// bodies) wrap this with their own caps.
impl Serialize for Vec<u8> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        write_opaque(dest, self)
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = read_opaque_max(src, MAX_OPAQUE_LEN)?;
        Ok(())
    }
}

/// Element cap for counted arrays of 32-bit words (auth flavor lists, gid
/// lists); keeps a hostile length prefix from forcing a large allocation.
const MAX_U32_ARRAY_LEN: u32 = 4096;

impl Serialize for Vec<u32> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        (self.len() as u32).serialize(dest)?;
        for word in self {
            word.serialize(dest)?;
        }
        Ok(())
    }
}

impl Deserialize for Vec<u32> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = src.read_u32::<XdrEndian>()?;
        if length > MAX_U32_ARRAY_LEN {
            return Err(invalid_data(format!("u32 array length {length} exceeds cap")));
        }
        self.clear();
        self.reserve(length as usize);
        for _ in 0..length {
            self.push(src.read_u32::<XdrEndian>()?);
        }
        Ok(())
    }
}

/// Implements [`Serialize`] for a struct by serializing each field in order.
#[macro_export]
macro_rules! SerializeStruct {
    ($t:ident, $($field:ident),* $(,)?) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $(self.$field.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Deserialize`] for a struct by deserializing each field in order.
#[macro_export]
macro_rules! DeserializeStruct {
    ($t:ident, $($field:ident),* $(,)?) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$field.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Serialize`] for a `#[repr(u32)]` fieldless enum.
#[macro_export]
macro_rules! SerializeEnum {
    ($t:ident) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                (*self as u32).serialize(dest)
            }
        }
    };
}

/// Implements [`Deserialize`] for a `#[repr(u32)]` fieldless enum via
/// `FromPrimitive`; an unknown discriminant is an `InvalidData` error.
#[macro_export]
macro_rules! DeserializeEnum {
    ($t:ident) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                let raw = $crate::protocol::xdr::deserialize::<u32>(src)?;
                match FromPrimitive::from_u32(raw) {
                    Some(value) => {
                        *self = value;
                        Ok(())
                    }
                    None => Err($crate::protocol::xdr::invalid_data(format!(
                        "invalid discriminant {} for {}",
                        raw,
                        stringify!($t)
                    ))),
                }
            }
        }
    };
}

/// Implements XDR for a two-armed union discriminated by a boolean: a `Void`
/// arm and a single value-carrying arm (`post_op_attr` and friends).
#[macro_export]
macro_rules! SerializeBoolUnion {
    ($t:ident, $case:ident, $case_type:ty) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                match self {
                    $t::Void => false.serialize(dest),
                    $t::$case(v) => {
                        true.serialize(dest)?;
                        v.serialize(dest)
                    }
                }
            }
        }
    };
}

/// Deserializing counterpart of `SerializeBoolUnion!`.
#[macro_export]
macro_rules! DeserializeBoolUnion {
    ($t:ident, $case:ident, $case_type:ty) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                let follows = $crate::protocol::xdr::deserialize::<bool>(src)?;
                if follows {
                    let mut value = <$case_type>::default();
                    value.deserialize(src)?;
                    *self = $t::$case(value);
                } else {
                    *self = $t::Void;
                }
                Ok(())
            }
        }
    };
}

pub use crate::{
    DeserializeBoolUnion, DeserializeEnum, DeserializeStruct, SerializeBoolUnion, SerializeEnum,
    SerializeStruct,
};
