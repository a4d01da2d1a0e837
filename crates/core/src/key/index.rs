//! Stores a simple or sub-field index entry: the indexed field's storage-id,
//! the encoded value, the owning object's identifier, and — for list and map
//! value sub-fields — a discriminator revealing where the value sits.
use crate::enc::varint::{read_uvarint, uvarint, write_uvarint};
use crate::enc::{FieldCodec, Reader, Value};
use crate::err::Error;
use crate::key::category::Category;
use crate::key::next_prefix;
use crate::kvs::Key;
use crate::obj::ObjId;
use std::ops::Range;

/// A decoded index entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
	pub field: u32,
	pub value: Value,
	pub id: ObjId,
	pub disc: Option<Value>,
}

impl Index {
	/// Build the key of an index entry from pre-encoded value bytes.
	pub fn encode_raw(field: u32, value: &[u8], id: ObjId, disc: &[u8]) -> Key {
		let mut k = uvarint(field as u64);
		k.extend_from_slice(value);
		k.extend_from_slice(id.as_bytes());
		k.extend_from_slice(disc);
		k
	}

	/// Decode an index entry key. The discriminator codec distinguishes the
	/// three entry shapes: `None` for simple and set-element indexes,
	/// `Some(codec)` for list positions and map keys.
	pub fn decode(key: &[u8], codec: &FieldCodec, disc: Option<&FieldCodec>) -> Result<Self, Error> {
		let mut r = Reader::new(key);
		let field = read_uvarint(&mut r)? as u32;
		let value = codec.decode(&mut r)?;
		let id = ObjId::decode(&mut r)?;
		let disc = match disc {
			Some(codec) => Some(codec.decode(&mut r)?),
			None => None,
		};
		if r.remaining() > 0 {
			return Err(Error::InconsistentDatabase("trailing bytes in index key".to_string()));
		}
		Ok(Self {
			field,
			value,
			id,
			disc,
		})
	}

	pub fn categorise(&self) -> Category {
		Category::FieldIndex
	}
}

/// The half-open key range holding every entry of one index.
pub fn all_range(field: u32) -> Range<Key> {
	let start = uvarint(field as u64);
	let end = next_prefix(&start).unwrap_or_default();
	start..end
}

/// The half-open key range holding the entries of one index carrying a
/// specific encoded value.
pub fn value_range(field: u32, value: &[u8]) -> Range<Key> {
	let mut start = uvarint(field as u64);
	start.extend_from_slice(value);
	let end = next_prefix(&start).unwrap_or_default();
	start..end
}

/// Append one slot's encoded bytes to a key prefix under construction.
pub fn push_slot(prefix: &mut Key, slot: &[u8]) {
	prefix.extend_from_slice(slot);
}

/// The position of the value bytes inside an entry of one index: everything
/// between the storage-id and the object identifier.
pub fn value_bytes<'a>(key: &'a [u8], codec: &FieldCodec) -> Result<&'a [u8], Error> {
	let mut r = Reader::new(key);
	read_uvarint(&mut r)?;
	let start = r.position();
	codec.skip(&mut r)?;
	Ok(&key[start..r.position()])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key() {
		let id = ObjId::from_bytes([0x0a, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22]).unwrap();
		let codec = FieldCodec::Int32;
		let value = codec.encoded(&Value::I32(555)).unwrap();
		let enc = Index::encode_raw(11, &value, id, &[]);
		assert_eq!(enc, b"\x0b\xc1\x01\xeb\x0a\x22\x22\x22\x22\x22\x22\x22");
		let dec = Index::decode(&enc, &codec, None).unwrap();
		assert_eq!(
			dec,
			Index {
				field: 11,
				value: Value::I32(555),
				id,
				disc: None,
			}
		);
	}

	#[test]
	fn key_with_discriminator() {
		let id = ObjId::from_bytes([0x0a, 0x33, 0x33, 0x33, 0x33, 0x33, 0x33, 0x33]).unwrap();
		let codec = FieldCodec::String;
		let disc = FieldCodec::UInt64;
		let value = codec.encoded(&Value::String("x".to_string())).unwrap();
		let pos = disc.encoded(&Value::U64(3)).unwrap();
		let enc = Index::encode_raw(42, &value, id, &pos);
		let dec = Index::decode(&enc, &codec, Some(&disc)).unwrap();
		assert_eq!(dec.disc, Some(Value::U64(3)));
		assert_eq!(dec.value, Value::String("x".to_string()));
	}

	#[test]
	fn ranges() {
		let rng = all_range(11);
		assert_eq!(rng.start, vec![0x0b]);
		assert_eq!(rng.end, vec![0x0c]);
		let value = FieldCodec::Int32.encoded(&Value::I32(0)).unwrap();
		let rng = value_range(11, &value);
		assert_eq!(rng.start, vec![0x0b, 0x80]);
		assert_eq!(rng.end, vec![0x0b, 0x81]);
	}
}
