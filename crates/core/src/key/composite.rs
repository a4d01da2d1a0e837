//! Stores a composite index entry: the composite index's storage-id, the
//! encoded component values in index order, and the owning object's
//! identifier.
use crate::enc::varint::{read_uvarint, uvarint};
use crate::enc::{FieldCodec, Reader, Value};
use crate::err::Error;
use crate::key::category::Category;
use crate::key::next_prefix;
use crate::kvs::Key;
use crate::obj::ObjId;
use std::ops::Range;

/// A decoded composite index entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Composite {
	pub index: u32,
	pub values: Vec<Value>,
	pub id: ObjId,
}

impl Composite {
	/// Build the key of a composite index entry from pre-encoded component
	/// bytes in index order.
	pub fn encode_raw(index: u32, values: &[Vec<u8>], id: ObjId) -> Key {
		let mut k = uvarint(index as u64);
		for value in values {
			k.extend_from_slice(value);
		}
		k.extend_from_slice(id.as_bytes());
		k
	}

	/// Decode a composite index entry key using the component codecs in
	/// index order.
	pub fn decode(key: &[u8], codecs: &[FieldCodec]) -> Result<Self, Error> {
		let mut r = Reader::new(key);
		let index = read_uvarint(&mut r)? as u32;
		let mut values = Vec::with_capacity(codecs.len());
		for codec in codecs {
			values.push(codec.decode(&mut r)?);
		}
		let id = ObjId::decode(&mut r)?;
		if r.remaining() > 0 {
			return Err(Error::InconsistentDatabase("trailing bytes in composite key".to_string()));
		}
		Ok(Self {
			index,
			values,
			id,
		})
	}

	pub fn categorise(&self) -> Category {
		Category::CompositeIndex
	}
}

/// The half-open key range holding every entry of one composite index.
pub fn all_range(index: u32) -> Range<Key> {
	let start = uvarint(index as u64);
	let end = next_prefix(&start).unwrap_or_default();
	start..end
}

/// The half-open key range holding the entries whose leading components
/// equal the given pre-encoded bytes.
pub fn prefix_range(index: u32, components: &[Vec<u8>]) -> Range<Key> {
	let mut start = uvarint(index as u64);
	for component in components {
		start.extend_from_slice(component);
	}
	let end = next_prefix(&start).unwrap_or_default();
	start..end
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key() {
		let id = ObjId::from_bytes([0x0a, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44, 0x44]).unwrap();
		let codecs = [FieldCodec::Int32, FieldCodec::Reference];
		let values = [
			codecs[0].encoded(&Value::I32(666)).unwrap(),
			codecs[1].encoded(&Value::Ref(id)).unwrap(),
		];
		let enc = Composite::encode_raw(20, &values, id);
		let dec = Composite::decode(&enc, &codecs).unwrap();
		assert_eq!(dec.index, 20);
		assert_eq!(dec.values, vec![Value::I32(666), Value::Ref(id)]);
		assert_eq!(dec.id, id);
	}

	#[test]
	fn ranges() {
		let rng = all_range(20);
		assert_eq!(rng.start, vec![0x14]);
		assert_eq!(rng.end, vec![0x15]);
		let first = FieldCodec::Int32.encoded(&Value::I32(666)).unwrap();
		let rng = prefix_range(20, std::slice::from_ref(&first));
		assert_eq!(rng.start, [&[0x14u8][..], &first].concat());
	}
}
