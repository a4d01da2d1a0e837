//! Stores an object's meta record and its field content.
use crate::enc::varint::{read_uvarint, uvarint, write_uvarint};
use crate::enc::Reader;
use crate::err::Error;
use crate::key::category::Category;
use crate::key::next_prefix;
use crate::kvs::Key;
use crate::obj::ObjId;
use std::ops::Range;

/// The meta key of an object: the identifier's own bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Obj {
	pub id: ObjId,
}

impl Obj {
	pub fn new(id: ObjId) -> Self {
		Self {
			id,
		}
	}

	pub fn encode(&self) -> Key {
		self.id.as_bytes().to_vec()
	}

	pub fn decode(key: &[u8]) -> Result<Self, Error> {
		Ok(Self {
			id: ObjId::from_slice(key)?,
		})
	}

	pub fn categorise(&self) -> Category {
		Category::ObjectMeta
	}
}

/// The key of a simple or counter field value, and the common prefix of a
/// complex field's sub-tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
	pub id: ObjId,
	pub field: u32,
}

impl Field {
	pub fn new(id: ObjId, field: u32) -> Self {
		Self {
			id,
			field,
		}
	}

	pub fn encode(&self) -> Key {
		let mut k = self.id.as_bytes().to_vec();
		write_uvarint(&mut k, self.field as u64);
		k
	}

	pub fn decode(key: &[u8]) -> Result<Self, Error> {
		let mut r = Reader::new(key);
		let id = ObjId::decode(&mut r)?;
		let field = read_uvarint(&mut r)? as u32;
		if r.remaining() > 0 {
			return Err(Error::InconsistentDatabase("trailing bytes in field key".to_string()));
		}
		Ok(Self {
			id,
			field,
		})
	}

	pub fn categorise(&self) -> Category {
		Category::ObjectField
	}
}

/// The key of one element of a complex field: the field prefix followed by
/// the element's suffix bytes (an encoded set element, a list position as
/// fixed 8-byte big-endian, or an encoded map key).
pub fn elem(id: ObjId, field: u32, suffix: &[u8]) -> Key {
	let mut k = Field::new(id, field).encode();
	k.extend_from_slice(suffix);
	k
}

/// The key of one list element at the given position.
pub fn list_elem(id: ObjId, field: u32, position: u64) -> Key {
	let mut k = Field::new(id, field).encode();
	k.extend_from_slice(&position.to_be_bytes());
	k
}

/// The half-open key range holding an object's entire footprint in the
/// object region: its meta record and every field.
pub fn obj_range(id: ObjId) -> Range<Key> {
	let start = id.as_bytes().to_vec();
	// An object id never ends the keyspace: its lead byte is below 0xfc
	let end = next_prefix(id.as_bytes()).unwrap_or_default();
	start..end
}

/// The half-open key range holding a complex field's sub-tree.
pub fn field_range(id: ObjId, field: u32) -> Range<Key> {
	let start = Field::new(id, field).encode();
	let end = next_prefix(&start).unwrap_or_default();
	start..end
}

/// The half-open key range holding every object of one type.
pub fn type_range(type_id: u32) -> Range<Key> {
	let start = uvarint(type_id as u64);
	let end = next_prefix(&start).unwrap_or_default();
	start..end
}
