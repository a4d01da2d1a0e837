//! The object engine: object identity, meta-data, creation and deletion,
//! field access, live complex-field views, migration, and copying.

pub mod copy;
pub mod counter;
pub mod create;
pub mod delete;
pub mod list;
pub mod map;
pub mod migrate;
pub mod refs;
pub mod set;
pub mod simple;

use crate::cnf::{MAX_STORAGE_ID, OBJ_ID_LENGTH};
use crate::enc::varint::{read_uvarint, uvarint, write_uvarint};
use crate::enc::Reader;
use crate::err::Error;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed 8-byte object identifier. The leading bytes are the
/// variable-length encoding of the object-type storage-id; the remainder is
/// random. The identifier's bytes are also its canonical key prefix in the
/// underlying store, so objects of one type sort together.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjId([u8; OBJ_ID_LENGTH]);

impl ObjId {
	/// Construct an identifier from its raw bytes, validating the leading
	/// type storage-id.
	pub fn from_bytes(bytes: [u8; OBJ_ID_LENGTH]) -> Result<Self, Error> {
		let id = Self(bytes);
		id.type_id()?;
		Ok(id)
	}

	/// Construct an identifier from a slice of exactly 8 bytes.
	pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
		let bytes: [u8; OBJ_ID_LENGTH] = bytes.try_into().map_err(|_| {
			Error::InconsistentDatabase(format!("invalid object id length {}", bytes.len()))
		})?;
		Self::from_bytes(bytes)
	}

	/// Generate a fresh identifier of the given type with a random suffix.
	pub fn generate(type_id: u32) -> Result<Self, Error> {
		let prefix = uvarint(type_id as u64);
		if type_id == 0 || type_id > MAX_STORAGE_ID || prefix.len() >= OBJ_ID_LENGTH {
			return Err(Error::UnknownType(type_id));
		}
		let mut bytes = [0u8; OBJ_ID_LENGTH];
		bytes[..prefix.len()].copy_from_slice(&prefix);
		rand::thread_rng().fill(&mut bytes[prefix.len()..]);
		Ok(Self(bytes))
	}

	/// The object-type storage-id encoded in the leading bytes.
	pub fn type_id(&self) -> Result<u32, Error> {
		let mut r = Reader::new(&self.0);
		let sid = read_uvarint(&mut r)
			.map_err(|_| Error::InconsistentDatabase(format!("invalid object id {self}")))?;
		if sid == 0 || sid > MAX_STORAGE_ID as u64 {
			return Err(Error::InconsistentDatabase(format!("invalid object id {self}")));
		}
		Ok(sid as u32)
	}

	/// The identifier's raw bytes.
	pub fn as_bytes(&self) -> &[u8; OBJ_ID_LENGTH] {
		&self.0
	}

	/// Decode an identifier from a reader, consuming exactly 8 bytes.
	pub fn decode(r: &mut Reader) -> Result<Self, Error> {
		Self::from_slice(r.read_n(OBJ_ID_LENGTH)?)
	}
}

impl fmt::Display for ObjId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for b in self.0 {
			write!(f, "{b:02x}")?;
		}
		Ok(())
	}
}

impl fmt::Debug for ObjId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

/// The meta-data recorded for every object: its type, the schema version it
/// was created or last migrated at, and whether delete listeners have
/// already been notified for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjInfo {
	pub type_id: u32,
	pub version: u32,
	pub delete_notified: bool,
}

/// The flags bit marking an object as delete-notified.
const FLAG_DELETE_NOTIFIED: u8 = 0x80;

impl ObjInfo {
	/// Encode the object meta value: one flags byte followed by the schema
	/// version.
	pub fn encode(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(6);
		buf.push(if self.delete_notified {
			FLAG_DELETE_NOTIFIED
		} else {
			0x00
		});
		write_uvarint(&mut buf, self.version as u64);
		buf
	}

	/// Decode an object meta value for the given identifier.
	pub fn decode(id: ObjId, val: &[u8]) -> Result<Self, Error> {
		let mut r = Reader::new(val);
		let flags = r.read_u8()?;
		if flags & !FLAG_DELETE_NOTIFIED != 0 {
			return Err(Error::InconsistentDatabase(format!(
				"invalid meta flags {flags:#04x} for object {id}"
			)));
		}
		let version = read_uvarint(&mut r)?;
		if r.remaining() > 0 {
			return Err(Error::InconsistentDatabase(format!(
				"trailing bytes in meta value for object {id}"
			)));
		}
		Ok(Self {
			type_id: id.type_id()?,
			version: version as u32,
			delete_notified: flags & FLAG_DELETE_NOTIFIED != 0,
		})
	}
}
