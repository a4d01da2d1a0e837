//! The field-type registry: maps textual encoding identifiers to codecs.
//! Base primitive encodings are pre-registered; applications may add their
//! own string-backed encodings. Identifiers compose structurally: a trailing
//! `[]` derives the array encoding and a trailing `?` the null-safe wrapper,
//! applied recursively, so `int32[][]` and `string?` need no registration.

use super::FieldCodec;
use crate::err::Error;
use std::collections::BTreeMap;

/// A catalog of named field encodings.
#[derive(Clone, Debug)]
pub struct EncodingRegistry {
	codecs: BTreeMap<String, FieldCodec>,
}

impl Default for EncodingRegistry {
	fn default() -> Self {
		let mut codecs = BTreeMap::new();
		for (id, codec) in [
			("bool", FieldCodec::Bool),
			("int8", FieldCodec::Int8),
			("int16", FieldCodec::Int16),
			("int32", FieldCodec::Int32),
			("int64", FieldCodec::Int64),
			("uint8", FieldCodec::UInt8),
			("uint16", FieldCodec::UInt16),
			("uint64", FieldCodec::UInt64),
			("char", FieldCodec::Char),
			("float32", FieldCodec::Float32),
			("float64", FieldCodec::Float64),
			("string", FieldCodec::String),
			("bytes", FieldCodec::Bytes),
			("reference", FieldCodec::Reference),
			// Common string-backed identifiers
			("uuid", FieldCodec::String),
			("uri", FieldCodec::String),
		] {
			codecs.insert(id.to_string(), codec);
		}
		Self {
			codecs,
		}
	}
}

impl EncodingRegistry {
	/// Create a registry holding only the built-in encodings.
	pub fn new() -> Self {
		Self::default()
	}

	/// Resolve an encoding identifier to its codec.
	pub fn lookup(&self, id: &str) -> Result<FieldCodec, Error> {
		if let Some(base) = id.strip_suffix("[]") {
			return Ok(FieldCodec::Array(Box::new(self.lookup(base)?)));
		}
		if let Some(base) = id.strip_suffix('?') {
			return Ok(FieldCodec::NullSafe(Box::new(self.lookup(base)?)));
		}
		self.codecs.get(id).cloned().ok_or_else(|| Error::UnknownEncoding(id.to_string()))
	}

	/// Register a new encoding under the given identifier.
	pub fn register(&mut self, id: &str, codec: FieldCodec) -> Result<(), Error> {
		if id.is_empty() || id.ends_with("[]") || id.ends_with('?') {
			return Err(Error::InvalidSchema(format!("invalid encoding identifier '{id}'")));
		}
		if self.codecs.contains_key(id) {
			return Err(Error::DuplicateEncoding(id.to_string()));
		}
		self.codecs.insert(id.to_string(), codec);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lookup_base_and_derived() {
		let reg = EncodingRegistry::new();
		assert_eq!(reg.lookup("int32").unwrap(), FieldCodec::Int32);
		assert_eq!(
			reg.lookup("int32[]").unwrap(),
			FieldCodec::Array(Box::new(FieldCodec::Int32))
		);
		assert_eq!(
			reg.lookup("string?").unwrap(),
			FieldCodec::NullSafe(Box::new(FieldCodec::String))
		);
		assert_eq!(
			reg.lookup("int8[][]").unwrap(),
			FieldCodec::Array(Box::new(FieldCodec::Array(Box::new(FieldCodec::Int8))))
		);
	}

	#[test]
	fn unknown_encoding() {
		let reg = EncodingRegistry::new();
		assert!(matches!(reg.lookup("zone-id"), Err(Error::UnknownEncoding(_))));
	}

	#[test]
	fn register_and_conflict() {
		let mut reg = EncodingRegistry::new();
		reg.register("email", FieldCodec::String).unwrap();
		assert_eq!(reg.lookup("email").unwrap(), FieldCodec::String);
		assert!(matches!(
			reg.register("email", FieldCodec::String),
			Err(Error::DuplicateEncoding(_))
		));
		assert!(matches!(reg.register("bad[]", FieldCodec::String), Err(Error::InvalidSchema(_))));
	}
}
