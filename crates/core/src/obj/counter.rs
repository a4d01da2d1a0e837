//! Counter field access. A counter is an opaque 64-bit integer stored as
//! fixed-width bytes; adjustment is a read-modify-write inside the owning
//! transaction, which the underlying store's isolation makes atomic. A
//! counter whose value is zero occupies no key. Counters never participate
//! in indexes and produce no change notifications.

use crate::catalog::registry::FieldKindSchema;
use crate::err::Error;
use crate::key;
use crate::kvs::Transaction;
use crate::obj::ObjId;

impl Transaction {
	/// Resolve a counter field, verifying the field kind.
	fn resolve_counter(&mut self, id: ObjId, field: u32, migrate: bool) -> Result<(), Error> {
		let (info, schema) = self.resolve_object(id, migrate)?;
		let ts = schema.type_schema(info.type_id)?;
		let fs = ts.fields.get(&field).ok_or(Error::UnknownField {
			type_id: info.type_id,
			field,
		})?;
		match fs.kind {
			FieldKindSchema::Counter => Ok(()),
			_ => Err(Error::IncompatibleValue(format!(
				"field {field} of type '{}' is not a counter field",
				ts.name
			))),
		}
	}

	/// Read a counter field. An absent key reads as zero.
	pub fn read_counter(&mut self, id: ObjId, field: u32, migrate: bool) -> Result<i64, Error> {
		self.resolve_counter(id, field, migrate)?;
		match self.kv_get(&key::obj::Field::new(id, field).encode())? {
			Some(bytes) => decode_counter(&bytes),
			None => Ok(0),
		}
	}

	/// Write a counter field.
	pub fn write_counter(
		&mut self,
		id: ObjId,
		field: u32,
		value: i64,
		migrate: bool,
	) -> Result<(), Error> {
		self.mutation(|tx| {
			tx.resolve_counter(id, field, migrate)?;
			let fkey = key::obj::Field::new(id, field).encode();
			if value == 0 {
				tx.kv_del(&fkey)
			} else {
				tx.kv_set(fkey, value.to_be_bytes().to_vec())
			}
		})
	}

	/// Atomically add a delta to a counter field, wrapping on overflow.
	pub fn adjust_counter(
		&mut self,
		id: ObjId,
		field: u32,
		delta: i64,
		migrate: bool,
	) -> Result<(), Error> {
		self.mutation(|tx| {
			tx.resolve_counter(id, field, migrate)?;
			let fkey = key::obj::Field::new(id, field).encode();
			let current = match tx.kv_get(&fkey)? {
				Some(bytes) => decode_counter(&bytes)?,
				None => 0,
			};
			let value = current.wrapping_add(delta);
			if value == 0 {
				tx.kv_del(&fkey)
			} else {
				tx.kv_set(fkey, value.to_be_bytes().to_vec())
			}
		})
	}
}

/// Decode a counter value from its fixed-width bytes.
fn decode_counter(bytes: &[u8]) -> Result<i64, Error> {
	let bytes: [u8; 8] = bytes
		.try_into()
		.map_err(|_| Error::InconsistentDatabase("invalid counter value length".to_string()))?;
	Ok(i64::from_be_bytes(bytes))
}
