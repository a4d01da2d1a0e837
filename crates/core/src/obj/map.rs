//! The live map view. A map field stores one key per entry, whose suffix is
//! the map key's order-preserving encoding, with the encoded map value as
//! the stored value. Iteration yields entries in key order. A map value's
//! index entry carries the encoded map key as its discriminator, so queries
//! reveal where each match sits.

use crate::catalog::registry::{FieldKindSchema, SimpleSchema};
use crate::enc::{Reader, Value};
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::Transaction;
use crate::lsn::Change;
use crate::obj::ObjId;

impl Transaction {
	/// Open the live view over a map field.
	pub fn read_map(&mut self, id: ObjId, field: u32, migrate: bool) -> Result<MapView<'_>, Error> {
		match self.resolve_complex(id, field, migrate)?.kind {
			FieldKindSchema::Map {
				key,
				value,
			} => Ok(MapView {
				tx: self,
				id,
				field,
				key,
				value,
			}),
			_ => Err(Error::IncompatibleValue(format!("field {field} is not a map field"))),
		}
	}
}

/// A live, ordered view over one object's map field.
pub struct MapView<'a> {
	tx: &'a mut Transaction,
	id: ObjId,
	field: u32,
	key: SimpleSchema,
	value: SimpleSchema,
}

impl MapView<'_> {
	/// Whether the owning object still exists.
	fn alive(&mut self) -> Result<bool, Error> {
		Ok(self.tx.obj_info(self.id)?.is_some())
	}

	/// The number of entries.
	pub fn len(&mut self) -> Result<usize, Error> {
		if !self.alive()? {
			return Ok(0);
		}
		Ok(self.tx.scan_keys(key::obj::field_range(self.id, self.field))?.len())
	}

	/// Whether the map holds no entries.
	pub fn is_empty(&mut self) -> Result<bool, Error> {
		Ok(self.len()? == 0)
	}

	/// The value stored under one key.
	pub fn get(&mut self, map_key: &Value) -> Result<Option<Value>, Error> {
		if !self.alive()? {
			return Ok(None);
		}
		let kenc = self.key.codec.encoded(map_key)?;
		match self.tx.kv_get(&key::obj::elem(self.id, self.field, &kenc))? {
			Some(bytes) => Ok(Some(self.value.codec.decode_all(&bytes)?)),
			None => Ok(None),
		}
	}

	/// Whether the map holds an entry under one key.
	pub fn contains_key(&mut self, map_key: &Value) -> Result<bool, Error> {
		if !self.alive()? {
			return Ok(false);
		}
		let kenc = self.key.codec.encoded(map_key)?;
		self.tx.kv_exists(&key::obj::elem(self.id, self.field, &kenc))
	}

	/// The entries, in key order.
	pub fn iter(&mut self) -> Result<Vec<(Value, Value)>, Error> {
		if !self.alive()? {
			return Ok(Vec::new());
		}
		let prefix_len = key::obj::Field::new(self.id, self.field).encode().len();
		let entries = self.tx.scan_range(key::obj::field_range(self.id, self.field))?;
		let mut out = Vec::with_capacity(entries.len());
		for (k, v) in entries {
			let mut r = Reader::new(&k[prefix_len..]);
			out.push((self.key.codec.decode(&mut r)?, self.value.codec.decode_all(&v)?));
		}
		Ok(out)
	}

	/// Insert or replace an entry, returning the previous value if any.
	pub fn put(&mut self, map_key: Value, map_value: Value) -> Result<Option<Value>, Error> {
		let (id, field) = (self.id, self.field);
		let (ks, vs) = (self.key.clone(), self.value.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let kenc = ks.codec.encoded(&map_key)?;
			let venc = vs.codec.encoded(&map_value)?;
			if let Some(spec) = &vs.reference {
				tx.check_ref_assignment(id, vs.storage_id, &map_value, spec)?;
			}
			let ekey = key::obj::elem(id, field, &kenc);
			match tx.kv_get(&ekey)? {
				Some(old_bytes) => {
					// Replacing a value with itself changes nothing
					if old_bytes == venc {
						return Ok(Some(vs.codec.decode_all(&old_bytes)?));
					}
					let old = vs.codec.decode_all(&old_bytes)?;
					if vs.maintained() {
						tx.kv_del(&Index::encode_raw(vs.storage_id, &old_bytes, id, &kenc))?;
						tx.kv_set(Index::encode_raw(vs.storage_id, &venc, id, &kenc), Vec::new())?;
					}
					tx.kv_set(ekey, venc)?;
					tx.enqueue(
						field,
						Change::MapReplace {
							id,
							field,
							key: map_key,
							old: old.clone(),
							new: map_value,
						},
					);
					Ok(Some(old))
				}
				None => {
					if let Some(spec) = &ks.reference {
						tx.check_ref_assignment(id, ks.storage_id, &map_key, spec)?;
					}
					if ks.maintained() {
						tx.kv_set(Index::encode_raw(ks.storage_id, &kenc, id, &[]), Vec::new())?;
					}
					if vs.maintained() {
						tx.kv_set(Index::encode_raw(vs.storage_id, &venc, id, &kenc), Vec::new())?;
					}
					tx.kv_set(ekey, venc)?;
					tx.enqueue(
						field,
						Change::MapAdd {
							id,
							field,
							key: map_key,
							value: map_value,
						},
					);
					Ok(None)
				}
			}
		})
	}

	/// Remove an entry, returning its value if it was present.
	pub fn remove(&mut self, map_key: &Value) -> Result<Option<Value>, Error> {
		let (id, field) = (self.id, self.field);
		let (ks, vs) = (self.key.clone(), self.value.clone());
		let map_key = map_key.clone();
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let kenc = ks.codec.encoded(&map_key)?;
			let ekey = key::obj::elem(id, field, &kenc);
			let Some(old_bytes) = tx.kv_get(&ekey)? else {
				return Ok(None);
			};
			let old = vs.codec.decode_all(&old_bytes)?;
			tx.kv_del(&ekey)?;
			if ks.maintained() {
				tx.kv_del(&Index::encode_raw(ks.storage_id, &kenc, id, &[]))?;
			}
			if vs.maintained() {
				tx.kv_del(&Index::encode_raw(vs.storage_id, &old_bytes, id, &kenc))?;
			}
			tx.enqueue(
				field,
				Change::MapRemove {
					id,
					field,
					key: map_key,
					value: old.clone(),
				},
			);
			Ok(Some(old))
		})
	}

	/// Remove every entry.
	pub fn clear(&mut self) -> Result<(), Error> {
		let (id, field) = (self.id, self.field);
		let (ks, vs) = (self.key.clone(), self.value.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let prefix_len = key::obj::Field::new(id, field).encode().len();
			let entries = tx.scan_range(key::obj::field_range(id, field))?;
			for (k, v) in &entries {
				let kenc = &k[prefix_len..];
				if ks.maintained() {
					tx.kv_del(&Index::encode_raw(ks.storage_id, kenc, id, &[]))?;
				}
				if vs.maintained() {
					tx.kv_del(&Index::encode_raw(vs.storage_id, v, id, kenc))?;
				}
			}
			tx.kv_delr(key::obj::field_range(id, field))?;
			tx.enqueue(
				field,
				Change::MapClear {
					id,
					field,
				},
			);
			Ok(())
		})
	}
}
