//! The live set view. A set field stores one key per element, whose suffix
//! is the element's order-preserving encoding, so iteration yields elements
//! in logical order. The view re-reads the store on every call: it always
//! reflects the transaction's current state.
//!
//! A deleted owning object reads as an empty collection, while every
//! mutation on it fails with [`Error::Deleted`].

use crate::catalog::registry::{FieldKindSchema, FieldSchema, SimpleSchema};
use crate::enc::{Reader, Value};
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::Transaction;
use crate::lsn::Change;
use crate::obj::ObjId;

impl Transaction {
	/// Resolve a complex field of an object. The field is resolved against
	/// the object's recorded schema version; for a deleted object, this
	/// transaction's version is used, so its collections can still be
	/// navigated (and read as empty).
	pub(crate) fn resolve_complex(
		&mut self,
		id: ObjId,
		field: u32,
		migrate: bool,
	) -> Result<FieldSchema, Error> {
		let schema = match self.obj_info(id)? {
			Some(info) => {
				if migrate && info.version != self.version() {
					self.mutation(|tx| tx.migrate_object(id))?;
					self.schema()
				} else {
					self.schema_at(info.version)?
				}
			}
			None => self.schema(),
		};
		let type_id = id.type_id()?;
		let ts = schema.type_schema(type_id)?;
		ts.fields
			.get(&field)
			.cloned()
			.ok_or(Error::UnknownField {
				type_id,
				field,
			})
	}

	/// Open the live view over a set field.
	pub fn read_set(&mut self, id: ObjId, field: u32, migrate: bool) -> Result<SetView<'_>, Error> {
		match self.resolve_complex(id, field, migrate)?.kind {
			FieldKindSchema::Set {
				elem,
			} => Ok(SetView {
				tx: self,
				id,
				field,
				elem,
			}),
			_ => Err(Error::IncompatibleValue(format!("field {field} is not a set field"))),
		}
	}
}

/// A live, ordered view over one object's set field.
pub struct SetView<'a> {
	tx: &'a mut Transaction,
	id: ObjId,
	field: u32,
	elem: SimpleSchema,
}

impl SetView<'_> {
	/// Whether the owning object still exists.
	fn alive(&mut self) -> Result<bool, Error> {
		Ok(self.tx.obj_info(self.id)?.is_some())
	}

	/// The number of elements.
	pub fn len(&mut self) -> Result<usize, Error> {
		if !self.alive()? {
			return Ok(0);
		}
		Ok(self.tx.scan_keys(key::obj::field_range(self.id, self.field))?.len())
	}

	/// Whether the set holds no elements.
	pub fn is_empty(&mut self) -> Result<bool, Error> {
		Ok(self.len()? == 0)
	}

	/// Whether the set holds the given element.
	pub fn contains(&mut self, element: &Value) -> Result<bool, Error> {
		if !self.alive()? {
			return Ok(false);
		}
		let enc = self.elem.codec.encoded(element)?;
		self.tx.kv_exists(&key::obj::elem(self.id, self.field, &enc))
	}

	/// The elements, in encoding order.
	pub fn iter(&mut self) -> Result<Vec<Value>, Error> {
		if !self.alive()? {
			return Ok(Vec::new());
		}
		let prefix_len = key::obj::Field::new(self.id, self.field).encode().len();
		let keys = self.tx.scan_keys(key::obj::field_range(self.id, self.field))?;
		let mut out = Vec::with_capacity(keys.len());
		for key in keys {
			let mut r = Reader::new(&key[prefix_len..]);
			out.push(self.elem.codec.decode(&mut r)?);
		}
		Ok(out)
	}

	/// Add an element. Returns `false` when it was already present.
	pub fn insert(&mut self, element: Value) -> Result<bool, Error> {
		let (id, field, elem) = (self.id, self.field, self.elem.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let enc = elem.codec.encoded(&element)?;
			let ekey = key::obj::elem(id, field, &enc);
			if tx.kv_exists(&ekey)? {
				return Ok(false);
			}
			if let Some(spec) = &elem.reference {
				tx.check_ref_assignment(id, elem.storage_id, &element, spec)?;
			}
			tx.kv_set(ekey, Vec::new())?;
			if elem.maintained() {
				tx.kv_set(Index::encode_raw(elem.storage_id, &enc, id, &[]), Vec::new())?;
			}
			tx.enqueue(
				field,
				Change::SetAdd {
					id,
					field,
					element,
				},
			);
			Ok(true)
		})
	}

	/// Remove an element. Returns `false` when it was not present.
	pub fn remove(&mut self, element: &Value) -> Result<bool, Error> {
		let (id, field, elem) = (self.id, self.field, self.elem.clone());
		let element = element.clone();
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let enc = elem.codec.encoded(&element)?;
			let ekey = key::obj::elem(id, field, &enc);
			if !tx.kv_exists(&ekey)? {
				return Ok(false);
			}
			tx.kv_del(&ekey)?;
			if elem.maintained() {
				tx.kv_del(&Index::encode_raw(elem.storage_id, &enc, id, &[]))?;
			}
			tx.enqueue(
				field,
				Change::SetRemove {
					id,
					field,
					element,
				},
			);
			Ok(true)
		})
	}

	/// Remove every element.
	pub fn clear(&mut self) -> Result<(), Error> {
		let (id, field, elem) = (self.id, self.field, self.elem.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			if elem.maintained() {
				let prefix_len = key::obj::Field::new(id, field).encode().len();
				for key in tx.scan_keys(key::obj::field_range(id, field))? {
					let enc = &key[prefix_len..];
					tx.kv_del(&Index::encode_raw(elem.storage_id, enc, id, &[]))?;
				}
			}
			tx.kv_delr(key::obj::field_range(id, field))?;
			tx.enqueue(
				field,
				Change::SetClear {
					id,
					field,
				},
			);
			Ok(())
		})
	}
}
