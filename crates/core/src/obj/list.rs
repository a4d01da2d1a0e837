//! The live list view. A list field stores one key per position, the
//! position as fixed 8-byte big-endian, with the encoded element as the
//! value. Positions are contiguous: insertion and removal shift the tail,
//! rewriting the affected index discriminators.

use crate::catalog::registry::{FieldKindSchema, SimpleSchema};
use crate::enc::Value;
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::Transaction;
use crate::lsn::Change;
use crate::obj::ObjId;

impl Transaction {
	/// Open the live view over a list field.
	pub fn read_list(&mut self, id: ObjId, field: u32, migrate: bool) -> Result<ListView<'_>, Error> {
		match self.resolve_complex(id, field, migrate)?.kind {
			FieldKindSchema::List {
				elem,
			} => Ok(ListView {
				tx: self,
				id,
				field,
				elem,
			}),
			_ => Err(Error::IncompatibleValue(format!("field {field} is not a list field"))),
		}
	}
}

/// A live, positional view over one object's list field.
pub struct ListView<'a> {
	tx: &'a mut Transaction,
	id: ObjId,
	field: u32,
	elem: SimpleSchema,
}

impl ListView<'_> {
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

	/// Whether the list holds no elements.
	pub fn is_empty(&mut self) -> Result<bool, Error> {
		Ok(self.len()? == 0)
	}

	/// The element at one position, or `None` past the end.
	pub fn get(&mut self, position: u64) -> Result<Option<Value>, Error> {
		if !self.alive()? {
			return Ok(None);
		}
		match self.tx.kv_get(&key::obj::list_elem(self.id, self.field, position))? {
			Some(bytes) => Ok(Some(self.elem.codec.decode_all(&bytes)?)),
			None => Ok(None),
		}
	}

	/// The elements, in position order.
	pub fn iter(&mut self) -> Result<Vec<Value>, Error> {
		if !self.alive()? {
			return Ok(Vec::new());
		}
		let entries = self.tx.scan_range(key::obj::field_range(self.id, self.field))?;
		let mut out = Vec::with_capacity(entries.len());
		for (_, bytes) in entries {
			out.push(self.elem.codec.decode_all(&bytes)?);
		}
		Ok(out)
	}

	/// Append an element at the end.
	pub fn push(&mut self, element: Value) -> Result<(), Error> {
		let len = self.len()? as u64;
		self.insert(len, element)
	}

	/// Insert an element at a position, shifting the tail up by one.
	pub fn insert(&mut self, position: u64, element: Value) -> Result<(), Error> {
		let (id, field, elem) = (self.id, self.field, self.elem.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let len = tx.scan_keys(key::obj::field_range(id, field))?.len() as u64;
			if position > len {
				return Err(Error::IncompatibleValue(format!(
					"list position {position} out of bounds for length {len}"
				)));
			}
			if let Some(spec) = &elem.reference {
				tx.check_ref_assignment(id, elem.storage_id, &element, spec)?;
			}
			let enc = elem.codec.encoded(&element)?;
			// Shift the tail up, moving index discriminators along
			for i in (position..len).rev() {
				let bytes = tx.kv_get(&key::obj::list_elem(id, field, i))?.ok_or_else(|| {
					Error::InconsistentDatabase(format!("list position {i} missing"))
				})?;
				if elem.maintained() {
					tx.kv_del(&Index::encode_raw(elem.storage_id, &bytes, id, &i.to_be_bytes()))?;
					tx.kv_set(
						Index::encode_raw(elem.storage_id, &bytes, id, &(i + 1).to_be_bytes()),
						Vec::new(),
					)?;
				}
				tx.kv_set(key::obj::list_elem(id, field, i + 1), bytes)?;
			}
			// Write the new element and its index entry
			if elem.maintained() {
				tx.kv_set(
					Index::encode_raw(elem.storage_id, &enc, id, &position.to_be_bytes()),
					Vec::new(),
				)?;
			}
			tx.kv_set(key::obj::list_elem(id, field, position), enc)?;
			tx.enqueue(
				field,
				Change::ListAdd {
					id,
					field,
					index: position,
					element,
				},
			);
			Ok(())
		})
	}

	/// Replace the element at a position, returning the previous element.
	pub fn set(&mut self, position: u64, element: Value) -> Result<Value, Error> {
		let (id, field, elem) = (self.id, self.field, self.elem.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let ekey = key::obj::list_elem(id, field, position);
			let old_bytes = tx.kv_get(&ekey)?.ok_or_else(|| {
				Error::IncompatibleValue(format!("list position {position} out of bounds"))
			})?;
			let old = elem.codec.decode_all(&old_bytes)?;
			let enc = elem.codec.encoded(&element)?;
			if enc == old_bytes {
				return Ok(old);
			}
			if let Some(spec) = &elem.reference {
				tx.check_ref_assignment(id, elem.storage_id, &element, spec)?;
			}
			if elem.maintained() {
				tx.kv_del(&Index::encode_raw(
					elem.storage_id,
					&old_bytes,
					id,
					&position.to_be_bytes(),
				))?;
				tx.kv_set(
					Index::encode_raw(elem.storage_id, &enc, id, &position.to_be_bytes()),
					Vec::new(),
				)?;
			}
			tx.kv_set(ekey, enc)?;
			tx.enqueue(
				field,
				Change::ListReplace {
					id,
					field,
					index: position,
					old: old.clone(),
					new: element,
				},
			);
			Ok(old)
		})
	}

	/// Remove the element at a position, shifting the tail down by one.
	pub fn remove(&mut self, position: u64) -> Result<Value, Error> {
		let (id, field, elem) = (self.id, self.field, self.elem.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			let len = tx.scan_keys(key::obj::field_range(id, field))?.len() as u64;
			let old_bytes =
				tx.kv_get(&key::obj::list_elem(id, field, position))?.ok_or_else(|| {
					Error::IncompatibleValue(format!("list position {position} out of bounds"))
				})?;
			let old = elem.codec.decode_all(&old_bytes)?;
			if elem.maintained() {
				tx.kv_del(&Index::encode_raw(
					elem.storage_id,
					&old_bytes,
					id,
					&position.to_be_bytes(),
				))?;
			}
			// Shift the tail down, moving index discriminators along
			for i in position + 1..len {
				let bytes = tx.kv_get(&key::obj::list_elem(id, field, i))?.ok_or_else(|| {
					Error::InconsistentDatabase(format!("list position {i} missing"))
				})?;
				if elem.maintained() {
					tx.kv_del(&Index::encode_raw(elem.storage_id, &bytes, id, &i.to_be_bytes()))?;
					tx.kv_set(
						Index::encode_raw(elem.storage_id, &bytes, id, &(i - 1).to_be_bytes()),
						Vec::new(),
					)?;
				}
				tx.kv_set(key::obj::list_elem(id, field, i - 1), bytes)?;
			}
			tx.kv_del(&key::obj::list_elem(id, field, len - 1))?;
			tx.enqueue(
				field,
				Change::ListRemove {
					id,
					field,
					index: position,
					element: old.clone(),
				},
			);
			Ok(old)
		})
	}

	/// Remove every element.
	pub fn clear(&mut self) -> Result<(), Error> {
		let (id, field, elem) = (self.id, self.field, self.elem.clone());
		self.tx.mutation(move |tx| {
			tx.obj_info_required(id)?;
			if elem.maintained() {
				let entries = tx.scan_range(key::obj::field_range(id, field))?;
				for (i, (_, bytes)) in entries.iter().enumerate() {
					tx.kv_del(&Index::encode_raw(
						elem.storage_id,
						bytes,
						id,
						&(i as u64).to_be_bytes(),
					))?;
				}
			}
			tx.kv_delr(key::obj::field_range(id, field))?;
			tx.enqueue(
				field,
				Change::ListClear {
					id,
					field,
				},
			);
			Ok(())
		})
	}
}
