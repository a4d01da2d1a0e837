//! Simple field access: reads, writes, and the index upkeep every write
//! performs. A simple field whose value equals its default occupies no field
//! key; its index entries are present regardless, so every existing object
//! appears in the index of each of its indexed fields.

use crate::catalog::registry::{CompositeSchema, FieldKindSchema, Schema, SimpleSchema};
use crate::catalog::ReferenceSpec;
use crate::enc::Value;
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::{Key, Transaction};
use crate::lsn::Change;
use crate::obj::{ObjId, ObjInfo};
use std::sync::Arc;

impl Transaction {
	/// Resolve a recorded schema version.
	pub(crate) fn schema_at(&self, version: u32) -> Result<Arc<Schema>, Error> {
		if version == self.version() {
			return Ok(self.schema());
		}
		let registry = self.registry();
		let guard = registry.read();
		guard
			.get(version)
			.ok_or_else(|| Error::InconsistentDatabase(format!("unknown schema version {version}")))
	}

	/// Resolve an object's meta-data and the schema version its fields are
	/// stored under, migrating it to this transaction's version first when
	/// requested.
	pub(crate) fn resolve_object(
		&mut self,
		id: ObjId,
		migrate: bool,
	) -> Result<(ObjInfo, Arc<Schema>), Error> {
		let mut info = self.obj_info_required(id)?;
		if migrate && info.version != self.version() {
			self.mutation(|tx| tx.migrate_object(id))?;
			info = self.obj_info_required(id)?;
		}
		let schema = self.schema_at(info.version)?;
		Ok((info, schema))
	}

	/// Resolve a simple field of an object, along with the composite
	/// indexes it participates in.
	fn resolve_simple(
		&mut self,
		id: ObjId,
		field: u32,
		migrate: bool,
	) -> Result<(ObjInfo, Arc<Schema>, SimpleSchema, Vec<CompositeSchema>), Error> {
		let (info, schema) = self.resolve_object(id, migrate)?;
		let ts = schema.type_schema(info.type_id)?;
		let fs = ts.fields.get(&field).ok_or(Error::UnknownField {
			type_id: info.type_id,
			field,
		})?;
		let FieldKindSchema::Simple(s) = &fs.kind else {
			return Err(Error::IncompatibleValue(format!(
				"field {field} of type '{}' is not a simple field",
				ts.name
			)));
		};
		let composites = ts
			.field_composites
			.get(&field)
			.into_iter()
			.flatten()
			.filter_map(|cid| ts.composites.get(cid).cloned())
			.collect();
		Ok((info, schema.clone(), s.clone(), composites))
	}

	/// Read a simple field. An absent field key yields the field's default
	/// value.
	pub fn read_simple(&mut self, id: ObjId, field: u32, migrate: bool) -> Result<Value, Error> {
		let (_, _, s, _) = self.resolve_simple(id, field, migrate)?;
		match self.kv_get(&key::obj::Field::new(id, field).encode())? {
			Some(bytes) => s.codec.decode_all(&bytes),
			None => Ok(s.codec.default_value()),
		}
	}

	/// Write a simple field, maintaining its simple index entry and every
	/// composite index it participates in. Writing the current value is a
	/// no-op and notifies nothing.
	pub fn write_simple(
		&mut self,
		id: ObjId,
		field: u32,
		value: Value,
		migrate: bool,
	) -> Result<(), Error> {
		self.mutation(|tx| tx.write_simple_inner(id, field, value, migrate, false))
	}

	/// The write path behind [`write_simple`]. With `quiet` set, no change
	/// notification is queued; the copy engine uses this for raw copies.
	///
	/// [`write_simple`]: Transaction::write_simple
	pub(crate) fn write_simple_inner(
		&mut self,
		id: ObjId,
		field: u32,
		value: Value,
		migrate: bool,
		quiet: bool,
	) -> Result<(), Error> {
		let (info, schema, s, composites) = self.resolve_simple(id, field, migrate)?;
		let new_bytes = s.codec.encoded(&value)?;
		let default_bytes = s.codec.encoded_default()?;
		let fkey = key::obj::Field::new(id, field).encode();
		let old_bytes = match self.kv_get(&fkey)? {
			Some(bytes) => bytes,
			None => default_bytes.clone(),
		};
		// Writing identical bytes changes nothing
		if old_bytes == new_bytes {
			return Ok(());
		}
		// Verify a reference assignment before touching anything
		if let Some(spec) = &s.reference {
			self.check_ref_assignment(id, field, &value, spec)?;
		}
		let old_value = s.codec.decode_all(&old_bytes)?;
		// Remove the composite entries keyed by the old value
		for comp in &composites {
			let old_key =
				self.composite_key_with(id, &schema, info.type_id, comp, Some((field, &old_bytes)))?;
			self.kv_del(&old_key)?;
		}
		// Maintain the simple index
		if s.maintained() {
			self.kv_del(&Index::encode_raw(field, &old_bytes, id, &[]))?;
			self.kv_set(Index::encode_raw(field, &new_bytes, id, &[]), Vec::new())?;
		}
		// Update the field content; a default value occupies no key
		if new_bytes == default_bytes {
			self.kv_del(&fkey)?;
		} else {
			self.kv_set(fkey, new_bytes.clone())?;
		}
		// Insert the composite entries keyed by the new value
		for comp in &composites {
			let new_key =
				self.composite_key_with(id, &schema, info.type_id, comp, Some((field, &new_bytes)))?;
			self.kv_set(new_key, Vec::new())?;
		}
		// Queue the change notification
		if !quiet {
			self.enqueue(
				field,
				Change::SimpleChange {
					id,
					field,
					old: old_value,
					new: value,
				},
			);
		}
		Ok(())
	}

	/// The current encoded bytes of a simple field, defaulting when absent.
	pub(crate) fn field_bytes(&mut self, id: ObjId, s: &SimpleSchema) -> Result<Vec<u8>, Error> {
		match self.kv_get(&key::obj::Field::new(id, s.storage_id).encode())? {
			Some(bytes) => Ok(bytes),
			None => s.codec.encoded_default(),
		}
	}

	/// Build the composite index key currently describing an object, with
	/// one component optionally overridden by pre-encoded bytes.
	pub(crate) fn composite_key_with(
		&mut self,
		id: ObjId,
		schema: &Schema,
		type_id: u32,
		comp: &CompositeSchema,
		replace: Option<(u32, &[u8])>,
	) -> Result<Key, Error> {
		let ts = schema.type_schema(type_id)?;
		let mut values = Vec::with_capacity(comp.fields.len());
		for fid in &comp.fields {
			if let Some((field, bytes)) = replace {
				if field == *fid {
					values.push(bytes.to_vec());
					continue;
				}
			}
			let Some(FieldKindSchema::Simple(s)) = ts.fields.get(fid).map(|f| &f.kind) else {
				return Err(Error::InconsistentDatabase(format!(
					"composite index {} names unknown field {fid}",
					comp.storage_id
				)));
			};
			let s = s.clone();
			values.push(self.field_bytes(id, &s)?);
		}
		Ok(key::composite::Composite::encode_raw(comp.storage_id, &values, id))
	}

	/// Verify that a value may be assigned to a reference field: the target
	/// type must be permitted, and the target must exist unless deleted
	/// assignment is allowed or a pending-assignment map is installed.
	pub(crate) fn check_ref_assignment(
		&mut self,
		referrer: ObjId,
		field: u32,
		value: &Value,
		spec: &ReferenceSpec,
	) -> Result<(), Error> {
		let Value::Ref(target) = value else {
			return Ok(());
		};
		let target = *target;
		let target_type = target.type_id()?;
		let allowed = match &spec.target_types {
			Some(types) => types.contains(&target_type),
			None => {
				let registry = self.registry();
				let permitted = registry.read().object_type_ids().contains(&target_type);
				permitted
			}
		};
		if !allowed {
			return Err(Error::InvalidReference {
				field,
				target,
			});
		}
		if !spec.allow_deleted && self.obj_info(target)?.is_none() {
			if let Some(map) = self.deleted_assignments.as_mut() {
				map.insert(target, (field, referrer));
				return Ok(());
			}
			return Err(Error::DeletedAssignment {
				field,
				target,
			});
		}
		Ok(())
	}
}
