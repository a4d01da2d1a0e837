//! Object creation and existence. Creating an object writes its meta
//! record, its version index entry, a default-valued entry in every simple
//! field index, and a default-valued entry in every composite index, so the
//! index invariants hold from the first moment the object exists.

use crate::catalog::registry::FieldKindSchema;
use crate::cnf::ID_GENERATE_ATTEMPTS;
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::Transaction;
use crate::obj::{ObjId, ObjInfo};

impl Transaction {
	/// Check whether an object exists.
	pub fn exists(&mut self, id: ObjId) -> Result<bool, Error> {
		Ok(self.obj_info(id)?.is_some())
	}

	/// Create an object with the given identifier at this transaction's
	/// schema version. Returns `false` without changing anything when the
	/// object already exists.
	pub fn create(&mut self, id: ObjId) -> Result<bool, Error> {
		self.mutation(|tx| {
			if tx.obj_info(id)?.is_some() {
				return Ok(false);
			}
			tx.create_raw(id, tx.version())?;
			tx.fire_create(id);
			Ok(true)
		})
	}

	/// Create an object of the given type under a freshly generated random
	/// identifier.
	pub fn create_new(&mut self, type_id: u32) -> Result<ObjId, Error> {
		self.mutation(|tx| {
			for _ in 0..*ID_GENERATE_ATTEMPTS {
				let id = ObjId::generate(type_id)?;
				if tx.obj_info(id)?.is_some() {
					continue;
				}
				tx.create_raw(id, tx.version())?;
				tx.fire_create(id);
				return Ok(id);
			}
			Err(Error::IdExhausted(type_id))
		})
	}

	/// Write a new object's meta record and all of its default index
	/// entries at the given schema version, without firing listeners.
	pub(crate) fn create_raw(&mut self, id: ObjId, version: u32) -> Result<(), Error> {
		let type_id = id.type_id()?;
		let schema = self.schema_at(version)?;
		let ts = schema.type_schema(type_id)?;
		// Collect the default index entries before touching the store
		let mut entries = Vec::new();
		for field in ts.fields.values() {
			if let FieldKindSchema::Simple(s) = &field.kind {
				if s.maintained() {
					let default = s.codec.encoded_default()?;
					entries.push(Index::encode_raw(s.storage_id, &default, id, &[]));
				}
			}
		}
		for comp in ts.composites.values() {
			let mut values = Vec::with_capacity(comp.fields.len());
			for fid in &comp.fields {
				let Some(FieldKindSchema::Simple(s)) = ts.fields.get(fid).map(|f| &f.kind) else {
					return Err(Error::InconsistentDatabase(format!(
						"composite index {} names unknown field {fid}",
						comp.storage_id
					)));
				};
				values.push(s.codec.encoded_default()?);
			}
			entries.push(key::composite::Composite::encode_raw(comp.storage_id, &values, id));
		}
		// Record the object meta-data
		self.write_obj_info(
			id,
			ObjInfo {
				type_id,
				version,
				delete_notified: false,
			},
		)?;
		// Record the version index entry
		self.kv_set(key::version::Version::new(version, id).encode(), Vec::new())?;
		// Record the default index entries
		for entry in entries {
			self.kv_set(entry, Vec::new())?;
		}
		trace!(target: "shale::core::obj", id = %id, version, "Created object");
		Ok(())
	}

	/// Every object of one type, across all schema versions, in identifier
	/// order.
	pub fn get_all(&mut self, type_id: u32) -> Result<Vec<ObjId>, Error> {
		let keys = self.scan_keys(key::obj::type_range(type_id))?;
		let mut out = Vec::new();
		for key in keys {
			// Meta records are exactly the 8-byte identifiers; field keys
			// carry a suffix and are skipped
			if key.len() == crate::cnf::OBJ_ID_LENGTH {
				out.push(ObjId::from_slice(&key)?);
			}
		}
		Ok(out)
	}
}
