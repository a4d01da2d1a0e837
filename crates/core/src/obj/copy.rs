//! The copy engine: moving an object between two transactions while
//! preserving its schema version, index entries, and reference constraints,
//! plus detached transactions — in-memory transactions seeded with the
//! origin's schema catalog, useful as long-lived copy targets.

use crate::catalog::registry::FieldKindSchema;
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::api::{KVStore, KVTransaction};
use crate::kvs::mem::MemStore;
use crate::kvs::{Transaction, TransactionOptions};
use crate::obj::ObjId;
use std::collections::BTreeMap;

/// Deleted-reference assignments recorded during a copy instead of failing
/// it: target identifier to the assigned field and the referring object.
pub type DeletedAssignments = BTreeMap<ObjId, (u32, ObjId)>;

impl Transaction {
	/// Copy an object into another transaction, field by field, under the
	/// same schema version (matched by canonical form). With `migrate` set
	/// the source is first migrated to this transaction's version. With
	/// `notify` set the destination's listeners observe the copy. When
	/// `deleted` is supplied, references to objects missing from the
	/// destination are recorded there instead of failing the copy.
	pub fn copy_to(
		&mut self,
		src: ObjId,
		dst: Option<ObjId>,
		dst_tx: &mut Transaction,
		migrate: bool,
		notify: bool,
		deleted: Option<&mut DeletedAssignments>,
	) -> Result<ObjId, Error> {
		let dst_id = dst.unwrap_or(src);
		// The identifiers must name the same object type
		if src.type_id()? != dst_id.type_id()? {
			return Err(Error::SchemaMismatch(format!(
				"cannot copy object of type {} onto identifier of type {}",
				src.type_id()?,
				dst_id.type_id()?
			)));
		}
		// Optionally upgrade the source first
		if migrate {
			self.migrate_schema(src)?;
		}
		let info = self.obj_info_required(src)?;
		let src_schema = self.schema_at(info.version)?;
		// The destination must know the identical schema, whatever version
		// number it records it under
		let dst_version = {
			let registry = dst_tx.registry();
			let found = registry.read().find_canonical(&src_schema.canonical);
			match found {
				Some(schema) => schema.version,
				None => {
					return Err(Error::SchemaMismatch(
						"destination transaction does not know the source schema".to_string(),
					));
				}
			}
		};
		// An existing destination migrates through the normal path first,
		// so schema-change listeners observe it
		if let Some(dst_info) = dst_tx.obj_info(dst_id)? {
			if dst_info.version != dst_tx.version()
				&& !dst_tx.listeners.schema_change.is_empty()
			{
				dst_tx.migrate_schema(dst_id)?;
			}
		}
		// With a capture map installed, deleted-reference assignments are
		// recorded instead of failing the copy; without one, the first
		// violation aborts it
		let capturing = deleted.is_some();
		let saved = dst_tx.deleted_assignments.take();
		if capturing {
			dst_tx.deleted_assignments = Some(BTreeMap::new());
		}
		let result =
			dst_tx.mutation(|tx| self.copy_fields(src, dst_id, dst_version, info, tx, notify));
		let recorded = dst_tx.deleted_assignments.take().unwrap_or_default();
		dst_tx.deleted_assignments = saved;
		result?;
		if let Some(map) = deleted {
			map.extend(recorded);
		}
		Ok(dst_id)
	}

	/// Copy every field of `src` in this transaction onto `dst_id` in the
	/// destination transaction.
	fn copy_fields(
		&mut self,
		src: ObjId,
		dst_id: ObjId,
		dst_version: u32,
		info: crate::obj::ObjInfo,
		dst_tx: &mut Transaction,
		notify: bool,
	) -> Result<(), Error> {
		let schema = self.schema_at(info.version)?;
		let ts = schema.type_schema(info.type_id)?.clone();
		// Create the destination when absent
		if dst_tx.obj_info(dst_id)?.is_none() {
			dst_tx.create_raw(dst_id, dst_version)?;
			if notify {
				dst_tx.fire_create(dst_id);
			}
		}
		for field in ts.fields.values() {
			let fid = field.storage_id;
			match &field.kind {
				FieldKindSchema::Simple(s) => {
					let s = s.clone();
					let bytes = self.field_bytes(src, &s)?;
					let value = s.codec.decode_all(&bytes)?;
					dst_tx.write_simple_inner(dst_id, fid, value, false, !notify)?;
				}
				FieldKindSchema::Counter => {
					let value = self.read_counter(src, fid, false)?;
					dst_tx.write_counter(dst_id, fid, value, false)?;
				}
				FieldKindSchema::Set {
					elem,
				} => {
					let elem = elem.clone();
					let elements = {
						let mut view = self.read_set(src, fid, false)?;
						view.iter()?
					};
					if notify {
						let mut view = dst_tx.read_set(dst_id, fid, false)?;
						if !view.is_empty()? {
							view.clear()?;
						}
					} else {
						dst_tx.remove_field_storage(dst_id, field)?;
					}
					for element in elements {
						if notify {
							dst_tx.read_set(dst_id, fid, false)?.insert(element)?;
						} else {
							let enc = elem.codec.encoded(&element)?;
							if let Some(spec) = &elem.reference {
								dst_tx.check_ref_assignment(
									dst_id,
									elem.storage_id,
									&element,
									spec,
								)?;
							}
							dst_tx.kv_set(key::obj::elem(dst_id, fid, &enc), Vec::new())?;
							if elem.maintained() {
								dst_tx.kv_set(
									Index::encode_raw(elem.storage_id, &enc, dst_id, &[]),
									Vec::new(),
								)?;
							}
						}
					}
				}
				FieldKindSchema::List {
					elem,
				} => {
					let elem = elem.clone();
					let elements = {
						let mut view = self.read_list(src, fid, false)?;
						view.iter()?
					};
					if notify {
						let mut view = dst_tx.read_list(dst_id, fid, false)?;
						if !view.is_empty()? {
							view.clear()?;
						}
					} else {
						dst_tx.remove_field_storage(dst_id, field)?;
					}
					for (i, element) in elements.into_iter().enumerate() {
						if notify {
							dst_tx.read_list(dst_id, fid, false)?.push(element)?;
						} else {
							let enc = elem.codec.encoded(&element)?;
							if let Some(spec) = &elem.reference {
								dst_tx.check_ref_assignment(
									dst_id,
									elem.storage_id,
									&element,
									spec,
								)?;
							}
							let position = i as u64;
							dst_tx.kv_set(key::obj::list_elem(dst_id, fid, position), enc.clone())?;
							if elem.maintained() {
								dst_tx.kv_set(
									Index::encode_raw(
										elem.storage_id,
										&enc,
										dst_id,
										&position.to_be_bytes(),
									),
									Vec::new(),
								)?;
							}
						}
					}
				}
				FieldKindSchema::Map {
					key: ks,
					value: vs,
				} => {
					let (ks, vs) = (ks.clone(), vs.clone());
					let entries = {
						let mut view = self.read_map(src, fid, false)?;
						view.iter()?
					};
					if notify {
						let mut view = dst_tx.read_map(dst_id, fid, false)?;
						if !view.is_empty()? {
							view.clear()?;
						}
					} else {
						dst_tx.remove_field_storage(dst_id, field)?;
					}
					for (map_key, map_value) in entries {
						if notify {
							dst_tx.read_map(dst_id, fid, false)?.put(map_key, map_value)?;
						} else {
							let kenc = ks.codec.encoded(&map_key)?;
							let venc = vs.codec.encoded(&map_value)?;
							if let Some(spec) = &ks.reference {
								dst_tx.check_ref_assignment(dst_id, ks.storage_id, &map_key, spec)?;
							}
							if let Some(spec) = &vs.reference {
								dst_tx.check_ref_assignment(
									dst_id,
									vs.storage_id,
									&map_value,
									spec,
								)?;
							}
							dst_tx.kv_set(key::obj::elem(dst_id, fid, &kenc), venc.clone())?;
							if ks.maintained() {
								dst_tx.kv_set(
									Index::encode_raw(ks.storage_id, &kenc, dst_id, &[]),
									Vec::new(),
								)?;
							}
							if vs.maintained() {
								dst_tx.kv_set(
									Index::encode_raw(vs.storage_id, &venc, dst_id, &kenc),
									Vec::new(),
								)?;
							}
						}
					}
				}
			}
		}
		trace!(
			target: "shale::core::obj",
			src = %src,
			dst = %dst_id,
			"Copied object between transactions"
		);
		Ok(())
	}

	/// Open a detached transaction: an in-memory transaction seeded with
	/// this transaction's schema catalog. It supports every object
	/// operation but neither commit nor rollback, and may outlive its
	/// origin.
	pub fn detach(&mut self) -> Result<Transaction, Error> {
		self.check_active()?;
		let store = MemStore::new();
		let mut kv = store.transaction(true)?;
		// Seed the schema catalog so the detached side resolves versions
		for (k, v) in self.scan_range(key::meta::schema_range())? {
			kv.set(k, v)?;
		}
		let mut tx =
			Transaction::new(kv, self.registry(), self.schema(), &TransactionOptions::new());
		tx.set_detached();
		Ok(tx)
	}
}
