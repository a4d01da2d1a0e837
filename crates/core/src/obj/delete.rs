//! The delete engine. Deletion runs a worklist: each popped object is first
//! checked against referrers demanding an exception, then delete listeners
//! fire, forward-delete cascades enqueue their targets, the object's entire
//! key footprint is removed, and finally unreference and delete inverse
//! actions propagate to the remaining referrers.
//!
//! The worklist pops in identifier order, but no ordering is guaranteed to
//! callers: outcomes of cycles mixing exception and delete actions are
//! implementation-defined.

use crate::catalog::registry::{FieldKindSchema, SidRole, SimpleSchema};
use crate::catalog::InverseDelete;
use crate::enc::{FieldCodec, Value};
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::Transaction;
use crate::lsn::Change;
use crate::obj::{ObjId, ObjInfo};
use std::collections::BTreeSet;

/// One referrer of an object about to be deleted, with the inverse action
/// its own schema version prescribes.
struct RefAction {
	/// The reference field or sub-field storage-id
	sid: u32,
	/// The referring object
	referrer: ObjId,
	/// The index entry's discriminator bytes
	disc: Vec<u8>,
	/// The prescribed inverse action
	action: InverseDelete,
	/// Where the reference sits on the referrer
	role: SidRole,
	/// The containing top-level field
	parent: u32,
}

impl Transaction {
	/// Delete an object, applying forward cascades and inverse-delete
	/// actions. Returns `false` without changing anything when the object
	/// does not exist.
	pub fn delete(&mut self, id: ObjId) -> Result<bool, Error> {
		self.mutation(|tx| {
			if tx.obj_info(id)?.is_none() {
				return Ok(false);
			}
			trace!(target: "shale::core::obj", id = %id, "Deleting object");
			let mut pending: BTreeSet<ObjId> = [id].into_iter().collect();
			while let Some(x) = pending.pop_first() {
				let Some(info) = tx.obj_info(x)? else {
					continue;
				};
				// Find every referrer and the action its schema prescribes.
				// No mutation happens for this pop until the exception
				// check has passed.
				let actions = tx.classify_referrers(x)?;
				if let Some(blocking) = actions
					.iter()
					.find(|a| a.referrer != x && a.action == InverseDelete::Exception)
				{
					return Err(Error::Referenced {
						target: x,
						referrer: blocking.referrer,
						field: blocking.sid,
					});
				}
				// Fire the delete listeners once, then revisit: listeners
				// may have mutated anything
				if !info.delete_notified && !tx.listeners.delete.is_empty() {
					tx.write_obj_info(
						x,
						ObjInfo {
							delete_notified: true,
							..info
						},
					)?;
					tx.fire_delete(x);
					pending.insert(x);
					continue;
				}
				// Cascade through forward-delete reference fields
				let schema = tx.schema_at(info.version)?;
				let ts = schema.type_schema(info.type_id)?;
				let cascade: Vec<u32> = ts
					.references()
					.into_iter()
					.filter(|(_, s)| {
						s.reference.as_ref().is_some_and(|r| r.forward_delete)
					})
					.map(|(_, s)| s.storage_id)
					.collect();
				for sid in cascade {
					pending.extend(tx.forward_targets(x, sid)?);
				}
				// Remove the object's entire key footprint
				tx.remove_footprint(x, info)?;
				// Unreference the remaining referrers
				for action in &actions {
					if action.action == InverseDelete::Unreference {
						tx.scrub_reference(action, x)?;
					}
				}
				// Propagate deletion to referrers demanding it
				for action in &actions {
					if action.action == InverseDelete::Delete {
						pending.insert(action.referrer);
					}
				}
			}
			Ok(true)
		})
	}

	/// Find every referrer of an object across all reference fields known
	/// to any schema version, resolving each referrer's prescribed action
	/// against the referrer's own version.
	fn classify_referrers(&mut self, x: ObjId) -> Result<Vec<RefAction>, Error> {
		let registry = self.registry();
		let sids = registry.read().all_reference_sids();
		let mut out = Vec::new();
		for sid in sids {
			for (referrer, disc) in self.referrers_with_disc(x, sid)? {
				let Some(info) = self.obj_info(referrer)? else {
					continue;
				};
				let schema = self.schema_at(info.version)?;
				let Some((loc, s)) = schema.reference_at(sid) else {
					continue;
				};
				if loc.type_id != info.type_id {
					continue;
				}
				let Some(spec) = &s.reference else {
					continue;
				};
				out.push(RefAction {
					sid,
					referrer,
					disc,
					action: spec.inverse_delete,
					role: loc.role,
					parent: loc.field,
				});
			}
		}
		Ok(out)
	}

	/// Remove every key belonging to an object: its simple, sub-field,
	/// composite, and version index entries, then the object's own range.
	pub(crate) fn remove_footprint(&mut self, id: ObjId, info: ObjInfo) -> Result<(), Error> {
		let schema = self.schema_at(info.version)?;
		let ts = schema.type_schema(info.type_id)?.clone();
		for field in ts.fields.values() {
			match &field.kind {
				FieldKindSchema::Simple(s) => {
					if s.maintained() {
						let bytes = self.field_bytes(id, s)?;
						self.kv_del(&Index::encode_raw(s.storage_id, &bytes, id, &[]))?;
					}
				}
				FieldKindSchema::Counter => (),
				FieldKindSchema::Set {
					elem,
				} => {
					if elem.maintained() {
						let prefix_len = key::obj::Field::new(id, field.storage_id).encode().len();
						for k in self.scan_keys(key::obj::field_range(id, field.storage_id))? {
							let enc = &k[prefix_len..];
							self.kv_del(&Index::encode_raw(elem.storage_id, enc, id, &[]))?;
						}
					}
				}
				FieldKindSchema::List {
					elem,
				} => {
					if elem.maintained() {
						let entries =
							self.scan_range(key::obj::field_range(id, field.storage_id))?;
						for (i, (_, v)) in entries.iter().enumerate() {
							self.kv_del(&Index::encode_raw(
								elem.storage_id,
								v,
								id,
								&(i as u64).to_be_bytes(),
							))?;
						}
					}
				}
				FieldKindSchema::Map {
					key: ks,
					value: vs,
				} => {
					if ks.maintained() || vs.maintained() {
						let prefix_len = key::obj::Field::new(id, field.storage_id).encode().len();
						let entries =
							self.scan_range(key::obj::field_range(id, field.storage_id))?;
						for (k, v) in &entries {
							let kenc = &k[prefix_len..];
							if ks.maintained() {
								self.kv_del(&Index::encode_raw(ks.storage_id, kenc, id, &[]))?;
							}
							if vs.maintained() {
								self.kv_del(&Index::encode_raw(vs.storage_id, v, id, kenc))?;
							}
						}
					}
				}
			}
		}
		for comp in ts.composites.values() {
			let ckey = self.composite_key_with(id, &schema, info.type_id, comp, None)?;
			self.kv_del(&ckey)?;
		}
		self.kv_del(&key::version::Version::new(info.version, id).encode())?;
		self.kv_delr(key::obj::obj_range(id))?;
		self.forget_obj_info(id);
		Ok(())
	}

	/// The resolved key and value schemas of a map field on one object.
	fn map_schemas(
		&mut self,
		id: ObjId,
		field: u32,
	) -> Result<Option<(SimpleSchema, SimpleSchema)>, Error> {
		let Some(info) = self.obj_info(id)? else {
			return Ok(None);
		};
		let schema = self.schema_at(info.version)?;
		let ts = schema.type_schema(info.type_id)?;
		match ts.fields.get(&field).map(|f| &f.kind) {
			Some(FieldKindSchema::Map {
				key,
				value,
			}) => Ok(Some((key.clone(), value.clone()))),
			_ => Ok(None),
		}
	}

	/// Apply the unreference action to one referrer: null a simple
	/// reference, remove a set element or map entry, or null a list
	/// element or map value.
	fn scrub_reference(&mut self, action: &RefAction, target: ObjId) -> Result<(), Error> {
		let y = action.referrer;
		if self.obj_info(y)?.is_none() {
			return Ok(());
		}
		let field = action.parent;
		let ref_enc = FieldCodec::Reference.encoded(&Value::Ref(target))?;
		let null_enc = FieldCodec::Reference.encoded(&Value::Null)?;
		match action.role {
			SidRole::Simple => {
				self.write_simple(y, action.sid, Value::Null, false)?;
			}
			SidRole::SetElem => {
				let ekey = key::obj::elem(y, field, &ref_enc);
				if self.kv_exists(&ekey)? {
					self.kv_del(&ekey)?;
					self.kv_del(&Index::encode_raw(action.sid, &ref_enc, y, &[]))?;
					self.enqueue(
						field,
						Change::SetRemove {
							id: y,
							field,
							element: Value::Ref(target),
						},
					);
				}
			}
			SidRole::ListElem => {
				let disc: [u8; 8] = action.disc.as_slice().try_into().map_err(|_| {
					Error::InconsistentDatabase("invalid list index discriminator".to_string())
				})?;
				let position = u64::from_be_bytes(disc);
				let ekey = key::obj::list_elem(y, field, position);
				if self.kv_get(&ekey)?.as_deref() == Some(ref_enc.as_slice()) {
					self.kv_set(ekey, null_enc.clone())?;
					self.kv_del(&Index::encode_raw(action.sid, &ref_enc, y, &action.disc))?;
					self.kv_set(
						Index::encode_raw(action.sid, &null_enc, y, &action.disc),
						Vec::new(),
					)?;
					self.enqueue(
						field,
						Change::ListReplace {
							id: y,
							field,
							index: position,
							old: Value::Ref(target),
							new: Value::Null,
						},
					);
				}
			}
			SidRole::MapKey => {
				let ekey = key::obj::elem(y, field, &ref_enc);
				if let Some(venc) = self.kv_get(&ekey)? {
					let Some((_, vs)) = self.map_schemas(y, field)? else {
						return Ok(());
					};
					self.kv_del(&ekey)?;
					self.kv_del(&Index::encode_raw(action.sid, &ref_enc, y, &[]))?;
					if vs.maintained() {
						self.kv_del(&Index::encode_raw(vs.storage_id, &venc, y, &ref_enc))?;
					}
					self.enqueue(
						field,
						Change::MapRemove {
							id: y,
							field,
							key: Value::Ref(target),
							value: vs.codec.decode_all(&venc)?,
						},
					);
				}
			}
			SidRole::MapValue => {
				let ekey = key::obj::elem(y, field, &action.disc);
				if self.kv_get(&ekey)?.as_deref() == Some(ref_enc.as_slice()) {
					let Some((ks, _)) = self.map_schemas(y, field)? else {
						return Ok(());
					};
					self.kv_set(ekey, null_enc.clone())?;
					self.kv_del(&Index::encode_raw(action.sid, &ref_enc, y, &action.disc))?;
					self.kv_set(
						Index::encode_raw(action.sid, &null_enc, y, &action.disc),
						Vec::new(),
					)?;
					self.enqueue(
						field,
						Change::MapReplace {
							id: y,
							field,
							key: ks.codec.decode_all(&action.disc)?,
							old: Value::Ref(target),
							new: Value::Null,
						},
					);
				}
			}
			_ => (),
		}
		Ok(())
	}
}
