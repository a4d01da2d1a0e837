//! The migration engine. An object records the schema version its fields
//! are stored under; migrating it to the transaction's version removes the
//! storage of dropped fields, installs default index entries for added
//! ones, adjusts index entries where the indexed flag changed, rebuilds
//! composite entries, scrubs references whose targets the new version no
//! longer permits, and moves the version index entry. Schema-change
//! listeners observe the migration together with the captured old values.

use crate::catalog::registry::{FieldKindSchema, FieldSchema, SimpleSchema, TypeSchema};
use crate::enc::{FieldCodec, Value};
use crate::err::Error;
use crate::key;
use crate::key::index::Index;
use crate::kvs::Transaction;
use crate::lsn::Change;
use crate::obj::{ObjId, ObjInfo};
use std::collections::{BTreeMap, BTreeSet};

impl Transaction {
	/// Migrate an object to this transaction's schema version. A no-op when
	/// the object is already there.
	pub fn migrate_schema(&mut self, id: ObjId) -> Result<(), Error> {
		self.mutation(|tx| tx.migrate_object(id))
	}

	pub(crate) fn migrate_object(&mut self, id: ObjId) -> Result<(), Error> {
		let info = self.obj_info_required(id)?;
		let to_version = self.version();
		if info.version == to_version {
			return Ok(());
		}
		let from = self.schema_at(info.version)?;
		let to = self.schema();
		let Some(new_ts) = to.types.get(&info.type_id).cloned() else {
			return Err(Error::TypeNotInVersion {
				id,
				version: to_version,
			});
		};
		let old_ts = from.type_schema(info.type_id)?.clone();
		debug!(
			target: "shale::core::obj",
			id = %id,
			from = info.version,
			to = to_version,
			"Migrating object"
		);
		// Capture the old simple and counter values for the listeners
		let mut old_values = BTreeMap::new();
		if !self.listeners.schema_change.is_empty() {
			for field in old_ts.fields.values() {
				match &field.kind {
					FieldKindSchema::Simple(s) => {
						let bytes = self.field_bytes(id, s)?;
						old_values.insert(field.storage_id, s.codec.decode_all(&bytes)?);
					}
					FieldKindSchema::Counter => {
						let value = match self
							.kv_get(&key::obj::Field::new(id, field.storage_id).encode())?
						{
							Some(bytes) => {
								let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
									Error::InconsistentDatabase(
										"invalid counter value length".to_string(),
									)
								})?;
								i64::from_be_bytes(bytes)
							}
							None => 0,
						};
						old_values.insert(field.storage_id, Value::I64(value));
					}
					_ => (),
				}
			}
		}
		// Remove the old version's composite entries while the component
		// values are still intact
		for comp in old_ts.composites.values() {
			let ckey = self.composite_key_with(id, &from, info.type_id, comp, None)?;
			self.kv_del(&ckey)?;
		}
		// Remove the storage and index entries of dropped fields
		for field in old_ts.fields.values() {
			if new_ts.fields.contains_key(&field.storage_id) {
				continue;
			}
			self.remove_field_storage(id, field)?;
		}
		// Install defaults for added fields, and adjust the index entries
		// of carried fields whose indexed status changed
		for field in new_ts.fields.values() {
			match old_ts.fields.get(&field.storage_id) {
				None => {
					// A new counter starts at zero and occupies no key; a
					// new simple field gets its default index entry
					if let FieldKindSchema::Simple(s) = &field.kind {
						if s.maintained() {
							let default = s.codec.encoded_default()?;
							self.kv_set(
								Index::encode_raw(s.storage_id, &default, id, &[]),
								Vec::new(),
							)?;
						}
					}
				}
				Some(old_field) => {
					self.adjust_field_indexing(id, field, old_field)?;
				}
			}
		}
		// Scrub references whose targets the new version no longer permits
		self.scrub_restricted_references(id, &new_ts)?;
		// Insert the new version's composite entries from current values
		for comp in new_ts.composites.values() {
			let ckey = self.composite_key_with(id, &to, info.type_id, comp, None)?;
			self.kv_set(ckey, Vec::new())?;
		}
		// Move the version index entry and rewrite the meta record
		self.kv_del(&key::version::Version::new(info.version, id).encode())?;
		self.kv_set(key::version::Version::new(to_version, id).encode(), Vec::new())?;
		self.write_obj_info(
			id,
			ObjInfo {
				version: to_version,
				..info
			},
		)?;
		// Notify the schema-change listeners
		self.fire_schema_change(Change::SchemaChange {
			id,
			from_version: info.version,
			to_version,
			old_values,
		});
		Ok(())
	}

	/// Remove a dropped field's content keys and index entries.
	pub(crate) fn remove_field_storage(&mut self, id: ObjId, field: &FieldSchema) -> Result<(), Error> {
		let fid = field.storage_id;
		match &field.kind {
			FieldKindSchema::Simple(s) => {
				if s.maintained() {
					let bytes = self.field_bytes(id, s)?;
					self.kv_del(&Index::encode_raw(s.storage_id, &bytes, id, &[]))?;
				}
				self.kv_del(&key::obj::Field::new(id, fid).encode())?;
			}
			FieldKindSchema::Counter => {
				self.kv_del(&key::obj::Field::new(id, fid).encode())?;
			}
			FieldKindSchema::Set {
				elem,
			} => {
				if elem.maintained() {
					let prefix_len = key::obj::Field::new(id, fid).encode().len();
					for k in self.scan_keys(key::obj::field_range(id, fid))? {
						self.kv_del(&Index::encode_raw(
							elem.storage_id,
							&k[prefix_len..],
							id,
							&[],
						))?;
					}
				}
				self.kv_delr(key::obj::field_range(id, fid))?;
			}
			FieldKindSchema::List {
				elem,
			} => {
				if elem.maintained() {
					let entries = self.scan_range(key::obj::field_range(id, fid))?;
					for (i, (_, v)) in entries.iter().enumerate() {
						self.kv_del(&Index::encode_raw(
							elem.storage_id,
							v,
							id,
							&(i as u64).to_be_bytes(),
						))?;
					}
				}
				self.kv_delr(key::obj::field_range(id, fid))?;
			}
			FieldKindSchema::Map {
				key: ks,
				value: vs,
			} => {
				if ks.maintained() || vs.maintained() {
					let prefix_len = key::obj::Field::new(id, fid).encode().len();
					let entries = self.scan_range(key::obj::field_range(id, fid))?;
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
				self.kv_delr(key::obj::field_range(id, fid))?;
			}
		}
		Ok(())
	}

	/// Insert or remove a sub-field's index entries when its indexed status
	/// changed between versions. `disc` derives the discriminator bytes of
	/// one entry from its position and key suffix.
	fn adjust_sub_indexing(
		&mut self,
		id: ObjId,
		fid: u32,
		old: &SimpleSchema,
		new: &SimpleSchema,
		entry_in_key: bool,
		disc: impl Fn(usize, &[u8]) -> Vec<u8>,
	) -> Result<(), Error> {
		let (was, now) = (old.maintained(), new.maintained());
		if was == now {
			return Ok(());
		}
		let prefix_len = key::obj::Field::new(id, fid).encode().len();
		let entries = self.scan_range(key::obj::field_range(id, fid))?;
		for (i, (k, v)) in entries.iter().enumerate() {
			let value = if entry_in_key {
				&k[prefix_len..]
			} else {
				v.as_slice()
			};
			let disc = disc(i, &k[prefix_len..]);
			let entry = Index::encode_raw(new.storage_id, value, id, &disc);
			if now {
				self.kv_set(entry, Vec::new())?;
			} else {
				self.kv_del(&entry)?;
			}
		}
		Ok(())
	}

	/// Adjust a carried field's index entries across an index status
	/// change. Field kinds are identical between versions; the registry
	/// enforced that when the schema was recorded.
	fn adjust_field_indexing(
		&mut self,
		id: ObjId,
		new_field: &FieldSchema,
		old_field: &FieldSchema,
	) -> Result<(), Error> {
		let fid = new_field.storage_id;
		match (&old_field.kind, &new_field.kind) {
			(FieldKindSchema::Simple(os), FieldKindSchema::Simple(ns)) => {
				let (was, now) = (os.maintained(), ns.maintained());
				if was != now {
					let bytes = self.field_bytes(id, ns)?;
					let entry = Index::encode_raw(ns.storage_id, &bytes, id, &[]);
					if now {
						self.kv_set(entry, Vec::new())?;
					} else {
						self.kv_del(&entry)?;
					}
				}
			}
			(
				FieldKindSchema::Set {
					elem: oe,
				},
				FieldKindSchema::Set {
					elem: ne,
				},
			) => {
				let (oe, ne) = (oe.clone(), ne.clone());
				self.adjust_sub_indexing(id, fid, &oe, &ne, true, |_, _| Vec::new())?;
			}
			(
				FieldKindSchema::List {
					elem: oe,
				},
				FieldKindSchema::List {
					elem: ne,
				},
			) => {
				let (oe, ne) = (oe.clone(), ne.clone());
				self.adjust_sub_indexing(id, fid, &oe, &ne, false, |i, _| {
					(i as u64).to_be_bytes().to_vec()
				})?;
			}
			(
				FieldKindSchema::Map {
					key: ok,
					value: ov,
				},
				FieldKindSchema::Map {
					key: nk,
					value: nv,
				},
			) => {
				let (ok, nk) = (ok.clone(), nk.clone());
				let (ov, nv) = (ov.clone(), nv.clone());
				self.adjust_sub_indexing(id, fid, &ok, &nk, true, |_, _| Vec::new())?;
				self.adjust_sub_indexing(id, fid, &ov, &nv, false, |_, kenc| kenc.to_vec())?;
			}
			_ => (),
		}
		Ok(())
	}

	/// Null or remove any reference whose target type the new version's
	/// whitelist no longer permits.
	fn scrub_restricted_references(&mut self, id: ObjId, ts: &TypeSchema) -> Result<(), Error> {
		let null_enc = FieldCodec::Reference.encoded(&Value::Null)?;
		for field in ts.fields.values() {
			let fid = field.storage_id;
			match &field.kind {
				FieldKindSchema::Simple(s) => {
					let Some(banned) = self.restricted_target(id, s)? else {
						continue;
					};
					// Nulling the field leaves no content key; the index
					// entry moves to the null value
					self.kv_del(&key::obj::Field::new(id, fid).encode())?;
					self.kv_del(&Index::encode_raw(s.storage_id, &banned, id, &[]))?;
					if s.maintained() {
						self.kv_set(Index::encode_raw(s.storage_id, &null_enc, id, &[]), Vec::new())?;
					}
				}
				FieldKindSchema::Set {
					elem,
				} => {
					let Some(allowed) = reference_whitelist(elem) else {
						continue;
					};
					let prefix_len = key::obj::Field::new(id, fid).encode().len();
					for k in self.scan_keys(key::obj::field_range(id, fid))? {
						let enc = k[prefix_len..].to_vec();
						if target_outside(&enc, &allowed)? {
							self.kv_del(&k)?;
							self.kv_del(&Index::encode_raw(elem.storage_id, &enc, id, &[]))?;
						}
					}
				}
				FieldKindSchema::List {
					elem,
				} => {
					let Some(allowed) = reference_whitelist(elem) else {
						continue;
					};
					let entries = self.scan_range(key::obj::field_range(id, fid))?;
					for (i, (k, v)) in entries.iter().enumerate() {
						if target_outside(v, &allowed)? {
							let disc = (i as u64).to_be_bytes();
							self.kv_set(k.clone(), null_enc.clone())?;
							self.kv_del(&Index::encode_raw(elem.storage_id, v, id, &disc))?;
							self.kv_set(
								Index::encode_raw(elem.storage_id, &null_enc, id, &disc),
								Vec::new(),
							)?;
						}
					}
				}
				FieldKindSchema::Map {
					key: ks,
					value: vs,
				} => {
					let prefix_len = key::obj::Field::new(id, fid).encode().len();
					if let Some(allowed) = reference_whitelist(ks) {
						for (k, v) in self.scan_range(key::obj::field_range(id, fid))? {
							let kenc = k[prefix_len..].to_vec();
							if target_outside(&kenc, &allowed)? {
								self.kv_del(&k)?;
								self.kv_del(&Index::encode_raw(ks.storage_id, &kenc, id, &[]))?;
								if vs.maintained() {
									self.kv_del(&Index::encode_raw(vs.storage_id, &v, id, &kenc))?;
								}
							}
						}
					}
					if let Some(allowed) = reference_whitelist(vs) {
						for (k, v) in self.scan_range(key::obj::field_range(id, fid))? {
							let kenc = k[prefix_len..].to_vec();
							if target_outside(&v, &allowed)? {
								self.kv_set(k.clone(), null_enc.clone())?;
								self.kv_del(&Index::encode_raw(vs.storage_id, &v, id, &kenc))?;
								self.kv_set(
									Index::encode_raw(vs.storage_id, &null_enc, id, &kenc),
									Vec::new(),
								)?;
							}
						}
					}
				}
				_ => (),
			}
		}
		Ok(())
	}

	/// For a simple reference field, the current encoded value when its
	/// target type falls outside the new whitelist.
	fn restricted_target(
		&mut self,
		id: ObjId,
		s: &SimpleSchema,
	) -> Result<Option<Vec<u8>>, Error> {
		let Some(allowed) = reference_whitelist(s) else {
			return Ok(None);
		};
		let Some(bytes) = self.kv_get(&key::obj::Field::new(id, s.storage_id).encode())? else {
			return Ok(None);
		};
		if target_outside(&bytes, &allowed)? {
			Ok(Some(bytes))
		} else {
			Ok(None)
		}
	}
}

/// The whitelist of a reference field or sub-field, when one is declared.
fn reference_whitelist(s: &SimpleSchema) -> Option<BTreeSet<u32>> {
	s.reference.as_ref().and_then(|r| r.target_types.clone())
}

/// Whether encoded reference bytes point at a type outside a whitelist.
fn target_outside(enc: &[u8], allowed: &BTreeSet<u32>) -> Result<bool, Error> {
	match FieldCodec::Reference.decode_all(enc)? {
		Value::Ref(target) => Ok(!allowed.contains(&target.type_id()?)),
		_ => Ok(false),
	}
}
