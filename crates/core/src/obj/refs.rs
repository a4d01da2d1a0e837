//! Reference navigation: who refers to an object through a given reference
//! field (answered from the field's index entries), what an object refers to
//! through a given field, and the inversion of whole reference paths.

use crate::catalog::registry::SidRole;
use crate::enc::varint::read_uvarint;
use crate::enc::{FieldCodec, Reader, Value};
use crate::err::Error;
use crate::key;
use crate::kvs::Transaction;
use crate::obj::ObjId;
use std::collections::BTreeSet;

impl Transaction {
	/// The objects referring to `target` through the reference field or
	/// sub-field `sid`, along with the discriminator bytes of each index
	/// entry (empty for simple fields, set elements, and map keys; the list
	/// position or encoded map key otherwise).
	pub(crate) fn referrers_with_disc(
		&mut self,
		target: ObjId,
		sid: u32,
	) -> Result<Vec<(ObjId, Vec<u8>)>, Error> {
		let enc = FieldCodec::Reference.encoded(&Value::Ref(target))?;
		let keys = self.scan_keys(key::index::value_range(sid, &enc))?;
		let mut out = Vec::with_capacity(keys.len());
		for k in keys {
			let mut r = Reader::new(&k);
			read_uvarint(&mut r)?;
			FieldCodec::Reference.skip(&mut r)?;
			let id = ObjId::decode(&mut r)?;
			let disc = k[r.position()..].to_vec();
			out.push((id, disc));
		}
		Ok(out)
	}

	/// The set of objects referring to `target` through `sid`.
	pub(crate) fn referrers(&mut self, target: ObjId, sid: u32) -> Result<BTreeSet<ObjId>, Error> {
		Ok(self.referrers_with_disc(target, sid)?.into_iter().map(|(id, _)| id).collect())
	}

	/// The objects `id` refers to through the reference field or sub-field
	/// `sid`, resolved against the object's own schema version. List
	/// elements and map keys and values all count.
	pub(crate) fn forward_targets(&mut self, id: ObjId, sid: u32) -> Result<BTreeSet<ObjId>, Error> {
		let mut out = BTreeSet::new();
		let Some(info) = self.obj_info(id)? else {
			return Ok(out);
		};
		let schema = self.schema_at(info.version)?;
		let Some((loc, _)) = schema.reference_at(sid) else {
			return Ok(out);
		};
		if loc.type_id != info.type_id {
			return Ok(out);
		}
		let field = loc.field;
		match loc.role {
			SidRole::Simple => {
				if let Some(bytes) = self.kv_get(&key::obj::Field::new(id, field).encode())? {
					if let Value::Ref(target) = FieldCodec::Reference.decode_all(&bytes)? {
						out.insert(target);
					}
				}
			}
			SidRole::SetElem | SidRole::MapKey => {
				// The referenced identifiers sit in the key suffixes
				let prefix_len = key::obj::Field::new(id, field).encode().len();
				for k in self.scan_keys(key::obj::field_range(id, field))? {
					let mut r = Reader::new(&k[prefix_len..]);
					if let Value::Ref(target) = FieldCodec::Reference.decode(&mut r)? {
						out.insert(target);
					}
				}
			}
			SidRole::ListElem | SidRole::MapValue => {
				// The referenced identifiers sit in the stored values
				for (_, v) in self.scan_range(key::obj::field_range(id, field))? {
					if let Value::Ref(target) = FieldCodec::Reference.decode_all(&v)? {
						out.insert(target);
					}
				}
			}
			_ => (),
		}
		Ok(out)
	}

	/// Apply one path step to a set of objects: a non-negative storage-id
	/// walks backwards to the referrers, a negated storage-id walks
	/// forwards to the referenced objects.
	fn walk_step(&mut self, current: &BTreeSet<ObjId>, step: i64) -> Result<BTreeSet<ObjId>, Error> {
		let mut next = BTreeSet::new();
		if step >= 0 {
			for id in current {
				next.extend(self.referrers(*id, step as u32)?);
			}
		} else {
			for id in current {
				next.extend(self.forward_targets(*id, step.unsigned_abs() as u32)?);
			}
		}
		Ok(next)
	}

	/// Invert a reference path: starting from the given objects, walk each
	/// step of the sequence in order, stopping early once the set is empty.
	pub fn invert_path(
		&mut self,
		start: &BTreeSet<ObjId>,
		path: &[i64],
	) -> Result<BTreeSet<ObjId>, Error> {
		let mut current = start.clone();
		for step in path {
			if current.is_empty() {
				break;
			}
			current = self.walk_step(&current, *step)?;
		}
		Ok(current)
	}

	/// Walk a monitor's path backwards from a changed object to the set of
	/// objects observing it. The path is stated from watcher to target, so
	/// the walk consumes it in reverse, inverting each step.
	pub(crate) fn monitor_referrers(
		&mut self,
		start: ObjId,
		path: &[i64],
	) -> Result<BTreeSet<ObjId>, Error> {
		let mut current: BTreeSet<ObjId> = [start].into_iter().collect();
		for step in path.iter().rev() {
			if current.is_empty() {
				break;
			}
			current = self.walk_step(&current, *step)?;
		}
		Ok(current)
	}
}
