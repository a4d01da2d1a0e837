//! Live views over simple and sub-field indexes. A view re-scans the store
//! on every navigation; byte-range filters may be attached to the value and
//! target slots and compose by intersection.

use super::ranges::KeyRanges;
use crate::enc::varint::read_uvarint;
use crate::enc::{Reader, Value};
use crate::err::Error;
use crate::key;
use crate::kvs::Transaction;
use crate::obj::ObjId;
use std::collections::{BTreeMap, BTreeSet};

impl Transaction {
	/// Open the live view over the index of a simple field or a complex
	/// sub-field, regardless of which schema version defined it. The view
	/// exposes the union of entries across versions. Fails with
	/// [`Error::UnknownIndex`] when the storage-id is neither indexed nor a
	/// reference in any recorded version.
	pub fn query_index(&mut self, sid: u32) -> Result<IndexView<'_>, Error> {
		let registry = self.registry();
		let info = {
			let guard = registry.read();
			match guard.index_info(sid) {
				Ok(info) => info,
				// Reference fields answer referrer queries through their
				// index even when not declared indexed
				Err(Error::UnknownIndex(_)) => {
					guard.reference_info(sid).ok_or(Error::UnknownIndex(sid))?
				}
				Err(e) => return Err(e),
			}
		};
		Ok(IndexView {
			tx: self,
			info,
			value_filter: None,
			target_filter: None,
		})
	}
}

/// One materialised entry of a simple or sub-field index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
	pub value: Value,
	pub id: ObjId,
	/// The list position or map key for sub-field entries which carry one
	pub disc: Option<Value>,
}

/// A live view over one simple or sub-field index.
pub struct IndexView<'a> {
	tx: &'a mut Transaction,
	info: crate::catalog::registry::IndexInfo,
	value_filter: Option<KeyRanges>,
	target_filter: Option<KeyRanges>,
}

impl IndexView<'_> {
	/// Restrict the view to entries whose encoded value falls inside the
	/// given ranges. Filters compose by intersection.
	pub fn filter_value(mut self, ranges: KeyRanges) -> Self {
		self.value_filter = Some(match self.value_filter.take() {
			Some(existing) => existing.intersect(&ranges),
			None => ranges,
		});
		self
	}

	/// Restrict the view to entries whose object identifier falls inside
	/// the given ranges. Filters compose by intersection.
	pub fn filter_target(mut self, ranges: KeyRanges) -> Self {
		self.target_filter = Some(match self.target_filter.take() {
			Some(existing) => existing.intersect(&ranges),
			None => ranges,
		});
		self
	}

	/// Materialise the current entries, in value order.
	pub fn entries(&mut self) -> Result<Vec<IndexEntry>, Error> {
		let keys = self.tx.scan_keys(key::index::all_range(self.info.field))?;
		let mut out = Vec::with_capacity(keys.len());
		for k in keys {
			let mut r = Reader::new(&k);
			read_uvarint(&mut r)?;
			let value_start = r.position();
			self.info.codec.skip(&mut r)?;
			let value_bytes = &k[value_start..r.position()];
			if let Some(filter) = &self.value_filter {
				if !filter.contains(value_bytes) {
					continue;
				}
			}
			let id_start = r.position();
			let id = ObjId::decode(&mut r)?;
			if let Some(filter) = &self.target_filter {
				if !filter.contains(&k[id_start..id_start + crate::cnf::OBJ_ID_LENGTH]) {
					continue;
				}
			}
			let value = self.info.codec.decode_all(value_bytes)?;
			let disc = match &self.info.disc {
				Some(codec) => Some(codec.decode_all(&k[r.position()..])?),
				None => {
					if r.remaining() > 0 {
						return Err(Error::InconsistentDatabase(
							"trailing bytes in index entry".to_string(),
						));
					}
					None
				}
			};
			out.push(IndexEntry {
				value,
				id,
				disc,
			});
		}
		Ok(out)
	}

	/// The entries as `(value, id)` pairs, in value order.
	pub fn as_set(&mut self) -> Result<Vec<(Value, ObjId)>, Error> {
		Ok(self.entries()?.into_iter().map(|e| (e.value, e.id)).collect())
	}

	/// The entries grouped by value.
	pub fn as_map(&mut self) -> Result<BTreeMap<Value, BTreeSet<ObjId>>, Error> {
		let mut out: BTreeMap<Value, BTreeSet<ObjId>> = BTreeMap::new();
		for entry in self.entries()? {
			out.entry(entry.value).or_default().insert(entry.id);
		}
		Ok(out)
	}

	/// The objects carrying one specific value.
	pub fn get(&mut self, value: &Value) -> Result<BTreeSet<ObjId>, Error> {
		let enc = self.info.codec.encoded(value)?;
		let keys = self.tx.scan_keys(key::index::value_range(self.info.field, &enc))?;
		let mut out = BTreeSet::new();
		for k in keys {
			let mut r = Reader::new(&k);
			read_uvarint(&mut r)?;
			self.info.codec.skip(&mut r)?;
			let id_start = r.position();
			let id = ObjId::decode(&mut r)?;
			if let Some(filter) = &self.target_filter {
				if !filter.contains(&k[id_start..id_start + crate::cnf::OBJ_ID_LENGTH]) {
					continue;
				}
			}
			out.insert(id);
		}
		Ok(out)
	}
}
