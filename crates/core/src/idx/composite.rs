//! Live views over composite indexes. A composite entry concatenates the
//! component encodings in index order, so a prefix of components narrows
//! the scan directly; the remaining components peel off into a lower-order
//! view.

use super::ranges::KeyRanges;
use crate::enc::varint::read_uvarint;
use crate::enc::{FieldCodec, Reader, Value};
use crate::err::Error;
use crate::key;
use crate::kvs::Transaction;
use crate::obj::ObjId;
use std::collections::{BTreeMap, BTreeSet};

impl Transaction {
	/// Open the live view over a composite index, regardless of which
	/// schema version defined it.
	pub fn query_composite(&mut self, cid: u32) -> Result<CompositeView<'_>, Error> {
		let registry = self.registry();
		let codecs = registry.read().composite_info(cid)?;
		let filters = vec![None; codecs.len()];
		Ok(CompositeView {
			tx: self,
			cid,
			codecs,
			filters,
			target_filter: None,
		})
	}
}

/// A live view over one composite index.
pub struct CompositeView<'a> {
	tx: &'a mut Transaction,
	cid: u32,
	codecs: Vec<FieldCodec>,
	filters: Vec<Option<KeyRanges>>,
	target_filter: Option<KeyRanges>,
}

impl CompositeView<'_> {
	/// The number of components.
	pub fn arity(&self) -> usize {
		self.codecs.len()
	}

	/// Restrict one component slot to encoded values inside the given
	/// ranges. Filters compose by intersection.
	pub fn filter_slot(mut self, slot: usize, ranges: KeyRanges) -> Result<Self, Error> {
		let Some(filter) = self.filters.get_mut(slot) else {
			return Err(Error::UnknownIndex(self.cid));
		};
		*filter = Some(match filter.take() {
			Some(existing) => existing.intersect(&ranges),
			None => ranges,
		});
		Ok(self)
	}

	/// Restrict the view to entries whose object identifier falls inside
	/// the given ranges.
	pub fn filter_target(mut self, ranges: KeyRanges) -> Self {
		self.target_filter = Some(match self.target_filter.take() {
			Some(existing) => existing.intersect(&ranges),
			None => ranges,
		});
		self
	}

	/// Materialise the current entries under a key prefix of pre-encoded
	/// leading components.
	fn scan(&mut self, prefix: &[Vec<u8>]) -> Result<Vec<(Vec<Value>, ObjId)>, Error> {
		let keys = self.tx.scan_keys(key::composite::prefix_range(self.cid, prefix))?;
		let mut out = Vec::with_capacity(keys.len());
		'keys: for k in keys {
			let mut r = Reader::new(&k);
			read_uvarint(&mut r)?;
			let mut values = Vec::with_capacity(self.codecs.len());
			for (slot, codec) in self.codecs.iter().enumerate() {
				let start = r.position();
				codec.skip(&mut r)?;
				let bytes = &k[start..r.position()];
				if let Some(Some(filter)) = self.filters.get(slot) {
					if !filter.contains(bytes) {
						continue 'keys;
					}
				}
				values.push(codec.decode_all(bytes)?);
			}
			let id_start = r.position();
			let id = ObjId::decode(&mut r)?;
			if let Some(filter) = &self.target_filter {
				if !filter.contains(&k[id_start..id_start + crate::cnf::OBJ_ID_LENGTH]) {
					continue;
				}
			}
			if r.remaining() > 0 {
				return Err(Error::InconsistentDatabase(
					"trailing bytes in composite index entry".to_string(),
				));
			}
			out.push((values, id));
		}
		Ok(out)
	}

	/// The entries as `(components, id)` pairs, in component order.
	pub fn as_set(&mut self) -> Result<Vec<(Vec<Value>, ObjId)>, Error> {
		self.scan(&[])
	}

	/// The entries grouped by component tuple.
	pub fn as_map(&mut self) -> Result<BTreeMap<Vec<Value>, BTreeSet<ObjId>>, Error> {
		let mut out: BTreeMap<Vec<Value>, BTreeSet<ObjId>> = BTreeMap::new();
		for (values, id) in self.scan(&[])? {
			out.entry(values).or_default().insert(id);
		}
		Ok(out)
	}

	/// Peel off the first component: the entries carrying the given value
	/// there, each reduced to its remaining components.
	pub fn as_map_of_index(&mut self, first: &Value) -> Result<Vec<(Vec<Value>, ObjId)>, Error> {
		let Some(codec) = self.codecs.first() else {
			return Err(Error::UnknownIndex(self.cid));
		};
		let enc = codec.encoded(first)?;
		let entries = self.scan(std::slice::from_ref(&enc))?;
		Ok(entries.into_iter().map(|(mut values, id)| (values.split_off(1), id)).collect())
	}
}
