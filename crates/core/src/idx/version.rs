//! The live view over the schema-version index, mapping each recorded
//! version to the objects currently stored at it.

use crate::err::Error;
use crate::key;
use crate::kvs::Transaction;
use crate::obj::ObjId;
use std::collections::{BTreeMap, BTreeSet};

impl Transaction {
	/// Open the live view over the version index.
	pub fn query_version(&mut self) -> VersionView<'_> {
		VersionView {
			tx: self,
		}
	}
}

/// A live view over the version index.
pub struct VersionView<'a> {
	tx: &'a mut Transaction,
}

impl VersionView<'_> {
	/// The entries grouped by schema version.
	pub fn as_map(&mut self) -> Result<BTreeMap<u32, BTreeSet<ObjId>>, Error> {
		let keys = self.tx.scan_keys(key::version::all_range())?;
		let mut out: BTreeMap<u32, BTreeSet<ObjId>> = BTreeMap::new();
		for k in keys {
			let entry = key::version::Version::decode(&k)?;
			out.entry(entry.version).or_default().insert(entry.id);
		}
		Ok(out)
	}

	/// The objects stored at one schema version.
	pub fn objects_at(&mut self, version: u32) -> Result<BTreeSet<ObjId>, Error> {
		let keys = self.tx.scan_keys(key::version::version_range(version))?;
		keys.iter().map(|k| Ok(key::version::Version::decode(k)?.id)).collect()
	}
}
