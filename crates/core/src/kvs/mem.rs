//! An in-memory ordered key-value store. Writes are buffered per
//! transaction and applied to the shared tree on commit. This backend powers
//! tests and detached transactions; durability is out of scope.

use super::api::{KVStore, KVTransaction};
use super::{Key, Val};
use crate::err::Error;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// A shared in-memory store.
#[derive(Default, Clone)]
pub struct MemStore {
	db: Arc<RwLock<BTreeMap<Key, Val>>>,
}

impl MemStore {
	/// Open a new empty store.
	pub fn new() -> Self {
		Self::default()
	}
}

impl KVStore for MemStore {
	fn transaction(&self, write: bool) -> Result<Box<dyn KVTransaction>, Error> {
		Ok(Box::new(MemTransaction {
			done: false,
			write,
			db: self.db.clone(),
			buf: BTreeMap::new(),
		}))
	}
}

/// A transaction over the in-memory store. Reads see the shared tree merged
/// with this transaction's own buffered writes; `None` buffers a deletion.
pub struct MemTransaction {
	/// Is the transaction complete?
	done: bool,
	/// Is the transaction writeable?
	write: bool,
	/// The underlying shared tree
	db: Arc<RwLock<BTreeMap<Key, Val>>>,
	/// Buffered writes, applied on commit
	buf: BTreeMap<Key, Option<Val>>,
}

impl MemTransaction {
	/// Check the transaction is still open.
	fn check_open(&self) -> Result<(), Error> {
		if self.done {
			return Err(Error::Stale);
		}
		Ok(())
	}

	/// Check the transaction is open and writeable.
	fn check_write(&self) -> Result<(), Error> {
		self.check_open()?;
		if !self.write {
			return Err(Error::Tx("transaction is read-only".to_string()));
		}
		Ok(())
	}
}

impl Drop for MemTransaction {
	fn drop(&mut self) {
		if !self.done && self.write && !self.buf.is_empty() {
			trace!(
				target: "shale::core::kvs::mem",
				"A transaction was dropped without being committed or cancelled"
			);
		}
	}
}

impl KVTransaction for MemTransaction {
	/// Check if closed
	fn closed(&self) -> bool {
		self.done
	}

	/// Check if writeable
	fn writeable(&self) -> bool {
		self.write
	}

	/// Cancel a transaction
	fn cancel(&mut self) -> Result<(), Error> {
		// Check to see if transaction is closed
		if self.done {
			return Err(Error::Stale);
		}
		// Mark this transaction as done
		self.done = true;
		// Discard any buffered writes
		self.buf.clear();
		// Continue
		Ok(())
	}

	/// Commit a transaction
	fn commit(&mut self) -> Result<(), Error> {
		// Check to see if transaction is closed
		self.check_write()?;
		// Mark this transaction as done
		self.done = true;
		// Apply the buffered writes to the shared tree
		let mut db = self.db.write();
		for (key, val) in std::mem::take(&mut self.buf) {
			match val {
				Some(val) => {
					db.insert(key, val);
				}
				None => {
					db.remove(&key);
				}
			}
		}
		// Continue
		Ok(())
	}

	/// Check if a key exists
	fn exists(&mut self, key: &[u8]) -> Result<bool, Error> {
		self.check_open()?;
		if let Some(buffered) = self.buf.get(key) {
			return Ok(buffered.is_some());
		}
		Ok(self.db.read().contains_key(key))
	}

	/// Fetch a key from the store
	fn get(&mut self, key: &[u8]) -> Result<Option<Val>, Error> {
		self.check_open()?;
		if let Some(buffered) = self.buf.get(key) {
			return Ok(buffered.clone());
		}
		Ok(self.db.read().get(key).cloned())
	}

	/// Insert or update a key in the store
	fn set(&mut self, key: Key, val: Val) -> Result<(), Error> {
		self.check_write()?;
		self.buf.insert(key, Some(val));
		Ok(())
	}

	/// Delete a key from the store
	fn del(&mut self, key: &[u8]) -> Result<(), Error> {
		self.check_write()?;
		self.buf.insert(key.to_vec(), None);
		Ok(())
	}

	/// Delete a range of keys from the store
	fn delr(&mut self, rng: Range<Key>) -> Result<(), Error> {
		self.check_write()?;
		if rng.start >= rng.end {
			return Ok(());
		}
		let keys: Vec<Key> = {
			let db = self.db.read();
			db.range(rng.clone()).map(|(k, _)| k.clone()).collect()
		};
		for key in keys {
			self.buf.insert(key, None);
		}
		let buffered: Vec<Key> = self.buf.range(rng).map(|(k, _)| k.clone()).collect();
		for key in buffered {
			self.buf.insert(key, None);
		}
		Ok(())
	}

	/// Retrieve a range of keys from the store
	fn scan(&mut self, rng: Range<Key>, limit: u32) -> Result<Vec<(Key, Val)>, Error> {
		self.check_open()?;
		if rng.start >= rng.end {
			return Ok(Vec::new());
		}
		// Merge the shared tree with this transaction's buffered writes
		let mut merged: BTreeMap<Key, Val> = {
			let db = self.db.read();
			db.range(rng.clone()).map(|(k, v)| (k.clone(), v.clone())).collect()
		};
		for (key, val) in self.buf.range(rng) {
			match val {
				Some(val) => {
					merged.insert(key.clone(), val.clone());
				}
				None => {
					merged.remove(key);
				}
			}
		}
		Ok(merged.into_iter().take(limit as usize).collect())
	}

	/// Set the remaining time budget: the in-memory store has no timeouts
	fn set_timeout(&mut self, _ms: u64) -> Result<(), Error> {
		self.check_open()
	}
}
