//! The transaction: the unit of work against a datastore. A transaction
//! owns its underlying key-value transaction exclusively, serialises all
//! object operations through `&mut self`, and is consumed by commit or
//! rollback. Listener callbacks run synchronously at the end of the
//! outermost mutating call.

use super::api::KVTransaction;
use super::ds::{SchemaRemoval, TransactionOptions};
use super::{Key, Val};
use crate::catalog::registry::{Schema, SchemaRegistry};
use crate::cnf::{OBJ_INFO_CACHE_SIZE, SCAN_BATCH_SIZE};
use crate::err::Error;
use crate::key;
use crate::key::debug::Sprintable;
use crate::lsn::{Change, Listeners};
use crate::obj::{ObjId, ObjInfo};
use parking_lot::RwLock;
use quick_cache::sync::Cache;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;
use std::sync::Arc;

/// A callback invoked inside commit, before the underlying store commits.
/// An error aborts the commit and rolls the transaction back.
pub type BeforeCommit = Box<dyn FnMut(&mut Transaction) -> Result<(), Error>>;

/// A callback invoked after the transaction completes, with `true` on
/// commit and `false` on rollback. Errors are logged and swallowed.
pub type AfterCompletion = Box<dyn FnMut(bool) -> Result<(), Error>>;

/// A transaction against a datastore.
pub struct Transaction {
	/// The underlying key-value transaction
	kv: Box<dyn KVTransaction>,
	/// The shared schema registry
	registry: Arc<RwLock<SchemaRegistry>>,
	/// The schema version this transaction operates at
	schema: Arc<Schema>,
	/// Whether commit or rollback has begun
	done: bool,
	/// Whether commit behaves as rollback
	read_only: bool,
	/// Whether commit is forbidden
	rollback_only: bool,
	/// Whether this transaction is detached from durable storage
	detached: bool,
	/// When unused schema versions may be removed
	schema_removal: SchemaRemoval,
	/// Nested mutation depth, for notification draining
	depth: usize,
	/// Whether the pending queue is currently being drained
	draining: bool,
	/// Cached object meta-data
	objinfo: Cache<ObjId, ObjInfo>,
	/// Listener state
	pub(crate) listeners: Listeners,
	/// Pending notifications, ordered by field storage-id then insertion
	pub(crate) pending: BTreeMap<u32, VecDeque<Change>>,
	/// When present, deleted-reference assignments are recorded here
	/// instead of failing; installed by the copy engine
	pub(crate) deleted_assignments: Option<BTreeMap<ObjId, (u32, ObjId)>>,
	/// Callbacks run inside commit
	before_commit: Vec<BeforeCommit>,
	/// Callbacks run after completion
	after_completion: Vec<AfterCompletion>,
}

impl Transaction {
	/// Assemble a transaction over an open key-value transaction.
	pub(crate) fn new(
		kv: Box<dyn KVTransaction>,
		registry: Arc<RwLock<SchemaRegistry>>,
		schema: Arc<Schema>,
		opts: &TransactionOptions,
	) -> Self {
		Self {
			kv,
			registry,
			schema,
			done: false,
			read_only: opts.read_only,
			rollback_only: false,
			detached: false,
			schema_removal: opts.schema_removal,
			depth: 0,
			draining: false,
			objinfo: Cache::new(*OBJ_INFO_CACHE_SIZE),
			listeners: Listeners::default(),
			pending: BTreeMap::new(),
			deleted_assignments: None,
			before_commit: Vec::new(),
			after_completion: Vec::new(),
		}
	}

	/// Mark a transaction as detached: object operations work, commit and
	/// rollback do not.
	pub(crate) fn set_detached(&mut self) {
		self.detached = true;
	}

	// --------------------------------------------------------------------
	// Lifecycle
	// --------------------------------------------------------------------

	/// The schema version this transaction operates at.
	pub fn version(&self) -> u32 {
		self.schema.version
	}

	/// The resolved schema this transaction operates at.
	pub(crate) fn schema(&self) -> Arc<Schema> {
		self.schema.clone()
	}

	/// The shared schema registry.
	pub(crate) fn registry(&self) -> Arc<RwLock<SchemaRegistry>> {
		self.registry.clone()
	}

	/// Every schema version currently recorded.
	pub fn versions(&self) -> Vec<u32> {
		self.registry.read().versions()
	}

	/// Whether operations are still permitted on this transaction.
	pub fn is_valid(&self) -> bool {
		!self.done
	}

	/// Whether this transaction is detached from durable storage.
	pub fn is_detached(&self) -> bool {
		self.detached
	}

	/// Mark this transaction so that commit behaves as rollback.
	pub fn set_read_only(&mut self) {
		self.read_only = true;
	}

	/// Whether commit will behave as rollback.
	pub fn is_read_only(&self) -> bool {
		self.read_only
	}

	/// Mark this transaction so that commit fails and rolls back.
	pub fn set_rollback_only(&mut self) {
		self.rollback_only = true;
	}

	/// Whether commit is forbidden.
	pub fn is_rollback_only(&self) -> bool {
		self.rollback_only
	}

	/// Set the remaining time budget, delegated to the key-value store.
	pub fn set_timeout(&mut self, ms: u64) -> Result<(), Error> {
		self.check_active()?;
		self.kv.set_timeout(ms)
	}

	/// Register a callback to run inside commit, before the underlying
	/// store commits. An error aborts the commit and rolls back.
	pub fn before_commit(&mut self, cb: BeforeCommit) {
		self.before_commit.push(cb);
	}

	/// Register a callback to run after the transaction completes.
	pub fn after_completion(&mut self, cb: AfterCompletion) {
		self.after_completion.push(cb);
	}

	/// Commit this transaction. Consumes the transaction; re-entrant
	/// completion is therefore impossible by construction.
	pub fn commit(mut self) -> Result<(), Error> {
		// Check to see if the transaction is still open
		self.check_active()?;
		// A detached transaction has nothing to commit to
		if self.detached {
			return Err(Error::Tx("a detached transaction cannot be committed".to_string()));
		}
		// Run the before-commit callbacks; any error aborts the commit
		let mut callbacks = std::mem::take(&mut self.before_commit);
		for cb in &mut callbacks {
			if let Err(e) = cb(&mut self) {
				trace!(target: "shale::core::kvs::tx", "A before-commit callback failed; rolling back");
				if let Err(inner) = self.finish(false) {
					warn!(target: "shale::core::kvs::tx", error = %inner, "Rollback failed");
				}
				return Err(e);
			}
		}
		// A rollback-only transaction refuses to commit
		if self.rollback_only {
			self.finish(false)?;
			return Err(Error::RollbackOnly);
		}
		// A read-only transaction completes without writing
		if self.read_only {
			self.finish(true)?;
			return Ok(());
		}
		// Mark this transaction as done
		self.done = true;
		// Commit the underlying transaction
		let result = self.kv.commit();
		// Run the completion callbacks
		self.complete(result.is_ok());
		// Surface the commit outcome
		result
	}

	/// Roll back this transaction, discarding every change.
	pub fn rollback(mut self) -> Result<(), Error> {
		// Check to see if the transaction is still open
		self.check_active()?;
		// A detached transaction has nothing to roll back
		if self.detached {
			return Err(Error::Tx("a detached transaction cannot be rolled back".to_string()));
		}
		// Cancel and run the completion callbacks
		self.finish(false)
	}

	/// Cancel the underlying transaction and fire completion callbacks.
	/// With `committed` set, the store is still cancelled (the read-only
	/// path) but callbacks observe a successful completion.
	fn finish(&mut self, committed: bool) -> Result<(), Error> {
		// Mark this transaction as done
		self.done = true;
		// Discard any undelivered notifications
		self.pending.clear();
		// Cancel the underlying transaction
		let result = self.kv.cancel();
		// Run the completion callbacks
		self.complete(committed);
		// Surface the cancel outcome
		result
	}

	/// Run the after-completion callbacks, logging and swallowing errors.
	fn complete(&mut self, committed: bool) {
		let mut callbacks = std::mem::take(&mut self.after_completion);
		for cb in &mut callbacks {
			if let Err(e) = cb(committed) {
				warn!(
					target: "shale::core::kvs::tx",
					error = %e,
					"An after-completion callback failed"
				);
			}
		}
	}

	/// Fail with [`Error::Stale`] once commit or rollback has begun.
	pub(crate) fn check_active(&self) -> Result<(), Error> {
		if self.done || self.kv.closed() {
			return Err(Error::Stale);
		}
		Ok(())
	}

	// --------------------------------------------------------------------
	// Mutation scope
	// --------------------------------------------------------------------

	/// Run a mutating operation. Notifications enqueued during the
	/// operation are delivered when the outermost mutation completes
	/// successfully; a failed outermost mutation discards them.
	pub(crate) fn mutation<R>(
		&mut self,
		f: impl FnOnce(&mut Self) -> Result<R, Error>,
	) -> Result<R, Error> {
		self.check_active()?;
		self.depth += 1;
		let result = f(self);
		self.depth -= 1;
		if self.depth > 0 || self.draining {
			return result;
		}
		match result {
			Ok(value) => {
				self.drain_pending()?;
				Ok(value)
			}
			Err(e) => {
				self.pending.clear();
				Err(e)
			}
		}
	}

	/// Deliver every pending notification, in ascending field storage-id
	/// order, then insertion order. Listeners may mutate the transaction;
	/// notifications they enqueue are consumed by this same loop.
	fn drain_pending(&mut self) -> Result<(), Error> {
		self.draining = true;
		let result = self.drain_loop();
		self.draining = false;
		if result.is_err() {
			self.pending.clear();
		}
		result
	}

	fn drain_loop(&mut self) -> Result<(), Error> {
		loop {
			// Pop the lowest-ordered pending notification
			let Some((&sort, _)) = self.pending.iter().next() else {
				return Ok(());
			};
			let change = match self.pending.get_mut(&sort) {
				Some(queue) => {
					let change = queue.pop_front();
					if queue.is_empty() {
						self.pending.remove(&sort);
					}
					change
				}
				None => None,
			};
			if let Some(change) = change {
				self.deliver(sort, change)?;
			}
		}
	}

	/// Push a notification onto the pending queue under its ordering key.
	pub(crate) fn enqueue(&mut self, sort: u32, change: Change) {
		self.pending.entry(sort).or_default().push_back(change);
	}

	// --------------------------------------------------------------------
	// Key-value plumbing
	// --------------------------------------------------------------------

	pub(crate) fn kv_exists(&mut self, key: &[u8]) -> Result<bool, Error> {
		self.check_active()?;
		self.kv.exists(key)
	}

	pub(crate) fn kv_get(&mut self, key: &[u8]) -> Result<Option<Val>, Error> {
		self.check_active()?;
		self.kv.get(key)
	}

	pub(crate) fn kv_set(&mut self, key: Key, val: Val) -> Result<(), Error> {
		self.check_active()?;
		trace!(target: "shale::core::kvs::tx", key = %key.sprint(), "set");
		self.kv.set(key, val)
	}

	pub(crate) fn kv_del(&mut self, key: &[u8]) -> Result<(), Error> {
		self.check_active()?;
		trace!(target: "shale::core::kvs::tx", key = %key.sprint(), "del");
		self.kv.del(key)
	}

	pub(crate) fn kv_delr(&mut self, rng: Range<Key>) -> Result<(), Error> {
		self.check_active()?;
		self.kv.delr(rng)
	}

	/// Scan an entire key range in batches. Exposes the raw binary key
	/// layout; useful for diagnostics and audits.
	pub fn scan_range(&mut self, rng: Range<Key>) -> Result<Vec<(Key, Val)>, Error> {
		self.check_active()?;
		let mut out = Vec::new();
		let mut start = rng.start;
		loop {
			if start >= rng.end {
				return Ok(out);
			}
			let batch = self.kv.scan(start.clone()..rng.end.clone(), *SCAN_BATCH_SIZE)?;
			let full = batch.len() as u32 == *SCAN_BATCH_SIZE;
			match batch.last() {
				Some((last, _)) if full => {
					// Resume immediately after the last key seen
					start = last.clone();
					start.push(0x00);
					out.extend(batch);
				}
				_ => {
					out.extend(batch);
					return Ok(out);
				}
			}
		}
	}

	/// Scan an entire range in batches, returning keys only.
	pub(crate) fn scan_keys(&mut self, rng: Range<Key>) -> Result<Vec<Key>, Error> {
		Ok(self.scan_range(rng)?.into_iter().map(|(k, _)| k).collect())
	}

	// --------------------------------------------------------------------
	// Object meta-data
	// --------------------------------------------------------------------

	/// Fetch the meta-data of an object, if it exists.
	pub(crate) fn obj_info(&mut self, id: ObjId) -> Result<Option<ObjInfo>, Error> {
		if let Some(info) = self.objinfo.get(&id) {
			return Ok(Some(info));
		}
		match self.kv_get(&key::obj::Obj::new(id).encode())? {
			Some(val) => {
				let info = ObjInfo::decode(id, &val)?;
				self.objinfo.insert(id, info);
				Ok(Some(info))
			}
			None => Ok(None),
		}
	}

	/// Fetch the meta-data of an object, failing if it has been deleted.
	pub(crate) fn obj_info_required(&mut self, id: ObjId) -> Result<ObjInfo, Error> {
		self.obj_info(id)?.ok_or(Error::Deleted(id))
	}

	/// Write the meta-data of an object.
	pub(crate) fn write_obj_info(&mut self, id: ObjId, info: ObjInfo) -> Result<(), Error> {
		self.kv_set(key::obj::Obj::new(id).encode(), info.encode())?;
		self.objinfo.insert(id, info);
		Ok(())
	}

	/// Drop an object's cached meta-data.
	pub(crate) fn forget_obj_info(&mut self, id: ObjId) {
		self.objinfo.remove(&id);
	}

	// --------------------------------------------------------------------
	// Schema versions
	// --------------------------------------------------------------------

	/// Remove a recorded schema version. Permitted only when the removal
	/// policy allows it, the version index holds no objects at that
	/// version, and the version is not this transaction's own.
	pub fn delete_version(&mut self, version: u32) -> Result<bool, Error> {
		self.check_active()?;
		if !matches!(self.schema_removal, SchemaRemoval::Always) {
			return Err(Error::InvalidSchema(
				"schema removal is not permitted by this transaction".to_string(),
			));
		}
		if version == self.schema.version {
			return Err(Error::InvalidSchema(format!(
				"cannot remove schema version {version} while operating at it"
			)));
		}
		if self.registry.read().get(version).is_none() {
			return Ok(false);
		}
		let used = !self.scan_keys(key::version::version_range(version))?.is_empty();
		if used {
			return Err(Error::InvalidSchema(format!(
				"schema version {version} still records objects"
			)));
		}
		self.kv_del(&key::meta::Schema::new(version).encode())?;
		self.registry.write().remove(version);
		debug!(target: "shale::core::kvs::tx", version, "Removed a schema version");
		Ok(true)
	}

	// --------------------------------------------------------------------
	// User meta-data
	// --------------------------------------------------------------------

	/// Fetch a user meta-data entry.
	pub fn get_meta(&mut self, key: &[u8]) -> Result<Option<Val>, Error> {
		self.kv_get(&key::meta::UserMeta::new(key).encode())
	}

	/// Insert or update a user meta-data entry.
	pub fn put_meta(&mut self, key: &[u8], val: Val) -> Result<(), Error> {
		self.kv_set(key::meta::UserMeta::new(key).encode(), val)
	}

	/// Remove a user meta-data entry.
	pub fn remove_meta(&mut self, key: &[u8]) -> Result<(), Error> {
		self.kv_del(&key::meta::UserMeta::new(key).encode())
	}

	/// List the user meta-data entries starting with a prefix.
	pub fn scan_meta(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Val)>, Error> {
		let entries = self.scan_range(key::meta::user_range(prefix))?;
		entries
			.into_iter()
			.map(|(k, v)| Ok((key::meta::UserMeta::decode(&k)?.key, v)))
			.collect()
	}
}

impl Drop for Transaction {
	fn drop(&mut self) {
		if !self.done && !self.kv.closed() {
			trace!(
				target: "shale::core::kvs::tx",
				"A transaction was dropped without being committed or rolled back"
			);
			let _ = self.kv.cancel();
		}
	}
}
