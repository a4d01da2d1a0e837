//! The datastore: the entry point which owns the shared schema registry and
//! opens transactions against the underlying key-value store.

use super::api::{KVStore, KVTransaction};
use super::mem::MemStore;
use super::tx::Transaction;
use crate::catalog::registry::SchemaRegistry;
use crate::catalog::SchemaModel;
use crate::enc::registry::EncodingRegistry;
use crate::err::Error;
use crate::key;
use parking_lot::RwLock;
use std::sync::Arc;

/// When recorded-but-unused schema versions may be removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchemaRemoval {
	/// Schema versions are never removed
	#[default]
	Never,
	/// Versions with no remaining objects are reclaimed when a transaction
	/// opens
	IfUnusedAtOpen,
	/// Reclaimed at open, and explicit removal is permitted during the
	/// transaction
	Always,
}

/// The options governing one transaction.
#[derive(Clone, Debug, Default)]
pub struct TransactionOptions {
	/// The schema model this transaction intends to use, if any
	pub schema_model: Option<SchemaModel>,
	/// The schema version to operate at; defaults to the model's recorded
	/// version, or the newest recorded version when no model is given
	pub version_number: Option<u32>,
	/// Whether an unrecorded schema model may be recorded as a new version
	pub allow_new_schema: bool,
	/// When unused schema versions may be removed
	pub schema_removal: SchemaRemoval,
	/// Whether commit should behave as rollback
	pub read_only: bool,
	/// The transaction time budget, delegated to the key-value store
	pub timeout_ms: Option<u64>,
}

impl TransactionOptions {
	pub fn new() -> Self {
		Self {
			allow_new_schema: true,
			..Default::default()
		}
	}

	pub fn with_schema(mut self, model: SchemaModel) -> Self {
		self.schema_model = Some(model);
		self
	}

	pub fn version(mut self, version: u32) -> Self {
		self.version_number = Some(version);
		self
	}

	pub fn allow_new_schema(mut self, allow: bool) -> Self {
		self.allow_new_schema = allow;
		self
	}

	pub fn schema_removal(mut self, removal: SchemaRemoval) -> Self {
		self.schema_removal = removal;
		self
	}

	pub fn read_only(mut self, read_only: bool) -> Self {
		self.read_only = read_only;
		self
	}

	pub fn timeout_ms(mut self, ms: u64) -> Self {
		self.timeout_ms = Some(ms);
		self
	}
}

/// A datastore instance. Cheap to clone; all clones share the same
/// underlying store and schema registry.
#[derive(Clone)]
pub struct Datastore {
	store: Arc<dyn KVStore>,
	registry: Arc<RwLock<SchemaRegistry>>,
}

impl Datastore {
	/// Open a datastore over the given key-value store.
	pub fn new(store: impl KVStore) -> Self {
		Self::with_encodings(store, EncodingRegistry::new())
	}

	/// Open a datastore with a custom encoding catalog, allowing
	/// application-registered encodings to appear in schemas.
	pub fn with_encodings(store: impl KVStore, encodings: EncodingRegistry) -> Self {
		Self {
			store: Arc::new(store),
			registry: Arc::new(RwLock::new(SchemaRegistry::new(encodings))),
		}
	}

	/// Open an in-memory datastore.
	pub fn memory() -> Self {
		Self::new(MemStore::new())
	}

	/// Start a new transaction.
	pub fn transaction(&self, opts: TransactionOptions) -> Result<Transaction, Error> {
		// Start the underlying key-value transaction
		let mut kv = self.store.transaction(!opts.read_only)?;
		// Delegate the time budget to the store
		if let Some(ms) = opts.timeout_ms {
			kv.set_timeout(ms)?;
		}
		// Synchronise the registry with the recorded schema catalog
		{
			let mut registry = self.registry.write();
			let records = kv.scan(key::meta::schema_range(), u32::MAX)?;
			for (k, v) in records {
				let record = key::meta::Schema::decode(&k)?;
				registry.add_recorded(record.version, &v)?;
			}
		}
		// Resolve the transaction's schema version
		let schema = {
			let mut registry = self.registry.write();
			match (&opts.schema_model, opts.version_number) {
				(Some(model), version) => match registry.locate(model)? {
					Some(existing) => {
						if let Some(v) = version {
							if v != existing.version {
								return Err(Error::SchemaMismatch(format!(
									"schema is recorded as version {}, not {v}",
									existing.version
								)));
							}
						}
						existing
					}
					None => {
						if !opts.allow_new_schema {
							return Err(Error::SchemaMismatch(
								"schema is not recorded and recording is not permitted"
									.to_string(),
							));
						}
						if opts.read_only {
							return Err(Error::SchemaMismatch(
								"a read-only transaction cannot record a schema".to_string(),
							));
						}
						let schema = registry.record(model.clone(), version)?;
						kv.set(
							key::meta::Schema::new(schema.version).encode(),
							schema.canonical.clone(),
						)?;
						schema
					}
				},
				(None, Some(v)) => registry.get(v).ok_or_else(|| {
					Error::InvalidSchema(format!("schema version {v} is not recorded"))
				})?,
				(None, None) => registry.newest().ok_or_else(|| {
					Error::InvalidSchema(
						"the datastore is empty and no schema was supplied".to_string(),
					)
				})?,
			}
		};
		// Reclaim unused schema versions where the policy allows
		if !matches!(opts.schema_removal, SchemaRemoval::Never) {
			let recorded: Vec<u32> = self.registry.read().versions();
			for version in recorded {
				if version == schema.version {
					continue;
				}
				let used = !kv.scan(key::version::version_range(version), 1)?.is_empty();
				if !used {
					trace!(
						target: "shale::core::kvs",
						version,
						"Reclaiming an unused schema version"
					);
					kv.del(&key::meta::Schema::new(version).encode())?;
					self.registry.write().remove(version);
				}
			}
		}
		// Assemble the transaction
		Ok(Transaction::new(kv, self.registry.clone(), schema, &opts))
	}
}
