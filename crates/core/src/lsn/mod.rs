//! Listeners and change notifications. Mutators never invoke callbacks
//! directly: they enqueue a change onto the transaction's pending queue,
//! which is drained once when the outermost mutating call completes. Field
//! monitors observe changes to a field "through" chains of references; the
//! drain loop walks each monitor's inverse path to find the set of watching
//! objects.

use crate::enc::Value;
use crate::err::Error;
use crate::idx::ranges::KeyRanges;
use crate::kvs::Transaction;
use crate::obj::ObjId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One change to an object. Lifecycle changes (create, delete, schema
/// change) are delivered synchronously from within the causing mutation;
/// field changes are queued and delivered when the outermost mutating call
/// completes.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Change {
	/// An object was created
	Create {
		id: ObjId,
	},
	/// An object was deleted
	Delete {
		id: ObjId,
	},
	/// An object was migrated between schema versions; `old_values` holds
	/// the values of the simple and counter fields captured before the
	/// migration, keyed by storage-id
	SchemaChange {
		id: ObjId,
		from_version: u32,
		to_version: u32,
		old_values: BTreeMap<u32, Value>,
	},
	/// A simple field changed value
	SimpleChange {
		id: ObjId,
		field: u32,
		old: Value,
		new: Value,
	},
	/// An element was added to a set field
	SetAdd {
		id: ObjId,
		field: u32,
		element: Value,
	},
	/// An element was removed from a set field
	SetRemove {
		id: ObjId,
		field: u32,
		element: Value,
	},
	/// A set field was cleared
	SetClear {
		id: ObjId,
		field: u32,
	},
	/// An element was inserted into a list field
	ListAdd {
		id: ObjId,
		field: u32,
		index: u64,
		element: Value,
	},
	/// An element was removed from a list field
	ListRemove {
		id: ObjId,
		field: u32,
		index: u64,
		element: Value,
	},
	/// A list element was replaced in place
	ListReplace {
		id: ObjId,
		field: u32,
		index: u64,
		old: Value,
		new: Value,
	},
	/// A list field was cleared
	ListClear {
		id: ObjId,
		field: u32,
	},
	/// An entry was added to a map field
	MapAdd {
		id: ObjId,
		field: u32,
		key: Value,
		value: Value,
	},
	/// An entry was removed from a map field
	MapRemove {
		id: ObjId,
		field: u32,
		key: Value,
		value: Value,
	},
	/// A map entry's value was replaced
	MapReplace {
		id: ObjId,
		field: u32,
		key: Value,
		old: Value,
		new: Value,
	},
	/// A map field was cleared
	MapClear {
		id: ObjId,
		field: u32,
	},
}

impl Change {
	/// The object the change happened to.
	pub fn id(&self) -> ObjId {
		match self {
			Change::Create {
				id,
			}
			| Change::Delete {
				id,
			}
			| Change::SchemaChange {
				id,
				..
			}
			| Change::SimpleChange {
				id,
				..
			}
			| Change::SetAdd {
				id,
				..
			}
			| Change::SetRemove {
				id,
				..
			}
			| Change::SetClear {
				id,
				..
			}
			| Change::ListAdd {
				id,
				..
			}
			| Change::ListRemove {
				id,
				..
			}
			| Change::ListReplace {
				id,
				..
			}
			| Change::ListClear {
				id,
				..
			}
			| Change::MapAdd {
				id,
				..
			}
			| Change::MapRemove {
				id,
				..
			}
			| Change::MapReplace {
				id,
				..
			}
			| Change::MapClear {
				id,
				..
			} => *id,
		}
	}

	/// The changed field's storage-id; `None` for lifecycle changes.
	pub fn field(&self) -> Option<u32> {
		match self {
			Change::Create {
				..
			}
			| Change::Delete {
				..
			}
			| Change::SchemaChange {
				..
			} => None,
			Change::SimpleChange {
				field,
				..
			}
			| Change::SetAdd {
				field,
				..
			}
			| Change::SetRemove {
				field,
				..
			}
			| Change::SetClear {
				field,
				..
			}
			| Change::ListAdd {
				field,
				..
			}
			| Change::ListRemove {
				field,
				..
			}
			| Change::ListReplace {
				field,
				..
			}
			| Change::ListClear {
				field,
				..
			}
			| Change::MapAdd {
				field,
				..
			}
			| Change::MapRemove {
				field,
				..
			}
			| Change::MapReplace {
				field,
				..
			}
			| Change::MapClear {
				field,
				..
			} => Some(*field),
		}
	}
}

/// A callback observing object lifecycle and schema changes.
pub type ChangeListener = dyn Fn(&mut Transaction, &Change);

/// A callback observing field changes through a monitor. The final argument
/// is the set of objects from which the changed field is visible through the
/// monitor's reference path.
pub type MonitorListener = dyn Fn(&mut Transaction, &Change, &BTreeSet<ObjId>);

/// A subscription to changes of one field, observed through a chain of
/// references.
///
/// The path lists reference field storage-ids from the watching objects
/// towards the changed object; the engine walks it backwards from the
/// changed object to find the watchers. A positive storage-id is walked as
/// an inverse step (who refers to the current objects through this field);
/// a negated storage-id is walked forwards (what do the current objects
/// refer to through this field). An empty path observes the field directly.
pub struct FieldMonitor {
	/// The observed field's storage-id
	pub field: u32,
	/// The reference path from watcher to target
	pub path: Vec<i64>,
	/// Restricts the changed objects observed, by identifier bytes
	pub filter: Option<KeyRanges>,
	/// The callback to deliver changes to
	pub listener: Arc<MonitorListener>,
}

impl FieldMonitor {
	pub fn new(
		field: u32,
		path: impl IntoIterator<Item = i64>,
		listener: impl Fn(&mut Transaction, &Change, &BTreeSet<ObjId>) + 'static,
	) -> Self {
		Self {
			field,
			path: path.into_iter().collect(),
			filter: None,
			listener: Arc::new(listener),
		}
	}

	pub fn with_filter(mut self, filter: KeyRanges) -> Self {
		self.filter = Some(filter);
		self
	}
}

/// A transaction's registered listeners.
#[derive(Default)]
pub struct Listeners {
	pub(crate) create: Vec<Arc<ChangeListener>>,
	pub(crate) delete: Vec<Arc<ChangeListener>>,
	pub(crate) schema_change: Vec<Arc<ChangeListener>>,
	pub(crate) monitors: BTreeMap<u32, Vec<Arc<FieldMonitor>>>,
	pub(crate) frozen: bool,
}

/// A reusable snapshot of a transaction's field monitors.
pub type MonitorSnapshot = BTreeMap<u32, Vec<Arc<FieldMonitor>>>;

impl Transaction {
	/// Register a callback observing object creation.
	pub fn on_create(&mut self, cb: impl Fn(&mut Transaction, &Change) + 'static) {
		self.listeners.create.push(Arc::new(cb));
	}

	/// Register a callback observing object deletion.
	pub fn on_delete(&mut self, cb: impl Fn(&mut Transaction, &Change) + 'static) {
		self.listeners.delete.push(Arc::new(cb));
	}

	/// Register a callback observing schema migrations.
	pub fn on_schema_change(&mut self, cb: impl Fn(&mut Transaction, &Change) + 'static) {
		self.listeners.schema_change.push(Arc::new(cb));
	}

	/// Register a field monitor.
	pub fn monitor_field(&mut self, monitor: FieldMonitor) -> Result<(), Error> {
		if self.listeners.frozen {
			return Err(Error::Tx("the monitor set has been frozen".to_string()));
		}
		self.listeners.monitors.entry(monitor.field).or_default().push(Arc::new(monitor));
		Ok(())
	}

	/// Snapshot the registered field monitors for re-installation into
	/// another transaction.
	pub fn monitor_snapshot(&self) -> MonitorSnapshot {
		self.listeners.monitors.clone()
	}

	/// Install a snapshot of field monitors, replacing any registered ones
	/// and freezing the set against further registration.
	pub fn install_monitors(&mut self, snapshot: MonitorSnapshot) {
		self.listeners.monitors = snapshot;
		self.listeners.frozen = true;
	}

	/// Fire the create listeners for a freshly created object. Runs inside
	/// the causing mutation; re-entrant mutation is permitted.
	pub(crate) fn fire_create(&mut self, id: ObjId) {
		if self.listeners.create.is_empty() {
			return;
		}
		let change = Change::Create {
			id,
		};
		for cb in self.listeners.create.clone() {
			cb.as_ref()(self, &change);
		}
	}

	/// Fire the delete listeners for an object about to be deleted.
	pub(crate) fn fire_delete(&mut self, id: ObjId) {
		if self.listeners.delete.is_empty() {
			return;
		}
		let change = Change::Delete {
			id,
		};
		for cb in self.listeners.delete.clone() {
			cb.as_ref()(self, &change);
		}
	}

	/// Fire the schema-change listeners for a migrated object.
	pub(crate) fn fire_schema_change(&mut self, change: Change) {
		for cb in self.listeners.schema_change.clone() {
			cb.as_ref()(self, &change);
		}
	}

	/// Deliver one drained field change to the monitors observing its
	/// field: walk each monitor's inverse path from the changed object to
	/// the set of watching objects. Callbacks may mutate this transaction;
	/// anything they enqueue is picked up by the ongoing drain loop.
	pub(crate) fn deliver(&mut self, sort: u32, change: Change) -> Result<(), Error> {
		let monitors = self.listeners.monitors.get(&sort).cloned().unwrap_or_default();
		for monitor in monitors {
			if let Some(filter) = &monitor.filter {
				if !filter.contains(change.id().as_bytes()) {
					continue;
				}
			}
			let referrers = self.monitor_referrers(change.id(), &monitor.path)?;
			if referrers.is_empty() {
				continue;
			}
			monitor.listener.as_ref()(self, &change, &referrers);
		}
		Ok(())
	}
}
