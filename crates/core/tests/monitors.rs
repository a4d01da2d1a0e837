mod util;

use shale_core::{
	Change, Datastore, Field, FieldMonitor, InverseDelete, KeyRanges, ObjId, ObjectType,
	ReferenceSpec, SchemaModel, SubField, Value,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use util::{oid, open};

fn model() -> SchemaModel {
	let spec = || ReferenceSpec::new(InverseDelete::Ignore);
	SchemaModel::new().with_type(
		ObjectType::new("Foo", 100)
			.with_field(Field::simple("watched", 105, "int32"))
			.with_field(Field::reference("direct", 109, spec()))
			.with_field(Field::set("friends", 120, SubField::reference(121, spec())))
			.with_field(Field::list("queue", 130, SubField::reference(131, spec())))
			.with_field(Field::map(
				"named",
				140,
				SubField::new(141, "string"),
				SubField::reference(142, spec()),
			)),
	)
}

type Seen = Arc<Mutex<Vec<(BTreeSet<ObjId>, Change)>>>;

fn record_into(
	seen: &Seen,
) -> impl Fn(&mut shale_core::Transaction, &Change, &BTreeSet<ObjId>) + 'static {
	let seen = seen.clone();
	move |_, change, referrers| {
		seen.lock().unwrap().push((referrers.clone(), change.clone()));
	}
}

#[test_log::test]
fn four_hop_field_monitor() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let ids: Vec<_> = [0x11, 0x22, 0x33, 0x44].into_iter().map(|b| oid(100, b)).collect();
	let (id1, id2, id3, id4) = (ids[0], ids[1], ids[2], ids[3]);
	for id in &ids {
		tx.create(*id).unwrap();
	}
	// Cross-link the graph: watchers see id4's field through the chain
	// direct → friends-element → queue-element → named-value
	tx.write_simple(id1, 109, Value::Ref(id1), false).unwrap();
	tx.write_simple(id3, 109, Value::Ref(id3), false).unwrap();
	tx.read_set(id1, 120, false).unwrap().insert(Value::Ref(id2)).unwrap();
	tx.read_set(id3, 120, false).unwrap().insert(Value::Ref(id2)).unwrap();
	tx.read_list(id2, 130, false).unwrap().push(Value::Ref(id3)).unwrap();
	tx.read_map(id3, 140, false)
		.unwrap()
		.put(Value::String("k".to_string()), Value::Ref(id4))
		.unwrap();
	// Observe field 105 through the four-hop reference path
	let seen: Seen = Arc::new(Mutex::new(Vec::new()));
	tx.monitor_field(FieldMonitor::new(105, [109, 121, 131, 142], record_into(&seen))).unwrap();
	tx.write_simple(id4, 105, Value::I32(77), false).unwrap();
	let seen = seen.lock().unwrap();
	match seen.as_slice() {
		[(referrers, Change::SimpleChange {
			id,
			field: 105,
			old,
			new,
		})] => {
			assert_eq!(*id, id4);
			assert_eq!(*old, Value::I32(0));
			assert_eq!(*new, Value::I32(77));
			assert_eq!(*referrers, [id1, id3].into_iter().collect());
		}
		other => panic!("unexpected deliveries: {other:?}"),
	}
	drop(seen);
	tx.rollback().unwrap();
}

#[test_log::test]
fn empty_path_monitor_observes_directly() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id = oid(100, 0x11);
	tx.create(id).unwrap();
	let seen: Seen = Arc::new(Mutex::new(Vec::new()));
	tx.monitor_field(FieldMonitor::new(105, [], record_into(&seen))).unwrap();
	tx.write_simple(id, 105, Value::I32(1), false).unwrap();
	// Writing the same value again notifies nothing
	tx.write_simple(id, 105, Value::I32(1), false).unwrap();
	let seen = seen.lock().unwrap();
	assert_eq!(seen.len(), 1);
	assert_eq!(seen[0].0, [id].into_iter().collect());
}

#[test_log::test]
fn type_filter_restricts_monitors() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id = oid(100, 0x11);
	tx.create(id).unwrap();
	let seen: Seen = Arc::new(Mutex::new(Vec::new()));
	// A filter admitting a different object type never matches
	tx.monitor_field(
		FieldMonitor::new(105, [], record_into(&seen)).with_filter(KeyRanges::for_type(999)),
	)
	.unwrap();
	tx.write_simple(id, 105, Value::I32(5), false).unwrap();
	assert!(seen.lock().unwrap().is_empty());
	// A filter admitting the object's own type matches
	tx.monitor_field(
		FieldMonitor::new(105, [], record_into(&seen)).with_filter(KeyRanges::for_type(100)),
	)
	.unwrap();
	tx.write_simple(id, 105, Value::I32(6), false).unwrap();
	assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test_log::test]
fn set_changes_reach_monitors() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id = oid(100, 0x11);
	let other = oid(100, 0x22);
	tx.create(id).unwrap();
	tx.create(other).unwrap();
	let seen: Seen = Arc::new(Mutex::new(Vec::new()));
	tx.monitor_field(FieldMonitor::new(120, [], record_into(&seen))).unwrap();
	tx.read_set(id, 120, false).unwrap().insert(Value::Ref(other)).unwrap();
	tx.read_set(id, 120, false).unwrap().remove(&Value::Ref(other)).unwrap();
	let seen = seen.lock().unwrap();
	assert!(matches!(
		seen.as_slice(),
		[
			(_, Change::SetAdd {
				field: 120,
				..
			}),
			(_, Change::SetRemove {
				field: 120,
				..
			}),
		]
	));
}

#[test_log::test]
fn listener_mutation_is_drained_in_the_same_pass() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id = oid(100, 0x11);
	tx.create(id).unwrap();
	let seen: Seen = Arc::new(Mutex::new(Vec::new()));
	// The first monitor writes another object's field; the second monitor
	// observes that write within the same drain
	let trigger = oid(100, 0x22);
	tx.create(trigger).unwrap();
	tx.monitor_field(FieldMonitor::new(105, [], move |tx, change, _| {
		if change.id() == id {
			tx.write_simple(trigger, 105, Value::I32(99), false).unwrap();
		}
	}))
	.unwrap();
	tx.monitor_field(FieldMonitor::new(105, [], record_into(&seen))).unwrap();
	tx.write_simple(id, 105, Value::I32(1), false).unwrap();
	let seen = seen.lock().unwrap();
	let changed: Vec<ObjId> = seen.iter().map(|(_, c)| c.id()).collect();
	assert_eq!(changed, vec![id, trigger]);
}

#[test_log::test]
fn monitor_snapshots_freeze_installation() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let seen: Seen = Arc::new(Mutex::new(Vec::new()));
	tx.monitor_field(FieldMonitor::new(105, [], record_into(&seen))).unwrap();
	let snapshot = tx.monitor_snapshot();
	let mut other = ds.transaction(shale_core::TransactionOptions::new()).unwrap();
	other.install_monitors(snapshot);
	// The installed set is frozen against further registration
	assert!(other.monitor_field(FieldMonitor::new(105, [], record_into(&seen))).is_err());
	let id = oid(100, 0x11);
	other.create(id).unwrap();
	other.write_simple(id, 105, Value::I32(3), false).unwrap();
	assert_eq!(seen.lock().unwrap().len(), 1);
	other.rollback().unwrap();
	tx.rollback().unwrap();
}
