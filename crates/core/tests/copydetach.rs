mod util;

use shale_core::{
	Datastore, DeletedAssignments, Error, Field, InverseDelete, ObjectType, ReferenceSpec,
	SchemaModel, SubField, Value,
};
use std::sync::{Arc, Mutex};
use util::{oid, open};

fn model() -> SchemaModel {
	SchemaModel::new().with_type(
		ObjectType::new("Foo", 10)
			.with_field(Field::simple("i", 11, "int32").indexed())
			.with_field(Field::reference("r", 12, ReferenceSpec::new(InverseDelete::Ignore)))
			.with_field(Field::set("tags", 40, SubField::new(41, "string").indexed()))
			.with_field(Field::list("scores", 50, SubField::new(51, "int32")))
			.with_field(Field::map(
				"attrs",
				60,
				SubField::new(61, "string"),
				SubField::new(62, "int64"),
			))
			.with_field(Field::counter("hits", 70)),
	)
}

#[test]
fn copy_into_detached_transaction() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id = oid(10, 0x11);
	tx.create(id).unwrap();
	tx.write_simple(id, 11, Value::I32(5), false).unwrap();
	tx.read_set(id, 40, false).unwrap().insert(Value::String("a".to_string())).unwrap();
	tx.read_list(id, 50, false).unwrap().push(Value::I32(7)).unwrap();
	tx.read_map(id, 60, false)
		.unwrap()
		.put(Value::String("k".to_string()), Value::I64(9))
		.unwrap();
	tx.write_counter(id, 70, 3, false).unwrap();
	// Copy the object into a detached snapshot
	let mut snapshot = tx.detach().unwrap();
	assert!(snapshot.is_detached());
	tx.copy_to(id, None, &mut snapshot, false, false, None).unwrap();
	// The snapshot carries the full object state
	assert!(snapshot.exists(id).unwrap());
	assert_eq!(snapshot.read_simple(id, 11, false).unwrap(), Value::I32(5));
	assert_eq!(
		snapshot.read_set(id, 40, false).unwrap().iter().unwrap(),
		vec![Value::String("a".to_string())]
	);
	assert_eq!(snapshot.read_list(id, 50, false).unwrap().iter().unwrap(), vec![Value::I32(7)]);
	assert_eq!(
		snapshot.read_map(id, 60, false).unwrap().get(&Value::String("k".to_string())).unwrap(),
		Some(Value::I64(9))
	);
	assert_eq!(snapshot.read_counter(id, 70, false).unwrap(), 3);
	// Indexes were rebuilt on the far side
	let map = snapshot.query_index(11).unwrap().as_map().unwrap();
	assert_eq!(map[&Value::I32(5)], [id].into_iter().collect());
	let map = snapshot.query_index(41).unwrap().as_map().unwrap();
	assert_eq!(map[&Value::String("a".to_string())], [id].into_iter().collect());
	// The schema version travelled with the object
	let versions = snapshot.query_version().as_map().unwrap();
	assert_eq!(versions[&tx.version()], [id].into_iter().collect());
	// The snapshot outlives its origin
	tx.rollback().unwrap();
	assert_eq!(snapshot.read_simple(id, 11, false).unwrap(), Value::I32(5));
}

#[test]
fn detached_transactions_never_complete() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let snapshot = tx.detach().unwrap();
	assert!(matches!(snapshot.commit(), Err(Error::Tx(_))));
	let snapshot = tx.detach().unwrap();
	assert!(matches!(snapshot.rollback(), Err(Error::Tx(_))));
	tx.rollback().unwrap();
}

#[test]
fn copy_records_deleted_assignments() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id = oid(10, 0x11);
	let other = oid(10, 0x22);
	tx.create(id).unwrap();
	tx.create(other).unwrap();
	tx.write_simple(id, 12, Value::Ref(other), false).unwrap();
	let mut snapshot = tx.detach().unwrap();
	// Without a capture map the dangling reference fails the copy
	assert!(matches!(
		tx.copy_to(id, None, &mut snapshot, false, false, None),
		Err(Error::DeletedAssignment {
			field: 12,
			target,
		}) if target == other
	));
	// With a capture map the copy proceeds and records the violation
	let mut deleted = DeletedAssignments::new();
	let mut snapshot = tx.detach().unwrap();
	tx.copy_to(id, None, &mut snapshot, false, false, Some(&mut deleted)).unwrap();
	assert_eq!(deleted.get(&other), Some(&(12, id)));
	// Copying the missing target afterwards completes the graph
	tx.copy_to(other, None, &mut snapshot, false, false, None).unwrap();
	assert_eq!(snapshot.read_simple(id, 12, false).unwrap(), Value::Ref(other));
	tx.rollback().unwrap();
}

#[test]
fn copy_with_notifications() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id = oid(10, 0x11);
	tx.create(id).unwrap();
	tx.write_simple(id, 11, Value::I32(5), false).unwrap();
	let mut snapshot = tx.detach().unwrap();
	let created = Arc::new(Mutex::new(Vec::new()));
	let captured = created.clone();
	snapshot.on_create(move |_, change| {
		captured.lock().unwrap().push(change.id());
	});
	tx.copy_to(id, None, &mut snapshot, false, true, None).unwrap();
	assert_eq!(*created.lock().unwrap(), vec![id]);
	tx.rollback().unwrap();
}

#[test]
fn copy_to_a_different_identifier() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let src = oid(10, 0x11);
	let dst = oid(10, 0x22);
	tx.create(src).unwrap();
	tx.write_simple(src, 11, Value::I32(5), false).unwrap();
	let mut snapshot = tx.detach().unwrap();
	tx.copy_to(src, Some(dst), &mut snapshot, false, false, None).unwrap();
	assert!(snapshot.exists(dst).unwrap());
	assert!(!snapshot.exists(src).unwrap());
	assert_eq!(snapshot.read_simple(dst, 11, false).unwrap(), Value::I32(5));
	// Identifiers of different types cannot stand in for one another
	let bad = oid(11, 0x33);
	assert!(matches!(
		tx.copy_to(src, Some(bad), &mut snapshot, false, false, None),
		Err(Error::SchemaMismatch(_))
	));
	tx.rollback().unwrap();
}
