mod util;

use shale_core::{
	Datastore, Error, Field, ObjectType, SchemaModel, SchemaRemoval, TransactionOptions, Value,
};
use util::{oid, open};

fn v1_model() -> SchemaModel {
	SchemaModel::new()
		.with_type(ObjectType::new("Foo", 10).with_field(Field::simple("i", 11, "int32")))
		.with_type(ObjectType::new("Bar", 30).with_field(Field::simple("s", 31, "string")))
}

fn v2_model() -> SchemaModel {
	SchemaModel::new()
		.with_type(ObjectType::new("Foo", 10).with_field(Field::simple("i", 11, "int32")))
}

#[test]
fn dropped_object_type() {
	let ds = Datastore::memory();
	// Record both types and create one object of each
	let mut tx = open(&ds, v1_model());
	let foo = oid(10, 0x11);
	let bar = oid(30, 0x22);
	tx.create(foo).unwrap();
	tx.create(bar).unwrap();
	tx.write_simple(bar, 31, Value::String("kept".to_string()), false).unwrap();
	tx.commit().unwrap();
	// The second version drops Bar entirely
	let mut tx = open(&ds, v2_model());
	assert_eq!(tx.version(), 2);
	// Reading at the object's own version still works
	let v = tx.read_simple(bar, 31, false).unwrap();
	assert_eq!(v, Value::String("kept".to_string()));
	// Migrating the object cannot work: its type no longer exists
	assert!(matches!(
		tx.read_simple(bar, 31, true),
		Err(Error::TypeNotInVersion {
			version: 2,
			..
		})
	));
	// Foo migrates fine
	tx.write_simple(foo, 11, Value::I32(1), true).unwrap();
	let versions = tx.query_version().as_map().unwrap();
	assert_eq!(versions[&1], [bar].into_iter().collect());
	assert_eq!(versions[&2], [foo].into_iter().collect());
	tx.rollback().unwrap();
}

#[test]
fn counter_added_in_later_version() {
	let ds = Datastore::memory();
	let v1 = SchemaModel::new()
		.with_type(ObjectType::new("Foo", 10).with_field(Field::simple("i", 11, "int32")));
	let v2 = SchemaModel::new().with_type(
		ObjectType::new("Foo", 10)
			.with_field(Field::simple("i", 11, "int32"))
			.with_field(Field::counter("hits", 20)),
	);
	let mut tx = open(&ds, v1);
	let id = oid(10, 0x11);
	tx.create(id).unwrap();
	tx.commit().unwrap();
	// The counter does not exist at the object's version
	let mut tx = open(&ds, v2);
	assert!(tx.read_counter(id, 20, false).is_err());
	// Adjusting with migration upgrades the object first
	tx.adjust_counter(id, 20, 123, true).unwrap();
	assert_eq!(tx.read_counter(id, 20, true).unwrap(), 123);
	tx.adjust_counter(id, 20, -23, true).unwrap();
	assert_eq!(tx.read_counter(id, 20, true).unwrap(), 100);
	tx.commit().unwrap();
}

#[test]
fn migration_preserves_index_consistency() {
	let ds = Datastore::memory();
	let v1 = SchemaModel::new()
		.with_type(ObjectType::new("Foo", 10).with_field(Field::simple("i", 11, "int32")));
	// The second version indexes the carried field
	let v2 = SchemaModel::new()
		.with_type(ObjectType::new("Foo", 10).with_field(Field::simple("i", 11, "int32").indexed()));
	let mut tx = open(&ds, v1);
	let id = oid(10, 0x11);
	tx.create(id).unwrap();
	tx.write_simple(id, 11, Value::I32(42), false).unwrap();
	tx.commit().unwrap();
	let mut tx = open(&ds, v2);
	// Before migration the object has no index entry
	assert!(tx.query_index(11).unwrap().as_map().unwrap().is_empty());
	tx.migrate_schema(id).unwrap();
	let map = tx.query_index(11).unwrap().as_map().unwrap();
	assert_eq!(map[&Value::I32(42)], [id].into_iter().collect());
	tx.commit().unwrap();
}

#[test]
fn schema_change_listener_sees_old_values() {
	use std::sync::{Arc, Mutex};
	let ds = Datastore::memory();
	let v1 = SchemaModel::new().with_type(
		ObjectType::new("Foo", 10)
			.with_field(Field::simple("i", 11, "int32"))
			.with_field(Field::simple("gone", 12, "string")),
	);
	let v2 = SchemaModel::new()
		.with_type(ObjectType::new("Foo", 10).with_field(Field::simple("i", 11, "int32")));
	let mut tx = open(&ds, v1);
	let id = oid(10, 0x11);
	tx.create(id).unwrap();
	tx.write_simple(id, 12, Value::String("bye".to_string()), false).unwrap();
	tx.commit().unwrap();
	let mut tx = open(&ds, v2);
	let seen = Arc::new(Mutex::new(Vec::new()));
	let captured = seen.clone();
	tx.on_schema_change(move |_, change| {
		captured.lock().unwrap().push(change.clone());
	});
	tx.migrate_schema(id).unwrap();
	let seen = seen.lock().unwrap();
	match seen.as_slice() {
		[shale_core::Change::SchemaChange {
			from_version: 1,
			to_version: 2,
			old_values,
			..
		}] => {
			assert_eq!(old_values[&12], Value::String("bye".to_string()));
		}
		other => panic!("unexpected changes: {other:?}"),
	}
	// The dropped field's storage is gone
	util::assert_no_trace_of_key(&mut tx, id, 12);
	tx.rollback().unwrap();
}

#[test]
fn unused_schema_versions_are_reclaimed() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, v1_model());
	tx.commit().unwrap();
	// No object was ever created at version 1, so opening at version 2
	// with reclamation enabled drops it
	let tx = ds
		.transaction(
			TransactionOptions::new()
				.with_schema(v2_model())
				.schema_removal(SchemaRemoval::IfUnusedAtOpen),
		)
		.unwrap();
	assert_eq!(tx.versions(), vec![2]);
	tx.rollback().unwrap();
}

#[test]
fn delete_version_requires_emptiness() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, v1_model());
	let foo = oid(10, 0x11);
	tx.create(foo).unwrap();
	tx.commit().unwrap();
	let mut tx = ds
		.transaction(
			TransactionOptions::new()
				.with_schema(v2_model())
				.schema_removal(SchemaRemoval::Always),
		)
		.unwrap();
	// Version 1 still records the Foo object
	assert!(tx.delete_version(1).is_err());
	// After migrating the object away, removal succeeds
	tx.migrate_schema(foo).unwrap();
	assert!(tx.delete_version(1).unwrap());
	assert_eq!(tx.versions(), vec![2]);
	tx.commit().unwrap();
}
