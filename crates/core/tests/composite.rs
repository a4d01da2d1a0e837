mod util;

use shale_core::{
	CompositeIndex, Datastore, Field, InverseDelete, ObjectType, ReferenceSpec, SchemaModel, Value,
};
use std::collections::{BTreeMap, BTreeSet};
use util::{oid, open};

fn model() -> SchemaModel {
	SchemaModel::new().with_type(
		ObjectType::new("Foo", 10)
			.with_field(Field::simple("i", 11, "int32").indexed())
			.with_field(Field::reference("r", 12, ReferenceSpec::new(InverseDelete::Ignore)))
			.with_composite(CompositeIndex::new("c", 20, [11, 12])),
	)
}

#[test]
fn composite_index_projections() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let ids: Vec<_> = [0x11, 0x22, 0x33, 0x44, 0x55].into_iter().map(|b| oid(10, b)).collect();
	for id in &ids {
		assert!(tx.create(*id).unwrap());
	}
	let (id1, id2, id3, id4, id5) = (ids[0], ids[1], ids[2], ids[3], ids[4]);
	for (id, i, r) in [
		(id1, 555, id3),
		(id2, 555, id4),
		(id3, 666, id3),
		(id4, 666, id4),
		(id5, 666, id4),
	] {
		tx.write_simple(id, 11, Value::I32(i), false).unwrap();
		tx.write_simple(id, 12, Value::Ref(r), false).unwrap();
	}
	// The full tuple listing, in component order
	let set = tx.query_composite(20).unwrap().as_set().unwrap();
	assert_eq!(
		set,
		vec![
			(vec![Value::I32(555), Value::Ref(id3)], id1),
			(vec![Value::I32(555), Value::Ref(id4)], id2),
			(vec![Value::I32(666), Value::Ref(id3)], id3),
			(vec![Value::I32(666), Value::Ref(id4)], id4),
			(vec![Value::I32(666), Value::Ref(id4)], id5),
		]
	);
	// The tuple-to-objects grouping
	let map = tx.query_composite(20).unwrap().as_map().unwrap();
	let expect: BTreeMap<Vec<Value>, BTreeSet<_>> = [
		(vec![Value::I32(555), Value::Ref(id3)], [id1].into_iter().collect()),
		(vec![Value::I32(555), Value::Ref(id4)], [id2].into_iter().collect()),
		(vec![Value::I32(666), Value::Ref(id3)], [id3].into_iter().collect()),
		(vec![Value::I32(666), Value::Ref(id4)], [id4, id5].into_iter().collect()),
	]
	.into_iter()
	.collect();
	assert_eq!(map, expect);
	// Peeling off the first component
	let lower = tx.query_composite(20).unwrap().as_map_of_index(&Value::I32(666)).unwrap();
	assert_eq!(
		lower,
		vec![
			(vec![Value::Ref(id3)], id3),
			(vec![Value::Ref(id4)], id4),
			(vec![Value::Ref(id4)], id5),
		]
	);
	tx.rollback().unwrap();
}

#[test]
fn composite_entries_are_exactly_one_per_object() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id1 = oid(10, 0x11);
	let id2 = oid(10, 0x22);
	tx.create(id1).unwrap();
	tx.create(id2).unwrap();
	// A freshly created object already appears with default components
	let entries = tx.scan_range(shale_core::key::composite::all_range(20)).unwrap();
	assert_eq!(entries.len(), 2);
	// Rewriting a component replaces the entry rather than adding one
	tx.create(id2).unwrap();
	tx.write_simple(id1, 11, Value::I32(7), false).unwrap();
	tx.write_simple(id1, 11, Value::I32(9), false).unwrap();
	let entries = tx.scan_range(shale_core::key::composite::all_range(20)).unwrap();
	assert_eq!(entries.len(), 2);
	let map = tx.query_composite(20).unwrap().as_map().unwrap();
	assert_eq!(map[&vec![Value::I32(9), Value::Null]], [id1].into_iter().collect());
	tx.rollback().unwrap();
}

#[test]
fn simple_index_tracks_writes() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, model());
	let id1 = oid(10, 0x11);
	let id2 = oid(10, 0x22);
	tx.create(id1).unwrap();
	tx.create(id2).unwrap();
	tx.write_simple(id1, 11, Value::I32(5), false).unwrap();
	let map = tx.query_index(11).unwrap().as_map().unwrap();
	assert_eq!(map[&Value::I32(5)], [id1].into_iter().collect());
	// The untouched object sits at the default value
	assert_eq!(map[&Value::I32(0)], [id2].into_iter().collect());
	// Overwriting moves the entry, leaving nothing stale
	tx.write_simple(id1, 11, Value::I32(6), false).unwrap();
	let map = tx.query_index(11).unwrap().as_map().unwrap();
	assert!(!map.contains_key(&Value::I32(5)));
	assert_eq!(map[&Value::I32(6)], [id1].into_iter().collect());
	tx.rollback().unwrap();
}
