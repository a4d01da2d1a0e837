mod util;

use rstest::rstest;
use shale_core::{
	Datastore, Error, Field, InverseDelete, ObjectType, ReferenceSpec, SchemaModel, SubField, Value,
};
use util::{assert_no_trace, oid, open};

fn ring_model(action: InverseDelete) -> SchemaModel {
	SchemaModel::new().with_type(
		ObjectType::new("Foo", 10)
			.with_field(Field::reference("next", 12, ReferenceSpec::new(action))),
	)
}

/// Build the `id1 → id2 → id3 → id1` ring.
fn build_ring(tx: &mut shale_core::Transaction) -> [shale_core::ObjId; 3] {
	let ids = [oid(10, 0x11), oid(10, 0x22), oid(10, 0x33)];
	for id in ids {
		tx.create(id).unwrap();
	}
	tx.write_simple(ids[0], 12, Value::Ref(ids[1]), false).unwrap();
	tx.write_simple(ids[1], 12, Value::Ref(ids[2]), false).unwrap();
	tx.write_simple(ids[2], 12, Value::Ref(ids[0]), false).unwrap();
	ids
}

#[rstest]
#[case::ignore(InverseDelete::Ignore)]
#[case::exception(InverseDelete::Exception)]
#[case::unreference(InverseDelete::Unreference)]
#[case::delete(InverseDelete::Delete)]
fn simple_reference_ring(#[case] action: InverseDelete) {
	let ds = Datastore::memory();
	let mut tx = open(&ds, ring_model(action));
	let [id1, id2, id3] = build_ring(&mut tx);
	let result = tx.delete(id2);
	match action {
		InverseDelete::Ignore => {
			assert!(result.unwrap());
			assert!(tx.exists(id1).unwrap());
			assert!(tx.exists(id3).unwrap());
			// The dangling reference stays in place
			assert_eq!(tx.read_simple(id1, 12, false).unwrap(), Value::Ref(id2));
		}
		InverseDelete::Exception => {
			assert!(matches!(
				result,
				Err(Error::Referenced {
					target,
					referrer,
					field: 12,
				}) if target == id2 && referrer == id1
			));
			// Nothing was deleted
			assert!(tx.exists(id1).unwrap());
			assert!(tx.exists(id2).unwrap());
			assert!(tx.exists(id3).unwrap());
		}
		InverseDelete::Unreference => {
			assert!(result.unwrap());
			assert!(tx.exists(id1).unwrap());
			assert!(tx.exists(id3).unwrap());
			// The referrer was nulled, the unrelated reference kept
			assert_eq!(tx.read_simple(id1, 12, false).unwrap(), Value::Null);
			assert_eq!(tx.read_simple(id3, 12, false).unwrap(), Value::Ref(id1));
			assert_no_trace(&mut tx, id2);
		}
		InverseDelete::Delete => {
			assert!(result.unwrap());
			// Deletion propagated around the ring
			assert!(!tx.exists(id1).unwrap());
			assert!(!tx.exists(id2).unwrap());
			assert!(!tx.exists(id3).unwrap());
			assert_no_trace(&mut tx, id1);
			assert_no_trace(&mut tx, id2);
			assert_no_trace(&mut tx, id3);
		}
	}
	tx.rollback().unwrap();
}

fn collections_model(action: InverseDelete) -> SchemaModel {
	SchemaModel::new()
		.with_type(
			ObjectType::new("Holder", 10)
				.with_field(Field::set(
					"friends",
					40,
					SubField::reference(41, ReferenceSpec::new(action)),
				))
				.with_field(Field::list(
					"queue",
					50,
					SubField::reference(51, ReferenceSpec::new(action)),
				))
				.with_field(Field::map(
					"by_target",
					60,
					SubField::reference(61, ReferenceSpec::new(action)),
					SubField::new(62, "int32"),
				))
				.with_field(Field::map(
					"by_name",
					70,
					SubField::new(71, "string"),
					SubField::reference(72, ReferenceSpec::new(action)),
				)),
		)
		.with_type(ObjectType::new("Target", 20))
}

#[test]
fn collections_unreference_on_delete() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, collections_model(InverseDelete::Unreference));
	let holder = oid(10, 0x11);
	let target = oid(20, 0x22);
	let other = oid(20, 0x33);
	tx.create(holder).unwrap();
	tx.create(target).unwrap();
	tx.create(other).unwrap();
	tx.read_set(holder, 40, false).unwrap().insert(Value::Ref(target)).unwrap();
	tx.read_set(holder, 40, false).unwrap().insert(Value::Ref(other)).unwrap();
	tx.read_list(holder, 50, false).unwrap().push(Value::Ref(target)).unwrap();
	tx.read_list(holder, 50, false).unwrap().push(Value::Ref(other)).unwrap();
	tx.read_map(holder, 60, false).unwrap().put(Value::Ref(target), Value::I32(1)).unwrap();
	tx.read_map(holder, 60, false).unwrap().put(Value::Ref(other), Value::I32(2)).unwrap();
	tx.read_map(holder, 70, false)
		.unwrap()
		.put(Value::String("a".to_string()), Value::Ref(target))
		.unwrap();
	tx.read_map(holder, 70, false)
		.unwrap()
		.put(Value::String("b".to_string()), Value::Ref(other))
		.unwrap();
	assert!(tx.delete(target).unwrap());
	// The set entry disappeared
	assert_eq!(tx.read_set(holder, 40, false).unwrap().iter().unwrap(), vec![Value::Ref(other)]);
	// The list element was nulled in place
	assert_eq!(
		tx.read_list(holder, 50, false).unwrap().iter().unwrap(),
		vec![Value::Null, Value::Ref(other)]
	);
	// The map entry keyed by the target was removed
	assert_eq!(
		tx.read_map(holder, 60, false).unwrap().iter().unwrap(),
		vec![(Value::Ref(other), Value::I32(2))]
	);
	// The map value referencing the target was nulled
	assert_eq!(
		tx.read_map(holder, 70, false).unwrap().iter().unwrap(),
		vec![
			(Value::String("a".to_string()), Value::Null),
			(Value::String("b".to_string()), Value::Ref(other)),
		]
	);
	assert_no_trace(&mut tx, target);
	tx.rollback().unwrap();
}

#[rstest]
#[case::set(40)]
#[case::list(50)]
#[case::map_key(60)]
#[case::map_value(70)]
fn collections_exception_on_delete(#[case] field: u32) {
	let ds = Datastore::memory();
	let mut tx = open(&ds, collections_model(InverseDelete::Exception));
	let holder = oid(10, 0x11);
	let target = oid(20, 0x22);
	tx.create(holder).unwrap();
	tx.create(target).unwrap();
	match field {
		40 => {
			tx.read_set(holder, 40, false).unwrap().insert(Value::Ref(target)).unwrap();
		}
		50 => {
			tx.read_list(holder, 50, false).unwrap().push(Value::Ref(target)).unwrap();
		}
		60 => {
			tx.read_map(holder, 60, false)
				.unwrap()
				.put(Value::Ref(target), Value::I32(1))
				.unwrap();
		}
		_ => {
			tx.read_map(holder, 70, false)
				.unwrap()
				.put(Value::String("a".to_string()), Value::Ref(target))
				.unwrap();
		}
	}
	assert!(matches!(
		tx.delete(target),
		Err(Error::Referenced {
			referrer,
			..
		}) if referrer == holder
	));
	assert!(tx.exists(target).unwrap());
	tx.rollback().unwrap();
}

#[test]
fn forward_delete_cascades() {
	let ds = Datastore::memory();
	let model = SchemaModel::new().with_type(
		ObjectType::new("Foo", 10).with_field(Field::reference(
			"child",
			12,
			ReferenceSpec::new(InverseDelete::Ignore).forward_delete(true),
		)),
	);
	let mut tx = open(&ds, model);
	let a = oid(10, 0x11);
	let b = oid(10, 0x22);
	tx.create(a).unwrap();
	tx.create(b).unwrap();
	tx.write_simple(a, 12, Value::Ref(b), false).unwrap();
	// A reference cycle through forward-delete still terminates
	tx.write_simple(b, 12, Value::Ref(a), false).unwrap();
	assert!(tx.delete(a).unwrap());
	assert!(!tx.exists(a).unwrap());
	assert!(!tx.exists(b).unwrap());
	assert_no_trace(&mut tx, a);
	assert_no_trace(&mut tx, b);
	tx.rollback().unwrap();
}

#[test]
fn exception_clears_after_unreferencing() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, ring_model(InverseDelete::Exception));
	let [id1, id2, _] = build_ring(&mut tx);
	assert!(tx.delete(id2).is_err());
	// Dropping the blocking reference lets the delete proceed
	tx.write_simple(id1, 12, Value::Null, false).unwrap();
	assert!(tx.delete(id2).unwrap());
	assert!(!tx.exists(id2).unwrap());
	tx.rollback().unwrap();
}

#[test]
fn deleted_assignment_is_rejected() {
	let ds = Datastore::memory();
	let mut tx = open(&ds, ring_model(InverseDelete::Ignore));
	let id1 = oid(10, 0x11);
	let ghost = oid(10, 0x99);
	tx.create(id1).unwrap();
	assert!(matches!(
		tx.write_simple(id1, 12, Value::Ref(ghost), false),
		Err(Error::DeletedAssignment {
			field: 12,
			target,
		}) if target == ghost
	));
	tx.rollback().unwrap();
}

#[test]
fn reference_target_whitelist() {
	let ds = Datastore::memory();
	let model = SchemaModel::new()
		.with_type(ObjectType::new("Foo", 10).with_field(Field::reference(
			"only_bar",
			12,
			ReferenceSpec::new(InverseDelete::Ignore).target_types([20]),
		)))
		.with_type(ObjectType::new("Bar", 20));
	let mut tx = open(&ds, model);
	let foo = oid(10, 0x11);
	let foo2 = oid(10, 0x22);
	let bar = oid(20, 0x33);
	tx.create(foo).unwrap();
	tx.create(foo2).unwrap();
	tx.create(bar).unwrap();
	tx.write_simple(foo, 12, Value::Ref(bar), false).unwrap();
	assert!(matches!(
		tx.write_simple(foo, 12, Value::Ref(foo2), false),
		Err(Error::InvalidReference {
			field: 12,
			..
		})
	));
	tx.rollback().unwrap();
}
