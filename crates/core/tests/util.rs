//! Shared helpers for the integration tests.
#![allow(dead_code)]

use shale_core::{Datastore, ObjId, Transaction, TransactionOptions, SchemaModel};

/// An object identifier with a single-byte type storage-id and a repeated
/// filler byte, matching the literal identifiers used throughout the tests.
pub fn oid(type_id: u8, fill: u8) -> ObjId {
	let mut bytes = [fill; 8];
	bytes[0] = type_id;
	ObjId::from_bytes(bytes).expect("valid test identifier")
}

/// Open a transaction recording the given schema model.
pub fn open(ds: &Datastore, model: SchemaModel) -> Transaction {
	ds.transaction(TransactionOptions::new().with_schema(model)).expect("transaction opens")
}

/// Open a transaction recording the given schema model at an explicit
/// version number.
pub fn open_at(ds: &Datastore, model: SchemaModel, version: u32) -> Transaction {
	ds.transaction(TransactionOptions::new().with_schema(model).version(version))
		.expect("transaction opens")
}

/// Assert that a field of an object holds no content key.
pub fn assert_no_trace_of_key(tx: &mut Transaction, id: ObjId, field: u32) {
	let start = shale_core::key::obj::Field::new(id, field).encode();
	let mut end = start.clone();
	end.push(0x00);
	let entries = tx.scan_range(start..end).expect("scan succeeds");
	assert!(entries.is_empty(), "field {field} of {id} still holds a content key");
}

/// Assert that no key anywhere in the store mentions the given object,
/// either as a key prefix or as an index component.
pub fn assert_no_trace(tx: &mut Transaction, id: ObjId) {
	let entries = tx.scan_range(vec![0x00]..vec![0xff]).expect("scan succeeds");
	for (key, _) in entries {
		assert!(
			!key.windows(id.as_bytes().len()).any(|w| w == id.as_bytes()),
			"key {key:02x?} still references deleted object {id}"
		);
	}
}
