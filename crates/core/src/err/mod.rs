use crate::obj::ObjId;
use thiserror::Error;

/// An error originating from the datastore or one of its transactions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// The transaction has already been committed or rolled back
	#[error("Couldn't use a transaction which is no longer valid")]
	Stale,

	/// The transaction was marked rollback-only and can only be rolled back
	#[error("Couldn't commit a transaction which is marked rollback-only")]
	RollbackOnly,

	/// The underlying key-value store signalled a transient conflict
	#[error("Failed to process transaction due to a concurrent modification. Please retry")]
	RetryTransaction,

	/// The object has been deleted from the datastore
	#[error("Object '{0}' has been deleted")]
	Deleted(ObjId),

	/// The object-type storage-id does not exist in the schema version
	#[error("Unknown object type with storage-id {0}")]
	UnknownType(u32),

	/// The field storage-id does not exist on the object type
	#[error("Unknown field with storage-id {field} on object type {type_id}")]
	UnknownField {
		type_id: u32,
		field: u32,
	},

	/// The index storage-id does not name an indexed field or composite index
	#[error("Unknown index with storage-id {0}")]
	UnknownIndex(u32),

	/// A reference field was assigned a deleted target object
	#[error("Couldn't assign deleted object '{target}' to reference field {field}")]
	DeletedAssignment {
		field: u32,
		target: ObjId,
	},

	/// A reference field was assigned a target of a disallowed object type
	#[error("Couldn't assign object '{target}' to reference field {field}: target type is not permitted")]
	InvalidReference {
		field: u32,
		target: ObjId,
	},

	/// The object cannot be deleted while another object refers to it
	#[error("Couldn't delete object '{target}' which is referenced by '{referrer}' through field {field}")]
	Referenced {
		target: ObjId,
		referrer: ObjId,
		field: u32,
	},

	/// The supplied schema does not agree with the recorded schema
	#[error("Schema mismatch: {0}")]
	SchemaMismatch(String),

	/// The supplied schema model is not valid
	#[error("Invalid schema: {0}")]
	InvalidSchema(String),

	/// The object's type does not exist in the requested schema version
	#[error("Object '{id}' has no type in schema version {version}")]
	TypeNotInVersion {
		id: ObjId,
		version: u32,
	},

	/// An invariant violation was detected while reading the datastore
	#[error("Inconsistent database: {0}")]
	InconsistentDatabase(String),

	/// The encoding identifier is not present in the registry
	#[error("Unknown encoding '{0}'")]
	UnknownEncoding(String),

	/// The encoding identifier is already present in the registry
	#[error("Encoding '{0}' is already registered")]
	DuplicateEncoding(String),

	/// No unused random object identifier could be generated
	#[error("Couldn't generate an unused object identifier for type {0}")]
	IdExhausted(u32),

	/// The supplied value does not match the field's encoding
	#[error("Incompatible value: {0}")]
	IncompatibleValue(String),

	/// There was a problem with the underlying key-value store
	#[error("There was a problem with a datastore transaction: {0}")]
	Tx(String),
}
