//! This library provides a schema-aware, versioned object store layered over
//! an ordered byte-keyed transactional key-value store. Structured objects
//! with simple, counter, and complex (set/list/map) fields are translated
//! into an order-preserving binary key layout, and exposed through
//! transactional read/write/query/delete operations with exact ordering,
//! referential-integrity, and change-notification guarantees.

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

pub mod catalog;
pub mod cnf;
pub mod enc;
pub mod err;
pub mod idx;
pub mod key;
pub mod kvs;
pub mod lsn;
pub mod obj;

pub use self::catalog::{
	CompositeIndex, Field, InverseDelete, ObjectType, ReferenceSpec, SchemaModel, SubField,
};
pub use self::enc::{FieldCodec, Value};
pub use self::err::Error;
pub use self::idx::ranges::{KeyRange, KeyRanges};
pub use self::kvs::{Datastore, SchemaRemoval, Transaction, TransactionOptions};
pub use self::lsn::{Change, FieldMonitor};
pub use self::obj::copy::DeletedAssignments;
pub use self::obj::ObjId;
