//! The index engine: live views over the simple, sub-field, composite, and
//! version indexes, plus byte-range filters attachable to any index slot.
//! Views re-scan the underlying store on every navigation, so they always
//! reflect the transaction's current state.

pub mod composite;
pub mod ranges;
pub mod simple;
pub mod version;
