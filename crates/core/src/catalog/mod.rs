//! The schema catalog: the structural data model consumed by the store. A
//! [`SchemaModel`] lists object types, their fields, and their composite
//! indexes; models are immutable once recorded and identified by a monotonic
//! version number plus a canonical encoded form.
//!
//! Storage-ids share one identifier space: an object type, a field, a
//! sub-field, and a composite index may never collide, which is also what
//! keeps the binary key families disjoint. A storage-id left at zero is
//! assigned automatically when the schema is recorded.

pub mod registry;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use self::registry::{Schema, SchemaRegistry, SidLocation, SidRole};

/// The action applied to a reference field when its target is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InverseDelete {
	/// Leave the dangling reference in place
	Ignore,
	/// Refuse to delete the target while referrers exist
	Exception,
	/// Null the reference, or remove the containing collection entry
	Unreference,
	/// Delete the referring object as well
	Delete,
}

/// The constraints carried by a reference field or sub-field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSpec {
	/// The action applied to referrers when the target is deleted
	pub inverse_delete: InverseDelete,
	/// Whether deleting the holder cascades to the referenced object
	pub forward_delete: bool,
	/// Whether the field may be assigned an identifier of a deleted object
	pub allow_deleted: bool,
	/// Permitted target object-type storage-ids; `None` allows every object
	/// type known to any schema version
	pub target_types: Option<BTreeSet<u32>>,
}

impl Default for ReferenceSpec {
	fn default() -> Self {
		Self {
			inverse_delete: InverseDelete::Exception,
			forward_delete: false,
			allow_deleted: false,
			target_types: None,
		}
	}
}

impl ReferenceSpec {
	pub fn new(inverse_delete: InverseDelete) -> Self {
		Self {
			inverse_delete,
			..Default::default()
		}
	}

	pub fn forward_delete(mut self, forward_delete: bool) -> Self {
		self.forward_delete = forward_delete;
		self
	}

	pub fn allow_deleted(mut self, allow_deleted: bool) -> Self {
		self.allow_deleted = allow_deleted;
		self
	}

	pub fn target_types(mut self, types: impl IntoIterator<Item = u32>) -> Self {
		self.target_types = Some(types.into_iter().collect());
		self
	}
}

/// A typed sub-field of a complex field: a set or list element, or a map key
/// or value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubField {
	pub storage_id: u32,
	pub encoding: String,
	pub indexed: bool,
	pub reference: Option<ReferenceSpec>,
}

impl SubField {
	pub fn new(storage_id: u32, encoding: impl Into<String>) -> Self {
		Self {
			storage_id,
			encoding: encoding.into(),
			indexed: false,
			reference: None,
		}
	}

	/// A sub-field holding object references.
	pub fn reference(storage_id: u32, spec: ReferenceSpec) -> Self {
		Self {
			storage_id,
			encoding: "reference".to_string(),
			indexed: false,
			reference: Some(spec),
		}
	}

	pub fn indexed(mut self) -> Self {
		self.indexed = true;
		self
	}
}

/// One field of an object type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
	/// A typed scalar or reference value
	Simple {
		name: String,
		storage_id: u32,
		encoding: String,
		indexed: bool,
		reference: Option<ReferenceSpec>,
	},
	/// A 64-bit integer supporting atomic adjustment; never indexed
	Counter {
		name: String,
		storage_id: u32,
	},
	/// An ordered set of elements
	Set {
		name: String,
		storage_id: u32,
		element: SubField,
	},
	/// A positional list of elements
	List {
		name: String,
		storage_id: u32,
		element: SubField,
	},
	/// An ordered map of keys to values
	Map {
		name: String,
		storage_id: u32,
		key: SubField,
		value: SubField,
	},
}

impl Field {
	pub fn simple(name: impl Into<String>, storage_id: u32, encoding: impl Into<String>) -> Self {
		Field::Simple {
			name: name.into(),
			storage_id,
			encoding: encoding.into(),
			indexed: false,
			reference: None,
		}
	}

	/// A simple field holding object references.
	pub fn reference(name: impl Into<String>, storage_id: u32, spec: ReferenceSpec) -> Self {
		Field::Simple {
			name: name.into(),
			storage_id,
			encoding: "reference".to_string(),
			indexed: false,
			reference: Some(spec),
		}
	}

	pub fn counter(name: impl Into<String>, storage_id: u32) -> Self {
		Field::Counter {
			name: name.into(),
			storage_id,
		}
	}

	pub fn set(name: impl Into<String>, storage_id: u32, element: SubField) -> Self {
		Field::Set {
			name: name.into(),
			storage_id,
			element,
		}
	}

	pub fn list(name: impl Into<String>, storage_id: u32, element: SubField) -> Self {
		Field::List {
			name: name.into(),
			storage_id,
			element,
		}
	}

	pub fn map(name: impl Into<String>, storage_id: u32, key: SubField, value: SubField) -> Self {
		Field::Map {
			name: name.into(),
			storage_id,
			key,
			value,
		}
	}

	/// Mark a simple field as indexed. Ignored for other field kinds, whose
	/// sub-fields carry their own flags.
	pub fn indexed(mut self) -> Self {
		if let Field::Simple {
			indexed,
			..
		} = &mut self
		{
			*indexed = true;
		}
		self
	}

	pub fn name(&self) -> &str {
		match self {
			Field::Simple {
				name,
				..
			}
			| Field::Counter {
				name,
				..
			}
			| Field::Set {
				name,
				..
			}
			| Field::List {
				name,
				..
			}
			| Field::Map {
				name,
				..
			} => name,
		}
	}

	pub fn storage_id(&self) -> u32 {
		match self {
			Field::Simple {
				storage_id,
				..
			}
			| Field::Counter {
				storage_id,
				..
			}
			| Field::Set {
				storage_id,
				..
			}
			| Field::List {
				storage_id,
				..
			}
			| Field::Map {
				storage_id,
				..
			} => *storage_id,
		}
	}
}

/// An index over a tuple of simple fields in a fixed order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeIndex {
	pub name: String,
	pub storage_id: u32,
	/// The storage-ids of the indexed simple fields, in index order
	pub fields: Vec<u32>,
}

impl CompositeIndex {
	pub fn new(
		name: impl Into<String>,
		storage_id: u32,
		fields: impl IntoIterator<Item = u32>,
	) -> Self {
		Self {
			name: name.into(),
			storage_id,
			fields: fields.into_iter().collect(),
		}
	}
}

/// One object type in a schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
	pub name: String,
	pub storage_id: u32,
	pub fields: Vec<Field>,
	pub composites: Vec<CompositeIndex>,
}

impl ObjectType {
	pub fn new(name: impl Into<String>, storage_id: u32) -> Self {
		Self {
			name: name.into(),
			storage_id,
			fields: Vec::new(),
			composites: Vec::new(),
		}
	}

	pub fn with_field(mut self, field: Field) -> Self {
		self.fields.push(field);
		self
	}

	pub fn with_composite(mut self, index: CompositeIndex) -> Self {
		self.composites.push(index);
		self
	}
}

/// A complete structural data model. Produced by the schema parser or built
/// programmatically; consumed by [`SchemaRegistry::record`].
///
/// [`SchemaRegistry::record`]: registry::SchemaRegistry::record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModel {
	pub object_types: Vec<ObjectType>,
}

impl SchemaModel {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_type(mut self, object_type: ObjectType) -> Self {
		self.object_types.push(object_type);
		self
	}

	/// Normalise the model into its canonical shape: object types sorted by
	/// storage-id, fields and composites sorted within each type. Canonical
	/// equality of two models is byte equality of their encoded forms.
	pub fn normalise(&mut self) {
		for t in &mut self.object_types {
			t.fields.sort_by_key(Field::storage_id);
			t.composites.sort_by_key(|c| c.storage_id);
		}
		self.object_types.sort_by_key(|t| t.storage_id);
	}
}
