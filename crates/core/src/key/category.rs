use std::fmt::{Display, Formatter};

/// The category of a key for error reporting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Category {
	/// crate::key::meta::Schema             0x00 0x00 {version}
	SchemaRecord,
	/// crate::key::version::Version         0x00 0x01 {version}{objid}
	VersionIndex,
	/// crate::key::meta::UserMeta           0x00 0xff {key}
	UserMeta,
	/// crate::key::obj::Obj                 {objid}
	ObjectMeta,
	/// crate::key::obj::Field               {objid}{field}
	ObjectField,
	/// crate::key::index::Index             {field}{value}{objid}[{disc}]
	FieldIndex,
	/// crate::key::composite::Composite     {cindex}{value1}..{valueN}{objid}
	CompositeIndex,
}

impl Display for Category {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		let name = match self {
			Self::SchemaRecord => "schema record",
			Self::VersionIndex => "version index",
			Self::UserMeta => "user meta-data",
			Self::ObjectMeta => "object meta",
			Self::ObjectField => "object field",
			Self::FieldIndex => "field index",
			Self::CompositeIndex => "composite index",
		};
		write!(f, "{name}")
	}
}
