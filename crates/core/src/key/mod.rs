//! How the keys are structured in the key value store.
///
/// crate::key::meta::Schema             0x00 0x00 {version}
/// crate::key::version::Version         0x00 0x01 {version}{objid}
/// crate::key::meta::UserMeta           0x00 0xff {key}
/// crate::key::obj::Obj                 {objid}
/// crate::key::obj::Field               {objid}{field}
/// set element                          {objid}{field}{element}
/// list element                         {objid}{field}{index:8BE}
/// map entry                            {objid}{field}{key}
/// crate::key::index::Index             {field}{value}{objid}[{disc}]
/// crate::key::composite::Composite     {cindex}{value1}..{valueN}{objid}
///
/// Storage-ids share one identifier space across object types, fields,
/// sub-fields, and composite indexes, and the `0x00` lead byte is reserved
/// for the meta region, so the key families above occupy disjoint ranges and
/// the version index sorts ahead of every object.
pub mod category;
pub mod composite;
pub mod debug;
pub mod index;
pub mod meta;
pub mod obj;
pub mod version;

/// The lead byte of the reserved meta region.
pub const META_LEAD: u8 = 0x00;

/// The tag byte of schema catalog records within the meta region.
pub const TAG_SCHEMA: u8 = 0x00;

/// The tag byte of version index entries within the meta region.
pub const TAG_VERSION: u8 = 0x01;

/// The tag byte of user meta-data within the meta region.
pub const TAG_USER: u8 = 0xff;

/// Compute the immediate successor of a key prefix: the smallest byte string
/// greater than every key starting with the prefix. Returns `None` when the
/// prefix is entirely `0xff` bytes and no such bound exists.
pub fn next_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
	let mut out = prefix.to_vec();
	while let Some(last) = out.last_mut() {
		if *last < 0xff {
			*last += 1;
			return Some(out);
		}
		out.pop();
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn next_prefix_increments() {
		assert_eq!(next_prefix(&[0x0a, 0x11]), Some(vec![0x0a, 0x12]));
		assert_eq!(next_prefix(&[0x0a, 0xff]), Some(vec![0x0b]));
		assert_eq!(next_prefix(&[0xff, 0xff]), None);
		assert_eq!(next_prefix(&[]), None);
	}
}
