//! Element arrays. Each element is prefixed with `0x01` and the array ends
//! with a `0x00` marker, so a shorter array that is a prefix of a longer one
//! sorts first and bytewise order equals element-wise lexicographic order.
//! Multi-dimensional arrays are plain arrays of arrays.

use super::{FieldCodec, Reader, Value};
use crate::err::Error;

/// Append the encoding of an array of values.
pub fn write_array(elem: &FieldCodec, buf: &mut Vec<u8>, vs: &[Value]) -> Result<(), Error> {
	for v in vs {
		buf.push(0x01);
		elem.encode(buf, v)?;
	}
	buf.push(0x00);
	Ok(())
}

/// Decode an array of values up to and including the end marker.
pub fn read_array(elem: &FieldCodec, r: &mut Reader) -> Result<Value, Error> {
	let mut out = Vec::new();
	loop {
		match r.read_u8()? {
			0x00 => return Ok(Value::Array(out)),
			0x01 => out.push(elem.decode(r)?),
			b => return Err(Error::InconsistentDatabase(format!("invalid array marker {b:#04x}"))),
		}
	}
}

/// Advance the reader past one encoded array.
pub fn skip_array(elem: &FieldCodec, r: &mut Reader) -> Result<(), Error> {
	loop {
		match r.read_u8()? {
			0x00 => return Ok(()),
			0x01 => elem.skip(r)?,
			b => return Err(Error::InconsistentDatabase(format!("invalid array marker {b:#04x}"))),
		}
	}
}
