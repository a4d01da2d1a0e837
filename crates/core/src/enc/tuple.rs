//! Tuple encodings. Sub-encodings are concatenated in order with no
//! separators; every codec is self-delimiting, so decoding peels components
//! off one by one and bytewise order equals component-wise order.

use super::{FieldCodec, Reader, Value};
use crate::err::Error;

/// Append the concatenated encodings of a tuple's components.
pub fn write_tuple(parts: &[FieldCodec], buf: &mut Vec<u8>, vs: &[Value]) -> Result<(), Error> {
	if parts.len() != vs.len() {
		return Err(Error::IncompatibleValue(format!(
			"tuple of {} values does not match encoding of {} components",
			vs.len(),
			parts.len()
		)));
	}
	for (part, v) in parts.iter().zip(vs) {
		part.encode(buf, v)?;
	}
	Ok(())
}

/// Decode a tuple's components in order.
pub fn read_tuple(parts: &[FieldCodec], r: &mut Reader) -> Result<Value, Error> {
	let mut out = Vec::with_capacity(parts.len());
	for part in parts {
		out.push(part.decode(r)?);
	}
	Ok(Value::Tuple(out))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn order_is_component_wise() {
		let codec = FieldCodec::Tuple(vec![FieldCodec::Int32, FieldCodec::String]);
		let samples = [
			(1, ""),
			(1, "a"),
			(1, "b"),
			(2, ""),
			(2, "a"),
		];
		let encode = |(i, s): (i32, &str)| {
			codec
				.encoded(&Value::Tuple(vec![Value::I32(i), Value::String(s.to_string())]))
				.unwrap()
		};
		for (i, a) in samples.iter().enumerate() {
			for (j, b) in samples.iter().enumerate() {
				assert_eq!(encode(*a).cmp(&encode(*b)), i.cmp(&j), "{a:?} vs {b:?}");
			}
		}
	}
}
