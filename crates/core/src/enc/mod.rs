//! The byte codec library. Every field value type is encoded such that
//! bytewise comparison of two encodings equals the type's logical comparison,
//! which lets an ordered key-value store act directly as an index. All
//! encodings are self-delimiting, so tuples concatenate without separators.

pub mod array;
pub mod primitive;
pub mod registry;
pub mod string;
pub mod tuple;
pub mod varint;

use crate::err::Error;
use crate::obj::ObjId;
use std::cmp::Ordering;

/// A cursor over an encoded byte slice.
pub struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	/// Create a new reader over the given bytes.
	pub fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
			pos: 0,
		}
	}

	/// The number of bytes not yet consumed.
	pub fn remaining(&self) -> usize {
		self.buf.len() - self.pos
	}

	/// The current cursor position.
	pub fn position(&self) -> usize {
		self.pos
	}

	/// Read a single byte, failing if the input is exhausted.
	pub fn read_u8(&mut self) -> Result<u8, Error> {
		let b = self.peek_u8()?;
		self.pos += 1;
		Ok(b)
	}

	/// Inspect the next byte without consuming it.
	pub fn peek_u8(&self) -> Result<u8, Error> {
		self.buf
			.get(self.pos)
			.copied()
			.ok_or_else(|| Error::InconsistentDatabase("truncated encoding".to_string()))
	}

	/// Read exactly `n` bytes, failing if the input is exhausted.
	pub fn read_n(&mut self, n: usize) -> Result<&'a [u8], Error> {
		if self.remaining() < n {
			return Err(Error::InconsistentDatabase("truncated encoding".to_string()));
		}
		let out = &self.buf[self.pos..self.pos + n];
		self.pos += n;
		Ok(out)
	}
}

/// A dynamically typed field value.
#[derive(Clone, Debug)]
pub enum Value {
	Null,
	Bool(bool),
	I8(i8),
	I16(i16),
	I32(i32),
	I64(i64),
	U8(u8),
	U16(u16),
	U64(u64),
	Char(char),
	F32(f32),
	F64(f64),
	String(String),
	Bytes(Vec<u8>),
	Ref(ObjId),
	Enum(u32),
	Array(Vec<Value>),
	Tuple(Vec<Value>),
}

impl Value {
	/// The ordering rank of the value's variant. Values of different
	/// variants never meet inside one index; the rank only makes the total
	/// order over [`Value`] well defined.
	fn rank(&self) -> u8 {
		match self {
			Value::Null => 0,
			Value::Bool(_) => 1,
			Value::I8(_) => 2,
			Value::I16(_) => 3,
			Value::I32(_) => 4,
			Value::I64(_) => 5,
			Value::U8(_) => 6,
			Value::U16(_) => 7,
			Value::U64(_) => 8,
			Value::Char(_) => 9,
			Value::F32(_) => 10,
			Value::F64(_) => 11,
			Value::String(_) => 12,
			Value::Bytes(_) => 13,
			Value::Ref(_) => 14,
			Value::Enum(_) => 15,
			Value::Array(_) => 16,
			Value::Tuple(_) => 17,
		}
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		match (self, other) {
			(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
			(Value::I8(a), Value::I8(b)) => a.cmp(b),
			(Value::I16(a), Value::I16(b)) => a.cmp(b),
			(Value::I32(a), Value::I32(b)) => a.cmp(b),
			(Value::I64(a), Value::I64(b)) => a.cmp(b),
			(Value::U8(a), Value::U8(b)) => a.cmp(b),
			(Value::U16(a), Value::U16(b)) => a.cmp(b),
			(Value::U64(a), Value::U64(b)) => a.cmp(b),
			(Value::Char(a), Value::Char(b)) => a.cmp(b),
			(Value::F32(a), Value::F32(b)) => {
				primitive::canonical_f32(*a).total_cmp(&primitive::canonical_f32(*b))
			}
			(Value::F64(a), Value::F64(b)) => {
				primitive::canonical_f64(*a).total_cmp(&primitive::canonical_f64(*b))
			}
			(Value::String(a), Value::String(b)) => a.cmp(b),
			(Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
			(Value::Ref(a), Value::Ref(b)) => a.cmp(b),
			(Value::Enum(a), Value::Enum(b)) => a.cmp(b),
			(Value::Array(a), Value::Array(b)) => a.cmp(b),
			(Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
			(a, b) => a.rank().cmp(&b.rank()),
		}
	}
}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Value {}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::I32(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::I64(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::F64(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl From<ObjId> for Value {
	fn from(v: ObjId) -> Self {
		Value::Ref(v)
	}
}

/// An order-preserving codec for one field value type. Composite codecs are
/// built by nesting the `NullSafe`, `Array`, and `Tuple` variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldCodec {
	/// `0x00` / `0x01`, any other byte is rejected on decode
	Bool,
	/// Order-preserving signed varint, range-checked to 8 bits
	Int8,
	/// Order-preserving signed varint, range-checked to 16 bits
	Int16,
	/// Order-preserving signed varint, range-checked to 32 bits
	Int32,
	/// Order-preserving signed varint
	Int64,
	/// Raw fixed single byte
	UInt8,
	/// Raw fixed 2-byte big-endian
	UInt16,
	/// Raw fixed 8-byte big-endian
	UInt64,
	/// Unicode scalar value as fixed 4-byte big-endian
	Char,
	/// IEEE-754 with the sign-dependent bit flip, NaNs canonicalised
	Float32,
	/// IEEE-754 with the sign-dependent bit flip, NaNs canonicalised
	Float64,
	/// UTF-8 with `0x00`-escaping and a `0x00 0x00` terminator
	String,
	/// Raw bytes with `0x00`-escaping and a `0x00 0x00` terminator
	Bytes,
	/// Object identifier bytes; a null reference is a single `0x00`
	Reference,
	/// `0x00` for null (sorting first), else `0x01` followed by the inner
	/// encoding
	NullSafe(Box<FieldCodec>),
	/// `0x01`-prefixed elements followed by a `0x00` end marker
	Array(Box<FieldCodec>),
	/// Concatenated sub-encodings, no separators
	Tuple(Vec<FieldCodec>),
	/// Ordinal of an identifier list as an unsigned varint; the decoder
	/// requires the identical identifier list used at encode time
	Enum(Vec<String>),
}

impl FieldCodec {
	/// Append the encoding of a value, failing if the value does not match
	/// this codec's type.
	pub fn encode(&self, buf: &mut Vec<u8>, v: &Value) -> Result<(), Error> {
		match (self, v) {
			(FieldCodec::Bool, Value::Bool(b)) => primitive::write_bool(buf, *b),
			(FieldCodec::Int8, Value::I8(i)) => varint::write_varint(buf, *i as i64),
			(FieldCodec::Int16, Value::I16(i)) => varint::write_varint(buf, *i as i64),
			(FieldCodec::Int32, Value::I32(i)) => varint::write_varint(buf, *i as i64),
			(FieldCodec::Int64, Value::I64(i)) => varint::write_varint(buf, *i),
			(FieldCodec::UInt8, Value::U8(u)) => buf.push(*u),
			(FieldCodec::UInt16, Value::U16(u)) => buf.extend_from_slice(&u.to_be_bytes()),
			(FieldCodec::UInt64, Value::U64(u)) => buf.extend_from_slice(&u.to_be_bytes()),
			(FieldCodec::Char, Value::Char(c)) => buf.extend_from_slice(&(*c as u32).to_be_bytes()),
			(FieldCodec::Float32, Value::F32(f)) => primitive::write_f32(buf, *f),
			(FieldCodec::Float64, Value::F64(f)) => primitive::write_f64(buf, *f),
			(FieldCodec::String, Value::String(s)) => string::write_string(buf, s),
			(FieldCodec::Bytes, Value::Bytes(b)) => string::write_bytes(buf, b),
			(FieldCodec::Reference, Value::Ref(id)) => buf.extend_from_slice(id.as_bytes()),
			(FieldCodec::Reference, Value::Null) => buf.push(0x00),
			(FieldCodec::NullSafe(_), Value::Null) => buf.push(0x00),
			(FieldCodec::NullSafe(inner), v) => {
				buf.push(0x01);
				inner.encode(buf, v)?;
			}
			(FieldCodec::Array(elem), Value::Array(vs)) => array::write_array(elem, buf, vs)?,
			(FieldCodec::Tuple(parts), Value::Tuple(vs)) => tuple::write_tuple(parts, buf, vs)?,
			(FieldCodec::Enum(idents), Value::Enum(ord)) => {
				if *ord as usize >= idents.len() {
					return Err(Error::IncompatibleValue(format!(
						"enum ordinal {ord} out of range for {} identifiers",
						idents.len()
					)));
				}
				varint::write_uvarint(buf, *ord as u64);
			}
			(codec, v) => {
				return Err(Error::IncompatibleValue(format!(
					"value {v:?} does not match encoding {codec:?}"
				)));
			}
		}
		Ok(())
	}

	/// Decode one value, leaving the cursor immediately after its encoding.
	pub fn decode(&self, r: &mut Reader) -> Result<Value, Error> {
		match self {
			FieldCodec::Bool => Ok(Value::Bool(primitive::read_bool(r)?)),
			FieldCodec::Int8 => {
				let v = varint::read_varint(r)?;
				let v = i8::try_from(v).map_err(|_| {
					Error::InconsistentDatabase(format!("value {v} out of range for int8"))
				})?;
				Ok(Value::I8(v))
			}
			FieldCodec::Int16 => {
				let v = varint::read_varint(r)?;
				let v = i16::try_from(v).map_err(|_| {
					Error::InconsistentDatabase(format!("value {v} out of range for int16"))
				})?;
				Ok(Value::I16(v))
			}
			FieldCodec::Int32 => {
				let v = varint::read_varint(r)?;
				let v = i32::try_from(v).map_err(|_| {
					Error::InconsistentDatabase(format!("value {v} out of range for int32"))
				})?;
				Ok(Value::I32(v))
			}
			FieldCodec::Int64 => Ok(Value::I64(varint::read_varint(r)?)),
			FieldCodec::UInt8 => Ok(Value::U8(r.read_u8()?)),
			FieldCodec::UInt16 => {
				let b = r.read_n(2)?;
				Ok(Value::U16(u16::from_be_bytes([b[0], b[1]])))
			}
			FieldCodec::UInt64 => {
				let b: [u8; 8] = r.read_n(8)?.try_into().map_err(|_| {
					Error::InconsistentDatabase("truncated uint64 encoding".to_string())
				})?;
				Ok(Value::U64(u64::from_be_bytes(b)))
			}
			FieldCodec::Char => {
				let b = r.read_n(4)?;
				let u = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
				char::from_u32(u)
					.map(Value::Char)
					.ok_or_else(|| Error::InconsistentDatabase(format!("invalid char scalar {u:#x}")))
			}
			FieldCodec::Float32 => Ok(Value::F32(primitive::read_f32(r)?)),
			FieldCodec::Float64 => Ok(Value::F64(primitive::read_f64(r)?)),
			FieldCodec::String => Ok(Value::String(string::read_string(r)?)),
			FieldCodec::Bytes => Ok(Value::Bytes(string::read_bytes(r)?)),
			FieldCodec::Reference => {
				if r.peek_u8()? == 0x00 {
					r.read_u8()?;
					Ok(Value::Null)
				} else {
					Ok(Value::Ref(ObjId::decode(r)?))
				}
			}
			FieldCodec::NullSafe(inner) => match r.read_u8()? {
				0x00 => Ok(Value::Null),
				0x01 => inner.decode(r),
				b => Err(Error::InconsistentDatabase(format!("invalid null-safe prefix {b:#04x}"))),
			},
			FieldCodec::Array(elem) => array::read_array(elem, r),
			FieldCodec::Tuple(parts) => tuple::read_tuple(parts, r),
			FieldCodec::Enum(idents) => {
				let ord = varint::read_uvarint(r)?;
				if ord as usize >= idents.len() {
					return Err(Error::InconsistentDatabase(format!(
						"enum ordinal {ord} out of range for {} identifiers",
						idents.len()
					)));
				}
				Ok(Value::Enum(ord as u32))
			}
		}
	}

	/// Advance the cursor past one encoded value, exactly as [`decode`]
	/// would, without materialising it.
	///
	/// [`decode`]: FieldCodec::decode
	pub fn skip(&self, r: &mut Reader) -> Result<(), Error> {
		match self {
			FieldCodec::Bool | FieldCodec::UInt8 => r.read_u8().map(|_| ()),
			FieldCodec::Int8 | FieldCodec::Int16 | FieldCodec::Int32 | FieldCodec::Int64 => {
				varint::skip_varint(r)
			}
			FieldCodec::UInt16 => r.read_n(2).map(|_| ()),
			FieldCodec::UInt64 => r.read_n(8).map(|_| ()),
			FieldCodec::Char | FieldCodec::Float32 => r.read_n(4).map(|_| ()),
			FieldCodec::Float64 => r.read_n(8).map(|_| ()),
			FieldCodec::String | FieldCodec::Bytes => string::skip_escaped(r),
			FieldCodec::Reference => {
				if r.read_u8()? != 0x00 {
					r.read_n(crate::cnf::OBJ_ID_LENGTH - 1)?;
				}
				Ok(())
			}
			FieldCodec::NullSafe(inner) => match r.read_u8()? {
				0x00 => Ok(()),
				0x01 => inner.skip(r),
				b => Err(Error::InconsistentDatabase(format!("invalid null-safe prefix {b:#04x}"))),
			},
			FieldCodec::Array(elem) => array::skip_array(elem, r),
			FieldCodec::Tuple(parts) => {
				for part in parts {
					part.skip(r)?;
				}
				Ok(())
			}
			FieldCodec::Enum(_) => varint::skip_uvarint(r),
		}
	}

	/// Whether any encoding of this codec may begin with a `0x00` byte.
	pub fn has_prefix_0x00(&self) -> bool {
		match self {
			FieldCodec::Bool
			| FieldCodec::UInt8
			| FieldCodec::UInt16
			| FieldCodec::UInt64
			| FieldCodec::Char
			| FieldCodec::Float32
			| FieldCodec::Float64
			| FieldCodec::String
			| FieldCodec::Bytes
			| FieldCodec::Reference
			| FieldCodec::NullSafe(_)
			| FieldCodec::Array(_)
			| FieldCodec::Enum(_) => true,
			FieldCodec::Int8 | FieldCodec::Int16 | FieldCodec::Int32 | FieldCodec::Int64 => false,
			FieldCodec::Tuple(parts) => parts.first().is_some_and(FieldCodec::has_prefix_0x00),
		}
	}

	/// Whether any encoding of this codec may begin with a `0xff` byte.
	pub fn has_prefix_0xff(&self) -> bool {
		match self {
			FieldCodec::UInt8 | FieldCodec::UInt16 | FieldCodec::UInt64 => true,
			FieldCodec::Float32 | FieldCodec::Float64 => true,
			FieldCodec::Bytes => true,
			FieldCodec::Bool
			| FieldCodec::Int8
			| FieldCodec::Int16
			| FieldCodec::Int32
			| FieldCodec::Int64
			| FieldCodec::Char
			| FieldCodec::String
			| FieldCodec::Reference
			| FieldCodec::NullSafe(_)
			| FieldCodec::Array(_)
			| FieldCodec::Enum(_) => false,
			FieldCodec::Tuple(parts) => parts.first().is_some_and(FieldCodec::has_prefix_0xff),
		}
	}

	/// The default value of a field with this codec: null for nullable
	/// codecs, zero-like otherwise.
	pub fn default_value(&self) -> Value {
		match self {
			FieldCodec::Bool => Value::Bool(false),
			FieldCodec::Int8 => Value::I8(0),
			FieldCodec::Int16 => Value::I16(0),
			FieldCodec::Int32 => Value::I32(0),
			FieldCodec::Int64 => Value::I64(0),
			FieldCodec::UInt8 => Value::U8(0),
			FieldCodec::UInt16 => Value::U16(0),
			FieldCodec::UInt64 => Value::U64(0),
			FieldCodec::Char => Value::Char('\0'),
			FieldCodec::Float32 => Value::F32(0.0),
			FieldCodec::Float64 => Value::F64(0.0),
			FieldCodec::String => Value::String(String::new()),
			FieldCodec::Bytes => Value::Bytes(Vec::new()),
			FieldCodec::Reference | FieldCodec::NullSafe(_) => Value::Null,
			FieldCodec::Array(_) => Value::Array(Vec::new()),
			FieldCodec::Tuple(parts) => {
				Value::Tuple(parts.iter().map(FieldCodec::default_value).collect())
			}
			FieldCodec::Enum(_) => Value::Enum(0),
		}
	}

	/// Encode a value to a fresh buffer.
	pub fn encoded(&self, v: &Value) -> Result<Vec<u8>, Error> {
		let mut buf = Vec::new();
		self.encode(&mut buf, v)?;
		Ok(buf)
	}

	/// The encoding of this codec's default value.
	pub fn encoded_default(&self) -> Result<Vec<u8>, Error> {
		self.encoded(&self.default_value())
	}

	/// Decode a single value which must span the entire input.
	pub fn decode_all(&self, buf: &[u8]) -> Result<Value, Error> {
		let mut r = Reader::new(buf);
		let v = self.decode(&mut r)?;
		if r.remaining() > 0 {
			return Err(Error::InconsistentDatabase("trailing bytes after encoded value".to_string()));
		}
		Ok(v)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn skip_matches_decode() {
		let cases: Vec<(FieldCodec, Value)> = vec![
			(FieldCodec::Bool, Value::Bool(true)),
			(FieldCodec::Int32, Value::I32(-123456)),
			(FieldCodec::Int64, Value::I64(i64::MIN)),
			(FieldCodec::Char, Value::Char('€')),
			(FieldCodec::Float64, Value::F64(-2.5)),
			(FieldCodec::String, Value::String("a\0b".to_string())),
			(FieldCodec::Bytes, Value::Bytes(vec![0x00, 0xff, 0x00])),
			(FieldCodec::Reference, Value::Null),
			(
				FieldCodec::NullSafe(Box::new(FieldCodec::Int32)),
				Value::I32(7),
			),
			(
				FieldCodec::Array(Box::new(FieldCodec::Int32)),
				Value::Array(vec![Value::I32(1), Value::I32(2)]),
			),
			(
				FieldCodec::Tuple(vec![FieldCodec::Int32, FieldCodec::String]),
				Value::Tuple(vec![Value::I32(5), Value::String("x".to_string())]),
			),
			(
				FieldCodec::Enum(vec!["ONE".to_string(), "TWO".to_string()]),
				Value::Enum(1),
			),
		];
		for (codec, value) in cases {
			// Append a sentinel so a lagging cursor is detected
			let mut enc = codec.encoded(&value).unwrap();
			let len = enc.len();
			enc.push(0xee);
			let mut r = Reader::new(&enc);
			assert_eq!(codec.decode(&mut r).unwrap(), value, "{codec:?}");
			assert_eq!(r.position(), len, "decode length for {codec:?}");
			let mut r = Reader::new(&enc);
			codec.skip(&mut r).unwrap();
			assert_eq!(r.position(), len, "skip length for {codec:?}");
		}
	}

	#[test]
	fn null_sorts_first() {
		let codec = FieldCodec::NullSafe(Box::new(FieldCodec::Int64));
		let null = codec.encoded(&Value::Null).unwrap();
		let min = codec.encoded(&Value::I64(i64::MIN)).unwrap();
		assert!(null < min);
	}

	#[test]
	fn mismatched_value_is_rejected() {
		let codec = FieldCodec::Int32;
		assert!(matches!(
			codec.encoded(&Value::String("nope".to_string())),
			Err(Error::IncompatibleValue(_))
		));
	}

	#[test]
	fn sentinel_prefix_flags() {
		assert!(!FieldCodec::Int64.has_prefix_0x00());
		assert!(!FieldCodec::Int64.has_prefix_0xff());
		assert!(FieldCodec::String.has_prefix_0x00());
		assert!(!FieldCodec::String.has_prefix_0xff());
		assert!(FieldCodec::Float64.has_prefix_0xff());
		assert!(FieldCodec::Bytes.has_prefix_0xff());
		let tup = FieldCodec::Tuple(vec![FieldCodec::Int32, FieldCodec::Bytes]);
		assert!(!tup.has_prefix_0xff());
	}
}
