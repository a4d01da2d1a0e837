//! Terminator-safe encodings for UTF-8 strings and raw byte arrays. Every
//! `0x00` in the payload is stuffed as `0x00 0x01` and the encoding ends with
//! `0x00 0x00`. The terminator sorts below any stuffed or literal byte, so a
//! proper prefix sorts first and bytewise order equals payload order.

use super::Reader;
use crate::err::Error;

/// Append the escaped payload bytes and the terminator.
fn write_escaped(buf: &mut Vec<u8>, payload: &[u8]) {
	for &b in payload {
		if b == 0x00 {
			buf.extend_from_slice(&[0x00, 0x01]);
		} else {
			buf.push(b);
		}
	}
	buf.extend_from_slice(&[0x00, 0x00]);
}

/// Decode an escaped payload up to and including the terminator.
fn read_escaped(r: &mut Reader) -> Result<Vec<u8>, Error> {
	let mut out = Vec::new();
	loop {
		match r.read_u8()? {
			0x00 => match r.read_u8()? {
				0x00 => return Ok(out),
				0x01 => out.push(0x00),
				b => {
					return Err(Error::InconsistentDatabase(format!(
						"invalid byte {b:#04x} after escape"
					)));
				}
			},
			b => out.push(b),
		}
	}
}

/// Advance the reader past one escaped payload.
pub fn skip_escaped(r: &mut Reader) -> Result<(), Error> {
	loop {
		if r.read_u8()? == 0x00 {
			match r.read_u8()? {
				0x00 => return Ok(()),
				0x01 => (),
				b => {
					return Err(Error::InconsistentDatabase(format!(
						"invalid byte {b:#04x} after escape"
					)));
				}
			}
		}
	}
}

/// Append the terminator-safe encoding of a UTF-8 string.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
	write_escaped(buf, s.as_bytes());
}

/// Decode a terminator-safe UTF-8 string.
pub fn read_string(r: &mut Reader) -> Result<String, Error> {
	let bytes = read_escaped(r)?;
	String::from_utf8(bytes)
		.map_err(|e| Error::InconsistentDatabase(format!("invalid utf-8 in string encoding: {e}")))
}

/// Append the terminator-safe encoding of a byte array.
pub fn write_bytes(buf: &mut Vec<u8>, payload: &[u8]) {
	write_escaped(buf, payload);
}

/// Decode a terminator-safe byte array.
pub fn read_bytes(r: &mut Reader) -> Result<Vec<u8>, Error> {
	read_escaped(r)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn enc(s: &str) -> Vec<u8> {
		let mut buf = Vec::new();
		write_string(&mut buf, s);
		buf
	}

	#[test]
	fn layout() {
		assert_eq!(enc(""), vec![0x00, 0x00]);
		assert_eq!(enc("ab"), vec![b'a', b'b', 0x00, 0x00]);
		assert_eq!(enc("a\0b"), vec![b'a', 0x00, 0x01, b'b', 0x00, 0x00]);
	}

	#[test]
	fn roundtrip() {
		for s in ["", "hello", "a\0b", "\0", "\0\0", "héllo wörld", "𝄞 clef"] {
			let encoded = enc(s);
			let mut r = Reader::new(&encoded);
			assert_eq!(read_string(&mut r).unwrap(), s);
			assert_eq!(r.remaining(), 0);
			let mut r = Reader::new(&encoded);
			skip_escaped(&mut r).unwrap();
			assert_eq!(r.remaining(), 0);
		}
	}

	#[test]
	fn order() {
		// Code-point order must equal bytewise encoding order
		let samples = ["", "\0", "\0a", "a", "a\0", "aa", "ab", "b", "ä", "𝄞"];
		for (i, a) in samples.iter().enumerate() {
			for (j, b) in samples.iter().enumerate() {
				assert_eq!(enc(a).cmp(&enc(b)), i.cmp(&j), "{a:?} vs {b:?}");
			}
		}
	}

	#[test]
	fn invalid_escape_is_rejected() {
		let mut r = Reader::new(&[0x00, 0x02]);
		assert!(read_string(&mut r).is_err());
	}
}
