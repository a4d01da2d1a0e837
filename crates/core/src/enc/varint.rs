//! Variable-length integer encodings whose bytewise order matches numeric
//! order. The unsigned form is used for storage-ids, schema versions, and
//! enum ordinals; the signed form encodes integral field values.
//!
//! Unsigned layout: values up to `0xf7` occupy a single byte. Larger values
//! store `0xf7 + n` followed by the `n` big-endian bytes of `value - 0xf8`,
//! so longer encodings always sort after shorter ones.
//!
//! Signed layout: values in `[-64, 64)` occupy a single byte (`0x80 + v`).
//! Larger magnitudes store a lead byte encoding both sign and length
//! (`0xbf + n` for positive, `0x40 - n` for negative) followed by `n`
//! big-endian bytes of the offset magnitude. Negative leads fall below and
//! positive leads above the single-byte band, so bytewise comparison agrees
//! with signed comparison for every pair of values.

use super::Reader;
use crate::err::Error;

/// The highest value of a single-byte unsigned encoding.
const UNSIGNED_MAX_INLINE: u64 = 0xf7;

/// Half the width of the single-byte signed band.
const SIGNED_INLINE_BOUND: i64 = 64;

/// Append the order-preserving encoding of an unsigned integer.
pub fn write_uvarint(buf: &mut Vec<u8>, v: u64) {
	if v <= UNSIGNED_MAX_INLINE {
		buf.push(v as u8);
		return;
	}
	let adj = v - (UNSIGNED_MAX_INLINE + 1);
	let n = byte_width(adj);
	buf.push(0xf7 + n as u8);
	buf.extend_from_slice(&adj.to_be_bytes()[8 - n..]);
}

/// Decode an order-preserving unsigned integer, rejecting non-canonical forms.
pub fn read_uvarint(r: &mut Reader) -> Result<u64, Error> {
	let lead = r.read_u8()?;
	if lead as u64 <= UNSIGNED_MAX_INLINE {
		return Ok(lead as u64);
	}
	let n = (lead - 0xf7) as usize;
	let mut adj = 0u64;
	for &b in r.read_n(n)? {
		adj = adj << 8 | b as u64;
	}
	// A multi-byte magnitude must use its minimal width
	if n > 1 && adj >> (8 * (n - 1)) == 0 {
		return Err(Error::InconsistentDatabase("non-canonical unsigned varint".to_string()));
	}
	adj.checked_add(UNSIGNED_MAX_INLINE + 1)
		.ok_or_else(|| Error::InconsistentDatabase("unsigned varint overflow".to_string()))
}

/// Advance the reader past one encoded unsigned integer.
pub fn skip_uvarint(r: &mut Reader) -> Result<(), Error> {
	let lead = r.read_u8()?;
	if lead as u64 > UNSIGNED_MAX_INLINE {
		r.read_n((lead - 0xf7) as usize)?;
	}
	Ok(())
}

/// The total encoded length implied by the lead byte of an unsigned varint.
pub fn uvarint_len(lead: u8) -> usize {
	if lead as u64 <= UNSIGNED_MAX_INLINE {
		1
	} else {
		1 + (lead - 0xf7) as usize
	}
}

/// Encode an unsigned integer to a fresh buffer.
pub fn uvarint(v: u64) -> Vec<u8> {
	let mut buf = Vec::with_capacity(9);
	write_uvarint(&mut buf, v);
	buf
}

/// Append the order-preserving encoding of a signed integer.
pub fn write_varint(buf: &mut Vec<u8>, v: i64) {
	if (-SIGNED_INLINE_BOUND..SIGNED_INLINE_BOUND).contains(&v) {
		buf.push((v + 0x80) as u8);
	} else if v >= SIGNED_INLINE_BOUND {
		let adj = (v - SIGNED_INLINE_BOUND) as u64;
		let n = byte_width(adj);
		buf.push(0xbf + n as u8);
		buf.extend_from_slice(&adj.to_be_bytes()[8 - n..]);
	} else {
		// v < -64: encode the offset magnitude in offset-binary form so that
		// more negative values produce smaller bytes
		let mag = (v + SIGNED_INLINE_BOUND).unsigned_abs();
		let n = byte_width(mag - 1);
		buf.push(0x40 - n as u8);
		let enc = (1u128 << (8 * n)) - mag as u128;
		buf.extend_from_slice(&(enc as u64).to_be_bytes()[8 - n..]);
	}
}

/// Decode an order-preserving signed integer, rejecting non-canonical forms.
pub fn read_varint(r: &mut Reader) -> Result<i64, Error> {
	let lead = r.read_u8()?;
	match lead {
		0x40..=0xbf => Ok(lead as i64 - 0x80),
		0xc0..=0xc7 => {
			let n = (lead - 0xbf) as usize;
			let mut adj = 0u64;
			for &b in r.read_n(n)? {
				adj = adj << 8 | b as u64;
			}
			if n > 1 && adj >> (8 * (n - 1)) == 0 {
				return Err(Error::InconsistentDatabase("non-canonical signed varint".to_string()));
			}
			(adj as i128 + SIGNED_INLINE_BOUND as i128)
				.try_into()
				.map_err(|_| Error::InconsistentDatabase("signed varint overflow".to_string()))
		}
		0x38..=0x3f => {
			let n = (0x40 - lead) as usize;
			let mut enc = 0u64;
			for &b in r.read_n(n)? {
				enc = enc << 8 | b as u64;
			}
			let mag = (1u128 << (8 * n)) - enc as u128;
			if n > 1 && mag - 1 < 1u128 << (8 * (n - 1)) {
				return Err(Error::InconsistentDatabase("non-canonical signed varint".to_string()));
			}
			(-(mag as i128) - SIGNED_INLINE_BOUND as i128)
				.try_into()
				.map_err(|_| Error::InconsistentDatabase("signed varint overflow".to_string()))
		}
		_ => Err(Error::InconsistentDatabase(format!("invalid signed varint lead byte {lead:#04x}"))),
	}
}

/// Advance the reader past one encoded signed integer.
pub fn skip_varint(r: &mut Reader) -> Result<(), Error> {
	let lead = r.read_u8()?;
	match lead {
		0x40..=0xbf => Ok(()),
		0xc0..=0xc7 => r.read_n((lead - 0xbf) as usize).map(|_| ()),
		0x38..=0x3f => r.read_n((0x40 - lead) as usize).map(|_| ()),
		_ => Err(Error::InconsistentDatabase(format!("invalid signed varint lead byte {lead:#04x}"))),
	}
}

/// The minimal number of big-endian bytes needed to represent a value.
fn byte_width(v: u64) -> usize {
	(8 - v.leading_zeros() as usize / 8).max(1)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip_u(v: u64) -> Vec<u8> {
		let enc = uvarint(v);
		let mut r = Reader::new(&enc);
		assert_eq!(read_uvarint(&mut r).unwrap(), v);
		assert_eq!(r.remaining(), 0);
		let mut r = Reader::new(&enc);
		skip_uvarint(&mut r).unwrap();
		assert_eq!(r.remaining(), 0);
		enc
	}

	fn roundtrip_i(v: i64) -> Vec<u8> {
		let mut enc = Vec::new();
		write_varint(&mut enc, v);
		let mut r = Reader::new(&enc);
		assert_eq!(read_varint(&mut r).unwrap(), v);
		assert_eq!(r.remaining(), 0);
		let mut r = Reader::new(&enc);
		skip_varint(&mut r).unwrap();
		assert_eq!(r.remaining(), 0);
		enc
	}

	#[test]
	fn unsigned_layout() {
		assert_eq!(roundtrip_u(0), vec![0x00]);
		assert_eq!(roundtrip_u(0xf7), vec![0xf7]);
		assert_eq!(roundtrip_u(0xf8), vec![0xf8, 0x00]);
		assert_eq!(roundtrip_u(0xf8 + 0xff), vec![0xf8, 0xff]);
		assert_eq!(roundtrip_u(0xf8 + 0x100), vec![0xf9, 0x01, 0x00]);
		assert_eq!(roundtrip_u(u64::MAX).len(), 9);
	}

	#[test]
	fn unsigned_order() {
		let samples = [
			0u64,
			1,
			63,
			0xf6,
			0xf7,
			0xf8,
			0x1f7,
			0x1f8,
			0x10000,
			0x123456,
			u32::MAX as u64,
			1 << 40,
			u64::MAX - 1,
			u64::MAX,
		];
		for a in samples {
			for b in samples {
				assert_eq!(uvarint(a).cmp(&uvarint(b)), a.cmp(&b), "{a} vs {b}");
			}
		}
	}

	#[test]
	fn unsigned_non_canonical() {
		// A two-byte magnitude with a zero top byte must be rejected
		let mut r = Reader::new(&[0xf9, 0x00, 0x42]);
		assert!(read_uvarint(&mut r).is_err());
	}

	#[test]
	fn signed_layout() {
		assert_eq!(roundtrip_i(0), vec![0x80]);
		assert_eq!(roundtrip_i(-64), vec![0x40]);
		assert_eq!(roundtrip_i(63), vec![0xbf]);
		assert_eq!(roundtrip_i(64), vec![0xc0, 0x00]);
		assert_eq!(roundtrip_i(-65), vec![0x3f, 0xff]);
		assert_eq!(roundtrip_i(-320), vec![0x3f, 0x00]);
		assert_eq!(roundtrip_i(-321), vec![0x3e, 0xfe, 0xff]);
		assert_eq!(roundtrip_i(i64::MAX).len(), 9);
		assert_eq!(roundtrip_i(i64::MIN).len(), 9);
	}

	#[test]
	fn signed_order() {
		let samples = [
			i64::MIN,
			i64::MIN + 1,
			-(1 << 40),
			-65536,
			-321,
			-320,
			-65,
			-64,
			-1,
			0,
			1,
			63,
			64,
			319,
			320,
			65535,
			1 << 40,
			i64::MAX - 1,
			i64::MAX,
		];
		for a in samples {
			for b in samples {
				let mut ea = Vec::new();
				let mut eb = Vec::new();
				write_varint(&mut ea, a);
				write_varint(&mut eb, b);
				assert_eq!(ea.cmp(&eb), a.cmp(&b), "{a} vs {b}");
			}
		}
	}

	#[test]
	fn signed_invalid_lead() {
		let mut r = Reader::new(&[0x00]);
		assert!(read_varint(&mut r).is_err());
		let mut r = Reader::new(&[0xff]);
		assert!(read_varint(&mut r).is_err());
	}
}
