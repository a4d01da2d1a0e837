//! Sorted sets of half-open byte ranges. A filter attached to an index slot
//! only admits entries whose slot bytes fall inside the union of its ranges;
//! filters compose by intersection.

use crate::enc::varint::uvarint;
use crate::key::next_prefix;

/// A half-open byte range `[start, end)`; an `end` of `None` is unbounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange {
	pub start: Vec<u8>,
	pub end: Option<Vec<u8>>,
}

impl KeyRange {
	pub fn new(start: impl Into<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
		Self {
			start: start.into(),
			end,
		}
	}

	/// The range of every byte string starting with the given prefix.
	pub fn prefix(prefix: &[u8]) -> Self {
		Self {
			start: prefix.to_vec(),
			end: next_prefix(prefix),
		}
	}

	fn contains(&self, key: &[u8]) -> bool {
		key >= self.start.as_slice() && self.end.as_deref().is_none_or(|end| key < end)
	}

	fn is_empty(&self) -> bool {
		self.end.as_deref().is_some_and(|end| end <= self.start.as_slice())
	}
}

/// A normalised union of half-open byte ranges: sorted, non-overlapping,
/// non-adjacent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRanges {
	ranges: Vec<KeyRange>,
}

impl KeyRanges {
	/// The set admitting every byte string.
	pub fn full() -> Self {
		Self {
			ranges: vec![KeyRange::new(Vec::new(), None)],
		}
	}

	/// The set admitting nothing.
	pub fn empty() -> Self {
		Self {
			ranges: Vec::new(),
		}
	}

	/// Build a normalised set from arbitrary ranges.
	pub fn new(ranges: impl IntoIterator<Item = KeyRange>) -> Self {
		let mut ranges: Vec<KeyRange> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
		ranges.sort_by(|a, b| a.start.cmp(&b.start));
		let mut out: Vec<KeyRange> = Vec::with_capacity(ranges.len());
		for range in ranges {
			match out.last_mut() {
				// Merge with the previous range when they touch or overlap
				Some(prev) if prev.end.as_deref().is_none_or(|end| range.start.as_slice() <= end) => {
					prev.end = match (&prev.end, &range.end) {
						(None, _) | (_, None) => None,
						(Some(a), Some(b)) => Some(a.max(b).clone()),
					};
				}
				_ => out.push(range),
			}
		}
		Self {
			ranges: out,
		}
	}

	/// The set admitting byte strings starting with one prefix.
	pub fn prefix(prefix: &[u8]) -> Self {
		Self::new([KeyRange::prefix(prefix)])
	}

	/// The set admitting the identifiers of every object of one type.
	pub fn for_type(type_id: u32) -> Self {
		Self::prefix(&uvarint(type_id as u64))
	}

	/// Whether no byte string is admitted.
	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	/// Whether the given byte string is admitted.
	pub fn contains(&self, key: &[u8]) -> bool {
		// Ranges are sorted, so find the last range starting at or below
		let idx = self.ranges.partition_point(|r| r.start.as_slice() <= key);
		idx > 0 && self.ranges[idx - 1].contains(key)
	}

	/// The set admitting exactly the byte strings admitted by both sets.
	pub fn intersect(&self, other: &Self) -> Self {
		let mut out = Vec::new();
		for a in &self.ranges {
			for b in &other.ranges {
				let start = a.start.clone().max(b.start.clone());
				let end = match (&a.end, &b.end) {
					(None, e) | (e, None) => e.clone(),
					(Some(x), Some(y)) => Some(x.min(y).clone()),
				};
				let range = KeyRange::new(start, end);
				if !range.is_empty() {
					out.push(range);
				}
			}
		}
		Self::new(out)
	}

	/// The set admitting the byte strings admitted by either set.
	pub fn union(&self, other: &Self) -> Self {
		Self::new(self.ranges.iter().chain(&other.ranges).cloned())
	}

	/// The underlying ranges, sorted.
	pub fn ranges(&self) -> &[KeyRange] {
		&self.ranges
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalisation_merges_overlaps() {
		let ranges = KeyRanges::new([
			KeyRange::new(vec![0x20], Some(vec![0x30])),
			KeyRange::new(vec![0x28], Some(vec![0x38])),
			KeyRange::new(vec![0x50], Some(vec![0x60])),
		]);
		assert_eq!(ranges.ranges().len(), 2);
		assert!(ranges.contains(&[0x25]));
		assert!(ranges.contains(&[0x34]));
		assert!(!ranges.contains(&[0x40]));
		assert!(ranges.contains(&[0x50]));
		assert!(!ranges.contains(&[0x60]));
	}

	#[test]
	fn prefix_ranges() {
		let ranges = KeyRanges::prefix(&[0x0a]);
		assert!(ranges.contains(&[0x0a]));
		assert!(ranges.contains(&[0x0a, 0xff, 0x01]));
		assert!(!ranges.contains(&[0x0b]));
	}

	#[test]
	fn intersection() {
		let a = KeyRanges::new([KeyRange::new(vec![0x10], Some(vec![0x40]))]);
		let b = KeyRanges::new([
			KeyRange::new(vec![0x00], Some(vec![0x20])),
			KeyRange::new(vec![0x30], None),
		]);
		let both = a.intersect(&b);
		assert!(both.contains(&[0x15]));
		assert!(!both.contains(&[0x25]));
		assert!(both.contains(&[0x35]));
		assert!(!both.contains(&[0x40]));
	}

	#[test]
	fn empty_intersection() {
		let a = KeyRanges::new([KeyRange::new(vec![0x10], Some(vec![0x20]))]);
		let b = KeyRanges::new([KeyRange::new(vec![0x20], Some(vec![0x30]))]);
		assert!(a.intersect(&b).is_empty());
	}

	#[test]
	fn type_filter() {
		let ranges = KeyRanges::for_type(10);
		assert!(ranges.contains(&[0x0a, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]));
		assert!(!ranges.contains(&[0x0b, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]));
	}
}
