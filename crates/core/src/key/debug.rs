/// Helpers for rendering keys in a human-readable way for tracing output.
pub trait Sprintable {
	/// Render as a printable string.
	fn sprint(&self) -> String;
}

impl Sprintable for &[u8] {
	fn sprint(&self) -> String {
		self.iter()
			.map(|b| {
				if b.is_ascii_alphanumeric() {
					(*b as char).to_string()
				} else {
					format!("\\x{b:02x}")
				}
			})
			.collect()
	}
}

impl Sprintable for Vec<u8> {
	fn sprint(&self) -> String {
		self.as_slice().sprint()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sprint() {
		assert_eq!(vec![b'a', 0x00, b'9'].sprint(), "a\\x009");
	}
}
