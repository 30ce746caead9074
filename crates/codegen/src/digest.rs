use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 of rendered source bytes, lowercase hex.
///
/// Depends on nothing but the bytes, so identical renderings always collide
/// onto one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(String);

impl ContentDigest {
	/// Hex length of a digest.
	pub const LEN: usize = 64;

	pub fn of(bytes: impl AsRef<[u8]>) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(bytes.as_ref());
		Self(hex::encode(hasher.finalize()))
	}

	/// Accepts a previously formatted digest, e.g. a cache directory name.
	pub fn parse(text: &str) -> Option<Self> {
		let valid = text.len() == Self::LEN && text.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
		valid.then(|| Self(text.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Abbreviated form for log lines.
	pub fn short(&self) -> &str {
		&self.0[..12]
	}
}

impl fmt::Display for ContentDigest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for ContentDigest {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_known_vector() {
		assert_eq!(
			ContentDigest::of("abc").as_str(),
			"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}

	#[test]
	fn test_parse_roundtrips_only_valid_digests() {
		let digest = ContentDigest::of("kiln");
		assert_eq!(ContentDigest::parse(digest.as_str()), Some(digest.clone()));
		assert_eq!(digest.short().len(), 12);
		assert!(ContentDigest::parse("xyz").is_none());
		assert!(ContentDigest::parse(&digest.as_str().to_uppercase()).is_none());
	}
}
