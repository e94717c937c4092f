use std::fmt::{Debug, Display, Formatter};

/// A content hash of shader source text.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceHash([u8; 32]);

impl SourceHash {
    /// The hash of a source that has no backing text.
    pub const EMPTY: SourceHash = SourceHash([0; 32]);

    /// Hash the given bytes.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        SourceHash(*blake3::hash(bytes.as_ref()).as_bytes())
    }

    /// Hash a sequence of byte slices as one stream.
    pub fn of_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        SourceHash(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The first `len` hex digits of the hash.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_string();
        hex.truncate(len);
        hex
    }
}

impl Display for SourceHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Debug for SourceHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceHash({})", self.short(16))
    }
}
