//! Common types shared across the shadermix crates.
//!
//! This crate is re-exported by the `shadermix` umbrella crate and is not meant to be
//! depended upon directly.

mod hash;
/// Fast hashing collections.
pub mod map;
mod stage;

pub use hash::SourceHash;
pub use stage::{ShaderStage, UnknownShaderStage};

use std::fmt::{Display, Formatter};

/// A preprocessor macro definition passed alongside a shader source.
///
/// The order of macros is significant: two macro sets with the same definitions in a different
/// order are distinct cache keys.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderMacro {
    /// The macro identifier.
    pub name: String,
    /// The replacement text of the macro. May be empty.
    pub definition: String,
}

impl ShaderMacro {
    pub fn new(name: impl Into<String>, definition: impl ToString) -> Self {
        ShaderMacro {
            name: name.into(),
            definition: definition.to_string(),
        }
    }
}

impl Display for ShaderMacro {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.definition.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}={}", self.name, self.definition)
        }
    }
}
