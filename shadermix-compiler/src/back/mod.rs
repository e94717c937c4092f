//! Text back ends for linked shaders.
//!
//! Bytecode generation belongs to the graphics runtime. The writers here render a linked
//! [`Shader`] as source text for inspection and for handing to an external compiler.

pub mod hlsl;
pub mod targets;

use crate::ast::Shader;
use crate::back::targets::OutputTarget;

/// Renders a linked shader for one output target.
pub trait WriteShader<T: OutputTarget> {
    fn write(&self, shader: &Shader) -> Result<T::Output, std::fmt::Error>;
}
