//! Shader mixin parsing, composition and linking for shadermix.
//!
//! A request names a tree of shader classes ([`ShaderSource`](source::ShaderSource)). The
//! [`MixinEngine`](engine::MixinEngine) loads every class the tree reaches, checks them,
//! instantiates the composition tree, merges it into one shader and reflects the parameters an
//! effect runtime has to bind.
//!
//! ```no_run
//! use shadermix_compiler::engine::MixinEngine;
//! use shadermix_compiler::options::EngineOptions;
//! use shadermix_compiler::source::ShaderSource;
//! use shadermix_preprocess::ShaderSourceManager;
//! use std::str::FromStr;
//!
//! let engine = MixinEngine::new(
//!     ShaderSourceManager::with_lookup_directories(["shaders"]),
//!     EngineOptions::default(),
//! );
//! let source = ShaderSource::from_str("Material(light=PointLight)").unwrap();
//! let result = engine.parse(&source, &[]);
//! if result.has_errors() {
//!     eprintln!("{}", result.log);
//! }
//! ```

pub mod analysis;
pub mod ast;
pub mod back;
pub mod engine;
/// Error types.
pub mod error;
/// Shader front end parsers.
pub mod front;
pub mod library;
pub mod mix;
/// Engine options.
pub mod options;
pub mod reflect;
/// Diagnostics and compile results.
pub mod result;
/// Request source trees.
pub mod source;

#[cfg(test)]
mod testing;
