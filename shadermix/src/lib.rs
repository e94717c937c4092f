#![forbid(missing_docs)]
//! Composable shader mixins, merged and reflected for effect runtimes.
//!
//! shadermix compiles effects written as trees of small shader classes. Classes inherit from
//! each other, override methods, and declare `compose` variables that other classes are
//! plugged into when a request is compiled. The result is one flat shader with its entry
//! points and a reflection of every parameter an effect runtime has to bind.
//!
//! ## Usage
//! The core object is the [`MixinEngine`](crate::engine::MixinEngine). It owns the class
//! cache, so one engine should be shared (it is `Send + Sync`) by everything compiling effects
//! from the same sources.
//!
//! ```no_run
//! use shadermix::engine::{EngineOptions, MixinEngine};
//! use shadermix::preprocess::ShaderSourceManager;
//! use shadermix::ShaderSource;
//! use std::str::FromStr;
//!
//! let engine = MixinEngine::new(
//!     ShaderSourceManager::with_lookup_directories(["shaders"]),
//!     EngineOptions::default(),
//! );
//! let source = ShaderSource::from_str("Shading(light=PointLight)").unwrap();
//! let result = engine.parse(&source, &[]);
//! for message in result.log.messages() {
//!     eprintln!("{message}");
//! }
//! ```
//!
//! ## Hot reload
//! After a source file changes, evict it with
//! [`MixinEngine::delete_obsolete_cache`](crate::engine::MixinEngine::delete_obsolete_cache).
//! The `hash_sources` of a result tell which source revisions it was compiled from.

#[cfg(feature = "preprocess")]
/// Lookup and preprocessing of shader source files.
///
/// Sources must be registered with a [`ShaderSourceManager`](preprocess::ShaderSourceManager)
/// before an engine can load them, either as lookup directories or as in-memory sources.
pub mod preprocess {
    pub use shadermix_preprocess::*;
}

/// The compile engine and its results.
pub mod engine {
    pub use shadermix_compiler::engine::MixinEngine;
    pub use shadermix_compiler::error::ShaderMixinError;
    pub use shadermix_compiler::options::EngineOptions;
    pub use shadermix_compiler::result::{
        Diagnostic, DiagnosticLevel, Log, MessageKind, ParsingResult,
    };
}

/// The mixin syntax tree and front end.
pub mod ast {
    pub use shadermix_compiler::ast::*;
    pub use shadermix_compiler::front::{MixinParser, ParseOutput, ShaderParser};
}

#[cfg(feature = "reflect")]
/// Parameter reflection of linked shaders.
pub mod reflect {
    pub use shadermix_compiler::reflect::*;
}

#[cfg(feature = "back")]
/// Text output of linked shaders.
pub mod back {
    /// Supported output targets.
    pub mod targets {
        pub use shadermix_compiler::back::targets::*;
    }

    pub use shadermix_compiler::back::hlsl::HlslWriter;
    pub use shadermix_compiler::back::WriteShader;
}

pub use shadermix_common::{ShaderMacro, ShaderStage, SourceHash};
pub use shadermix_compiler::source::{
    ShaderArraySource, ShaderClassSource, ShaderMixinSource, ShaderSource,
};
