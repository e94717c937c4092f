//! Shader source lookup and preprocessing for shadermix.
//!
//! A [`ShaderSourceManager`] finds the source text of a shader class by name. [`preprocess`]
//! then inlines `#include` files and evaluates conditional and macro directives, producing the
//! text handed to the parser. `#line` markers are kept in the output so that the parser can map
//! positions back to the original files.
mod directive;
mod error;
mod include;
mod source;

pub use error::*;
pub use source::*;

use shadermix_common::ShaderMacro;
use std::path::PathBuf;

/// Expand includes and directives of a loaded shader source.
pub fn preprocess(
    file: &ShaderSourceFile,
    lookup_directories: &[PathBuf],
    macros: &[ShaderMacro],
) -> Result<String, PreprocessError> {
    preprocess_str(
        &file.source,
        &file.file_name(),
        file.path.as_deref(),
        lookup_directories,
        macros,
    )
}

/// Expand includes and directives of source text that did not come from a source manager.
pub fn preprocess_str(
    source: &str,
    file_name: &str,
    path: Option<&std::path::Path>,
    lookup_directories: &[PathBuf],
    macros: &[ShaderMacro],
) -> Result<String, PreprocessError> {
    let expanded = include::expand_includes(source, file_name, path, lookup_directories)?;
    directive::run_directives(&expanded, macros)
}
