use crate::result::Log;
use shadermix_preprocess::PreprocessError;
use thiserror::Error;

/// Error type for engine setup and malformed inputs.
///
/// Problems in shader code are reported as diagnostics in a [`Log`] instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ShaderMixinError {
    /// A builtin source failed to preprocess.
    #[error("failed to preprocess builtin source")]
    BuiltinPreprocessError(#[from] PreprocessError),
    /// A builtin source did not parse.
    #[error("invalid builtin source:\n{0}")]
    InvalidBuiltin(Log),
    /// A builtin source declared no class.
    #[error("builtin source does not declare a shader class")]
    EmptyBuiltin,
    /// A source tree string could not be parsed.
    #[error("malformed shader source `{source_text}` at offset {offset}")]
    MalformedSource { source_text: String, offset: usize },
}
