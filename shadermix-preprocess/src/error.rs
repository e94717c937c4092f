use std::path::PathBuf;
use thiserror::Error;

/// Error type for source lookup and preprocessing.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// No lookup directory, URL mapping or virtual source provides the shader.
    #[error("shader `{0}` was not found in any lookup directory")]
    ShaderNotFound(String),
    #[error("the file was not found during resolution")]
    IOError(PathBuf, std::io::Error),
    #[error("unexpected end of line")]
    UnexpectedEol(usize),
    #[error("include depth exceeded the maximum of {0}")]
    IncludeDepthExceeded(usize),
    /// An `#else`, `#elif` or `#endif` without a matching `#if`.
    #[error("unexpected `#{directive}` on line {line}")]
    UnexpectedDirective { line: usize, directive: String },
    #[error("conditional opened on line {0} was never closed")]
    UnterminatedConditional(usize),
    #[error("malformed directive on line {line}: {text}")]
    MalformedDirective { line: usize, text: String },
    #[error("#error on line {line}: {message}")]
    ErrorDirective { line: usize, message: String },
}
