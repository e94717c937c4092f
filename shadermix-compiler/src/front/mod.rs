use crate::ast::{Expr, ShaderClass};
use crate::result::Log;

/// The parser for `.mxsl` mixin sources.
pub mod mixin;

pub use mixin::MixinParser;

/// The classes parsed from one source and any diagnostics produced while parsing.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub classes: Vec<ShaderClass>,
    pub log: Log,
}

/// Parses preprocessed shader text into classes.
///
/// The engine only depends on this trait, so a different shader language front end can be
/// plugged in with [`MixinEngine::with_parser`](crate::engine::MixinEngine::with_parser).
pub trait ShaderParser: Send + Sync {
    /// Parse a preprocessed source. `#line` markers in the source map positions back to the
    /// original files; positions before the first marker are attributed to `file_name`.
    fn parse(&self, source: &str, file_name: &str) -> ParseOutput;

    /// Parse a standalone expression, such as a generic argument.
    fn parse_expression(&self, text: &str) -> Option<Expr>;
}
