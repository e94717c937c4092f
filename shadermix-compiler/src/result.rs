use crate::ast::{Shader, SourceSpan};
use crate::reflect::EffectReflection;
use shadermix_common::{ShaderStage, SourceHash};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// The severity of a [`Diagnostic`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// The kinds of messages reported while compiling a mixin tree.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageKind {
    #[error("shader `{0}` could not be found")]
    ShaderNotFound(String),
    #[error("failed to preprocess `{name}`: {message}")]
    PreprocessFailed { name: String, message: String },
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("`{name}` must contain exactly one shader class, found {count}")]
    ShaderMustContainSingleClass { name: String, count: usize },
    #[error("file `{file}` declares class `{class}`")]
    FileNameNotMatchingClassName { file: String, class: String },
    #[error("`{class}` expects {expected} generic arguments but {actual} were given")]
    WrongGenericNumber {
        class: String,
        expected: usize,
        actual: usize,
    },
    #[error("`{class}` declares the generic parameter `{name}` more than once")]
    SameNameGenerics { class: String, name: String },
    #[error("`{0}` inherits from itself")]
    CyclicInheritance(String),
    #[error("a mixin source must name at least one class")]
    EmptyMixin,
    #[error("the root of a request must be a single class or mixin")]
    InvalidRootSource,

    #[error("`{class}.{method}` is marked override but no base class declares it")]
    OverrideWithoutBase { class: String, method: String },
    #[error("`{class}.{method}` hides a base method and must be marked override")]
    MissingOverride { class: String, method: String },
    #[error("`{member}` is declared more than once in the hierarchy of `{class}`")]
    DuplicateMember { class: String, member: String },

    #[error("unresolved identifier `{0}`")]
    UnresolvedIdentifier(String),
    #[error("`{name}` takes {expected} arguments but {actual} were given")]
    WrongArgumentCount {
        name: String,
        expected: String,
        actual: usize,
    },
    #[error("no base class implements `{0}`")]
    BaseMethodNotFound(String),
    #[error("`streams.{0}` is not a stream variable")]
    StreamMemberNotFound(String),
    #[error("composition `{composition}` has no member `{member}`")]
    UnknownCompositionMember { composition: String, member: String },
    #[error("foreach requires an array composition, `{0}` is not one")]
    InvalidForEach(String),
    #[error("`{0}` returns void but a value is returned")]
    ReturnValueInVoidMethod(String),
    #[error("`{0}` must return a value")]
    MissingReturnValue(String),

    #[error("`{class}` has no composition variable `{slot}`")]
    UnknownCompositionSlot { class: String, slot: String },
    #[error("composition `{0}` is filled more than once")]
    DuplicateComposition(String),

    #[error("composition `{variable}` expects `{expected}` but `{actual}` was composed")]
    CompositionTypeMismatch {
        variable: String,
        expected: String,
        actual: String,
    },
    #[error("composition `{0}` is used but nothing was composed into it")]
    MissingComposition(String),
    #[error("composition `{0}` is used with the wrong number of elements")]
    CompositionArrayMismatch(String),
    #[error("`{class}.{method}` is abstract and has no implementation")]
    MethodNotImplemented { class: String, method: String },
    #[error("stage member `{0}` is declared by more than one class")]
    DuplicateStageMember(String),

    #[error("`{0}` cannot be linked to a parameter")]
    LinkError(String),
    #[error("the Link attribute of `{0}` must have exactly one string argument")]
    LinkArgumentsError(String),
    #[error("struct `{0}` contains itself")]
    RecursiveStruct(String),
    #[error("the array size of `{0}` must be a constant integer")]
    ArraySizeNotConstant(String),
    #[error("`{0}` does not fit in its constant buffer or register space")]
    ParameterTooLarge(String),
    #[error("no entry point was found for the {0} stage")]
    MissingEntryPoint(ShaderStage),
    #[error("`{0}` calls itself")]
    RecursiveCall(String),
    #[error("stream inputs and outputs are not generated for the {0} stage")]
    StreamsNotGenerated(ShaderStage),
    #[error("sampler filter `{0}` is not supported")]
    SamplerFilterNotSupported(String),
    #[error("sampler state field `{0}` is not supported")]
    SamplerFieldNotSupported(String),
    #[error("sampler border color of `{0}` must be a float4 of literals")]
    SamplerBorderColorNotSupported(String),
}

/// One message of a [`Log`].
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub span: Option<SourceSpan>,
    pub kind: MessageKind,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(span) = &self.span {
            write!(f, "{span}: ")?;
        }
        let level = match self.level {
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
        };
        write!(f, "{level}: {}", self.kind)
    }
}

/// The diagnostics of a compile request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Log {
    messages: Vec<Diagnostic>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: DiagnosticLevel, kind: MessageKind, span: Option<SourceSpan>) {
        self.messages.push(Diagnostic { level, span, kind })
    }

    pub fn error(&mut self, kind: MessageKind, span: impl Into<Option<SourceSpan>>) {
        self.push(DiagnosticLevel::Error, kind, span.into())
    }

    pub fn warning(&mut self, kind: MessageKind, span: impl Into<Option<SourceSpan>>) {
        self.push(DiagnosticLevel::Warning, kind, span.into())
    }

    pub fn info(&mut self, kind: MessageKind, span: impl Into<Option<SourceSpan>>) {
        self.push(DiagnosticLevel::Info, kind, span.into())
    }

    /// Whether any message is an error. Errors stop the remaining phases of a request.
    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.level == DiagnosticLevel::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages
            .iter()
            .filter(|m| m.level == DiagnosticLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages
            .iter()
            .filter(|m| m.level == DiagnosticLevel::Warning)
    }

    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.messages.extend(other)
    }
}

impl IntoIterator for Log {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl Display for Log {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for message in &self.messages {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}

/// The outcome of one compile request.
///
/// `shader` and `reflection` are only set when every phase succeeded.
#[derive(Debug, Default)]
pub struct ParsingResult {
    pub log: Log,
    pub shader: Option<Shader>,
    pub reflection: Option<EffectReflection>,
    pub entry_points: BTreeMap<ShaderStage, String>,
    /// The hash of the raw source of every class that took part in the request, by class name.
    pub hash_sources: BTreeMap<String, SourceHash>,
}

impl ParsingResult {
    pub fn has_errors(&self) -> bool {
        self.log.has_errors()
    }
}
