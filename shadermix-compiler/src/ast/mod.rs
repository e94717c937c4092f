//! The mixin shader syntax tree.
//!
//! Declarations of a shader class live in a [`DeclArena`] and are addressed by [`DeclId`].
//! Constant buffers refer to their members by id, so a declaration has exactly one owner and a
//! whole class can be shared behind an `Arc` once parsed.

/// Clone contexts for module instances.
pub mod clone;
mod module;
/// Mutable syntax tree traversal.
pub mod visit;

pub use module::*;

use bitflags::bitflags;
use shadermix_common::ShaderStage;
use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut};
use std::sync::Arc;

/// A position in an original (not preprocessed) source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceSpan {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourceSpan {
    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        SourceSpan {
            file: file.into(),
            line,
            column,
        }
    }

    /// A span for nodes synthesized by the compiler.
    pub fn synthesized() -> Self {
        SourceSpan::new("<generated>", 0, 0)
    }
}

impl Display for SourceSpan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({},{})", self.file, self.line, self.column)
    }
}

/// The index of a declaration within its [`DeclArena`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Storage and mixin qualifiers of a declaration or parameter.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct Qualifiers: u16 {
        const STAGE = 1 << 0;
        const STREAM = 1 << 1;
        const COMPOSE = 1 << 2;
        const STATIC = 1 << 3;
        const CONST = 1 << 4;
        const GROUPSHARED = 1 << 5;
        const OVERRIDE = 1 << 6;
        const ABSTRACT = 1 << 7;
        const CLONE = 1 << 8;
        const IN = 1 << 9;
        const OUT = 1 << 10;
        const INOUT = Self::IN.bits() | Self::OUT.bits();

        /// Qualifiers that only have meaning before mixing.
        const MIXIN = Self::STAGE.bits()
            | Self::STREAM.bits()
            | Self::COMPOSE.bits()
            | Self::OVERRIDE.bits()
            | Self::ABSTRACT.bits()
            | Self::CLONE.bits();

        /// Qualifiers that exclude a variable from reflection.
        const UNLINKED = Self::STATIC.bits() | Self::CONST.bits() | Self::GROUPSHARED.bits();
    }
}

impl Qualifiers {
    const KEYWORDS: [(&'static str, Qualifiers); 12] = [
        ("stage", Qualifiers::STAGE),
        ("stream", Qualifiers::STREAM),
        ("compose", Qualifiers::COMPOSE),
        ("static", Qualifiers::STATIC),
        ("const", Qualifiers::CONST),
        ("groupshared", Qualifiers::GROUPSHARED),
        ("override", Qualifiers::OVERRIDE),
        ("abstract", Qualifiers::ABSTRACT),
        ("clone", Qualifiers::CLONE),
        ("inout", Qualifiers::INOUT),
        ("in", Qualifiers::IN),
        ("out", Qualifiers::OUT),
    ];

    pub fn from_keyword(keyword: &str) -> Option<Qualifiers> {
        Self::KEYWORDS
            .iter()
            .find(|(k, _)| *k == keyword)
            .map(|(_, q)| *q)
    }

    /// The source keywords of these qualifiers, in canonical order.
    pub fn keywords(self) -> impl Iterator<Item = &'static str> {
        let mut remaining = self;
        Self::KEYWORDS.iter().filter_map(move |(keyword, q)| {
            if remaining.contains(*q) {
                remaining.remove(*q);
                Some(*keyword)
            } else {
                None
            }
        })
    }
}

/// An attribute such as `[Link("Material.Color")]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<Expr>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Attribute {
            name: name.into(),
            args,
        }
    }

    /// The string literal argument at `index`, if there is one.
    pub fn string_arg(&self, index: usize) -> Option<&str> {
        match self.args.get(index).map(|e| &e.kind) {
            Some(ExprKind::Literal(Literal::String(s))) => Some(s),
            _ => None,
        }
    }
}

/// The dimension of an array type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayDim {
    /// `T name[]`, sized by whatever is composed or initialized into it.
    Unsized,
    Sized(Expr),
}

/// A reference to a type by name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: String,
    /// Template arguments such as the `float4` of `Texture2D<float4>`, as source text.
    pub template: Vec<String>,
    pub array: Option<ArrayDim>,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            template: Vec::new(),
            array: None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.name == "void" && self.array.is_none()
    }

    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    /// The length of a sized array type whose size is a constant integer expression.
    pub fn array_len(&self) -> Option<u32> {
        match &self.array {
            Some(ArrayDim::Sized(size)) => u32::try_from(size.const_int()?).ok(),
            _ => None,
        }
    }

    /// The element type of an array type, or a copy of this type.
    pub fn element(&self) -> TypeRef {
        TypeRef {
            name: self.name.clone(),
            template: self.template.clone(),
            array: None,
        }
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if !self.template.is_empty() {
            write!(f, "<{}>", self.template.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Member {
        target: Box<Expr>,
        member: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value`, or a compound assignment when `op` is set.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// An initializer list `{ a, b, c }`.
    List(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

impl Expr {
    pub fn new(kind: ExprKind, span: SourceSpan) -> Self {
        Expr { kind, span }
    }

    pub fn ident(name: impl Into<String>, span: SourceSpan) -> Self {
        Expr::new(ExprKind::Ident(name.into()), span)
    }

    pub fn string(value: impl Into<String>, span: SourceSpan) -> Self {
        Expr::new(ExprKind::Literal(Literal::String(value.into())), span)
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Fold an integer constant expression. Overflow and division by zero give `None`.
    pub fn const_int(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Literal(Literal::Int(n)) => Some(*n),
            ExprKind::Unary { op, operand } => {
                let value = operand.const_int()?;
                match op {
                    UnaryOp::Neg => value.checked_neg(),
                    UnaryOp::Plus => Some(value),
                    UnaryOp::BitNot => Some(!value),
                    _ => None,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = (lhs.const_int()?, rhs.const_int()?);
                match op {
                    BinaryOp::Add => lhs.checked_add(rhs),
                    BinaryOp::Sub => lhs.checked_sub(rhs),
                    BinaryOp::Mul => lhs.checked_mul(rhs),
                    BinaryOp::Div => lhs.checked_div(rhs),
                    BinaryOp::Rem => lhs.checked_rem(rhs),
                    BinaryOp::Shl => lhs.checked_shl(u32::try_from(rhs).ok()?),
                    BinaryOp::Shr => lhs.checked_shr(u32::try_from(rhs).ok()?),
                    BinaryOp::BitAnd => Some(lhs & rhs),
                    BinaryOp::BitOr => Some(lhs | rhs),
                    BinaryOp::BitXor => Some(lhs ^ rhs),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    Declare {
        qualifiers: Qualifiers,
        ty: TypeRef,
        name: String,
        initializer: Option<Expr>,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    /// `foreach (var item in collection)` over an array composition.
    ForEach {
        variable: String,
        collection: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Discard,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub attributes: Vec<Attribute>,
    pub span: SourceSpan,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: SourceSpan) -> Self {
        Stmt {
            kind,
            attributes: Vec::new(),
            span,
        }
    }
}

/// A method parameter or struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub qualifiers: Qualifiers,
    pub semantic: Option<String>,
    pub default: Option<Expr>,
    pub span: SourceSpan,
}

/// One `Key = Value;` item of a sampler state block.
#[derive(Debug, Clone, PartialEq)]
pub struct StateField {
    pub key: String,
    pub value: Expr,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Expr(Expr),
    /// A sampler state block `{ Filter = ...; AddressU = ...; }`.
    State(Vec<StateField>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConstantBufferKind {
    /// `cbuffer`
    Constant,
    /// `rgroup`, a group of resources and values bound together.
    ResourceGroup,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Variable {
        ty: TypeRef,
        semantic: Option<String>,
        initializer: Option<Initializer>,
    },
    Method {
        return_type: TypeRef,
        params: Vec<Param>,
        semantic: Option<String>,
        body: Option<Vec<Stmt>>,
    },
    ConstantBuffer {
        kind: ConstantBufferKind,
        members: Vec<DeclId>,
    },
    Struct {
        fields: Vec<Param>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: String,
    pub span: SourceSpan,
    pub attributes: Vec<Attribute>,
    pub qualifiers: Qualifiers,
    /// The pipeline stage this method is the entry point of.
    pub entry_point: Option<ShaderStage>,
    pub kind: DeclKind,
}

impl Decl {
    pub fn new(name: impl Into<String>, kind: DeclKind, span: SourceSpan) -> Self {
        Decl {
            name: name.into(),
            span,
            attributes: Vec::new(),
            qualifiers: Qualifiers::empty(),
            entry_point: None,
            kind,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, DeclKind::Method { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, DeclKind::Variable { .. })
    }

    pub fn is_stage(&self) -> bool {
        self.qualifiers.contains(Qualifiers::STAGE)
    }

    pub fn is_composition(&self) -> bool {
        self.is_variable() && self.qualifiers.contains(Qualifiers::COMPOSE)
    }

    pub fn is_stream(&self) -> bool {
        self.is_variable() && self.qualifiers.contains(Qualifiers::STREAM)
    }

    /// The declared type of a variable.
    pub fn variable_type(&self) -> Option<&TypeRef> {
        match &self.kind {
            DeclKind::Variable { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// The number of arguments a call to this method accepts, as `(required, total)`.
    pub fn arity(&self) -> Option<(usize, usize)> {
        match &self.kind {
            DeclKind::Method { params, .. } => Some((
                params.iter().filter(|p| p.default.is_none()).count(),
                params.len(),
            )),
            _ => None,
        }
    }
}

/// Storage for the declarations of one class or merged shader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclArena {
    decls: Vec<Decl>,
}

impl DeclArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        id
    }

    pub fn get(&self, id: DeclId) -> Option<&Decl> {
        self.decls.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (DeclId(i as u32), d))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Decl> {
        self.decls.iter_mut()
    }
}

impl Index<DeclId> for DeclArena {
    type Output = Decl;

    fn index(&self, index: DeclId) -> &Self::Output {
        &self.decls[index.index()]
    }
}

impl IndexMut<DeclId> for DeclArena {
    fn index_mut(&mut self, index: DeclId) -> &mut Self::Output {
        &mut self.decls[index.index()]
    }
}

/// A generic parameter of a class, such as `float Scale` in `shader Blur<float Scale>`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub ty: TypeRef,
    pub name: String,
}

/// A base class reference in a class header.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseClass {
    pub name: String,
    pub generic_arguments: Vec<String>,
    pub span: SourceSpan,
}

/// A parsed shader class.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderClass {
    pub name: String,
    pub span: SourceSpan,
    pub generics: Vec<GenericParam>,
    pub bases: Vec<BaseClass>,
    pub arena: DeclArena,
    /// Top level members in declaration order. Constant buffer members are reached through
    /// their buffer.
    pub members: Vec<DeclId>,
}

impl ShaderClass {
    pub fn new(name: impl Into<String>, span: SourceSpan) -> Self {
        ShaderClass {
            name: name.into(),
            span,
            generics: Vec::new(),
            bases: Vec::new(),
            arena: DeclArena::new(),
            members: Vec::new(),
        }
    }

    /// Iterate every variable of the class, including constant buffer members.
    pub fn variables(&self) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.arena.iter().filter(|(_, d)| d.is_variable())
    }

    pub fn methods(&self) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.members
            .iter()
            .map(|id| (*id, &self.arena[*id]))
            .filter(|(_, d)| d.is_method())
    }

    /// Find a variable by name, including constant buffer members.
    pub fn find_variable(&self, name: &str) -> Option<DeclId> {
        self.variables()
            .find(|(_, d)| d.name == name)
            .map(|(id, _)| id)
    }

    /// Whether every member of the class is stage qualified.
    ///
    /// An empty class is not stage only.
    pub fn is_stage_only(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|id| self.arena[*id].is_stage())
    }
}

/// The merged output of mixing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shader {
    pub arena: DeclArena,
    pub declarations: Vec<DeclId>,
}

impl Shader {
    /// Iterate the top level declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.declarations.iter().map(|id| (*id, &self.arena[*id]))
    }

    /// Find a top level declaration by name.
    pub fn find(&self, name: &str) -> Option<&Decl> {
        self.iter().map(|(_, d)| d).find(|d| d.name == name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Decl> {
        self.iter().map(|(_, d)| d).filter(|d| d.is_method())
    }
}

#[cfg(test)]
mod test {
    use crate::ast::Qualifiers;
    use crate::front::{MixinParser, ShaderParser};

    #[test]
    fn qualifier_keywords() {
        assert_eq!(Some(Qualifiers::INOUT), Qualifiers::from_keyword("inout"));
        let q = Qualifiers::STAGE | Qualifiers::STATIC;
        assert_eq!(vec!["stage", "static"], q.keywords().collect::<Vec<_>>());
        assert_eq!(vec!["inout"], Qualifiers::INOUT.keywords().collect::<Vec<_>>());
        assert!(Qualifiers::MIXIN.contains(Qualifiers::CLONE));
        assert!(!Qualifiers::MIXIN.contains(Qualifiers::STATIC));
    }

    #[test]
    fn array_sizes_are_folded() {
        let array = |text: &str| {
            let source = format!("shader S {{ float W[{text}]; }};");
            let output = MixinParser.parse(&source, "S.mxsl");
            assert!(output.log.is_empty(), "{}", output.log);
            let class = &output.classes[0];
            class.arena[class.members[0]]
                .variable_type()
                .unwrap()
                .array_len()
        };
        assert_eq!(Some(4), array("4"));
        assert_eq!(Some(4), array("2 * 2"));
        assert_eq!(Some(6), array("(1 << 3) - 2"));
        assert_eq!(None, array("4 / 0"));
        assert_eq!(None, array("-1"));
        assert_eq!(None, array("Count"));
        assert_eq!(None, array("9223372036854775807 * 2"));
    }
}
