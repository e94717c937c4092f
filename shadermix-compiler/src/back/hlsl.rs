use crate::ast::{
    ArrayDim, Attribute, BinaryOp, ConstantBufferKind, Decl, DeclKind, Expr, ExprKind,
    Initializer, Literal, Param, Shader, Stmt, StmtKind, TypeRef, UnaryOp,
};
use crate::back::targets::HLSL;
use crate::back::WriteShader;
use crate::reflect::{EffectReflection, EffectResourceBinding};
use std::fmt::Write;

/// Writes a linked shader as HLSL text.
///
/// Sampler state blocks are not written, their description is part of the
/// [`EffectReflection`]. When a reflection is attached, resources and constant buffers are
/// annotated with their `register` slots.
#[derive(Debug, Default, Clone, Copy)]
pub struct HlslWriter<'a> {
    reflection: Option<&'a EffectReflection>,
}

impl<'a> HlslWriter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotate declarations with the slots of `reflection`.
    pub fn with_reflection(reflection: &'a EffectReflection) -> Self {
        HlslWriter {
            reflection: Some(reflection),
        }
    }
}

impl WriteShader<HLSL> for HlslWriter<'_> {
    fn write(&self, shader: &Shader) -> Result<String, std::fmt::Error> {
        let mut printer = Printer {
            out: String::new(),
            indent: 0,
            reflection: self.reflection,
        };
        let mut previous: Option<&Decl> = None;
        for (_, decl) in shader.iter() {
            // Blank lines around anything with a body.
            if let Some(previous) = previous {
                if has_body(previous) || has_body(decl) {
                    printer.out.push('\n');
                }
            }
            printer.decl(shader, decl)?;
            previous = Some(decl);
        }
        Ok(printer.out)
    }
}

fn has_body(decl: &Decl) -> bool {
    !matches!(decl.kind, DeclKind::Variable { .. })
}

/// Binding strength of an expression, higher binds tighter.
fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } => 0,
        ExprKind::Ternary { .. } => 1,
        ExprKind::Binary { op, .. } => binary_precedence(*op),
        ExprKind::Unary {
            op: UnaryOp::PostInc | UnaryOp::PostDec,
            ..
        } => 13,
        ExprKind::Unary { .. } => 12,
        ExprKind::Member { .. } | ExprKind::Call { .. } | ExprKind::Index { .. } => 13,
        ExprKind::Literal(_) | ExprKind::Ident(_) | ExprKind::List(_) => 14,
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 2,
        BinaryOp::And => 3,
        BinaryOp::BitOr => 4,
        BinaryOp::BitXor => 5,
        BinaryOp::BitAnd => 6,
        BinaryOp::Eq | BinaryOp::Ne => 7,
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 8,
        BinaryOp::Shl | BinaryOp::Shr => 9,
        BinaryOp::Add | BinaryOp::Sub => 10,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 11,
    }
}

struct Printer<'a> {
    out: String,
    indent: usize,
    reflection: Option<&'a EffectReflection>,
}

impl Printer<'_> {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn binding(&self, name: &str) -> Option<&EffectResourceBinding> {
        self.reflection?
            .resource_bindings
            .iter()
            .find(|b| b.raw_name == name)
    }

    fn register(&mut self, name: &str) -> std::fmt::Result {
        if let Some(binding) = self.binding(name) {
            let (register, slot) = (binding.kind.register(), binding.slot);
            write!(self.out, " : register({register}{slot})")?;
        }
        Ok(())
    }

    fn attributes(&mut self, attributes: &[Attribute]) -> std::fmt::Result {
        for attribute in attributes {
            self.line_start();
            write!(self.out, "[{}", attribute.name)?;
            if !attribute.args.is_empty() {
                self.out.push('(');
                self.list(&attribute.args)?;
                self.out.push(')');
            }
            self.out.push_str("]\n");
        }
        Ok(())
    }

    fn ty(&mut self, ty: &TypeRef) -> std::fmt::Result {
        write!(self.out, "{ty}")
    }

    fn array(&mut self, ty: &TypeRef) -> std::fmt::Result {
        match &ty.array {
            None => Ok(()),
            Some(ArrayDim::Unsized) => {
                self.out.push_str("[]");
                Ok(())
            }
            Some(ArrayDim::Sized(len)) => {
                self.out.push('[');
                self.expr(len, 0)?;
                self.out.push(']');
                Ok(())
            }
        }
    }

    fn decl(&mut self, shader: &Shader, decl: &Decl) -> std::fmt::Result {
        match &decl.kind {
            DeclKind::Variable {
                ty,
                semantic,
                initializer,
            } => {
                self.attributes(&decl.attributes)?;
                self.line_start();
                for keyword in decl.qualifiers.keywords() {
                    write!(self.out, "{keyword} ")?;
                }
                self.ty(ty)?;
                write!(self.out, " {}", decl.name)?;
                self.array(ty)?;
                if let Some(semantic) = semantic {
                    write!(self.out, " : {semantic}")?;
                }
                self.register(&decl.name)?;
                if let Some(Initializer::Expr(value)) = initializer {
                    self.out.push_str(" = ");
                    self.expr(value, 0)?;
                }
                self.out.push_str(";\n");
            }
            DeclKind::Method {
                return_type,
                params,
                semantic,
                body,
            } => {
                if let Some(stage) = decl.entry_point {
                    self.line_start();
                    writeln!(self.out, "// {stage} entry point")?;
                }
                self.attributes(&decl.attributes)?;
                self.line_start();
                for keyword in decl.qualifiers.keywords() {
                    write!(self.out, "{keyword} ")?;
                }
                self.ty(return_type)?;
                write!(self.out, " {}(", decl.name)?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        self.out.push_str(", ");
                    }
                    self.param(param)?;
                }
                self.out.push(')');
                if let Some(semantic) = semantic {
                    write!(self.out, " : {semantic}")?;
                }
                match body {
                    Some(body) => {
                        self.out.push('\n');
                        self.block(body)?;
                    }
                    None => self.out.push_str(";\n"),
                }
            }
            DeclKind::ConstantBuffer { kind, members } => {
                let members: Vec<&Decl> = members.iter().map(|id| &shader.arena[*id]).collect();
                // Resources of a resource group are bound on their own.
                let (resources, values): (Vec<&Decl>, Vec<&Decl>) =
                    members.into_iter().partition(|member| {
                        *kind == ConstantBufferKind::ResourceGroup
                            && self.binding(&member.name).is_some()
                    });
                for resource in resources {
                    self.decl(shader, resource)?;
                }
                self.attributes(&decl.attributes)?;
                self.line_start();
                write!(self.out, "cbuffer {}", decl.name)?;
                self.register(&decl.name)?;
                self.out.push('\n');
                self.line_start();
                self.out.push_str("{\n");
                self.indent += 1;
                for value in values {
                    self.decl(shader, value)?;
                }
                self.indent -= 1;
                self.line_start();
                self.out.push_str("};\n");
            }
            DeclKind::Struct { fields } => {
                self.line_start();
                writeln!(self.out, "struct {}", decl.name)?;
                self.line_start();
                self.out.push_str("{\n");
                self.indent += 1;
                for field in fields {
                    self.line_start();
                    self.param(field)?;
                    self.out.push_str(";\n");
                }
                self.indent -= 1;
                self.line_start();
                self.out.push_str("};\n");
            }
        }
        Ok(())
    }

    fn param(&mut self, param: &Param) -> std::fmt::Result {
        for keyword in param.qualifiers.keywords() {
            write!(self.out, "{keyword} ")?;
        }
        self.ty(&param.ty)?;
        write!(self.out, " {}", param.name)?;
        self.array(&param.ty)?;
        if let Some(semantic) = &param.semantic {
            write!(self.out, " : {semantic}")?;
        }
        if let Some(default) = &param.default {
            self.out.push_str(" = ");
            self.expr(default, 0)?;
        }
        Ok(())
    }

    fn block(&mut self, body: &[Stmt]) -> std::fmt::Result {
        self.line_start();
        self.out.push_str("{\n");
        self.indent += 1;
        for stmt in body {
            self.stmt(stmt)?;
        }
        self.indent -= 1;
        self.line_start();
        self.out.push_str("}\n");
        Ok(())
    }

    /// A nested statement, indented unless it is a block.
    fn body(&mut self, stmt: &Stmt) -> std::fmt::Result {
        if let StmtKind::Block(_) = stmt.kind {
            self.stmt(stmt)
        } else {
            self.indent += 1;
            self.stmt(stmt)?;
            self.indent -= 1;
            Ok(())
        }
    }

    /// A statement that can appear in a `for` header, without its semicolon.
    fn simple_stmt(&mut self, stmt: &Stmt) -> std::fmt::Result {
        match &stmt.kind {
            StmtKind::Declare {
                qualifiers,
                ty,
                name,
                initializer,
            } => {
                for keyword in qualifiers.keywords() {
                    write!(self.out, "{keyword} ")?;
                }
                self.ty(ty)?;
                write!(self.out, " {name}")?;
                self.array(ty)?;
                if let Some(value) = initializer {
                    self.out.push_str(" = ");
                    self.expr(value, 0)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => self.expr(expr, 0),
            _ => Ok(()),
        }
    }

    fn stmt(&mut self, stmt: &Stmt) -> std::fmt::Result {
        self.attributes(&stmt.attributes)?;
        match &stmt.kind {
            StmtKind::Block(body) => return self.block(body),
            StmtKind::Declare { .. } | StmtKind::Expr(_) => {
                self.line_start();
                self.simple_stmt(stmt)?;
                self.out.push_str(";\n");
            }
            StmtKind::Return(value) => {
                self.line_start();
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(value, 0)?;
                }
                self.out.push_str(";\n");
            }
            StmtKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.line_start();
                self.out.push_str("if (");
                self.expr(condition, 0)?;
                self.out.push_str(")\n");
                self.body(then)?;
                if let Some(otherwise) = otherwise {
                    self.line_start();
                    self.out.push_str("else\n");
                    self.body(otherwise)?;
                }
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => {
                self.line_start();
                self.out.push_str("for (");
                if let Some(init) = init {
                    self.simple_stmt(init)?;
                }
                self.out.push_str("; ");
                if let Some(condition) = condition {
                    self.expr(condition, 0)?;
                }
                self.out.push_str("; ");
                if let Some(step) = step {
                    self.expr(step, 0)?;
                }
                self.out.push_str(")\n");
                self.body(body)?;
            }
            StmtKind::While { condition, body } => {
                self.line_start();
                self.out.push_str("while (");
                self.expr(condition, 0)?;
                self.out.push_str(")\n");
                self.body(body)?;
            }
            StmtKind::ForEach {
                variable,
                collection,
                body,
            } => {
                self.line_start();
                write!(self.out, "foreach (var {variable} in ")?;
                self.expr(collection, 0)?;
                self.out.push_str(")\n");
                self.body(body)?;
            }
            StmtKind::Break => self.keyword_stmt("break"),
            StmtKind::Continue => self.keyword_stmt("continue"),
            StmtKind::Discard => self.keyword_stmt("discard"),
            StmtKind::Empty => self.keyword_stmt(""),
        }
        Ok(())
    }

    fn keyword_stmt(&mut self, keyword: &str) {
        self.line_start();
        self.out.push_str(keyword);
        self.out.push_str(";\n");
    }

    fn list(&mut self, exprs: &[Expr]) -> std::fmt::Result {
        for (index, expr) in exprs.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.expr(expr, 0)?;
        }
        Ok(())
    }

    /// Write `expr`, parenthesized when it binds looser than `min`.
    fn expr(&mut self, expr: &Expr, min: u8) -> std::fmt::Result {
        let own = precedence(expr);
        if own < min {
            self.out.push('(');
        }
        match &expr.kind {
            ExprKind::Literal(literal) => match literal {
                Literal::Bool(value) => write!(self.out, "{value}")?,
                Literal::Int(value) => write!(self.out, "{value}")?,
                Literal::Float(value) => write!(self.out, "{value:?}")?,
                Literal::String(value) => write!(self.out, "{value:?}")?,
            },
            ExprKind::Ident(name) => self.out.push_str(name),
            ExprKind::Member { target, member } => {
                self.expr(target, 13)?;
                write!(self.out, ".{member}")?;
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee, 13)?;
                self.out.push('(');
                self.list(args)?;
                self.out.push(')');
            }
            ExprKind::Index { target, index } => {
                self.expr(target, 13)?;
                self.out.push('[');
                self.expr(index, 0)?;
                self.out.push(']');
            }
            ExprKind::Unary { op, operand } => {
                let (prefix, postfix) = match op {
                    UnaryOp::Neg => ("-", ""),
                    UnaryOp::Plus => ("+", ""),
                    UnaryOp::Not => ("!", ""),
                    UnaryOp::BitNot => ("~", ""),
                    UnaryOp::PreInc => ("++", ""),
                    UnaryOp::PreDec => ("--", ""),
                    UnaryOp::PostInc => ("", "++"),
                    UnaryOp::PostDec => ("", "--"),
                };
                self.out.push_str(prefix);
                self.expr(operand, own)?;
                self.out.push_str(postfix);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs, own)?;
                write!(self.out, " {} ", op.as_str())?;
                self.expr(rhs, own + 1)?;
            }
            ExprKind::Assign { op, target, value } => {
                self.expr(target, 13)?;
                match op {
                    Some(op) => write!(self.out, " {}= ", op.as_str())?,
                    None => self.out.push_str(" = "),
                }
                self.expr(value, 0)?;
            }
            ExprKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                self.expr(condition, 2)?;
                self.out.push_str(" ? ");
                self.expr(then, 0)?;
                self.out.push_str(" : ");
                self.expr(otherwise, 1)?;
            }
            ExprKind::List(values) => {
                self.out.push_str("{ ");
                self.list(values)?;
                self.out.push_str(" }");
            }
        }
        if own < min {
            self.out.push(')');
        }
        Ok(())
    }
}
