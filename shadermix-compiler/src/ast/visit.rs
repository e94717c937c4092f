use crate::ast::{ArrayDim, Decl, DeclKind, Expr, ExprKind, Initializer, Param, Stmt, StmtKind, TypeRef};

/// A mutable traversal over expressions, statements and types.
///
/// Each method defaults to walking the children of the node, so implementations only override
/// the nodes they rewrite and call the matching `walk_*` function to continue descending.
pub trait VisitMut {
    fn visit_expr(&mut self, expr: &mut Expr) {
        walk_expr(self, expr)
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        walk_stmt(self, stmt)
    }

    fn visit_type(&mut self, ty: &mut TypeRef) {
        walk_type(self, ty)
    }

    fn visit_semantic(&mut self, _semantic: &mut String) {}
}

pub fn walk_expr<V: VisitMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Literal(_) | ExprKind::Ident(_) => {}
        ExprKind::Member { target, .. } => visitor.visit_expr(target),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr(callee);
            args.iter_mut().for_each(|a| visitor.visit_expr(a));
        }
        ExprKind::Index { target, index } => {
            visitor.visit_expr(target);
            visitor.visit_expr(index);
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        ExprKind::Assign { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        ExprKind::Ternary {
            condition,
            then,
            otherwise,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_expr(then);
            visitor.visit_expr(otherwise);
        }
        ExprKind::List(items) => items.iter_mut().for_each(|e| visitor.visit_expr(e)),
    }
}

pub fn walk_stmt<V: VisitMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    for attribute in &mut stmt.attributes {
        attribute.args.iter_mut().for_each(|a| visitor.visit_expr(a));
    }
    match &mut stmt.kind {
        StmtKind::Block(stmts) => stmts.iter_mut().for_each(|s| visitor.visit_stmt(s)),
        StmtKind::Declare {
            ty, initializer, ..
        } => {
            visitor.visit_type(ty);
            if let Some(init) = initializer {
                visitor.visit_expr(init);
            }
        }
        StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::If {
            condition,
            then,
            otherwise,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(then);
            if let Some(otherwise) = otherwise {
                visitor.visit_stmt(otherwise);
            }
        }
        StmtKind::For {
            init,
            condition,
            step,
            body,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(condition) = condition {
                visitor.visit_expr(condition);
            }
            if let Some(step) = step {
                visitor.visit_expr(step);
            }
            visitor.visit_stmt(body);
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(body);
        }
        StmtKind::ForEach {
            collection, body, ..
        } => {
            visitor.visit_expr(collection);
            visitor.visit_stmt(body);
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Discard | StmtKind::Empty => {}
    }
}

pub fn walk_type<V: VisitMut + ?Sized>(visitor: &mut V, ty: &mut TypeRef) {
    if let Some(ArrayDim::Sized(size)) = &mut ty.array {
        visitor.visit_expr(size);
    }
}

fn walk_param<V: VisitMut + ?Sized>(visitor: &mut V, param: &mut Param) {
    visitor.visit_type(&mut param.ty);
    if let Some(semantic) = &mut param.semantic {
        visitor.visit_semantic(semantic);
    }
    if let Some(default) = &mut param.default {
        visitor.visit_expr(default);
    }
}

/// Walk everything owned by a declaration. Constant buffer members are separate declarations
/// and are not visited.
pub fn walk_decl<V: VisitMut + ?Sized>(visitor: &mut V, decl: &mut Decl) {
    for attribute in &mut decl.attributes {
        attribute.args.iter_mut().for_each(|a| visitor.visit_expr(a));
    }
    match &mut decl.kind {
        DeclKind::Variable {
            ty,
            semantic,
            initializer,
        } => {
            visitor.visit_type(ty);
            if let Some(semantic) = semantic {
                visitor.visit_semantic(semantic);
            }
            match initializer {
                Some(Initializer::Expr(expr)) => visitor.visit_expr(expr),
                Some(Initializer::State(fields)) => {
                    fields.iter_mut().for_each(|f| visitor.visit_expr(&mut f.value))
                }
                None => {}
            }
        }
        DeclKind::Method {
            return_type,
            params,
            semantic,
            body,
        } => {
            visitor.visit_type(return_type);
            params.iter_mut().for_each(|p| walk_param(visitor, p));
            if let Some(semantic) = semantic {
                visitor.visit_semantic(semantic);
            }
            if let Some(body) = body {
                body.iter_mut().for_each(|s| visitor.visit_stmt(s));
            }
        }
        DeclKind::Struct { fields } => fields.iter_mut().for_each(|f| walk_param(visitor, f)),
        DeclKind::ConstantBuffer { .. } => {}
    }
}
