use crate::analysis::intrinsics::{intrinsic_arity, is_numeric_type};
use crate::analysis::{CompilationContext, VirtualTable};
use crate::ast::{DeclKind, Expr, ExprKind, SourceSpan, Stmt, StmtKind, TypeRef};
use crate::result::{Log, MessageKind};
use shadermix_common::map::FastHashMap;

/// Identifiers with a meaning of their own inside method bodies.
const SPECIAL_IDENTIFIERS: [&str; 3] = ["streams", "base", "this"];

#[derive(Debug, Clone)]
enum Local {
    Value,
    /// The loop variable of a `foreach` over a composition array.
    Composition(TypeRef),
}

/// Analyze the method bodies of the class `vtable` was built for.
pub(crate) fn analyze_class(context: &CompilationContext, vtable: &VirtualTable, log: &mut Log) {
    let class = &vtable.classes()[vtable.own_index()];
    for (_, decl) in class.methods() {
        let DeclKind::Method {
            return_type,
            params,
            body: Some(body),
            ..
        } = &decl.kind
        else {
            continue;
        };

        let parameters = params
            .iter()
            .map(|p| (p.name.clone(), Local::Value))
            .collect();
        let mut analyzer = Analyzer {
            context,
            vtable,
            scopes: vec![parameters],
            method: &decl.name,
            returns_value: !return_type.is_void(),
            log: Log::new(),
        };
        body.iter().for_each(|s| analyzer.stmt(s));
        log.extend(analyzer.log);
    }
}

/// Checks one method body against its class hierarchy and compositions.
///
/// An analyzer lives for one method and shares no state with other requests.
struct Analyzer<'a> {
    context: &'a CompilationContext,
    vtable: &'a VirtualTable,
    scopes: Vec<FastHashMap<String, Local>>,
    method: &'a str,
    returns_value: bool,
    log: Log,
}

impl Analyzer<'_> {
    fn local(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn declare(&mut self, name: &str, local: Local) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), local);
        }
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(FastHashMap::default());
        f(self);
        self.scopes.pop();
    }

    /// The type of the composition variable an identifier names.
    fn composition_type(&self, name: &str) -> Option<TypeRef> {
        match self.local(name) {
            Some(Local::Composition(ty)) => return Some(ty.clone()),
            Some(Local::Value) => return None,
            None => {}
        }
        let decl = self.vtable.decl(self.vtable.variable(name)?);
        decl.variable_type()
            .filter(|_| decl.is_composition())
            .cloned()
    }

    fn check_arity(&mut self, name: &str, arity: (usize, usize), actual: usize, span: &SourceSpan) {
        let (min, max) = arity;
        if actual < min || actual > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            self.log.error(
                MessageKind::WrongArgumentCount {
                    name: name.to_string(),
                    expected,
                    actual,
                },
                span.clone(),
            );
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(stmts) => self.scoped(|this| stmts.iter().for_each(|s| this.stmt(s))),
            StmtKind::Declare {
                name, initializer, ..
            } => {
                if let Some(initializer) = initializer {
                    self.expr(initializer);
                }
                self.declare(name, Local::Value);
            }
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Return(value) => {
                match (value, self.returns_value) {
                    (Some(_), false) => self.log.error(
                        MessageKind::ReturnValueInVoidMethod(self.method.to_string()),
                        stmt.span.clone(),
                    ),
                    (None, true) => self.log.error(
                        MessageKind::MissingReturnValue(self.method.to_string()),
                        stmt.span.clone(),
                    ),
                    _ => {}
                }
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            StmtKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.expr(condition);
                self.stmt(then);
                if let Some(otherwise) = otherwise {
                    self.stmt(otherwise);
                }
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => self.scoped(|this| {
                if let Some(init) = init {
                    this.stmt(init);
                }
                if let Some(condition) = condition {
                    this.expr(condition);
                }
                if let Some(step) = step {
                    this.expr(step);
                }
                this.stmt(body);
            }),
            StmtKind::While { condition, body } => {
                self.expr(condition);
                self.stmt(body);
            }
            StmtKind::ForEach {
                variable,
                collection,
                body,
            } => {
                let element = collection
                    .as_ident()
                    .and_then(|name| self.composition_type(name))
                    .filter(TypeRef::is_array)
                    .map(|ty| ty.element());
                let local = match element {
                    Some(element) => Local::Composition(element),
                    None => {
                        self.log.error(
                            MessageKind::InvalidForEach(describe(collection)),
                            collection.span.clone(),
                        );
                        Local::Value
                    }
                };
                self.scoped(|this| {
                    this.declare(variable, local);
                    this.stmt(body);
                });
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Discard | StmtKind::Empty => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ident(name) => self.ident(name, &expr.span),
            ExprKind::Member { target, member } => self.member(target, member, None, &expr.span),
            ExprKind::Call { callee, args } => {
                args.iter().for_each(|a| self.expr(a));
                match &callee.kind {
                    ExprKind::Ident(name) => self.call(name, args.len(), &callee.span),
                    ExprKind::Member { target, member } => {
                        self.member(target, member, Some(args.len()), &callee.span)
                    }
                    _ => self.expr(callee),
                }
            }
            ExprKind::Index { target, index } => {
                self.expr(target);
                self.expr(index);
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ExprKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                self.expr(condition);
                self.expr(then);
                self.expr(otherwise);
            }
            ExprKind::List(items) => items.iter().for_each(|e| self.expr(e)),
        }
    }

    fn ident(&mut self, name: &str, span: &SourceSpan) {
        let known = self.local(name).is_some()
            || SPECIAL_IDENTIFIERS.contains(&name)
            || self.vtable.variable(name).is_some()
            || self.vtable.method(name).is_some()
            || self.vtable.struct_type(name).is_some()
            || self.context.builtin_member(name).is_some()
            || intrinsic_arity(name).is_some()
            || is_numeric_type(name);
        if !known {
            self.log.error(
                MessageKind::UnresolvedIdentifier(name.to_string()),
                span.clone(),
            );
        }
    }

    fn call(&mut self, name: &str, arguments: usize, span: &SourceSpan) {
        if self.local(name).is_some() {
            return;
        }

        let arity = if let Some(slot) = self.vtable.method(name) {
            slot.final_implementation()
                .and_then(|m| self.vtable.decl(m).arity())
        } else if let Some((module, decl)) = self.context.builtin_member(name) {
            module.class.arena[decl].arity()
        } else if let Some(arity) = intrinsic_arity(name) {
            Some(arity)
        } else if is_numeric_type(name) || self.vtable.struct_type(name).is_some() {
            None
        } else {
            self.log.error(
                MessageKind::UnresolvedIdentifier(name.to_string()),
                span.clone(),
            );
            None
        };

        if let Some(arity) = arity {
            self.check_arity(name, arity, arguments, span);
        }
    }

    /// `target.member`, called with `arguments` when it is the callee of a call.
    fn member(&mut self, target: &Expr, member: &str, arguments: Option<usize>, span: &SourceSpan) {
        // `lights[i].member` is checked like `lights.member`.
        let (receiver, index) = match &target.kind {
            ExprKind::Index { target, index } => (target.as_ref(), Some(index)),
            _ => (target, None),
        };
        if let Some(index) = index {
            self.expr(index);
        }

        let special = receiver
            .as_ident()
            .filter(|name| self.local(name).is_none() && index.is_none());
        match special {
            Some("streams") => {
                let is_stream = self
                    .vtable
                    .variable(member)
                    .is_some_and(|m| self.vtable.decl(m).is_stream());
                if !is_stream {
                    self.log.error(
                        MessageKind::StreamMemberNotFound(member.to_string()),
                        span.clone(),
                    );
                }
                return;
            }
            Some("base") => {
                let own = self.vtable.own_index();
                let implementation = self
                    .vtable
                    .method(member)
                    .and_then(|slot| slot.implementation_before(own));
                match implementation {
                    Some(implementation) => {
                        if let (Some(arguments), Some(arity)) =
                            (arguments, self.vtable.decl(implementation).arity())
                        {
                            self.check_arity(member, arity, arguments, span);
                        }
                    }
                    None => self.log.error(
                        MessageKind::BaseMethodNotFound(member.to_string()),
                        span.clone(),
                    ),
                }
                return;
            }
            Some("this") => {
                match arguments {
                    Some(arguments) => self.call(member, arguments, span),
                    None => self.ident(member, span),
                }
                return;
            }
            _ => {}
        }

        let composition = receiver
            .as_ident()
            .and_then(|name| Some((name, self.composition_type(name)?)));
        match composition {
            Some((name, ty)) => self.composition_member(name, &ty.element(), member, arguments, span),
            None => self.expr(receiver),
        }
    }

    fn composition_member(
        &mut self,
        composition: &str,
        ty: &TypeRef,
        member: &str,
        arguments: Option<usize>,
        span: &SourceSpan,
    ) {
        // A composition type that failed to load was already reported.
        let Some(vtable) = self.context.virtual_table(&self.context.composition_key(ty)) else {
            return;
        };

        if let Some(slot) = vtable.method(member) {
            let arity = slot
                .final_implementation()
                .and_then(|m| vtable.decl(m).arity());
            if let (Some(arguments), Some(arity)) = (arguments, arity) {
                self.check_arity(member, arity, arguments, span);
            }
        } else if vtable.variable(member).is_none() {
            self.log.error(
                MessageKind::UnknownCompositionMember {
                    composition: composition.to_string(),
                    member: member.to_string(),
                },
                span.clone(),
            );
        }
    }
}

fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Member { target, member } => format!("{}.{member}", describe(target)),
        ExprKind::Index { target, .. } => format!("{}[]", describe(target)),
        _ => "expression".to_string(),
    }
}
