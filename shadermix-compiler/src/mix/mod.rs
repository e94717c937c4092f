//! Merging of a resolved module tree into a single [`Shader`].
//!
//! The [`CompositionResolver`] turns the request source into module instances and records
//! what is composed into each composition variable. The [`ShaderMixer`] then walks the
//! instance tree depth first and emits every member under a name unique to its instance:
//!
//! - the root instance keeps member names as written;
//! - the `n`th composed instance prefixes its members with `{Class}_id{n}_`;
//! - stage members are emitted once, unprefixed, whichever instance reaches them first;
//! - stream variables become `streams_{name}` globals, which the [`StreamCreator`] later packs
//!   into the inputs and outputs of each entry point;
//! - overridden method implementations are kept as `{prefix}{Class}_{name}` so `base` calls
//!   can reach them.
//!
//! Method bodies are rewritten to match: `streams.X`, `this.X`, `base.X`, `comp.X` and
//! `comp[i].X` become plain identifiers, and `foreach` loops over composition arrays are
//! unrolled.

mod clean;
mod composition;
mod entry;
mod streams;

pub use clean::ShaderCleaner;
pub use composition::{CompositionDictionary, CompositionResolver, VariableKey};
pub use entry::{check_required_stages, discover_entry_points};
pub use streams::StreamCreator;

use crate::analysis::{CompilationContext, MemberRef, VirtualTable};
use crate::ast::clone::CloneContext;
use crate::ast::visit::{walk_decl, walk_expr, walk_stmt, VisitMut};
use crate::ast::{
    Attribute, Decl, DeclId, DeclKind, Expr, ExprKind, InstanceId, Literal, Module, Qualifiers,
    Shader, ShaderClass, SourceSpan, Stmt, StmtKind,
};
use crate::library::generic_instance_name;
use crate::result::{Log, MessageKind};
use shadermix_common::map::{FastHashMap, FastHashSet};
use std::sync::Arc;

/// The instances composed into one composition variable.
#[derive(Debug)]
struct Composition {
    is_array: bool,
    instances: Vec<usize>,
}

/// One module instance of the tree being mixed, with the names its members are emitted under.
#[derive(Debug)]
struct MixInstance {
    /// The mixer's clone of the module, giving the instance an identity apart from other
    /// compositions of the same class. Members are emitted from the class tables of `vtable`;
    /// the clone only names the instance in diagnostics.
    module: Arc<Module>,
    vtable: Arc<VirtualTable>,
    prefix: String,
    /// Appended to the parameter keys of the instance's variables.
    link_suffix: String,
    compositions: FastHashMap<String, Composition>,
    variables: FastHashMap<String, String>,
    /// Method name to the name of its final implementation.
    methods: FastHashMap<String, String>,
    implementations: FastHashMap<MemberRef, String>,
}

impl MixInstance {
    fn variable_name(&self, class: &ShaderClass, decl: &Decl) -> String {
        if decl.is_stream() {
            format!("streams_{}", decl.name)
        } else if is_stage(class, decl) {
            decl.name.clone()
        } else {
            format!("{}{}", self.prefix, decl.name)
        }
    }

    fn plan(&mut self) {
        let vtable = Arc::clone(&self.vtable);
        for class in vtable.classes() {
            for (_, decl) in class.variables().filter(|(_, d)| !d.is_composition()) {
                let name = self.variable_name(class, decl);
                self.variables.entry(decl.name.clone()).or_insert(name);
            }
        }

        for slot in vtable.methods() {
            let last = slot.implementations.len() - 1;
            for (n, member) in slot.implementations.iter().enumerate() {
                let class = &vtable.classes()[member.class_index];
                let prefix = if is_stage(class, vtable.decl(*member)) {
                    ""
                } else {
                    self.prefix.as_str()
                };
                let name = if n == last {
                    format!("{prefix}{}", slot.name)
                } else {
                    format!("{prefix}{}_{}", class.name, slot.name)
                };
                if n == last {
                    self.methods.insert(slot.name.clone(), name.clone());
                }
                self.implementations.insert(*member, name);
            }
        }
    }

    /// The emitted name of a member other instances refer to.
    fn member(&self, name: &str) -> Option<String> {
        self.methods
            .get(name)
            .or_else(|| self.variables.get(name))
            .cloned()
    }
}

fn is_stage(class: &ShaderClass, decl: &Decl) -> bool {
    decl.is_stage() || class.is_stage_only()
}

/// Merges a tree of module instances into one shader.
pub struct ShaderMixer<'a> {
    context: &'a CompilationContext,
    dictionary: &'a CompositionDictionary,
    instances: Vec<MixInstance>,
    log: Log,
}

impl<'a> ShaderMixer<'a> {
    pub fn new(context: &'a CompilationContext, dictionary: &'a CompositionDictionary) -> Self {
        ShaderMixer {
            context,
            dictionary,
            instances: Vec::new(),
            log: Log::new(),
        }
    }

    /// Mix the tree rooted at `root`. Instances are re-cloned into `mixer_context`, which should
    /// be layered on the context the tree was resolved in.
    pub fn mix(
        mut self,
        root: &Arc<Module>,
        mixer_context: &mut CloneContext<'_>,
    ) -> (Option<Shader>, Log) {
        if self
            .add_instance(root, String::new(), String::new(), mixer_context)
            .is_none()
            || self.log.has_errors()
        {
            return (None, self.log);
        }
        for instance in &mut self.instances {
            instance.plan();
        }

        let mut output = Output::new(self.context, &self.instances);
        for index in 0..self.instances.len() {
            output.emit_instance(index);
        }
        output.emit_builtins();
        let (shader, log) = output.finish();
        self.log.extend(log);

        log::debug!(
            "mixed {} instances into {} declarations",
            self.instances.len(),
            shader.declarations.len()
        );

        if self.log.has_errors() {
            (None, self.log)
        } else {
            (Some(shader), self.log)
        }
    }

    fn add_instance(
        &mut self,
        source: &Arc<Module>,
        prefix: String,
        link_suffix: String,
        mixer_context: &mut CloneContext<'_>,
    ) -> Option<usize> {
        // Every instance of the tree was loaded, so a missing table means the load failed.
        let vtable = self.context.virtual_table(&source.key)?;
        let index = self.instances.len();
        self.instances.push(MixInstance {
            module: mixer_context.deep_clone(source),
            vtable,
            prefix,
            link_suffix: link_suffix.clone(),
            compositions: FastHashMap::default(),
            variables: FastHashMap::default(),
            methods: FastHashMap::default(),
            implementations: FastHashMap::default(),
        });

        for module in source.linearize() {
            for (decl_id, decl) in module.class.variables().filter(|(_, d)| d.is_composition()) {
                let Some(ty) = decl.variable_type() else {
                    continue;
                };
                let key = VariableKey {
                    instance: module.instance,
                    decl: decl_id,
                };
                let composed = self.dictionary.get(&key).cloned().unwrap_or_default();
                let expected = if ty.template.is_empty() {
                    ty.name.clone()
                } else {
                    generic_instance_name(&ty.name, &ty.template)
                };

                let mut instances = Vec::with_capacity(composed.len());
                for (i, composed) in composed.iter().enumerate() {
                    if !composed.inherits(&expected) {
                        self.log.error(
                            MessageKind::CompositionTypeMismatch {
                                variable: decl.name.clone(),
                                expected: ty.element().to_string(),
                                actual: composed.name().to_string(),
                            },
                            decl.span.clone(),
                        );
                        continue;
                    }
                    let path = if ty.is_array() {
                        format!("{link_suffix}.{}[{i}]", decl.name)
                    } else {
                        format!("{link_suffix}.{}", decl.name)
                    };
                    let prefix = format!("{}_id{}_", composed.name(), self.instances.len());
                    instances.push(self.add_instance(composed, prefix, path, mixer_context)?);
                }

                let wrong_length = match ty.array_len() {
                    Some(len) => len as usize != instances.len(),
                    None => !ty.is_array() && instances.len() > 1,
                };
                if wrong_length {
                    self.log.error(
                        MessageKind::CompositionArrayMismatch(decl.name.clone()),
                        decl.span.clone(),
                    );
                }

                self.instances[index].compositions.insert(
                    decl.name.clone(),
                    Composition {
                        is_array: ty.is_array(),
                        instances,
                    },
                );
            }
        }
        Some(index)
    }
}

/// The shader being emitted.
struct Output<'a> {
    context: &'a CompilationContext,
    instances: &'a [MixInstance],
    shader: Shader,
    builtin_declarations: Vec<DeclId>,
    buffers: FastHashMap<String, DeclId>,
    structs: FastHashSet<String>,
    streams: FastHashSet<String>,
    /// Emitted stage member names and the declaration that claimed them.
    stage_members: FastHashMap<String, (String, DeclId)>,
    builtins: FastHashSet<(InstanceId, DeclId)>,
    pending_builtins: Vec<(Arc<Module>, DeclId)>,
    log: Log,
}

impl<'a> Output<'a> {
    fn new(context: &'a CompilationContext, instances: &'a [MixInstance]) -> Self {
        Output {
            context,
            instances,
            shader: Shader::default(),
            builtin_declarations: Vec::new(),
            buffers: FastHashMap::default(),
            structs: FastHashSet::default(),
            streams: FastHashSet::default(),
            stage_members: FastHashMap::default(),
            builtins: FastHashSet::default(),
            pending_builtins: Vec::new(),
            log: Log::new(),
        }
    }

    fn emit_instance(&mut self, index: usize) {
        let instances = self.instances;
        let vtable = &instances[index].vtable;
        for (class_index, class) in vtable.classes().iter().enumerate() {
            for id in &class.members {
                let decl = &class.arena[*id];
                match &decl.kind {
                    DeclKind::Variable { .. } => self.emit_variable(index, class_index, *id, None),
                    DeclKind::ConstantBuffer { kind, members } => {
                        let buffer = match self.buffers.get(&decl.name) {
                            Some(buffer) => *buffer,
                            None => {
                                let mut buffer = Decl::new(
                                    decl.name.clone(),
                                    DeclKind::ConstantBuffer {
                                        kind: *kind,
                                        members: Vec::new(),
                                    },
                                    decl.span.clone(),
                                );
                                buffer.attributes = decl.attributes.clone();
                                let buffer = self.push(buffer);
                                self.buffers.insert(decl.name.clone(), buffer);
                                buffer
                            }
                        };
                        for member in members {
                            self.emit_variable(index, class_index, *member, Some(buffer));
                        }
                    }
                    DeclKind::Struct { .. } => {
                        if self.structs.insert(decl.name.clone()) {
                            self.push(decl.clone());
                        }
                    }
                    DeclKind::Method { .. } => self.emit_method(index, class_index, *id),
                }
            }
        }
    }

    fn push(&mut self, decl: Decl) -> DeclId {
        let id = self.shader.arena.alloc(decl);
        self.shader.declarations.push(id);
        id
    }

    /// Whether a stage member still has to be emitted. Reports a different declaration
    /// claiming the same name.
    fn claim_stage_member(&mut self, name: &str, class: &ShaderClass, decl: DeclId) -> bool {
        match self.stage_members.get(name) {
            Some((owner, id)) if *owner == class.name && *id == decl => false,
            Some(_) => {
                self.log.error(
                    MessageKind::DuplicateStageMember(name.to_string()),
                    class.arena[decl].span.clone(),
                );
                false
            }
            None => {
                self.stage_members
                    .insert(name.to_string(), (class.name.clone(), decl));
                true
            }
        }
    }

    fn emit_variable(
        &mut self,
        index: usize,
        class_index: usize,
        id: DeclId,
        buffer: Option<DeclId>,
    ) {
        let instances = self.instances;
        let instance = &instances[index];
        let class = &instance.vtable.classes()[class_index];
        let decl = &class.arena[id];
        if decl.is_composition() {
            return;
        }

        let name = instance.variable_name(class, decl);
        let mut emitted = decl.clone();
        emitted.name = name.clone();

        if decl.is_stream() {
            if !self.streams.insert(name) {
                return;
            }
            emitted.attributes.retain(|a| a.name != "Link");
        } else {
            let stage = is_stage(class, decl);
            if stage && !self.claim_stage_member(&name, class, id) {
                return;
            }
            if !decl.qualifiers.intersects(Qualifiers::UNLINKED) {
                let suffix = if stage { "" } else { instance.link_suffix.as_str() };
                link_parameter(&mut emitted, &class.name, &decl.name, suffix);
            }
        }

        let mut rewriter = Rewriter::new(self.context, self.instances, Some((index, class_index)));
        walk_decl(&mut rewriter, &mut emitted);
        self.absorb(rewriter);

        match buffer {
            Some(buffer) => {
                let member = self.shader.arena.alloc(emitted);
                if let DeclKind::ConstantBuffer { members, .. } = &mut self.shader.arena[buffer].kind
                {
                    members.push(member);
                }
            }
            None => {
                self.push(emitted);
            }
        }
    }

    fn emit_method(&mut self, index: usize, class_index: usize, id: DeclId) {
        let instances = self.instances;
        let instance = &instances[index];
        let class = &instance.vtable.classes()[class_index];
        let decl = &class.arena[id];
        let member = MemberRef {
            class_index,
            decl: id,
        };
        let Some(name) = instance.implementations.get(&member) else {
            return;
        };
        let Some(slot) = instance.vtable.method(&decl.name) else {
            return;
        };
        let is_final = slot.final_implementation() == Some(member);

        if is_final && matches!(decl.kind, DeclKind::Method { body: None, .. }) {
            self.log.error(
                MessageKind::MethodNotImplemented {
                    class: instance.module.name().to_string(),
                    method: decl.name.clone(),
                },
                decl.span.clone(),
            );
            return;
        }
        if is_stage(class, decl) && !self.claim_stage_member(name, class, id) {
            return;
        }

        let mut emitted = decl.clone();
        emitted.name = name.clone();
        // The entry point tag follows the method to its final implementation.
        emitted.entry_point = if is_final {
            slot.implementations
                .iter()
                .rev()
                .find_map(|m| instance.vtable.decl(*m).entry_point)
        } else {
            None
        };

        let mut rewriter = Rewriter::new(self.context, self.instances, Some((index, class_index)));
        if let DeclKind::Method { params, .. } = &emitted.kind {
            for param in params {
                rewriter.declare(param.name.clone(), Binding::Local);
            }
        }
        walk_decl(&mut rewriter, &mut emitted);
        self.absorb(rewriter);
        self.push(emitted);
    }

    fn absorb(&mut self, rewriter: Rewriter<'_>) {
        self.log.extend(rewriter.log);
        for (module, decl) in rewriter.builtins {
            if self.builtins.insert((module.instance, decl)) {
                self.pending_builtins.push((module, decl));
            }
        }
    }

    /// Emit the builtin members used by the shader, and those they use in turn, in first use
    /// order.
    fn emit_builtins(&mut self) {
        let mut next = 0;
        while let Some((module, id)) = self.pending_builtins.get(next).cloned() {
            next += 1;
            let mut emitted = module.class.arena[id].clone();
            let mut rewriter = Rewriter::new(self.context, self.instances, None);
            walk_decl(&mut rewriter, &mut emitted);
            self.absorb(rewriter);

            let id = self.shader.arena.alloc(emitted);
            self.builtin_declarations.push(id);
        }
    }

    fn finish(mut self) -> (Shader, Log) {
        let mut declarations = self.builtin_declarations;
        declarations.append(&mut self.shader.declarations);
        self.shader.declarations = declarations;
        (self.shader, self.log)
    }
}

/// Give a variable the parameter key it is reflected under. A variable without a `Link`
/// attribute is keyed `Class.member`.
fn link_parameter(decl: &mut Decl, class: &str, member: &str, suffix: &str) {
    match decl.attributes.iter_mut().find(|a| a.name == "Link") {
        Some(link) => {
            if let Some(Expr {
                kind: ExprKind::Literal(Literal::String(key)),
                ..
            }) = link.args.first_mut()
            {
                key.push_str(suffix);
            }
        }
        None => decl.attributes.push(Attribute::new(
            "Link",
            vec![Expr::string(
                format!("{class}.{member}{suffix}"),
                SourceSpan::synthesized(),
            )],
        )),
    }
}

/// What a name declared inside a method refers to.
#[derive(Debug, Copy, Clone)]
enum Binding {
    /// A parameter or local variable, which hides members of the same name.
    Local,
    /// A `foreach` variable, bound to the instance of the current iteration.
    Instance(usize),
}

/// Rewrites member accesses in one declaration to the names they were emitted under.
struct Rewriter<'a> {
    context: &'a CompilationContext,
    instances: &'a [MixInstance],
    /// The instance and class index the declaration belongs to. Builtins have none.
    scope: Option<(usize, usize)>,
    /// Names declared in each enclosing block, innermost last.
    locals: Vec<FastHashMap<String, Binding>>,
    builtins: Vec<(Arc<Module>, DeclId)>,
    log: Log,
}

impl<'a> Rewriter<'a> {
    fn new(
        context: &'a CompilationContext,
        instances: &'a [MixInstance],
        scope: Option<(usize, usize)>,
    ) -> Self {
        Rewriter {
            context,
            instances,
            scope,
            locals: vec![FastHashMap::default()],
            builtins: Vec::new(),
            log: Log::new(),
        }
    }

    fn instance(&self) -> Option<&'a MixInstance> {
        let instances = self.instances;
        self.scope.map(|(index, _)| &instances[index])
    }

    fn binding(&self, name: &str) -> Option<Binding> {
        self.locals.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn is_local(&self, name: &str) -> bool {
        matches!(self.binding(name), Some(Binding::Local))
    }

    fn declare(&mut self, name: String, binding: Binding) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(name, binding);
        }
    }

    /// Run `f` in a new innermost scope seeded with `bound`.
    fn scoped(&mut self, bound: Option<(String, Binding)>, f: impl FnOnce(&mut Self)) {
        self.locals.push(bound.into_iter().collect());
        f(self);
        self.locals.pop();
    }

    fn resolve_ident(&mut self, name: &str) -> Option<String> {
        if self.binding(name).is_some() {
            return None;
        }
        if let Some(renamed) = self.instance().and_then(|i| i.member(name)) {
            return Some(renamed);
        }
        if let Some((module, decl)) = self.context.builtin_member(name) {
            self.builtins.push((Arc::clone(module), decl));
        }
        None
    }

    /// The composed instance `target` refers to, as in `target.member`.
    fn composed_instance(&mut self, target: &Expr, span: &SourceSpan) -> Option<usize> {
        let instance = self.instance()?;
        let (name, index) = match &target.kind {
            ExprKind::Ident(name) => (name.as_str(), None),
            ExprKind::Index { target, index } => (target.as_ident()?, Some(index)),
            _ => return None,
        };
        match self.binding(name) {
            Some(Binding::Instance(bound)) if index.is_none() => return Some(bound),
            Some(_) => return None,
            None => {}
        }
        let composition = instance.compositions.get(name)?;

        let element = match index {
            Some(index) => match &index.kind {
                ExprKind::Literal(Literal::Int(i)) => usize::try_from(*i)
                    .ok()
                    .and_then(|i| composition.instances.get(i))
                    .copied(),
                _ => None,
            },
            None => match composition.instances.as_slice() {
                [single] if !composition.is_array => Some(*single),
                [] => {
                    self.log.error(
                        MessageKind::MissingComposition(name.to_string()),
                        span.clone(),
                    );
                    return None;
                }
                _ => None,
            },
        };
        if element.is_none() {
            self.log.error(
                MessageKind::CompositionArrayMismatch(name.to_string()),
                span.clone(),
            );
        }
        element
    }

    fn resolve_member(&mut self, target: &Expr, member: &str, span: &SourceSpan) -> Option<String> {
        let (_, class_index) = self.scope?;
        let instance = self.instance()?;
        match target.as_ident() {
            Some(name) if self.is_local(name) => None,
            Some("streams") => Some(format!("streams_{member}")),
            Some("this") => self.resolve_ident(member),
            Some("base") => match instance.vtable.method(member) {
                Some(slot) => slot
                    .implementation_before(class_index)
                    .and_then(|m| instance.implementations.get(&m))
                    .cloned(),
                None => instance.variables.get(member).cloned(),
            },
            _ => {
                let composed = self.composed_instance(target, span)?;
                self.instances[composed].member(member)
            }
        }
    }

    fn foreach_targets(&self, collection: &Expr) -> Vec<usize> {
        collection
            .as_ident()
            .filter(|name| self.binding(name).is_none())
            .and_then(|name| self.instance()?.compositions.get(name))
            .filter(|c| c.is_array)
            .map(|c| c.instances.clone())
            .unwrap_or_default()
    }
}

impl VisitMut for Rewriter<'_> {
    fn visit_expr(&mut self, expr: &mut Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if let Some(renamed) = self.resolve_ident(name) {
                    expr.kind = ExprKind::Ident(renamed);
                }
            }
            ExprKind::Member { target, member } => {
                match self.resolve_member(target, member, &expr.span) {
                    Some(renamed) => expr.kind = ExprKind::Ident(renamed),
                    None => walk_expr(self, expr),
                }
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match &stmt.kind {
            StmtKind::Declare { name, .. } => {
                let name = name.clone();
                walk_stmt(self, stmt);
                self.declare(name, Binding::Local);
            }
            StmtKind::Block(_) | StmtKind::For { .. } => self.scoped(None, |r| walk_stmt(r, stmt)),
            StmtKind::ForEach {
                variable,
                collection,
                body,
            } => {
                let variable = variable.clone();
                let body = body.as_ref().clone();
                let targets = self.foreach_targets(collection);

                let mut unrolled = Vec::with_capacity(targets.len());
                for target in targets {
                    let mut iteration = body.clone();
                    let bound = (variable.clone(), Binding::Instance(target));
                    self.scoped(Some(bound), |r| r.visit_stmt(&mut iteration));
                    unrolled.push(iteration);
                }
                stmt.kind = StmtKind::Block(unrolled);
            }
            _ => walk_stmt(self, stmt),
        }
    }
}
