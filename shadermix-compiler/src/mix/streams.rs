//! Stage inputs and outputs of stream variables.
//!
//! The mixer emits every stream as a `streams_{name}` global shared by all stages. The
//! [`StreamCreator`] walks each entry point and the methods it calls to find which streams the
//! stage reads before writing them and which it writes. Those are packed into
//! `{VS,PS,CS}_INPUT` and `{VS,PS}_OUTPUT` structs, and the entry point is rewritten to copy its
//! input into the globals on entry and the globals into its output on return.
//!
//! Between the vertex and pixel stages:
//!
//! - the pixel stage takes the vertex output as its input;
//! - a stream the pixel stage reads but the vertex stage never writes is passed through the
//!   vertex stage;
//! - the vertex stage only outputs what the pixel stage reads, and `SV_Position`;
//! - the pixel stage only outputs render targets, depth and coverage.

use crate::ast::visit::{walk_stmt, VisitMut};
use crate::ast::{
    Decl, DeclId, DeclKind, Expr, ExprKind, Param, Qualifiers, Shader, SourceSpan, Stmt,
    StmtKind, TypeRef, UnaryOp,
};
use crate::result::{Log, MessageKind};
use shadermix_common::map::FastHashMap;
use shadermix_common::ShaderStage;
use std::collections::BTreeMap;

const STREAM_PREFIX: &str = "streams_";
const INPUT: &str = "__input__";
const OUTPUT: &str = "__output__";

/// Stages whose streams are left as plain globals.
const UNSUPPORTED_STAGES: [ShaderStage; 3] =
    [ShaderStage::Hull, ShaderStage::Domain, ShaderStage::Geometry];

/// Generates the input and output structures of each entry point from its stream usage.
#[derive(Debug, Default, Copy, Clone)]
pub struct StreamCreator;

/// A stream variable of the mixed shader.
#[derive(Debug, Clone)]
struct Stream {
    /// The name of the global the stream was emitted as.
    global: String,
    ty: TypeRef,
    semantic: Option<String>,
    span: SourceSpan,
}

impl Stream {
    /// The name of the stream in an input or output structure.
    fn field(&self) -> &str {
        self.global
            .strip_prefix(STREAM_PREFIX)
            .unwrap_or(&self.global)
    }

    fn semantic_is(&self, f: impl Fn(&str) -> bool) -> bool {
        self.semantic.as_deref().is_some_and(|s| f(&s.to_ascii_uppercase()))
    }

    fn is_position(&self) -> bool {
        self.semantic_is(|s| s == "SV_POSITION")
    }

    fn is_pixel_output(&self) -> bool {
        self.semantic_is(|s| {
            s.starts_with("SV_TARGET") || s.starts_with("SV_DEPTH") || s == "SV_COVERAGE"
        })
    }

    /// The field of a structure holding this stream. Fields without a semantic are given
    /// `{NAME}_SEM` when `generate` is set.
    fn to_field(&self, generate: bool) -> Param {
        let semantic = self.semantic.clone().or_else(|| {
            generate.then(|| format!("{}_SEM", self.field().to_ascii_uppercase()))
        });
        Param {
            name: self.field().to_string(),
            ty: self.ty.clone(),
            qualifiers: Qualifiers::empty(),
            semantic,
            default: None,
            span: self.span.clone(),
        }
    }
}

/// The streams an entry point reads before writing them and the streams it writes, in order
/// of first use.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct StreamUsage {
    inputs: Vec<usize>,
    outputs: Vec<usize>,
}

impl StreamUsage {
    fn read(&mut self, stream: usize) {
        if !self.outputs.contains(&stream) && !self.inputs.contains(&stream) {
            self.inputs.push(stream);
        }
    }

    fn write(&mut self, stream: usize) {
        if !self.outputs.contains(&stream) {
            self.outputs.push(stream);
        }
    }
}

/// Walks an entry point and its callees in execution order, recording stream accesses.
struct UsageWalker<'a> {
    shader: &'a Shader,
    streams: &'a FastHashMap<String, usize>,
    /// The methods being walked, outermost first.
    path: Vec<&'a str>,
    usage: StreamUsage,
    log: Log,
}

impl<'a> UsageWalker<'a> {
    fn walk(
        shader: &'a Shader,
        streams: &'a FastHashMap<String, usize>,
        entry: &'a str,
    ) -> (StreamUsage, Log) {
        let mut walker = UsageWalker {
            shader,
            streams,
            path: Vec::new(),
            usage: StreamUsage::default(),
            log: Log::new(),
        };
        walker.method(entry);
        (walker.usage, walker.log)
    }

    fn find(&self, name: &str) -> Option<&'a Decl> {
        let shader = self.shader;
        shader.methods().find(|m| m.name == name)
    }

    fn method(&mut self, name: &'a str) {
        let Some(decl) = self.find(name) else {
            return;
        };
        let DeclKind::Method {
            body: Some(body), ..
        } = &decl.kind
        else {
            return;
        };
        if self.path.contains(&name) {
            self.log
                .error(MessageKind::RecursiveCall(name.to_string()), decl.span.clone());
            return;
        }
        self.path.push(name);
        body.iter().for_each(|s| self.stmt(s));
        self.path.pop();
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Block(stmts) => stmts.iter().for_each(|s| self.stmt(s)),
            StmtKind::Declare {
                initializer: Some(value),
                ..
            }
            | StmtKind::Expr(value)
            | StmtKind::Return(Some(value)) => self.expr(value),
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
            } => {
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(condition) = condition {
                    self.expr(condition);
                }
                self.stmt(body);
                if let Some(step) = step {
                    self.expr(step);
                }
            }
            StmtKind::While { condition, body } => {
                self.expr(condition);
                self.stmt(body);
            }
            StmtKind::ForEach {
                collection, body, ..
            } => {
                self.expr(collection);
                self.stmt(body);
            }
            StmtKind::Declare { .. }
            | StmtKind::Return(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Discard
            | StmtKind::Empty => {}
        }
    }

    fn expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ident(name) => {
                if let Some(stream) = self.streams.get(name) {
                    self.usage.read(*stream);
                }
            }
            ExprKind::Member { target, .. } => self.expr(target),
            ExprKind::Call { callee, args } => self.call(callee, args),
            ExprKind::Index { target, index } => {
                self.expr(target);
                self.expr(index);
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand);
                if matches!(
                    op,
                    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
                ) {
                    self.assigned(operand);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Assign { op, target, value } => {
                self.expr(value);
                if op.is_some() {
                    self.expr(target);
                }
                self.assigned(target);
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

    /// Walk the target of an assignment. Only the variable it names is written.
    fn assigned(&mut self, target: &'a Expr) {
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(stream) = self.streams.get(name) {
                    self.usage.write(*stream);
                }
            }
            ExprKind::Member { target, .. } => self.assigned(target),
            ExprKind::Index { target, index } => {
                self.expr(index);
                self.assigned(target);
            }
            _ => self.expr(target),
        }
    }

    fn call(&mut self, callee: &'a Expr, args: &'a [Expr]) {
        let Some(name) = callee.as_ident() else {
            self.expr(callee);
            args.iter().for_each(|a| self.expr(a));
            return;
        };
        let params: &[Param] = match self.find(name).map(|m| &m.kind) {
            Some(DeclKind::Method { params, .. }) => params.as_slice(),
            _ => &[],
        };
        for (index, arg) in args.iter().enumerate() {
            let direction = params
                .get(index)
                .map_or(Qualifiers::empty(), |p| p.qualifiers & Qualifiers::INOUT);
            if direction != Qualifiers::OUT {
                self.expr(arg);
            }
            if direction.contains(Qualifiers::OUT) {
                self.assigned(arg);
            }
        }
        self.method(name);
    }
}

/// The structures one entry point is given.
#[derive(Debug)]
struct EntryStreams {
    entry: String,
    /// The input structure and its fields. A shared input was declared by the previous stage.
    input: Option<(String, Vec<usize>)>,
    shared_input: bool,
    output: Option<(String, Vec<usize>)>,
    /// Whether output fields without a semantic are given one.
    generate_output_semantics: bool,
}

fn returns_void(shader: &Shader, entry: &str) -> bool {
    matches!(
        shader.methods().find(|m| m.name == entry).map(|m| &m.kind),
        Some(DeclKind::Method { return_type, .. }) if return_type.is_void()
    )
}

fn non_empty(name: String, fields: Vec<usize>) -> Option<(String, Vec<usize>)> {
    (!fields.is_empty()).then_some((name, fields))
}

impl StreamCreator {
    /// Generate the stream structures of every entry point and turn streams into plain
    /// statics.
    ///
    /// Entry points that already return a value are not given an output.
    pub fn create(
        &self,
        shader: &mut Shader,
        entry_points: &BTreeMap<ShaderStage, String>,
    ) -> Log {
        let mut log = Log::new();
        let (ids, streams): (Vec<DeclId>, Vec<Stream>) = shader
            .iter()
            .filter(|(_, d)| d.is_stream())
            .filter_map(|(id, decl)| {
                let DeclKind::Variable { ty, semantic, .. } = &decl.kind else {
                    return None;
                };
                let stream = Stream {
                    global: decl.name.clone(),
                    ty: ty.clone(),
                    semantic: semantic.clone(),
                    span: decl.span.clone(),
                };
                Some((id, stream))
            })
            .unzip();
        log::debug!("creating stream structures for {} streams", streams.len());

        let unsupported: Vec<_> = UNSUPPORTED_STAGES
            .into_iter()
            .filter(|stage| entry_points.contains_key(stage))
            .collect();
        if !streams.is_empty() {
            for stage in &unsupported {
                log.warning(MessageKind::StreamsNotGenerated(*stage), None);
            }
        }

        let plans = if streams.is_empty() || !unsupported.is_empty() {
            Vec::new()
        } else {
            let index: FastHashMap<String, usize> = streams
                .iter()
                .enumerate()
                .map(|(i, s)| (s.global.clone(), i))
                .collect();
            self.plan(shader, &streams, &index, entry_points, &mut log)
        };

        let mut structs = Vec::new();
        for plan in plans {
            self.rewrite(shader, &streams, &plan, &mut structs);
        }
        let declarations = std::mem::replace(&mut shader.declarations, structs);
        shader.declarations.extend(declarations);

        for id in ids {
            let decl = &mut shader.arena[id];
            decl.qualifiers.remove(Qualifiers::STREAM);
            decl.qualifiers.insert(Qualifiers::STATIC);
            if let DeclKind::Variable { semantic, .. } = &mut decl.kind {
                *semantic = None;
            }
        }
        log
    }

    fn plan(
        &self,
        shader: &Shader,
        streams: &[Stream],
        index: &FastHashMap<String, usize>,
        entry_points: &BTreeMap<ShaderStage, String>,
        log: &mut Log,
    ) -> Vec<EntryStreams> {
        let mut walk = |entry: &String| {
            let (usage, walked) = UsageWalker::walk(shader, index, entry);
            log.extend(walked);
            usage
        };

        if let Some(entry) = entry_points.get(&ShaderStage::Compute) {
            let usage = walk(entry);
            return vec![EntryStreams {
                entry: entry.clone(),
                input: non_empty("CS_INPUT".to_string(), usage.inputs),
                shared_input: false,
                output: None,
                generate_output_semantics: false,
            }];
        }

        let vertex = entry_points
            .get(&ShaderStage::Vertex)
            .map(|entry| (entry, walk(entry)));
        let pixel = entry_points.get(&ShaderStage::Pixel).map(|entry| {
            let mut usage = walk(entry);
            usage.outputs.retain(|s| streams[*s].is_pixel_output());
            (entry, usage)
        });

        let mut plans = Vec::new();
        let mut vertex_output = None;
        if let Some((entry, mut vs)) = vertex {
            if let Some((_, ps)) = &pixel {
                for stream in &ps.inputs {
                    if !vs.outputs.contains(stream) {
                        vs.outputs.push(*stream);
                        if !vs.inputs.contains(stream) {
                            vs.inputs.push(*stream);
                        }
                    }
                }
                vs.outputs
                    .retain(|s| ps.inputs.contains(s) || streams[*s].is_position());
            }
            let output = if returns_void(shader, entry) {
                non_empty("VS_OUTPUT".to_string(), vs.outputs)
            } else {
                None
            };
            vertex_output = output.clone();
            plans.push(EntryStreams {
                entry: entry.clone(),
                input: non_empty("VS_INPUT".to_string(), vs.inputs),
                shared_input: false,
                output,
                generate_output_semantics: true,
            });
        }
        if let Some((entry, ps)) = pixel {
            let shared_input = vertex_output.is_some();
            let input = vertex_output.or_else(|| non_empty("PS_INPUT".to_string(), ps.inputs));
            let output = if returns_void(shader, entry) {
                non_empty("PS_OUTPUT".to_string(), ps.outputs)
            } else {
                None
            };
            plans.push(EntryStreams {
                entry: entry.clone(),
                input,
                shared_input,
                output,
                generate_output_semantics: false,
            });
        }
        plans
    }

    fn rewrite(
        &self,
        shader: &mut Shader,
        streams: &[Stream],
        plan: &EntryStreams,
        structs: &mut Vec<DeclId>,
    ) {
        let span = SourceSpan::synthesized;
        let to_fields = |fields: &[usize], generate: bool| -> Vec<Param> {
            fields.iter().map(|s| streams[*s].to_field(generate)).collect()
        };

        if let Some((name, input)) = &plan.input {
            if !plan.shared_input {
                let fields = to_fields(input, true);
                let decl = Decl::new(name, DeclKind::Struct { fields }, span());
                structs.push(shader.arena.alloc(decl));
            }
        }
        if let Some((name, output)) = &plan.output {
            let fields = to_fields(output, plan.generate_output_semantics);
            let decl = Decl::new(name, DeclKind::Struct { fields }, span());
            structs.push(shader.arena.alloc(decl));
        }

        let Some(id) = shader
            .iter()
            .find(|(_, d)| d.is_method() && d.name == plan.entry)
            .map(|(id, _)| id)
        else {
            return;
        };
        let DeclKind::Method {
            return_type,
            params,
            semantic,
            body: Some(body),
        } = &mut shader.arena[id].kind
        else {
            return;
        };

        let mut prologue = Vec::new();
        if let Some((name, input)) = &plan.input {
            params.push(Param {
                name: INPUT.to_string(),
                ty: TypeRef::named(name),
                qualifiers: Qualifiers::empty(),
                semantic: None,
                default: None,
                span: span(),
            });
            prologue.extend(input.iter().map(|s| {
                let stream = &streams[*s];
                assign(Expr::ident(&stream.global, span()), member(INPUT, stream.field()))
            }));
        }

        if let Some((name, output)) = &plan.output {
            *return_type = TypeRef::named(name);
            *semantic = None;
            prologue.push(Stmt::new(
                StmtKind::Declare {
                    qualifiers: Qualifiers::empty(),
                    ty: TypeRef::named(name),
                    name: OUTPUT.to_string(),
                    initializer: None,
                },
                span(),
            ));

            let mut exit: Vec<Stmt> = output
                .iter()
                .map(|s| {
                    let stream = &streams[*s];
                    assign(member(OUTPUT, stream.field()), Expr::ident(&stream.global, span()))
                })
                .collect();
            exit.push(Stmt::new(
                StmtKind::Return(Some(Expr::ident(OUTPUT, span()))),
                span(),
            ));

            if matches!(body.last().map(|s| &s.kind), Some(StmtKind::Return(None))) {
                body.pop();
            }
            let mut returns = ReturnOutput { exit: &exit };
            body.iter_mut().for_each(|s| returns.visit_stmt(s));
            body.extend(exit);
        }
        let statements = std::mem::replace(body, prologue);
        body.extend(statements);
    }
}

fn member(target: &str, member: &str) -> Expr {
    Expr::new(
        ExprKind::Member {
            target: Box::new(Expr::ident(target, SourceSpan::synthesized())),
            member: member.to_string(),
        },
        SourceSpan::synthesized(),
    )
}

fn assign(target: Expr, value: Expr) -> Stmt {
    let span = SourceSpan::synthesized();
    Stmt::new(
        StmtKind::Expr(Expr::new(
            ExprKind::Assign {
                op: None,
                target: Box::new(target),
                value: Box::new(value),
            },
            span.clone(),
        )),
        span,
    )
}

/// Replaces every `return;` with a copy of the streams into the output and its return.
struct ReturnOutput<'a> {
    exit: &'a [Stmt],
}

impl VisitMut for ReturnOutput<'_> {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        if let StmtKind::Return(None) = stmt.kind {
            stmt.kind = StmtKind::Block(self.exit.to_vec());
        } else {
            walk_stmt(self, stmt);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::ast::{DeclKind, Qualifiers, Shader};
    use crate::back::hlsl::HlslWriter;
    use crate::back::WriteShader;
    use crate::front::{MixinParser, ShaderParser};
    use crate::mix::{discover_entry_points, StreamCreator};
    use crate::result::{Log, MessageKind};
    use shadermix_common::ShaderStage;

    fn create(text: &str) -> (Shader, Log) {
        let mut output = MixinParser.parse(text, "Streams.mxsl");
        assert!(output.log.is_empty(), "{}", output.log);
        let class = output.classes.remove(0);
        let mut shader = Shader {
            arena: class.arena,
            declarations: class.members,
        };
        let entry_points = discover_entry_points(&shader);
        let log = StreamCreator.create(&mut shader, &entry_points);
        (shader, log)
    }

    fn fields(shader: &Shader, name: &str) -> Vec<String> {
        let Some(DeclKind::Struct { fields }) = shader.find(name).map(|d| &d.kind) else {
            panic!("{name} was not generated");
        };
        fields
            .iter()
            .map(|f| format!("{} {} : {}", f.ty, f.name, f.semantic.as_deref().unwrap_or("")))
            .collect()
    }

    fn hlsl(shader: &Shader) -> String {
        HlslWriter::new().write(shader).unwrap()
    }

    const PIPELINE: &str = r#"
shader Pipeline
{
    stream float4 streams_Position : POSITION;
    stream float4 streams_ShadingPosition : SV_Position;
    stream float3 streams_Normal : NORMAL;
    stream float2 streams_Uv;
    stream float4 streams_Color;
    stream float4 streams_ColorTarget : SV_Target0;

    void Transform()
    {
        streams_ShadingPosition = streams_Position;
        streams_Normal = normalize(streams_Normal);
    }

    [EntryPoint("Vertex")]
    void VSMain()
    {
        Transform();
        streams_Color = 1;
    }

    [EntryPoint("Pixel")]
    void PSMain()
    {
        if (streams_Uv.x < 0)
            return;
        streams_Color = float4(streams_Normal, 1);
        streams_ColorTarget = streams_Color * streams_ShadingPosition.x;
    }
};
"#;

    #[test]
    fn stages_are_linked_through_structs() {
        let (shader, log) = create(PIPELINE);
        assert!(log.is_empty(), "{log}");

        let names: Vec<_> = shader.iter().take(3).map(|(_, d)| d.name.as_str()).collect();
        assert_eq!(vec!["VS_INPUT", "VS_OUTPUT", "PS_OUTPUT"], names);
        assert!(shader.find("PS_INPUT").is_none());

        assert_eq!(
            vec![
                "float4 Position : POSITION",
                "float3 Normal : NORMAL",
                "float2 Uv : UV_SEM",
            ],
            fields(&shader, "VS_INPUT")
        );
        assert_eq!(
            vec![
                "float4 ShadingPosition : SV_Position",
                "float3 Normal : NORMAL",
                "float2 Uv : UV_SEM",
            ],
            fields(&shader, "VS_OUTPUT")
        );
        assert_eq!(
            vec!["float4 ColorTarget : SV_Target0"],
            fields(&shader, "PS_OUTPUT")
        );

        let text = hlsl(&shader);
        assert!(text.contains("VS_OUTPUT VSMain(VS_INPUT __input__)"), "{text}");
        assert!(text.contains("PS_OUTPUT PSMain(VS_OUTPUT __input__)"), "{text}");
        assert!(text.contains("streams_Uv = __input__.Uv;"), "{text}");
        assert!(text.contains("__output__.Uv = streams_Uv;"), "{text}");
        assert!(text.contains("__output__.ColorTarget = streams_ColorTarget;"));
        assert!(!text.contains("return;"), "{text}");
        assert!(!text.contains("stream "), "{text}");
        assert!(text.contains("static float4 streams_Color;"), "{text}");
    }

    #[test]
    fn early_returns_copy_the_output() {
        let (shader, _) = create(PIPELINE);
        let DeclKind::Method {
            body: Some(body), ..
        } = &shader.find("PSMain").unwrap().kind
        else {
            panic!("PSMain has no body");
        };
        let text = hlsl(&shader);
        // Once at the end of VSMain, twice in PSMain.
        assert_eq!(3, text.matches("return __output__;").count(), "{text}");
        // Input copies, the output declaration, the body, the output copy and the return.
        assert_eq!(3 + 1 + 3 + 1 + 1, body.len());
    }

    #[test]
    fn streams_become_statics() {
        let (shader, _) = create(PIPELINE);
        let stream = shader.find("streams_ShadingPosition").unwrap();
        assert_eq!(Qualifiers::STATIC, stream.qualifiers);
        assert!(matches!(
            stream.kind,
            DeclKind::Variable { semantic: None, .. }
        ));
    }

    #[test]
    fn vertex_stage_alone_outputs_everything_written() {
        let (shader, log) = create(
            r#"shader Alone
            {
                stream float4 streams_Position : POSITION;
                stream float4 streams_Scratch;
                [EntryPoint("Vertex")]
                void VSMain() { streams_Scratch += streams_Position; }
            };"#,
        );
        assert!(log.is_empty(), "{log}");
        assert_eq!(
            vec!["float4 Position : POSITION", "float4 Scratch : SCRATCH_SEM"],
            fields(&shader, "VS_INPUT")
        );
        assert_eq!(
            vec!["float4 Scratch : SCRATCH_SEM"],
            fields(&shader, "VS_OUTPUT")
        );
    }

    #[test]
    fn compute_stage_has_no_output() {
        let (shader, log) = create(
            r#"shader Dispatch
            {
                stream uint3 streams_Thread : SV_DispatchThreadID;
                stream float streams_Value;
                RWBuffer<float> Output;
                [EntryPoint("Compute")]
                void CSMain()
                {
                    streams_Value = streams_Thread.x;
                    Output[streams_Thread.x] = streams_Value;
                }
            };"#,
        );
        assert!(log.is_empty(), "{log}");
        assert_eq!(
            vec!["uint3 Thread : SV_DispatchThreadID"],
            fields(&shader, "CS_INPUT")
        );
        assert!(shader.find("CS_OUTPUT").is_none());
        let text = hlsl(&shader);
        assert!(text.contains("void CSMain(CS_INPUT __input__)"), "{text}");
    }

    #[test]
    fn out_arguments_are_writes() {
        let (shader, _) = create(
            r#"shader Out
            {
                stream float streams_Depth : SV_Depth;
                void Fill(out float value) { value = 1; }
                [EntryPoint("Pixel")]
                void PSMain() { Fill(streams_Depth); }
            };"#,
        );
        assert!(shader.find("PS_INPUT").is_none());
        assert_eq!(vec!["float Depth : SV_Depth"], fields(&shader, "PS_OUTPUT"));
    }

    #[test]
    fn recursive_calls_fail() {
        let (_, log) = create(
            r#"shader Loop
            {
                stream float streams_Value;
                void Spin() { streams_Value += 1; Spin(); }
                [EntryPoint("Pixel")]
                void PSMain() { Spin(); }
            };"#,
        );
        assert_eq!(
            MessageKind::RecursiveCall("Spin".into()),
            log.errors().next().unwrap().kind
        );
    }

    #[test]
    fn unsupported_stages_keep_globals() {
        let (shader, log) = create(
            r#"shader Geo
            {
                stream float4 streams_Position : SV_Position;
                [EntryPoint("Vertex")]
                void VSMain() { streams_Position = 0; }
                [EntryPoint("Geometry")]
                void GSMain() {}
            };"#,
        );
        assert!(!log.has_errors());
        assert_eq!(
            MessageKind::StreamsNotGenerated(ShaderStage::Geometry),
            log.warnings().next().unwrap().kind
        );
        assert!(shader.find("VS_OUTPUT").is_none());
        assert_eq!(
            Qualifiers::STATIC,
            shader.find("streams_Position").unwrap().qualifiers
        );
    }
}
