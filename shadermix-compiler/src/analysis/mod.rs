//! Cross-module preprocessing and semantic analysis.
//!
//! A [`CompilationContext`] is built per request from the loaded infos. Virtual tables are
//! memoized in the infos themselves, so preprocessing a class that an earlier request already
//! saw costs a lookup. Analysis keeps its symbol tables in a per-method value, so neither phase
//! takes a lock.

/// Intrinsic function and numeric type tables.
pub mod intrinsics;
mod semantic;
mod vtable;

pub use vtable::*;

use crate::ast::{DeclId, Module, ModuleKey, TypeRef};
use crate::library::ModuleInfo;
use crate::result::Log;
use shadermix_common::map::FastHashMap;
use shadermix_common::ShaderMacro;
use std::sync::Arc;

/// The infos reachable from one request, with the builtin modules and active macros.
#[derive(Debug)]
pub struct CompilationContext {
    modules: FastHashMap<ModuleKey, Arc<ModuleInfo>>,
    builtins: Vec<Arc<Module>>,
    macros: Vec<ShaderMacro>,
}

impl CompilationContext {
    pub fn new(
        modules: FastHashMap<ModuleKey, Arc<ModuleInfo>>,
        builtins: Vec<Arc<Module>>,
        macros: &[ShaderMacro],
    ) -> Self {
        CompilationContext {
            modules,
            builtins,
            macros: macros.to_vec(),
        }
    }

    pub fn modules(&self) -> &FastHashMap<ModuleKey, Arc<ModuleInfo>> {
        &self.modules
    }

    pub fn module_info(&self, key: &ModuleKey) -> Option<&Arc<ModuleInfo>> {
        self.modules.get(key)
    }

    pub fn macros(&self) -> &[ShaderMacro] {
        &self.macros
    }

    /// The infos in key order, so diagnostics come out the same way every time.
    fn sorted_infos(&self) -> Vec<&Arc<ModuleInfo>> {
        let mut infos: Vec<_> = self.modules.values().collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// The key of the module a composition variable of type `ty` is filled with.
    pub fn composition_key(&self, ty: &TypeRef) -> ModuleKey {
        ModuleKey::new(ty.name.clone(), ty.template.clone(), &self.macros)
    }

    pub fn virtual_table(&self, key: &ModuleKey) -> Option<Arc<VirtualTable>> {
        self.modules.get(key).map(|info| info.virtual_table())
    }

    /// Find a member of a builtin module by name.
    pub fn builtin_member(&self, name: &str) -> Option<(&Arc<Module>, DeclId)> {
        self.builtins.iter().find_map(|module| {
            module
                .class
                .members
                .iter()
                .find(|id| module.class.arena[**id].name == name)
                .map(|id| (module, *id))
        })
    }

    /// Build the virtual table of every reachable class and report errors in their
    /// declarations.
    pub fn preprocess(&self, log: &mut Log) {
        for info in self.sorted_infos() {
            let vtable = info.virtual_table();
            log.extend(vtable.diagnostics().messages().iter().cloned());
        }
        log::debug!("preprocessed {} modules", self.modules.len());
    }

    /// Check the method bodies of one class.
    pub fn analyze(&self, info: &ModuleInfo, log: &mut Log) {
        if info.synthesized {
            return;
        }
        let vtable = info.virtual_table();
        semantic::analyze_class(self, &vtable, log);
    }

    /// Analyze every reachable class.
    pub fn analyze_all(&self, log: &mut Log) {
        for info in self.sorted_infos() {
            self.analyze(info, log);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::analysis::CompilationContext;
    use crate::options::EngineOptions;
    use crate::result::{Log, MessageKind};
    use crate::source::ShaderSource;
    use crate::testing;
    use std::str::FromStr;

    const SOURCES: &[(&str, &str)] = &[
        (
            "LightBase",
            "shader LightBase { float3 Color; float3 Compute(float3 n) { return Color; } };",
        ),
        (
            "ShaderBase",
            "shader ShaderBase { stream float4 Position : SV_Position; stream float3 Normal; \
             stage void VSMain() {} };",
        ),
    ];

    fn analyze(name: &str, body: &str) -> Log {
        let mut sources = SOURCES.to_vec();
        sources.push((name, body));
        let library = testing::library(&sources);
        let source = ShaderSource::from_str(name).unwrap();
        let loaded = library.load_shader_source(&source, &[], &EngineOptions::default());
        assert!(!loaded.log.has_errors(), "{}", loaded.log);

        let context = CompilationContext::new(loaded.infos, Vec::new(), &[]);
        let mut log = Log::new();
        context.preprocess(&mut log);
        context.analyze_all(&mut log);
        log
    }

    fn kinds(log: &Log) -> Vec<MessageKind> {
        log.errors().map(|e| e.kind.clone()).collect()
    }

    #[test]
    fn valid_class() {
        let log = analyze(
            "Lit",
            r#"shader Lit : ShaderBase {
                compose LightBase lights[];
                compose LightBase sun;
                float Intensity;
                override stage void VSMain()
                {
                    base.VSMain();
                    float3 total = sun.Compute(streams.Normal) * sun.Color;
                    foreach (var light in lights)
                    {
                        total += light.Compute(normalize(streams.Normal));
                    }
                    for (int i = 0; i < 4; i++) total += lights[i].Color;
                    streams.Position = float4(total * Intensity, 1);
                    this.Helper(saturate(total.x));
                }
                void Helper(float x) { if (x > 0) return; }
            };"#,
        );
        assert!(log.is_empty(), "{log}");
    }

    #[test]
    fn unresolved_and_arity() {
        let log = analyze(
            "Bad",
            "shader Bad { float4 Run(float x) { float y = missing + x; lerp(x, y); Run(); \
             return float4(y, y, y, y); } };",
        );
        assert_eq!(
            vec![
                MessageKind::UnresolvedIdentifier("missing".into()),
                MessageKind::WrongArgumentCount {
                    name: "lerp".into(),
                    expected: "3".into(),
                    actual: 2
                },
                MessageKind::WrongArgumentCount {
                    name: "Run".into(),
                    expected: "1".into(),
                    actual: 0
                },
            ],
            kinds(&log)
        );
    }

    #[test]
    fn mixin_member_errors() {
        let log = analyze(
            "Wrong",
            "shader Wrong : ShaderBase { compose LightBase light; \
             void VSMain() {} \
             void Run() { base.Run(); streams.Missing = 1; light.Intensity = 1; \
             foreach (var l in light) {} } \
             float Value() { return; } \
             void Nothing() { return 1; } };",
        );
        assert_eq!(
            vec![
                MessageKind::MissingOverride {
                    class: "Wrong".into(),
                    method: "VSMain".into()
                },
                MessageKind::BaseMethodNotFound("Run".into()),
                MessageKind::StreamMemberNotFound("Missing".into()),
                MessageKind::UnknownCompositionMember {
                    composition: "light".into(),
                    member: "Intensity".into()
                },
                MessageKind::InvalidForEach("light".into()),
                MessageKind::MissingReturnValue("Value".into()),
                MessageKind::ReturnValueInVoidMethod("Nothing".into()),
            ],
            kinds(&log)
        );
    }
}
