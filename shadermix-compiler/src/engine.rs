//! The compile entry point.
//!
//! A [`MixinEngine`] owns everything that outlives a request: the shader library and its
//! cache, the builtin modules and the options. Each call to [`MixinEngine::parse`] runs the
//! whole pipeline on request-local state and stops at the first phase that reports an error.

use crate::analysis::CompilationContext;
use crate::ast::clone::CloneContext;
use crate::ast::{Module, ModuleKey};
use crate::error::ShaderMixinError;
use crate::front::{MixinParser, ShaderParser};
use crate::library::ShaderLibrary;
use crate::mix::{
    check_required_stages, discover_entry_points, CompositionResolver, ShaderCleaner, ShaderMixer,
    StreamCreator,
};
use crate::options::EngineOptions;
use crate::reflect::ShaderLinker;
use crate::result::{Log, MessageKind, ParsingResult};
use crate::source::ShaderSource;
use parking_lot::{Mutex, MutexGuard};
use shadermix_common::{ShaderMacro, SourceHash};
use shadermix_preprocess::{preprocess_str, ShaderSourceManager};
use std::sync::Arc;

/// The file name diagnostics of builtin sources are attributed to.
const BUILTIN_FILE: &str = "<builtin>";

/// Modules shared by every request.
#[derive(Default)]
struct Builtins {
    modules: Vec<Arc<Module>>,
    /// Maps every builtin module to itself, so requests never clone one.
    context: CloneContext<'static>,
}

/// Compiles shader mixin trees.
///
/// The engine is `Send + Sync`; requests on different threads share the class cache.
pub struct MixinEngine {
    library: ShaderLibrary,
    builtins: Mutex<Builtins>,
    options: EngineOptions,
}

impl MixinEngine {
    /// Create an engine parsing `.mxsl` sources found through `source_manager`.
    pub fn new(source_manager: ShaderSourceManager, options: EngineOptions) -> Self {
        Self::with_parser(Arc::new(MixinParser), source_manager, options)
    }

    /// Create an engine with a different front end.
    pub fn with_parser(
        parser: Arc<dyn ShaderParser>,
        source_manager: ShaderSourceManager,
        options: EngineOptions,
    ) -> Self {
        MixinEngine {
            library: ShaderLibrary::new(parser, source_manager),
            builtins: Mutex::new(Builtins::default()),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Lock the source manager, for example to add lookup directories or virtual sources.
    pub fn source_manager(&self) -> MutexGuard<'_, ShaderSourceManager> {
        self.library.source_manager()
    }

    /// Evict the named classes from the cache, so that the next request reloads them.
    pub fn delete_obsolete_cache<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        self.library.delete_obsolete_cache(names)
    }

    /// Register the classes of `source` as builtins. Their members are visible to every class
    /// without inheritance, and the methods a mixed shader uses are emitted with it.
    pub fn add_builtin(&self, source: &str) -> Result<(), ShaderMixinError> {
        let text = preprocess_str(source, BUILTIN_FILE, None, &[], &[])?;
        let output = self.library.parser().parse(&text, BUILTIN_FILE);
        if output.log.has_errors() {
            return Err(ShaderMixinError::InvalidBuiltin(output.log));
        }
        if output.classes.is_empty() {
            return Err(ShaderMixinError::EmptyBuiltin);
        }

        let hash = SourceHash::of(&text);
        let mut builtins = self.builtins.lock();
        for class in output.classes {
            log::debug!("registered builtin class {}", class.name);
            let module = Arc::new(Module::new(
                ModuleKey::new(class.name.clone(), Vec::new(), &[]),
                Arc::new(class),
                Vec::new(),
                hash,
            ));
            builtins.context.insert_identity(&module);
            builtins.modules.push(module);
        }
        Ok(())
    }

    /// Load, preprocess and analyze the classes of `source` without mixing them.
    ///
    /// The result carries the diagnostics and source hashes of the request, never a shader.
    pub fn parse_and_analyze(&self, source: &ShaderSource, macros: &[ShaderMacro]) -> ParsingResult {
        let mut result = ParsingResult::default();
        let builtins = self.builtins.lock().modules.clone();
        self.analyze(source, macros, builtins, &mut result);
        result
    }

    /// Compile `source` into a linked shader with its reflection and entry points.
    ///
    /// `macros` apply to every class of the request, followed by the macros the mixin sources
    /// of the tree declare.
    pub fn parse(&self, source: &ShaderSource, macros: &[ShaderMacro]) -> ParsingResult {
        let mut result = ParsingResult::default();

        // Snapshot the builtins so registering one does not block running requests.
        let (builtins, base_context) = {
            let builtins = self.builtins.lock();
            (builtins.modules.clone(), builtins.context.clone())
        };

        let Some(context) = self.analyze(source, macros, builtins, &mut result) else {
            return result;
        };

        let mut mix_context = base_context.child();
        let mut resolver = CompositionResolver::new(&context, &self.options);
        resolver.share_stage_modules(&mut mix_context);
        let roots = resolver.build(source, &mix_context);
        let (dictionary, log) = resolver.into_parts();
        result.log.extend(log);
        let root = match roots.as_deref() {
            _ if result.log.has_errors() => return result,
            Some([root]) => Arc::clone(root),
            Some(_) => {
                result.log.error(MessageKind::InvalidRootSource, None);
                return result;
            }
            None => return result,
        };
        log::debug!("resolved {} composition variables", dictionary.len());

        let mut mixer_context = mix_context.child();
        let (shader, log) = ShaderMixer::new(&context, &dictionary).mix(&root, &mut mixer_context);
        result.log.extend(log);
        let Some(mut shader) = shader else {
            return result;
        };

        let entry_points = discover_entry_points(&shader);
        check_required_stages(&entry_points, &self.options.required_stages, &mut result.log);
        if result.log.has_errors() {
            return result;
        }

        let log = StreamCreator.create(&mut shader, &entry_points);
        result.log.extend(log);
        if result.log.has_errors() {
            return result;
        }

        let (reflection, log) = ShaderLinker.link(&mut shader);
        result.log.extend(log);
        if result.log.has_errors() {
            return result;
        }

        ShaderCleaner.clean(&mut shader);
        log::debug!(
            "compiled {source} with entry points {:?}",
            entry_points.values().collect::<Vec<_>>()
        );
        result.shader = Some(shader);
        result.reflection = Some(reflection);
        result.entry_points = entry_points;
        result
    }

    /// Run the load, preprocess and analyze phases, returning the context when all succeeded.
    fn analyze(
        &self,
        source: &ShaderSource,
        macros: &[ShaderMacro],
        builtins: Vec<Arc<Module>>,
        result: &mut ParsingResult,
    ) -> Option<CompilationContext> {
        let mut macros = macros.to_vec();
        macros.extend(source.collect_macros());

        let loaded = self.library.load_shader_source(source, &macros, &self.options);
        result.log.extend(loaded.log);
        for info in loaded.infos.values().filter(|info| !info.synthesized) {
            result
                .hash_sources
                .insert(info.key.name.clone(), info.source_hash);
        }
        if result.log.has_errors() {
            return None;
        }

        let context = CompilationContext::new(loaded.infos, builtins, &macros);
        let mut log = Log::new();
        context.preprocess(&mut log);
        if !log.has_errors() {
            context.analyze_all(&mut log);
        }
        result.log.extend(log);
        if result.log.has_errors() {
            return None;
        }
        Some(context)
    }
}

#[cfg(test)]
mod test {
    use crate::engine::MixinEngine;
    use crate::error::ShaderMixinError;
    use crate::options::EngineOptions;
    use crate::result::MessageKind;
    use crate::source::ShaderSource;
    use shadermix_common::{ShaderMacro, ShaderStage};
    use shadermix_preprocess::ShaderSourceManager;
    use std::str::FromStr;

    fn engine(sources: &[(&str, &str)]) -> MixinEngine {
        let mut manager = ShaderSourceManager::new();
        for (name, source) in sources {
            manager.add_virtual_source(*name, *source);
        }
        MixinEngine::new(manager, EngineOptions::default())
    }

    const SOURCES: &[(&str, &str)] = &[
        (
            "Color",
            r#"shader Color
            {
                float4 Tint;
                [EntryPoint("Pixel")]
                float4 PSMain() : SV_Target { return saturate(Tint * Gain); }
            };"#,
        ),
        (
            "Scaled",
            r#"shader Scaled
            {
            #ifdef DOUBLE
                float4 Get() { return 2; }
            #else
                float4 Get() { return 1; }
            #endif
            };"#,
        ),
        ("Broken", "shader Broken { float Get() { return Missing; } };"),
        ("Pair", "shader Pair { compose Scaled a; compose Scaled b; };"),
    ];

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MixinEngine>();
    }

    #[test]
    fn builtins_are_visible_and_emitted() {
        let engine = engine(SOURCES);
        engine
            .add_builtin("shader Builtins { static const float Gain = 2.0; };")
            .unwrap();
        let result = engine.parse(&ShaderSource::class("Color"), &[]);
        assert!(!result.has_errors(), "{}", result.log);

        let shader = result.shader.unwrap();
        assert!(shader.find("Gain").is_some());
        assert_eq!(
            Some(&"PSMain".to_string()),
            result.entry_points.get(&ShaderStage::Pixel)
        );
        assert!(result.reflection.unwrap().constant_buffer("$Globals").is_some());
    }

    #[test]
    fn invalid_builtins_are_rejected() {
        let engine = engine(SOURCES);
        assert!(matches!(
            engine.add_builtin("shader { }"),
            Err(ShaderMixinError::InvalidBuiltin(_))
        ));
        assert!(matches!(
            engine.add_builtin("// nothing here"),
            Err(ShaderMixinError::EmptyBuiltin)
        ));
    }

    #[test]
    fn analysis_errors_stop_the_request() {
        let engine = engine(SOURCES);
        let result = engine.parse(&ShaderSource::class("Broken"), &[]);
        assert!(result.has_errors());
        assert!(result.shader.is_none());
        assert!(result.reflection.is_none());
        assert_eq!(
            MessageKind::UnresolvedIdentifier("Missing".into()),
            result.log.errors().next().unwrap().kind
        );
        assert!(result.hash_sources.contains_key("Broken"));
    }

    #[test]
    fn parse_and_analyze_does_not_mix() {
        let engine = engine(SOURCES);
        let result = engine.parse_and_analyze(&ShaderSource::class("Pair"), &[]);
        assert!(!result.has_errors(), "{}", result.log);
        assert!(result.shader.is_none());
        let names: Vec<_> = result.hash_sources.keys().map(String::as_str).collect();
        assert_eq!(vec!["Pair", "Scaled"], names);
    }

    #[test]
    fn request_macros_select_branches() {
        let engine = engine(SOURCES);
        let source = ShaderSource::class("Scaled");
        let plain = engine.parse(&source, &[]).shader.unwrap();
        let doubled = engine
            .parse(&source, &[ShaderMacro::new("DOUBLE", "1")])
            .shader
            .unwrap();
        assert_ne!(plain, doubled);
    }

    #[test]
    fn arrays_are_not_roots() {
        let engine = engine(SOURCES);
        let result = engine.parse(&ShaderSource::from_str("[Scaled, Scaled]").unwrap(), &[]);
        assert_eq!(
            MessageKind::InvalidRootSource,
            result.log.errors().next().unwrap().kind
        );
    }

    #[test]
    fn required_stages_are_checked() {
        let mut manager = ShaderSourceManager::new();
        for (name, source) in SOURCES {
            manager.add_virtual_source(*name, *source);
        }
        let engine = MixinEngine::new(
            manager,
            EngineOptions::default().require_stage(ShaderStage::Vertex),
        );
        let engine_result = engine.parse(&ShaderSource::class("Scaled"), &[]);
        assert!(engine_result.shader.is_none());
        assert_eq!(
            MessageKind::MissingEntryPoint(ShaderStage::Vertex),
            engine_result.log.errors().next().unwrap().kind
        );
    }
}
