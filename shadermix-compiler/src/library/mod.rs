//! Loading and caching of shader classes.
//!
//! The [`ShaderLibrary`] turns the class names of a [`ShaderSource`] tree into [`ModuleInfo`]s:
//! the source is looked up, preprocessed with the request macros, parsed and instantiated with
//! its generic arguments. Infos are cached by [`ModuleKey`] until evicted with
//! [`ShaderLibrary::delete_obsolete_cache`].

mod generics;

pub use generics::generic_instance_name;

use crate::analysis::VirtualTable;
use crate::ast::{BaseClass, Module, ModuleKey, ShaderClass, SourceSpan};
use crate::front::ShaderParser;
use crate::options::EngineOptions;
use crate::result::{Log, MessageKind};
use crate::source::{ShaderClassSource, ShaderSource};
use parking_lot::{Mutex, MutexGuard};
use shadermix_common::map::{FastHashMap, FastHashSet};
use shadermix_common::{ShaderMacro, SourceHash};
use shadermix_preprocess::{PreprocessError, ShaderSourceManager};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// A loaded, instantiated shader class.
///
/// Infos are immutable once created. The virtual table is computed on first use and shared by
/// every request that sees the info.
#[derive(Debug)]
pub struct ModuleInfo {
    pub key: ModuleKey,
    pub class: Arc<ShaderClass>,
    /// The hash of the source text before preprocessing.
    pub source_hash: SourceHash,
    /// The hash of the text handed to the parser.
    pub preprocessed_hash: SourceHash,
    /// The pristine module all request instances are cloned from.
    pub module: Arc<Module>,
    pub base_keys: Vec<ModuleKey>,
    /// The keys of the types of the class' composition variables.
    pub composition_keys: Vec<ModuleKey>,
    pub path: Option<PathBuf>,
    /// Whether the class was synthesized for a mixin of several base classes.
    pub synthesized: bool,
    vtable: OnceLock<Arc<VirtualTable>>,
}

impl ModuleInfo {
    pub fn name(&self) -> &str {
        &self.class.name
    }

    /// The virtual table of the class hierarchy.
    pub fn virtual_table(&self) -> Arc<VirtualTable> {
        Arc::clone(
            self.vtable
                .get_or_init(|| Arc::new(VirtualTable::build(&self.module))),
        )
    }

    /// The keys this info depends on, bases first.
    pub fn dependencies(&self) -> impl Iterator<Item = &ModuleKey> {
        self.base_keys.iter().chain(self.composition_keys.iter())
    }
}

/// The cache key of a class reference.
pub fn class_key(class: &ShaderClassSource, macros: &[ShaderMacro]) -> ModuleKey {
    ModuleKey::new(
        class.class_name.clone(),
        class.generic_arguments.clone(),
        macros,
    )
}

/// The key of the class synthesized for a mixin of several base classes.
pub fn mixin_key(bases: &[ShaderClassSource], macros: &[ShaderMacro]) -> ModuleKey {
    let names = bases
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("+");
    ModuleKey::new(
        format!("Mixin_{}", SourceHash::of(names).short(8)),
        Vec::new(),
        macros,
    )
}

/// The key of the module a source resolves to, or `None` for arrays and empty mixins.
pub fn source_key(source: &ShaderSource, macros: &[ShaderMacro]) -> Option<ModuleKey> {
    match source {
        ShaderSource::Class(class) => Some(class_key(class, macros)),
        ShaderSource::Mixin(mixin) => match mixin.base_classes.as_slice() {
            [] => None,
            [single] => Some(class_key(single, macros)),
            bases => Some(mixin_key(bases, macros)),
        },
        ShaderSource::Array(_) => None,
    }
}

/// The infos loaded for one request and the diagnostics of loading them.
#[derive(Debug, Default)]
pub struct LoadedModules {
    pub infos: FastHashMap<ModuleKey, Arc<ModuleInfo>>,
    pub log: Log,
}

/// Loads, parses and caches shader classes by key.
pub struct ShaderLibrary {
    parser: Arc<dyn ShaderParser>,
    source_manager: Mutex<ShaderSourceManager>,
    cache: Mutex<FastHashMap<ModuleKey, Arc<ModuleInfo>>>,
}

impl ShaderLibrary {
    pub fn new(parser: Arc<dyn ShaderParser>, source_manager: ShaderSourceManager) -> Self {
        ShaderLibrary {
            parser,
            source_manager: Mutex::new(source_manager),
            cache: Mutex::new(FastHashMap::default()),
        }
    }

    pub fn parser(&self) -> &dyn ShaderParser {
        self.parser.as_ref()
    }

    /// Lock the source manager, for example to register lookup directories.
    pub fn source_manager(&self) -> MutexGuard<'_, ShaderSourceManager> {
        self.source_manager.lock()
    }

    /// The cached info for a key, if any.
    pub fn cached(&self, key: &ModuleKey) -> Option<Arc<ModuleInfo>> {
        self.cache.lock().get(key).cloned()
    }

    /// Load every class reachable from `root`: the classes it names, their base classes and the
    /// types of their composition variables.
    pub fn load_shader_source(
        &self,
        root: &ShaderSource,
        macros: &[ShaderMacro],
        options: &EngineOptions,
    ) -> LoadedModules {
        let mut loader = Loader {
            library: self,
            macros,
            options,
            infos: FastHashMap::default(),
            failed: FastHashSet::default(),
            pending: Vec::new(),
            log: Log::new(),
        };

        loader.load_tree(root);
        while let Some(key) = loader.pending.pop() {
            loader.load(&key, &mut Vec::new());
        }

        log::debug!(
            "loaded {} modules for {root} ({} failed)",
            loader.infos.len(),
            loader.failed.len()
        );

        LoadedModules {
            infos: loader.infos,
            log: loader.log,
        }
    }

    /// Evict every cached variant of the named classes, and of the classes inheriting them.
    ///
    /// Requests that already hold infos keep using them.
    pub fn delete_obsolete_cache<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut evicted: FastHashSet<String> = names.into_iter().map(str::to_string).collect();

        {
            let mut cache = self.cache.lock();
            loop {
                let obsolete: Vec<ModuleKey> = cache
                    .iter()
                    .filter(|(key, info)| {
                        evicted.contains(&key.name)
                            || info.base_keys.iter().any(|b| evicted.contains(&b.name))
                    })
                    .map(|(key, _)| key.clone())
                    .collect();
                if obsolete.is_empty() {
                    break;
                }
                for key in obsolete {
                    cache.remove(&key);
                    evicted.insert(key.name);
                }
            }
        }
        log::debug!("evicted {} classes from the module cache", evicted.len());

        self.source_manager
            .lock()
            .delete_obsolete_cache(evicted.iter().map(String::as_str));
    }
}

struct Loader<'a> {
    library: &'a ShaderLibrary,
    macros: &'a [ShaderMacro],
    options: &'a EngineOptions,
    infos: FastHashMap<ModuleKey, Arc<ModuleInfo>>,
    failed: FastHashSet<ModuleKey>,
    /// Keys reached through composition variables. Compositions may form cycles, so they are
    /// loaded from a worklist instead of recursively.
    pending: Vec<ModuleKey>,
    log: Log,
}

impl Loader<'_> {
    fn load_tree(&mut self, source: &ShaderSource) {
        match source {
            ShaderSource::Class(class) => self.pending.push(class_key(class, self.macros)),
            ShaderSource::Mixin(mixin) => {
                match mixin.base_classes.as_slice() {
                    [] => self.log.error(MessageKind::EmptyMixin, None),
                    [single] => self.pending.push(class_key(single, self.macros)),
                    bases => self.synthesize_mixin(bases),
                }
                for (_, composition) in &mixin.compositions {
                    self.load_tree(composition);
                }
            }
            ShaderSource::Array(array) => array.values.iter().for_each(|v| self.load_tree(v)),
        }
    }

    fn synthesize_mixin(&mut self, bases: &[ShaderClassSource]) {
        let key = mixin_key(bases, self.macros);
        if self.infos.contains_key(&key) {
            return;
        }

        let mut modules = Vec::new();
        for base in bases {
            let Some(info) = self.load(&class_key(base, self.macros), &mut Vec::new()) else {
                return;
            };
            modules.push(Arc::clone(&info.module));
        }

        let mut class = ShaderClass::new(key.name.clone(), SourceSpan::synthesized());
        class.bases = bases
            .iter()
            .map(|b| BaseClass {
                name: b.class_name.clone(),
                generic_arguments: b.generic_arguments.clone(),
                span: SourceSpan::synthesized(),
            })
            .collect();
        let class = Arc::new(class);

        let info = ModuleInfo {
            module: Arc::new(Module::new(
                key.clone(),
                Arc::clone(&class),
                modules,
                SourceHash::EMPTY,
            )),
            base_keys: bases.iter().map(|b| class_key(b, self.macros)).collect(),
            composition_keys: Vec::new(),
            key: key.clone(),
            class,
            source_hash: SourceHash::EMPTY,
            preprocessed_hash: SourceHash::EMPTY,
            path: None,
            synthesized: true,
            vtable: OnceLock::new(),
        };
        self.infos.insert(key, Arc::new(info));
    }

    /// Load a class and, recursively, its base classes. `stack` holds the keys of the classes
    /// currently being loaded below this one in the inheritance chain.
    fn load(&mut self, key: &ModuleKey, stack: &mut Vec<ModuleKey>) -> Option<Arc<ModuleInfo>> {
        if let Some(info) = self.infos.get(key) {
            return Some(Arc::clone(info));
        }
        if self.failed.contains(key) {
            return None;
        }
        if stack.contains(key) {
            self.log
                .error(MessageKind::CyclicInheritance(key.name.clone()), None);
            return None;
        }

        if let Some(info) = self.library.cached(key) {
            log::trace!("module cache hit for {key}");
            self.pending.extend(info.dependencies().cloned());
            self.infos.insert(key.clone(), Arc::clone(&info));
            return Some(info);
        }

        log::trace!("module cache miss for {key}");
        stack.push(key.clone());
        let info = self.parse(key, stack);
        stack.pop();

        match info {
            Some(info) => {
                let info = self.cache(key, Arc::new(info));
                self.infos.insert(key.clone(), Arc::clone(&info));
                Some(info)
            }
            None => {
                self.failed.insert(key.clone());
                None
            }
        }
    }

    /// Cache a freshly parsed info, or return the one another request cached first.
    ///
    /// An info is only cached while the bases it was built on are still cached. A base
    /// evicted during the parse would otherwise leave a derived class no eviction can reach.
    fn cache(&self, key: &ModuleKey, info: Arc<ModuleInfo>) -> Arc<ModuleInfo> {
        let mut cache = self.library.cache.lock();
        let current = info.base_keys.iter().all(|base| {
            match (cache.get(base), self.infos.get(base)) {
                (Some(cached), Some(used)) => Arc::ptr_eq(cached, used),
                _ => false,
            }
        });
        if !current {
            log::debug!("not caching {key}, a base class was evicted while it was loaded");
            return info;
        }
        Arc::clone(cache.entry(key.clone()).or_insert(info))
    }

    fn parse(&mut self, key: &ModuleKey, stack: &mut Vec<ModuleKey>) -> Option<ModuleInfo> {
        let loaded = {
            let mut manager = self.library.source_manager.lock();
            manager
                .load_shader_source(&key.name)
                .map(|file| (file, manager.lookup_directories().to_vec()))
        };

        let (file, lookup_directories) = match loaded {
            Ok(loaded) => loaded,
            Err(PreprocessError::ShaderNotFound(_)) => {
                self.log
                    .error(MessageKind::ShaderNotFound(key.name.clone()), None);
                return None;
            }
            Err(e) => {
                self.log.error(
                    MessageKind::PreprocessFailed {
                        name: key.name.clone(),
                        message: e.to_string(),
                    },
                    None,
                );
                return None;
            }
        };

        let text = match shadermix_preprocess::preprocess(&file, &lookup_directories, self.macros)
        {
            Ok(text) => text,
            Err(e) => {
                self.log.error(
                    MessageKind::PreprocessFailed {
                        name: key.name.clone(),
                        message: e.to_string(),
                    },
                    None,
                );
                return None;
            }
        };

        let file_name = file.file_name();
        let output = self.library.parser.parse(&text, &file_name);
        let parse_failed = output.log.has_errors();
        self.log.extend(output.log);
        if parse_failed {
            return None;
        }

        let mut classes = output.classes;
        if classes.len() != 1 {
            self.log.error(
                MessageKind::ShaderMustContainSingleClass {
                    name: key.name.clone(),
                    count: classes.len(),
                },
                None,
            );
            return None;
        }
        let class = classes.remove(0);

        if class.name != key.name {
            self.log.error(
                MessageKind::FileNameNotMatchingClassName {
                    file: file_name,
                    class: class.name.clone(),
                },
                class.span.clone(),
            );
            return None;
        }

        let class = generics::instantiate(
            class,
            &key.generic_arguments,
            self.options.allow_non_instantiated_generics,
            self.library.parser(),
            &mut self.log,
        )?;

        let base_keys: Vec<ModuleKey> = class
            .bases
            .iter()
            .map(|b| ModuleKey::new(b.name.clone(), b.generic_arguments.clone(), self.macros))
            .collect();

        let mut bases = Vec::with_capacity(base_keys.len());
        for base_key in &base_keys {
            bases.push(Arc::clone(&self.load(base_key, stack)?.module));
        }

        let mut composition_keys: Vec<ModuleKey> = Vec::new();
        for (_, decl) in class.variables() {
            let Some(ty) = decl.variable_type().filter(|_| decl.is_composition()) else {
                continue;
            };
            let composition = ModuleKey::new(ty.name.clone(), ty.template.clone(), self.macros);
            if !composition_keys.contains(&composition) {
                composition_keys.push(composition);
            }
        }
        self.pending.extend(composition_keys.iter().cloned());

        let preprocessed_hash = SourceHash::of(&text);
        let class = Arc::new(class);
        Some(ModuleInfo {
            module: Arc::new(Module::new(
                key.clone(),
                Arc::clone(&class),
                bases,
                preprocessed_hash,
            )),
            key: key.clone(),
            class,
            source_hash: file.hash,
            preprocessed_hash,
            base_keys,
            composition_keys,
            path: file.path.clone(),
            synthesized: false,
            vtable: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod test {
    use crate::ast::ModuleKey;
    use crate::ast::Expr;
    use crate::front::{MixinParser, ParseOutput, ShaderParser};
    use crate::library::{class_key, source_key, ShaderLibrary};
    use crate::options::EngineOptions;
    use crate::result::MessageKind;
    use crate::source::{ShaderClassSource, ShaderMixinSource, ShaderSource};
    use shadermix_common::ShaderMacro;
    use shadermix_preprocess::ShaderSourceManager;
    use std::sync::{Arc, OnceLock, Weak};

    fn library(sources: &[(&str, &str)]) -> ShaderLibrary {
        let mut manager = ShaderSourceManager::new();
        for (name, source) in sources {
            manager.add_virtual_source(*name, *source);
        }
        ShaderLibrary::new(Arc::new(MixinParser), manager)
    }

    const SOURCES: &[(&str, &str)] = &[
        ("ShaderBase", "shader ShaderBase { stage void VSMain() {} };"),
        ("LightBase", "shader LightBase { float3 Compute() { return 0; } };"),
        (
            "PointLight",
            "shader PointLight : LightBase { override float3 Compute() { return 1; } };",
        ),
        (
            "Material",
            "shader Material : ShaderBase { compose LightBase light; compose Material inner; };",
        ),
    ];

    fn key(name: &str) -> ModuleKey {
        ModuleKey::new(name, vec![], &[])
    }

    #[test]
    fn loads_reachable_classes() {
        let library = library(SOURCES);
        let source = ShaderSource::Mixin(
            ShaderMixinSource::new()
                .mixin(ShaderClassSource::new("Material"))
                .compose("light", ShaderSource::class("PointLight")),
        );

        let loaded = library.load_shader_source(&source, &[], &EngineOptions::default());
        assert!(loaded.log.is_empty(), "{}", loaded.log);
        let mut names: Vec<_> = loaded.infos.keys().map(|k| k.name.as_str()).collect();
        names.sort();
        assert_eq!(
            vec!["LightBase", "Material", "PointLight", "ShaderBase"],
            names
        );

        let material = &loaded.infos[&key("Material")];
        assert_eq!(vec![key("ShaderBase")], material.base_keys);
        assert_eq!(vec![key("LightBase"), key("Material")], material.composition_keys);

        let again = library.load_shader_source(&source, &[], &EngineOptions::default());
        assert!(Arc::ptr_eq(material, &again.infos[&key("Material")]));
    }

    #[test]
    fn macros_are_part_of_the_key() {
        let library = library(SOURCES);
        let source = ShaderSource::class("PointLight");
        let defines = [ShaderMacro::new("LIGHTS", 2)];

        let plain = library.load_shader_source(&source, &[], &EngineOptions::default());
        let defined = library.load_shader_source(&source, &defines, &EngineOptions::default());
        let plain = &plain.infos[&key("PointLight")];
        let defined = &defined.infos[&ModuleKey::new("PointLight", vec![], &defines)];
        assert!(!Arc::ptr_eq(plain, defined));
        assert_eq!(plain.source_hash, defined.source_hash);
    }

    #[test]
    fn cyclic_inheritance() {
        let library = library(&[
            ("A", "shader A : B {};"),
            ("B", "shader B : A {};"),
        ]);
        let loaded =
            library.load_shader_source(&ShaderSource::class("A"), &[], &EngineOptions::default());
        assert!(loaded
            .log
            .errors()
            .any(|e| matches!(e.kind, MessageKind::CyclicInheritance(_))));
        assert!(library.cached(&key("A")).is_none());
    }

    #[test]
    fn load_errors() {
        let library = library(&[
            ("Renamed", "shader Other {};"),
            ("Two", "shader Two {}; shader Three {};"),
        ]);
        let options = EngineOptions::default();

        let missing = library.load_shader_source(&ShaderSource::class("Missing"), &[], &options);
        assert!(matches!(
            missing.log.errors().next().unwrap().kind,
            MessageKind::ShaderNotFound(_)
        ));

        let renamed = library.load_shader_source(&ShaderSource::class("Renamed"), &[], &options);
        assert!(matches!(
            renamed.log.errors().next().unwrap().kind,
            MessageKind::FileNameNotMatchingClassName { .. }
        ));

        let two = library.load_shader_source(&ShaderSource::class("Two"), &[], &options);
        assert!(matches!(
            two.log.errors().next().unwrap().kind,
            MessageKind::ShaderMustContainSingleClass { count: 2, .. }
        ));
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let library = library(&[("Broken", "shader Broken { float x = ; };")]);
        let options = EngineOptions::default();
        let source = ShaderSource::class("Broken");
        assert!(library.load_shader_source(&source, &[], &options).log.has_errors());

        library
            .source_manager()
            .add_virtual_source("Broken", "shader Broken { float x = 1; };");
        library.delete_obsolete_cache(["Broken"]);
        let loaded = library.load_shader_source(&source, &[], &options);
        assert!(!loaded.log.has_errors(), "{}", loaded.log);
    }

    #[test]
    fn eviction_reaches_derived_classes() {
        let library = library(SOURCES);
        let options = EngineOptions::default();
        library.load_shader_source(&ShaderSource::class("Material"), &[], &options);
        library.load_shader_source(&ShaderSource::class("PointLight"), &[], &options);
        assert!(library.cached(&key("Material")).is_some());

        library.delete_obsolete_cache(["ShaderBase"]);
        assert!(library.cached(&key("ShaderBase")).is_none());
        assert!(library.cached(&key("Material")).is_none());
        assert!(library.cached(&key("PointLight")).is_some());
    }

    /// Evicts `Base` from its library while `Other` is parsed.
    struct EvictingParser {
        library: OnceLock<Weak<ShaderLibrary>>,
    }

    impl ShaderParser for EvictingParser {
        fn parse(&self, source: &str, file_name: &str) -> ParseOutput {
            if source.contains("shader Other") {
                if let Some(library) = self.library.get().and_then(Weak::upgrade) {
                    library.delete_obsolete_cache(["Base"]);
                }
            }
            MixinParser.parse(source, file_name)
        }

        fn parse_expression(&self, text: &str) -> Option<Expr> {
            MixinParser.parse_expression(text)
        }
    }

    #[test]
    fn classes_over_evicted_bases_are_not_cached() {
        let parser = Arc::new(EvictingParser {
            library: OnceLock::new(),
        });
        let mut manager = ShaderSourceManager::new();
        manager.add_virtual_source("Base", "shader Base { float A; };");
        manager.add_virtual_source("Other", "shader Other { float B; };");
        manager.add_virtual_source("Derived", "shader Derived : Base, Other { float C; };");
        let library = Arc::new(ShaderLibrary::new(parser.clone(), manager));
        assert!(parser.library.set(Arc::downgrade(&library)).is_ok());

        // Base is loaded and cached, then evicted while Other is parsed.
        let source = ShaderSource::class("Derived");
        let loaded = library.load_shader_source(&source, &[], &EngineOptions::default());
        assert!(loaded.log.is_empty(), "{}", loaded.log);
        assert!(loaded.infos.contains_key(&key("Derived")));
        assert!(library.cached(&key("Base")).is_none());
        assert!(library.cached(&key("Other")).is_some());
        assert!(library.cached(&key("Derived")).is_none());
    }

    #[test]
    fn mixins_of_several_classes_are_synthesized() {
        let library = library(SOURCES);
        let bases = ShaderMixinSource::new()
            .mixin(ShaderClassSource::new("ShaderBase"))
            .mixin(ShaderClassSource::new("PointLight"));
        let source = ShaderSource::Mixin(bases);
        let key = source_key(&source, &[]).unwrap();
        assert!(key.name.starts_with("Mixin_"));

        let loaded = library.load_shader_source(&source, &[], &EngineOptions::default());
        let info = &loaded.infos[&key];
        assert!(info.synthesized);
        let chain: Vec<_> = info
            .module
            .linearize()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(vec!["ShaderBase", "LightBase", "PointLight", key.name.as_str()], chain);
        assert!(library.cached(&key).is_none());
    }

    #[test]
    fn empty_mixin() {
        let library = library(SOURCES);
        let loaded = library.load_shader_source(
            &ShaderSource::Mixin(ShaderMixinSource::new()),
            &[],
            &EngineOptions::default(),
        );
        assert_eq!(MessageKind::EmptyMixin, loaded.log.errors().next().unwrap().kind);
    }

    #[test]
    fn generic_classes_are_cached_per_arguments() {
        let library = library(&[("Scaled", "shader Scaled<float S> { float Get() { return S; } };")]);
        let options = EngineOptions::default();
        let two = ShaderClassSource::with_generics("Scaled", ["2.0"]);
        let three = ShaderClassSource::with_generics("Scaled", ["3.0"]);
        library.load_shader_source(&two.clone().into(), &[], &options);
        library.load_shader_source(&three.clone().into(), &[], &options);

        let two = library.cached(&class_key(&two, &[])).unwrap();
        let three = library.cached(&class_key(&three, &[])).unwrap();
        assert_ne!(two.name(), three.name());
        assert_eq!(two.source_hash, three.source_hash);
    }
}
