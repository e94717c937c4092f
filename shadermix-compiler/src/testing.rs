use crate::analysis::CompilationContext;
use crate::front::MixinParser;
use crate::library::ShaderLibrary;
use crate::options::EngineOptions;
use crate::result::Log;
use crate::source::ShaderSource;
use shadermix_preprocess::ShaderSourceManager;
use std::sync::Arc;

/// A library over virtual sources, for tests that do not need files.
pub(crate) fn library(sources: &[(&str, &str)]) -> ShaderLibrary {
    let mut manager = ShaderSourceManager::new();
    for (name, source) in sources {
        manager.add_virtual_source(*name, *source);
    }
    ShaderLibrary::new(Arc::new(MixinParser), manager)
}

/// Load and analyze `source`, panicking on any error.
pub(crate) fn context(sources: &[(&str, &str)], source: &ShaderSource) -> CompilationContext {
    let library = library(sources);
    let loaded = library.load_shader_source(source, &[], &EngineOptions::default());
    assert!(!loaded.log.has_errors(), "{}", loaded.log);

    let context = CompilationContext::new(loaded.infos, Vec::new(), &[]);
    let mut log = Log::new();
    context.preprocess(&mut log);
    context.analyze_all(&mut log);
    assert!(!log.has_errors(), "{log}");
    context
}
