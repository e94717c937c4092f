use glob::glob;
use shadermix::engine::{EngineOptions, MixinEngine};
use shadermix::preprocess::ShaderSourceManager;
use shadermix::ShaderSource;

#[test]
fn every_fixture_analyzes() {
    let engine = MixinEngine::new(
        ShaderSourceManager::with_lookup_directories(["../test/shaders"]),
        EngineOptions::default().allow_non_instantiated_generics(true),
    );

    let mut checked = 0;
    for entry in glob("../test/shaders/*.mxsl").unwrap() {
        let path = entry.unwrap();
        let name = path.file_stem().unwrap().to_str().unwrap();
        let result = engine.parse_and_analyze(&ShaderSource::class(name), &[]);
        if name == "Broken" {
            assert!(result.has_errors(), "{name} analyzed cleanly");
        } else {
            assert!(!result.has_errors(), "{name}:\n{}", result.log);
        }
        assert!(result.hash_sources.contains_key(name));
        checked += 1;
    }
    assert!(checked >= 9, "only {checked} fixtures were found");
}
