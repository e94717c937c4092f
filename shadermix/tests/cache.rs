use rayon::prelude::*;
use shadermix::engine::{EngineOptions, MixinEngine};
use shadermix::preprocess::ShaderSourceManager;
use shadermix::ShaderSource;
use std::str::FromStr;

const LEAF: &str = "shader Leaf { float Value; float Get() { return Value; } };";
const ROOT: &str = "shader Root : Leaf { compose Leaf child; float Sum() { return Get() + child.Get(); } };";

fn engine() -> MixinEngine {
    let mut manager = ShaderSourceManager::new();
    manager.add_virtual_source("Leaf", LEAF);
    manager.add_virtual_source("Root", ROOT);
    MixinEngine::new(manager, EngineOptions::default())
}

#[test]
fn hash_sources_follow_cache_invalidation() {
    let engine = engine();
    let request = ShaderSource::from_str("Root(child=Leaf)").unwrap();

    let first = engine.parse(&request, &[]);
    assert!(!first.has_errors(), "{}", first.log);
    let names: Vec<_> = first.hash_sources.keys().map(String::as_str).collect();
    assert_eq!(vec!["Leaf", "Root"], names);

    // Edits are not seen until the class is evicted.
    engine.source_manager().add_virtual_source(
        "Leaf",
        "shader Leaf { float Value; float Scale; float Get() { return Value * Scale; } };",
    );
    let cached = engine.parse(&request, &[]);
    assert_eq!(first.hash_sources, cached.hash_sources);
    assert_eq!(first.shader, cached.shader);

    engine.delete_obsolete_cache(["Leaf"]);
    let reloaded = engine.parse(&request, &[]);
    assert!(!reloaded.has_errors(), "{}", reloaded.log);
    assert_ne!(first.hash_sources["Leaf"], reloaded.hash_sources["Leaf"]);
    assert_eq!(first.hash_sources["Root"], reloaded.hash_sources["Root"]);
    assert!(reloaded.shader.unwrap().find("Leaf_id1_Scale").is_some());
}

#[test]
fn concurrent_requests_agree() {
    let engine = engine();
    let request = ShaderSource::from_str("Root(child=Leaf)").unwrap();
    let expected = engine.parse(&request, &[]);
    assert!(!expected.has_errors(), "{}", expected.log);

    let results: Vec<_> = (0..32)
        .into_par_iter()
        .map(|i| {
            if i % 8 == 0 {
                engine.delete_obsolete_cache(["Root"]);
            }
            engine.parse(&request, &[])
        })
        .collect();

    for result in results {
        assert!(!result.has_errors(), "{}", result.log);
        assert_eq!(expected.shader, result.shader);
        assert_eq!(expected.reflection, result.reflection);
    }
}
