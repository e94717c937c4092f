use shadermix::back::{HlslWriter, WriteShader};
use shadermix::engine::{EngineOptions, MessageKind, MixinEngine};
use shadermix::preprocess::ShaderSourceManager;
use shadermix::reflect::{BindingKind, TextureAddressMode, TextureFilter, GLOBALS_BUFFER};
use shadermix::{ShaderMacro, ShaderSource, ShaderStage};
use std::str::FromStr;

fn engine() -> MixinEngine {
    MixinEngine::new(
        ShaderSourceManager::with_lookup_directories(["../test/shaders"]),
        EngineOptions::default(),
    )
}

fn source(text: &str) -> ShaderSource {
    ShaderSource::from_str(text).unwrap()
}

#[test]
fn composes_a_single_light() {
    let result = engine().parse(&source("Shading(light=PointLight)"), &[]);
    assert!(!result.has_errors(), "{}", result.log);

    let shader = result.shader.unwrap();
    assert!(shader.find("PointLight_id1_Radius").is_some());
    assert!(shader.find("PointLight_id1_Compute").is_some());
    assert!(shader.find("PointLight_id2_Radius").is_none());

    let reflection = result.reflection.unwrap();
    let globals = reflection.constant_buffer(GLOBALS_BUFFER).unwrap();
    let keys: Vec<_> = globals.members.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(
        vec![
            "LightBase.Color.light",
            "PointLight.Position.light",
            "PointLight.Radius.light",
        ],
        keys
    );
}

#[test]
fn array_compositions_keep_their_order() {
    let result = engine().parse(
        &source("Shading(light=PointLight, lights=[DirectionalLight, PointLight])"),
        &[],
    );
    assert!(!result.has_errors(), "{}", result.log);

    let reflection = result.reflection.unwrap();
    let globals = reflection.constant_buffer(GLOBALS_BUFFER).unwrap();
    let raw_name = |key: &str| {
        globals
            .members
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.raw_name.as_str())
    };
    assert_eq!(
        Some("DirectionalLight_id2_Direction"),
        raw_name("DirectionalLight.Direction.lights[0]")
    );
    assert_eq!(
        Some("PointLight_id3_Radius"),
        raw_name("PointLight.Radius.lights[1]")
    );
}

#[test]
fn every_composition_is_its_own_instance() {
    let result = engine().parse(
        &source("Shading(light=PointLight, lights=[PointLight, PointLight])"),
        &[],
    );
    assert!(!result.has_errors(), "{}", result.log);
    let shader = result.shader.unwrap();
    for name in [
        "PointLight_id1_Radius",
        "PointLight_id2_Radius",
        "PointLight_id3_Radius",
    ] {
        assert!(shader.find(name).is_some(), "{name} was not emitted");
    }
}

#[test]
fn compiling_twice_gives_the_same_shader() {
    let engine = engine();
    let request = source("Shading(light=DirectionalLight, lights=[PointLight])");
    let first = engine.parse(&request, &[]);
    let second = engine.parse(&request, &[]);
    assert!(!first.has_errors(), "{}", first.log);
    assert_eq!(first.shader, second.shader);
    assert_eq!(first.reflection, second.reflection);
    assert_eq!(first.entry_points, second.entry_points);
    assert_eq!(first.hash_sources, second.hash_sources);
}

#[test]
fn vertex_and_pixel_entry_points() {
    let result = engine().parse(&source("Shading(light=PointLight)"), &[]);
    assert_eq!(
        vec![
            (ShaderStage::Vertex, "VSMain".to_string()),
            (ShaderStage::Pixel, "PSMain".to_string()),
        ],
        result.entry_points.into_iter().collect::<Vec<_>>()
    );
}

#[test]
fn compute_entry_points_hide_other_stages() {
    let result = engine().parse(&ShaderSource::class("ComputeEffect"), &[]);
    assert!(!result.has_errors(), "{}", result.log);
    assert_eq!(
        vec![(ShaderStage::Compute, "CSMain".to_string())],
        result.entry_points.into_iter().collect::<Vec<_>>()
    );
    let reflection = result.reflection.unwrap();
    let output = reflection.binding("ComputeEffect.Output").unwrap();
    assert_eq!((BindingKind::UnorderedAccess, 0), (output.kind, output.slot));
}

#[test]
fn semantic_errors_stop_the_request() {
    let result = engine().parse(&ShaderSource::class("Broken"), &[]);
    assert!(result.has_errors());
    assert!(result.shader.is_none());
    assert!(result.reflection.is_none());
    assert!(result.entry_points.is_empty());
    assert_eq!(
        MessageKind::UnresolvedIdentifier("Undeclared".into()),
        result.log.errors().next().unwrap().kind
    );
}

#[test]
fn missing_classes_are_reported() {
    let result = engine().parse(&source("Shading(light=SpotLight)"), &[]);
    assert!(result.shader.is_none());
    assert!(result
        .log
        .errors()
        .any(|e| e.kind == MessageKind::ShaderNotFound("SpotLight".into())));
}

#[test]
fn unknown_slots_only_warn() {
    let result = engine().parse(&source("Shading(light=PointLight, albedo=PointLight)"), &[]);
    assert!(!result.has_errors(), "{}", result.log);
    assert!(result.shader.is_some());
    assert_eq!(
        MessageKind::UnknownCompositionSlot {
            class: "Shading".into(),
            slot: "albedo".into()
        },
        result.log.warnings().next().unwrap().kind
    );

    let quiet = MixinEngine::new(
        ShaderSourceManager::with_lookup_directories(["../test/shaders"]),
        EngineOptions::default().warn_on_unknown_composition(false),
    );
    let result = quiet.parse(&source("Shading(light=PointLight, albedo=PointLight)"), &[]);
    assert!(result.log.is_empty(), "{}", result.log);
}

#[test]
fn generic_arguments_are_substituted() {
    let engine = engine();
    let result = engine.parse(&source("Blur<4, 0.5>"), &[]);
    assert!(!result.has_errors(), "{}", result.log);
    let text = HlslWriter::new().write(&result.shader.unwrap()).unwrap();
    assert!(text.contains("i < 4"), "{text}");
    assert!(text.contains("i * 0.5"), "{text}");

    let result = engine.parse(&source("Blur"), &[]);
    assert!(result
        .log
        .errors()
        .any(|e| matches!(e.kind, MessageKind::WrongGenericNumber { .. })));
}

#[test]
fn macros_select_branches() {
    let engine = engine();
    let request = ShaderSource::class("Fog");
    let plain = engine.parse(&request, &[]).shader.unwrap();
    let dense = engine
        .parse(&request, &[ShaderMacro::new("FOG_MODE", 2)])
        .shader
        .unwrap();

    let plain = HlslWriter::new().write(&plain).unwrap();
    let dense = HlslWriter::new().write(&dense).unwrap();
    assert!(plain.contains("float Density;"), "{plain}");
    assert!(dense.contains("float Density = 2.0;"), "{dense}");
}

#[test]
fn reflects_resources_and_samplers() {
    let result = engine().parse(&source("Shading(light=PointLight)"), &[]);
    let reflection = result.reflection.unwrap();

    let albedo = reflection.binding("Shading.Albedo").unwrap();
    assert_eq!((BindingKind::ShaderResource, 0), (albedo.kind, albedo.slot));
    assert_eq!("Albedo", albedo.raw_name);

    let sampler = &reflection.sampler_states[0];
    assert_eq!("Shading.LinearSampler", sampler.key);
    assert_eq!(TextureFilter::Linear, sampler.description.filter);
    assert_eq!(TextureAddressMode::Wrap, sampler.description.address_u);
    assert_eq!(TextureAddressMode::Wrap, sampler.description.address_v);
    assert_eq!(TextureAddressMode::Clamp, sampler.description.address_w);

    let material = reflection.constant_buffer("PerMaterial").unwrap();
    let layout: Vec<_> = material
        .members
        .iter()
        .map(|m| (m.key.as_str(), m.offset))
        .collect();
    assert_eq!(vec![("Shading.Tint", 0), ("Shading.Roughness", 16)], layout);
    assert_eq!(32, material.size);
    assert_eq!(1, reflection.binding("PerMaterial").unwrap().slot);
}

#[test]
fn linked_shaders_are_clean() {
    let result = engine().parse(&source("Shading(light=PointLight, lights=[PointLight])"), &[]);
    let reflection = result.reflection.unwrap();
    let shader = result.shader.unwrap();
    let text = HlslWriter::with_reflection(&reflection)
        .write(&shader)
        .unwrap();

    for keyword in ["compose ", "stage ", "stream ", "override ", "[Link", "[Color", "foreach"] {
        assert!(!text.contains(keyword), "`{keyword}` left in\n{text}");
    }
    assert!(text.contains("Texture2D<float4> Albedo : register(t0);"), "{text}");
    assert!(text.contains("cbuffer PerMaterial : register(b1)"), "{text}");
    assert!(text.contains("static float3 streams_Normal;"), "{text}");
}

#[test]
fn streams_are_passed_between_stages() {
    let result = engine().parse(&source("Shading(light=PointLight)"), &[]);
    assert!(!result.has_errors(), "{}", result.log);
    let text = HlslWriter::new().write(&result.shader.unwrap()).unwrap();

    for line in [
        "struct VS_INPUT",
        "float4 Position : POSITION;",
        "struct VS_OUTPUT",
        "float4 ShadingPosition : SV_Position;",
        "float3 Normal : NORMAL;",
        "struct PS_OUTPUT",
        "float4 ColorTarget : SV_Target0;",
        "VS_OUTPUT VSMain(VS_INPUT __input__)",
        "PS_OUTPUT PSMain(VS_OUTPUT __input__)",
        "streams_ShadingPosition = __input__.ShadingPosition;",
        "__output__.ColorTarget = streams_ColorTarget;",
        "return __output__;",
    ] {
        assert!(text.contains(line), "`{line}` missing from\n{text}");
    }
    assert!(!text.contains("PS_INPUT"), "{text}");
}

#[test]
fn oversized_parameters_fail_without_panicking() {
    let mut manager = ShaderSourceManager::new();
    manager.add_virtual_source(
        "Huge",
        "shader Huge { float W[300000000]; struct A { A next; }; A v; };",
    );
    let engine = MixinEngine::new(manager, EngineOptions::default());
    let result = engine.parse(&ShaderSource::class("Huge"), &[]);
    assert!(result.shader.is_none());
    let kinds: Vec<_> = result.log.errors().map(|e| e.kind.clone()).collect();
    assert_eq!(
        vec![
            MessageKind::ParameterTooLarge("W".into()),
            MessageKind::RecursiveStruct("A".into()),
        ],
        kinds
    );
}
