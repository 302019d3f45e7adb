use pretty_assertions::assert_eq;

use super::*;
use crate::{Field, KeywordPolicy, StructDecl};

const BOX2D: &str = r#"
[naming]
module = "b2d"
prefix = "b2"
metatable_namespace = "b2d"
keyword_policy = "rename"

[filter]
skip = ["b2World_Explode"]
manual = ["b2World_CastRay"]
skip_structs = ["b2Vec2"]

[types]
basic_structs = ["b2Vec2", "b2Rot"]
count_param_names = ["count", "pointCount"]
tuple_structs = { b2Vec2 = ["x", "y"], b2Transform = ["p:b2Vec2", "q:b2Rot"] }
flatten_fields = ["b2RevoluteJointDef.base"]

[types.array_params]
"b2MakePolygon.points" = 8

[types.byte_range_structs.b2Bytes]
pointer = "data"

[[owned_buffers]]
struct = "b2ChainDef"
pointer = "points"
count = "count"

[dummy_backend]
guard = "B2_DUMMY"
prefixes = ["b2World_"]
returns = { b2World_IsValid = "true" }

[output]
language = "c"
includes = ["box2d/box2d.h"]
registration = "into_table"
callback_error_sink = "b2_log_error"
"#;

// ── Parsing ─────────────────────────────────────────────────────

#[test]
fn parses_full_manifest() {
    let config = BindingConfig::from_toml_str(BOX2D).unwrap();

    assert_eq!(config.naming.module, "b2d");
    assert_eq!(config.naming.keyword_policy, KeywordPolicy::Rename);
    assert!(config.is_excluded("b2World_Explode"));
    assert!(config.is_excluded("b2World_CastRay"));
    assert!(config.is_struct_skipped("b2Vec2"));
    assert!(config.is_count_name("pointCount"));
    assert_eq!(config.array_param_size("b2MakePolygon", "points"), Some(8));
    assert_eq!(config.array_param_size("b2MakePolygon", "radius"), None);
    assert_eq!(config.flattened_fields("b2RevoluteJointDef"), vec!["base"]);
    assert_eq!(config.output.registration, Registration::IntoTable);
    assert_eq!(config.output.callback_error_sink.as_deref(), Some("b2_log_error"));

    let range = &config.types.byte_range_structs["b2Bytes"];
    assert_eq!(range.pointer, "data");
    assert_eq!(range.size, "size");

    let dummy = config.dummy_backend.as_ref().unwrap();
    assert!(dummy.applies_to("b2World_Step"));
    assert!(!dummy.applies_to("b2Body_GetPosition"));
}

#[test]
fn empty_manifest_uses_defaults() {
    let config = BindingConfig::from_toml_str("").unwrap();

    assert_eq!(config.types.count_param_names, vec!["count"]);
    assert_eq!(config.output.language, Language::C);
    assert_eq!(config.output.export_macro, "TETHER_API");
    assert_eq!(config.output.registration, Registration::Module);
    assert!(config.dummy_backend.is_none());
}

#[test]
fn unknown_keys_are_rejected() {
    let err = BindingConfig::from_toml_str("[naming]\nmodul = \"x\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn malformed_array_param_key_is_rejected() {
    let err = BindingConfig::from_toml_str("[types.array_params]\ncol = 3\n").unwrap_err();
    assert!(err.to_string().contains("Function.param"), "{err}");
}

#[test]
fn empty_dummy_guard_is_rejected() {
    let err = BindingConfig::from_toml_str("[dummy_backend]\nprefixes = [\"sg_\"]\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn dummy_backend_without_prefixes_applies_everywhere() {
    let dummy = DummyBackendConfig {
        guard: "X".to_string(),
        ..DummyBackendConfig::default()
    };
    assert!(dummy.applies_to("anything"));
}

// ── Owned buffers ───────────────────────────────────────────────

fn chain_module() -> Module {
    Module {
        decls: vec![Declaration::Struct(StructDecl::new(
            "b2ChainDef",
            vec![
                Field::new("points", "const b2Vec2 *"),
                Field::new("count", "int"),
            ],
        ))],
        ..Module::default()
    }
}

#[test]
fn owned_buffers_attach_to_struct() {
    let config = BindingConfig::from_toml_str(BOX2D).unwrap();
    let mut module = chain_module();
    config.attach_owned_buffers(&mut module).unwrap();

    let chain = module.find_struct("b2ChainDef").unwrap();
    assert_eq!(
        chain.owned_buffers,
        vec![OwnedBuffer {
            pointer_field: "points".to_string(),
            count_field: "count".to_string(),
        }]
    );
    assert!(chain.owned_buffer("points").is_some());
    assert!(chain.owned_buffer("count").is_none());
    assert_eq!(chain.owned_count("count").map(|b| b.pointer_field.as_str()), Some("points"));
    assert!(chain.owned_count("points").is_none());
}

#[test]
fn owned_buffer_with_missing_field_is_an_error() {
    let config = BindingConfig {
        owned_buffers: vec![OwnedBufferConfig {
            struct_name: "b2ChainDef".to_string(),
            pointer: "materials".to_string(),
            count: "materialCount".to_string(),
        }],
        ..BindingConfig::default()
    };
    let mut module = chain_module();
    let err = config.attach_owned_buffers(&mut module).unwrap_err();
    assert!(err.to_string().contains("b2ChainDef.materials"), "{err}");
}

#[test]
fn owned_buffer_for_absent_struct_is_ignored() {
    let config = BindingConfig {
        owned_buffers: vec![OwnedBufferConfig {
            struct_name: "b2Missing".to_string(),
            pointer: "p".to_string(),
            count: "n".to_string(),
        }],
        ..BindingConfig::default()
    };
    let mut module = chain_module();
    config.attach_owned_buffers(&mut module).unwrap();
    assert!(module.find_struct("b2ChainDef").unwrap().owned_buffers.is_empty());
}
