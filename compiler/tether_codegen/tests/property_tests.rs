//! Property-based tests for whole-module generation.
//!
//! Generates libraries of overloaded functions over a pool of parameter
//! spellings and verifies:
//! 1. Idempotence: two runs over the same IR are byte-identical
//! 2. Uniqueness: no script name is registered twice
//! 3. Accounting: every placeholder marker is counted

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::doc_markdown,
    clippy::redundant_closure_for_method_calls,
    reason = "Proptest macros generate code with these patterns"
)]

use proptest::prelude::*;
use rustc_hash::FxHashSet;
use tether_codegen::{generate, GenerationResult, PLACEHOLDER_MARKER};
use tether_ir::{parse_module, BindingConfig, LoadOptions};

const PARAM_TYPES: &[&str] = &[
    "int",
    "unsigned int",
    "float",
    "double",
    "bool",
    "const char *",
    "int *",
    "float *",
    "void *",
    "uint8_t",
    "int64_t",
    "ui_vec2",
    "const ui_style *",
    "void (*)(int)",
    "Opaque<T>",
];

const PREAMBLE: &str = r#"
    { "kind": "struct", "name": "ui_vec2", "fields": [
        { "name": "x", "type": "float" }, { "name": "y", "type": "float" } ] },
    { "kind": "struct", "name": "ui_style", "fields": [
        { "name": "alpha", "type": "float" }, { "name": "rounding", "type": "int" } ] }"#;

const MANIFEST: &str = r#"
[types.tuple_structs]
ui_vec2 = ["x", "y"]

[output]
language = "cpp"
"#;

/// (base name, parameter type indices) per function.
fn library_strategy() -> impl Strategy<Value = Vec<(String, Vec<usize>)>> {
    prop::collection::vec(
        (
            prop_oneof![
                Just("Button".to_string()),
                Just("Text".to_string()),
                Just("End".to_string()),
                "[A-Z][a-z]{2,6}",
            ],
            prop::collection::vec(0..PARAM_TYPES.len(), 0..4),
        ),
        1..8,
    )
}

fn render_ir(functions: &[(String, Vec<usize>)]) -> String {
    let mut decls = vec![PREAMBLE.to_string()];
    for (name, params) in functions {
        let types: Vec<&str> = params.iter().map(|&i| PARAM_TYPES[i]).collect();
        let params_json: Vec<String> = types
            .iter()
            .enumerate()
            .map(|(i, ty)| format!(r#"{{ "name": "p{i}", "type": "{ty}" }}"#))
            .collect();
        let signature = if types.is_empty() {
            "void".to_string()
        } else {
            types.join(", ")
        };
        decls.push(format!(
            r#"{{ "kind": "func", "name": "{name}", "type": "void ({signature})", "params": [{}] }}"#,
            params_json.join(", ")
        ));
    }
    format!(r#"{{ "module": "ui", "prefix": "ui_", "decls": [{}] }}"#, decls.join(",\n"))
}

fn run(ir: &str) -> GenerationResult {
    let options = LoadOptions {
        allow_overloads: true,
    };
    let mut module = parse_module(ir, options).unwrap();
    let config = BindingConfig::from_toml_str(MANIFEST).unwrap();
    config.attach_owned_buffers(&mut module).unwrap();
    generate(&module, &config)
}

/// Script names in the `luaL_Reg` table.
fn registered_names(code: &str) -> Vec<String> {
    let start = code.find("tether_functions[] = {").unwrap();
    let end = start + code[start..].find("};").unwrap();
    code[start..end]
        .lines()
        .filter_map(|line| line.trim().strip_prefix("{\""))
        .filter_map(|rest| rest.split_once('"').map(|(name, _)| name.to_string()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn generation_is_idempotent(functions in library_strategy()) {
        let ir = render_ir(&functions);
        prop_assert_eq!(run(&ir), run(&ir));
    }

    #[test]
    fn registered_names_are_unique(functions in library_strategy()) {
        let result = run(&render_ir(&functions));
        let names = registered_names(&result.code);
        let mut seen = FxHashSet::default();
        for name in &names {
            prop_assert!(seen.insert(name.clone()), "'{}' registered twice", name);
        }
    }

    #[test]
    fn placeholders_are_counted(functions in library_strategy()) {
        let result = run(&render_ir(&functions));
        prop_assert_eq!(
            result.code.matches(PLACEHOLDER_MARKER).count(),
            result.placeholders as usize
        );
    }
}
