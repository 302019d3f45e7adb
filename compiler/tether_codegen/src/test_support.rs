//! Shared fixtures for unit tests.

use tether_ir::{parse_module, BindingConfig, FunctionDecl, LoadOptions, Module, StructDecl};
use tether_types::{Classifier, TypeIndex};

use crate::context::GenContext;

/// A small library exercising every category.
pub const DEMO_IR: &str = r#"{
  "module": "demo",
  "prefix": "demo_",
  "decls": [
    { "kind": "struct", "name": "demo_vec2", "fields": [
        { "name": "x", "type": "float" },
        { "name": "y", "type": "float" }
    ]},
    { "kind": "struct", "name": "demo_range", "fields": [
        { "name": "ptr", "type": "const void *" },
        { "name": "size", "type": "size_t" }
    ]},
    { "kind": "struct", "name": "demo_color", "fields": [
        { "name": "r", "type": "float" },
        { "name": "g", "type": "float" },
        { "name": "b", "type": "float" },
        { "name": "a", "type": "float" }
    ]},
    { "kind": "enum", "name": "demo_mode", "items": [
        { "name": "DEMO_MODE_FILL" },
        { "name": "DEMO_MODE_LINE" },
        { "name": "DEMO_MODE_POINT", "value": 8 }
    ]},
    { "kind": "struct", "name": "demo_desc", "fields": [
        { "name": "enabled", "type": "bool" },
        { "name": "width", "type": "int" },
        { "name": "scale", "type": "float" },
        { "name": "label", "type": "const char *" },
        { "name": "mode", "type": "demo_mode" },
        { "name": "clear", "type": "demo_color" },
        { "name": "origin", "type": "demo_vec2" },
        { "name": "data", "type": "demo_range" },
        { "name": "slots", "type": "int[4]" },
        { "name": "user_data", "type": "void *" },
        { "name": "handle", "type": "ImVector<int>" },
        { "name": "on_frame", "type": "void (*)(void *)" },
        { "name": "on_event", "type": "bool (*)(const demo_desc *, int)" },
        { "name": "logger", "type": "void (*)(const char *, ...)" }
    ]},
    { "kind": "struct", "name": "demo_path", "fields": [
        { "name": "points", "type": "demo_vec2 *" },
        { "name": "count", "type": "int" }
    ]},
    { "kind": "consts", "items": [
        { "name": "DEMO_MAX_SLOTS", "value": 4 },
        { "name": "DEMO_INVALID_ID", "value": 0 }
    ]},
    { "kind": "func", "name": "demo_setup", "type": "void (const demo_desc *)",
      "params": [ { "name": "desc", "type": "const demo_desc *" } ] },
    { "kind": "func", "name": "demo_checkbox", "type": "bool (const char *, bool *)",
      "params": [
        { "name": "label", "type": "const char *" },
        { "name": "v", "type": "bool *" }
      ] },
    { "kind": "func", "name": "demo_get_size", "type": "bool (int *, int *)",
      "params": [
        { "name": "w", "type": "int *" },
        { "name": "h", "type": "int *" }
      ] },
    { "kind": "func", "name": "demo_draw_lines", "type": "void (const demo_vec2 *, int)",
      "params": [
        { "name": "points", "type": "const demo_vec2 *" },
        { "name": "count", "type": "int" }
      ] },
    { "kind": "func", "name": "demo_color_edit", "type": "bool (const char *, float *)",
      "params": [
        { "name": "label", "type": "const char *" },
        { "name": "col", "type": "float *" }
      ] },
    { "kind": "func", "name": "demo_length", "type": "float (demo_vec2)",
      "params": [ { "name": "v", "type": "demo_vec2" } ] },
    { "kind": "func", "name": "demo_query_desc", "type": "demo_desc (void)", "params": [] },
    { "kind": "func", "name": "demo_set_mode", "type": "void (demo_mode, int)",
      "params": [
        { "name": "mode", "type": "demo_mode" },
        { "name": "flags", "type": "int", "has_default": true }
      ] },
    { "kind": "func", "name": "demo_end", "type": "void (void)", "params": [] },
    { "kind": "func", "name": "demo_log", "type": "void (const char *, ...)",
      "params": [ { "name": "fmt", "type": "const char *" } ] },
    { "kind": "func", "name": "demo_mystery", "type": "ImVector<int> (ImVector<int>)",
      "params": [ { "name": "v", "type": "ImVector<int>" } ] }
  ]
}"#;

pub const DEMO_MANIFEST: &str = r#"
[naming]
metatable_namespace = "demo"

[types]
array_params = { "demo_color_edit.col" = 3 }

[types.tuple_structs]
demo_vec2 = ["x", "y"]

[types.byte_range_structs]
demo_range = {}

[[owned_buffers]]
struct = "demo_path"
pointer = "points"
count = "count"
"#;

/// Owned inputs a [`GenContext`] borrows from.
pub struct Fixture {
    pub module: Module,
    pub config: BindingConfig,
    pub classifier: Classifier,
}

impl Fixture {
    pub fn new(ir: &str, manifest: &str) -> Self {
        let mut module = parse_module(ir, LoadOptions::default()).unwrap();
        let mut config = BindingConfig::from_toml_str(manifest).unwrap();
        config.naming.fill_from_ir(&module);
        config.attach_owned_buffers(&mut module).unwrap();
        let classifier = Classifier::new(TypeIndex::build(&module, &config));
        Self {
            module,
            config,
            classifier,
        }
    }

    pub fn demo() -> Self {
        Self::new(DEMO_IR, DEMO_MANIFEST)
    }

    /// The demo library bound as C++.
    pub fn demo_cpp() -> Self {
        let manifest = format!("{DEMO_MANIFEST}\n[output]\nlanguage = \"cpp\"\n");
        Self::new(DEMO_IR, &manifest)
    }

    pub fn ctx(&self) -> GenContext<'_> {
        GenContext::new(&self.module, &self.config, &self.config.naming, &self.classifier)
    }

    pub fn function(&self, name: &str) -> &FunctionDecl {
        self.module.functions().find(|f| f.name == name).unwrap()
    }

    pub fn structure(&self, name: &str) -> &StructDecl {
        self.module.find_struct(name).unwrap()
    }
}
