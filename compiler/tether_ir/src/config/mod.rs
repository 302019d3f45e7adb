//! Binding configuration.
//!
//! The manifest is a TOML file describing one bound library: its naming
//! tables, which declarations to leave out, and the structural special cases
//! that cannot be inferred from the IR (array+count names, owned buffers,
//! byte-range structs, tuple-shaped structs). It is loaded once and never
//! mutated while generating.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::naming::LibraryNamingConfig;
use crate::{Declaration, Module, OwnedBuffer};

/// Error loading a binding manifest.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindingConfig {
    pub naming: LibraryNamingConfig,
    pub filter: FilterConfig,
    pub types: TypeConfig,
    pub owned_buffers: Vec<OwnedBufferConfig>,
    pub dummy_backend: Option<DummyBackendConfig>,
    pub output: OutputConfig,
}

/// Declarations omitted from generation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Never generated.
    pub skip: Vec<String>,
    /// Hand-written elsewhere; omitted but otherwise treated as known.
    pub manual: Vec<String>,
    /// Structs with no generated bindings.
    pub skip_structs: Vec<String>,
}

/// Type-level special cases.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeConfig {
    /// Struct types known to the embedding library but absent from the IR.
    pub basic_structs: Vec<String>,
    /// Enum types known to the embedding library but absent from the IR.
    pub basic_enums: Vec<String>,
    /// Typedef name → underlying spelling.
    pub aliases: BTreeMap<String, String>,
    /// Names starting with one of these are plain `int` typedefs.
    pub integer_typedef_prefixes: Vec<String>,
    /// Integer parameter names that pair with a preceding array pointer.
    pub count_param_names: Vec<String>,
    /// `"Function.param"` → element count for pointers that are really
    /// fixed-size arrays.
    pub array_params: BTreeMap<String, usize>,
    /// Structs marshaled as positional sequences. Entries are `"field"` or
    /// `"field:type"`.
    pub tuple_structs: BTreeMap<String, Vec<String>>,
    /// Structs that also accept raw bytes.
    pub byte_range_structs: BTreeMap<String, ByteRangeConfig>,
    /// `"Struct.field"` entries whose nested fields are exposed directly.
    pub flatten_fields: Vec<String>,
}

impl Default for TypeConfig {
    fn default() -> Self {
        Self {
            basic_structs: Vec::new(),
            basic_enums: Vec::new(),
            aliases: BTreeMap::new(),
            integer_typedef_prefixes: Vec::new(),
            count_param_names: vec!["count".to_string()],
            array_params: BTreeMap::new(),
            tuple_structs: BTreeMap::new(),
            byte_range_structs: BTreeMap::new(),
            flatten_fields: Vec::new(),
        }
    }
}

/// Pointer/size field names of a byte-range struct.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ByteRangeConfig {
    pub pointer: String,
    pub size: String,
}

impl Default for ByteRangeConfig {
    fn default() -> Self {
        Self {
            pointer: "ptr".to_string(),
            size: "size".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnedBufferConfig {
    #[serde(rename = "struct")]
    pub struct_name: String,
    pub pointer: String,
    pub count: String,
}

/// Stub branch compiled in when the native library is built without a
/// backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyBackendConfig {
    pub guard: String,
    /// Function name prefixes the stub applies to. Empty means all.
    pub prefixes: Vec<String>,
    /// Function name → literal returned instead of the zero value.
    pub returns: BTreeMap<String, String>,
}

impl DummyBackendConfig {
    pub fn applies_to(&self, function: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| function.starts_with(p.as_str()))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    C,
    Cpp,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    /// `luaopen_*` returning a fresh library table.
    #[default]
    Module,
    /// `void name(lua_State*, int)` filling an existing table.
    IntoTable,
}

/// A hand-written wrapper appended to the registration table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraRegistration {
    pub name: String,
    pub function: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub language: Language,
    pub includes: Vec<String>,
    pub export_macro: String,
    pub registration: Registration,
    /// Native `void sink(const char* site, const char* message)` receiving
    /// callback failures.
    pub callback_error_sink: Option<String>,
    pub extra_registrations: Vec<ExtraRegistration>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            language: Language::C,
            includes: Vec::new(),
            export_macro: "TETHER_API".to_string(),
            registration: Registration::Module,
            callback_error_sink: None,
            extra_registrations: Vec::new(),
        }
    }
}

impl BindingConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: BindingConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for key in self.types.array_params.keys() {
            if !key.contains('.') {
                return Err(ConfigError::Invalid(format!(
                    "array_params key '{key}' must be 'Function.param'"
                )));
            }
        }
        for key in &self.types.flatten_fields {
            if !key.contains('.') {
                return Err(ConfigError::Invalid(format!(
                    "flatten_fields entry '{key}' must be 'Struct.field'"
                )));
            }
        }
        if let Some(dummy) = &self.dummy_backend {
            if dummy.guard.is_empty() {
                return Err(ConfigError::Invalid("dummy_backend.guard is empty".to_string()));
            }
        }
        Ok(())
    }

    /// Whether a declaration is left out of generation.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.filter.skip.iter().any(|s| s == name) || self.filter.manual.iter().any(|s| s == name)
    }

    pub fn is_struct_skipped(&self, name: &str) -> bool {
        self.is_excluded(name) || self.filter.skip_structs.iter().any(|s| s == name)
    }

    pub fn is_count_name(&self, name: &str) -> bool {
        self.types.count_param_names.iter().any(|c| c == name)
    }

    /// Fixed element count of a pointer parameter, if configured.
    pub fn array_param_size(&self, function: &str, param: &str) -> Option<usize> {
        self.types.array_params.get(&format!("{function}.{param}")).copied()
    }

    /// Nested struct fields of `struct_name` whose members are flattened.
    pub fn flattened_fields(&self, struct_name: &str) -> Vec<&str> {
        self.types
            .flatten_fields
            .iter()
            .filter_map(|entry| entry.split_once('.'))
            .filter(|(s, _)| *s == struct_name)
            .map(|(_, f)| f)
            .collect()
    }

    /// Attach owned-buffer markers to the structs they name.
    ///
    /// Entries naming a struct absent from the module are ignored; entries
    /// naming a missing field are an error.
    pub fn attach_owned_buffers(&self, module: &mut Module) -> Result<(), ConfigError> {
        for entry in &self.owned_buffers {
            let Some(decl) = module.decls.iter_mut().find_map(|d| match d {
                Declaration::Struct(s) if s.name == entry.struct_name => Some(s),
                _ => None,
            }) else {
                tracing::debug!(name = %entry.struct_name, "owned buffer struct not in module");
                continue;
            };
            for field in [&entry.pointer, &entry.count] {
                if decl.field(field).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "owned buffer field '{}.{field}' does not exist",
                        entry.struct_name
                    )));
                }
            }
            decl.owned_buffers.push(OwnedBuffer {
                pointer_field: entry.pointer.clone(),
                count_field: entry.count.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
