//! Generation context.
//!
//! The `GenContext` bundles the read-only inputs every generator needs: the
//! binding configuration, the naming tables, the classifier and the module
//! being generated. Nothing in it changes during a run.

use rustc_hash::FxHashMap;

use tether_ir::{
    BindingConfig, ByteRangeConfig, Language, LibraryNamingConfig, Module, Param, StructDecl,
};
use tether_types::{Category, Classifier, StructShape, TypeClassification};

use crate::CodegenError;

/// Fallback spelling of tuple members listed without a type.
const DEFAULT_TUPLE_MEMBER_TYPE: &str = "float";

/// One positional member of a tuple-shaped struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleMember {
    pub field: String,
    pub raw: String,
}

pub struct GenContext<'a> {
    pub config: &'a BindingConfig,
    pub naming: &'a LibraryNamingConfig,
    pub classifier: &'a Classifier,
    pub module: &'a Module,
    /// Structs of this module that get userdata bindings.
    bound: FxHashMap<&'a str, &'a StructDecl>,
}

impl<'a> GenContext<'a> {
    pub fn new(
        module: &'a Module,
        config: &'a BindingConfig,
        naming: &'a LibraryNamingConfig,
        classifier: &'a Classifier,
    ) -> Self {
        let mut bound = FxHashMap::default();
        for decl in module.structs() {
            if config.is_struct_skipped(&decl.name) {
                continue;
            }
            let userdata = matches!(
                classifier.classify(&decl.name),
                Category::StructValue {
                    shape: StructShape::Userdata | StructShape::ByteRange,
                    ..
                }
            );
            if userdata {
                bound.entry(decl.name.as_str()).or_insert(decl);
            }
        }
        Self {
            config,
            naming,
            classifier,
            module,
            bound,
        }
    }

    #[inline]
    pub fn classify(&self, raw: &str) -> Category {
        self.classifier.classify(raw)
    }

    /// Whether the callee writes `param` and the script gets it back.
    pub fn is_output(&self, param: &Param) -> bool {
        self.classifier.is_output(&param.ty, param.marked_out())
    }

    #[inline]
    pub fn is_cpp(&self) -> bool {
        self.config.output.language == Language::Cpp
    }

    pub fn null(&self) -> &'static str {
        if self.is_cpp() {
            "nullptr"
        } else {
            "NULL"
        }
    }

    /// Initializer giving a freshly declared local of this category a zero
    /// value.
    pub fn zero_init(&self, category: &Category) -> &'static str {
        match category {
            Category::Bool => "false",
            Category::Integer(_) | Category::Float(_) => "0",
            Category::Enum(_) if !self.is_cpp() => "0",
            Category::CString
            | Category::OpaquePointer { .. }
            | Category::Pointer { .. }
            | Category::StructPointer { .. }
            | Category::Callback { .. } => self.null(),
            _ if self.is_cpp() => "{}",
            _ => "{0}",
        }
    }

    /// Zero value as a single expression, when the category has one.
    ///
    /// Aggregates have none; callers declare a zeroed local instead.
    pub fn zero_literal(&self, category: &Category, value_type: &str) -> Option<String> {
        match category {
            Category::Bool => Some("false".to_string()),
            Category::Integer(_) | Category::Float(_) => Some("0".to_string()),
            Category::Enum(_) => Some(format!("({value_type})0")),
            Category::CString
            | Category::OpaquePointer { .. }
            | Category::Pointer { .. }
            | Category::StructPointer { .. } => Some(self.null().to_string()),
            _ => None,
        }
    }

    /// Registry key of a struct's metatable.
    pub fn metatable(&self, native: &str) -> String {
        self.naming.metatable_name(native)
    }

    /// The declaration of a struct that has userdata bindings in this
    /// module.
    pub fn bound_struct(&self, name: &str) -> Option<&'a StructDecl> {
        self.bound.get(name).copied()
    }

    /// Whether `tether_to_<name>` and `l_<name>_new` exist in the output.
    pub fn has_bindings(&self, name: &str) -> bool {
        self.bound.contains_key(name)
    }

    /// Drop structs whose bindings could not be generated, so no other
    /// chunk references their constructor or converter.
    pub fn exclude_bindings<'n>(&mut self, names: impl IntoIterator<Item = &'n str>) {
        for name in names {
            self.bound.remove(name);
        }
    }

    pub fn byte_range(&self, name: &str) -> Option<&'a ByteRangeConfig> {
        self.config.types.byte_range_structs.get(name)
    }

    /// Native call expression with the configured qualifier.
    pub fn call_name(&self, native: &str) -> String {
        format!("{}{native}", self.naming.call_prefix)
    }

    /// Positional members of a tuple-shaped struct.
    ///
    /// Entries spelled `"field:type"` carry their type; bare `"field"`
    /// entries take the type from the struct declaration, or `float`.
    pub fn tuple_members(&self, name: &str) -> Result<Vec<TupleMember>, CodegenError> {
        let Some(entries) = self.config.types.tuple_structs.get(name) else {
            return Err(CodegenError::tuple(name, "no member list configured"));
        };
        if entries.is_empty() {
            return Err(CodegenError::tuple(name, "member list is empty"));
        }
        let decl = self.module.find_struct(name);
        entries
            .iter()
            .map(|entry| {
                let (field, raw) = match entry.split_once(':') {
                    Some((field, raw)) => (field.trim(), raw.trim().to_string()),
                    None => {
                        let field = entry.trim();
                        let raw = decl
                            .and_then(|d| d.field(field))
                            .map_or_else(|| DEFAULT_TUPLE_MEMBER_TYPE.to_string(), |f| f.ty.clone());
                        (field, raw)
                    }
                };
                if field.is_empty() {
                    return Err(CodegenError::tuple(name, format!("empty member in '{entry}'")));
                }
                Ok(TupleMember {
                    field: field.to_string(),
                    raw,
                })
            })
            .collect()
    }
}
