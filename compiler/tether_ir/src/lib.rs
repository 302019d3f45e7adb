//! Declaration IR for the tether FFI generator.
//!
//! The IR is produced by an external header parser as JSON. This crate turns
//! that JSON into typed declarations, resolves enum values, filters
//! dependency-only entries, and deduplicates declarations extracted by
//! multiple passes. It also owns the binding configuration, the static
//! manifest that tells the generator how a particular library is named and
//! which structural special cases apply.
//!
//! # Architecture
//!
//! ```text
//! ir.json ──► load::parse_module ──► Module { decls, dependency_types }
//!                                       │
//! binding.toml ──► BindingConfig ───────┘ (owned buffers attached to structs)
//! ```

mod config;
mod decl;
mod load;
mod naming;

pub use config::{
    BindingConfig, ByteRangeConfig, ConfigError, DummyBackendConfig, ExtraRegistration,
    FilterConfig, Language, OutputConfig, OwnedBufferConfig, Registration, TypeConfig,
};
pub use decl::{
    ConstGroup, Declaration, DeclKind, DependencyType, EnumDecl, EnumItem, Field, FunctionDecl,
    Module, OwnedBuffer, Param, ParamFlags, StructDecl,
};
pub use load::{load_module, parse_module, IrError, LoadOptions};
pub use naming::{
    is_script_keyword, snake_case, KeywordPolicy, LibraryNamingConfig, SCRIPT_KEYWORDS,
};
