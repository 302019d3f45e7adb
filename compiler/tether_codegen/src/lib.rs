//! Lua C-API Binding Generator for Tether
//!
//! Turns a loaded [`Module`] plus its [`BindingConfig`] into one C (or C++)
//! translation unit that exposes the library to Lua 5.4, and a LuaCATS stub
//! describing the same surface.
//!
//! # Architecture
//!
//! ```text
//! Module + BindingConfig
//!        ↓
//!   TypeIndex / Classifier   (one Category per raw type string)
//!        ↓
//!   OverloadPlan             (collision-free script names)
//!        ↓
//!   per declaration          structs → enums/consts → functions, IR order
//!        ↓                   failures become inline comments + Problems
//!   module::assemble         (prelude, slots, chunks, registration)
//!        ↓
//!   GenerationResult         (C source + stub + problems)
//! ```
//!
//! Generation is single-threaded and deterministic: identical inputs give
//! byte-identical output.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use tether_ir::{BindingConfig, Declaration, FunctionDecl, Module, StructDecl};
use tether_types::{Classifier, TypeIndex};

pub mod annotations;
pub mod callback;
mod context;
pub mod emitter;
pub mod enums;
mod error;
pub mod function;
pub mod module;
pub mod overload;
pub mod pairing;
pub mod strategy;
pub mod structs;

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod test_support;

pub use context::{GenContext, TupleMember};
pub use emitter::{Emitter, PLACEHOLDER_MARKER};
pub use enums::{ConstBinding, EnumBinding, EnumMember};
pub use error::CodegenError;
pub use function::{FunctionBinding, ScriptArg, ScriptResult};
pub use structs::{FieldBinding, StructBinding};

/// A declaration that was left out of the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Problem {
    /// Native name, or `consts#<index>` for an anonymous constant group.
    pub name: String,
    pub error: CodegenError,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Result of one generation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationResult {
    /// Generated C source.
    pub code: String,
    /// LuaCATS `---@meta` stub.
    pub stubs: String,
    pub problems: Vec<Problem>,
    /// Number of `TETHER_UNSUPPORTED` markers in `code`.
    pub placeholders: u32,
}

impl GenerationResult {
    /// Whether a problem makes the module unusable as a whole.
    pub fn has_hard_problems(&self) -> bool {
        self.problems.iter().any(|p| p.error.is_hard())
    }
}

/// Generate the bindings of `module`.
///
/// The configuration's owned buffers must already be attached to the
/// module (see [`BindingConfig::attach_owned_buffers`]). Declarations that
/// fail are replaced by a comment and reported in
/// [`GenerationResult::problems`]; the run itself never fails.
#[tracing::instrument(level = "info", skip_all, fields(decls = module.decls.len()))]
pub fn generate(module: &Module, config: &BindingConfig) -> GenerationResult {
    let mut naming = config.naming.clone();
    naming.fill_from_ir(module);
    let classifier = Classifier::new(TypeIndex::build(module, config));
    let mut ctx = GenContext::new(module, config, &naming, &classifier);

    let mut settled = settle_struct_bindings(&mut ctx);

    let functions: Vec<(usize, &FunctionDecl)> = module
        .decls
        .iter()
        .enumerate()
        .filter_map(|(index, decl)| match decl {
            Declaration::Function(f) if is_generated_function(config, f) => Some((index, f)),
            _ => None,
        })
        .collect();
    let plan = overload::OverloadPlan::build(&ctx, &functions);

    let bound: Vec<&StructDecl> = module
        .structs()
        .filter(|s| settled.generated.contains_key(s.name.as_str()))
        .filter(|s| ctx.bound_struct(&s.name).is_some_and(|b| std::ptr::eq(b, *s)))
        .collect();
    let slots = callback::collect_slots(&ctx, &bound);

    let mut chunks = Vec::new();
    let mut problems = Vec::new();
    let mut function_bindings = Vec::new();
    let mut struct_bindings = Vec::new();
    let mut enum_bindings = Vec::new();
    let mut const_bindings = Vec::new();
    let mut seen: FxHashSet<&str> = FxHashSet::default();

    let mut fail = |chunks: &mut Vec<Emitter>, name: String, error: CodegenError| {
        chunks.push(problem_comment(&name, &error));
        problems.push(Problem { name, error });
    };

    for (index, decl) in module.decls.iter().enumerate() {
        match decl {
            Declaration::Struct(s) => {
                if !seen.insert(&s.name) {
                    continue;
                }
                if let Some(error) = settled.failures.remove(s.name.as_str()) {
                    fail(&mut chunks, s.name.clone(), error);
                } else if let Some((chunk, binding)) = settled.generated.remove(s.name.as_str()) {
                    chunks.push(chunk);
                    struct_bindings.push(binding);
                } else {
                    tracing::debug!(name = %s.name, "struct has no userdata bindings");
                }
            }
            Declaration::Enum(e) => {
                if config.is_excluded(&e.name) || !seen.insert(&e.name) {
                    tracing::debug!(name = %e.name, "skipping enum");
                    continue;
                }
                match enums::generate_enum(&ctx, e) {
                    Ok((chunk, binding)) => {
                        chunks.push(chunk);
                        enum_bindings.push(binding);
                    }
                    Err(error) => fail(&mut chunks, e.name.clone(), error),
                }
            }
            Declaration::ConstGroup(group) => match enums::generate_consts(&ctx, group, index) {
                Ok((chunk, binding)) => {
                    chunks.push(chunk);
                    const_bindings.push(binding);
                }
                Err(error) => fail(&mut chunks, format!("consts#{index}"), error),
            },
            Declaration::Function(f) => {
                let Some(names) = plan.names(index) else {
                    tracing::debug!(name = %f.name, "skipping function");
                    continue;
                };
                let generated = names
                    .clone()
                    .and_then(|names| function::generate_function(&ctx, f, &names));
                match generated {
                    Ok((chunk, binding)) => {
                        chunks.push(chunk);
                        function_bindings.push(binding);
                    }
                    Err(error) => fail(&mut chunks, f.name.clone(), error),
                }
            }
        }
    }

    let stubs = annotations::render_stubs(
        &ctx,
        &annotations::StubInput {
            functions: &function_bindings,
            structs: &struct_bindings,
            enums: &enum_bindings,
            consts: &const_bindings,
        },
    );
    let mut out = module::assemble(
        &ctx,
        module::Assembly {
            slots: &slots,
            chunks,
            functions: &function_bindings,
            structs: &struct_bindings,
            enums: &enum_bindings,
            consts: &const_bindings,
        },
    );

    let placeholders = out.placeholders();
    tracing::info!(
        functions = function_bindings.len(),
        structs = struct_bindings.len(),
        enums = enum_bindings.len(),
        problems = problems.len(),
        placeholders,
        "generation finished"
    );
    GenerationResult {
        code: out.take_output(),
        stubs,
        problems,
        placeholders,
    }
}

fn is_generated_function(config: &BindingConfig, func: &FunctionDecl) -> bool {
    if config.is_excluded(&func.name) {
        tracing::debug!(name = %func.name, "excluded by configuration");
        return false;
    }
    if func.is_variadic {
        tracing::debug!(name = %func.name, "skipping variadic function");
        return false;
    }
    true
}

/// Bindings of every struct that generated cleanly, plus the failures.
struct SettledStructs<'a> {
    generated: FxHashMap<&'a str, (Emitter, StructBinding)>,
    failures: FxHashMap<&'a str, CodegenError>,
}

/// Generate every bound struct until none fails, unbinding the failures so
/// the survivors never reference a converter that does not exist.
fn settle_struct_bindings<'a>(ctx: &mut GenContext<'a>) -> SettledStructs<'a> {
    let mut failures: FxHashMap<&'a str, CodegenError> = FxHashMap::default();
    loop {
        let mut generated = FxHashMap::default();
        let mut round = Vec::new();
        for s in ctx.module.structs() {
            if !ctx.bound_struct(&s.name).is_some_and(|b| std::ptr::eq(b, s)) {
                continue;
            }
            match structs::generate_struct(ctx, s) {
                Ok(result) => {
                    generated.insert(s.name.as_str(), result);
                }
                Err(error) => round.push((s.name.as_str(), error)),
            }
        }
        if round.is_empty() {
            return SettledStructs {
                generated,
                failures,
            };
        }
        ctx.exclude_bindings(round.iter().map(|(name, _)| *name));
        for (name, error) in round {
            tracing::warn!(name, %error, "struct bindings dropped");
            failures.entry(name).or_insert(error);
        }
    }
}

fn problem_comment(name: &str, error: &CodegenError) -> Emitter {
    let mut out = Emitter::new();
    let message = error.to_string().replace("*/", "* /");
    out.writeln(&format!("/* tether: '{name}' not generated: {message} */"));
    out.newline();
    out
}
