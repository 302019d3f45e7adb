//! Overload disambiguation.
//!
//! Functions sharing a script name get a suffix derived from the categories
//! of their parameters, joined with `_` in declaration order:
//!
//! ```text
//! Button(const char*)               → button_str
//! Button(const char*, ImVec2)       → button_str_vec2
//! Combo(const char*, int*, ...)     → combo_str_pint_...
//! NewLine()                         → new_line_void
//! ```
//!
//! Suffixes depend on categories, not spellings: `const` and equivalent
//! typedefs do not change them. Two overloads that collapse to the same
//! suffix, or a suffixed name that another function already uses, are a
//! hard error for the declarations involved; nothing is overwritten.

use rustc_hash::FxHashMap;

use tether_ir::{snake_case, FunctionDecl};
use tether_types::{Category, FloatKind, IntKind};

use crate::context::GenContext;
use crate::CodegenError;

/// Token separator inside a suffix.
pub const SUFFIX_DELIMITER: char = '_';

/// Names of one wrapper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionNames {
    /// C name of the wrapper, e.g. `l_ImGui_Button_str`.
    pub c_name: String,
    /// Script-visible name before keyword handling, e.g. `button_str`.
    pub script_name: String,
}

/// Resolved names of every generated function, keyed by the index of its
/// declaration in the module.
#[derive(Debug, Default)]
pub struct OverloadPlan {
    resolved: FxHashMap<usize, Result<FunctionNames, CodegenError>>,
}

impl OverloadPlan {
    /// Name every function in `functions` (declaration index, declaration),
    /// which must be given in IR order.
    pub fn build(ctx: &GenContext<'_>, functions: &[(usize, &FunctionDecl)]) -> Self {
        let mut groups: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let bases: Vec<String> = functions
            .iter()
            .map(|(_, f)| ctx.naming.function_script_name(&f.name))
            .collect();
        for (pos, base) in bases.iter().enumerate() {
            groups.entry(base.clone()).or_default().push(pos);
        }

        let mut resolved = FxHashMap::default();
        let mut taken: FxHashMap<String, String> = FxHashMap::default();

        for (pos, (index, func)) in functions.iter().enumerate() {
            let base = &bases[pos];
            let group = &groups[base];
            let names = if group.len() > 1 {
                let suffix = overload_suffix(ctx, func);
                let clash = group.iter().any(|&other| {
                    other != pos && overload_suffix(ctx, functions[other].1) == suffix
                });
                if clash {
                    Err(CodegenError::OverloadCollision {
                        base: base.clone(),
                        suffix,
                    })
                } else {
                    Ok(FunctionNames {
                        c_name: format!("l_{}{suffix}", func.name),
                        script_name: format!("{base}{suffix}"),
                    })
                }
            } else {
                Ok(FunctionNames {
                    c_name: format!("l_{}", func.name),
                    script_name: base.clone(),
                })
            };

            let names = names.and_then(|names| {
                if let Some(first) = taken.get(&names.script_name) {
                    return Err(CodegenError::DuplicateScriptName {
                        name: names.script_name,
                        first: first.clone(),
                    });
                }
                taken.insert(names.script_name.clone(), func.name.clone());
                Ok(names)
            });
            if let Err(e) = &names {
                tracing::warn!(function = %func.name, error = %e, "cannot name overload");
            }
            resolved.insert(*index, names);
        }
        Self { resolved }
    }

    /// Names for the declaration at `index`.
    pub fn names(&self, index: usize) -> Option<&Result<FunctionNames, CodegenError>> {
        self.resolved.get(&index)
    }
}

/// Suffix of one overload, including the leading delimiter.
pub fn overload_suffix(ctx: &GenContext<'_>, func: &FunctionDecl) -> String {
    if func.params.is_empty() {
        return format!("{SUFFIX_DELIMITER}void");
    }
    let mut suffix = String::new();
    for param in &func.params {
        suffix.push(SUFFIX_DELIMITER);
        suffix.push_str(&category_token(ctx, &ctx.classify(&param.ty)));
    }
    suffix
}

/// Short token naming a category.
pub fn category_token(ctx: &GenContext<'_>, category: &Category) -> String {
    match category {
        Category::Void => "void".to_string(),
        Category::Bool => "bool".to_string(),
        Category::Integer(kind) => integer_token(*kind),
        Category::Float(FloatKind::Single) => "float".to_string(),
        Category::Float(FloatKind::Double) => "double".to_string(),
        Category::CString => "str".to_string(),
        Category::StructValue { name, .. } | Category::Enum(name) => type_token(ctx, name),
        Category::StructPointer { name, .. } => format!("p{}", type_token(ctx, name)),
        Category::Pointer { pointee, .. } => format!("p{}", category_token(ctx, pointee)),
        Category::OpaquePointer { .. } => "ptr".to_string(),
        Category::FixedArray { elem, size } => format!("{}{size}", category_token(ctx, elem)),
        Category::Callback { .. } => "fn".to_string(),
        Category::Unknown => "any".to_string(),
    }
}

fn integer_token(kind: IntKind) -> String {
    let sign = if kind.signed { "int" } else { "uint" };
    if kind.bits == 32 {
        sign.to_string()
    } else {
        format!("{sign}{}", kind.bits)
    }
}

fn type_token(ctx: &GenContext<'_>, native: &str) -> String {
    snake_case(&ctx.naming.struct_script_name(native))
}
