//! LuaCATS type stubs.
//!
//! The stub file describes the generated module to language servers. It is
//! rendered from the same bindings the C output registers, so the two can
//! never disagree about names.

use std::fmt::Write as _;

use tether_ir::is_script_keyword;
use tether_types::{Category, StructShape};

use crate::context::GenContext;
use crate::enums::{ConstBinding, EnumBinding};
use crate::function::FunctionBinding;
use crate::structs::StructBinding;

/// Annotation type of a value of `category`.
pub fn lua_type(ctx: &GenContext<'_>, category: &Category) -> String {
    match category {
        Category::Void => "nil".to_string(),
        Category::Bool => "boolean".to_string(),
        Category::Integer(_) | Category::Enum(_) => "integer".to_string(),
        Category::Float(_) => "number".to_string(),
        Category::CString => "string".to_string(),
        Category::StructValue { name, shape } | Category::StructPointer { name, shape, .. } => {
            match shape {
                StructShape::Tuple => "table".to_string(),
                StructShape::ByteRange => format!("{}|string", ctx.metatable(name)),
                StructShape::Userdata => ctx.metatable(name),
            }
        }
        Category::OpaquePointer { .. } | Category::Pointer { .. } => "lightuserdata".to_string(),
        Category::FixedArray { elem, .. } => format!("{}[]", lua_type(ctx, elem)),
        Category::Callback { ret, params, .. } => {
            let params: Vec<String> = params
                .iter()
                .enumerate()
                .map(|(i, p)| format!("a{i}: {}", lua_type(ctx, p)))
                .collect();
            if ret.is_void() {
                format!("fun({})", params.join(", "))
            } else {
                format!("fun({}): {}", params.join(", "), lua_type(ctx, ret))
            }
        }
        Category::Unknown => "any".to_string(),
    }
}

/// Everything the stub file describes.
pub struct StubInput<'b> {
    pub functions: &'b [FunctionBinding],
    pub structs: &'b [StructBinding],
    pub enums: &'b [EnumBinding],
    pub consts: &'b [ConstBinding],
}

/// Render the `---@meta` stub of the module.
pub fn render_stubs(ctx: &GenContext<'_>, input: &StubInput<'_>) -> String {
    let module = ctx.naming.module.as_str();
    let mut out = String::with_capacity(4096);
    out.push_str("---@meta\n\n");

    let _ = writeln!(out, "---@class {module}");
    for s in input.structs {
        let _ = writeln!(
            out,
            "---@field {} fun(t?: table): {}",
            s.script_name, s.metatable
        );
    }
    let _ = writeln!(out, "local {module} = {{}}\n");

    for s in input.structs {
        let _ = writeln!(out, "---@class {}", s.metatable);
        for field in &s.fields {
            let _ = writeln!(out, "---@field {} {}", field.key, field.lua_type);
        }
        out.push('\n');
    }

    for e in input.enums {
        let _ = writeln!(out, "---@enum {module}.{}", e.script_name);
        let _ = writeln!(out, "{module}.{} = {{", e.script_name);
        for m in &e.members {
            let _ = writeln!(out, "    {} = {},", m.name, m.value);
        }
        out.push_str("}\n\n");
    }

    for c in input.consts {
        for m in &c.members {
            let _ = writeln!(out, "{module}.{} = {}", m.name, m.value);
        }
        out.push('\n');
    }

    for f in input.functions {
        let names = ctx.naming.registered_names(&f.script_name);
        for name in names.iter().filter(|n| !is_script_keyword(n)) {
            for arg in &f.args {
                let optional = if arg.optional { "?" } else { "" };
                let _ = writeln!(
                    out,
                    "---@param {}{optional} {}",
                    arg_name(&arg.name),
                    arg.lua_type
                );
            }
            for result in &f.results {
                match &result.name {
                    Some(n) => {
                        let _ = writeln!(out, "---@return {} {n}", result.lua_type);
                    }
                    None => {
                        let _ = writeln!(out, "---@return {}", result.lua_type);
                    }
                }
            }
            let params: Vec<String> = f.args.iter().map(|a| arg_name(&a.name)).collect();
            let _ = writeln!(out, "function {module}.{name}({}) end\n", params.join(", "));
        }
    }

    let _ = writeln!(out, "return {module}");
    out
}

fn arg_name(name: &str) -> String {
    if is_script_keyword(name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests;
