//! Marshaling strategy table.
//!
//! For every [`Category`] this module knows two templates:
//!
//! - **push**: take a native expression and leave exactly one script value
//!   on top of the stack
//! - **read**: take the script value at a stack index and assign it to a
//!   native lvalue that is already declared and zeroed
//!
//! Reads come in two modes. [`ReadMode::Checked`] raises a script error on
//! a mismatched value (arguments, setters); [`ReadMode::Lenient`] converts
//! whatever is there (table elements, callback results).
//!
//! Composite categories recurse on the spelling of their parts, so an array
//! of tuples of floats is handled by the same three templates.
//!
//! Reading a bound struct may build a temporary userdata from a table. The
//! temporary owns whatever the copy points into, so it is appended to the
//! keep table at stack index `keep`, which the caller declares (see
//! [`needs_keep`]) and keeps alive as long as the value read.

use tether_types::ctype::{element_type, pointee_type, value_type};
use tether_types::{Category, StructShape};

use crate::context::GenContext;
use crate::emitter::Emitter;
use crate::CodegenError;

/// Nesting limit for tuples inside tuples.
const MAX_NESTING: u32 = 8;

/// Local holding the absolute stack index of the keep table.
pub const KEEP_LOCAL: &str = "keep";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadMode {
    Checked,
    Lenient,
}

/// Emit code pushing `expr`, a native value spelled `raw`.
pub fn emit_push(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    raw: &str,
    expr: &str,
) -> Result<(), CodegenError> {
    push(ctx, out, raw, expr, 0)
}

/// Emit code assigning the script value at `index` to `lvalue`.
pub fn emit_read(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    raw: &str,
    lvalue: &str,
    index: &str,
    mode: ReadMode,
) -> Result<(), CodegenError> {
    read(ctx, out, raw, lvalue, index, mode, 0)
}

/// Emit a `return` of the zero value of `raw` (or a bare `return;`).
pub fn emit_return_zero(ctx: &GenContext<'_>, out: &mut Emitter, raw: &str) {
    let category = ctx.classify(raw);
    if category.is_void() {
        out.writeln("return;");
        return;
    }
    let vt = value_type(raw);
    match ctx.zero_literal(&category, &vt) {
        Some(zero) => out.writeln(&format!("return {zero};")),
        None => {
            let zero = out.fresh_temp();
            out.writeln(&format!(
                "{} = {};",
                tether_types::ctype::declare(&vt, &zero),
                ctx.zero_init(&category)
            ));
            out.writeln(&format!("return {zero};"));
        }
    }
}

/// Whether a stored value of this category points into script-owned memory
/// that must be kept alive alongside the struct holding it.
pub fn needs_anchor(category: &Category) -> bool {
    match category {
        Category::CString
        | Category::StructPointer { .. }
        | Category::OpaquePointer { .. }
        | Category::Pointer { .. }
        | Category::FixedArray { .. } => true,
        Category::StructValue { shape, .. } => *shape != StructShape::Tuple,
        _ => false,
    }
}

/// Whether reading a value spelled `raw` appends to the keep table.
pub fn needs_keep(ctx: &GenContext<'_>, raw: &str) -> bool {
    keeps(ctx, raw, 0)
}

fn keeps(ctx: &GenContext<'_>, raw: &str, depth: u32) -> bool {
    if depth >= MAX_NESTING {
        return false;
    }
    match ctx.classify(raw) {
        Category::StructValue { name, shape } => match shape {
            StructShape::Tuple => ctx
                .tuple_members(&name)
                .is_ok_and(|members| members.iter().any(|m| keeps(ctx, &m.raw, depth + 1))),
            StructShape::Userdata | StructShape::ByteRange => ctx.has_bindings(&name),
        },
        Category::FixedArray { .. } => {
            element_type(raw).is_some_and(|elem| keeps(ctx, &elem, depth + 1))
        }
        _ => false,
    }
}

/// Push a fresh keep table and declare [`KEEP_LOCAL`] pointing at it.
pub fn emit_keep_table(out: &mut Emitter) {
    out.writeln("lua_newtable(L);");
    out.writeln(&format!("int {KEEP_LOCAL} = lua_gettop(L);"));
}

fn push(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    raw: &str,
    expr: &str,
    depth: u32,
) -> Result<(), CodegenError> {
    let category = ctx.classify(raw);
    match &category {
        Category::Void => return Err(CodegenError::unsupported("push", raw)),
        Category::Bool => out.writeln(&format!("lua_pushboolean(L, {expr});")),
        Category::Integer(_) | Category::Enum(_) => {
            out.writeln(&format!("lua_pushinteger(L, (lua_Integer){expr});"));
        }
        Category::Float(_) => out.writeln(&format!("lua_pushnumber(L, (lua_Number){expr});")),
        Category::CString => out.writeln(&format!("lua_pushstring(L, {expr});")),
        Category::StructValue { name, shape } => match shape {
            StructShape::Tuple => push_tuple(ctx, out, name, expr, depth)?,
            StructShape::Userdata | StructShape::ByteRange => push_copy(ctx, out, name, expr),
        },
        Category::StructPointer {
            name,
            shape,
            is_const,
        } => {
            let ptr = out.fresh_temp();
            out.open("");
            out.writeln(&format!("{} = {expr};", declare_local(raw, &ptr)));
            out.open(&format!("if ({ptr} != {})", ctx.null()));
            if *shape == StructShape::Tuple {
                push_tuple(ctx, out, name, &format!("*{ptr}"), depth)?;
            } else if *is_const {
                push_copy(ctx, out, name, &format!("*{ptr}"));
            } else {
                out.writeln(&format!("lua_pushlightuserdata(L, (void*){ptr});"));
            }
            out.reopen("else");
            out.writeln("lua_pushnil(L);");
            out.close();
            out.close();
        }
        Category::OpaquePointer { .. } | Category::Pointer { .. } => {
            let ptr = out.fresh_temp();
            out.open("");
            out.writeln(&format!("const void* {ptr} = (const void*){expr};"));
            out.open(&format!("if ({ptr} != {})", ctx.null()));
            out.writeln(&format!("lua_pushlightuserdata(L, (void*){ptr});"));
            out.reopen("else");
            out.writeln("lua_pushnil(L);");
            out.close();
            out.close();
        }
        Category::FixedArray { size, .. } => {
            let elem = element_type(raw).ok_or_else(|| CodegenError::unsupported("push", raw))?;
            let k = out.fresh_temp();
            out.writeln(&format!("lua_createtable(L, {size}, 0);"));
            out.open(&format!("for (int {k} = 0; {k} < {size}; {k}++)"));
            push(ctx, out, &elem, &format!("{expr}[{k}]"), depth)?;
            out.writeln(&format!("lua_rawseti(L, -2, {k} + 1);"));
            out.close();
        }
        Category::Callback { .. } => {
            out.placeholder(&format!("push function pointer '{raw}'"));
            out.writeln("lua_pushnil(L);");
        }
        Category::Unknown => {
            out.placeholder(&format!("push unknown type '{raw}'"));
            out.writeln("lua_pushnil(L);");
        }
    }
    Ok(())
}

/// Copy a struct value into a fresh userdata carrying its metatable.
fn push_copy(ctx: &GenContext<'_>, out: &mut Emitter, name: &str, expr: &str) {
    let ud = out.fresh_temp();
    out.open("");
    out.writeln(&format!(
        "{name}* {ud} = ({name}*)lua_newuserdatauv(L, sizeof({name}), TETHER_UV_COUNT);"
    ));
    out.writeln(&format!("*{ud} = {expr};"));
    out.writeln(&format!("luaL_setmetatable(L, \"{}\");", ctx.metatable(name)));
    out.close();
}

fn push_tuple(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    name: &str,
    expr: &str,
    depth: u32,
) -> Result<(), CodegenError> {
    if depth >= MAX_NESTING {
        return Err(CodegenError::tuple(name, "members nest too deeply"));
    }
    let members = ctx.tuple_members(name)?;
    let value = out.fresh_temp();
    out.open("");
    out.writeln(&format!("{name} {value} = {expr};"));
    out.writeln(&format!("lua_createtable(L, {}, 0);", members.len()));
    for (i, member) in members.iter().enumerate() {
        push(ctx, out, &member.raw, &format!("{value}.{}", member.field), depth + 1)?;
        out.writeln(&format!("lua_rawseti(L, -2, {});", i + 1));
    }
    out.close();
    Ok(())
}

fn read(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    raw: &str,
    lvalue: &str,
    index: &str,
    mode: ReadMode,
    depth: u32,
) -> Result<(), CodegenError> {
    let category = ctx.classify(raw);
    let vt = value_type(raw);
    let checked = mode == ReadMode::Checked;
    match &category {
        Category::Void => return Err(CodegenError::unsupported("read", raw)),
        Category::Bool => out.writeln(&format!("{lvalue} = lua_toboolean(L, {index});")),
        Category::Integer(_) | Category::Enum(_) => {
            let f = if checked { "luaL_checkinteger" } else { "lua_tointeger" };
            out.writeln(&format!("{lvalue} = ({vt}){f}(L, {index});"));
        }
        Category::Float(_) => {
            let f = if checked { "luaL_checknumber" } else { "lua_tonumber" };
            out.writeln(&format!("{lvalue} = ({vt}){f}(L, {index});"));
        }
        Category::CString => {
            let f = if checked { "luaL_checkstring" } else { "lua_tostring" };
            out.writeln(&format!("{lvalue} = ({vt}){f}(L, {index});"));
        }
        Category::StructValue { name, shape } => match shape {
            StructShape::Tuple => read_tuple(ctx, out, name, lvalue, index, mode, depth)?,
            StructShape::Userdata | StructShape::ByteRange => {
                read_struct(ctx, out, name, *shape, lvalue, index, mode);
            }
        },
        Category::StructPointer { name, shape, .. } => {
            if checked && *shape != StructShape::Tuple {
                out.writeln(&format!(
                    "{lvalue} = ({vt})tether_topointer(L, {index}, \"{}\");",
                    ctx.metatable(name)
                ));
            } else {
                out.writeln(&format!("{lvalue} = ({vt})lua_touserdata(L, {index});"));
            }
        }
        Category::OpaquePointer { is_const } | Category::Pointer { is_const, .. } => {
            if *is_const {
                out.writeln(&format!(
                    "{lvalue} = lua_type(L, {index}) == LUA_TSTRING ? ({vt})lua_tostring(L, {index}) : ({vt})lua_touserdata(L, {index});"
                ));
            } else {
                out.writeln(&format!("{lvalue} = ({vt})lua_touserdata(L, {index});"));
            }
        }
        Category::FixedArray { size, .. } => {
            let elem = element_type(raw).ok_or_else(|| CodegenError::unsupported("read", raw))?;
            let t = out.fresh_temp();
            let k = out.fresh_temp();
            out.open("");
            out.writeln(&format!("int {t} = lua_absindex(L, {index});"));
            if checked {
                out.writeln(&format!("luaL_checktype(L, {t}, LUA_TTABLE);"));
            } else {
                out.open(&format!("if (lua_istable(L, {t}))"));
            }
            out.open(&format!("for (int {k} = 0; {k} < {size}; {k}++)"));
            out.writeln(&format!("lua_rawgeti(L, {t}, {k} + 1);"));
            // only entries present in the table are written
            out.open("if (!lua_isnil(L, -1))");
            read(
                ctx,
                out,
                &elem,
                &format!("{lvalue}[{k}]"),
                "-1",
                ReadMode::Lenient,
                depth,
            )?;
            out.close();
            out.writeln("lua_pop(L, 1);");
            out.close();
            if !checked {
                out.close();
            }
            out.close();
        }
        Category::Callback { .. } => out.placeholder(&format!("read function pointer '{raw}'")),
        Category::Unknown => out.placeholder(&format!("read unknown type '{raw}'")),
    }
    Ok(())
}

fn read_struct(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    name: &str,
    shape: StructShape,
    lvalue: &str,
    index: &str,
    mode: ReadMode,
) {
    let meta = ctx.metatable(name);
    if ctx.has_bindings(name) {
        match mode {
            ReadMode::Checked => out.writeln(&format!(
                "if (!tether_to_{name}(L, {index}, &({lvalue}), {KEEP_LOCAL})) luaL_typeerror(L, {index}, \"{meta}\");"
            )),
            ReadMode::Lenient => {
                out.writeln(&format!(
                    "(void)tether_to_{name}(L, {index}, &({lvalue}), {KEEP_LOCAL});"
                ));
            }
        }
        return;
    }

    // A struct bound by another module: no converter, only its userdata.
    let byte_range = (shape == StructShape::ByteRange)
        .then(|| ctx.byte_range(name))
        .flatten();
    let ptr = out.fresh_temp();
    out.open("");
    if let Some(range) = byte_range {
        let len = out.fresh_temp();
        out.open(&format!("if (lua_type(L, {index}) == LUA_TSTRING)"));
        out.writeln(&format!("size_t {len} = 0;"));
        out.writeln(&format!(
            "({lvalue}).{} = lua_tolstring(L, {index}, &{len});",
            range.pointer
        ));
        out.writeln(&format!("({lvalue}).{} = {len};", range.size));
        out.reopen("else");
    }
    let getter = match mode {
        ReadMode::Checked => "luaL_checkudata",
        ReadMode::Lenient => "luaL_testudata",
    };
    out.writeln(&format!("{name}* {ptr} = ({name}*){getter}(L, {index}, \"{meta}\");"));
    out.writeln(&format!("if ({ptr} != {}) {lvalue} = *{ptr};", ctx.null()));
    if byte_range.is_some() {
        out.close();
    }
    out.close();
}

fn read_tuple(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    name: &str,
    lvalue: &str,
    index: &str,
    mode: ReadMode,
    depth: u32,
) -> Result<(), CodegenError> {
    if depth >= MAX_NESTING {
        return Err(CodegenError::tuple(name, "members nest too deeply"));
    }
    let members = ctx.tuple_members(name)?;
    let t = out.fresh_temp();
    out.open("");
    out.writeln(&format!("int {t} = lua_absindex(L, {index});"));
    let checked = mode == ReadMode::Checked;
    if checked {
        out.writeln(&format!("luaL_checktype(L, {t}, LUA_TTABLE);"));
    } else {
        out.open(&format!("if (lua_istable(L, {t}))"));
    }
    for (i, member) in members.iter().enumerate() {
        out.writeln(&format!("lua_rawgeti(L, {t}, {});", i + 1));
        read(
            ctx,
            out,
            &member.raw,
            &format!("({lvalue}).{}", member.field),
            "-1",
            ReadMode::Lenient,
            depth + 1,
        )?;
        out.writeln("lua_pop(L, 1);");
    }
    if !checked {
        out.close();
    }
    out.close();
    Ok(())
}

/// Declaration of a local holding a value spelled `raw`.
pub(crate) fn declare_local(raw: &str, name: &str) -> String {
    tether_types::ctype::declare(&value_type(raw), name)
}

/// Element spelling of a pointer used as an array.
pub(crate) fn pointee_value_type(raw: &str) -> Option<String> {
    pointee_type(raw).map(|p| value_type(&p))
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
