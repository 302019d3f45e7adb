//! Function wrappers.
//!
//! A wrapper reads its arguments slot by slot, calls the native function
//! and pushes results:
//!
//! ```text
//! bool demo_checkbox(const char* label, bool* v)
//!
//! static int l_demo_checkbox(lua_State* L)
//!     slot 1 → p_label            checked read
//!     slot 2 → p_v_val, p_v       optional in-value, written by the callee
//!     ret = demo_checkbox(p_label, p_v)
//!     push ret, push *p_v         → return 2
//! ```
//!
//! Slots are assigned per [`ParamUnit`], so a fused array+count pair takes
//! one slot and supplies two native arguments. Output parameters are pushed
//! after the return value, in declaration order.
//!
//! Buffers copied from tables and struct temporaries built by converters
//! live in a keep table pushed above the argument slots, so they stay alive
//! until the wrapper returns.

use tether_ir::{FunctionDecl, Param};
use tether_types::ctype::{declare, pointee_type, value_type};
use tether_types::Category;

use crate::annotations::lua_type;
use crate::context::GenContext;
use crate::emitter::Emitter;
use crate::overload::FunctionNames;
use crate::pairing::{pair_params, ParamUnit};
use crate::strategy::{self, declare_local, pointee_value_type, ReadMode, KEEP_LOCAL};
use crate::CodegenError;

/// A script-visible argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptArg {
    pub name: String,
    pub lua_type: String,
    pub optional: bool,
}

/// A script-visible result; outputs carry their parameter name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptResult {
    pub name: Option<String>,
    pub lua_type: String,
}

/// What was generated for one function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionBinding {
    pub native: String,
    pub c_name: String,
    pub script_name: String,
    pub args: Vec<ScriptArg>,
    pub results: Vec<ScriptResult>,
}

/// A value pushed after the return value.
struct Output {
    raw: String,
    expr: String,
    /// Pointer that is `NULL` when the script passed nothing.
    guard: Option<String>,
}

fn local(param: &Param) -> String {
    format!("p_{}", param.name)
}

/// Generate the wrapper of a non-variadic function.
#[tracing::instrument(level = "debug", skip_all, fields(name = %func.name))]
pub fn generate_function(
    ctx: &GenContext<'_>,
    func: &FunctionDecl,
    names: &FunctionNames,
) -> Result<(Emitter, FunctionBinding), CodegenError> {
    let units = pair_params(ctx, func);
    let mut out = Emitter::new();
    let mut args = Vec::with_capacity(units.len());
    let mut call_args = Vec::with_capacity(func.params.len());
    let mut outputs = Vec::new();

    out.open(&format!("static int {}(lua_State* L)", names.c_name));
    if units.iter().any(|unit| needs_scratch(ctx, unit)) {
        // absent arguments must stay below the keep table
        out.writeln(&format!("lua_settop(L, {});", units.len()));
        strategy::emit_keep_table(&mut out);
    }
    for (i, unit) in units.iter().enumerate() {
        let slot = i + 1;
        match unit {
            ParamUnit::Single {
                param,
                category,
                output,
            } => {
                let arg =
                    emit_single(ctx, &mut out, param, category, *output, slot, &mut outputs)?;
                args.push(arg);
                call_args.push(local(param));
            }
            ParamUnit::ArrayCount { array, count, elem } => {
                emit_array_count(ctx, &mut out, array, count, elem, slot)?;
                args.push(ScriptArg {
                    name: array.name.clone(),
                    lua_type: format!("{}[]", lua_type(ctx, &ctx.classify(elem))),
                    optional: array.has_default(),
                });
                call_args.push(local(array));
                call_args.push(local(count));
            }
            ParamUnit::FixedArray {
                param,
                elem,
                size,
                writable,
            } => {
                let array_raw = format!("{}[{size}]", value_type(elem));
                let name = local(param);
                out.writeln(&format!(
                    "{} = {};",
                    declare(&array_raw, &name),
                    if ctx.is_cpp() { "{}" } else { "{0}" }
                ));
                guarded(&mut out, param.has_default(), slot, |out| {
                    strategy::emit_read(ctx, out, &array_raw, &name, &slot.to_string(), ReadMode::Checked)
                })?;
                let lua = format!("{}[]", lua_type(ctx, &ctx.classify(elem)));
                if *writable {
                    outputs.push(Output {
                        raw: array_raw,
                        expr: name.clone(),
                        guard: None,
                    });
                }
                args.push(ScriptArg {
                    name: param.name.clone(),
                    lua_type: lua,
                    optional: param.has_default(),
                });
                call_args.push(name);
            }
        }
    }

    let ret_raw = func.return_type.trim();
    let ret = ctx.classify(ret_raw);
    let call = format!("{}({})", ctx.call_name(&func.name), call_args.join(", "));
    emit_call(ctx, &mut out, func, ret_raw, &ret, &call, &call_args);

    let mut results = Vec::with_capacity(outputs.len() + 1);
    if !ret.is_void() {
        strategy::emit_push(ctx, &mut out, ret_raw, "ret")?;
        results.push(ScriptResult {
            name: None,
            lua_type: lua_type(ctx, &ret),
        });
    }
    for (unit, output) in units.iter().filter(|u| u.is_output()).zip(&outputs) {
        match &output.guard {
            Some(ptr) => {
                out.open(&format!("if ({ptr} != {})", ctx.null()));
                strategy::emit_push(ctx, &mut out, &output.raw, &output.expr)?;
                out.reopen("else");
                out.writeln("lua_pushnil(L);");
                out.close();
            }
            None => strategy::emit_push(ctx, &mut out, &output.raw, &output.expr)?,
        }
        results.push(ScriptResult {
            name: Some(unit.param().name.clone()),
            lua_type: lua_type(ctx, &ctx.classify(&output.raw)),
        });
    }
    out.writeln(&format!("return {};", results.len()));
    out.close();
    out.newline();

    let binding = FunctionBinding {
        native: func.name.clone(),
        c_name: names.c_name.clone(),
        script_name: names.script_name.clone(),
        args,
        results,
    };
    Ok((out, binding))
}

/// Whether reading `unit` needs the keep table.
fn needs_scratch(ctx: &GenContext<'_>, unit: &ParamUnit<'_>) -> bool {
    match unit {
        ParamUnit::ArrayCount { .. } => true,
        ParamUnit::FixedArray { elem, .. } => strategy::needs_keep(ctx, elem),
        ParamUnit::Single {
            param,
            category,
            output,
        } => {
            if *output {
                return pointee_type(&param.ty).is_some_and(|p| strategy::needs_keep(ctx, &p));
            }
            match category {
                Category::Pointer { is_const: true, .. } => true,
                Category::StructPointer { is_const: true, .. } => pointee_value_type(&param.ty)
                    .is_some_and(|p| strategy::needs_keep(ctx, &p)),
                Category::Callback { .. } | Category::Unknown => false,
                _ => strategy::needs_keep(ctx, &param.ty),
            }
        }
    }
}

/// Run `body` only when the slot holds a value, if the argument is
/// optional.
fn guarded(
    out: &mut Emitter,
    optional: bool,
    slot: usize,
    body: impl FnOnce(&mut Emitter) -> Result<(), CodegenError>,
) -> Result<(), CodegenError> {
    if optional {
        out.open(&format!("if (!lua_isnoneornil(L, {slot}))"));
        body(out)?;
        out.close();
        Ok(())
    } else {
        body(out)
    }
}

fn emit_single(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    param: &Param,
    category: &Category,
    output: bool,
    slot: usize,
    outputs: &mut Vec<Output>,
) -> Result<ScriptArg, CodegenError> {
    let name = local(param);
    let index = slot.to_string();
    let mut arg = ScriptArg {
        name: param.name.clone(),
        lua_type: lua_type(ctx, category),
        optional: param.has_default(),
    };

    match category {
        _ if output => {
            let pointee = pointee_type(&param.ty)
                .ok_or_else(|| CodegenError::unsupported("read", &param.ty))?;
            let pointee_category = ctx.classify(&pointee);
            let val = format!("{name}_val");
            out.writeln(&format!(
                "{} = {};",
                declare_local(&pointee, &val),
                ctx.zero_init(&pointee_category)
            ));
            let ptr_decl = declare_local(&param.ty, &name);
            if param.has_default() {
                out.writeln(&format!("{ptr_decl} = {};", ctx.null()));
                out.open(&format!("if (!lua_isnoneornil(L, {slot}))"));
                out.writeln(&format!("{name} = &{val};"));
            } else {
                out.writeln(&format!("{ptr_decl} = &{val};"));
                out.open(&format!("if (!lua_isnoneornil(L, {slot}))"));
            }
            strategy::emit_read(ctx, out, &pointee, &val, &index, ReadMode::Lenient)?;
            out.close();
            outputs.push(Output {
                raw: pointee,
                expr: if param.has_default() {
                    format!("*{name}")
                } else {
                    val
                },
                guard: param.has_default().then_some(name),
            });
            arg.lua_type = lua_type(ctx, &pointee_category);
            arg.optional = true;
        }
        Category::Pointer { is_const: true, .. } => {
            let elem = pointee_type(&param.ty)
                .ok_or_else(|| CodegenError::unsupported("read", &param.ty))?;
            out.writeln(&format!("{} = {};", declare_local(&param.ty, &name), ctx.null()));
            out.open(&format!("if (lua_istable(L, {slot}))"));
            emit_table_buffer(ctx, out, &elem, &index, &name, None)?;
            out.reopen(&format!("else if (lua_type(L, {slot}) == LUA_TSTRING)"));
            out.writeln(&format!(
                "{name} = ({})lua_tostring(L, {slot});",
                value_type(&param.ty)
            ));
            out.reopen("else");
            out.writeln(&format!(
                "{name} = ({})lua_touserdata(L, {slot});",
                value_type(&param.ty)
            ));
            out.close();
            arg.lua_type = format!("{}[]|lightuserdata", lua_type(ctx, &ctx.classify(&elem)));
        }
        Category::StructPointer { is_const: true, .. } => {
            let pointee = pointee_value_type(&param.ty)
                .ok_or_else(|| CodegenError::unsupported("read", &param.ty))?;
            let val = format!("{name}_val");
            out.writeln(&format!(
                "{} = {};",
                declare(&pointee, &val),
                ctx.zero_init(&ctx.classify(&pointee))
            ));
            out.writeln(&format!("{} = {};", declare_local(&param.ty, &name), ctx.null()));
            out.open(&format!("if (lua_islightuserdata(L, {slot}))"));
            out.writeln(&format!(
                "{name} = ({})lua_touserdata(L, {slot});",
                value_type(&param.ty)
            ));
            out.reopen(&format!("else if (!lua_isnoneornil(L, {slot}))"));
            strategy::emit_read(ctx, out, &pointee, &val, &index, ReadMode::Checked)?;
            out.writeln(&format!("{name} = &{val};"));
            out.close();
            arg.optional = true;
        }
        Category::Callback { .. } | Category::Unknown => {
            out.placeholder(&format!("parameter '{}' of type '{}'", param.name, param.ty));
            out.writeln(&format!(
                "{} = {};",
                declare_local(&param.ty, &name),
                ctx.zero_init(category)
            ));
        }
        _ => {
            out.writeln(&format!(
                "{} = {};",
                declare_local(&param.ty, &name),
                ctx.zero_init(category)
            ));
            guarded(out, param.has_default(), slot, |out| {
                strategy::emit_read(ctx, out, &param.ty, &name, &index, ReadMode::Checked)
            })?;
        }
    }
    Ok(arg)
}

/// Copy the table at `index` into a scratch buffer held by the keep table
/// and point `target` at it; the element count goes to `count` when given.
fn emit_table_buffer(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    elem: &str,
    index: &str,
    target: &str,
    count: Option<(&str, &str)>,
) -> Result<(), CodegenError> {
    let elem_type = value_type(elem);
    let n = out.fresh_temp();
    let buf = out.fresh_temp();
    let k = out.fresh_temp();
    out.writeln(&format!("size_t {n} = lua_rawlen(L, {index});"));
    out.writeln(&format!(
        "{elem_type}* {buf} = ({elem_type}*)lua_newuserdatauv(L, ({n} > 0 ? {n} : 1) * sizeof({elem_type}), 0);"
    ));
    out.writeln(&format!("tether_keep(L, {KEEP_LOCAL});"));
    out.writeln(&format!(
        "memset({buf}, 0, ({n} > 0 ? {n} : 1) * sizeof({elem_type}));"
    ));
    out.open(&format!("for (size_t {k} = 0; {k} < {n}; {k}++)"));
    out.writeln(&format!("lua_rawgeti(L, {index}, (lua_Integer){k} + 1);"));
    strategy::emit_read(ctx, out, elem, &format!("{buf}[{k}]"), "-1", ReadMode::Lenient)?;
    out.writeln("lua_pop(L, 1);");
    out.close();
    out.writeln(&format!("{target} = {buf};"));
    if let Some((count, count_type)) = count {
        out.writeln(&format!("{count} = ({count_type}){n};"));
    }
    Ok(())
}

fn emit_array_count(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    array: &Param,
    count: &Param,
    elem: &str,
    slot: usize,
) -> Result<(), CodegenError> {
    let array_local = local(array);
    let count_local = local(count);
    let count_type = value_type(&count.ty);
    out.writeln(&format!("{} = {};", declare_local(&array.ty, &array_local), ctx.null()));
    out.writeln(&format!("{count_type} {count_local} = 0;"));
    if array.has_default() {
        out.open(&format!("if (!lua_isnoneornil(L, {slot}))"));
    } else {
        out.open("");
    }
    out.writeln(&format!("luaL_checktype(L, {slot}, LUA_TTABLE);"));
    emit_table_buffer(
        ctx,
        out,
        elem,
        &slot.to_string(),
        &array_local,
        Some((&count_local, &count_type)),
    )?;
    out.close();
    Ok(())
}

/// The native call, or the stub branch when the dummy backend applies.
fn emit_call(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    func: &FunctionDecl,
    ret_raw: &str,
    ret: &Category,
    call: &str,
    call_args: &[String],
) {
    let dummy = ctx
        .config
        .dummy_backend
        .as_ref()
        .filter(|d| d.applies_to(&func.name));
    let Some(dummy) = dummy else {
        if ret.is_void() {
            out.writeln(&format!("{call};"));
        } else {
            out.writeln(&format!("{} = {call};", declare_local(ret_raw, "ret")));
        }
        return;
    };

    if !ret.is_void() {
        out.writeln(&format!(
            "{} = {};",
            declare_local(ret_raw, "ret"),
            ctx.zero_init(ret)
        ));
    }
    out.directive(&format!("#ifdef {}", dummy.guard));
    if let Some(value) = dummy.returns.get(&func.name) {
        if !ret.is_void() {
            out.writeln(&format!("ret = {value};"));
        }
    }
    for arg in call_args {
        out.writeln(&format!("(void){arg};"));
    }
    out.directive("#else");
    if ret.is_void() {
        out.writeln(&format!("{call};"));
    } else {
        out.writeln(&format!("ret = {call};"));
    }
    out.directive("#endif");
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
