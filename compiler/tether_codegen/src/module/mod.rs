//! Module assembly.
//!
//! Stitches the per-declaration chunks into one translation unit:
//!
//! ```text
//! prelude            includes, portability macros, anchoring helpers
//! prototypes         l_<S>_new / tether_to_<S> of every bound struct
//! callback slots     per-field closure pools and tether_slot_bind
//! chunks             declarations in IR order
//! metatables         __index / __newindex / __gc per struct
//! registration       luaL_Reg table
//! entry point        luaopen_* or into-table installer
//! ```

use tether_ir::Registration;

use crate::callback::{self, CallbackSlot};
use crate::context::GenContext;
use crate::emitter::Emitter;
use crate::enums::{ConstBinding, EnumBinding};
use crate::function::FunctionBinding;
use crate::structs::{self, StructBinding};

/// Name of the generated `luaL_Reg` table.
pub const FUNCTION_TABLE: &str = "tether_functions";

/// Pieces of the translation unit, in the order they were generated.
pub struct Assembly<'b> {
    pub slots: &'b [CallbackSlot],
    pub chunks: Vec<Emitter>,
    pub functions: &'b [FunctionBinding],
    pub structs: &'b [StructBinding],
    pub enums: &'b [EnumBinding],
    pub consts: &'b [ConstBinding],
}

#[tracing::instrument(level = "debug", skip_all, fields(module = %ctx.naming.module))]
pub fn assemble(ctx: &GenContext<'_>, mut parts: Assembly<'_>) -> Emitter {
    let mut out = Emitter::new();
    emit_prelude(ctx, &mut out);

    if !parts.structs.is_empty() {
        out.section("Prototypes");
        for s in parts.structs {
            structs::emit_prototypes(&mut out, &s.native);
        }
        out.newline();
    }

    callback::emit_slot_arena(ctx, &mut out, parts.slots);

    out.section("Bindings");
    for chunk in parts.chunks.drain(..) {
        out.append(chunk);
    }

    if !parts.structs.is_empty() {
        emit_metatables(&mut out, parts.structs);
    }
    emit_registration(ctx, &mut out, parts.functions, parts.structs);
    emit_entry_point(ctx, &mut out, &parts);
    out
}

fn emit_prelude(ctx: &GenContext<'_>, out: &mut Emitter) {
    let output = &ctx.config.output;
    out.writeln(&format!(
        "/* Lua bindings for module '{}', generated by tether. Do not edit. */",
        ctx.naming.module
    ));
    out.newline();

    out.directive("#ifdef __cplusplus");
    out.directive("extern \"C\" {");
    out.directive("#endif");
    out.directive("#include <lua.h>");
    out.directive("#include <lauxlib.h>");
    out.directive("#ifdef __cplusplus");
    out.directive("}");
    out.directive("#endif");
    for header in ["string.h", "stdlib.h", "stdbool.h", "stdio.h"] {
        out.directive(&format!("#include <{header}>"));
    }
    for include in &output.includes {
        if include.starts_with('<') || include.starts_with('"') {
            out.directive(&format!("#include {include}"));
        } else {
            out.directive(&format!("#include \"{include}\""));
        }
    }
    out.newline();

    out.directive("#if LUA_VERSION_NUM < 504");
    out.directive("#error \"tether bindings require Lua 5.4 or later\"");
    out.directive("#endif");
    out.newline();

    let export = &output.export_macro;
    out.directive(&format!("#ifndef {export}"));
    out.directive("#if defined(_WIN32)");
    out.directive(&format!("#define {export} __declspec(dllexport)"));
    out.directive("#else");
    out.directive(&format!("#define {export}"));
    out.directive("#endif");
    out.directive("#endif");
    out.newline();

    match &output.callback_error_sink {
        Some(sink) => {
            out.writeln(&format!("void {sink}(const char* site, const char* message);"));
            out.directive(&format!(
                "#define TETHER_CALLBACK_ERROR(site, msg) {sink}((site), (msg))"
            ));
        }
        None => {
            out.directive("#define TETHER_CALLBACK_ERROR(site, msg) \\");
            out.directive(
                "    fprintf(stderr, \"tether: callback %s failed: %s\\n\", (site), (msg))",
            );
        }
    }
    out.newline();

    // user value 1: anchor table, user value 2: owned-buffer bitmask
    out.directive("#define TETHER_UV_COUNT 2");
    out.newline();

    let null = ctx.null();
    out.open("static inline void* tether_topointer(lua_State* L, int idx, const char* mt)");
    out.writeln(&format!("if (lua_isnoneornil(L, idx)) return {null};"));
    out.writeln("if (lua_islightuserdata(L, idx)) return lua_touserdata(L, idx);");
    out.writeln("return luaL_checkudata(L, idx, mt);");
    out.close();
    out.newline();

    out.open("static inline void tether_anchor(lua_State* L, int ud, const char* key, int value)");
    out.writeln("ud = lua_absindex(L, ud);");
    out.writeln("value = lua_absindex(L, value);");
    out.open("if (lua_getiuservalue(L, ud, 1) != LUA_TTABLE)");
    out.writeln("lua_pop(L, 1);");
    out.writeln("lua_newtable(L);");
    out.writeln("lua_pushvalue(L, -1);");
    out.writeln("lua_setiuservalue(L, ud, 1);");
    out.close();
    out.writeln("lua_pushvalue(L, value);");
    out.writeln("lua_setfield(L, -2, key);");
    out.writeln("lua_pop(L, 1);");
    out.close();
    out.newline();

    // pops the value on top into the keep table at `keep`
    out.open("static inline void tether_keep(lua_State* L, int keep)");
    out.writeln("lua_rawseti(L, keep, (lua_Integer)lua_rawlen(L, keep) + 1);");
    out.close();
    out.newline();

    out.open("static inline lua_Integer tether_owned(lua_State* L, int ud)");
    out.writeln("lua_Integer mask;");
    out.writeln("lua_getiuservalue(L, ud, 2);");
    out.writeln("mask = lua_tointeger(L, -1);");
    out.writeln("lua_pop(L, 1);");
    out.writeln("return mask;");
    out.close();
    out.newline();

    out.open("static inline void tether_set_owned(lua_State* L, int ud, lua_Integer mask)");
    out.writeln("ud = lua_absindex(L, ud);");
    out.writeln("lua_pushinteger(L, mask);");
    out.writeln("lua_setiuservalue(L, ud, 2);");
    out.close();
    out.newline();
}

fn emit_metatables(out: &mut Emitter, structs: &[StructBinding]) {
    out.section("Metatables");
    out.open("static void tether_register_metatables(lua_State* L)");
    for s in structs {
        out.writeln(&format!("luaL_newmetatable(L, \"{}\");", s.metatable));
        let mut methods = vec![("__index", s.index_name()), ("__newindex", s.newindex_name())];
        if s.has_gc {
            methods.push(("__gc", s.gc_name()));
        }
        for (event, function) in methods {
            out.writeln(&format!("lua_pushcfunction(L, {function});"));
            out.writeln(&format!("lua_setfield(L, -2, \"{event}\");"));
        }
        out.writeln("lua_pop(L, 1);");
    }
    out.close();
    out.newline();
}

fn emit_registration(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    functions: &[FunctionBinding],
    structs: &[StructBinding],
) {
    let extras = &ctx.config.output.extra_registrations;
    out.section("Registration");
    for extra in extras {
        out.writeln(&format!("int {}(lua_State* L);", extra.function));
    }
    if !extras.is_empty() {
        out.newline();
    }

    out.open(&format!("static const luaL_Reg {FUNCTION_TABLE}[] ="));
    for f in functions {
        for name in ctx.naming.registered_names(&f.script_name) {
            out.writeln(&format!("{{\"{name}\", {}}},", f.c_name));
        }
    }
    for s in structs {
        out.writeln(&format!("{{\"{}\", {}}},", s.script_name, s.constructor()));
    }
    for extra in extras {
        out.writeln(&format!("{{\"{}\", {}}},", extra.name, extra.function));
    }
    out.writeln(&format!("{{{null}, {null}}}", null = ctx.null()));
    out.close_with_semicolon();
    out.newline();
}

fn emit_entry_point(ctx: &GenContext<'_>, out: &mut Emitter, parts: &Assembly<'_>) {
    let output = &ctx.config.output;
    let linkage = if ctx.is_cpp() { "extern \"C\" " } else { "" };
    let export = &output.export_macro;
    let entry = ctx.naming.entry_point_name();
    let metatables = !parts.structs.is_empty();

    out.section("Entry point");
    match output.registration {
        Registration::Module => {
            out.open(&format!("{linkage}{export} int {entry}(lua_State* L)"));
            if metatables {
                out.writeln("tether_register_metatables(L);");
            }
            out.writeln(&format!("luaL_newlib(L, {FUNCTION_TABLE});"));
            out.writeln("int t = lua_gettop(L);");
            emit_registrar_calls(out, parts);
            out.writeln("(void)t;");
            out.writeln("return 1;");
        }
        Registration::IntoTable => {
            out.open(&format!("{linkage}{export} void {entry}(lua_State* L, int idx)"));
            out.writeln("int t = lua_absindex(L, idx);");
            if metatables {
                out.writeln("tether_register_metatables(L);");
            }
            out.writeln("lua_pushvalue(L, t);");
            out.writeln(&format!("luaL_setfuncs(L, {FUNCTION_TABLE}, 0);"));
            out.writeln("lua_pop(L, 1);");
            emit_registrar_calls(out, parts);
        }
    }
    out.close();
}

fn emit_registrar_calls(out: &mut Emitter, parts: &Assembly<'_>) {
    for e in parts.enums {
        out.writeln(&format!("{}(L, t);", e.registrar));
    }
    for c in parts.consts {
        out.writeln(&format!("{}(L, t);", c.registrar));
    }
}
