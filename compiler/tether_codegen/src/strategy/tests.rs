use pretty_assertions::assert_eq;

use super::*;
use crate::test_support::Fixture;

fn pushed(fx: &Fixture, raw: &str, expr: &str) -> (String, u32) {
    let ctx = fx.ctx();
    let mut out = Emitter::new();
    emit_push(&ctx, &mut out, raw, expr).unwrap();
    let placeholders = out.placeholders();
    (out.take_output(), placeholders)
}

fn read_into(fx: &Fixture, raw: &str, lvalue: &str, index: &str, mode: ReadMode) -> String {
    let ctx = fx.ctx();
    let mut out = Emitter::new();
    emit_read(&ctx, &mut out, raw, lvalue, index, mode).unwrap();
    out.take_output()
}

// ── Push ────────────────────────────────────────────────────────

#[test]
fn scalar_pushes() {
    let fx = Fixture::demo();
    assert_eq!(pushed(&fx, "bool", "ok").0, "lua_pushboolean(L, ok);\n");
    assert_eq!(pushed(&fx, "int", "n").0, "lua_pushinteger(L, (lua_Integer)n);\n");
    assert_eq!(
        pushed(&fx, "demo_mode", "m").0,
        "lua_pushinteger(L, (lua_Integer)m);\n"
    );
    assert_eq!(pushed(&fx, "double", "d").0, "lua_pushnumber(L, (lua_Number)d);\n");
    assert_eq!(pushed(&fx, "const char *", "s").0, "lua_pushstring(L, s);\n");
}

#[test]
fn tuple_push_builds_a_sequence() {
    let fx = Fixture::demo();
    assert_eq!(
        pushed(&fx, "demo_vec2", "v").0,
        "{\n    demo_vec2 _tmp0 = v;\n    lua_createtable(L, 2, 0);\n    \
         lua_pushnumber(L, (lua_Number)_tmp0.x);\n    lua_rawseti(L, -2, 1);\n    \
         lua_pushnumber(L, (lua_Number)_tmp0.y);\n    lua_rawseti(L, -2, 2);\n}\n"
    );
}

#[test]
fn userdata_push_copies_into_fresh_userdata() {
    let fx = Fixture::demo();
    let (code, _) = pushed(&fx, "demo_desc", "ret");
    assert!(code.contains(
        "demo_desc* _tmp0 = (demo_desc*)lua_newuserdatauv(L, sizeof(demo_desc), TETHER_UV_COUNT);"
    ));
    assert!(code.contains("*_tmp0 = ret;"));
    assert!(code.contains("luaL_setmetatable(L, \"demo.Desc\");"));
}

#[test]
fn opaque_pointer_push_maps_null_to_nil() {
    let fx = Fixture::demo();
    assert_eq!(
        pushed(&fx, "void *", "p").0,
        "{\n    const void* _tmp0 = (const void*)p;\n    if (_tmp0 != NULL) {\n        \
         lua_pushlightuserdata(L, (void*)_tmp0);\n    } else {\n        lua_pushnil(L);\n    \
         }\n}\n"
    );
}

#[test]
fn cpp_uses_nullptr() {
    let fx = Fixture::demo_cpp();
    let (code, _) = pushed(&fx, "void *", "p");
    assert!(code.contains("if (_tmp0 != nullptr)"));
}

#[test]
fn mutable_struct_pointer_push_is_lightuserdata() {
    let fx = Fixture::demo();
    let (code, _) = pushed(&fx, "demo_desc *", "p");
    assert!(code.contains("demo_desc* _tmp0 = p;"));
    assert!(code.contains("lua_pushlightuserdata(L, (void*)_tmp0);"));
}

#[test]
fn const_struct_pointer_push_copies() {
    let fx = Fixture::demo();
    let (code, _) = pushed(&fx, "const demo_desc *", "p");
    assert!(code.contains("*_tmp1 = *_tmp0;"));
    assert!(code.contains("luaL_setmetatable(L, \"demo.Desc\");"));
}

#[test]
fn fixed_array_push_loops_over_elements() {
    let fx = Fixture::demo();
    let (code, _) = pushed(&fx, "int[4]", "self->slots");
    assert!(code.starts_with("lua_createtable(L, 4, 0);\n"));
    assert!(code.contains("for (int _tmp0 = 0; _tmp0 < 4; _tmp0++) {"));
    assert!(code.contains("lua_pushinteger(L, (lua_Integer)self->slots[_tmp0]);"));
    assert!(code.contains("lua_rawseti(L, -2, _tmp0 + 1);"));
}

#[test]
fn unsupported_push_emits_placeholder_and_nil() {
    let fx = Fixture::demo();
    let (code, placeholders) = pushed(&fx, "void (*)(void *)", "cb");
    assert_eq!(placeholders, 1);
    assert!(code.contains("/* TETHER_UNSUPPORTED: push function pointer"));
    assert!(code.ends_with("lua_pushnil(L);\n"));

    let (code, placeholders) = pushed(&fx, "ImVector<int>", "v");
    assert_eq!(placeholders, 1);
    assert!(code.contains("TETHER_UNSUPPORTED"));
}

#[test]
fn void_cannot_be_pushed() {
    let fx = Fixture::demo();
    let ctx = fx.ctx();
    let mut out = Emitter::new();
    assert_eq!(
        emit_push(&ctx, &mut out, "void", "x"),
        Err(CodegenError::Unsupported {
            action: "push",
            raw: "void".to_string(),
        })
    );
}

// ── Read ────────────────────────────────────────────────────────

#[test]
fn checked_scalar_reads() {
    let fx = Fixture::demo();
    let checked = ReadMode::Checked;
    assert_eq!(
        read_into(&fx, "float", "v", "1", checked),
        "v = (float)luaL_checknumber(L, 1);\n"
    );
    assert_eq!(
        read_into(&fx, "demo_mode", "m", "2", checked),
        "m = (demo_mode)luaL_checkinteger(L, 2);\n"
    );
    assert_eq!(
        read_into(&fx, "const char *", "s", "1", checked),
        "s = (const char*)luaL_checkstring(L, 1);\n"
    );
    assert_eq!(read_into(&fx, "bool", "b", "3", checked), "b = lua_toboolean(L, 3);\n");
}

#[test]
fn lenient_scalar_reads() {
    let fx = Fixture::demo();
    assert_eq!(
        read_into(&fx, "unsigned int", "u", "-1", ReadMode::Lenient),
        "u = (unsigned int)lua_tointeger(L, -1);\n"
    );
}

#[test]
fn bound_struct_reads_go_through_converter() {
    let fx = Fixture::demo();
    assert_eq!(
        read_into(&fx, "demo_desc", "d", "1", ReadMode::Checked),
        "if (!tether_to_demo_desc(L, 1, &(d), keep)) luaL_typeerror(L, 1, \"demo.Desc\");\n"
    );
    assert_eq!(
        read_into(&fx, "demo_range", "r", "-1", ReadMode::Lenient),
        "(void)tether_to_demo_range(L, -1, &(r), keep);\n"
    );
}

#[test]
fn converted_reads_need_a_keep_table() {
    let fx = Fixture::demo();
    let ctx = fx.ctx();
    assert!(needs_keep(&ctx, "demo_desc"));
    assert!(needs_keep(&ctx, "const demo_color"));
    assert!(needs_keep(&ctx, "demo_path[2]"));
    assert!(!needs_keep(&ctx, "demo_vec2"));
    assert!(!needs_keep(&ctx, "demo_desc *"));
    assert!(!needs_keep(&ctx, "int[4]"));
    assert!(!needs_keep(&ctx, "const char *"));

    let mut out = Emitter::new();
    emit_keep_table(&mut out);
    assert_eq!(out.take_output(), "lua_newtable(L);\nint keep = lua_gettop(L);\n");
}

#[test]
fn unbound_struct_reads_copy_userdata() {
    let manifest = format!(
        "{}\n[filter]\nskip_structs = [\"demo_range\"]\n",
        crate::test_support::DEMO_MANIFEST
    );
    let fx = Fixture::new(crate::test_support::DEMO_IR, &manifest);
    let code = read_into(&fx, "demo_range", "r", "1", ReadMode::Checked);
    assert!(code.contains("if (lua_type(L, 1) == LUA_TSTRING) {"));
    assert!(code.contains("(r).ptr = lua_tolstring(L, 1, &_tmp1);"));
    assert!(code.contains("(r).size = _tmp1;"));
    assert!(code.contains("demo_range* _tmp0 = (demo_range*)luaL_checkudata(L, 1, \"demo.Range\");"));
}

#[test]
fn tuple_read_checks_for_a_table() {
    let fx = Fixture::demo();
    let code = read_into(&fx, "demo_vec2", "p_v", "1", ReadMode::Checked);
    assert_eq!(
        code,
        "{\n    int _tmp0 = lua_absindex(L, 1);\n    luaL_checktype(L, _tmp0, LUA_TTABLE);\n    \
         lua_rawgeti(L, _tmp0, 1);\n    (p_v).x = (float)lua_tonumber(L, -1);\n    \
         lua_pop(L, 1);\n    lua_rawgeti(L, _tmp0, 2);\n    \
         (p_v).y = (float)lua_tonumber(L, -1);\n    lua_pop(L, 1);\n}\n"
    );
}

#[test]
fn lenient_tuple_read_ignores_non_tables() {
    let fx = Fixture::demo();
    let code = read_into(&fx, "demo_vec2", "v", "-1", ReadMode::Lenient);
    assert!(code.contains("if (lua_istable(L, _tmp0)) {"));
    assert!(!code.contains("luaL_checktype"));
}

#[test]
fn fixed_array_read_writes_only_present_entries() {
    let fx = Fixture::demo();
    assert_eq!(
        read_into(&fx, "int[4]", "self->slots", "3", ReadMode::Checked),
        "{\n    int _tmp0 = lua_absindex(L, 3);\n    luaL_checktype(L, _tmp0, LUA_TTABLE);\n    \
         for (int _tmp1 = 0; _tmp1 < 4; _tmp1++) {\n        lua_rawgeti(L, _tmp0, _tmp1 + 1);\n        \
         if (!lua_isnil(L, -1)) {\n            self->slots[_tmp1] = (int)lua_tointeger(L, -1);\n        \
         }\n        lua_pop(L, 1);\n    }\n}\n"
    );
}

#[test]
fn const_pointer_reads_accept_strings() {
    let fx = Fixture::demo();
    let code = read_into(&fx, "const void *", "p", "2", ReadMode::Checked);
    assert_eq!(
        code,
        "p = lua_type(L, 2) == LUA_TSTRING ? (const void*)lua_tostring(L, 2) : (const void*)lua_touserdata(L, 2);\n"
    );
}

#[test]
fn checked_struct_pointer_read_accepts_nil_and_lightuserdata() {
    let fx = Fixture::demo();
    assert_eq!(
        read_into(&fx, "demo_desc *", "p", "1", ReadMode::Checked),
        "p = (demo_desc*)tether_topointer(L, 1, \"demo.Desc\");\n"
    );
}

#[test]
fn unsupported_read_counts_placeholder() {
    let fx = Fixture::demo();
    let ctx = fx.ctx();
    let mut out = Emitter::new();
    emit_read(&ctx, &mut out, "void (*)(void *)", "cb", "1", ReadMode::Checked).unwrap();
    assert_eq!(out.placeholders(), 1);
    assert!(emit_read(&ctx, &mut out, "void", "x", "1", ReadMode::Checked).is_err());
}

// ── Helpers ─────────────────────────────────────────────────────

#[test]
fn zero_returns() {
    let fx = Fixture::demo();
    let ctx = fx.ctx();
    let cases = [
        ("void", "return;\n"),
        ("float", "return 0;\n"),
        ("bool", "return false;\n"),
        ("demo_mode", "return (demo_mode)0;\n"),
        ("void *", "return NULL;\n"),
        ("demo_vec2", "demo_vec2 _tmp0 = {0};\nreturn _tmp0;\n"),
    ];
    for (raw, expected) in cases {
        let mut out = Emitter::new();
        emit_return_zero(&ctx, &mut out, raw);
        assert_eq!(out.take_output(), expected, "{raw}");
    }
}

#[test]
fn anchored_categories() {
    let fx = Fixture::demo();
    let ctx = fx.ctx();
    for raw in ["const char *", "demo_desc *", "void *", "float *", "int[4]", "demo_range"] {
        assert!(needs_anchor(&ctx.classify(raw)), "{raw}");
    }
    for raw in ["int", "bool", "demo_mode", "demo_vec2", "void (*)(void *)"] {
        assert!(!needs_anchor(&ctx.classify(raw)), "{raw}");
    }
}
