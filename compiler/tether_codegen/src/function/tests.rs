use pretty_assertions::assert_eq;

use tether_ir::ParamFlags;

use super::*;
use crate::test_support::{Fixture, DEMO_IR, DEMO_MANIFEST};

fn names_for(func: &FunctionDecl, script_name: &str) -> FunctionNames {
    FunctionNames {
        c_name: format!("l_{}", func.name),
        script_name: script_name.to_string(),
    }
}

fn wrap(fx: &Fixture, func: &FunctionDecl) -> (String, FunctionBinding, u32) {
    let ctx = fx.ctx();
    let (mut out, binding) = generate_function(&ctx, func, &names_for(func, "f")).unwrap();
    let placeholders = out.placeholders();
    (out.take_output(), binding, placeholders)
}

fn wrap_demo(fx: &Fixture, name: &str) -> (String, FunctionBinding, u32) {
    wrap(fx, fx.function(name))
}

// ── Arguments and results ───────────────────────────────────────

#[test]
fn output_parameter_follows_return_value() {
    let fx = Fixture::demo();
    let (code, binding, placeholders) = wrap_demo(&fx, "demo_checkbox");
    assert_eq!(placeholders, 0);
    assert_eq!(
        code,
        "static int l_demo_checkbox(lua_State* L) {\n    \
         const char* p_label = NULL;\n    \
         p_label = (const char*)luaL_checkstring(L, 1);\n    \
         bool p_v_val = false;\n    \
         bool* p_v = &p_v_val;\n    \
         if (!lua_isnoneornil(L, 2)) {\n        \
         p_v_val = lua_toboolean(L, 2);\n    \
         }\n    \
         bool ret = demo_checkbox(p_label, p_v);\n    \
         lua_pushboolean(L, ret);\n    \
         lua_pushboolean(L, p_v_val);\n    \
         return 2;\n}\n\n"
    );
    assert_eq!(
        binding.args,
        vec![
            ScriptArg {
                name: "label".to_string(),
                lua_type: "string".to_string(),
                optional: false,
            },
            ScriptArg {
                name: "v".to_string(),
                lua_type: "boolean".to_string(),
                optional: true,
            },
        ]
    );
    assert_eq!(
        binding.results,
        vec![
            ScriptResult {
                name: None,
                lua_type: "boolean".to_string(),
            },
            ScriptResult {
                name: Some("v".to_string()),
                lua_type: "boolean".to_string(),
            },
        ]
    );
}

#[test]
fn outputs_are_pushed_in_declaration_order() {
    let fx = Fixture::demo();
    let (code, binding, _) = wrap_demo(&fx, "demo_get_size");
    let ret = code.find("lua_pushboolean(L, ret);").unwrap();
    let w = code.find("lua_pushinteger(L, (lua_Integer)p_w_val);").unwrap();
    let h = code.find("lua_pushinteger(L, (lua_Integer)p_h_val);").unwrap();
    assert!(ret < w && w < h);
    assert!(code.contains("return 3;"));
    let types: Vec<&str> = binding.results.iter().map(|r| r.lua_type.as_str()).collect();
    assert_eq!(types, vec!["boolean", "integer", "integer"]);
}

#[test]
fn void_function_without_outputs_returns_nothing() {
    let fx = Fixture::demo();
    let (code, binding, _) = wrap_demo(&fx, "demo_end");
    assert_eq!(
        code,
        "static int l_demo_end(lua_State* L) {\n    demo_end();\n    return 0;\n}\n\n"
    );
    assert!(binding.args.is_empty());
    assert!(binding.results.is_empty());
}

#[test]
fn defaulted_argument_is_read_only_when_present() {
    let fx = Fixture::demo();
    let (code, binding, _) = wrap_demo(&fx, "demo_set_mode");
    assert!(code.contains("p_mode = (demo_mode)luaL_checkinteger(L, 1);"));
    assert!(code.contains(
        "int p_flags = 0;\n    if (!lua_isnoneornil(L, 2)) {\n        \
         p_flags = (int)luaL_checkinteger(L, 2);\n    }\n"
    ));
    assert!(binding.args[1].optional);
    assert!(!binding.args[0].optional);
}

#[test]
fn optional_output_pushes_nil_when_absent() {
    let fx = Fixture::demo();
    let func = FunctionDecl::new(
        "demo_maybe",
        "void",
        vec![Param::new("out", "int *").with_flags(ParamFlags::HAS_DEFAULT)],
    );
    let (code, binding, _) = wrap(&fx, &func);
    assert!(code.contains("int* p_out = NULL;"));
    assert!(code.contains("    p_out = &p_out_val;\n"));
    assert!(code.contains(
        "if (p_out != NULL) {\n        lua_pushinteger(L, (lua_Integer)*p_out);\n    \
         } else {\n        lua_pushnil(L);\n    }\n"
    ));
    assert_eq!(binding.results.len(), 1);
}

// ── Arrays ──────────────────────────────────────────────────────

#[test]
fn array_and_count_share_one_slot() {
    let fx = Fixture::demo();
    let (code, binding, _) = wrap_demo(&fx, "demo_draw_lines");
    assert!(code.contains("const demo_vec2* p_points = NULL;\n    int p_count = 0;\n"));
    assert!(code.contains("luaL_checktype(L, 1, LUA_TTABLE);"));
    assert!(code.contains("size_t _tmp0 = lua_rawlen(L, 1);"));
    assert!(code.contains(
        "demo_vec2* _tmp1 = (demo_vec2*)lua_newuserdatauv(L, (_tmp0 > 0 ? _tmp0 : 1) * sizeof(demo_vec2), 0);\n        \
         tether_keep(L, keep);\n"
    ));
    assert!(code.contains("p_points = _tmp1;\n        p_count = (int)_tmp0;\n"));
    assert!(code.contains("demo_draw_lines(p_points, p_count);"));
    assert!(!code.contains("(L, 2"));
    assert_eq!(binding.args.len(), 1);
    assert_eq!(binding.args[0].lua_type, "table[]");
}

#[test]
fn configured_array_is_read_and_handed_back() {
    let fx = Fixture::demo();
    let (code, binding, _) = wrap_demo(&fx, "demo_color_edit");
    assert!(code.contains("float p_col[3] = {0};"));
    assert!(code.contains("luaL_checktype(L, _tmp0, LUA_TTABLE);"));
    assert!(code.contains("bool ret = demo_color_edit(p_label, p_col);"));
    assert!(code.contains("lua_createtable(L, 3, 0);"));
    assert!(code.contains("return 2;"));
    assert_eq!(binding.args[1].lua_type, "number[]");
    assert_eq!(binding.results[1].name.as_deref(), Some("col"));
}

#[test]
fn lone_const_pointer_accepts_table_string_or_pointer() {
    let fx = Fixture::demo();
    let func = FunctionDecl::new("demo_upload", "void", vec![Param::new("data", "const float *")]);
    let (code, binding, _) = wrap(&fx, &func);
    assert!(code.contains("const float* p_data = NULL;"));
    assert!(code.contains("if (lua_istable(L, 1)) {"));
    assert!(code.contains("float* _tmp1 = (float*)lua_newuserdatauv(L, "));
    assert!(code.contains("} else if (lua_type(L, 1) == LUA_TSTRING) {"));
    assert!(code.contains("p_data = (const float*)lua_touserdata(L, 1);"));
    assert_eq!(binding.args[0].lua_type, "number[]|lightuserdata");
}

// ── Structs ─────────────────────────────────────────────────────

#[test]
fn const_struct_pointer_accepts_table_or_pointer() {
    let fx = Fixture::demo();
    let (code, _, _) = wrap_demo(&fx, "demo_setup");
    assert!(code.contains("demo_desc p_desc_val = {0};\n    const demo_desc* p_desc = NULL;\n"));
    assert!(code.contains("if (lua_islightuserdata(L, 1)) {"));
    assert!(code.contains("} else if (!lua_isnoneornil(L, 1)) {"));
    assert!(code.contains(
        "if (!tether_to_demo_desc(L, 1, &(p_desc_val), keep)) luaL_typeerror(L, 1, \"demo.Desc\");"
    ));
    assert!(code.contains("p_desc = &p_desc_val;"));
}

#[test]
fn converted_arguments_live_until_the_wrapper_returns() {
    let fx = Fixture::demo();
    let (code, _, _) = wrap_demo(&fx, "demo_setup");
    assert!(code.starts_with(
        "static int l_demo_setup(lua_State* L) {\n    \
         lua_settop(L, 1);\n    \
         lua_newtable(L);\n    \
         int keep = lua_gettop(L);\n"
    ));

    // nothing to keep alive: no keep table
    let (code, _, _) = wrap_demo(&fx, "demo_set_mode");
    assert!(!code.contains("keep"));
    assert!(!code.contains("lua_settop"));
}

#[test]
fn table_buffers_never_use_the_c_stack() {
    let fx = Fixture::demo();
    for name in ["demo_draw_lines", "demo_setup", "demo_color_edit"] {
        let (code, _, _) = wrap_demo(&fx, name);
        assert!(!code.contains("alloca"), "{name}");
    }
    let (code, _, _) = wrap_demo(&fx, "demo_draw_lines");
    let keep = code.find("int keep = lua_gettop(L);").unwrap();
    let buffer = code.find("lua_newuserdatauv(L, ").unwrap();
    assert!(keep < buffer);
}

#[test]
fn marked_struct_pointer_is_returned_as_a_copy() {
    let fx = Fixture::demo();
    let func = FunctionDecl::new(
        "demo_fill",
        "void",
        vec![Param::new("out", "demo_desc *").with_flags(ParamFlags::IS_OUT)],
    );
    let (code, binding, _) = wrap(&fx, &func);
    assert!(code.contains(
        "    demo_desc p_out_val = {0};\n    \
         demo_desc* p_out = &p_out_val;\n    \
         if (!lua_isnoneornil(L, 1)) {\n        \
         (void)tether_to_demo_desc(L, 1, &(p_out_val), keep);\n    }\n    \
         demo_fill(p_out);\n"
    ));
    assert!(!code.contains("tether_topointer"));
    assert!(code.contains("*_tmp0 = p_out_val;"));
    assert!(code.contains("luaL_setmetatable(L, \"demo.Desc\");"));
    assert!(code.ends_with("    return 1;\n}\n\n"));
    assert!(binding.args[0].optional);
    assert_eq!(
        binding.results,
        vec![ScriptResult {
            name: Some("out".to_string()),
            lua_type: "demo.Desc".to_string(),
        }]
    );
}

#[test]
fn unmarked_struct_pointer_is_written_in_place() {
    let fx = Fixture::demo();
    let func = FunctionDecl::new("demo_fill", "void", vec![Param::new("out", "demo_desc *")]);
    let (code, binding, _) = wrap(&fx, &func);
    assert!(code.contains("tether_topointer(L, 1, \"demo.Desc\");"));
    assert!(code.ends_with("    demo_fill(p_out);\n    return 0;\n}\n\n"));
    assert!(binding.results.is_empty());
}

#[test]
fn tuple_by_value() {
    let fx = Fixture::demo();
    let (code, binding, _) = wrap_demo(&fx, "demo_length");
    assert!(code.contains("demo_vec2 p_v = {0};"));
    assert!(code.contains("(p_v).y = (float)lua_tonumber(L, -1);"));
    assert!(code.contains("float ret = demo_length(p_v);"));
    assert!(code.contains("lua_pushnumber(L, (lua_Number)ret);"));
    assert_eq!(binding.args[0].lua_type, "table");
}

#[test]
fn struct_return_is_copied_to_userdata() {
    let fx = Fixture::demo();
    let (code, binding, _) = wrap_demo(&fx, "demo_query_desc");
    assert!(code.contains("demo_desc ret = demo_query_desc();"));
    assert!(code.contains("*_tmp0 = ret;"));
    assert_eq!(binding.results[0].lua_type, "demo.Desc");
}

#[test]
fn unknown_types_are_marked_not_fatal() {
    let fx = Fixture::demo();
    let (code, binding, placeholders) = wrap_demo(&fx, "demo_mystery");
    assert_eq!(placeholders, 2);
    assert!(code.contains("/* TETHER_UNSUPPORTED: parameter 'v' of type 'ImVector<int>' */"));
    assert_eq!(binding.args[0].lua_type, "any");
}

// ── Configuration ───────────────────────────────────────────────

#[test]
fn cpp_calls_use_the_call_prefix() {
    let fx = Fixture::new(
        DEMO_IR,
        "[naming]\ncall_prefix = \"demo::\"\n[output]\nlanguage = \"cpp\"\n",
    );
    let (code, _, _) = wrap_demo(&fx, "demo_checkbox");
    assert!(code.contains("const char* p_label = nullptr;"));
    assert!(code.contains("bool ret = demo::demo_checkbox(p_label, p_v);"));
}

#[test]
fn dummy_backend_skips_the_native_call() {
    let manifest = format!(
        "{DEMO_MANIFEST}\n[dummy_backend]\nguard = \"DEMO_DUMMY\"\nprefixes = [\"demo_get\"]\n\
         returns = {{ demo_get_size = \"true\" }}\n"
    );
    let fx = Fixture::new(DEMO_IR, &manifest);
    let (code, _, _) = wrap_demo(&fx, "demo_get_size");
    assert!(code.contains(
        "    bool ret = false;\n#ifdef DEMO_DUMMY\n    ret = true;\n    (void)p_w;\n    \
         (void)p_h;\n#else\n    ret = demo_get_size(p_w, p_h);\n#endif\n"
    ));

    let (code, _, _) = wrap_demo(&fx, "demo_end");
    assert!(!code.contains("#ifdef"));
}
