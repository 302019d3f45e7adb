use pretty_assertions::assert_eq;

use super::*;
use crate::enums::EnumMember;
use crate::function::{ScriptArg, ScriptResult};
use crate::structs::FieldBinding;
use crate::test_support::Fixture;

#[test]
fn category_types() {
    let fx = Fixture::demo();
    let ctx = fx.ctx();
    let cases = [
        ("bool", "boolean"),
        ("uint16_t", "integer"),
        ("demo_mode", "integer"),
        ("double", "number"),
        ("const char *", "string"),
        ("demo_desc", "demo.Desc"),
        ("demo_range", "demo.Range|string"),
        ("demo_vec2", "table"),
        ("void *", "lightuserdata"),
        ("int[4]", "integer[]"),
        ("bool (*)(const demo_desc *, int)", "fun(a0: demo.Desc, a1: integer): boolean"),
        ("void (*)(void *)", "fun(a0: lightuserdata)"),
        ("ImVector<int>", "any"),
    ];
    for (raw, expected) in cases {
        assert_eq!(lua_type(&ctx, &ctx.classify(raw)), expected, "{raw}");
    }
}

#[test]
fn stub_file() {
    let fx = Fixture::demo();
    let ctx = fx.ctx();
    let functions = vec![
        FunctionBinding {
            native: "demo_checkbox".to_string(),
            c_name: "l_demo_checkbox".to_string(),
            script_name: "checkbox".to_string(),
            args: vec![
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
            ],
            results: vec![
                ScriptResult {
                    name: None,
                    lua_type: "boolean".to_string(),
                },
                ScriptResult {
                    name: Some("v".to_string()),
                    lua_type: "boolean".to_string(),
                },
            ],
        },
        FunctionBinding {
            native: "demo_end".to_string(),
            c_name: "l_demo_end".to_string(),
            script_name: "end".to_string(),
            args: Vec::new(),
            results: Vec::new(),
        },
    ];
    let structs = vec![StructBinding {
        native: "demo_vec3".to_string(),
        script_name: "Vec3".to_string(),
        metatable: "demo.Vec3".to_string(),
        fields: vec![FieldBinding {
            key: "x".to_string(),
            lua_type: "number".to_string(),
            readable: true,
        }],
        has_gc: false,
    }];
    let enums = vec![EnumBinding {
        native: "demo_mode".to_string(),
        script_name: "Mode".to_string(),
        registrar: "tether_enum_demo_mode".to_string(),
        members: vec![EnumMember {
            name: "FILL".to_string(),
            value: 0,
        }],
    }];
    let consts = vec![ConstBinding {
        registrar: "tether_consts_3".to_string(),
        members: vec![EnumMember {
            name: "MAX_SLOTS".to_string(),
            value: 4,
        }],
    }];
    let stubs = render_stubs(
        &ctx,
        &StubInput {
            functions: &functions,
            structs: &structs,
            enums: &enums,
            consts: &consts,
        },
    );
    assert_eq!(
        stubs,
        "---@meta\n\n\
         ---@class demo\n\
         ---@field Vec3 fun(t?: table): demo.Vec3\n\
         local demo = {}\n\n\
         ---@class demo.Vec3\n\
         ---@field x number\n\n\
         ---@enum demo.Mode\n\
         demo.Mode = {\n    FILL = 0,\n}\n\n\
         demo.MAX_SLOTS = 4\n\n\
         ---@param label string\n\
         ---@param v? boolean\n\
         ---@return boolean\n\
         ---@return boolean v\n\
         function demo.checkbox(label, v) end\n\n\
         function demo.end_() end\n\n\
         return demo\n"
    );
}
