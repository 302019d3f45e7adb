//! Callback trampolines.
//!
//! A function-pointer field of a bound struct cannot hold a script closure
//! directly, and a plain C function pointer carries no context to find one.
//! Every callback field therefore gets a fixed pool of trampolines, each
//! wired to its own closure slot. An instance claims a pool entry the first
//! time it is assigned a closure and keeps it until it assigns `nil`:
//!
//! ```text
//! desc.on_frame = function(ud) ... end
//!   └─► entry = tether_slot_bind(L, ud, TETHER_SLOT_demo_desc_on_frame, "on_frame", value)
//!         entry recorded in the instance's anchor table
//!         registry ref + main thread stored in tether_slots[field][entry]
//!   └─► self->on_frame = tether_trampolines_demo_desc_on_frame[entry]
//!
//! native calls self->on_frame(ud)
//!   └─► trampoline k → tether_call_demo_desc_on_frame(&tether_slots[field][k], ud)
//!         slot unset → zero value
//!         pcall(closure, args...) fails → error sink, zero value
//!         otherwise → result converted back
//! ```
//!
//! A collected instance keeps its entry: native code may still hold a copy
//! of the function pointer. Variadic signatures are never bound. Closures
//! run on the main thread of the state that registered them.

use tether_ir::{Field, StructDecl};
use tether_types::ctype::{declare, CType, FnPointerType};
use tether_types::Category;

use crate::context::GenContext;
use crate::emitter::Emitter;
use crate::strategy::{self, ReadMode};
use crate::CodegenError;

/// Trampolines, and so distinct closures, available per callback field.
pub const SLOT_POOL_SIZE: usize = 16;

/// A callback field owning a pool of closure slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackSlot {
    pub owner: String,
    pub field: String,
}

impl CallbackSlot {
    /// Enum constant addressing this field's pool in `tether_slots`.
    pub fn id(&self) -> String {
        slot_id(&self.owner, &self.field)
    }
}

pub fn slot_id(owner: &str, field: &str) -> String {
    format!("TETHER_SLOT_{owner}_{field}")
}

/// Trampoline bound to pool entry `entry`.
pub fn trampoline_name(owner: &str, field: &str, entry: usize) -> String {
    format!("tether_trampoline_{owner}_{field}_{entry}")
}

/// Table of the pool's trampolines, indexed by entry.
pub fn trampoline_table(owner: &str, field: &str) -> String {
    format!("tether_trampolines_{owner}_{field}")
}

fn dispatcher_name(owner: &str, field: &str) -> String {
    format!("tether_call_{owner}_{field}")
}

fn fn_typedef(owner: &str, field: &str) -> String {
    format!("tether_fn_{owner}_{field}")
}

/// Whether `field` is a function pointer that gets a trampoline.
///
/// Variadic signatures are skipped.
pub fn is_bindable(ctx: &GenContext<'_>, field: &Field) -> bool {
    matches!(ctx.classify(&field.ty), Category::Callback { variadic: false, .. })
}

/// Whether `field` is a function pointer of any kind.
pub fn is_callback(ctx: &GenContext<'_>, field: &Field) -> bool {
    matches!(ctx.classify(&field.ty), Category::Callback { .. })
}

/// Closure slots of every bound struct, in declaration order.
pub fn collect_slots(ctx: &GenContext<'_>, structs: &[&StructDecl]) -> Vec<CallbackSlot> {
    let mut slots = Vec::new();
    for decl in structs {
        for field in &decl.fields {
            if is_bindable(ctx, field) {
                slots.push(CallbackSlot {
                    owner: decl.name.clone(),
                    field: field.name.clone(),
                });
            } else if is_callback(ctx, field) {
                tracing::debug!(
                    owner = %decl.name,
                    field = %field.name,
                    "skipping variadic callback"
                );
            }
        }
    }
    slots
}

/// Emit the slot pools and `tether_slot_bind`. Nothing is emitted for a
/// module without callbacks.
pub fn emit_slot_arena(ctx: &GenContext<'_>, out: &mut Emitter, slots: &[CallbackSlot]) {
    if slots.is_empty() {
        return;
    }
    let null = ctx.null();
    out.section("Callback slots");
    out.directive(&format!("#define TETHER_SLOT_POOL {SLOT_POOL_SIZE}"));
    out.newline();
    out.open("typedef struct tether_slot");
    out.writeln("lua_State* L;");
    out.writeln("int ref;");
    out.dedent();
    out.writeln("} tether_slot;");
    out.newline();

    out.open("enum");
    for slot in slots {
        out.writeln(&format!("{},", slot.id()));
    }
    out.writeln("TETHER_SLOT_COUNT");
    out.close_with_semicolon();
    out.newline();

    out.writeln("static tether_slot tether_slots[TETHER_SLOT_COUNT][TETHER_SLOT_POOL];");
    out.newline();

    // The entry an instance holds is recorded under the field name in its
    // anchor table. A new closure reuses it; nil releases it.
    out.open(
        "static int tether_slot_bind(lua_State* L, int ud, int slot, const char* field, int value)",
    );
    out.writeln("int entry = -1;");
    out.writeln("tether_slot* s;");
    out.writeln("if (!lua_isnil(L, value)) luaL_checktype(L, value, LUA_TFUNCTION);");
    out.writeln("ud = lua_absindex(L, ud);");
    out.writeln("value = lua_absindex(L, value);");
    out.open("if (lua_getiuservalue(L, ud, 1) == LUA_TTABLE)");
    out.writeln("if (lua_getfield(L, -1, field) == LUA_TNUMBER) entry = (int)lua_tointeger(L, -1);");
    out.writeln("lua_pop(L, 1);");
    out.close();
    out.writeln("lua_pop(L, 1);");
    out.open("if (entry >= 0)");
    out.writeln("s = &tether_slots[slot][entry];");
    out.writeln(&format!(
        "if (s->L != {null}) luaL_unref(s->L, LUA_REGISTRYINDEX, s->ref);"
    ));
    out.writeln(&format!("s->L = {null};"));
    out.writeln("s->ref = LUA_NOREF;");
    out.close();
    out.open("if (lua_isnil(L, value))");
    out.writeln("lua_pushnil(L);");
    out.writeln("tether_anchor(L, ud, field, -1);");
    out.writeln("lua_pop(L, 1);");
    out.writeln("return -1;");
    out.close();
    out.open("if (entry < 0)");
    out.open("for (int k = 0; k < TETHER_SLOT_POOL && entry < 0; k++)");
    out.writeln(&format!("if (tether_slots[slot][k].L == {null}) entry = k;"));
    out.close();
    out.writeln(
        "if (entry < 0) return luaL_error(L, \"all %d callback slots of '%s' are in use\", TETHER_SLOT_POOL, field);",
    );
    out.writeln("lua_pushinteger(L, entry);");
    out.writeln("tether_anchor(L, ud, field, -1);");
    out.writeln("lua_pop(L, 1);");
    out.close();
    out.writeln("s = &tether_slots[slot][entry];");
    out.writeln("lua_pushvalue(L, value);");
    out.writeln("s->ref = luaL_ref(L, LUA_REGISTRYINDEX);");
    out.writeln("lua_rawgeti(L, LUA_REGISTRYINDEX, LUA_RIDX_MAINTHREAD);");
    out.writeln("s->L = lua_tothread(L, -1);");
    out.writeln("lua_pop(L, 1);");
    out.writeln("return entry;");
    out.close();
    out.newline();
}

/// Emit the dispatcher, the pool of trampolines and their table for a
/// callback field.
#[tracing::instrument(level = "debug", skip_all, fields(owner = %owner, field = %field.name))]
pub fn emit_trampoline(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    owner: &str,
    field: &Field,
) -> Result<(), CodegenError> {
    let signature = signature(ctx, owner, field)?;
    let ret_raw = signature.ret.trim();
    let ret = ctx.classify(ret_raw);
    let site = format!("{owner}.{}", field.name);

    let params: Vec<String> = signature
        .params
        .iter()
        .enumerate()
        .map(|(i, raw)| declare(raw, &format!("a{i}")))
        .collect();
    let param_list = if params.is_empty() {
        "void".to_string()
    } else {
        params.join(", ")
    };
    let dispatcher = dispatcher_name(owner, &field.name);
    let mut dispatcher_params = vec!["tether_slot* s".to_string()];
    dispatcher_params.extend(params.iter().cloned());
    out.open(&format!(
        "static {ret_raw} {dispatcher}({})",
        dispatcher_params.join(", ")
    ));
    out.open(&format!("if (s->L == {})", ctx.null()));
    strategy::emit_return_zero(ctx, out, ret_raw);
    out.close();
    out.writeln("lua_State* L = s->L;");

    let nargs = signature.params.len();
    out.open(&format!("if (!lua_checkstack(L, {}))", nargs + 2));
    out.writeln(&format!(
        "TETHER_CALLBACK_ERROR(\"{site}\", \"stack overflow\");"
    ));
    strategy::emit_return_zero(ctx, out, ret_raw);
    out.close();

    out.writeln("lua_rawgeti(L, LUA_REGISTRYINDEX, s->ref);");
    for (i, raw) in signature.params.iter().enumerate() {
        strategy::emit_push(ctx, out, raw, &format!("a{i}"))?;
    }

    let converted = returns_value(&ret);
    if !ret.is_void() && !converted {
        out.placeholder(&format!("convert callback result '{ret_raw}'"));
    }
    let nresults = usize::from(converted);
    out.open(&format!("if (lua_pcall(L, {nargs}, {nresults}, 0) != LUA_OK)"));
    out.writeln("const char* msg = lua_tostring(L, -1);");
    out.writeln(&format!(
        "TETHER_CALLBACK_ERROR(\"{site}\", msg != {} ? msg : \"error object is not a string\");",
        ctx.null()
    ));
    out.writeln("lua_pop(L, 1);");
    strategy::emit_return_zero(ctx, out, ret_raw);
    out.close();

    if converted {
        out.writeln(&format!(
            "{} = {};",
            strategy::declare_local(ret_raw, "ret"),
            ctx.zero_init(&ret)
        ));
        strategy::emit_read(ctx, out, ret_raw, "ret", "-1", ReadMode::Lenient)?;
        out.writeln("lua_pop(L, 1);");
        out.writeln("return ret;");
    } else if !ret.is_void() {
        strategy::emit_return_zero(ctx, out, ret_raw);
    }
    out.close();
    out.newline();

    let id = slot_id(owner, &field.name);
    let args: Vec<String> = (0..nargs).map(|i| format!("a{i}")).collect();
    for entry in 0..SLOT_POOL_SIZE {
        let mut call_args = vec![format!("&tether_slots[{id}][{entry}]")];
        call_args.extend(args.iter().cloned());
        let call = format!("{dispatcher}({})", call_args.join(", "));
        out.open(&format!(
            "static {ret_raw} {}({param_list})",
            trampoline_name(owner, &field.name, entry)
        ));
        if ret.is_void() {
            out.writeln(&format!("{call};"));
        } else {
            out.writeln(&format!("return {call};"));
        }
        out.close();
    }
    out.newline();

    let typedef = fn_typedef(owner, &field.name);
    out.writeln(&format!("typedef {ret_raw} (*{typedef})({param_list});"));
    out.open(&format!(
        "static const {typedef} {}[TETHER_SLOT_POOL] =",
        trampoline_table(owner, &field.name)
    ));
    for entry in 0..SLOT_POOL_SIZE {
        out.writeln(&format!("{},", trampoline_name(owner, &field.name, entry)));
    }
    out.close_with_semicolon();
    out.newline();
    Ok(())
}

/// Body of the setter storing a closure into a callback field.
pub fn emit_setter_body(ctx: &GenContext<'_>, out: &mut Emitter, owner: &str, field: &str) {
    out.writeln(&format!(
        "int entry = tether_slot_bind(L, ud, {}, \"{field}\", value);",
        slot_id(owner, field)
    ));
    out.writeln(&format!(
        "self->{field} = entry < 0 ? {} : {}[entry];",
        ctx.null(),
        trampoline_table(owner, field)
    ));
}

/// Result categories a trampoline converts back. Strings and aggregates
/// would outlive the value on the stack they were read from.
fn returns_value(category: &Category) -> bool {
    matches!(
        category,
        Category::Bool
            | Category::Integer(_)
            | Category::Float(_)
            | Category::Enum(_)
            | Category::OpaquePointer { .. }
            | Category::Pointer { .. }
    )
}

/// The function-pointer signature of a field, following configured
/// aliases.
fn signature(ctx: &GenContext<'_>, owner: &str, field: &Field) -> Result<FnPointerType, CodegenError> {
    let mut raw = field.ty.clone();
    for _ in 0..8 {
        match CType::parse(&raw) {
            CType::FnPointer(f) if f.variadic => break,
            CType::FnPointer(f) => return Ok(f),
            CType::Named(t) if t.pointers == 0 && t.dims.is_empty() => {
                match ctx.config.types.aliases.get(&t.base) {
                    Some(target) => raw.clone_from(target),
                    None => break,
                }
            }
            _ => break,
        }
    }
    Err(CodegenError::Callback {
        owner: owner.to_string(),
        field: field.name.clone(),
        reason: format!("'{}' is not a non-variadic function pointer", field.ty),
    })
}
