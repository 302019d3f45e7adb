//! Struct bindings.
//!
//! Every bound struct becomes a full userdata type:
//!
//! - `l_<N>_new`: constructor taking an optional table of initial fields
//!   (or, for byte-range structs, a string)
//! - `tether_to_<N>`: converter used wherever a value of the struct is read
//!   from the stack; accepts a table, the userdata itself, or a string for
//!   byte-range structs
//! - one getter and one setter per field, dispatched by `__index` and
//!   `__newindex`; callback fields are write-only, the count field of an
//!   owned buffer is read-only
//! - `__gc` when the struct owns heap buffers
//!
//! Values stored into a struct that point at script memory (strings, other
//! userdata, tables read as arrays) are anchored in the userdata's first
//! user value so they live as long as the struct does. A nested struct
//! converted from a table leaves its temporary in a keep table, which is
//! anchored the same way.

use rustc_hash::FxHashSet;

use tether_ir::StructDecl;
use tether_types::ctype::{pointee_type, value_type};
use tether_types::{Category, StructShape};

use crate::annotations::lua_type;
use crate::callback;
use crate::context::GenContext;
use crate::emitter::Emitter;
use crate::strategy::{self, ReadMode};
use crate::CodegenError;

/// A script-visible field of a bound struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldBinding {
    pub key: String,
    /// Annotation type, e.g. `integer` or `Vec2[]`.
    pub lua_type: String,
    /// Callback fields can be assigned but not read.
    pub readable: bool,
}

/// What was generated for one struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructBinding {
    pub native: String,
    /// Constructor name in the module table, e.g. `Desc`.
    pub script_name: String,
    pub metatable: String,
    pub fields: Vec<FieldBinding>,
    pub has_gc: bool,
}

impl StructBinding {
    pub fn constructor(&self) -> String {
        constructor_name(&self.native)
    }

    pub fn index_name(&self) -> String {
        format!("l_{}__index", self.native)
    }

    pub fn newindex_name(&self) -> String {
        format!("l_{}__newindex", self.native)
    }

    pub fn gc_name(&self) -> String {
        format!("l_{}__gc", self.native)
    }
}

pub fn constructor_name(native: &str) -> String {
    format!("l_{native}_new")
}

#[derive(Clone, Debug)]
enum AccessKind {
    Value,
    Callback,
    /// Element count of an owned buffer, written only with the buffer.
    OwnedCount {
        pointer: String,
    },
    OwnedBuffer {
        bit: usize,
        count_field: String,
        count_raw: String,
        elem: String,
    },
}

/// One accessor pair.
#[derive(Clone, Debug)]
struct Accessor {
    key: String,
    raw: String,
    /// Member path below `self->`, e.g. `base.user_data`.
    path: String,
    kind: AccessKind,
}

impl Accessor {
    fn readable(&self) -> bool {
        !matches!(self.kind, AccessKind::Callback)
    }

    fn writable(&self) -> bool {
        !matches!(self.kind, AccessKind::OwnedCount { .. })
    }
}

/// Prototypes other chunks may reference before the struct's own chunk.
pub fn emit_prototypes(out: &mut Emitter, native: &str) {
    out.writeln(&format!("static int {}(lua_State* L);", constructor_name(native)));
    out.writeln(&format!(
        "static bool tether_to_{native}(lua_State* L, int idx, {native}* out, int keep);"
    ));
}

/// Generate the complete binding of a bound struct.
#[tracing::instrument(level = "debug", skip_all, fields(name = %decl.name))]
pub fn generate_struct(
    ctx: &GenContext<'_>,
    decl: &StructDecl,
) -> Result<(Emitter, StructBinding), CodegenError> {
    let accessors = accessors(ctx, decl)?;
    let mut out = Emitter::new();
    let native = decl.name.as_str();
    let script_name = ctx.naming.struct_script_name(native);

    for accessor in &accessors {
        if matches!(accessor.kind, AccessKind::Callback) {
            let field = decl
                .field(&accessor.key)
                .ok_or_else(|| CodegenError::unsupported("bind", &accessor.raw))?;
            callback::emit_trampoline(ctx, &mut out, native, field)?;
        }
    }
    for accessor in &accessors {
        if accessor.readable() {
            emit_getter(ctx, &mut out, native, accessor)?;
        }
        if accessor.writable() {
            emit_setter(ctx, &mut out, native, accessor)?;
        }
    }

    emit_constructor(ctx, &mut out, decl, &accessors);
    emit_converter(ctx, &mut out, decl);
    emit_index(ctx, &mut out, native, &accessors);
    emit_newindex(ctx, &mut out, native, &script_name, &accessors);
    let has_gc = accessors
        .iter()
        .any(|a| matches!(a.kind, AccessKind::OwnedBuffer { .. }));
    if has_gc {
        emit_gc(ctx, &mut out, native, &accessors);
    }

    let fields = accessors
        .iter()
        .map(|a| {
            let lua_type = match &a.kind {
                AccessKind::OwnedBuffer { elem, .. } => {
                    format!("{}[]", lua_type(ctx, &ctx.classify(elem)))
                }
                AccessKind::Value | AccessKind::Callback | AccessKind::OwnedCount { .. } => {
                    lua_type(ctx, &ctx.classify(&a.raw))
                }
            };
            FieldBinding {
                key: a.key.clone(),
                lua_type,
                readable: a.readable(),
            }
        })
        .collect();
    let binding = StructBinding {
        native: native.to_string(),
        script_name,
        metatable: ctx.metatable(native),
        fields,
        has_gc,
    };
    Ok((out, binding))
}

/// Accessors in field order, flattened members directly after the field
/// they come from.
fn accessors(ctx: &GenContext<'_>, decl: &StructDecl) -> Result<Vec<Accessor>, CodegenError> {
    let flattened = ctx.config.flattened_fields(&decl.name);
    let mut keys: FxHashSet<&str> = decl.fields.iter().map(|f| f.name.as_str()).collect();
    let mut accessors = Vec::with_capacity(decl.fields.len());

    for field in &decl.fields {
        if callback::is_callback(ctx, field) {
            if callback::is_bindable(ctx, field) {
                accessors.push(Accessor {
                    key: field.name.clone(),
                    raw: field.ty.clone(),
                    path: field.name.clone(),
                    kind: AccessKind::Callback,
                });
            } else {
                tracing::debug!(field = %field.name, "variadic callback field not exposed");
            }
            continue;
        }

        if let Some((bit, buffer)) = decl
            .owned_buffers
            .iter()
            .enumerate()
            .find(|(_, b)| b.pointer_field == field.name)
        {
            let owned_error = || CodegenError::OwnedBuffer {
                owner: decl.name.clone(),
                field: field.name.clone(),
                raw: field.ty.clone(),
            };
            let elem = pointee_type(&field.ty).ok_or_else(owned_error)?;
            let count_raw = decl
                .field(&buffer.count_field)
                .map(|f| f.ty.clone())
                .ok_or_else(owned_error)?;
            accessors.push(Accessor {
                key: field.name.clone(),
                raw: field.ty.clone(),
                path: field.name.clone(),
                kind: AccessKind::OwnedBuffer {
                    bit,
                    count_field: buffer.count_field.clone(),
                    count_raw,
                    elem,
                },
            });
            continue;
        }

        if let Some(buffer) = decl.owned_count(&field.name) {
            accessors.push(Accessor {
                key: field.name.clone(),
                raw: field.ty.clone(),
                path: field.name.clone(),
                kind: AccessKind::OwnedCount {
                    pointer: buffer.pointer_field.clone(),
                },
            });
            continue;
        }

        accessors.push(Accessor {
            key: field.name.clone(),
            raw: field.ty.clone(),
            path: field.name.clone(),
            kind: AccessKind::Value,
        });

        if !flattened.contains(&field.name.as_str()) {
            continue;
        }
        let nested = match ctx.classify(&field.ty) {
            Category::StructValue { name, .. } => ctx.module.find_struct(&name),
            _ => None,
        };
        let Some(nested) = nested else {
            tracing::warn!(field = %field.name, "flattened field is not a struct of this module");
            continue;
        };
        for inner in &nested.fields {
            if callback::is_callback(ctx, inner)
                || nested.owned_buffer(&inner.name).is_some()
                || nested.owned_count(&inner.name).is_some()
            {
                continue;
            }
            if !keys.insert(inner.name.as_str()) {
                tracing::debug!(key = %inner.name, "flattened key shadowed");
                continue;
            }
            accessors.push(Accessor {
                key: inner.name.clone(),
                raw: inner.ty.clone(),
                path: format!("{}.{}", field.name, inner.name),
                kind: AccessKind::Value,
            });
        }
    }
    Ok(accessors)
}

fn getter_name(native: &str, key: &str) -> String {
    format!("tether_{native}_get_{key}")
}

fn setter_name(native: &str, key: &str) -> String {
    format!("tether_{native}_set_{key}")
}

fn emit_getter(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    native: &str,
    accessor: &Accessor,
) -> Result<(), CodegenError> {
    out.open(&format!(
        "static void {}(lua_State* L, {native}* self)",
        getter_name(native, &accessor.key)
    ));
    match &accessor.kind {
        AccessKind::OwnedBuffer {
            count_field, elem, ..
        } => {
            let path = &accessor.path;
            out.writeln(&format!(
                "lua_Integer n = self->{path} != {} ? (lua_Integer)self->{count_field} : 0;",
                ctx.null()
            ));
            out.writeln("if (n < 0) n = 0;");
            out.writeln("lua_createtable(L, (int)n, 0);");
            out.open("for (lua_Integer i = 0; i < n; i++)");
            strategy::emit_push(ctx, out, elem, &format!("self->{path}[i]"))?;
            out.writeln("lua_rawseti(L, -2, i + 1);");
            out.close();
        }
        AccessKind::Value | AccessKind::Callback | AccessKind::OwnedCount { .. } => {
            strategy::emit_push(ctx, out, &accessor.raw, &format!("self->{}", accessor.path))?;
        }
    }
    out.close();
    out.newline();
    Ok(())
}

fn emit_setter(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    native: &str,
    accessor: &Accessor,
) -> Result<(), CodegenError> {
    out.open(&format!(
        "static void {}(lua_State* L, {native}* self, int ud, int value)",
        setter_name(native, &accessor.key)
    ));
    match &accessor.kind {
        AccessKind::Callback => callback::emit_setter_body(ctx, out, native, &accessor.key),
        AccessKind::OwnedBuffer {
            bit,
            count_field,
            count_raw,
            elem,
        } => emit_owned_buffer_setter(ctx, out, accessor, *bit, count_field, count_raw, elem)?,
        AccessKind::OwnedCount { .. } => {
            return Err(CodegenError::unsupported("write", &accessor.raw));
        }
        AccessKind::Value => {
            let category = ctx.classify(&accessor.raw);
            let lvalue = format!("self->{}", accessor.path);
            let keep = strategy::needs_keep(ctx, &accessor.raw);
            if keep {
                strategy::emit_keep_table(out);
            }
            strategy::emit_read(ctx, out, &accessor.raw, &lvalue, "value", ReadMode::Checked)?;
            if category.is_unknown() {
                out.writeln("(void)self;");
                out.writeln("(void)value;");
            }
            if keep {
                emit_anchor_keep(out, &accessor.key);
            } else if strategy::needs_anchor(&category) {
                out.writeln(&format!(
                    "tether_anchor(L, ud, \"{}\", value);",
                    accessor.key
                ));
            } else {
                out.writeln("(void)ud;");
            }
        }
    }
    out.close();
    out.newline();
    Ok(())
}

/// Free the previous buffer if this struct allocated it, then copy the
/// table into a fresh allocation.
fn emit_owned_buffer_setter(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    accessor: &Accessor,
    bit: usize,
    count_field: &str,
    count_raw: &str,
    elem: &str,
) -> Result<(), CodegenError> {
    let path = &accessor.path;
    let mask = format!("((lua_Integer)1 << {bit})");
    let elem_type = value_type(elem);
    let null = ctx.null();
    let keep = strategy::needs_keep(ctx, elem);

    out.writeln("luaL_checktype(L, value, LUA_TTABLE);");
    if keep {
        strategy::emit_keep_table(out);
    }
    out.writeln("lua_Integer n = (lua_Integer)lua_rawlen(L, value);");
    out.writeln("lua_Integer owned = tether_owned(L, ud);");
    out.writeln(&format!("if (owned & {mask}) free((void*)self->{path});"));
    out.writeln(&format!("self->{path} = {null};"));
    out.writeln(&format!("self->{count_field} = 0;"));
    out.writeln(&format!("owned &= ~{mask};"));
    out.writeln("tether_set_owned(L, ud, owned);");
    out.open("if (n > 0)");
    out.writeln(&format!(
        "{elem_type}* buf = ({elem_type}*)malloc((size_t)n * sizeof({elem_type}));"
    ));
    out.writeln(&format!(
        "if (buf == {null}) luaL_error(L, \"out of memory setting '%s'\", \"{}\");",
        accessor.key
    ));
    out.writeln(&format!("memset(buf, 0, (size_t)n * sizeof({elem_type}));"));
    // owned before the copy so that a raised error cannot leak it
    out.writeln(&format!("self->{path} = buf;"));
    out.writeln(&format!(
        "self->{count_field} = ({})n;",
        value_type(count_raw)
    ));
    out.writeln(&format!("tether_set_owned(L, ud, owned | {mask});"));
    out.open("for (lua_Integer i = 0; i < n; i++)");
    out.writeln("lua_rawgeti(L, value, i + 1);");
    strategy::emit_read(ctx, out, elem, "buf[i]", "-1", ReadMode::Lenient)?;
    out.writeln("lua_pop(L, 1);");
    out.close();
    out.close();
    if keep {
        emit_anchor_keep(out, &accessor.key);
    } else {
        out.writeln(&format!("tether_anchor(L, ud, \"{}\", value);", accessor.key));
    }
    Ok(())
}

/// Anchor the keep table, holding `value` and whatever converting it left
/// behind, under `key`, then pop it.
fn emit_anchor_keep(out: &mut Emitter, key: &str) {
    out.writeln("lua_pushvalue(L, value);");
    out.writeln("tether_keep(L, keep);");
    out.writeln(&format!("tether_anchor(L, ud, \"{key}\", keep);"));
    out.writeln("lua_pop(L, 1);");
}

fn emit_constructor(ctx: &GenContext<'_>, out: &mut Emitter, decl: &StructDecl, accessors: &[Accessor]) {
    let native = decl.name.as_str();
    out.open(&format!("static int {}(lua_State* L)", constructor_name(native)));
    out.writeln(&format!(
        "{native}* self = ({native}*)lua_newuserdatauv(L, sizeof({native}), TETHER_UV_COUNT);"
    ));
    out.writeln("int ud = lua_gettop(L);");
    out.writeln(&format!("memset(self, 0, sizeof({native}));"));
    out.writeln(&format!("luaL_setmetatable(L, \"{}\");", ctx.metatable(native)));
    out.open("if (lua_istable(L, 1))");
    for accessor in accessors.iter().filter(|a| a.writable()) {
        out.writeln(&format!("lua_getfield(L, 1, \"{}\");", accessor.key));
        out.writeln(&format!(
            "if (!lua_isnil(L, -1)) {}(L, self, ud, lua_gettop(L));",
            setter_name(native, &accessor.key)
        ));
        out.writeln("lua_pop(L, 1);");
    }
    if let Some(range) = byte_range_fields(ctx, native) {
        out.reopen("else if (lua_type(L, 1) == LUA_TSTRING)");
        out.writeln("size_t len = 0;");
        out.writeln(&format!("self->{} = lua_tolstring(L, 1, &len);", range.0));
        out.writeln(&format!("self->{} = len;", range.1));
        out.writeln(&format!("tether_anchor(L, ud, \"{}\", 1);", range.0));
    }
    out.close();
    out.writeln("return 1;");
    out.close();
    out.newline();
}

/// A table builds a temporary through the constructor; the userdata
/// itself is copied. Whatever the copy points into (the temporary and its
/// buffers, the source userdata, the string) goes into the keep table at
/// `keep`.
fn emit_converter(ctx: &GenContext<'_>, out: &mut Emitter, decl: &StructDecl) {
    let native = decl.name.as_str();
    let null = ctx.null();
    out.open(&format!(
        "static bool tether_to_{native}(lua_State* L, int idx, {native}* out, int keep)"
    ));
    out.writeln("idx = lua_absindex(L, idx);");
    out.writeln(&format!("luaL_checkstack(L, 3, {null});"));
    out.open("if (lua_istable(L, idx))");
    out.writeln(&format!("lua_pushcfunction(L, {});", constructor_name(native)));
    out.writeln("lua_pushvalue(L, idx);");
    out.writeln("lua_call(L, 1, 1);");
    out.writeln(&format!("*out = *({native}*)lua_touserdata(L, -1);"));
    out.writeln("tether_keep(L, keep);");
    out.writeln("return true;");
    out.close();
    if let Some(range) = byte_range_fields(ctx, native) {
        out.open("if (lua_type(L, idx) == LUA_TSTRING)");
        out.writeln("size_t len = 0;");
        out.writeln(&format!("memset(out, 0, sizeof({native}));"));
        out.writeln(&format!("out->{} = lua_tolstring(L, idx, &len);", range.0));
        out.writeln(&format!("out->{} = len;", range.1));
        out.writeln("lua_pushvalue(L, idx);");
        out.writeln("tether_keep(L, keep);");
        out.writeln("return true;");
        out.close();
    }
    out.writeln(&format!(
        "{native}* ud = ({native}*)luaL_testudata(L, idx, \"{}\");",
        ctx.metatable(native)
    ));
    out.writeln(&format!("if (ud == {null}) return false;"));
    out.writeln("*out = *ud;");
    out.writeln("lua_pushvalue(L, idx);");
    out.writeln("tether_keep(L, keep);");
    out.writeln("return true;");
    out.close();
    out.newline();
}

fn emit_index(ctx: &GenContext<'_>, out: &mut Emitter, native: &str, accessors: &[Accessor]) {
    out.open(&format!("static int l_{native}__index(lua_State* L)"));
    out.writeln(&format!(
        "{native}* self = ({native}*)luaL_checkudata(L, 1, \"{}\");",
        ctx.metatable(native)
    ));
    out.writeln("const char* key = luaL_checkstring(L, 2);");
    for accessor in accessors.iter().filter(|a| a.readable()) {
        out.open(&format!("if (strcmp(key, \"{}\") == 0)", accessor.key));
        out.writeln(&format!("{}(L, self);", getter_name(native, &accessor.key)));
        out.writeln("return 1;");
        out.close();
    }
    out.writeln("return 0;");
    out.close();
    out.newline();
}

fn emit_newindex(
    ctx: &GenContext<'_>,
    out: &mut Emitter,
    native: &str,
    script_name: &str,
    accessors: &[Accessor],
) {
    out.open(&format!("static int l_{native}__newindex(lua_State* L)"));
    out.writeln(&format!(
        "{native}* self = ({native}*)luaL_checkudata(L, 1, \"{}\");",
        ctx.metatable(native)
    ));
    out.writeln("const char* key = luaL_checkstring(L, 2);");
    for accessor in accessors {
        out.open(&format!("if (strcmp(key, \"{}\") == 0)", accessor.key));
        match &accessor.kind {
            AccessKind::OwnedCount { pointer } => out.writeln(&format!(
                "return luaL_error(L, \"%s.%s is read-only; assign '%s' instead\", \"{script_name}\", key, \"{pointer}\");"
            )),
            _ => {
                out.writeln(&format!("{}(L, self, 1, 3);", setter_name(native, &accessor.key)));
                out.writeln("return 0;");
            }
        }
        out.close();
    }
    out.writeln(&format!(
        "return luaL_error(L, \"%s has no field '%s'\", \"{script_name}\", key);"
    ));
    out.close();
    out.newline();
}

fn emit_gc(ctx: &GenContext<'_>, out: &mut Emitter, native: &str, accessors: &[Accessor]) {
    let null = ctx.null();
    out.open(&format!("static int l_{native}__gc(lua_State* L)"));
    out.writeln(&format!(
        "{native}* self = ({native}*)luaL_checkudata(L, 1, \"{}\");",
        ctx.metatable(native)
    ));
    out.writeln("lua_Integer owned = tether_owned(L, 1);");
    for accessor in accessors {
        if let AccessKind::OwnedBuffer {
            bit, count_field, ..
        } = &accessor.kind
        {
            let path = &accessor.path;
            out.open(&format!("if (owned & ((lua_Integer)1 << {bit}))"));
            out.writeln(&format!("free((void*)self->{path});"));
            out.writeln(&format!("self->{path} = {null};"));
            out.writeln(&format!("self->{count_field} = 0;"));
            out.close();
        }
    }
    out.writeln("tether_set_owned(L, 1, 0);");
    out.writeln("return 0;");
    out.close();
    out.newline();
}

/// Pointer and size member names of a byte-range struct.
fn byte_range_fields<'c>(ctx: &GenContext<'c>, native: &str) -> Option<(&'c str, &'c str)> {
    let shaped = matches!(
        ctx.classify(native),
        Category::StructValue {
            shape: StructShape::ByteRange,
            ..
        }
    );
    if !shaped {
        return None;
    }
    ctx.byte_range(native)
        .map(|r| (r.pointer.as_str(), r.size.as_str()))
}
