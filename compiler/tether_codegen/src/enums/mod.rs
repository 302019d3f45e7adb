//! Enum and constant registration.
//!
//! A named enum becomes a table of its members under the enum's script
//! name; loose constants are set directly on the module table. Every
//! declaration gets its own registrar so that one out-of-range value only
//! loses the declaration it belongs to.

use tether_ir::{ConstGroup, EnumDecl, EnumItem};

use crate::context::GenContext;
use crate::emitter::Emitter;
use crate::CodegenError;

/// A resolved member as the script sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumBinding {
    pub native: String,
    pub script_name: String,
    pub registrar: String,
    pub members: Vec<EnumMember>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstBinding {
    pub registrar: String,
    pub members: Vec<EnumMember>,
}

/// C literal of an enum value as a `lua_Integer`.
///
/// Values above `i64::MAX` wrap the way the native unsigned enum would.
pub fn integer_literal(item: &EnumItem) -> Result<String, CodegenError> {
    let value = item.value;
    if value == i128::from(i64::MIN) {
        Ok("(-9223372036854775807LL - 1)".to_string())
    } else if value > i128::from(i64::MAX) && value <= i128::from(u64::MAX) {
        Ok(format!("(lua_Integer){value}ULL"))
    } else if value >= i128::from(i64::MIN) && value <= i128::from(i64::MAX) {
        Ok(format!("{value}"))
    } else {
        Err(CodegenError::EnumRange {
            item: item.name.clone(),
            value,
        })
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(name = %decl.name))]
pub fn generate_enum(
    ctx: &GenContext<'_>,
    decl: &EnumDecl,
) -> Result<(Emitter, EnumBinding), CodegenError> {
    let script_name = ctx.naming.struct_script_name(&decl.name);
    let registrar = format!("tether_enum_{}", decl.name);
    let mut out = Emitter::new();
    let mut members = Vec::with_capacity(decl.items.len());

    out.open(&format!("static void {registrar}(lua_State* L, int t)"));
    out.writeln(&format!("lua_createtable(L, 0, {});", decl.items.len()));
    for item in &decl.items {
        let name = ctx.naming.enum_item_short_name(&decl.name, &item.name);
        out.writeln(&format!("lua_pushinteger(L, {});", integer_literal(item)?));
        out.writeln(&format!("lua_setfield(L, -2, \"{name}\");"));
        members.push(EnumMember {
            name,
            value: item.value,
        });
    }
    out.writeln(&format!("lua_setfield(L, t, \"{script_name}\");"));
    out.close();
    out.newline();

    let binding = EnumBinding {
        native: decl.name.clone(),
        script_name,
        registrar,
        members,
    };
    Ok((out, binding))
}

/// `index` is the position of the group among the module's declarations,
/// which names its registrar.
pub fn generate_consts(
    ctx: &GenContext<'_>,
    group: &ConstGroup,
    index: usize,
) -> Result<(Emitter, ConstBinding), CodegenError> {
    let registrar = format!("tether_consts_{index}");
    let mut out = Emitter::new();
    let mut members = Vec::with_capacity(group.items.len());

    out.open(&format!("static void {registrar}(lua_State* L, int t)"));
    for item in &group.items {
        let name = ctx.naming.const_item_name(&item.name);
        out.writeln(&format!("lua_pushinteger(L, {});", integer_literal(item)?));
        out.writeln(&format!("lua_setfield(L, t, \"{name}\");"));
        members.push(EnumMember {
            name,
            value: item.value,
        });
    }
    out.close();
    out.newline();
    Ok((out, ConstBinding { registrar, members }))
}
