//! Parameter pairing pre-pass.
//!
//! Before any wrapper code is written, a function's parameter list is
//! grouped into units. Every unit occupies exactly one script argument
//! slot, but may supply several native arguments:
//!
//! - `Single`: one parameter, one slot
//! - `ArrayCount`: a const pointer followed by an integer named as a count;
//!   the script passes one table and the wrapper supplies pointer and length
//! - `FixedArray`: a pointer configured (or declared) as a fixed-size array;
//!   the script passes one table of exactly that many elements

use tether_ir::{FunctionDecl, Param};
use tether_types::ctype::{element_type, pointee_type, CType};
use tether_types::Category;

use crate::context::GenContext;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamUnit<'a> {
    Single {
        param: &'a Param,
        category: Category,
        /// Pushed back after the return value.
        output: bool,
    },
    ArrayCount {
        array: &'a Param,
        count: &'a Param,
        /// Element spelling, e.g. `b2Vec2`.
        elem: String,
    },
    FixedArray {
        param: &'a Param,
        /// Element spelling, e.g. `float`.
        elem: String,
        size: usize,
        /// The callee may write the array; it is handed back to the script.
        writable: bool,
    },
}

impl ParamUnit<'_> {
    /// The parameter that names the script-visible argument.
    pub fn param(&self) -> &Param {
        match self {
            ParamUnit::Single { param, .. } | ParamUnit::FixedArray { param, .. } => param,
            ParamUnit::ArrayCount { array, .. } => array,
        }
    }

    /// Whether the unit's value is pushed back after the return value.
    pub fn is_output(&self) -> bool {
        match self {
            ParamUnit::Single { output, .. } => *output,
            ParamUnit::FixedArray { writable, .. } => *writable,
            ParamUnit::ArrayCount { .. } => false,
        }
    }
}

/// Group the parameters of `func` into slot units, in declaration order.
pub fn pair_params<'a>(ctx: &GenContext<'_>, func: &'a FunctionDecl) -> Vec<ParamUnit<'a>> {
    let params = &func.params;
    let mut units = Vec::with_capacity(params.len());
    let mut i = 0;

    while i < params.len() {
        let param = &params[i];
        let category = ctx.classify(&param.ty);

        if let Some(size) = ctx.config.array_param_size(&func.name, &param.name) {
            if let Some(elem) = pointee_type(&param.ty) {
                units.push(ParamUnit::FixedArray {
                    param,
                    writable: !pointee_is_const(&param.ty),
                    elem,
                    size,
                });
                i += 1;
                continue;
            }
            tracing::warn!(
                function = %func.name,
                param = %param.name,
                "array_params entry names a parameter that is not a pointer"
            );
        }

        if let Category::FixedArray { size, .. } = category {
            if let Some(elem) = element_type(&param.ty) {
                units.push(ParamUnit::FixedArray {
                    param,
                    writable: !pointee_is_const(&param.ty),
                    elem,
                    size,
                });
                i += 1;
                continue;
            }
        }

        if let Some(count) = params.get(i + 1) {
            if is_array_pointer(&category)
                && ctx.config.is_count_name(&count.name)
                && matches!(ctx.classify(&count.ty), Category::Integer(_))
            {
                if let Some(elem) = pointee_type(&param.ty) {
                    units.push(ParamUnit::ArrayCount {
                        array: param,
                        count,
                        elem,
                    });
                    i += 2;
                    continue;
                }
            }
        }

        units.push(ParamUnit::Single {
            param,
            category,
            output: ctx.is_output(param),
        });
        i += 1;
    }
    units
}

fn is_array_pointer(category: &Category) -> bool {
    matches!(
        category,
        Category::Pointer { is_const: true, .. } | Category::StructPointer { is_const: true, .. }
    )
}

fn pointee_is_const(raw: &str) -> bool {
    matches!(CType::parse(raw), CType::Named(t) if t.base_const)
}
