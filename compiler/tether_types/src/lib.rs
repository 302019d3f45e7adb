//! Type classification for the tether FFI generator.
//!
//! Every value crossing the native/script boundary is described by a raw C
//! type string. The [`Classifier`] reduces each string to exactly one
//! [`Category`] once, and every generator downstream dispatches on that
//! category instead of re-reading the spelling.
//!
//! # Categories
//!
//! - **Scalars**: `Bool`, `Integer`, `Float`, `Enum`
//! - **Strings**: `CString`
//! - **Structs**: `StructValue` and `StructPointer`, each with a shape
//!   (userdata, byte range or positional tuple)
//! - **Pointers**: `OpaquePointer`, and `Pointer` to a scalar
//! - **Composites**: `FixedArray`, `Callback`
//! - **Fallback**: `Unknown`, never an error

mod category;
mod classify;
pub mod ctype;

pub use category::{Category, FloatKind, IntKind, StructShape, TypeDescriptor};
pub use classify::{Classifier, TypeIndex};

/// Classification queries.
///
/// Implementors provide [`classify`](Self::classify); the remaining methods
/// are derived from it.
pub trait TypeClassification {
    /// The category of `raw`. Total: unrecognized spellings are `Unknown`.
    fn classify(&self, raw: &str) -> Category;

    fn describe(&self, raw: &str) -> TypeDescriptor {
        TypeDescriptor {
            raw: raw.to_string(),
            category: self.classify(raw),
        }
    }

    /// Whether a parameter spelled `raw` is an output parameter.
    ///
    /// `marked` is the declaration's own out flag. It also makes a mutable
    /// userdata struct pointer an output, which is otherwise written through
    /// in place.
    fn is_output(&self, raw: &str, marked: bool) -> bool {
        let category = self.classify(raw);
        category.is_output()
            || (marked && matches!(category, Category::StructPointer { is_const: false, .. }))
    }
}
