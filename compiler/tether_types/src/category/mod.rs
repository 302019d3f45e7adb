//! Semantic categories of boundary values.

use std::fmt;

/// Width and signedness of an integer category.
///
/// Typedefs resolving to the same width and signedness share a category.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IntKind {
    pub bits: u8,
    pub signed: bool,
}

impl IntKind {
    pub const I8: IntKind = IntKind::new(8, true);
    pub const U8: IntKind = IntKind::new(8, false);
    pub const I16: IntKind = IntKind::new(16, true);
    pub const U16: IntKind = IntKind::new(16, false);
    pub const I32: IntKind = IntKind::new(32, true);
    pub const U32: IntKind = IntKind::new(32, false);
    pub const I64: IntKind = IntKind::new(64, true);
    pub const U64: IntKind = IntKind::new(64, false);

    pub const fn new(bits: u8, signed: bool) -> Self {
        Self { bits, signed }
    }
}

impl fmt::Display for IntKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.signed { 'i' } else { 'u' };
        write!(f, "{sign}{}", self.bits)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Single,
    Double,
}

/// Script-side representation of a struct value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StructShape {
    /// Full userdata with a named metatable.
    Userdata,
    /// Userdata that also accepts a byte string on the way in.
    ByteRange,
    /// Positional sequence, e.g. `{x, y}`.
    Tuple,
}

/// How a value crosses the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Void,
    Bool,
    Integer(IntKind),
    Float(FloatKind),
    /// NUL-terminated string.
    CString,
    StructValue {
        name: String,
        shape: StructShape,
    },
    StructPointer {
        name: String,
        shape: StructShape,
        is_const: bool,
    },
    Enum(String),
    /// `void*` or a pointer to a type the library never declares.
    OpaquePointer {
        is_const: bool,
    },
    /// Pointer to a scalar. Mutable ones are output parameters.
    Pointer {
        pointee: Box<Category>,
        is_const: bool,
    },
    FixedArray {
        elem: Box<Category>,
        size: usize,
    },
    Callback {
        ret: Box<Category>,
        params: Vec<Category>,
        variadic: bool,
    },
    Unknown,
}

impl Category {
    /// Bool, integer, float or enum.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Category::Bool | Category::Integer(_) | Category::Float(_) | Category::Enum(_)
        )
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Category::Void)
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Category::Unknown)
    }

    /// Whether a parameter of this category is written by the callee and
    /// handed back to the script as an extra return value.
    ///
    /// Mutable userdata pointers are written through in place instead.
    pub fn is_output(&self) -> bool {
        match self {
            Category::Pointer { pointee, is_const } => !is_const && pointee.is_scalar(),
            Category::StructPointer {
                shape, is_const, ..
            } => !is_const && *shape == StructShape::Tuple,
            _ => false,
        }
    }

    /// Struct named by a struct value or struct pointer category.
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Category::StructValue { name, .. } | Category::StructPointer { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Void => f.write_str("void"),
            Category::Bool => f.write_str("bool"),
            Category::Integer(k) => write!(f, "{k}"),
            Category::Float(FloatKind::Single) => f.write_str("f32"),
            Category::Float(FloatKind::Double) => f.write_str("f64"),
            Category::CString => f.write_str("cstring"),
            Category::StructValue { name, shape } => write!(f, "{} {name}", shape_word(*shape)),
            Category::StructPointer {
                name,
                shape,
                is_const,
            } => write!(f, "{} {} {name}", mutability(*is_const), shape_word(*shape)),
            Category::Enum(name) => write!(f, "enum {name}"),
            Category::OpaquePointer { is_const } => write!(f, "{} void", mutability(*is_const)),
            Category::Pointer { pointee, is_const } => write!(f, "{} {pointee}", mutability(*is_const)),
            Category::FixedArray { elem, size } => write!(f, "[{elem}; {size}]"),
            Category::Callback {
                ret,
                params,
                variadic,
            } => {
                f.write_str("fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                if *variadic {
                    f.write_str(if params.is_empty() { "..." } else { ", ..." })?;
                }
                write!(f, ") -> {ret}")
            }
            Category::Unknown => f.write_str("unknown"),
        }
    }
}

fn shape_word(shape: StructShape) -> &'static str {
    match shape {
        StructShape::Userdata => "struct",
        StructShape::ByteRange => "bytes",
        StructShape::Tuple => "tuple",
    }
}

fn mutability(is_const: bool) -> &'static str {
    if is_const {
        "*const"
    } else {
        "*mut"
    }
}

/// A raw type string together with its category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub raw: String,
    pub category: Category,
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.raw, self.category)
    }
}
