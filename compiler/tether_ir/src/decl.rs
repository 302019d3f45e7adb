//! Typed declarations.
//!
//! Every declaration is immutable once the loader hands it out. Identity is
//! the native name; functions additionally carry their full type string so
//! that C++ overloads sharing a name stay distinct.

use bitflags::bitflags;

bitflags! {
    /// Script-side flags of a function parameter.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ParamFlags: u8 {
        /// The parameter is optional on the script side.
        const HAS_DEFAULT = 1 << 0;
        /// The IR marked the parameter as written by the callee.
        const IS_OUT = 1 << 1;
        /// The IR had no name for the parameter; `arg<i>` was synthesized.
        const SYNTHESIZED_NAME = 1 << 2;
    }
}

/// A function or callback argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: String,
    pub flags: ParamFlags,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            flags: ParamFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn has_default(&self) -> bool {
        self.flags.contains(ParamFlags::HAS_DEFAULT)
    }

    #[inline]
    pub fn marked_out(&self) -> bool {
        self.flags.contains(ParamFlags::IS_OUT)
    }
}

/// A struct member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: String,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// A pointer field whose memory the generated bindings allocate and free.
///
/// The length lives in a sibling integer field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedBuffer {
    pub pointer_field: String,
    pub count_field: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Field>,
    pub owned_buffers: Vec<OwnedBuffer>,
}

impl StructDecl {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            owned_buffers: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The owned-buffer entry whose pointer field is `name`.
    pub fn owned_buffer(&self, name: &str) -> Option<&OwnedBuffer> {
        self.owned_buffers.iter().find(|b| b.pointer_field == name)
    }

    /// The owned-buffer entry whose count field is `name`.
    pub fn owned_count(&self, name: &str) -> Option<&OwnedBuffer> {
        self.owned_buffers.iter().find(|b| b.count_field == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    /// The full IR type string, e.g. `bool (const char *, bool *, int)`.
    pub raw_type: String,
    pub return_type: String,
    pub params: Vec<Param>,
    pub is_variadic: bool,
}

impl FunctionDecl {
    /// Build a declaration from its pieces, deriving `raw_type`.
    pub fn new(name: impl Into<String>, return_type: impl Into<String>, params: Vec<Param>) -> Self {
        let return_type = return_type.into();
        let param_list = if params.is_empty() {
            "void".to_string()
        } else {
            params
                .iter()
                .map(|p| p.ty.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Self {
            name: name.into(),
            raw_type: format!("{return_type} ({param_list})"),
            return_type,
            params,
            is_variadic: false,
        }
    }
}

/// One enumerator with its fully resolved value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumItem {
    pub name: String,
    pub value: i128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: String,
    pub items: Vec<EnumItem>,
}

/// Anonymous enum or `consts` block: loose integer constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstGroup {
    pub items: Vec<EnumItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Declaration {
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    ConstGroup(ConstGroup),
}

impl Declaration {
    /// Native name, or `None` for anonymous constant groups.
    pub fn name(&self) -> Option<&str> {
        match self {
            Declaration::Function(f) => Some(&f.name),
            Declaration::Struct(s) => Some(&s.name),
            Declaration::Enum(e) => Some(&e.name),
            Declaration::ConstGroup(_) => None,
        }
    }

    pub fn kind(&self) -> DeclKind {
        match self {
            Declaration::Function(_) => DeclKind::Function,
            Declaration::Struct(_) => DeclKind::Struct,
            Declaration::Enum(_) => DeclKind::Enum,
            Declaration::ConstGroup(_) => DeclKind::ConstGroup,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Function,
    Struct,
    Enum,
    ConstGroup,
}

/// A struct or enum declared by a dependency module.
///
/// Dependency declarations are not generated here, but their names still
/// classify as struct/enum types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyType {
    pub name: String,
    pub kind: DeclKind,
}

/// A loaded, deduplicated IR document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    /// Module name recorded by the extractor, if any.
    pub name: Option<String>,
    /// Native prefix recorded by the extractor, if any.
    pub prefix: Option<String>,
    pub decls: Vec<Declaration>,
    pub dependency_types: Vec<DependencyType>,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.decls.iter().filter_map(|d| match d {
            Declaration::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.decls.iter().filter_map(|d| match d {
            Declaration::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDecl> {
        self.decls.iter().filter_map(|d| match d {
            Declaration::Enum(e) => Some(e),
            _ => None,
        })
    }

    pub fn find_struct(&self, name: &str) -> Option<&StructDecl> {
        self.structs().find(|s| s.name == name)
    }
}
