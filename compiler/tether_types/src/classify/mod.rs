//! Type classifier.
//!
//! Maps every raw type string to exactly one [`Category`]. Classification
//! is structural: qualifiers, pointer depth and array bounds come from
//! [`CType`], and only the base name is looked up in the [`TypeIndex`].
//! Anything unrecognized is `Unknown`; classification never fails.

use std::cell::RefCell;

use rustc_hash::{FxHashMap, FxHashSet};

use tether_ir::{BindingConfig, DeclKind, Module};

use crate::ctype::{CType, NamedType};
use crate::{Category, FloatKind, IntKind, StructShape, TypeClassification};

/// Alias chains longer than this classify as `Unknown`.
const MAX_ALIAS_DEPTH: u32 = 8;

/// Read-only table of the struct and enum names one run knows about.
///
/// Built once per IR and never mutated during generation.
#[derive(Clone, Debug, Default)]
pub struct TypeIndex {
    structs: FxHashSet<String>,
    enums: FxHashSet<String>,
    tuples: FxHashSet<String>,
    byte_ranges: FxHashSet<String>,
    aliases: FxHashMap<String, String>,
    integer_prefixes: Vec<String>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every struct and enum declared in the IR (dependency declarations
    /// included) plus the basic types and special shapes named by the
    /// configuration.
    pub fn build(module: &Module, config: &BindingConfig) -> Self {
        let mut index = Self::new();
        for s in module.structs() {
            index.structs.insert(s.name.clone());
        }
        for e in module.enums() {
            index.enums.insert(e.name.clone());
        }
        for dep in &module.dependency_types {
            match dep.kind {
                DeclKind::Struct => {
                    index.structs.insert(dep.name.clone());
                }
                DeclKind::Enum => {
                    index.enums.insert(dep.name.clone());
                }
                DeclKind::Function | DeclKind::ConstGroup => {}
            }
        }

        let types = &config.types;
        index.structs.extend(types.basic_structs.iter().cloned());
        index.enums.extend(types.basic_enums.iter().cloned());
        index.tuples.extend(types.tuple_structs.keys().cloned());
        index.byte_ranges.extend(types.byte_range_structs.keys().cloned());
        index.aliases.extend(types.aliases.iter().map(|(k, v)| (k.clone(), v.clone())));
        index.integer_prefixes.clone_from(&types.integer_typedef_prefixes);

        tracing::debug!(
            structs = index.structs.len(),
            enums = index.enums.len(),
            "type index built"
        );
        index
    }

    #[must_use]
    pub fn with_struct(mut self, name: &str) -> Self {
        self.structs.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn with_enum(mut self, name: &str) -> Self {
        self.enums.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn with_tuple(mut self, name: &str) -> Self {
        self.tuples.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn with_byte_range(mut self, name: &str) -> Self {
        self.byte_ranges.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn with_alias(mut self, name: &str, target: &str) -> Self {
        self.aliases.insert(name.to_string(), target.to_string());
        self
    }

    #[must_use]
    pub fn with_integer_prefix(mut self, prefix: &str) -> Self {
        self.integer_prefixes.push(prefix.to_string());
        self
    }

    fn struct_shape(&self, name: &str) -> Option<StructShape> {
        if self.tuples.contains(name) {
            Some(StructShape::Tuple)
        } else if self.byte_ranges.contains(name) {
            Some(StructShape::ByteRange)
        } else if self.structs.contains(name) {
            Some(StructShape::Userdata)
        } else {
            None
        }
    }
}

/// Memoizing classifier over a [`TypeIndex`].
///
/// # Interior Mutability
///
/// The cache sits in a `RefCell` so that classification can take `&self`
/// while generators hold shared references to the classifier.
pub struct Classifier {
    index: TypeIndex,
    cache: RefCell<FxHashMap<String, Category>>,
}

impl Classifier {
    pub fn new(index: TypeIndex) -> Self {
        Self {
            index,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    fn classify_at(&self, raw: &str, depth: u32) -> Category {
        let cached = self.cache.borrow().get(raw).cloned();
        if let Some(category) = cached {
            return category;
        }

        let category = if depth > MAX_ALIAS_DEPTH {
            Category::Unknown
        } else {
            match CType::parse(raw) {
                CType::Named(t) => self.classify_named(&t, depth),
                CType::FnPointer(f) => Category::Callback {
                    ret: Box::new(self.classify_at(&f.ret, depth + 1)),
                    params: f.params.iter().map(|p| self.classify_at(p, depth + 1)).collect(),
                    variadic: f.variadic,
                },
                CType::Malformed => Category::Unknown,
            }
        };

        if category.is_unknown() {
            tracing::debug!(raw, "unclassified type");
        }
        self.cache.borrow_mut().insert(raw.to_string(), category.clone());
        category
    }

    fn classify_named(&self, t: &NamedType, depth: u32) -> Category {
        if t.reference {
            // `const T&` passes like a value; mutable references are not
            // representable at the boundary.
            if t.base_const && t.pointers == 0 && t.dims.is_empty() {
                return self.classify_at(&t.unqualified().render(), depth + 1);
            }
            return Category::Unknown;
        }

        if let Some(elem) = t.element() {
            let size = match t.dims[0] {
                Some(n) if n > 0 => n,
                _ => return Category::Unknown,
            };
            return match self.classify_at(&elem.render(), depth + 1) {
                Category::Unknown | Category::Void => Category::Unknown,
                elem => Category::FixedArray {
                    elem: Box::new(elem),
                    size,
                },
            };
        }

        if let Some(target) = self.index.aliases.get(&t.base) {
            let mut spelled = String::with_capacity(target.len() + 8);
            if t.base_const {
                spelled.push_str("const ");
            }
            spelled.push_str(target);
            for _ in 0..t.pointers {
                spelled.push('*');
            }
            return self.classify_at(&spelled, depth + 1);
        }

        match t.pointers {
            0 => self.classify_base(&t.base),
            1 => {
                if t.base == "char" {
                    return Category::CString;
                }
                match self.classify_base(&t.base) {
                    Category::Void => Category::OpaquePointer {
                        is_const: t.base_const,
                    },
                    Category::StructValue { name, shape } => Category::StructPointer {
                        name,
                        shape,
                        is_const: t.base_const,
                    },
                    scalar if scalar.is_scalar() => Category::Pointer {
                        pointee: Box::new(scalar),
                        is_const: t.base_const,
                    },
                    // a pointer to something the library never declares is a handle
                    _ => Category::OpaquePointer {
                        is_const: t.base_const,
                    },
                }
            }
            _ => Category::Unknown,
        }
    }

    fn classify_base(&self, base: &str) -> Category {
        if let Some(builtin) = builtin_category(base) {
            return builtin;
        }
        if let Some(shape) = self.index.struct_shape(base) {
            return Category::StructValue {
                name: base.to_string(),
                shape,
            };
        }
        if self.index.enums.contains(base) {
            return Category::Enum(base.to_string());
        }
        if self
            .index
            .integer_prefixes
            .iter()
            .any(|p| base.starts_with(p.as_str()))
        {
            return Category::Integer(IntKind::I32);
        }
        Category::Unknown
    }
}

impl TypeClassification for Classifier {
    fn classify(&self, raw: &str) -> Category {
        self.classify_at(raw, 0)
    }
}

/// Language keywords and fixed-width typedefs.
fn builtin_category(base: &str) -> Option<Category> {
    let category = match base {
        "void" => Category::Void,
        "bool" | "_Bool" => Category::Bool,
        "float" => Category::Float(FloatKind::Single),
        "double" | "long double" => Category::Float(FloatKind::Double),
        "int8_t" => Category::Integer(IntKind::I8),
        "uint8_t" => Category::Integer(IntKind::U8),
        "int16_t" => Category::Integer(IntKind::I16),
        "uint16_t" | "char16_t" => Category::Integer(IntKind::U16),
        "int32_t" | "wchar_t" => Category::Integer(IntKind::I32),
        "uint32_t" | "char32_t" => Category::Integer(IntKind::U32),
        "int64_t" | "ssize_t" | "intptr_t" | "ptrdiff_t" => Category::Integer(IntKind::I64),
        "uint64_t" | "size_t" | "uintptr_t" => Category::Integer(IntKind::U64),
        _ => return keyword_integer(base).map(Category::Integer),
    };
    Some(category)
}

/// `unsigned long long`, `short int`, `char`, ... assuming an LP64 target.
fn keyword_integer(base: &str) -> Option<IntKind> {
    let mut signed = true;
    let mut saw_char = false;
    let mut saw_short = false;
    let mut longs = 0u8;
    let mut any = false;

    for word in base.split_whitespace() {
        match word {
            "unsigned" => signed = false,
            "signed" => signed = true,
            "char" => saw_char = true,
            "short" => saw_short = true,
            "long" => longs += 1,
            "int" => {}
            _ => return None,
        }
        any = true;
    }
    if !any {
        return None;
    }

    let bits = if saw_char {
        8
    } else if saw_short {
        16
    } else if longs > 0 {
        64
    } else {
        32
    };
    Some(IntKind::new(bits, signed))
}
