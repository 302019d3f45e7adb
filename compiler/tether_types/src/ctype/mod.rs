//! Structural reading of C type spellings.
//!
//! The IR carries types as the strings clang printed. This module splits a
//! spelling into its base name, qualifiers, pointer depth, array dimensions
//! and function-pointer signature without judging whether the base name is
//! known. Parsing never fails; spellings it cannot take apart come back as
//! [`CType::Malformed`].

use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CType {
    Named(NamedType),
    FnPointer(FnPointerType),
    Malformed,
}

/// `[const] base [*...] [&] [dims...]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedType {
    /// Base name with qualifiers removed, e.g. `unsigned int`, `sg_range`.
    pub base: String,
    /// `const` applies to the base (pointee) type.
    pub base_const: bool,
    pub pointers: u8,
    /// C++ reference.
    pub reference: bool,
    /// Array dimensions, outermost first. `None` for `[]` or a
    /// non-numeric bound.
    pub dims: SmallVec<[Option<usize>; 2]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnPointerType {
    pub ret: String,
    pub params: Vec<String>,
    pub variadic: bool,
}

impl CType {
    pub fn parse(raw: &str) -> CType {
        let s = raw.trim();
        if s.is_empty() {
            return CType::Malformed;
        }
        if s.contains('(') {
            return parse_fn_pointer(s).map_or(CType::Malformed, CType::FnPointer);
        }
        parse_named(s).map_or(CType::Malformed, CType::Named)
    }
}

impl NamedType {
    /// Canonical spelling, e.g. `const char*` or `float[4][4]`.
    pub fn render(&self) -> String {
        let mut s = String::with_capacity(self.base.len() + 12);
        if self.base_const {
            s.push_str("const ");
        }
        s.push_str(&self.base);
        for _ in 0..self.pointers {
            s.push('*');
        }
        if self.reference {
            s.push('&');
        }
        for dim in &self.dims {
            match dim {
                Some(n) => s.push_str(&format!("[{n}]")),
                None => s.push_str("[]"),
            }
        }
        s
    }

    /// Element type of an array: the outermost dimension removed.
    pub fn element(&self) -> Option<NamedType> {
        if self.dims.is_empty() {
            return None;
        }
        let mut elem = self.clone();
        elem.dims.remove(0);
        Some(elem)
    }

    /// Pointee of a (non-array) pointer.
    pub fn pointee(&self) -> Option<NamedType> {
        if self.pointers == 0 || !self.dims.is_empty() {
            return None;
        }
        let mut inner = self.clone();
        inner.pointers -= 1;
        Some(inner)
    }

    /// The same type with top-level `const` and reference removed, as
    /// needed to declare a writable local.
    pub fn unqualified(&self) -> NamedType {
        let mut t = self.clone();
        if t.pointers == 0 {
            t.base_const = false;
        }
        t.reference = false;
        t
    }
}

fn parse_named(s: &str) -> Option<NamedType> {
    let mut body = s;
    let mut dims: SmallVec<[Option<usize>; 2]> = SmallVec::new();
    while body.ends_with(']') {
        let open = body.rfind('[')?;
        let inner = body[open + 1..body.len() - 1].trim();
        dims.insert(0, inner.parse::<usize>().ok());
        body = body[..open].trim_end();
    }
    if body.contains(['[', ']', '(', ')']) {
        return None;
    }

    let mut t = NamedType {
        base: String::new(),
        base_const: false,
        pointers: 0,
        reference: false,
        dims,
    };
    for token in tokenize(body) {
        match token {
            "const" => {
                // `char* const` qualifies the pointer, not the pointee
                if t.pointers == 0 && !t.reference {
                    t.base_const = true;
                }
            }
            "volatile" | "restrict" | "__restrict" | "struct" | "enum" | "union" | "class"
            | "typename" => {}
            "*" => {
                if t.base.is_empty() || t.reference {
                    return None;
                }
                t.pointers = t.pointers.saturating_add(1);
            }
            "&" => {
                if t.base.is_empty() || t.reference {
                    return None;
                }
                t.reference = true;
            }
            ident => {
                // A name after a declarator is a parameter name, not a type.
                if t.pointers > 0 || t.reference {
                    return None;
                }
                if !t.base.is_empty() {
                    t.base.push(' ');
                }
                t.base.push_str(ident);
            }
        }
    }
    if t.base.is_empty() {
        return None;
    }
    Some(t)
}

/// Split on whitespace, emitting `*` and `&` as tokens of their own.
fn tokenize(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() || c == '*' || c == '&' {
            if let Some(st) = start.take() {
                tokens.push(&s[st..i]);
            }
            if c == '*' || c == '&' {
                tokens.push(&s[i..i + 1]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(st) = start {
        tokens.push(&s[st..]);
    }
    tokens
}

/// `ret (*)(a, b)` with an optional name or qualifiers inside the
/// declarator group.
fn parse_fn_pointer(s: &str) -> Option<FnPointerType> {
    let open = s.find('(')?;
    let close = matching_paren(s, open)?;
    let declarator = &s[open + 1..close];
    let is_declarator = declarator.contains('*')
        && declarator
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '*' || c.is_whitespace());
    if !is_declarator {
        return None;
    }

    let rest = s[close + 1..].trim();
    if !rest.starts_with('(') {
        return None;
    }
    let params_close = matching_paren(rest, 0)?;
    if params_close != rest.len() - 1 {
        return None;
    }

    let ret = s[..open].trim();
    if ret.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    let mut variadic = false;
    for part in split_top_level(&rest[1..params_close]) {
        match part {
            "" | "void" => {}
            "..." => variadic = true,
            p => params.push(p.to_string()),
        }
    }
    Some(FnPointerType {
        ret: ret.to_string(),
        params,
        variadic,
    })
}

fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a parameter list at commas outside nested brackets.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '<' => depth += 1,
            ')' | ']' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// A C declaration of `name` with type `raw`.
///
/// `float[3]` → `float name[3]`, `void (*)(int)` → `void (*name)(int)`.
pub fn declare(raw: &str, name: &str) -> String {
    match CType::parse(raw) {
        CType::Named(t) => {
            let mut scalar = t.clone();
            scalar.dims.clear();
            let mut out = format!("{} {name}", scalar.render());
            for dim in &t.dims {
                match dim {
                    Some(n) => out.push_str(&format!("[{n}]")),
                    None => out.push_str("[]"),
                }
            }
            out
        }
        CType::FnPointer(f) => {
            let mut params = f.params.join(", ");
            if f.variadic {
                if params.is_empty() {
                    params.push_str("...");
                } else {
                    params.push_str(", ...");
                }
            } else if params.is_empty() {
                params.push_str("void");
            }
            format!("{} (*{name})({params})", f.ret)
        }
        CType::Malformed => format!("{} {name}", raw.trim()),
    }
}

/// Spelling of a writable local holding a value of type `raw`.
pub fn value_type(raw: &str) -> String {
    match CType::parse(raw) {
        CType::Named(t) => t.unqualified().render(),
        _ => raw.trim().to_string(),
    }
}

/// Element spelling of an array type.
pub fn element_type(raw: &str) -> Option<String> {
    match CType::parse(raw) {
        CType::Named(t) => t.element().map(|e| e.render()),
        _ => None,
    }
}

/// Pointee spelling of a pointer type.
pub fn pointee_type(raw: &str) -> Option<String> {
    match CType::parse(raw) {
        CType::Named(t) => t.pointee().map(|p| p.render()),
        _ => None,
    }
}
