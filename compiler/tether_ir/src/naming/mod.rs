//! Library naming rules.
//!
//! A `LibraryNamingConfig` is built once per run and passed by reference to
//! every generator. All script-visible names (function names, struct class
//! names, metatable names, enum member names) are derived here so that two
//! generators can never disagree about what a declaration is called.

use serde::Deserialize;

use crate::Module;

/// Reserved words of the scripting runtime. Registering a function under one
/// of these would make it unreachable with `module.name` syntax.
pub const SCRIPT_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// How a script name that collides with a reserved word is registered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordPolicy {
    /// Register both `end` and `end_`.
    #[default]
    Alias,
    /// Register only `end_`.
    Rename,
}

/// Naming tables of one bound library.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryNamingConfig {
    /// Script module name, e.g. `gfx`.
    pub module: String,
    /// Native prefix stripped from function names, e.g. `sg_` or `b2`.
    pub prefix: String,
    /// First component of metatable names, e.g. `sokol` in `sokol.Range`.
    pub metatable_namespace: String,
    /// Overrides the derived `luaopen_*` entry point name.
    pub entry_point: Option<String>,
    /// Prefixes stripped from struct and enum names. The module prefix is
    /// always included.
    pub type_prefixes: Vec<String>,
    /// Qualifier placed before native calls, e.g. `ImGui::`.
    pub call_prefix: String,
    pub keyword_policy: KeywordPolicy,
    /// Uppercase enum member short names (`NoTitleBar` → `NOTITLEBAR`).
    pub uppercase_enum_items: bool,
    /// Prefix stripped from loose constants. Defaults to the module prefix.
    pub const_strip_prefix: Option<String>,
}

impl LibraryNamingConfig {
    pub fn new(module: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Fill the module name and prefix from the IR document when the
    /// manifest left them empty.
    pub fn fill_from_ir(&mut self, module: &Module) {
        if self.module.is_empty() {
            if let Some(name) = &module.name {
                self.module.clone_from(name);
            }
        }
        if self.prefix.is_empty() {
            if let Some(prefix) = &module.prefix {
                self.prefix.clone_from(prefix);
            }
        }
    }

    /// Metatable namespace, falling back to the module name.
    pub fn namespace(&self) -> &str {
        if self.metatable_namespace.is_empty() {
            &self.module
        } else {
            &self.metatable_namespace
        }
    }

    pub fn entry_point_name(&self) -> String {
        if let Some(name) = &self.entry_point {
            return name.clone();
        }
        let ns = self.namespace();
        if ns == self.module {
            format!("luaopen_{}", self.module)
        } else {
            format!("luaopen_{ns}_{}", self.module)
        }
    }

    /// Script name of a native function, before keyword handling.
    ///
    /// `sg_make_buffer` → `make_buffer`, `b2World_Step` → `world_step`,
    /// `ColorEdit4` → `color_edit4`.
    pub fn function_script_name(&self, native: &str) -> String {
        snake_case(strip_prefix(native, &self.prefix))
    }

    /// Names under which a script function is registered.
    pub fn registered_names(&self, script_name: &str) -> Vec<String> {
        if !is_script_keyword(script_name) {
            return vec![script_name.to_string()];
        }
        let renamed = format!("{script_name}_");
        match self.keyword_policy {
            KeywordPolicy::Alias => vec![script_name.to_string(), renamed],
            KeywordPolicy::Rename => vec![renamed],
        }
    }

    /// PascalCase script name of a struct or enum.
    ///
    /// `sg_buffer_desc` → `BufferDesc`, `b2BodyDef` → `BodyDef`,
    /// `ImGuiWindowFlags_` → `WindowFlags`.
    pub fn struct_script_name(&self, native: &str) -> String {
        let stripped = strip_prefix(native, self.longest_type_prefix(native));
        let stripped = stripped.strip_suffix("_t").unwrap_or(stripped);
        let stripped = stripped.trim_end_matches('_');
        let pascal = pascal_case(stripped);
        if pascal.is_empty() || pascal.starts_with(|c: char| c.is_ascii_digit()) {
            pascal_case(native)
        } else {
            pascal
        }
    }

    /// Registry key of a struct's metatable, e.g. `sokol.BufferDesc`.
    pub fn metatable_name(&self, native: &str) -> String {
        format!("{}.{}", self.namespace(), self.struct_script_name(native))
    }

    /// Short script name of an enum member.
    ///
    /// Strips the longest prefix derived from the enum name or the library
    /// prefix, comparing case-insensitively. Returns the full native name if
    /// nothing matches or stripping would leave nothing.
    pub fn enum_item_short_name(&self, enum_name: &str, item: &str) -> String {
        let short = self.strip_enum_prefix(enum_name, item);
        if self.uppercase_enum_items {
            short.to_ascii_uppercase()
        } else {
            short
        }
    }

    fn strip_enum_prefix(&self, enum_name: &str, item: &str) -> String {
        let item_upper = item.to_ascii_uppercase();
        let best = self
            .enum_item_prefixes(enum_name)
            .into_iter()
            .filter(|p| item_upper.starts_with(p.as_str()) && item.len() > p.len())
            .max_by_key(String::len);

        match best {
            Some(p) => {
                let short = item[p.len()..].trim_start_matches('_');
                if short.is_empty() {
                    item.to_string()
                } else {
                    short.to_string()
                }
            }
            None => item.to_string(),
        }
    }

    /// Script name of a loose constant: prefix stripped, uppercased.
    pub fn const_item_name(&self, item: &str) -> String {
        let prefix = self.const_strip_prefix.as_deref().unwrap_or(&self.prefix);
        let stripped = if !prefix.is_empty()
            && item.len() > prefix.len()
            && item.is_char_boundary(prefix.len())
            && item[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            item[prefix.len()..].trim_start_matches('_')
        } else {
            item
        };
        if stripped.is_empty() {
            item.to_ascii_uppercase()
        } else {
            stripped.to_ascii_uppercase()
        }
    }

    fn longest_type_prefix(&self, native: &str) -> &str {
        self.type_prefixes
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.prefix.as_str()))
            .filter(|p| !p.is_empty() && native.starts_with(p) && native.len() > p.len())
            .max_by_key(|p| p.len())
            .unwrap_or("")
    }

    /// Uppercased candidate prefixes for members of `enum_name`.
    fn enum_item_prefixes(&self, enum_name: &str) -> Vec<String> {
        let base = enum_name.strip_suffix("_t").unwrap_or(enum_name);
        let base = base.trim_end_matches('_');
        let mut out = Vec::with_capacity(8);

        // sg_load_action -> SG_LOADACTION_ and SG_LOAD_ACTION_
        let parts: Vec<&str> = base.split('_').filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 {
            let squashed = format!("{}_{}_", parts[0], parts[1..].concat()).to_ascii_uppercase();
            out.push(format!("_{squashed}"));
            out.push(squashed);
        }
        out.push(format!("{base}_").to_ascii_uppercase());
        out.push(base.to_ascii_uppercase());

        // ImGuiWindowFlags -> IMGUI_WINDOW_FLAGS_
        let snake = snake_case(base);
        if snake != base {
            out.push(format!("{snake}_").to_ascii_uppercase());
        }

        if !self.prefix.is_empty() {
            let p = self.prefix.to_ascii_uppercase();
            out.push(format!("_{p}"));
            out.push(p);
        }
        out
    }
}

/// Whether `name` is a reserved word of the scripting runtime.
pub fn is_script_keyword(name: &str) -> bool {
    SCRIPT_KEYWORDS.contains(&name)
}

fn strip_prefix<'a>(native: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() || native.len() <= prefix.len() {
        return native;
    }
    native.strip_prefix(prefix).unwrap_or(native)
}

/// Convert a `CamelCase` or `Mixed_Case` identifier to `snake_case`.
///
/// Acronym runs stay together (`GetIO` → `get_io`, `RGBToHSV` →
/// `rgb_to_hsv`) and digits stick to the preceding word.
pub fn snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            if i > 0 && !out.is_empty() && !out.ends_with('_') {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_lower)
                {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn pascal_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for part in s.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
