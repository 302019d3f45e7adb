//! IR loading.
//!
//! Reads the extractor's JSON, converts it into typed declarations, drops
//! dependency-only entries and deduplicates what multi-pass extraction
//! produced twice. IR read failures are the only fatal errors of a run, so
//! everything here reports through [`IrError`].

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use crate::{
    ConstGroup, DeclKind, Declaration, DependencyType, EnumDecl, EnumItem, Field, FunctionDecl,
    Module, Param, ParamFlags, StructDecl,
};

#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("cannot read IR '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed IR JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IR root must be an object with 'decls' or an array of declarations, found {0}")]
    Shape(&'static str),
    #[error("declaration #{index} (kind '{kind}') has no name")]
    MissingName { index: usize, kind: String },
    #[error("function '{name}' has no type")]
    MissingType { name: String },
    #[error("enum '{owner}': cannot resolve value '{value}' of '{item}'")]
    EnumValue {
        owner: String,
        item: String,
        value: String,
    },
}

/// Loader behavior that depends on the bound language.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep same-named functions whose types differ (C++ overloads). When
    /// false, functions deduplicate by name alone.
    pub allow_overloads: bool,
}

// ── Raw JSON shape ──────────────────────────────────────────────

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    decls: Vec<RawDecl>,
}

#[derive(Deserialize)]
struct RawDecl {
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    ty: Option<String>,
    #[serde(default)]
    params: Vec<RawParam>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    is_dep: bool,
    #[serde(default)]
    is_vararg: bool,
}

#[derive(Deserialize)]
struct RawParam {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    has_default: bool,
    #[serde(default)]
    is_out: bool,
}

#[derive(Deserialize)]
struct RawField {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    ty: Option<String>,
}

#[derive(Deserialize)]
struct RawItem {
    name: String,
    #[serde(default)]
    value: Option<RawValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

// ── Entry points ────────────────────────────────────────────────

pub fn load_module(path: &Path, options: LoadOptions) -> Result<Module, IrError> {
    let text = std::fs::read_to_string(path).map_err(|source| IrError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_module(&text, options)
}

/// Parse an IR document: either `{ "module": .., "decls": [..] }` or a bare
/// declaration array.
#[tracing::instrument(level = "debug", skip_all, fields(bytes = text.len()))]
pub fn parse_module(text: &str, options: LoadOptions) -> Result<Module, IrError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let doc = match value {
        serde_json::Value::Object(_) => serde_json::from_value::<RawDocument>(value)?,
        serde_json::Value::Array(_) => RawDocument {
            module: None,
            prefix: None,
            decls: serde_json::from_value(value)?,
        },
        serde_json::Value::Null => return Err(IrError::Shape("null")),
        serde_json::Value::Bool(_) => return Err(IrError::Shape("a boolean")),
        serde_json::Value::Number(_) => return Err(IrError::Shape("a number")),
        serde_json::Value::String(_) => return Err(IrError::Shape("a string")),
    };

    let mut module = Module {
        name: doc.module,
        prefix: doc.prefix,
        ..Module::default()
    };
    let mut seen: FxHashSet<DedupKey> = FxHashSet::default();
    let mut duplicates = 0usize;

    for (index, raw) in doc.decls.into_iter().enumerate() {
        let is_dep = raw.is_dep;
        let Some(decl) = convert(index, raw)? else {
            continue;
        };

        if is_dep {
            if let Declaration::Struct(_) | Declaration::Enum(_) = &decl {
                if let Some(name) = decl.name() {
                    module.dependency_types.push(DependencyType {
                        name: name.to_string(),
                        kind: decl.kind(),
                    });
                }
            }
            continue;
        }

        if !seen.insert(DedupKey::of(&decl, options)) {
            duplicates += 1;
            tracing::debug!(name = decl.name().unwrap_or("<consts>"), "duplicate declaration dropped");
            continue;
        }
        module.decls.push(decl);
    }

    tracing::debug!(
        decls = module.decls.len(),
        deps = module.dependency_types.len(),
        duplicates,
        "IR loaded"
    );
    Ok(module)
}

/// Identity used for deduplication. First occurrence wins.
#[derive(PartialEq, Eq, Hash)]
struct DedupKey {
    kind: DeclKind,
    name: String,
    signature: Option<String>,
}

impl DedupKey {
    fn of(decl: &Declaration, options: LoadOptions) -> Self {
        match decl {
            Declaration::Function(f) => DedupKey {
                kind: DeclKind::Function,
                name: f.name.clone(),
                signature: options.allow_overloads.then(|| f.raw_type.clone()),
            },
            Declaration::Struct(s) => DedupKey {
                kind: DeclKind::Struct,
                name: s.name.clone(),
                signature: None,
            },
            Declaration::Enum(e) => DedupKey {
                kind: DeclKind::Enum,
                name: e.name.clone(),
                signature: None,
            },
            Declaration::ConstGroup(g) => DedupKey {
                kind: DeclKind::ConstGroup,
                name: g
                    .items
                    .iter()
                    .map(|i| i.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                signature: None,
            },
        }
    }
}

// ── Conversion ──────────────────────────────────────────────────

fn convert(index: usize, raw: RawDecl) -> Result<Option<Declaration>, IrError> {
    let name = raw.name.filter(|n| !n.trim().is_empty());
    let decl = match raw.kind.as_str() {
        "func" => {
            let name = name.ok_or_else(|| IrError::MissingName {
                index,
                kind: raw.kind.clone(),
            })?;
            let ty = raw.ty.ok_or_else(|| IrError::MissingType { name: name.clone() })?;
            Declaration::Function(convert_function(name, ty, raw.params, raw.is_vararg))
        }
        "struct" | "class" => {
            let name = name.ok_or_else(|| IrError::MissingName {
                index,
                kind: raw.kind.clone(),
            })?;
            Declaration::Struct(convert_struct(name, raw.fields))
        }
        "enum" => {
            let owner = name.clone().unwrap_or_default();
            let items = resolve_items(&owner, raw.items)?;
            match name {
                Some(name) => Declaration::Enum(EnumDecl { name, items }),
                None => Declaration::ConstGroup(ConstGroup { items }),
            }
        }
        "consts" => Declaration::ConstGroup(ConstGroup {
            items: resolve_items(name.as_deref().unwrap_or(""), raw.items)?,
        }),
        other => {
            tracing::debug!(kind = other, index, "unsupported declaration kind skipped");
            return Ok(None);
        }
    };
    Ok(Some(decl))
}

fn convert_function(name: String, ty: String, raw_params: Vec<RawParam>, is_vararg: bool) -> FunctionDecl {
    let return_type = match ty.find('(') {
        Some(paren) => ty[..paren].trim().to_string(),
        None => ty.trim().to_string(),
    };

    let mut variadic = is_vararg;
    if let Some(paren) = ty.find('(') {
        let params_text = &ty[paren..];
        variadic |= params_text.contains("...") || params_text.contains("va_list");
    }

    let params = raw_params
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            variadic |= p.ty.contains("va_list");
            let mut flags = ParamFlags::empty();
            flags.set(ParamFlags::HAS_DEFAULT, p.has_default);
            flags.set(ParamFlags::IS_OUT, p.is_out);
            let name = match p.name.filter(|n| !n.trim().is_empty()) {
                Some(n) => n,
                None => {
                    flags |= ParamFlags::SYNTHESIZED_NAME;
                    format!("arg{i}")
                }
            };
            Param {
                name,
                ty: p.ty,
                flags,
            }
        })
        .collect();

    FunctionDecl {
        name,
        raw_type: ty,
        return_type,
        params,
        is_variadic: variadic,
    }
}

fn convert_struct(name: String, raw_fields: Vec<RawField>) -> StructDecl {
    let fields = raw_fields
        .into_iter()
        .filter_map(|f| match (f.name, f.ty) {
            (Some(n), Some(t)) if !n.trim().is_empty() => Some(Field::new(n, t)),
            _ => {
                tracing::debug!(owner = %name, "anonymous field dropped");
                None
            }
        })
        .collect();
    StructDecl::new(name, fields)
}

/// Resolve enumerator values. Missing values continue from the previous one.
fn resolve_items(owner: &str, raw_items: Vec<RawItem>) -> Result<Vec<EnumItem>, IrError> {
    let mut known: FxHashMap<String, i128> = FxHashMap::default();
    let mut items = Vec::with_capacity(raw_items.len());
    let mut next: i128 = 0;

    for raw in raw_items {
        let value = match raw.value {
            None => next,
            Some(RawValue::Signed(v)) => i128::from(v),
            Some(RawValue::Unsigned(v)) => i128::from(v),
            Some(RawValue::Text(text)) => {
                eval_value(&text, &known).ok_or_else(|| IrError::EnumValue {
                    owner: owner.to_string(),
                    item: raw.name.clone(),
                    value: text.clone(),
                })?
            }
        };
        next = value.saturating_add(1);
        known.insert(raw.name.clone(), value);
        items.push(EnumItem {
            name: raw.name,
            value,
        });
    }
    Ok(items)
}

/// Evaluate the small expression language headers use for enum values:
/// integer literals, earlier member names, `<<` and `|`.
fn eval_value(text: &str, known: &FxHashMap<String, i128>) -> Option<i128> {
    let mut acc: Option<i128> = None;
    for term in text.split('|') {
        let term = strip_parens(term.trim());
        let value = match term.split_once("<<") {
            Some((lhs, rhs)) => {
                let lhs = eval_atom(strip_parens(lhs.trim()), known)?;
                let rhs = u32::try_from(eval_atom(strip_parens(rhs.trim()), known)?).ok()?;
                lhs.checked_shl(rhs)?
            }
            None => eval_atom(term, known)?,
        };
        acc = Some(acc.map_or(value, |a| a | value));
    }
    acc
}

fn eval_atom(text: &str, known: &FxHashMap<String, i128>) -> Option<i128> {
    if let Some(&v) = known.get(text) {
        return Some(v);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, text),
    };
    let digits = digits.trim_end_matches(['u', 'U', 'l', 'L']);
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i128::from_str_radix(bin, 2).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i128::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn strip_parens(mut text: &str) -> &str {
    while let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        text = inner.trim();
    }
    text
}
