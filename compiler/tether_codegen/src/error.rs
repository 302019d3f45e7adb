//! Per-declaration generation errors.
//!
//! A `CodegenError` never aborts a run. The failing declaration is replaced
//! by an inline comment and the error is recorded as a [`Problem`](crate::Problem).

/// Why one declaration could not be generated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    /// Two overloads of one base name map to the same suffix.
    #[error("overloads of '{base}' collide on suffix '{suffix}'")]
    OverloadCollision { base: String, suffix: String },

    /// A script name is registered twice.
    #[error("script name '{name}' is already registered by '{first}'")]
    DuplicateScriptName { name: String, first: String },

    /// A value of this type cannot cross the boundary in this direction.
    #[error("cannot {action} a value of type '{raw}'")]
    Unsupported { action: &'static str, raw: String },

    #[error("tuple struct '{name}': {reason}")]
    TupleLayout { name: String, reason: String },

    #[error("owned buffer '{owner}.{field}' has no element type (found '{raw}')")]
    OwnedBuffer {
        owner: String,
        field: String,
        raw: String,
    },

    #[error("callback field '{owner}.{field}': {reason}")]
    Callback {
        owner: String,
        field: String,
        reason: String,
    },

    #[error("value {value} of '{item}' does not fit a Lua integer")]
    EnumRange { item: String, value: i128 },
}

impl CodegenError {
    pub(crate) fn unsupported(action: &'static str, raw: &str) -> Self {
        CodegenError::Unsupported {
            action,
            raw: raw.to_string(),
        }
    }

    pub(crate) fn tuple(name: &str, reason: impl Into<String>) -> Self {
        CodegenError::TupleLayout {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Hard problems make the generated module unusable as a whole and fail
    /// the run; the others only lose one declaration.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            CodegenError::OverloadCollision { .. } | CodegenError::DuplicateScriptName { .. }
        )
    }
}
