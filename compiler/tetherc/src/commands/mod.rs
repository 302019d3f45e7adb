//! Command handlers for the tether CLI.
//!
//! Handlers return a `Result` and never exit; `main.rs` turns an error into
//! a message and exit status 1.

use std::path::{Path, PathBuf};

use tether_ir::{BindingConfig, ConfigError, IrError, Language, LoadOptions, Module};

mod classify;
mod generate;

pub use classify::{classify_types, ClassifyOptions};
pub use generate::{generate_bindings, GenerateOptions, GenerateSummary};

/// Why a command failed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Ir(#[from] IrError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("module is incomplete: {}", .problems.join("; "))]
    HardProblems {
        problems: Vec<String>,
        /// The generated source when no output file was given.
        code: Option<String>,
    },
}

/// Parsed manifest and IR, ready for generation.
pub(crate) struct Inputs {
    pub module: Module,
    pub config: BindingConfig,
}

/// Load the manifest and then the IR it describes.
///
/// C++ libraries keep same-named functions whose signatures differ.
pub(crate) fn load_inputs(ir: Option<&Path>, config: &Path) -> Result<Inputs, CommandError> {
    let config = BindingConfig::load(config)?;
    let options = LoadOptions {
        allow_overloads: config.output.language == Language::Cpp,
    };
    let mut module = match ir {
        Some(path) => tether_ir::load_module(path, options)?,
        None => Module::default(),
    };
    config.attach_owned_buffers(&mut module)?;
    Ok(Inputs { module, config })
}

/// Take the value following a flag such as `--config`.
pub(crate) fn flag_value(
    args: &[String],
    i: &mut usize,
    flag: &str,
) -> Result<PathBuf, CommandError> {
    *i += 1;
    args.get(*i)
        .map(PathBuf::from)
        .ok_or_else(|| CommandError::Usage(format!("missing value for '{flag}'")))
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), CommandError> {
    std::fs::write(path, contents).map_err(|source| CommandError::Write {
        path: path.display().to_string(),
        source,
    })
}
