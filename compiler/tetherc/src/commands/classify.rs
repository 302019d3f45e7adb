//! The `classify` command: print the category of type spellings.

use std::path::PathBuf;

use tether_types::{Classifier, TypeClassification, TypeIndex};

use super::{flag_value, load_inputs, CommandError};

/// `tether classify --config <binding.toml> [--ir <ir.json>] <type>...`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassifyOptions {
    pub config: PathBuf,
    /// Declarations whose structs and enums should be known.
    pub ir: Option<PathBuf>,
    pub types: Vec<String>,
}

impl ClassifyOptions {
    pub fn parse(args: &[String]) -> Result<Self, CommandError> {
        let mut config = None;
        let mut ir = None;
        let mut types = Vec::new();

        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            match arg {
                "--config" | "-c" => config = Some(flag_value(args, &mut i, arg)?),
                "--ir" => ir = Some(flag_value(args, &mut i, arg)?),
                _ => types.push(args[i].clone()),
            }
            i += 1;
        }

        let Some(config) = config else {
            return Err(CommandError::Usage("missing '--config <binding.toml>'".to_string()));
        };
        if types.is_empty() {
            return Err(CommandError::Usage("no type spellings given".to_string()));
        }
        Ok(Self { config, ir, types })
    }
}

/// One `<raw> => <category>` line per requested spelling.
pub fn classify_types(options: &ClassifyOptions) -> Result<Vec<String>, CommandError> {
    let inputs = load_inputs(options.ir.as_deref(), &options.config)?;
    let classifier = Classifier::new(TypeIndex::build(&inputs.module, &inputs.config));
    Ok(options
        .types
        .iter()
        .map(|raw| classifier.describe(raw).to_string())
        .collect())
}
