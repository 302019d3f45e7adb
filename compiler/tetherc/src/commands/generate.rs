//! The `generate` command: IR + manifest to C source and a type stub.

use std::path::PathBuf;

use tether_codegen::{generate, GenerationResult};

use super::{flag_value, load_inputs, write_file, CommandError};

/// `tether generate <ir.json> --config <binding.toml> [-o out.c] [--types out.lua]`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub ir: PathBuf,
    pub config: PathBuf,
    /// Standard output when absent.
    pub output: Option<PathBuf>,
    pub types: Option<PathBuf>,
}

impl GenerateOptions {
    /// Parse the arguments following `generate`.
    pub fn parse(args: &[String]) -> Result<Self, CommandError> {
        let mut ir = None;
        let mut config = None;
        let mut output = None;
        let mut types = None;

        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            match arg {
                "--config" | "-c" => config = Some(flag_value(args, &mut i, arg)?),
                "--output" | "-o" => output = Some(flag_value(args, &mut i, arg)?),
                "--types" | "-t" => types = Some(flag_value(args, &mut i, arg)?),
                _ if arg.starts_with('-') => {
                    return Err(CommandError::Usage(format!("unknown option '{arg}'")));
                }
                _ if ir.is_none() => ir = Some(PathBuf::from(arg)),
                _ => {
                    return Err(CommandError::Usage(format!("unexpected argument '{arg}'")));
                }
            }
            i += 1;
        }

        let Some(ir) = ir else {
            return Err(CommandError::Usage("missing IR file".to_string()));
        };
        let Some(config) = config else {
            return Err(CommandError::Usage("missing '--config <binding.toml>'".to_string()));
        };
        Ok(Self {
            ir,
            config,
            output,
            types,
        })
    }
}

/// What a successful run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerateSummary {
    /// The generated source when no output file was given.
    pub code: Option<String>,
    /// Declarations left out, rendered one per line.
    pub problems: Vec<String>,
    pub placeholders: u32,
}

/// Run the generator and write its outputs.
///
/// Outputs are written even when some declarations failed, so the
/// generated file can be inspected; hard problems still fail the command,
/// carrying the source when it was not written to a file.
#[tracing::instrument(level = "info", skip_all, fields(ir = %options.ir.display()))]
pub fn generate_bindings(options: &GenerateOptions) -> Result<GenerateSummary, CommandError> {
    let inputs = load_inputs(Some(&options.ir), &options.config)?;
    let GenerationResult {
        code,
        stubs,
        problems,
        placeholders,
    } = generate(&inputs.module, &inputs.config);

    if let Some(path) = &options.types {
        write_file(path, &stubs)?;
    }
    let code = match &options.output {
        Some(path) => {
            write_file(path, &code)?;
            None
        }
        None => Some(code),
    };

    let hard: Vec<String> = problems
        .iter()
        .filter(|p| p.error.is_hard())
        .map(ToString::to_string)
        .collect();
    if !hard.is_empty() {
        return Err(CommandError::HardProblems {
            problems: hard,
            code,
        });
    }
    Ok(GenerateSummary {
        code,
        problems: problems.iter().map(ToString::to_string).collect(),
        placeholders,
    })
}
