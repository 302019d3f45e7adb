//! Tether CLI
//!
//! Generates Lua 5.4 C-API bindings from a declaration IR.

use tetherc::commands::{
    classify_types, generate_bindings, ClassifyOptions, CommandError, GenerateOptions,
};

fn main() {
    tetherc::init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = &args[1];
    let rest = &args[2..];

    match command.as_str() {
        "generate" | "gen" => {
            let summary = GenerateOptions::parse(rest).and_then(|o| generate_bindings(&o));
            match summary {
                Ok(summary) => {
                    for problem in &summary.problems {
                        eprintln!("warning: skipped {problem}");
                    }
                    if summary.placeholders > 0 {
                        eprintln!(
                            "note: {} unsupported value(s) marked TETHER_UNSUPPORTED",
                            summary.placeholders
                        );
                    }
                    if let Some(code) = summary.code {
                        print!("{code}");
                    }
                }
                Err(e) => {
                    if let CommandError::HardProblems {
                        code: Some(code), ..
                    } = &e
                    {
                        print!("{code}");
                    }
                    fail("generate", &e)
                }
            }
        }
        "classify" => match ClassifyOptions::parse(rest).and_then(|o| classify_types(&o)) {
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
            Err(e) => fail("classify", &e),
        },
        "help" | "--help" | "-h" => {
            print_usage();
        }
        "version" | "--version" | "-V" => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn fail(command: &str, error: &CommandError) -> ! {
    eprintln!("error: {error}");
    if matches!(error, CommandError::Usage(_)) {
        eprintln!();
        eprintln!("Run `tether help` for the usage of '{command}'.");
    }
    std::process::exit(1);
}

fn print_usage() {
    println!("Tether - Lua C-API binding generator");
    println!();
    println!("Usage: tether <command> [options]");
    println!();
    println!("Commands:");
    println!("  generate <ir.json>   Generate bindings for a declaration IR");
    println!("  classify <type>...   Show the category of C type spellings");
    println!("  help                 Show this help message");
    println!("  version              Show version information");
    println!();
    println!("Generate options:");
    println!("  -c, --config <file>  Binding manifest (required)");
    println!("  -o, --output <file>  Write C source here (default: stdout)");
    println!("  -t, --types <file>   Write a LuaCATS stub file");
    println!();
    println!("Classify options:");
    println!("  -c, --config <file>  Binding manifest (required)");
    println!("  --ir <file>          Make the IR's structs and enums known");
    println!();
    println!("Logging:");
    println!("  TETHER_LOG=<filter>  e.g. TETHER_LOG=tether_codegen=debug");
}
