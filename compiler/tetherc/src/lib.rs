//! Tether Binding Generator
//!
//! Library half of the `tether` binary: argument parsing and the command
//! handlers, kept out of `main.rs` so they can be tested.
//!
//! # Architecture
//!
//! ```text
//! binding.toml ──► BindingConfig ─┐
//!                                 ├──► tether_codegen::generate ──► out.c
//! ir.json ──► load_module ────────┘                             └─► out.lua
//! ```

use std::sync::Once;

pub mod commands;

static TRACING_INIT: Once = Once::new();

/// Install the tracing subscriber.
///
/// Only active when `TETHER_LOG` (or `RUST_LOG`) is set, e.g.
/// `TETHER_LOG=tether_codegen=debug`. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{prelude::*, EnvFilter};

        let directives = std::env::var("TETHER_LOG").or_else(|_| std::env::var("RUST_LOG"));
        if let Ok(directives) = directives {
            let filter = EnvFilter::new(directives);
            tracing_subscriber::registry()
                .with(
                    tracing_tree::HierarchicalLayer::new(2)
                        .with_writer(std::io::stderr)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .with(filter)
                .init();
        }
    });
}
