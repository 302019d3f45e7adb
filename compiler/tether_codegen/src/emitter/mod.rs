//! Append-only text output.
//!
//! One `Emitter` collects the text of one declaration (or of the module
//! scaffolding). It knows nothing about C beyond indentation and block
//! braces; what to write is decided by the generators.

/// Marker written in place of code for values that cannot cross the
/// boundary. Reviewers grep generated files for it.
pub const PLACEHOLDER_MARKER: &str = "TETHER_UNSUPPORTED";

#[derive(Debug, Default)]
pub struct Emitter {
    /// Current indentation level.
    indent: usize,
    output: String,
    /// Counter for generating unique temporary names.
    temp_counter: u32,
    placeholders: u32,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            indent: 0,
            output: String::with_capacity(4096),
            temp_counter: 0,
            placeholders: 0,
        }
    }

    /// Generate a unique temporary variable name.
    pub fn fresh_temp(&mut self) -> String {
        let n = self.temp_counter;
        self.temp_counter += 1;
        format!("_tmp{n}")
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        debug_assert!(self.indent > 0, "dedent called with zero indent");
        self.indent = self.indent.saturating_sub(1);
    }

    /// Write a line with indentation and newline.
    pub fn writeln(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(s);
        self.output.push('\n');
    }

    /// Preprocessor line, always at column zero.
    pub fn directive(&mut self, s: &str) {
        self.output.push_str(s);
        self.output.push('\n');
    }

    pub fn newline(&mut self) {
        self.output.push('\n');
    }

    /// Banner comment introducing a section of generated code.
    pub fn section(&mut self, title: &str) {
        const RULE: &str =
            "/* ========================================================================== */";
        self.writeln(RULE);
        self.writeln(&format!("/* {title} */"));
        self.writeln(RULE);
        self.newline();
    }

    /// `header {` followed by one level of indentation.
    pub fn open(&mut self, header: &str) {
        if header.is_empty() {
            self.writeln("{");
        } else {
            self.writeln(&format!("{header} {{"));
        }
        self.indent();
    }

    /// Close the innermost block opened with [`open`](Self::open).
    pub fn close(&mut self) {
        self.dedent();
        self.writeln("}");
    }

    /// `} header {`, e.g. `} else {`.
    pub fn reopen(&mut self, header: &str) {
        self.dedent();
        self.writeln(&format!("}} {header} {{"));
        self.indent();
    }

    /// Close the innermost block with a trailing `;`.
    pub fn close_with_semicolon(&mut self) {
        self.dedent();
        self.writeln("};");
    }

    /// Record a value that cannot be marshaled.
    pub fn placeholder(&mut self, what: &str) {
        self.placeholders += 1;
        tracing::warn!(what, "emitting placeholder");
        self.writeln(&format!("/* {PLACEHOLDER_MARKER}: {what} */"));
    }

    pub fn placeholders(&self) -> u32 {
        self.placeholders
    }

    /// Append everything another emitter produced, including its
    /// placeholder count.
    pub fn append(&mut self, other: Emitter) {
        self.output.push_str(&other.output);
        self.placeholders += other.placeholders;
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
