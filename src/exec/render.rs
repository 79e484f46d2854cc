// src/exec/render.rs

//! Command rendering: command template + template data -> argument vector.
//!
//! Templates are rendered with `minijinja` in strict mode, so referencing a
//! field that is not present in the data is an error instead of an empty
//! string. Go-style field references such as `{{.Greeting}}` or
//! `{{ .Payload.id }}` are accepted and mean the same as `{{ Greeting }}` and
//! `{{ Payload.id }}`.
//!
//! The rendered string is split on whitespace. No shell is involved, so
//! quoting, globbing and pipes are not interpreted.

use std::fmt;
use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use thiserror::Error;

/// Named values made available to a command template.
pub type TemplateData = serde_json::Map<String, serde_json::Value>;

/// Why a command could not be produced from its template.
///
/// Both variants are raised before any process is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Malformed template or a reference to an undefined field.
    #[error("template error: {0}")]
    Template(String),

    /// The template rendered to nothing but whitespace.
    #[error("rendered command is empty")]
    EmptyCommand,
}

/// A rendered command: `argv[0]` is the program, the rest are its arguments.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    argv: Vec<String>,
}

impl RenderedCommand {
    /// Tokenize an already rendered command line on whitespace.
    pub fn from_line(line: &str) -> Result<Self, RenderError> {
        let argv: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if argv.is_empty() {
            return Err(RenderError::EmptyCommand);
        }
        Ok(Self { argv })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for RenderedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

static GO_FIELD_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(-?)\s*\.([A-Za-z_])").expect("field reference pattern is valid")
});

/// Rewrite `{{.Field}}` into `{{ Field}}` so minijinja can resolve it.
fn normalize_field_refs(template: &str) -> std::borrow::Cow<'_, str> {
    GO_FIELD_REF.replace_all(template, "{{${1} ${2}")
}

/// Render `template` against `data` and split the result into argv.
///
/// Pure: the same template and data always give the same command.
pub fn render(template: &str, data: &TemplateData) -> Result<RenderedCommand, RenderError> {
    let source = normalize_field_refs(template);

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    let rendered = env
        .render_str(&source, data)
        .map_err(|e| RenderError::Template(e.to_string()))?;

    RenderedCommand::from_line(&rendered)
}
