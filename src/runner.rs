use crate::error::{ParseErrors, ScrawlError};
use crate::evaluator::Evaluator;
use crate::lexer::{Lexer, Mode};
use crate::parser::Parser;
use crate::scope::Scope;
use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: Mode,
    /// Bindings placed in the root scope before evaluation.
    pub defines: Vec<(String, Value)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Script,
            defines: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Parse(#[from] ParseErrors),
    #[error(transparent)]
    Runtime(#[from] ScrawlError),
}

impl RunError {
    pub fn report(&self, source: &str, filename: Option<&str>) {
        match self {
            RunError::Parse(errors) => errors.report(source, filename),
            RunError::Runtime(error) => error.report(source, filename),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub output: String,
    pub value: Value,
}

/// Parses and evaluates `source` without printing anything.
pub fn execute(source: &str, options: &RunOptions) -> Result<Execution, RunError> {
    let program = Parser::new(Lexer::new(source.to_string(), options.mode)).parse()?;

    let scope = Scope::new();
    for (name, value) in &options.defines {
        scope.define(name.clone(), value.clone());
    }

    let mut evaluator = Evaluator::new();
    let value = evaluator.evaluate(&program, &scope)?;

    Ok(Execution {
        output: evaluator.output().to_string(),
        value,
    })
}

/// Runs `source`, printing its output to stdout and reporting any error to
/// stderr. Returns whether the run succeeded.
pub fn run(source: &str, filename: Option<&str>, options: &RunOptions) -> bool {
    match execute(source, options) {
        Ok(execution) => {
            print!("{}", execution.output);
            // A top-level return is not emitted as output, show it here.
            if let Value::Return(value) = &execution.value {
                if !value.is_null() {
                    println!("{}", value);
                }
            }
            true
        }
        Err(error) => {
            tracing::debug!(%error, "run failed");
            error.report(source, filename);
            false
        }
    }
}

/// Parses a `NAME=VALUE` command line binding. The value is read as a
/// boolean, then an integer, then a decimal, and otherwise kept as a string.
pub fn parse_define(text: &str) -> Result<(String, Value), String> {
    let (name, raw) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", text))?;

    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return Err(format!("'{}' is not a valid variable name", name));
    }

    let value = match raw {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Integer(n)
            } else if let Ok(n) = raw.parse::<f64>() {
                Value::Decimal(n)
            } else {
                Value::string(raw)
            }
        }
    };

    Ok((name.to_string(), value))
}
