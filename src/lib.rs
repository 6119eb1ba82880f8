// Scrawl interpreter library
//
// Lexer, parser and tree-walking evaluator for a small expression language
// that runs either as plain script or as text templates with {% %} islands.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod scope;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use error::{ErrorKind, ParseErrors, ScrawlError, Span};
pub use evaluator::{CallContext, Evaluator};
pub use lexer::{Lexer, Mode, Token, TokenType};
pub use parser::Parser;
pub use scope::Scope;
pub use value::{FileValue, HashKey, HashValue, Hashable, Value};

pub use repl::start as start_repl;
pub use runner::{run, RunOptions};

/// Parses `source` as a script.
pub fn parse_script(source: &str) -> Result<Program, ParseErrors> {
    Parser::new(Lexer::script(source)).parse()
}

/// Parses `source` as a template.
pub fn parse_template(source: &str) -> Result<Program, ParseErrors> {
    Parser::new(Lexer::template(source)).parse()
}
