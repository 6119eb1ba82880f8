use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::scope::Scope;
use crate::value::Value;
use std::io::{self, Write};

/// Interactive loop. Bindings and functions persist between lines.
pub fn start() {
    println!("Scrawl {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit");
    println!();

    let mut evaluator = Evaluator::new();
    let scope = Scope::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF reached (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                run_line(line, &mut evaluator, &scope);
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}

fn run_line(source: &str, evaluator: &mut Evaluator, scope: &Scope) {
    let program = match Parser::new(Lexer::script(source)).parse() {
        Ok(program) => program,
        Err(errors) => {
            errors.report(source, None);
            return;
        }
    };

    match evaluator.evaluate(&program, scope) {
        Ok(value) => {
            let output = evaluator.output();
            if !output.is_empty() {
                println!("{}", output);
            } else if let Some(shown) = displayed_value(&value) {
                println!("{}", shown);
            }
        }
        Err(error) => error.report(source, None),
    }
}

/// Values worth echoing when a line produced no output of its own.
fn displayed_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Return(inner) => displayed_value(inner),
        other => Some(other.to_string()),
    }
}
