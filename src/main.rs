use clap::{Arg, ArgAction, Command};
use scrawl::lexer::Mode;
use scrawl::runner::{self, RunOptions};
use std::fs;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let matches = Command::new("scrawl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Interpreter for Scrawl scripts and templates")
        .arg(
            Arg::new("file")
                .help("The script or template file to run")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("template")
                .short('t')
                .long("template")
                .help("Treat the file as a template with {% ... %} code islands")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("define")
                .short('D')
                .long("define")
                .value_name("NAME=VALUE")
                .help("Bind a variable in the root scope")
                .action(ArgAction::Append),
        )
        .get_matches();

    let mut defines = Vec::new();
    for text in matches.get_many::<String>("define").into_iter().flatten() {
        match runner::parse_define(text) {
            Ok(define) => defines.push(define),
            Err(message) => {
                eprintln!("Error: {}", message);
                process::exit(2);
            }
        }
    }

    let options = RunOptions {
        mode: if matches.get_flag("template") {
            Mode::Template
        } else {
            Mode::Script
        },
        defines,
    };

    match matches.get_one::<String>("file") {
        Some(file_path) if !matches.get_flag("interactive") => run_file(file_path, &options),
        _ => scrawl::start_repl(),
    }
}

/// Log filter comes from `SCRAWL_LOG`, e.g. `SCRAWL_LOG=scrawl=debug`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("SCRAWL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn run_file(path: &str, options: &RunOptions) {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        process::exit(1);
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let filename = path.to_string_lossy();
            if !runner::run(&source, Some(filename.as_ref()), options) {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}
