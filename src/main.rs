use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser as CliParser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use rime::ast::{Expr, Program, StmtKind};
use rime::evaluator::Evaluator;
use rime::importer::{FileModule, MemoryModule};
use rime::lexer::tokenize;
use rime::parser::Parser;
use rime::report;
use rime::value::Value;

#[derive(Debug, CliParser)]
#[command(name = "rime", version, about = "The rime scripting language")]
struct Cli {
    /// Script to run; starts the REPL when omitted.
    script: Option<PathBuf>,

    /// Additional directory to resolve imports against (repeatable).
    #[arg(long = "module-path", value_name = "DIR")]
    module_paths: Vec<PathBuf>,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RIME_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.script {
        Some(script) => run_script(&script, &cli.module_paths),
        None => repl(&cli.module_paths),
    }
}

fn run_script(script: &Path, module_paths: &[PathBuf]) -> Result<()> {
    let base_dir = script
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut evaluator = Evaluator::with_base_dir(base_dir);
    for dir in module_paths {
        evaluator.add_module_path(dir.clone());
    }

    let module = FileModule::new(script);
    if let Err(err) = evaluator.import(&module) {
        eprintln!("{}", report::render_import_error(&err, &module));
        std::process::exit(1);
    }

    Ok(())
}

fn repl(module_paths: &[PathBuf]) -> Result<()> {
    println!("rime {} (Ctrl-D to exit)", env!("CARGO_PKG_VERSION"));

    let mut editor = DefaultEditor::new()?;
    let mut evaluator = Evaluator::new();
    for dir in module_paths {
        evaluator.add_module_path(dir.clone());
    }

    loop {
        match editor.readline("rime> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                eval_line(&mut evaluator, &line);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }

    Ok(())
}

fn eval_line(evaluator: &mut Evaluator, line: &str) {
    let module = MemoryModule::new("<repl>", line);

    let tokens = match tokenize(line) {
        Ok(tokens) => tokens,
        Err(errors) => {
            eprintln!("{}", report::render_lex_errors(&errors, &module));
            return;
        }
    };

    let program = match Parser::new(tokens).parse_program() {
        Ok(program) => program,
        Err(errors) => {
            eprintln!("{}", report::render_parse_errors(&errors, &module));
            return;
        }
    };

    // A lone expression prints its value; anything else runs silently.
    match single_expression(&program) {
        Some(expr) => match evaluator.evaluate_expression(expr) {
            Ok(Value::Nil) => {}
            Ok(value) => println!("{value}"),
            Err(err) => eprintln!("{}", report::render_eval_error(&err, &module)),
        },
        None => {
            if let Err(err) = evaluator.evaluate(&program) {
                eprintln!("{}", report::render_eval_error(&err, &module));
            }
        }
    }
}

fn single_expression(program: &Program) -> Option<&Expr> {
    match program.statements.as_slice() {
        [stmt] => match &stmt.kind {
            StmtKind::Expr(expr) => Some(expr),
            _ => None,
        },
        _ => None,
    }
}
