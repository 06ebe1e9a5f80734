//! Interactive prompt
//!
//! Each line is evaluated in the same user context, so words set on one line
//! are visible on the next. Non-void results print as `== value`, errors go
//! to stderr. Commands:
//!
//!   :quit, :q    exit
//!   :help        show help

use crate::session::{Outcome, Session};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;

const PROMPT: &str = ">> ";

fn history_file_path() -> Option<PathBuf> {
    home::home_dir().map(|d| d.join(".local/share/reb_history"))
}

/// What the prompt does with one line of input
#[derive(Debug, PartialEq, Eq)]
pub enum Line<'a> {
    Skip,
    Quit,
    Help,
    Source(&'a str),
}

pub fn classify(line: &str) -> Line<'_> {
    match line.trim() {
        "" => Line::Skip,
        ":quit" | ":q" => Line::Quit,
        ":help" | ":h" => Line::Help,
        source => Line::Source(source),
    }
}

/// Text printed for an evaluation result; errors are written separately
pub fn echo(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Value(Some(text)) => Some(format!("== {text}")),
        _ => None,
    }
}

fn print_help() {
    println!("Enter code to evaluate it. Words persist between lines.");
    println!("  :quit, :q   exit");
    println!("  :help, :h   this message");
    println!("Ctrl-C interrupts a running evaluation; Ctrl-D exits.");
}

/// Run the prompt until EOF, `:quit` or QUIT; returns the exit code
pub fn run(session: &mut Session) -> i32 {
    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error initializing readline: {}", e);
            return crate::session::ERROR_EXIT_CODE;
        }
    };

    let history_file = history_file_path();
    if let Some(ref path) = history_file {
        let _ = rl.load_history(path);
    }

    println!("Reb {}. Type :help for commands, :quit to exit.", env!("CARGO_PKG_VERSION"));

    let mut code = 0;
    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let source = match classify(&line) {
                    Line::Skip => continue,
                    Line::Quit => break,
                    Line::Help => {
                        print_help();
                        continue;
                    }
                    Line::Source(source) => source,
                };
                let _ = rl.add_history_entry(source);

                let outcome = session.evaluate(source, "console");
                match &outcome {
                    Outcome::Failed(report) => eprintln!("{report}"),
                    Outcome::Quit(_) => {
                        code = outcome.exit_code();
                        break;
                    }
                    Outcome::Value(_) => {
                        if let Some(text) = echo(&outcome) {
                            println!("{text}");
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                code = crate::session::ERROR_EXIT_CODE;
                break;
            }
        }
    }

    if let Some(ref path) = history_file {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = rl.save_history(path) {
            tracing::debug!("could not save history to {}: {}", path.display(), e);
        }
    }
    code
}
