//! reb - run Reb source files, evaluate strings, or explore interactively
//!
//! Usage:
//!   reb                        # interactive prompt
//!   reb run script.reb         # evaluate a file
//!   reb eval "1 + 2"           # evaluate a string and print the result
//!   reb completions bash       # shell completion script
//!
//! Exit status: 0 normally, the QUIT code when a script asks for one, 1 for
//! an uncaught error, 255 after a panic. Set `REB_REPORT` for an at-exit
//! report and `RUST_LOG` for runtime logging.

mod repl;
mod session;

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use reb_runtime::config::RuntimeConfig;
use reb_runtime::{PANIC_EXIT_CODE, ReportConfig, emit_report, install_halt_handler};
use session::{ERROR_EXIT_CODE, Outcome, Session};
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "reb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reb interpreter - run scripts or evaluate code", long_about = None)]
struct Cli {
    /// Runtime configuration file (TOML); REB_* env vars override it
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a source file
    Run {
        /// Input source file
        file: PathBuf,
    },

    /// Evaluate a string and print its result
    Eval {
        /// Source text
        source: String,
    },

    /// Start the interactive prompt (the default)
    Repl,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

enum Job {
    Run(PathBuf),
    Eval(String),
    Repl,
}

fn main() {
    let cli = Cli::parse();

    let job = match cli.command {
        Some(Commands::Completions { shell }) => {
            run_completions(shell);
            return;
        }
        Some(Commands::Run { file }) => Job::Run(file),
        Some(Commands::Eval { source }) => Job::Eval(source),
        Some(Commands::Repl) | None => Job::Repl,
    };

    init_logging();

    let config = match RuntimeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(ERROR_EXIT_CODE);
        }
    };

    // an assertion failure inside the runtime is a panic, not an error
    let code = std::panic::catch_unwind(AssertUnwindSafe(|| run_job(job, config)))
        .unwrap_or(PANIC_EXIT_CODE);
    process::exit(code);
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reb=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_job(job: Job, config: RuntimeConfig) -> i32 {
    let mut session = Session::new(config);
    if let Err(e) = install_halt_handler(session.halt_handle()) {
        tracing::debug!("no halt handler: {}", e);
    }

    let code = match job {
        Job::Run(file) => run_file(&mut session, &file),
        Job::Eval(source) => run_eval(&mut session, &source),
        Job::Repl => repl::run(&mut session),
    };

    if let Some(report) = ReportConfig::from_env() {
        emit_report(session.interp(), &report);
    }
    code
}

fn run_file(session: &mut Session, file: &Path) -> i32 {
    let outcome = session.run_file(file);
    if let Outcome::Failed(report) = &outcome {
        eprintln!("{report}");
    }
    outcome.exit_code()
}

fn run_eval(session: &mut Session, source: &str) -> i32 {
    let outcome = session.evaluate(source, "eval");
    match &outcome {
        Outcome::Value(Some(text)) => println!("{text}"),
        Outcome::Failed(report) => eprintln!("{report}"),
        Outcome::Value(None) | Outcome::Quit(_) => {}
    }
    outcome.exit_code()
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "reb", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["reb", "run", "demo.reb"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run { ref file }) if file == Path::new("demo.reb")));

        let cli = Cli::try_parse_from(["reb", "--config", "reb.toml", "eval", "1 + 2"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("reb.toml")));
        assert!(matches!(cli.command, Some(Commands::Eval { ref source }) if source == "1 + 2"));

        let cli = Cli::try_parse_from(["reb"]).unwrap();
        assert!(cli.command.is_none());
        assert!(Cli::try_parse_from(["reb", "completions", "nosuchshell"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_file_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.reb");
        let bad = dir.path().join("bad.reb");
        let quits = dir.path().join("quits.reb");
        std::fs::write(&ok, "x: 1").unwrap();
        std::fs::write(&bad, "x: 1 / 0").unwrap();
        std::fs::write(&quits, "quit/with 7").unwrap();

        let mut session = Session::new(RuntimeConfig::default());
        assert_eq!(run_file(&mut session, &ok), 0);
        assert_eq!(run_file(&mut session, &bad), ERROR_EXIT_CODE);
        assert_eq!(run_file(&mut session, &quits), 7);
    }
}
