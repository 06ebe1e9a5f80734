//! One interpreter plus the mapping from evaluation results to exit codes

use reb_runtime::{Interp, MAX_QUIT_CODE};
use reb_runtime::config::RuntimeConfig;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status for an uncaught error
pub const ERROR_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Molded result, `None` when the result was void
    Value(Option<String>),
    /// Formed error report
    Failed(String),
    Quit(i32),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Value(_) => 0,
            Outcome::Failed(_) => ERROR_EXIT_CODE,
            Outcome::Quit(code) => (*code).clamp(0, MAX_QUIT_CODE),
        }
    }
}

pub struct Session {
    interp: Interp,
}

impl Session {
    pub fn new(config: RuntimeConfig) -> Self {
        Session {
            interp: Interp::new(config),
        }
    }

    pub fn interp(&self) -> &Interp {
        &self.interp
    }

    #[cfg(test)]
    pub fn interp_mut(&mut self) -> &mut Interp {
        &mut self.interp
    }

    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        self.interp.halt_handle()
    }

    /// Evaluate `source`; a halt requested while idle is discarded first
    pub fn evaluate(&mut self, source: &str, file: &str) -> Outcome {
        self.interp.halt_handle().store(false, Ordering::Release);
        let result = self.interp.do_string(source, file);
        if let Some(code) = self.interp.quit_code() {
            return Outcome::Quit(code);
        }
        match result {
            Ok(value) if value.is_void() => Outcome::Value(None),
            Ok(value) => Outcome::Value(Some(self.interp.mold(&value))),
            Err(err) => Outcome::Failed(self.interp.form_error(err)),
        }
    }

    pub fn run_file(&mut self, path: &Path) -> Outcome {
        match std::fs::read_to_string(path) {
            Ok(source) => self.evaluate(&source, &path.display().to_string()),
            Err(e) => Outcome::Failed(format!("cannot read {}: {}", path.display(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let mut session = Session::new(RuntimeConfig::default());
        session.interp_mut().capture_output();
        session
    }

    #[test]
    fn test_values_are_molded() {
        let mut session = session();
        assert_eq!(
            session.evaluate("1 + 2", "test"),
            Outcome::Value(Some("3".to_string()))
        );
        assert_eq!(
            session.evaluate("[a \"b\"]", "test"),
            Outcome::Value(Some("[a \"b\"]".to_string()))
        );
        assert_eq!(session.evaluate("if false [1]", "test"), Outcome::Value(None));
    }

    #[test]
    fn test_failure_is_reported() {
        let mut session = session();
        let outcome = session.evaluate("1 / 0", "test");
        let Outcome::Failed(text) = &outcome else {
            panic!("expected a failure, got {outcome:?}");
        };
        assert!(text.starts_with("** Math Error: attempt to divide by zero"));
        assert_eq!(outcome.exit_code(), ERROR_EXIT_CODE);
        // the session survives
        assert_eq!(session.evaluate("7", "test").exit_code(), 0);
    }

    #[test]
    fn test_quit_codes() {
        let mut session = session();
        let outcome = session.evaluate("quit/with 3", "test");
        assert_eq!(outcome, Outcome::Quit(3));
        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(Outcome::Quit(0).exit_code(), 0);
        assert_eq!(Outcome::Quit(999).exit_code(), MAX_QUIT_CODE);
        assert_eq!(Outcome::Quit(-4).exit_code(), 0);
    }

    #[test]
    fn test_stale_halt_is_discarded() {
        let mut session = session();
        session.halt_handle().store(true, Ordering::Release);
        assert_eq!(session.evaluate("1", "test"), Outcome::Value(Some("1".to_string())));
    }

    #[test]
    fn test_run_file() {
        let mut session = session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.reb");
        std::fs::write(&path, "print \"hello\"\nx: 6 * 7").unwrap();
        assert_eq!(session.run_file(&path), Outcome::Value(Some("42".to_string())));
        assert_eq!(session.interp_mut().take_output(), "hello\n");

        let missing = dir.path().join("missing.reb");
        assert!(matches!(session.run_file(&missing), Outcome::Failed(_)));
    }
}
