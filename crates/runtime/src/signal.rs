//! SIGINT delivers a halt
//!
//! The handler only stores `true` into the interpreter's halt flag; the
//! evaluator polls the flag every tick (and `wait` on every poll) and raises
//! user-halt/halt at the next safe point. A halt is an ordinary fail, so a
//! `trap` can catch it.
//!
//! Only available on Unix with the `signals` feature; elsewhere
//! `install_halt_handler` reports that nothing was installed.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("could not register SIGINT handler: {0}")]
    Register(#[from] std::io::Error),

    #[error("signal handling not supported on this platform")]
    Unsupported,
}

/// Route SIGINT to `flag` (typically `Interp::halt_handle()`)
///
/// Safe to call more than once; each call adds another flag to set.
#[cfg(all(unix, feature = "signals"))]
pub fn install_halt_handler(flag: Arc<AtomicBool>) -> Result<(), SignalError> {
    use signal_hook::consts::SIGINT;

    signal_hook::flag::register(SIGINT, flag)?;
    tracing::debug!("SIGINT halt handler installed");
    Ok(())
}

#[cfg(not(all(unix, feature = "signals")))]
pub fn install_halt_handler(_flag: Arc<AtomicBool>) -> Result<(), SignalError> {
    Err(SignalError::Unsupported)
}

#[cfg(all(test, unix, feature = "signals"))]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::interp::Interp;
    use serial_test::serial;
    use std::sync::atomic::Ordering;

    #[test]
    #[serial]
    fn test_sigint_sets_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        install_halt_handler(Arc::clone(&flag)).unwrap();
        signal_hook::low_level::raise(signal_hook::consts::SIGINT).unwrap();
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    #[serial]
    fn test_sigint_halts_evaluation() {
        let mut interp = Interp::new(RuntimeConfig::default());
        install_halt_handler(interp.halt_handle()).unwrap();
        let handle = std::thread::spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            signal_hook::low_level::raise(signal_hook::consts::SIGINT).unwrap();
        });
        let err = interp.do_string("forever []", "test").unwrap_err();
        handle.join().unwrap();
        assert_eq!(interp.error_id(err).as_deref(), Some("halt"));
        assert_eq!(interp.error_type(err).as_deref(), Some("user-halt"));
    }
}
