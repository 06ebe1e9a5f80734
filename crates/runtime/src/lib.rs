//! Reb Runtime: binding, frames and evaluation for a Rebol-family language
//!
//! Key design principles:
//! - Words are bound once, at load or function-creation time; lookup is an
//!   index into a context or into the argument array of a live call
//! - Function bodies are shared by every call: their words are *relative*
//!   to the function and resolve through the innermost live frame
//! - Failures are `Result` values carrying an error context; `trap` is the
//!   only place frames are unwound on failure
//! - Throws (`throw`, `break`, `return`, ...) travel through output cells
//!   and `Flow::Thrown`, so each frame exits normally
//!
//! `Interp::do_string` is the usual entry point.

pub mod bind;
pub mod compare;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod eval;
pub mod frame;
pub mod func;
pub mod hooks;
pub mod interp;
pub mod load;
pub mod modify;
pub mod mold;
pub mod natives;
pub mod panic;
pub mod path;
pub mod report;
pub mod signal;

pub use bind::{BindFlags, BindTable};
pub use config::{ConfigError, RuntimeConfig, TRACE_ALL};
pub use control::Flow;
pub use device::{Device, DeviceError, DeviceId, DeviceTable, Event, EventQueue, Request};
pub use error::{ErrorCatalog, EvalResult, Fail};
pub use eval::Feed;
pub use frame::{Frame, FrameMode, Specifier};
pub use hooks::{Hooks, Profiler};
pub use interp::Interp;
pub use modify::{ModifyAction, ModifyOptions};
pub use natives::{Call, Disposition, NativeFn};
pub use panic::{MAX_QUIT_CODE, PANIC_EXIT_CODE, Suspect};
pub use report::{ReportConfig, ReportData, emit_report};
pub use signal::install_halt_handler;

// The value model, re-exported so hosts need only this crate
pub use reb_core::{Binding, Cell, ContextId, FuncId, Kind, SeriesId, TypeSet, VarLoc};
