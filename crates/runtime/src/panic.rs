//! Unrecoverable failures
//!
//! A panic is not a fail: no trap sees it and nothing unwinds. The report
//! names the offending value (when there is one), classifies what it points
//! at, and gives the tick plus both source coordinates: the script position
//! being evaluated and the Rust call site that gave up. The process then
//! exits with status 255.
//!
//! ```text
//! ** PANIC: frame stack corrupted
//! ** Suspect: freed-series #12
//! ** Tick: 4031
//! ** Near: test.reb line 7
//! ** Site: crates/runtime/src/eval.rs:210
//! ```

use crate::interp::Interp;
use reb_core::{Cell, Kind, Liveness, Payload, SeriesId};
use std::fmt;

pub const PANIC_EXIT_CODE: i32 = 255;

/// Largest exit status QUIT may request
pub const MAX_QUIT_CODE: i32 = PANIC_EXIT_CODE - 1;

/// What a panic's offending value turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspect {
    /// Only a message was given
    Utf8,
    ValueCell,
    LiveSeries(SeriesId),
    FreedSeries(SeriesId),
    TrashCell,
    EndSentinel,
}

impl fmt::Display for Suspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspect::Utf8 => write!(f, "utf8"),
            Suspect::ValueCell => write!(f, "value-cell"),
            Suspect::LiveSeries(id) => write!(f, "live-series {id}"),
            Suspect::FreedSeries(id) => write!(f, "freed-series {id}"),
            Suspect::TrashCell => write!(f, "trash-cell"),
            Suspect::EndSentinel => write!(f, "end-sentinel"),
        }
    }
}

fn referenced_series(cell: &Cell) -> Option<SeriesId> {
    match cell.payload() {
        Payload::Series { series, .. } => Some(*series),
        Payload::Context(ctx) => Some(ctx.varlist()),
        Payload::Function { func, .. } => Some(func.paramlist()),
        _ => None,
    }
}

impl Interp {
    pub fn classify_suspect(&self, value: Option<&Cell>) -> Suspect {
        let Some(cell) = value else {
            return Suspect::Utf8;
        };
        match cell.kind() {
            Kind::Trash => return Suspect::TrashCell,
            Kind::End => return Suspect::EndSentinel,
            _ => {}
        }
        match referenced_series(cell) {
            Some(id) => match self.heap.liveness(id) {
                Liveness::Live => Suspect::LiveSeries(id),
                Liveness::Freed | Liveness::Unknown => Suspect::FreedSeries(id),
            },
            None => Suspect::ValueCell,
        }
    }

    /// Script file and line of the expression being evaluated
    fn near_coordinates(&self) -> Option<(String, u32)> {
        let (series, _) = self.near?;
        if !self.heap.is_live(series) {
            return None;
        }
        let origin = self.heap.get(series).origin?;
        Some((self.symbols.name(origin.file).to_string(), origin.line))
    }

    /// Text printed by `panic_with`
    pub fn panic_report(&self, message: &str, value: Option<&Cell>, site: &std::panic::Location<'_>) -> String {
        let suspect = self.classify_suspect(value);
        let mut lines = vec![format!("** PANIC: {message}"), format!("** Suspect: {suspect}")];
        if let (Some(cell), Suspect::ValueCell | Suspect::LiveSeries(_)) = (value, suspect) {
            lines.push(format!("** Value: {}", self.mold(cell)));
        }
        lines.push(format!("** Tick: {}", self.tick));
        if let Some((file, line)) = self.near_coordinates() {
            lines.push(format!("** Near: {file} line {line}"));
        }
        lines.push(format!("** Site: {}:{}", site.file(), site.line()));
        lines.join("\n")
    }

    /// Report and terminate the process
    #[track_caller]
    pub fn panic_with(&self, message: &str, value: Option<&Cell>) -> ! {
        let site = std::panic::Location::caller();
        let report = self.panic_report(message, value, site);
        tracing::error!(tick = self.tick, "{message}");
        eprintln!("{report}");
        std::process::exit(PANIC_EXIT_CODE);
    }
}
