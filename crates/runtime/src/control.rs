//! Control transfer: throws, loop signals and traps
//!
//! Three mechanisms cross frames:
//!
//! - **fail**: `Err(Fail)` propagated with `?` until a `trap` converts it
//! - **throw**: an output cell carrying the THROWN flag on a label, with the
//!   value parked in `Interp::thrown_arg`; every caller checks the returned
//!   `Flow` and passes on labels it does not own
//! - **break / continue**: throws whose label is the BREAK or CONTINUE native
//!
//! Only `trap` pops frames on failure. Throws unwind cooperatively: each
//! frame returns normally and is popped by its own call site.

use crate::error::Fail;
use crate::interp::Interp;
use reb_core::{Cell, CellFlags, ContextId};

/// Outcome of an evaluation whose result was written to an output cell
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Done,
    /// The output cell holds a thrown label
    Thrown,
}

impl Interp {
    /// Start a throw: `out` becomes the flagged label, `value` is parked
    pub fn throw(&mut self, out: &mut Cell, label: Cell, value: Cell) -> Flow {
        debug_assert!(self.thrown_arg.is_none(), "throw while another throw is pending");
        *out = label;
        out.set_flag(CellFlags::THROWN);
        self.thrown_arg = Some(value);
        Flow::Thrown
    }

    /// End a throw: `out` receives the thrown value, the label is returned
    pub fn catch_thrown(&mut self, out: &mut Cell) -> Cell {
        debug_assert!(out.is_thrown(), "catch_thrown on a cell that was not thrown");
        let mut label = out.clone();
        label.clear_flag(CellFlags::THROWN);
        *out = self.thrown_arg.take().unwrap_or_else(Cell::void);
        label
    }

    /// Unpack a BREAK or CONTINUE throw into `out`
    ///
    /// Returns false (leaving `out` untouched) for any other output. On true,
    /// `stop` says whether the loop must end.
    pub fn is_break_or_continue(&mut self, out: &mut Cell, stop: &mut bool) -> bool {
        if !out.is_thrown() {
            return false;
        }
        let labels = self.labels();
        match out.func_id() {
            Some(f) if f == labels.break_fn => *stop = true,
            Some(f) if f == labels.continue_fn => *stop = false,
            _ => return false,
        }
        self.catch_thrown(out);
        true
    }

    /// Run `body` as a recovery point
    ///
    /// On failure every frame, guard and unmanaged series created inside is
    /// released (frames first, since they own argument arrays) and the error
    /// context is returned.
    pub fn trap<T>(
        &mut self,
        body: impl FnOnce(&mut Interp) -> Result<T, Fail>,
    ) -> Result<T, ContextId> {
        let frames = self.frames.len();
        let guards = self.heap.guards_len();
        let manuals = self.heap.manuals_len();

        match body(self) {
            Ok(value) => {
                debug_assert_eq!(self.frames.len(), frames, "frames leaked past a trap");
                Ok(value)
            }
            Err(Fail(err)) => {
                while self.frames.len() > frames {
                    self.pop_frame();
                }
                self.heap.truncate_guards(guards);
                self.heap.free_manuals_above(manuals);
                self.thrown_arg = None;
                tracing::debug!(error = %err, depth = frames, "trapped");
                Err(err)
            }
        }
    }
}
