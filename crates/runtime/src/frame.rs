//! Call frame stack
//!
//! Every function invocation pushes a `Frame`. The frame owns an unmanaged
//! argument array shaped like a varlist (slot 0 unused, one slot per
//! parameter), which is where relatively bound words in the function's body
//! resolve while the call is live.
//!
//! ```text
//! initial ─► arg-fulfill ─► function ─► returned
//!                 │             └─────► throw-pending
//!                 └── fail ─────┴────► unwound by the nearest trap
//! ```
//!
//! A frame may be *reified* into a FRAME! context, which adopts the argument
//! array as its varlist. When such a frame is popped the context is marked
//! inaccessible and its variables decay to void, so later reads through it
//! fail with `no-relative` instead of seeing recycled storage.

use crate::error::Fail;
use crate::interp::Interp;
use reb_core::{Binding, Cell, ContextId, FuncId, SeriesId, Symbol, VarLoc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    Initial,
    ArgFulfill,
    Function,
    ThrowPending,
    Returned,
}

/// Ambient frame used to resolve relative words read from a source array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Specifier {
    /// The array holds no relative words (or they resolve through the stack)
    #[default]
    Specified,
    /// Words relative to `func` resolve into `args`
    Frame { func: FuncId, args: SeriesId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);
    /// Evaluate the source to its end rather than one expression
    pub const TO_END: FrameFlags = FrameFlags(1 << 0);
    /// Infix functions may not take this frame's result as their left argument
    pub const NO_LOOKAHEAD: FrameFlags = FrameFlags(1 << 1);
    /// Arguments come from a prepared list, not from source
    pub const APPLYING: FrameFlags = FrameFlags(1 << 2);

    pub fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FrameFlags) {
        self.0 |= other.0;
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    /// Function whose dispatcher runs (a specialization swaps in its base)
    pub func: FuncId,
    /// Function as invoked by the caller
    pub original: FuncId,
    pub args: SeriesId,
    pub label: Option<Symbol>,
    pub mode: FrameMode,
    pub tick: u64,
    /// Source array position of the call
    pub source: Option<(SeriesId, usize)>,
    pub specifier: Specifier,
    pub flags: FrameFlags,
    pub reified: Option<ContextId>,
    /// Binding carried by the invoked function value (definitional returns)
    pub binding: Binding,
}

impl Interp {
    /// Push a frame for `func` with void arguments
    ///
    /// Fails with `internal/stack-overflow` past the configured limit.
    pub fn push_frame(
        &mut self,
        func: FuncId,
        label: Option<Symbol>,
        source: Option<(SeriesId, usize)>,
        binding: Binding,
    ) -> Result<usize, Fail> {
        if self.frames.len() >= self.config.stack_limit {
            return Err(self.error("internal", "stack-overflow", &[]));
        }

        let mut cells = Vec::with_capacity(self.heap.num_params(func) + 1);
        cells.push(Cell::trash());
        cells.extend(std::iter::repeat_n(Cell::void(), self.heap.num_params(func)));
        let args = self.heap.make_array(cells);

        self.frames.push(Frame {
            func,
            original: func,
            args,
            label,
            mode: FrameMode::ArgFulfill,
            tick: self.tick,
            source,
            specifier: Specifier::Specified,
            flags: FrameFlags::NONE,
            reified: None,
            binding,
        });
        let depth = self.frames.len();
        self.peak_depth = self.peak_depth.max(depth);
        tracing::debug!(depth, func = %func, tick = self.tick, "push frame");
        Ok(depth - 1)
    }

    /// Pop the top frame, releasing or retiring its arguments
    pub fn pop_frame(&mut self) {
        let Some(mut frame) = self.frames.pop() else {
            panic!("pop_frame on an empty stack");
        };
        if frame.mode != FrameMode::ThrowPending {
            frame.mode = FrameMode::Returned;
        }
        match frame.reified {
            Some(ctx) => {
                self.heap.set_inaccessible(ctx);
                let len = self.heap.len(frame.args);
                for index in 1..len {
                    *self.heap.cell_mut(VarLoc {
                        series: frame.args,
                        index,
                    }) = Cell::void();
                }
            }
            None => self.heap.free(frame.args),
        }
        tracing::debug!(depth = self.frames.len() + 1, func = %frame.func, "pop frame");
    }

    /// Number of live frames
    pub fn eval_depth(&self) -> usize {
        self.frames.len()
    }

    /// Frame `depth` levels below the top (0 is the running frame)
    pub fn frame_at_depth(&self, depth: usize) -> Option<&Frame> {
        let count = self.frames.len();
        if depth >= count {
            return None;
        }
        self.frames.get(count - 1 - depth)
    }

    pub(crate) fn frame_mut_at_index(&mut self, index: usize) -> &mut Frame {
        match self.frames.get_mut(index) {
            Some(frame) => frame,
            None => panic!("no frame at stack index {index}"),
        }
    }

    /// FRAME! context for the frame at `depth`, created on first request
    pub fn reify_frame(&mut self, depth: usize) -> Option<ContextId> {
        let count = self.frames.len();
        if depth >= count {
            return None;
        }
        let index = count - 1 - depth;
        let frame = &self.frames[index];
        if let Some(ctx) = frame.reified {
            return Some(ctx);
        }
        let (args, paramlist) = (frame.args, frame.func.paramlist());
        let ctx = self.heap.adopt_frame_args(args, paramlist);
        self.frames[index].reified = Some(ctx);
        Some(ctx)
    }

    /// Depth of the innermost running call of `func`
    ///
    /// A frame still fulfilling its arguments is skipped: its slots are not
    /// filled yet, and argument expressions belong to the caller.
    pub(crate) fn depth_of_function(&self, func: FuncId) -> Option<usize> {
        self.frames
            .iter()
            .rev()
            .position(|f| (f.func == func || f.original == func) && f.mode != FrameMode::ArgFulfill)
    }

    /// Depth of the live frame whose arguments are `args`
    pub(crate) fn depth_of_args(&self, args: SeriesId) -> Option<usize> {
        self.frames.iter().rev().position(|f| f.args == args)
    }

    /// Argument array of the innermost live call of `func`, honoring the specifier
    pub(crate) fn frame_args_for(&self, func: FuncId, specifier: Specifier) -> Option<SeriesId> {
        if let Specifier::Frame { func: f, args } = specifier
            && f == func
            && self.depth_of_args(args).is_some()
        {
            return Some(args);
        }
        self.depth_of_function(func)
            .and_then(|depth| self.frame_at_depth(depth))
            .map(|frame| frame.args)
    }
}
