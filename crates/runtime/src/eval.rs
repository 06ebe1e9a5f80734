//! Evaluator
//!
//! Expressions are read from a `Feed`: either a position in an array or a
//! prepared list of values (used when applying a function to arguments that
//! were already evaluated). One call to `eval_step` consumes exactly one
//! expression and writes its value to the output cell.
//!
//! # Function calls
//!
//! `call_function` pushes a frame, fulfills the paramlist in declaration
//! order, then loops on the dispatcher until it produces a final
//! `Disposition`. Specializations answer with an internal redo phase that
//! swaps in the underlying function; that phase never leaves this module.
//!
//! RETURN and LEAVE are definitional: every user frame fills its hidden
//! return/leave slots with function cells whose binding names the frame
//! (argument array plus the tick the frame was pushed on). The user
//! dispatcher only catches throws carrying exactly that binding.

use crate::control::Flow;
use crate::error::Fail;
use crate::frame::{FrameMode, Specifier};
use crate::interp::Interp;
use crate::natives::{Call, Disposition};
use reb_core::{Binding, Cell, ContextId, FuncClass, FuncId, Key, Kind, ParamClass, SeriesId, Symbol, VarLoc};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Source {
    Array { series: SeriesId, index: usize },
    Values(VecDeque<Cell>),
}

/// Where expressions are read from
#[derive(Debug, Clone)]
pub struct Feed {
    source: Source,
    /// Values are taken as-is, never evaluated
    literal: bool,
    pub specifier: Specifier,
}

impl Feed {
    pub fn array(series: SeriesId, index: usize, specifier: Specifier) -> Self {
        Feed {
            source: Source::Array { series, index },
            literal: false,
            specifier,
        }
    }

    /// Prepared argument values for an apply
    pub fn values(cells: Vec<Cell>) -> Self {
        Feed {
            source: Source::Values(cells.into()),
            literal: true,
            specifier: Specifier::Specified,
        }
    }

    pub fn peek(&self, interp: &Interp) -> Option<Cell> {
        match &self.source {
            Source::Array { series, index } => {
                let cell = interp.heap.at(*series, *index);
                (!cell.is_end()).then(|| cell.clone())
            }
            Source::Values(values) => values.front().cloned(),
        }
    }

    pub fn at_end(&self, interp: &Interp) -> bool {
        match &self.source {
            Source::Array { series, index } => interp.heap.at(*series, *index).is_end(),
            Source::Values(values) => values.is_empty(),
        }
    }

    pub fn take(&mut self, interp: &Interp) -> Option<Cell> {
        match &mut self.source {
            Source::Array { series, index } => {
                let cell = interp.heap.at(*series, *index);
                if cell.is_end() {
                    return None;
                }
                let cell = cell.clone();
                *index += 1;
                Some(cell)
            }
            Source::Values(values) => values.pop_front(),
        }
    }

    /// Array position of the next value, when reading from an array
    pub fn position(&self) -> Option<(SeriesId, usize)> {
        match self.source {
            Source::Array { series, index } => Some((series, index)),
            Source::Values(_) => None,
        }
    }

    pub fn index(&self) -> usize {
        match &self.source {
            Source::Array { index, .. } => *index,
            Source::Values(_) => 0,
        }
    }
}

/// Step of the dispatch loop
enum Phase {
    Finished(Disposition),
    /// A composite function swapped the frame's function; run again
    Redo { checked: bool },
}

impl Interp {
    /// Evaluate `series` from `index` to its end
    ///
    /// The array is guarded for the duration. On failure the guard is left
    /// for the enclosing trap to drop.
    pub fn do_array(
        &mut self,
        series: SeriesId,
        index: usize,
        specifier: Specifier,
        out: &mut Cell,
    ) -> Result<Flow, Fail> {
        self.heap.guard(series);
        let mut feed = Feed::array(series, index, specifier);
        let flow = self.do_feed(&mut feed, out)?;
        self.heap.drop_guard(series);
        Ok(flow)
    }

    /// Evaluate every expression of a feed; `out` is void for an empty feed
    pub fn do_feed(&mut self, feed: &mut Feed, out: &mut Cell) -> Result<Flow, Fail> {
        *out = Cell::void();
        while !feed.at_end(self) {
            if self.eval_step(feed, out, true)? == Flow::Thrown {
                return Ok(Flow::Thrown);
            }
        }
        Ok(Flow::Done)
    }

    /// Evaluate one expression
    ///
    /// With `lookahead`, enfix functions following the expression take its
    /// value as their left argument.
    pub fn eval_step(&mut self, feed: &mut Feed, out: &mut Cell, lookahead: bool) -> Result<Flow, Fail> {
        self.tick += 1;
        self.check_halt()?;
        if let Some(position) = feed.position() {
            self.near = Some(position);
        }
        let Some(cell) = feed.take(self) else {
            *out = Cell::void();
            return Ok(Flow::Done);
        };

        let depth = self.eval_depth();
        if self.hooks.traces_step(depth) {
            let line = format!("{depth}: {}", self.mold(&cell));
            self.hooks.record_trace(line);
        }

        if feed.literal {
            *out = cell;
        } else if self.eval_cell(cell, feed, out)? == Flow::Thrown {
            return Ok(Flow::Thrown);
        }

        while lookahead && !feed.literal {
            let Some(next) = feed.peek(self) else {
                break;
            };
            if next.kind() != Kind::Word {
                break;
            }
            let Some(loc) = self.get_var(&next, feed.specifier, true, false)? else {
                break;
            };
            let value = self.heap.cell(loc).clone();
            if !Interp::is_enfix(&value) {
                break;
            }
            feed.take(self);
            let left = std::mem::replace(out, Cell::void());
            if self.call_function(&value, next.symbol(), feed, out, Some(left), &[])? == Flow::Thrown {
                return Ok(Flow::Thrown);
            }
        }
        Ok(Flow::Done)
    }

    /// Evaluate a cell already taken from `feed`
    pub(crate) fn eval_cell(&mut self, cell: Cell, feed: &mut Feed, out: &mut Cell) -> Result<Flow, Fail> {
        match cell.kind() {
            Kind::Word => {
                let value = self.get_word_value(&cell, feed.specifier)?;
                if value.kind() == Kind::Function {
                    return self.call_function(&value, cell.symbol(), feed, out, None, &[]);
                }
                if value.is_void() {
                    return Err(self.script_error("no-value", &[cell]));
                }
                *out = value;
            }
            Kind::SetWord => {
                let Some(loc) = self.get_var(&cell, feed.specifier, false, true)? else {
                    return Err(self.script_error("not-bound", &[crate::bind::plain_word(&cell)]));
                };
                if feed.at_end(self) {
                    return Err(self.script_error("need-value", &[cell]));
                }
                if self.eval_step(feed, out, true)? == Flow::Thrown {
                    return Ok(Flow::Thrown);
                }
                if out.is_void() || out.is_end() {
                    return Err(self.script_error("need-value", &[cell]));
                }
                *self.heap.cell_mut(loc) = out.stored();
            }
            Kind::GetWord => {
                *out = self.get_word_value(&cell, feed.specifier)?;
            }
            Kind::LitWord => *out = cell.with_kind(Kind::Word),
            Kind::Group => {
                let Some((series, index)) = cell.array_at() else {
                    unreachable!("group without an array payload");
                };
                return self.do_array(series, index, feed.specifier, out);
            }
            Kind::Path => return self.eval_path(&cell, feed, out),
            Kind::SetPath => return self.eval_set_path(&cell, feed, out),
            Kind::GetPath => return self.eval_get_path(&cell, feed.specifier, out),
            Kind::LitPath => *out = cell.with_kind(Kind::Path),
            Kind::Function => return self.call_function(&cell, None, feed, out, None, &[]),
            Kind::Bar | Kind::End => *out = Cell::void(),
            _ => *out = cell.stored(),
        }
        Ok(Flow::Done)
    }

    /// Invoke a function value, reading its arguments from `feed`
    ///
    /// `left` is the left-hand argument of an enfix call. `refinements` are
    /// the refinement words named by a path, in call-site order.
    pub fn call_function(
        &mut self,
        func_cell: &Cell,
        label: Option<Symbol>,
        feed: &mut Feed,
        out: &mut Cell,
        left: Option<Cell>,
        refinements: &[Symbol],
    ) -> Result<Flow, Fail> {
        let Some(func) = func_cell.func_id() else {
            return Err(self.script_error("invalid-arg", &[func_cell.clone()]));
        };
        let index = self.push_frame(func, label, feed.position(), func_cell.binding())?;
        self.frames[index].specifier = feed.specifier;

        if self.hooks.traces_calls(index + 1) {
            let line = format!("{}: --> {}", index + 1, self.frame_label(index));
            self.hooks.record_trace(line);
        }

        let mut used = Vec::with_capacity(refinements.len());
        for sym in refinements {
            let canon = self.symbols.canon(*sym);
            let at = self.heap.find_param(func, canon);
            if at == 0 || self.heap.param(func, at).class != ParamClass::Refinement {
                return Err(self.script_error("bad-refine", &[Cell::word(Kind::Word, *sym)]));
            }
            used.push(canon);
        }

        if self.fulfill_args(index, feed, out, left, &used)? == Flow::Thrown {
            self.frames[index].mode = FrameMode::ThrowPending;
            self.pop_frame();
            return Ok(Flow::Thrown);
        }

        self.frames[index].mode = FrameMode::Function;
        let start = self.tick;
        let name = self.frame_label(index);
        self.hooks.enter_call(&name, index, start);

        let disposition = loop {
            *out = Cell::end();
            match self.dispatch(index, out)? {
                Phase::Finished(disposition) => break disposition,
                Phase::Redo { checked } => {
                    if checked {
                        self.typecheck_args(index)?;
                    }
                }
            }
        };

        let mut reevaluate = false;
        let flow = match disposition {
            Disposition::OutSet => {
                if out.is_end() {
                    *out = Cell::void();
                }
                Flow::Done
            }
            Disposition::OutIsThrown => {
                debug_assert!(out.is_thrown(), "OutIsThrown without a thrown output");
                Flow::Thrown
            }
            Disposition::Void => {
                *out = Cell::void();
                Flow::Done
            }
            Disposition::Blank => {
                *out = Cell::blank();
                Flow::Done
            }
            Disposition::True => {
                *out = Cell::logic(true);
                Flow::Done
            }
            Disposition::False => {
                *out = Cell::logic(false);
                Flow::Done
            }
            Disposition::Bar => {
                *out = Cell::bar();
                Flow::Done
            }
            Disposition::TrueIfWritten => {
                *out = Cell::logic(!out.is_end());
                Flow::Done
            }
            Disposition::VoidIfUnwrittenElseOut => {
                if out.is_end() {
                    *out = Cell::void();
                }
                Flow::Done
            }
            Disposition::ReevaluateCell => {
                reevaluate = true;
                Flow::Done
            }
        };

        if flow == Flow::Thrown {
            self.frames[index].mode = FrameMode::ThrowPending;
        }
        self.hooks.leave_call(index, self.tick);
        if self.hooks.traces_calls(index + 1) {
            let result = if out.is_thrown() {
                "(thrown)".to_string()
            } else {
                self.mold(out)
            };
            let line = format!("{}: <-- {} == {}", index + 1, name, result);
            self.hooks.record_trace(line);
        }
        debug_assert_eq!(index + 1, self.frames.len(), "frame is not on top at return");
        self.pop_frame();

        if reevaluate {
            let cell = std::mem::replace(out, Cell::void());
            return self.eval_cell(cell, feed, out);
        }
        Ok(flow)
    }

    /// Call a function on values that are already evaluated
    pub fn apply_function(&mut self, func_cell: &Cell, args: Vec<Cell>, out: &mut Cell) -> Result<Flow, Fail> {
        let mut feed = Feed::values(args);
        self.call_function(func_cell, None, &mut feed, out, None, &[])
    }

    fn frame_label(&self, index: usize) -> String {
        let frame = &self.frames[index];
        match (frame.label, self.heap.func_class(frame.original)) {
            (Some(sym), _) => self.symbols.name(sym).to_string(),
            (None, FuncClass::Native(id)) => self.native_name(id).to_string(),
            _ => "anonymous".to_string(),
        }
    }

    fn label_word(&mut self, index: usize) -> Cell {
        let name = self.frame_label(index);
        self.word_cell(Kind::Word, &name)
    }

    fn fulfill_args(
        &mut self,
        index: usize,
        feed: &mut Feed,
        out: &mut Cell,
        mut left: Option<Cell>,
        used: &[Symbol],
    ) -> Result<Flow, Fail> {
        let func = self.frames[index].func;
        let args = self.frames[index].args;
        let enfix = left.is_some();
        let exemplar = self.heap.func_exemplar(func);
        let params: Vec<(usize, Key)> = self.heap.params(func).map(|(i, k)| (i, k.clone())).collect();
        let mut active = true;

        for (i, key) in params {
            let loc = VarLoc { series: args, index: i };

            if let Some(exemplar) = exemplar {
                let preset = self.heap.at(exemplar, i).clone();
                if !preset.is_void() {
                    if key.class == ParamClass::Refinement {
                        active = preset.truthy() == Some(true);
                    }
                    *self.heap.cell_mut(loc) = preset;
                    continue;
                }
            }

            let value = match key.class {
                ParamClass::Refinement => {
                    active = used.contains(&key.symbol);
                    if active { Cell::logic(true) } else { Cell::blank() }
                }
                ParamClass::Local => Cell::void(),
                ParamClass::Return | ParamClass::Leave => {
                    let labels = self.labels();
                    let target = if key.class == ParamClass::Return {
                        labels.return_fn
                    } else {
                        labels.leave_fn
                    };
                    let mut cell = Cell::function(target);
                    cell.set_binding(Binding::Specific {
                        context: ContextId(args),
                        index: self.frames[index].tick as u32,
                    });
                    cell
                }
                ParamClass::Normal | ParamClass::HardQuote | ParamClass::SoftQuote => {
                    if !active {
                        continue;
                    }
                    let value = match left.take() {
                        Some(value) => value,
                        None => {
                            let mut arg = Cell::void();
                            if self.take_arg(index, &key, feed, &mut arg, enfix)? == Flow::Thrown {
                                *out = arg;
                                return Ok(Flow::Thrown);
                            }
                            arg
                        }
                    };
                    self.check_arg(index, &key, &value)?;
                    value
                }
            };
            *self.heap.cell_mut(loc) = value;
        }
        Ok(Flow::Done)
    }

    fn take_arg(
        &mut self,
        index: usize,
        key: &Key,
        feed: &mut Feed,
        arg: &mut Cell,
        enfix: bool,
    ) -> Result<Flow, Fail> {
        let next = feed.peek(self);
        let missing = match &next {
            None => true,
            Some(cell) => cell.kind() == Kind::Bar && !feed.literal,
        };
        if missing {
            let label = self.label_word(index);
            let param = Cell::word(Kind::Word, key.symbol);
            return Err(self.script_error("no-arg", &[label, param]));
        }
        if feed.literal {
            *arg = feed.take(self).unwrap_or_else(Cell::void);
            return Ok(Flow::Done);
        }

        match key.class {
            ParamClass::HardQuote => {
                *arg = feed.take(self).map(|c| c.stored()).unwrap_or_else(Cell::void);
                Ok(Flow::Done)
            }
            ParamClass::SoftQuote => {
                let Some(cell) = feed.take(self) else {
                    return Ok(Flow::Done);
                };
                match cell.kind() {
                    Kind::Group | Kind::GetWord => self.eval_cell(cell, feed, arg),
                    _ => {
                        *arg = cell.stored();
                        Ok(Flow::Done)
                    }
                }
            }
            _ => self.eval_step(feed, arg, !enfix),
        }
    }

    fn check_arg(&mut self, index: usize, key: &Key, value: &Cell) -> Result<(), Fail> {
        if key.types.contains(value.kind()) {
            return Ok(());
        }
        let label = self.label_word(index);
        let param = Cell::word(Kind::Word, key.symbol);
        Err(self.script_error("expect-arg", &[label, param, Cell::datatype(value.kind())]))
    }

    /// Re-check argument types after a composite function swapped its target
    fn typecheck_args(&mut self, index: usize) -> Result<(), Fail> {
        let func = self.frames[index].func;
        let args = self.frames[index].args;
        let params: Vec<(usize, Key)> = self.heap.params(func).map(|(i, k)| (i, k.clone())).collect();
        let mut active = true;
        for (i, key) in params {
            let value = self.heap.at(args, i).clone();
            match key.class {
                ParamClass::Refinement => active = value.truthy() == Some(true),
                class if class.takes_arg() && active => self.check_arg(index, &key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, index: usize, out: &mut Cell) -> Result<Phase, Fail> {
        let frame = &self.frames[index];
        let call = Call {
            func: frame.func,
            args: frame.args,
            index,
            binding: frame.binding,
            label: frame.label,
        };
        match self.heap.func_class(call.func) {
            FuncClass::Native(id) | FuncClass::Action(id) => {
                let Some(entry) = self.natives.get(id.0 as usize).copied() else {
                    panic!("no native registered for dispatch id {}", id.0);
                };
                self.hooks.count_native(entry.name);
                Ok(Phase::Finished((entry.dispatch)(self, &call, out)?))
            }
            FuncClass::User => Ok(Phase::Finished(self.dispatch_user(&call, out)?)),
            FuncClass::Specialized => {
                let Some(underlying) = self.heap.func_underlying(call.func) else {
                    panic!("specialization {} has no underlying function", call.func);
                };
                self.frames[index].func = underlying;
                Ok(Phase::Redo { checked: true })
            }
            class @ (FuncClass::Routine | FuncClass::Callback | FuncClass::Command) => {
                let what = self.word_cell(Kind::Word, class.name());
                Err(self.script_error("not-supported", &[what]))
            }
        }
    }

    fn dispatch_user(&mut self, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
        let Some(body) = self.heap.func_body(call.func) else {
            return Ok(Disposition::Void);
        };
        let specifier = Specifier::Frame {
            func: call.func,
            args: call.args,
        };
        if self.do_array(body, 0, specifier, out)? == Flow::Done {
            return Ok(Disposition::OutSet);
        }

        let labels = self.labels();
        let own = Binding::Specific {
            context: ContextId(call.args),
            index: self.frames[call.index].tick as u32,
        };
        if out.binding() == own {
            match out.func_id() {
                Some(f) if f == labels.return_fn => {
                    self.catch_thrown(out);
                    return Ok(Disposition::OutSet);
                }
                Some(f) if f == labels.leave_fn => {
                    self.catch_thrown(out);
                    return Ok(Disposition::Void);
                }
                _ => {}
            }
        }
        Ok(Disposition::OutIsThrown)
    }

    /// True when the definitional RETURN/LEAVE binding names a live frame
    pub(crate) fn return_target_live(&self, binding: Binding) -> bool {
        let Binding::Specific { context, index } = binding else {
            return false;
        };
        self.frames
            .iter()
            .any(|f| f.args == context.0 && f.tick as u32 == index)
    }

    /// Function whose frame a RETURN binding targets, if that frame is live
    pub(crate) fn return_target_func(&self, binding: Binding) -> Option<FuncId> {
        let Binding::Specific { context, index } = binding else {
            return None;
        };
        self.frames
            .iter()
            .rev()
            .find(|f| f.args == context.0 && f.tick as u32 == index)
            .map(|f| f.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn run(interp: &mut Interp, source: &str) -> Cell {
        match interp.do_string(source, "test") {
            Ok(value) => value,
            Err(err) => panic!("{source}: {}", interp.form_error(err)),
        }
    }

    fn fails_with(interp: &mut Interp, source: &str) -> String {
        match interp.do_string(source, "test") {
            Ok(value) => panic!("{source}: expected an error, got {}", interp.mold(&value)),
            Err(err) => interp.error_id(err).unwrap_or_default(),
        }
    }

    #[test]
    fn test_empty_source_is_void() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert!(run(&mut interp, "").is_void());
        assert!(run(&mut interp, "; nothing").is_void());
    }

    #[test]
    fn test_set_word_and_get_word() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "a: 5 a").as_integer(), Some(5));
        assert_eq!(run(&mut interp, "b: a: 6 b").as_integer(), Some(6));
        assert_eq!(run(&mut interp, ":a").as_integer(), Some(6));
        assert_eq!(run(&mut interp, "'a").kind(), Kind::Word);
    }

    #[test]
    fn test_enfix_is_left_to_right() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "1 + 2 * 3").as_integer(), Some(9));
        assert_eq!(run(&mut interp, "1 + (2 * 3)").as_integer(), Some(7));
        assert_eq!(run(&mut interp, "add 1 2 * 10").as_integer(), Some(21));
    }

    #[test]
    fn test_unset_word_has_no_value() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(fails_with(&mut interp, "undefined-thing"), "no-value");
        assert_eq!(fails_with(&mut interp, "x: ()"), "need-value");
        assert_eq!(fails_with(&mut interp, "x:"), "need-value");
    }

    #[test]
    fn test_missing_and_mistyped_args() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(fails_with(&mut interp, "negate"), "no-arg");
        assert_eq!(fails_with(&mut interp, "negate | 1"), "no-arg");
        assert_eq!(fails_with(&mut interp, "f: func [x [integer!]] [x] f \"a\""), "expect-arg");
    }

    #[test]
    fn test_definitional_return() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "f: func [x] [if x > 0 [return 1] 2] reduce [f 5 f -5]",
        );
        let (block, _) = value.array_at().unwrap();
        assert_eq!(interp.heap.at(block, 0).as_integer(), Some(1));
        assert_eq!(interp.heap.at(block, 1).as_integer(), Some(2));

        // RETURN of the outer function passed into an inner one still exits the outer
        let value = run(
            &mut interp,
            "inner: func [r [function!]] [r 10 20] outer: func [] [inner :return 30] outer",
        );
        assert_eq!(value.as_integer(), Some(10));
        assert!(run(&mut interp, "g: func [] [leave 1] g").is_void());
    }

    #[test]
    fn test_refinement_args_follow_paramlist_order() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "f: func [/a x /b y] [reduce [a x b y]] f/b/a 1 2",
        );
        let (block, _) = value.array_at().unwrap();
        assert_eq!(interp.heap.at(block, 0).as_logic(), Some(true));
        assert_eq!(interp.heap.at(block, 1).as_integer(), Some(1));
        assert_eq!(interp.heap.at(block, 3).as_integer(), Some(2));
        assert_eq!(fails_with(&mut interp, "f/c 1"), "bad-refine");
    }

    #[test]
    fn test_quoting_params() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "q: func ['w] [w] q foo");
        assert_eq!(value.kind(), Kind::Word);
        let value = run(&mut interp, "s: func [:v] [v] s (1 + 1)");
        assert_eq!(value.as_integer(), Some(2));
        let value = run(&mut interp, "s bar");
        assert_eq!(value.kind(), Kind::Word);
    }

    #[test]
    fn test_specialization_prefills_args() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "add10: specialize :add [value2: 10] add10 5");
        assert_eq!(value.as_integer(), Some(15));
        let value = run(
            &mut interp,
            "f: func [a /twice] [either twice [a * 2] [a]] g: specialize :f [twice: true] g 4",
        );
        assert_eq!(value.as_integer(), Some(8));
    }

    #[test]
    fn test_recursion_uses_innermost_frame() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "fact: func [n] [either n < 2 [1] [n * fact n - 1]] fact 10",
        );
        assert_eq!(value.as_integer(), Some(3_628_800));
        assert_eq!(interp.eval_depth(), 0);
    }

    #[test]
    fn test_stack_overflow_is_trappable() {
        let config = RuntimeConfig {
            stack_limit: 32,
            ..RuntimeConfig::default()
        };
        let mut interp = Interp::new(config);
        assert_eq!(fails_with(&mut interp, "f: func [] [f] f"), "stack-overflow");
        assert_eq!(interp.eval_depth(), 0);
        assert_eq!(run(&mut interp, "1 + 1").as_integer(), Some(2));
    }

    #[test]
    fn test_apply_function_takes_values_literally() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let add = interp.field(interp.lib, "add").unwrap();
        let mut out = Cell::void();
        let flow = interp
            .apply_function(&add, vec![Cell::integer(2), Cell::integer(3)], &mut out)
            .unwrap();
        assert_eq!(flow, Flow::Done);
        assert_eq!(out.as_integer(), Some(5));
    }

    #[test]
    fn test_halt_request_raises() {
        let mut interp = Interp::new(RuntimeConfig::default());
        interp.halt_handle().store(true, std::sync::atomic::Ordering::Release);
        assert_eq!(fails_with(&mut interp, "forever []"), "halt");
        assert_eq!(run(&mut interp, "1").as_integer(), Some(1));
    }
}
