//! Dispatcher hooks: tracing, call counters and the callgrind profiler
//!
//! The evaluator calls into `Hooks` at three points: before each step, when
//! a function frame starts running, and when it finishes. Every hook is off
//! by default and costs one branch when off.
//!
//! | Hook      | Turned on by            | Records                                 |
//! |-----------|-------------------------|-----------------------------------------|
//! | trace     | `trace`, `REB_TRACE`    | one line per step and per call/return   |
//! | counters  | always                  | calls per native                        |
//! | metrics   | `metrics true`          | calls per function label                |
//! | callgrind | `callgrind/start`       | inclusive and self ticks per function   |
//!
//! Trace lines go to the `reb::trace` tracing target and to stderr, or into
//! a bounded buffer when started with `/back`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{self, Write};

/// Lines kept by `trace/back`; older lines are dropped
pub const TRACE_BUFFER_LINES: usize = 1000;

#[derive(Debug)]
struct Trace {
    depth: u32,
    functions_only: bool,
    buffer: Option<VecDeque<String>>,
}

#[derive(Debug, Default)]
pub struct Hooks {
    trace: Option<Trace>,
    native_counts: HashMap<&'static str, u64>,
    metrics: Option<BTreeMap<String, u64>>,
    profiler: Option<Profiler>,
    finished: Option<Profiler>,
}

impl Hooks {
    pub fn start_trace(&mut self, depth: u32, back: bool, functions_only: bool) {
        tracing::debug!(depth, back, functions_only, "trace started");
        self.trace = Some(Trace {
            depth,
            functions_only,
            buffer: back.then(VecDeque::new),
        });
    }

    /// Stop tracing; returns the buffered lines when tracing was `/back`
    pub fn stop_trace(&mut self) -> Option<Vec<String>> {
        let trace = self.trace.take()?;
        trace.buffer.map(Vec::from)
    }

    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    /// True when evaluator steps at `depth` should be traced
    pub fn traces_step(&self, depth: usize) -> bool {
        match &self.trace {
            Some(trace) => !trace.functions_only && depth as u64 <= trace.depth as u64,
            None => false,
        }
    }

    /// True when calls and returns at `depth` should be traced
    pub fn traces_calls(&self, depth: usize) -> bool {
        match &self.trace {
            Some(trace) => depth as u64 <= trace.depth as u64,
            None => false,
        }
    }

    pub fn record_trace(&mut self, line: String) {
        tracing::trace!(target: "reb::trace", "{line}");
        let Some(trace) = &mut self.trace else {
            return;
        };
        match &mut trace.buffer {
            Some(buffer) => {
                if buffer.len() == TRACE_BUFFER_LINES {
                    buffer.pop_front();
                }
                buffer.push_back(line);
            }
            None => eprintln!("{line}"),
        }
    }

    pub fn count_native(&mut self, name: &'static str) {
        *self.native_counts.entry(name).or_insert(0) += 1;
    }

    /// Native call counts, most called first
    pub fn native_counts(&self) -> Vec<(&'static str, u64)> {
        let mut counts: Vec<_> = self.native_counts.iter().map(|(k, v)| (*k, *v)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        counts
    }

    pub fn set_metrics(&mut self, on: bool) {
        self.metrics = on.then(BTreeMap::new);
    }

    /// Per-function call counts gathered since `metrics` was turned on
    pub fn metrics(&self) -> Option<&BTreeMap<String, u64>> {
        self.metrics.as_ref()
    }

    pub fn enter_call(&mut self, name: &str, index: usize, tick: u64) {
        if let Some(metrics) = &mut self.metrics {
            *metrics.entry(name.to_string()).or_insert(0) += 1;
        }
        if let Some(profiler) = &mut self.profiler {
            profiler.enter(name, index, tick);
        }
    }

    pub fn leave_call(&mut self, index: usize, tick: u64) {
        if let Some(profiler) = &mut self.profiler {
            profiler.leave(index, tick);
        }
    }

    pub fn start_profiler(&mut self, tick: u64) {
        self.profiler = Some(Profiler::new(tick));
    }

    /// Stop profiling, closing any calls still open at `tick`; the profile
    /// stays available until the next start
    pub fn stop_profiler(&mut self, tick: u64) -> Option<&Profiler> {
        let mut profiler = self.profiler.take()?;
        profiler.finish(tick);
        self.finished = Some(profiler);
        self.finished.as_ref()
    }

    pub fn is_profiling(&self) -> bool {
        self.profiler.is_some()
    }

    /// Most recently stopped profile
    pub fn finished_profile(&self) -> Option<&Profiler> {
        self.finished.as_ref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cost {
    pub calls: u64,
    pub inclusive: u64,
    pub exclusive: u64,
}

#[derive(Debug)]
struct OpenCall {
    name: String,
    index: usize,
    start: u64,
    children: u64,
}

/// Tick costs per function label
///
/// Calls are tracked by frame index. A frame abandoned by a fail never
/// reports its return, so any open call at or above the index of a new call
/// (or above the index of a return) is closed first.
#[derive(Debug)]
pub struct Profiler {
    started: u64,
    stopped: u64,
    stack: Vec<OpenCall>,
    costs: BTreeMap<String, Cost>,
}

impl Profiler {
    fn new(tick: u64) -> Self {
        Profiler {
            started: tick,
            stopped: tick,
            stack: Vec::new(),
            costs: BTreeMap::new(),
        }
    }

    fn enter(&mut self, name: &str, index: usize, tick: u64) {
        self.unwind(|open| open.index >= index, tick);
        self.stack.push(OpenCall {
            name: name.to_string(),
            index,
            start: tick,
            children: 0,
        });
    }

    fn leave(&mut self, index: usize, tick: u64) {
        self.unwind(|open| open.index > index, tick);
        if self.stack.last().is_some_and(|open| open.index == index) {
            self.close(tick);
        }
    }

    fn finish(&mut self, tick: u64) {
        self.unwind(|_| true, tick);
        self.stopped = tick;
    }

    fn unwind(&mut self, stale: impl Fn(&OpenCall) -> bool, tick: u64) {
        while self.stack.last().is_some_and(&stale) {
            self.close(tick);
        }
    }

    fn close(&mut self, tick: u64) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        let inclusive = tick.saturating_sub(open.start);
        if let Some(parent) = self.stack.last_mut() {
            parent.children += inclusive;
        }
        let cost = self.costs.entry(open.name).or_default();
        cost.calls += 1;
        cost.inclusive += inclusive;
        cost.exclusive += inclusive.saturating_sub(open.children);
    }

    pub fn costs(&self) -> &BTreeMap<String, Cost> {
        &self.costs
    }

    pub fn total_ticks(&self) -> u64 {
        self.stopped.saturating_sub(self.started)
    }

    /// Write the profile in callgrind format (one event: Ticks)
    pub fn write_callgrind<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "# callgrind format")?;
        writeln!(out, "version: 1")?;
        writeln!(out, "creator: reb")?;
        writeln!(out, "events: Ticks")?;
        writeln!(out, "summary: {}", self.total_ticks())?;
        for (name, cost) in &self.costs {
            writeln!(out)?;
            writeln!(out, "fn={name}")?;
            writeln!(out, "0 {}", cost.exclusive)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_depth_filters() {
        let mut hooks = Hooks::default();
        assert!(!hooks.traces_step(1));
        hooks.start_trace(2, false, false);
        assert!(hooks.traces_step(2));
        assert!(!hooks.traces_step(3));
        hooks.start_trace(2, false, true);
        assert!(!hooks.traces_step(1));
        assert!(hooks.traces_calls(1));
        assert_eq!(hooks.stop_trace(), None);
        assert!(!hooks.is_tracing());
    }

    #[test]
    fn test_trace_back_buffer_is_bounded() {
        let mut hooks = Hooks::default();
        hooks.start_trace(u32::MAX, true, false);
        for i in 0..(TRACE_BUFFER_LINES + 5) {
            hooks.record_trace(format!("line {i}"));
        }
        let lines = hooks.stop_trace().unwrap();
        assert_eq!(lines.len(), TRACE_BUFFER_LINES);
        assert_eq!(lines[0], "line 5");
    }

    #[test]
    fn test_native_counts_sorted() {
        let mut hooks = Hooks::default();
        hooks.count_native("print");
        hooks.count_native("add");
        hooks.count_native("add");
        assert_eq!(hooks.native_counts(), vec![("add", 2), ("print", 1)]);
    }

    #[test]
    fn test_metrics_only_when_on() {
        let mut hooks = Hooks::default();
        hooks.enter_call("f", 0, 1);
        assert!(hooks.metrics().is_none());
        hooks.set_metrics(true);
        hooks.enter_call("f", 0, 2);
        hooks.enter_call("f", 0, 3);
        assert_eq!(hooks.metrics().unwrap().get("f"), Some(&2));
    }

    #[test]
    fn test_profiler_inclusive_and_self() {
        let mut hooks = Hooks::default();
        hooks.start_profiler(0);
        hooks.enter_call("outer", 0, 0);
        hooks.enter_call("inner", 1, 2);
        hooks.leave_call(1, 7);
        hooks.leave_call(0, 10);
        let profiler = hooks.stop_profiler(10).unwrap();
        let outer = profiler.costs()["outer"];
        let inner = profiler.costs()["inner"];
        assert_eq!(outer, Cost { calls: 1, inclusive: 10, exclusive: 5 });
        assert_eq!(inner, Cost { calls: 1, inclusive: 5, exclusive: 5 });
    }

    #[test]
    fn test_profiler_closes_abandoned_calls() {
        let mut hooks = Hooks::default();
        hooks.start_profiler(0);
        hooks.enter_call("a", 0, 0);
        hooks.enter_call("failing", 1, 1);
        // the failing frame never returns; the next call at its index closes it
        hooks.enter_call("b", 1, 4);
        hooks.leave_call(1, 5);
        hooks.leave_call(0, 6);
        let profiler = hooks.stop_profiler(6).unwrap();
        assert_eq!(profiler.costs()["failing"].inclusive, 3);
        assert_eq!(profiler.costs()["a"].exclusive, 2);
    }

    #[test]
    fn test_callgrind_output() {
        let mut hooks = Hooks::default();
        hooks.start_profiler(0);
        hooks.enter_call("f", 0, 0);
        hooks.leave_call(0, 4);
        let profiler = hooks.stop_profiler(4).unwrap();
        let mut out = Vec::new();
        profiler.write_callgrind(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("events: Ticks"));
        assert!(text.contains("fn=f\n0 4\n"));
    }
}
