//! Debugging, measurement and device natives

use super::{Call, Disposition, NativeEntry, native};
use crate::config::TRACE_ALL;
use crate::device::{DeviceError, Request};
use crate::error::Fail;
use crate::interp::Interp;
use reb_core::{Cell, ContextKind, Kind, Payload};
use std::time::{Duration, Instant};

pub(crate) const NATIVES: &[NativeEntry] = &[
    native("trace", "mode [integer! logic!] /back /function", trace_native),
    native("stats", "/show", stats_native),
    native("metrics", "mode [logic! blank!] /report", metrics_native),
    native("callgrind", "/start /stop /dump file [file! string!]", callgrind_native),
    native("wait", "value [any-number! time! blank!]", wait_native),
    native("timer-start", "duration [any-number! time!]", timer_start_native),
];

fn trace_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let mode = interp.arg(call, "mode");
    let depth = match mode.payload() {
        Payload::Logic(true) => TRACE_ALL,
        Payload::Logic(false) => 0,
        Payload::Integer(n) => u32::try_from(*n).unwrap_or(0),
        _ => return Err(interp.script_error("invalid-arg", &[mode])),
    };
    let back = interp.refine(call, "back");

    if depth > 0 {
        let functions_only = interp.refine(call, "function");
        interp.hooks.start_trace(depth, back, functions_only);
        return Ok(Disposition::Void);
    }
    let lines = interp.hooks.stop_trace().unwrap_or_default();
    if !back {
        return Ok(Disposition::Void);
    }
    let cells = lines.iter().map(|line| interp.make_string(line)).collect();
    *out = Cell::block(interp.heap.make_managed_array(cells));
    Ok(Disposition::OutSet)
}

/// Block of `name count` pairs
fn count_block<'a>(interp: &mut Interp, counts: impl IntoIterator<Item = (&'a str, u64)>) -> Cell {
    let mut cells = Vec::new();
    for (name, count) in counts {
        cells.push(interp.word_cell(Kind::Word, name));
        cells.push(Cell::integer(count as i64));
    }
    Cell::block(interp.heap.make_managed_array(cells))
}

fn stats_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    *out = if interp.refine(call, "show") {
        let counts = interp.hooks.native_counts();
        count_block(interp, counts)
    } else {
        Cell::integer(interp.ticks() as i64)
    };
    Ok(Disposition::OutSet)
}

fn metrics_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    if let Some(on) = interp.arg(call, "mode").as_logic() {
        interp.hooks.set_metrics(on);
    }
    if !interp.refine(call, "report") {
        return Ok(Disposition::Void);
    }

    let counts: Vec<(String, u64)> = interp
        .hooks
        .metrics()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
        .unwrap_or_default();
    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    let functions = count_block(interp, counts.iter().map(|(k, v)| (k.as_str(), *v)));

    let report = interp.heap.make_context(ContextKind::Object, 3);
    interp.put_field(report, "ticks", Cell::integer(interp.ticks() as i64));
    interp.put_field(report, "calls", Cell::integer(total as i64));
    interp.put_field(report, "functions", functions);
    *out = interp.heap.context_value(report);
    Ok(Disposition::OutSet)
}

fn callgrind_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let tick = interp.ticks();
    if interp.refine(call, "start") {
        interp.hooks.start_profiler(tick);
        return Ok(Disposition::Void);
    }
    if interp.refine(call, "stop") || interp.hooks.is_profiling() {
        interp.hooks.stop_profiler(tick);
    }
    if interp.refine(call, "dump") {
        let file = interp.arg(call, "file");
        let path = interp.string_of(&file);
        let written = match interp.hooks.finished_profile() {
            Some(profile) => std::fs::File::create(&path)
                .and_then(|mut f| profile.write_callgrind(&mut f))
                .map_err(|e| e.to_string()),
            None => Err("no profile recorded".to_string()),
        };
        if let Err(message) = written {
            let what = interp.make_string(&format!("callgrind {path}: {message}"));
            return Err(interp.error("access", "device-error", &[what, Cell::integer(-1)]));
        }
        tracing::debug!(path, "callgrind profile written");
    }
    Ok(Disposition::Void)
}

impl Interp {
    pub(crate) fn device_failure(&mut self, err: DeviceError) -> Fail {
        match err {
            DeviceError::NoDevice(id) => self.error("access", "no-device", &[Cell::integer(id.0 as i64)]),
            DeviceError::NoCommand { device, command } => {
                let what = self.make_string(&format!("{device}/{command}"));
                self.error("access", "device-error", &[what, Cell::integer(-1)])
            }
            DeviceError::Failed { device, command, code } => {
                let what = self.make_string(&format!("{device}/{command}"));
                self.error("access", "device-error", &[what, Cell::integer(code as i64)])
            }
        }
    }
}

/// Seconds for numbers, the time itself for times
fn duration_of(value: &Cell) -> Option<Duration> {
    match value.payload() {
        Payload::Time(nanos) => Some(Duration::from_nanos((*nanos).max(0) as u64)),
        _ => value
            .as_decimal()
            .map(|secs| Duration::from_secs_f64(secs.max(0.0))),
    }
}

/// `wait`: poll devices until an event arrives or the timeout runs out
///
/// Returns the word naming the device whose request completed, or blank on
/// timeout. `wait _` returns once nothing is pending.
fn wait_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let deadline = duration_of(&value).map(|d| Instant::now() + d);
    let interval = Duration::from_millis(interp.config.wait_poll_ms.max(1));

    loop {
        interp.check_halt()?;
        if let Err(e) = interp.devices.poll() {
            return Err(interp.device_failure(e));
        }
        if let Some(event) = interp.devices.events.take() {
            let title = interp.devices.device(event.device).map(|d| d.title).unwrap_or("?");
            *out = interp.word_cell(Kind::Word, title);
            return Ok(Disposition::OutSet);
        }
        let sleep = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(Disposition::Blank);
                }
                interval.min(deadline - now)
            }
            None if interp.devices.pending_len() == 0 => return Ok(Disposition::Blank),
            None => interval,
        };
        std::thread::sleep(sleep);
    }
}

fn timer_start_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "duration");
    let Some(duration) = duration_of(&value) else {
        return Err(interp.script_error("invalid-arg", &[value]));
    };
    let timer = interp.devices.find("timer");
    let start = timer.and_then(|id| interp.devices.command_index(id, "start"));
    let (Some(timer), Some(start)) = (timer, start) else {
        let name = interp.word_cell(Kind::Word, "timer");
        return Err(interp.error("access", "no-device", &[name]));
    };
    let mut request = Request::new(timer, start);
    request.timeout = duration.as_millis() as u64;
    if let Err(e) = interp.devices.dispatch(request) {
        return Err(interp.device_failure(e));
    }
    Ok(Disposition::Void)
}
