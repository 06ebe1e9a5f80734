//! Loop natives
//!
//! Every loop body runs through `run_body`, which polls for a halt request
//! and unpacks BREAK and CONTINUE. Other throws pass through untouched. A
//! loop that never runs its body, or whose last iteration continued,
//! returns void; `break/with` supplies the loop's result.
//!
//! Loops with variables evaluate a deep copy of the body bound to a fresh
//! object holding the variables, so the caller's block is never rebound.

use super::{Call, Disposition, NativeEntry, native};
use crate::bind::BindFlags;
use crate::control::Flow;
use crate::error::Fail;
use crate::frame::Specifier;
use crate::interp::Interp;
use reb_core::{Cell, ContextId, ContextKind, Kind, SeriesId, TypeSet};

pub(crate) const NATIVES: &[NativeEntry] = &[
    native("loop", "count [any-number!] body [block!]", loop_native),
    native("repeat", "'word [word!] count [any-number!] body [block!]", repeat_native),
    native(
        "for",
        "'word [word!] start [any-number!] end [any-number!] bump [any-number!] body [block!]",
        for_native,
    ),
    native("forall", "'word [word!] body [block!]", forall_native),
    native("forskip", "'word [word!] size [integer!] body [block!]", forskip_native),
    native("forever", "body [block!]", forever_native),
    native(
        "for-each",
        "'vars [word! block!] data [any-series! blank!] body [block!]",
        for_each_native,
    ),
    native(
        "remove-each",
        "'vars [word! block!] data [any-series!] body [block!]",
        remove_each_native,
    ),
    native(
        "map-each",
        "'vars [word! block!] data [any-series! blank!] body [block!]",
        map_each_native,
    ),
    native(
        "every",
        "'vars [word! block!] data [any-series! blank!] body [block!]",
        every_native,
    ),
    native("until", "body [block!]", until_native),
    native("while", "condition [block!] body [block!]", while_native),
];

/// Outcome of one pass through a loop body
enum Step {
    Done,
    Continue,
    Break,
    Thrown,
}

fn run_body(interp: &mut Interp, body: SeriesId, index: usize, out: &mut Cell) -> Result<Step, Fail> {
    interp.check_halt()?;
    if interp.do_array(body, index, Specifier::Specified, out)? == Flow::Done {
        return Ok(Step::Done);
    }
    let mut stop = false;
    if interp.is_break_or_continue(out, &mut stop) {
        return Ok(if stop { Step::Break } else { Step::Continue });
    }
    Ok(Step::Thrown)
}

/// Object holding the loop variables and a copy of `body` bound to it
fn loop_context(interp: &mut Interp, vars: &Cell, body: &Cell) -> Result<(ContextId, SeriesId, usize), Fail> {
    let words: Vec<Cell> = match vars.array_at() {
        Some((series, index)) => interp.heap.cells(series).iter().skip(index).cloned().collect(),
        None => vec![vars.clone()],
    };
    if words.is_empty() {
        return Err(interp.script_error("invalid-arg", &[vars.clone()]));
    }
    let ctx = interp.heap.make_context(ContextKind::Object, words.len());
    for word in &words {
        let Some(sym) = word.symbol().filter(|_| word.kind() == Kind::Word) else {
            return Err(interp.script_error("invalid-arg", &[word.clone()]));
        };
        let canon = interp.symbols.canon(sym);
        if interp.heap.find_word(ctx, canon, true) != 0 {
            return Err(interp.script_error("invalid-arg", &[word.clone()]));
        }
        interp
            .heap
            .append_key(ctx, canon, TypeSet::ANY_VALUE)
            .map_err(|e| interp.core_failure(e))?;
    }

    let Some((series, index)) = body.array_at() else {
        return Err(interp.script_error("invalid-arg", &[body.clone()]));
    };
    let copy = interp.heap.copy_array_deep_managed(series, index);
    interp.bind_values(copy, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)?;
    Ok((ctx, copy, words.len()))
}

fn loop_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let count = interp.arg(call, "count").as_decimal().unwrap_or(0.0) as i64;
    let (body, index) = interp.block_arg(call, "body")?;
    *out = Cell::void();
    for _ in 0..count.max(0) {
        match run_body(interp, body, index, out)? {
            Step::Thrown => return Ok(Disposition::OutIsThrown),
            Step::Break => break,
            Step::Done | Step::Continue => {}
        }
    }
    Ok(Disposition::OutSet)
}

fn forever_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let (body, index) = interp.block_arg(call, "body")?;
    loop {
        match run_body(interp, body, index, out)? {
            Step::Thrown => return Ok(Disposition::OutIsThrown),
            Step::Break => return Ok(Disposition::OutSet),
            Step::Done | Step::Continue => {}
        }
    }
}

/// Counting loop shared by REPEAT and FOR
///
/// The variable is read back after each pass, so the body may move it.
fn count_loop(
    interp: &mut Interp,
    call: &Call,
    out: &mut Cell,
    start: &Cell,
    end: &Cell,
    bump: &Cell,
) -> Result<Disposition, Fail> {
    let word = interp.arg(call, "word");
    let body = interp.arg(call, "body");
    let (ctx, body, _) = loop_context(interp, &word, &body)?;
    *out = Cell::void();

    if let (Some(mut i), Some(end), Some(bump)) = (start.as_integer(), end.as_integer(), bump.as_integer()) {
        while (bump >= 0 && i <= end) || (bump < 0 && i >= end) {
            interp.poke_var(ctx, 1, Cell::integer(i));
            match run_body(interp, body, 0, out)? {
                Step::Thrown => return Ok(Disposition::OutIsThrown),
                Step::Break => break,
                Step::Done | Step::Continue => {}
            }
            let current = interp.heap.var(ctx, 1).as_integer().unwrap_or(i);
            match current.checked_add(bump) {
                Some(next) => i = next,
                None => break,
            }
        }
        return Ok(Disposition::OutSet);
    }

    let (mut x, end, bump) = (
        start.as_decimal().unwrap_or(0.0),
        end.as_decimal().unwrap_or(0.0),
        bump.as_decimal().unwrap_or(0.0),
    );
    while (bump >= 0.0 && x <= end) || (bump < 0.0 && x >= end) {
        interp.poke_var(ctx, 1, Cell::decimal(x));
        match run_body(interp, body, 0, out)? {
            Step::Thrown => return Ok(Disposition::OutIsThrown),
            Step::Break => break,
            Step::Done | Step::Continue => {}
        }
        x = interp.heap.var(ctx, 1).as_decimal().unwrap_or(x) + bump;
    }
    Ok(Disposition::OutSet)
}

fn repeat_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let count = interp.arg(call, "count");
    let (start, bump) = match count.kind() {
        Kind::Integer => (Cell::integer(1), Cell::integer(1)),
        _ => (Cell::decimal(1.0), Cell::decimal(1.0)),
    };
    count_loop(interp, call, out, &start, &count, &bump)
}

fn for_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let start = interp.arg(call, "start");
    let end = interp.arg(call, "end");
    let bump = interp.arg(call, "bump");
    count_loop(interp, call, out, &start, &end, &bump)
}

/// FORALL and FORSKIP: step a series-holding word through its series
///
/// The word is set back to its original position when the loop ends.
fn skip_loop(interp: &mut Interp, call: &Call, out: &mut Cell, step: usize) -> Result<Disposition, Fail> {
    let word = interp.arg(call, "word");
    let original = interp.get_word_value(&word, Specifier::Specified)?;
    let Some((series, start)) = original.series_at() else {
        return Err(interp.script_error("invalid-arg", &[original]));
    };
    let (body, index) = interp.block_arg(call, "body")?;
    *out = Cell::void();

    let mut at = start;
    let disposition = loop {
        if at >= interp.series_len(&original) {
            break Disposition::OutSet;
        }
        let mut position = original.clone();
        position.set_index(at);
        interp.set_word_value(&word, Specifier::Specified, &position)?;
        match run_body(interp, body, index, out)? {
            Step::Thrown => break Disposition::OutIsThrown,
            Step::Break => break Disposition::OutSet,
            Step::Done | Step::Continue => {}
        }
        let current = interp.get_word_value(&word, Specifier::Specified)?;
        at = match current.series_at() {
            Some((s, i)) if s == series => i,
            _ => at,
        } + step;
    };

    interp.set_word_value(&word, Specifier::Specified, &original)?;
    Ok(disposition)
}

fn forall_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    skip_loop(interp, call, out, 1)
}

fn forskip_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let size = interp.arg(call, "size");
    match size.as_integer() {
        Some(n) if n > 0 => skip_loop(interp, call, out, n as usize),
        _ => Err(interp.error("math", "positive", &[])),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Each {
    ForEach,
    RemoveEach,
    MapEach,
    Every,
}

fn each_loop(interp: &mut Interp, call: &Call, out: &mut Cell, mode: Each) -> Result<Disposition, Fail> {
    let data = interp.arg(call, "data");
    if data.is_blank() {
        return Ok(match mode {
            Each::MapEach => {
                *out = Cell::block(interp.heap.make_managed_array(Vec::new()));
                Disposition::OutSet
            }
            _ => Disposition::Void,
        });
    }
    let vars = interp.arg(call, "vars");
    let body = interp.arg(call, "body");
    let (ctx, body, count) = loop_context(interp, &vars, &body)?;
    let items = interp.series_items(&data);

    let mut removed = vec![false; items.len()];
    let mut collected = Vec::new();
    let mut all_truthy = true;
    let mut broke = false;
    *out = Cell::void();

    let mut at = 0;
    while at < items.len() {
        for v in 0..count {
            let value = items.get(at + v).cloned().unwrap_or_else(Cell::blank);
            interp.poke_var(ctx, v + 1, value);
        }
        let step = run_body(interp, body, 0, out)?;
        match step {
            Step::Thrown => {
                // iterations that finished still have their removals applied
                if mode == Each::RemoveEach {
                    interp.remove_marked(&data, &removed)?;
                }
                return Ok(Disposition::OutIsThrown);
            }
            Step::Break => {
                broke = true;
                break;
            }
            Step::Continue => {}
            Step::Done => match mode {
                Each::RemoveEach if out.truthy() == Some(true) => {
                    let end = (at + count).min(items.len());
                    removed[at..end].fill(true);
                }
                Each::MapEach if !out.is_void() => collected.push(out.stored()),
                Each::Every if out.truthy() == Some(false) => all_truthy = false,
                _ => {}
            },
        }
        at += count;
    }

    match mode {
        Each::RemoveEach if broke => {
            interp.remove_marked(&data, &removed)?;
            Ok(Disposition::OutSet)
        }
        _ if broke => Ok(Disposition::OutSet),
        Each::ForEach => Ok(Disposition::OutSet),
        Each::Every if !all_truthy => Ok(Disposition::Blank),
        Each::Every => Ok(Disposition::OutSet),
        Each::MapEach => {
            *out = Cell::block(interp.heap.make_managed_array(collected));
            Ok(Disposition::OutSet)
        }
        Each::RemoveEach => {
            let count = interp.remove_marked(&data, &removed)?;
            *out = Cell::integer(count as i64);
            Ok(Disposition::OutSet)
        }
    }
}

fn for_each_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    each_loop(interp, call, out, Each::ForEach)
}

fn remove_each_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    each_loop(interp, call, out, Each::RemoveEach)
}

fn map_each_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    each_loop(interp, call, out, Each::MapEach)
}

fn every_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    each_loop(interp, call, out, Each::Every)
}

fn until_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let (body, index) = interp.block_arg(call, "body")?;
    loop {
        match run_body(interp, body, index, out)? {
            Step::Thrown => return Ok(Disposition::OutIsThrown),
            Step::Break => return Ok(Disposition::OutSet),
            Step::Continue => continue,
            Step::Done => {}
        }
        match out.truthy() {
            None => return Err(interp.script_error("no-return", &[])),
            Some(true) => return Ok(Disposition::OutSet),
            Some(false) => {}
        }
    }
}

fn while_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let (condition, cond_index) = interp.block_arg(call, "condition")?;
    let (body, body_index) = interp.block_arg(call, "body")?;
    *out = Cell::void();
    loop {
        let mut test = Cell::void();
        match run_body(interp, condition, cond_index, &mut test)? {
            Step::Thrown => {
                *out = test;
                return Ok(Disposition::OutIsThrown);
            }
            Step::Break => {
                *out = test;
                return Ok(Disposition::OutSet);
            }
            Step::Continue => continue,
            Step::Done => {}
        }
        match test.truthy() {
            None => return Err(interp.script_error("no-return", &[])),
            Some(false) => return Ok(Disposition::OutSet),
            Some(true) => {}
        }
        match run_body(interp, body, body_index, out)? {
            Step::Thrown => return Ok(Disposition::OutIsThrown),
            Step::Break => return Ok(Disposition::OutSet),
            Step::Done | Step::Continue => {}
        }
    }
}

impl Interp {
    /// Elements of a series from its index: cells of an array, chars of a string
    pub(crate) fn series_items(&self, data: &Cell) -> Vec<Cell> {
        if let Some((series, index)) = data.array_at() {
            return self.heap.cells(series).iter().skip(index).map(Cell::stored).collect();
        }
        if data.kind().is_string() {
            return self.string_of(data).chars().map(Cell::char).collect();
        }
        match data.series_at() {
            Some((series, index)) => self
                .heap
                .get(series)
                .bytes()
                .iter()
                .skip(index)
                .map(|b| Cell::integer(*b as i64))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop the elements flagged in `removed` (positions relative to the
    /// series index); returns how many went
    fn remove_marked(&mut self, data: &Cell, removed: &[bool]) -> Result<usize, Fail> {
        let count = removed.iter().filter(|r| **r).count();
        if count == 0 {
            return Ok(0);
        }
        let Some((series, index)) = data.series_at() else {
            return Err(self.script_error("invalid-arg", &[data.clone()]));
        };

        if data.kind().is_array() {
            let keep: Vec<Cell> = self
                .heap
                .cells(series)
                .iter()
                .skip(index)
                .zip(removed)
                .filter(|(_, gone)| !**gone)
                .map(|(cell, _)| cell.clone())
                .collect();
            self.heap
                .truncate(series, index)
                .and_then(|_| self.heap.insert_cells(series, index, keep))
                .map_err(|e| self.core_failure(e))?;
            return Ok(count);
        }

        if self.heap.get(series).is_locked() {
            return Err(self.script_error("protected-series", &[]));
        }
        let text = String::from_utf8_lossy(self.heap.get(series).bytes()).into_owned();
        let head: String = text.chars().take(index).collect();
        let tail: String = text
            .chars()
            .skip(index)
            .zip(removed)
            .filter(|(_, gone)| !**gone)
            .map(|(c, _)| c)
            .collect();
        if let Some(bytes) = self.heap.get_mut(series).bytes_mut() {
            *bytes = format!("{head}{tail}").into_bytes();
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::interp::Interp;
    use reb_core::Cell;

    fn run(interp: &mut Interp, source: &str) -> Cell {
        match interp.do_string(source, "test") {
            Ok(value) => value,
            Err(err) => panic!("{source}: {}", interp.form_error(err)),
        }
    }

    fn ints(interp: &Interp, value: &Cell) -> Vec<i64> {
        let (series, index) = value.array_at().unwrap();
        interp
            .heap
            .cells(series)
            .iter()
            .skip(index)
            .filter_map(|c| c.as_integer())
            .collect()
    }

    #[test]
    fn test_counting_loops() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "n: 0 loop 5 [n: n + 1] n").as_integer(), Some(5));
        assert_eq!(run(&mut interp, "s: 0 repeat i 4 [s: s + i] s").as_integer(), Some(10));
        assert_eq!(run(&mut interp, "s: 0 for i 10 1 -3 [s: s + i] s").as_integer(), Some(22));
        assert!(run(&mut interp, "loop 0 [1]").is_void());
    }

    #[test]
    fn test_break_and_continue() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert!(run(&mut interp, "loop 3 [break]").is_void());
        assert_eq!(run(&mut interp, "forever [break/with 7]").as_integer(), Some(7));
        let value = run(
            &mut interp,
            "map-each x [1 2 3 4] [if odd? x [continue] x]",
        );
        assert_eq!(ints(&interp, &value), vec![2, 4]);
    }

    #[test]
    fn test_for_each_multiple_vars() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "out: copy [] for-each [a b] [1 2 3 4 5] [append out reduce [b a]] out",
        );
        let (series, _) = value.array_at().unwrap();
        assert_eq!(interp.heap.len(series), 6);
        assert_eq!(interp.heap.at(series, 0).as_integer(), Some(2));
        assert!(interp.heap.at(series, 4).is_blank());
        assert!(run(&mut interp, "for-each x _ [1]").is_void());
    }

    #[test]
    fn test_loop_body_is_not_rebound() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "x: 100 body: [x] for-each x [1 2] body do body",
        );
        assert_eq!(value.as_integer(), Some(100));
    }

    #[test]
    fn test_remove_each_counts() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "b: [1 2 3 4 5 6] remove-each x b [even? x]");
        assert_eq!(value.as_integer(), Some(3));
        let b = run(&mut interp, "b");
        assert_eq!(ints(&interp, &b), vec![1, 3, 5]);
        let s = run(&mut interp, "s: \"banana\" remove-each c s [c = #\"a\"] s");
        assert_eq!(interp.string_of(&s), "bnn");
    }

    #[test]
    fn test_break_with_value_wins_over_the_loop_result() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "b: [1 2 3 4] remove-each x b [if x = 3 [break/with 99] even? x]",
        );
        assert_eq!(value.as_integer(), Some(99));
        // removals from the iterations before the break still happen
        let b = run(&mut interp, "b");
        assert_eq!(ints(&interp, &b), vec![1, 3, 4]);

        let value = run(&mut interp, "map-each x [1 2 3] [if x = 2 [break/with 'stop] x]");
        assert_eq!(interp.mold(&value), "stop");
        assert!(run(&mut interp, "map-each x [1 2 3] [if x = 2 [break] x]").is_void());
        assert_eq!(
            run(&mut interp, "every x [2 4] [break/with 5]").as_integer(),
            Some(5)
        );
    }

    #[test]
    fn test_remove_each_commits_before_a_throw() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "b: [1 2 3 4] catch [remove-each x b [if x = 3 [throw 0] even? x]] b",
        );
        assert_eq!(ints(&interp, &value), vec![1, 3, 4]);
    }

    #[test]
    fn test_every() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "every x [2 4] [even? x]").as_logic(), Some(true));
        assert!(run(&mut interp, "every x [2 3] [even? x]").is_blank());
    }

    #[test]
    fn test_forall_and_forskip() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(
            &mut interp,
            "b: [1 2 3 4] s: 0 forall b [s: s + first b] reduce [s length? b]",
        );
        assert_eq!(ints(&interp, &value), vec![10, 4]);
        let value = run(&mut interp, "s: 0 forskip b 2 [s: s + first b] s");
        assert_eq!(value.as_integer(), Some(4));
        let err = interp.do_string("forskip b 0 []", "test").unwrap_err();
        assert_eq!(interp.error_id(err).as_deref(), Some("positive"));
    }

    #[test]
    fn test_until_and_while() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "n: 0 until [n: n + 1 n = 3] n").as_integer(), Some(3));
        assert_eq!(run(&mut interp, "n: 0 while [n < 5] [n: n + 1] n").as_integer(), Some(5));
        let err = interp.do_string("while [if false [1]] [1]", "test").unwrap_err();
        assert_eq!(interp.error_id(err).as_deref(), Some("no-return"));
        let err = interp.do_string("until [if false [1]]", "test").unwrap_err();
        assert_eq!(interp.error_id(err).as_deref(), Some("no-return"));
    }
}
