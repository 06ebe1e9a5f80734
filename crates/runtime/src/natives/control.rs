//! Conditionals, throws, definitional exits, evaluation and error natives

use super::{Call, Disposition, NativeEntry, finish, native};
use crate::control::Flow;
use crate::error::Fail;
use crate::eval::Feed;
use crate::frame::Specifier;
use crate::interp::Interp;
use reb_core::{Binding, Cell, ContextId, Kind, SeriesId};

pub(crate) const NATIVES: &[NativeEntry] = &[
    native("if", "condition branch [block! function!]", if_native),
    native(
        "either",
        "condition true-branch [block! function!] false-branch [block! function!]",
        either_native,
    ),
    native("not", "value [any-value!]", not_native),
    native("all", "block [block!]", all_native),
    native("any", "block [block!]", any_native),
    native("catch", "block [block!] /name names [word! block!]", catch_native),
    native("throw", "value [any-value!] /name label [word!]", throw_native),
    native("break", "/with value [any-value!]", break_native),
    native("continue", "", continue_native),
    native("return", "value [any-value!]", return_native),
    native("leave", "", leave_native),
    native("quit", "/with value [integer!]", quit_native),
    native("halt", "", halt_native),
    native("do", "value [any-value!]", do_native),
    native("eval", "value [any-value!]", eval_native),
    native("reduce", "value [any-value!]", reduce_native),
    native(
        "trap",
        "code [block! function!] /with handler [block! function!] /?",
        trap_native,
    ),
    native("attempt", "code [block!]", attempt_native),
    native(
        "fail",
        "reason [any-value!] /where location [frame! any-word!]",
        fail_native,
    ),
    native(
        "set-location-of-error",
        "error [error!] location [frame! any-word!]",
        set_location_native,
    ),
    native("panic", "reason [any-value!]", panic_native),
    native("panic-value", "value [any-value!]", panic_value_native),
];

fn if_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    if interp.arg(call, "condition").truthy() != Some(true) {
        return Ok(Disposition::Void);
    }
    let branch = interp.arg(call, "branch");
    Ok(finish(interp.do_branch(&branch, out)?))
}

fn either_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let name = if interp.arg(call, "condition").truthy() == Some(true) {
        "true-branch"
    } else {
        "false-branch"
    };
    let branch = interp.arg(call, name);
    Ok(finish(interp.do_branch(&branch, out)?))
}

fn not_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    match value.truthy() {
        Some(true) => Ok(Disposition::False),
        Some(false) => Ok(Disposition::True),
        None => Err(interp.script_error("no-value", &[value])),
    }
}

/// Evaluate the block expression by expression; `stop_on` says which
/// truthiness ends the walk early
fn walk_conditions(
    interp: &mut Interp,
    call: &Call,
    out: &mut Cell,
    stop_on: bool,
) -> Result<Option<Flow>, Fail> {
    let (series, index) = interp.block_arg(call, "block")?;
    interp.heap.guard(series);
    let mut feed = Feed::array(series, index, Specifier::Specified);
    let mut result = None;
    while !feed.at_end(interp) {
        let mut value = Cell::void();
        if interp.eval_step(&mut feed, &mut value, true)? == Flow::Thrown {
            *out = value;
            result = Some(Flow::Thrown);
            break;
        }
        match value.truthy() {
            None => continue,
            Some(truth) if truth == stop_on => {
                *out = value;
                result = Some(Flow::Done);
                break;
            }
            Some(_) => *out = value,
        }
    }
    interp.heap.drop_guard(series);
    Ok(result)
}

fn all_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    *out = Cell::void();
    match walk_conditions(interp, call, out, false)? {
        Some(Flow::Thrown) => Ok(Disposition::OutIsThrown),
        Some(Flow::Done) => Ok(Disposition::Blank),
        None => Ok(Disposition::VoidIfUnwrittenElseOut),
    }
}

fn any_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    *out = Cell::void();
    match walk_conditions(interp, call, out, true)? {
        Some(Flow::Thrown) => Ok(Disposition::OutIsThrown),
        Some(Flow::Done) => Ok(Disposition::OutSet),
        None => Ok(Disposition::Blank),
    }
}

fn catch_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let (series, index) = interp.block_arg(call, "block")?;
    if interp.do_array(series, index, Specifier::Specified, out)? == Flow::Done {
        return Ok(Disposition::OutSet);
    }

    let caught = if interp.refine(call, "name") {
        let names = interp.arg(call, "names");
        let candidates: Vec<Cell> = match names.array_at() {
            Some((series, index)) => interp.heap.cells(series).iter().skip(index).cloned().collect(),
            None => vec![names],
        };
        let label = match (out.kind(), out.symbol()) {
            (Kind::Word, Some(sym)) => Some(interp.symbols.canon(sym)),
            _ => None,
        };
        label.is_some_and(|label| {
            candidates
                .iter()
                .filter_map(Cell::symbol)
                .any(|sym| interp.symbols.canon(sym) == label)
        })
    } else {
        out.kind() == Kind::Blank
    };

    if !caught {
        return Ok(Disposition::OutIsThrown);
    }
    interp.catch_thrown(out);
    Ok(Disposition::OutSet)
}

fn throw_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let label = if interp.refine(call, "name") {
        interp.arg(call, "label")
    } else {
        Cell::blank()
    };
    let _ = interp.throw(out, label, value);
    Ok(Disposition::OutIsThrown)
}

fn break_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = if interp.refine(call, "with") {
        interp.arg(call, "value")
    } else {
        Cell::void()
    };
    let label = Cell::function(interp.labels().break_fn);
    let _ = interp.throw(out, label, value);
    Ok(Disposition::OutIsThrown)
}

fn continue_native(interp: &mut Interp, _call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let label = Cell::function(interp.labels().continue_fn);
    let _ = interp.throw(out, label, Cell::void());
    Ok(Disposition::OutIsThrown)
}

/// Throw to the frame named by a RETURN/LEAVE binding
fn definitional_exit(
    interp: &mut Interp,
    call: &Call,
    out: &mut Cell,
    name: &str,
    value: Cell,
) -> Result<Disposition, Fail> {
    if !interp.return_target_live(call.binding) {
        let word = interp.word_cell(Kind::Word, name);
        return Err(interp.script_error("no-relative", &[word]));
    }
    let mut label = Cell::function(call.func);
    label.set_binding(call.binding);
    let _ = interp.throw(out, label, value);
    Ok(Disposition::OutIsThrown)
}

fn return_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    definitional_exit(interp, call, out, "return", value)
}

fn leave_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    definitional_exit(interp, call, out, "leave", Cell::void())
}

fn quit_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let code = if interp.refine(call, "with") {
        interp.arg(call, "value")
    } else {
        Cell::integer(0)
    };
    let label = Cell::function(interp.labels().quit_fn);
    let _ = interp.throw(out, label, code);
    Ok(Disposition::OutIsThrown)
}

fn halt_native(interp: &mut Interp, _call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    Err(interp.error("user-halt", "halt", &[]))
}

fn do_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    match value.kind() {
        Kind::Block | Kind::Group => {
            let (series, index) = interp.block_arg(call, "value")?;
            Ok(finish(interp.do_array(series, index, Specifier::Specified, out)?))
        }
        Kind::String => {
            let source = interp.string_of(&value);
            do_source(interp, &source, "do", out)
        }
        Kind::File => {
            let path = interp.string_of(&value);
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    let reason = interp.make_string(&e.to_string());
                    return Err(interp.error("access", "device-error", &[value, reason]));
                }
            };
            do_source(interp, &source, &path, out)
        }
        Kind::Function => {
            *out = value;
            Ok(Disposition::ReevaluateCell)
        }
        Kind::Error => match value.context_id() {
            Some(err) => Err(Fail(err)),
            None => Err(interp.script_error("invalid-arg", &[value])),
        },
        Kind::Void => Ok(Disposition::Void),
        _ => {
            *out = value;
            Ok(Disposition::OutSet)
        }
    }
}

fn do_source(interp: &mut Interp, source: &str, file: &str, out: &mut Cell) -> Result<Disposition, Fail> {
    let code = interp.load_string(source, file)?;
    interp.bind_to_user(code)?;
    Ok(finish(interp.do_array(code, 0, Specifier::Specified, out)?))
}

fn eval_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    *out = interp.arg(call, "value");
    Ok(Disposition::ReevaluateCell)
}

fn reduce_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    match value.array_at() {
        Some((series, index)) if value.kind() == Kind::Block => {
            Ok(finish(interp.reduce_array(series, index, out)?))
        }
        _ => {
            *out = value;
            Ok(Disposition::OutSet)
        }
    }
}

impl Interp {
    /// New block holding the value of every expression in `series`
    ///
    /// Expressions that produce void contribute nothing.
    pub fn reduce_array(&mut self, series: SeriesId, index: usize, out: &mut Cell) -> Result<Flow, Fail> {
        self.heap.guard(series);
        let mut feed = Feed::array(series, index, Specifier::Specified);
        let mut values = Vec::new();
        while !feed.at_end(self) {
            let mut value = Cell::void();
            if self.eval_step(&mut feed, &mut value, true)? == Flow::Thrown {
                self.heap.drop_guard(series);
                *out = value;
                return Ok(Flow::Thrown);
            }
            if !value.is_void() {
                values.push(value.stored());
            }
        }
        self.heap.drop_guard(series);
        *out = Cell::block(self.heap.make_managed_array(values));
        Ok(Flow::Done)
    }

    /// Stack depth named by a FRAME! value or by the binding of a word
    fn depth_of_location(&mut self, location: &Cell) -> Result<usize, Fail> {
        let depth = match (location.context_id(), location.binding()) {
            (Some(ctx), _) => self.frames.iter().rev().position(|f| f.reified == Some(ctx)),
            (None, Binding::Relative { function, .. }) => self.depth_of_function(function),
            (None, Binding::Specific { context, .. }) => self
                .frames
                .iter()
                .rev()
                .position(|f| f.reified == Some(context) || f.args == context.0),
            (None, Binding::Unbound) => None,
        };
        match depth {
            Some(depth) => Ok(depth),
            None => Err(self.script_error("no-relative", &[location.clone()])),
        }
    }
}

fn trap_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let code = interp.arg(call, "code");
    let query = interp.refine(call, "?");
    let result = interp.trap(|interp| {
        let mut value = Cell::void();
        let flow = interp.do_branch(&code, &mut value)?;
        Ok((flow, value))
    });

    match result {
        Ok((Flow::Thrown, value)) => {
            *out = value;
            Ok(Disposition::OutIsThrown)
        }
        Ok(_) if query => Ok(Disposition::False),
        Ok((Flow::Done, value)) => {
            if value.kind() == Kind::Error && !interp.refine(call, "with") {
                return Ok(Disposition::Void);
            }
            *out = value;
            Ok(Disposition::OutSet)
        }
        Err(_) if query => Ok(Disposition::True),
        Err(err) => {
            let error = interp.heap.context_value(err);
            if !interp.refine(call, "with") {
                *out = error;
                return Ok(Disposition::OutSet);
            }
            let handler = interp.arg(call, "handler");
            let flow = if handler.kind() == Kind::Function {
                interp.apply_function(&handler, vec![error], out)?
            } else {
                interp.do_branch(&handler, out)?
            };
            Ok(finish(flow))
        }
    }
}

fn attempt_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let code = interp.arg(call, "code");
    let result = interp.trap(|interp| {
        let mut value = Cell::void();
        let flow = interp.do_branch(&code, &mut value)?;
        Ok((flow, value))
    });
    match result {
        Ok((flow, value)) => {
            *out = value;
            Ok(finish(flow))
        }
        Err(_) => Ok(Disposition::Blank),
    }
}

fn fail_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let reason = interp.arg(call, "reason");
    let err: ContextId = match reason.kind() {
        Kind::Error => match reason.context_id() {
            Some(err) => err,
            None => return Err(interp.script_error("invalid-arg", &[reason])),
        },
        kind if kind.is_string() => {
            let text = interp.string_of(&reason);
            let message = interp.make_string(&text);
            interp.make_error("user", "message", &[message])
        }
        Kind::Block => {
            let Some((series, index)) = reason.array_at() else {
                return Err(interp.script_error("invalid-arg", &[reason]));
            };
            let mut reduced = Cell::void();
            if interp.reduce_array(series, index, &mut reduced)? == Flow::Thrown {
                *out = reduced;
                return Ok(Disposition::OutIsThrown);
            }
            let text = interp.form(&reduced);
            let message = interp.make_string(&text);
            interp.make_error("user", "message", &[message])
        }
        kind => {
            return Err(interp.script_error("limited-fail-input", &[Cell::datatype(kind)]));
        }
    };

    let depth = if interp.refine(call, "where") {
        let location = interp.arg(call, "location");
        interp.depth_of_location(&location)?
    } else {
        1
    };
    interp.set_location_of_error(err, depth);
    Err(Fail(err))
}

fn set_location_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let error = interp.arg(call, "error");
    let location = interp.arg(call, "location");
    let Some(err) = error.context_id() else {
        return Err(interp.script_error("invalid-arg", &[error]));
    };
    let depth = interp.depth_of_location(&location)?;
    interp.set_location_of_error(err, depth);
    Ok(Disposition::Void)
}

fn panic_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let reason = interp.arg(call, "reason");
    let message = if reason.kind().is_string() {
        interp.string_of(&reason)
    } else {
        interp.mold(&reason)
    };
    interp.panic_with(&message, None)
}

fn panic_value_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    interp.panic_with("panic-value", Some(&value))
}

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::interp::Interp;
    use reb_core::{Cell, Kind};

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
    fn test_conditionals() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "if true [1]").as_integer(), Some(1));
        assert!(run(&mut interp, "if false [1]").is_void());
        assert!(run(&mut interp, "if _ [1]").is_void());
        assert_eq!(run(&mut interp, "either 0 [1] [2]").as_integer(), Some(1));
        assert_eq!(run(&mut interp, "not false").as_logic(), Some(true));
    }

    #[test]
    fn test_all_and_any() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "all [1 2 3]").as_integer(), Some(3));
        assert!(run(&mut interp, "all [1 false 3]").is_blank());
        assert!(run(&mut interp, "all []").is_void());
        assert_eq!(run(&mut interp, "any [false _ 7]").as_integer(), Some(7));
        assert!(run(&mut interp, "any [false]").is_blank());
    }

    #[test]
    fn test_catch_and_throw() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "catch [throw 5 6]").as_integer(), Some(5));
        assert_eq!(
            run(&mut interp, "catch/name [catch [throw/name 1 'outer] 2] 'outer").as_integer(),
            Some(1)
        );
        assert_eq!(fails_with(&mut interp, "throw 1"), "no-catch");
        assert_eq!(fails_with(&mut interp, "catch/name [throw 1] 'other"), "no-catch");
    }

    #[test]
    fn test_do_forms() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "do [1 + 1]").as_integer(), Some(2));
        assert_eq!(run(&mut interp, "do \"2 * 3\"").as_integer(), Some(6));
        assert_eq!(run(&mut interp, "do :add 1 2").as_integer(), Some(3));
        assert_eq!(run(&mut interp, "x: 9 eval 'x").as_integer(), Some(9));
        assert_eq!(fails_with(&mut interp, "do make error! \"boom\""), "message");
    }

    #[test]
    fn test_reduce_skips_void() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "reduce [1 + 1 if false [0] 3]");
        let (block, _) = value.array_at().unwrap();
        assert_eq!(interp.heap.len(block), 2);
        assert_eq!(interp.heap.at(block, 0).as_integer(), Some(2));
    }

    #[test]
    fn test_trap_paths() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "trap [1 / 0]");
        assert_eq!(value.kind(), Kind::Error);
        assert_eq!(
            interp.error_id(value.context_id().unwrap()).as_deref(),
            Some("zero-divide")
        );
        assert_eq!(run(&mut interp, "trap [1 + 1]").as_integer(), Some(2));
        // an error value that was not raised comes back void
        assert!(run(&mut interp, "trap [make error! \"quiet\"]").is_void());
        assert_eq!(run(&mut interp, "trap/? [fail \"x\"]").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "trap/? [1]").as_logic(), Some(false));
        assert_eq!(
            run(&mut interp, "trap/with [fail \"x\"] func [e] [42]").as_integer(),
            Some(42)
        );
        assert_eq!(interp.eval_depth(), 0);
    }

    #[test]
    fn test_attempt_and_fail() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert!(run(&mut interp, "attempt [fail \"no\"]").is_blank());
        assert_eq!(run(&mut interp, "attempt [10]").as_integer(), Some(10));
        assert_eq!(fails_with(&mut interp, "fail 10"), "limited-fail-input");
        let err = interp.do_string("fail [\"count:\" 1 + 2]", "test").unwrap_err();
        let message = interp.heap.var(err, crate::error::FIELD_ARG1).clone();
        assert_eq!(interp.string_of(&message), "count: 3");
    }

    #[test]
    fn test_fail_where_names_frame() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let err = interp
            .do_string("check: func [x] [fail/where \"bad\" 'x] wrap: func [] [check 1] wrap", "test")
            .unwrap_err();
        let where_cell = interp.heap.var(err, crate::error::FIELD_WHERE).clone();
        let text = interp.mold(&where_cell);
        assert_eq!(text, "[check wrap]");
    }

    #[test]
    fn test_return_after_frame_ends() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(
            fails_with(&mut interp, "grab: func [] [:return] r: grab r 1"),
            "no-relative"
        );
    }

    #[test]
    fn test_quit_records_code() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert!(run(&mut interp, "quit/with 3 print \"unreached\"").is_void());
        assert_eq!(interp.quit_code(), Some(3));
    }
}
