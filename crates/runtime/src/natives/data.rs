//! Math, comparison, series and output natives
//!
//! | Group      | Natives                                              |
//! |------------|------------------------------------------------------|
//! | Math       | `+ - * /`, add, subtract, multiply, divide, negate   |
//! | Compare    | `= <> == < > <= >=`, equal?, same?, lesser? ...      |
//! | Series     | append, insert, change, find, first, pick, next ...  |
//! | Types      | type-of and the `xxx?` predicates                    |
//! | Output     | print, probe, mold, form                             |

use super::{Call, Disposition, NativeEntry, enfix, native};
use crate::control::Flow;
use crate::error::Fail;
use crate::interp::Interp;
use crate::modify::{ModifyAction, ModifyOptions};
use reb_core::{Cell, Kind, Payload};
use std::cmp::Ordering;

pub(crate) const NATIVES: &[NativeEntry] = &[
    enfix("+", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", add_native),
    enfix("-", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", subtract_native),
    enfix("*", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", multiply_native),
    enfix("/", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", divide_native),
    native("add", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", add_native),
    native("subtract", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", subtract_native),
    native("multiply", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", multiply_native),
    native("divide", "value1 [any-number! pair! char! time!] value2 [any-number! pair! char! time!]", divide_native),
    native("negate", "number [any-number! pair! time!]", negate_native),
    native("even?", "number [any-number! char!]", even_q_native),
    native("odd?", "number [any-number! char!]", odd_q_native),
    native("zero?", "value [any-number! pair! char! time!]", zero_q_native),
    enfix("=", "value1 value2", equal_native),
    enfix("<>", "value1 value2", not_equal_native),
    enfix("==", "value1 value2", strict_equal_native),
    enfix("<", "value1 value2", lesser_native),
    enfix(">", "value1 value2", greater_native),
    enfix("<=", "value1 value2", lesser_or_equal_native),
    enfix(">=", "value1 value2", greater_or_equal_native),
    native("equal?", "value1 value2", equal_native),
    native("not-equal?", "value1 value2", not_equal_native),
    native("strict-equal?", "value1 value2", strict_equal_native),
    native("same?", "value1 value2", same_native),
    native("lesser?", "value1 value2", lesser_native),
    native("greater?", "value1 value2", greater_native),
    native(
        "append",
        "series [any-series!] value [any-value!] /only /part limit [integer!] /dup count [integer!]",
        append_native,
    ),
    native(
        "insert",
        "series [any-series!] value [any-value!] /only /part limit [integer!] /dup count [integer!]",
        insert_native,
    ),
    native(
        "change",
        "series [any-series!] value [any-value!] /only /part limit [integer!] /dup count [integer!]",
        change_native,
    ),
    native("find", "series [any-series! blank!] value [any-value!]", find_native),
    native("length?", "series [any-series! any-context! blank!]", length_native),
    native("first", "series [any-series! pair! tuple!]", first_native),
    native("second", "series [any-series! pair! tuple!]", second_native),
    native(
        "pick",
        "series [any-series! pair! tuple! any-context!] index [integer! word!]",
        pick_native,
    ),
    native("next", "series [any-series!]", next_native),
    native("back", "series [any-series!]", back_native),
    native("head", "series [any-series!]", head_native),
    native("tail", "series [any-series!]", tail_native),
    native("tail?", "series [any-series!]", tail_q_native),
    native("empty?", "series [any-series! blank!]", empty_q_native),
    native("type-of", "value [any-value!]", type_of_native),
    native("error?", "value [any-value!]", error_q_native),
    native("blank?", "value [any-value!]", blank_q_native),
    native("void?", "value [any-value!]", void_q_native),
    native("integer?", "value [any-value!]", integer_q_native),
    native("decimal?", "value [any-value!]", decimal_q_native),
    native("logic?", "value [any-value!]", logic_q_native),
    native("string?", "value [any-value!]", string_q_native),
    native("block?", "value [any-value!]", block_q_native),
    native("word?", "value [any-value!]", word_q_native),
    native("function?", "value [any-value!]", function_q_native),
    native("object?", "value [any-value!]", object_q_native),
    native("print", "value [any-value!]", print_native),
    native("probe", "value [any-value!]", probe_native),
    native("mold", "value [any-value!]", mold_native),
    native("form", "value [any-value!]", form_native),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Interp {
    /// Binary arithmetic on two scalar values
    fn arithmetic(&mut self, op: MathOp, a: &Cell, b: &Cell) -> Result<Cell, Fail> {
        match (a.payload(), b.payload()) {
            (Payload::Integer(x), Payload::Integer(y)) => {
                let (x, y) = (*x, *y);
                let result = match op {
                    MathOp::Add => x.checked_add(y),
                    MathOp::Subtract => x.checked_sub(y),
                    MathOp::Multiply => x.checked_mul(y),
                    MathOp::Divide => {
                        if y == 0 {
                            return Err(self.error("math", "zero-divide", &[]));
                        }
                        if x % y != 0 {
                            return Ok(Cell::decimal(x as f64 / y as f64));
                        }
                        x.checked_div(y)
                    }
                };
                match result {
                    Some(n) => Ok(Cell::integer(n)),
                    None => Err(self.error("math", "overflow", &[])),
                }
            }
            (Payload::Pair(x1, y1), _) | (_, Payload::Pair(x1, y1)) => {
                let (x1, y1) = (*x1, *y1);
                let (x2, y2) = match (a.payload(), b.payload()) {
                    (Payload::Pair(..), Payload::Pair(x2, y2)) => (*x2, *y2),
                    (Payload::Pair(..), _) => match b.as_decimal() {
                        Some(n) => (n, n),
                        None => return Err(self.script_error("invalid-arg", &[b.clone()])),
                    },
                    _ => return Err(self.script_error("invalid-arg", &[a.clone()])),
                };
                let x = self.float_op(op, x1, x2)?;
                let y = self.float_op(op, y1, y2)?;
                Ok(Cell::pair(x, y))
            }
            (Payload::Char(c), Payload::Integer(n)) if matches!(op, MathOp::Add | MathOp::Subtract) => {
                let code = *c as i64;
                let code = if op == MathOp::Add { code + n } else { code - n };
                match u32::try_from(code).ok().and_then(char::from_u32) {
                    Some(c) => Ok(Cell::char(c)),
                    None => Err(self.script_error("type-limit", &[Cell::datatype(Kind::Char)])),
                }
            }
            (Payload::Time(x), Payload::Time(y)) if matches!(op, MathOp::Add | MathOp::Subtract) => {
                let result = if op == MathOp::Add {
                    x.checked_add(*y)
                } else {
                    x.checked_sub(*y)
                };
                match result {
                    Some(n) => Ok(Cell::time(n)),
                    None => Err(self.error("math", "overflow", &[])),
                }
            }
            _ => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) if a.kind().is_number() && b.kind().is_number() => {
                    Ok(Cell::decimal(self.float_op(op, x, y)?))
                }
                _ => {
                    let culprit = if a.kind().is_number() { b.clone() } else { a.clone() };
                    Err(self.script_error("invalid-arg", &[culprit]))
                }
            },
        }
    }

    fn float_op(&mut self, op: MathOp, x: f64, y: f64) -> Result<f64, Fail> {
        Ok(match op {
            MathOp::Add => x + y,
            MathOp::Subtract => x - y,
            MathOp::Multiply => x * y,
            MathOp::Divide => {
                if y == 0.0 {
                    return Err(self.error("math", "zero-divide", &[]));
                }
                x / y
            }
        })
    }
}

fn math(interp: &mut Interp, call: &Call, out: &mut Cell, op: MathOp) -> Result<Disposition, Fail> {
    let a = interp.arg(call, "value1");
    let b = interp.arg(call, "value2");
    *out = interp.arithmetic(op, &a, &b)?;
    Ok(Disposition::OutSet)
}

fn add_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    math(interp, call, out, MathOp::Add)
}

fn subtract_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    math(interp, call, out, MathOp::Subtract)
}

fn multiply_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    math(interp, call, out, MathOp::Multiply)
}

fn divide_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    math(interp, call, out, MathOp::Divide)
}

fn negate_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let number = interp.arg(call, "number");
    *out = match number.payload() {
        Payload::Integer(n) => match n.checked_neg() {
            Some(n) => Cell::integer(n),
            None => return Err(interp.error("math", "overflow", &[])),
        },
        Payload::Decimal(d) => Cell::decimal(-d),
        Payload::Pair(x, y) => Cell::pair(-x, -y),
        Payload::Time(t) => Cell::time(-t),
        _ => return Err(interp.script_error("invalid-arg", &[number])),
    };
    Ok(Disposition::OutSet)
}

fn parity(interp: &mut Interp, call: &Call) -> Result<i64, Fail> {
    let number = interp.arg(call, "number");
    match number.payload() {
        Payload::Integer(n) => Ok(*n),
        Payload::Decimal(d) => Ok(d.trunc() as i64),
        Payload::Char(c) => Ok(*c as i64),
        _ => Err(interp.script_error("invalid-arg", &[number])),
    }
}

fn even_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    Ok(logic(parity(interp, call)? % 2 == 0))
}

fn odd_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    Ok(logic(parity(interp, call)? % 2 != 0))
}

fn zero_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let zero = match value.payload() {
        Payload::Integer(n) => *n == 0,
        Payload::Decimal(d) => *d == 0.0,
        Payload::Pair(x, y) => *x == 0.0 && *y == 0.0,
        Payload::Char(c) => *c == '\0',
        Payload::Time(t) => *t == 0,
        _ => false,
    };
    Ok(logic(zero))
}

fn logic(flag: bool) -> Disposition {
    if flag { Disposition::True } else { Disposition::False }
}

fn operands(interp: &Interp, call: &Call) -> (Cell, Cell) {
    (interp.arg(call, "value1"), interp.arg(call, "value2"))
}

fn equal_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let (a, b) = operands(interp, call);
    Ok(logic(interp.equal_values(&a, &b, false)))
}

fn not_equal_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let (a, b) = operands(interp, call);
    Ok(logic(!interp.equal_values(&a, &b, false)))
}

fn strict_equal_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let (a, b) = operands(interp, call);
    Ok(logic(interp.equal_values(&a, &b, true)))
}

fn same_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let (a, b) = operands(interp, call);
    Ok(logic(interp.same_values(&a, &b)))
}

fn ordering(interp: &mut Interp, call: &Call, accept: fn(Ordering) -> bool) -> Result<Disposition, Fail> {
    let (a, b) = operands(interp, call);
    let order = interp.compare_values(&a, &b, false)?;
    Ok(logic(accept(order)))
}

fn lesser_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    ordering(interp, call, Ordering::is_lt)
}

fn greater_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    ordering(interp, call, Ordering::is_gt)
}

fn lesser_or_equal_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    ordering(interp, call, Ordering::is_le)
}

fn greater_or_equal_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    ordering(interp, call, Ordering::is_ge)
}

fn modify(interp: &mut Interp, call: &Call, out: &mut Cell, action: ModifyAction) -> Result<Disposition, Fail> {
    let mut series = interp.arg(call, "series");
    let value = interp.arg(call, "value");
    let Some((id, index)) = series.series_at() else {
        return Err(interp.script_error("invalid-arg", &[series]));
    };
    let options = ModifyOptions {
        only: interp.refine(call, "only"),
        part: count_arg(interp, call, "part", "limit"),
        dup: count_arg(interp, call, "dup", "count").unwrap_or(1),
    };

    let at = if value.is_void() {
        index
    } else if series.kind().is_array() {
        interp.modify_array(action, id, index, &value, options)?
    } else {
        interp.modify_string(action, id, index, &value, options)?
    };
    series.set_index(if action == ModifyAction::Append { 0 } else { at });
    *out = series;
    Ok(Disposition::OutSet)
}

/// Non-negative count argument of a refinement, when the refinement is used
fn count_arg(interp: &Interp, call: &Call, refinement: &str, arg: &str) -> Option<usize> {
    interp
        .refine(call, refinement)
        .then(|| interp.arg(call, arg).as_integer().unwrap_or(0).max(0) as usize)
}

fn append_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    modify(interp, call, out, ModifyAction::Append)
}

fn insert_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    modify(interp, call, out, ModifyAction::Insert)
}

fn change_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    modify(interp, call, out, ModifyAction::Change)
}

fn find_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let series = interp.arg(call, "series");
    let value = interp.arg(call, "value");
    let Some((id, index)) = series.series_at() else {
        return Ok(Disposition::Blank);
    };

    let found = if series.kind().is_array() {
        (index..interp.heap.len(id)).find(|&at| {
            interp.compare_total(interp.heap.at(id, at), &value, false) == Ordering::Equal
        })
    } else {
        let hay: Vec<char> = interp.string_of(&series).to_lowercase().chars().collect();
        let needle: Vec<char> = interp.form(&value).to_lowercase().chars().collect();
        if needle.is_empty() {
            None
        } else {
            hay.windows(needle.len())
                .position(|w| w == needle.as_slice())
                .map(|offset| index + offset)
        }
    };
    match found {
        Some(at) => {
            let mut hit = series;
            hit.set_index(at);
            *out = hit;
            Ok(Disposition::OutSet)
        }
        None => Ok(Disposition::Blank),
    }
}

fn length_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let series = interp.arg(call, "series");
    let len = if let Some(ctx) = series.context_id() {
        interp.heap.context_len(ctx)
    } else if let Some((_, index)) = series.series_at() {
        interp.series_len(&series).saturating_sub(index)
    } else {
        return Ok(Disposition::Blank);
    };
    *out = Cell::integer(len as i64);
    Ok(Disposition::OutSet)
}

fn pick_at(interp: &mut Interp, series: &Cell, selector: &Cell, out: &mut Cell) -> Result<Disposition, Fail> {
    if series.kind().is_string() {
        let n = selector.as_integer().unwrap_or(0);
        let text = interp.string_of(series);
        *out = match usize::try_from(n - 1).ok().and_then(|i| text.chars().nth(i)) {
            Some(c) => Cell::char(c),
            None => Cell::blank(),
        };
        return Ok(Disposition::OutSet);
    }
    let path = series.clone();
    *out = interp.select(series, selector, &path)?;
    Ok(Disposition::OutSet)
}

fn first_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let series = interp.arg(call, "series");
    pick_at(interp, &series, &Cell::integer(1), out)
}

fn second_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let series = interp.arg(call, "series");
    pick_at(interp, &series, &Cell::integer(2), out)
}

fn pick_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let series = interp.arg(call, "series");
    let index = interp.arg(call, "index");
    pick_at(interp, &series, &index, out)
}

fn reposition(interp: &mut Interp, call: &Call, out: &mut Cell, place: fn(usize, usize) -> usize) -> Result<Disposition, Fail> {
    let mut series = interp.arg(call, "series");
    let Some((_, index)) = series.series_at() else {
        return Err(interp.script_error("invalid-arg", &[series]));
    };
    let len = interp.series_len(&series);
    series.set_index(place(index, len));
    *out = series;
    Ok(Disposition::OutSet)
}

fn next_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    reposition(interp, call, out, |index, len| (index + 1).min(len))
}

fn back_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    reposition(interp, call, out, |index, _| index.saturating_sub(1))
}

fn head_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    reposition(interp, call, out, |_, _| 0)
}

fn tail_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    reposition(interp, call, out, |_, len| len)
}

fn at_tail(interp: &Interp, series: &Cell) -> bool {
    match series.series_at() {
        Some((_, index)) => index >= interp.series_len(series),
        None => true,
    }
}

fn tail_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let series = interp.arg(call, "series");
    Ok(logic(at_tail(interp, &series)))
}

fn empty_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let series = interp.arg(call, "series");
    Ok(logic(at_tail(interp, &series)))
}

fn type_of_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    *out = Cell::datatype(value.kind());
    Ok(Disposition::OutSet)
}

fn kind_q(interp: &Interp, call: &Call, test: fn(Kind) -> bool) -> Result<Disposition, Fail> {
    Ok(logic(test(interp.arg(call, "value").kind())))
}

fn error_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Error)
}

fn blank_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Blank)
}

fn void_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Void)
}

fn integer_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Integer)
}

fn decimal_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Decimal)
}

fn logic_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Logic)
}

fn string_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::String)
}

fn block_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Block)
}

fn word_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Word)
}

fn function_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Function)
}

fn object_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    kind_q(interp, call, |k| k == Kind::Object)
}

fn print_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let line = match value.array_at() {
        Some((series, index)) if value.kind() == Kind::Block => {
            let mut reduced = Cell::void();
            if interp.reduce_array(series, index, &mut reduced)? == Flow::Thrown {
                *out = reduced;
                return Ok(Disposition::OutIsThrown);
            }
            interp.form(&reduced)
        }
        _ => interp.form(&value),
    };
    interp.write_line(&line);
    Ok(Disposition::Void)
}

fn probe_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let text = interp.mold(&value);
    interp.write_line(&text);
    *out = value;
    Ok(Disposition::OutSet)
}

fn mold_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let text = interp.mold(&value);
    *out = interp.make_string(&text);
    Ok(Disposition::OutSet)
}

fn form_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let text = interp.form(&value);
    *out = interp.make_string(&text);
    Ok(Disposition::OutSet)
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
    fn test_integer_math() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "1 + 2 * 3").as_integer(), Some(9));
        assert_eq!(run(&mut interp, "subtract 10 4").as_integer(), Some(6));
        assert_eq!(run(&mut interp, "6 / 3").as_integer(), Some(2));
        assert_eq!(run(&mut interp, "7 / 2").as_decimal(), Some(3.5));
        assert_eq!(run(&mut interp, "negate 5").as_integer(), Some(-5));
        assert_eq!(fails_with(&mut interp, "1 / 0"), "zero-divide");
        assert_eq!(fails_with(&mut interp, "9223372036854775807 + 1"), "overflow");
    }

    #[test]
    fn test_mixed_math() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "1 + 0.5").as_decimal(), Some(1.5));
        assert_eq!(run(&mut interp, "#\"a\" + 1").as_char(), Some('b'));
        let pair = run(&mut interp, "2x3 * 2");
        assert_eq!(interp.mold(&pair), "4x6");
        assert_eq!(fails_with(&mut interp, "#\"a\" * #\"b\""), "invalid-arg");
        assert_eq!(fails_with(&mut interp, "#\"a\" - 200"), "type-limit");
    }

    #[test]
    fn test_parity_and_zero() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "even? 4").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "odd? 4").as_logic(), Some(false));
        assert_eq!(run(&mut interp, "zero? 0.0").as_logic(), Some(true));
    }

    #[test]
    fn test_comparisons() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert_eq!(run(&mut interp, "1 = 1.0").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "1 == 1.0").as_logic(), Some(false));
        assert_eq!(run(&mut interp, "\"abc\" = \"ABC\"").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "1 <> 2").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "2 <= 2").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "lesser? 3 2").as_logic(), Some(false));
        assert_eq!(run(&mut interp, "b: [1] same? b b").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "same? [1] [1]").as_logic(), Some(false));
        assert_eq!(fails_with(&mut interp, "1 < \"a\""), "invalid-compare");
    }

    #[test]
    fn test_series_modification() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "b: [1] append b [2 3] length? b");
        assert_eq!(value.as_integer(), Some(3));
        let value = run(&mut interp, "append/only b [4] length? b");
        assert_eq!(value.as_integer(), Some(4));
        let value = run(&mut interp, "x: insert b 0 first x");
        assert_eq!(value.as_integer(), Some(1));
        let value = run(&mut interp, "s: \"ab\" append/dup s \"-\" 3 s");
        assert_eq!(interp.string_of(&value), "ab---");
        let value = run(&mut interp, "c: [1 2 3] change c 9 c");
        assert_eq!(interp.mold(&value), "[9 2 3]");
    }

    #[test]
    fn test_find_and_navigation() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "b: [a b c] first find b 'b");
        assert_eq!(value.kind(), Kind::Word);
        assert!(run(&mut interp, "find b 'z").is_blank());
        assert!(run(&mut interp, "find _ 1").is_blank());
        let value = run(&mut interp, "find \"Hello\" \"LL\"");
        assert_eq!(interp.string_of(&value), "llo");
        assert_eq!(run(&mut interp, "length? next next b").as_integer(), Some(1));
        assert_eq!(run(&mut interp, "tail? tail b").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "length? head tail b").as_integer(), Some(3));
        assert_eq!(run(&mut interp, "empty? []").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "pick [10 20] 2").as_integer(), Some(20));
        assert!(run(&mut interp, "pick [10 20] 5").is_blank());
        assert_eq!(run(&mut interp, "first \"xyz\"").as_char(), Some('x'));
    }

    #[test]
    fn test_type_predicates() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = run(&mut interp, "type-of 1.5");
        assert_eq!(value.datatype_kind(), Some(Kind::Decimal));
        assert_eq!(run(&mut interp, "void? ()").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "blank? _").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "function? :print").as_logic(), Some(true));
        assert_eq!(run(&mut interp, "error? trap [1 / 0]").as_logic(), Some(true));
    }

    #[test]
    fn test_output_natives() {
        let mut interp = Interp::new(RuntimeConfig::default());
        interp.capture_output();
        run(&mut interp, "x: 2 print [\"x is\" x] probe [1 \"a\"]");
        assert_eq!(interp.take_output(), "x is 2\n[1 \"a\"]\n");
        let value = run(&mut interp, "mold \"q\"");
        assert_eq!(interp.string_of(&value), "\"q\"");
        let value = run(&mut interp, "form [1 [2 3]]");
        assert_eq!(interp.string_of(&value), "1 2 3");
    }
}
