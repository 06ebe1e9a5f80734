//! Word, binding and construction natives

use super::{Call, Disposition, NativeEntry, finish, native};
use crate::bind::BindFlags;
use crate::control::Flow;
use crate::error::Fail;
use crate::frame::Specifier;
use crate::interp::Interp;
use reb_core::{Binding, Cell, ContextId, ContextKind, FuncClass, KeyFlags, Kind, TypeSet};

pub(crate) const NATIVES: &[NativeEntry] = &[
    native("get", "source [any-word! any-path! block!] /any", get_native),
    native("set", "target [any-word! block!] value [any-value!] /any", set_native),
    native(
        "bind",
        "words [block! any-word!] target [any-word! any-context!] /copy /only /new",
        bind_native,
    ),
    native("unbind", "words [block! any-word!] /deep", unbind_native),
    native("in", "context [any-context!] word [any-word!]", in_native),
    native("value?", "value [any-value!]", value_q_native),
    native(
        "protect",
        "value [any-word! any-series! any-context!] /deep",
        protect_native,
    ),
    native("func", "spec [block!] body [block!]", func_native),
    native("does", "body [block!]", does_native),
    native("specialize", "value [function!] def [block!]", specialize_native),
    native("make", "type [any-value!] spec [any-value!]", make_native),
    native("copy", "value [any-value!] /deep", copy_native),
    native("context-of", "word [any-word!]", context_of_native),
];

fn get_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let source = interp.arg(call, "source");
    let any = interp.refine(call, "any");
    if source.kind().is_path() {
        let flow = interp.eval_get_path(&source, Specifier::Specified, out)?;
        if flow == Flow::Done && out.is_void() && !any {
            return Err(interp.script_error("no-value", &[source]));
        }
        return Ok(finish(flow));
    }
    if let Some((series, index)) = source.array_at() {
        let words: Vec<Cell> = interp.heap.cells(series).iter().skip(index).cloned().collect();
        let mut values = Vec::with_capacity(words.len());
        for word in words {
            let value = fetch(interp, &word, any)?;
            values.push(value.stored());
        }
        *out = Cell::block(interp.heap.make_managed_array(values));
        return Ok(Disposition::OutSet);
    }
    *out = fetch(interp, &source, any)?;
    Ok(Disposition::OutSet)
}

fn fetch(interp: &mut Interp, word: &Cell, any: bool) -> Result<Cell, Fail> {
    if !word.kind().is_word() {
        return Err(interp.script_error("invalid-arg", &[word.clone()]));
    }
    let value = interp.get_word_value(word, Specifier::Specified)?;
    if value.is_void() && !any {
        return Err(interp.script_error("no-value", &[crate::bind::plain_word(word)]));
    }
    Ok(value)
}

fn set_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let target = interp.arg(call, "target");
    let value = interp.arg(call, "value");
    if value.is_void() && !interp.refine(call, "any") {
        return Err(interp.script_error("need-value", &[target]));
    }

    match target.array_at() {
        Some((series, index)) => {
            let words: Vec<Cell> = interp.heap.cells(series).iter().skip(index).cloned().collect();
            let spread: Option<Vec<Cell>> = match value.array_at() {
                Some((vs, vi)) if value.kind() == Kind::Block => {
                    Some(interp.heap.cells(vs).iter().skip(vi).cloned().collect())
                }
                _ => None,
            };
            for (i, word) in words.iter().enumerate() {
                if !word.kind().is_word() {
                    return Err(interp.script_error("invalid-arg", &[word.clone()]));
                }
                let item = match &spread {
                    Some(values) => values.get(i).cloned().unwrap_or_else(Cell::blank),
                    None => value.clone(),
                };
                interp.set_word_value(word, Specifier::Specified, &item)?;
            }
        }
        None => interp.set_word_value(&target, Specifier::Specified, &value)?,
    }
    *out = value;
    Ok(Disposition::OutSet)
}

/// Context a word or context value names as a bind target
///
/// A word relative to a running function names that call's frame.
fn target_context(interp: &mut Interp, target: &Cell) -> Result<ContextId, Fail> {
    if let Some(ctx) = target.context_id() {
        return Ok(ctx);
    }
    match target.binding() {
        Binding::Specific { context, .. } => Ok(context),
        Binding::Relative { function, .. } => {
            let reified = interp
                .depth_of_function(function)
                .and_then(|depth| interp.reify_frame(depth));
            match reified {
                Some(ctx) => Ok(ctx),
                None => Err(interp.script_error("no-relative", &[crate::bind::plain_word(target)])),
            }
        }
        Binding::Unbound => Err(interp.script_error("not-bound", &[crate::bind::plain_word(target)])),
    }
}

fn bind_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let words = interp.arg(call, "words");
    let target = interp.arg(call, "target");
    let ctx = target_context(interp, &target)?;
    let add = if interp.refine(call, "new") {
        TypeSet::ANY_WORD
    } else {
        TypeSet::EMPTY
    };

    if words.kind().is_word() {
        let mut word = words;
        if interp.try_bind_word(ctx, &mut word) == 0 && !add.is_empty() {
            let Some(sym) = word.symbol() else {
                return Err(interp.script_error("invalid-arg", &[word]));
            };
            let canon = interp.symbols.canon(sym);
            let index = interp
                .heap
                .append_key(ctx, canon, TypeSet::ANY_VALUE)
                .map_err(|e| interp.core_failure(e))?;
            word.set_binding(Binding::Specific {
                context: ctx,
                index: index as u32,
            });
        }
        *out = word;
        return Ok(Disposition::OutSet);
    }

    let Some((series, index)) = words.array_at() else {
        return Err(interp.script_error("invalid-arg", &[words]));
    };
    let (series, index) = if interp.refine(call, "copy") {
        (interp.heap.copy_array_deep_managed(series, index), 0)
    } else {
        (series, index)
    };
    let flags = if interp.refine(call, "only") {
        BindFlags::NONE
    } else {
        BindFlags::DEEP
    };
    interp.bind_values(series, index, ctx, TypeSet::ANY_WORD, add, flags)?;
    *out = Cell::series(words.kind(), series, index);
    Ok(Disposition::OutSet)
}

fn unbind_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let words = interp.arg(call, "words");
    if words.kind().is_word() {
        let mut word = words;
        word.set_binding(Binding::Unbound);
        *out = word;
        return Ok(Disposition::OutSet);
    }
    let Some((series, index)) = words.array_at() else {
        return Err(interp.script_error("invalid-arg", &[words]));
    };
    let deep = interp.refine(call, "deep");
    interp.unbind_values(series, index, None, deep);
    *out = words;
    Ok(Disposition::OutSet)
}

fn in_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let context = interp.arg(call, "context");
    let mut word = interp.arg(call, "word");
    let Some(ctx) = context.context_id() else {
        return Err(interp.script_error("invalid-arg", &[context]));
    };
    if interp.try_bind_word(ctx, &mut word) == 0 {
        return Ok(Disposition::Blank);
    }
    *out = word;
    Ok(Disposition::OutSet)
}

fn value_q_native(interp: &mut Interp, call: &Call, _out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    if !value.kind().is_word() {
        return Ok(if value.is_void() {
            Disposition::False
        } else {
            Disposition::True
        });
    }
    let set = match interp.get_var(&value, Specifier::Specified, true, false)? {
        Some(loc) => !interp.heap.cell(loc).is_void(),
        None => false,
    };
    Ok(if set { Disposition::True } else { Disposition::False })
}

fn protect_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let deep = interp.refine(call, "deep");

    if value.kind().is_word() {
        match value.binding() {
            Binding::Specific { context, index } => {
                interp
                    .heap
                    .key_mut(context, index as usize)
                    .flags
                    .insert(KeyFlags::LOCKED);
                if deep {
                    let held = interp.heap.var(context, index as usize).clone();
                    lock_value(interp, &held, true);
                }
            }
            Binding::Relative { .. } => {
                return Err(interp.script_error("not-supported", &[crate::bind::plain_word(&value)]));
            }
            Binding::Unbound => {
                return Err(interp.script_error("not-bound", &[crate::bind::plain_word(&value)]));
            }
        }
    } else if let Some(ctx) = value.context_id() {
        let len = interp.heap.context_len(ctx);
        for index in 1..=len {
            interp.heap.key_mut(ctx, index).flags.insert(KeyFlags::LOCKED);
            if deep {
                let held = interp.heap.var(ctx, index).clone();
                lock_value(interp, &held, true);
            }
        }
    } else {
        lock_value(interp, &value, deep);
    }
    *out = value;
    Ok(Disposition::OutSet)
}

fn lock_value(interp: &mut Interp, value: &Cell, deep: bool) {
    let Some((series, _)) = value.series_at() else {
        return;
    };
    if deep && value.kind().is_array() {
        interp.heap.lock_deep(series);
    } else {
        interp.heap.lock(series);
    }
}

fn func_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let spec = interp.arg(call, "spec");
    let body = interp.arg(call, "body");
    let func = interp.make_user_function(&spec, &body)?;
    *out = Cell::function(func);
    Ok(Disposition::OutSet)
}

fn does_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let body = interp.arg(call, "body");
    let spec = Cell::block(interp.heap.make_managed_array(Vec::new()));
    let func = interp.make_user_function(&spec, &body)?;
    *out = Cell::function(func);
    Ok(Disposition::OutSet)
}

fn specialize_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let def = interp.arg(call, "def");
    let Some(func) = value.func_id() else {
        return Err(interp.script_error("invalid-arg", &[value]));
    };
    let special = interp.specialize(func, &def)?;
    *out = Cell::function(special);
    Ok(Disposition::OutSet)
}

fn make_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let target = interp.arg(call, "type");
    let spec = interp.arg(call, "spec");

    if let Some(parent) = target.context_id() {
        if target.kind() != Kind::Object {
            return Err(interp.script_error("bad-make", &[target, spec]));
        }
        return make_object(interp, Some(parent), &spec, out);
    }
    let Some(kind) = target.datatype_kind() else {
        return Err(interp.script_error("bad-make", &[target, spec]));
    };
    let bad_make = |interp: &mut Interp| -> Result<Disposition, Fail> {
        let datatype = Cell::datatype(kind);
        Err(interp.script_error("bad-make", &[datatype, spec.clone()]))
    };

    *out = match kind {
        Kind::Object => return make_object(interp, None, &spec, out),
        Kind::Error => {
            let err = interp.error_from_spec(&spec)?;
            interp.heap.context_value(err)
        }
        Kind::Function => {
            let parts: Vec<Cell> = match spec.array_at() {
                Some((series, index)) => interp.heap.cells(series).iter().skip(index).cloned().collect(),
                None => return bad_make(interp),
            };
            let [fspec, body] = parts.as_slice() else {
                return bad_make(interp);
            };
            Cell::function(interp.make_user_function(fspec, body)?)
        }
        Kind::Block | Kind::Group => match (spec.array_at(), spec.as_integer()) {
            (Some((series, index)), _) => {
                let copy = interp.heap.copy_array_shallow(series, index);
                interp.heap.manage(copy);
                Cell::series(kind, copy, 0)
            }
            (None, Some(_)) => Cell::series(kind, interp.heap.make_managed_array(Vec::new()), 0),
            _ => return bad_make(interp),
        },
        Kind::String | Kind::File | Kind::Tag | Kind::Url => {
            let text = match spec.kind() {
                Kind::Integer => String::new(),
                _ => interp.form(&spec),
            };
            let id = interp.heap.make_bytes(text.into_bytes());
            Cell::series(kind, id, 0)
        }
        Kind::Integer => match spec.payload() {
            reb_core::Payload::Integer(i) => Cell::integer(*i),
            reb_core::Payload::Decimal(d) if d.is_finite() && d.abs() < 9.2e18 => Cell::integer(d.trunc() as i64),
            reb_core::Payload::Char(c) => Cell::integer(*c as i64),
            reb_core::Payload::Logic(b) => Cell::integer(*b as i64),
            _ if spec.kind().is_string() => match interp.string_of(&spec).trim().parse::<i64>() {
                Ok(i) => Cell::integer(i),
                Err(_) => return bad_make(interp),
            },
            _ => return bad_make(interp),
        },
        Kind::Decimal => match (spec.as_decimal(), spec.kind().is_string()) {
            (Some(d), _) => Cell::decimal(d),
            (None, true) => match interp.string_of(&spec).trim().parse::<f64>() {
                Ok(d) => Cell::decimal(d),
                Err(_) => return bad_make(interp),
            },
            _ => return bad_make(interp),
        },
        k if k.is_word() => {
            let name = match (spec.symbol(), spec.kind().is_string()) {
                (Some(sym), _) => interp.symbols.name(sym).to_string(),
                (None, true) => interp.string_of(&spec),
                _ => return bad_make(interp),
            };
            interp.word_cell(k, &name)
        }
        _ => return bad_make(interp),
    };
    Ok(Disposition::OutSet)
}

/// `make object! [...]` or `make parent [...]`
///
/// Top-level set-words of the spec become fields; the spec is copied, bound
/// to the object and evaluated. Array fields inherited from a parent are
/// deep-copied and their words moved to the new object.
fn make_object(
    interp: &mut Interp,
    parent: Option<ContextId>,
    spec: &Cell,
    out: &mut Cell,
) -> Result<Disposition, Fail> {
    let Some((series, index)) = spec.array_at() else {
        return Err(interp.script_error("bad-make", &[Cell::datatype(Kind::Object), spec.clone()]));
    };
    let fields: Vec<_> = interp
        .heap
        .cells(series)
        .iter()
        .skip(index)
        .filter(|c| c.kind() == Kind::SetWord)
        .filter_map(Cell::symbol)
        .collect();

    let ctx = match parent {
        Some(parent) => {
            let ctx = interp.heap.copy_context_shallow_extra(parent, fields.len());
            inherit_fields(interp, parent, ctx);
            ctx
        }
        None => interp.heap.make_context(ContextKind::Object, fields.len()),
    };
    for sym in fields {
        let canon = interp.symbols.canon(sym);
        if interp.heap.find_word(ctx, canon, true) == 0 {
            interp
                .heap
                .append_key(ctx, canon, TypeSet::ANY_VALUE)
                .map_err(|e| interp.core_failure(e))?;
        }
    }

    let body = interp.heap.copy_array_deep_managed(series, index);
    interp.bind_values(body, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)?;
    let mut result = Cell::void();
    if interp.do_array(body, 0, Specifier::Specified, &mut result)? == Flow::Thrown {
        *out = result;
        return Ok(Disposition::OutIsThrown);
    }
    *out = interp.heap.context_value(ctx);
    Ok(Disposition::OutSet)
}

fn inherit_fields(interp: &mut Interp, parent: ContextId, ctx: ContextId) {
    let len = interp.heap.context_len(parent);
    for index in 1..=len {
        let value = interp.heap.var(ctx, index).clone();
        if let Some((series, at)) = value.array_at() {
            let copy = interp.heap.copy_array_deep_managed(series, at);
            interp.rebind_values_deep(parent, ctx, copy, 0, None);
            interp.poke_var(ctx, index, Cell::series(value.kind(), copy, 0));
        } else if interp.config.rebind_function_bodies
            && let Some(func) = value.func_id()
            && interp.heap.func_class(func) == FuncClass::User
        {
            let copy = interp.copy_function(func);
            if let Some(body) = interp.heap.func_body(copy) {
                interp.rebind_values_deep(parent, ctx, body, 0, None);
            }
            interp.poke_var(ctx, index, Cell::function(copy));
        }
    }
}

fn copy_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let value = interp.arg(call, "value");
    let deep = interp.refine(call, "deep");

    *out = if let Some((series, index)) = value.array_at() {
        let copy = if deep {
            interp.heap.copy_array_deep_managed(series, index)
        } else {
            let copy = interp.heap.copy_array_shallow(series, index);
            interp.heap.manage(copy);
            copy
        };
        Cell::series(value.kind(), copy, 0)
    } else if let Some((series, index)) = value.series_at() {
        let bytes: Vec<u8> = if value.kind().is_string() {
            interp.string_of(&value).into_bytes()
        } else {
            interp.heap.get(series).bytes().iter().skip(index).copied().collect()
        };
        Cell::series(value.kind(), interp.heap.make_bytes(bytes), 0)
    } else if let Some(ctx) = value.context_id() {
        let copy = interp.heap.copy_context_shallow_extra(ctx, 0);
        if deep {
            inherit_fields(interp, ctx, copy);
        }
        interp.heap.context_value(copy)
    } else if let Some(func) = value.func_id() {
        Cell::function(interp.copy_function(func))
    } else {
        value
    };
    Ok(Disposition::OutSet)
}

fn context_of_native(interp: &mut Interp, call: &Call, out: &mut Cell) -> Result<Disposition, Fail> {
    let word = interp.arg(call, "word");
    let ctx = match word.binding() {
        Binding::Unbound => None,
        Binding::Specific { context, .. } => {
            Some(context).filter(|c| interp.heap.is_live(c.0) && interp.heap.is_context(c.0))
        }
        Binding::Relative { function, .. } => interp
            .depth_of_function(function)
            .and_then(|depth| interp.reify_frame(depth)),
    };
    match ctx {
        Some(ctx) => {
            *out = interp.heap.context_value(ctx);
            Ok(Disposition::OutSet)
        }
        None => Ok(Disposition::Blank),
    }
}
