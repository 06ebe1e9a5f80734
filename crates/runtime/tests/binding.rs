//! Binding properties checked through the public API
//!
//! Arrays are scanned without binding, then bound, unbound and rebound
//! against hand-built contexts so every word state can be inspected.

use reb_core::{ContextKind, KeyFlags};
use reb_runtime::config::RuntimeConfig;
use reb_runtime::frame::Specifier;
use reb_runtime::{BindFlags, Binding, Cell, ContextId, Interp, SeriesId, TypeSet, VarLoc};
use std::collections::HashMap;

/// Binding of every word in `head`, depth first
fn bindings(interp: &Interp, head: SeriesId) -> Vec<Binding> {
    let mut out = Vec::new();
    for cell in interp.heap.cells(head) {
        if cell.symbol().is_some() {
            out.push(cell.binding());
        } else if let Some((inner, _)) = cell.array_at() {
            out.extend(bindings(interp, inner));
        }
    }
    out
}

fn object_with(interp: &mut Interp, fields: &[(&str, i64)]) -> ContextId {
    let ctx = interp.heap.make_context(ContextKind::Object, fields.len());
    for (name, value) in fields {
        interp.put_field(ctx, name, Cell::integer(*value));
    }
    ctx
}

fn bind_deep(interp: &mut Interp, head: SeriesId, ctx: ContextId) {
    interp
        .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)
        .unwrap();
}

#[test]
fn test_table_is_clean_around_every_pass() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let ctx = object_with(&mut interp, &[("a", 1), ("b", 2)]);
    let other = object_with(&mut interp, &[("a", 3), ("b", 4)]);
    let code = interp.scan("a [b [a c]] :b 'c", "test").unwrap();

    assert!(interp.binding_table_is_clean());
    bind_deep(&mut interp, code, ctx);
    assert!(interp.binding_table_is_clean());
    interp.rebind_values_deep(ctx, other, code, 0, None);
    assert!(interp.binding_table_is_clean());
    interp.unbind_values(code, 0, None, true);
    assert!(interp.binding_table_is_clean());

    // a pass that adds keys midstream still leaves nothing behind
    interp
        .bind_values(code, 0, ctx, TypeSet::ANY_WORD, TypeSet::ANY_WORD, BindFlags::DEEP)
        .unwrap();
    assert!(interp.binding_table_is_clean());
    assert_eq!(interp.heap.context_len(ctx), 3);
}

#[test]
fn test_specific_bindings_match_key_spelling() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let ctx = object_with(&mut interp, &[("alpha", 1), ("Beta", 2)]);
    let code = interp.scan("ALPHA beta [alpha: gamma]", "test").unwrap();
    bind_deep(&mut interp, code, ctx);

    let mut checked = 0;
    let mut stack = vec![code];
    while let Some(series) = stack.pop() {
        for cell in interp.heap.cells(series) {
            if let Some((inner, _)) = cell.array_at() {
                stack.push(inner);
            }
            let Some(symbol) = cell.symbol() else { continue };
            if let Binding::Specific { context, index } = cell.binding() {
                assert_eq!(context, ctx);
                let key = interp.heap.key(context, index as usize);
                assert_eq!(key.symbol, interp.symbols.canon(symbol));
                checked += 1;
            }
        }
    }
    assert_eq!(checked, 3);
}

#[test]
fn test_relative_lookup_reaches_the_frame_slot() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let spec = interp.scan("x", "test").unwrap();
    let body = interp.scan("x + 1", "test").unwrap();
    let func = interp
        .make_user_function(&Cell::block(spec), &Cell::block(body))
        .unwrap();
    let body = interp.heap.func_body(func).unwrap();
    let word = interp.heap.at(body, 0).clone();
    assert_eq!(word.binding(), Binding::Relative { function: func, index: 1 });

    // no call running: nothing to resolve against
    let err = interp.get_var(&word, Specifier::Specified, false, false).unwrap_err();
    assert_eq!(interp.error_id(err.0).as_deref(), Some("no-relative"));

    interp.push_frame(func, None, None, Binding::Unbound).unwrap();
    let outer = interp.frame_at_depth(0).unwrap().args;
    interp.push_frame(func, None, None, Binding::Unbound).unwrap();
    let inner = interp.frame_at_depth(0).unwrap().args;

    for args in [inner, outer] {
        let loc = interp
            .get_var(&word, Specifier::Frame { func, args }, false, false)
            .unwrap();
        assert_eq!(loc, Some(VarLoc { series: args, index: 1 }));
    }

    interp.pop_frame();
    interp.pop_frame();
    assert_eq!(interp.eval_depth(), 0);
}

#[test]
fn test_unbind_twice_matches_unbind_once() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let ctx = object_with(&mut interp, &[("a", 1)]);
    let other = object_with(&mut interp, &[("b", 2)]);
    let code = interp.scan("a b [a [b]]", "test").unwrap();
    bind_deep(&mut interp, code, ctx);
    bind_deep(&mut interp, code, other);

    interp.unbind_values(code, 0, Some(ctx), true);
    let once = bindings(&interp, code);
    interp.unbind_values(code, 0, Some(ctx), true);
    assert_eq!(bindings(&interp, code), once);
    // words bound elsewhere are untouched by a targeted unbind
    assert!(once.iter().any(|b| matches!(b, Binding::Specific { context, .. } if *context == other)));

    interp.unbind_values(code, 0, None, true);
    let once = bindings(&interp, code);
    interp.unbind_values(code, 0, None, true);
    assert_eq!(bindings(&interp, code), once);
    assert!(once.iter().all(|b| *b == Binding::Unbound));
}

#[test]
fn test_bind_twice_matches_bind_once() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let ctx = object_with(&mut interp, &[("a", 1), ("b", 2)]);
    let code = interp.scan("a c [b [a]] 'b", "test").unwrap();
    bind_deep(&mut interp, code, ctx);
    let once = bindings(&interp, code);
    bind_deep(&mut interp, code, ctx);
    assert_eq!(bindings(&interp, code), once);
    // `c` has no key and stays unbound
    assert_eq!(once[1], Binding::Unbound);
}

#[test]
fn test_shallow_bind_leaves_nested_blocks() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let ctx = object_with(&mut interp, &[("a", 1)]);
    let code = interp.scan("a [a]", "test").unwrap();
    interp
        .bind_values(code, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::NONE)
        .unwrap();
    let found = bindings(&interp, code);
    assert!(found[0].is_bound());
    assert_eq!(found[1], Binding::Unbound);
}

#[test]
fn test_rebind_round_trip() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let src = object_with(&mut interp, &[("a", 1), ("b", 2)]);
    let dst = object_with(&mut interp, &[("a", 3), ("b", 4)]);
    let code = interp.scan("a [b a] b", "test").unwrap();
    bind_deep(&mut interp, code, src);
    let before = bindings(&interp, code);

    interp.rebind_values_deep(src, dst, code, 0, None);
    let moved = bindings(&interp, code);
    assert!(moved.iter().all(|b| matches!(b, Binding::Specific { context, .. } if *context == dst)));

    interp.rebind_values_deep(dst, src, code, 0, None);
    assert_eq!(bindings(&interp, code), before);
}

#[test]
fn test_rebind_with_index_remap() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let src = object_with(&mut interp, &[("a", 1), ("b", 2)]);
    let dst = object_with(&mut interp, &[("b", 20), ("a", 10)]);
    let code = interp.scan("a b", "test").unwrap();
    bind_deep(&mut interp, code, src);

    let forward: HashMap<u32, u32> = [(1, 2), (2, 1)].into_iter().collect();
    interp.rebind_values_deep(src, dst, code, 0, Some(&forward));
    let a = interp.heap.at(code, 0).clone();
    let value = interp.get_word_value(&a, Specifier::Specified).unwrap();
    assert_eq!(value.as_integer(), Some(10));

    interp.rebind_values_deep(dst, src, code, 0, Some(&forward));
    let a = interp.heap.at(code, 0).clone();
    let value = interp.get_word_value(&a, Specifier::Specified).unwrap();
    assert_eq!(value.as_integer(), Some(1));
}

#[test]
fn test_locked_key_refuses_writes() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let ctx = object_with(&mut interp, &[("a", 1)]);
    let code = interp.scan("a", "test").unwrap();
    bind_deep(&mut interp, code, ctx);
    let word = interp.heap.at(code, 0).clone();

    interp.set_word_value(&word, Specifier::Specified, &Cell::integer(2)).unwrap();
    interp.heap.key_mut(ctx, 1).flags.insert(KeyFlags::LOCKED);
    let err = interp
        .set_word_value(&word, Specifier::Specified, &Cell::integer(3))
        .unwrap_err();
    assert_eq!(interp.error_id(err.0).as_deref(), Some("locked-word"));
    // reads are still fine, and trap mode reports absence instead of failing
    assert_eq!(interp.field(ctx, "a").unwrap().as_integer(), Some(2));
    assert_eq!(interp.get_var(&word, Specifier::Specified, true, true).unwrap(), None);
}

#[test]
fn test_unbound_word_is_not_bound() {
    let mut interp = Interp::new(RuntimeConfig::default());
    let code = interp.scan("nowhere", "test").unwrap();
    let word = interp.heap.at(code, 0).clone();
    let err = interp.get_word_value(&word, Specifier::Specified).unwrap_err();
    assert_eq!(interp.error_id(err.0).as_deref(), Some("not-bound"));
}
