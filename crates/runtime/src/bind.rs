//! Word binding engine
//!
//! Bind passes use the interpreter-wide `BindTable`, indexed by canonical
//! symbol. A pass installs the index of every bindable key of its target,
//! walks the values, then clears exactly the entries it installed by walking
//! the (possibly grown) keylist again. The table is empty between passes;
//! `Interp::do_string` asserts that on every evaluation boundary.
//!
//! # Walks
//!
//! All passes share one traversal: textual order, into nested arrays when
//! `DEEP` is set, into user-function bodies when `FUNCTION_BODIES` is set.
//! Each array is visited once per pass, so cyclic structures terminate.
//!
//! # Resolution
//!
//! `get_var` turns a bound word into a `VarLoc`:
//!
//! | Binding | Resolves to |
//! |---------|-------------|
//! | `Relative { function, index }` | `args[index]` of the innermost live call of `function` |
//! | `Specific { context, index }` | `context.varlist[index]`, unless it is a retired frame |
//! | `Unbound` | *not-bound* |

use crate::error::Fail;
use crate::frame::Specifier;
use crate::interp::Interp;
use reb_core::{
    Binding, Cell, ContextId, FuncClass, FuncId, Kind, SeriesId, Symbol, TypeSet, VarLoc,
};
use std::collections::{HashMap, HashSet};

/// Symbol to index table shared by every bind pass
#[derive(Debug, Default)]
pub struct BindTable {
    slots: Vec<u32>,
    installed: usize,
}

impl BindTable {
    pub fn get(&self, canon: Symbol) -> u32 {
        self.slots.get(canon.index()).copied().unwrap_or(0)
    }

    pub fn set(&mut self, canon: Symbol, index: u32) {
        let at = canon.index();
        if at >= self.slots.len() {
            self.slots.resize(at + 1, 0);
        }
        if self.slots[at] == 0 {
            self.installed += 1;
        }
        self.slots[at] = index;
    }

    pub fn clear(&mut self, canon: Symbol) {
        if let Some(slot) = self.slots.get_mut(canon.index())
            && *slot != 0
        {
            *slot = 0;
            self.installed -= 1;
        }
    }

    /// Every entry is zero
    pub fn is_clean(&self) -> bool {
        self.installed == 0 && self.slots.iter().all(|s| *s == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindFlags(u8);

impl BindFlags {
    pub const NONE: BindFlags = BindFlags(0);
    /// Recurse into nested arrays
    pub const DEEP: BindFlags = BindFlags(1 << 0);
    /// Recurse into the bodies of user functions found as values
    pub const FUNCTION_BODIES: BindFlags = BindFlags(1 << 1);

    pub fn contains(self, other: BindFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: BindFlags) -> Self {
        BindFlags(self.0 | other.0)
    }
}

impl Interp {
    /// Visit every word reachable from `head[index..]`
    ///
    /// `visit` returns the new binding for a word, or `None` to leave it.
    fn walk_words<F>(
        &mut self,
        head: SeriesId,
        index: usize,
        flags: BindFlags,
        seen: &mut HashSet<SeriesId>,
        visit: &mut F,
    ) -> Result<(), Fail>
    where
        F: FnMut(&mut Interp, &Cell) -> Result<Option<Binding>, Fail>,
    {
        if !seen.insert(head) {
            return Ok(());
        }
        let len = self.heap.len(head);
        for i in index..len {
            let cell = self.heap.at(head, i).clone();
            if cell.kind().is_word() {
                if let Some(binding) = visit(self, &cell)? {
                    self.heap.get_mut(head).cells_mut()[i].set_binding(binding);
                }
            } else if let Some((nested, _)) = cell.array_at() {
                if flags.contains(BindFlags::DEEP) {
                    self.walk_words(nested, 0, flags, seen, visit)?;
                }
            } else if flags.contains(BindFlags::FUNCTION_BODIES)
                && let Some(func) = cell.func_id()
                && self.heap.func_class(func) == FuncClass::User
                && let Some(body) = self.heap.func_body(func)
            {
                self.walk_words(body, 0, flags, seen, visit)?;
            }
        }
        Ok(())
    }

    fn install_keys(&mut self, keys: &[(usize, Symbol)]) {
        for (i, sym) in keys {
            self.binder.set(*sym, *i as u32);
        }
    }

    fn bindable_context_keys(&self, ctx: ContextId) -> Vec<(usize, Symbol)> {
        self.heap
            .keys(ctx)
            .filter(|(_, key)| key.is_bindable())
            .map(|(i, key)| (i, key.symbol))
            .collect()
    }

    fn bindable_params(&self, func: FuncId) -> Vec<(usize, Symbol)> {
        self.heap
            .params(func)
            .filter(|(_, key)| key.is_bindable())
            .map(|(i, key)| (i, key.symbol))
            .collect()
    }

    /// Bind words of the kinds in `bind_kinds` to `ctx`
    ///
    /// Unknown words of the kinds in `add_midstream` get a new key appended
    /// to `ctx`; later words of the same spelling in this pass see it.
    pub fn bind_values(
        &mut self,
        head: SeriesId,
        index: usize,
        ctx: ContextId,
        bind_kinds: TypeSet,
        add_midstream: TypeSet,
        flags: BindFlags,
    ) -> Result<(), Fail> {
        let keys = self.bindable_context_keys(ctx);
        self.install_keys(&keys);

        let mut seen = HashSet::new();
        let result = self.walk_words(head, index, flags, &mut seen, &mut |interp, word| {
            if !bind_kinds.contains(word.kind()) {
                return Ok(None);
            }
            let canon = word_canon(interp, word);
            let mut found = interp.binder.get(canon);
            // an unbindable key of the same spelling stays the only key for it
            if found == 0
                && add_midstream.contains(word.kind())
                && interp.heap.find_word(ctx, canon, true) == 0
            {
                found = match interp.heap.append_key(ctx, canon, TypeSet::ANY_VALUE) {
                    Ok(i) => i as u32,
                    Err(_) => {
                        let value = interp.heap.context_value(ctx);
                        return Err(interp.script_error("expand-frame", &[value]));
                    }
                };
                interp.binder.set(canon, found);
            }
            Ok((found != 0).then_some(Binding::Specific {
                context: ctx,
                index: found,
            }))
        });

        // teardown walks the keylist as it is now, so midstream keys are cleared too
        let keys = self.bindable_context_keys(ctx);
        for (_, sym) in &keys {
            self.binder.clear(*sym);
        }
        debug_assert!(self.binder.is_clean(), "bind pass left the table dirty");
        tracing::debug!(head = %head, context = %ctx, "bind pass");
        result
    }

    /// Clear bindings; with `ctx`, only those that point into it
    pub fn unbind_values(
        &mut self,
        head: SeriesId,
        index: usize,
        ctx: Option<ContextId>,
        deep: bool,
    ) {
        let flags = if deep { BindFlags::DEEP } else { BindFlags::NONE };
        let mut seen = HashSet::new();
        let result = self.walk_words(head, index, flags, &mut seen, &mut |_, word| {
            let clear = match (word.binding(), ctx) {
                (Binding::Unbound, _) => false,
                (_, None) => true,
                (Binding::Specific { context, .. }, Some(target)) => context == target,
                (Binding::Relative { .. }, Some(_)) => false,
            };
            Ok(clear.then_some(Binding::Unbound))
        });
        debug_assert!(result.is_ok(), "unbind cannot fail");
    }

    /// Bind parameter words in `head` relative to `func`, replacing prior bindings
    pub fn bind_relative_deep(
        &mut self,
        func: FuncId,
        head: SeriesId,
        bind_kinds: TypeSet,
    ) {
        let keys = self.bindable_params(func);
        self.install_keys(&keys);

        let mut seen = HashSet::new();
        let result = self.walk_words(head, 0, BindFlags::DEEP, &mut seen, &mut |interp, word| {
            if !bind_kinds.contains(word.kind()) {
                return Ok(None);
            }
            let found = interp.binder.get(word_canon(interp, word));
            Ok((found != 0).then_some(Binding::Relative {
                function: func,
                index: found,
            }))
        });

        for (_, sym) in &keys {
            self.binder.clear(*sym);
        }
        debug_assert!(result.is_ok(), "relative bind cannot fail");
        debug_assert!(self.binder.is_clean(), "relative bind left the table dirty");
    }

    /// Bind one word; returns the key index or 0 when `ctx` lacks the symbol
    pub fn try_bind_word(&mut self, ctx: ContextId, word: &mut Cell) -> usize {
        let canon = word_canon(self, word);
        let index = self.heap.find_word(ctx, canon, false);
        if index != 0 && self.heap.key(ctx, index).is_bindable() {
            word.set_binding(Binding::Specific {
                context: ctx,
                index: index as u32,
            });
            index
        } else {
            0
        }
    }

    fn rebind_flags(&self) -> BindFlags {
        if self.config.rebind_function_bodies {
            BindFlags::DEEP.union(BindFlags::FUNCTION_BODIES)
        } else {
            BindFlags::DEEP
        }
    }

    /// Move words bound to `src` over to `dst`, optionally remapping indices
    pub fn rebind_values_deep(
        &mut self,
        src: ContextId,
        dst: ContextId,
        head: SeriesId,
        index: usize,
        remap: Option<&HashMap<u32, u32>>,
    ) {
        let flags = self.rebind_flags();
        let mut seen = HashSet::new();
        let result = self.walk_words(head, index, flags, &mut seen, &mut |_, word| {
            Ok(match word.binding() {
                Binding::Specific { context, index } if context == src => {
                    let index = remap.and_then(|m| m.get(&index).copied()).unwrap_or(index);
                    Some(Binding::Specific {
                        context: dst,
                        index,
                    })
                }
                _ => None,
            })
        });
        debug_assert!(result.is_ok(), "rebind cannot fail");
    }

    /// Move words relative to `src` over to `dst`, same index
    pub fn rebind_values_relative_deep(&mut self, src: FuncId, dst: FuncId, head: SeriesId) {
        let mut seen = HashSet::new();
        let result = self.walk_words(head, 0, BindFlags::DEEP, &mut seen, &mut |_, word| {
            Ok(match word.binding() {
                Binding::Relative { function, index } if function == src => {
                    Some(Binding::Relative {
                        function: dst,
                        index,
                    })
                }
                _ => None,
            })
        });
        debug_assert!(result.is_ok(), "rebind cannot fail");
    }

    /// Turn words relative to `src` into specific bindings into `dst`
    pub fn rebind_values_specifically_deep(
        &mut self,
        src: FuncId,
        dst: ContextId,
        head: SeriesId,
    ) {
        let mut seen = HashSet::new();
        let result = self.walk_words(head, 0, BindFlags::DEEP, &mut seen, &mut |_, word| {
            Ok(match word.binding() {
                Binding::Relative { function, index } if function == src => {
                    Some(Binding::Specific {
                        context: dst,
                        index,
                    })
                }
                _ => None,
            })
        });
        debug_assert!(result.is_ok(), "rebind cannot fail");
    }

    /// Resolve a bound word to its variable
    ///
    /// With `trap`, resolution failures return `Ok(None)` instead of raising.
    /// With `writable`, a locked key is a failure (`locked-word`).
    pub fn get_var(
        &mut self,
        word: &Cell,
        specifier: Specifier,
        trap: bool,
        writable: bool,
    ) -> Result<Option<VarLoc>, Fail> {
        let (loc, key) = match word.binding() {
            Binding::Relative { function, index } => {
                let Some(args) = self.frame_args_for(function, specifier) else {
                    return self.lookup_failed(trap, "no-relative", word);
                };
                let loc = VarLoc {
                    series: args,
                    index: index as usize,
                };
                // a reified frame may carry its own keys
                let key = if self.heap.is_context(args) {
                    self.heap.key(ContextId(args), index as usize).clone()
                } else {
                    self.heap.param(function, index as usize).clone()
                };
                (loc, key)
            }
            Binding::Specific { context, index } => {
                if !self.heap.is_live(context.0) || !self.heap.is_accessible(context) {
                    return self.lookup_failed(trap, "no-relative", word);
                }
                let loc = self.heap.var_loc(context, index as usize);
                (loc, self.heap.key(context, index as usize).clone())
            }
            Binding::Unbound => return self.lookup_failed(trap, "not-bound", word),
        };

        debug_assert_eq!(
            Some(key.symbol),
            word.symbol().map(|s| self.symbols.canon(s)),
            "word bound to a key of another spelling"
        );
        if writable && key.is_locked() {
            return self.lookup_failed(trap, "locked-word", word);
        }
        debug_assert!(!self.heap.cell(loc).is_thrown(), "thrown cell in a variable");
        Ok(Some(loc))
    }

    fn lookup_failed(
        &mut self,
        trap: bool,
        id: &str,
        word: &Cell,
    ) -> Result<Option<VarLoc>, Fail> {
        if trap {
            Ok(None)
        } else {
            let word = plain_word(word);
            Err(self.script_error(id, &[word]))
        }
    }

    /// Value of a word, failing when it cannot be resolved
    pub fn get_word_value(&mut self, word: &Cell, specifier: Specifier) -> Result<Cell, Fail> {
        match self.get_var(word, specifier, false, false)? {
            Some(loc) => Ok(self.heap.cell(loc).clone()),
            None => Err(self.script_error("not-bound", &[plain_word(word)])),
        }
    }

    /// Store into a word's variable, honoring key locks and key types
    pub fn set_word_value(
        &mut self,
        word: &Cell,
        specifier: Specifier,
        value: &Cell,
    ) -> Result<(), Fail> {
        let Some(loc) = self.get_var(word, specifier, false, true)? else {
            return Err(self.script_error("not-bound", &[plain_word(word)]));
        };
        *self.heap.cell_mut(loc) = value.stored();
        Ok(())
    }
}

fn word_canon(interp: &Interp, word: &Cell) -> Symbol {
    match word.symbol() {
        Some(sym) => interp.symbols.canon(sym),
        None => panic!("bind pass visited a non-word {}", word.kind()),
    }
}

/// Word cell for error arguments, whatever word kind it started as
pub(crate) fn plain_word(word: &Cell) -> Cell {
    if word.kind().is_word() && word.kind() != Kind::Word {
        word.with_kind(Kind::Word)
    } else {
        word.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use reb_core::ContextKind;

    fn setup() -> (Interp, ContextId, SeriesId) {
        let mut interp = Interp::new(RuntimeConfig::default());
        let ctx = interp.heap.make_context(ContextKind::Object, 2);
        interp.put_field(ctx, "a", Cell::integer(1));
        interp.put_field(ctx, "b", Cell::integer(2));
        let a = interp.word_cell(Kind::Word, "a");
        let set_b = interp.word_cell(Kind::SetWord, "B");
        let c = interp.word_cell(Kind::Word, "c");
        let inner = interp.heap.make_managed_array(vec![a.clone(), c.clone()]);
        let head = interp
            .heap
            .make_managed_array(vec![a, set_b, Cell::block(inner), c]);
        (interp, ctx, head)
    }

    #[test]
    fn test_bind_shallow_and_deep() {
        let (mut interp, ctx, head) = setup();
        interp
            .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::NONE)
            .unwrap();
        assert_eq!(
            interp.heap.at(head, 0).binding(),
            Binding::Specific { context: ctx, index: 1 }
        );
        assert_eq!(
            interp.heap.at(head, 1).binding(),
            Binding::Specific { context: ctx, index: 2 }
        );
        assert!(!interp.heap.at(head, 3).is_bound());
        let inner = interp.heap.at(head, 2).array_at().unwrap().0;
        assert!(!interp.heap.at(inner, 0).is_bound());

        interp
            .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)
            .unwrap();
        assert!(interp.heap.at(inner, 0).is_bound());
        assert!(interp.binder.is_clean());
    }

    #[test]
    fn test_bind_kinds_filter() {
        let (mut interp, ctx, head) = setup();
        interp
            .bind_values(
                head,
                0,
                ctx,
                TypeSet::of(Kind::SetWord),
                TypeSet::EMPTY,
                BindFlags::DEEP,
            )
            .unwrap();
        assert!(!interp.heap.at(head, 0).is_bound());
        assert!(interp.heap.at(head, 1).is_bound());
    }

    #[test]
    fn test_add_midstream_shares_new_key() {
        let (mut interp, ctx, head) = setup();
        interp
            .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::ANY_WORD, BindFlags::DEEP)
            .unwrap();
        assert_eq!(interp.heap.context_len(ctx), 3);
        let inner = interp.heap.at(head, 2).array_at().unwrap().0;
        let first_c = interp.heap.at(inner, 1).binding();
        let second_c = interp.heap.at(head, 3).binding();
        assert_eq!(first_c, Binding::Specific { context: ctx, index: 3 });
        assert_eq!(first_c, second_c);
        assert!(interp.heap.var(ctx, 3).is_blank());
        assert!(interp.binder.is_clean());
    }

    #[test]
    fn test_add_midstream_skips_unbindable_spelling() {
        let (mut interp, ctx, head) = setup();
        interp.put_field(ctx, "c", Cell::blank());
        interp.heap.key_mut(ctx, 3).flags.insert(reb_core::KeyFlags::UNBINDABLE);
        interp
            .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::ANY_WORD, BindFlags::DEEP)
            .unwrap();
        assert_eq!(interp.heap.context_len(ctx), 3);
        assert!(!interp.heap.at(head, 3).is_bound());
        assert!(interp.binder.is_clean());
    }

    #[test]
    fn test_add_midstream_cannot_expand_a_frame() {
        let (mut interp, _, head) = setup();
        let a = interp.canon("a");
        let func = interp.heap.make_function(
            vec![reb_core::Key::param(a, reb_core::ParamClass::Normal, TypeSet::ANY_VALUE)],
            FuncClass::User,
            None,
        );
        let args = interp.heap.make_array(vec![Cell::trash(), Cell::integer(1)]);
        let frame = interp.heap.adopt_frame_args(args, func.paramlist());
        let err = interp
            .bind_values(head, 0, frame, TypeSet::ANY_WORD, TypeSet::ANY_WORD, BindFlags::DEEP)
            .unwrap_err();
        assert_eq!(interp.error_id(err.0).as_deref(), Some("expand-frame"));
        assert_eq!(interp.heap.context_len(frame), 1);
        assert!(interp.binder.is_clean());
    }

    #[test]
    fn test_unbind_only_target_context() {
        let (mut interp, ctx, head) = setup();
        let other = interp.heap.make_context(ContextKind::Object, 1);
        interp.put_field(other, "c", Cell::blank());
        interp
            .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)
            .unwrap();
        interp
            .bind_values(head, 0, other, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)
            .unwrap();
        interp.unbind_values(head, 0, Some(ctx), true);
        assert!(!interp.heap.at(head, 0).is_bound());
        assert!(interp.heap.at(head, 3).is_bound());
        interp.unbind_values(head, 0, None, true);
        assert!(!interp.heap.at(head, 3).is_bound());
    }

    #[test]
    fn test_try_bind_word() {
        let (mut interp, ctx, _) = setup();
        let mut word = interp.word_cell(Kind::GetWord, "A");
        assert_eq!(interp.try_bind_word(ctx, &mut word), 1);
        let mut missing = interp.word_cell(Kind::Word, "zz");
        assert_eq!(interp.try_bind_word(ctx, &mut missing), 0);
        assert!(!missing.is_bound());
    }

    #[test]
    fn test_get_var_failures() {
        let (mut interp, ctx, head) = setup();
        let loose = interp.word_cell(Kind::Word, "a");
        let err = interp
            .get_var(&loose, Specifier::Specified, false, false)
            .unwrap_err();
        assert_eq!(interp.error_id(err.0).as_deref(), Some("not-bound"));
        assert_eq!(
            interp.get_var(&loose, Specifier::Specified, true, false).unwrap(),
            None
        );

        interp
            .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)
            .unwrap();
        let word = interp.heap.at(head, 0).clone();
        interp.heap.key_mut(ctx, 1).flags.insert(reb_core::KeyFlags::LOCKED);
        assert!(interp.get_var(&word, Specifier::Specified, false, false).is_ok());
        let err = interp
            .get_var(&word, Specifier::Specified, false, true)
            .unwrap_err();
        assert_eq!(interp.error_id(err.0).as_deref(), Some("locked-word"));
    }

    #[test]
    fn test_rebind_round_trip() {
        let (mut interp, ctx, head) = setup();
        let copy = interp.heap.copy_context_shallow_extra(ctx, 0);
        interp
            .bind_values(head, 0, ctx, TypeSet::ANY_WORD, TypeSet::EMPTY, BindFlags::DEEP)
            .unwrap();
        let before: Vec<Binding> = interp.heap.cells(head).iter().map(|c| c.binding()).collect();
        interp.rebind_values_deep(ctx, copy, head, 0, None);
        assert_eq!(
            interp.heap.at(head, 0).binding(),
            Binding::Specific { context: copy, index: 1 }
        );
        interp.rebind_values_deep(copy, ctx, head, 0, None);
        let after: Vec<Binding> = interp.heap.cells(head).iter().map(|c| c.binding()).collect();
        assert_eq!(before, after);
    }
}
