//! Function construction
//!
//! The spec dialect:
//!
//! | Element | Meaning |
//! |---------|---------|
//! | `word` | evaluated argument |
//! | `'word` | argument taken literally |
//! | `:word` | literal unless a group or get-word |
//! | `/word` | refinement; following words are its arguments |
//! | `/local` | following words are locals |
//! | `[types]` | accepted datatypes / typesets of the preceding parameter |
//! | `"text"` | description, ignored |
//!
//! Parameters without a type block accept any value except void.
//! Refinements hold logic true when used and blank otherwise.

use crate::bind::BindFlags;
use crate::error::Fail;
use crate::frame::Specifier;
use crate::interp::Interp;
use reb_core::{
    Cell, ContextKind, FuncClass, FuncId, Key, KeyFlags, Kind, ParamClass, SeriesId, Symbol,
    TypeSet,
};

impl Interp {
    /// Parameter keys described by a spec block
    pub fn parse_spec(&mut self, spec: SeriesId, index: usize) -> Result<Vec<Key>, Fail> {
        let mut keys: Vec<Key> = Vec::new();
        let mut locals = false;
        let cells: Vec<Cell> = self.heap.cells(spec).iter().skip(index).cloned().collect();
        let spec_value = Cell::series(Kind::Block, spec, index);

        let mut iter = cells.into_iter().peekable();
        while let Some(item) = iter.next() {
            let kind = item.kind();
            if kind.is_string() {
                continue;
            }
            let Some(sym) = item.symbol() else {
                return Err(self.script_error("bad-func-def", &[spec_value]));
            };
            let canon = self.symbols.canon(sym);

            let class = match kind {
                Kind::Refinement if self.symbols.name(canon) == "local" => {
                    locals = true;
                    continue;
                }
                Kind::Refinement => {
                    locals = false;
                    ParamClass::Refinement
                }
                _ if locals && kind == Kind::Word => ParamClass::Local,
                Kind::Word => ParamClass::Normal,
                Kind::LitWord => ParamClass::HardQuote,
                Kind::GetWord => ParamClass::SoftQuote,
                Kind::SetWord => {
                    // `return: [types]` documents the result; nothing to fulfill
                    if iter.peek().is_some_and(|next| next.kind() == Kind::Block) {
                        iter.next();
                    }
                    continue;
                }
                _ => return Err(self.script_error("bad-func-def", &[item])),
            };

            if keys.iter().any(|k| k.symbol == canon) {
                return Err(self.script_error("bad-func-def", &[item]));
            }

            let mut types = match class {
                ParamClass::Refinement => TypeSet::from_kinds(&[Kind::Logic, Kind::Blank]),
                ParamClass::Local => TypeSet::ANY_VALUE,
                _ => TypeSet::any_value_except_void(),
            };
            if let Some(next) = iter.peek()
                && next.kind() == Kind::Block
            {
                if matches!(class, ParamClass::Refinement | ParamClass::Local) {
                    return Err(self.script_error("bad-func-def", &[item]));
                }
                let block = next.clone();
                iter.next();
                types = self.typeset_from_block(&block)?;
            }
            keys.push(Key::param(canon, class, types));
        }
        Ok(keys)
    }

    fn typeset_from_block(&mut self, block: &Cell) -> Result<TypeSet, Fail> {
        let Some((series, index)) = block.array_at() else {
            return Err(self.script_error("bad-func-def", &[block.clone()]));
        };
        let mut types = TypeSet::EMPTY;
        for cell in self.heap.cells(series).iter().skip(index).cloned().collect::<Vec<_>>() {
            let named = match (cell.kind(), cell.symbol()) {
                (Kind::Word, Some(sym)) => TypeSet::from_name(self.symbols.name(sym)),
                (Kind::Datatype, _) => cell.datatype_kind().map(TypeSet::of),
                (Kind::Typeset, _) => cell.as_typeset(),
                _ => None,
            };
            match named {
                Some(set) => types = types.union(set),
                None => return Err(self.script_error("bad-func-def", &[cell])),
            }
        }
        Ok(types)
    }

    /// Keys of a native, from its spec text
    pub(crate) fn native_params(&mut self, spec: &str) -> Result<Vec<Key>, Fail> {
        let block = self.scan(spec, "native")?;
        self.parse_spec(block, 0)
    }

    /// `func spec body`: deep-copied body, parameters bound relatively
    ///
    /// Every user function also gets hidden RETURN and LEAVE slots unless the
    /// spec already names them.
    pub fn make_user_function(&mut self, spec: &Cell, body: &Cell) -> Result<FuncId, Fail> {
        let (Some((spec_series, spec_index)), Some((body_series, body_index))) =
            (spec.array_at(), body.array_at())
        else {
            return Err(self.script_error("bad-func-def", &[spec.clone()]));
        };
        let mut keys = self.parse_spec(spec_series, spec_index)?;
        for (name, class) in [("return", ParamClass::Return), ("leave", ParamClass::Leave)] {
            let canon = self.canon(name);
            if !keys.iter().any(|k| k.symbol == canon) {
                let mut key = Key::param(canon, class, TypeSet::ANY_VALUE);
                key.flags.insert(KeyFlags::HIDDEN);
                keys.push(key);
            }
        }

        let body = self.heap.copy_array_deep_managed(body_series, body_index);
        let func = self.heap.make_function(keys, FuncClass::User, Some(body));
        self.bind_relative_deep(func, body, TypeSet::ANY_WORD);
        tracing::debug!(func = %func, params = self.heap.num_params(func), "make function");
        Ok(func)
    }

    /// Independent copy of a function; a user body is rebound to the copy
    pub fn copy_function(&mut self, func: FuncId) -> FuncId {
        let keys: Vec<Key> = self.heap.params(func).map(|(_, k)| k.clone()).collect();
        let class = self.heap.func_class(func);
        match class {
            FuncClass::User => {
                let body = self
                    .heap
                    .func_body(func)
                    .map(|b| self.heap.copy_array_deep_managed(b, 0));
                let copy = self.heap.make_function(keys, class, body);
                if let Some(body) = body {
                    self.rebind_values_relative_deep(func, copy, body);
                }
                copy
            }
            FuncClass::Specialized => {
                let underlying = self.heap.func_underlying(func).unwrap_or(func);
                match self.heap.func_exemplar(func) {
                    Some(exemplar) => self.heap.make_specialization(underlying, exemplar),
                    None => func,
                }
            }
            _ => self.heap.make_function(keys, class, None),
        }
    }

    /// `specialize :f [arg: value ...]`
    ///
    /// The definition block runs bound to a frame-shaped exemplar; any
    /// refinement whose arguments it sets is switched on.
    pub fn specialize(&mut self, func: FuncId, def: &Cell) -> Result<FuncId, Fail> {
        let Some((series, index)) = def.array_at() else {
            return Err(self.script_error("invalid-arg", &[def.clone()]));
        };
        let base = self.heap.func_underlying(func).unwrap_or(func);
        let exemplar = self
            .heap
            .context_on_keylist(ContextKind::Frame, func.paramlist(), 0);
        if let Some(previous) = self.heap.func_exemplar(func) {
            for i in 1..self.heap.len(previous) {
                let value = self.heap.at(previous, i).clone();
                self.poke_var(exemplar, i, value);
            }
        }

        let body = self.heap.copy_array_deep_managed(series, index);
        self.bind_values(
            body,
            0,
            exemplar,
            TypeSet::ANY_WORD,
            TypeSet::EMPTY,
            BindFlags::DEEP,
        )?;
        let mut out = Cell::void();
        if self.do_array(body, 0, Specifier::Specified, &mut out)? == crate::control::Flow::Thrown {
            let label = self.catch_thrown(&mut out);
            return Err(self.script_error("no-catch", &[label]));
        }

        let mut refinement = None;
        let params: Vec<(usize, Key)> = self.heap.params(func).map(|(i, k)| (i, k.clone())).collect();
        for (i, key) in params {
            match key.class {
                ParamClass::Refinement => refinement = Some(i),
                ParamClass::Normal | ParamClass::HardQuote | ParamClass::SoftQuote => {
                    if let Some(r) = refinement
                        && !self.heap.var(exemplar, i).is_void()
                        && self.heap.var(exemplar, r).is_void()
                    {
                        self.poke_var(exemplar, r, Cell::logic(true));
                    }
                }
                _ => {}
            }
        }
        Ok(self.heap.make_specialization(base, exemplar.0))
    }

    /// Spec block rebuilt from a paramlist, for molding
    pub(crate) fn spec_of(&mut self, func: FuncId) -> SeriesId {
        let params: Vec<(Symbol, ParamClass, KeyFlags)> = self
            .heap
            .params(func)
            .map(|(_, k)| (k.symbol, k.class, k.flags))
            .collect();
        let mut cells = Vec::new();
        let mut in_locals = false;
        for (sym, class, flags) in params {
            if flags.contains(KeyFlags::HIDDEN) {
                continue;
            }
            let kind = match class {
                ParamClass::Normal => Kind::Word,
                ParamClass::HardQuote => Kind::LitWord,
                ParamClass::SoftQuote => Kind::GetWord,
                ParamClass::Refinement => Kind::Refinement,
                ParamClass::Local | ParamClass::Return | ParamClass::Leave => {
                    if !in_locals {
                        in_locals = true;
                        cells.push(self.word_cell(Kind::Refinement, "local"));
                    }
                    Kind::Word
                }
            };
            cells.push(Cell::word(kind, sym));
        }
        self.heap.make_managed_array(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use reb_core::Binding;

    fn spec(interp: &mut Interp, text: &str) -> Result<Vec<Key>, Fail> {
        let block = interp.scan(text, "test").unwrap();
        interp.parse_spec(block, 0)
    }

    #[test]
    fn test_parse_classes() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let keys = spec(&mut interp, "a 'b :c /d e /local f").unwrap();
        let classes: Vec<ParamClass> = keys.iter().map(|k| k.class).collect();
        assert_eq!(
            classes,
            vec![
                ParamClass::Normal,
                ParamClass::HardQuote,
                ParamClass::SoftQuote,
                ParamClass::Refinement,
                ParamClass::Normal,
                ParamClass::Local,
            ]
        );
        assert!(!keys[0].types.contains(Kind::Void));
        assert!(keys[5].flags.contains(KeyFlags::PURE_LOCAL));
    }

    #[test]
    fn test_type_blocks() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let keys = spec(&mut interp, "\"doc\" n [integer! decimal!] w [any-word!]").unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].types.contains(Kind::Integer));
        assert!(keys[0].types.contains(Kind::Decimal));
        assert!(!keys[0].types.contains(Kind::Block));
        assert!(keys[1].types.contains(Kind::SetWord));
    }

    #[test]
    fn test_bad_specs() {
        let mut interp = Interp::new(RuntimeConfig::default());
        for text in ["a a", "a [no-such-type!]", "/r [integer!]", "1"] {
            let err = spec(&mut interp, text).unwrap_err();
            assert_eq!(interp.error_id(err.0).as_deref(), Some("bad-func-def"), "{text}");
        }
    }

    #[test]
    fn test_user_function_binds_params_relatively() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let spec_block = interp.scan("x", "test").unwrap();
        let body_block = interp.scan("x + y", "test").unwrap();
        let func = interp
            .make_user_function(&Cell::block(spec_block), &Cell::block(body_block))
            .unwrap();
        let body = interp.heap.func_body(func).unwrap();
        assert_ne!(body, body_block);
        assert_eq!(
            interp.heap.at(body, 0).binding(),
            Binding::Relative { function: func, index: 1 }
        );
        assert!(!interp.heap.at(body, 2).is_bound());
        assert!(!interp.heap.at(body_block, 0).is_bound());
        let ret = interp.canon("return");
        assert!(interp.heap.find_param(func, ret) > 0);
    }

    #[test]
    fn test_copy_function_rebinds_body() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let spec_block = interp.scan("x", "test").unwrap();
        let body_block = interp.scan("x", "test").unwrap();
        let func = interp
            .make_user_function(&Cell::block(spec_block), &Cell::block(body_block))
            .unwrap();
        let copy = interp.copy_function(func);
        let body = interp.heap.func_body(copy).unwrap();
        assert_eq!(
            interp.heap.at(body, 0).binding(),
            Binding::Relative { function: copy, index: 1 }
        );
    }
}
