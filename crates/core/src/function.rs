//! Functions
//!
//! A function is identified by its paramlist: slot 0 holds the function's
//! archetype cell, slots `1..` hold typeset keys with a parameter class.
//! The paramlist doubles as the keylist of every frame context reified from
//! a call to the function, so argument slot `i` and key `i` always agree.

use crate::cell::Cell;
use crate::context::{Key, key_at};
use crate::heap::Heap;
use crate::series::{Misc, Series, SeriesFlags, SeriesId};
use crate::symbol::Symbol;
use std::fmt;

/// Function identity: the id of its paramlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub SeriesId);

impl FuncId {
    pub fn paramlist(self) -> SeriesId {
        self.0
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function@{}", self.0.index())
    }
}

/// Index into the runtime's native dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncClass {
    Native(NativeId),
    /// Type-dispatched native
    Action(NativeId),
    User,
    Specialized,
    Routine,
    Callback,
    Command,
}

impl FuncClass {
    pub fn name(self) -> &'static str {
        match self {
            FuncClass::Native(_) => "native",
            FuncClass::Action(_) => "action",
            FuncClass::User => "user",
            FuncClass::Specialized => "specialized",
            FuncClass::Routine => "routine",
            FuncClass::Callback => "callback",
            FuncClass::Command => "command",
        }
    }

    pub fn native_id(self) -> Option<NativeId> {
        match self {
            FuncClass::Native(id) | FuncClass::Action(id) => Some(id),
            _ => None,
        }
    }
}

impl Heap {
    /// Build a function from its parameter keys
    ///
    /// The paramlist is managed and locked; `body` must already be managed.
    pub fn make_function(&mut self, params: Vec<Key>, class: FuncClass, body: Option<SeriesId>) -> FuncId {
        let mut cells = Vec::with_capacity(params.len() + 1);
        cells.push(Cell::trash());
        cells.extend(params.into_iter().map(Cell::key));
        let mut paramlist = Series::from_cells(
            cells,
            SeriesFlags::MANAGED
                .union(SeriesFlags::PARAMLIST)
                .union(SeriesFlags::KEYLIST),
        );
        paramlist.misc = Misc::Function {
            class,
            body,
            exemplar: None,
            underlying: None,
        };
        let func = FuncId(self.make_series(paramlist));
        self.get_mut(func.0).cells_mut()[0] = Cell::function(func);
        self.lock(func.0);
        func
    }

    /// Function built from another's paramlist with some arguments pre-filled
    pub fn make_specialization(&mut self, underlying: FuncId, exemplar: SeriesId) -> FuncId {
        let params: Vec<Key> = self.params(underlying).map(|(_, key)| key.clone()).collect();
        let func = self.make_function(params, FuncClass::Specialized, None);
        if let Misc::Function {
            exemplar: slot,
            underlying: base,
            ..
        } = &mut self.get_mut(func.0).misc
        {
            *slot = Some(exemplar);
            *base = Some(underlying.0);
        }
        func
    }

    pub fn is_function(&self, id: SeriesId) -> bool {
        self.is_live(id) && self.get(id).flags.contains(SeriesFlags::PARAMLIST)
    }

    pub fn func_class(&self, func: FuncId) -> FuncClass {
        match self.get(func.0).misc {
            Misc::Function { class, .. } => class,
            _ => panic!("{func} is not a paramlist"),
        }
    }

    pub fn func_body(&self, func: FuncId) -> Option<SeriesId> {
        match self.get(func.0).misc {
            Misc::Function { body, .. } => body,
            _ => None,
        }
    }

    /// Replace a function's body (used when copying functions)
    pub fn set_func_body(&mut self, func: FuncId, new_body: SeriesId) {
        if let Misc::Function { body, .. } = &mut self.get_mut(func.0).misc {
            *body = Some(new_body);
        }
    }

    pub fn func_exemplar(&self, func: FuncId) -> Option<SeriesId> {
        match self.get(func.0).misc {
            Misc::Function { exemplar, .. } => exemplar,
            _ => None,
        }
    }

    pub fn func_underlying(&self, func: FuncId) -> Option<FuncId> {
        match self.get(func.0).misc {
            Misc::Function { underlying, .. } => underlying.map(FuncId),
            _ => None,
        }
    }

    /// Archetype value of a function (paramlist slot 0)
    pub fn func_value(&self, func: FuncId) -> Cell {
        self.at(func.0, 0).clone()
    }

    pub fn num_params(&self, func: FuncId) -> usize {
        self.len(func.0) - 1
    }

    pub fn param(&self, func: FuncId, index: usize) -> &Key {
        key_at(self, func.0, index)
    }

    /// Parameters, index 1 first
    pub fn params(&self, func: FuncId) -> impl Iterator<Item = (usize, &Key)> {
        self.cells(func.0)
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, cell)| cell.as_key().map(|key| (i, key)))
    }

    /// Index of the parameter stored under canonical `symbol`, or 0
    pub fn find_param(&self, func: FuncId, symbol: Symbol) -> usize {
        self.params(func)
            .find(|(_, key)| key.symbol == symbol)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParamClass;
    use crate::kind::TypeSet;
    use crate::symbol::SymbolTable;

    #[test]
    fn test_archetype_in_slot_zero() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let func = heap.make_function(
            vec![Key::param(x, ParamClass::Normal, TypeSet::ANY_VALUE)],
            FuncClass::User,
            None,
        );
        assert_eq!(heap.func_value(func).func_id(), Some(func));
        assert_eq!(heap.num_params(func), 1);
        assert_eq!(heap.find_param(func, x), 1);
        assert_eq!(heap.param(func, 1).class, ParamClass::Normal);
        assert!(heap.get(func.0).is_locked());
    }

    #[test]
    fn test_specialization_links_underlying() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let base = heap.make_function(
            vec![Key::param(x, ParamClass::Normal, TypeSet::ANY_VALUE)],
            FuncClass::User,
            None,
        );
        let exemplar = heap.make_managed_array(vec![Cell::trash(), Cell::integer(1)]);
        let special = heap.make_specialization(base, exemplar);
        assert_eq!(heap.func_class(special), FuncClass::Specialized);
        assert_eq!(heap.func_underlying(special), Some(base));
        assert_eq!(heap.func_exemplar(special), Some(exemplar));
        assert_eq!(heap.num_params(special), 1);
    }

    #[test]
    fn test_local_params_are_pure() {
        let mut symbols = SymbolTable::new();
        let key = Key::param(symbols.intern("tmp"), ParamClass::Local, TypeSet::ANY_VALUE);
        assert!(key.flags.contains(crate::context::KeyFlags::PURE_LOCAL));
        assert!(!key.class.takes_arg());
    }
}
