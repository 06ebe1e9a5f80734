//! Symbol interning
//!
//! Words carry a `Symbol`, an id into the interpreter's `SymbolTable`.
//! Every spelling gets its own id; each id also has a *canonical* id, the id
//! of its lowercase spelling. Binding and key lookup compare canonical ids
//! only, so `Foo` and `foo` name the same variable while molding still
//! reproduces the spelling the user typed.

use std::collections::HashMap;
use std::fmt;

/// Interned spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Dense index, usable to address per-symbol tables such as the binder
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Spelling to id table with case-folded canonical ids
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<String>,
    canon: Vec<Symbol>,
    lookup: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Intern a spelling, returning the existing id when already present
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(sym) = self.lookup.get(name) {
            return *sym;
        }

        let folded = name.to_lowercase();
        let canon = if folded == name {
            None
        } else {
            Some(self.intern(&folded))
        };

        let sym = Symbol(self.names.len() as u32);
        self.names.push(name.to_string());
        self.canon.push(canon.unwrap_or(sym));
        self.lookup.insert(name.to_string(), sym);
        sym
    }

    /// Find a spelling without interning it
    pub fn find(&self, name: &str) -> Option<Symbol> {
        self.lookup.get(name).copied()
    }

    /// Canonical (lowercase) id for a symbol
    pub fn canon(&self, sym: Symbol) -> Symbol {
        self.canon[sym.index()]
    }

    pub fn name(&self, sym: Symbol) -> &str {
        &self.names[sym.index()]
    }

    /// True when both symbols spell the same word modulo case
    pub fn same_word(&self, a: Symbol, b: Symbol) -> bool {
        self.canon(a) == self.canon(b)
    }

    /// Number of interned spellings
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
