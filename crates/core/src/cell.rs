//! Value cells
//!
//! A `Cell` is the uniform record every runtime datum lives in: a kind tag,
//! a small flag set and a kind-dependent payload. Cells are plain data and
//! are cloned freely; anything larger than a scalar lives in a series and is
//! referenced by id.
//!
//! Word binding is encoded as the tagged union `Binding`. The *bound* and
//! *relative* header bits of the classic design are derived from it, which
//! makes "relative implies bound" and "bound implies a target" hold by
//! construction.

use crate::context::{ContextId, Key};
use crate::function::FuncId;
use crate::kind::{Kind, TypeSet};
use crate::series::SeriesId;
use crate::symbol::Symbol;

/// Header flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellFlags(u16);

impl CellFlags {
    pub const NONE: CellFlags = CellFlags(0);
    /// Layout hint: a line break precedes this cell in a literal array
    pub const NEWLINE_BEFORE: CellFlags = CellFlags(1 << 0);
    /// Output slot carries a throw label; the value is held by the interpreter
    pub const THROWN: CellFlags = CellFlags(1 << 1);
    /// Cell may not be modified through a path or `set`
    pub const PROTECTED: CellFlags = CellFlags(1 << 2);
    /// Function value takes its first argument from the left
    pub const ENFIX: CellFlags = CellFlags(1 << 3);
    /// Mold hint: render nested arrays on one line
    pub const MOLD_FLAT: CellFlags = CellFlags(1 << 4);

    pub fn contains(self, other: CellFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CellFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CellFlags) {
        self.0 &= !other.0;
    }
}

/// Where a word (or a definitional RETURN cell) resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Binding {
    #[default]
    Unbound,
    /// Resolves to `context.varlist[index]`
    Specific { context: ContextId, index: u32 },
    /// Resolves to `frame.args[index]` of the innermost live call of `function`
    Relative { function: FuncId, index: u32 },
}

impl Binding {
    pub fn is_bound(self) -> bool {
        !matches!(self, Binding::Unbound)
    }

    pub fn is_relative(self) -> bool {
        matches!(self, Binding::Relative { .. })
    }

    pub fn index(self) -> Option<u32> {
        match self {
            Binding::Unbound => None,
            Binding::Specific { index, .. } | Binding::Relative { index, .. } => Some(index),
        }
    }
}

/// Kind-dependent cell payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    Char(char),
    Pair(f64, f64),
    Tuple { bytes: [u8; 8], len: u8 },
    /// Nanoseconds
    Time(i64),
    Date { year: i32, month: u8, day: u8 },
    Word { symbol: Symbol, binding: Binding },
    Series { series: SeriesId, index: usize },
    Context(ContextId),
    Function { func: FuncId, binding: Binding },
    Datatype(Kind),
    Typeset(TypeSet),
    Key(Key),
    Handle(u64),
}

/// Fixed-size tagged value record
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    kind: Kind,
    flags: CellFlags,
    payload: Payload,
}

impl Cell {
    fn new(kind: Kind, payload: Payload) -> Self {
        Cell {
            kind,
            flags: CellFlags::NONE,
            payload,
        }
    }

    /// Array terminator; never stored into a user-visible slot
    pub fn end() -> Self {
        Cell::new(Kind::End, Payload::None)
    }

    /// Placeholder for slots that must be overwritten before use
    pub fn trash() -> Self {
        Cell::new(Kind::Trash, Payload::None)
    }

    pub fn void() -> Self {
        Cell::new(Kind::Void, Payload::None)
    }

    pub fn blank() -> Self {
        Cell::new(Kind::Blank, Payload::None)
    }

    pub fn bar() -> Self {
        Cell::new(Kind::Bar, Payload::None)
    }

    pub fn logic(value: bool) -> Self {
        Cell::new(Kind::Logic, Payload::Logic(value))
    }

    pub fn integer(value: i64) -> Self {
        Cell::new(Kind::Integer, Payload::Integer(value))
    }

    pub fn decimal(value: f64) -> Self {
        Cell::new(Kind::Decimal, Payload::Decimal(value))
    }

    pub fn char(value: char) -> Self {
        Cell::new(Kind::Char, Payload::Char(value))
    }

    pub fn pair(x: f64, y: f64) -> Self {
        Cell::new(Kind::Pair, Payload::Pair(x, y))
    }

    /// Tuples hold at most eight bytes; extra bytes are dropped
    pub fn tuple(parts: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        let len = parts.len().min(8);
        bytes[..len].copy_from_slice(&parts[..len]);
        Cell::new(
            Kind::Tuple,
            Payload::Tuple {
                bytes,
                len: len as u8,
            },
        )
    }

    pub fn time(nanos: i64) -> Self {
        Cell::new(Kind::Time, Payload::Time(nanos))
    }

    pub fn date(year: i32, month: u8, day: u8) -> Self {
        Cell::new(Kind::Date, Payload::Date { year, month, day })
    }

    pub fn handle(value: u64) -> Self {
        Cell::new(Kind::Handle, Payload::Handle(value))
    }

    /// Unbound word of the given word kind
    pub fn word(kind: Kind, symbol: Symbol) -> Self {
        debug_assert!(kind.is_word(), "{kind} is not a word kind");
        Cell::new(
            kind,
            Payload::Word {
                symbol,
                binding: Binding::Unbound,
            },
        )
    }

    /// Series-backed value (arrays, strings, binaries, bitsets, maps)
    pub fn series(kind: Kind, series: SeriesId, index: usize) -> Self {
        debug_assert!(kind.is_series(), "{kind} is not a series kind");
        Cell::new(kind, Payload::Series { series, index })
    }

    pub fn block(series: SeriesId) -> Self {
        Cell::series(Kind::Block, series, 0)
    }

    pub fn group(series: SeriesId) -> Self {
        Cell::series(Kind::Group, series, 0)
    }

    pub fn context(kind: Kind, context: ContextId) -> Self {
        debug_assert!(kind.is_context(), "{kind} is not a context kind");
        Cell::new(kind, Payload::Context(context))
    }

    pub fn function(func: FuncId) -> Self {
        Cell::new(
            Kind::Function,
            Payload::Function {
                func,
                binding: Binding::Unbound,
            },
        )
    }

    pub fn datatype(kind: Kind) -> Self {
        Cell::new(Kind::Datatype, Payload::Datatype(kind))
    }

    pub fn typeset(set: TypeSet) -> Self {
        Cell::new(Kind::Typeset, Payload::Typeset(set))
    }

    /// Keylist entry
    pub fn key(key: Key) -> Self {
        Cell::new(Kind::Typeset, Payload::Key(key))
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn flags(&self) -> CellFlags {
        self.flags
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn has_flag(&self, flag: CellFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: CellFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: CellFlags) {
        self.flags.remove(flag);
    }

    pub fn with_flag(mut self, flag: CellFlags) -> Self {
        self.set_flag(flag);
        self
    }

    pub fn is_end(&self) -> bool {
        self.kind == Kind::End
    }

    pub fn is_void(&self) -> bool {
        self.kind == Kind::Void
    }

    pub fn is_blank(&self) -> bool {
        self.kind == Kind::Blank
    }

    pub fn is_thrown(&self) -> bool {
        self.has_flag(CellFlags::THROWN)
    }

    /// Conditional truth: blank and false are falsey, void is neither
    pub fn truthy(&self) -> Option<bool> {
        match (&self.kind, &self.payload) {
            (Kind::Void, _) => None,
            (Kind::Blank, _) => Some(false),
            (Kind::Logic, Payload::Logic(b)) => Some(*b),
            _ => Some(true),
        }
    }

    pub fn as_logic(&self) -> Option<bool> {
        match self.payload {
            Payload::Logic(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            Payload::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Numeric value widened to f64 (integers included)
    pub fn as_decimal(&self) -> Option<f64> {
        match self.payload {
            Payload::Integer(i) => Some(i as f64),
            Payload::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self.payload {
            Payload::Char(c) => Some(c),
            _ => None,
        }
    }

    /// Spelling of a word-kind cell
    pub fn symbol(&self) -> Option<Symbol> {
        match self.payload {
            Payload::Word { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// Binding of a word or function cell; `Unbound` for everything else
    pub fn binding(&self) -> Binding {
        match self.payload {
            Payload::Word { binding, .. } | Payload::Function { binding, .. } => binding,
            _ => Binding::Unbound,
        }
    }

    /// Overwrite the binding of a word or function cell
    pub fn set_binding(&mut self, new: Binding) {
        match &mut self.payload {
            Payload::Word { binding, .. } | Payload::Function { binding, .. } => *binding = new,
            _ => debug_assert!(false, "set_binding on {}", self.kind),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding().is_bound()
    }

    pub fn is_relative(&self) -> bool {
        self.binding().is_relative()
    }

    /// Series id and index of a series-backed cell
    pub fn series_at(&self) -> Option<(SeriesId, usize)> {
        match self.payload {
            Payload::Series { series, index } => Some((series, index)),
            _ => None,
        }
    }

    /// Array id and index, only for array kinds
    pub fn array_at(&self) -> Option<(SeriesId, usize)> {
        if self.kind.is_array() {
            self.series_at()
        } else {
            None
        }
    }

    pub fn set_index(&mut self, new: usize) {
        if let Payload::Series { index, .. } = &mut self.payload {
            *index = new;
        }
    }

    pub fn context_id(&self) -> Option<ContextId> {
        match self.payload {
            Payload::Context(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn func_id(&self) -> Option<FuncId> {
        match self.payload {
            Payload::Function { func, .. } => Some(func),
            _ => None,
        }
    }

    pub fn datatype_kind(&self) -> Option<Kind> {
        match self.payload {
            Payload::Datatype(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn as_typeset(&self) -> Option<TypeSet> {
        match self.payload {
            Payload::Typeset(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&Key> {
        match &self.payload {
            Payload::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_key_mut(&mut self) -> Option<&mut Key> {
        match &mut self.payload {
            Payload::Key(key) => Some(key),
            _ => None,
        }
    }

    /// Same payload under a sibling kind (word <-> lit-word, block <-> group)
    ///
    /// Only conversions within the word family or the array family are
    /// meaningful; flags other than the layout hint are dropped.
    pub fn with_kind(&self, kind: Kind) -> Self {
        debug_assert!(
            (self.kind.is_word() && kind.is_word()) || (self.kind.is_array() && kind.is_array()),
            "cannot convert {} to {}",
            self.kind,
            kind
        );
        let mut cell = Cell::new(kind, self.payload.clone());
        if self.has_flag(CellFlags::NEWLINE_BEFORE) {
            cell.set_flag(CellFlags::NEWLINE_BEFORE);
        }
        cell
    }

    /// Copy suitable for storing in a persistent slot: transient flags removed
    pub fn stored(&self) -> Self {
        debug_assert!(!self.is_thrown(), "thrown cell stored into a slot");
        debug_assert!(!self.kind.is_internal(), "{} stored into a slot", self.kind);
        let mut cell = self.clone();
        cell.clear_flag(CellFlags::NEWLINE_BEFORE);
        cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    #[test]
    fn test_exactly_one_kind() {
        let cell = Cell::integer(7);
        assert_eq!(cell.kind(), Kind::Integer);
        assert_eq!(cell.as_integer(), Some(7));
        assert_eq!(cell.as_decimal(), Some(7.0));
        assert!(cell.symbol().is_none());
    }

    #[test]
    fn test_new_word_is_unbound() {
        let mut symbols = SymbolTable::new();
        let sym = symbols.intern("x");
        let cell = Cell::word(Kind::SetWord, sym);
        assert!(!cell.is_bound());
        assert!(!cell.is_relative());
        assert_eq!(cell.symbol(), Some(sym));
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(Cell::blank().truthy(), Some(false));
        assert_eq!(Cell::logic(false).truthy(), Some(false));
        assert_eq!(Cell::logic(true).truthy(), Some(true));
        assert_eq!(Cell::integer(0).truthy(), Some(true));
        assert_eq!(Cell::void().truthy(), None);
    }

    #[test]
    fn test_flags() {
        let mut cell = Cell::blank();
        assert!(!cell.is_thrown());
        cell.set_flag(CellFlags::THROWN);
        assert!(cell.is_thrown());
        cell.clear_flag(CellFlags::THROWN);
        assert!(!cell.is_thrown());
    }

    #[test]
    fn test_with_kind_keeps_symbol() {
        let mut symbols = SymbolTable::new();
        let sym = symbols.intern("y");
        let lit = Cell::word(Kind::LitWord, sym);
        let plain = lit.with_kind(Kind::Word);
        assert_eq!(plain.kind(), Kind::Word);
        assert_eq!(plain.symbol(), Some(sym));
    }

    #[test]
    fn test_tuple_truncates() {
        let cell = Cell::tuple(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        match cell.payload() {
            Payload::Tuple { len, .. } => assert_eq!(*len, 8),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
