//! Contexts and keylists
//!
//! A context is a varlist plus a keylist of equal length. Slot 0 of the
//! varlist is the context's self cell; slot 0 of the keylist is a root
//! placeholder (or, for a function paramlist, the function's archetype).
//! Variables therefore live at indices `1..=len`.
//!
//! Several contexts may share one keylist. Frame contexts share their
//! function's paramlist and may never grow; other contexts unshare their
//! keylist before expanding.

use crate::cell::Cell;
use crate::error::{CoreError, CoreResult};
use crate::heap::{Heap, VarLoc};
use crate::kind::{Kind, TypeSet};
use crate::series::{Misc, Series, SeriesFlags, SeriesId};
use crate::symbol::Symbol;
use std::fmt;

/// Context identity: the id of its varlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub SeriesId);

impl ContextId {
    pub fn varlist(self) -> SeriesId {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context@{}", self.0.index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Object,
    Module,
    Port,
    Error,
    Frame,
}

impl ContextKind {
    pub fn to_kind(self) -> Kind {
        match self {
            ContextKind::Object => Kind::Object,
            ContextKind::Module => Kind::Module,
            ContextKind::Port => Kind::Port,
            ContextKind::Error => Kind::Error,
            ContextKind::Frame => Kind::Frame,
        }
    }

    pub fn from_kind(kind: Kind) -> Option<ContextKind> {
        match kind {
            Kind::Object => Some(ContextKind::Object),
            Kind::Module => Some(ContextKind::Module),
            Kind::Port => Some(ContextKind::Port),
            Kind::Error => Some(ContextKind::Error),
            Kind::Frame => Some(ContextKind::Frame),
            _ => None,
        }
    }
}

/// Key flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyFlags(u8);

impl KeyFlags {
    pub const NONE: KeyFlags = KeyFlags(0);
    /// Skipped by bind passes
    pub const UNBINDABLE: KeyFlags = KeyFlags(1 << 0);
    /// Writable lookups fail with locked-word
    pub const LOCKED: KeyFlags = KeyFlags(1 << 1);
    /// Not found by ordinary word lookup
    pub const HIDDEN: KeyFlags = KeyFlags(1 << 2);
    /// Function local never filled from the call site
    pub const PURE_LOCAL: KeyFlags = KeyFlags(1 << 3);

    pub fn contains(self, other: KeyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: KeyFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: KeyFlags) {
        self.0 &= !other.0;
    }

    pub fn union(self, other: KeyFlags) -> Self {
        KeyFlags(self.0 | other.0)
    }
}

/// How a parameter is filled at a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamClass {
    /// Evaluated argument
    Normal,
    /// Taken literally, never evaluated
    HardQuote,
    /// Taken literally unless it is a group or get-word
    SoftQuote,
    Refinement,
    Local,
    /// Definitional RETURN slot
    Return,
    /// Definitional LEAVE slot
    Leave,
}

impl ParamClass {
    /// Filled from the call site (in order, or by refinement routing)
    pub fn takes_arg(self) -> bool {
        matches!(
            self,
            ParamClass::Normal | ParamClass::HardQuote | ParamClass::SoftQuote
        )
    }
}

/// Typeset key: a keylist entry
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    /// Canonical symbol the slot is stored under
    pub symbol: Symbol,
    pub types: TypeSet,
    pub flags: KeyFlags,
    pub class: ParamClass,
}

impl Key {
    /// Object field accepting any value
    pub fn field(symbol: Symbol) -> Self {
        Key {
            symbol,
            types: TypeSet::ANY_VALUE,
            flags: KeyFlags::NONE,
            class: ParamClass::Normal,
        }
    }

    pub fn param(symbol: Symbol, class: ParamClass, types: TypeSet) -> Self {
        let flags = match class {
            ParamClass::Local | ParamClass::Return | ParamClass::Leave => KeyFlags::PURE_LOCAL,
            _ => KeyFlags::NONE,
        };
        Key {
            symbol,
            types,
            flags,
            class,
        }
    }

    pub fn is_bindable(&self) -> bool {
        !self.flags.contains(KeyFlags::UNBINDABLE)
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(KeyFlags::LOCKED)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(KeyFlags::HIDDEN)
    }
}

impl Heap {
    /// Empty context of the given kind with room for `capacity` variables
    pub fn make_context(&mut self, kind: ContextKind, capacity: usize) -> ContextId {
        let mut keys = Vec::with_capacity(capacity + 1);
        keys.push(Cell::blank());
        let keylist = self.make_series(Series::from_cells(
            keys,
            SeriesFlags::MANAGED.union(SeriesFlags::KEYLIST),
        ));
        self.context_on_keylist(kind, keylist, capacity)
    }

    /// Context whose keylist is `keylist` (shared, not copied); vars start void
    pub fn context_on_keylist(
        &mut self,
        kind: ContextKind,
        keylist: SeriesId,
        capacity: usize,
    ) -> ContextId {
        let len = self.len(keylist);
        let mut vars = Vec::with_capacity(capacity.max(len) + 1);
        vars.push(Cell::trash());
        vars.extend(std::iter::repeat_n(Cell::void(), len.saturating_sub(1)));
        let mut varlist = Series::from_cells(vars, SeriesFlags::MANAGED.union(SeriesFlags::VARLIST));
        varlist.misc = Misc::Context { kind, keylist };
        let id = ContextId(self.make_series(varlist));
        self.get_mut(id.0).cells_mut()[0] = Cell::context(kind.to_kind(), id);
        id
    }

    /// Turn a call's argument array into a FRAME! context keyed by the paramlist
    ///
    /// The array is handed to the collector; the caller must stop freeing it.
    pub fn adopt_frame_args(&mut self, args: SeriesId, paramlist: SeriesId) -> ContextId {
        let ctx = ContextId(args);
        let series = self.get_mut(args);
        series.flags.insert(SeriesFlags::VARLIST);
        series.misc = Misc::Context {
            kind: ContextKind::Frame,
            keylist: paramlist,
        };
        series.cells_mut()[0] = Cell::context(Kind::Frame, ctx);
        self.manage(args);
        ctx
    }

    /// Is `id` the varlist of a context
    pub fn is_context(&self, id: SeriesId) -> bool {
        self.is_live(id) && self.get(id).flags.contains(SeriesFlags::VARLIST)
    }

    pub fn context_kind(&self, ctx: ContextId) -> ContextKind {
        match self.get(ctx.0).misc {
            Misc::Context { kind, .. } => kind,
            _ => panic!("{ctx} is not a varlist"),
        }
    }

    pub fn keylist(&self, ctx: ContextId) -> SeriesId {
        match self.get(ctx.0).misc {
            Misc::Context { keylist, .. } => keylist,
            _ => panic!("{ctx} is not a varlist"),
        }
    }

    /// Number of variables (self slot excluded)
    pub fn context_len(&self, ctx: ContextId) -> usize {
        self.len(ctx.0) - 1
    }

    /// Self cell of a context (slot 0)
    pub fn context_value(&self, ctx: ContextId) -> Cell {
        self.at(ctx.0, 0).clone()
    }

    pub fn key(&self, ctx: ContextId, index: usize) -> &Key {
        let keylist = self.keylist(ctx);
        key_at(self, keylist, index)
    }

    /// Mutable key; a frame still keyed by its function's paramlist gets a
    /// private keylist first, so flags never leak into other calls
    pub fn key_mut(&mut self, ctx: ContextId, index: usize) -> &mut Key {
        if self.keylist_shared(ctx) {
            self.unshare_keylist(ctx);
        }
        let keylist = self.keylist(ctx);
        match self.get_mut(keylist).cells_mut().get_mut(index).and_then(Cell::as_key_mut) {
            Some(key) => key,
            None => panic!("no key {index} in {ctx}"),
        }
    }

    pub fn var(&self, ctx: ContextId, index: usize) -> &Cell {
        self.at(ctx.0, index)
    }

    pub fn var_loc(&self, ctx: ContextId, index: usize) -> VarLoc {
        VarLoc {
            series: ctx.0,
            index,
        }
    }

    /// Keys of a context, index 1 first
    pub fn keys(&self, ctx: ContextId) -> impl Iterator<Item = (usize, &Key)> {
        let keylist = self.keylist(ctx);
        self.cells(keylist)
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, cell)| cell.as_key().map(|key| (i, key)))
    }

    /// Frame contexts become inaccessible when their call returns
    pub fn is_accessible(&self, ctx: ContextId) -> bool {
        !self.get(ctx.0).flags.contains(SeriesFlags::INACCESSIBLE)
    }

    pub fn set_inaccessible(&mut self, ctx: ContextId) {
        self.get_mut(ctx.0).flags.insert(SeriesFlags::INACCESSIBLE);
    }

    fn keylist_shared(&self, ctx: ContextId) -> bool {
        let keylist = self.keylist(ctx);
        self.get(keylist).flags.contains(SeriesFlags::PARAMLIST)
    }

    /// Give `ctx` a private copy of its keylist
    fn unshare_keylist(&mut self, ctx: ContextId) {
        let keylist = self.keylist(ctx);
        let copy = self.copy_array_shallow(keylist, 0);
        self.manage(copy);
        self.get_mut(copy).flags.insert(SeriesFlags::KEYLIST);
        if let Misc::Context { keylist, .. } = &mut self.get_mut(ctx.0).misc {
            *keylist = copy;
        }
    }

    /// Append `n` blank variables and `n` blank key slots
    ///
    /// Blank key slots are invisible to lookup until `append_key` fills them.
    pub fn expand_context(&mut self, ctx: ContextId, n: usize) -> CoreResult<()> {
        if self.context_kind(ctx) == ContextKind::Frame || self.keylist_shared(ctx) {
            return Err(CoreError::SharedKeylist(ctx));
        }
        if self.get(ctx.0).is_locked() {
            return Err(CoreError::LockedSeries(ctx.0));
        }
        if self.get(self.keylist(ctx)).is_locked() {
            self.unshare_keylist(ctx);
        }
        let keylist = self.keylist(ctx);
        for _ in 0..n {
            self.get_mut(keylist).push(Cell::blank());
            self.get_mut(ctx.0).push(Cell::blank());
        }
        Ok(())
    }

    /// Add one key (blank variable) and return its index
    pub fn append_key(&mut self, ctx: ContextId, symbol: Symbol, types: TypeSet) -> CoreResult<usize> {
        self.expand_context(ctx, 1)?;
        let index = self.context_len(ctx);
        let keylist = self.keylist(ctx);
        let mut key = Key::field(symbol);
        key.types = types;
        self.get_mut(keylist).cells_mut()[index] = Cell::key(key);
        Ok(index)
    }

    /// 1-based index of the key stored under canonical `symbol`, or 0
    ///
    /// Hidden keys are found only when `always` is set.
    pub fn find_word(&self, ctx: ContextId, symbol: Symbol, always: bool) -> usize {
        self.keys(ctx)
            .find(|(_, key)| key.symbol == symbol && (always || !key.is_hidden()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Copy of a context (values copied shallowly) with room for `extra` more vars
    pub fn copy_context_shallow_extra(&mut self, ctx: ContextId, extra: usize) -> ContextId {
        let kind = self.context_kind(ctx);
        let source_keys = self.keylist(ctx);
        let keylist = self.copy_array_shallow(source_keys, 0);
        self.manage(keylist);
        let flags = &mut self.get_mut(keylist).flags;
        flags.insert(SeriesFlags::KEYLIST);
        flags.remove(SeriesFlags::PARAMLIST);
        flags.remove(SeriesFlags::LOCKED);
        // a paramlist's slot 0 is a function archetype; object keylists hold a placeholder
        self.get_mut(keylist).cells_mut()[0] = Cell::blank();

        let len = self.context_len(ctx);
        let copy = self.context_on_keylist(
            if kind == ContextKind::Frame {
                ContextKind::Object
            } else {
                kind
            },
            keylist,
            len + extra,
        );
        for i in 1..=len {
            let value = self.var(ctx, i).clone();
            self.get_mut(copy.0).cells_mut()[i] = value;
        }
        copy
    }

    /// Overwrite a variable, honoring key locks but not series locks
    pub fn set_var(&mut self, ctx: ContextId, index: usize, value: Cell) -> CoreResult<()> {
        if self.key(ctx, index).is_locked() {
            return Err(CoreError::LockedKey {
                context: ctx,
                index,
            });
        }
        *self.cell_mut(self.var_loc(ctx, index)) = value;
        Ok(())
    }
}

/// Key stored at `index` of a keylist or paramlist
pub fn key_at(heap: &Heap, keylist: SeriesId, index: usize) -> &Key {
    match heap.at(keylist, index).as_key() {
        Some(key) => key,
        None => panic!("slot {index} of {keylist} is not a key"),
    }
}
