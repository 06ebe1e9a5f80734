//! Series: relocatable, terminated buffers
//!
//! A series holds elements of one fixed width: bytes, 16-bit units, or
//! cells. Cell series are *arrays*; they always store a trailing END cell
//! that is not counted in their length, so code walking an array can stop at
//! the terminator without consulting the length.
//!
//! Series are owned by the `Heap` and addressed by `SeriesId`. What a series
//! *is* beyond its elements (a context varlist, a function paramlist, a
//! keylist) is recorded in its flags and its `Misc` field.

use crate::cell::Cell;
use crate::context::ContextKind;
use crate::function::FuncClass;
use crate::symbol::Symbol;
use std::fmt;

/// Slot id of a series in the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(pub(crate) u32);

impl SeriesId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "series#{}", self.0)
    }
}

/// Element width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Wide,
    Cell,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Wide => 2,
            Width::Cell => std::mem::size_of::<Cell>(),
        }
    }
}

/// Series flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeriesFlags(u16);

impl SeriesFlags {
    pub const NONE: SeriesFlags = SeriesFlags(0);
    /// Owned by the collector; never freed explicitly
    pub const MANAGED: SeriesFlags = SeriesFlags(1 << 0);
    /// Rejects all modification (sticky)
    pub const LOCKED: SeriesFlags = SeriesFlags(1 << 1);
    /// Storage supplied from outside the pool
    pub const EXTERNAL: SeriesFlags = SeriesFlags(1 << 2);
    /// Variable array of a context
    pub const VARLIST: SeriesFlags = SeriesFlags(1 << 3);
    /// Key array of a context
    pub const KEYLIST: SeriesFlags = SeriesFlags(1 << 4);
    /// Parameter array of a function (doubles as a keylist)
    pub const PARAMLIST: SeriesFlags = SeriesFlags(1 << 5);
    /// Frame varlist whose call has returned
    pub const INACCESSIBLE: SeriesFlags = SeriesFlags(1 << 6);
    /// Kept for compatibility-mode behavior
    pub const LEGACY: SeriesFlags = SeriesFlags(1 << 7);

    pub fn contains(self, other: SeriesFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SeriesFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SeriesFlags) {
        self.0 &= !other.0;
    }

    pub fn union(self, other: SeriesFlags) -> Self {
        SeriesFlags(self.0 | other.0)
    }
}

/// Element storage
#[derive(Debug, Clone)]
pub enum Content {
    Bytes(Vec<u8>),
    Wide(Vec<u16>),
    /// Always ends with an END cell
    Cells(Vec<Cell>),
}

/// Kind-specific extra data
#[derive(Debug, Clone, PartialEq)]
pub enum Misc {
    None,
    /// Bitset complement flag
    Negated(bool),
    /// Present on varlists
    Context {
        kind: ContextKind,
        keylist: SeriesId,
    },
    /// Present on paramlists
    Function {
        class: FuncClass,
        body: Option<SeriesId>,
        /// Pre-filled arguments of a specialization (a frame-shaped varlist)
        exemplar: Option<SeriesId>,
        /// Function a specialization ultimately runs
        underlying: Option<SeriesId>,
    },
}

/// File and line an array was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub file: Symbol,
    pub line: u32,
}

/// Heap object holding a contiguous buffer of fixed-width elements
#[derive(Debug, Clone)]
pub struct Series {
    content: Content,
    pub flags: SeriesFlags,
    pub misc: Misc,
    pub origin: Option<Origin>,
}

impl Series {
    pub fn new(width: Width, capacity: usize, flags: SeriesFlags) -> Self {
        let content = match width {
            Width::Byte => Content::Bytes(Vec::with_capacity(capacity)),
            Width::Wide => Content::Wide(Vec::with_capacity(capacity)),
            Width::Cell => {
                let mut cells = Vec::with_capacity(capacity + 1);
                cells.push(Cell::end());
                Content::Cells(cells)
            }
        };
        Series {
            content,
            flags,
            misc: Misc::None,
            origin: None,
        }
    }

    /// Array pre-filled with cells (terminator appended)
    pub fn from_cells(cells: Vec<Cell>, flags: SeriesFlags) -> Self {
        let mut cells = cells;
        debug_assert!(cells.iter().all(|c| !c.is_end()), "END inside array data");
        cells.push(Cell::end());
        Series {
            content: Content::Cells(cells),
            flags,
            misc: Misc::None,
            origin: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, flags: SeriesFlags) -> Self {
        Series {
            content: Content::Bytes(bytes),
            flags,
            misc: Misc::None,
            origin: None,
        }
    }

    pub fn width(&self) -> Width {
        match self.content {
            Content::Bytes(_) => Width::Byte,
            Content::Wide(_) => Width::Wide,
            Content::Cells(_) => Width::Cell,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.content, Content::Cells(_))
    }

    /// Element count; arrays exclude their terminator
    pub fn len(&self) -> usize {
        match &self.content {
            Content::Bytes(b) => b.len(),
            Content::Wide(w) => w.len(),
            Content::Cells(c) => c.len() - 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match &self.content {
            Content::Bytes(b) => b.capacity(),
            Content::Wide(w) => w.capacity(),
            Content::Cells(c) => c.capacity().saturating_sub(1),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(SeriesFlags::LOCKED)
    }

    pub fn is_managed(&self) -> bool {
        self.flags.contains(SeriesFlags::MANAGED)
    }

    /// Cells of an array, terminator excluded
    pub fn cells(&self) -> &[Cell] {
        match &self.content {
            Content::Cells(c) => &c[..c.len() - 1],
            _ => &[],
        }
    }

    /// Mutable cells of an array, terminator excluded
    pub fn cells_mut(&mut self) -> &mut [Cell] {
        match &mut self.content {
            Content::Cells(c) => {
                let len = c.len() - 1;
                &mut c[..len]
            }
            _ => &mut [],
        }
    }

    /// Cell at `index`; the terminator when `index >= len`
    pub fn at(&self, index: usize) -> &Cell {
        match &self.content {
            Content::Cells(c) => {
                let last = c.len() - 1;
                &c[index.min(last)]
            }
            _ => panic!("cell access on a {:?}-width series", self.width()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.content {
            Content::Bytes(b) => b,
            _ => &[],
        }
    }

    pub fn bytes_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.content {
            Content::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Append a cell before the terminator
    pub fn push(&mut self, cell: Cell) {
        debug_assert!(!cell.is_end(), "END appended into array data");
        if let Content::Cells(c) = &mut self.content {
            let end = c.len() - 1;
            c.insert(end, cell);
        }
    }

    /// Insert cells at `index` (clamped to the length)
    pub fn insert_cells(&mut self, index: usize, cells: impl IntoIterator<Item = Cell>) {
        if let Content::Cells(c) = &mut self.content {
            let at = index.min(c.len() - 1);
            c.splice(at..at, cells);
        }
    }

    /// Open a gap of `delta` trash cells (or zero units) at `index`
    pub fn expand_at(&mut self, index: usize, delta: usize) {
        match &mut self.content {
            Content::Bytes(b) => {
                let at = index.min(b.len());
                b.splice(at..at, std::iter::repeat_n(0u8, delta));
            }
            Content::Wide(w) => {
                let at = index.min(w.len());
                w.splice(at..at, std::iter::repeat_n(0u16, delta));
            }
            Content::Cells(c) => {
                let at = index.min(c.len() - 1);
                c.splice(at..at, std::iter::repeat_n(Cell::trash(), delta));
            }
        }
    }

    /// Remove up to `count` elements starting at `index`
    ///
    /// Returns how many were removed. The terminator is never removed.
    pub fn remove_at(&mut self, index: usize, count: usize) -> usize {
        let len = self.len();
        if index >= len {
            return 0;
        }
        let count = count.min(len - index);
        match &mut self.content {
            Content::Bytes(b) => {
                b.drain(index..index + count);
            }
            Content::Wide(w) => {
                w.drain(index..index + count);
            }
            Content::Cells(c) => {
                c.drain(index..index + count);
            }
        }
        count
    }

    /// Drop elements past `len`, keeping the terminator
    pub fn truncate(&mut self, len: usize) {
        match &mut self.content {
            Content::Bytes(b) => b.truncate(len),
            Content::Wide(w) => w.truncate(len),
            Content::Cells(c) => {
                if len < c.len() - 1 {
                    c.truncate(len);
                    c.push(Cell::end());
                }
            }
        }
    }

    /// True when an array still ends in exactly one END cell
    pub fn terminator_ok(&self) -> bool {
        match &self.content {
            Content::Cells(c) => {
                c.last().is_some_and(|last| last.is_end())
                    && c[..c.len() - 1].iter().all(|cell| !cell.is_end())
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_array_is_terminated() {
        let series = Series::new(Width::Cell, 4, SeriesFlags::NONE);
        assert_eq!(series.len(), 0);
        assert!(series.at(0).is_end());
        assert!(series.terminator_ok());
    }

    #[test]
    fn test_push_keeps_terminator() {
        let mut series = Series::new(Width::Cell, 0, SeriesFlags::NONE);
        series.push(Cell::integer(1));
        series.push(Cell::integer(2));
        assert_eq!(series.len(), 2);
        assert_eq!(series.at(1).as_integer(), Some(2));
        assert!(series.at(2).is_end());
        assert!(series.at(99).is_end());
        assert!(series.terminator_ok());
    }

    #[test]
    fn test_expand_and_remove() {
        let mut series = Series::from_cells(vec![Cell::integer(1), Cell::integer(4)], SeriesFlags::NONE);
        series.expand_at(1, 2);
        assert_eq!(series.len(), 4);
        assert_eq!(series.at(1).kind(), crate::kind::Kind::Trash);
        assert_eq!(series.remove_at(1, 2), 2);
        assert_eq!(series.len(), 2);
        assert_eq!(series.remove_at(1, 10), 1);
        assert_eq!(series.len(), 1);
        assert_eq!(series.remove_at(5, 1), 0);
        assert!(series.terminator_ok());
    }

    #[test]
    fn test_byte_series() {
        let mut series = Series::from_bytes(b"abc".to_vec(), SeriesFlags::NONE);
        assert_eq!(series.width(), Width::Byte);
        series.expand_at(1, 1);
        assert_eq!(series.bytes(), b"a\0bc");
        series.truncate(2);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_flags() {
        let mut flags = SeriesFlags::NONE;
        flags.insert(SeriesFlags::MANAGED);
        assert!(flags.contains(SeriesFlags::MANAGED));
        assert!(!flags.contains(SeriesFlags::LOCKED));
        flags.remove(SeriesFlags::MANAGED);
        assert_eq!(flags, SeriesFlags::NONE);
    }
}
