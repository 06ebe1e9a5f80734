//! Series pool
//!
//! The `Heap` owns every series. Ids are slot indices; freed slots are
//! recycled, so a stale id can alias a newer series. Word bindings only hold
//! ids and are validated at resolution time, which is enough because the
//! series that words bind to (varlists, paramlists) are managed and never
//! freed explicitly.
//!
//! # Ownership
//!
//! ```text
//!   make()  ──► unmanaged ──manage()──► managed (collector owned)
//!                   │
//!                   └──free()──► slot recycled
//! ```
//!
//! Unmanaged series are tracked on the *manuals* stack so a trap can free
//! everything allocated inside it when it unwinds. Guards keep a series
//! reachable across a sub-evaluation and are strictly LIFO.
//!
//! # Statistics
//!
//! `HeapStats` keeps running counters (made, freed, live, peak) that the
//! runtime's `stats` native and exit report read.

use crate::cell::{Cell, CellFlags};
use crate::error::{CoreError, CoreResult};
use crate::kind::Kind;
use crate::series::{Misc, Series, SeriesFlags, SeriesId, Width};

/// Address of one variable: a slot in a varlist or a frame argument array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarLoc {
    pub series: SeriesId,
    pub index: usize,
}

/// What a series id currently refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Freed,
    /// Never allocated by this heap
    Unknown,
}

/// Running allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub made: u64,
    pub freed: u64,
    pub managed: u64,
    pub live: usize,
    pub peak_live: usize,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Series>>,
    free_slots: Vec<u32>,
    manuals: Vec<SeriesId>,
    guards: Vec<SeriesId>,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    fn insert(&mut self, series: Series) -> SeriesId {
        let managed = series.is_managed();
        let id = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(series);
                SeriesId(slot)
            }
            None => {
                self.slots.push(Some(series));
                SeriesId((self.slots.len() - 1) as u32)
            }
        };
        if managed {
            self.stats.managed += 1;
        } else {
            self.manuals.push(id);
        }
        self.stats.made += 1;
        self.stats.live += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.stats.live);
        id
    }

    /// Allocate an empty series
    pub fn make(&mut self, width: Width, capacity: usize, flags: SeriesFlags) -> SeriesId {
        self.insert(Series::new(width, capacity, flags))
    }

    /// Allocate an unmanaged array holding `cells`
    pub fn make_array(&mut self, cells: Vec<Cell>) -> SeriesId {
        self.insert(Series::from_cells(cells, SeriesFlags::NONE))
    }

    /// Allocate an array already owned by the collector
    pub fn make_managed_array(&mut self, cells: Vec<Cell>) -> SeriesId {
        self.insert(Series::from_cells(cells, SeriesFlags::MANAGED))
    }

    pub fn make_bytes(&mut self, bytes: Vec<u8>) -> SeriesId {
        self.insert(Series::from_bytes(bytes, SeriesFlags::MANAGED))
    }

    pub(crate) fn make_series(&mut self, series: Series) -> SeriesId {
        self.insert(series)
    }

    pub fn liveness(&self, id: SeriesId) -> Liveness {
        match self.slots.get(id.index()) {
            Some(Some(_)) => Liveness::Live,
            Some(None) => Liveness::Freed,
            None => Liveness::Unknown,
        }
    }

    pub fn is_live(&self, id: SeriesId) -> bool {
        self.liveness(id) == Liveness::Live
    }

    pub fn get(&self, id: SeriesId) -> &Series {
        match self.slots.get(id.index()) {
            Some(Some(series)) => series,
            _ => panic!("access to {:?} {id}", self.liveness(id)),
        }
    }

    pub fn get_mut(&mut self, id: SeriesId) -> &mut Series {
        let liveness = self.liveness(id);
        match self.slots.get_mut(id.index()) {
            Some(Some(series)) => series,
            _ => panic!("access to {liveness:?} {id}"),
        }
    }

    /// Release an unmanaged series
    ///
    /// Managed series belong to the collector; freeing one is an invariant
    /// violation.
    pub fn free(&mut self, id: SeriesId) {
        assert!(
            !self.get(id).is_managed(),
            "explicit free of managed {id}"
        );
        if let Some(pos) = self.manuals.iter().rposition(|m| *m == id) {
            self.manuals.remove(pos);
        }
        self.slots[id.index()] = None;
        self.free_slots.push(id.0);
        self.stats.freed += 1;
        self.stats.live -= 1;
    }

    /// Hand a series over to the collector
    pub fn manage(&mut self, id: SeriesId) {
        let series = self.get_mut(id);
        if series.is_managed() {
            return;
        }
        series.flags.insert(SeriesFlags::MANAGED);
        if let Some(pos) = self.manuals.iter().rposition(|m| *m == id) {
            self.manuals.remove(pos);
        }
        self.stats.managed += 1;
    }

    /// Number of outstanding unmanaged series
    pub fn manuals_len(&self) -> usize {
        self.manuals.len()
    }

    /// Free every unmanaged series allocated after the manuals stack had `depth` entries
    pub fn free_manuals_above(&mut self, depth: usize) {
        while self.manuals.len() > depth {
            if let Some(id) = self.manuals.last().copied() {
                self.free(id);
            }
        }
    }

    pub fn guard(&mut self, id: SeriesId) {
        self.guards.push(id);
    }

    /// Pop the most recent guard, which must be `id`
    pub fn drop_guard(&mut self, id: SeriesId) {
        match self.guards.pop() {
            Some(top) if top == id => {}
            other => panic!("guard dropped out of order: expected {id}, top was {other:?}"),
        }
    }

    pub fn guards_len(&self) -> usize {
        self.guards.len()
    }

    pub fn truncate_guards(&mut self, depth: usize) {
        self.guards.truncate(depth);
    }

    pub fn is_guarded(&self, id: SeriesId) -> bool {
        self.guards.contains(&id)
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub fn len(&self, id: SeriesId) -> usize {
        self.get(id).len()
    }

    /// Array cell at `index`; the terminator past the end
    pub fn at(&self, id: SeriesId, index: usize) -> &Cell {
        self.get(id).at(index)
    }

    pub fn cells(&self, id: SeriesId) -> &[Cell] {
        self.get(id).cells()
    }

    pub fn cell(&self, loc: VarLoc) -> &Cell {
        self.get(loc.series).at(loc.index)
    }

    pub fn cell_mut(&mut self, loc: VarLoc) -> &mut Cell {
        let series = self.get_mut(loc.series);
        let len = series.len();
        match series.cells_mut().get_mut(loc.index) {
            Some(cell) => cell,
            None => panic!("variable {} past end of {} (len {len})", loc.index, loc.series),
        }
    }

    fn writable(&mut self, id: SeriesId) -> CoreResult<&mut Series> {
        let series = self.get_mut(id);
        if series.is_locked() {
            return Err(CoreError::LockedSeries(id));
        }
        Ok(series)
    }

    /// Append a cell, keeping the terminator last
    pub fn append_cell(&mut self, id: SeriesId, cell: Cell) -> CoreResult<()> {
        let series = self.writable(id)?;
        if !series.is_array() {
            return Err(CoreError::NotArray(id));
        }
        series.push(cell);
        Ok(())
    }

    pub fn insert_cells(&mut self, id: SeriesId, index: usize, cells: Vec<Cell>) -> CoreResult<()> {
        let series = self.writable(id)?;
        if !series.is_array() {
            return Err(CoreError::NotArray(id));
        }
        series.insert_cells(index, cells);
        Ok(())
    }

    pub fn expand_at(&mut self, id: SeriesId, index: usize, delta: usize) -> CoreResult<()> {
        let series = self.writable(id)?;
        let len = series.len();
        if index > len {
            return Err(CoreError::OutOfRange { index, len });
        }
        series.expand_at(index, delta);
        Ok(())
    }

    pub fn remove_at(&mut self, id: SeriesId, index: usize, count: usize) -> CoreResult<usize> {
        Ok(self.writable(id)?.remove_at(index, count))
    }

    /// Overwrite an array element in place
    pub fn set_cell(&mut self, id: SeriesId, index: usize, cell: Cell) -> CoreResult<()> {
        let series = self.writable(id)?;
        let len = series.len();
        match series.cells_mut().get_mut(index) {
            Some(slot) => {
                *slot = cell;
                Ok(())
            }
            None => Err(CoreError::OutOfRange { index, len }),
        }
    }

    pub fn truncate(&mut self, id: SeriesId, len: usize) -> CoreResult<()> {
        self.writable(id)?.truncate(len);
        Ok(())
    }

    /// Mark a series read-only (sticky)
    pub fn lock(&mut self, id: SeriesId) {
        self.get_mut(id).flags.insert(SeriesFlags::LOCKED);
    }

    /// Lock an array and every array reachable from it
    pub fn lock_deep(&mut self, id: SeriesId) {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if self.get(next).is_locked() {
                continue;
            }
            self.lock(next);
            for cell in self.get(next).cells() {
                if let Some((nested, _)) = cell.array_at() {
                    pending.push(nested);
                }
            }
        }
    }

    /// Unmanaged copy of `id[index..]`
    pub fn copy_array_shallow(&mut self, id: SeriesId, index: usize) -> SeriesId {
        let source = self.get(id);
        let cells = source.cells().iter().skip(index).cloned().collect();
        let origin = source.origin;
        let copy = self.make_array(cells);
        self.get_mut(copy).origin = origin;
        copy
    }

    /// Managed deep copy of `id[index..]`
    ///
    /// Nested arrays are copied too and every copy is handed to the
    /// collector. Cycles are copied once and re-linked.
    pub fn copy_array_deep_managed(&mut self, id: SeriesId, index: usize) -> SeriesId {
        let mut copied = std::collections::HashMap::new();
        self.copy_deep_inner(id, index, &mut copied)
    }

    fn copy_deep_inner(
        &mut self,
        id: SeriesId,
        index: usize,
        copied: &mut std::collections::HashMap<SeriesId, SeriesId>,
    ) -> SeriesId {
        let source = self.get(id);
        let origin = source.origin;
        let cells: Vec<Cell> = source.cells().iter().skip(index).cloned().collect();
        let copy = self.make_managed_array(Vec::with_capacity(cells.len()));
        self.get_mut(copy).origin = origin;
        copied.insert(id, copy);

        let mut out = Vec::with_capacity(cells.len());
        for mut cell in cells {
            if let Some((nested, at)) = cell.array_at() {
                let nested_copy = match copied.get(&nested) {
                    Some(existing) => *existing,
                    None => self.copy_deep_inner(nested, 0, copied),
                };
                let mut replaced = Cell::series(cell.kind(), nested_copy, at);
                if cell.has_flag(CellFlags::NEWLINE_BEFORE) {
                    replaced.set_flag(CellFlags::NEWLINE_BEFORE);
                }
                cell = replaced;
            }
            out.push(cell);
        }
        self.get_mut(copy).insert_cells(0, out);
        copy
    }

    /// True when `id` is an array whose elements all satisfy `pred`
    pub fn all_cells(&self, id: SeriesId, pred: impl Fn(&Cell) -> bool) -> bool {
        self.get(id).cells().iter().all(pred)
    }

    pub fn misc(&self, id: SeriesId) -> &Misc {
        &self.get(id).misc
    }

    /// Ids of all live series, for leak checks and diagnostics
    pub fn live_ids(&self) -> impl Iterator<Item = SeriesId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| SeriesId(i as u32))
    }

    /// Kind-appropriate array cell for a fresh array id
    pub fn array_cell(kind: Kind, id: SeriesId) -> Cell {
        Cell::series(kind, id, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_tracks_manuals() {
        let mut heap = Heap::new();
        let a = heap.make_array(vec![Cell::integer(1)]);
        assert_eq!(heap.manuals_len(), 1);
        heap.manage(a);
        assert_eq!(heap.manuals_len(), 0);
        assert!(heap.get(a).is_managed());
    }

    #[test]
    fn test_free_recycles_slot() {
        let mut heap = Heap::new();
        let a = heap.make_array(vec![]);
        heap.free(a);
        assert_eq!(heap.liveness(a), Liveness::Freed);
        let b = heap.make_array(vec![]);
        assert_eq!(a, b);
        assert_eq!(heap.stats().made, 2);
        assert_eq!(heap.stats().freed, 1);
    }

    #[test]
    #[should_panic(expected = "explicit free of managed")]
    fn test_free_managed_panics() {
        let mut heap = Heap::new();
        let a = heap.make_managed_array(vec![]);
        heap.free(a);
    }

    #[test]
    fn test_free_manuals_above() {
        let mut heap = Heap::new();
        let keep = heap.make_array(vec![]);
        let depth = heap.manuals_len();
        heap.make_array(vec![]);
        heap.make_array(vec![]);
        heap.free_manuals_above(depth);
        assert_eq!(heap.manuals_len(), 1);
        assert!(heap.is_live(keep));
    }

    #[test]
    fn test_guards_lifo() {
        let mut heap = Heap::new();
        let a = heap.make_managed_array(vec![]);
        let b = heap.make_managed_array(vec![]);
        heap.guard(a);
        heap.guard(b);
        heap.drop_guard(b);
        heap.drop_guard(a);
        assert_eq!(heap.guards_len(), 0);
    }

    #[test]
    #[should_panic(expected = "guard dropped out of order")]
    fn test_guards_out_of_order_panics() {
        let mut heap = Heap::new();
        let a = heap.make_managed_array(vec![]);
        let b = heap.make_managed_array(vec![]);
        heap.guard(a);
        heap.guard(b);
        heap.drop_guard(a);
    }

    #[test]
    fn test_locked_rejects_append() {
        let mut heap = Heap::new();
        let a = heap.make_managed_array(vec![]);
        heap.lock(a);
        assert_eq!(
            heap.append_cell(a, Cell::blank()),
            Err(CoreError::LockedSeries(a))
        );
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut heap = Heap::new();
        let inner = heap.make_managed_array(vec![Cell::integer(2)]);
        let outer = heap.make_managed_array(vec![Cell::integer(1), Cell::block(inner)]);
        let copy = heap.copy_array_deep_managed(outer, 0);
        let (inner_copy, _) = heap.at(copy, 1).array_at().unwrap();
        assert_ne!(inner_copy, inner);
        heap.append_cell(inner_copy, Cell::integer(3)).unwrap();
        assert_eq!(heap.len(inner), 1);
        assert_eq!(heap.len(inner_copy), 2);
        assert!(heap.get(copy).terminator_ok());
    }

    #[test]
    fn test_deep_copy_of_cycle_terminates() {
        let mut heap = Heap::new();
        let a = heap.make_managed_array(vec![]);
        heap.append_cell(a, Cell::block(a)).unwrap();
        let copy = heap.copy_array_deep_managed(a, 0);
        let (nested, _) = heap.at(copy, 0).array_at().unwrap();
        assert_eq!(nested, copy);
    }
}
