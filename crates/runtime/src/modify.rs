//! Series modification: append, insert, change
//!
//! The source is copied out before the destination is touched, so a series
//! may be modified with a slice of itself.

use crate::error::Fail;
use crate::interp::Interp;
use reb_core::{Cell, SeriesId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyAction {
    Append,
    Insert,
    Change,
}

/// Knobs shared by the three actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifyOptions {
    /// Treat an array source as one element
    pub only: bool,
    /// Use at most this many source elements
    pub part: Option<usize>,
    /// Repeat the source this many times
    pub dup: usize,
}

impl Default for ModifyOptions {
    fn default() -> Self {
        ModifyOptions {
            only: false,
            part: None,
            dup: 1,
        }
    }
}

impl Interp {
    /// Modify an array at `index`; returns the index just past the new
    /// elements (0 for append)
    pub fn modify_array(
        &mut self,
        action: ModifyAction,
        dst: SeriesId,
        index: usize,
        src: &Cell,
        options: ModifyOptions,
    ) -> Result<usize, Fail> {
        let mut items: Vec<Cell> = match src.array_at() {
            Some((series, at)) if !options.only => self
                .heap
                .cells(series)
                .iter()
                .skip(at)
                .map(Cell::stored)
                .collect(),
            _ => vec![src.stored()],
        };
        if let Some(part) = options.part {
            items.truncate(part);
        }
        let mut cells = Vec::with_capacity(items.len() * options.dup);
        for _ in 0..options.dup {
            cells.extend(items.iter().cloned());
        }
        let count = cells.len();
        let len = self.heap.len(dst);

        let result = match action {
            ModifyAction::Append => self.heap.insert_cells(dst, len, cells).map(|_| 0),
            ModifyAction::Insert => {
                let at = index.min(len);
                self.heap.insert_cells(dst, at, cells).map(|_| at + count)
            }
            ModifyAction::Change => {
                let at = index.min(len);
                let replaced = count.min(len - at);
                self.heap
                    .remove_at(dst, at, replaced)
                    .and_then(|_| self.heap.insert_cells(dst, at, cells))
                    .map(|_| at + count)
            }
        };
        result.map_err(|e| self.core_failure(e))
    }

    /// Modify a string at character `index`; the source is formed to text
    pub fn modify_string(
        &mut self,
        action: ModifyAction,
        dst: SeriesId,
        index: usize,
        src: &Cell,
        options: ModifyOptions,
    ) -> Result<usize, Fail> {
        if self.heap.get(dst).is_locked() {
            return Err(self.script_error("protected-series", &[]));
        }
        let piece: Vec<char> = match src.array_at() {
            Some((series, at)) if !options.only => self
                .heap
                .cells(series)
                .iter()
                .skip(at)
                .map(|c| self.form(c))
                .collect::<String>()
                .chars()
                .collect(),
            _ => self.form(src).chars().collect(),
        };
        let piece: Vec<char> = match options.part {
            Some(part) => piece.into_iter().take(part).collect(),
            None => piece,
        };
        let mut insert = Vec::with_capacity(piece.len() * options.dup);
        for _ in 0..options.dup {
            insert.extend(piece.iter().copied());
        }
        let count = insert.len();

        let mut chars: Vec<char> = String::from_utf8_lossy(self.heap.get(dst).bytes()).chars().collect();
        let len = chars.len();
        let at = match action {
            ModifyAction::Append => len,
            _ => index.min(len),
        };
        if action == ModifyAction::Change {
            chars.drain(at..(at + count).min(len));
        }
        chars.splice(at..at, insert);

        match self.heap.get_mut(dst).bytes_mut() {
            Some(bytes) => *bytes = chars.into_iter().collect::<String>().into_bytes(),
            None => return Err(self.script_error("invalid-arg", &[src.clone()])),
        }
        Ok(if action == ModifyAction::Append { 0 } else { at + count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn ints(interp: &Interp, series: SeriesId) -> Vec<i64> {
        interp
            .heap
            .cells(series)
            .iter()
            .filter_map(|c| c.as_integer())
            .collect()
    }

    #[test]
    fn test_append_splices_unless_only() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let dst = interp.heap.make_managed_array(vec![Cell::integer(1)]);
        let src = interp.heap.make_managed_array(vec![Cell::integer(2), Cell::integer(3)]);
        let at = interp
            .modify_array(ModifyAction::Append, dst, 0, &Cell::block(src), ModifyOptions::default())
            .unwrap();
        assert_eq!(at, 0);
        assert_eq!(ints(&interp, dst), vec![1, 2, 3]);

        let only = ModifyOptions {
            only: true,
            ..ModifyOptions::default()
        };
        interp
            .modify_array(ModifyAction::Append, dst, 0, &Cell::block(src), only)
            .unwrap();
        assert_eq!(interp.heap.len(dst), 4);
    }

    #[test]
    fn test_insert_part_and_dup() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let dst = interp.heap.make_managed_array(vec![Cell::integer(9)]);
        let src = interp
            .heap
            .make_managed_array(vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)]);
        let options = ModifyOptions {
            only: false,
            part: Some(2),
            dup: 2,
        };
        let at = interp
            .modify_array(ModifyAction::Insert, dst, 0, &Cell::block(src), options)
            .unwrap();
        assert_eq!(at, 4);
        assert_eq!(ints(&interp, dst), vec![1, 2, 1, 2, 9]);

        let none = ModifyOptions {
            dup: 0,
            ..ModifyOptions::default()
        };
        let at = interp
            .modify_array(ModifyAction::Insert, dst, 1, &Cell::integer(5), none)
            .unwrap();
        assert_eq!(at, 1);
        assert_eq!(interp.heap.len(dst), 5);
    }

    #[test]
    fn test_change_overwrites_and_extends() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let dst = interp
            .heap
            .make_managed_array(vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)]);
        let src = interp.heap.make_managed_array(vec![Cell::integer(7), Cell::integer(8)]);
        let at = interp
            .modify_array(ModifyAction::Change, dst, 2, &Cell::block(src), ModifyOptions::default())
            .unwrap();
        assert_eq!(at, 4);
        assert_eq!(ints(&interp, dst), vec![1, 2, 7, 8]);
    }

    #[test]
    fn test_self_insert_copies_first() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let dst = interp.heap.make_managed_array(vec![Cell::integer(1), Cell::integer(2)]);
        interp
            .modify_array(ModifyAction::Insert, dst, 1, &Cell::block(dst), ModifyOptions::default())
            .unwrap();
        assert_eq!(ints(&interp, dst), vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_locked_destination() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let dst = interp.heap.make_managed_array(vec![]);
        interp.heap.lock(dst);
        let err = interp
            .modify_array(ModifyAction::Append, dst, 0, &Cell::integer(1), ModifyOptions::default())
            .unwrap_err();
        assert_eq!(interp.error_id(err.0).as_deref(), Some("protected-series"));
    }

    #[test]
    fn test_string_modify() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let dst = interp.make_string("abc");
        let (series, _) = dst.series_at().unwrap();
        let piece = interp.make_string("XY");
        interp
            .modify_string(ModifyAction::Insert, series, 1, &piece, ModifyOptions::default())
            .unwrap();
        assert_eq!(interp.string_of(&dst), "aXYbc");
        interp
            .modify_string(ModifyAction::Change, series, 0, &Cell::char('z'), ModifyOptions::default())
            .unwrap();
        assert_eq!(interp.string_of(&dst), "zXYbc");
    }
}
