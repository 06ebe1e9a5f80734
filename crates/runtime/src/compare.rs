//! Value comparison
//!
//! Every pair of values has a position in one total order used by `find`:
//! different kinds order by kind (END first), numbers coerce to the wider
//! type, strings and words compare case-insensitively unless `strict`.
//! The ordering natives accept only pairs that have a meaningful order and
//! fail with *invalid-compare* otherwise.

use crate::error::Fail;
use crate::interp::Interp;
use reb_core::{Cell, Kind, Payload};
use std::cmp::Ordering;

fn family(kind: Kind) -> u8 {
    match kind {
        k if k.is_number() => 1,
        k if k.is_string() => 2,
        k if k.is_word() => 3,
        _ => 0,
    }
}

impl Interp {
    /// Position of `a` relative to `b` in the total order
    pub fn compare_total(&self, a: &Cell, b: &Cell, strict: bool) -> Ordering {
        let (ka, kb) = (a.kind(), b.kind());
        let same_family = !strict && family(ka) != 0 && family(ka) == family(kb);
        if ka != kb && !same_family {
            return ka.cmp(&kb);
        }

        match (a.payload(), b.payload()) {
            (Payload::Integer(x), Payload::Integer(y)) => x.cmp(y),
            _ if ka.is_number() => {
                let (x, y) = (a.as_decimal().unwrap_or(0.0), b.as_decimal().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (Payload::Logic(x), Payload::Logic(y)) => x.cmp(y),
            (Payload::Char(x), Payload::Char(y)) => {
                if strict {
                    x.cmp(y)
                } else {
                    fold(*x).cmp(&fold(*y))
                }
            }
            (Payload::Pair(ax, ay), Payload::Pair(bx, by)) => ay.total_cmp(by).then(ax.total_cmp(bx)),
            (Payload::Tuple { bytes: x, len: lx }, Payload::Tuple { bytes: y, len: ly }) => {
                x[..*lx as usize].cmp(&y[..*ly as usize])
            }
            (Payload::Time(x), Payload::Time(y)) => x.cmp(y),
            (
                Payload::Date { year, month, day },
                Payload::Date {
                    year: y2,
                    month: m2,
                    day: d2,
                },
            ) => (year, month, day).cmp(&(y2, m2, d2)),
            (Payload::Word { symbol: x, .. }, Payload::Word { symbol: y, .. }) => {
                let (x, y) = (self.symbols.name(*x), self.symbols.name(*y));
                if strict {
                    x.cmp(y)
                } else {
                    x.to_lowercase().cmp(&y.to_lowercase())
                }
            }
            (Payload::Series { .. }, Payload::Series { .. }) if ka.is_array() => self.compare_arrays(a, b, strict),
            (Payload::Series { .. }, Payload::Series { .. }) => {
                let (x, y) = (self.string_of(a), self.string_of(b));
                if strict {
                    x.cmp(&y)
                } else {
                    x.to_lowercase().cmp(&y.to_lowercase())
                }
            }
            (Payload::Context(x), Payload::Context(y)) => x.0.index().cmp(&y.0.index()),
            (Payload::Function { func: x, .. }, Payload::Function { func: y, .. }) => {
                x.0.index().cmp(&y.0.index())
            }
            (Payload::Datatype(x), Payload::Datatype(y)) => x.cmp(y),
            (Payload::Typeset(x), Payload::Typeset(y)) => x.bits().cmp(&y.bits()),
            (Payload::Handle(x), Payload::Handle(y)) => x.cmp(y),
            _ => Ordering::Equal,
        }
    }

    fn compare_arrays(&self, a: &Cell, b: &Cell, strict: bool) -> Ordering {
        let (Some((sa, ia)), Some((sb, ib))) = (a.array_at(), b.array_at()) else {
            return Ordering::Equal;
        };
        if sa == sb && ia == ib {
            return Ordering::Equal;
        }
        let xs = self.heap.cells(sa).get(ia..).unwrap_or(&[]);
        let ys = self.heap.cells(sb).get(ib..).unwrap_or(&[]);
        for (x, y) in xs.iter().zip(ys) {
            let order = self.compare_total(x, y, strict);
            if order != Ordering::Equal {
                return order;
            }
        }
        xs.len().cmp(&ys.len())
    }

    /// `=` (or `==` when strict)
    pub fn equal_values(&self, a: &Cell, b: &Cell, strict: bool) -> bool {
        if let (Some(x), Some(y)) = (a.context_id(), b.context_id()) {
            return x == y;
        }
        self.compare_total(a, b, strict) == Ordering::Equal
    }

    /// Identity: the same series position, context or function
    pub fn same_values(&self, a: &Cell, b: &Cell) -> bool {
        match (a.payload(), b.payload()) {
            (Payload::Series { series: x, index: i }, Payload::Series { series: y, index: j }) => {
                a.kind() == b.kind() && x == y && i == j
            }
            (Payload::Function { func: x, .. }, Payload::Function { func: y, .. }) => x == y,
            _ => self.equal_values(a, b, true),
        }
    }

    /// Ordering for `<` and friends
    pub fn compare_values(&mut self, a: &Cell, b: &Cell, strict: bool) -> Result<Ordering, Fail> {
        let (ka, kb) = (a.kind(), b.kind());
        let orderable = |k: Kind| {
            family(k) != 0
                || matches!(
                    k,
                    Kind::Char | Kind::Pair | Kind::Tuple | Kind::Time | Kind::Date | Kind::Logic
                )
                || k.is_array()
        };
        let comparable = orderable(ka)
            && orderable(kb)
            && (ka == kb || (family(ka) != 0 && family(ka) == family(kb)));
        if !comparable {
            return Err(self.script_error("invalid-compare", &[Cell::datatype(ka), Cell::datatype(kb)]));
        }
        Ok(self.compare_total(a, b, strict))
    }
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[test]
    fn test_numbers_coerce() {
        let interp = Interp::new(RuntimeConfig::default());
        assert!(interp.equal_values(&Cell::integer(1), &Cell::decimal(1.0), false));
        assert!(!interp.equal_values(&Cell::integer(1), &Cell::decimal(1.0), true));
        assert_eq!(
            interp.compare_total(&Cell::integer(2), &Cell::decimal(1.5), false),
            Ordering::Greater
        );
    }

    #[test]
    fn test_strings_and_words_fold_case() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let a = interp.make_string("Hello");
        let b = interp.make_string("hello");
        assert!(interp.equal_values(&a, &b, false));
        assert!(!interp.equal_values(&a, &b, true));
        let w1 = interp.word_cell(Kind::Word, "Foo");
        let w2 = interp.word_cell(Kind::SetWord, "foo");
        assert!(interp.equal_values(&w1, &w2, false));
        assert!(!interp.equal_values(&w1, &w2, true));
    }

    #[test]
    fn test_end_sorts_first() {
        let interp = Interp::new(RuntimeConfig::default());
        assert_eq!(interp.compare_total(&Cell::end(), &Cell::blank(), false), Ordering::Less);
        assert_eq!(interp.compare_total(&Cell::integer(-99), &Cell::end(), false), Ordering::Greater);
    }

    #[test]
    fn test_blocks_compare_elementwise() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let a = interp.do_string("[1 2 3]", "t").unwrap();
        let b = interp.do_string("[1 2 4]", "t").unwrap();
        let c = interp.do_string("[1 2]", "t").unwrap();
        assert_eq!(interp.compare_values(&a, &b, false).unwrap(), Ordering::Less);
        assert_eq!(interp.compare_values(&c, &a, false).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_unordered_kinds_fail() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let s = interp.make_string("a");
        let err = interp.compare_values(&Cell::integer(1), &s, false).unwrap_err();
        assert_eq!(interp.error_id(err.0).as_deref(), Some("invalid-compare"));
    }
}
