//! Path evaluation
//!
//! A path's head is looked up like a word; every following element is a
//! selector applied to the value reached so far. Selectors are taken
//! literally except get-words (fetched) and groups (evaluated).
//!
//! | Value | Selector | Result |
//! |-------|----------|--------|
//! | any context | word | the field; unknown → *bad-path-select* |
//! | array | integer | 1-based pick from the index, blank when out of range |
//! | array | word | the value after a matching word, blank when absent |
//! | string | integer | char, blank when out of range |
//! | pair | `x` / `y` | coordinate |
//! | tuple | integer | byte |
//!
//! When an evaluated (plain) path reaches a function, the remaining
//! elements name its refinements and the function is invoked.

use crate::control::Flow;
use crate::error::Fail;
use crate::eval::Feed;
use crate::frame::Specifier;
use crate::interp::Interp;
use reb_core::{Cell, Kind, Payload, Symbol};

enum Walk {
    Value(Cell),
    /// A selector group threw; the output holds the label
    Thrown,
}

impl Interp {
    /// `a/b/c`: select, invoking a function when one is reached
    pub(crate) fn eval_path(&mut self, path: &Cell, feed: &mut Feed, out: &mut Cell) -> Result<Flow, Fail> {
        let elements = self.path_elements(path)?;
        let specifier = feed.specifier;

        let head = &elements[0];
        let mut value = self.path_head(head, specifier)?;
        let mut label = head.symbol();

        let mut at = 1;
        loop {
            if value.kind() == Kind::Function {
                let refinements = self.refinement_symbols(path, &elements[at..])?;
                return self.call_function(&value, label, feed, out, None, &refinements);
            }
            let Some(element) = elements.get(at) else {
                break;
            };
            let selector = match self.path_selector(element, specifier, out)? {
                Walk::Value(selector) => selector,
                Walk::Thrown => return Ok(Flow::Thrown),
            };
            value = self.select(&value, &selector, path)?;
            label = selector.symbol().or(label);
            at += 1;
        }

        if value.is_void() {
            return Err(self.script_error("no-value", &[path.clone()]));
        }
        *out = value;
        Ok(Flow::Done)
    }

    /// `:a/b/c`: select without invoking
    pub(crate) fn eval_get_path(&mut self, path: &Cell, specifier: Specifier, out: &mut Cell) -> Result<Flow, Fail> {
        let elements = self.path_elements(path)?;
        let mut value = self.path_head(&elements[0], specifier)?;
        for element in &elements[1..] {
            let selector = match self.path_selector(element, specifier, out)? {
                Walk::Value(selector) => selector,
                Walk::Thrown => return Ok(Flow::Thrown),
            };
            value = self.select(&value, &selector, path)?;
        }
        *out = value;
        Ok(Flow::Done)
    }

    /// `a/b/c: value`: select up to the last element, evaluate, then store
    pub(crate) fn eval_set_path(&mut self, path: &Cell, feed: &mut Feed, out: &mut Cell) -> Result<Flow, Fail> {
        let elements = self.path_elements(path)?;
        if elements.len() < 2 {
            return Err(self.script_error("bad-path-set", &[path.clone(), Cell::blank()]));
        }
        let specifier = feed.specifier;
        let mut container = self.path_head(&elements[0], specifier)?;
        let last = elements.len() - 1;
        for element in &elements[1..last] {
            let selector = match self.path_selector(element, specifier, out)? {
                Walk::Value(selector) => selector,
                Walk::Thrown => return Ok(Flow::Thrown),
            };
            container = self.select(&container, &selector, path)?;
        }
        let selector = match self.path_selector(&elements[last], specifier, out)? {
            Walk::Value(selector) => selector,
            Walk::Thrown => return Ok(Flow::Thrown),
        };

        if feed.at_end(self) {
            return Err(self.script_error("need-value", &[path.clone()]));
        }
        if self.eval_step(feed, out, true)? == Flow::Thrown {
            return Ok(Flow::Thrown);
        }
        if out.is_void() {
            return Err(self.script_error("need-value", &[path.clone()]));
        }
        let value = out.stored();
        self.poke(&container, &selector, value, path)?;
        Ok(Flow::Done)
    }

    fn path_elements(&mut self, path: &Cell) -> Result<Vec<Cell>, Fail> {
        let Some((series, index)) = path.array_at() else {
            return Err(self.script_error("invalid-arg", &[path.clone()]));
        };
        let elements: Vec<Cell> = self.heap.cells(series).iter().skip(index).cloned().collect();
        if elements.is_empty() {
            return Err(self.script_error("bad-path-select", &[path.clone(), Cell::blank()]));
        }
        Ok(elements)
    }

    fn path_head(&mut self, head: &Cell, specifier: Specifier) -> Result<Cell, Fail> {
        match head.kind() {
            Kind::Word | Kind::GetWord => self.get_word_value(head, specifier),
            _ => Ok(head.stored()),
        }
    }

    fn path_selector(&mut self, element: &Cell, specifier: Specifier, out: &mut Cell) -> Result<Walk, Fail> {
        match element.kind() {
            Kind::GetWord => Ok(Walk::Value(self.get_word_value(element, specifier)?)),
            Kind::Group => {
                let Some((series, index)) = element.array_at() else {
                    unreachable!("group without an array payload");
                };
                let mut value = Cell::void();
                if self.do_array(series, index, specifier, &mut value)? == Flow::Thrown {
                    *out = value;
                    return Ok(Walk::Thrown);
                }
                Ok(Walk::Value(value))
            }
            _ => Ok(Walk::Value(element.stored())),
        }
    }

    fn refinement_symbols(&mut self, path: &Cell, rest: &[Cell]) -> Result<Vec<Symbol>, Fail> {
        let mut symbols = Vec::with_capacity(rest.len());
        for element in rest {
            match (element.kind(), element.symbol()) {
                (Kind::Word | Kind::Refinement, Some(sym)) => symbols.push(sym),
                _ => return Err(self.script_error("bad-path-select", &[path.clone(), element.clone()])),
            }
        }
        Ok(symbols)
    }

    /// Pick `selector` out of `value`
    pub(crate) fn select(&mut self, value: &Cell, selector: &Cell, path: &Cell) -> Result<Cell, Fail> {
        let kind = value.kind();

        if let Some(ctx) = value.context_id() {
            let Some(sym) = selector.symbol() else {
                return Err(self.script_error("bad-path-select", &[path.clone(), selector.clone()]));
            };
            if !self.heap.is_accessible(ctx) {
                return Err(self.script_error("no-relative", &[path.clone()]));
            }
            let index = self.heap.find_word(ctx, self.symbols.canon(sym), false);
            if index == 0 {
                return Err(self.script_error("bad-path-select", &[path.clone(), selector.clone()]));
            }
            return Ok(self.heap.var(ctx, index).clone());
        }

        if let Some((series, index)) = value.array_at() {
            if let Some(n) = selector.as_integer() {
                return Ok(match pick_index(index, n) {
                    Some(at) if at < self.heap.len(series) => self.heap.at(series, at).stored(),
                    _ => Cell::blank(),
                });
            }
            if let Some(sym) = selector.symbol() {
                let canon = self.symbols.canon(sym);
                let len = self.heap.len(series);
                for at in index..len {
                    let cell = self.heap.at(series, at);
                    if cell.kind().is_word()
                        && cell.symbol().map(|s| self.symbols.canon(s)) == Some(canon)
                    {
                        return Ok(if at + 1 < len {
                            self.heap.at(series, at + 1).stored()
                        } else {
                            Cell::blank()
                        });
                    }
                }
                return Ok(Cell::blank());
            }
        }

        if kind.is_string()
            && let Some(n) = selector.as_integer()
        {
            let text = self.string_of(value);
            return Ok(match pick_index(0, n).and_then(|at| text.chars().nth(at)) {
                Some(c) => Cell::char(c),
                None => Cell::blank(),
            });
        }

        match (value.payload(), selector.symbol(), selector.as_integer()) {
            (Payload::Pair(x, y), Some(sym), _) => match self.symbols.name(self.symbols.canon(sym)) {
                "x" => return Ok(number_cell(*x)),
                "y" => return Ok(number_cell(*y)),
                _ => {}
            },
            (Payload::Tuple { bytes, len }, _, Some(n)) => {
                return Ok(match pick_index(0, n) {
                    Some(at) if at < *len as usize => Cell::integer(bytes[at] as i64),
                    _ => Cell::blank(),
                });
            }
            _ => {}
        }

        Err(self.script_error("bad-path-select", &[path.clone(), selector.clone()]))
    }

    /// Store `new` under `selector` in `container`
    fn poke(&mut self, container: &Cell, selector: &Cell, new: Cell, path: &Cell) -> Result<(), Fail> {
        if let Some(ctx) = container.context_id() {
            let Some(sym) = selector.symbol() else {
                return Err(self.script_error("bad-path-set", &[path.clone(), selector.clone()]));
            };
            if !self.heap.is_accessible(ctx) {
                return Err(self.script_error("no-relative", &[path.clone()]));
            }
            let index = self.heap.find_word(ctx, self.symbols.canon(sym), false);
            if index == 0 {
                return Err(self.script_error("bad-path-set", &[path.clone(), selector.clone()]));
            }
            if !self.heap.key(ctx, index).types.contains(new.kind()) {
                let word = Cell::word(Kind::Word, sym);
                return Err(self.script_error("bad-path-field-set", &[word, Cell::datatype(new.kind())]));
            }
            return self.heap.set_var(ctx, index, new).map_err(|e| self.core_failure(e));
        }

        if let Some((series, index)) = container.array_at() {
            let at = match (selector.as_integer(), selector.symbol()) {
                (Some(n), _) => match pick_index(index, n) {
                    Some(at) if at < self.heap.len(series) => at,
                    _ => return Err(self.script_error("bad-path-range", &[selector.clone()])),
                },
                (None, Some(sym)) => {
                    let canon = self.symbols.canon(sym);
                    let len = self.heap.len(series);
                    let found = (index..len.saturating_sub(1)).find(|&at| {
                        let cell = self.heap.at(series, at);
                        cell.kind().is_word()
                            && cell.symbol().map(|s| self.symbols.canon(s)) == Some(canon)
                    });
                    match found {
                        Some(at) => at + 1,
                        None => {
                            return Err(self.script_error("bad-path-set", &[path.clone(), selector.clone()]));
                        }
                    }
                }
                _ => return Err(self.script_error("bad-path-set", &[path.clone(), selector.clone()])),
            };
            return self.heap.set_cell(series, at, new).map_err(|e| self.core_failure(e));
        }

        if container.kind().is_string()
            && let (Some(n), Some(c)) = (selector.as_integer(), new.as_char())
            && let Some((series, index)) = container.series_at()
        {
            if self.heap.get(series).is_locked() {
                return Err(self.script_error("protected-series", &[]));
            }
            let mut chars: Vec<char> = String::from_utf8_lossy(self.heap.get(series).bytes()).chars().collect();
            match pick_index(index, n) {
                Some(at) if at < chars.len() => chars[at] = c,
                _ => return Err(self.script_error("bad-path-range", &[selector.clone()])),
            }
            if let Some(bytes) = self.heap.get_mut(series).bytes_mut() {
                *bytes = chars.into_iter().collect::<String>().into_bytes();
            }
            return Ok(());
        }

        Err(self.script_error("bad-path-set", &[path.clone(), selector.clone()]))
    }
}

/// Zero-based position of a 1-based pick relative to `index`
fn pick_index(index: usize, n: i64) -> Option<usize> {
    if n < 1 {
        return None;
    }
    index.checked_add(n as usize - 1)
}

fn number_cell(n: f64) -> Cell {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Cell::integer(n as i64)
    } else {
        Cell::decimal(n)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::interp::Interp;
    use reb_core::{Kind, TypeSet};

    fn error_id(interp: &mut Interp, source: &str) -> String {
        let err = interp.do_string(source, "test").unwrap_err();
        interp.error_id(err).unwrap_or_default()
    }

    #[test]
    fn test_object_field_get_and_set() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = interp
            .do_string("o: make object! [a: 1 b: [10 20]] o/a: o/a + 5 o/a", "test")
            .unwrap();
        assert_eq!(value.as_integer(), Some(6));
        let value = interp.do_string("o/b/2", "test").unwrap();
        assert_eq!(value.as_integer(), Some(20));
        assert_eq!(error_id(&mut interp, "o/zz"), "bad-path-select");
        assert_eq!(error_id(&mut interp, "o/zz: 1"), "bad-path-set");
    }

    #[test]
    fn test_block_picks() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = interp.do_string("b: [x 1 y 2] b/y", "test").unwrap();
        assert_eq!(value.as_integer(), Some(2));
        assert!(interp.do_string("b/9", "test").unwrap().is_blank());
        let value = interp.do_string("i: 3 b/:i", "test").unwrap();
        assert_eq!(value.kind(), Kind::Word);
        let value = interp.do_string("b/(1 + 1)", "test").unwrap();
        assert_eq!(value.as_integer(), Some(1));
        assert_eq!(error_id(&mut interp, "b/9: 0"), "bad-path-range");
        let value = interp.do_string("b/2: 5 b/x", "test").unwrap();
        assert_eq!(value.as_integer(), Some(5));
    }

    #[test]
    fn test_scalar_selectors() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = interp.do_string("p: 3x4 p/y", "test").unwrap();
        assert_eq!(value.as_integer(), Some(4));
        let value = interp.do_string("t: 1.2.3 t/2", "test").unwrap();
        assert_eq!(value.as_integer(), Some(2));
        let value = interp.do_string("s: \"abc\" s/3", "test").unwrap();
        assert_eq!(value.as_char(), Some('c'));
    }

    #[test]
    fn test_get_path_does_not_invoke() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let value = interp
            .do_string("o: make object! [f: func [] [1]] :o/f", "test")
            .unwrap();
        assert_eq!(value.kind(), Kind::Function);
        let value = interp.do_string("o/f", "test").unwrap();
        assert_eq!(value.as_integer(), Some(1));
    }

    #[test]
    fn test_field_type_and_lock_checks() {
        let mut interp = Interp::new(RuntimeConfig::default());
        interp.do_string("p: make object! [a: 1] protect in p 'a", "test").unwrap();
        assert_eq!(error_id(&mut interp, "p/a: 2"), "locked-word");
        assert_eq!(error_id(&mut interp, "b: protect [1 2] b/1: 3"), "protected-series");

        let q = interp.do_string("q: make object! [n: 1] q", "test").unwrap();
        let ctx = q.context_id().unwrap();
        interp.heap.key_mut(ctx, 1).types = TypeSet::of(Kind::Integer);
        assert_eq!(error_id(&mut interp, "q/n: \"one\""), "bad-path-field-set");
        let value = interp.do_string("q/n: 2 q/n", "test").unwrap();
        assert_eq!(value.as_integer(), Some(2));
    }
}
