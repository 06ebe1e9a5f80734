//! Source loader
//!
//! Turns source text into a managed block of cells. The scanner knows the
//! lexical forms the evaluator needs:
//!
//! - numbers: `42`, `-7`, `3.5`, pairs `1x2`, tuples `1.2.3`
//! - text: `"quoted ^"escapes^""`, `{braced {nested} text}`, chars `#"a"`
//! - `%files`, `<tags>`, `scheme://urls`, `#issues`, blank `_`, bar `|`
//! - words `w`, `w:`, `:w`, `'w`, `/w` and paths `a/b`, `a/b:`, `:a/b`, `'a/b`
//! - `[blocks]`, `(groups)` and `;` line comments
//!
//! Each array records the file and line it started on; a cell preceded by a
//! line break carries the NEWLINE_BEFORE flag.

use crate::error::Fail;
use crate::interp::Interp;
use reb_core::{Cell, CellFlags, Kind, Origin, SeriesId};

struct Open {
    kind: Kind,
    cells: Vec<Cell>,
    line: u32,
    /// A line break preceded the opening bracket
    newline: bool,
}

struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    file: &'a str,
    newline: bool,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | '"' | '{' | '}' | ';')
}

impl Interp {
    /// Scan source text into an unbound, managed block
    pub fn scan(&mut self, source: &str, file: &str) -> Result<SeriesId, Fail> {
        let mut scanner = Scanner {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            file,
            newline: false,
        };
        let mut stack = vec![Open {
            kind: Kind::Block,
            cells: Vec::new(),
            line: 1,
            newline: false,
        }];

        while let Some(c) = scanner.peek() {
            if c == '\n' {
                scanner.line += 1;
                scanner.newline = true;
                scanner.pos += 1;
                continue;
            }
            if c.is_whitespace() {
                scanner.pos += 1;
                continue;
            }
            if c == ';' {
                while scanner.peek().is_some_and(|c| c != '\n') {
                    scanner.pos += 1;
                }
                continue;
            }

            let cell = match c {
                '[' | '(' => {
                    scanner.pos += 1;
                    let kind = if c == '[' { Kind::Block } else { Kind::Group };
                    stack.push(Open {
                        kind,
                        cells: Vec::new(),
                        line: scanner.line,
                        newline: std::mem::take(&mut scanner.newline),
                    });
                    continue;
                }
                ']' | ')' => {
                    scanner.pos += 1;
                    let expected = if c == ']' { Kind::Block } else { Kind::Group };
                    if stack.len() < 2 || stack.last().map(|o| o.kind) != Some(expected) {
                        return Err(self.syntax_error("scan-extra", &c.to_string(), scanner.line));
                    }
                    let Some(open) = stack.pop() else {
                        return Err(self.syntax_error("scan-extra", &c.to_string(), scanner.line));
                    };
                    let id = self.finish_array(open.cells, scanner.file, open.line);
                    // a break before the closing bracket belongs to no cell
                    scanner.newline = open.newline;
                    Cell::series(open.kind, id, 0)
                }
                '"' => {
                    let text = self.scan_quoted(&mut scanner)?;
                    self.make_string(&text)
                }
                '{' => {
                    let text = self.scan_braced(&mut scanner)?;
                    self.make_string(&text)
                }
                '}' => {
                    return Err(self.syntax_error("scan-extra", "}", scanner.line));
                }
                _ => {
                    let token = scanner.token();
                    self.classify(&token, &mut scanner)?
                }
            };

            let mut cell = cell;
            if scanner.newline {
                cell.set_flag(CellFlags::NEWLINE_BEFORE);
                scanner.newline = false;
            }
            if let Some(open) = stack.last_mut() {
                open.cells.push(cell);
            }
        }

        if stack.len() > 1 {
            let missing = match stack.last().map(|o| o.kind) {
                Some(Kind::Group) => ")",
                _ => "]",
            };
            let line = stack.last().map(|o| o.line).unwrap_or(scanner.line);
            return Err(self.syntax_error("scan-missing", missing, line));
        }
        let top = stack.pop().map(|o| o.cells).unwrap_or_default();
        Ok(self.finish_array(top, file, 1))
    }

    /// Scan source text for evaluation (words are left unbound)
    pub fn load_string(&mut self, source: &str, file: &str) -> Result<SeriesId, Fail> {
        self.scan(source, file)
    }

    fn finish_array(&mut self, cells: Vec<Cell>, file: &str, line: u32) -> SeriesId {
        let id = self.heap.make_managed_array(cells);
        let file = self.intern(file);
        self.heap.get_mut(id).origin = Some(Origin { file, line });
        id
    }

    fn syntax_error(&mut self, id: &str, what: &str, line: u32) -> Fail {
        let what = self.make_string(what);
        let at = self.make_string(&format!("line {line}"));
        self.error("syntax", id, &[what, at])
    }

    fn invalid(&mut self, kind: Kind, token: &str, line: u32) -> Fail {
        let kind = self.make_string(kind.name());
        let token = self.make_string(token);
        let at = self.make_string(&format!("line {line}"));
        self.error("syntax", "scan-invalid", &[kind, token, at])
    }

    fn scan_quoted(&mut self, scanner: &mut Scanner) -> Result<String, Fail> {
        let start = scanner.line;
        scanner.pos += 1;
        let mut text = String::new();
        loop {
            match scanner.next() {
                None | Some('\n') => return Err(self.syntax_error("scan-missing", "\"", start)),
                Some('"') => return Ok(text),
                Some('^') => text.push(self.escape(scanner, start)?),
                Some(c) => text.push(c),
            }
        }
    }

    fn scan_braced(&mut self, scanner: &mut Scanner) -> Result<String, Fail> {
        let start = scanner.line;
        scanner.pos += 1;
        let mut depth = 1;
        let mut text = String::new();
        loop {
            match scanner.next() {
                None => return Err(self.syntax_error("scan-missing", "}", start)),
                Some('{') => {
                    depth += 1;
                    text.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push('}');
                }
                Some('^') => text.push(self.escape(scanner, start)?),
                Some('\n') => {
                    scanner.line += 1;
                    text.push('\n');
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn escape(&mut self, scanner: &mut Scanner, line: u32) -> Result<char, Fail> {
        match scanner.next() {
            Some('/') => Ok('\n'),
            Some('-') => Ok('\t'),
            Some('@') => Ok('\0'),
            Some(c) if !c.is_whitespace() => Ok(c),
            _ => Err(self.invalid(Kind::String, "^", line)),
        }
    }

    fn classify(&mut self, token: &str, scanner: &mut Scanner) -> Result<Cell, Fail> {
        let line = scanner.line;

        if let Some(rest) = token.strip_prefix("#\"") {
            // the token reader stops at the quote; finish the char literal here
            debug_assert!(rest.is_empty());
            let c = match scanner.next() {
                Some('^') => self.escape(scanner, line)?,
                Some(c) => c,
                None => return Err(self.invalid(Kind::Char, token, line)),
            };
            if scanner.next() != Some('"') {
                return Err(self.invalid(Kind::Char, token, line));
            }
            return Ok(Cell::char(c));
        }
        if let Some(name) = token.strip_prefix('#') {
            if name.is_empty() {
                return Err(self.invalid(Kind::Issue, token, line));
            }
            return Ok(self.word_cell(Kind::Issue, name));
        }
        if let Some(path) = token.strip_prefix('%') {
            return Ok(self.make_file(path));
        }
        if token.starts_with('<') && token.ends_with('>') && token.len() > 2 && token != "<>" {
            let id = self.heap.make_bytes(token[1..token.len() - 1].as_bytes().to_vec());
            return Ok(Cell::series(Kind::Tag, id, 0));
        }
        if token.contains("://") {
            let id = self.heap.make_bytes(token.as_bytes().to_vec());
            return Ok(Cell::series(Kind::Url, id, 0));
        }
        if token == "_" {
            return Ok(Cell::blank());
        }
        if token == "|" {
            return Ok(Cell::bar());
        }
        if let Some(number) = self.scan_number(token, line)? {
            return Ok(number);
        }

        // word and path forms
        if let Some(rest) = token.strip_prefix('\'') {
            return self.word_or_path(rest, Kind::LitWord, Kind::LitPath, token, line);
        }
        if let Some(rest) = token.strip_prefix(':') {
            return self.word_or_path(rest, Kind::GetWord, Kind::GetPath, token, line);
        }
        if token.len() > 1
            && let Some(rest) = token.strip_suffix(':')
        {
            return self.word_or_path(rest, Kind::SetWord, Kind::SetPath, token, line);
        }
        if let Some(rest) = token.strip_prefix('/')
            && !rest.is_empty()
            && !rest.starts_with('/')
        {
            if rest.contains('/') {
                return Err(self.invalid(Kind::Refinement, token, line));
            }
            return Ok(self.word_cell(Kind::Refinement, rest));
        }
        self.word_or_path(token, Kind::Word, Kind::Path, token, line)
    }

    fn word_or_path(
        &mut self,
        text: &str,
        word_kind: Kind,
        path_kind: Kind,
        token: &str,
        line: u32,
    ) -> Result<Cell, Fail> {
        if text.is_empty() {
            return Err(self.invalid(word_kind, token, line));
        }
        if !text.contains('/') || text.chars().all(|c| c == '/') {
            if !valid_word(text) {
                return Err(self.invalid(word_kind, token, line));
            }
            return Ok(self.word_cell(word_kind, text));
        }

        let mut cells = Vec::new();
        for (i, segment) in text.split('/').enumerate() {
            if segment.is_empty() {
                return Err(self.invalid(path_kind, token, line));
            }
            let cell = if i > 0
                && let Ok(n) = segment.parse::<i64>()
            {
                Cell::integer(n)
            } else if i > 0
                && let Some(name) = segment.strip_prefix(':')
                && valid_word(name)
            {
                self.word_cell(Kind::GetWord, name)
            } else if valid_word(segment) {
                self.word_cell(Kind::Word, segment)
            } else {
                return Err(self.invalid(path_kind, token, line));
            };
            cells.push(cell);
        }
        let id = self.finish_array(cells, "path", line);
        Ok(Cell::series(path_kind, id, 0))
    }

    fn scan_number(&mut self, token: &str, line: u32) -> Result<Option<Cell>, Fail> {
        let body = token.strip_prefix(['-', '+']).unwrap_or(token);
        if !body.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(None);
        }

        if let Some((x, y)) = token.split_once(['x', 'X']) {
            return match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(x), Ok(y)) => Ok(Some(Cell::pair(x, y))),
                _ => Err(self.invalid(Kind::Pair, token, line)),
            };
        }
        if token.matches('.').count() >= 2 {
            let parts: Result<Vec<u8>, _> = token.split('.').map(str::parse::<u8>).collect();
            return match parts {
                Ok(parts) if parts.len() <= 8 => Ok(Some(Cell::tuple(&parts))),
                _ => Err(self.invalid(Kind::Tuple, token, line)),
            };
        }
        if let Ok(n) = token.parse::<i64>() {
            return Ok(Some(Cell::integer(n)));
        }
        if token.contains('.')
            && let Ok(d) = token.parse::<f64>()
        {
            return Ok(Some(Cell::decimal(d)));
        }
        if body.chars().all(|c| c.is_ascii_digit()) {
            // digits only yet unparseable as i64
            return Err(self.invalid(Kind::Integer, token, line));
        }
        Err(self.invalid(Kind::Decimal, token, line))
    }
}

impl Scanner<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// Characters up to the next delimiter; `#"` stops right after the quote mark
    fn token(&mut self) -> String {
        let start = self.pos;
        if self.chars[start..].starts_with(&['#', '"']) {
            self.pos += 2;
            return "#\"".to_string();
        }
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn valid_word(text: &str) -> bool {
    !text.is_empty()
        && !text.starts_with(|c: char| c.is_ascii_digit())
        && !text.contains([':', '\'', '#', '%', '@', '$', ','])
}
