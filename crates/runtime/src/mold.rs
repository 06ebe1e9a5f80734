//! Value rendering
//!
//! `mold` produces source text that loads back to an equivalent value where
//! the kind has a lexical form; `form` produces display text (strings
//! unquoted, blocks without brackets, errors as their report).
//! Contexts reached a second time while molding render as `...`.

use crate::error::{ERROR_FIELDS, FIELD_FILE, FIELD_LINE, FIELD_MESSAGE, FIELD_NEAR, FIELD_WHERE, FIELD_ARG1};
use crate::interp::Interp;
use reb_core::{Cell, ContextId, ContextKind, FuncClass, FuncId, KeyFlags, Kind, ParamClass, Payload, SeriesId};
use std::fmt::Write;

#[derive(Default)]
struct Molder {
    buf: String,
    /// Arrays and contexts currently being molded
    stack: Vec<SeriesId>,
}

impl Interp {
    pub fn mold(&self, cell: &Cell) -> String {
        let mut molder = Molder::default();
        self.mold_value(&mut molder, cell);
        molder.buf
    }

    pub fn form(&self, cell: &Cell) -> String {
        match cell.kind() {
            Kind::Void => String::new(),
            Kind::String | Kind::File | Kind::Url | Kind::Tag => self.string_of(cell),
            Kind::Char => cell.as_char().map(String::from).unwrap_or_default(),
            Kind::Word | Kind::SetWord | Kind::GetWord | Kind::LitWord | Kind::Refinement | Kind::Issue => cell
                .symbol()
                .map(|s| self.symbols.name(s).to_string())
                .unwrap_or_default(),
            Kind::Block | Kind::Group => {
                let Some((series, index)) = cell.array_at() else {
                    return String::new();
                };
                self.heap
                    .cells(series)
                    .iter()
                    .skip(index)
                    .map(|c| self.form(c))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            Kind::Error => match cell.context_id() {
                Some(err) => self.form_error(err),
                None => self.mold(cell),
            },
            _ => self.mold(cell),
        }
    }

    /// Report text of an error context
    ///
    /// ```text
    /// ** Script Error: x has no value
    /// ** Where: f
    /// ** Near: x + 1
    /// ** File: demo.r
    /// ** Line: 3
    /// ```
    pub fn form_error(&self, err: ContextId) -> String {
        let etype = self.error_type(err).unwrap_or_else(|| "user".to_string());
        let title = self.catalog.title(&etype).unwrap_or("Error").to_string();

        let template = self.heap.var(err, FIELD_MESSAGE);
        let mut message = if template.kind().is_string() {
            self.string_of(template)
        } else {
            self.error_id(err).unwrap_or_default()
        };
        for i in 0..3 {
            let arg = self.heap.var(err, FIELD_ARG1 + i);
            let text = if arg.kind().is_string() { self.string_of(arg) } else { self.mold(arg) };
            message = message.replace(&format!(":arg{}", i + 1), &text);
        }

        let mut report = format!("** {title}: {message}");
        let where_ = self.heap.var(err, FIELD_WHERE);
        if where_.kind() == Kind::Block {
            let _ = write!(report, "\n** Where: {}", self.form(where_));
        }
        let near = self.heap.var(err, FIELD_NEAR);
        if let Some((series, index)) = near.array_at() {
            let text = self
                .heap
                .cells(series)
                .iter()
                .skip(index)
                .map(|c| self.mold(c))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = write!(report, "\n** Near: {text}");
        }
        let file = self.heap.var(err, FIELD_FILE);
        if file.kind() == Kind::File {
            let _ = write!(report, "\n** File: {}", self.string_of(file));
        }
        if let Some(line) = self.heap.var(err, FIELD_LINE).as_integer() {
            let _ = write!(report, "\n** Line: {line}");
        }
        report
    }

    fn mold_value(&self, m: &mut Molder, cell: &Cell) {
        let kind = cell.kind();
        match cell.payload() {
            Payload::Logic(b) => m.buf.push_str(if *b { "true" } else { "false" }),
            Payload::Integer(i) => {
                let _ = write!(m.buf, "{i}");
            }
            Payload::Decimal(d) => m.buf.push_str(&format_decimal(*d)),
            Payload::Char(c) => {
                m.buf.push_str("#\"");
                escape_char(&mut m.buf, *c);
                m.buf.push('"');
            }
            Payload::Pair(x, y) => {
                let _ = write!(m.buf, "{}x{}", format_number(*x), format_number(*y));
            }
            Payload::Tuple { bytes, len } => {
                let parts: Vec<String> = bytes[..*len as usize].iter().map(u8::to_string).collect();
                m.buf.push_str(&parts.join("."));
            }
            Payload::Time(nanos) => {
                let secs = nanos / 1_000_000_000;
                let sign = if secs < 0 { "-" } else { "" };
                let secs = secs.abs();
                let _ = write!(m.buf, "{sign}{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
            }
            Payload::Date { year, month, day } => {
                let _ = write!(m.buf, "{day}-{}-{year}", month_name(*month));
            }
            Payload::Word { symbol, .. } => {
                let name = self.symbols.name(*symbol);
                let (prefix, suffix) = match kind {
                    Kind::SetWord => ("", ":"),
                    Kind::GetWord => (":", ""),
                    Kind::LitWord => ("'", ""),
                    Kind::Refinement => ("/", ""),
                    Kind::Issue => ("#", ""),
                    _ => ("", ""),
                };
                let _ = write!(m.buf, "{prefix}{name}{suffix}");
            }
            Payload::Series { series, index } => self.mold_series(m, kind, *series, *index),
            Payload::Context(ctx) => self.mold_context(m, *ctx),
            Payload::Function { func, .. } => self.mold_function(m, *func),
            Payload::Datatype(k) => m.buf.push_str(k.name()),
            Payload::Typeset(set) => {
                m.buf.push_str("make typeset! [");
                let names: Vec<&str> = set.kinds().map(|k| k.name()).collect();
                m.buf.push_str(&names.join(" "));
                m.buf.push(']');
            }
            Payload::Key(key) => {
                let _ = write!(m.buf, "#[key {}]", self.symbols.name(key.symbol));
            }
            Payload::Handle(h) => {
                let _ = write!(m.buf, "#[handle {h}]");
            }
            Payload::None => match kind {
                Kind::Blank => m.buf.push('_'),
                Kind::Bar => m.buf.push('|'),
                _ => {
                    let _ = write!(m.buf, "#[{}]", kind.name().trim_end_matches('!'));
                }
            },
        }
    }

    fn mold_series(&self, m: &mut Molder, kind: Kind, series: SeriesId, index: usize) {
        if !self.heap.is_live(series) {
            m.buf.push_str("#[freed]");
            return;
        }
        if kind.is_array() {
            let (open, close, sep) = match kind {
                Kind::Block => ("[", "]", " "),
                Kind::Group => ("(", ")", " "),
                Kind::Path => ("", "", "/"),
                Kind::SetPath => ("", ":", "/"),
                Kind::GetPath => (":", "", "/"),
                _ => ("'", "", "/"),
            };
            m.buf.push_str(open);
            if m.stack.contains(&series) {
                m.buf.push_str("...");
            } else {
                m.stack.push(series);
                let cells = self.heap.cells(series);
                for (i, cell) in cells.iter().enumerate().skip(index) {
                    if i > index {
                        m.buf.push_str(sep);
                    }
                    self.mold_value(m, cell);
                }
                m.stack.pop();
            }
            m.buf.push_str(close);
            return;
        }

        let bytes = self.heap.get(series).bytes();
        match kind {
            Kind::Binary => {
                m.buf.push_str("#{");
                for b in bytes.iter().skip(index) {
                    let _ = write!(m.buf, "{b:02X}");
                }
                m.buf.push('}');
            }
            _ => {
                let text: String = String::from_utf8_lossy(bytes).chars().skip(index).collect();
                match kind {
                    Kind::String => {
                        m.buf.push('"');
                        for c in text.chars() {
                            escape_char(&mut m.buf, c);
                        }
                        m.buf.push('"');
                    }
                    Kind::File => {
                        let _ = write!(m.buf, "%{text}");
                    }
                    Kind::Tag => {
                        let _ = write!(m.buf, "<{text}>");
                    }
                    _ => m.buf.push_str(&text),
                }
            }
        }
    }

    fn mold_context(&self, m: &mut Molder, ctx: ContextId) {
        let kind = self.heap.context_kind(ctx);
        if kind == ContextKind::Module {
            let _ = write!(m.buf, "#[module! {} words]", self.heap.context_len(ctx));
            return;
        }
        if !self.heap.is_accessible(ctx) {
            m.buf.push_str("#[frame! inaccessible]");
            return;
        }
        let _ = write!(m.buf, "make {} [", kind.to_kind().name());
        if m.stack.contains(&ctx.0) {
            m.buf.push_str("...]");
            return;
        }
        m.stack.push(ctx.0);
        let fields: Vec<(usize, reb_core::Symbol)> = self
            .heap
            .keys(ctx)
            .filter(|(_, key)| !key.flags.contains(KeyFlags::HIDDEN))
            .map(|(i, key)| (i, key.symbol))
            .collect();
        let mut first = true;
        for (i, sym) in fields {
            let value = self.heap.var(ctx, i);
            if kind == ContextKind::Error && value.is_blank() && i > ERROR_FIELDS.len() - 3 {
                continue;
            }
            if !first {
                m.buf.push(' ');
            }
            first = false;
            let _ = write!(m.buf, "{}: ", self.symbols.name(sym));
            match value.kind() {
                // words and paths would evaluate when the mold is loaded back
                Kind::Word | Kind::Path => m.buf.push('\''),
                _ => {}
            }
            self.mold_value(m, value);
        }
        m.stack.pop();
        m.buf.push(']');
    }

    fn mold_function(&self, m: &mut Molder, func: FuncId) {
        let class = self.heap.func_class(func);
        let kind = match class {
            FuncClass::Native(_) | FuncClass::Action(_) => "native!",
            FuncClass::Specialized => "specialization!",
            _ => "function!",
        };
        let _ = write!(m.buf, "make {kind} [[");
        let mut first = true;
        let mut in_locals = false;
        for (_, key) in self.heap.params(func) {
            if key.flags.contains(KeyFlags::HIDDEN) {
                continue;
            }
            if !first {
                m.buf.push(' ');
            }
            first = false;
            let name = self.symbols.name(key.symbol);
            match key.class {
                ParamClass::Normal => m.buf.push_str(name),
                ParamClass::HardQuote => {
                    let _ = write!(m.buf, "'{name}");
                }
                ParamClass::SoftQuote => {
                    let _ = write!(m.buf, ":{name}");
                }
                ParamClass::Refinement => {
                    in_locals = false;
                    let _ = write!(m.buf, "/{name}");
                }
                ParamClass::Local | ParamClass::Return | ParamClass::Leave => {
                    if !in_locals {
                        in_locals = true;
                        m.buf.push_str("/local ");
                    }
                    m.buf.push_str(name);
                }
            }
        }
        m.buf.push(']');
        if let Some(body) = self.heap.func_body(func) {
            m.buf.push(' ');
            self.mold_series(m, Kind::Block, body, 0);
        }
        m.buf.push(']');
    }
}

fn format_decimal(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{d:.1}")
    } else {
        d.to_string()
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn escape_char(buf: &mut String, c: char) {
    match c {
        '\n' => buf.push_str("^/"),
        '\t' => buf.push_str("^-"),
        '"' => buf.push_str("^\""),
        '^' => buf.push_str("^^"),
        '\0' => buf.push_str("^@"),
        c => buf.push(c),
    }
}

fn month_name(month: u8) -> &'static str {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    MONTHS.get(month.saturating_sub(1) as usize).copied().unwrap_or("???")
}
