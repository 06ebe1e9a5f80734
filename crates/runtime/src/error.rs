//! Raised errors
//!
//! A raised error is an error *context*: an object-like record whose first
//! fields are, in order, `type id message near where file line`, followed
//! by the id-specific arguments `arg1 arg2 arg3`. Evaluator functions return
//! `Result<_, Fail>` and `Fail` only carries the id of that context, so the
//! `?` operator unwinds to the nearest trap.
//!
//! # Catalog
//!
//! Message templates come from the embedded `errors.toml`. At boot the
//! catalog is materialized as `system/catalog/errors`, an object of
//! per-type objects whose fields map id words to template strings. Error
//! construction looks templates up through that object, so user code that
//! edits the catalog sees its edits reflected in new errors.

use crate::interp::Interp;
use reb_core::{Cell, ContextId, ContextKind, CoreError, Kind, SeriesId, TypeSet};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Embedded error catalog
pub static DEFAULT_ERRORS: &str = include_str!("errors.toml");

/// Field layout of every error context
pub const ERROR_FIELDS: [&str; 10] = [
    "type", "id", "message", "near", "where", "file", "line", "arg1", "arg2", "arg3",
];

pub const FIELD_TYPE: usize = 1;
pub const FIELD_ID: usize = 2;
pub const FIELD_MESSAGE: usize = 3;
pub const FIELD_NEAR: usize = 4;
pub const FIELD_WHERE: usize = 5;
pub const FIELD_FILE: usize = 6;
pub const FIELD_LINE: usize = 7;
pub const FIELD_ARG1: usize = 8;

/// Cells of source shown in an error's `near` field
const NEAR_CELLS: usize = 3;

/// A raised error, identified by its error context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("raised error {0}")]
pub struct Fail(pub ContextId);

pub type EvalResult<T> = Result<T, Fail>;

/// One error type of the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorTypeDef {
    pub code: u32,
    pub title: String,
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ErrorCatalog {
    pub types: BTreeMap<String, ErrorTypeDef>,
}

impl ErrorCatalog {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let types = toml::from_str(toml_str)?;
        Ok(ErrorCatalog { types })
    }

    pub fn embedded() -> Result<Self, toml::de::Error> {
        Self::from_toml(DEFAULT_ERRORS)
    }

    pub fn title(&self, etype: &str) -> Option<&str> {
        self.types.get(etype).map(|t| t.title.as_str())
    }

    /// Numeric code of an error: type base plus the id's position
    pub fn code(&self, etype: &str, id: &str) -> Option<u32> {
        let def = self.types.get(etype)?;
        let pos = def.ids.keys().position(|k| k == id)?;
        Some(def.code + pos as u32)
    }
}

impl Interp {
    /// Build `system/catalog/errors` and the prototype error context
    pub(crate) fn boot_errors(&mut self) {
        let catalog_types: Vec<(String, ErrorTypeDef)> = self
            .catalog
            .types
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let errors = self.heap.make_context(ContextKind::Object, catalog_types.len());
        for (type_name, def) in &catalog_types {
            let type_obj = self.heap.make_context(ContextKind::Object, def.ids.len() + 2);
            let code = Cell::integer(def.code as i64);
            self.put_field(type_obj, "code", code);
            let title = self.make_string(&def.title);
            self.put_field(type_obj, "title", title);
            for (id, template) in &def.ids {
                let message = self.make_string(template);
                self.put_field(type_obj, id, message);
            }
            let value = self.heap.context_value(type_obj);
            self.put_field(errors, type_name, value);
        }

        let catalog = self.heap.make_context(ContextKind::Object, 1);
        let value = self.heap.context_value(errors);
        self.put_field(catalog, "errors", value);
        let value = self.heap.context_value(catalog);
        self.put_field(self.system, "catalog", value);

        let proto = self.heap.make_context(ContextKind::Error, ERROR_FIELDS.len());
        for name in ERROR_FIELDS {
            self.put_field(proto, name, Cell::blank());
        }
        self.std_error = Some(proto);
    }

    /// Template string cell for `type/id`, read from the system catalog
    fn error_template(&self, etype: &str, id: &str) -> Option<Cell> {
        let catalog = self.field(self.system, "catalog")?.context_id()?;
        let errors = self.field(catalog, "errors")?.context_id()?;
        let type_obj = self.field(errors, etype)?.context_id()?;
        self.field(type_obj, id).filter(|c| c.kind().is_string())
    }

    /// Allocate an error context; unknown ids fall back to internal/misc
    pub fn make_error(&mut self, etype: &str, id: &str, args: &[Cell]) -> ContextId {
        let (etype, id, args) = match self.error_template(etype, id) {
            Some(_) => (etype.to_string(), id.to_string(), args.to_vec()),
            None => {
                let what = self.make_string(&format!("unknown error {etype}/{id}"));
                ("internal".to_string(), "misc".to_string(), vec![what])
            }
        };
        let message = self
            .error_template(&etype, &id)
            .unwrap_or_else(Cell::blank);

        let proto = self.std_error();
        let err = self.heap.copy_context_shallow_extra(proto, 0);
        let type_word = self.word_cell(Kind::Word, &etype);
        let id_word = self.word_cell(Kind::Word, &id);
        self.poke_var(err, FIELD_TYPE, type_word);
        self.poke_var(err, FIELD_ID, id_word);
        self.poke_var(err, FIELD_MESSAGE, message);
        for (i, arg) in args.iter().take(3).enumerate() {
            let value = if arg.is_void() { Cell::blank() } else { arg.stored() };
            self.poke_var(err, FIELD_ARG1 + i, value);
        }
        err
    }

    /// Error context located at the current top frame, ready to raise
    pub fn error(&mut self, etype: &str, id: &str, args: &[Cell]) -> Fail {
        let err = self.make_error(etype, id, args);
        if !self.frames.is_empty() {
            self.set_location_of_error(err, 0);
        } else {
            self.set_near_only(err);
        }
        tracing::debug!(etype, id, depth = self.frames.len(), "raise");
        Fail(err)
    }

    pub fn script_error(&mut self, id: &str, args: &[Cell]) -> Fail {
        self.error("script", id, args)
    }

    fn std_error(&mut self) -> ContextId {
        match self.std_error {
            Some(proto) => proto,
            None => panic!("error raised before the error prototype was booted"),
        }
    }

    /// Fill `where`, `near`, `file` and `line` from the frame at `depth`
    ///
    /// `where` lists the labels of that frame and every frame below it.
    pub fn set_location_of_error(&mut self, err: ContextId, depth: usize) {
        let count = self.frames.len();
        if depth >= count {
            self.set_near_only(err);
            return;
        }
        let mut labels = Vec::new();
        for i in (0..count - depth).rev() {
            let label = match self.frames[i].label {
                Some(sym) => Cell::word(Kind::Word, sym),
                None => self.word_cell(Kind::Word, "anonymous"),
            };
            labels.push(label);
        }
        let where_block = self.heap.make_managed_array(labels);
        self.poke_var(err, FIELD_WHERE, Cell::block(where_block));

        let source = self.frames[count - 1 - depth].source;
        let near = if depth == 0 { self.near.or(source) } else { source };
        if let Some((series, index)) = near {
            self.set_near(err, series, index);
        }
    }

    fn set_near_only(&mut self, err: ContextId) {
        if let Some((series, index)) = self.near {
            self.set_near(err, series, index);
        }
    }

    pub(crate) fn set_near(&mut self, err: ContextId, series: SeriesId, index: usize) {
        if !self.heap.is_live(series) || !self.heap.get(series).is_array() {
            return;
        }
        let cells: Vec<Cell> = self
            .heap
            .cells(series)
            .iter()
            .skip(index)
            .take(NEAR_CELLS)
            .map(|c| c.stored())
            .collect();
        let near = self.heap.make_managed_array(cells);
        self.poke_var(err, FIELD_NEAR, Cell::block(near));

        if let Some(origin) = self.heap.get(series).origin {
            let newlines = self
                .heap
                .cells(series)
                .iter()
                .take(index + 1)
                .filter(|c| c.has_flag(reb_core::CellFlags::NEWLINE_BEFORE))
                .count() as u32;
            let file_name = self.symbols.name(origin.file).to_string();
            let file = self.make_file(&file_name);
            self.poke_var(err, FIELD_FILE, file);
            self.poke_var(err, FIELD_LINE, Cell::integer((origin.line + newlines) as i64));
        }
    }

    /// Script error for a refused heap or context operation
    pub(crate) fn core_failure(&mut self, err: CoreError) -> Fail {
        match err {
            CoreError::LockedSeries(_) => self.script_error("protected-series", &[]),
            CoreError::LockedKey { context, index } => {
                let word = Cell::word(Kind::Word, self.heap.key(context, index).symbol);
                self.script_error("locked-word", &[word])
            }
            CoreError::SharedKeylist(ctx) => {
                let value = self.heap.context_value(ctx);
                self.script_error("expand-frame", &[value])
            }
            CoreError::OutOfRange { index, .. } => {
                self.script_error("bad-path-range", &[Cell::integer(index as i64 + 1)])
            }
            CoreError::NotArray(_) | CoreError::Freed(_) => {
                let what = self.make_string(&err.to_string());
                self.error("internal", "misc", &[what])
            }
        }
    }

    /// Symbolic id of an error context (`zero-divide`, `no-relative`, ...)
    pub fn error_id(&self, err: ContextId) -> Option<String> {
        let id = self.heap.var(err, FIELD_ID).symbol()?;
        Some(self.symbols.name(id).to_string())
    }

    pub fn error_type(&self, err: ContextId) -> Option<String> {
        let t = self.heap.var(err, FIELD_TYPE).symbol()?;
        Some(self.symbols.name(t).to_string())
    }

    /// Error context from a `make error!` spec block or message string
    pub(crate) fn error_from_spec(&mut self, spec: &Cell) -> Result<ContextId, Fail> {
        if spec.kind().is_string() {
            let text = self.string_of(spec);
            let msg = self.make_string(&text);
            return Ok(self.make_error("user", "message", &[msg]));
        }
        let Some((series, index)) = spec.array_at() else {
            let kind = Cell::datatype(Kind::Error);
            return Err(self.script_error("bad-make", &[kind, spec.clone()]));
        };

        // [type: 'script id: 'no-value arg1: ...] evaluated into a scratch object
        let proto = self.std_error();
        let scratch = self.heap.copy_context_shallow_extra(proto, 0);
        let body = self.heap.copy_array_deep_managed(series, index);
        self.bind_values(
            body,
            0,
            scratch,
            TypeSet::ANY_WORD,
            TypeSet::EMPTY,
            crate::bind::BindFlags::DEEP,
        )?;
        let mut out = Cell::void();
        if self.do_array(body, 0, crate::frame::Specifier::Specified, &mut out)? == crate::control::Flow::Thrown {
            let label = self.catch_thrown(&mut out);
            return Err(self.script_error("no-catch", &[label]));
        }

        let etype = self.heap.var(scratch, FIELD_TYPE).symbol();
        let id = self.heap.var(scratch, FIELD_ID).symbol();
        let args: Vec<Cell> = (0..3)
            .map(|i| self.heap.var(scratch, FIELD_ARG1 + i).clone())
            .collect();
        let err = match (etype, id) {
            (Some(t), Some(i)) => {
                let t = self.symbols.name(t).to_string();
                let i = self.symbols.name(i).to_string();
                self.make_error(&t, &i, &args)
            }
            _ => {
                let message = self.heap.var(scratch, FIELD_MESSAGE).clone();
                let message = if message.kind().is_string() {
                    message
                } else {
                    self.make_string("user error")
                };
                self.make_error("user", "message", &[message])
            }
        };
        let message = self.heap.var(scratch, FIELD_MESSAGE).clone();
        if message.kind().is_string() && etype.is_some() {
            self.poke_var(err, FIELD_MESSAGE, message);
        }
        Ok(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[test]
    fn test_embedded_catalog_parses() {
        let catalog = ErrorCatalog::embedded().unwrap();
        assert_eq!(catalog.title("script"), Some("Script Error"));
        assert!(catalog.types["math"].ids.contains_key("zero-divide"));
        assert!(catalog.types["user-halt"].ids.contains_key("halt"));
        assert!(catalog.code("script", "no-value").is_some());
    }

    #[test]
    fn test_error_context_layout() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let arg = interp.word_cell(Kind::Word, "foo");
        let err = interp.make_error("script", "no-value", &[arg]);
        assert_eq!(interp.heap.context_kind(err), ContextKind::Error);
        for (i, name) in ERROR_FIELDS.iter().enumerate() {
            let key = interp.heap.key(err, i + 1).symbol;
            assert_eq!(interp.symbols.name(key), *name);
        }
        assert_eq!(interp.error_id(err).as_deref(), Some("no-value"));
        assert_eq!(interp.error_type(err).as_deref(), Some("script"));
    }

    #[test]
    fn test_unknown_id_becomes_internal() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let err = interp.make_error("script", "no-such-id", &[]);
        assert_eq!(interp.error_id(err).as_deref(), Some("misc"));
        assert_eq!(interp.error_type(err).as_deref(), Some("internal"));
    }
}
