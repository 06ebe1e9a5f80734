//! Interpreter state
//!
//! `Interp` bundles everything one evaluation task owns: the series heap,
//! the symbol table, the binding table, the frame stack and the pending
//! throw. Nothing here is shared between threads; a host that wants several
//! tasks creates several interpreters.
//!
//! Boot builds three contexts:
//!
//! - `lib`: natives, datatypes and constants
//! - `system`: the error catalog and other runtime objects
//! - `user`: where loaded code is bound; new user words inherit lib values

use crate::bind::BindTable;
use crate::config::RuntimeConfig;
use crate::control::Flow;
use crate::device::DeviceTable;
use crate::error::{ErrorCatalog, Fail};
use crate::frame::{Frame, Specifier};
use crate::hooks::Hooks;
use crate::natives::{self, NativeEntry};
use crate::panic::MAX_QUIT_CODE;
use reb_core::{
    Cell, CellFlags, ContextId, ContextKind, FuncId, Heap, Kind, SeriesId, Symbol, SymbolTable,
    TypeSet,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Where `print` and `probe` write
#[derive(Debug)]
pub enum Output {
    Stdout,
    /// Collected for the host (tests, embedding)
    Buffer(String),
}

/// Function identities used as throw labels
#[derive(Debug, Clone, Copy)]
pub struct Labels {
    pub break_fn: FuncId,
    pub continue_fn: FuncId,
    pub return_fn: FuncId,
    pub leave_fn: FuncId,
    pub quit_fn: FuncId,
}

pub struct Interp {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub config: RuntimeConfig,
    pub lib: ContextId,
    pub user: ContextId,
    pub system: ContextId,
    pub(crate) binder: BindTable,
    pub(crate) frames: Vec<Frame>,
    pub(crate) tick: u64,
    pub(crate) peak_depth: usize,
    /// Value half of a pending throw; the label sits in the output cell
    pub(crate) thrown_arg: Option<Cell>,
    /// Array position of the expression being evaluated, for error `near`
    pub(crate) near: Option<(SeriesId, usize)>,
    pub(crate) natives: Vec<NativeEntry>,
    pub(crate) labels: Option<Labels>,
    pub(crate) catalog: ErrorCatalog,
    pub(crate) std_error: Option<ContextId>,
    pub(crate) hooks: Hooks,
    pub(crate) devices: DeviceTable,
    pub(crate) halt: Arc<AtomicBool>,
    pub(crate) output: Output,
    pub(crate) quit_code: Option<i32>,
    pub(crate) started: Instant,
}

impl Interp {
    pub fn new(config: RuntimeConfig) -> Self {
        let catalog = match ErrorCatalog::embedded() {
            Ok(catalog) => catalog,
            Err(e) => panic!("embedded error catalog is malformed: {e}"),
        };
        let mut heap = Heap::new();
        let lib = heap.make_context(ContextKind::Module, 256);
        let system = heap.make_context(ContextKind::Object, 8);
        let user = heap.make_context(ContextKind::Module, 256);
        let trace = config.trace;

        let mut interp = Interp {
            heap,
            symbols: SymbolTable::new(),
            config,
            lib,
            user,
            system,
            binder: BindTable::default(),
            frames: Vec::new(),
            tick: 0,
            peak_depth: 0,
            thrown_arg: None,
            near: None,
            natives: Vec::new(),
            labels: None,
            catalog,
            std_error: None,
            hooks: Hooks::default(),
            devices: DeviceTable::with_builtin_devices(),
            halt: Arc::new(AtomicBool::new(false)),
            output: Output::Stdout,
            quit_code: None,
            started: Instant::now(),
        };

        interp.boot_constants();
        interp.boot_errors();
        natives::boot(&mut interp);
        if interp.config.trace_enabled() {
            interp.hooks.start_trace(trace, false, false);
        }

        let contexts = [
            ("lib", interp.lib),
            ("system", interp.system),
            ("user", interp.user),
        ];
        let holder = interp.heap.make_context(ContextKind::Object, contexts.len());
        for (name, ctx) in contexts {
            let value = interp.heap.context_value(ctx);
            interp.put_field(holder, name, value);
        }
        let value = interp.heap.context_value(holder);
        interp.put_field(interp.system, "contexts", value);
        let value = interp.heap.context_value(interp.system);
        interp.put_field(interp.lib, "system", value);

        tracing::debug!(
            natives = interp.natives.len(),
            series = interp.heap.stats().live,
            "boot complete"
        );
        interp
    }

    fn boot_constants(&mut self) {
        let constants = [
            ("true", Cell::logic(true)),
            ("false", Cell::logic(false)),
            ("on", Cell::logic(true)),
            ("off", Cell::logic(false)),
            ("yes", Cell::logic(true)),
            ("no", Cell::logic(false)),
            ("blank", Cell::blank()),
            ("none", Cell::blank()),
        ];
        for (name, value) in constants {
            self.put_field(self.lib, name, value);
        }
        for kind in Kind::all().iter().filter(|k| !k.is_internal()) {
            self.put_field(self.lib, kind.name(), Cell::datatype(*kind));
        }
        for name in [
            "any-value!",
            "any-word!",
            "any-number!",
            "any-block!",
            "any-path!",
            "any-string!",
            "any-context!",
            "any-series!",
        ] {
            if let Some(set) = TypeSet::from_name(name) {
                self.put_field(self.lib, name, Cell::typeset(set));
            }
        }
    }

    /// Shared flag; storing `true` halts the running evaluation at its next tick
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halt)
    }

    pub(crate) fn take_halt_request(&self) -> bool {
        self.halt.swap(false, Ordering::AcqRel)
    }

    /// Raise user-halt/halt if a halt was requested since the last check
    pub(crate) fn check_halt(&mut self) -> Result<(), Fail> {
        if self.take_halt_request() {
            return Err(self.error("user-halt", "halt", &[]));
        }
        Ok(())
    }

    /// Collect `print` output instead of writing it to stdout
    pub fn capture_output(&mut self) {
        self.output = Output::Buffer(String::new());
    }

    /// Captured output so far (empty when writing to stdout)
    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Buffer(buf) => std::mem::take(buf),
            Output::Stdout => String::new(),
        }
    }

    pub(crate) fn write_line(&mut self, line: &str) {
        match &mut self.output {
            Output::Stdout => println!("{line}"),
            Output::Buffer(buf) => {
                buf.push_str(line);
                buf.push('\n');
            }
        }
    }

    /// Exit code requested by QUIT, if any
    pub fn quit_code(&self) -> Option<i32> {
        self.quit_code
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    /// True when no symbol has a binding-table entry
    pub fn binding_table_is_clean(&self) -> bool {
        self.binder.is_clean()
    }

    pub(crate) fn labels(&self) -> Labels {
        match self.labels {
            Some(labels) => labels,
            None => panic!("control natives used before boot finished"),
        }
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    /// Canonical symbol for a spelling, interning it if needed
    pub fn canon(&mut self, name: &str) -> Symbol {
        let sym = self.symbols.intern(name);
        self.symbols.canon(sym)
    }

    pub fn word_cell(&mut self, kind: Kind, name: &str) -> Cell {
        let sym = self.intern(name);
        Cell::word(kind, sym)
    }

    pub fn make_string(&mut self, text: &str) -> Cell {
        let id = self.heap.make_bytes(text.as_bytes().to_vec());
        Cell::series(Kind::String, id, 0)
    }

    pub fn make_file(&mut self, text: &str) -> Cell {
        let id = self.heap.make_bytes(text.as_bytes().to_vec());
        Cell::series(Kind::File, id, 0)
    }

    /// Text of a string-kind cell from its index
    pub fn string_of(&self, cell: &Cell) -> String {
        match cell.series_at() {
            Some((series, index)) if cell.kind().is_string() => {
                let text = String::from_utf8_lossy(self.heap.get(series).bytes()).into_owned();
                text.chars().skip(index).collect()
            }
            _ => String::new(),
        }
    }

    /// Read a field of an object by spelling
    pub fn field(&self, ctx: ContextId, name: &str) -> Option<Cell> {
        let sym = self.symbols.find(name)?;
        let index = self.heap.find_word(ctx, self.symbols.canon(sym), true);
        (index > 0).then(|| self.heap.var(ctx, index).clone())
    }

    /// Set a field of an object by spelling, adding the key if missing
    pub fn put_field(&mut self, ctx: ContextId, name: &str, value: Cell) {
        let sym = self.canon(name);
        let mut index = self.heap.find_word(ctx, sym, true);
        if index == 0 {
            index = match self.heap.append_key(ctx, sym, TypeSet::ANY_VALUE) {
                Ok(index) => index,
                Err(e) => panic!("cannot add field {name}: {e}"),
            };
        }
        self.poke_var(ctx, index, value);
    }

    /// Overwrite a variable without lock checks (runtime-internal writes)
    pub(crate) fn poke_var(&mut self, ctx: ContextId, index: usize, value: Cell) {
        let loc = self.heap.var_loc(ctx, index);
        *self.heap.cell_mut(loc) = value;
    }

    /// Load, bind and evaluate source text under a top-level trap
    ///
    /// An uncaught throw becomes a script/no-catch error, except QUIT, which
    /// records its exit code and ends evaluation normally.
    pub fn do_string(&mut self, source: &str, file: &str) -> Result<Cell, ContextId> {
        let manuals = self.heap.manuals_len();
        debug_assert!(self.binder.is_clean(), "binding table dirty before evaluation");

        let result = self.trap(|interp| {
            let code = interp.load_string(source, file)?;
            interp.bind_to_user(code)?;
            let mut out = Cell::void();
            match interp.do_array(code, 0, Specifier::Specified, &mut out)? {
                Flow::Done => Ok(out),
                Flow::Thrown => {
                    let quit = Cell::function(interp.labels().quit_fn);
                    let label = interp.catch_thrown(&mut out);
                    if label.func_id() == quit.func_id() {
                        let code = out
                            .as_integer()
                            .unwrap_or(0)
                            .clamp(0, i64::from(MAX_QUIT_CODE)) as i32;
                        interp.quit_code = Some(code);
                        tracing::debug!(code, "quit requested");
                        Ok(Cell::void())
                    } else {
                        Err(interp.script_error("no-catch", &[label]))
                    }
                }
            }
        });

        assert!(self.binder.is_clean(), "binding table dirty after evaluation");
        assert_eq!(
            self.heap.manuals_len(),
            manuals,
            "unmanaged series leaked by evaluation"
        );
        debug_assert!(self.frames.is_empty());
        result
    }

    /// Bind a freshly loaded array into the user context
    ///
    /// Every word gets a user slot; a slot the load creates starts with the
    /// lib value of the same name, or void when lib has none.
    pub fn bind_to_user(&mut self, code: SeriesId) -> Result<(), Fail> {
        let before = self.heap.context_len(self.user);
        self.bind_values(
            code,
            0,
            self.user,
            TypeSet::ANY_WORD,
            TypeSet::ANY_WORD,
            crate::bind::BindFlags::DEEP,
        )?;
        let after = self.heap.context_len(self.user);
        for index in before + 1..=after {
            let sym = self.heap.key(self.user, index).symbol;
            let lib_index = self.heap.find_word(self.lib, sym, false);
            let value = if lib_index > 0 {
                self.heap.var(self.lib, lib_index).clone()
            } else {
                Cell::void()
            };
            self.poke_var(self.user, index, value);
        }
        Ok(())
    }

    /// Evaluate and mold, for hosts that only want text
    pub fn eval_to_string(&mut self, source: &str) -> Result<String, String> {
        match self.do_string(source, "eval") {
            Ok(value) if value.is_void() => Ok(String::new()),
            Ok(value) => Ok(self.mold(&value)),
            Err(err) => Err(self.form_error(err)),
        }
    }

    /// True when `cell` is a function value flagged for infix use
    pub(crate) fn is_enfix(cell: &Cell) -> bool {
        cell.kind() == Kind::Function && cell.has_flag(CellFlags::ENFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_populates_lib() {
        let interp = Interp::new(RuntimeConfig::default());
        assert!(interp.field(interp.lib, "true").is_some());
        assert_eq!(
            interp.field(interp.lib, "integer!").and_then(|c| c.datatype_kind()),
            Some(Kind::Integer)
        );
        assert!(interp.field(interp.lib, "append").is_some());
        assert!(interp.field(interp.system, "catalog").is_some());
    }

    #[test]
    fn test_put_field_adds_then_overwrites() {
        let mut interp = Interp::new(RuntimeConfig::default());
        let obj = interp.heap.make_context(ContextKind::Object, 1);
        interp.put_field(obj, "a", Cell::integer(1));
        interp.put_field(obj, "a", Cell::integer(2));
        assert_eq!(interp.heap.context_len(obj), 1);
        assert_eq!(interp.field(obj, "a").and_then(|c| c.as_integer()), Some(2));
        assert_eq!(interp.field(obj, "A").and_then(|c| c.as_integer()), None);
    }

    #[test]
    fn test_capture_output() {
        let mut interp = Interp::new(RuntimeConfig::default());
        interp.capture_output();
        interp.write_line("hello");
        assert_eq!(interp.take_output(), "hello\n");
        assert_eq!(interp.take_output(), "");
    }

    #[test]
    fn test_quit_code_is_clamped_before_narrowing() {
        let mut interp = Interp::new(RuntimeConfig::default());
        assert!(interp.do_string("quit/with 4294967299", "test").is_ok());
        assert_eq!(interp.quit_code(), Some(MAX_QUIT_CODE));

        let mut interp = Interp::new(RuntimeConfig::default());
        assert!(interp.do_string("quit/with -2", "test").is_ok());
        assert_eq!(interp.quit_code(), Some(0));
    }

    #[test]
    fn test_halt_handle_is_shared() {
        let interp = Interp::new(RuntimeConfig::default());
        interp.halt_handle().store(true, Ordering::Release);
        assert!(interp.take_halt_request());
        assert!(!interp.take_halt_request());
    }
}
