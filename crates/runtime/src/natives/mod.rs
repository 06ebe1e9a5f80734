//! Native functions
//!
//! Natives are Rust functions with a spec string in the same dialect user
//! functions use. At boot each spec is loaded into a paramlist, the function
//! is registered in the dispatch table under its `NativeId`, and its value is
//! stored in the lib context.
//!
//! A native receives the `Call` describing its frame and writes its result
//! to `out`; the returned `Disposition` tells the call site how to read
//! `out`.

mod control;
mod data;
mod loops;
mod meta;
mod words;

use crate::control::Flow;
use crate::error::Fail;
use crate::frame::Specifier;
use crate::interp::{Interp, Labels};
use reb_core::{Binding, Cell, CellFlags, FuncClass, FuncId, Kind, NativeId, SeriesId, Symbol, VarLoc};

/// How the call site should interpret the output cell after dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    OutSet,
    OutIsThrown,
    Void,
    Blank,
    True,
    False,
    Bar,
    /// Logic true when the native wrote `out`, else false
    TrueIfWritten,
    /// `out` as written, or void when the native left it untouched
    VoidIfUnwrittenElseOut,
    /// Evaluate `out` as if it had appeared in the caller's source
    ReevaluateCell,
}

pub type NativeFn = fn(&mut Interp, &Call, &mut Cell) -> Result<Disposition, Fail>;

#[derive(Clone, Copy)]
pub struct NativeEntry {
    pub name: &'static str,
    pub spec: &'static str,
    pub dispatch: NativeFn,
    /// Takes its first argument from the left
    pub enfix: bool,
}

impl std::fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEntry")
            .field("name", &self.name)
            .field("enfix", &self.enfix)
            .finish()
    }
}

pub(crate) const fn native(name: &'static str, spec: &'static str, dispatch: NativeFn) -> NativeEntry {
    NativeEntry {
        name,
        spec,
        dispatch,
        enfix: false,
    }
}

pub(crate) const fn enfix(name: &'static str, spec: &'static str, dispatch: NativeFn) -> NativeEntry {
    NativeEntry {
        name,
        spec,
        dispatch,
        enfix: true,
    }
}

/// The frame a native runs in
#[derive(Debug, Clone, Copy)]
pub struct Call {
    pub func: FuncId,
    pub args: SeriesId,
    /// Stack index of the frame (0 is the bottom)
    pub index: usize,
    pub binding: Binding,
    pub label: Option<Symbol>,
}

/// Disposition for the outcome of a sub-evaluation written to `out`
pub(crate) fn finish(flow: Flow) -> Disposition {
    match flow {
        Flow::Done => Disposition::OutSet,
        Flow::Thrown => Disposition::OutIsThrown,
    }
}

/// Register every native in lib
pub(crate) fn boot(interp: &mut Interp) {
    let tables: [&[NativeEntry]; 5] = [
        control::NATIVES,
        loops::NATIVES,
        words::NATIVES,
        data::NATIVES,
        meta::NATIVES,
    ];
    for entry in tables.into_iter().flatten() {
        let id = NativeId(interp.natives.len() as u16);
        let keys = match interp.native_params(entry.spec) {
            Ok(keys) => keys,
            Err(fail) => panic!(
                "native {} has a malformed spec: {:?}",
                entry.name,
                interp.error_id(fail.0)
            ),
        };
        let func = interp.heap.make_function(keys, FuncClass::Native(id), None);
        interp.natives.push(*entry);
        let mut value = Cell::function(func);
        if entry.enfix {
            value.set_flag(CellFlags::ENFIX);
        }
        interp.put_field(interp.lib, entry.name, value);
    }

    let lookup = |interp: &Interp, name: &str| match interp
        .field(interp.lib, name)
        .and_then(|c| c.func_id())
    {
        Some(func) => func,
        None => panic!("control native {name} missing from lib"),
    };
    interp.labels = Some(Labels {
        break_fn: lookup(interp, "break"),
        continue_fn: lookup(interp, "continue"),
        return_fn: lookup(interp, "return"),
        leave_fn: lookup(interp, "leave"),
        quit_fn: lookup(interp, "quit"),
    });
}

impl Interp {
    fn param_index(&self, call: &Call, name: &str) -> usize {
        let index = self
            .symbols
            .find(name)
            .map(|sym| self.heap.find_param(call.func, self.symbols.canon(sym)))
            .unwrap_or(0);
        if index == 0 {
            panic!("native has no parameter named {name}");
        }
        index
    }

    /// Argument of the running native, by parameter name
    pub fn arg(&self, call: &Call, name: &str) -> Cell {
        self.heap.at(call.args, self.param_index(call, name)).clone()
    }

    /// True when refinement `name` was used in the call
    pub fn refine(&self, call: &Call, name: &str) -> bool {
        self.arg(call, name).truthy() == Some(true)
    }

    pub(crate) fn arg_loc(&self, call: &Call, name: &str) -> VarLoc {
        VarLoc {
            series: call.args,
            index: self.param_index(call, name),
        }
    }

    /// Run a branch: a block is evaluated, a function is called with no
    /// arguments, anything else is its own value
    pub(crate) fn do_branch(&mut self, branch: &Cell, out: &mut Cell) -> Result<Flow, Fail> {
        if let Some((series, index)) = branch.array_at()
            && branch.kind() == Kind::Block
        {
            return self.do_array(series, index, Specifier::Specified, out);
        }
        if branch.kind() == Kind::Function {
            return self.apply_function(branch, Vec::new(), out);
        }
        *out = branch.clone();
        Ok(Flow::Done)
    }

    /// Array and index of a block-typed argument
    pub(crate) fn block_arg(&mut self, call: &Call, name: &str) -> Result<(SeriesId, usize), Fail> {
        let value = self.arg(call, name);
        match value.array_at() {
            Some(at) => Ok(at),
            None => Err(self.script_error("invalid-arg", &[value])),
        }
    }

    /// Full length of a series value, ignoring its index (characters for
    /// strings)
    pub(crate) fn series_len(&self, cell: &Cell) -> usize {
        match cell.series_at() {
            Some((series, _)) if cell.kind().is_array() => self.heap.len(series),
            Some((series, _)) if cell.kind().is_string() => {
                String::from_utf8_lossy(self.heap.get(series).bytes()).chars().count()
            }
            Some((series, _)) => self.heap.get(series).bytes().len(),
            None => 0,
        }
    }

    /// Name of a native by dispatch id
    pub fn native_name(&self, id: NativeId) -> &'static str {
        self.natives
            .get(id.0 as usize)
            .map(|entry| entry.name)
            .unwrap_or("?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[test]
    fn test_every_native_is_in_lib() {
        let interp = Interp::new(RuntimeConfig::default());
        for entry in interp.natives.clone() {
            let value = interp.field(interp.lib, entry.name);
            let Some(value) = value else {
                panic!("{} not registered", entry.name);
            };
            assert!(value.func_id().is_some(), "{} is not a function", entry.name);
            assert_eq!(value.has_flag(CellFlags::ENFIX), entry.enfix);
        }
    }

    #[test]
    fn test_native_names_are_unique() {
        let interp = Interp::new(RuntimeConfig::default());
        let mut names: Vec<&str> = interp.natives.iter().map(|e| e.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
