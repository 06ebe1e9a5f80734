//! Reb Core: values, series, contexts and functions
//!
//! This crate holds the data model of the interpreter and nothing that
//! evaluates. Everything here is plain data addressed by ids into a `Heap`;
//! the runtime crate layers binding, frames and control flow on top.
//!
//! # Modules
//!
//! - `kind`: closed datatype enumeration and `TypeSet` masks
//! - `symbol`: interned spellings with case-folded canonical ids
//! - `cell`: the uniform value record and word `Binding`
//! - `series`: terminated element buffers
//! - `heap`: series pool, manual/guard stacks, allocation stats
//! - `context`: keylist + varlist pairs, typeset keys
//! - `function`: paramlists, function classes
//! - `error`: foundation-level `CoreError`

pub mod cell;
pub mod context;
pub mod error;
pub mod function;
pub mod heap;
pub mod kind;
pub mod series;
pub mod symbol;

pub use cell::{Binding, Cell, CellFlags, Payload};
pub use context::{ContextId, ContextKind, Key, KeyFlags, ParamClass, key_at};
pub use error::{CoreError, CoreResult};
pub use function::{FuncClass, FuncId, NativeId};
pub use heap::{Heap, HeapStats, Liveness, VarLoc};
pub use kind::{Kind, TypeSet};
pub use series::{Misc, Origin, Series, SeriesFlags, SeriesId, Width};
pub use symbol::{Symbol, SymbolTable};
