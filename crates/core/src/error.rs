//! Foundation-level errors
//!
//! These are the recoverable conditions the heap and context layer can
//! report. The runtime maps each onto a script error context before it
//! reaches user code; invariant violations are not errors and panic instead.

use crate::context::ContextId;
use crate::series::SeriesId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("{0} is locked")]
    LockedSeries(SeriesId),

    #[error("key {index} of {context} is locked")]
    LockedKey { context: ContextId, index: usize },

    #[error("{0} shares its keylist with a function and cannot grow")]
    SharedKeylist(ContextId),

    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("{0} is not an array")]
    NotArray(SeriesId),

    #[error("{0} has been freed")]
    Freed(SeriesId),
}

pub type CoreResult<T> = Result<T, CoreError>;
