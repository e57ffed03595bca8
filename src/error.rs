//! Input-error types.
//!
//! Only the first of §7's three error classes (malformed workload input)
//! is represented as a `Result`-carrying type. Programming invariants
//! (an out-of-range address reaching the fabric after admission, an
//! impossible op on a running process, a barrier underflow) are bugs,
//! not input problems, and are raised with `assert!`/`panic!` at the
//! point of violation instead of being threaded through `Result`.

use thiserror::Error;

/// A malformed workload: bad header, bad process description, or an
/// opcode the loader does not recognize.
#[derive(Debug, Error)]
pub enum ProsimError {
    #[error("bad input: expected header `num_procs quantum num_threads`, got {0:?}")]
    BadHeader(String),

    #[error("bad input: could not load program description for process {index}")]
    BadProcessDescription { index: usize },

    #[error("process name {0:?} is longer than 10 characters")]
    NameTooLong(String),

    #[error("unknown opcode {0:?}")]
    UnknownOpcode(String),

    #[error("opcode {op} requires an integer argument, got {arg:?}")]
    BadArgument { op: String, arg: String },

    #[error("address {0} is out of range (valid addresses are node*100+pid for node,pid in [1,100])")]
    AddressOutOfRange(i64),

    #[error("node id {0} is out of range (valid node ids are in [1,100])")]
    NodeOutOfRange(i64),

    #[error("unexpected end of input while reading process {index}")]
    UnexpectedEof { index: usize },
}
