//! Pickle decoder for packaged game data
//!
//! The client ships cached data tables as Python pickles (protocol 2, written
//! by Python 2). This crate executes the opcode stream without running any
//! Python code and renders the resulting object graph as a schema-less
//! [`serde_json::Value`].
//!
//! # Value mapping
//!
//! - `None`, bools, ints, floats map to their JSON counterparts. Integers
//!   outside the `i64`/`u64` range become decimal strings, non-finite floats
//!   become `null`.
//! - Python 2 `str` is decoded as UTF-8, falling back to Latin-1.
//! - Lists, tuples, sets and frozensets become arrays in stream order.
//! - Dicts become objects in insertion order. Non-string keys use their JSON
//!   text (`30000001`, `null`, `[1,2]`).
//! - Python 3 `bytes` and `bytearray` become base64 strings.
//! - Globals become `"module.name"` strings.
//! - Other reconstructed instances become objects with a `__class__` key,
//!   `__args__` for constructor arguments, and their `__dict__` state merged
//!   in.
//!
//! ```
//! let data = b"\x80\x02}q\x00U\x04nameq\x01U\x04Jitaq\x02s.";
//! let value = evedump_pickle::decode(data).unwrap();
//! assert_eq!(value["name"], "Jita");
//! ```

mod machine;
mod opcodes;
mod reader;
mod value;

pub use value::{Object, Value};

use machine::Machine;

/// Highest pickle protocol understood by the decoder
pub const HIGHEST_PROTOCOL: u8 = 5;

/// Errors from pickle decoding
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unexpected end of data at offset {offset}: need {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("Unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("Unsupported opcode {name} at offset {offset}")]
    UnsupportedOpcode { name: &'static str, offset: usize },

    #[error("Unsupported pickle protocol {0}")]
    UnsupportedProtocol(u8),

    #[error("Stack underflow at offset {offset}")]
    StackUnderflow { offset: usize },

    #[error("No mark on the stack at offset {offset}")]
    MissingMark { offset: usize },

    #[error("Memo entry {0} referenced before it was stored")]
    MissingMemo(u32),

    #[error("Invalid {kind} literal at offset {offset}: {text:?}")]
    InvalidLiteral {
        kind: &'static str,
        text: String,
        offset: usize,
    },

    #[error("Integer of {0} bytes exceeds 128 bits")]
    IntegerTooWide(usize),

    #[error("Odd number of dict items at offset {offset}")]
    OddDictItems { offset: usize },

    #[error("{op} cannot be applied to {target} at offset {offset}")]
    InvalidTarget {
        op: &'static str,
        target: &'static str,
        offset: usize,
    },

    #[error("Data ended without a STOP opcode")]
    MissingStop,

    #[error("Object graph nested deeper than {0} levels")]
    RecursionLimit(usize),

    #[error("Decoded output exceeds {0} values")]
    OutputTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// JSON values any stream may render to, however small
const MIN_OUTPUT_NODES: usize = 1_000_000;

/// Additional JSON values allowed per input byte
const OUTPUT_NODES_PER_BYTE: usize = 16;

/// Decode a pickle stream into a JSON value
///
/// Shared memo entries are expanded at every use, so output size is capped
/// relative to the input and exceeding it fails with
/// [`Error::OutputTooLarge`].
pub fn decode(data: &[u8]) -> Result<serde_json::Value> {
    let (root, memo) = Machine::new(data).run()?;
    let budget = data
        .len()
        .saturating_mul(OUTPUT_NODES_PER_BYTE)
        .saturating_add(MIN_OUTPUT_NODES);
    value::to_json(&root, &memo, budget)
}
