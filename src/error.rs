//! Fatal errors raised while loading or enumerating a grammar.
//!
//! Per-string lookup outcomes are not errors; they travel as
//! [`ParseStatus`](crate::lookup::ParseStatus) values inside lookup results.
//! Counter overflow is likewise a value return, see
//! [`CounterOverflow`](crate::radix::CounterOverflow).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that terminate grammar loading or enumeration.
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writing output failed: {0}")]
    Output(#[from] io::Error),

    #[error("structures file {path} is missing the `S ->` header")]
    MissingHeader { path: PathBuf },

    #[error("structures file {path} has no blank line terminating the data block")]
    MissingTerminator { path: PathBuf },

    #[error("malformed structure line: {line:?}")]
    MalformedStructureLine { line: String },

    #[error("malformed terminal line at byte {offset} of {context}")]
    MalformedTerminalLine { context: String, offset: usize },

    #[error("probability {value} outside (0, 1] in {context}")]
    BadProbability { value: f64, context: String },

    #[error("first terminal {terminal:?} does not match representation {representation:?}")]
    TerminalLengthMismatch {
        representation: String,
        terminal: String,
    },

    #[error("generator mask {mask:?} contains characters outside {{L,D,S}}")]
    BadMask { mask: String },

    #[error("generator mask {mask:?} leaves no unseen terminals")]
    ExhaustedUnseenSpace { mask: String },

    #[error("empty source id in list {list:?}")]
    EmptySourceId { list: String },

    #[error("lookup table {path} is missing its total-count trailer line")]
    MissingTableTrailer { path: PathBuf },

    #[error("malformed lookup table line at byte {offset} of {path}")]
    MalformedTableLine { path: PathBuf, offset: usize },

    #[error("generated string {string:?} from structure {structure} failed to re-parse")]
    UnparseableGenerated { structure: String, string: String },
}
