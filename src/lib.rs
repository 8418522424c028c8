//! Guesscalc: password-guess enumeration and ranking over a restricted
//! probabilistic context-free grammar.
//!
//! This crate provides:
//! - Grammar loading with memory-mapped terminals files
//! - Pattern enumeration with compaction and intelligent skipping
//! - Lexicographic generation of unseen terminals
//! - Monte Carlo sampling from the grammar distribution
//! - Reverse lookup of candidate strings to probabilities and ranks
//! - A client for precomputed sorted lookup tables
//!
//! The grammar is deliberately restricted: nonterminals are uniform
//! character-class runs (`LLL`, `DD`, …), so candidate strings parse by
//! class projection instead of general CFG parsing. Probabilities are
//! stored as hex floats and round-trip exactly.

pub mod charclass;
pub mod count;
pub mod error;
pub mod grammar_io;
pub mod lookup;
pub mod nonterminal;
pub mod pattern;
pub mod pcfg;
pub mod radix;
pub mod structure;
pub mod table;
pub mod terminals;

#[cfg(test)]
pub(crate) mod testgrammar;

// Re-exports for convenience
pub use count::BigCount;
pub use error::GrammarError;
pub use lookup::{LookupData, ParseStatus, TerminalLookup};
pub use nonterminal::{Nonterminal, NonterminalCollection};
pub use pattern::PatternManager;
pub use pcfg::{Pcfg, PcfgConfig};
pub use radix::{CounterOverflow, MixedRadixNumber};
pub use structure::Structure;
pub use table::{Bias, GuessTable};
pub use terminals::{TerminalGroup, TerminalIter};
