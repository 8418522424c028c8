//! Lookup results and the parse-status bitset they carry.
//!
//! Per-string lookup outcomes are values, not errors: a failed parse flows
//! up as a [`ParseStatus`] with the relevant failure bits set. The status
//! overrides the other fields, i.e. when it is not parseable the
//! probability, index, and identifier are meaningless.

use crate::count::BigCount;
use rustc_hash::FxHashSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitset describing the outcome of parsing a candidate string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParseStatus(u32);

impl ParseStatus {
    /// The authoritative success flag.
    pub const CAN_PARSE: ParseStatus = ParseStatus(1);
    /// Legitimate, but below the lookup table's known minimum probability.
    pub const BEYOND_CUTOFF: ParseStatus = ParseStatus(1 << 1);
    /// No structure matched character-class-wise.
    pub const STRUCTURE_NOT_FOUND: ParseStatus = ParseStatus(1 << 2);
    /// A structure matched but no terminal group contained the terminal.
    pub const TERMINAL_NOT_FOUND: ParseStatus = ParseStatus(1 << 3);
    /// An unseen lookup landed exactly on a seen terminal.
    pub const TERMINAL_COLLISION: ParseStatus = ParseStatus(1 << 4);
    /// The generator mask cannot produce this string.
    pub const TERMINAL_CANT_BE_GENERATED: ParseStatus = ParseStatus(1 << 5);
    /// An invariant was violated; treat as a bug.
    pub const UNEXPECTED_FAILURE: ParseStatus = ParseStatus(1 << 6);

    pub fn contains(self, other: ParseStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn can_parse(self) -> bool {
        self.contains(Self::CAN_PARSE)
    }

    /// Raw bits, used for the negative guess-number diagnostic encoding and
    /// for priority ordering between non-parseable statuses.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ParseStatus {
    type Output = ParseStatus;

    fn bitor(self, rhs: ParseStatus) -> ParseStatus {
        ParseStatus(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParseStatus {
    fn bitor_assign(&mut self, rhs: ParseStatus) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ParseStatus, &str); 7] = [
            (ParseStatus::CAN_PARSE, "CanParse"),
            (ParseStatus::BEYOND_CUTOFF, "BeyondCutoff"),
            (ParseStatus::STRUCTURE_NOT_FOUND, "StructureNotFound"),
            (ParseStatus::TERMINAL_NOT_FOUND, "TerminalNotFound"),
            (ParseStatus::TERMINAL_COLLISION, "TerminalCollision"),
            (
                ParseStatus::TERMINAL_CANT_BE_GENERATED,
                "TerminalCantBeGenerated",
            ),
            (ParseStatus::UNEXPECTED_FAILURE, "UnexpectedFailure"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "Empty")?;
        }
        Ok(())
    }
}

/// Result of looking up a candidate string.
#[derive(Clone, Debug)]
pub struct LookupData {
    pub status: ParseStatus,
    /// Probability of the string, or -1.0 when not parseable.
    pub probability: f64,
    /// Rank of the string within its pattern-permutation space.
    pub index: BigCount,
    /// Union of the provenance tags of everything that produced the string.
    pub source_ids: FxHashSet<String>,
    /// Canonical pattern identifier: first string of the canonicalized
    /// pattern, with terminals joined by the break byte.
    pub pattern_id: String,
}

impl LookupData {
    /// A lookup that failed with the given status.
    pub fn failure(status: ParseStatus) -> Self {
        LookupData {
            status,
            probability: -1.0,
            index: BigCount::zero(),
            source_ids: FxHashSet::default(),
            pattern_id: String::new(),
        }
    }
}

/// Result of looking up a terminal within one nonterminal: the group-level
/// outcome plus which terminal group matched.
#[derive(Clone, Debug)]
pub struct TerminalLookup {
    pub status: ParseStatus,
    pub probability: f64,
    /// Index of the terminal within its group. Unseen ranks can exceed a
    /// machine word.
    pub index: BigCount,
    pub source_ids: FxHashSet<String>,
    pub group_index: u64,
}

impl TerminalLookup {
    pub fn failure(status: ParseStatus) -> Self {
        TerminalLookup {
            status,
            probability: -1.0,
            index: BigCount::zero(),
            source_ids: FxHashSet::default(),
            group_index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_composition() {
        let status = ParseStatus::TERMINAL_NOT_FOUND | ParseStatus::TERMINAL_COLLISION;
        assert!(status.contains(ParseStatus::TERMINAL_NOT_FOUND));
        assert!(status.contains(ParseStatus::TERMINAL_COLLISION));
        assert!(!status.contains(ParseStatus::CAN_PARSE));
        assert!(!status.can_parse());
        assert_eq!(status.bits(), 0b11000);
    }

    #[test]
    fn test_status_priority_ordering() {
        assert!(ParseStatus::STRUCTURE_NOT_FOUND < ParseStatus::TERMINAL_NOT_FOUND);
        assert!(
            ParseStatus::TERMINAL_NOT_FOUND
                < ParseStatus::TERMINAL_NOT_FOUND | ParseStatus::TERMINAL_COLLISION
        );
    }

    #[test]
    fn test_status_display() {
        let status = ParseStatus::TERMINAL_NOT_FOUND | ParseStatus::TERMINAL_CANT_BE_GENERATED;
        assert_eq!(status.to_string(), "TerminalNotFound|TerminalCantBeGenerated");
        assert_eq!(ParseStatus::default().to_string(), "Empty");
    }
}
