//! Terminal groups backed by a slice of the memory-mapped terminals file.

use crate::charclass;
use crate::count::BigCount;
use crate::error::GrammarError;
use crate::grammar_io::{self, add_source_ids};
use crate::lookup::{LookupData, ParseStatus};
use memmap2::Mmap;
use rustc_hash::FxHashSet;
use std::ops::Range;
use std::rc::Rc;

/// A maximal run of contiguous, equal-probability terminals inside the
/// mapped file of one nonterminal.
#[derive(Debug)]
pub struct SeenTerminalGroup {
    data: Rc<Mmap>,
    span: Range<usize>,
    probability: f64,
    terminal_count: u64,
    representation: Rc<str>,
    needs_casing: bool,
    first_string: String,
}

impl SeenTerminalGroup {
    pub(crate) fn new(
        data: Rc<Mmap>,
        span: Range<usize>,
        probability: f64,
        terminal_count: u64,
        representation: Rc<str>,
    ) -> Result<Self, GrammarError> {
        let first = grammar_io::lines(&data[span.clone()])
            .next()
            .and_then(grammar_io::parse_terminal_line)
            .ok_or_else(|| GrammarError::MalformedTerminalLine {
                context: representation.to_string(),
                offset: span.start,
            })?;
        if first.terminal.len() != representation.len() {
            return Err(GrammarError::TerminalLengthMismatch {
                representation: representation.to_string(),
                terminal: first.terminal.to_string(),
            });
        }
        let needs_casing = charclass::needs_casing(&representation);
        let first_string = if needs_casing {
            charclass::uppercase_to_match(&representation, first.terminal)
        } else {
            first.terminal.to_string()
        };
        Ok(SeenTerminalGroup {
            data,
            span,
            probability,
            terminal_count,
            representation,
            needs_casing,
            first_string,
        })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn count(&self) -> BigCount {
        BigCount::from(self.terminal_count)
    }

    pub fn first_string(&self) -> &str {
        &self.first_string
    }

    /// Linear scan for `terminal`, returning its zero-based index within the
    /// group. Groups are small and lookup cost is dominated elsewhere.
    pub fn lookup(&self, terminal: &str) -> LookupData {
        let mut index = 0u64;
        for line in grammar_io::lines(&self.data[self.span.clone()]) {
            let Some(parsed) = grammar_io::parse_terminal_line(line) else {
                log::error!(
                    "unparseable line inside seen group of {}",
                    self.representation
                );
                return LookupData::failure(ParseStatus::UNEXPECTED_FAILURE);
            };
            if parsed.terminal == terminal {
                if parsed.probability != self.probability {
                    log::error!(
                        "terminal {:?} carries probability {} but its group has {}",
                        parsed.terminal,
                        parsed.probability,
                        self.probability
                    );
                    return LookupData::failure(ParseStatus::UNEXPECTED_FAILURE);
                }
                let mut source_ids = FxHashSet::default();
                if let Err(error) = add_source_ids(parsed.source_ids, &mut source_ids) {
                    log::error!("bad source ids in seen group lookup: {error}");
                    return LookupData::failure(ParseStatus::UNEXPECTED_FAILURE);
                }
                return LookupData {
                    status: ParseStatus::CAN_PARSE,
                    probability: self.probability,
                    index: BigCount::from(index),
                    source_ids,
                    pattern_id: String::new(),
                };
            }
            index += 1;
        }
        LookupData::failure(ParseStatus::TERMINAL_NOT_FOUND)
    }

    pub fn iter(&self) -> SeenIter<'_> {
        SeenIter {
            group: self,
            position: self.span.start,
        }
    }
}

/// Forward iterator over a seen group's terminals in file order.
#[derive(Debug)]
pub struct SeenIter<'a> {
    group: &'a SeenTerminalGroup,
    position: usize,
}

impl SeenIter<'_> {
    pub fn reset(&mut self) {
        self.position = self.group.span.start;
    }
}

impl Iterator for SeenIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.position >= self.group.span.end {
            return None;
        }
        let rest = &self.group.data[self.position..self.group.span.end];
        let line = grammar_io::lines(rest).next()?;
        self.position += line.len();
        let Some(parsed) = grammar_io::parse_terminal_line(line) else {
            log::error!(
                "unparseable line inside seen group of {}",
                self.group.representation
            );
            return None;
        };
        Some(if self.group.needs_casing {
            charclass::uppercase_to_match(&self.group.representation, parsed.terminal)
        } else {
            parsed.terminal.to_string()
        })
    }
}
