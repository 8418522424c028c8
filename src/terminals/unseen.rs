//! Terminal groups generated lexicographically from a mask, covering every
//! string the training data never produced.
//!
//! The generator mask (e.g. `LLD`) spans a space of `∏ radix(maskᵢ)`
//! candidate terminals, indexed as a mixed-radix number with **position 0 as
//! the most significant digit**, so ascending index order is lexicographic
//! string order. Seen terminals of the same nonterminal are carved out of
//! the space: enumeration sweeps fixed-size regions, marking the seen
//! members in a bit array and yielding the characters at every unmarked
//! index.

use crate::charclass;
use crate::count::BigCount;
use crate::error::GrammarError;
use crate::grammar_io;
use crate::lookup::{LookupData, ParseStatus};
use bitvec::vec::BitVec;
use memmap2::Mmap;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

/// How much of the unseen space one region bitmap covers.
pub(crate) const REGION_SIZE: usize = 1 << 30;

thread_local! {
    // Scratch bitmap for load-time sweeps, reused across groups. The RefCell
    // borrow doubles as the in-use flag: re-entrant use panics immediately.
    static REGION_SCRATCH: RefCell<BitVec> = RefCell::new(BitVec::new());
}

fn with_scratch<T>(f: impl FnOnce(&mut BitVec) -> T) -> T {
    REGION_SCRATCH.with(|cell| {
        let mut bits = cell
            .try_borrow_mut()
            .expect("unseen region scratchpad already in use");
        f(&mut bits)
    })
}

/// The complement of the seen terminals within one generator mask's space.
#[derive(Debug)]
pub struct UnseenTerminalGroup {
    data: Rc<Mmap>,
    seen_span: Range<usize>,
    mask: String,
    representation: Rc<str>,
    needs_casing: bool,
    probability: f64,
    total_terminals: BigUint,
    unseen_count: BigUint,
    first_string: String,
}

impl UnseenTerminalGroup {
    /// Build the group from its descriptor line. `total_mass` is the
    /// probability training assigned to the whole unseen bucket;
    /// `seen_span` delimits the seen section of the nonterminal's file.
    pub(crate) fn new(
        data: Rc<Mmap>,
        seen_span: Range<usize>,
        mask: &str,
        total_mass: f64,
        representation: Rc<str>,
    ) -> Result<Self, GrammarError> {
        if !charclass::mask_is_valid(mask) {
            return Err(GrammarError::BadMask {
                mask: mask.to_string(),
            });
        }

        let mut total_terminals = BigUint::from(1u64);
        for tag in mask.bytes() {
            total_terminals *= charclass::radix_of(tag).expect("mask validated above");
        }

        let needs_casing = charclass::needs_casing(&representation);
        let mut group = UnseenTerminalGroup {
            data,
            seen_span,
            mask: mask.to_string(),
            representation,
            needs_casing,
            probability: 0.0,
            total_terminals,
            unseen_count: BigUint::zero(),
            first_string: String::new(),
        };

        let mut seen_generatable = BigUint::zero();
        group.for_each_seen_terminal(|terminal| {
            if group.can_generate(terminal) {
                seen_generatable += 1u64;
            }
        });
        if seen_generatable >= group.total_terminals {
            return Err(GrammarError::ExhaustedUnseenSpace {
                mask: mask.to_string(),
            });
        }
        group.unseen_count = &group.total_terminals - seen_generatable;
        group.probability = total_mass
            / group
                .unseen_count
                .to_f64()
                .expect("unseen count converts to f64");

        // First unseen string: sweep regions until an unmarked index shows up.
        let first_index = with_scratch(|bits| {
            let mut region_start = BigUint::zero();
            loop {
                let size = group.fill_region(&region_start, bits, REGION_SIZE);
                if let Some(open) = bits.iter_zeros().next() {
                    return Some(&region_start + open as u64);
                }
                region_start += size as u64;
                if region_start >= group.total_terminals {
                    return None;
                }
            }
        });
        let Some(first_index) = first_index else {
            return Err(GrammarError::ExhaustedUnseenSpace {
                mask: mask.to_string(),
            });
        };
        group.first_string = group.generate_terminal(&first_index);
        Ok(group)
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn count(&self) -> BigCount {
        BigCount::from(self.unseen_count.clone())
    }

    pub fn first_string(&self) -> &str {
        &self.first_string
    }

    /// Whether the mask can produce `terminal` at all.
    pub fn can_generate(&self, terminal: &str) -> bool {
        terminal.len() == self.mask.len()
            && self
                .mask
                .bytes()
                .zip(terminal.bytes())
                .all(|(tag, byte)| charclass::char_index(tag, byte).is_some())
    }

    /// Lexicographic index of a terminal the mask can generate. When `bound`
    /// is given the conversion stops as soon as the partial index exceeds
    /// it; the returned value is then only known to be above the bound.
    pub(crate) fn terminal_index(&self, terminal: &str, bound: Option<&BigUint>) -> BigUint {
        let mut index = BigUint::zero();
        for (tag, byte) in self.mask.bytes().zip(terminal.bytes()) {
            let radix = charclass::radix_of(tag).expect("mask validated at load");
            let digit = charclass::char_index(tag, byte).expect("caller checked can_generate");
            index = index * radix + digit;
            if let Some(bound) = bound {
                if &index > bound {
                    return index;
                }
            }
        }
        index
    }

    /// Inverse of [`Self::terminal_index`], with uppercasing applied to
    /// match the owning nonterminal's representation.
    pub(crate) fn generate_terminal(&self, index: &BigUint) -> String {
        let mask = self.mask.as_bytes();
        let mut remaining = index.clone();
        let mut bytes = vec![0u8; mask.len()];
        for (position, &tag) in mask.iter().enumerate().rev() {
            let radix = charclass::radix_of(tag).expect("mask validated at load");
            let digit = (&remaining % radix).to_u64().expect("digit below radix");
            bytes[position] = charclass::char_at(tag, digit);
            remaining /= radix;
        }
        let terminal = String::from_utf8(bytes).expect("class characters are ASCII");
        if self.needs_casing {
            charclass::uppercase_to_match(&self.representation, &terminal)
        } else {
            terminal
        }
    }

    /// Rank the terminal within the unseen complement: its lexicographic
    /// index minus the seen terminals strictly below it.
    pub fn lookup(&self, terminal: &str) -> LookupData {
        if !self.can_generate(terminal) {
            return LookupData::failure(
                ParseStatus::TERMINAL_NOT_FOUND | ParseStatus::TERMINAL_CANT_BE_GENERATED,
            );
        }
        let index = self.terminal_index(terminal, None);

        let mut seen_below = BigUint::zero();
        let mut collision = false;
        self.for_each_seen_terminal(|seen| {
            if collision || !self.can_generate(seen) {
                return;
            }
            let seen_index = self.terminal_index(seen, Some(&index));
            if seen_index < index {
                seen_below += 1u64;
            } else if seen_index == index {
                if seen != terminal {
                    log::error!(
                        "terminal {:?} and seen terminal {:?} share index {} under mask {}",
                        terminal,
                        seen,
                        seen_index,
                        self.mask
                    );
                }
                collision = true;
            }
        });
        if collision {
            return LookupData::failure(
                ParseStatus::TERMINAL_NOT_FOUND | ParseStatus::TERMINAL_COLLISION,
            );
        }

        let mut source_ids = FxHashSet::default();
        source_ids.insert("UNSEEN".to_string());
        LookupData {
            status: ParseStatus::CAN_PARSE,
            probability: self.probability,
            index: BigCount::from(index - seen_below),
            source_ids,
            pattern_id: String::new(),
        }
    }

    pub fn iter(&self) -> UnseenIter<'_> {
        self.iter_with_region(REGION_SIZE)
    }

    fn iter_with_region(&self, region_size: usize) -> UnseenIter<'_> {
        let mut iter = UnseenIter {
            group: self,
            region_size,
            region_start: BigUint::zero(),
            bits: BitVec::new(),
            cursor: 0,
            exhausted: false,
        };
        self.fill_region(&iter.region_start, &mut iter.bits, region_size);
        iter
    }

    /// Resize `bits` to the true size of the region starting at
    /// `region_start`, clear it, and mark every seen terminal whose index
    /// falls inside. Returns the region size.
    fn fill_region(&self, region_start: &BigUint, bits: &mut BitVec, region_size: usize) -> usize {
        let remaining = &self.total_terminals - region_start;
        let size = remaining
            .to_u64()
            .map_or(region_size, |r| r.min(region_size as u64) as usize);
        bits.clear();
        bits.resize(size, false);
        let region_end = region_start + (size as u64 - 1);

        self.for_each_seen_terminal(|terminal| {
            if !self.can_generate(terminal) {
                return;
            }
            let index = self.terminal_index(terminal, Some(&region_end));
            if &index >= region_start && index <= region_end {
                let offset = (index - region_start)
                    .to_u64()
                    .expect("offset fits the region") as usize;
                bits.set(offset, true);
            }
        });
        size
    }

    fn for_each_seen_terminal(&self, mut f: impl FnMut(&str)) {
        for line in grammar_io::lines(&self.data[self.seen_span.clone()]) {
            if grammar_io::is_blank_line(line) {
                break;
            }
            let parsed =
                grammar_io::parse_terminal_line(line).expect("seen lines validated at load");
            f(parsed.terminal);
        }
    }
}

/// Iterator over the unseen terminals in ascending lexicographic order.
/// Each live iterator owns its region bitmap; several can be active at once
/// inside one Cartesian product.
#[derive(Debug)]
pub struct UnseenIter<'a> {
    group: &'a UnseenTerminalGroup,
    region_size: usize,
    region_start: BigUint,
    bits: BitVec,
    cursor: usize,
    exhausted: bool,
}

impl UnseenIter<'_> {
    pub fn reset(&mut self) {
        self.region_start = BigUint::zero();
        self.group
            .fill_region(&self.region_start, &mut self.bits, self.region_size);
        self.cursor = 0;
        self.exhausted = false;
    }
}

impl Iterator for UnseenIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.exhausted {
                return None;
            }
            while self.cursor < self.bits.len() {
                let position = self.cursor;
                self.cursor += 1;
                if !self.bits[position] {
                    let index = &self.region_start + position as u64;
                    return Some(self.group.generate_terminal(&index));
                }
            }
            self.region_start += self.bits.len() as u64;
            if self.region_start >= self.group.total_terminals {
                self.exhausted = true;
                return None;
            }
            self.group
                .fill_region(&self.region_start, &mut self.bits, self.region_size);
            self.cursor = 0;
        }
    }
}
