//! Per-structure pattern enumeration, compaction, and permutation ranking.
//!
//! A *pattern* assigns one terminal group to each position of a structure.
//! The manager walks patterns with a mixed-radix counter whose place `i`
//! indexes into nonterminal `i`'s groups. When a structure repeats a
//! nonterminal, counters that are permutations of each other cover the same
//! probability mass, so only the *canonical* permutation (digits
//! non-decreasing within each repeated group) is emitted, standing in for
//! `strings × permutations` guesses. Reverse lookup ranks a concrete digit
//! assignment inside that compacted space.

use crate::count::{BigCount, FACTORIALS};
use crate::lookup::{LookupData, ParseStatus, TerminalLookup};
use crate::nonterminal::Nonterminal;
use crate::radix::{CounterOverflow, MixedRadixNumber};
use crate::terminals::TerminalIter;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::rc::Rc;

/// Enumeration state for one structure's pattern space.
#[derive(Debug)]
pub struct PatternManager {
    nonterminals: Vec<Rc<Nonterminal>>,
    counter: MixedRadixNumber,
    /// Positions covered by the same nonterminal share a group id.
    group_ids: Vec<u32>,
    group_sizes: FxHashMap<u32, u32>,
    has_repeats: bool,
    base_probability: f64,
}

impl PatternManager {
    pub fn new(nonterminals: Vec<Rc<Nonterminal>>, base_probability: f64) -> Self {
        let bases = nonterminals.iter().map(|nt| nt.group_count()).collect();
        let counter = MixedRadixNumber::new(bases);

        // Repeats are identified by representation, which is what makes two
        // positions interchangeable.
        let mut id_by_representation: FxHashMap<String, u32> = FxHashMap::default();
        let mut group_ids = Vec::with_capacity(nonterminals.len());
        let mut group_sizes: FxHashMap<u32, u32> = FxHashMap::default();
        let mut next_id = 0u32;
        for nonterminal in &nonterminals {
            let id = *id_by_representation
                .entry(nonterminal.representation().to_string())
                .or_insert_with(|| {
                    let id = next_id;
                    next_id += 1;
                    id
                });
            group_ids.push(id);
            *group_sizes.entry(id).or_insert(0) += 1;
        }
        let has_repeats = group_sizes.values().any(|&size| size > 1);

        PatternManager {
            nonterminals,
            counter,
            group_ids,
            group_sizes,
            has_repeats,
            base_probability,
        }
    }

    /// Back to the all-zeros counter, the highest-probability pattern.
    pub fn reset(&mut self) {
        self.counter.clear();
    }

    pub fn increment(&mut self) -> Result<(), CounterOverflow> {
        self.counter.increment()
    }

    pub fn intelligent_skip(&mut self) -> Result<(), CounterOverflow> {
        self.counter.intelligent_skip()
    }

    /// Base probability times the probability of each selected group. Not
    /// monotone in the counter, but monotone per single-place increase,
    /// which is what intelligent skipping relies on.
    pub fn pattern_probability(&self) -> f64 {
        self.probability_of(&self.counter)
    }

    /// Probability of the canonical permutation. All permutations share it
    /// mathematically; canonicalising first fixes the floating-point
    /// multiplication order so they share it exactly.
    pub fn canonical_probability(&self) -> f64 {
        self.probability_of(&self.canonicalize())
    }

    fn probability_of(&self, counter: &MixedRadixNumber) -> f64 {
        let mut probability = self.base_probability;
        for (position, nonterminal) in self.nonterminals.iter().enumerate() {
            probability *= nonterminal.probability_of_group(counter.place(position));
        }
        probability
    }

    /// First string of the current pattern: the first string of each
    /// selected group, joined by the break byte.
    pub fn pattern_identifier(&self) -> String {
        self.identifier_of(&self.counter)
    }

    /// Pattern identifier of the canonical permutation, used for
    /// cross-structure tie-breaking.
    pub fn canonical_pattern_identifier(&self) -> String {
        self.identifier_of(&self.canonicalize())
    }

    fn identifier_of(&self, counter: &MixedRadixNumber) -> String {
        let mut identifier = String::new();
        for (position, nonterminal) in self.nonterminals.iter().enumerate() {
            if position > 0 {
                identifier.push('\u{1}');
            }
            identifier.push_str(nonterminal.first_string_of_group(counter.place(position)));
        }
        identifier
    }

    /// Whether the current pattern is its class representative: digits
    /// non-decreasing left-to-right within every repeated group.
    pub fn is_first_permutation(&self) -> bool {
        !self.has_repeats || self.check_first_permutation(&self.counter)
    }

    fn check_first_permutation(&self, counter: &MixedRadixNumber) -> bool {
        let mut last_digit: FxHashMap<u32, u64> = FxHashMap::default();
        for (position, &group_id) in self.group_ids.iter().enumerate() {
            if self.group_sizes[&group_id] <= 1 {
                continue;
            }
            let digit = counter.place(position);
            if let Some(&previous) = last_digit.get(&group_id) {
                if digit < previous {
                    return false;
                }
            }
            last_digit.insert(group_id, digit);
        }
        true
    }

    /// Canonical representative of the current pattern: one pass gathers
    /// each repeated group's digits into a min-heap, a second pass rewrites
    /// the positions in ascending order.
    pub fn canonicalize(&self) -> MixedRadixNumber {
        let mut canonical = self.counter.clone();
        if self.is_first_permutation() {
            return canonical;
        }

        let mut heaps: FxHashMap<u32, BinaryHeap<Reverse<u64>>> = FxHashMap::default();
        for (position, &group_id) in self.group_ids.iter().enumerate() {
            heaps
                .entry(group_id)
                .or_default()
                .push(Reverse(canonical.place(position)));
        }
        for (position, &group_id) in self.group_ids.iter().enumerate() {
            let heap = heaps.get_mut(&group_id).expect("heap filled above");
            let Reverse(digit) = heap.pop().expect("one digit per position");
            let in_range = canonical.set_place(position, digit);
            debug_assert!(in_range, "canonical digit exceeds place base");
        }
        debug_assert!(
            self.check_first_permutation(&canonical),
            "canonicalisation produced a non-canonical counter"
        );
        canonical
    }

    /// Strings produced by the current pattern: the product of the selected
    /// group sizes.
    pub fn count_strings(&self) -> BigCount {
        let mut total = BigCount::one();
        for (position, nonterminal) in self.nonterminals.iter().enumerate() {
            total.mul_assign(&nonterminal.strings_of_group(self.counter.place(position)));
        }
        total
    }

    /// Permutations of the current pattern: `n! / ∏ mⱼ!` per repeated
    /// group, multiplied across groups.
    pub fn count_permutations(&self) -> BigCount {
        let mut total = BigCount::one();
        if !self.has_repeats {
            return total;
        }
        for digit_counts in self.counts_within_repeated_groups().values() {
            total.mul_assign(&Self::permutations_of_multiset(digit_counts));
        }
        total
    }

    /// Digit multiplicities for every repeated group at the current counter,
    /// keyed in group-id order.
    fn counts_within_repeated_groups(&self) -> BTreeMap<u32, BTreeMap<u64, u32>> {
        let mut counts: BTreeMap<u32, BTreeMap<u64, u32>> = BTreeMap::new();
        for (position, &group_id) in self.group_ids.iter().enumerate() {
            if self.group_sizes[&group_id] <= 1 {
                continue;
            }
            let digit = self.counter.place(position);
            *counts
                .entry(group_id)
                .or_default()
                .entry(digit)
                .or_insert(0) += 1;
        }
        counts
    }

    fn permutations_of_multiset(digit_counts: &BTreeMap<u64, u32>) -> BigCount {
        let total: u64 = digit_counts.values().map(|&count| u64::from(count)).sum();
        let mut permutations = BigCount::factorial(total);
        for &multiplicity in digit_counts.values() {
            let multiplicity = u64::from(multiplicity);
            if multiplicity > 1 {
                if multiplicity < FACTORIALS.len() as u64 {
                    permutations.div_u64(FACTORIALS[multiplicity as usize]);
                } else {
                    permutations.div_assign(&BigCount::factorial(multiplicity));
                }
            }
        }
        permutations
    }

    /// Rank of the current pattern within its permutation class, 0 for the
    /// canonical representative. Uses the multiset-unranking identity
    /// `offset = perms(remaining) × weakDigitRank / remainingSize`, walking
    /// each repeated group's positions left-to-right; group ranks combine
    /// in a mixed radix whose bases are the per-group permutation counts.
    /// Every division is exact.
    pub fn permutation_rank(&self) -> BigCount {
        let mut total = BigCount::zero();
        if !self.has_repeats {
            return total;
        }

        let mut counts = self.counts_within_repeated_groups();
        for (&group_id, digit_counts) in counts.iter_mut() {
            let group_perms = Self::permutations_of_multiset(digit_counts);
            let mut rank = BigCount::zero();
            let mut current_perms = group_perms.clone();
            let mut current_size = u64::from(self.group_sizes[&group_id]);

            for (position, &position_group) in self.group_ids.iter().enumerate() {
                if current_perms <= BigCount::one() {
                    // Remaining digits are already sorted.
                    break;
                }
                if position_group != group_id {
                    continue;
                }
                let digit = self.counter.place(position);
                let multiplicity = u64::from(digit_counts[&digit]);
                let weak_digit_rank: u64 = digit_counts
                    .iter()
                    .take_while(|(&other, _)| other < digit)
                    .map(|(_, &count)| u64::from(count))
                    .sum();

                let mut offset = current_perms.clone();
                offset.mul_u64(weak_digit_rank);
                offset.div_u64(current_size);
                rank.add_assign(&offset);

                current_perms.mul_u64(multiplicity);
                current_perms.div_u64(current_size);
                *digit_counts.get_mut(&digit).expect("digit counted above") -= 1;
                current_size -= 1;
            }

            debug_assert!(rank < group_perms, "permutation rank out of range");
            total.mul_assign(&group_perms);
            total.add_assign(&rank);
        }
        total
    }

    /// One string iterator per position, positioned on the current pattern's
    /// groups.
    pub fn string_iterators(&self) -> Vec<TerminalIter<'_>> {
        self.nonterminals
            .iter()
            .enumerate()
            .map(|(position, nonterminal)| nonterminal.iter_of_group(self.counter.place(position)))
            .collect()
    }

    /// Look the terminals up position by position, overwrite the counter
    /// with the matched group indexes, and rank the assignment inside the
    /// pattern-permutation space:
    /// `index = permutationRank × stringsInPattern + rankInPattern`.
    pub fn lookup_and_set(&mut self, terminals: &[String]) -> LookupData {
        debug_assert_eq!(terminals.len(), self.nonterminals.len());
        let lookups: Vec<TerminalLookup> = self
            .nonterminals
            .iter()
            .zip(terminals)
            .map(|(nonterminal, terminal)| nonterminal.lookup(terminal))
            .collect();

        if let Some(worst) = lookups
            .iter()
            .map(|lookup| lookup.status)
            .filter(|status| !status.can_parse())
            .max()
        {
            return LookupData::failure(worst);
        }

        for (position, lookup) in lookups.iter().enumerate() {
            if !self.counter.set_place(position, lookup.group_index) {
                log::error!(
                    "terminal group index {} out of range at position {}",
                    lookup.group_index,
                    position
                );
                return LookupData::failure(ParseStatus::UNEXPECTED_FAILURE);
            }
        }

        // Terminal indexes as digits of a mixed-radix number whose bases are
        // the group string counts, most significant first.
        let mut rank_in_pattern = BigCount::zero();
        for (position, lookup) in lookups.iter().enumerate() {
            let strings =
                self.nonterminals[position].strings_of_group(self.counter.place(position));
            rank_in_pattern.mul_assign(&strings);
            rank_in_pattern.add_assign(&lookup.index);
        }

        let strings_in_pattern = self.count_strings();
        let mut index = self.permutation_rank();
        index.mul_assign(&strings_in_pattern);
        index.add_assign(&rank_in_pattern);

        let canonical = self.canonicalize();
        let mut source_ids = rustc_hash::FxHashSet::default();
        for lookup in lookups {
            source_ids.extend(lookup.source_ids);
        }
        LookupData {
            status: ParseStatus::CAN_PARSE,
            probability: self.probability_of(&canonical),
            index,
            source_ids,
            pattern_id: self.identifier_of(&canonical),
        }
    }
}
