//! Nonterminals and the process-wide collection that deduplicates them.
//!
//! A nonterminal is identified by its class representation (e.g. `LLL`,
//! `UUDD`). It memory-maps its terminals file once and carves it into
//! [`TerminalGroup`]s: seen groups end at each probability change, and every
//! descriptor line after the blank separator becomes one unseen group whose
//! `source_ids` field is the generator mask. Structures share nonterminals
//! through [`NonterminalCollection`], so each file is mapped exactly once
//! for the life of the grammar.

use crate::charclass;
use crate::count::BigCount;
use crate::error::GrammarError;
use crate::grammar_io::{self, parse_terminal_line};
use crate::lookup::{ParseStatus, TerminalLookup};
use crate::terminals::{SeenTerminalGroup, TerminalGroup, TerminalIter, UnseenTerminalGroup};
use memmap2::Mmap;
use rand::Rng;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// One nonterminal of the grammar and its ordered terminal groups.
#[derive(Debug)]
pub struct Nonterminal {
    representation: Rc<str>,
    groups: Vec<TerminalGroup>,
}

impl Nonterminal {
    /// Map the terminals file backing `representation` and index its groups.
    /// `U` representations share the file of their all-`L` spelling.
    pub fn load(representation: &str, terminals_dir: &Path) -> Result<Self, GrammarError> {
        let stem = charclass::terminal_file_stem(representation);
        let path = terminals_dir.join(format!("{stem}.txt"));
        let file = File::open(&path).map_err(|source| GrammarError::Io {
            path: path.clone(),
            source,
        })?;
        // Safety: the mapping is read-only and the grammar files are not
        // modified while the process runs.
        let data = unsafe { Mmap::map(&file) }.map_err(|source| GrammarError::Io {
            path: path.clone(),
            source,
        })?;
        let data = Rc::new(data);
        let representation: Rc<str> = Rc::from(representation);

        let groups = Self::scan_groups(&data, &representation, &path)?;
        log::debug!(
            "nonterminal {} has {} terminal groups",
            representation,
            groups.len()
        );
        Ok(Nonterminal {
            representation,
            groups,
        })
    }

    /// Single pass over the mapped file: seen groups break at probability
    /// changes, the blank line switches to unseen descriptors.
    fn scan_groups(
        data: &Rc<Mmap>,
        representation: &Rc<str>,
        path: &Path,
    ) -> Result<Vec<TerminalGroup>, GrammarError> {
        let mut groups = Vec::new();
        let mut offset = 0usize;
        let mut in_seen = true;
        let mut seen_end = data.len();
        // Start offset, probability, and terminal count of the open group.
        let mut pending: Option<(usize, f64, u64)> = None;

        for line in grammar_io::lines(data) {
            if grammar_io::is_blank_line(line) {
                if let Some((start, probability, count)) = pending.take() {
                    groups.push(TerminalGroup::Seen(SeenTerminalGroup::new(
                        Rc::clone(data),
                        start..offset,
                        probability,
                        count,
                        Rc::clone(representation),
                    )?));
                }
                if in_seen {
                    in_seen = false;
                    seen_end = offset;
                }
                offset += line.len();
                continue;
            }

            let parsed =
                parse_terminal_line(line).ok_or_else(|| GrammarError::MalformedTerminalLine {
                    context: path.display().to_string(),
                    offset,
                })?;

            if in_seen {
                pending = match pending.take() {
                    Some((start, probability, count)) if probability == parsed.probability => {
                        Some((start, probability, count + 1))
                    }
                    Some((start, probability, count)) => {
                        if parsed.probability > probability {
                            log::warn!(
                                "terminal groups of {} are not in descending probability order",
                                representation
                            );
                        }
                        groups.push(TerminalGroup::Seen(SeenTerminalGroup::new(
                            Rc::clone(data),
                            start..offset,
                            probability,
                            count,
                            Rc::clone(representation),
                        )?));
                        Some((offset, parsed.probability, 1))
                    }
                    None => Some((offset, parsed.probability, 1)),
                };
            } else {
                // The source_ids field of a descriptor line is the mask.
                groups.push(TerminalGroup::Unseen(UnseenTerminalGroup::new(
                    Rc::clone(data),
                    0..seen_end,
                    parsed.source_ids,
                    parsed.probability,
                    Rc::clone(representation),
                )?));
            }
            offset += line.len();
        }

        if let Some((start, probability, count)) = pending.take() {
            groups.push(TerminalGroup::Seen(SeenTerminalGroup::new(
                Rc::clone(data),
                start..offset,
                probability,
                count,
                Rc::clone(representation),
            )?));
        }
        Ok(groups)
    }

    pub fn representation(&self) -> &str {
        &self.representation
    }

    pub fn group_count(&self) -> u64 {
        self.groups.len() as u64
    }

    pub fn group(&self, index: u64) -> &TerminalGroup {
        &self.groups[index as usize]
    }

    pub fn probability_of_group(&self, index: u64) -> f64 {
        self.groups[index as usize].probability()
    }

    pub fn strings_of_group(&self, index: u64) -> BigCount {
        self.groups[index as usize].count()
    }

    pub fn first_string_of_group(&self, index: u64) -> &str {
        self.groups[index as usize].first_string()
    }

    pub fn iter_of_group(&self, index: u64) -> TerminalIter<'_> {
        self.groups[index as usize].iter()
    }

    /// Total number of terminals across all groups.
    pub fn count_strings(&self) -> BigCount {
        let mut total = BigCount::zero();
        for group in &self.groups {
            total.add_assign(&group.count());
        }
        total
    }

    /// `Σ groupᵢ.prob × |groupᵢ|`, which training normalises to 1.
    pub fn probability_mass(&self) -> f64 {
        self.groups
            .iter()
            .map(|group| group.probability() * group.count().to_f64())
            .sum()
    }

    /// Look up a terminal: verify the class representation matches, then
    /// query the groups in descending probability order with the lowercased
    /// input (the mapped data is lowercased; `U` positions only differ on
    /// output).
    pub fn lookup(&self, input: &str) -> TerminalLookup {
        if charclass::projection(input.as_bytes()) != *self.representation {
            return TerminalLookup::failure(ParseStatus::TERMINAL_NOT_FOUND);
        }
        let lowered = input.to_ascii_lowercase();
        for (group_index, group) in self.groups.iter().enumerate() {
            let result = group.lookup(&lowered);
            if result.status.can_parse() {
                return TerminalLookup {
                    status: result.status,
                    probability: result.probability,
                    index: result.index,
                    source_ids: result.source_ids,
                    group_index: group_index as u64,
                };
            }
        }
        TerminalLookup::failure(
            ParseStatus::TERMINAL_NOT_FOUND | ParseStatus::TERMINAL_CANT_BE_GENERATED,
        )
    }

    /// Whether any terminal group can produce `input`.
    pub fn can_produce(&self, input: &str) -> bool {
        self.lookup(input).status.can_parse()
    }

    /// Draw a terminal group with probability proportional to the mass it
    /// covers (`group.prob × |group|`).
    pub fn produce_random_group<R: Rng>(&self, rng: &mut R) -> u64 {
        let mut remaining = rng.gen_range(0.0..1.0);
        for (index, group) in self.groups.iter().enumerate() {
            remaining -= group.probability() * group.count().to_f64();
            if remaining < 0.0 {
                return index as u64;
            }
        }
        // Only reachable when the grammar is not normalised; the deviation
        // was already reported at load time.
        self.groups.len() as u64 - 1
    }

    /// Draw a terminal uniformly from one group.
    pub fn produce_random_string_of_group<R: Rng>(&self, index: u64, rng: &mut R) -> String {
        let group = &self.groups[index as usize];
        let limit = group
            .count()
            .to_u64()
            .unwrap_or(u64::MAX)
            .max(1);
        let target = rng.gen_range(0..limit);
        group
            .iter()
            .nth(target as usize)
            .expect("group produces at least `target + 1` terminals")
    }
}

/// Get-or-create cache of nonterminals keyed by representation. The
/// collection exclusively owns every nonterminal; structures hold shared
/// handles. Nothing is evicted before the grammar itself is dropped.
#[derive(Debug)]
pub struct NonterminalCollection {
    terminals_dir: PathBuf,
    cache: FxHashMap<String, Rc<Nonterminal>>,
}

impl NonterminalCollection {
    pub fn new(terminals_dir: impl Into<PathBuf>) -> Self {
        NonterminalCollection {
            terminals_dir: terminals_dir.into(),
            cache: FxHashMap::default(),
        }
    }

    pub fn get_or_create(&mut self, representation: &str) -> Result<Rc<Nonterminal>, GrammarError> {
        if let Some(existing) = self.cache.get(representation) {
            return Ok(Rc::clone(existing));
        }
        let loaded = Rc::new(Nonterminal::load(representation, &self.terminals_dir)?);
        self.cache
            .insert(representation.to_string(), Rc::clone(&loaded));
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Nonterminal>> {
        self.cache.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testgrammar;

    #[test]
    fn test_groups_break_on_probability_change() {
        let grammar = testgrammar::grammar(
            &[("LL", 1.0)],
            &[(
                "LL",
                "aa\t0x1.0p-1\ts1\nab\t0x1.0p-2\ts1\nba\t0x1.0p-2\ts2\n",
            )],
        );
        let nt = Nonterminal::load("LL", &grammar.terminals()).unwrap();
        assert_eq!(nt.group_count(), 2);
        assert_eq!(nt.probability_of_group(0), 0.5);
        assert_eq!(nt.probability_of_group(1), 0.25);
        assert_eq!(nt.strings_of_group(1), BigCount::from(2));
        assert_eq!(nt.count_strings(), BigCount::from(3));
    }

    #[test]
    fn test_unseen_descriptors_become_groups() {
        let grammar = testgrammar::grammar(
            &[("L", 1.0)],
            &[(
                "L",
                "a\t0x1.0p-1\ts1\n\n*\t0x1.0p-1\tL\n",
            )],
        );
        let nt = Nonterminal::load("L", &grammar.terminals()).unwrap();
        assert_eq!(nt.group_count(), 2);
        // 26 letters minus the seen `a`.
        assert_eq!(nt.strings_of_group(1), BigCount::from(25));
        assert_eq!(nt.first_string_of_group(1), "b");
    }

    #[test]
    fn test_lookup_requires_matching_representation() {
        let grammar = testgrammar::grammar(
            &[("UL", 1.0)],
            &[("LL", "ab\t0x1.0p-1\ts1\ncd\t0x1.0p-1\ts2\n")],
        );
        let nt = Nonterminal::load("UL", &grammar.terminals()).unwrap();

        let hit = nt.lookup("Ab");
        assert!(hit.status.can_parse());
        assert_eq!(hit.index, BigCount::zero());
        assert_eq!(hit.group_index, 0);

        // Lowercase first letter does not match the `U` position.
        let miss = nt.lookup("ab");
        assert_eq!(miss.status, ParseStatus::TERMINAL_NOT_FOUND);
        assert_eq!(nt.first_string_of_group(0), "Ab");
    }

    #[test]
    fn test_lookup_miss_within_matching_class() {
        let grammar = testgrammar::grammar(&[("L", 1.0)], &[("L", "a\t0x1.0p-1\ts1\n")]);
        let nt = Nonterminal::load("L", &grammar.terminals()).unwrap();
        let miss = nt.lookup("b");
        assert_eq!(
            miss.status,
            ParseStatus::TERMINAL_NOT_FOUND | ParseStatus::TERMINAL_CANT_BE_GENERATED
        );
    }

    #[test]
    fn test_random_draws_follow_group_mass() {
        let grammar = testgrammar::grammar(
            &[("L", 1.0)],
            &[(
                "L",
                "a\t0x1.8p-1\ts1\nb\t0x1.0p-3\ts1\nc\t0x1.0p-3\ts1\n",
            )],
        );
        let nt = Nonterminal::load("L", &grammar.terminals()).unwrap();
        assert!((nt.probability_mass() - 1.0).abs() < 1e-9);
        let mut rng = rand_mt::Mt64::new(7);
        let mut first_group = 0u32;
        for _ in 0..400 {
            if nt.produce_random_group(&mut rng) == 0 {
                first_group += 1;
            }
        }
        // Group 0 carries 3/4 of the mass.
        assert!((250..=350).contains(&first_group), "saw {first_group}");
        let drawn = nt.produce_random_string_of_group(1, &mut rng);
        assert!(drawn == "b" || drawn == "c");
    }

    #[test]
    fn test_collection_deduplicates() {
        let grammar = testgrammar::grammar(
            &[("L", 1.0)],
            &[("L", "a\t0x1.0p-1\ts1\nb\t0x1.0p-1\ts1\n")],
        );
        let mut collection = NonterminalCollection::new(grammar.terminals());
        let first = collection.get_or_create("L").unwrap();
        let again = collection.get_or_create("L").unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        // `UL` maps a different representation onto a different file.
        assert!(collection.get_or_create("UL").is_err());
        assert_eq!(collection.len(), 1);
    }
}
