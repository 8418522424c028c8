//! Structures: the top-level productions of the grammar.
//!
//! A structure is a sequence of nonterminals (its representation joined by
//! `E`) with a base probability. It drives pattern and string generation
//! through a [`PatternManager`] and reverse-parses candidate strings by
//! slicing them along its nonterminals' class representations.

use crate::charclass::{self, STRUCTURE_BREAK};
use crate::count::BigCount;
use crate::error::GrammarError;
use crate::grammar_io::{add_source_ids, format_hex_float, StructureLine};
use crate::lookup::{LookupData, ParseStatus};
use crate::nonterminal::{Nonterminal, NonterminalCollection};
use crate::pattern::PatternManager;
use crate::pcfg::Pcfg;
use rand::Rng;
use std::io::Write;
use std::rc::Rc;

/// One top-level production and shared handles to its nonterminals.
#[derive(Debug)]
pub struct Structure {
    representation: String,
    probability: f64,
    source_ids: String,
    nonterminals: Vec<Rc<Nonterminal>>,
}

impl Structure {
    /// Resolve each nonterminal of the representation through the shared
    /// collection.
    pub fn load(
        line: &StructureLine,
        collection: &mut NonterminalCollection,
    ) -> Result<Self, GrammarError> {
        let mut nonterminals = Vec::new();
        for representation in line.representation.split(STRUCTURE_BREAK) {
            if representation.is_empty() {
                return Err(GrammarError::MalformedStructureLine {
                    line: line.representation.clone(),
                });
            }
            nonterminals.push(collection.get_or_create(representation)?);
        }
        Ok(Structure {
            representation: line.representation.clone(),
            probability: line.probability,
            source_ids: line.source_ids.clone(),
            nonterminals,
        })
    }

    pub fn representation(&self) -> &str {
        &self.representation
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    fn pattern_manager(&self) -> PatternManager {
        PatternManager::new(self.nonterminals.clone(), self.probability)
    }

    /// Total strings this structure can produce: the product over its
    /// nonterminals' string counts.
    pub fn count_strings(&self) -> BigCount {
        let mut total = BigCount::one();
        for nonterminal in &self.nonterminals {
            total.mul_assign(&nonterminal.count_strings());
        }
        total
    }

    /// Emit every canonical pattern with probability at or above `cutoff` as
    /// `probability\ttotalCount\tpatternIdentifier`, where the count covers
    /// all permutations of the pattern.
    pub fn generate_patterns<W: Write>(
        &self,
        cutoff: f64,
        out: &mut W,
    ) -> Result<(), GrammarError> {
        let mut manager = self.pattern_manager();
        loop {
            let probability = manager.pattern_probability();
            if probability < cutoff {
                if manager.intelligent_skip().is_err() {
                    break;
                }
                continue;
            }
            if manager.is_first_permutation() {
                let mut total = manager.count_strings();
                total.mul_assign(&manager.count_permutations());
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    format_hex_float(probability),
                    total,
                    manager.pattern_identifier()
                )?;
            }
            if manager.increment().is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Emit every string with pattern probability at or above `cutoff` as
    /// `probability\tstring`. With `accurate` set, each string is looked up
    /// through the whole grammar: its probability becomes the sum over all
    /// parses, and it is emitted only by its home structure (the one whose
    /// canonical pattern the grammar-wide lookup reports), so each string
    /// appears exactly once across structures.
    pub fn generate_strings<W: Write>(
        &self,
        cutoff: f64,
        accurate: Option<&Pcfg>,
        out: &mut W,
    ) -> Result<(), GrammarError> {
        let mut manager = self.pattern_manager();
        loop {
            let probability = manager.pattern_probability();
            if probability < cutoff {
                if manager.intelligent_skip().is_err() {
                    break;
                }
                continue;
            }

            let home_pattern = accurate.map(|_| manager.canonical_pattern_identifier());
            let mut iterators = manager.string_iterators();
            let mut current: Vec<String> = iterators
                .iter_mut()
                .map(|iterator| iterator.next().expect("terminal groups are never empty"))
                .collect();

            loop {
                let guess: String = current.concat();
                match (accurate, &home_pattern) {
                    (Some(pcfg), Some(home)) => {
                        let total = pcfg.lookup_sum(&guess);
                        if total.status.contains(ParseStatus::UNEXPECTED_FAILURE)
                            || !total.status.can_parse()
                        {
                            return Err(GrammarError::UnparseableGenerated {
                                structure: self.representation.clone(),
                                string: guess,
                            });
                        }
                        if total.pattern_id == *home {
                            writeln!(
                                out,
                                "{}\t{}",
                                format_hex_float(total.probability),
                                guess
                            )?;
                        }
                    }
                    _ => {
                        writeln!(out, "{}\t{}", format_hex_float(probability), guess)?;
                    }
                }

                // The last position increments fastest; on overflow reset it
                // and carry into the position to its left.
                let mut position = iterators.len();
                let advanced = loop {
                    if position == 0 {
                        break false;
                    }
                    position -= 1;
                    match iterators[position].next() {
                        Some(next) => {
                            current[position] = next;
                            break true;
                        }
                        None => {
                            iterators[position].reset();
                            current[position] = iterators[position]
                                .next()
                                .expect("terminal groups are never empty");
                        }
                    }
                };
                if !advanced {
                    break;
                }
            }

            if manager.increment().is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Sample `number` strings from this structure's distribution: per
    /// position, draw a terminal group by its mass, then a terminal
    /// uniformly within it. With `accurate` set, the emitted probability is
    /// the grammar-wide sum for the sampled string.
    pub fn generate_random_strings<W: Write, R: Rng>(
        &self,
        number: u64,
        accurate: Option<&Pcfg>,
        rng: &mut R,
        out: &mut W,
    ) -> Result<(), GrammarError> {
        for _ in 0..number {
            let mut guess = String::new();
            let mut probability = self.probability;
            for nonterminal in &self.nonterminals {
                let group = nonterminal.produce_random_group(rng);
                probability *= nonterminal.probability_of_group(group);
                guess.push_str(&nonterminal.produce_random_string_of_group(group, rng));
            }
            if let Some(pcfg) = accurate {
                let total = pcfg.lookup_sum(&guess);
                if !total.status.can_parse() {
                    return Err(GrammarError::UnparseableGenerated {
                        structure: self.representation.clone(),
                        string: guess,
                    });
                }
                probability = total.probability;
            }
            writeln!(out, "{}\t{}", format_hex_float(probability), guess)?;
        }
        Ok(())
    }

    /// Reverse-parse a candidate string: strip break bytes, match its class
    /// projection against this structure's nonterminals end-to-end, then
    /// rank the terminal slices through the pattern manager.
    pub fn lookup(&self, input: &str) -> LookupData {
        let unbroken = charclass::strip_break_bytes(input.as_bytes());
        let projection = charclass::projection(&unbroken);

        let mut terminals = Vec::with_capacity(self.nonterminals.len());
        let mut position = 0usize;
        for nonterminal in &self.nonterminals {
            let representation = nonterminal.representation();
            let end = position + representation.len();
            if end > projection.len() || projection[position..end] != *representation {
                return LookupData::failure(ParseStatus::STRUCTURE_NOT_FOUND);
            }
            terminals.push(String::from_utf8_lossy(&unbroken[position..end]).into_owned());
            position = end;
        }
        if position != projection.len() {
            return LookupData::failure(ParseStatus::STRUCTURE_NOT_FOUND);
        }

        let mut manager = self.pattern_manager();
        let mut data = manager.lookup_and_set(&terminals);
        if data.status.can_parse() {
            if let Err(error) = add_source_ids(&self.source_ids, &mut data.source_ids) {
                log::error!(
                    "bad source ids on structure {}: {error}",
                    self.representation
                );
                return LookupData::failure(ParseStatus::UNEXPECTED_FAILURE);
            }
        }
        data
    }

    /// Number of ways this structure parses the string: 0 or 1, since the
    /// class projection is deterministic.
    pub fn count_parses(&self, input: &str) -> u64 {
        u64::from(self.lookup(input).status.can_parse())
    }
}
