//! The grammar itself: loading, the four driver operations, and lookup
//! reduction across structures.

use crate::count::BigCount;
use crate::error::GrammarError;
use crate::grammar_io;
use crate::lookup::{LookupData, ParseStatus};
use crate::nonterminal::NonterminalCollection;
use crate::structure::Structure;
use ordered_float::OrderedFloat;
use rand::Rng;
use std::io::Write;
use std::path::Path;

/// Deviation from 1 tolerated before a nonterminal's probability mass is
/// reported as unnormalised.
const MASS_TOLERANCE: f64 = 1e-6;

/// Load-time limits.
#[derive(Debug, Clone)]
pub struct PcfgConfig {
    /// Structures with longer representations are skipped: they carry
    /// negligible probability but would pull in large terminal files.
    pub max_structure_length: usize,
}

impl Default for PcfgConfig {
    fn default() -> Self {
        PcfgConfig {
            max_structure_length: 40,
        }
    }
}

/// A loaded grammar: the structures plus the shared nonterminal collection
/// that owns every terminal-file mapping for the grammar's lifetime.
#[derive(Debug)]
pub struct Pcfg {
    structures: Vec<Structure>,
    collection: NonterminalCollection,
}

impl Pcfg {
    /// Load a grammar with the default limits.
    pub fn load(structures_file: &Path, terminals_dir: &Path) -> Result<Self, GrammarError> {
        Self::load_with_config(structures_file, terminals_dir, PcfgConfig::default())
    }

    /// Read the structures file and chase every referenced nonterminal into
    /// the collection, mapping each terminals file exactly once.
    pub fn load_with_config(
        structures_file: &Path,
        terminals_dir: &Path,
        config: PcfgConfig,
    ) -> Result<Self, GrammarError> {
        let lines = grammar_io::read_structure_lines(structures_file)?;
        let mut collection = NonterminalCollection::new(terminals_dir);
        let mut structures = Vec::new();
        for line in &lines {
            if line.representation.len() > config.max_structure_length {
                log::debug!(
                    "skipping structure {} longer than {}",
                    line.representation,
                    config.max_structure_length
                );
                continue;
            }
            structures.push(Structure::load(line, &mut collection)?);
        }
        log::info!(
            "loaded {} structures over {} nonterminals",
            structures.len(),
            collection.len()
        );

        for nonterminal in collection.iter() {
            let mass = nonterminal.probability_mass();
            if (mass - 1.0).abs() > MASS_TOLERANCE {
                log::warn!(
                    "nonterminal {} has probability mass {mass}, expected 1",
                    nonterminal.representation()
                );
            }
        }

        Ok(Pcfg {
            structures,
            collection,
        })
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    pub fn nonterminal_count(&self) -> usize {
        self.collection.len()
    }

    /// Total strings the grammar can produce.
    pub fn count_strings(&self) -> BigCount {
        let mut total = BigCount::zero();
        for structure in &self.structures {
            total.add_assign(&structure.count_strings());
        }
        total
    }

    /// Emit all patterns at or above `cutoff`, structure by structure.
    pub fn generate_patterns<W: Write>(
        &self,
        cutoff: f64,
        out: &mut W,
    ) -> Result<(), GrammarError> {
        for structure in &self.structures {
            structure.generate_patterns(cutoff, out)?;
        }
        Ok(())
    }

    /// Emit all strings at or above `cutoff`. With `accurate` set, each
    /// string carries its summed probability and appears exactly once
    /// across structures.
    pub fn generate_strings<W: Write>(
        &self,
        cutoff: f64,
        accurate: bool,
        out: &mut W,
    ) -> Result<(), GrammarError> {
        for structure in &self.structures {
            structure.generate_strings(cutoff, accurate.then_some(self), out)?;
        }
        Ok(())
    }

    /// Sample `number` strings from the grammar distribution: sort the
    /// uniform draws, walk the structures once accumulating their
    /// probability bands, and dispatch each band's draw count to its
    /// structure.
    pub fn generate_random_strings<W: Write, R: Rng>(
        &self,
        number: u64,
        accurate: bool,
        rng: &mut R,
        out: &mut W,
    ) -> Result<(), GrammarError> {
        let mut draws: Vec<f64> = (0..number).map(|_| rng.gen_range(0.0..1.0)).collect();
        draws.sort_unstable_by_key(|&draw| OrderedFloat(draw));

        let accurate = accurate.then_some(self);
        let mut next_draw = 0usize;
        let mut cumulative = 0.0f64;
        for structure in &self.structures {
            cumulative += structure.probability();
            let mut band = 0u64;
            while next_draw < draws.len() && draws[next_draw] < cumulative {
                band += 1;
                next_draw += 1;
            }
            if band > 0 {
                structure.generate_random_strings(band, accurate, rng, out)?;
            }
        }
        // Draws past the accumulated mass only exist when the structure
        // probabilities round below 1; charge them to the last band.
        let leftover = (draws.len() - next_draw) as u64;
        if leftover > 0 {
            if let Some(last) = self.structures.last() {
                last.generate_random_strings(leftover, accurate, rng, out)?;
            }
        }
        Ok(())
    }

    /// Reduce per-structure lookups to the best one: parseable beats not,
    /// then highest probability; among failures the highest status code
    /// wins.
    pub fn lookup(&self, input: &str) -> LookupData {
        self.reduce(input).0
    }

    /// Like [`Self::lookup`], but the returned probability is the sum over
    /// every structure that parses the string, which is its true probability under
    /// the grammar. The representative fields (pattern, rank, sources) stay
    /// those of the highest-probability parse.
    pub fn lookup_sum(&self, input: &str) -> LookupData {
        let (mut best, total) = self.reduce(input);
        best.probability = total;
        best
    }

    fn reduce(&self, input: &str) -> (LookupData, f64) {
        let mut best = LookupData::failure(ParseStatus::STRUCTURE_NOT_FOUND);
        let mut best_parses = false;
        let mut total = 0.0f64;
        for structure in &self.structures {
            let candidate = structure.lookup(input);
            let candidate_parses = candidate.status.can_parse();
            if candidate_parses {
                total += candidate.probability;
            }
            let better = (!best_parses && candidate_parses)
                || (best_parses && candidate_parses && best.probability < candidate.probability)
                || (!best_parses && best.status.bits() < candidate.status.bits());
            if better {
                best = candidate;
                best_parses = candidate_parses;
            }
        }
        (best, total)
    }

    /// Number of structures that can parse the string.
    pub fn count_parses(&self, input: &str) -> u64 {
        self.structures
            .iter()
            .map(|structure| structure.count_parses(input))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testgrammar;

    #[test]
    fn test_trivial_grammar_lookup() {
        let grammar = testgrammar::grammar(
            &[("L", 1.0)],
            &[("L", "a\t0x1.0p-1\tsrc1\nb\t0x1.0p-1\tsrc1\n")],
        );
        let pcfg = grammar.load();

        let hit = pcfg.lookup("a");
        assert!(hit.status.can_parse());
        assert_eq!(hit.probability, 0.5);
        assert_eq!(hit.index, BigCount::zero());

        let miss = pcfg.lookup("abc");
        assert_eq!(miss.status, ParseStatus::STRUCTURE_NOT_FOUND);
    }

    #[test]
    fn test_lookup_prefers_highest_probability_parse() {
        // "ab" parses as one LL token or as two L tokens.
        let grammar = testgrammar::grammar(
            &[("LL", 0.5), ("LEL", 0.5)],
            &[
                ("LL", "ab\t0x1.0p-1\tdict\ncd\t0x1.0p-1\tdict\n"),
                ("L", "a\t0x1.0p-1\tchar\nb\t0x1.0p-1\tchar\n"),
            ],
        );
        let pcfg = grammar.load();

        // LL parse: 0.5 × 0.5 = 0.25; LEL parse: 0.5 × 0.25 = 0.125.
        let best = pcfg.lookup("ab");
        assert!(best.status.can_parse());
        assert_eq!(best.probability, 0.25);
        assert_eq!(best.pattern_id, "ab");
        assert_eq!(pcfg.count_parses("ab"), 2);

        let summed = pcfg.lookup_sum("ab");
        assert_eq!(summed.probability, 0.375);
        assert_eq!(summed.pattern_id, "ab");

        // "cd" only parses through the LL structure.
        assert_eq!(pcfg.count_parses("cd"), 1);
        assert_eq!(pcfg.lookup_sum("cd").probability, 0.25);
    }

    #[test]
    fn test_lookup_failure_priority() {
        // "a7" fails shape-wise everywhere; "zz" matches LL's shape but no
        // terminal, which outranks StructureNotFound.
        let grammar = testgrammar::grammar(
            &[("LL", 1.0)],
            &[("LL", "ab\t0x1.0p-1\tdict\n")],
        );
        let pcfg = grammar.load();

        assert_eq!(
            pcfg.lookup("a7").status,
            ParseStatus::STRUCTURE_NOT_FOUND
        );
        let miss = pcfg.lookup("zz");
        assert!(miss.status.contains(ParseStatus::TERMINAL_NOT_FOUND));
        assert!(miss.status.bits() > ParseStatus::STRUCTURE_NOT_FOUND.bits());
    }

    #[test]
    fn test_generated_strings_satisfy_lookup_bound() {
        let grammar = testgrammar::grammar(
            &[("LL", 0.5), ("LEL", 0.5)],
            &[
                ("LL", "ab\t0x1.0p-1\tdict\ncd\t0x1.0p-1\tdict\n"),
                ("L", "a\t0x1.0p-1\tchar\nb\t0x1.0p-1\tchar\n"),
            ],
        );
        let pcfg = grammar.load();

        let mut out = Vec::new();
        pcfg.generate_strings(0.0, false, &mut out).unwrap();
        for line in std::str::from_utf8(&out).unwrap().lines() {
            let (probability, guess) = line.split_once('\t').unwrap();
            let emitted = grammar_io::parse_hex_float(probability).unwrap();
            assert!(pcfg.lookup(guess).probability >= emitted);
            assert!(pcfg.lookup_sum(guess).probability >= emitted);
        }
    }

    #[test]
    fn test_accurate_strings_emit_each_string_once() {
        let grammar = testgrammar::grammar(
            &[("LL", 0.5), ("LEL", 0.5)],
            &[
                ("LL", "ab\t0x1.0p-1\tdict\ncd\t0x1.0p-1\tdict\n"),
                ("L", "a\t0x1.0p-1\tchar\nb\t0x1.0p-1\tchar\n"),
            ],
        );
        let pcfg = grammar.load();

        let mut out = Vec::new();
        pcfg.generate_strings(0.0, true, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut guesses: Vec<&str> = text
            .lines()
            .map(|line| line.split_once('\t').unwrap().1)
            .collect();
        guesses.sort_unstable();
        let deduped = {
            let mut copy = guesses.clone();
            copy.dedup();
            copy
        };
        assert_eq!(guesses, deduped, "accurate mode must not repeat strings");
        // Both tokenizations of "ab" collapse into one line with the summed
        // probability.
        assert!(guesses.contains(&"ab"));
        let ab_line = text
            .lines()
            .find(|line| line.ends_with("\tab"))
            .unwrap();
        let (probability, _) = ab_line.split_once('\t').unwrap();
        assert_eq!(grammar_io::parse_hex_float(probability).unwrap(), 0.375);
    }

    #[test]
    fn test_structure_length_limit() {
        let grammar = testgrammar::grammar(
            &[("L", 0.5), ("LEL", 0.5)],
            &[("L", "a\t0x1.0p+0\tsrc1\n")],
        );
        let pcfg = Pcfg::load_with_config(
            &grammar.structures(),
            &grammar.terminals(),
            PcfgConfig {
                max_structure_length: 1,
            },
        )
        .unwrap();
        assert_eq!(pcfg.structures().len(), 1);
        assert_eq!(pcfg.structures()[0].representation(), "L");
    }

    #[test]
    fn test_random_strings_follow_structure_bands() {
        let grammar = testgrammar::grammar(
            &[("L", 0.75), ("D", 0.25)],
            &[
                ("L", "a\t0x1.0p-1\ts1\nb\t0x1.0p-1\ts1\n"),
                ("D", "3\t0x1.0p+0\ts1\n"),
            ],
        );
        let pcfg = grammar.load();

        let mut rng = rand_mt::Mt64::new(99);
        let mut out = Vec::new();
        pcfg.generate_random_strings(200, false, &mut rng, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 200);
        let letters = text
            .lines()
            .filter(|line| {
                let guess = line.split_once('\t').unwrap().1;
                guess == "a" || guess == "b"
            })
            .count();
        // Around 150 of 200 should come from the letter structure.
        assert!((120..=180).contains(&letters), "saw {letters}");
        for line in text.lines() {
            let guess = line.split_once('\t').unwrap().1;
            assert!(pcfg.lookup(guess).status.can_parse());
        }
    }

    #[test]
    fn test_big_integer_ranks() {
        // A 14-letter unseen mask spans 26^14 > 2^64 strings.
        let grammar = testgrammar::grammar(
            &[("LLLLLLLLLLLLLL", 1.0)],
            &[(
                "LLLLLLLLLLLLLL",
                "\n*\t0x1.0p+0\tLLLLLLLLLLLLLL\n",
            )],
        );
        let pcfg = grammar.load();

        let expected_total = (0..14).fold(num_bigint::BigUint::from(1u64), |acc, _| acc * 26u64);
        assert_eq!(pcfg.count_strings(), BigCount::from(expected_total.clone()));
        assert!(pcfg.count_strings() > BigCount::from(u64::MAX));

        let last = "z".repeat(14);
        let hit = pcfg.lookup(&last);
        assert!(hit.status.can_parse());
        let expected_rank = expected_total - 1u64;
        assert_eq!(hit.index.to_string(), expected_rank.to_string());
    }
}
