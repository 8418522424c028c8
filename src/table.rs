//! Client for the precomputed sorted lookup table.
//!
//! The table maps `(probability, patternIdentifier)` to the guess number of
//! the pattern's first string. Data lines are
//! `probabilityHexFloat\tguessNumber\tpatternIdentifier\n` in strictly
//! descending probability, closed by a trailer line starting with `T` (the
//! total count). Because probabilities round-trip through hex floats, the
//! binary search compares them exactly. The whole file is memory-mapped;
//! record boundaries are found by rewinding to the previous newline.

use crate::count::BigCount;
use crate::error::GrammarError;
use crate::grammar_io::parse_hex_float;
use crate::lookup::ParseStatus;
use memmap2::Mmap;
use num_bigint::BigUint;
use std::fs::File;
use std::path::{Path, PathBuf};

/// How probability ties are resolved into guess numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bias {
    /// Exact: the pattern's first guess number plus the within-pattern rank.
    #[default]
    None,
    /// Optimistic: the pattern's first guess number.
    Down,
    /// Pessimistic: the next pattern's guess number.
    Up,
}

/// Result of a table lookup: the matched pattern's guess number and, when
/// another data line follows, the next pattern's.
#[derive(Debug, Clone)]
pub struct TableHit {
    pub status: ParseStatus,
    pub index: BigCount,
    pub next_index: Option<BigCount>,
}

impl TableHit {
    fn failure(status: ParseStatus) -> Self {
        TableHit {
            status,
            index: BigCount::zero(),
            next_index: None,
        }
    }

    /// Guess number under the requested bias. `within_rank` is the string's
    /// zero-based rank inside its pattern.
    pub fn guess_number(&self, bias: Bias, within_rank: &BigCount) -> BigCount {
        match bias {
            Bias::None => {
                let mut number = self.index.clone();
                number.add_assign(within_rank);
                number
            }
            Bias::Down => self.index.clone(),
            Bias::Up => self.next_index.clone().unwrap_or_else(|| self.index.clone()),
        }
    }
}

struct TableLine<'a> {
    probability: f64,
    guess_number: &'a [u8],
    pattern_id: &'a [u8],
    end: usize,
}

/// A memory-mapped lookup table.
#[derive(Debug)]
pub struct GuessTable {
    path: PathBuf,
    data: Mmap,
    /// Byte offset of the `T` trailer line; data lines live below it.
    data_end: usize,
}

impl GuessTable {
    pub fn open(path: &Path) -> Result<Self, GrammarError> {
        let file = File::open(path).map_err(|source| GrammarError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // Safety: read-only mapping of a file that is not modified while the
        // process runs.
        let data = unsafe { Mmap::map(&file) }.map_err(|source| GrammarError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let last_line = line_start(&data, data.len().saturating_sub(1));
        if data.get(last_line) != Some(&b'T') {
            return Err(GrammarError::MissingTableTrailer {
                path: path.to_path_buf(),
            });
        }
        Ok(GuessTable {
            path: path.to_path_buf(),
            data,
            data_end: last_line,
        })
    }

    /// Lowest probability in the table: the second-to-last line's.
    pub fn last_probability(&self) -> Result<f64, GrammarError> {
        let start = line_start(&self.data, self.data_end.saturating_sub(1));
        Ok(self.parse_line(start)?.probability)
    }

    /// Look `(probability, pattern_id)` up. The binary search positions on
    /// the *first* line carrying the probability; the matching-probability
    /// run is then scanned for the pattern identifier.
    pub fn lookup(&self, probability: f64, pattern_id: &str) -> Result<TableHit, GrammarError> {
        if probability < self.last_probability()? {
            return Ok(TableHit::failure(ParseStatus::BEYOND_CUTOFF));
        }
        let mut position = match self.search(probability)? {
            Ok(position) => position,
            Err(status) => return Ok(TableHit::failure(status)),
        };

        while position < self.data_end {
            let line = self.parse_line(position)?;
            if line.probability != probability {
                break;
            }
            if line.pattern_id == pattern_id.as_bytes() {
                let next_index = if line.end < self.data_end {
                    Some(self.parse_guess_number(line.end)?)
                } else {
                    None
                };
                return Ok(TableHit {
                    status: ParseStatus::CAN_PARSE,
                    index: decimal(line.guess_number).ok_or_else(|| {
                        GrammarError::MalformedTableLine {
                            path: self.path.clone(),
                            offset: position,
                        }
                    })?,
                    next_index,
                });
            }
            position = line.end;
        }
        // The probability came out of a successful parse, so its pattern
        // should have been in the table.
        Ok(TableHit::failure(ParseStatus::UNEXPECTED_FAILURE))
    }

    /// Offset of the first line whose probability equals `key`, or the
    /// status describing why there is none: `BEYOND_CUTOFF` below the
    /// table's minimum, `UNEXPECTED_FAILURE` above its maximum or for a
    /// probability absent from the descending order.
    fn search(&self, key: f64) -> Result<Result<usize, ParseStatus>, GrammarError> {
        if self.data_end == 0 {
            return Ok(Err(ParseStatus::UNEXPECTED_FAILURE));
        }
        if self.parse_line(0)?.probability < key {
            return Ok(Err(ParseStatus::UNEXPECTED_FAILURE));
        }
        if self.last_probability()? > key {
            return Ok(Err(ParseStatus::BEYOND_CUTOFF));
        }

        // Invariant: every line before `low` has probability > key, every
        // line at or after `high` has probability <= key. Offsets are byte
        // positions; lines are re-aligned on each probe.
        let mut low = 0usize;
        let mut high = self.data_end;
        while low < high {
            let middle = low + (high - low) / 2;
            let start = line_start(&self.data[..self.data_end], middle);
            let line = self.parse_line(start)?;
            if line.probability > key {
                low = line.end;
            } else {
                high = start;
            }
        }
        if low < self.data_end && self.parse_line(low)?.probability == key {
            Ok(Ok(low))
        } else {
            Ok(Err(ParseStatus::UNEXPECTED_FAILURE))
        }
    }

    fn parse_line(&self, start: usize) -> Result<TableLine<'_>, GrammarError> {
        self.try_parse_line(start)
            .ok_or_else(|| GrammarError::MalformedTableLine {
                path: self.path.clone(),
                offset: start,
            })
    }

    fn try_parse_line(&self, start: usize) -> Option<TableLine<'_>> {
        let rest = &self.data[start..];
        let length = rest.iter().position(|&b| b == b'\n')? + 1;
        let line = &rest[..length - 1];
        let mut fields = line.splitn(3, |&b| b == b'\t');
        let probability = parse_hex_float(std::str::from_utf8(fields.next()?).ok()?)?;
        let guess_number = fields.next()?;
        let pattern_id = fields.next()?;
        Some(TableLine {
            probability,
            guess_number,
            pattern_id,
            end: start + length,
        })
    }

    fn parse_guess_number(&self, start: usize) -> Result<BigCount, GrammarError> {
        let line = self.parse_line(start)?;
        decimal(line.guess_number).ok_or_else(|| GrammarError::MalformedTableLine {
            path: self.path.clone(),
            offset: start,
        })
    }
}

fn decimal(digits: &[u8]) -> Option<BigCount> {
    BigUint::parse_bytes(digits, 10).map(BigCount::from)
}

/// Offset of the first byte of the line containing `position`.
fn line_start(data: &[u8], position: usize) -> usize {
    let mut start = position.min(data.len());
    while start > 0 && data[start - 1] != b'\n' {
        start -= 1;
    }
    start
}

/// Extract the password from a three-column, tab-separated line: everything
/// after the second tab.
pub fn password_field(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once('\t')?;
    let (_, password) = rest.split_once('\t')?;
    // A third tab would mean a fourth column.
    if password.contains('\t') {
        return None;
    }
    Some(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_table() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "0x1.0p-1\t1\taa\n\
             0x1.0p-2\t5\tab\n\
             0x1.0p-2\t9\tba\n\
             0x1.0p-3\t13\tzz\n\
             T\t14\n"
        )
        .unwrap();
        file
    }

    #[test]
    fn test_open_requires_trailer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "0x1.0p-1\t1\taa\n").unwrap();
        assert!(matches!(
            GuessTable::open(file.path()),
            Err(GrammarError::MissingTableTrailer { .. })
        ));
    }

    #[test]
    fn test_last_probability_is_second_to_last_line() {
        let file = sample_table();
        let table = GuessTable::open(file.path()).unwrap();
        assert_eq!(table.last_probability().unwrap(), 0.125);
    }

    #[test]
    fn test_lookup_finds_first_matching_line() {
        let file = sample_table();
        let table = GuessTable::open(file.path()).unwrap();

        let hit = table.lookup(0.25, "ab").unwrap();
        assert!(hit.status.can_parse());
        assert_eq!(hit.index, BigCount::from(5));
        assert_eq!(hit.next_index, Some(BigCount::from(9)));

        // Second pattern in the equal-probability run.
        let hit = table.lookup(0.25, "ba").unwrap();
        assert_eq!(hit.index, BigCount::from(9));
        assert_eq!(hit.next_index, Some(BigCount::from(13)));
    }

    #[test]
    fn test_lookup_at_table_edges() {
        let file = sample_table();
        let table = GuessTable::open(file.path()).unwrap();

        // Last data line: the trailer is not a next pattern.
        let hit = table.lookup(0.125, "zz").unwrap();
        assert!(hit.status.can_parse());
        assert_eq!(hit.index, BigCount::from(13));
        assert_eq!(hit.next_index, None);

        // Below the minimum probability.
        let low = table.lookup(0.01, "zz").unwrap();
        assert_eq!(low.status, ParseStatus::BEYOND_CUTOFF);

        // Above the maximum probability.
        let high = table.lookup(0.9, "aa").unwrap();
        assert_eq!(high.status, ParseStatus::UNEXPECTED_FAILURE);

        // Known probability, unknown pattern.
        let missing = table.lookup(0.25, "qq").unwrap();
        assert_eq!(missing.status, ParseStatus::UNEXPECTED_FAILURE);
    }

    #[test]
    fn test_bias_application() {
        let file = sample_table();
        let table = GuessTable::open(file.path()).unwrap();
        let hit = table.lookup(0.25, "ab").unwrap();

        let rank = BigCount::from(3);
        assert_eq!(hit.guess_number(Bias::None, &rank), BigCount::from(8));
        assert_eq!(hit.guess_number(Bias::Down, &rank), BigCount::from(5));
        assert_eq!(hit.guess_number(Bias::Up, &rank), BigCount::from(9));
    }

    #[test]
    fn test_password_field() {
        assert_eq!(password_field("u1\t3\thunter2"), Some("hunter2"));
        assert_eq!(password_field("u1\t3\twith\ttab"), None);
        assert_eq!(password_field("only\tone"), None);
    }
}
