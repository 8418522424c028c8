//! Line-level parsing of the on-disk grammar and the hex-float probability
//! codec.
//!
//! Structures live in a text file that opens with an `S ->` header and ends
//! its data block at the first blank line. Terminals files are tab-separated
//! `terminal\tprobability\tsource_ids` lines; probabilities are hex floats so
//! they round-trip exactly.

use crate::error::GrammarError;
use rustc_hash::FxHashSet;
use std::fs;
use std::path::Path;

/// Parse a C-style hex float such as `0x1.8p-3`. Returns `None` on any
/// malformed input.
pub fn parse_hex_float(text: &str) -> Option<f64> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    let (mantissa, exponent) = text.split_once(['p', 'P'])?;
    let exponent: i32 = exponent.parse().ok()?;
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value: u128 = 0;
    for digit in int_part.chars().chain(frac_part.chars()) {
        value = value
            .checked_mul(16)?
            .checked_add(u128::from(digit.to_digit(16)?))?;
    }

    let scale = exponent - 4 * frac_part.len() as i32;
    let magnitude = value as f64 * 2f64.powi(scale);
    Some(if negative { -magnitude } else { magnitude })
}

/// Format a probability as a round-trippable hex float, e.g. `0x1.8p-3`.
/// Trailing zero digits are trimmed but one fractional digit is always kept,
/// matching the format the training pipeline writes.
pub fn format_hex_float(value: f64) -> String {
    if value == 0.0 {
        return "0x0.0p+0".to_string();
    }
    let bits = value.to_bits();
    let sign = if bits >> 63 == 1 { "-" } else { "" };
    let raw_exponent = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & ((1u64 << 52) - 1);
    let (leading, exponent) = if raw_exponent == 0 {
        (0, -1022)
    } else {
        (1, raw_exponent - 1023)
    };

    let mut digits = format!("{:013x}", fraction);
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }
    format!("{sign}0x{leading}.{digits}p{exponent:+}")
}

/// One data line of the structures file.
#[derive(Debug, Clone)]
pub struct StructureLine {
    pub representation: String,
    pub probability: f64,
    pub source_ids: String,
}

/// Read the structures file: check the header, then collect data lines up to
/// the terminating blank line. Anything after the blank line is ignored.
pub fn read_structure_lines(path: &Path) -> Result<Vec<StructureLine>, GrammarError> {
    let text = fs::read_to_string(path).map_err(|source| GrammarError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = text.lines();

    if lines.next() != Some("S ->") {
        return Err(GrammarError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    let mut structures = Vec::new();
    for line in lines {
        if line.is_empty() {
            return Ok(structures);
        }
        structures.push(parse_structure_line(line)?);
    }
    Err(GrammarError::MissingTerminator {
        path: path.to_path_buf(),
    })
}

fn parse_structure_line(line: &str) -> Result<StructureLine, GrammarError> {
    let malformed = || GrammarError::MalformedStructureLine {
        line: line.to_string(),
    };
    let (representation, rest) = line.split_once('\t').ok_or_else(malformed)?;
    let (probability, source_ids) = rest.split_once('\t').ok_or_else(malformed)?;
    let probability = parse_hex_float(probability).ok_or_else(malformed)?;
    if probability <= 0.0 || probability > 1.0 {
        return Err(GrammarError::BadProbability {
            value: probability,
            context: format!("structure {representation}"),
        });
    }
    if representation.is_empty() || source_ids.is_empty() {
        return Err(malformed());
    }
    Ok(StructureLine {
        representation: representation.to_string(),
        probability,
        source_ids: source_ids.to_string(),
    })
}

/// Borrowed view of one terminals-file line.
#[derive(Debug, Clone, Copy)]
pub struct TerminalLine<'a> {
    pub terminal: &'a str,
    pub probability: f64,
    pub source_ids: &'a str,
}

/// Parse a `terminal\tprobability\tsource_ids` line, with or without its
/// trailing newline. Returns `None` on any malformed field.
pub fn parse_terminal_line(line: &[u8]) -> Option<TerminalLine<'_>> {
    let line = match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    };
    let line = std::str::from_utf8(line).ok()?;
    let (terminal, rest) = line.split_once('\t')?;
    let (probability, source_ids) = rest.split_once('\t')?;
    let probability = parse_hex_float(probability)?;
    if probability <= 0.0 || probability > 1.0 {
        return None;
    }
    Some(TerminalLine {
        terminal,
        probability,
        source_ids,
    })
}

/// Iterate newline-terminated lines of a byte buffer. The final line is
/// yielded even without a trailing newline.
pub fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split_inclusive(|&byte| byte == b'\n')
}

/// A line consisting of nothing but its newline.
pub fn is_blank_line(line: &[u8]) -> bool {
    line == b"\n"
}

/// Split a comma-separated source-id list into `set`. Empty elements are
/// rejected.
pub fn add_source_ids(list: &str, set: &mut FxHashSet<String>) -> Result<(), GrammarError> {
    for id in list.split(',') {
        if id.is_empty() {
            return Err(GrammarError::EmptySourceId {
                list: list.to_string(),
            });
        }
        set.insert(id.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn test_parse_hex_float_basic() {
        assert_eq!(parse_hex_float("0x1.0p+0"), Some(1.0));
        assert_eq!(parse_hex_float("0x1.0p-1"), Some(0.5));
        assert_eq!(parse_hex_float("0x1.8p-3"), Some(0.1875));
        assert_eq!(parse_hex_float("0x1p-1"), Some(0.5));
        assert_eq!(parse_hex_float("0x1.4p3"), Some(10.0));
        assert_eq!(parse_hex_float("-0x1.0p-1"), Some(-0.5));
    }

    #[test]
    fn test_parse_hex_float_rejects_garbage() {
        assert_eq!(parse_hex_float(""), None);
        assert_eq!(parse_hex_float("0.5"), None);
        assert_eq!(parse_hex_float("0x.p+0"), None);
        assert_eq!(parse_hex_float("0x1.0"), None);
        assert_eq!(parse_hex_float("0x1.0pqq"), None);
    }

    #[test]
    fn test_format_hex_float_trims_to_one_digit() {
        assert_eq!(format_hex_float(0.5), "0x1.0p-1");
        assert_eq!(format_hex_float(1.0), "0x1.0p+0");
        assert_eq!(format_hex_float(0.1875), "0x1.8p-3");
        assert_eq!(format_hex_float(0.125), "0x1.0p-3");
    }

    #[test]
    fn test_structure_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "S ->\nLLL\t0x1.0p-1\ts1,s2\nDDEDD\t0x1.0p-2\ts3\n\nignored\n"
        )
        .unwrap();
        let structures = read_structure_lines(file.path()).unwrap();
        assert_eq!(structures.len(), 2);
        assert_eq!(structures[0].representation, "LLL");
        assert_eq!(structures[0].probability, 0.5);
        assert_eq!(structures[1].source_ids, "s3");
    }

    #[test]
    fn test_structure_file_requires_header_and_terminator() {
        let mut no_header = tempfile::NamedTempFile::new().unwrap();
        write!(no_header, "LLL\t0x1.0p-1\ts1\n\n").unwrap();
        assert!(matches!(
            read_structure_lines(no_header.path()),
            Err(GrammarError::MissingHeader { .. })
        ));

        let mut no_blank = tempfile::NamedTempFile::new().unwrap();
        write!(no_blank, "S ->\nLLL\t0x1.0p-1\ts1\n").unwrap();
        assert!(matches!(
            read_structure_lines(no_blank.path()),
            Err(GrammarError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn test_structure_line_probability_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "S ->\nLLL\t0x1.0p+1\ts1\n\n").unwrap();
        assert!(matches!(
            read_structure_lines(file.path()),
            Err(GrammarError::BadProbability { .. })
        ));
    }

    #[test]
    fn test_parse_terminal_line() {
        let line = parse_terminal_line(b"pass\t0x1.0p-2\ts1,s2\n").unwrap();
        assert_eq!(line.terminal, "pass");
        assert_eq!(line.probability, 0.25);
        assert_eq!(line.source_ids, "s1,s2");
        assert!(parse_terminal_line(b"pass\t0x1.0p-2\n").is_none());
        assert!(parse_terminal_line(b"\n").is_none());
    }

    #[test]
    fn test_lines_iteration() {
        let data = b"a\n\nb";
        let collected: Vec<&[u8]> = lines(data).collect();
        assert_eq!(collected, vec![&b"a\n"[..], &b"\n"[..], &b"b"[..]]);
        assert!(is_blank_line(collected[1]));
    }

    #[test]
    fn test_add_source_ids() {
        let mut set = FxHashSet::default();
        add_source_ids("a,b,a", &mut set).unwrap();
        assert_eq!(set.len(), 2);
        assert!(matches!(
            add_source_ids("a,,b", &mut set),
            Err(GrammarError::EmptySourceId { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_hex_float_round_trip(value in 0f64..=1.0) {
            prop_assume!(value > 0.0);
            let formatted = format_hex_float(value);
            prop_assert_eq!(parse_hex_float(&formatted), Some(value));
        }
    }
}
