//! Character classes of the restricted grammar alphabet.
//!
//! Nonterminal representations are runs of a single class tag: `L` (lowercase
//! letter), `U` (uppercase letter), `D` (digit), or `S` (symbol). The tag `E`
//! appears only in structure representations, where it separates nonterminals.
//! Terminal files store everything lowercased, so `U` positions are uppercased
//! on output and share their file with the all-`L` representation.

/// Separator between nonterminal representations inside a structure.
pub const STRUCTURE_BREAK: char = 'E';

/// Byte that encodes the structure break inside terminal strings and pattern
/// identifiers. It never appears in terminal content.
pub const BREAK_BYTE: u8 = 0x01;

/// The 33 symbols the `S` class can produce, in generation order.
pub const SYMBOLS: &[u8; 33] = b"`~!@#$%^&*()-_=+[{]}\\|;:'\",<.>/? ";

/// Number of characters a mask position of the given class tag can produce.
pub fn radix_of(tag: u8) -> Option<u64> {
    match tag {
        b'L' => Some(26),
        b'D' => Some(10),
        b'S' => Some(SYMBOLS.len() as u64),
        _ => None,
    }
}

/// Index of `byte` within the class `tag`, or `None` if the class cannot
/// produce it.
pub fn char_index(tag: u8, byte: u8) -> Option<u64> {
    match tag {
        b'L' => byte.is_ascii_lowercase().then(|| u64::from(byte - b'a')),
        b'D' => byte.is_ascii_digit().then(|| u64::from(byte - b'0')),
        b'S' => SYMBOLS.iter().position(|&s| s == byte).map(|i| i as u64),
        _ => None,
    }
}

/// Inverse of [`char_index`]. The index must be below the class radix.
pub fn char_at(tag: u8, index: u64) -> u8 {
    match tag {
        b'L' => b'a' + index as u8,
        b'D' => b'0' + index as u8,
        b'S' => SYMBOLS[index as usize],
        _ => unreachable!("masks are validated at load"),
    }
}

/// Class tag of a single input byte. Anything that is not a letter, digit, or
/// the break byte counts as a symbol.
pub fn classify(byte: u8) -> u8 {
    match byte {
        b'a'..=b'z' => b'L',
        b'A'..=b'Z' => b'U',
        b'0'..=b'9' => b'D',
        BREAK_BYTE => STRUCTURE_BREAK as u8,
        _ => b'S',
    }
}

/// Class projection of an input string, byte by byte.
pub fn projection(input: &[u8]) -> String {
    input.iter().map(|&b| classify(b) as char).collect()
}

/// Stem of the terminals file backing a representation: every `U` shares the
/// file of the corresponding `L`.
pub fn terminal_file_stem(representation: &str) -> String {
    representation.replace('U', "L")
}

/// Whether a representation needs uppercasing applied on output.
pub fn needs_casing(representation: &str) -> bool {
    representation.contains('U')
}

/// Uppercase the positions of `terminal` where `representation` carries a `U`.
/// The two must have equal length.
pub fn uppercase_to_match(representation: &str, terminal: &str) -> String {
    representation
        .bytes()
        .zip(terminal.bytes())
        .map(|(tag, byte)| {
            if tag == b'U' {
                byte.to_ascii_uppercase() as char
            } else {
                byte as char
            }
        })
        .collect()
}

/// Whether every character of a generator mask is a generatable class.
pub fn mask_is_valid(mask: &str) -> bool {
    !mask.is_empty() && mask.bytes().all(|b| radix_of(b).is_some())
}

/// Remove the break byte from user input before parsing.
pub fn strip_break_bytes(input: &[u8]) -> Vec<u8> {
    input.iter().copied().filter(|&b| b != BREAK_BYTE).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_set_size() {
        assert_eq!(SYMBOLS.len(), 33);
        assert_eq!(radix_of(b'S'), Some(33));
    }

    #[test]
    fn test_char_index_round_trip() {
        for tag in [b'L', b'D', b'S'] {
            let radix = radix_of(tag).unwrap();
            for i in 0..radix {
                assert_eq!(char_index(tag, char_at(tag, i)), Some(i));
            }
        }
    }

    #[test]
    fn test_char_index_rejects_other_classes() {
        assert_eq!(char_index(b'L', b'A'), None);
        assert_eq!(char_index(b'L', b'0'), None);
        assert_eq!(char_index(b'D', b'a'), None);
        assert_eq!(char_index(b'S', b'a'), None);
        assert_eq!(char_index(b'S', b'5'), None);
    }

    #[test]
    fn test_projection() {
        assert_eq!(projection(b"aB3!"), "LUDS");
        assert_eq!(projection(b"pass word"), "LLLLSLLLL");
        assert_eq!(projection(&[b'a', BREAK_BYTE, b'b']), "LEL");
    }

    #[test]
    fn test_terminal_file_stem() {
        assert_eq!(terminal_file_stem("UULL"), "LLLL");
        assert_eq!(terminal_file_stem("DDD"), "DDD");
    }

    #[test]
    fn test_uppercase_to_match() {
        assert_eq!(uppercase_to_match("ULLU", "abcd"), "AbcD");
        assert_eq!(uppercase_to_match("LLL", "abc"), "abc");
    }

    #[test]
    fn test_mask_validity() {
        assert!(mask_is_valid("LLD"));
        assert!(mask_is_valid("S"));
        assert!(!mask_is_valid("LUD"));
        assert!(!mask_is_valid(""));
    }

    #[test]
    fn test_strip_break_bytes() {
        assert_eq!(strip_break_bytes(&[b'a', 1, b'b', 1]), b"ab");
    }
}
