//! Writing an assembled image as Intel HEX.
//!
//! Intel HEX is a line-oriented ASCII format: each record is
//! `:LLAAAATTDD…DDCC`, where `LL` is the data byte count, `AAAA` the
//! 16-bit address, `TT` the record type (`00` data, `01` end-of-file,
//! `04` extended linear address), and `CC` a checksum.
//!
//! Program words are written as type-00 records of up to 8 words (16
//! bytes), low byte first. Configuration words live at program addresses
//! `0x8007` and up, whose byte addresses exceed 16 bits; they are preceded
//! by a single extended-linear-address record that sets the upper 16
//! address bits to `0x0001`.

use std::collections::BTreeMap;
use std::io::{self, Write};

const WORDS_PER_RECORD: usize = 8;

/// Writes a program image and its configuration words as Intel HEX.
///
/// Lines are LF-terminated, with no trailing whitespace.
pub fn write_hex<W: Write>(
    out: &mut W,
    words: &[u16],
    config: &BTreeMap<u16, u16>,
) -> io::Result<()> {
    let mut addr: u16 = 0;
    for chunk in words.chunks(WORDS_PER_RECORD) {
        let mut data = Vec::with_capacity(chunk.len() * 2);
        for &word in chunk {
            data.extend(word.to_le_bytes());
        }
        write_record(out, addr, 0x00, &data)?;
        addr += (chunk.len() * 2) as u16;
    }

    if !config.is_empty() {
        // Configuration words sit at word address 0x8007+, i.e. byte
        // address 0x1000E+. One extended-linear-address record moves the
        // base to 0x10000; the per-word records then carry the low 16
        // address bits.
        write_record(out, 0x0000, 0x04, &[0x00, 0x01])?;
        for (&word_addr, &value) in config {
            write_record(out, word_addr.wrapping_mul(2), 0x00, &value.to_le_bytes())?;
        }
    }

    write_record(out, 0x0000, 0x01, &[])
}

/// Writes one record, computing its checksum: the two's complement of the
/// byte sum over count, address, type, and data.
fn write_record<W: Write>(out: &mut W, addr: u16, kind: u8, data: &[u8]) -> io::Result<()> {
    write!(out, ":{:02X}{addr:04X}{kind:02X}", data.len())?;

    let mut sum = data.len() as u8;
    sum = sum.wrapping_add((addr >> 8) as u8).wrapping_add(addr as u8).wrapping_add(kind);
    for &byte in data {
        write!(out, "{byte:02X}")?;
        sum = sum.wrapping_add(byte);
    }

    writeln!(out, "{:02X}", sum.wrapping_neg())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(words: &[u16], config: &BTreeMap<u16, u16>) -> String {
        let mut buf = Vec::new();
        write_hex(&mut buf, words, config).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn minimal_program() {
        // MOVLW 5; RETURN
        let out = hex(&[0x3005, 0x0008], &BTreeMap::new());
        assert_eq!(out, ":0400000005300800BF\n:00000001FF\n");
    }

    #[test]
    fn empty_image_is_just_eof() {
        assert_eq!(hex(&[], &BTreeMap::new()), ":00000001FF\n");
    }

    #[test]
    fn records_hold_eight_words() {
        let words: Vec<u16> = (0..20).collect();
        let out = hex(&words, &BTreeMap::new());
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 4); // 8 + 8 + 4 words, then EOF
        assert!(lines[0].starts_with(":10000000"));
        assert!(lines[1].starts_with(":10001000"));
        assert!(lines[2].starts_with(":08002000"));
        assert_eq!(lines[3], ":00000001FF");
    }

    #[test]
    fn words_are_little_endian() {
        let out = hex(&[0x3005], &BTreeMap::new());
        assert!(out.starts_with(":020000000530"), "got {out}");
    }

    #[test]
    fn config_words_follow_an_extended_linear_address_record() {
        let config = BTreeMap::from([(0x8007, 0x3F3F), (0x8008, 0x1234)]);
        let out = hex(&[0x0008], &config);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[1], ":020000040001F9");
        assert_eq!(lines[2], ":02000E003F3F72");
        assert_eq!(lines[3], ":020010003412A8");
        assert_eq!(lines.last(), Some(&":00000001FF"));

        // Exactly one extended linear address record.
        assert_eq!(out.matches(":02000004").count(), 1);
    }

    #[test]
    fn no_extended_record_without_config() {
        let out = hex(&[0x0008], &BTreeMap::new());
        assert!(!out.contains(":02000004"));
    }

    #[test]
    fn checksums_balance() {
        let config = BTreeMap::from([(0x8007, 0x3F3F)]);
        let words: Vec<u16> = (0..23).map(|i| i * 0x123).collect();
        for line in hex(&words, &config).lines() {
            let bytes: Vec<u8> = (1..line.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&line[i..i + 2], 16).unwrap())
                .collect();
            let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            assert_eq!(sum, 0, "checksum mismatch in {line}");
        }
    }

    #[test]
    fn lines_have_no_trailing_whitespace() {
        let out = hex(&[0x3005, 0x0008], &BTreeMap::new());
        for line in out.lines() {
            assert_eq!(line, line.trim_end());
        }
    }
}
