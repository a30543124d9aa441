//! End-to-end tests: source text through parsing, code generation, and
//! assembly to Intel HEX.

use std::collections::BTreeMap;

use piccolo::asm::{assemble, hex::write_hex};
use piccolo::codegen::compile;
use piccolo::parse::parse_program;

fn build(src: &str) -> (Vec<u16>, BTreeMap<u16, u16>) {
    let program = parse_program(src).unwrap();
    let (ops, symbols) = compile(program).unwrap();
    assemble(&ops, symbols).unwrap()
}

fn build_hex(src: &str) -> String {
    let (words, config) = build(src);
    let mut image = Vec::new();
    write_hex(&mut image, &words, &config).unwrap();
    String::from_utf8(image).unwrap()
}

#[test]
fn minimal_program() {
    let src = "section program\nfn main() begin w = 5 return end";
    let (words, config) = build(src);
    assert_eq!(words, vec![0x3005, 0x0008]);
    assert!(config.is_empty());
    assert_eq!(build_hex(src), ":0400000005300800BF\n:00000001FF\n");
}

#[test]
fn banked_variable_gets_a_bank_switch() {
    let (words, _) = build("
section data
banked:
  v i8
section program
fn main() begin
  v = 5
  return
end
");
    // MOVLW 5, then MOVLB 0 ahead of the MOVWF into bank 0.
    assert_eq!(words, vec![0x3005, 0x0020, 0x00A0, 0x0008]);
}

#[test]
fn common_variable_needs_no_bank_switch() {
    let src = "
section data
common:
  v i8
section program
fn main() begin
  v = 5
  return
end
";
    let (words, _) = build(src);
    assert_eq!(words, vec![0x3005, 0x00F0, 0x0008]);
    assert_eq!(build_hex(src), ":060000000530F0000800CD\n:00000001FF\n");
}

#[test]
fn skip_and_skipped_share_one_bank_switch() {
    let (words, _) = build("
section data
banked:
  v i8
section program
fn main() begin
  if v[2] then
    w += v
end
");
    assert_eq!(words, vec![0x0020, 0x1920, 0x0720]);
}

#[test]
fn configuration_words_reach_the_hex_image() {
    let out = build_hex("
section configuration
  conf: $3F3F
section program
fn main() begin
  return
end
");
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec![
        ":020000000800F6",
        ":020000040001F9",
        ":02000E003F3F72",
        ":00000001FF",
    ]);
}

#[test]
fn forward_call_resolves_in_the_second_pass() {
    let (words, _) = build("
section program
fn a() begin
  b()
  return
end
fn b() begin
  return
end
");
    // The CALL's low 11 bits carry b's address; the opcode bits survive.
    assert_eq!(words, vec![0x2002, 0x0008, 0x0008]);
}

#[test]
fn at_block_pads_to_its_address() {
    let (words, _) = build("
section program
at 2 begin
  init()
end
fn init() begin
  return
end
");
    assert_eq!(words, vec![0x0000, 0x0000, 0x2003, 0x0008]);
}

#[test]
fn undefined_call_target_fails_the_build() {
    let program = parse_program("section program\nfn main() begin missing() return end").unwrap();
    let (ops, symbols) = compile(program).unwrap();
    let err = assemble(&ops, symbols).unwrap_err();
    assert_eq!(err.to_string(), "undefined label: missing");
}

#[test]
fn compilation_is_deterministic() {
    let src = "
section constants
  latc: $10E [ lc0: 0 ]
section configuration
  conf: $3F3F
section data
common:
  count i8
banked:
  scratch i8
section program
at 0 begin
  main()
end
fn main() begin
  count = 200
loop:
  latc[lc0] = 1
  if (count--) != 0 then
    delay()
  latc[lc0] = 0
  return
end
fn delay() begin
  return
end
";
    let first = build_hex(src);
    let second = build_hex(src);
    assert_eq!(first, second);
    assert!(first.ends_with(":00000001FF\n"));
    assert!(first.contains(":020000040001F9\n"));
}

#[test]
fn blinky_assembles() {
    // A small but realistic program: SFRs with named bits, both data
    // pools, a pinned reset vector, a busy-wait loop.
    let (words, config) = build("
section constants
  trisa: $8C [ ta2: 2 ]
  porta: $0C [ ra2: 2 ]

section configuration
  config1: $1FC4

section data
common:
  ticks i8

section program
at 0 begin
  start()
end

fn start() begin
  trisa[ta2] = 0
loop:
  porta[ra2] = 1
  wait()
  porta[ra2] = 0
  wait()
end

fn wait() begin
  ticks = 255
spin:
  if (ticks--) != 0 then
    return
  return
end
");

    assert_eq!(config.get(&0x8007), Some(&0x1FC4));

    // The reset vector calls start.
    assert_eq!(words[0] & 0xF800, 0x2000);
    let start = (words[0] & 0x07FF) as usize;
    // start begins by clearing the TRISA bit, behind a MOVLB for bank 1.
    assert_eq!(words[start], 0x0021);
    assert_eq!(words[start + 1], 0x1000 | (2 << 7) | 0x0C);
}
