//! Assembling instruction lists into PIC16F1xxx machine code.
//!
//! This module is used to convert the instruction lists produced by
//! [`codegen`](crate::codegen) into 14-bit program words.
//!
//! The assembler module notably consists of:
//! - [`Op`]: the instruction set, plus the label/org/config pseudo-ops
//! - [`SymbolTable`]: the shared name-to-address table, populated with data
//!   addresses by the code generator and label addresses during assembly
//! - [`assemble`]: the two-pass driver, which encodes every op and then
//!   patches forward label references
//!
//! Encoding tracks which data-memory bank is selected and inserts `MOVLB`
//! instructions on demand: an instruction that addresses data memory
//! outside the common region (`0x70..=0x7F`) is preceded by a `MOVLB` unless
//! the required bank is provably already selected. Any operation whose
//! continuation point is not known at encode time (a label, a call, a
//! return, a goto, an org) resets the tracked bank to unknown.

pub mod hex;

use std::collections::{BTreeMap, HashMap};

/// The destination flag carried by most file-register operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    /// Store the result in the working register.
    W,
    /// Store the result back in the file register.
    F,
}
impl Dest {
    fn bit(self) -> u16 {
        match self {
            Dest::W => 0,
            Dest::F => 1,
        }
    }
}
impl std::fmt::Display for Dest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bit())
    }
}

/// A file-register operand: either a data-memory address known at code
/// generation time, or a name resolved through the symbol table during
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A known data-memory address.
    Literal(u16),
    /// A name to resolve during encoding.
    Symbol(String),
}
impl Operand {
    fn resolve(&self, symbols: &SymbolTable) -> Result<u16, AsmErr> {
        match self {
            Operand::Literal(addr) => Ok(*addr),
            Operand::Symbol(name) => symbols
                .get(name)
                .ok_or_else(|| AsmErr::UnresolvedSymbol(name.clone())),
        }
    }
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Literal(addr) => write!(f, "0x{addr:X}"),
            Operand::Symbol(name)  => f.write_str(name),
        }
    }
}

/// A single operation of the compiled program: a PIC instruction, or one of
/// the pseudo-ops (`Label`, `Org`, `Config`) that steer assembly without
/// mapping to an instruction themselves.
///
/// The [`Display`] implementation renders the assembly-listing form used by
/// `piccolo -S`.
///
/// [`Display`]: std::fmt::Display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// A label definition. Records the current program address under the
    /// name.
    Label(String),
    /// Sets the location counter, padding forward with NOP words.
    Org(u16),
    /// Sets a configuration word. Contributes to the configuration map,
    /// not the program image.
    Config(u16, u16),
    /// `CALL k`: call a subroutine (label resolved by fixup).
    Call(String),
    /// `GOTO k`: jump (label resolved by fixup).
    Goto(String),
    /// `MOVLW k`: move a literal to W.
    Movlw(i32),
    /// `MOVF f,d`: move a file register.
    Movf(Operand, Dest),
    /// `MOVWF f`: move W to a file register.
    Movwf(Operand),
    /// `ADDWF f,d`: add W to a file register.
    Addwf(Operand, Dest),
    /// `ADDFSR n,k`: add a signed literal to FSR0 or FSR1.
    Addfsr(u8, i32),
    /// `ANDLW k`: AND a literal with W.
    Andlw(i32),
    /// `ANDWF f,d`: AND W with a file register.
    Andwf(Operand, Dest),
    /// `BCF f,b`: clear a bit of a file register.
    Bcf(Operand, u8),
    /// `BSF f,b`: set a bit of a file register.
    Bsf(Operand, u8),
    /// `BTFSC f,b`: test a bit, skip the next instruction if clear.
    Btfsc(Operand, u8),
    /// `BTFSS f,b`: test a bit, skip the next instruction if set.
    Btfss(Operand, u8),
    /// `DECFSZ f,d`: decrement, skip the next instruction if zero.
    Decfsz(Operand, Dest),
    /// `INCFSZ f,d`: increment, skip the next instruction if zero.
    Incfsz(Operand, Dest),
    /// `RETURN`: return from a subroutine.
    Return,
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Label(name)      => write!(f, "{name}:"),
            Op::Org(addr)        => write!(f, " ORG 0x{addr:X}"),
            Op::Config(addr, k)  => write!(f, " __CONFIG 0x{addr:X}, 0x{k:X}"),
            Op::Call(label)      => write!(f, " CALL {label}"),
            Op::Goto(label)      => write!(f, " GOTO {label}"),
            Op::Movlw(k)         => write!(f, "MOVLW {k}"),
            Op::Movf(reg, d)     => write!(f, "MOVF {reg},{d}"),
            Op::Movwf(reg)       => write!(f, "MOVWF {reg}"),
            Op::Addwf(reg, d)    => write!(f, "ADDWF {reg},{d}"),
            Op::Addfsr(n, k)     => write!(f, "ADDFSR {n},{k}"),
            Op::Andlw(k)         => write!(f, "ANDLW {k}"),
            Op::Andwf(reg, d)    => write!(f, "ANDWF {reg},{d}"),
            Op::Bcf(reg, b)      => write!(f, "BCF {reg},{b}"),
            Op::Bsf(reg, b)      => write!(f, "BSF {reg},{b}"),
            Op::Btfsc(reg, b)    => write!(f, "BTFSC {reg},{b}"),
            Op::Btfss(reg, b)    => write!(f, "BTFSS {reg},{b}"),
            Op::Decfsz(reg, d)   => write!(f, "DECFSZ {reg},{d}"),
            Op::Incfsz(reg, d)   => write!(f, "INCFSZ {reg},{d}"),
            Op::Return           => f.write_str("RETURN"),
        }
    }
}

impl Op {
    /// Encodes this op into the context, appending zero or more words.
    fn encode(&self, ctx: &mut AssemblerContext) -> Result<(), AsmErr> {
        match self {
            Op::Label(name) => {
                let pc = ctx.words.len() as u16;
                ctx.symbols.set(name.clone(), pc);
                // A label may be targeted from anywhere.
                ctx.current_bank = None;
            }
            Op::Org(addr) => {
                let target = *addr as usize;
                let pc = ctx.words.len();
                if target < pc {
                    return Err(AsmErr::OrgBackwards { at: pc, target });
                }
                while ctx.words.len() < target {
                    ctx.emit(0x0000); // NOP padding
                }
                // Execution reaches the new address through a vector, so
                // the selected bank is unknown.
                ctx.current_bank = None;
            }
            Op::Config(addr, value) => {
                ctx.config.insert(*addr, *value);
            }
            Op::Call(label) => {
                // 10 0kkk kkkk kkkk
                ctx.add_fixup(label, 0x07FF);
                ctx.emit(0x2000);
                // The callee may change the bank and return.
                ctx.current_bank = None;
            }
            Op::Goto(label) => {
                // 10 1kkk kkkk kkkk
                ctx.add_fixup(label, 0x07FF);
                ctx.emit(0x2800);
                ctx.current_bank = None;
            }
            Op::Movlw(k) => {
                // 11 0000 kkkk kkkk
                ctx.emit(0x3000 | (*k as u16 & 0xFF));
            }
            Op::Movf(reg, d) => {
                // 00 1000 dfff ffff
                ctx.encode_file_reg(0x0800, reg, *d)?;
            }
            Op::Movwf(reg) => {
                // 00 0000 1fff ffff
                let addr = reg.resolve(&ctx.symbols)?;
                ctx.ensure_bank(addr);
                ctx.emit(0x0080 | (addr & 0x7F));
            }
            Op::Addwf(reg, d) => {
                // 00 0111 dfff ffff
                ctx.encode_file_reg(0x0700, reg, *d)?;
            }
            Op::Addfsr(n, k) => {
                // 11 0001 0nkk kkkk
                ctx.emit(0x3100 | ((*n as u16 & 1) << 6) | (*k as u16 & 0x3F));
            }
            Op::Andlw(k) => {
                // 11 1001 kkkk kkkk
                ctx.emit(0x3900 | (*k as u16 & 0xFF));
            }
            Op::Andwf(reg, d) => {
                // 00 0101 dfff ffff
                ctx.encode_file_reg(0x0500, reg, *d)?;
            }
            Op::Bcf(reg, b) => {
                // 01 00bb bfff ffff
                ctx.encode_bit(0x1000, reg, *b)?;
            }
            Op::Bsf(reg, b) => {
                // 01 01bb bfff ffff
                ctx.encode_bit(0x1400, reg, *b)?;
            }
            Op::Btfsc(reg, b) => {
                // 01 10bb bfff ffff
                ctx.encode_bit(0x1800, reg, *b)?;
            }
            Op::Btfss(reg, b) => {
                // 01 11bb bfff ffff
                ctx.encode_bit(0x1C00, reg, *b)?;
            }
            Op::Decfsz(reg, d) => {
                // 00 1011 dfff ffff
                ctx.encode_file_reg(0x0B00, reg, *d)?;
            }
            Op::Incfsz(reg, d) => {
                // 00 1111 dfff ffff
                ctx.encode_file_reg(0x0F00, reg, *d)?;
            }
            Op::Return => {
                // 00 0000 0000 1000
                ctx.emit(0x0008);
                // Fall-through is unreachable and the caller's bank is
                // unknown.
                ctx.current_bank = None;
            }
        }
        Ok(())
    }
}

/// The symbol table: a total mapping of name to address.
///
/// The same table holds data-memory addresses (for variables, written by
/// the code generator) and program-memory addresses (for labels, written
/// during assembly). Names never collide because data names are registered
/// before any instruction is encoded.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: HashMap<String, u16>,
}

impl SymbolTable {
    /// Creates an empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the address of a symbol (if it is defined).
    pub fn get(&self, name: &str) -> Option<u16> {
        self.symbols.get(name).copied()
    }

    /// Sets the address of a symbol.
    pub fn set(&mut self, name: impl Into<String>, addr: u16) {
        self.symbols.insert(name.into(), addr);
    }
}

/// A deferred patch: the promise to OR a label's resolved address into a
/// previously emitted word.
struct Fixup {
    /// The index in the word list of the word to patch.
    index: usize,
    /// The label whose address fills the field.
    label: String,
    /// The field within the word, as a mask.
    mask: u16,
}

/// State accumulated over the encoding pass.
struct AssemblerContext {
    words: Vec<u16>,
    symbols: SymbolTable,
    /// The bank the abstract interpretation proves is selected, or `None`
    /// when the continuation point is unknown.
    current_bank: Option<u8>,
    fixups: Vec<Fixup>,
    config: BTreeMap<u16, u16>,
}

impl AssemblerContext {
    fn new(symbols: SymbolTable) -> Self {
        Self {
            words: Vec::new(),
            symbols,
            current_bank: None,
            fixups: Vec::new(),
            config: BTreeMap::new(),
        }
    }

    fn emit(&mut self, word: u16) {
        self.words.push(word);
    }

    /// Emits a `MOVLB` if the bank holding `addr` is not provably selected.
    ///
    /// Addresses in the common region (`0x70..=0x7F`) are visible from
    /// every bank and never require a switch.
    fn ensure_bank(&mut self, addr: u16) {
        if (0x70..=0x7F).contains(&addr) {
            return;
        }
        // 128-byte banks, 32 banks.
        let bank = ((addr >> 7) & 0x1F) as u8;
        if self.current_bank != Some(bank) {
            // 00 0000 001k kkkk
            self.emit(0x0020 | bank as u16);
            self.current_bank = Some(bank);
        }
    }

    /// Records a fixup against the word about to be emitted.
    fn add_fixup(&mut self, label: &str, mask: u16) {
        self.fixups.push(Fixup {
            index: self.words.len(),
            label: label.to_string(),
            mask,
        });
    }

    /// Encodes a `dfff ffff` instruction against `base`.
    fn encode_file_reg(&mut self, base: u16, reg: &Operand, d: Dest) -> Result<(), AsmErr> {
        let addr = reg.resolve(&self.symbols)?;
        self.ensure_bank(addr);
        self.emit(base | (d.bit() << 7) | (addr & 0x7F));
        Ok(())
    }

    /// Encodes a `bbbf ffff`-style bit instruction against `base`.
    fn encode_bit(&mut self, base: u16, reg: &Operand, b: u8) -> Result<(), AsmErr> {
        let addr = reg.resolve(&self.symbols)?;
        self.ensure_bank(addr);
        self.emit(base | ((b as u16 & 7) << 7) | (addr & 0x7F));
        Ok(())
    }
}

/// Assembles an op list into the program image and the configuration map.
///
/// The first pass encodes every op in order, growing the word list and
/// recording a fixup for each forward `CALL`/`GOTO` reference; the second
/// pass patches every fixup with the address the symbol table settled on.
///
/// # Example
/// ```
/// use piccolo::asm::assemble;
/// use piccolo::codegen::compile;
/// use piccolo::parse::parse_program;
///
/// let program = parse_program("
///     section program
///     fn main() begin
///         w = 5
///         return
///     end
/// ").unwrap();
/// let (ops, symbols) = compile(program).unwrap();
///
/// let (words, config) = assemble(&ops, symbols).unwrap();
/// assert_eq!(words, vec![0x3005, 0x0008]);
/// assert!(config.is_empty());
/// ```
pub fn assemble(
    ops: &[Op],
    symbols: SymbolTable,
) -> Result<(Vec<u16>, BTreeMap<u16, u16>), AsmErr> {
    let mut ctx = AssemblerContext::new(symbols);

    for op in ops {
        op.encode(&mut ctx)?;
    }

    let AssemblerContext { mut words, symbols, fixups, config, .. } = ctx;
    for fixup in fixups {
        let Some(addr) = symbols.get(&fixup.label) else {
            return Err(AsmErr::UndefinedLabel(fixup.label));
        };
        // The encoder left zeros in the field the fixup fills.
        debug_assert_eq!(words[fixup.index] & fixup.mask, 0);
        words[fixup.index] |= addr & fixup.mask;
    }

    Ok((words, config))
}

/// Error from assembling an op list.
#[derive(Debug, PartialEq, Eq)]
pub enum AsmErr {
    /// A file-register operand named a symbol with no address.
    UnresolvedSymbol(String),
    /// A `CALL`/`GOTO` targeted a label that was never defined.
    UndefinedLabel(String),
    /// An `ORG` would move the location counter backward.
    OrgBackwards {
        /// The location counter when the `ORG` was encoded.
        at: usize,
        /// The address the `ORG` asked for.
        target: usize,
    },
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsmErr::UnresolvedSymbol(name) => write!(f, "cannot resolve address: {name}"),
            AsmErr::UndefinedLabel(label)  => write!(f, "undefined label: {label}"),
            AsmErr::OrgBackwards { at, target } => {
                write!(f, "cannot ORG backwards: current 0x{at:X}, target 0x{target:X}")
            }
        }
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            AsmErr::UnresolvedSymbol(_) => Some("declare it in a data or constants section".into()),
            AsmErr::UndefinedLabel(_)   => Some("labels are defined by function names and `name:` statements".into()),
            AsmErr::OrgBackwards { .. } => Some("at-blocks must appear in ascending address order".into()),
        }
    }
}
