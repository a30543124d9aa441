//! Lowering a parsed [`Program`] into an instruction list.
//!
//! The code generator walks the program in a fixed emission order and
//! pattern-matches each statement against the small set of source shapes
//! that map directly onto PIC instructions: bit assignments become
//! `BCF`/`BSF`, moves through the working register become
//! `MOVLW`/`MOVF`/`MOVWF`, and the skip-instruction conditions
//! (`f[b]`, `not f[b]`, `(f--) != 0`, `(f++) != 0`) become
//! `BTFSC`/`BTFSS`/`DECFSZ`/`INCFSZ`. A statement that matches no shape is
//! a compile error; nothing is synthesized from longer sequences.
//!
//! Before any code is emitted, every declared variable is assigned a
//! data-memory address: non-banked variables bump through the 16-byte
//! common region from `0x70`, banked variables through the banked region
//! from `0x20`. Allocation iterates names in sorted order so a program
//! always gets the same addresses.

use logos::Span;

use crate::asm::{Dest, Op, Operand, SymbolTable};
use crate::ast::{AssignOp, BinOp, Expr, ExprKind, PostfixOp, Program, Stmt, StmtKind, UnaryOp};

/// Base of the common-region allocation pool (visible from every bank).
const COMMON_BASE: u16 = 0x70;
/// Last address of the common region.
const COMMON_LAST: u16 = 0x7F;
/// Base of the banked allocation pool.
const BANKED_BASE: u16 = 0x20;
/// Program word address of the first configuration word.
const CONFIG_BASE: u16 = 0x8007;

/// Lowers a program into an op list, allocating variable addresses into
/// the returned symbol table.
///
/// The emission order is fixed: configuration words first, then each
/// `at`-block in source order (as an `ORG` plus its body), then each
/// function in source order (as a label plus its body).
pub fn compile(program: Program) -> Result<(Vec<Op>, SymbolTable), CompileErr> {
    let mut symbols = SymbolTable::new();

    let mut common_addr = COMMON_BASE;
    let mut banked_addr = BANKED_BASE;

    let mut names: Vec<&String> = program.variables.keys().collect();
    names.sort();
    for name in names {
        if program.variables[name].banked {
            symbols.set(name.clone(), banked_addr);
            banked_addr += 1;
        } else {
            if common_addr > COMMON_LAST {
                return Err(CompileErr {
                    kind: CompileErrKind::CommonRamExhausted { name: name.clone() },
                    span: None,
                });
            }
            symbols.set(name.clone(), common_addr);
            common_addr += 1;
        }
    }

    let gen = Gen { program: &program, symbols: &symbols };
    let mut ops = Vec::new();

    for (i, (_, &value)) in program.configuration.iter().enumerate() {
        ops.push(Op::Config(CONFIG_BASE + i as u16, value));
    }

    for block in &program.at_blocks {
        ops.push(Op::Org(block.address));
        for stmt in &block.body {
            gen.compile_stmt(stmt, &mut ops)?;
        }
    }

    for function in &program.functions {
        ops.push(Op::Label(function.name.clone()));
        for stmt in &function.body {
            gen.compile_stmt(stmt, &mut ops)?;
        }
    }

    Ok((ops, symbols))
}

struct Gen<'p> {
    program: &'p Program,
    symbols: &'p SymbolTable,
}

impl Gen<'_> {
    fn compile_stmt(&self, stmt: &Stmt, ops: &mut Vec<Op>) -> Result<(), CompileErr> {
        match &stmt.kind {
            StmtKind::Assign { lhs, op, rhs } => self.compile_assign(lhs, *op, rhs, &stmt.span, ops),
            StmtKind::If { cond, then } => self.compile_if(cond, then, ops),
            StmtKind::Return => {
                ops.push(Op::Return);
                Ok(())
            }
            StmtKind::Call(name) => {
                ops.push(Op::Call(name.clone()));
                Ok(())
            }
            StmtKind::Label(name) => {
                ops.push(Op::Label(name.clone()));
                Ok(())
            }
        }
    }

    /// Resolves a bit index: a literal number, or a named bit of the base
    /// SFR.
    fn resolve_bit(&self, name: &str, index: &Expr) -> Option<u8> {
        if let Some(n) = index.as_num() {
            return Some(n as u8);
        }
        if let Some(bit_name) = index.as_ident() {
            if let Some(sfr) = self.program.sfrs.get(name) {
                return sfr.bits.get(bit_name).copied();
            }
        }
        None
    }

    /// Resolves a name to a file-register operand.
    ///
    /// Constants, SFRs, and allocated variables resolve to their address
    /// here; any other name is left symbolic for the assembler to resolve
    /// (or reject).
    fn resolve_addr(&self, name: &str) -> Operand {
        if let Some(&value) = self.program.consts.get(name) {
            return Operand::Literal(value as u16);
        }
        if let Some(sfr) = self.program.sfrs.get(name) {
            return Operand::Literal(sfr.address);
        }
        if let Some(addr) = self.symbols.get(name) {
            return Operand::Literal(addr);
        }
        Operand::Symbol(name.to_string())
    }

    fn compile_if(&self, cond: &Expr, then: &Stmt, ops: &mut Vec<Op>) -> Result<(), CompileErr> {
        // f[b]: execute the branch only if the bit is set.
        if let ExprKind::Index(name, index) = &cond.kind {
            if let Some(b) = self.resolve_bit(name, index) {
                ops.push(Op::Btfsc(self.resolve_addr(name), b));
                return self.compile_stmt(then, ops);
            }
        }

        // not f[b]: the mirror.
        if let ExprKind::Unary(UnaryOp::Not, inner) = &cond.kind {
            if let ExprKind::Index(name, index) = &inner.kind {
                if let Some(b) = self.resolve_bit(name, index) {
                    ops.push(Op::Btfss(self.resolve_addr(name), b));
                    return self.compile_stmt(then, ops);
                }
            }
        }

        // (f--) != 0 and (f++) != 0: step the register, execute the branch
        // while the result is non-zero.
        if let ExprKind::Binary(lhs, BinOp::Neq, rhs) = &cond.kind {
            if rhs.as_num() == Some(0) {
                if let ExprKind::Postfix(stepped, step) = &lhs.kind {
                    if let Some(name) = stepped.as_ident() {
                        let reg = self.resolve_addr(name);
                        ops.push(match step {
                            PostfixOp::Dec => Op::Decfsz(reg, Dest::F),
                            PostfixOp::Inc => Op::Incfsz(reg, Dest::F),
                        });
                        return self.compile_stmt(then, ops);
                    }
                }
            }
        }

        Err(CompileErr {
            kind: CompileErrKind::BadCondition { cond: cond.to_string() },
            span: Some(cond.span.clone()),
        })
    }

    fn compile_assign(
        &self,
        lhs: &Expr,
        op: AssignOp,
        rhs: &Expr,
        span: &Span,
        ops: &mut Vec<Op>,
    ) -> Result<(), CompileErr> {
        // name[b] = 0 and name[b] = 1 are the only legal indexed targets.
        if let ExprKind::Index(name, index) = &lhs.kind {
            if op == AssignOp::Assign {
                if let Some(b) = self.resolve_bit(name, index) {
                    match rhs.as_num() {
                        Some(0) => {
                            ops.push(Op::Bcf(self.resolve_addr(name), b));
                            return Ok(());
                        }
                        Some(1) => {
                            ops.push(Op::Bsf(self.resolve_addr(name), b));
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
            return Err(CompileErr {
                kind: CompileErrKind::BadIndexAssignment { lhs: lhs.to_string() },
                span: Some(span.clone()),
            });
        }

        let bad = || {
            Err(CompileErr {
                kind: CompileErrKind::BadAssignment {
                    lhs: lhs.to_string(),
                    op,
                    rhs: rhs.to_string(),
                },
                span: Some(span.clone()),
            })
        };

        let Some(target) = lhs.as_ident() else { return bad() };

        match op {
            AssignOp::Assign => {
                if is_w(target) {
                    // w = k
                    if let Some(k) = rhs.as_num() {
                        ops.push(Op::Movlw(k));
                        return Ok(());
                    }
                    // w = f
                    if let Some(name) = rhs.as_ident() {
                        ops.push(Op::Movf(self.resolve_addr(name), Dest::W));
                        return Ok(());
                    }
                } else {
                    // f = w
                    if rhs.as_ident().is_some_and(is_w) {
                        ops.push(Op::Movwf(self.resolve_addr(target)));
                        return Ok(());
                    }
                    // f = k
                    if let Some(k) = rhs.as_num() {
                        ops.push(Op::Movlw(k));
                        ops.push(Op::Movwf(self.resolve_addr(target)));
                        return Ok(());
                    }
                    // f1 = f2, through W
                    if let Some(name) = rhs.as_ident() {
                        ops.push(Op::Movf(self.resolve_addr(name), Dest::W));
                        ops.push(Op::Movwf(self.resolve_addr(target)));
                        return Ok(());
                    }
                }
            }

            AssignOp::Add => {
                if is_w(target) {
                    // w += f
                    if let Some(name) = rhs.as_ident() {
                        ops.push(Op::Addwf(self.resolve_addr(name), Dest::W));
                        return Ok(());
                    }
                } else if has_fsr_prefix(target) {
                    // fsrN += k. The prefix alone claims the name: a
                    // non-numeric suffix fails here rather than matching
                    // the f += w shape below.
                    if let Some(fsr) = fsr_number(target) {
                        if let Some(k) = rhs.as_num() {
                            ops.push(Op::Addfsr(fsr, k));
                            return Ok(());
                        }
                    }
                } else {
                    // f += w
                    if rhs.as_ident().is_some_and(is_w) {
                        ops.push(Op::Addwf(self.resolve_addr(target), Dest::F));
                        return Ok(());
                    }
                }
            }

            AssignOp::Sub => {
                // fsrN -= k, via ADDFSR's signed literal
                if has_fsr_prefix(target) {
                    if let Some(fsr) = fsr_number(target) {
                        if let Some(k) = rhs.as_num() {
                            ops.push(Op::Addfsr(fsr, -k));
                            return Ok(());
                        }
                    }
                }
            }

            AssignOp::And => {
                if is_w(target) {
                    // w &= k
                    if let Some(k) = rhs.as_num() {
                        ops.push(Op::Andlw(k));
                        return Ok(());
                    }
                    // w &= f
                    if let Some(name) = rhs.as_ident() {
                        ops.push(Op::Andwf(self.resolve_addr(name), Dest::W));
                        return Ok(());
                    }
                } else {
                    // f &= w
                    if rhs.as_ident().is_some_and(is_w) {
                        ops.push(Op::Andwf(self.resolve_addr(target), Dest::F));
                        return Ok(());
                    }
                }
            }

            // No PIC instruction backs these yet.
            AssignOp::Or | AssignOp::Xor => {}
        }

        bad()
    }
}

/// Whether a name refers to the working register.
fn is_w(name: &str) -> bool {
    name.eq_ignore_ascii_case("w")
}

/// Whether a name starts with `fsr`, numeric suffix or not.
fn has_fsr_prefix(name: &str) -> bool {
    name.to_ascii_lowercase().starts_with("fsr")
}

/// Extracts `N` from an `fsrN` name, if the suffix is numeric.
fn fsr_number(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();
    lower.strip_prefix("fsr")?.parse().ok()
}

/// Error from lowering a program.
#[derive(Debug, PartialEq, Eq)]
pub struct CompileErr {
    /// The value with a span.
    pub kind: CompileErrKind,
    /// The range in the source associated with this value.
    pub span: Option<Span>,
}

/// Kinds of errors that can occur from lowering a program.
#[derive(Debug, PartialEq, Eq)]
pub enum CompileErrKind {
    /// An assignment matched none of the shapes that map to instructions.
    BadAssignment {
        /// The rendered left-hand side.
        lhs: String,
        /// The assignment operator.
        op: AssignOp,
        /// The rendered right-hand side.
        rhs: String,
    },
    /// An indexed target was assigned something other than literal 0 or 1.
    BadIndexAssignment {
        /// The rendered left-hand side.
        lhs: String,
    },
    /// An `if` condition matched none of the skip-instruction shapes.
    BadCondition {
        /// The rendered condition.
        cond: String,
    },
    /// The common region ran out of bytes during variable allocation.
    CommonRamExhausted {
        /// The variable that did not fit.
        name: String,
    },
}

impl std::fmt::Display for CompileErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::fmt::Display for CompileErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileErrKind::BadAssignment { lhs, op, rhs } => {
                write!(f, "cannot compile assignment: {lhs} {op} {rhs}")
            }
            CompileErrKind::BadIndexAssignment { lhs } => {
                write!(f, "unsupported assignment to index: {lhs}")
            }
            CompileErrKind::BadCondition { cond } => {
                write!(f, "unsupported if condition: {cond}")
            }
            CompileErrKind::CommonRamExhausted { name } => {
                write!(f, "out of common data memory allocating {name}")
            }
        }
    }
}
impl std::error::Error for CompileErr {}
impl crate::err::Error for CompileErr {
    fn span(&self) -> Option<Span> {
        self.span.clone()
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match &self.kind {
            CompileErrKind::BadAssignment { .. } => {
                Some("only assignment shapes that map to a single PIC instruction are supported".into())
            }
            CompileErrKind::BadIndexAssignment { .. } => {
                Some("a bit reference can only be assigned the literal 0 or 1".into())
            }
            CompileErrKind::BadCondition { .. } => {
                Some("conditions take the form f[b], not f[b], (f--) != 0, or (f++) != 0".into())
            }
            CompileErrKind::CommonRamExhausted { .. } => {
                Some("the common region holds 16 bytes; declare some variables banked:".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_program;

    fn compile_src(src: &str) -> (Vec<Op>, SymbolTable) {
        compile(parse_program(src).unwrap()).unwrap()
    }

    fn listing(ops: &[Op]) -> Vec<String> {
        ops.iter().map(Op::to_string).collect()
    }

    #[test]
    fn every_idiom_lowers_to_its_instruction() {
        let (ops, _) = compile_src("
section program
fn main() begin
  w += f
  f += w
  fsr0 += 5
  w &= 255
  w &= f
  f &= w
  f[0] = 0
  f[1] = 1
  if f[2] then
    w += f
  if not f[3] then
    f += w
  if (f--) != 0 then
    w &= 15
  if (f++) != 0 then
    w &= 240
  return
end
");

        assert_eq!(listing(&ops), vec![
            "main:",
            "ADDWF f,0",
            "ADDWF f,1",
            "ADDFSR 0,5",
            "ANDLW 255",
            "ANDWF f,0",
            "ANDWF f,1",
            "BCF f,0",
            "BSF f,1",
            "BTFSC f,2",
            "ADDWF f,0",
            "BTFSS f,3",
            "ADDWF f,1",
            "DECFSZ f,1",
            "ANDLW 15",
            "INCFSZ f,1",
            "ANDLW 240",
            "RETURN",
        ]);
    }

    #[test]
    fn moves_through_w() {
        let (ops, _) = compile_src("
section data
common:
  a i8
  b i8
section program
fn main() begin
  w = 5
  a = w
  b = 9
  a = b
  w = a
  return
end
");

        assert_eq!(listing(&ops), vec![
            "main:",
            "MOVLW 5",
            "MOVWF 0x70",
            "MOVLW 9",
            "MOVWF 0x71",
            "MOVF 0x71,0",
            "MOVWF 0x70",
            "MOVF 0x70,0",
            "RETURN",
        ]);
    }

    #[test]
    fn w_is_case_insensitive() {
        let (ops, _) = compile_src("section program\nfn main() begin W = 5 end");
        assert_eq!(listing(&ops), vec!["main:", "MOVLW 5"]);
    }

    #[test]
    fn fsr_names_select_the_file_select_register() {
        let (ops, _) = compile_src("
section program
fn main() begin
  FSR1 += 2
  fsr1 -= 3
end
");
        assert_eq!(listing(&ops), vec!["main:", "ADDFSR 1,2", "ADDFSR 1,-3"]);
    }

    #[test]
    fn sfr_bits_resolve_by_name() {
        let (ops, _) = compile_src("
section constants
  porta: $C [ ra1: 1 ra4: 4 ]
section program
fn main() begin
  porta[ra1] = 1
  porta[4] = 0
  if porta[ra4] then
    return
end
");
        assert_eq!(listing(&ops), vec![
            "main:",
            "BSF 0xC,1",
            "BCF 0xC,4",
            "BTFSC 0xC,4",
            "RETURN",
        ]);
    }

    #[test]
    fn constants_resolve_to_their_value() {
        let (ops, _) = compile_src("
section constants
  tmr0: $15
section program
fn main() begin
  w = tmr0
end
");
        assert_eq!(listing(&ops), vec!["main:", "MOVF 0x15,0"]);
    }

    #[test]
    fn variables_allocate_sorted_within_their_pool() {
        let (_, symbols) = compile_src("
section data
banked:
  zeta i8
  alpha i8
common:
  tail i8
  head i8
section program
fn main() begin return end
");

        // Sorted by name, each pool bumping separately.
        assert_eq!(symbols.get("alpha"), Some(0x20));
        assert_eq!(symbols.get("zeta"), Some(0x21));
        assert_eq!(symbols.get("head"), Some(0x70));
        assert_eq!(symbols.get("tail"), Some(0x71));
    }

    #[test]
    fn common_pool_exhausts_at_sixteen() {
        let decls: String = (0..17).map(|i| format!("  v{i:02} i8\n")).collect();
        let src = format!("section data\ncommon:\n{decls}section program\nfn main() begin return end");
        let err = compile(parse_program(&src).unwrap()).unwrap_err();
        assert!(
            matches!(err.kind, CompileErrKind::CommonRamExhausted { ref name } if name == "v16"),
            "got {err:?}",
        );
    }

    #[test]
    fn config_entries_take_slots_in_declaration_order() {
        let (ops, _) = compile_src("
section configuration
  conf: $3F3F
  conf2: $1234
section program
fn main() begin
  return
end
");
        assert_eq!(ops[0], Op::Config(0x8007, 0x3F3F));
        assert_eq!(ops[1], Op::Config(0x8008, 0x1234));
    }

    #[test]
    fn at_blocks_emit_before_functions() {
        let (ops, _) = compile_src("
section program
fn main() begin
  return
end
at 4 begin
  return
end
");
        assert_eq!(listing(&ops), vec![" ORG 0x4", "RETURN", "main:", "RETURN"]);
    }

    #[test]
    fn calls_and_labels_lower_directly() {
        let (ops, _) = compile_src("
section program
fn main() begin
top:
  helper()
  return
end
fn helper() begin
  return
end
");
        assert_eq!(listing(&ops), vec![
            "main:",
            "top:",
            " CALL helper",
            "RETURN",
            "helper:",
            "RETURN",
        ]);
    }

    #[test]
    fn fsr_prefix_with_bad_suffix_is_an_error() {
        // A name with the fsr prefix claims the FSR shape even when the
        // suffix is not numeric; it must not compile as f += w.
        let src = "
section data
common:
  fsrx i8
section program
fn main() begin
  fsrx += w
end
";
        let err = compile(parse_program(src).unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "cannot compile assignment: fsrx += w");

        let err = compile(parse_program("section program\nfn main() begin fsrx -= 1 end").unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot compile assignment: fsrx -= 1");
    }

    #[test]
    fn unmatched_assignment_is_an_error() {
        let err = compile(parse_program("section program\nfn main() begin w -= 1 end").unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot compile assignment: w -= 1");
        assert!(err.span.is_some());
    }

    #[test]
    fn or_and_xor_have_no_idiom() {
        for op in ["|=", "^="] {
            let src = format!("section program\nfn main() begin w {op} 1 end");
            let err = compile(parse_program(&src).unwrap()).unwrap_err();
            assert!(
                matches!(err.kind, CompileErrKind::BadAssignment { .. }),
                "expected {op} to fail, got {err:?}",
            );
        }
    }

    #[test]
    fn indexed_target_takes_only_zero_or_one() {
        let err = compile(parse_program("section program\nfn main() begin f[0] = 2 end").unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported assignment to index: f[0]");
    }

    #[test]
    fn unmatched_condition_is_an_error() {
        let err = compile(parse_program("section program\nfn main() begin if f != 1 then return end").unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported if condition: f != 1");
    }
}
