//! Parsing Piccolo source code into an AST.
//!
//! This module is used to convert strings (which represent Piccolo source
//! code) into the [`Program`] representation the code generator consumes.
//!
//! The parser module consists of:
//! - [`lex`]: the implementation of the lexer/tokenizer
//! - [`parse_program`]: the entry point, which tokenizes and parses a
//!   source string
//!
//! Parsing does not stop at the first error: after a malformed declaration
//! or statement, the parser synchronizes (to the next `section` token at
//! the top level, to the next `fn`/`at` inside the program section) and
//! keeps going, so one run can report several diagnostics.

pub mod lex;

use std::borrow::Cow;

use logos::{Logos, Span};

use crate::ast::{
    AssignOp, AtBlock, BinOp, Expr, ExprKind, Function, PostfixOp, Program, Sfr, Stmt, StmtKind,
    Ty, UnaryOp, Variable,
};
use lex::Token;

/// Parses a Piccolo source string into a [`Program`].
///
/// On failure, returns every diagnostic collected over the run, each
/// carrying the byte range of the offending source.
///
/// # Example
/// ```
/// use piccolo::parse::parse_program;
///
/// let program = parse_program("
///     section program
///     fn main() begin
///         w = 5
///         return
///     end
/// ").unwrap();
/// assert_eq!(program.functions.len(), 1);
/// assert_eq!(program.functions[0].name, "main");
/// ```
pub fn parse_program(src: &str) -> Result<Program, Vec<ParseErr>> {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    for (m_token, span) in Token::lexer(src).spanned() {
        match m_token {
            Ok(token) => tokens.push((token, span)),
            Err(err) => diagnostics.push(ParseErr::new(err.to_string(), span)),
        }
    }
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let mut parser = Parser { tokens, index: 0, diagnostics };
    let program = parser.parse_program();
    match parser.diagnostics.is_empty() {
        true  => Ok(program),
        false => Err(parser.diagnostics),
    }
}

/// Any error that occurs during parsing tokens.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseErr {
    msg: Cow<'static, str>,
    span: Span,
}
impl ParseErr {
    fn new<C: Into<Cow<'static, str>>>(msg: C, span: Span) -> Self {
        Self { msg: msg.into(), span }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.span, self.msg)
    }
}
impl std::error::Error for ParseErr {}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<Span> {
        Some(self.span.clone())
    }
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    index: usize,
    diagnostics: Vec<ParseErr>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(t, _)| t)
    }
    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.index + 1).map(|(t, _)| t)
    }
    fn advance(&mut self) {
        self.index = (self.index + 1).min(self.tokens.len());
    }

    /// The range of the next token to read (or an EOL range if there are
    /// no more tokens to read).
    fn cursor(&self) -> Span {
        match self.tokens.get(self.index).or_else(|| self.tokens.last()) {
            Some((_, span)) => span.clone(),
            None => 0..0,
        }
    }

    fn error<C: Into<Cow<'static, str>>>(&mut self, msg: C) {
        let span = self.cursor();
        self.diagnostics.push(ParseErr::new(msg, span));
    }

    /// Describes the next token for an error message.
    fn describe(&self) -> String {
        match self.peek() {
            Some(t) => format!("'{t}'"),
            None => "end of file".to_string(),
        }
    }

    /// Consumes the next token if it equals `want`, returning its span.
    /// Reports `msg` and consumes nothing otherwise.
    fn expect(&mut self, want: Token, msg: impl Into<Cow<'static, str>>) -> Option<Span> {
        match self.peek() {
            Some(t) if *t == want => {
                let span = self.cursor();
                self.advance();
                Some(span)
            }
            _ => {
                self.error(msg);
                None
            }
        }
    }

    fn expect_ident(&mut self, msg: impl Into<Cow<'static, str>>) -> Option<(String, Span)> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                let span = self.cursor();
                self.advance();
                Some((name, span))
            }
            _ => {
                self.error(msg);
                None
            }
        }
    }

    /// Skips to the next `section` token after a top-level error.
    fn synchronize(&mut self) {
        while !matches!(self.peek(), None | Some(Token::Section)) {
            self.advance();
        }
    }

    fn at_section_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Section))
    }

    fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        while self.peek().is_some() {
            if self.peek() == Some(&Token::Section) {
                self.advance();
                match self.peek() {
                    Some(Token::Constants) => {
                        self.advance();
                        self.parse_constants(&mut program);
                    }
                    Some(Token::Configuration) => {
                        self.advance();
                        self.parse_configuration(&mut program);
                    }
                    Some(Token::Data) => {
                        self.advance();
                        self.parse_data(&mut program);
                    }
                    Some(Token::Program) => {
                        self.advance();
                        self.parse_functions(&mut program);
                    }
                    _ => {
                        self.error("unknown section type");
                        self.synchronize();
                    }
                }
            } else {
                self.error("unexpected token at top level");
                self.synchronize();
            }
        }

        program
    }

    fn parse_constants(&mut self, program: &mut Program) {
        while !self.at_section_end() {
            match self.peek() {
                Some(Token::Ident(_)) => {
                    self.parse_constant(program);
                }
                _ => {
                    let msg = format!("unexpected token {} in constants section", self.describe());
                    self.error(msg);
                    self.advance();
                }
            }
        }
    }

    fn parse_constant(&mut self, program: &mut Program) -> Option<()> {
        let (name, _) = self.expect_ident("expected constant name")?;
        self.expect(Token::Colon, format!("expected ':' after identifier {name}"))?;

        let value = self.parse_expr()?;
        let Some(value) = value.as_num() else {
            self.error(format!("expected number value for constant {name}"));
            return None;
        };

        if self.peek() == Some(&Token::LBracket) {
            // SFR definition with named bits.
            self.advance();
            let mut bits = std::collections::HashMap::new();
            while self.peek() != Some(&Token::RBracket) {
                if self.peek().is_none() {
                    self.error("expected ']' to close the bit list");
                    return None;
                }
                let (bit_name, _) = self.expect_ident("expected bit name")?;
                self.expect(Token::Colon, "expected ':' after bit name")?;
                let bit = self.parse_expr()?;
                let Some(bit) = bit.as_num() else {
                    self.error(format!("expected number value for bit {bit_name}"));
                    return None;
                };
                bits.insert(bit_name, bit as u8);
            }
            self.advance(); // ]
            program.sfrs.insert(name, Sfr { address: value as u16, bits });
        } else {
            program.consts.insert(name, value);
        }
        Some(())
    }

    fn parse_configuration(&mut self, program: &mut Program) {
        while !self.at_section_end() {
            match self.peek() {
                Some(Token::Ident(_)) => {
                    let Some((name, _)) = self.expect_ident("expected configuration name") else {
                        continue;
                    };
                    if self.expect(Token::Colon, format!("expected ':' after identifier {name}")).is_none() {
                        continue;
                    }
                    let Some(value) = self.parse_expr() else { continue };
                    let span = value.span.clone();
                    let Some(value) = value.as_num() else {
                        self.error(format!("expected number value for configuration {name}"));
                        continue;
                    };
                    match u16::try_from(value) {
                        Ok(word) => {
                            program.configuration.insert(name, word);
                        }
                        Err(_) => {
                            self.diagnostics.push(ParseErr::new(
                                format!("configuration value for {name} does not fit a 16-bit word"),
                                span,
                            ));
                        }
                    }
                }
                _ => {
                    let msg = format!("unexpected token {} in configuration section", self.describe());
                    self.error(msg);
                    self.advance();
                }
            }
        }
    }

    fn parse_data(&mut self, program: &mut Program) {
        // Declarations default to the common pool until a heading says
        // otherwise.
        let mut banked = false;
        while !self.at_section_end() {
            match self.peek() {
                Some(Token::Common) => {
                    self.advance();
                    if self.expect(Token::Colon, "expected ':' after common").is_some() {
                        banked = false;
                    }
                }
                Some(Token::Banked) => {
                    self.advance();
                    if self.expect(Token::Colon, "expected ':' after banked").is_some() {
                        banked = true;
                    }
                }
                Some(Token::Ident(_)) => {
                    let Some((name, _)) = self.expect_ident("expected variable name") else {
                        continue;
                    };
                    match self.peek() {
                        Some(Token::I8) => {
                            self.advance();
                            program.variables.insert(name, Variable { ty: Ty::I8, banked });
                        }
                        _ => {
                            let msg = format!("expected type for variable {name}, got {}", self.describe());
                            self.error(msg);
                            self.advance();
                        }
                    }
                }
                _ => {
                    let msg = format!("unexpected token {} in data section", self.describe());
                    self.error(msg);
                    self.advance();
                }
            }
        }
    }

    fn parse_functions(&mut self, program: &mut Program) {
        while !self.at_section_end() {
            match self.peek() {
                Some(Token::Fn) => match self.parse_function() {
                    Some(f) => program.functions.push(f),
                    None => self.skip_to_next_item(),
                },
                Some(Token::At) => match self.parse_at_block() {
                    Some(b) => program.at_blocks.push(b),
                    None => self.skip_to_next_item(),
                },
                _ => {
                    self.error("unexpected token in program section");
                    self.advance();
                }
            }
        }
    }

    /// Skips to the next function, at-block, or section after a failed
    /// definition.
    fn skip_to_next_item(&mut self) {
        while !matches!(self.peek(), None | Some(Token::Section | Token::Fn | Token::At)) {
            self.advance();
        }
    }

    fn parse_function(&mut self) -> Option<Function> {
        let start = self.cursor().start;
        self.advance(); // fn

        let (name, _) = self.expect_ident(format!("expected function name, got {}", self.describe()))?;
        self.expect(Token::LParen, format!("expected '(' after function name {name}"))?;
        self.expect(Token::RParen, "expected ')' to close the parameter list")?;
        self.expect(Token::Begin, format!("expected begin to open function {name}"))?;

        let mut body = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.error(format!("function {name} is missing its end"));
                    return None;
                }
                Some(Token::End) => {
                    let span = start..self.cursor().end;
                    self.advance();
                    return Some(Function { name, body, span });
                }
                _ => match self.parse_stmt() {
                    Some(stmt) => body.push(stmt),
                    // Skip one token so a malformed statement cannot stall
                    // the loop.
                    None => self.advance(),
                },
            }
        }
    }

    fn parse_at_block(&mut self) -> Option<AtBlock> {
        let start = self.cursor().start;
        self.advance(); // at

        let addr = self.parse_expr()?;
        let span = addr.span.clone();
        let address = match addr.as_num().map(u16::try_from) {
            Some(Ok(address)) => address,
            Some(Err(_)) => {
                self.diagnostics.push(ParseErr::new("at address does not fit program memory", span));
                return None;
            }
            None => {
                self.diagnostics.push(ParseErr::new("expected number address for at block", span));
                return None;
            }
        };

        self.expect(Token::Begin, "expected begin after at address")?;

        let mut body = Vec::new();
        while !matches!(self.peek(), None | Some(Token::End)) {
            match self.parse_stmt() {
                Some(stmt) => body.push(stmt),
                None => self.advance(),
            }
        }

        let end = self.expect(Token::End, "expected end after at block")?;
        Some(AtBlock { address, body, span: start..end.end })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.peek_next() {
                Some(Token::Colon) => {
                    let (name, span) = self.expect_ident("expected label name")?;
                    let end = self.cursor().end;
                    self.advance(); // :
                    Some(Stmt { kind: StmtKind::Label(name), span: span.start..end })
                }
                Some(Token::LParen) => self.parse_call_stmt(),
                _ => self.parse_assign_stmt(),
            },
            Some(Token::Return) => {
                let span = self.cursor();
                self.advance();
                Some(Stmt { kind: StmtKind::Return, span })
            }
            Some(Token::If) => self.parse_if_stmt(),
            _ => {
                let msg = format!("unexpected token {} in statement", self.describe());
                self.error(msg);
                None
            }
        }
    }

    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        let start = self.cursor().start;
        self.advance(); // if

        let cond = self.parse_expr()?;
        self.expect(Token::Then, format!("expected then, got {}", self.describe()))?;
        let then = self.parse_stmt()?;

        let span = start..then.span.end;
        Some(Stmt { kind: StmtKind::If { cond, then: Box::new(then) }, span })
    }

    fn parse_assign_stmt(&mut self) -> Option<Stmt> {
        let (name, name_span) = self.expect_ident(format!("expected identifier, got {}", self.describe()))?;
        let mut lhs = Expr { kind: ExprKind::Ident(name.clone()), span: name_span.clone() };

        if self.peek() == Some(&Token::LBracket) {
            self.advance();
            let idx = self.parse_expr()?;
            let end = self.expect(Token::RBracket, format!("expected ']', got {}", self.describe()))?;
            lhs = Expr {
                kind: ExprKind::Index(name, Box::new(idx)),
                span: name_span.start..end.end,
            };
        }

        let op = match self.peek() {
            Some(Token::Eq)    => AssignOp::Assign,
            Some(Token::AddEq) => AssignOp::Add,
            Some(Token::SubEq) => AssignOp::Sub,
            Some(Token::AndEq) => AssignOp::And,
            Some(Token::OrEq)  => AssignOp::Or,
            Some(Token::XorEq) => AssignOp::Xor,
            _ => {
                let msg = format!("expected assignment operator, got {}", self.describe());
                self.error(msg);
                return None;
            }
        };
        self.advance();

        let rhs = self.parse_expr()?;
        let span = lhs.span.start..rhs.span.end;
        Some(Stmt { kind: StmtKind::Assign { lhs, op, rhs }, span })
    }

    fn parse_call_stmt(&mut self) -> Option<Stmt> {
        let (name, name_span) = self.expect_ident("expected function name")?;
        self.advance(); // (
        let end = self.expect(Token::RParen, "expected ')' after call arguments")?;
        Some(Stmt { kind: StmtKind::Call(name), span: name_span.start..end.end })
    }

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_binary_expr()
    }

    fn parse_binary_expr(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_unary_expr()?;

        while self.peek() == Some(&Token::Neq) {
            self.advance();
            let rhs = self.parse_unary_expr()?;
            let span = lhs.span.start..rhs.span.end;
            lhs = Expr {
                kind: ExprKind::Binary(Box::new(lhs), BinOp::Neq, Box::new(rhs)),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_unary_expr(&mut self) -> Option<Expr> {
        match self.peek() {
            Some(Token::Not) => {
                let start = self.cursor().start;
                self.advance();
                let expr = self.parse_unary_expr()?;
                let span = start..expr.span.end;
                Some(Expr { kind: ExprKind::Unary(UnaryOp::Not, Box::new(expr)), span })
            }
            _ => self.parse_postfix_expr(),
        }
    }

    fn parse_postfix_expr(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_primary_expr()?;

        loop {
            match self.peek() {
                Some(tok @ (Token::Inc | Token::Dec)) => {
                    let op = match tok {
                        Token::Inc => PostfixOp::Inc,
                        _ => PostfixOp::Dec,
                    };
                    let end = self.cursor().end;
                    self.advance();
                    let span = lhs.span.start..end;
                    lhs = Expr { kind: ExprKind::Postfix(Box::new(lhs), op), span };
                }
                Some(Token::LBracket) => {
                    // Indexing is only supported on identifiers. A bracket
                    // after anything else is not part of the expression.
                    let ExprKind::Ident(name) = &lhs.kind else { return Some(lhs) };
                    let name = name.clone();
                    self.advance();
                    let idx = self.parse_expr()?;
                    let end = self.expect(Token::RBracket, format!("expected ']', got {}", self.describe()))?;
                    let span = lhs.span.start..end.end;
                    lhs = Expr { kind: ExprKind::Index(name, Box::new(idx)), span };
                }
                _ => return Some(lhs),
            }
        }
    }

    fn parse_primary_expr(&mut self) -> Option<Expr> {
        match self.peek() {
            Some(&Token::Num(n)) => {
                let span = self.cursor();
                self.advance();
                Some(Expr { kind: ExprKind::Num(n), span })
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                let span = self.cursor();
                self.advance();
                Some(Expr { kind: ExprKind::Ident(name), span })
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, format!("expected ')', got {}", self.describe()))?;
                Some(expr)
            }
            _ => {
                let msg = format!("unexpected token {} in expression", self.describe());
                self.error(msg);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, ExprKind, StmtKind, Ty};

    const README_EXAMPLE: &str = "section program
fn function-name() begin // function definition, comments
  w = 5 // MOVLW, decimal literal
  return // RETURN
end";

    #[test]
    fn readme_example() {
        let program = parse_program(README_EXAMPLE).unwrap();
        assert_eq!(program.functions.len(), 1);

        let f = &program.functions[0];
        assert_eq!(f.name, "function-name");
        assert_eq!(f.body.len(), 2);

        let StmtKind::Assign { lhs, op, rhs } = &f.body[0].kind else {
            panic!("expected first stmt to be an assignment, got {:?}", f.body[0]);
        };
        assert_eq!(lhs.as_ident(), Some("w"));
        assert_eq!(*op, AssignOp::Assign);
        assert_eq!(rhs.as_num(), Some(5));

        assert_eq!(f.body[1].kind, StmtKind::Return);
    }

    #[test]
    fn numeric_literals_in_expressions() {
        let tests: &[(&str, i32)] = &[
            ("$ff", 255),
            ("$FF", 255),
            ("$10", 16),
            ("%10", 2),
            ("%1111_1111", 255),
            ("123", 123),
            ("1_000", 1000),
        ];
        for &(lit, want) in tests {
            let src = format!("section program\nfn f() begin x = {lit} end");
            let program = parse_program(&src).unwrap();
            let StmtKind::Assign { rhs, .. } = &program.functions[0].body[0].kind else {
                panic!("expected assignment");
            };
            assert_eq!(rhs.as_num(), Some(want), "parsing {lit:?}");
        }
    }

    #[test]
    fn data_section() {
        let program = parse_program("
section data
common:
  var1 i8
banked:
  var2 i8
").unwrap();

        assert_eq!(program.variables.len(), 2);
        let v1 = &program.variables["var1"];
        assert_eq!(v1.ty, Ty::I8);
        assert!(!v1.banked);
        let v2 = &program.variables["var2"];
        assert_eq!(v2.ty, Ty::I8);
        assert!(v2.banked);
    }

    #[test]
    fn data_declarations_default_to_common() {
        let program = parse_program("section data\n  v i8\n").unwrap();
        assert!(!program.variables["v"].banked);
    }

    #[test]
    fn configuration_preserves_declaration_order() {
        let program = parse_program("
section configuration
  conf: $3F3F
  conf2: $1234
  another: 7
").unwrap();

        let entries: Vec<_> = program.configuration.iter()
            .map(|(name, &value)| (name.as_str(), value))
            .collect();
        assert_eq!(entries, vec![("conf", 0x3F3F), ("conf2", 0x1234), ("another", 7)]);
    }

    #[test]
    fn sfr_with_named_bits() {
        let program = parse_program("
section constants
  porta: $10C [ ra0: 0 ra5: 5 ]
  limit: 16
").unwrap();

        let sfr = &program.sfrs["porta"];
        assert_eq!(sfr.address, 0x10C);
        assert_eq!(sfr.bits["ra0"], 0);
        assert_eq!(sfr.bits["ra5"], 5);
        assert_eq!(program.consts["limit"], 16);
    }

    #[test]
    fn at_block() {
        let program = parse_program("
section program
at 4 begin
  return
end
fn main() begin
  return
end
").unwrap();

        assert_eq!(program.at_blocks.len(), 1);
        assert_eq!(program.at_blocks[0].address, 4);
        assert_eq!(program.at_blocks[0].body.len(), 1);
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn if_statements() {
        let program = parse_program("
section program
fn main() begin
  if f[2] then
    w += f
  if not f[3] then
    f += w
  if (f--) != 0 then
    w &= 15
end
").unwrap();

        let body = &program.functions[0].body;
        assert_eq!(body.len(), 3);

        let StmtKind::If { cond, .. } = &body[0].kind else { panic!("expected if") };
        assert!(matches!(cond.kind, ExprKind::Index(ref n, _) if n == "f"));

        let StmtKind::If { cond, .. } = &body[1].kind else { panic!("expected if") };
        assert!(matches!(cond.kind, ExprKind::Unary(UnaryOp::Not, _)));

        let StmtKind::If { cond, .. } = &body[2].kind else { panic!("expected if") };
        let ExprKind::Binary(lhs, BinOp::Neq, rhs) = &cond.kind else { panic!("expected !=") };
        assert!(matches!(lhs.kind, ExprKind::Postfix(_, PostfixOp::Dec)));
        assert_eq!(rhs.as_num(), Some(0));
    }

    #[test]
    fn labels_and_calls() {
        let program = parse_program("
section program
fn main() begin
top:
  helper()
  return
end
").unwrap();

        let body = &program.functions[0].body;
        assert_eq!(body[0].kind, StmtKind::Label("top".to_string()));
        assert_eq!(body[1].kind, StmtKind::Call("helper".to_string()));
    }

    #[test]
    fn recovers_and_reports_multiple_errors() {
        let err = parse_program("
section constants
  broken =
section program
fn main() begin
  w 5
  return
end
").unwrap_err();

        // One diagnostic from the constants section, at least one from the
        // malformed statement; the well-formed trailing statements still
        // parse without a cascade of spurious errors.
        assert!(err.len() >= 2, "expected at least 2 diagnostics, got {err:?}");
    }

    #[test]
    fn errors_carry_spans() {
        use crate::err::Error as _;

        let src = "section program\nfn main() begin\n  w 5\nend\n";
        let err = parse_program(src).unwrap_err();
        let span = err[0].span().unwrap();
        assert!(span.start < src.len());
    }
}
