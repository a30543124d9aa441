//! Tokenizing Piccolo source.
//!
//! This module holds the tokens that characterize Piccolo source code
//! ([`Token`]). This module is used by the parser to facilitate the
//! conversion of source code into an AST.
//!
//! The module's key data structure is the [`Token`] enum,
//! which lists all of the tokens of the Piccolo language.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

/// A unit of information in Piccolo source code.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\r\n]+", skip r"//[^\n]*", error = LexErr)]
pub enum Token {
    /// A numeric literal in decimal (`123`), hex (`$7F`), or binary
    /// (`%1010`) notation. Underscores are permitted as digit separators.
    #[regex(r"[0-9][0-9_]*", |lx| lex_num(lx, 10))]
    #[regex(r"\$[0-9A-Fa-f_]*", |lx| lex_num(lx, 16))]
    #[regex(r"%[01_]*", |lx| lex_num(lx, 2))]
    Num(i32),

    /// An identifier: a letter followed by letters, digits, and interior
    /// `-` runs.
    ///
    /// Trailing `-`s are never part of an identifier; they belong to a
    /// following `--` or `-` operator, so `a-b--` lexes as the identifier
    /// `a-b` followed by [`Token::Dec`].
    #[regex(r"[A-Za-z](-*[A-Za-z0-9])*", |lx| lx.slice().to_string(), priority = 1)]
    Ident(String),

    /// The `fn` keyword.
    #[token("fn", ignore(ascii_case))]
    Fn,
    /// The `begin` keyword.
    #[token("begin", ignore(ascii_case))]
    Begin,
    /// The `end` keyword.
    #[token("end", ignore(ascii_case))]
    End,
    /// The `return` keyword.
    #[token("return", ignore(ascii_case))]
    Return,
    /// The `if` keyword.
    #[token("if", ignore(ascii_case))]
    If,
    /// The `then` keyword.
    #[token("then", ignore(ascii_case))]
    Then,
    /// The `not` keyword.
    #[token("not", ignore(ascii_case))]
    Not,
    /// The `section` keyword.
    #[token("section", ignore(ascii_case))]
    Section,
    /// The `constants` section name.
    #[token("constants", ignore(ascii_case))]
    Constants,
    /// The `data` section name.
    #[token("data", ignore(ascii_case))]
    Data,
    /// The `program` section name.
    #[token("program", ignore(ascii_case))]
    Program,
    /// The `configuration` section name.
    #[token("configuration", ignore(ascii_case))]
    Configuration,
    /// The `banked` data heading.
    #[token("banked", ignore(ascii_case))]
    Banked,
    /// The `common` data heading.
    #[token("common", ignore(ascii_case))]
    Common,
    /// The `i8` type name.
    #[token("i8", ignore(ascii_case))]
    I8,
    /// The `at` keyword.
    #[token("at", ignore(ascii_case))]
    At,

    /// The `=` operator.
    #[token("=")]
    Eq,
    /// The `!=` operator.
    #[token("!=")]
    Neq,
    /// The `++` operator.
    #[token("++")]
    Inc,
    /// The `--` operator.
    #[token("--")]
    Dec,
    /// The `&=` operator.
    #[token("&=")]
    AndEq,
    /// The `|=` operator.
    #[token("|=")]
    OrEq,
    /// The `^=` operator.
    #[token("^=")]
    XorEq,
    /// The `+=` operator.
    #[token("+=")]
    AddEq,
    /// The `-=` operator.
    #[token("-=")]
    SubEq,
    /// The `-` operator.
    #[token("-")]
    Minus,

    /// An opening bracket, introducing a bit index.
    #[token("[")]
    LBracket,
    /// A closing bracket.
    #[token("]")]
    RBracket,
    /// An opening parenthesis.
    #[token("(")]
    LParen,
    /// A closing parenthesis.
    #[token(")")]
    RParen,
    /// A colon, which follows labels, headings, and declared names.
    #[token(":")]
    Colon,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n)        => write!(f, "{n}"),
            Token::Ident(id)     => f.write_str(id),
            Token::Fn            => f.write_str("fn"),
            Token::Begin         => f.write_str("begin"),
            Token::End           => f.write_str("end"),
            Token::Return        => f.write_str("return"),
            Token::If            => f.write_str("if"),
            Token::Then          => f.write_str("then"),
            Token::Not           => f.write_str("not"),
            Token::Section       => f.write_str("section"),
            Token::Constants     => f.write_str("constants"),
            Token::Data          => f.write_str("data"),
            Token::Program       => f.write_str("program"),
            Token::Configuration => f.write_str("configuration"),
            Token::Banked        => f.write_str("banked"),
            Token::Common        => f.write_str("common"),
            Token::I8            => f.write_str("i8"),
            Token::At            => f.write_str("at"),
            Token::Eq            => f.write_str("="),
            Token::Neq           => f.write_str("!="),
            Token::Inc           => f.write_str("++"),
            Token::Dec           => f.write_str("--"),
            Token::AndEq         => f.write_str("&="),
            Token::OrEq          => f.write_str("|="),
            Token::XorEq         => f.write_str("^="),
            Token::AddEq         => f.write_str("+="),
            Token::SubEq         => f.write_str("-="),
            Token::Minus         => f.write_str("-"),
            Token::LBracket      => f.write_str("["),
            Token::RBracket      => f.write_str("]"),
            Token::LParen        => f.write_str("("),
            Token::RParen        => f.write_str(")"),
            Token::Colon         => f.write_str(":"),
        }
    }
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal cannot fit within the range of an i32.
    DoesNotFit,
    /// Hex literal (starting with $) doesn't have digits after it.
    InvalidHexEmpty,
    /// Binary literal (starting with %) doesn't have digits after it.
    InvalidBinEmpty,
    /// Numeric literal has digits invalid in its declared base.
    InvalidNumeric,
    /// A symbol was used which is not allowed in Piccolo source files.
    #[default]
    InvalidSymbol,
}

impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFit      => f.write_str("numeric literal does not fit 32-bit integer"),
            LexErr::InvalidHexEmpty => f.write_str("invalid hex literal"),
            LexErr::InvalidBinEmpty => f.write_str("invalid binary literal"),
            LexErr::InvalidNumeric  => f.write_str("invalid numeric literal"),
            LexErr::InvalidSymbol   => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFit      => Some(format!("the range for a numeric literal is [{}, {}]", i32::MIN, i32::MAX).into()),
            LexErr::InvalidHexEmpty => Some("there should be hex digits (0-9, A-F) after the $".into()),
            LexErr::InvalidBinEmpty => Some("there should be binary digits (0-1) after the %".into()),
            LexErr::InvalidNumeric  => None,
            LexErr::InvalidSymbol   => Some("this char does not occur in any token in Piccolo".into()),
        }
    }
}

fn lex_num(lx: &Lexer<'_, Token>, base: u32) -> Result<i32, LexErr> {
    let digits = match base {
        10 => lx.slice(),
        _  => &lx.slice()[1..], // drop the $ or % sigil
    };
    let clean: String = digits.chars().filter(|&c| c != '_').collect();

    i32::from_str_radix(&clean, base).map_err(|e| match e.kind() {
        IntErrorKind::Empty => match base {
            16 => LexErr::InvalidHexEmpty,
            _  => LexErr::InvalidBinEmpty,
        },
        IntErrorKind::InvalidDigit => LexErr::InvalidNumeric,
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => LexErr::DoesNotFit,
        _ => LexErr::InvalidNumeric,
    })
}
