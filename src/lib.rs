//! A compiler for Piccolo, a small high-level notation for the
//! PIC16F1xxx family of 8-bit microcontrollers.
//!
//! Every construct in the language maps to a single PIC instruction or a
//! short fixed instruction sequence; the compiler's job is to recognise
//! those constructs, lower them to instructions, and emit the result as an
//! Intel HEX image a programmer can load.
//!
//! The pipeline:
//! - [`parse`]: lexes and parses source text into a [`Program`](ast::Program)
//! - [`codegen`]: lowers a program into an instruction list, allocating
//!   data memory along the way
//! - [`asm`]: encodes instructions into 14-bit words, tracking the selected
//!   data-memory bank and resolving forward label references
//! - [`asm::hex`]: formats the assembled image as Intel HEX

#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod codegen;
pub mod asm;
pub mod err;
