//! Error interfaces for this crate.
//!
//! Each pipeline stage reports failures through its own type, re-exported
//! below: [`LexErr`] and [`ParseErr`] from the front end, [`CompileErr`]
//! from lowering, [`AsmErr`] from assembly. The [`Error`] trait is the one
//! surface the CLI needs to render any of them as a source-annotated
//! report.

use std::borrow::Cow;
use std::ops::Range;

pub use crate::asm::AsmErr;
pub use crate::codegen::CompileErr;
pub use crate::parse::lex::LexErr;
pub use crate::parse::ParseErr;

/// Common interface over every error the compiler can report.
///
/// The [`Display`] implementation carries the one-line message (what went
/// wrong); [`Error::span`] and [`Error::help`] carry the optional context
/// a renderer can attach to it.
///
/// [`Display`]: std::fmt::Display
pub trait Error: std::error::Error {
    /// The byte range of the source text this error points at, as
    /// produced by the lexer (a [`logos::Span`]).
    ///
    /// Parser and code-generation errors carry one; assembler errors
    /// operate on the op list, after source positions are gone, and
    /// return `None`.
    fn span(&self) -> Option<Range<usize>> {
        None
    }

    /// A short suggestion rendered alongside the message, such as listing
    /// the condition forms the idiom matcher accepts, or pointing at the
    /// `banked:` heading when common RAM runs out.
    ///
    /// `None` when the message already says everything useful.
    fn help(&self) -> Option<Cow<str>>;
}
