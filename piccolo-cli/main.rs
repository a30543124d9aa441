use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::Parser;
use piccolo::asm::{assemble, hex::write_hex};
use piccolo::codegen::compile;
use piccolo::parse::parse_program;

#[derive(Parser)]
#[command(version, about = "Compile Piccolo source into a PIC16F1xxx Intel HEX image", long_about = None)]
struct Args {
    /// Print the assembly listing to standard output instead of writing a
    /// HEX file.
    #[arg(short = 'S')]
    listing: bool,

    /// The input source file.
    input: PathBuf,
}

fn main() -> ExitCode {
    let Args { listing, input } = Args::parse();

    match run(listing, &input) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

fn run(listing: bool, input: &Path) -> Result<(), ExitCode> {
    let src = std::fs::read_to_string(input).map_err(|e| report_simple(input, e))?;
    let meta = SourceMetadata {
        name: file_name(input).unwrap_or(""),
        src: Source::from(src.clone()),
    };

    let program = parse_program(&src).map_err(|errs| {
        for e in &errs {
            report_error(e, &meta);
        }
        ExitCode::FAILURE
    })?;

    let (ops, symbols) = compile(program).map_err(|e| report_error(&e, &meta))?;

    if listing {
        for op in &ops {
            println!("{op}");
        }
        return Ok(());
    }

    let (words, config) = assemble(&ops, symbols).map_err(|e| report_error(&e, &meta))?;

    let output = input.with_extension("hex");
    let mut image = Vec::new();
    write_hex(&mut image, &words, &config).map_err(|e| report_simple(&output, e))?;
    std::fs::write(&output, image).map_err(|e| report_simple(&output, e))
}

struct SourceMetadata<'fp> {
    name: &'fp str,
    src: Source<String>,
}

fn file_name(fp: &Path) -> Option<&str> {
    fp.file_name()?.to_str()
}

fn report_simple(fp: &Path, err: impl std::fmt::Display) -> ExitCode {
    eprintln!("error: {}: {}", fp.display(), err);
    ExitCode::FAILURE
}

fn report_error<E: piccolo::err::Error>(err: &E, meta: &SourceMetadata) -> ExitCode {
    let span = err.span();
    let help = err.help();

    let offset = span.as_ref().map_or(0, |s| s.start);
    let mut report = Report::build(ReportKind::Error, meta.name, offset)
        .with_message(err.to_string());

    match span {
        Some(range) => {
            let mut label = Label::new((meta.name, range)).with_color(Color::Red);
            if let Some(help) = help.as_deref() {
                label = label.with_message(help);
            }
            report.add_label(label);
        }
        None => {
            if let Some(help) = help.as_deref() {
                report.set_help(help);
            }
        }
    }

    report.finish()
        .eprint((meta.name, meta.src.clone()))
        .unwrap();

    ExitCode::FAILURE
}
