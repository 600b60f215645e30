#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Daisy CLI
//!
//! A command-line driver for the Daisy front end: preprocesses and tokenizes
//! source files and reports diagnostics.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use daisy::{CompileStatus, Diagnostic, FrontendConfig, FrontendError, Severity, TokenStream, TraceKind};
#[cfg(feature = "json")]
use serde::Serialize;
use std::cell::Cell;
use std::path::{Path, PathBuf};

/// Exit codes for different error conditions
mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const IO_ERROR: i32 = 2;
    pub const COMPILE_ERROR: i32 = 3;
}

/// Command-line interface for the Daisy front end
#[derive(Parser)]
#[command(
    name = "daisy",
    version,
    author,
    about = "Preprocessor and lexer for the Daisy language",
    long_about = "daisy runs the Daisy front end over source files: macros are expanded, conditional sections resolved and includes followed, and the resulting token stream is written out.",
    after_help = "EXAMPLES:
  # Preprocess a single file
  $ daisy main.dy -o main.out

  # Add include directories and predefined macros
  $ daisy main.dy -I include -D DEBUG -D WIDTH=8

  # Dump tokens with their positions
  $ daisy main.dy --tokens

  # Read from stdin
  $ cat main.dy | daisy -"
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Input files (use '-' for stdin)
    #[arg(required = true, help = "Daisy source files to process (use '-' for stdin)")]
    inputs: Vec<PathBuf>,

    /// Output file (use '-' for stdout, default: stdout)
    #[arg(short = 'o', long, help = "Output file (use '-' for stdout, default: stdout)")]
    output: Option<PathBuf>,

    /// Add include directory
    #[arg(
        short = 'I',
        long = "include",
        value_name = "DIR",
        help = "Add directory to include search path"
    )]
    include_dirs: Vec<PathBuf>,

    /// Predefine a macro
    #[arg(
        short = 'D',
        long = "define",
        value_name = "NAME[=VALUE]",
        help = "Predefine a macro; VALUE defaults to 1"
    )]
    defines: Vec<String>,

    /// Maximum `#include` nesting
    #[arg(
        long,
        default_value_t = FrontendConfig::DEFAULT_INCLUDE_DEPTH_LIMIT,
        help = "Maximum #include nesting depth"
    )]
    include_depth_limit: usize,

    /// Logging verbosity
    #[arg(
        short = 'd',
        long,
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=3),
        help = "Debug level: 0 warnings, 1 info, 2 debug, 3 token trace"
    )]
    debug_level: u8,

    /// Dump tokens instead of text
    #[arg(long, help = "Write one token per line with its position and kind")]
    tokens: bool,

    /// Output in JSON format
    #[arg(long, help = "Write results in JSON format")]
    #[cfg(feature = "json")]
    json: bool,

    /// Suppress non-error output
    #[arg(short = 'q', long, help = "Suppress warnings, notes and the summary line")]
    quiet: bool,

    /// Disable colored output
    #[arg(long, help = "Disable colored output")]
    no_color: bool,
}

/// Route `log` records to stderr; `RUST_LOG` overrides the `-d` level
fn init_logging(debug_level: u8) {
    let level = match debug_level {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .try_init();
}

/// Main application entry point
fn main() {
    std::process::exit(match run() {
        Ok(status) if status.is_success() => exit_code::SUCCESS,
        Ok(_) => exit_code::COMPILE_ERROR,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            determine_exit_code(&e)
        }
    });
}

/// Determine the appropriate exit code based on the error
fn determine_exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<std::io::Error>().is_some() {
        exit_code::IO_ERROR
    } else if let Some(err) = error.downcast_ref::<FrontendError>() {
        match err {
            FrontendError::InputNotFound { .. } => exit_code::IO_ERROR,
            FrontendError::SyntaxUnrecoverable { .. } => exit_code::COMPILE_ERROR,
        }
    } else {
        exit_code::GENERAL_ERROR
    }
}

/// Run the main application logic; returns the combined status of all inputs
fn run() -> Result<CompileStatus> {
    let cli = Cli::parse();
    init_logging(cli.debug_level);
    if cli.no_color || !atty::is(atty::Stream::Stderr) {
        colored::control::set_override(false);
    }

    let config = create_config(&cli)?;
    let mut total = CompileStatus::default();
    let mut output = String::new();
    #[cfg(feature = "json")]
    let mut reports = Vec::new();

    for input in &cli.inputs {
        let stream = process_input(input, &config)?;
        total.warnings += stream.status.warnings;
        total.errors += stream.status.errors;

        if !cli.quiet {
            eprintln!("{}: {}", format_input(input), format_status(stream.status));
        }

        #[cfg(feature = "json")]
        if cli.json {
            reports.push(InputReport::new(input, &stream, cli.tokens));
            continue;
        }

        if cli.tokens {
            output.push_str(&dump_tokens(&stream));
        } else {
            output.push_str(&stream.to_text());
        }
    }

    #[cfg(feature = "json")]
    if cli.json {
        output = serde_json::to_string_pretty(&reports)?;
        output.push('\n');
    }

    write_output(&cli, &output)?;
    Ok(total)
}

/// Build the front-end configuration from CLI arguments
fn create_config(cli: &Cli) -> Result<FrontendConfig> {
    let mut config = FrontendConfig::new().with_include_depth_limit(cli.include_depth_limit);
    for dir in &cli.include_dirs {
        config = config.with_include_path(dir);
    }
    for define in &cli.defines {
        let (name, value) = parse_define(define)?;
        config = config.with_define(name, value);
    }
    let quiet = cli.quiet;
    let show_notes = Cell::new(false);
    Ok(config.with_diagnostic_handler(move |diagnostic| print_diagnostic(diagnostic, quiet, &show_notes)))
}

/// Split `NAME[=VALUE]`
fn parse_define(define: &str) -> Result<(&str, &str)> {
    let (name, value) = define.split_once('=').unwrap_or((define, "1"));
    let valid = name
        .bytes()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == b'_')
        && name.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'_');
    if !valid {
        return Err(anyhow::anyhow!("Invalid macro name in -D {define}"));
    }
    Ok((name, value))
}

fn process_input(input: &Path, config: &FrontendConfig) -> Result<TokenStream> {
    if input == Path::new("-") {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        return Ok(daisy::tokenize_source("<stdin>", &buffer, config));
    }
    let stream = daisy::tokenize_file(input, config)?;
    Ok(stream)
}

/// Print a diagnostic with its expansion and include chain.
///
/// Notes belong to the diagnostic before them, so they are hidden whenever
/// that one was.
fn print_diagnostic(diagnostic: &Diagnostic, quiet: bool, show_notes: &Cell<bool>) {
    let visible = match diagnostic.severity {
        Severity::Fatal | Severity::Error => true,
        Severity::Note => show_notes.get(),
        Severity::Warning | Severity::Info => !quiet,
        Severity::Debug => log::log_enabled!(log::Level::Debug),
    };
    if diagnostic.severity != Severity::Note {
        show_notes.set(visible);
    }
    if !visible {
        return;
    }

    let severity = diagnostic.severity.to_string();
    let severity = match diagnostic.severity {
        Severity::Fatal | Severity::Error => severity.red().bold(),
        Severity::Warning => severity.yellow().bold(),
        Severity::Note | Severity::Info => severity.cyan().bold(),
        Severity::Debug => severity.dimmed(),
    };
    match diagnostic.origin().or_else(|| diagnostic.primary()) {
        Some(origin) => eprintln!("{}: {severity}: {}", origin.to_string().bold(), diagnostic.message),
        None => eprintln!("{severity}: {}", diagnostic.message),
    }

    for pair in diagnostic.trace.windows(2) {
        let (entry, parent) = (&pair[0], &pair[1]);
        match &entry.kind {
            TraceKind::MacroExpansion(name) => {
                eprintln!("  {} in expansion of macro `{name}` at {parent}", "note:".cyan());
            }
            TraceKind::Include => eprintln!("  {} in file included from {parent}", "note:".cyan()),
            TraceKind::Source => {}
        }
    }
}

fn format_status(status: CompileStatus) -> String {
    let text = status.to_string();
    if status.errors > 0 {
        text.red().to_string()
    } else if status.warnings > 0 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

/// One token per line: `line:column kind spelling`
fn dump_tokens(stream: &TokenStream) -> String {
    stream
        .tokens
        .iter()
        .map(|token| format!("{}\t{}\t{}\n", token.origin.first, token.kind, token.text))
        .collect()
}

/// Token record of the JSON report
#[cfg(feature = "json")]
#[derive(Serialize)]
struct TokenRecord {
    line: u32,
    column: u32,
    kind: String,
    text: String,
}

/// JSON report of one input
#[cfg(feature = "json")]
#[derive(Serialize)]
struct InputReport {
    input: String,
    success: bool,
    warnings: u32,
    errors: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tokens: Option<Vec<TokenRecord>>,
}

#[cfg(feature = "json")]
impl InputReport {
    fn new(input: &Path, stream: &TokenStream, with_tokens: bool) -> Self {
        let tokens = with_tokens.then(|| {
            stream
                .tokens
                .iter()
                .map(|token| TokenRecord {
                    line: token.origin.first.line,
                    column: token.origin.first.column,
                    kind: token.kind.to_string(),
                    text: token.text.clone(),
                })
                .collect()
        });
        Self {
            input: format_input(input),
            success: stream.status.is_success(),
            warnings: stream.status.warnings,
            errors: stream.status.errors,
            output: (!with_tokens).then(|| stream.to_text()),
            tokens,
        }
    }
}

/// Write output to file or stdout
fn write_output(cli: &Cli, content: &str) -> Result<()> {
    match &cli.output {
        Some(output_path) if output_path != Path::new("-") => {
            std::fs::write(output_path, content)
                .with_context(|| format!("Failed to write to output file: {}", output_path.display()))?;
        }
        _ => print!("{content}"),
    }
    Ok(())
}

/// Format input path for display
fn format_input(path: &Path) -> String {
    if path == Path::new("-") {
        "stdin".to_string()
    } else {
        path.display().to_string()
    }
}
