//! Command-line interface for ptymux.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Shell program (overrides config file).
    pub shell: Option<String>,
    /// Initial terminal rows.
    pub rows: Option<u16>,
    /// Initial terminal columns.
    pub cols: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('s') | Long("shell") => {
                result.shell = Some(parser.value()?.parse()?);
            }
            Long("rows") => {
                result.rows = Some(parse_dimension(&mut parser, "rows")?);
            }
            Long("cols") => {
                result.cols = Some(parse_dimension(&mut parser, "cols")?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_dimension(parser: &mut lexopt::Parser, name: &'static str) -> Result<u16, ArgsError> {
    use lexopt::prelude::*;

    let value: String = parser.value()?.parse()?;
    match value.parse::<u16>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ArgsError::InvalidValue(name, value)),
    }
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"ptymux {version}
Multiplexed PTY session manager

Opens a shell in a pseudo-terminal and bridges it to this terminal's
stdin/stdout through the session manager.

USAGE:
    ptymux [OPTIONS]

OPTIONS:
    -s, --shell <PROGRAM>   Shell to run [default: $SHELL or /bin/sh]
        --rows <N>          Initial terminal rows [default: 24]
        --cols <N>          Initial terminal columns [default: 80]
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    PTYMUX_SHELL            Shell program (overrides config)
    PTYMUX_LOG_LEVEL        Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Start the default shell at 24x80
    ptymux

    # Run bash in a larger terminal
    ptymux -s /bin/bash --rows 50 --cols 160

    # Start with config file and debug logs on stderr
    ptymux -c ~/.config/ptymux.json -l debug
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("ptymux {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
