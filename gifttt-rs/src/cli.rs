//! Command-line argument parsing.
//!
//! Usage:
//!   gifttt [--db <file>] [--ruledir <dir>] [--suffix <ext>] [--tick-ms <n>] [--log <filter>]

use std::path::PathBuf;

use clap::Parser;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "gifttt", version)]
#[command(about = "Reactive home-automation rule engine")]
pub struct CliArgs {
    /// Database file (default: platform data directory).
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Directory scanned for rule files.
    #[arg(long, value_name = "DIR", default_value = "./")]
    pub ruledir: PathBuf,

    /// File extension of rule files.
    #[arg(long, value_name = "EXT", default_value = "rule")]
    pub suffix: String,

    /// Clock interval in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 1000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Log filter (overrides RUST_LOG), e.g. `debug` or `gifttt::rule=info`.
    #[arg(long, value_name = "FILTER")]
    pub log: Option<String>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()`; prints usage and exits on error.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

/// Parse an explicit argument vector (without the program name).
pub fn parse_argv(argv: &[&str]) -> Result<CliArgs, clap::Error> {
    CliArgs::try_parse_from(std::iter::once("gifttt").chain(argv.iter().copied()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_args() {
        let a = parse_argv(&[]).unwrap();
        assert_eq!(a.db, None);
        assert_eq!(a.ruledir, PathBuf::from("./"));
        assert_eq!(a.suffix, "rule");
        assert_eq!(a.tick_ms, 1000);
        assert_eq!(a.log, None);
    }

    #[test]
    fn all_flags() {
        let a = parse_argv(&[
            "--db", "/tmp/x.db", "--ruledir", "rules", "--suffix", "lisp", "--tick-ms", "250",
            "--log", "debug",
        ])
        .unwrap();
        assert_eq!(a.db, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(a.ruledir, PathBuf::from("rules"));
        assert_eq!(a.suffix, "lisp");
        assert_eq!(a.tick_ms, 250);
        assert_eq!(a.log.as_deref(), Some("debug"));
    }

    #[test]
    fn zero_tick_is_rejected() {
        assert!(parse_argv(&["--tick-ms", "0"]).is_err());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(parse_argv(&["--world", "x"]).is_err());
    }

    #[test]
    fn positional_is_rejected() {
        assert!(parse_argv(&["extra"]).is_err());
    }
}
