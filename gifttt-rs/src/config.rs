//! Runtime configuration resolved from the command line and environment.
//!
//! | setting | source, in priority order |
//! |---------|---------------------------|
//! | database | `--db` → `GIFTTT_DB` → platform data dir → `./gifttt.db` |
//! | rule directory | `--ruledir` (default `./`) |
//! | rule suffix | `--suffix` (default `rule`) |
//! | clock interval | `--tick-ms` (default 1000) |
//! | log filter | `--log` → `RUST_LOG` → `info` |

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::cli::CliArgs;

pub const DB_FILE: &str = "gifttt.db";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub rule_dir: PathBuf,
    pub suffix: String,
    pub tick: Duration,
    pub log_filter: String,
}

impl Config {
    pub fn from_args(args: CliArgs) -> Self {
        Self {
            db_path: resolve_db_path(args.db),
            rule_dir: args.ruledir,
            suffix: args.suffix.trim_start_matches('.').to_owned(),
            tick: Duration::from_millis(args.tick_ms),
            log_filter: resolve_log_filter(args.log),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Determine the database file.
pub fn resolve_db_path(cli_override: Option<PathBuf>) -> PathBuf {
    if let Some(p) = cli_override {
        return p;
    }
    if let Some(p) = std::env::var_os("GIFTTT_DB") {
        return PathBuf::from(p);
    }
    default_db_path()
}

/// `gifttt.db` in the platform data directory, or in the working directory
/// when there is no home directory.
pub fn default_db_path() -> PathBuf {
    match ProjectDirs::from("", "", "gifttt") {
        Some(dirs) => dirs.data_dir().join(DB_FILE),
        None => PathBuf::from(DB_FILE),
    }
}

fn resolve_log_filter(cli_override: Option<String>) -> String {
    cli_override
        .or_else(|| std::env::var("RUST_LOG").ok())
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
