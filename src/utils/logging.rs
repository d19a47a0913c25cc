// src/utils/logging.rs
//! Logging configuration and utilities
//!
//! This module handles logging setup for the miner application, including:
//! - Standard logging configuration
//! - Benchmark-specific logging
//! - Custom log formatting
//!
//! Uses `env_logger` under the hood with custom formatting and filtering.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes the logging subsystem
///
/// # Configuration
/// - Logs to stderr, so share lines on stdout stay machine-readable
/// - Default log level: Info, or Debug when `verbose` is set
/// - Custom timestamp and source location formatting
/// - `RUST_LOG` overrides the default when set
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_with_default(default);
}

/// Configures benchmark-specific logging
///
/// Same as [`init_logging`] with Debug as the default level.
pub fn init_bench_logging() {
    init_with_default(LevelFilter::Debug);
}

fn init_with_default(default: LevelFilter) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(default);
    } else {
        builder.parse_env("RUST_LOG");
    }

    // A second initialisation (e.g. from tests) is harmless.
    let _ = builder.try_init();
}

/// Creates and configures a base logger builder with common settings
///
/// # Features
/// - Custom log format including:
///   - Timestamp (seconds since epoch)
///   - Log level
///   - Module path
///   - Line number
///   - Message
/// - Output to stderr
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let level = record.level();
            let module = record.module_path().unwrap_or_default();
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                ts,
                level,
                module,
                line,
                record.args()
            )
        })
        .target(Target::Stderr);

    builder
}
