//! Logger initialization for the service binary.
//!
//! Library code only talks to the `log` facade; the binary picks the sinks.

use std::fs::OpenOptions;
use std::path::Path;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

/// Log to the terminal and, when `file` is given, append to it as well.
///
/// Calling this more than once is a no-op.
pub fn init(level: LevelFilter, file: Option<&Path>) {
    let config = build_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(path) = file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => loggers.push(WriteLogger::new(level, config, f)),
            Err(err) => eprintln!("Warning: could not open log file {}: {}", path.display(), err),
        }
    }

    let _ = CombinedLogger::init(loggers);
}

/// Debug-level terminal logger for tests. Safe to call from every test.
pub fn init_for_tests() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        build_config(),
        TerminalMode::Mixed,
        ColorChoice::Never,
    );
}
