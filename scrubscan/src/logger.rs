// scrubscan/src/logger.rs
//! Logger setup for the scrubscan binary.
//!
//! Logs go to stderr so that `scan --json` output on stdout stays parseable.

use env_logger::{Builder, Env, Target};
use log::LevelFilter;

/// Initializes `env_logger`. An explicit `level` overrides `RUST_LOG`;
/// otherwise `RUST_LOG` applies, defaulting to `info`.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder
        .target(Target::Stderr)
        .format_timestamp_millis()
        .try_init()
        .ok();
}

/// Maps the global `--quiet`/`--debug` flags to a level override.
pub fn level_for(quiet: bool, debug: bool) -> Option<LevelFilter> {
    match (quiet, debug) {
        (true, _) => Some(LevelFilter::Warn),
        (false, true) => Some(LevelFilter::Debug),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_flags() {
        assert_eq!(level_for(true, false), Some(LevelFilter::Warn));
        assert_eq!(level_for(false, true), Some(LevelFilter::Debug));
        assert_eq!(level_for(false, false), None);
    }
}
