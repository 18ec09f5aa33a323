// scrubscan/src/lib.rs
//! # Scrubscan CLI Application
//!
//! Command-line front end for `scrubscan-core`: argument parsing, logger setup
//! and one module per subcommand.

pub mod cli;
pub mod commands;
pub mod logger;
