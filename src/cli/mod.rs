//! # CLI Module
//!
//! Command-line front end for inspecting and exercising the reactor.
//!
//! ## Commands
//!
//! ### `dispatchers`
//!
//! Print the dispatchers an environment configuration defines, one JSON
//! object per line:
//!
//! ```bash
//! brrtreactor dispatchers --config reactor.yaml
//! ```
//!
//! ### `bench`
//!
//! Publish events through a named dispatcher and report throughput:
//!
//! ```bash
//! brrtreactor bench --dispatcher threadPoolExecutor --events 1000000 --consumers 4
//! ```
//!
//! ### `decode`
//!
//! Run a codec over a file (or stdin) and print each decoded value as JSON:
//!
//! ```bash
//! tail -f /var/log/messages | brrtreactor decode --codec syslog
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use brrtreactor::cli::{run, Cli};
//! use clap::Parser;
//!
//! run(Cli::parse())?;
//! ```

mod commands;


pub use commands::{
    bench, decode, list_dispatchers, run, run_cli, BenchReport, Cli, CodecName, Commands,
};
