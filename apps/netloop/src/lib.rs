//! # netloop
//!
//! The host side of the netloop dispatcher: scenario files, a fixed-step
//! frame driver, a synthetic tally workload and the CLI.
//!
//! The dispatcher itself lives in `netloop-core`; this crate only decides
//! *when* each stage runs.

pub mod cli;
pub mod config;
pub mod host;
pub mod report;
pub mod workload;
