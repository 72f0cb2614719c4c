//! par2cron - scheduled PAR2 re-verification.
//!
//! Parses PAR2 recovery sets (`packets`, `parser`, `merger`, `set`,
//! `domain`), tracks per-archive verification history in a JSON sidecar
//! (`manifest`), enumerates archives on disk (`enumerator`), selects and
//! drives a bounded batch of them through an external `par2` binary
//! (`scheduler`), and reports backlog health from the same history
//! (`analysis`).
//!
//! This crate never repairs files, never generates PAR2 archives, and
//! never implements Reed-Solomon itself: it is purely an operational
//! wrapper around an external PAR2 tool.

pub mod analysis;
pub mod checksum;
pub mod domain;
pub mod enumerator;
pub mod error;
pub mod fs;
pub mod job;
pub mod manifest;
pub mod merger;
pub mod packets;
pub mod parser;
pub mod scheduler;
pub mod set;

pub use error::ExitCode;
pub use job::{Job, Manifest, Stats};
