//! snag-core library.
//!
//! Defects, their status lifecycle, the role-based guard, and the SQLite
//! store behind the `snag` CLI. [`Tracker`] is the entry point.
//!
//! # Conventions
//!
//! - **Errors**: Core operations return [`error::Result`]; I/O and setup use
//!   `anyhow::Result` with context.
//! - **Logging**: Use `tracing` macros (`info!` on mutations, `debug!` on
//!   decisions, `warn!` on rejections).

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod stats;
pub mod tracker;
pub mod workflow;

pub use error::{Error, ErrorCode, Result};
pub use tracker::{DefectPage, Tracker};
