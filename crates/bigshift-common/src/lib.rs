//! BigShift Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging and formatting helpers for the BigShift
//! workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`BigShiftError`] covers every failure the pipeline
//!   can surface, from catalog lookups to vendor job failures
//! - **Logging**: [`logging`] configures the global `tracing` subscriber
//! - **Units**: [`units`] renders byte counts the way pipeline logs report them
//!
//! # Example
//!
//! ```no_run
//! use bigshift_common::{BigShiftError, Result};
//!
//! fn require_rows(count: usize) -> Result<()> {
//!     if count == 0 {
//!         return Err(BigShiftError::TableNotFound {
//!             schema: "public".to_string(),
//!             table: "orders".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod units;

// Re-export commonly used types
pub use error::{BigShiftError, Result};
