//! BigShift
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves one Redshift table into BigQuery, staging the data through S3 and
//! Cloud Storage.
//!
//! # Overview
//!
//! A run is four sequential stages, see [`pipeline::Pipeline`]:
//!
//! - **Unload**: export the table to S3 as tab-delimited shards plus a
//!   manifest ([`unloader`])
//! - **Transfer**: copy the shards to Cloud Storage with the Storage Transfer
//!   Service, then check every size against the manifest ([`transfer`],
//!   [`manifest`])
//! - **Load**: load the shards into a BigQuery table with a schema translated
//!   from the Redshift catalog ([`load`], [`schema`])
//! - **Cleanup**: delete the shards and the manifest from both buckets
//!   ([`cleaner`])
//!
//! All I/O goes through the collaborator traits in [`clients`], so the stages
//! run unchanged against in-memory fakes.

pub mod cleaner;
pub mod cli;
pub mod clients;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod load;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod schema;
pub mod transfer;
pub mod unloader;
mod wire;

// Re-export commonly used types
pub use bigshift_common::{BigShiftError, Result};
pub use cli::Cli;
pub use config::{PipelineConfig, Step};
pub use pipeline::{Components, Pipeline};
