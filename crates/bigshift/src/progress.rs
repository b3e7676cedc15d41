//! Progress reporting for long-running vendor jobs
//!
//! The transfer and load stages report their polling state machine through a
//! [`ProgressSink`] injected at construction. [`TracingProgress`] forwards
//! events to `tracing`; [`NoopProgress`] drops them.

use bigshift_common::units::format_gib;
use std::fmt;

use crate::load::{LoadStatistics, RowErrorLocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    TransferStarted {
        description: String,
    },
    TransferWaiting {
        description: String,
        job_name: String,
        status: Option<String>,
    },
    TransferComplete {
        description: String,
        objects_copied: Option<u64>,
        bytes_copied: Option<u64>,
    },
    LoadStarted {
        job_id: String,
    },
    LoadWaiting {
        job_id: String,
        state: Option<String>,
    },
    LoadRowError {
        message: String,
        location: Option<RowErrorLocation>,
    },
    LoadComplete {
        job_id: String,
        statistics: LoadStatistics,
    },
}

impl ProgressEvent {
    /// Whether the event marks a stage milestone rather than routine polling
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            ProgressEvent::TransferStarted { .. }
                | ProgressEvent::TransferComplete { .. }
                | ProgressEvent::LoadStarted { .. }
                | ProgressEvent::LoadComplete { .. }
        )
    }
}

fn quoted_or_unknown(value: &Option<String>) -> String {
    value
        .as_ref()
        .map(|v| format!("{v:?}"))
        .unwrap_or_else(|| "unknown".to_string())
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::TransferStarted { description } => {
                write!(f, "Transfer {description} started")
            },
            ProgressEvent::TransferWaiting {
                description,
                job_name,
                status,
            } => write!(
                f,
                "Waiting for job {description:?} (name: {job_name:?}, status: {})",
                quoted_or_unknown(status)
            ),
            ProgressEvent::TransferComplete {
                description,
                objects_copied,
                bytes_copied,
            } => {
                write!(f, "Transfer {description} complete")?;
                if objects_copied.is_some() || bytes_copied.is_some() {
                    write!(
                        f,
                        ", {} objects and {} copied",
                        objects_copied.unwrap_or(0),
                        format_gib(bytes_copied.unwrap_or(0))
                    )?;
                }
                Ok(())
            },
            ProgressEvent::LoadStarted { .. } => write!(f, "Loading started"),
            ProgressEvent::LoadWaiting { job_id, state } => {
                write!(f, "Waiting for job {job_id:?} (status: {})", quoted_or_unknown(state))
            },
            ProgressEvent::LoadRowError { message, location } => match location {
                Some(location) => write!(f, "Load error: {message:?} in {location}"),
                None => write!(f, "Load error: {message:?}"),
            },
            ProgressEvent::LoadComplete { statistics, .. } => write!(
                f,
                "Loading complete, {} loaded from {} files, {} rows created, table size {}",
                format_gib(statistics.input_file_bytes),
                statistics.input_files,
                statistics.output_rows,
                format_gib(statistics.output_bytes)
            ),
        }
    }
}

/// Receiver of job progress events
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Emits milestones at info and polling chatter at debug
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        if event.is_milestone() {
            tracing::info!("{}", event);
        } else {
            tracing::debug!("{}", event);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}
