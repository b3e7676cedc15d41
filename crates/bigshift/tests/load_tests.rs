//! Destination table creation and load job polling

#![allow(clippy::unwrap_used)]

mod common;

use bigshift::load::spec::{LoadJobStatistics, SourceFormat};
use bigshift::load::{LoadOptions, LoadStatistics, RowErrorLocation, TableReference, WarehouseLoader, WriteDisposition};
use bigshift::progress::{NoopProgress, ProgressEvent};
use bigshift::schema::{DestinationSchema, DestinationType, FieldMode, FieldSchema};
use bigshift::BigShiftError;
use common::*;
use std::sync::Arc;
use std::time::Duration;

const URI: &str = "gs://landing/db/public/orders/db-public-orders-*";

fn table() -> TableReference {
    TableReference::new("my-project", "analytics", "orders")
}

fn schema() -> DestinationSchema {
    DestinationSchema {
        fields: vec![
            FieldSchema {
                name: "id".to_string(),
                field_type: DestinationType::Integer,
                mode: FieldMode::Required,
            },
            FieldSchema {
                name: "note".to_string(),
                field_type: DestinationType::String,
                mode: FieldMode::Nullable,
            },
        ],
    }
}

struct Harness {
    warehouse: Arc<ScriptedWarehouse>,
    clock: Arc<RecordingClock>,
    progress: Arc<RecordingProgress>,
    loader: WarehouseLoader,
}

fn harness(warehouse: ScriptedWarehouse) -> Harness {
    init_tracing();
    let warehouse = Arc::new(warehouse);
    let clock = Arc::new(RecordingClock::new());
    let progress = Arc::new(RecordingProgress::default());
    let loader = WarehouseLoader::new(warehouse.clone())
        .with_clock(clock.clone())
        .with_progress(progress.clone())
        .with_poll_interval(Duration::from_secs(60));
    Harness {
        warehouse,
        clock,
        progress,
        loader,
    }
}

#[tokio::test]
async fn test_ensure_table_creates_missing_table_with_schema() {
    let h = harness(ScriptedWarehouse::default());

    let info = h.loader.ensure_table(&table(), Some(&schema())).await.unwrap();

    assert_eq!(info.table_reference, table());
    assert_eq!(h.warehouse.created(), vec![(table(), Some(schema()))]);
}

#[tokio::test]
async fn test_ensure_table_keeps_existing_table() {
    let h = harness(ScriptedWarehouse::default().with_table(&table()));

    h.loader.ensure_table(&table(), Some(&schema())).await.unwrap();
    h.loader.ensure_table(&table(), Some(&schema())).await.unwrap();

    assert!(h.warehouse.created().is_empty());
}

#[tokio::test]
async fn test_load_job_configuration() {
    let h = harness(ScriptedWarehouse::default());
    let options = LoadOptions {
        schema: Some(schema()),
        allow_overwrite: false,
        max_bad_records: Some(3),
    };

    h.loader.load(&table(), URI, &options).await.unwrap();

    let inserted = h.warehouse.inserted();
    assert_eq!(inserted.len(), 1);
    let spec = &inserted[0];
    assert!(spec.job_reference.job_id.starts_with("bigshift_"));
    assert_eq!(spec.job_reference.project_id, "my-project");

    let load = &spec.configuration.load;
    assert_eq!(load.source_uris, vec![URI.to_string()]);
    assert_eq!(load.destination_table, table());
    assert_eq!(load.write_disposition, WriteDisposition::FailIfNonEmpty);
    assert_eq!(load.source_format, SourceFormat::DelimitedText);
    assert_eq!(load.field_delimiter, "\t");
    assert_eq!(load.quote, "\"");
    assert_eq!(load.max_bad_records, Some(3));
    assert_eq!(load.schema, Some(schema()));
}

#[tokio::test]
async fn test_allow_overwrite_truncates() {
    let h = harness(ScriptedWarehouse::default());
    let options = LoadOptions {
        allow_overwrite: true,
        ..LoadOptions::default()
    };

    h.loader.load(&table(), URI, &options).await.unwrap();

    let spec = &h.warehouse.inserted()[0];
    assert_eq!(
        spec.configuration.load.write_disposition,
        WriteDisposition::TruncateOverwrite
    );
    assert_eq!(spec.configuration.load.max_bad_records, None);
}

#[tokio::test]
async fn test_job_ids_are_unique_per_load() {
    let h = harness(ScriptedWarehouse::default());

    h.loader.load(&table(), URI, &LoadOptions::default()).await.unwrap();
    h.loader.load(&table(), URI, &LoadOptions::default()).await.unwrap();

    let inserted = h.warehouse.inserted();
    assert_ne!(inserted[0].job_reference.job_id, inserted[1].job_reference.job_id);
}

#[tokio::test]
async fn test_polls_until_done_and_returns_statistics() {
    let h = harness(ScriptedWarehouse::default().with_steps(vec![
        JobStep::Pending(Some("PENDING")),
        JobStep::Pending(Some("RUNNING")),
        JobStep::Pending(Some("RUNNING")),
        JobStep::Succeeded(LoadJobStatistics {
            input_file_bytes: Some(23_618_287),
            input_files: Some(20),
            output_rows: Some(41_470),
            output_bytes: Some(24_870_344),
        }),
    ]));

    let statistics = h.loader.load(&table(), URI, &LoadOptions::default()).await.unwrap();

    let expected = LoadStatistics {
        input_file_bytes: 23_618_287,
        input_files: 20,
        output_rows: 41_470,
        output_bytes: 24_870_344,
    };
    assert_eq!(statistics, expected);
    assert_eq!(h.warehouse.get_job_calls(), 4);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(60); 3]);

    let events = h.progress.events();
    assert_eq!(events.len(), 4);
    assert!(matches!(
        &events[0],
        ProgressEvent::LoadWaiting { state: Some(s), .. } if s == "PENDING"
    ));
    assert!(matches!(events[1], ProgressEvent::LoadStarted { .. }));
    assert!(matches!(
        &events[2],
        ProgressEvent::LoadWaiting { state: Some(s), .. } if s == "RUNNING"
    ));
    assert!(matches!(
        &events[3],
        ProgressEvent::LoadComplete { statistics, .. } if *statistics == expected
    ));
}

#[tokio::test]
async fn test_failed_job_reports_row_errors() {
    let h = harness(ScriptedWarehouse::default().with_steps(vec![JobStep::Failed(
        error_proto("Too many errors encountered.", None),
        vec![
            error_proto(
                "Could not parse 'abc' as int for field id",
                Some("File: 0 / Line:5 / Field:1"),
            ),
            error_proto("Too many errors encountered.", None),
        ],
    )]));

    let err = h
        .loader
        .load(&table(), URI, &LoadOptions::default())
        .await
        .unwrap_err();

    match err {
        BigShiftError::LoadJobFailed { job_id, message } => {
            assert!(job_id.starts_with("bigshift_"));
            assert_eq!(message, "Too many errors encountered.");
        },
        other => panic!("unexpected error: {other:?}"),
    }

    let events = h.progress.events();
    assert_eq!(
        events,
        vec![
            ProgressEvent::LoadRowError {
                message: "Could not parse 'abc' as int for field id".to_string(),
                location: Some(RowErrorLocation::parse("File: 0 / Line:5 / Field:1")),
            },
            ProgressEvent::LoadRowError {
                message: "Too many errors encountered.".to_string(),
                location: None,
            },
        ]
    );
    assert_eq!(
        events[0].to_string(),
        r#"Load error: "Could not parse 'abc' as int for field id" in file 0, line 5, field 1"#
    );
}

#[tokio::test]
async fn test_transient_job_lookup_failures_are_retried() {
    let h = harness(ScriptedWarehouse::default().with_steps(vec![
        JobStep::Unavailable,
        JobStep::Unavailable,
        JobStep::Succeeded(LoadJobStatistics::default()),
    ]));

    h.loader.load(&table(), URI, &LoadOptions::default()).await.unwrap();

    assert_eq!(h.warehouse.get_job_calls(), 3);
    assert_eq!(h.clock.sleeps().len(), 2);
}

#[tokio::test]
async fn test_job_lookup_gives_up_after_retry_budget() {
    let h = harness(
        ScriptedWarehouse::default().with_steps((0..5).map(|_| JobStep::Unavailable).collect()),
    );

    let err = h
        .loader
        .load(&table(), URI, &LoadOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BigShiftError::TransferRpc { attempts: 5, .. }));
    assert!(
        err.to_string()
            .starts_with("Gave up waiting for load job after 5 attempts"),
        "{err}"
    );
}

#[tokio::test]
async fn test_silent_progress_sink_still_returns_statistics() {
    let warehouse = Arc::new(ScriptedWarehouse::default().with_steps(vec![
        JobStep::Pending(Some("RUNNING")),
        JobStep::Succeeded(LoadJobStatistics {
            input_files: Some(2),
            output_rows: Some(7),
            ..LoadJobStatistics::default()
        }),
    ]));
    let loader = WarehouseLoader::new(warehouse.clone())
        .with_clock(Arc::new(RecordingClock::new()))
        .with_progress(Arc::new(NoopProgress));

    let statistics = loader.load(&table(), URI, &LoadOptions::default()).await.unwrap();

    assert_eq!(statistics.input_files, 2);
    assert_eq!(statistics.output_rows, 7);
    assert_eq!(warehouse.get_job_calls(), 2);
}
