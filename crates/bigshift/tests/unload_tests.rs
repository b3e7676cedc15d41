//! Catalog lookup and export statement generation

#![allow(clippy::unwrap_used)]

mod common;

use bigshift::schema::{DestinationType, FieldMode, TableSchema};
use bigshift::unloader::{RedshiftUnloader, UnloadOptions};
use bigshift::BigShiftError;
use common::*;
use std::sync::Arc;

fn orders_source() -> FakeSource {
    FakeSource::default().with_table(
        "public",
        "orders",
        &[
            ("note", "character varying(255)", false),
            ("id", "bigint", true),
            ("created_at", "timestamp without time zone", true),
            ("active", "boolean", false),
        ],
    )
}

#[tokio::test]
async fn test_columns_are_sorted_by_name_and_read_once() {
    let source = Arc::new(orders_source());
    let schema = TableSchema::new(source.clone(), "public", "orders");

    let names = schema
        .columns()
        .await
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["active", "created_at", "id", "note"]);

    schema.to_destination_schema().await.unwrap();
    assert_eq!(source.catalog_calls(), 1);
}

#[tokio::test]
async fn test_destination_schema_translation() {
    let schema = TableSchema::new(Arc::new(orders_source()), "public", "orders");

    let fields = schema.to_destination_schema().await.unwrap().fields;
    let summary = fields
        .iter()
        .map(|f| (f.name.as_str(), f.field_type, f.mode))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            ("active", DestinationType::Boolean, FieldMode::Nullable),
            ("created_at", DestinationType::Timestamp, FieldMode::Required),
            ("id", DestinationType::Integer, FieldMode::Required),
            ("note", DestinationType::String, FieldMode::Nullable),
        ]
    );
}

#[tokio::test]
async fn test_unknown_table_is_not_found() {
    let schema = TableSchema::new(Arc::new(orders_source()), "sales", "orders");

    let err = schema.columns().await.unwrap_err();
    assert!(matches!(
        err,
        BigShiftError::TableNotFound { ref schema, ref table } if schema == "sales" && table == "orders"
    ));
}

#[tokio::test]
async fn test_unsupported_column_type_fails_before_export() {
    let source = Arc::new(FakeSource::default().with_table(
        "public",
        "shapes",
        &[("id", "integer", true), ("outline", "geometry", false)],
    ));
    let schema = TableSchema::new(source.clone(), "public", "shapes");
    let unloader = RedshiftUnloader::new(source.clone(), staging_credentials());

    let err = unloader
        .unload_to(&schema, "s3://staging/db/public/shapes/", UnloadOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BigShiftError::UnsupportedColumnType(ref t) if t == "geometry"));
    assert!(source.executed().is_empty());
}

#[tokio::test]
async fn test_unload_executes_one_statement() {
    init_tracing();
    let source = Arc::new(FakeSource::default().with_table(
        "public",
        "orders",
        &[("id", "bigint", true), ("total", "numeric(12,2)", false)],
    ));
    let schema = TableSchema::new(source.clone(), "public", "orders");
    let unloader = RedshiftUnloader::new(source.clone(), staging_credentials());

    unloader
        .unload_to(
            &schema,
            "s3://staging/db/public/orders/db-public-orders-",
            UnloadOptions {
                allow_overwrite: false,
                compression: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        source.executed(),
        vec![
            r#"UNLOAD ('SELECT "id", "total" FROM "orders"') TO 's3://staging/db/public/orders/db-public-orders-' CREDENTIALS 'aws_access_key_id=AKIAEXAMPLE;aws_secret_access_key=s3cr3t' MANIFEST DELIMITER '\t'"#
                .to_string()
        ]
    );
}
