//! Bulk export of the source table into staging storage
//!
//! Issues a single `UNLOAD` statement that writes tab-delimited shards plus a
//! manifest under the staging prefix. Failure of the statement is fatal.

use bigshift_common::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::SourceWarehouse;
use crate::credentials::StagingCredentials;
use crate::schema::{quote_ident, Column, TableSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnloadOptions {
    pub allow_overwrite: bool,
    pub compression: bool,
}

impl Default for UnloadOptions {
    fn default() -> Self {
        Self {
            allow_overwrite: false,
            compression: true,
        }
    }
}

/// Escape text for embedding inside a single-quoted literal of the export
/// statement
fn escape_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `SELECT` over every column, each rendered with its export expression
pub fn select_statement(table_name: &str, columns: &[Column]) -> String {
    let expressions = columns
        .iter()
        .map(Column::export_expression)
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", expressions, quote_ident(table_name))
}

/// Full export statement for `select_sql` writing to `s3_uri`
pub fn unload_statement(
    select_sql: &str,
    s3_uri: &str,
    credentials: &StagingCredentials,
    options: UnloadOptions,
) -> String {
    let mut sql = format!(
        "UNLOAD ('{}') TO '{}' CREDENTIALS '{}' MANIFEST DELIMITER '\\t'",
        escape_literal(select_sql),
        escape_literal(s3_uri),
        escape_literal(&credentials.to_unload_credentials()),
    );
    if options.compression {
        sql.push_str(" GZIP");
    }
    if options.allow_overwrite {
        sql.push_str(" ALLOWOVERWRITE");
    }
    sql
}

pub struct RedshiftUnloader {
    source: Arc<dyn SourceWarehouse>,
    credentials: StagingCredentials,
}

impl RedshiftUnloader {
    pub fn new(source: Arc<dyn SourceWarehouse>, credentials: StagingCredentials) -> Self {
        Self {
            source,
            credentials,
        }
    }

    /// Export the table described by `table_schema` to `s3_uri`
    pub async fn unload_to(
        &self,
        table_schema: &TableSchema,
        s3_uri: &str,
        options: UnloadOptions,
    ) -> Result<()> {
        let columns = table_schema.columns().await?;
        let select_sql = select_statement(table_schema.table_name(), columns);
        debug!(select = %select_sql, "Built export query");

        let unload_sql = unload_statement(&select_sql, s3_uri, &self.credentials, options);

        info!(
            "Unloading Redshift table {}.{} to {}",
            table_schema.schema_name(),
            table_schema.table_name(),
            s3_uri
        );
        self.source.execute(&unload_sql).await?;
        info!(
            "Unload of {}.{} complete",
            table_schema.schema_name(),
            table_schema.table_name()
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn credentials() -> StagingCredentials {
        StagingCredentials::new("AKIAEXAMPLE", "s3cr3t", None)
    }

    #[test]
    fn test_select_statement() {
        let columns = vec![
            Column::new("id", "bigint", false).unwrap(),
            Column::new("active", "boolean", false).unwrap(),
        ];
        assert_eq!(
            select_statement("orders", &columns),
            r#"SELECT "id", (CASE WHEN "active" THEN 1 ELSE 0 END) FROM "orders""#
        );
    }

    #[test]
    fn test_unload_statement_defaults() {
        let sql = unload_statement(
            r#"SELECT "id" FROM "orders""#,
            "s3://staging/db/public/orders/db-public-orders-",
            &credentials(),
            UnloadOptions::default(),
        );
        assert_eq!(
            sql,
            r#"UNLOAD ('SELECT "id" FROM "orders"') TO 's3://staging/db/public/orders/db-public-orders-' CREDENTIALS 'aws_access_key_id=AKIAEXAMPLE;aws_secret_access_key=s3cr3t' MANIFEST DELIMITER '\t' GZIP"#
        );
    }

    #[test]
    fn test_unload_statement_flags() {
        let sql = unload_statement(
            "SELECT 1",
            "s3://b/p",
            &credentials(),
            UnloadOptions {
                allow_overwrite: true,
                compression: false,
            },
        );
        assert!(sql.ends_with(r#"MANIFEST DELIMITER '\t' ALLOWOVERWRITE"#));
        assert!(!sql.contains("GZIP"));
    }

    #[test]
    fn test_quotes_and_backslashes_are_escaped_in_select() {
        let note = Column::new("note", "character varying(10)", true).unwrap();
        let select_sql = select_statement("orders", std::slice::from_ref(&note));
        let sql = unload_statement(&select_sql, "s3://b/p", &credentials(), UnloadOptions::default());

        assert!(sql.starts_with(r#"UNLOAD ('SELECT (\'"\' || REPLACE(REPLACE(REPLACE("note", \'"\', \'""\'), \'\\n\', \'\\\\n\'), \'\\r\', \'\\\\r\') || \'"\') FROM "orders"')"#));
    }

    #[test]
    fn test_session_token_is_included() {
        let creds = StagingCredentials::new("AKIA", "secret", Some("tok".to_string()));
        let sql = unload_statement("SELECT 1", "s3://b/p", &creds, UnloadOptions::default());
        assert!(sql.contains("CREDENTIALS 'aws_access_key_id=AKIA;aws_secret_access_key=secret;token=tok'"));
    }
}
