//! Source warehouse on Amazon Redshift

use async_trait::async_trait;
use bigshift_common::{BigShiftError, Result};
use sqlx::Executor;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{CatalogRow, SourceWarehouse};
use crate::credentials::SourceCredentials;
use crate::schema::quote_ident;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// `pg_table_def` only lists tables on the search path, which is set to the
/// source schema for every connection.
const CATALOG_QUERY: &str = r#"SELECT "column"::varchar, "type"::varchar, "notnull"
FROM "pg_table_def" ptd, information_schema.columns isc
WHERE ptd.schemaname = isc.table_schema
AND ptd.tablename = isc.table_name
AND ptd.column = isc.column_name
AND "schemaname" = $1
AND "tablename" = $2
ORDER BY ordinal_position"#;

fn source_error(err: sqlx::Error) -> BigShiftError {
    BigShiftError::Source(err.to_string())
}

pub struct RedshiftSource {
    pool: PgPool,
}

impl RedshiftSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a single TLS connection to `database` with `schema` on the
    /// search path
    pub async fn connect(credentials: &SourceCredentials, database: &str, schema: &str) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.username)
            .password(&credentials.password)
            .database(database)
            .ssl_mode(PgSslMode::Require);

        let search_path = format!("SET search_path = {}", quote_ident(schema));
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .after_connect(move |conn, _meta| {
                let sql = search_path.clone();
                Box::pin(async move {
                    conn.execute(sql.as_str()).await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(source_error)?;

        info!(
            host = %credentials.host,
            database,
            schema,
            "Connected to Redshift"
        );
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SourceWarehouse for RedshiftSource {
    #[instrument(skip(self))]
    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<CatalogRow>> {
        let rows: Vec<(String, String, bool)> = sqlx::query_as(CATALOG_QUERY)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(source_error)?;

        debug!("Catalog returned {} columns", rows.len());
        Ok(rows
            .into_iter()
            .map(|(column, data_type, not_null)| CatalogRow {
                column,
                data_type,
                not_null,
            })
            .collect())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(source_error)?;
        Ok(())
    }
}
