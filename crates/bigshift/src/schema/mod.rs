//! Source table schema and its destination translation

pub mod column;
pub mod type_map;

pub use column::{quote_ident, Column, FieldMode, FieldSchema};
pub use type_map::{destination_type, DestinationType, TypeClass};

use bigshift_common::{BigShiftError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::clients::SourceWarehouse;

/// Destination table schema, shaped like the warehouse API expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSchema {
    pub fields: Vec<FieldSchema>,
}

/// Columns of one source table, read from the catalog once per run
pub struct TableSchema {
    source: Arc<dyn SourceWarehouse>,
    schema_name: String,
    table_name: String,
    columns: OnceCell<Vec<Column>>,
}

impl TableSchema {
    pub fn new(
        source: Arc<dyn SourceWarehouse>,
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            columns: OnceCell::new(),
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Columns sorted by name.
    ///
    /// Fails with `TableNotFound` when the catalog has no rows for the table
    /// and with `UnsupportedColumnType` for any column without a mapping.
    pub async fn columns(&self) -> Result<&[Column]> {
        let columns = self
            .columns
            .get_or_try_init(|| async {
                let rows = self
                    .source
                    .table_columns(&self.schema_name, &self.table_name)
                    .await?;
                if rows.is_empty() {
                    return Err(BigShiftError::TableNotFound {
                        schema: self.schema_name.clone(),
                        table: self.table_name.clone(),
                    });
                }
                let mut columns = rows
                    .into_iter()
                    .map(|row| Column::new(row.column, row.data_type, !row.not_null))
                    .collect::<Result<Vec<_>>>()?;
                columns.sort_by(|a, b| a.name().cmp(b.name()));
                Ok::<_, BigShiftError>(columns)
            })
            .await?;
        Ok(columns.as_slice())
    }

    pub async fn to_destination_schema(&self) -> Result<DestinationSchema> {
        let fields = self.columns().await?.iter().map(Column::to_field).collect();
        Ok(DestinationSchema { fields })
    }
}
