use bigshift_common::Result;
use serde::{Deserialize, Serialize};

use super::type_map::{DestinationType, TypeClass};

/// Quote an identifier for the source warehouse, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Nullability of a destination field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Nullable,
    Required,
}

/// One field of a destination table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: DestinationType,
    pub mode: FieldMode,
}

/// A source column together with its translation
///
/// The type is classified on construction, so an unsupported column fails
/// while the schema is being read, before anything is exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    source_type: String,
    nullable: bool,
    class: TypeClass,
}

impl Column {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>, nullable: bool) -> Result<Self> {
        let source_type = source_type.into();
        let class = TypeClass::classify(&source_type)?;
        Ok(Self {
            name: name.into(),
            source_type,
            nullable,
            class,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn type_class(&self) -> TypeClass {
        self.class
    }

    pub fn destination_type(&self) -> DestinationType {
        self.class.destination_type()
    }

    pub fn to_field(&self) -> FieldSchema {
        FieldSchema {
            name: self.name.clone(),
            field_type: self.destination_type(),
            mode: if self.nullable {
                FieldMode::Nullable
            } else {
                FieldMode::Required
            },
        }
    }

    /// SQL expression rendering this column in the tab-delimited export.
    ///
    /// Strings are wrapped in double quotes with embedded quotes doubled and
    /// CR/LF written as `\r`/`\n`, so a raw newline only ever ends a record.
    pub fn export_expression(&self) -> String {
        let col = quote_ident(&self.name);
        match self.class {
            TypeClass::Numeric | TypeClass::Integer | TypeClass::Float => col,
            TypeClass::Character => format!(
                r#"('"' || REPLACE(REPLACE(REPLACE({col}, '"', '""'), '\n', '\\n'), '\r', '\\r') || '"')"#
            ),
            TypeClass::Timestamp => {
                format!("(EXTRACT(epoch FROM {col}) + EXTRACT(milliseconds FROM {col})/1000.0)")
            },
            TypeClass::Date => format!("(TO_CHAR({col}, 'YYYY-MM-DD'))"),
            TypeClass::Boolean if self.nullable => {
                format!("(CASE WHEN {col} IS NULL THEN NULL WHEN {col} THEN 1 ELSE 0 END)")
            },
            TypeClass::Boolean => format!("(CASE WHEN {col} THEN 1 ELSE 0 END)"),
        }
    }
}
