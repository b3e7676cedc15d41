//! Redshift to BigQuery type translation
//!
//! Rules are tried in order, most specific first. Matching is on the type
//! string exactly as the catalog reports it (`character varying(256)`,
//! `timestamp without time zone`, `bigint`, ...).

use bigshift_common::{BigShiftError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a source column type.
///
/// Determines both the destination type and how the value is rendered in the
/// exported text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Character,
    Numeric,
    Date,
    Timestamp,
    Integer,
    Boolean,
    Float,
}

/// Destination column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DestinationType {
    String,
    Timestamp,
    Integer,
    Boolean,
    Float,
}

impl DestinationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationType::String => "STRING",
            DestinationType::Timestamp => "TIMESTAMP",
            DestinationType::Integer => "INTEGER",
            DestinationType::Boolean => "BOOLEAN",
            DestinationType::Float => "FLOAT",
        }
    }
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TypeClass {
    /// Classify a raw source type string.
    ///
    /// Numeric values travel as strings so no precision is lost; dates are
    /// exported as ISO text and land as strings as well.
    pub fn classify(source_type: &str) -> Result<Self> {
        let class = if source_type.starts_with("character") {
            TypeClass::Character
        } else if source_type.starts_with("numeric") {
            TypeClass::Numeric
        } else if source_type == "date" {
            TypeClass::Date
        } else if source_type.starts_with("timestamp") {
            TypeClass::Timestamp
        } else if source_type.contains("int") {
            TypeClass::Integer
        } else if source_type == "boolean" {
            TypeClass::Boolean
        } else if source_type.starts_with("double") || source_type == "real" {
            TypeClass::Float
        } else {
            return Err(BigShiftError::UnsupportedColumnType(source_type.to_string()));
        };
        Ok(class)
    }

    pub fn destination_type(self) -> DestinationType {
        match self {
            TypeClass::Character | TypeClass::Numeric | TypeClass::Date => DestinationType::String,
            TypeClass::Timestamp => DestinationType::Timestamp,
            TypeClass::Integer => DestinationType::Integer,
            TypeClass::Boolean => DestinationType::Boolean,
            TypeClass::Float => DestinationType::Float,
        }
    }
}

/// Resolve the destination type for a raw source type string
pub fn destination_type(source_type: &str) -> Result<DestinationType> {
    TypeClass::classify(source_type).map(TypeClass::destination_type)
}
