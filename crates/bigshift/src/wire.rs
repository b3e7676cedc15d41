//! Helpers for vendor JSON payloads

/// Google APIs encode int64 fields as JSON strings; accept either form
pub(crate) mod opt_u64 {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(value)) => Ok(Some(value)),
            Some(Raw::Text(text)) => text.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}
