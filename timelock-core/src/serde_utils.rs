use crate::errors::{CoreError, Result};

/// Deserializes a JSON string into the provided type with shared error semantics.
pub fn from_json_str<T: serde::de::DeserializeOwned>(input: &str) -> Result<T> {
    serde_json::from_str(input).map_err(|err| CoreError::Deserialization(err.to_string()))
}

/// Reads and deserializes a JSON document from disk.
pub fn from_json_file<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    from_json_str(&contents)
}
