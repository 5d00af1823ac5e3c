//! Archive metadata document.
//!
//! The metadata block is an arbitrary JSON document. Only the fields TileJSON
//! assembly needs get typed accessors; everything else is passed through.

use serde_json::{Map, Value};

use super::error::{ArchiveError, ArchiveResult};

/// Decoded metadata block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    document: Value,
}

impl Metadata {
    /// Decodes an uncompressed metadata block. An empty block yields an empty object.
    pub fn decode(bytes: &[u8]) -> ArchiveResult<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self {
                document: Value::Object(Map::new()),
            });
        }
        let document = serde_json::from_slice(bytes)
            .map_err(|e| ArchiveError::MalformedMetadata(e.to_string()))?;
        Ok(Self { document })
    }

    pub fn from_value(document: Value) -> Self {
        Self { document }
    }

    /// The raw document.
    pub fn as_value(&self) -> &Value {
        &self.document
    }

    /// Looks up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.as_object().and_then(|m| m.get(key))
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn description(&self) -> Option<&str> {
        self.get_str("description")
    }

    pub fn version(&self) -> Option<&str> {
        self.get_str("version")
    }

    pub fn attribution(&self) -> Option<&str> {
        self.get_str("attribution")
    }

    pub fn format(&self) -> Option<&str> {
        self.get_str("format")
    }

    /// The `vector_layers` array, if present.
    pub fn vector_layers(&self) -> Option<&Vec<Value>> {
        self.get("vector_layers").and_then(Value::as_array)
    }

    /// Bounds as `[west, south, east, north]`.
    ///
    /// Accepts both a JSON array and the comma-separated string form some
    /// producers write.
    pub fn bounds(&self) -> Option<[f64; 4]> {
        self.get("bounds").and_then(numbers::<4>)
    }

    /// Center as `[lon, lat, zoom]`.
    pub fn center(&self) -> Option<[f64; 3]> {
        self.get("center").and_then(numbers::<3>)
    }
}

fn numbers<const N: usize>(value: &Value) -> Option<[f64; N]> {
    let parsed: Vec<f64> = match value {
        Value::Array(items) => items.iter().map(Value::as_f64).collect::<Option<_>>()?,
        Value::String(s) => s
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?,
        _ => return None,
    };
    parsed.try_into().ok()
}
