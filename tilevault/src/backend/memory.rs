//! In-memory backend.

use bytes::Bytes;

use super::{check_bounds, BoxFuture, RangeError, RangeReader};

/// Serves range reads from a byte buffer held in memory.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    data: Bytes,
    label: String,
}

impl MemoryReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            label: "memory".to_string(),
        }
    }

    /// Sets the name reported by [`RangeReader::describe`].
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl RangeReader for MemoryReader {
    fn total_length(&self) -> BoxFuture<'_, Result<u64, RangeError>> {
        let len = self.data.len() as u64;
        Box::pin(async move { Ok(len) })
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Bytes, RangeError>> {
        Box::pin(async move {
            check_bounds(offset, length, self.data.len() as u64)?;
            let start = offset as usize;
            Ok(self.data.slice(start..start + length as usize))
        })
    }

    fn describe(&self) -> String {
        format!("{} ({} bytes)", self.label, self.data.len())
    }
}
