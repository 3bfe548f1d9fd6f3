use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Read-only projection over one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSummary {
    pub name: String,
    /// Declared type as a display string, e.g. `Int64` or `Utf8`.
    pub data_type: String,
    pub non_null_count: usize,
    pub null_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub row_count: usize,
    pub column_count: usize,
    /// Best-effort in-memory footprint, including variable-length buffers.
    pub memory_bytes: usize,
    pub columns: Vec<ColumnSummary>,
}

impl TableSummary {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / BYTES_PER_MB
    }

    pub fn memory_display(&self) -> String {
        format!("{:.2} MB", self.memory_mb())
    }
}
