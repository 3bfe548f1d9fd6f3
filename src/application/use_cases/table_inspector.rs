use arrow::array::{Array, ArrayData};

use crate::domain::summary::{ColumnSummary, TableSummary};
use crate::domain::table::{missing_count, Table};

/// Row/column counts, memory footprint and per-column missing values.
///
/// Total over any table: zero rows or zero columns give zeroed statistics.
pub fn summarize(table: &Table) -> TableSummary {
    let row_count = table.num_rows();
    let schema = table.schema();

    let columns = table
        .columns()
        .iter()
        .zip(schema.fields().iter())
        .map(|(array, field)| {
            let null_count = missing_count(array.as_ref()).min(row_count);
            ColumnSummary {
                name: field.name().clone(),
                data_type: field.data_type().to_string(),
                non_null_count: row_count - null_count,
                null_count,
            }
        })
        .collect();

    let memory_bytes = table
        .columns()
        .iter()
        .map(|array| data_size(&array.to_data()))
        .sum();

    TableSummary {
        row_count,
        column_count: table.num_columns(),
        memory_bytes,
        columns,
    }
}

/// Bytes held by an array's own buffers, children included.
///
/// Counts buffer lengths rather than allocations: decoded IPC columns are
/// slices of one shared message body, whose capacity would otherwise be
/// charged to every column.
fn data_size(data: &ArrayData) -> usize {
    let buffers: usize = data.buffers().iter().map(|buffer| buffer.len()).sum();
    let nulls = data.nulls().map(|nulls| nulls.buffer().len()).unwrap_or(0);
    let children: usize = data.child_data().iter().map(data_size).sum();
    buffers + nulls + children
}
