// ============================================================
// TABLE
// ============================================================
// In-memory columnar table decoded from an uploaded Feather file

use std::collections::HashSet;

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Float16Type, Float32Type, Float64Type, SchemaRef};
use arrow::util::display::{ArrayFormatter, FormatOptions};

use crate::domain::error::{AppError, Result};

/// Ordered, row-aligned set of named columns.
///
/// Column lengths are equal by construction (`RecordBatch` enforces it) and
/// column names are unique (checked in [`Table::new`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    pub fn new(batch: RecordBatch) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in batch.schema().fields() {
            if !seen.insert(field.name().clone()) {
                return Err(AppError::Decode(format!(
                    "duplicate column name '{}'",
                    field.name()
                )));
            }
        }
        Ok(Self { batch })
    }

    pub fn empty(schema: SchemaRef) -> Result<Self> {
        Self::new(RecordBatch::new_empty(schema))
    }

    /// Number of rows; a table without columns has no rows.
    pub fn num_rows(&self) -> usize {
        if self.batch.num_columns() == 0 {
            0
        } else {
            self.batch.num_rows()
        }
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }

    /// Leading `n` rows (all rows when `n` exceeds the row count). Zero-copy.
    pub fn head(&self, n: usize) -> Table {
        let len = n.min(self.num_rows());
        if len == self.batch.num_rows() {
            return self.clone();
        }
        Table {
            batch: self.batch.slice(0, len),
        }
    }
}

/// Number of missing values in a column: nulls plus NaN in float columns.
pub fn missing_count(array: &dyn Array) -> usize {
    let nulls = array
        .logical_nulls()
        .map(|nulls| nulls.null_count())
        .unwrap_or(0);
    nulls + nan_count(array)
}

fn nan_count(array: &dyn Array) -> usize {
    match array.data_type() {
        DataType::Float16 => array
            .as_primitive::<Float16Type>()
            .iter()
            .flatten()
            .filter(|v| v.is_nan())
            .count(),
        DataType::Float32 => array
            .as_primitive::<Float32Type>()
            .iter()
            .flatten()
            .filter(|v| v.is_nan())
            .count(),
        DataType::Float64 => array
            .as_primitive::<Float64Type>()
            .iter()
            .flatten()
            .filter(|v| v.is_nan())
            .count(),
        _ => 0,
    }
}

fn is_nan_at(array: &dyn Array, row: usize) -> bool {
    match array.data_type() {
        DataType::Float16 => array.as_primitive::<Float16Type>().value(row).is_nan(),
        DataType::Float32 => array.as_primitive::<Float32Type>().value(row).is_nan(),
        DataType::Float64 => array.as_primitive::<Float64Type>().value(row).is_nan(),
        _ => false,
    }
}

struct ColumnCells<'a> {
    array: &'a dyn Array,
    nulls: Option<NullBuffer>,
    formatter: ArrayFormatter<'a>,
}

/// Stringifies table cells; missing values come back as `None`.
pub struct CellFormatter<'a> {
    columns: Vec<ColumnCells<'a>>,
}

impl<'a> CellFormatter<'a> {
    pub fn try_new(table: &'a Table, options: &'a FormatOptions<'a>) -> Result<Self> {
        let mut columns = Vec::with_capacity(table.num_columns());
        for (array, field) in table.columns().iter().zip(table.schema().fields().iter()) {
            let formatter = ArrayFormatter::try_new(array.as_ref(), options).map_err(|e| {
                AppError::Encode(format!(
                    "column '{}' of type {} cannot be rendered as text: {}",
                    field.name(),
                    field.data_type(),
                    e
                ))
            })?;
            columns.push(ColumnCells {
                array: array.as_ref(),
                nulls: array.logical_nulls(),
                formatter,
            });
        }
        Ok(Self { columns })
    }

    pub fn cell(&self, column: usize, row: usize) -> Result<Option<String>> {
        let cells = self.columns.get(column).ok_or_else(|| {
            AppError::Internal(format!("column index {} out of range", column))
        })?;
        let is_null = cells
            .nulls
            .as_ref()
            .map(|nulls| nulls.is_null(row))
            .unwrap_or(false);
        if is_null || is_nan_at(cells.array, row) {
            return Ok(None);
        }
        cells
            .formatter
            .value(row)
            .try_to_string()
            .map(Some)
            .map_err(|e| AppError::Encode(format!("row {}: {}", row, e)))
    }

    /// One row as strings, missing values rendered as `missing`.
    pub fn row(&self, row: usize, missing: &str) -> Result<Vec<String>> {
        (0..self.columns.len())
            .map(|column| {
                self.cell(column, row)
                    .map(|value| value.unwrap_or_else(|| missing.to_string()))
            })
            .collect()
    }
}
