// ============================================================
// CSV ENCODER
// ============================================================
// Serialize tables as CSV text: header row, no index column

use arrow::util::display::FormatOptions;
use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::domain::error::{AppError, Result};
use crate::domain::table::{CellFormatter, Table};

/// Turns a table into CSV text. Same input, same bytes.
pub trait TableEncoder {
    fn encode(&self, table: &Table) -> Result<String>;
}

/// CSV encoder built on the `csv` crate
pub struct CsvEncoder {
    /// Delimiter character (default: comma)
    delimiter: u8,

    /// Text written for null and NaN values (default: empty)
    missing: String,
}

impl Default for CsvEncoder {
    fn default() -> Self {
        Self {
            delimiter: b',',
            missing: String::new(),
        }
    }
}

impl CsvEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the text written for missing values
    pub fn with_missing(mut self, missing: impl Into<String>) -> Self {
        self.missing = missing.into();
        self
    }
}

impl TableEncoder for CsvEncoder {
    fn encode(&self, table: &Table) -> Result<String> {
        if table.num_columns() == 0 {
            return Ok(String::new());
        }

        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(table.column_names())?;

        let options = FormatOptions::default();
        let cells = CellFormatter::try_new(table, &options)?;
        for row in 0..table.num_rows() {
            writer.write_record(cells.row(row, &self.missing)?)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Encode(format!("Failed to flush CSV output: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Encode(format!("CSV output is not UTF-8: {}", e)))
    }
}
