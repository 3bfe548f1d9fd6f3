use serde::Serialize;

pub const CSV_EXTENSION: &str = "csv";
pub const CSV_MIME: &str = "text/csv";

/// CSV rendering of a full table, ready for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    #[serde(skip)]
    pub csv: String,
    pub file_name: String,
    pub byte_len: usize,
}

impl ConversionResult {
    pub fn new(csv: String, source_name: &str) -> Self {
        let byte_len = csv.len();
        Self {
            csv,
            file_name: derive_csv_name(source_name),
            byte_len,
        }
    }

    pub fn char_count(&self) -> usize {
        self.csv.chars().count()
    }
}

/// Replace the final extension of `name` with `.csv`, or append it when
/// there is none.
pub fn derive_csv_name(name: &str) -> String {
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    format!("{}.{}", stem, CSV_EXTENSION)
}
