// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// CSV encoding of decoded tables

mod csv_encoder;

pub use csv_encoder::{CsvEncoder, TableEncoder};
