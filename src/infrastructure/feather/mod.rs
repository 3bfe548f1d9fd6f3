// ============================================================
// FEATHER INFRASTRUCTURE LAYER
// ============================================================
// Decoding of Feather (Arrow IPC) uploads into tables

mod feather_decoder;

pub use feather_decoder::{FeatherDecoder, TableDecoder};
