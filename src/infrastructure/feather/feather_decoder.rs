// ============================================================
// FEATHER DECODER
// ============================================================
// Arrow IPC file (Feather V2) and stream decoding

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::ipc::reader::{FileReader, StreamReader};
use arrow::ipc::{self, root_as_footer, root_as_message, MessageHeader};

use crate::domain::error::{AppError, Result};
use crate::domain::table::Table;

/// Leading and trailing magic of an Arrow IPC file.
const ARROW_FILE_MAGIC: &[u8] = b"ARROW1";

/// Magic plus padding before the first message of an IPC file.
const FILE_HEADER_LEN: usize = 8;

/// Footer length plus trailing magic.
const FILE_TRAILER_LEN: usize = 4 + ARROW_FILE_MAGIC.len();

/// Leading magic of the legacy Feather V1 layout.
const FEATHER_V1_MAGIC: &[u8] = b"FEA1";

/// Marks the start of each message in the Arrow IPC stream encoding.
const IPC_CONTINUATION: [u8; 4] = [0xFF; 4];

/// Default ceiling for decompressed buffer bytes and rows (2 GiB).
pub const DEFAULT_MAX_DECODED_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Turns an uploaded byte stream into a table, all or nothing.
pub trait TableDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Table>;
}

/// Feather V2 decoder.
///
/// Every length in the upload (footer blocks, message and body sizes,
/// buffer ranges, declared decompressed sizes, row counts) is checked
/// against the input and `max_decoded_bytes` before arrow reads it, and a
/// panic inside the reader is reported as a decode error.
#[derive(Debug, Clone, Copy)]
pub struct FeatherDecoder {
    max_decoded_bytes: usize,
}

impl Default for FeatherDecoder {
    fn default() -> Self {
        Self {
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
        }
    }
}

impl FeatherDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_decoded_bytes(mut self, max_decoded_bytes: usize) -> Self {
        self.max_decoded_bytes = max_decoded_bytes;
        self
    }

    fn read_file(bytes: &[u8]) -> Result<Table> {
        let reader = FileReader::try_new(Cursor::new(bytes), None).map_err(decode_error)?;
        let schema = reader.schema();
        let batches = reader
            .collect::<std::result::Result<Vec<_>, ArrowError>>()
            .map_err(decode_error)?;
        Self::assemble(schema, batches)
    }

    fn read_stream(bytes: &[u8]) -> Result<Table> {
        let reader = StreamReader::try_new(Cursor::new(bytes), None).map_err(decode_error)?;
        let schema = reader.schema();
        let batches = reader
            .collect::<std::result::Result<Vec<_>, ArrowError>>()
            .map_err(decode_error)?;
        Self::assemble(schema, batches)
    }

    fn assemble(schema: SchemaRef, mut batches: Vec<RecordBatch>) -> Result<Table> {
        let batch = match batches.len() {
            0 => return Table::empty(schema),
            1 => batches.remove(0),
            _ => concat_batches(&schema, &batches).map_err(decode_error)?,
        };
        Table::new(batch)
    }

    /// `ARROW1` + padding, messages, footer, footer length, `ARROW1`.
    fn check_file_layout(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < FILE_HEADER_LEN + FILE_TRAILER_LEN || !bytes.ends_with(ARROW_FILE_MAGIC) {
            return Err(malformed("file is truncated (missing trailing ARROW1 magic)"));
        }

        let footer_end = bytes.len() - FILE_TRAILER_LEN;
        let footer_len = read_i32(bytes, footer_end)?;
        let footer_len = usize::try_from(footer_len)
            .ok()
            .filter(|len| *len > 0 && *len <= footer_end - FILE_HEADER_LEN)
            .ok_or_else(|| malformed("footer length is out of range"))?;
        let messages_end = footer_end - footer_len;
        let footer = root_as_footer(&bytes[messages_end..footer_end])
            .map_err(|e| malformed(&format!("invalid footer: {}", e)))?;

        let mut blocks: Vec<&ipc::Block> = Vec::new();
        if let Some(dictionaries) = footer.dictionaries() {
            blocks.extend(dictionaries.iter());
        }
        if let Some(record_batches) = footer.recordBatches() {
            blocks.extend(record_batches.iter());
        }

        let mut budget = DecodeBudget::new(self.max_decoded_bytes);
        for block in blocks {
            let start = to_usize(block.offset(), "block offset")?;
            let meta_len = to_usize(i64::from(block.metaDataLength()), "block metadata length")?;
            let body_len = to_usize(block.bodyLength(), "block body length")?;
            let meta_end = start
                .checked_add(meta_len)
                .filter(|end| start >= FILE_HEADER_LEN && *end <= messages_end)
                .ok_or_else(|| malformed("block lies outside the file"))?;
            let body_end = meta_end
                .checked_add(body_len)
                .filter(|end| *end <= messages_end)
                .ok_or_else(|| malformed("block body lies outside the file"))?;

            let message = parse_block_message(&bytes[start..meta_end])?;
            let declared = to_usize(message.bodyLength(), "message body length")?;
            if declared > body_len {
                return Err(malformed("message body is larger than its block"));
            }
            budget.check_message(&message, &bytes[meta_end..body_end])?;
        }
        Ok(())
    }

    /// Walks `[continuation] length metadata body` frames up to the
    /// end-of-stream marker or the end of input.
    fn check_stream_layout(&self, bytes: &[u8]) -> Result<()> {
        let mut budget = DecodeBudget::new(self.max_decoded_bytes);
        let mut pos = 0;
        while pos < bytes.len() {
            let mut prefix = read_i32(bytes, pos)?;
            pos += 4;
            if prefix == -1 {
                prefix = read_i32(bytes, pos)?;
                pos += 4;
            }
            if prefix == 0 {
                break;
            }

            let meta_len = to_usize(i64::from(prefix), "message metadata length")?;
            let meta_end = pos
                .checked_add(meta_len)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| malformed("message metadata runs past the end of input"))?;
            let message = root_as_message(&bytes[pos..meta_end])
                .map_err(|e| malformed(&format!("invalid message header: {}", e)))?;
            let body_len = to_usize(message.bodyLength(), "message body length")?;
            let body_end = meta_end
                .checked_add(body_len)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| malformed("message body runs past the end of input"))?;

            budget.check_message(&message, &bytes[meta_end..body_end])?;
            pos = body_end;
        }
        Ok(())
    }
}

impl TableDecoder for FeatherDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Table> {
        if bytes.is_empty() {
            return Err(AppError::Decode("file is empty".to_string()));
        }
        if bytes.starts_with(FEATHER_V1_MAGIC) {
            return Err(AppError::Decode(
                "Feather V1 files are not supported; re-save the file as Feather V2".to_string(),
            ));
        }
        if bytes.starts_with(ARROW_FILE_MAGIC) {
            self.check_file_layout(bytes)?;
            return guarded(|| Self::read_file(bytes));
        }
        if looks_like_ipc_stream(bytes) {
            self.check_stream_layout(bytes)?;
            return guarded(|| Self::read_stream(bytes));
        }
        Err(AppError::Decode(
            "not a Feather file (missing ARROW1 magic bytes)".to_string(),
        ))
    }
}

/// Remaining allowance for one upload.
struct DecodeBudget {
    limit: usize,
    bytes: usize,
    rows: usize,
}

impl DecodeBudget {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            bytes: limit,
            rows: limit,
        }
    }

    fn check_message(&mut self, message: &ipc::Message<'_>, body: &[u8]) -> Result<()> {
        let batch = match message.header_type() {
            MessageHeader::Schema => return Ok(()),
            MessageHeader::RecordBatch => message.header_as_record_batch(),
            MessageHeader::DictionaryBatch => message
                .header_as_dictionary_batch()
                .and_then(|dictionary| dictionary.data()),
            other => return Err(malformed(&format!("unexpected {:?} message", other))),
        };
        let batch = batch.ok_or_else(|| malformed("message has no batch header"))?;
        self.check_batch(&batch, body)
    }

    fn check_batch(&mut self, batch: &ipc::RecordBatch<'_>, body: &[u8]) -> Result<()> {
        self.charge_rows(batch.length())?;
        if let Some(nodes) = batch.nodes() {
            for node in nodes.iter() {
                let length = to_usize(node.length(), "column length")?;
                if length > self.limit {
                    return Err(malformed("column length exceeds the decode limit"));
                }
            }
        }

        let compressed = batch.compression().is_some();
        let Some(buffers) = batch.buffers() else {
            return Ok(());
        };
        for buffer in buffers.iter() {
            let offset = to_usize(buffer.offset(), "buffer offset")?;
            let length = to_usize(buffer.length(), "buffer length")?;
            offset
                .checked_add(length)
                .filter(|end| *end <= body.len())
                .ok_or_else(|| malformed("buffer lies outside its message body"))?;

            // Compressed buffers start with their decompressed length; -1 means stored raw.
            if compressed && length >= 8 {
                let declared = i64::from_le_bytes(read_array(body, offset)?);
                if declared > 0 {
                    self.charge_bytes(declared)?;
                }
            }
        }
        Ok(())
    }

    fn charge_rows(&mut self, rows: i64) -> Result<()> {
        let rows = to_usize(rows, "row count")?;
        self.rows = self
            .rows
            .checked_sub(rows)
            .ok_or_else(|| malformed("row count exceeds the decode limit"))?;
        Ok(())
    }

    fn charge_bytes(&mut self, bytes: i64) -> Result<()> {
        let bytes = to_usize(bytes, "decompressed length")?;
        self.bytes = self
            .bytes
            .checked_sub(bytes)
            .ok_or_else(|| malformed("decompressed size exceeds the decode limit"))?;
        Ok(())
    }
}

/// File blocks carry their own length prefix, with or without continuation.
fn parse_block_message(meta: &[u8]) -> Result<ipc::Message<'_>> {
    let prefix = if meta.starts_with(&IPC_CONTINUATION) { 8 } else { 4 };
    let flatbuffer = meta
        .get(prefix..)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| malformed("block metadata is too short"))?;
    root_as_message(flatbuffer).map_err(|e| malformed(&format!("invalid message header: {}", e)))
}

/// Runs an arrow read, reporting a panic as a decode error.
fn guarded(read: impl FnOnce() -> Result<Table>) -> Result<Table> {
    panic::catch_unwind(AssertUnwindSafe(read)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "reader aborted".to_string());
        Err(malformed(&reason))
    })
}

/// A stream starts with a continuation marker followed by a positive
/// metadata length that fits in the remaining bytes.
fn looks_like_ipc_stream(bytes: &[u8]) -> bool {
    if bytes.len() < 8 || bytes[..4] != IPC_CONTINUATION {
        return false;
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&bytes[4..8]);
    let meta_len = i32::from_le_bytes(len);
    meta_len > 0 && (meta_len as usize) <= bytes.len() - 8
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N]> {
    bytes
        .get(at..at.saturating_add(N))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| malformed("unexpected end of input"))
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32> {
    read_array(bytes, at).map(i32::from_le_bytes)
}

fn to_usize(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| malformed(&format!("negative {}", what)))
}

fn malformed(detail: &str) -> AppError {
    AppError::Decode(format!("malformed Arrow data: {}", detail))
}

fn decode_error(err: ArrowError) -> AppError {
    AppError::Decode(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::writer::{FileWriter, IpcWriteOptions, StreamWriter};
    use arrow::ipc::CompressionType;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    fn batch(ids: Vec<i32>, names: Vec<Option<&str>>) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int32Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    fn file_bytes(batches: &[RecordBatch]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = FileWriter::try_new(&mut buf, &schema()).unwrap();
            for b in batches {
                writer.write(b).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_decode_file_concatenates_batches() {
        let bytes = file_bytes(&[
            batch(vec![1, 2], vec![Some("a"), None]),
            batch(vec![3], vec![Some("c")]),
        ]);
        let table = FeatherDecoder::new().decode(&bytes).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_decode_file_without_batches_keeps_schema() {
        let bytes = file_bytes(&[]);
        let table = FeatherDecoder::new().decode(&bytes).unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 2);
    }

    fn stream_bytes(batches: &[RecordBatch]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buf, &schema()).unwrap();
            for b in batches {
                writer.write(b).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    fn compressed_file_bytes(batches: &[RecordBatch]) -> Vec<u8> {
        let options = IpcWriteOptions::default()
            .try_with_compression(Some(CompressionType::LZ4_FRAME))
            .unwrap();
        let mut buf = Vec::new();
        {
            let mut writer = FileWriter::try_new_with_options(&mut buf, &schema(), options).unwrap();
            for b in batches {
                writer.write(b).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    fn sample_batches() -> Vec<RecordBatch> {
        vec![
            batch(vec![1, 2, 3], vec![Some("alpha"), None, Some("gamma")]),
            batch(vec![4], vec![Some("delta")]),
        ]
    }

    /// Every single-byte corruption must end in a table or a decode error.
    fn assert_mutations_are_contained(bytes: &[u8]) {
        let decoder = FeatherDecoder::new().with_max_decoded_bytes(1 << 20);
        for pos in 0..bytes.len() {
            for value in [0x00, 0x01, 0x7F, 0x80, 0xFF, bytes[pos] ^ 0x10] {
                let mut mutated = bytes.to_vec();
                mutated[pos] = value;
                match decoder.decode(&mutated) {
                    Ok(_) => {}
                    Err(AppError::Decode(_)) => {}
                    Err(other) => panic!("byte {} = {:#04x}: unexpected {:?}", pos, value, other),
                }
            }
        }
    }

    #[test]
    fn test_decode_stream() {
        let bytes = stream_bytes(&[batch(vec![7], vec![Some("x")])]);
        let table = FeatherDecoder::new().decode(&bytes).unwrap();
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn test_truncated_file_is_decode_error() {
        let bytes = file_bytes(&[batch(vec![1], vec![Some("a")])]);
        let truncated = &bytes[..bytes.len() / 2];
        let err = FeatherDecoder::new().decode(truncated).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = FeatherDecoder::new()
            .decode(b"this is definitely not arrow data")
            .unwrap_err();
        assert!(matches!(err, AppError::Decode(ref msg) if msg.contains("ARROW1")));
    }

    #[test]
    fn test_feather_v1_rejected() {
        let err = FeatherDecoder::new().decode(b"FEA1\0\0\0\0").unwrap_err();
        assert!(matches!(err, AppError::Decode(ref msg) if msg.contains("V1")));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(FeatherDecoder::new().decode(&[]).is_err());
    }

    #[test]
    fn test_stream_sniffing_rejects_negative_length() {
        let mut bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        bytes.extend_from_slice(&(-5i32).to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(!looks_like_ipc_stream(&bytes));
    }

    #[test]
    fn test_corrupted_file_bytes_never_crash() {
        assert_mutations_are_contained(&file_bytes(&sample_batches()));
    }

    #[test]
    fn test_corrupted_stream_bytes_never_crash() {
        assert_mutations_are_contained(&stream_bytes(&sample_batches()));
    }

    #[test]
    fn test_corrupted_compressed_file_never_crashes() {
        assert_mutations_are_contained(&compressed_file_bytes(&sample_batches()));
    }

    #[test]
    fn test_compressed_file_decodes() {
        let bytes = compressed_file_bytes(&sample_batches());
        let table = FeatherDecoder::new().decode(&bytes).unwrap();
        assert_eq!(table.num_rows(), 4);
    }

    #[test]
    fn test_decompressed_size_is_bounded() {
        let bytes = compressed_file_bytes(&sample_batches());
        let err = FeatherDecoder::new()
            .with_max_decoded_bytes(8)
            .decode(&bytes)
            .unwrap_err();
        assert!(matches!(err, AppError::Decode(ref msg) if msg.contains("decode limit")));
    }

    #[test]
    fn test_truncated_stream_is_decode_error() {
        let bytes = stream_bytes(&sample_batches());
        let err = FeatherDecoder::new().decode(&bytes[..bytes.len() - 40]).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_reader_panic_becomes_decode_error() {
        let err = guarded(|| panic!("index out of bounds")).unwrap_err();
        assert!(matches!(err, AppError::Decode(ref msg) if msg.contains("index out of bounds")));
    }
}
