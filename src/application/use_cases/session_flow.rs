use std::sync::Arc;

use arrow::util::display::FormatOptions;
use tracing::{debug, info, warn};

use crate::application::use_cases::preview_selector::{clamp_preview_rows, preview};
use crate::application::use_cases::table_inspector::summarize;
use crate::domain::conversion::{ConversionResult, CSV_MIME};
use crate::domain::error::{AppError, Result};
use crate::domain::session::{
    DownloadView, PreviewView, ReadySession, SessionEvent, SessionState, SessionView,
};
use crate::domain::summary::TableSummary;
use crate::domain::table::{CellFormatter, Table};
use crate::domain::upload::UploadedFile;
use crate::infrastructure::csv::TableEncoder;
use crate::infrastructure::feather::TableDecoder;

pub const DECODE_ERROR_PREFIX: &str = "Error reading feather file";
pub const DECODE_ERROR_HINT: &str = "Please make sure the uploaded file is a valid feather file.";
pub const ENCODE_ERROR_PREFIX: &str = "Error converting to CSV";
pub const ENCODE_ERROR_HINT: &str =
    "The file was read but one of its columns could not be written as CSV.";

/// Preview bounds owned by the flow controller.
#[derive(Debug, Clone, Copy)]
pub struct PreviewLimits {
    pub default_rows: usize,
    pub max_rows: usize,
}

impl Default for PreviewLimits {
    fn default() -> Self {
        Self {
            default_rows: 10,
            max_rows: 50,
        }
    }
}

/// Explicit state machine over one upload lifecycle:
/// `Idle -> Loaded -> Ready | Error`, driven by [`SessionEvent`]s.
pub struct SessionFlow {
    decoder: Arc<dyn TableDecoder + Send + Sync>,
    encoder: Arc<dyn TableEncoder + Send + Sync>,
    limits: PreviewLimits,
    state: SessionState,
}

impl SessionFlow {
    pub fn new(
        decoder: Arc<dyn TableDecoder + Send + Sync>,
        encoder: Arc<dyn TableEncoder + Send + Sync>,
        limits: PreviewLimits,
    ) -> Self {
        Self {
            decoder,
            encoder,
            limits,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn handle(&mut self, event: SessionEvent) -> Result<&SessionState> {
        debug!(event = event.name(), state = self.state.name(), "Session event");
        match event {
            SessionEvent::FileSelected(upload) => {
                // Whatever was held before is dropped here, in full.
                self.state = SessionState::Loaded { upload };
                self.advance();
            }
            SessionEvent::FileCleared => {
                self.state = SessionState::Idle;
            }
            SessionEvent::PreviewSizeChanged(requested) => {
                let current = self.state.name();
                let SessionState::Ready(ready) = &mut self.state else {
                    return Err(AppError::InvalidState(format!(
                        "no table loaded (session is {})",
                        current
                    )));
                };
                ready.preview_rows =
                    clamp_preview_rows(requested, ready.summary.row_count, self.limits.max_rows);
            }
        }
        Ok(&self.state)
    }

    /// Runs the `Loaded` step: decode, then summarize and convert.
    fn advance(&mut self) {
        let SessionState::Loaded { upload } = &self.state else {
            return;
        };

        let next = match self.decoder.decode(&upload.bytes) {
            Ok(table) => self.enter_ready(upload, table),
            Err(err) => {
                warn!(file_name = %upload.name, error = %err, "Failed to decode upload");
                SessionState::Error {
                    file_name: upload.name.clone(),
                    message: format!("{}: {}", DECODE_ERROR_PREFIX, err.detail()),
                    hint: DECODE_ERROR_HINT.to_string(),
                }
            }
        };
        self.state = next;
    }

    fn enter_ready(&self, upload: &UploadedFile, table: Table) -> SessionState {
        let summary = summarize(&table);
        let csv = match self.encoder.encode(&table) {
            Ok(csv) => csv,
            Err(err) => {
                warn!(file_name = %upload.name, error = %err, "Failed to encode CSV");
                return SessionState::Error {
                    file_name: upload.name.clone(),
                    message: format!("{}: {}", ENCODE_ERROR_PREFIX, err.detail()),
                    hint: ENCODE_ERROR_HINT.to_string(),
                };
            }
        };
        let conversion = ConversionResult::new(csv, &upload.name);
        let preview_rows = clamp_preview_rows(
            self.limits.default_rows,
            summary.row_count,
            self.limits.max_rows,
        );

        info!(
            file_name = %upload.name,
            rows = summary.row_count,
            columns = summary.column_count,
            bytes = upload.size(),
            csv_bytes = conversion.byte_len,
            "Feather file converted"
        );

        SessionState::Ready(Box::new(ReadySession {
            file_name: upload.name.clone(),
            fingerprint: upload.fingerprint(),
            table,
            summary,
            preview_rows,
            conversion,
        }))
    }

    pub fn summary(&self) -> Option<&TableSummary> {
        match &self.state {
            SessionState::Ready(ready) => Some(&ready.summary),
            _ => None,
        }
    }

    /// The table cut to the currently selected preview size.
    pub fn preview_table(&self) -> Option<Table> {
        match &self.state {
            SessionState::Ready(ready) => Some(preview(&ready.table, ready.preview_rows)),
            _ => None,
        }
    }

    pub fn conversion(&self) -> Option<&ConversionResult> {
        match &self.state {
            SessionState::Ready(ready) => Some(&ready.conversion),
            _ => None,
        }
    }

    pub fn view(&self) -> Result<SessionView> {
        let view = match &self.state {
            SessionState::Idle => SessionView::Idle,
            SessionState::Loaded { upload } => SessionView::Loaded {
                file_name: upload.name.clone(),
            },
            SessionState::Ready(ready) => SessionView::Ready {
                file_name: ready.file_name.clone(),
                fingerprint: ready.fingerprint.clone(),
                summary: ready.summary.clone(),
                preview: self.preview_view(ready)?,
                download: DownloadView {
                    file_name: ready.conversion.file_name.clone(),
                    mime: CSV_MIME.to_string(),
                    byte_len: ready.conversion.byte_len,
                    char_count: ready.conversion.char_count(),
                },
            },
            SessionState::Error {
                file_name,
                message,
                hint,
            } => SessionView::Error {
                file_name: file_name.clone(),
                message: message.clone(),
                hint: hint.clone(),
            },
        };
        Ok(view)
    }

    fn preview_view(&self, ready: &ReadySession) -> Result<PreviewView> {
        let head = preview(&ready.table, ready.preview_rows);
        let options = FormatOptions::default();
        let cells = CellFormatter::try_new(&head, &options)?;
        let data = (0..head.num_rows())
            .map(|row| {
                (0..head.num_columns())
                    .map(|column| cells.cell(column, row))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PreviewView {
            rows: ready.preview_rows,
            min_rows: ready.summary.row_count.min(1),
            max_rows: ready.summary.row_count.min(self.limits.max_rows),
            columns: head.column_names(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infrastructure::csv::CsvEncoder;
    use crate::infrastructure::feather::FeatherDecoder;
    use arrow::array::{Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::writer::FileWriter;

    fn feather_bytes(batch: &RecordBatch) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = FileWriter::try_new(&mut buf, &batch.schema()).unwrap();
            writer.write(batch).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    fn people(rows: i64) -> Vec<u8> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let ids: Vec<i64> = (0..rows).collect();
        let names: Vec<Option<String>> = ids
            .iter()
            .map(|i| if i % 3 == 0 { None } else { Some(format!("person {}", i)) })
            .collect();
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap();
        feather_bytes(&batch)
    }

    fn flow() -> SessionFlow {
        SessionFlow::new(
            Arc::new(FeatherDecoder::new()),
            Arc::new(CsvEncoder::new()),
            PreviewLimits::default(),
        )
    }

    struct FailingEncoder;

    impl TableEncoder for FailingEncoder {
        fn encode(&self, _table: &Table) -> Result<String> {
            Err(AppError::Encode("unsupported column".to_string()))
        }
    }

    #[test]
    fn test_starts_idle() {
        let flow = flow();
        assert!(matches!(flow.state(), SessionState::Idle));
        assert_eq!(flow.view().unwrap(), SessionView::Idle);
    }

    #[test]
    fn test_valid_upload_reaches_ready() {
        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "people.feather",
            people(100),
        )))
        .unwrap();

        assert!(matches!(flow.state(), SessionState::Ready(_)));
        let summary = flow.summary().unwrap();
        assert_eq!(summary.row_count, 100);
        assert_eq!(summary.column_count, 2);
        assert_eq!(flow.preview_table().unwrap().num_rows(), 10);

        let conversion = flow.conversion().unwrap();
        assert_eq!(conversion.file_name, "people.csv");
        assert!(conversion.csv.starts_with("id,name\n0,\n1,person 1\n"));
        assert_eq!(conversion.csv.lines().count(), 101);
    }

    #[test]
    fn test_conversion_covers_full_table_not_preview() {
        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "p.feather",
            people(80),
        )))
        .unwrap();
        flow.handle(SessionEvent::PreviewSizeChanged(5)).unwrap();
        assert_eq!(flow.preview_table().unwrap().num_rows(), 5);
        assert_eq!(flow.conversion().unwrap().csv.lines().count(), 81);
    }

    #[test]
    fn test_preview_size_is_clamped() {
        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "p.feather",
            people(30),
        )))
        .unwrap();

        flow.handle(SessionEvent::PreviewSizeChanged(1000)).unwrap();
        assert_eq!(flow.preview_table().unwrap().num_rows(), 30);

        flow.handle(SessionEvent::PreviewSizeChanged(0)).unwrap();
        assert_eq!(flow.preview_table().unwrap().num_rows(), 1);
    }

    #[test]
    fn test_preview_bound_is_fifty() {
        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "p.feather",
            people(500),
        )))
        .unwrap();
        flow.handle(SessionEvent::PreviewSizeChanged(400)).unwrap();
        assert_eq!(flow.preview_table().unwrap().num_rows(), 50);

        let SessionView::Ready { preview, .. } = flow.view().unwrap() else {
            panic!("expected ready view");
        };
        assert_eq!(preview.max_rows, 50);
        assert_eq!(preview.min_rows, 1);
        assert_eq!(preview.data.len(), 50);
        assert_eq!(preview.data[0], vec![Some("0".to_string()), None]);
    }

    #[test]
    fn test_preview_change_without_table_is_rejected() {
        let mut flow = flow();
        let err = flow.handle(SessionEvent::PreviewSizeChanged(5)).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(matches!(flow.state(), SessionState::Idle));
    }

    #[test]
    fn test_invalid_bytes_enter_error_state() {
        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "broken.feather",
            vec![0x13, 0x37, 0x00, 0xAB, 0x42, 0x99, 0x10, 0x01, 0xFE],
        )))
        .unwrap();

        match flow.state() {
            SessionState::Error { message, hint, .. } => {
                assert!(message.starts_with(DECODE_ERROR_PREFIX));
                assert!(message.len() > DECODE_ERROR_PREFIX.len());
                assert_eq!(hint, DECODE_ERROR_HINT);
            }
            other => panic!("expected error state, got {}", other.name()),
        }
        assert!(flow.summary().is_none());
        assert!(flow.conversion().is_none());
    }

    #[test]
    fn test_new_upload_replaces_previous_state() {
        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "first.feather",
            people(40),
        )))
        .unwrap();
        flow.handle(SessionEvent::PreviewSizeChanged(25)).unwrap();

        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "bad.feather",
            b"nope".to_vec(),
        )))
        .unwrap();
        assert!(matches!(flow.state(), SessionState::Error { .. }));

        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "second.feather",
            people(12),
        )))
        .unwrap();
        assert_eq!(flow.summary().unwrap().row_count, 12);
        assert_eq!(flow.preview_table().unwrap().num_rows(), 10);
        assert_eq!(flow.conversion().unwrap().file_name, "second.csv");
    }

    #[test]
    fn test_clear_returns_to_idle() {
        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "p.feather",
            people(3),
        )))
        .unwrap();
        flow.handle(SessionEvent::FileCleared).unwrap();
        assert!(matches!(flow.state(), SessionState::Idle));
        assert!(flow.conversion().is_none());
    }

    #[test]
    fn test_empty_table_scenario() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let bytes = feather_bytes(&RecordBatch::new_empty(schema));

        let mut flow = flow();
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "empty.feather",
            bytes,
        )))
        .unwrap();

        let summary = flow.summary().unwrap();
        assert_eq!(summary.row_count, 0);
        assert_eq!(summary.column_count, 2);
        assert_eq!(summary.memory_display(), "0.00 MB");

        flow.handle(SessionEvent::PreviewSizeChanged(7)).unwrap();
        let head = flow.preview_table().unwrap();
        assert_eq!(head.num_rows(), 0);
        assert_eq!(head.column_names(), vec!["a", "b"]);

        assert_eq!(flow.conversion().unwrap().csv, "a,b\n");
    }

    #[test]
    fn test_same_bytes_give_same_summary() {
        let bytes = people(64);
        let mut first = flow();
        let mut second = flow();
        first
            .handle(SessionEvent::FileSelected(UploadedFile::new("a.feather", bytes.clone())))
            .unwrap();
        second
            .handle(SessionEvent::FileSelected(UploadedFile::new("a.feather", bytes)))
            .unwrap();
        assert_eq!(first.summary(), second.summary());
        assert_eq!(first.view().unwrap(), second.view().unwrap());
    }

    #[test]
    fn test_encoder_failure_halts_in_error_state() {
        let mut flow = SessionFlow::new(
            Arc::new(FeatherDecoder::new()),
            Arc::new(FailingEncoder),
            PreviewLimits::default(),
        );
        flow.handle(SessionEvent::FileSelected(UploadedFile::new(
            "p.feather",
            people(3),
        )))
        .unwrap();
        match flow.state() {
            SessionState::Error { message, .. } => {
                assert!(message.starts_with(ENCODE_ERROR_PREFIX));
                assert!(message.contains("unsupported column"));
            }
            other => panic!("expected error state, got {}", other.name()),
        }
    }

    #[test]
    fn test_corrupted_upload_settles_in_ready_or_error() {
        let bytes = people(6);
        let mut flow = flow();
        for pos in 0..bytes.len() {
            let mut mutated = bytes.clone();
            mutated[pos] ^= 0x80;
            flow.handle(SessionEvent::FileSelected(UploadedFile::new(
                "mutated.feather",
                mutated,
            )))
            .unwrap();
            match flow.state() {
                SessionState::Ready(_) => {}
                SessionState::Error { message, .. } => {
                    assert!(message.starts_with(DECODE_ERROR_PREFIX))
                }
                other => panic!("byte {}: stuck in {}", pos, other.name()),
            }
        }
    }
}
