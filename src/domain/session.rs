// ============================================================
// SESSION STATE
// ============================================================
// States and events of one upload lifecycle

use serde::Serialize;

use super::conversion::ConversionResult;
use super::summary::TableSummary;
use super::table::Table;
use super::upload::UploadedFile;

/// Discrete user actions driving the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    FileSelected(UploadedFile),
    FileCleared,
    PreviewSizeChanged(usize),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::FileSelected(_) => "file_selected",
            SessionEvent::FileCleared => "file_cleared",
            SessionEvent::PreviewSizeChanged(_) => "preview_size_changed",
        }
    }
}

/// Everything held once a file has been decoded successfully.
#[derive(Debug, Clone)]
pub struct ReadySession {
    pub file_name: String,
    pub fingerprint: String,
    pub table: Table,
    pub summary: TableSummary,
    pub preview_rows: usize,
    pub conversion: ConversionResult,
}

#[derive(Debug, Clone, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Loaded {
        upload: UploadedFile,
    },
    Ready(Box<ReadySession>),
    Error {
        file_name: String,
        message: String,
        hint: String,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loaded { .. } => "loaded",
            SessionState::Ready(_) => "ready",
            SessionState::Error { .. } => "error",
        }
    }
}

/// Serializable snapshot of a session for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionView {
    Idle,
    #[serde(rename_all = "camelCase")]
    Loaded { file_name: String },
    #[serde(rename_all = "camelCase")]
    Ready {
        file_name: String,
        fingerprint: String,
        summary: TableSummary,
        preview: PreviewView,
        download: DownloadView,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        file_name: String,
        message: String,
        hint: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewView {
    pub rows: usize,
    pub min_rows: usize,
    pub max_rows: usize,
    pub columns: Vec<String>,
    /// Row-major cells; `None` marks a missing value.
    pub data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadView {
    pub file_name: String,
    pub mime: String,
    pub byte_len: usize,
    pub char_count: usize,
}
