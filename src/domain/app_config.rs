// ============================================================
// APPLICATION CONFIGURATION
// ============================================================
// Server, upload and preview settings

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::{AppError, Result};

/// Runtime configuration, layered by the config loader.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// Interface to bind the HTTP server on
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    /// Largest accepted upload body in bytes (default: 200 MiB)
    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,

    /// Upper bound of the preview size control (default: 50)
    #[validate(range(min = 1))]
    pub preview_max_rows: usize,

    /// Preview size shown right after a file is loaded (default: 10)
    #[validate(range(min = 1))]
    pub preview_default_rows: usize,

    /// Sessions untouched for this long are dropped
    #[validate(range(min = 1))]
    pub session_idle_timeout_secs: u64,

    /// Live session cap; least recently used sessions are evicted past it
    #[validate(range(min = 1))]
    pub max_sessions: usize,

    /// Ceiling for decompressed bytes and rows of one upload (default: 2 GiB)
    #[validate(range(min = 1))]
    pub max_decoded_bytes: usize,

    /// Single ASCII character separating CSV fields
    #[validate(length(equal = 1))]
    pub csv_delimiter: String,

    /// Text written for null and NaN cells
    pub csv_missing: String,

    /// Only accept uploads named `*.feather`
    pub enforce_extension: bool,

    pub cors_permissive: bool,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            max_upload_bytes: 200 * 1024 * 1024,
            preview_max_rows: 50,
            preview_default_rows: 10,
            session_idle_timeout_secs: 3600,
            max_sessions: 256,
            max_decoded_bytes: 2 * 1024 * 1024 * 1024,
            csv_delimiter: ",".to_string(),
            csv_missing: String::new(),
            enforce_extension: true,
            cors_permissive: true,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn csv_delimiter_byte(&self) -> Result<u8> {
        match self.csv_delimiter.as_bytes() {
            [byte] if byte.is_ascii() && *byte != b'"' && *byte != b'\n' => Ok(*byte),
            _ => Err(AppError::Config(format!(
                "csv_delimiter must be one ASCII character other than a quote or newline, got {:?}",
                self.csv_delimiter
            ))),
        }
    }
}
