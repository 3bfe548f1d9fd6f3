use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::application::{PreviewLimits, SessionStore};
use crate::domain::app_config::AppConfig;
use crate::domain::error::Result;
use crate::infrastructure::csv::CsvEncoder;
use crate::infrastructure::feather::FeatherDecoder;
use crate::interfaces::http::{add_log, HttpState, LogEntry};

/// How often idle sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn build_state(config: AppConfig) -> Result<HttpState> {
    let logs: Arc<Mutex<Vec<LogEntry>>> = Arc::new(Mutex::new(Vec::new()));

    let limits = PreviewLimits {
        default_rows: config.preview_default_rows,
        max_rows: config.preview_max_rows,
    };
    let decoder = FeatherDecoder::new().with_max_decoded_bytes(config.max_decoded_bytes);
    let encoder = CsvEncoder::new()
        .with_delimiter(config.csv_delimiter_byte()?)
        .with_missing(config.csv_missing.clone());
    let sessions = Arc::new(SessionStore::new(
        Arc::new(decoder),
        Arc::new(encoder),
        limits,
        Duration::from_secs(config.session_idle_timeout_secs),
        config.max_sessions,
    ));

    add_log(
        &logs,
        "INFO",
        "System",
        &format!(
            "Session store ready (max {} sessions, idle timeout {}s)",
            config.max_sessions, config.session_idle_timeout_secs
        ),
    );

    Ok(HttpState {
        sessions,
        config,
        logs,
    })
}

/// Periodically drops sessions that have been idle past the timeout.
pub fn spawn_session_sweeper(sessions: Arc<SessionStore>, logs: Arc<Mutex<Vec<LogEntry>>>) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle();
            if evicted > 0 {
                info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
                add_log(
                    &logs,
                    "INFO",
                    "Sessions",
                    &format!("Evicted {} idle session(s)", evicted),
                );
            } else {
                debug!(remaining = sessions.len(), "No idle sessions to evict");
            }
        }
    });
}
