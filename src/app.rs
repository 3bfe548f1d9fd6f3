use actix_web::web;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::error::{AppError, Result};
use crate::infrastructure::bootstrap::{build_state, spawn_session_sweeper};
use crate::infrastructure::config::ConfigService;
use crate::interfaces::http::{add_log, start_server};

pub fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config_service = ConfigService::new();
    let config = config_service.load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!(
        config_file = %config_service.path().display(),
        host = %config.host,
        port = config.port,
        "Configuration loaded"
    );

    actix_web::rt::System::new().block_on(async move {
        let state = web::Data::new(build_state(config)?);
        spawn_session_sweeper(state.sessions.clone(), state.logs.clone());

        let (host, port) = state.config.bind_address();
        let logs = state.logs.clone();
        let server = start_server(state).map_err(|err| {
            error!(error = %err, host = %host, port, "Failed to start HTTP server");
            AppError::from(err)
        })?;

        add_log(
            &logs,
            "INFO",
            "System",
            &format!("HTTP server started on http://{}:{}", host, port),
        );
        info!(host = %host, port, "HTTP server started");

        server.await.map_err(AppError::from)
    })
}
