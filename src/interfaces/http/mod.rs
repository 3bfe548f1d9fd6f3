pub mod error;
pub mod page;

use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Server;
use actix_web::http::header::{
    Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue,
};
use actix_web::{
    delete, get, post, put, web, App, HttpRequest, HttpResponse, HttpServer, Responder,
    ResponseError,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::application::{SessionFlow, SessionStore};
use crate::domain::app_config::AppConfig;
use crate::domain::error::{AppError, Result};
use crate::domain::session::{SessionEvent, SessionView};
use crate::domain::upload::UploadedFile;

pub const SESSION_COOKIE: &str = "feather_session";
pub const FEATHER_EXTENSION: &str = "feather";
const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub sessions: Arc<SessionStore>,
    pub config: AppConfig,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

#[derive(Deserialize)]
pub struct UploadQuery {
    pub file_name: String,
}

#[derive(Deserialize)]
pub struct PreviewRequest {
    pub rows: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
}

/// Session id from the cookie, or a fresh one for first contact.
fn session_id(req: &HttpRequest) -> Uuid {
    req.cookie(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
        .unwrap_or_else(Uuid::new_v4)
}

fn session_cookie(id: Uuid) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

/// Renders the result, error or not, and attaches the session cookie.
fn with_session_cookie(id: Uuid, result: Result<HttpResponse>) -> HttpResponse {
    let mut response = result.unwrap_or_else(|err| err.error_response());
    if let Err(err) = response.add_cookie(&session_cookie(id)) {
        warn!(error = %err, "Failed to set session cookie");
    }
    response
}

/// Runs `f` against the session on the blocking pool; session locks are
/// never taken on an actix worker.
async fn on_session<T, F>(data: &web::Data<HttpState>, id: Uuid, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SessionFlow) -> Result<T> + Send + 'static,
{
    let sessions = data.sessions.clone();
    web::block(move || sessions.with_session(id, f))
        .await
        .map_err(|e| AppError::Internal(format!("Session worker failed: {}", e)))?
}

fn download_disposition(file_name: &str) -> ContentDisposition {
    let mut parameters = vec![DispositionParam::Filename(file_name.to_string())];
    if !file_name.is_ascii() {
        parameters.push(DispositionParam::FilenameExt(ExtendedValue {
            charset: Charset::Ext("UTF-8".to_string()),
            language_tag: None,
            value: file_name.as_bytes().to_vec(),
        }));
    }
    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters,
    }
}

#[get("/")]
async fn index(data: web::Data<HttpState>, req: HttpRequest) -> HttpResponse {
    let id = session_id(&req);
    let result = async {
        let view = on_session(&data, id, |flow| flow.view()).await?;
        let accept = data.config.enforce_extension.then_some(FEATHER_EXTENSION);
        Ok::<_, AppError>(
            HttpResponse::Ok()
                .content_type("text/html; charset=utf-8")
                .body(page::render_page(&view, accept)),
        )
    }
    .await;
    with_session_cookie(id, result)
}

#[get("/session")]
async fn get_session(data: web::Data<HttpState>, req: HttpRequest) -> HttpResponse {
    let id = session_id(&req);
    let result = on_session(&data, id, |flow| flow.view())
        .await
        .map(|view| HttpResponse::Ok().json(view));
    with_session_cookie(id, result)
}

#[post("/session/upload")]
async fn upload_file(
    data: web::Data<HttpState>,
    req: HttpRequest,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> HttpResponse {
    let id = session_id(&req);
    let result = receive_upload(&data, id, query.into_inner(), body).await;
    with_session_cookie(id, result)
}

async fn receive_upload(
    data: &web::Data<HttpState>,
    id: Uuid,
    query: UploadQuery,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let file_name = query.file_name.trim().to_string();
    if file_name.is_empty() {
        return Err(AppError::ValidationError("file_name is required".to_string()));
    }

    let file = UploadedFile::new(file_name, body.to_vec());
    if data.config.enforce_extension && !file.has_extension(FEATHER_EXTENSION) {
        return Err(AppError::ValidationError(format!(
            "'{}' is not a .{} file",
            file.name, FEATHER_EXTENSION
        )));
    }

    add_log(
        &data.logs,
        "INFO",
        "Upload",
        &format!("Received {} ({} bytes)", file.name, file.size()),
    );

    let view = on_session(data, id, move |flow| {
        flow.handle(SessionEvent::FileSelected(file))?;
        flow.view()
    })
    .await?;

    match &view {
        SessionView::Ready {
            file_name,
            summary,
            download: converted,
            ..
        } => add_log(
            &data.logs,
            "INFO",
            "Convert",
            &format!(
                "Converted {} ({} rows x {} columns) -> {}",
                file_name, summary.row_count, summary.column_count, converted.file_name
            ),
        ),
        SessionView::Error { message, .. } => add_log(&data.logs, "ERROR", "Convert", message),
        _ => {}
    }

    Ok(HttpResponse::Ok().json(view))
}

#[put("/session/preview")]
async fn set_preview(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Json<PreviewRequest>,
) -> HttpResponse {
    let id = session_id(&req);
    let rows = body.rows;
    let result = on_session(&data, id, move |flow| {
        flow.handle(SessionEvent::PreviewSizeChanged(rows))?;
        flow.view()
    })
    .await
    .map(|view| HttpResponse::Ok().json(view));
    with_session_cookie(id, result)
}

/// Clears the upload and releases the session's registry slot.
#[delete("/session")]
async fn clear_session(data: web::Data<HttpState>, req: HttpRequest) -> HttpResponse {
    let id = session_id(&req);
    let result = async {
        let view = on_session(&data, id, |flow| {
            flow.handle(SessionEvent::FileCleared)?;
            flow.view()
        })
        .await?;
        data.sessions.remove(id);
        Ok::<_, AppError>(HttpResponse::Ok().json(view))
    }
    .await;
    with_session_cookie(id, result)
}

#[get("/session/download")]
async fn download_csv(data: web::Data<HttpState>, req: HttpRequest) -> HttpResponse {
    let id = session_id(&req);
    let result = async {
        let conversion = on_session(&data, id, |flow| Ok(flow.conversion().cloned()))
            .await?
            .ok_or_else(|| AppError::NotFound("no converted file in this session".to_string()))?;

        add_log(
            &data.logs,
            "INFO",
            "Download",
            &format!("Serving {} ({} bytes)", conversion.file_name, conversion.byte_len),
        );

        Ok::<_, AppError>(
            HttpResponse::Ok()
                .content_type("text/csv; charset=utf-8")
                .insert_header(download_disposition(&conversion.file_name))
                .body(conversion.csv),
        )
    }
    .await;
    with_session_cookie(id, result)
}

#[get("/health")]
async fn health(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        sessions: data.sessions.len(),
    })
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>) -> impl Responder {
    let logs = data
        .logs
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    HttpResponse::Ok().json(&*logs)
}

pub fn add_log_entry(
    logs: &Mutex<Vec<LogEntry>>,
    level: &str,
    source: &str,
    message: &str,
) -> LogEntry {
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut logs = logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    logs.push(entry.clone());
    if logs.len() > MAX_LOG_ENTRIES {
        logs.remove(0);
    }
    entry
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    add_log_entry(logs, level, source, message);
}

/// Registers state, the upload size limit and every route.
pub fn configure_app(cfg: &mut web::ServiceConfig, state: web::Data<HttpState>) {
    let upload_limit = state.config.max_upload_bytes;
    cfg.app_data(state)
        .app_data(web::PayloadConfig::new(upload_limit))
        .service(index)
        .service(
            web::scope("/api")
                .service(get_session)
                .service(upload_file)
                .service(set_preview)
                .service(clear_session)
                .service(download_csv)
                .service(health)
                .service(get_logs),
        );
}

pub fn start_server(state: web::Data<HttpState>) -> std::io::Result<Server> {
    let address = state.config.bind_address();
    let permissive_cors = state.config.cors_permissive;

    let server = HttpServer::new(move || {
        let cors = if permissive_cors {
            Cors::permissive()
        } else {
            Cors::default()
        };
        let state = state.clone();

        App::new()
            .wrap(cors)
            .configure(move |cfg| configure_app(cfg, state))
    })
    .bind(address)?
    .run();

    Ok(server)
}
