use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use clap::Parser;
use journal_core::{
    journal::{AddOutcome, Journal, JournalError, JournalStatus},
    model::{Entry, FoodComponent, NutritionData, ReportPeriod},
    period::{normalize_tz_offset_minutes, tz_offset_from_minutes},
    store::{EntryStore, SqliteKv},
    thumbnail::{
        decode_base64_image, validate_upload, ImageThumbnailer, ThumbnailError, MAX_UPLOAD_BYTES,
        THUMBNAIL_MAX_DIMENSION, THUMBNAIL_QUALITY,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 17700;

type CoreJournal = Journal<SqliteKv, ImageThumbnailer>;

#[derive(Parser, Debug)]
#[command(name = "journal_core", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17700
    /// - ip (implies port 17700), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:17700")]
    listen: String,

    /// SQLite database path.
    #[arg(long, default_value = "./data/journal-core.db")]
    db: PathBuf,

    /// Longest side of stored thumbnails, in pixels.
    #[arg(long, default_value_t = THUMBNAIL_MAX_DIMENSION)]
    thumbnail_size: u32,

    /// JPEG quality for stored thumbnails (1-100).
    #[arg(long, default_value_t = THUMBNAIL_QUALITY)]
    thumbnail_quality: u8,

    /// Largest accepted image upload, in bytes (before base64).
    #[arg(long, default_value_t = MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
}

#[derive(Clone)]
struct AppState {
    journal: Arc<CoreJournal>,
    max_upload_bytes: usize,
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddEntryRequest {
    food_name: String,
    calories: f64,
    fat: f64,
    sugar: f64,
    #[serde(default)]
    components: Vec<FoodComponent>,
    /// Raw base64 or a data URL.
    image_base64: String,
    mime_type: Option<String>,
}

#[derive(Serialize)]
struct AddEntryResult {
    journaled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<Entry>,
}

#[derive(Serialize)]
struct JournalView<'a> {
    status: &'a JournalStatus,
    entries: &'a [Entry],
}

#[derive(Serialize)]
struct DeleteResult {
    remaining: usize,
}

#[derive(Deserialize)]
struct TzQuery {
    tz_offset_minutes: Option<i32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "journal_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let kv = SqliteKv::open(&args.db)?;
    let thumbnailer = ImageThumbnailer {
        max_dimension: args.thumbnail_size,
        quality: args.thumbnail_quality,
    };
    let journal = Journal::open(EntryStore::new(kv), thumbnailer);
    if let JournalStatus::Error(msg) = journal.status() {
        warn!("starting with journal error: {msg}");
    }

    let state = AppState {
        journal: Arc::new(journal),
        max_upload_bytes: args.max_upload_bytes,
    };

    let addr = parse_listen(&args.listen)?;
    info!("Core listening on http://{addr}");
    info!("DB: {}", args.db.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    // Base64 inflates uploads by a third.
    let body_limit = state.max_upload_bytes / 3 * 4 + 64 * 1024;

    Router::new()
        .route("/health", get(health))
        .route("/journal", get(get_journal))
        .route("/entries", post(post_entry).options(options_ok))
        .route("/entries/:id", delete(delete_entry).options(options_ok))
        .route("/data/wipe", post(post_data_wipe).options(options_ok))
        .route("/reports/:period", get(get_report))
        .route("/summary", get(get_summary))
        .route("/status/dismiss", post(post_status_dismiss).options(options_ok))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some(port_str) = input.strip_prefix("localhost:") {
        let port: u16 = port_str.parse().map_err(|_| {
            anyhow::anyhow!(
                "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                input,
                DEFAULT_PORT
            )
        })?;
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(data),
    })
    .into_response()
}

fn err(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

fn local_now(q: &TzQuery) -> OffsetDateTime {
    let tz = tz_offset_from_minutes(normalize_tz_offset_minutes(q.tz_offset_minutes));
    OffsetDateTime::now_utc().to_offset(tz)
}

fn upload_error(e: &ThumbnailError) -> Response {
    match e {
        ThumbnailError::TooLarge { .. } => err(StatusCode::PAYLOAD_TOO_LARGE, "image_too_large"),
        ThumbnailError::NotAnImage(_) => err(StatusCode::UNSUPPORTED_MEDIA_TYPE, "not_an_image"),
        _ => err(StatusCode::UNPROCESSABLE_ENTITY, "invalid_image"),
    }
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "journal_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

async fn get_journal(State(state): State<AppState>) -> Response {
    let snap = state.journal.snapshot();
    ok(JournalView {
        status: &snap.status,
        entries: &snap.entries,
    })
}

async fn post_entry(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    let req: AddEntryRequest = match serde_json::from_value(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!("bad entry payload: {e}");
            return err(StatusCode::BAD_REQUEST, "invalid_payload");
        }
    };
    let quantities = [req.calories, req.fat, req.sugar];
    if quantities
        .iter()
        .chain(req.components.iter().map(|c| &c.calories))
        .any(|n| !n.is_finite() || *n < 0.0)
    {
        return err(StatusCode::BAD_REQUEST, "invalid_payload");
    }

    let (data_url_mime, bytes) = match decode_base64_image(&req.image_base64) {
        Ok(v) => v,
        Err(e) => {
            warn!("rejecting upload: {e}");
            return upload_error(&e);
        }
    };
    let mime = req
        .mime_type
        .or(data_url_mime)
        .or_else(|| {
            image::guess_format(&bytes)
                .ok()
                .map(|f| f.to_mime_type().to_string())
        })
        .unwrap_or_default();
    if let Err(e) = validate_upload(bytes.len(), &mime, state.max_upload_bytes) {
        warn!("rejecting upload: {e}");
        return upload_error(&e);
    }

    let nutrition = NutritionData {
        food_name: req.food_name,
        calories: req.calories,
        fat: req.fat,
        sugar: req.sugar,
        components: req.components,
    };
    match state.journal.add_entry(nutrition, &bytes).await {
        Ok(AddOutcome::Added(entry)) => ok(AddEntryResult {
            journaled: true,
            entry: Some(entry),
        }),
        Ok(AddOutcome::NotJournaled) => ok(AddEntryResult {
            journaled: false,
            entry: None,
        }),
        Err(JournalError::Thumbnail(e)) => upload_error(&e),
        Err(JournalError::Store(e)) => {
            error!("add entry failed: {e}");
            err(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
        Err(JournalError::Worker(e)) => {
            error!("add entry failed: {e}");
            err(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

async fn delete_entry(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.journal.delete_entry(&id).await {
        Ok(()) => ok(DeleteResult {
            remaining: state.journal.entries().len(),
        }),
        Err(e) => {
            error!("delete {id} failed: {e}");
            err(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

async fn post_data_wipe(State(state): State<AppState>) -> Response {
    match state.journal.clear_all().await {
        Ok(()) => Json(OkResponse::<()> {
            ok: true,
            data: None,
        })
        .into_response(),
        Err(e) => {
            error!("wipe failed: {e}");
            err(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

async fn get_report(
    State(state): State<AppState>,
    Path(period): Path<String>,
    Query(q): Query<TzQuery>,
) -> Response {
    let period: ReportPeriod = match period.parse() {
        Ok(p) => p,
        Err(_) => return err(StatusCode::BAD_REQUEST, "unknown_period"),
    };
    ok(state.journal.report(period, local_now(&q)))
}

async fn get_summary(State(state): State<AppState>, Query(q): Query<TzQuery>) -> Response {
    ok(state.journal.summary(local_now(&q)))
}

async fn post_status_dismiss(State(state): State<AppState>) -> Response {
    state.journal.dismiss_error();
    ok(state.journal.status())
}
