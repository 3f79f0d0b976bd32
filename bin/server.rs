// GnuCash Ledger Writer - Web Server
// REST API with Axum over one shared LedgerWriter

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use ledger_writer::{
    init_tracing, AccountRef, CommitResult, HealthReport, LedgerArgs, LedgerError, LedgerWriter,
    NormalizedTransaction,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// HTTP front end for the ledger writer
#[derive(Parser)]
#[command(name = "ledger-server")]
#[command(author, version, about, long_about = None)]
struct ServerArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "SERVER_PORT", default_value_t = 3000)]
    port: u16,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    writer: Arc<LedgerWriter>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

#[derive(Serialize)]
struct ApiError {
    code: &'static str,
    message: String,
    retryable: bool,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(err: &LedgerError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: err.code(),
                message: err.to_string(),
                retryable: err.is_retryable(),
            }),
        }
    }
}

fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidRecord(_) | LedgerError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
        LedgerError::PrecisionError { .. }
        | LedgerError::InvalidDenominator(_)
        | LedgerError::AmountOverflow(_)
        | LedgerError::UnknownCommodity(_)
        | LedgerError::CommodityMismatch { .. }
        | LedgerError::UnmappedAccount(_)
        | LedgerError::ImbalancedTransaction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::DuplicateTransaction { .. } => StatusCode::CONFLICT,
        LedgerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        LedgerError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::DenominatorMismatch { .. }
        | LedgerError::Storage(_)
        | LedgerError::Io(_)
        | LedgerError::BookMissing
        | LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: LedgerError) -> Response {
    (status_for(&err), Json(ApiResponse::failure(&err))).into_response()
}

async fn run_blocking<T, F>(f: F) -> Result<T, LedgerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LedgerError::Internal(format!("blocking task failed: {}", e)))?
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Ledger file present, writable and bootstrapped
async fn health_check(State(state): State<AppState>) -> Response {
    let reader = state.writer.reader();

    match run_blocking(move || Ok(reader.health())).await {
        Ok(report) => {
            let status = if report.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(ApiResponse::<HealthReport>::ok(report))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/transactions - Commit one normalized transaction
///
/// Body is the loosely-typed JSON produced by extraction; it is converted to
/// a NormalizedTransaction before it reaches the writer.
async fn post_transaction(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let record = match NormalizedTransaction::try_from(body) {
        Ok(record) => record,
        Err(e) => return error_response(e),
    };

    match state.writer.commit(record).await {
        Ok(result) => (StatusCode::CREATED, Json(ApiResponse::<CommitResult>::ok(result))).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct ResolveQuery {
    path: String,
}

/// GET /api/accounts/resolve?path=Assets:Checking
async fn resolve_account(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Response {
    let reader = state.writer.reader();
    let path = query.path.clone();

    match run_blocking(move || reader.resolve_account_path(&path)).await {
        Ok(Some(account)) => (StatusCode::OK, Json(ApiResponse::<AccountRef>::ok(account))).into_response(),
        Ok(None) => error_response(LedgerError::UnmappedAccount(query.path)),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_tracing(&args.ledger.log_level, args.ledger.log_format)?;

    let config = args.ledger.config();
    let writer = LedgerWriter::open(&config)
        .with_context(|| format!("Failed to open ledger {}", config.db_path.display()))?;

    // Create shared state
    let state = AppState {
        writer: Arc::new(writer),
    };
    let writer = state.writer.clone();

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", post(post_transaction))
        .route("/accounts/resolve", get(resolve_account))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    // Start server
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, db = %config.db_path.display(), "ledger server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    match Arc::try_unwrap(writer) {
        Ok(writer) => writer.shutdown().await?,
        Err(_) => warn!("writer still referenced at exit, queued writes may be dropped"),
    }

    Ok(())
}
