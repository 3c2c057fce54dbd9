// crates/flow-warden-server/src/server.rs
// ============================================================================
// Module: HTTP/SSE Server
// Description: Router, handlers, and error mapping for the engine surface.
// Purpose: Serve the canonical transport shape of the workflow engine.
// Dependencies: axum, flow-warden-core, crate::state, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! Handlers are thin: they decode the request, call one engine operation,
//! and encode the result. Every failure carries its stable numeric code and
//! label; code families map to HTTP status classes (not-found, forbidden,
//! too-many, conflict, unprocessable). The event stream endpoint polls the
//! append-only log and delivers `data: <event-json>` lines with no gaps
//! and no retractions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::routing::get;
use axum::routing::post;
use flow_warden_core::AdvanceOutcome;
use flow_warden_core::AdvanceTrigger;
use flow_warden_core::CostAction;
use flow_warden_core::CostDelta;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::FlowState;
use flow_warden_core::ScoreCard;
use flow_warden_core::TriggerAction;
use flow_warden_core::WorkerRecord;
use flow_warden_core::WorkflowEvent;
use serde::Deserialize;
use serde::Serialize;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::state::EngineAssembly;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Poll period for the event stream endpoint.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Keep-alive period for server-sent events.
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Wire form of a surfaced engine error.
///
/// # Invariants
/// - `code` and `error` are stable; `message` is advisory.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable numeric code.
    code: u16,
    /// Stable snake_case label.
    error: &'static str,
    /// Short human-readable message.
    message: String,
    /// Gate blockers or validation violations, when applicable.
    blockers: Vec<String>,
}

/// Engine error adapted to an HTTP response.
#[derive(Debug)]
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

/// Maps an error code family to an HTTP status class.
const fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::FlowNotFound
        | ErrorCode::WorkerNotFound
        | ErrorCode::IntentNotFound
        | ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
        ErrorCode::PermissionDenied
        | ErrorCode::BudgetExceeded
        | ErrorCode::MaxRoundsExceeded => StatusCode::FORBIDDEN,
        ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::DuplicateTask
        | ErrorCode::DuplicateEvent
        | ErrorCode::OptimisticLock
        | ErrorCode::IntentConflict
        | ErrorCode::WorkerReplaced
        | ErrorCode::WorkerAlreadyDone
        | ErrorCode::LeaseExpired
        | ErrorCode::IntentHashMismatch => StatusCode::CONFLICT,
        ErrorCode::InvalidTransition
        | ErrorCode::PhaseGateFailed
        | ErrorCode::FlowAlreadyDone
        | ErrorCode::GateNotRegistered
        | ErrorCode::FileOwnership
        | ErrorCode::WorkerLimitReached
        | ErrorCode::WorkerTimeout
        | ErrorCode::CompactionInvalid
        | ErrorCode::ProviderUnavailable
        | ErrorCode::ScoreCardInvalid
        | ErrorCode::ConsensusNoCards
        | ErrorCode::ConfigInvalid => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::StoreWrite | ErrorCode::SchemaMigration => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code);
        let body = ErrorBody {
            code: self.0.code.code(),
            error: self.0.code.as_str(),
            message: self.0.message,
            blockers: self.0.blockers,
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: Request and Response Shapes
// ============================================================================

/// Body of `POST /flows`.
#[derive(Debug, Deserialize)]
struct CreateFlowRequest {
    /// Flow identifier to create.
    flow_id: String,
    /// Budget cap for the flow.
    budget_cap: f64,
}

/// Body of `POST /flows/{id}/advance`.
#[derive(Debug, Deserialize)]
struct AdvanceRequest {
    /// Trigger action to apply.
    action: TriggerAction,
    /// Actor requesting the transition.
    actor: String,
}

/// Response of `POST /flows/{id}/advance`.
#[derive(Debug, Serialize)]
struct AdvanceResponse {
    /// Phase the flow left.
    from: String,
    /// Phase the flow entered.
    to: String,
    /// Committed post-transition state.
    state: FlowState,
}

impl From<AdvanceOutcome> for AdvanceResponse {
    fn from(outcome: AdvanceOutcome) -> Self {
        Self {
            from: outcome.from.as_str().to_string(),
            to: outcome.to.as_str().to_string(),
            state: outcome.state,
        }
    }
}

/// Query of `GET /flows/{id}/events`.
#[derive(Debug, Deserialize)]
struct SinceQuery {
    /// Return events with `seq_no` strictly greater than this.
    #[serde(default)]
    since: u64,
}

/// Response of `GET /flows/{id}/cost`.
#[derive(Debug, Serialize)]
struct CostSummary {
    /// Accumulated spend.
    budget_used: f64,
    /// Configured cap.
    budget_cap: f64,
    /// Governor classification of the current spend.
    cost_action: CostAction,
    /// Every recorded delta in insertion order.
    deltas: Vec<CostDelta>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Creates a flow.
async fn create_flow(
    State(state): State<Arc<EngineAssembly>>,
    Json(request): Json<CreateFlowRequest>,
) -> Result<(StatusCode, Json<FlowState>), ApiError> {
    let flow =
        state.engine.start_flow(FlowId::new(request.flow_id), request.budget_cap)?;
    Ok((StatusCode::CREATED, Json(flow)))
}

/// Returns a flow's current state.
async fn get_flow(
    State(state): State<Arc<EngineAssembly>>,
    Path(id): Path<String>,
) -> Result<Json<FlowState>, ApiError> {
    Ok(Json(state.engine.get_flow(&FlowId::new(id))?))
}

/// Applies one trigger to a flow.
async fn advance_flow(
    State(state): State<Arc<EngineAssembly>>,
    Path(id): Path<String>,
    Json(request): Json<AdvanceRequest>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let trigger = AdvanceTrigger { action: request.action, actor: request.actor };
    let outcome = state.engine.advance(&FlowId::new(id), &trigger)?;
    Ok(Json(outcome.into()))
}

/// Lists a flow's workers.
async fn list_workers(
    State(state): State<Arc<EngineAssembly>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<WorkerRecord>>, ApiError> {
    Ok(Json(state.store.list_workers(&FlowId::new(id))?))
}

/// Lists a flow's events after a sequence number.
async fn list_events(
    State(state): State<Arc<EngineAssembly>>,
    Path(id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<Vec<WorkflowEvent>>, ApiError> {
    Ok(Json(state.store.list_events_since(&FlowId::new(id), query.since)?))
}

/// Streams a flow's events as server-sent events.
async fn stream_events(
    State(state): State<Arc<EngineAssembly>>,
    Path(id): Path<String>,
    Query(query): Query<SinceQuery>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = event_stream(state, FlowId::new(id), query.since);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}

/// Lists a flow's scorecards.
async fn list_score_cards(
    State(state): State<Arc<EngineAssembly>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ScoreCard>>, ApiError> {
    Ok(Json(state.store.list_score_cards(&FlowId::new(id))?))
}

/// Summarizes a flow's spend.
async fn cost_summary(
    State(state): State<Arc<EngineAssembly>>,
    Path(id): Path<String>,
) -> Result<Json<CostSummary>, ApiError> {
    let flow_id = FlowId::new(id);
    let flow = state.engine.get_flow(&flow_id)?;
    let deltas = state.store.list_cost_deltas(&flow_id)?;
    Ok(Json(CostSummary {
        budget_used: flow.budget_used,
        budget_cap: flow.budget_cap,
        cost_action: flow_warden_core::runtime::governor::evaluate(
            flow.budget_used,
            flow.budget_cap,
        ),
        deltas,
    }))
}

// ============================================================================
// SECTION: Event Stream
// ============================================================================

/// Builds the polling stream backing the SSE endpoint.
///
/// A background task polls the append-only log from the cursor and pushes
/// one `data:` frame per event. The task exits when the client disconnects
/// or the ambient cancellation fires.
fn event_stream(
    state: Arc<EngineAssembly>,
    flow_id: FlowId,
    since: u64,
) -> ReceiverStream<Result<Event, std::convert::Infallible>> {
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let ambient = state.ambient.clone();
    tokio::spawn(async move {
        let mut cursor = since;
        let mut ticker = tokio::time::interval(STREAM_POLL_INTERVAL);
        loop {
            tokio::select! {
                () = ambient.cancelled() => break,
                _ = ticker.tick() => {
                    let events = match state.store.list_events_since(&flow_id, cursor) {
                        Ok(events) => events,
                        Err(err) => {
                            tracing::warn!(flow = %flow_id, error = %err, "event poll failed");
                            break;
                        }
                    };
                    for event in events {
                        cursor = event.seq_no;
                        let frame = match serde_json::to_string(&event) {
                            Ok(json) => Event::default().data(json),
                            Err(err) => {
                                tracing::warn!(error = %err, "event encode failed");
                                continue;
                            }
                        };
                        if tx.send(Ok(frame)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
    ReceiverStream::new(rx)
}

// ============================================================================
// SECTION: Router and Serve
// ============================================================================

/// Builds the canonical router over an engine assembly.
#[must_use]
pub fn app_router(state: Arc<EngineAssembly>) -> Router {
    Router::new()
        .route("/flows", post(create_flow))
        .route("/flows/{id}", get(get_flow))
        .route("/flows/{id}/advance", post(advance_flow))
        .route("/flows/{id}/workers", get(list_workers))
        .route("/flows/{id}/events", get(list_events))
        .route("/flows/{id}/events/stream", get(stream_events))
        .route("/flows/{id}/scorecards", get(list_score_cards))
        .route("/flows/{id}/cost", get(cost_summary))
        .with_state(state)
}

/// Serves the router until the shutdown token fires.
///
/// # Errors
///
/// Returns an I/O error when the listener cannot bind or the server loop
/// fails.
pub async fn serve(
    state: Arc<EngineAssembly>,
    listen_addr: &str,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    let router = app_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

// ============================================================================
// SECTION: Tests
// ============================================================================
