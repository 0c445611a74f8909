use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use switchboard_shared::protocol::{ClientRequest, Notification};
use switchboard_shared::types::{Gid, SessionId, UserId};

use crate::context::Context;
use crate::error::{Result, ServerError};
use crate::session::SessionService;

/// Longest a client may park on `GET /session/:id/events`.
const MAX_WAIT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Context,
    pub sessions: SessionService,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/session", post(start_session))
        .route("/session/:id", delete(end_session))
        .route("/session/:id/events", get(session_events))
        .route("/session/:id/request", post(session_request))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    user_id: UserId,
    /// Registers the user on first contact.
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    cached_upto: Option<Gid>,
    #[serde(default)]
    max_backlog: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    session_id: SessionId,
}

#[derive(Deserialize)]
struct EventsQuery {
    /// Last sequence number the client has processed.
    ack: Option<i64>,
    /// Seconds to wait when nothing is pending.
    wait: Option<u64>,
}

#[derive(Serialize)]
struct EventsResponse {
    /// Pass back as `ack` on the next poll.
    last: Option<i64>,
    notifications: Vec<Notification>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>> {
    let user = req.user_id;

    match req.nick {
        Some(nick) => {
            state
                .ctx
                .store
                .run(|db| db.upsert_user(&user, &nick))
                .await?
        }
        None => {
            let known = state.ctx.store.run(|db| db.user_nick(&user)).await?;
            if known.is_none() {
                return Err(ServerError::BadRequest(format!("Unknown user {user}")));
            }
        }
    }

    let session = SessionId::new();
    let max_backlog = req.max_backlog.unwrap_or(state.ctx.config.max_backlog);
    state
        .sessions
        .start(&user, &session, req.cached_upto.unwrap_or(Gid(0)), max_backlog)
        .await?;

    Ok(Json(StartResponse { session_id: session }))
}

async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>> {
    let session = SessionId(id);
    let user = owner(&state, &session).await?;
    let wait = Duration::from_secs(query.wait.unwrap_or(0).min(MAX_WAIT_SECS));

    let batch = state
        .ctx
        .outbox
        .next_batch(&user, &session, query.ack, wait)
        .await?;

    Ok(Json(EventsResponse {
        last: batch.last().map(|(seq, _)| *seq).or(query.ack),
        notifications: batch.into_iter().map(|(_, ntf)| ntf).collect(),
    }))
}

async fn session_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ClientRequest>,
) -> Result<StatusCode> {
    let session = SessionId(id);
    let user = owner(&state, &session).await?;

    state.sessions.handle_request(&user, &session, request).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn end_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let session = SessionId(id);
    let user = owner(&state, &session).await?;

    state.sessions.end(&user, &session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn owner(state: &AppState, session: &SessionId) -> Result<UserId> {
    state
        .ctx
        .outbox
        .session_owner(session)
        .await?
        .ok_or_else(|| ServerError::UnknownSession(session.to_string()))
}
