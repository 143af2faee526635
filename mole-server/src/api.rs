//! HTTP API for ticket issuance, verification and revocation.
//!
//! `POST /api/ticket` exchanges a user name and password for a ticket bound
//! to the caller's address. Routes behind [`require_ticket`] accept that
//! ticket instead of credentials. Administrative routes require an API key.

use crate::credentials::{key_matches, Credentials};
use crate::peer::{ObservedAddr, TrustedProxies};
use axum::{
    body::Body,
    extract::{FromRef, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, Request, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use mole_core::{Ticket, TicketAuthority, TicketError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Header carrying a ticket when `Authorization` is used for something else.
pub const TICKET_HEADER: &str = "x-mole-ticket";

/// Request body for ticket issuance.
#[derive(Debug, Deserialize)]
pub struct TicketRequest {
    pub user: String,
    pub password: String,
}

/// API response for a granted ticket.
#[derive(Debug, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket: String,
    pub subject: String,
    pub valid_until: i64,
}

/// API response describing the verified caller.
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoamiResponse {
    pub subject: String,
    pub bound_address: String,
    pub valid_until: i64,
}

/// API response for server health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub key_generation: u64,
    pub uptime_seconds: u64,
}

/// API response for errors.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

/// State for the API server.
#[derive(Clone)]
pub struct ApiState {
    pub authority: TicketAuthority,
    pub credentials: Arc<Credentials>,
    pub trusted_proxies: Arc<TrustedProxies>,
    /// API key for administrative endpoints (None = endpoints not mounted)
    pub admin_key: Option<String>,
    pub start_time: Instant,
}

impl ApiState {
    /// Create a new API state.
    pub fn new(
        authority: TicketAuthority,
        credentials: Credentials,
        trusted_proxies: TrustedProxies,
        admin_key: Option<String>,
    ) -> Self {
        Self {
            authority,
            credentials: Arc::new(credentials),
            trusted_proxies: Arc::new(trusted_proxies),
            admin_key,
            start_time: Instant::now(),
        }
    }
}

impl FromRef<ApiState> for Arc<TrustedProxies> {
    fn from_ref(state: &ApiState) -> Self {
        state.trusted_proxies.clone()
    }
}

/// Create the API router.
pub fn create_api_router(state: ApiState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/api/ticket", post(issue_ticket_handler));

    let ticket_routes = Router::new()
        .route("/api/whoami", get(whoami_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_ticket));

    let mut router = Router::new().merge(public_routes).merge(ticket_routes);

    if state.admin_key.is_some() {
        let admin_routes = Router::new()
            .route("/api/admin/reinitialize", post(reinitialize_handler))
            .layer(middleware::from_fn_with_state(state.clone(), require_admin_key));
        router = router.merge(admin_routes);
    }

    router.with_state(state)
}

/// Middleware admitting only requests with a valid ticket for the caller.
///
/// On success the verified [`Ticket`] is attached as a request extension.
/// Every failure produces the same response; the reason is only logged.
pub async fn require_ticket(
    State(state): State<ApiState>,
    ObservedAddr(ip): ObservedAddr,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(presented) = presented_ticket(request.headers()) else {
        warn!(code = "missing_ticket", observed_address = %ip, "Ticket required but not provided");
        return not_authorized();
    };

    match state.authority.authorize(presented, &ip.to_string()) {
        Ok(ticket) => {
            request.extensions_mut().insert(ticket);
            next.run(request).await
        }
        Err(_) => not_authorized(),
    }
}

/// Find a ticket in `Authorization: Ticket <t>` or the ticket header.
fn presented_ticket(headers: &HeaderMap) -> Option<&str> {
    let from_auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Ticket "));

    from_auth
        .or_else(|| headers.get(TICKET_HEADER).and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn not_authorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Ticket")],
        Json(ApiError {
            error: "not authorized".to_string(),
            code: 401,
        }),
    )
        .into_response()
}

/// Middleware to require the administrative API key.
async fn require_admin_key(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_key) = &state.admin_key else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided_key = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(key) => Some(key),
        None => request
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok()),
    };

    match provided_key {
        Some(key) if key_matches(key, expected_key) => next.run(request).await,
        Some(_) => {
            warn!("Invalid admin API key provided");
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError {
                    error: "Invalid API key".to_string(),
                    code: 401,
                }),
            )
                .into_response()
        }
        None => {
            warn!("Admin API key required but not provided");
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError {
                    error: "API key required. Provide via Authorization: Bearer <key> or X-API-Key header".to_string(),
                    code: 401,
                }),
            )
                .into_response()
        }
    }
}

/// Health check endpoint.
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let keys = state.authority.keys();
    let response = HealthResponse {
        status: (if keys.is_available() { "healthy" } else { "degraded" }).to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        key_generation: keys.generation(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };

    Json(response)
}

/// Exchange credentials for a ticket bound to the caller's address.
async fn issue_ticket_handler(
    State(state): State<ApiState>,
    ObservedAddr(ip): ObservedAddr,
    Json(body): Json<TicketRequest>,
) -> Response {
    if !state.credentials.check(&body.user, &body.password) {
        warn!(user = %body.user, observed_address = %ip, "Authentication failed");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError {
                error: "Invalid user or password".to_string(),
                code: 401,
            }),
        )
            .into_response();
    }

    match state.authority.issue(&body.user, &ip.to_string()) {
        Ok(issued) => Json(TicketResponse {
            ticket: issued.ticket,
            subject: issued.subject,
            valid_until: issued.valid_until,
        })
        .into_response(),
        Err(TicketError::KeyUnavailable) => {
            error!("Cannot issue tickets: no ticket key installed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError {
                    error: "Ticket issuance unavailable".to_string(),
                    code: 503,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to issue ticket for {}: {}", body.user, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: "Failed to issue ticket".to_string(),
                    code: 500,
                }),
            )
                .into_response()
        }
    }
}

/// Report the verified ticket holder.
async fn whoami_handler(Extension(ticket): Extension<Ticket>) -> impl IntoResponse {
    Json(WhoamiResponse {
        subject: ticket.subject,
        bound_address: ticket.bound_address,
        valid_until: ticket.valid_until,
    })
}

/// Replace the ticket key, revoking every outstanding ticket.
async fn reinitialize_handler(State(state): State<ApiState>) -> Response {
    match state.authority.revoke_all() {
        Ok(generation) => {
            info!("All tickets revoked via API, key generation {}", generation);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "message": "All outstanding tickets revoked",
                    "key_generation": generation
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Key re-initialization failed, ticket service disabled: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: "Key re-initialization failed; outstanding tickets are revoked and issuance is disabled".to_string(),
                    code: 500,
                }),
            )
                .into_response()
        }
    }
}
