// Travel Tagger - REST API
//
// Thin axum layer over the data access functions. Every handler locks the
// shared connection, resolves the bearer identity and calls one library
// operation. Responses use the `ApiResponse` envelope.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::config::Config;
use crate::entities::{Collaborator, NewPin, NewTrip, NewUser, Pin, PinDetails, Role, Trip, TripUpdate, User};
use crate::error::{InvitationError, StoreError};
use crate::invitations::{self, InvitationPreview, InvitationTicket};
use crate::map::{self, LatLng, MapMarker, PlaceSelection, Viewport};
use crate::pins::{self, PinEdit};
use crate::session::{ensure_user_exists, resolve_session, EnsureUser};
use crate::trips;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(e) | ApiError::Invitation(InvitationError::Store(e)) => match e {
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
                StoreError::Forbidden { .. } => StatusCode::FORBIDDEN,
                StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::Database(_) | StoreError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Invitation(InvitationError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Invitation(InvitationError::Expired) => StatusCode::GONE,
            ApiError::Invitation(InvitationError::AlreadyCollaborator) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The id carried by `Authorization: Bearer <user-id>`.
fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

fn current_user(conn: &Connection, headers: &HeaderMap) -> Result<User, ApiError> {
    let session = resolve_session(conn, bearer(headers))?;
    Ok(session.require_user()?.clone())
}

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TripSummary {
    #[serde(flatten)]
    pub trip: Trip,
    pub date_range: String,
}

impl From<Trip> for TripSummary {
    fn from(trip: Trip) -> Self {
        Self {
            date_range: trip.date_range_label(),
            trip,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TripDetail {
    pub trip: TripSummary,
    pub role: Role,
    pub pins: Vec<Pin>,
    pub collaborators: Vec<Collaborator>,
}

#[derive(Debug, Serialize)]
pub struct MarkersResponse {
    pub markers: Vec<MapMarker>,
    pub viewport: Viewport,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    #[serde(flatten)]
    pub ticket: InvitationTicket,
    pub link: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub moved_pin_id: String,
    pub new_order_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct BulkEditRequest {
    pub pins: Vec<PinEdit>,
}

/// Partial pin update. `order` is the per-row reorder write; the other
/// fields edit details and keep their current value when absent.
#[derive(Debug, Default, Deserialize)]
pub struct PinPatch {
    pub nickname: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub visited_flag: Option<bool>,
    pub order: Option<i64>,
}

impl PinPatch {
    fn has_details(&self) -> bool {
        self.nickname.is_some()
            || self.notes.is_some()
            || self.category.is_some()
            || self.visited_flag.is_some()
    }

    fn merge(&self, pin: &Pin) -> PinDetails {
        let mut details = PinDetails::from(pin);
        if let Some(nickname) = &self.nickname {
            details.nickname = nickname.clone();
        }
        if let Some(notes) = &self.notes {
            details.notes = Some(notes.clone()).filter(|n| !n.is_empty());
        }
        if let Some(category) = &self.category {
            details.category = Some(category.clone()).filter(|c| !c.is_empty());
        }
        if let Some(visited) = self.visited_flag {
            details.visited_flag = visited;
        }
        details
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub status: EnsureUser,
}

#[derive(Debug, Default, Deserialize)]
pub struct AcceptRequest {
    #[serde(default)]
    pub email: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/session - Make sure the bearer identity has a user record
async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SessionRequest>,
) -> ApiResult<SessionResponse> {
    let user_id = bearer(&headers).ok_or(StoreError::Unauthenticated)?;
    let conn = state.conn()?;

    let new_user = NewUser {
        id: user_id.to_string(),
        email: body.email,
        name: body.name,
        avatar_url: body.avatar_url,
    };
    let status = ensure_user_exists(&conn, &new_user)?;
    let user = current_user(&conn, &headers)?;
    ok(SessionResponse { user, status })
}

/// GET /api/trips - Owned and shared trips, newest first
async fn list_trips(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<TripSummary>> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    let trips = trips::list_trips(&conn, &user.id)?;
    ok(trips.into_iter().map(TripSummary::from).collect())
}

/// POST /api/trips
async fn create_trip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewTrip>,
) -> Result<(StatusCode, Json<ApiResponse<TripSummary>>), ApiError> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    let trip = trips::create_trip(&conn, &user.id, &body)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(trip.into()))))
}

/// GET /api/trips/:trip_id - Trip with its ordered pins
async fn get_trip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
) -> ApiResult<TripDetail> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;

    let role = trips::require_access(&conn, &trip_id, &user.id)?;
    let trip = trips::get_trip(&conn, &user.id, &trip_id)?;
    let pins = pins::fetch_pins(&conn, &user.id, &trip_id)?;
    let collaborators = trips::list_collaborators(&conn, &user.id, &trip_id)?;

    ok(TripDetail {
        trip: trip.into(),
        role,
        pins,
        collaborators,
    })
}

/// PATCH /api/trips/:trip_id
async fn update_trip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
    Json(body): Json<TripUpdate>,
) -> ApiResult<TripSummary> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    let trip = trips::update_trip(&conn, &user.id, &trip_id, &body)?;
    ok(trip.into())
}

/// DELETE /api/trips/:trip_id - Owner only; pins and invitations cascade
async fn delete_trip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    trips::delete_trip(&conn, &user.id, &trip_id)?;
    ok(())
}

/// GET /api/trips/:trip_id/pins - Ordered by `order`
async fn list_pins(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
) -> ApiResult<Vec<Pin>> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    ok(pins::fetch_pins(&conn, &user.id, &trip_id)?)
}

/// POST /api/trips/:trip_id/pins - Appends at the end
async fn create_pin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
    Json(body): Json<NewPin>,
) -> Result<(StatusCode, Json<ApiResponse<Pin>>), ApiError> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    let pin = pins::create_pin(&conn, &user.id, &trip_id, &body)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(pin))))
}

/// A pin saved from a place search, with where the map should move.
#[derive(Debug, Serialize)]
pub struct PlacedPin {
    pub pin: Pin,
    pub center: LatLng,
    pub zoom: Option<u8>,
}

/// POST /api/trips/:trip_id/pins/place - Saves an autocomplete selection
async fn create_pin_from_place(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
    Json(body): Json<PlaceSelection>,
) -> Result<(StatusCode, Json<ApiResponse<PlacedPin>>), ApiError> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    let draft = body.into_draft();
    let pin = pins::create_pin(&conn, &user.id, &trip_id, &draft.pin)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(PlacedPin {
            pin,
            center: draft.center,
            zoom: draft.zoom,
        })),
    ))
}

/// PATCH /api/trips/:trip_id/pins/bulk - Sequential; stops at first failure
async fn bulk_update_pins(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
    Json(body): Json<BulkEditRequest>,
) -> ApiResult<Vec<Pin>> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    pins::bulk_update_pins(&conn, &user.id, &trip_id, &body.pins)?;
    ok(pins::fetch_pins(&conn, &user.id, &trip_id)?)
}

/// POST /api/trips/:trip_id/pins/reorder - Atomic move, returns the new sequence
async fn reorder_pins(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
    Json(body): Json<ReorderRequest>,
) -> ApiResult<Vec<Pin>> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;

    let moved = pins::get_pin(&conn, &user.id, &body.moved_pin_id)?;
    if moved.trip_id != trip_id {
        return Err(ApiError::BadRequest(format!(
            "pin {} does not belong to trip {}",
            moved.id, trip_id
        )));
    }
    ok(pins::reorder_pin(&conn, &user.id, &moved.id, body.new_order_index)?)
}

/// PATCH /api/pins/:pin_id - Edit details and/or write `order`
async fn update_pin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pin_id): Path<String>,
    Json(body): Json<PinPatch>,
) -> ApiResult<Pin> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;

    if body.order.is_none() && !body.has_details() {
        return Err(ApiError::BadRequest("nothing to update".to_string()));
    }
    if body.has_details() {
        let pin = pins::get_pin(&conn, &user.id, &pin_id)?;
        pins::update_pin_details(&conn, &user.id, &pin_id, &body.merge(&pin))?;
    }
    if let Some(order) = body.order {
        pins::update_pin_order(&conn, &user.id, &pin_id, order)?;
    }
    ok(pins::get_pin(&conn, &user.id, &pin_id)?)
}

/// DELETE /api/pins/:pin_id - Closes the gap in the sequence
async fn delete_pin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pin_id): Path<String>,
) -> ApiResult<()> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    pins::delete_pin(&conn, &user.id, &pin_id)?;
    ok(())
}

/// GET /api/trips/:trip_id/markers - Map markers and fitted viewport
async fn get_markers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
) -> ApiResult<MarkersResponse> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;
    let pins = pins::fetch_pins(&conn, &user.id, &trip_id)?;

    ok(MarkersResponse {
        markers: map::markers(&pins),
        viewport: map::fit_viewport(&pins),
    })
}

/// POST /api/trips/:trip_id/invitations - Returns token and share link
async fn create_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trip_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<InvitationResponse>>), ApiError> {
    let conn = state.conn()?;
    let user = current_user(&conn, &headers)?;

    let ticket = invitations::create_invitation(&conn, &user.id, &trip_id, state.config.invite_ttl())?;
    let link = invitations::share_link(&state.config.site_url, &ticket.token);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(InvitationResponse { ticket, link })),
    ))
}

/// GET /api/invitations/:token/validate - No session needed
async fn validate_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<InvitationPreview> {
    let conn = state.conn()?;
    ok(invitations::validate_invitation(&conn, &token, Utc::now())?)
}

/// POST /api/invitations/:token/accept - Bearer id may not have a user row yet
async fn accept_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
    body: Option<Json<AcceptRequest>>,
) -> ApiResult<TripSummary> {
    let user_id = bearer(&headers).ok_or(StoreError::Unauthenticated)?;
    let Json(body) = body.unwrap_or_default();
    let conn = state.conn()?;

    let trip = invitations::accept_invitation(&conn, &token, user_id, body.email.as_deref(), Utc::now())?;
    ok(trip.into())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/session", post(start_session))
        .route("/trips", get(list_trips).post(create_trip))
        .route(
            "/trips/:trip_id",
            get(get_trip).patch(update_trip).delete(delete_trip),
        )
        .route("/trips/:trip_id/pins", get(list_pins).post(create_pin))
        .route("/trips/:trip_id/pins/place", post(create_pin_from_place))
        .route("/trips/:trip_id/pins/bulk", patch(bulk_update_pins))
        .route("/trips/:trip_id/pins/reorder", post(reorder_pins))
        .route("/trips/:trip_id/markers", get(get_markers))
        .route("/trips/:trip_id/invitations", post(create_invitation))
        .route("/pins/:pin_id", patch(update_pin).delete(delete_pin))
        .route("/invitations/:token/validate", get(validate_invitation))
        .route("/invitations/:token/accept", post(accept_invitation))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
