//! REST API for rooms and messages.
//!
//! Every response, success or failure, is wrapped in [`ApiResponse`].

use crate::handlers::AppState;
use crate::metrics;
use crate::names::generate_room_name;
use crate::store::{Message, NewMessage, Room, StoreError};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roomcast_core::HubHandle;
use roomcast_protocol::Envelope;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Response envelope shared by all API routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub status: u16,
    pub message: String,
}

/// Successful handler output.
pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn respond<T>(status: StatusCode, message: &str, data: T) -> ApiResult<T> {
    Ok((
        status,
        Json(ApiResponse {
            data: Some(data),
            error: None,
            status: status.as_u16(),
            message: message.to_string(),
        }),
    ))
}

/// An API failure, rendered as an [`ApiResponse`] without data.
#[derive(Debug, Error)]
#[error("{message}: {error}")]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    error: String,
}

impl ApiError {
    fn new(status: StatusCode, message: &'static str, error: impl ToString) -> Self {
        Self {
            status,
            message,
            error: error.to_string(),
        }
    }

    fn bad_request(message: &'static str, error: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, error)
    }

    fn from_store(message: &'static str, err: StoreError) -> Self {
        let status = match err {
            StoreError::RoomNotFound | StoreError::MessagesNotFound => StatusCode::NOT_FOUND,
            StoreError::InvalidId(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, message, err)
    }

    /// HTTP status of this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse::<()> {
            data: None,
            error: Some(self.error),
            status: status.as_u16(),
            message: self.message.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Body of `POST /api/room`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `PATCH /api/room/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Live connection count of a room.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomConnections {
    pub room_id: String,
    pub connections: usize,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `POST /api/room`
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> ApiResult<Room> {
    let Json(request) = body.map_err(|e| ApiError::bad_request("Invalid Request Body", e))?;
    let name = non_blank(request.name).unwrap_or_else(generate_room_name);

    let room = state
        .store
        .create_room(name)
        .await
        .map_err(|e| ApiError::from_store("Failed to create Room", e))?;

    debug!(room = %room.id, name = %room.name, "Room created");
    respond(StatusCode::CREATED, "Room Created", room)
}

/// `GET /api/room/{id}`
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Room> {
    if id.trim().is_empty() {
        return Err(ApiError::bad_request("Room ID is required", "empty room ID"));
    }

    let room = state
        .store
        .get_room(&id)
        .await
        .map_err(|e| ApiError::from_store("Room Not Found", e))?;

    respond(StatusCode::OK, "Room Found", room)
}

/// `PATCH /api/room/{id}`
pub async fn update_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateRoomRequest>, JsonRejection>,
) -> ApiResult<Room> {
    let Json(request) = body.map_err(|e| ApiError::bad_request("Invalid Request Body", e))?;
    let name = non_blank(request.name)
        .ok_or_else(|| ApiError::bad_request("Invalid Request Body", "name is required"))?;

    let room = state
        .store
        .update_room_name(&id, name)
        .await
        .map_err(|e| ApiError::from_store("Failed to update Room", e))?;

    respond(StatusCode::OK, "Room Updated", room)
}

/// `POST /api/message`
///
/// The message is stored first, then pushed to the room's live connections.
/// A failed broadcast is logged and does not fail the request.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewMessage>, JsonRejection>,
) -> ApiResult<Message> {
    let Json(request) = body.map_err(|e| ApiError::bad_request("Invalid Request Body", e))?;
    if request.body.trim().is_empty() || request.room_id.trim().is_empty() {
        return Err(ApiError::bad_request(
            "Invalid Request Body",
            "body and room_id are required",
        ));
    }

    let message = state.store.post_message(request).await.map_err(|e| {
        metrics::record_error("store");
        ApiError::from_store("Failed to post Message", e)
    })?;

    metrics::record_message_posted();
    broadcast_new_message(&state.hub, &message);

    respond(StatusCode::OK, "Message Posted.", message)
}

/// Push a stored message to every connection in its room.
pub fn broadcast_new_message(hub: &HubHandle, message: &Message) {
    let envelope = Envelope::new_message(message);
    if let Err(e) = hub.broadcast_to_room(&message.room_id, &envelope) {
        metrics::record_error("broadcast");
        error!(room = %message.room_id, error = %e, "Failed to broadcast message");
    }
}

/// `GET /api/message/{room_id}`
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<Vec<Message>> {
    let messages = state
        .store
        .messages_for_room(&room_id)
        .await
        .map_err(|e| ApiError::from_store("No Room Found with given id.", e))?;

    respond(StatusCode::OK, "Messages Found", messages)
}

/// `GET /api/room/{id}/connections`
pub async fn room_connections(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<RoomConnections> {
    let connections = state.hub.connection_count(&room_id);
    respond(
        StatusCode::OK,
        "Connections Found",
        RoomConnections {
            room_id,
            connections,
        },
    )
}
