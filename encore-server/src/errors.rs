use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use encore_collab::{AuthError, CatalogError, DatabaseError, QueueError, RoomError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Missing or invalid authorization")]
    Unauthorized,
    #[error("Only the host of the room may do this")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Transition is not allowed from the current status")]
    InvalidTransition,
    #[error("All room codes are currently in use")]
    CapacityExhausted,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("An account with that username already exists")]
    AlreadyRegistered,
    #[error("Catalog provider is unavailable")]
    UpstreamUnavailable,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition => StatusCode::CONFLICT,
            Self::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidCredentials => StatusCode::BAD_REQUEST,
            Self::AlreadyRegistered => StatusCode::CONFLICT,
            Self::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::NotFound => Self::NotFound("room"),
            RoomError::Forbidden => Self::Forbidden,
            RoomError::CapacityExhausted => Self::CapacityExhausted,
            RoomError::Db(e) => Self::Unknown(e.to_string()),
        }
    }
}

impl From<QueueError> for ServerError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::NotFound => Self::NotFound("song or room"),
            QueueError::Forbidden => Self::Forbidden,
            QueueError::InvalidTransition => Self::InvalidTransition,
            QueueError::Db(e) => Self::Unknown(e.to_string()),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::AlreadyRegistered => Self::AlreadyRegistered,
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<CatalogError> for ServerError {
    fn from(_: CatalogError) -> Self {
        Self::UpstreamUnavailable
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => Self::NotFound(resource),
            e => Self::Unknown(e.to_string()),
        }
    }
}
