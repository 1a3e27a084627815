//! Mapping of panel errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::dispatch::DispatchError;
use crate::history::LogError;
use crate::mechanism::RegistryError;
use crate::panel::PanelError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Panel(#[from] PanelError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidRequest(String),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Panel(PanelError::Dispatch(e)) => match e {
                DispatchError::Busy(_) => (StatusCode::CONFLICT, "busy"),
                DispatchError::Rejected { .. } => (StatusCode::BAD_GATEWAY, "rejected"),
                DispatchError::Registry(RegistryError::TransitionInProgress(_)) => {
                    (StatusCode::CONFLICT, "transition_in_progress")
                }
                DispatchError::Registry(RegistryError::InvalidTransition { .. }) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition")
                }
                DispatchError::Registry(RegistryError::UnknownHandle(_)) => {
                    (StatusCode::NOT_FOUND, "unknown_handle")
                }
            },
            ApiError::Panel(PanelError::Log(e)) => match e {
                LogError::RunAlreadyInProgress(_) => (StatusCode::CONFLICT, "run_already_in_progress"),
                LogError::NotInProgress(_) => (StatusCode::UNPROCESSABLE_ENTITY, "not_in_progress"),
                LogError::AlreadyTerminal(_) => (StatusCode::UNPROCESSABLE_ENTITY, "already_terminal"),
                LogError::InvalidStatus(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_status"),
                LogError::UnknownRun(_) => (StatusCode::NOT_FOUND, "unknown_run"),
            },
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::InvalidRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
