// Handlers module - API endpoint handlers

pub mod chat;
pub mod models;


pub use chat::handle_chat_completions;
pub use models::handle_list_models;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use modelmux_types::ProxyError;

/// `{error:{message,type,code?}}` with the error's own status.
pub fn error_response(err: &ProxyError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_envelope())).into_response()
}
