//! The poll endpoint.
//!
//! `POST /v1/poll` carries the poll envelope and holds the response open
//! for at most the request's wait budget. Rejections are returned as the
//! platform's coded payloads; the HTTP status mirrors the code class.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;

use dmp_proto::{
    PollRequest, Rejection, RejectionKind, CODE_MALFORMED_REQUEST, CODE_STORE_ACTIONS,
    CODE_STORE_APPLICATIONS, CODE_STORE_DEVICES,
};

use crate::state::AppState;

/// Create poll routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/poll", post(poll))
}

async fn poll(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    // Deserialize by hand so a malformed envelope still gets the coded
    // rejection payload rather than axum's plain-text 400/422.
    let request: PollRequest = match body {
        Ok(Json(value)) => match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return RejectionResponse(Rejection::error(CODE_MALFORMED_REQUEST, e.to_string()))
                    .into_response()
            }
        },
        Err(e) => {
            return RejectionResponse(Rejection::error(CODE_MALFORMED_REQUEST, e.body_text()))
                .into_response()
        }
    };

    match state.handler().handle(request).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(rejection) => RejectionResponse(rejection).into_response(),
    }
}

/// Maps a rejection to an HTTP response carrying the coded payload.
struct RejectionResponse(Rejection);

impl IntoResponse for RejectionResponse {
    fn into_response(self) -> Response {
        let status = match (self.0.kind, self.0.error_code) {
            (_, CODE_STORE_DEVICES | CODE_STORE_APPLICATIONS | CODE_STORE_ACTIONS) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            (_, CODE_MALFORMED_REQUEST) => StatusCode::BAD_REQUEST,
            (RejectionKind::Warning, _) => StatusCode::NOT_FOUND,
            (RejectionKind::Error, _) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(self.0)).into_response()
    }
}
