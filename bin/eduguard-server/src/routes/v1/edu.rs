use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use eduguard_core::{ChatKey, ChatStore, ReplyRequest, ReplyResponse};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::middleware::auth::Caller;
use crate::schemas::v1::edu::{CallableRequest, CallableResponse, MessageResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(reply, list_chat_messages),
    components(schemas(
        CallableRequest,
        CallableResponse,
        ReplyRequest,
        ReplyResponse,
        MessageResponse
    ))
)]
pub struct EduApi;

/// Register educational-assistant routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/edu/reply", post(reply))
        .route("/edu/chats/{chat_id}/messages", get(list_chat_messages))
}

/// Moderate one message and reply.
///
/// Every pipeline outcome, refusals included, is a 200 with a `result`
/// payload; only a body that is not a JSON envelope is rejected.
#[utoipa::path(
    post,
    path = "/v1/edu/reply",
    tag = "edu",
    request_body = CallableRequest,
    responses(
        (status = 200, description = "Reply or canned refusal", body = CallableResponse),
        (status = 400, description = "Body is not a callable envelope"),
    )
)]
pub async fn reply(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Result<Json<CallableRequest>, JsonRejection>,
) -> Result<Json<CallableResponse>, ServerError> {
    let Json(envelope) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let result = state
        .pipeline
        .handle(caller.user_id(), envelope.into_reply_request())
        .await;
    Ok(Json(CallableResponse { result }))
}

/// Full message log of one of the caller's chats, oldest first.
#[utoipa::path(
    get,
    path = "/v1/edu/chats/{chat_id}/messages",
    tag = "edu",
    params(("chat_id" = String, Path, description = "Client-chosen chat id")),
    responses(
        (status = 200, description = "Chat messages retrieved", body = Vec<MessageResponse>),
        (status = 401, description = "Caller not authenticated"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_chat_messages(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, ServerError> {
    let user_id = caller.user_id().ok_or(ServerError::Unauthorized)?;
    let messages = state
        .pipeline
        .store()
        .list_messages(&ChatKey::new(user_id, chat_id))
        .await?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}
