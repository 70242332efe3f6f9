//! HTTP transport.
//!
//! Three form-encoded callback routes plus a health probe. All decision
//! logic lives in [`crate::webhooks`]; this layer parses, answers, and
//! maps errors onto statuses.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info_span};
use uuid::Uuid;

use crate::conversations::ConversationsClient;
use crate::crm::CrmStore;
use crate::error::Error;
use crate::webhooks::customers::{self, CustomerRequest};
use crate::webhooks::dispatch::{EventDispatcher, EventOutcome};
use crate::webhooks::events::ConversationWebhook;
use crate::webhooks::routing::{self, RoutingRequest};

/// Shared handles for the route handlers.
#[derive(Clone)]
pub struct AppState {
    crm: Arc<dyn CrmStore>,
    conversations: Arc<dyn ConversationsClient>,
    dispatcher: Arc<EventDispatcher>,
}

/// Build the bridge router over the two collaborators.
pub fn app(crm: Arc<dyn CrmStore>, conversations: Arc<dyn ConversationsClient>) -> Router {
    let dispatcher = Arc::new(EventDispatcher::new(crm.clone(), conversations.clone()));
    let state = AppState {
        crm,
        conversations,
        dispatcher,
    };

    Router::new()
        .route("/health", get(health))
        .route("/callbacks/conversations", post(conversations_webhook))
        .route("/callbacks/routing", post(routing_webhook))
        .route("/callbacks/crm", post(crm_webhook))
        .layer(
            TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<axum::body::Body>| {
                    info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %Uuid::new_v4(),
                    )
                },
            ),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn conversations_webhook(
    State(state): State<AppState>,
    Form(payload): Form<ConversationWebhook>,
) -> Result<Response, WebhookFailure> {
    let outcome = state.dispatcher.handle_webhook(payload).await?;
    Ok(match outcome {
        EventOutcome::Properties(properties) => Json(properties).into_response(),
        EventOutcome::Acknowledged => Json("success").into_response(),
        EventOutcome::Ignored => Json(serde_json::Value::Null).into_response(),
    })
}

async fn routing_webhook(
    State(state): State<AppState>,
    Form(request): Form<RoutingRequest>,
) -> Result<Response, WebhookFailure> {
    let decision = routing::handle_routing_request(
        state.crm.as_ref(),
        state.conversations.as_ref(),
        request,
    )
    .await?;
    Ok(Json(decision).into_response())
}

async fn crm_webhook(
    State(state): State<AppState>,
    Form(request): Form<CustomerRequest>,
) -> Result<Response, WebhookFailure> {
    let response = customers::handle_customer_request(state.crm.as_ref(), request).await?;
    Ok(Json(response).into_response())
}

/// Transport wrapper that turns core errors into JSON error responses.
struct WebhookFailure(Error);

impl From<Error> for WebhookFailure {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for WebhookFailure {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error!(status = status.as_u16(), error = %self.0, "Callback handling failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
