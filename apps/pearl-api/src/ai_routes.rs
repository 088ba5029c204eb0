use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use pc_assistant::linkify;
use pc_auth::AuthContext;
use pc_backend::CredentialStore;
use pc_core::{ChatRequest, ChatResponse, ConfigView, CredentialsUpdate};
use pc_error::{ErrorMetadataBuilder, PcError, Result};
use tracing::instrument;
use url::Url;

use crate::AppState;

/// Routes mounted under `/api/ai`; every one expects an [`AuthContext`].
pub fn create_ai_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/config", get(get_config).put(put_config))
}

fn report(err: PcError, auth: &AuthContext, operation: &str) -> PcError {
    let metadata = ErrorMetadataBuilder::new("pearl-api")
        .operation(operation)
        .user_id(&auth.user_id.to_string())
        .build(&err);
    err.log(&metadata);
    err
}

fn bad_body(rejection: JsonRejection) -> PcError {
    PcError::Validation {
        message: format!("Invalid request body: {}", rejection.body_text()),
    }
}

#[instrument(skip_all, fields(user_id = %auth.user_id))]
async fn chat(
    State(state): State<AppState>,
    auth: AuthContext,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(req) = payload.map_err(bad_body)?;
    let answer = state
        .assistant
        .chat(&auth.caller(), req.query.as_deref())
        .await
        .map_err(|e| report(e, &auth, "chat"))?;

    let rendered = linkify(&answer.content);
    Ok(Json(ChatResponse {
        content: answer.content,
        sources: answer.sources,
        rendered,
    }))
}

async fn get_config(State(state): State<AppState>, auth: AuthContext) -> Result<Json<ConfigView>> {
    let creds = state
        .credentials
        .load_credentials(&auth.caller())
        .await
        .map_err(|e| report(e, &auth, "get_config"))?;
    Ok(Json(ConfigView::from_credentials(creds.as_ref())))
}

#[instrument(skip_all, fields(user_id = %auth.user_id))]
async fn put_config(
    State(state): State<AppState>,
    auth: AuthContext,
    payload: std::result::Result<Json<CredentialsUpdate>, JsonRejection>,
) -> Result<Json<ConfigView>> {
    let Json(update) = payload.map_err(bad_body)?;
    let caller = auth.caller();

    validate_endpoint(update.endpoint_url.as_deref())?;
    if update.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        let stored = state
            .credentials
            .load_credentials(&caller)
            .await
            .map_err(|e| report(e, &auth, "put_config"))?;
        if stored.map_or(true, |c| c.api_key.trim().is_empty()) {
            return Err(PcError::Validation {
                message: "API key is required".to_string(),
            });
        }
    }

    let saved = state
        .credentials
        .save_credentials(&caller, &update)
        .await
        .map_err(|e| report(e, &auth, "put_config"))?;
    Ok(Json(ConfigView::from_credentials(Some(&saved))))
}

/// Blank clears the override; anything else must be an absolute http(s) URL.
fn validate_endpoint(endpoint: Option<&str>) -> Result<()> {
    let Some(raw) = endpoint.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PcError::Validation {
            message: format!("Unsupported endpoint scheme: {other}"),
        }),
    }
}
