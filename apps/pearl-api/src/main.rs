use axum::{middleware, routing::get, Json, Router};

mod ai_routes;
mod config;

use dotenv::dotenv;
use pc_assistant::AssistantService;
use pc_auth::{audit_middleware, AuthMiddleware, JwtService};
use pc_backend::{BackendConfig, CredentialStore, RestBackend};
use pc_llm::OpenAiCompatFactory;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{auth::AsyncRequireAuthorizationLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::{load_config, read_env};

#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<AssistantService>,
    pub credentials: Arc<dyn CredentialStore>,
    pub jwt: Arc<JwtService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv().ok();

    let cfg = load_config()?;

    let backend = Arc::new(RestBackend::new(BackendConfig {
        url: read_env(&cfg.backend.url_env)?,
        anon_key: read_env(&cfg.backend.anon_key_env)?,
        request_timeout: Duration::from_secs(cfg.backend.request_timeout_secs),
    })?);
    let chat_models = Arc::new(OpenAiCompatFactory::new(cfg.assistant.chat_defaults())?);
    let jwt = Arc::new(JwtService::new(
        &read_env(&cfg.auth.jwt_secret_env)?,
        &cfg.auth.audience,
    ));

    let assistant = Arc::new(AssistantService::new(
        backend.clone(),
        backend.clone(),
        chat_models,
        cfg.assistant.rate_limit.policy(),
    ));
    let state = AppState {
        assistant,
        credentials: backend,
        jwt,
    };

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    let ai = ai_routes::create_ai_routes()
        .layer(middleware::from_fn(audit_middleware))
        .layer(AsyncRequireAuthorizationLayer::new(AuthMiddleware::new(
            state.jwt.clone(),
        )));

    Router::new()
        .route("/api/v1/health", get(health))
        .nest("/api/ai", ai)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,tower_http=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
