use pc_assistant::RateLimitPolicy;
use pc_llm::ChatDefaults;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_PATH_ENV: &str = "PEARL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerCfg,
    #[serde(default)]
    pub backend: BackendCfg,
    #[serde(default)]
    pub auth: AuthCfg,
    #[serde(default)]
    pub assistant: AssistantCfg,
}

#[derive(Debug, Deserialize)]
pub struct ServerCfg {
    pub host: String,
    pub port: u16,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Names of the env vars holding the backend coordinates, not the values.
#[derive(Debug, Deserialize)]
pub struct BackendCfg {
    pub url_env: String,
    pub anon_key_env: String,
    #[serde(default = "default_backend_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendCfg {
    fn default() -> Self {
        Self {
            url_env: "SUPABASE_URL".into(),
            anon_key_env: "SUPABASE_ANON_KEY".into(),
            request_timeout_secs: default_backend_timeout(),
        }
    }
}

fn default_backend_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct AuthCfg {
    pub jwt_secret_env: String,
    pub audience: String,
}

impl Default for AuthCfg {
    fn default() -> Self {
        Self {
            jwt_secret_env: "SUPABASE_JWT_SECRET".into(),
            audience: "authenticated".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssistantCfg {
    pub default_base_url: String,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub rate_limit: RateLimitCfg,
}

impl Default for AssistantCfg {
    fn default() -> Self {
        let d = ChatDefaults::default();
        Self {
            default_base_url: d.base_url,
            default_model: d.model,
            temperature: d.temperature,
            max_tokens: d.max_tokens,
            request_timeout_secs: d.request_timeout.as_secs(),
            rate_limit: RateLimitCfg::default(),
        }
    }
}

impl AssistantCfg {
    pub fn chat_defaults(&self) -> ChatDefaults {
        ChatDefaults {
            base_url: self.default_base_url.clone(),
            model: self.default_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RateLimitCfg {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl Default for RateLimitCfg {
    fn default() -> Self {
        let p = RateLimitPolicy::default();
        Self {
            max_requests: p.max_requests,
            window_ms: p.window.as_millis() as u64,
        }
    }
}

impl RateLimitCfg {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests: self.max_requests,
            window: Duration::from_millis(self.window_ms),
        }
    }
}

pub fn parse_config(s: &str) -> anyhow::Result<AppConfig> {
    Ok(serde_yaml::from_str(s)?)
}

/// Reads `$PEARL_CONFIG`, or `configs/default.yaml`. Only the default path may be absent.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let (path, explicit) = match std::env::var(CONFIG_PATH_ENV) {
        Ok(p) => (p, true),
        Err(_) => (DEFAULT_CONFIG_PATH.to_string(), false),
    };
    match std::fs::read_to_string(&path) {
        Ok(s) => {
            let cfg = parse_config(&s)?;
            info!(path = %path, "load_config: {:?}", cfg);
            Ok(cfg)
        }
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path, "config file not found; using built-in defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read config {}: {}", path, e)),
    }
}

pub fn read_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing env {}", key))
}
