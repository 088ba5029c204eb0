use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

#[cfg(feature = "axum")]
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};

/// Unified error type for the assistant service.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum PcError {
    // === request errors ===
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("rate limit exceeded: {limit} requests per {window_ms}ms")]
    RateLimited {
        limit: usize,
        window_ms: u64,
        #[serde(skip)]
        retry_after: Option<Duration>,
    },

    #[error("credentials not configured: {key}")]
    CredentialsMissing { key: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    // === upstream errors ===
    #[error("{provider} rejected the configured API key: {message}")]
    UpstreamAuthentication { provider: String, message: String },

    #[error("{provider} is rate limiting requests")]
    UpstreamRateLimited {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<Duration>,
    },

    #[error("LLM service error ({provider}): {message}")]
    LlmService { provider: String, message: String },

    #[error("backend error: {operation} failed: {message}")]
    Backend { operation: String, message: String },

    #[error("network error: {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // === system errors ===
    #[error("configuration error: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("serialization error ({format}): {message}")]
    Serialization { format: String, message: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

/// Error severity, drives the log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,      // expected caller errors
    Medium,   // upstream or transient failures
    High,     // failures in our own integration code
    Critical, // misconfiguration
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub error_id: String,
    pub severity: ErrorSeverity,
    pub component: String,
    pub operation: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub context: std::collections::HashMap<String, String>,
}

impl PcError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PcError::Authentication { .. }
            | PcError::RateLimited { .. }
            | PcError::CredentialsMissing { .. }
            | PcError::Validation { .. }
            | PcError::NotFound { .. } => ErrorSeverity::Low,
            PcError::UpstreamAuthentication { .. }
            | PcError::UpstreamRateLimited { .. }
            | PcError::LlmService { .. }
            | PcError::Network { .. }
            | PcError::Timeout { .. } => ErrorSeverity::Medium,
            PcError::Backend { .. } | PcError::Serialization { .. } => ErrorSeverity::High,
            PcError::Internal { .. } | PcError::Configuration { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether a caller could reasonably try again later. The service itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            PcError::RateLimited { .. } | PcError::UpstreamRateLimited { .. } => true,
            PcError::Network { .. } | PcError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PcError::RateLimited { retry_after, .. }
            | PcError::UpstreamRateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn log(&self, metadata: &ErrorMetadata) {
        match metadata.severity {
            ErrorSeverity::Low => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    user_id = ?metadata.user_id,
                    request_id = ?metadata.request_id,
                    error = %self,
                    "request rejected"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    user_id = ?metadata.user_id,
                    request_id = ?metadata.request_id,
                    error = %self,
                    context = ?metadata.context,
                    "upstream failure"
                );
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    user_id = ?metadata.user_id,
                    request_id = ?metadata.request_id,
                    error = %self,
                    context = ?metadata.context,
                    severity = ?metadata.severity,
                    "service error"
                );
            }
        }
    }

    pub fn to_http_status(&self) -> u16 {
        match self {
            PcError::Authentication { .. } => 401,
            PcError::RateLimited { .. } => 429,
            PcError::CredentialsMissing { .. } => 400,
            PcError::Validation { .. } => 400,
            PcError::NotFound { .. } => 404,
            PcError::UpstreamAuthentication { .. } => 401,
            PcError::UpstreamRateLimited { .. } => 429,
            PcError::LlmService { .. } | PcError::Backend { .. } | PcError::Network { .. } => 502,
            PcError::Timeout { .. } => 504,
            PcError::Configuration { .. }
            | PcError::Serialization { .. }
            | PcError::Internal { .. } => 500,
        }
    }

    /// Message safe to show to the end user.
    pub fn user_message(&self) -> String {
        match self {
            PcError::Authentication { .. } => "Unauthorized".to_string(),
            PcError::RateLimited { .. } => {
                "Too many requests. Please wait a moment before trying again.".to_string()
            }
            PcError::CredentialsMissing { .. } => {
                "AI assistant is not configured. Please add your API key in settings.".to_string()
            }
            PcError::Validation { message } => message.clone(),
            PcError::NotFound { .. } => "The requested resource does not exist".to_string(),
            PcError::UpstreamAuthentication { .. } => {
                "Invalid API key. Please check your AI settings.".to_string()
            }
            PcError::UpstreamRateLimited { .. } => {
                "The AI provider is rate limiting requests. Please try again later.".to_string()
            }
            PcError::LlmService { message, .. } => format!("Failed to get AI response: {message}"),
            PcError::Timeout { .. } => "The request timed out, please try again".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

pub struct ErrorMetadataBuilder {
    metadata: ErrorMetadata,
}

impl ErrorMetadataBuilder {
    pub fn new(component: &str) -> Self {
        Self {
            metadata: ErrorMetadata {
                error_id: uuid::Uuid::new_v4().to_string(),
                severity: ErrorSeverity::Medium,
                component: component.to_string(),
                operation: None,
                user_id: None,
                request_id: None,
                timestamp: chrono::Utc::now(),
                context: std::collections::HashMap::new(),
            },
        }
    }

    pub fn operation(mut self, operation: &str) -> Self {
        self.metadata.operation = Some(operation.to_string());
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.metadata.user_id = Some(user_id.to_string());
        self
    }

    pub fn request_id(mut self, request_id: &str) -> Self {
        self.metadata.request_id = Some(request_id.to_string());
        self
    }

    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .context
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(mut self, error: &PcError) -> ErrorMetadata {
        self.metadata.severity = error.severity();
        self.metadata
    }
}

pub type Result<T> = std::result::Result<T, PcError>;

// === conversions ===

impl From<serde_json::Error> for PcError {
    fn from(err: serde_json::Error) -> Self {
        PcError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PcError::Timeout {
                operation: "http_request".to_string(),
                timeout_ms: 30000,
            }
        } else if err.is_connect() {
            PcError::Network {
                operation: "connect".to_string(),
                message: err.to_string(),
            }
        } else {
            PcError::Network {
                operation: "http_request".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<uuid::Error> for PcError {
    fn from(err: uuid::Error) -> Self {
        PcError::Serialization {
            format: "uuid".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for PcError {
    fn from(err: url::ParseError) -> Self {
        PcError::Validation {
            message: format!("invalid URL: {err}"),
        }
    }
}

impl From<tokio::task::JoinError> for PcError {
    fn from(err: tokio::task::JoinError) -> Self {
        PcError::Internal {
            message: "task join failed".to_string(),
            details: Some(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for PcError {
    fn from(err: anyhow::Error) -> Self {
        PcError::Internal {
            message: err.to_string(),
            details: None,
        }
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for PcError {
    fn into_response(self) -> axum::response::Response {
        let status_code = StatusCode::from_u16(self.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "error": self.to_string(),
            "message": self.user_message()
        });

        let mut response = (status_code, Json(body)).into_response();
        if let Some(after) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
