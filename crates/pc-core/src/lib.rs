use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One backend row as returned by a search RPC. Keys are unordered.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The authenticated identity a request runs on behalf of.
///
/// `access_token` is forwarded to the backend so its row-level policies apply.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub access_token: String,
}

/// Full-text search results for one query, grouped by category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchBundle {
    pub notes: Vec<Row>,
    pub claims: Vec<Row>,
    pub expenses: Vec<Row>,
    pub payments: Vec<Row>,
    pub attachments: Vec<Row>,
}

impl SearchBundle {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
            && self.claims.is_empty()
            && self.expenses.is_empty()
            && self.payments.is_empty()
            && self.attachments.is_empty()
    }

    pub fn counts(&self) -> SourceCounts {
        SourceCounts {
            notes: self.notes.len(),
            claims: self.claims.len(),
            expenses: self.expenses.len(),
            payments: self.payments.len(),
            attachments: self.attachments.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub notes: usize,
    pub claims: usize,
    pub expenses: usize,
    pub payments: usize,
    pub attachments: usize,
}

impl SourceCounts {
    pub fn total(&self) -> usize {
        self.notes + self.claims + self.expenses + self.payments + self.attachments
    }
}

/// Per-user chat-completion settings stored on the profile row.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ChatCredentials {
    pub api_key: String,
    pub endpoint_url: Option<String>,
    pub model: Option<String>,
}

impl ChatCredentials {
    /// Last four characters of the key behind a mask, e.g. `****abcd`.
    pub fn masked_key(&self) -> String {
        let tail: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<String>()
            .chars()
            .rev()
            .collect();
        format!("****{}", tail)
    }
}

// keys stay out of logs
impl std::fmt::Debug for ChatCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCredentials")
            .field("api_key", &self.masked_key())
            .field("endpoint_url", &self.endpoint_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Partial update of stored credentials. `Some("")` clears an optional override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsUpdate {
    pub api_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub sources: SourceCounts,
}

// ===== HTTP DTOs =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub sources: SourceCounts,
    /// `content` with citation tags rewritten into application links.
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigView {
    pub configured: bool,
    pub api_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub model: Option<String>,
}

impl ConfigView {
    pub fn from_credentials(creds: Option<&ChatCredentials>) -> Self {
        match creds {
            Some(c) if !c.api_key.trim().is_empty() => Self {
                configured: true,
                api_key: Some(c.masked_key()),
                endpoint_url: c.endpoint_url.clone(),
                model: c.model.clone(),
            },
            Some(c) => Self {
                configured: false,
                api_key: None,
                endpoint_url: c.endpoint_url.clone(),
                model: c.model.clone(),
            },
            None => Self {
                configured: false,
                api_key: None,
                endpoint_url: None,
                model: None,
            },
        }
    }
}

pub use pc_error::{PcError as Error, Result};
