pub mod memory;
pub mod rest;

use async_trait::async_trait;
use pc_core::{Caller, ChatCredentials, CredentialsUpdate, Row};
use serde::{Deserialize, Serialize};

pub use memory::MemoryBackend;
pub use rest::{BackendConfig, RestBackend};

pub use pc_error::{PcError, Result};

/// Full-text search RPCs exposed by the hosted backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Notes,
    Claims,
    /// Aged-care funding expenses.
    Expenses,
    /// Expenses recorded against a WorkCover claim.
    WorkcoverExpenses,
    Payments,
    Attachments,
}

impl SearchSource {
    pub const ALL: [SearchSource; 6] = [
        SearchSource::Notes,
        SearchSource::Claims,
        SearchSource::Expenses,
        SearchSource::WorkcoverExpenses,
        SearchSource::Payments,
        SearchSource::Attachments,
    ];

    pub fn rpc_name(&self) -> &'static str {
        match self {
            SearchSource::Notes => "search_notes",
            SearchSource::Claims => "search_claims",
            SearchSource::Expenses => "search_expenses",
            SearchSource::WorkcoverExpenses => "search_workcover_expenses",
            SearchSource::Payments => "search_payments",
            SearchSource::Attachments => "search_attachments",
        }
    }

    /// Per-call row cap. The two expense sources share the category's ten slots.
    pub fn default_limit(&self) -> u32 {
        match self {
            SearchSource::Expenses | SearchSource::WorkcoverExpenses => 5,
            _ => 10,
        }
    }
}

/// Body of every search RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchArgs<'a> {
    pub search_query: &'a str,
    pub limit_val: u32,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        caller: &Caller,
        source: SearchSource,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Row>>;
}

/// Reads and writes the AI settings stored on the caller's profile.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `None` when the caller has no profile row.
    async fn load_credentials(&self, caller: &Caller) -> Result<Option<ChatCredentials>>;

    async fn save_credentials(
        &self,
        caller: &Caller,
        update: &CredentialsUpdate,
    ) -> Result<ChatCredentials>;
}

/// Profile columns holding the AI settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileAiSettings {
    #[serde(default)]
    pub ai_api_key: Option<String>,
    #[serde(default)]
    pub ai_endpoint_url: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,
}

impl ProfileAiSettings {
    pub const SELECT: &'static str = "ai_api_key,ai_endpoint_url,ai_model";

    /// Applies an update; blank optional fields clear the override.
    pub fn apply(&mut self, update: &CredentialsUpdate) {
        fn blank_to_none(v: &str) -> Option<String> {
            let t = v.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        if let Some(key) = update.api_key.as_deref() {
            if let Some(key) = blank_to_none(key) {
                self.ai_api_key = Some(key);
            }
        }
        if let Some(url) = update.endpoint_url.as_deref() {
            self.ai_endpoint_url = blank_to_none(url);
        }
        if let Some(model) = update.model.as_deref() {
            self.ai_model = blank_to_none(model);
        }
    }
}

impl From<ProfileAiSettings> for ChatCredentials {
    fn from(p: ProfileAiSettings) -> Self {
        ChatCredentials {
            api_key: p.ai_api_key.unwrap_or_default(),
            endpoint_url: p.ai_endpoint_url,
            model: p.ai_model,
        }
    }
}
