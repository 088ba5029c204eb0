use async_trait::async_trait;
use pc_core::{Caller, ChatCredentials, CredentialsUpdate, Row};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{CredentialStore, PcError, ProfileAiSettings, Result, SearchBackend, SearchSource};

/// In-process backend for local runs and tests.
///
/// Search returns the seeded rows for a source in insertion order, capped at
/// the requested limit; ranking is left to the real backend.
#[derive(Default)]
pub struct MemoryBackend {
    rows: RwLock<HashMap<SearchSource, Vec<Row>>>,
    failing: RwLock<HashSet<SearchSource>>,
    profiles: RwLock<HashMap<Uuid, ProfileAiSettings>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, source: SearchSource, rows: Vec<Row>) {
        self.rows.write().await.entry(source).or_default().extend(rows);
    }

    /// Makes every search against `source` fail with a backend error.
    pub async fn fail_source(&self, source: SearchSource) {
        self.failing.write().await.insert(source);
    }

    pub async fn put_profile(&self, user_id: Uuid, profile: ProfileAiSettings) {
        self.profiles.write().await.insert(user_id, profile);
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn search(
        &self,
        _caller: &Caller,
        source: SearchSource,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Row>> {
        if self.failing.read().await.contains(&source) {
            return Err(PcError::Backend {
                operation: source.rpc_name().to_string(),
                message: "simulated failure".to_string(),
            });
        }
        let rows: Vec<Row> = self
            .rows
            .read()
            .await
            .get(&source)
            .map(|rows| rows.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default();
        debug!(rpc = source.rpc_name(), query, rows = rows.len(), "memory search");
        Ok(rows)
    }
}

#[async_trait]
impl CredentialStore for MemoryBackend {
    async fn load_credentials(&self, caller: &Caller) -> Result<Option<ChatCredentials>> {
        Ok(self
            .profiles
            .read()
            .await
            .get(&caller.user_id)
            .cloned()
            .map(ChatCredentials::from))
    }

    async fn save_credentials(
        &self,
        caller: &Caller,
        update: &CredentialsUpdate,
    ) -> Result<ChatCredentials> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&caller.user_id)
            .ok_or_else(|| PcError::NotFound {
                resource: format!("profile {}", caller.user_id),
            })?;
        profile.apply(update);
        Ok(profile.clone().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caller() -> Caller {
        Caller {
            user_id: Uuid::new_v4(),
            access_token: "t".into(),
        }
    }

    #[tokio::test]
    async fn test_search_caps_at_limit() {
        let backend = MemoryBackend::new();
        let rows = (0..7)
            .map(|i| json!({ "id": i }).as_object().cloned().unwrap())
            .collect();
        backend.seed(SearchSource::Expenses, rows).await;

        let got = backend
            .search(&caller(), SearchSource::Expenses, "q", 5)
            .await
            .unwrap();
        assert_eq!(got.len(), 5);
        assert_eq!(got[0]["id"], 0);

        backend.fail_source(SearchSource::Expenses).await;
        assert!(backend
            .search(&caller(), SearchSource::Expenses, "q", 5)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_save_requires_profile() {
        let backend = MemoryBackend::new();
        let c = caller();
        let update = CredentialsUpdate {
            api_key: Some("sk".into()),
            ..Default::default()
        };
        assert!(matches!(
            backend.save_credentials(&c, &update).await,
            Err(PcError::NotFound { .. })
        ));

        backend.put_profile(c.user_id, ProfileAiSettings::default()).await;
        let creds = backend.save_credentials(&c, &update).await.unwrap();
        assert_eq!(creds.api_key, "sk");
        assert_eq!(
            backend.load_credentials(&c).await.unwrap().unwrap().api_key,
            "sk"
        );
    }
}
