use async_trait::async_trait;
use pc_core::{Caller, ChatCredentials, CredentialsUpdate, Row};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::{
    CredentialStore, PcError, ProfileAiSettings, Result, SearchArgs, SearchBackend, SearchSource,
};

/// Connection settings for the hosted backend's REST gateway.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// REST client for the hosted backend (PostgREST-style `/rest/v1` API).
///
/// Every call carries the project's anon key plus the caller's own access
/// token, so the backend's row-level policies decide what is visible.
#[derive(Clone)]
pub struct RestBackend {
    http: Client,
    cfg: BackendConfig,
}

impl RestBackend {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| PcError::Configuration {
                key: "backend.request_timeout_secs".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, cfg })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.cfg.url.trim_end_matches('/'), path)
    }

    fn authed(&self, rb: RequestBuilder, caller: &Caller) -> RequestBuilder {
        rb.header("apikey", &self.cfg.anon_key)
            .bearer_auth(&caller.access_token)
    }

    async fn read_rows(operation: &str, resp: Response) -> Result<Vec<Row>> {
        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(PcError::Backend {
                operation: operation.to_string(),
                message: format!("status={} body={}", status, txt),
            });
        }
        resp.json::<Vec<Row>>().await.map_err(|e| PcError::Backend {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    fn profile_filter(caller: &Caller) -> [(&'static str, String); 2] {
        [
            ("id", format!("eq.{}", caller.user_id)),
            ("select", ProfileAiSettings::SELECT.to_string()),
        ]
    }

    fn first_profile(rows: Vec<Row>) -> Result<Option<ProfileAiSettings>> {
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SearchBackend for RestBackend {
    #[instrument(skip(self, caller, query), fields(rpc = source.rpc_name()))]
    async fn search(
        &self,
        caller: &Caller,
        source: SearchSource,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Row>> {
        let operation = source.rpc_name();
        let args = SearchArgs {
            search_query: query,
            limit_val: limit,
        };
        let resp = self
            .authed(self.http.post(self.rest_url(&format!("rpc/{}", operation))), caller)
            .json(&args)
            .send()
            .await
            .map_err(|e| PcError::Backend {
                operation: operation.to_string(),
                message: e.to_string(),
            })?;
        let rows = Self::read_rows(operation, resp).await?;
        debug!(rows = rows.len(), "search rpc returned");
        Ok(rows)
    }
}

#[async_trait]
impl CredentialStore for RestBackend {
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    async fn load_credentials(&self, caller: &Caller) -> Result<Option<ChatCredentials>> {
        let resp = self
            .authed(self.http.get(self.rest_url("profiles")), caller)
            .query(&Self::profile_filter(caller))
            .send()
            .await
            .map_err(|e| PcError::Backend {
                operation: "load_profile".to_string(),
                message: e.to_string(),
            })?;
        let rows = Self::read_rows("load_profile", resp).await?;
        Ok(Self::first_profile(rows)?.map(ChatCredentials::from))
    }

    #[instrument(skip(self, caller, update), fields(user_id = %caller.user_id))]
    async fn save_credentials(
        &self,
        caller: &Caller,
        update: &CredentialsUpdate,
    ) -> Result<ChatCredentials> {
        let mut body = Map::new();
        if let Some(key) = update.api_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                body.insert("ai_api_key".into(), Value::String(key.to_string()));
            }
        }
        for (column, value) in [
            ("ai_endpoint_url", update.endpoint_url.as_deref()),
            ("ai_model", update.model.as_deref()),
        ] {
            if let Some(v) = value.map(str::trim) {
                let v = if v.is_empty() {
                    Value::Null
                } else {
                    Value::String(v.to_string())
                };
                body.insert(column.into(), v);
            }
        }

        if body.is_empty() {
            return self
                .load_credentials(caller)
                .await?
                .ok_or_else(|| PcError::NotFound {
                    resource: format!("profile {}", caller.user_id),
                });
        }

        let resp = self
            .authed(self.http.patch(self.rest_url("profiles")), caller)
            .query(&Self::profile_filter(caller))
            .header("Prefer", "return=representation")
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| PcError::Backend {
                operation: "save_profile".to_string(),
                message: e.to_string(),
            })?;
        let rows = Self::read_rows("save_profile", resp).await?;
        Self::first_profile(rows)?
            .map(ChatCredentials::from)
            .ok_or_else(|| PcError::NotFound {
                resource: format!("profile {}", caller.user_id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn caller() -> Caller {
        Caller {
            user_id: Uuid::parse_str("6f1c1f0e-6b52-4c4e-9e7b-0b8f6c3f3a11").unwrap(),
            access_token: "user-jwt".into(),
        }
    }

    fn backend(server: &MockServer) -> RestBackend {
        RestBackend::new(BackendConfig::new(server.uri(), "anon-key")).unwrap()
    }

    #[tokio::test]
    async fn test_search_posts_rpc_args() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_notes"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer user-jwt"))
            .and(body_json(json!({"search_query": "physio", "limit_val": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "n1", "title": "Physio review"},
                {"id": "n2", "title": "Physio invoice"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let rows = backend(&server)
            .search(&caller(), SearchSource::Notes, "physio", 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "n1");
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_claims"))
            .respond_with(ResponseTemplate::new(404).set_body_string("function not found"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .search(&caller(), SearchSource::Claims, "x", 10)
            .await
            .unwrap_err();
        match err {
            PcError::Backend { operation, message } => {
                assert_eq!(operation, "search_claims");
                assert!(message.contains("function not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.6f1c1f0e-6b52-4c4e-9e7b-0b8f6c3f3a11"))
            .and(query_param("select", ProfileAiSettings::SELECT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ai_api_key": "sk-abc", "ai_endpoint_url": null, "ai_model": "gpt-4o"}
            ])))
            .mount(&server)
            .await;

        let creds = backend(&server)
            .load_credentials(&caller())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creds.api_key, "sk-abc");
        assert_eq!(creds.endpoint_url, None);
        assert_eq!(creds.model.as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn test_load_credentials_without_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert!(backend(&server)
            .load_credentials(&caller())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_save_credentials_patches_profile() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profiles"))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!({"ai_api_key": "sk-new", "ai_model": null})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ai_api_key": "sk-new", "ai_endpoint_url": "https://llm/v1", "ai_model": null}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let creds = backend(&server)
            .save_credentials(
                &caller(),
                &CredentialsUpdate {
                    api_key: Some(" sk-new ".into()),
                    endpoint_url: None,
                    model: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(creds.api_key, "sk-new");
        assert_eq!(creds.endpoint_url.as_deref(), Some("https://llm/v1"));
        assert_eq!(creds.model, None);
    }
}
