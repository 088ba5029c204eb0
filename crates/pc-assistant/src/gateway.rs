use pc_backend::{CredentialStore, SearchBackend};
use pc_core::{AiResponse, Caller};
use pc_error::{PcError, Result};
use pc_llm::ChatModelFactory;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    context::build_context,
    prompt::SYSTEM_PROMPT,
    ratelimit::{RateLimitPolicy, RateLimiter},
    search::SearchAggregator,
};

/// Answers natural-language questions about the caller's records.
pub struct AssistantService {
    search: SearchAggregator,
    credentials: Arc<dyn CredentialStore>,
    chat_models: Arc<dyn ChatModelFactory>,
    limiter: RateLimiter,
    policy: RateLimitPolicy,
}

impl AssistantService {
    pub fn new(
        search_backend: Arc<dyn SearchBackend>,
        credentials: Arc<dyn CredentialStore>,
        chat_models: Arc<dyn ChatModelFactory>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            search: SearchAggregator::new(search_backend),
            credentials,
            chat_models,
            limiter: RateLimiter::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Chat endpoint flow: rate limit, validate, then [`AssistantService::answer`].
    pub async fn chat(&self, caller: &Caller, query: Option<&str>) -> Result<AiResponse> {
        self.limiter
            .check(&caller.user_id.to_string(), &self.policy)?;

        let query = query
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| PcError::Validation {
                message: "Query is required".to_string(),
            })?;

        self.answer(caller, query).await
    }

    #[instrument(skip(self, caller, query), fields(user_id = %caller.user_id))]
    pub async fn answer(&self, caller: &Caller, query: &str) -> Result<AiResponse> {
        let creds = self
            .credentials
            .load_credentials(caller)
            .await?
            .filter(|c| !c.api_key.trim().is_empty())
            .ok_or_else(|| PcError::CredentialsMissing {
                key: "ai_api_key".to_string(),
            })?;

        let bundle = self.search.search_all(caller, query).await;
        let context = build_context(&bundle);
        let sources = bundle.counts();

        let model = self.chat_models.chat_model(&creds);
        let content = model.chat(SYSTEM_PROMPT, &context, query).await?;

        info!(
            sources = sources.total(),
            context_chars = context.len(),
            answer_chars = content.len(),
            "assistant answered"
        );
        Ok(AiResponse { content, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pc_backend::{MemoryBackend, ProfileAiSettings, SearchSource};
    use pc_core::{ChatCredentials, Row};
    use pc_llm::ChatModel;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorded {
        creds: Option<ChatCredentials>,
        system: String,
        context: String,
        user: String,
    }

    struct MockChatModel {
        reply: Result<String>,
        recorded: Arc<Mutex<Recorded>>,
    }

    #[async_trait]
    impl ChatModel for MockChatModel {
        async fn chat(&self, system: &str, context: &str, user: &str) -> Result<String> {
            let mut r = self.recorded.lock().unwrap();
            r.system = system.to_string();
            r.context = context.to_string();
            r.user = user.to_string();
            self.reply.clone()
        }
    }

    struct MockFactory {
        reply: Result<String>,
        recorded: Arc<Mutex<Recorded>>,
    }

    impl ChatModelFactory for MockFactory {
        fn chat_model(&self, creds: &ChatCredentials) -> Arc<dyn ChatModel> {
            self.recorded.lock().unwrap().creds = Some(creds.clone());
            Arc::new(MockChatModel {
                reply: self.reply.clone(),
                recorded: self.recorded.clone(),
            })
        }
    }

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    struct Fixture {
        service: AssistantService,
        backend: Arc<MemoryBackend>,
        recorded: Arc<Mutex<Recorded>>,
        caller: Caller,
    }

    async fn fixture(reply: Result<String>, policy: RateLimitPolicy) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .seed(
                SearchSource::Notes,
                vec![row(json!({"id": "n1", "title": "Physio plan"}))],
            )
            .await;
        backend
            .seed(
                SearchSource::Expenses,
                vec![row(json!({"id": "e1", "description": "Physio", "amount": 95}))],
            )
            .await;
        let caller = Caller {
            user_id: Uuid::new_v4(),
            access_token: "token".into(),
        };
        backend
            .put_profile(
                caller.user_id,
                ProfileAiSettings {
                    ai_api_key: Some("sk-user".into()),
                    ai_endpoint_url: None,
                    ai_model: Some("gpt-4o".into()),
                },
            )
            .await;

        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let service = AssistantService::new(
            backend.clone(),
            backend.clone(),
            Arc::new(MockFactory {
                reply,
                recorded: recorded.clone(),
            }),
            policy,
        );
        Fixture {
            service,
            backend,
            recorded,
            caller,
        }
    }

    #[tokio::test]
    async fn test_answer_assembles_prompt_and_counts_sources() {
        let f = fixture(
            Ok("See [Note: Physio plan](ID:n1)".into()),
            RateLimitPolicy::default(),
        )
        .await;

        let resp = f
            .service
            .chat(&f.caller, Some("  how much on physio?  "))
            .await
            .unwrap();

        assert_eq!(resp.content, "See [Note: Physio plan](ID:n1)");
        assert_eq!(resp.sources.notes, 1);
        assert_eq!(resp.sources.expenses, 1);
        assert_eq!(resp.sources.claims, 0);

        let r = f.recorded.lock().unwrap();
        assert_eq!(r.system, SYSTEM_PROMPT);
        assert_eq!(r.user, "  how much on physio?  ");
        assert!(r.context.contains("NOTES:\n1. ID: n1"));
        assert!(r.context.contains("EXPENSES:"));
        let creds = r.creds.as_ref().unwrap();
        assert_eq!(creds.api_key, "sk-user");
        assert_eq!(creds.model.as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let f = fixture(Ok(String::new()), RateLimitPolicy::default()).await;
        let stranger = Caller {
            user_id: Uuid::new_v4(),
            access_token: "t".into(),
        };
        let err = f.service.chat(&stranger, Some("hi")).await.unwrap_err();
        assert!(matches!(err, PcError::CredentialsMissing { .. }));

        f.backend
            .put_profile(
                stranger.user_id,
                ProfileAiSettings {
                    ai_api_key: Some("   ".into()),
                    ..Default::default()
                },
            )
            .await;
        let err = f.service.chat(&stranger, Some("hi")).await.unwrap_err();
        assert!(matches!(err, PcError::CredentialsMissing { .. }));
    }

    #[tokio::test]
    async fn test_blank_query_is_validation_error() {
        let f = fixture(Ok(String::new()), RateLimitPolicy::default()).await;
        for q in [None, Some(""), Some("   ")] {
            let err = f.service.chat(&f.caller, q).await.unwrap_err();
            assert!(matches!(err, PcError::Validation { .. }));
        }
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_user() {
        let policy = RateLimitPolicy {
            max_requests: 2,
            window: Duration::from_secs(60),
        };
        let f = fixture(Ok("ok".into()), policy).await;

        assert!(f.service.chat(&f.caller, Some("a")).await.is_ok());
        assert!(f.service.chat(&f.caller, Some("b")).await.is_ok());
        let err = f.service.chat(&f.caller, Some("c")).await.unwrap_err();
        assert!(matches!(err, PcError::RateLimited { .. }));
        assert_eq!(err.to_http_status(), 429);
        assert_eq!(f.service.limiter().window_len(&f.caller.user_id.to_string()), 2);
    }

    #[tokio::test]
    async fn test_upstream_errors_propagate() {
        let f = fixture(
            Err(PcError::UpstreamAuthentication {
                provider: "openai_compat".into(),
                message: "bad key".into(),
            }),
            RateLimitPolicy::default(),
        )
        .await;
        let err = f.service.chat(&f.caller, Some("q")).await.unwrap_err();
        assert!(matches!(err, PcError::UpstreamAuthentication { .. }));
    }

    #[tokio::test]
    async fn test_search_failures_do_not_fail_answer() {
        let f = fixture(Ok("nothing found".into()), RateLimitPolicy::default()).await;
        for source in SearchSource::ALL {
            f.backend.fail_source(source).await;
        }
        let resp = f.service.chat(&f.caller, Some("q")).await.unwrap();
        assert_eq!(resp.sources.total(), 0);
        assert_eq!(
            f.recorded.lock().unwrap().context,
            "No search results found in the database."
        );
    }
}
