use axum::{extract::FromRequestParts, http::request::Parts};
use pc_core::Caller;
use pc_error::PcError;
use uuid::Uuid;

/// Identity of the current request, inserted by [`crate::AuthMiddleware`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Raw bearer token, forwarded to the backend for row-level access.
    pub access_token: String,
}

impl AuthContext {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user_id,
            access_token: self.access_token.clone(),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = PcError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| PcError::Authentication {
                message: "no authenticated session".to_string(),
            })
    }
}
