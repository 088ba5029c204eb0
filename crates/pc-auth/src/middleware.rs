use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_http::auth::AsyncAuthorizeRequest;

use crate::{jwt::JwtService, models::AuthContext};
use pc_error::{PcError, Result};

/// Cookie the web client stores the backend access token under.
const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// Verifies the caller's backend-issued token and attaches an [`AuthContext`].
#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self { jwt_service }
    }

    fn extract_auth_context(&self, headers: &HeaderMap) -> Result<AuthContext> {
        let token = if let Some(auth_header) = headers.get("authorization") {
            let auth_str = auth_header.to_str().map_err(|_| PcError::Authentication {
                message: "Authorization header is not valid ASCII".to_string(),
            })?;
            JwtService::extract_token_from_header(auth_str)?.to_string()
        } else if let Some(token) = headers
            .get("cookie")
            .and_then(|c| c.to_str().ok())
            .and_then(extract_token_from_cookie)
        {
            token
        } else {
            return Err(PcError::Authentication {
                message: "no credentials provided".to_string(),
            });
        };

        let claims = self.jwt_service.verify_token(&token)?;
        Ok(AuthContext {
            user_id: claims.user_id()?,
            email: claims.email,
            role: claims.role,
            access_token: token,
        })
    }
}

impl<B> AsyncAuthorizeRequest<B> for AuthMiddleware
where
    B: Send + 'static,
{
    type RequestBody = B;
    type ResponseBody = axum::body::Body;
    type Future = std::pin::Pin<
        Box<
            dyn std::future::Future<
                    Output = std::result::Result<
                        axum::http::Request<B>,
                        Response<Self::ResponseBody>,
                    >,
                > + Send,
        >,
    >;

    fn authorize(&mut self, request: axum::http::Request<B>) -> Self::Future {
        let middleware = self.clone();

        Box::pin(async move {
            let (parts, body) = request.into_parts();

            match middleware.extract_auth_context(&parts.headers) {
                Ok(auth_context) => {
                    let mut request = axum::http::Request::from_parts(parts, body);
                    request.extensions_mut().insert(auth_context);
                    Ok(request)
                }
                Err(e) => {
                    tracing::debug!(error = %e, path = %parts.uri.path(), "rejected unauthenticated request");
                    Err(e.into_response())
                }
            }
        })
    }
}

fn extract_token_from_cookie(cookie_str: &str) -> Option<String> {
    cookie_str.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(ACCESS_TOKEN_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Logs one line per authenticated API call.
pub async fn audit_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let user_id = request.extensions().get::<AuthContext>().map(|a| a.user_id);
    let start_time = std::time::Instant::now();

    let response = next.run(request).await;

    if let Some(user_id) = user_id {
        tracing::info!(
            user_id = %user_id,
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = start_time.elapsed().as_millis(),
            "api access"
        );
    }

    response
}
