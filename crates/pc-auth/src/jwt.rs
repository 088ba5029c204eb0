use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pc_error::{PcError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims of an access token issued by the hosted backend's auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>, // backend role, usually "authenticated"
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: Option<String>, audience: &str, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            email,
            role: Some(audience.to_string()),
            aud: audience.to_string(),
            exp: (now + expires_in).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| PcError::Authentication {
            message: format!("Invalid user ID in token: {}", e),
        })
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Verifies HS256 tokens signed with the backend's JWT secret.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    audience: String,
}

impl JwtService {
    pub fn new(secret: &str, audience: &str) -> Self {
        let encoding_key = EncodingKey::from_secret(secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);

        Self {
            encoding_key,
            decoding_key,
            validation,
            audience: audience.to_string(),
        }
    }

    /// Mints a token the same way the backend does; used for local runs and tests.
    pub fn issue_token(
        &self,
        user_id: Uuid,
        email: Option<String>,
        expires_in: Duration,
    ) -> Result<String> {
        let claims = Claims::new(user_id, email, &self.audience, expires_in);
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| PcError::Internal {
            message: format!("Failed to generate access token: {}", e),
            details: None,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => PcError::Authentication {
                    message: "token expired".to_string(),
                },
                jsonwebtoken::errors::ErrorKind::InvalidSignature => PcError::Authentication {
                    message: "invalid token signature".to_string(),
                },
                jsonwebtoken::errors::ErrorKind::InvalidAudience => PcError::Authentication {
                    message: "token audience mismatch".to_string(),
                },
                _ => PcError::Authentication {
                    message: format!("token verification failed: {}", e),
                },
            })
    }

    pub fn extract_token_from_header(authorization: &str) -> Result<&str> {
        match authorization.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(token.trim()),
            _ => Err(PcError::Authentication {
                message: "Invalid Authorization header format".to_string(),
            }),
        }
    }
}
