use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use civicpulse_common::Role;

const TOKEN_DURATION_SECS: i64 = 24 * 3600; // 24 hours
const COOKIE_NAME: &str = "auth_token";

/// Claims asserted by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    pub iss: String,
}

/// HS256 token signing and verification.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Mint a token. Production tokens come from the identity provider; this
    /// exists for local development and tests.
    pub fn create_token(&self, user_id: &str, email: &str, role: Role) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::seconds(TOKEN_DURATION_SECS);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify and decode a token. Returns claims if valid and not expired.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

/// Parse the auth_token cookie value from a Cookie header string.
pub fn parse_auth_cookie(header: &str) -> Option<&str> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(COOKIE_NAME)
            .and_then(|value| value.strip_prefix('='))
    })
}
