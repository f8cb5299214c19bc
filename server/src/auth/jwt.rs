//! HS256 bearer tokens.
//!
//! Tokens are issued by the identity provider; this service only verifies
//! them. [`issue_token`] exists for local tooling and tests.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use loopdesk::Actor;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Claims carried by every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// The user's id in the identity provider.
    pub sub: i64,
    /// Display name, used for `creator_name` and audit entries.
    pub name: String,
    /// `admin` or `agent`. Anything else is treated as an agent.
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
}

/// Signing and verification keys derived from the shared secret.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

/// Verifies the signature and expiry of `token`.
pub fn validate_token(token: &str, keys: &JwtKeys) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(token, &keys.decoding, &Validation::default())?;
    Ok(data.claims)
}

/// Signs a token for `actor` valid for `ttl_secs` seconds.
pub fn issue_token(
    actor: &Actor,
    email: Option<&str>,
    ttl_secs: i64,
    keys: &JwtKeys,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: actor.id,
        name: actor.name.clone(),
        role: actor.role.as_str().to_string(),
        email: email.map(str::to_string),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    encode(&Header::default(), &claims, &keys.encoding)
}
