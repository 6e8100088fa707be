//! Short-lived HS256 tokens for providers that authenticate with an
//! access-key/secret-key pair instead of a static bearer key.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Token lifetime in seconds.
const TOKEN_TTL_SECS: i64 = 1800;

/// Clock-skew allowance applied to `nbf`.
const NOT_BEFORE_SKEW_SECS: i64 = 5;

/// Claims expected by access-key authenticated APIs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessKeyClaims {
    /// Issuer -- the provider access key.
    pub iss: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Not-before time (UTC Unix timestamp).
    pub nbf: i64,
}

/// Sign a token for `access_key` with `secret_key`.
pub fn sign_access_token(access_key: &str, secret_key: &str) -> Result<String, ProviderError> {
    let now = chrono::Utc::now().timestamp();
    let claims = AccessKeyClaims {
        iss: access_key.to_string(),
        exp: now + TOKEN_TTL_SECS,
        nbf: now - NOT_BEFORE_SKEW_SECS,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret_key.as_bytes()),
    )
    .map_err(|e| ProviderError::Config(format!("failed to sign access token: {e}")))
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    use super::*;

    #[test]
    fn token_round_trips_with_the_secret() {
        let token = sign_access_token("ak-123", "sk-456").unwrap();

        let data = decode::<AccessKeyClaims>(
            &token,
            &DecodingKey::from_secret(b"sk-456"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.iss, "ak-123");
        assert!(data.claims.exp > data.claims.nbf);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = sign_access_token("ak-123", "sk-456").unwrap();
        let result = decode::<AccessKeyClaims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }
}
