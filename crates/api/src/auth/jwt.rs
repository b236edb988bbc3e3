//! JWT session tokens
//!
//! Tokens are HS256 with a `uid` claim naming the user. Roles are never
//! carried in the token; they are loaded from the store on every request.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Lifetime of issued session tokens
pub const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub uid: Uuid,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a session token for `user_id`
    pub fn issue(&self, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            uid: user_id,
            iat: now.unix_timestamp(),
            exp: (now + Duration::days(TOKEN_TTL_DAYS)).unix_timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Validate signature and expiry and return the claims
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_validates() {
        let manager = JwtManager::new("test-secret");
        let user_id = Uuid::new_v4();

        let token = manager.issue(user_id).unwrap();
        let claims = manager.validate(&token).unwrap();

        assert_eq!(claims.uid, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = JwtManager::new("secret-a").issue(Uuid::new_v4()).unwrap();
        assert!(JwtManager::new("secret-b").validate(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new("test-secret");
        let past = OffsetDateTime::now_utc() - Duration::days(1);
        let claims = Claims {
            uid: Uuid::new_v4(),
            iat: (past - Duration::days(7)).unix_timestamp(),
            exp: past.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &manager.encoding_key).unwrap();

        assert!(manager.validate(&token).is_err());
    }
}
