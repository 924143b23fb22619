use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{Requester, Role};

/// Bearer token claims naming the caller.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: u64,
}

/// Verifies HS256 bearer tokens issued by the accounts service.
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.len() < 16 {
            return Err(AuthError::WeakSecret);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Requester, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(Requester {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }

    /// Sign a token for `requester`; used by local tooling and tests.
    pub fn issue(&self, requester: Requester, ttl_secs: u64) -> Result<String, AuthError> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl_secs;
        let claims = Claims {
            sub: requester.id,
            role: requester.role,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("JWT secret must be at least 16 bytes")]
    WeakSecret,

    #[error("Invalid bearer token: {0}")]
    InvalidToken(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-test-secret";

    #[test]
    fn test_issued_token_verifies() {
        let verifier = TokenVerifier::new(SECRET).unwrap();
        let requester = Requester {
            id: Uuid::new_v4(),
            role: Role::Manager,
        };
        let token = verifier.issue(requester, 60).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), requester);
    }

    #[test]
    fn test_token_signed_with_other_secret_rejected() {
        let other = TokenVerifier::new("another-secret-value").unwrap();
        let token = other
            .issue(
                Requester {
                    id: Uuid::new_v4(),
                    role: Role::Recruiter,
                },
                60,
            )
            .unwrap();
        let verifier = TokenVerifier::new(SECRET).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(TokenVerifier::new("short"), Err(AuthError::WeakSecret)));
    }
}
