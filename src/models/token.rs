use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct TokenService;

impl TokenService {
    const TOKEN_HOURS: i64 = 24;

    pub fn issue(user_id: Uuid, secret: &str) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(Self::TOKEN_HOURS);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("failed to encode access token")
    }

    /// Returns the user id claim on a valid, unexpired token. `None` covers every failure mode
    /// (bad signature, malformed, expired, unparseable subject) — callers only need to know
    /// "authenticated or not", never which way verification failed.
    pub fn verify(token: &str, secret: &str) -> Option<Uuid> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .ok()?;
        Uuid::parse_str(&data.claims.sub).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_user_id() {
        let id = Uuid::new_v4();
        let token = TokenService::issue(id, "test-secret");
        assert_eq!(TokenService::verify(&token, "test-secret"), Some(id));
    }

    #[test]
    fn rejects_wrong_secret() {
        let id = Uuid::new_v4();
        let token = TokenService::issue(id, "test-secret");
        assert_eq!(TokenService::verify(&token, "other-secret"), None);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(TokenService::verify("not-a-jwt", "test-secret"), None);
    }
}
