//! Access tokens. Tokens are signed with the HS256 algorithm and the
//! `SECRET_KEY` environment variable, and carry the username in the `sub`
//! claim.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{error, info, warn};
use poem::Request;
use poem_openapi::auth::Bearer;
use poem_openapi::{Object, SecurityScheme};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SECRET_KEY: &str = "supersecretkey";
pub const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;

/// Read the signing key from the environment. The default only makes sense
/// for local development, the server warns about it at startup.
pub fn secret_key_from_env() -> String {
    match std::env::var("SECRET_KEY") {
        Ok(v) => {
            if v.is_empty() {
                warn!("SECRET_KEY is empty, falling back to the built-in development key.");
                DEFAULT_SECRET_KEY.to_string()
            } else {
                v
            }
        }
        Err(_) => DEFAULT_SECRET_KEY.to_string(),
    }
}

pub fn access_token_expire_minutes_from_env() -> i64 {
    match std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
        Ok(v) => match v.parse::<i64>() {
            Ok(minutes) => minutes,
            Err(_) => {
                warn!(
                    "ACCESS_TOKEN_EXPIRE_MINUTES is not a number: {}, using the default of {} minutes.",
                    v, DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES
                );
                DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES
            }
        },
        Err(_) => DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

pub fn create_access_token(
    username: &str,
    secret_key: &str,
    expires_minutes: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::minutes(expires_minutes)).timestamp() as usize;
    let claims = Claims {
        sub: username.to_string(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret_key.as_bytes()),
    )
}

pub fn verify_access_token(
    token: &str,
    secret_key: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret_key.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[derive(Debug)]
pub struct AuthenticatedUser {
    pub username: String,
}

impl AuthenticatedUser {
    fn new(username: String) -> Self {
        Self { username }
    }
}

#[derive(SecurityScheme)]
#[oai(type = "bearer", checker = "jwt_token_checker")]
pub struct CustomSecurityScheme(pub AuthenticatedUser);

async fn jwt_token_checker(_: &Request, bearer: Bearer) -> Option<AuthenticatedUser> {
    let secret_key = secret_key_from_env();

    let claims = match verify_access_token(&bearer.token, &secret_key) {
        Ok(claims) => claims,
        Err(err) => {
            error!("Error: {}", err);
            return None;
        }
    };

    let current_user = AuthenticatedUser::new(claims.sub);
    info!("current_user: {:?}", current_user);

    Some(current_user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let token = create_access_token("jane_doe", "test-secret", 30).unwrap();
        let claims = verify_access_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "jane_doe");
    }

    #[test]
    fn test_token_wrong_secret() {
        let token = create_access_token("jane_doe", "test-secret", 30).unwrap();
        assert!(verify_access_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_token_expired() {
        // Expired beyond the default leeway of 60 seconds.
        let token = create_access_token("jane_doe", "test-secret", -2).unwrap();
        assert!(verify_access_token(&token, "test-secret").is_err());
    }

    #[test]
    fn test_garbled_token() {
        assert!(verify_access_token("not-a-token", "test-secret").is_err());
    }
}
