//! User accounts. Passwords are stored as bcrypt hashes and never leave the database layer in clear text.

use anyhow::bail;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::debug;
use poem_openapi::Object;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const USERNAME_MAX_LENGTH: u64 = 64;
pub const USERNAME_MIN_LENGTH: u64 = 3;
pub const FULL_NAME_MAX_LENGTH: u64 = 255;
// bcrypt truncates passwords at 72 bytes.
pub const PASSWORD_MAX_LENGTH: u64 = 72;
pub const PASSWORD_MIN_LENGTH: u64 = 8;

lazy_static! {
    pub static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object, sqlx::FromRow)]
pub struct User {
    // Ignore this field when deserialize from json
    #[serde(skip_deserializing)]
    #[oai(read_only)]
    pub id: i64,

    pub username: String,

    #[oai(skip_serializing_if_is_none)]
    pub full_name: Option<String>,

    // The hash never goes out through the API.
    #[serde(skip_serializing)]
    #[oai(skip)]
    pub hashed_password: String,

    pub disabled: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object, Validate)]
pub struct UserCreate {
    #[validate(length(
        max = "USERNAME_MAX_LENGTH",
        min = "USERNAME_MIN_LENGTH",
        message = "The length of username should be between 3 and 64."
    ))]
    #[validate(regex(
        path = "USERNAME_REGEX",
        message = "The username is invalid. It should match ^[A-Za-z0-9_-]+$. Such as 'jane_doe'."
    ))]
    pub username: String,

    #[validate(length(
        max = "FULL_NAME_MAX_LENGTH",
        message = "The length of full_name should be less than 255."
    ))]
    #[oai(skip_serializing_if_is_none)]
    pub full_name: Option<String>,

    #[validate(length(
        max = "PASSWORD_MAX_LENGTH",
        min = "PASSWORD_MIN_LENGTH",
        message = "The length of password should be between 8 and 72."
    ))]
    pub password: String,
}

impl User {
    pub async fn get_by_username(
        pool: &sqlx::PgPool,
        username: &str,
    ) -> Result<Option<User>, anyhow::Error> {
        let sql_str = "SELECT * FROM workhub_user WHERE username = $1";
        let user = sqlx::query_as::<_, User>(sql_str)
            .bind(username)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Register a new user. The username must not be taken yet.
    pub async fn register(pool: &sqlx::PgPool, payload: &UserCreate) -> Result<User, anyhow::Error> {
        payload.validate()?;

        if User::get_by_username(pool, &payload.username).await?.is_some() {
            bail!("Username already registered");
        }

        let hashed_password = hash(&payload.password, DEFAULT_COST)?;
        debug!("Registering user {}.", payload.username);

        let sql_str = "
            INSERT INTO workhub_user (username, full_name, hashed_password)
            VALUES ($1, $2, $3)
            RETURNING *
        ";
        let user = sqlx::query_as::<_, User>(sql_str)
            .bind(&payload.username)
            .bind(&payload.full_name)
            .bind(&hashed_password)
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    pub fn verify_password(&self, password: &str) -> bool {
        verify(password, &self.hashed_password).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{run_migrations, setup_test_db};

    async fn prepare_test_db() -> sqlx::PgPool {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL is not set.");
        run_migrations(&database_url).await.unwrap();
        setup_test_db().await
    }

    async fn remove_test_user(pool: &sqlx::PgPool, username: &str) {
        sqlx::query("DELETE FROM workhub_user_config WHERE user_id IN (SELECT id FROM workhub_user WHERE username = $1)")
            .bind(username)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM workhub_user WHERE username = $1")
            .bind(username)
            .execute(pool)
            .await
            .unwrap();
    }

    #[test]
    fn test_user_create_validation() {
        let valid = UserCreate {
            username: "jane_doe".to_string(),
            full_name: Some("Jane Doe".to_string()),
            password: "s3cret-pass".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_username = UserCreate {
            username: "jane doe!".to_string(),
            full_name: None,
            password: "s3cret-pass".to_string(),
        };
        assert!(bad_username.validate().is_err());

        let short_password = UserCreate {
            username: "jane_doe".to_string(),
            full_name: None,
            password: "short".to_string(),
        };
        assert!(short_password.validate().is_err());

        let short_username = UserCreate {
            username: "jd".to_string(),
            full_name: None,
            password: "s3cret-pass".to_string(),
        };
        assert!(short_username.validate().is_err());
    }

    #[test]
    fn test_verify_password() {
        let hashed_password = hash("s3cret-pass", DEFAULT_COST).unwrap();
        let user = User {
            id: 1,
            username: "jane_doe".to_string(),
            full_name: None,
            hashed_password,
            disabled: false,
            created_at: Utc::now(),
        };

        assert!(user.verify_password("s3cret-pass"));
        assert!(!user.verify_password("wrong-pass"));
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let pool = prepare_test_db().await;
        remove_test_user(&pool, "dup_user").await;

        let payload = UserCreate {
            username: "dup_user".to_string(),
            full_name: None,
            password: "s3cret-pass".to_string(),
        };
        let user = User::register(&pool, &payload).await.unwrap();
        assert_eq!(user.username, "dup_user");
        assert!(user.verify_password("s3cret-pass"));

        let err = User::register(&pool, &payload).await.unwrap_err();
        assert!(err.to_string().contains("already registered"));

        // The failed registration must not write a second row.
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM workhub_user WHERE username = $1")
                .bind("dup_user")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_get_by_username() {
        let pool = prepare_test_db().await;
        remove_test_user(&pool, "lookup_user").await;

        assert!(User::get_by_username(&pool, "lookup_user")
            .await
            .unwrap()
            .is_none());

        let payload = UserCreate {
            username: "lookup_user".to_string(),
            full_name: Some("Lookup User".to_string()),
            password: "s3cret-pass".to_string(),
        };
        let registered = User::register(&pool, &payload).await.unwrap();

        let fetched = User::get_by_username(&pool, "lookup_user")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, registered.id);
        assert_eq!(fetched.full_name.as_deref(), Some("Lookup User"));
        assert!(!fetched.disabled);
    }
}
