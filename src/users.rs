//! User accounts and credential verification
//!
//! Stores username → argon2 password hash records. Postgres-backed when a
//! database URL is configured, in-memory otherwise.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AssistantError;
use crate::models::UserRecord;
use crate::Result;

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 50;

enum UserBackend {
    InMemory {
        users: RwLock<HashMap<String, UserRecord>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: OnceCell<()>,
    },
}

/// Registered-user store
pub struct UserStore {
    backend: UserBackend,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self {
            backend: UserBackend::InMemory {
                users: RwLock::new(HashMap::new()),
            },
        }
    }

    /// Pick the backend from the environment.
    pub fn from_env() -> Self {
        let database_url = env::var("POSTGRES_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok();

        if let Some(url) = database_url {
            match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(&url)
            {
                Ok(pool) => {
                    info!("User store backend: postgres");
                    return Self {
                        backend: UserBackend::Postgres {
                            pool,
                            schema_ready: OnceCell::new(),
                        },
                    };
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres user store, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("User store backend: in-memory");
        Self::in_memory()
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let UserBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS users (
                      id UUID PRIMARY KEY,
                      username TEXT UNIQUE NOT NULL,
                      password_hash TEXT NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::Store(format!("Failed to initialize users schema: {}", e))
            })?;

        Ok(())
    }

    /// Register a new user with a freshly salted password hash.
    pub async fn create(&self, username: &str, password: &str) -> Result<UserRecord> {
        let username = username.trim();
        if username.len() < USERNAME_MIN_LEN || username.len() > USERNAME_MAX_LEN {
            return Err(AssistantError::CallerInput(format!(
                "Username must be {}-{} characters.",
                USERNAME_MIN_LEN, USERNAME_MAX_LEN
            )));
        }
        if password.is_empty() {
            return Err(AssistantError::CallerInput(
                "Password must be provided.".to_string(),
            ));
        }

        if self.find(username).await?.is_some() {
            return Err(AssistantError::CallerInput(
                "Username already registered".to_string(),
            ));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
        };

        match &self.backend {
            UserBackend::InMemory { users } => {
                let mut users = users.write().await;
                users.insert(record.username.clone(), record.clone());
            }
            UserBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                sqlx::query("INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)")
                    .bind(record.id)
                    .bind(&record.username)
                    .bind(&record.password_hash)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        AssistantError::Store(format!("Failed to insert user: {}", e))
                    })?;
            }
        }

        info!(username = %record.username, "User registered");
        Ok(record)
    }

    /// Look up a user by username.
    pub async fn find(&self, username: &str) -> Result<Option<UserRecord>> {
        match &self.backend {
            UserBackend::InMemory { users } => Ok(users.read().await.get(username).cloned()),
            UserBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let row = sqlx::query(
                    "SELECT id, username, password_hash FROM users WHERE username = $1",
                )
                .bind(username)
                .fetch_optional(pool)
                .await
                .map_err(|e| AssistantError::Store(format!("Failed to load user: {}", e)))?;

                Ok(row.map(|row| UserRecord {
                    id: row.try_get("id").unwrap_or_else(|_| Uuid::new_v4()),
                    username: row.try_get("username").unwrap_or_default(),
                    password_hash: row.try_get("password_hash").unwrap_or_default(),
                }))
            }
        }
    }

    /// Verify credentials; returns the record only on a match.
    pub async fn verify(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let Some(user) = self.find(username).await? else {
            return Ok(None);
        };

        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

/// Hash a password using Argon2 with a fresh salt.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AssistantError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
