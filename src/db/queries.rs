use crate::db::models::*;
use crate::error::{AppError, AppResult};
use crate::id::{IdGenerator, OsRngIdGenerator};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type DbPool = Pool<Sqlite>;

/// Shorten an identifier for log output.
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Persistence for one-time messages.
///
/// Every operation runs in its own transaction on the shared pool. A message
/// leaves the table exactly once: through `take_once` or through `sweep`.
#[derive(Clone)]
pub struct MessageStore {
    pool: DbPool,
    ids: Arc<dyn IdGenerator>,
    default_ttl_secs: i64,
}

impl MessageStore {
    /// Create a store drawing identifiers from the OS random source.
    pub fn new(pool: DbPool, default_ttl_secs: i64) -> Self {
        Self::with_id_generator(pool, default_ttl_secs, Arc::new(OsRngIdGenerator))
    }

    /// Create a store with a custom identifier source.
    pub fn with_id_generator(
        pool: DbPool,
        default_ttl_secs: i64,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            pool,
            ids,
            default_ttl_secs,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Lifetime given to messages that ask for none.
    pub fn default_ttl_secs(&self) -> i64 {
        clamp_ttl(0, self.default_ttl_secs).num_seconds()
    }

    /// Store a message and return its identifier and deadline.
    ///
    /// The lifetime is clamped into `[1s, 7d]`. A primary-key collision is
    /// retried once with a fresh identifier; a second collision is returned
    /// as the database error.
    pub async fn put(&self, message: NewMessage) -> AppResult<CreatedMessage> {
        let ttl = clamp_ttl(message.ttl_secs, self.default_ttl_secs);
        let expires_at = Utc::now() + ttl;

        let first = self.ids.new_id()?;
        let id = match self.insert(&first, &message, expires_at).await {
            Ok(()) => first,
            Err(e) if e.is_unique_violation() => {
                warn!("Identifier collision on {}, retrying", short_id(&first));
                let second = self.ids.new_id()?;
                self.insert(&second, &message, expires_at).await?;
                second
            }
            Err(e) => return Err(e),
        };

        debug!("Stored message {} until {}", short_id(&id), expires_at);

        Ok(CreatedMessage {
            id,
            expires_at,
            ttl_secs: ttl.num_seconds(),
        })
    }

    async fn insert(
        &self,
        id: &str,
        message: &NewMessage,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, ciphertext, nonce, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&message.ciphertext)
        .bind(&message.nonce)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove a message and hand back its contents.
    ///
    /// The delete and the read are one statement; only the caller whose
    /// transaction commits the delete receives the row. An expired row is
    /// deleted all the same and reported as `Expired`.
    pub async fn take_once(&self, id: &str) -> AppResult<Message> {
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, Message>(
            "DELETE FROM messages WHERE id = ? RETURNING id, ciphertext, nonce, expires_at",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        match message {
            None => Err(AppError::NotFound),
            Some(m) if m.is_expired_at(Utc::now()) => {
                debug!("Message {} taken after expiry", short_id(id));
                Err(AppError::Expired)
            }
            Some(m) => {
                debug!("Message {} delivered and burned", short_id(id));
                Ok(m)
            }
        }
    }

    /// Delete every message whose deadline has passed.
    pub async fn sweep(&self) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM messages WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// Number of messages currently stored, expired or not.
    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("default_ttl_secs", &self.default_ttl_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) async fn setup_test_db() -> DbPool {
    use sqlx::sqlite::SqlitePoolOptions;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_db(&pool).await.expect("Failed to init database");
    pool
}

/// Create the message table if it does not exist yet
pub async fn init_db(pool: &DbPool) -> AppResult<()> {
    info!("Running database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            ciphertext TEXT NOT NULL,
            nonce TEXT NOT NULL,
            expires_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database migrations complete");
    Ok(())
}
