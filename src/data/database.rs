//! SQLite database operations
//!
//! All database access goes through this module.
//! Schema lives in `migrations/` and is applied on connect.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::{AppError, ConflictKind};

/// Database connection pool wrapper.
///
/// Built once at startup and shared through `Arc`; each test builds its own.
pub struct Database {
    pool: Pool<Sqlite>,
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database
    ///
    /// Limited to one connection: every SQLite memory connection is a
    /// separate database.
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Users (owned by the user service)
    // =========================================================================

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Mirror a user record from the user service
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Friend requests
    // =========================================================================

    pub async fn get_friend_request(&self, id: &str) -> Result<Option<FriendRequest>, AppError> {
        let request = sqlx::query_as::<_, FriendRequest>(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at FROM friend_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    /// Request addressed to `receiver_id`
    ///
    /// Requests addressed to anyone else are indistinguishable from missing ones.
    pub async fn get_friend_request_for_receiver(
        &self,
        id: &str,
        receiver_id: &str,
    ) -> Result<Option<FriendRequest>, AppError> {
        let request = sqlx::query_as::<_, FriendRequest>(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at FROM friend_requests WHERE id = ? AND receiver_id = ?",
        )
        .bind(id)
        .bind(receiver_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    /// Pending request between the pair, in either direction
    pub async fn find_pending_request_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<FriendRequest>, AppError> {
        let (low, high) = sorted_pair(user_a, user_b);
        let request = sqlx::query_as::<_, FriendRequest>(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at FROM friend_requests WHERE pair_low = ? AND pair_high = ? AND status = 'pending'",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    /// Pending requests the user sent or received, newest first
    pub async fn get_pending_requests(&self, user_id: &str) -> Result<Vec<FriendRequest>, AppError> {
        let requests = sqlx::query_as::<_, FriendRequest>(
            r#"
            SELECT id, sender_id, receiver_id, status, created_at, updated_at
            FROM friend_requests
            WHERE (sender_id = ?1 OR receiver_id = ?1) AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    /// Insert a new pending request
    ///
    /// The pending-pair index backs up the caller's duplicate check; a
    /// racing insert surfaces as `Conflict(DuplicateRequest)`.
    pub async fn insert_friend_request(&self, request: &FriendRequest) -> Result<(), AppError> {
        let (low, high) = sorted_pair(&request.sender_id, &request.receiver_id);
        let result = sqlx::query(
            r#"
            INSERT INTO friend_requests
                (id, sender_id, receiver_id, pair_low, pair_high, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.sender_id)
        .bind(&request.receiver_id)
        .bind(low)
        .bind(high)
        .bind(request.status)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                Err(AppError::Conflict(ConflictKind::DuplicateRequest))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Reject a pending request addressed to `receiver_id`
    ///
    /// Single statement; returns whether a row changed.
    pub async fn reject_friend_request(
        &self,
        id: &str,
        receiver_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE friend_requests SET status = 'rejected', updated_at = ? WHERE id = ? AND receiver_id = ? AND status = 'pending'",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Accept a pending request and write both friend edges
    ///
    /// The status flip and the two edge inserts commit together or not at
    /// all. The guarded UPDATE runs first so the write lock is taken before
    /// anything is read. Dropping the future before it completes rolls the
    /// transaction back. Returns `None` when no pending request matched.
    pub async fn accept_friend_request(
        &self,
        id: &str,
        receiver_id: &str,
    ) -> Result<Option<FriendRequest>, AppError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let updated = sqlx::query(
            "UPDATE friend_requests SET status = 'accepted', updated_at = ? WHERE id = ? AND receiver_id = ? AND status = 'pending'",
        )
        .bind(now)
        .bind(id)
        .bind(receiver_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let request = sqlx::query_as::<_, FriendRequest>(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at FROM friend_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        for (owner, friend) in [
            (&request.sender_id, &request.receiver_id),
            (&request.receiver_id, &request.sender_id),
        ] {
            sqlx::query(
                "INSERT INTO friend_edges (id, owner_id, friend_id, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(EntityId::new().0)
            .bind(owner)
            .bind(friend)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Some(request))
    }

    // =========================================================================
    // Friend edges
    // =========================================================================

    /// Whether an edge links the pair in either direction
    pub async fn are_friends(&self, user_a: &str, user_b: &str) -> Result<bool, AppError> {
        let count = self.count_friend_edges_between(user_a, user_b).await?;
        Ok(count > 0)
    }

    /// Number of edges linking the pair, counting both directions
    pub async fn count_friend_edges_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM friend_edges
            WHERE (owner_id = ?1 AND friend_id = ?2) OR (owner_id = ?2 AND friend_id = ?1)
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Friends of `user_id` with their user records, newest friendship first
    pub async fn get_friends(&self, user_id: &str) -> Result<Vec<FriendSummary>, AppError> {
        let friends = sqlx::query_as::<_, FriendSummary>(
            r#"
            SELECT e.friend_id, u.first_name, u.last_name, u.email, e.created_at
            FROM friend_edges e
            LEFT JOIN users u ON u.id = e.friend_id
            WHERE e.owner_id = ?
            ORDER BY e.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(friends)
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    pub async fn find_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<Conversation>, AppError> {
        let (low, high) = sorted_pair(user_a, user_b);
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user1_id, user2_id, last_message_id, created_at, updated_at FROM conversations WHERE pair_low = ? AND pair_high = ?",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Create or get the conversation for an unordered pair
    ///
    /// A new row keeps the caller's order in `user1_id`/`user2_id`. The
    /// insert is a no-op when a concurrent caller created the row first,
    /// so both callers read back the same conversation.
    pub async fn get_or_create_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation, AppError> {
        if let Some(conversation) = self.find_conversation(user_a, user_b).await? {
            return Ok(conversation);
        }

        let (low, high) = sorted_pair(user_a, user_b);
        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (id, user1_id, user2_id, pair_low, pair_high, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(pair_low, pair_high) DO NOTHING
            "#,
        )
        .bind(EntityId::new().0)
        .bind(user_a)
        .bind(user_b)
        .bind(low)
        .bind(high)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            tracing::debug!(user_a, user_b, "Conversation created concurrently; reusing it");
        }

        self.find_conversation(user_a, user_b)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("conversation vanished after insert")))
    }

    /// Point the conversation at its newest message
    pub async fn update_conversation_last_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE conversations SET last_message_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message_id)
        .bind(Utc::now())
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Conversations the user takes part in, most recently active first
    pub async fn get_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationOverview>, AppError> {
        let conversations = sqlx::query_as::<_, ConversationOverview>(
            r#"
            SELECT
                c.id, c.user1_id, c.user2_id, c.last_message_id, c.created_at, c.updated_at,
                CASE WHEN c.user1_id = ?1 THEN c.user2_id ELSE c.user1_id END AS friend_id,
                u.first_name AS friend_first_name,
                u.last_name AS friend_last_name,
                u.email AS friend_email,
                lm.content AS last_message_content,
                lm.sender_id AS last_message_sender_id,
                lm.created_at AS last_message_at,
                (
                    SELECT COUNT(*) FROM messages m
                    WHERE m.receiver_id = ?1
                      AND m.sender_id = CASE WHEN c.user1_id = ?1 THEN c.user2_id ELSE c.user1_id END
                      AND m.is_read = 0
                ) AS unread_count
            FROM conversations c
            LEFT JOIN users u
                ON u.id = CASE WHEN c.user1_id = ?1 THEN c.user2_id ELSE c.user1_id END
            LEFT JOIN messages lm ON lm.id = c.last_message_id
            WHERE c.user1_id = ?1 OR c.user2_id = ?1
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    pub async fn insert_message(&self, message: &Message) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO messages
                (id, sender_id, receiver_id, content, message_type, is_read, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.content)
        .bind(&message.message_type)
        .bind(message.is_read)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>, AppError> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    /// Messages exchanged by the pair in either direction, newest first
    pub async fn get_messages_between(
        &self,
        user_a: &str,
        user_b: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    pub async fn count_messages_between(&self, user_a: &str, user_b: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Flip `is_read` on the listed messages addressed to `reader_id`
    ///
    /// Ids that are unknown, already read, or addressed to someone else are
    /// skipped silently. Returns the rows that changed, as they are now.
    pub async fn mark_messages_read(
        &self,
        message_ids: &[String],
        reader_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE messages SET is_read = 1, updated_at = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE receiver_id = ");
        builder.push_bind(reader_id);
        builder.push(" AND is_read = 0 AND id IN (");
        let mut separated = builder.separated(", ");
        for id in message_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(
            ") RETURNING id, sender_id, receiver_id, content, message_type, is_read, created_at, updated_at",
        );

        let flipped = builder
            .build_query_as::<Message>()
            .fetch_all(&self.pool)
            .await?;

        Ok(flipped)
    }

    // =========================================================================
    // Activity stores (owned by the nutrition and activity services)
    // =========================================================================

    /// Total water volume logged by the user in `[start, end)`
    pub async fn total_water_ml(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64, AppError> {
        let total: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(volume_ml), 0.0) FROM water_entries WHERE user_id = ? AND recorded_at >= ? AND recorded_at < ?",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Total steps logged by the user in `[start, end)`
    pub async fn total_steps(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(steps), 0) FROM step_entries WHERE user_id = ? AND recorded_at >= ? AND recorded_at < ?",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Record a water entry on behalf of the nutrition service
    pub async fn record_water_intake(
        &self,
        user_id: &str,
        volume_ml: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO water_entries (id, user_id, volume_ml, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(EntityId::new().0)
        .bind(user_id)
        .bind(volume_ml)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a step entry on behalf of the activity service
    pub async fn record_steps(
        &self,
        user_id: &str,
        steps: i64,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO step_entries (id, user_id, steps, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(EntityId::new().0)
        .bind(user_id)
        .bind(steps)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
