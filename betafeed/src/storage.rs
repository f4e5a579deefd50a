use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::categorize::Category;

/// Chat identifier of an end user (or of the broadcast channel).
pub type RecipientId = i64;

/// Everything the pipeline knows about a post before it is published.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub category: Category,
}

/// A persisted post row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Post {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub share_count: i64,
    pub category: String,
    pub channel_message_id: Option<i64>,
    pub created_at: Option<String>,
}

/// Listing row used by the recent-posts and bookmark menus.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PostSummary {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub category: String,
    pub share_count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub joined_at: Option<String>,
    pub notifications_enabled: i64,
    pub language: Option<String>,
    pub last_active: Option<String>,
}

/// Profile row plus the per-user counters shown in the profile menu.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileOverview {
    pub profile: Option<UserProfile>,
    pub shares: i64,
    pub bookmarks: i64,
    pub subscriptions: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Feedback {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub posts: i64,
    pub users: i64,
    /// (title, share_count), most shared first
    pub top_posts: Vec<(Option<String>, i64)>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AdminStats {
    pub users: i64,
    pub posts: i64,
    pub bookmarks: i64,
    pub shares: i64,
    pub pending_feedback: i64,
    pub daily_activity: i64,
}

/// The dedup record store driven by the ingestion pipeline.
#[async_trait::async_trait]
pub trait PostStore: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool>;
    /// No-op when the id is already present.
    async fn insert(&self, post: &NewPost) -> Result<()>;
    async fn update_publish_handle(&self, id: &str, handle: i64) -> Result<()>;
    async fn increment_share(&self, id: &str) -> Result<()>;
}

/// Who wants to hear about new posts.
#[async_trait::async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Subscribers of `category` that have notifications enabled.
    async fn subscribers_for(&self, category: Category) -> Result<Vec<RecipientId>>;
}

/// SQLite-backed implementation of every store the bot needs.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- posts ----

    pub async fn get_post(&self, id: &str) -> Result<Option<Post>> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, link, published, share_count, category, channel_message_id,
                   CAST(created_at AS TEXT) AS created_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load post")
    }

    /// Newest first (insertion order), optionally restricted to one category.
    pub async fn recent_posts(
        &self,
        limit: i64,
        offset: i64,
        category: Option<Category>,
    ) -> Result<Vec<PostSummary>> {
        let rows = match category {
            Some(category) => {
                sqlx::query_as::<_, PostSummary>(
                    r#"
                    SELECT id, title, link, category, share_count
                    FROM posts WHERE category = ?
                    ORDER BY rowid DESC LIMIT ? OFFSET ?
                    "#,
                )
                .bind(category.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, PostSummary>(
                    r#"
                    SELECT id, title, link, category, share_count
                    FROM posts ORDER BY rowid DESC LIMIT ? OFFSET ?
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        };
        rows.context("failed to list recent posts")
    }

    pub async fn posts_count(&self, category: Option<Category>) -> Result<i64> {
        let count = match category {
            Some(category) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE category = ?")
                    .bind(category.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
                    .fetch_one(&self.pool)
                    .await
            }
        };
        count.context("failed to count posts")
    }

    /// Count a share; the per-user row is kept once even if shared repeatedly.
    pub async fn record_share(&self, post_id: &str, user_id: Option<RecipientId>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        sqlx::query("UPDATE posts SET share_count = share_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut tx)
            .await
            .context("failed to increment share count")?;
        if let Some(user_id) = user_id {
            sqlx::query("INSERT OR IGNORE INTO post_shares (user_id, post_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(post_id)
                .execute(&mut tx)
                .await
                .context("failed to record share")?;
        }
        tx.commit().await.context("failed to commit share")?;
        Ok(())
    }

    // ---- users ----

    /// Register a user on first contact, otherwise bump `last_active`.
    pub async fn get_or_create_user(
        &self,
        user_id: RecipientId,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, username, first_name)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET last_active = CURRENT_TIMESTAMP
            "#,
        )
        .bind(user_id)
        .bind(username)
        .bind(first_name)
        .execute(&self.pool)
        .await
        .context("failed to upsert user profile")?;
        Ok(())
    }

    pub async fn user_profile(&self, user_id: RecipientId) -> Result<ProfileOverview> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, username, first_name, CAST(joined_at AS TEXT) AS joined_at,
                   notifications_enabled, language, CAST(last_active AS TEXT) AS last_active
            FROM user_profiles WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load user profile")?;

        let shares = self.count_for_user("SELECT COUNT(*) FROM post_shares WHERE user_id = ?", user_id).await?;
        let bookmarks = self.count_for_user("SELECT COUNT(*) FROM bookmarks WHERE user_id = ?", user_id).await?;
        let subscriptions =
            self.count_for_user("SELECT COUNT(*) FROM subscriptions WHERE user_id = ?", user_id).await?;

        Ok(ProfileOverview {
            profile,
            shares,
            bookmarks,
            subscriptions,
        })
    }

    async fn count_for_user(&self, sql: &str, user_id: RecipientId) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("failed to count user rows")
    }

    // ---- subscriptions ----

    pub async fn user_subscriptions(&self, user_id: RecipientId) -> Result<Vec<Category>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT category FROM subscriptions WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to list subscriptions")?;
        Ok(rows.iter().filter_map(|c| c.parse().ok()).collect())
    }

    /// Returns `true` when the user is subscribed after the call.
    pub async fn toggle_subscription(&self, user_id: RecipientId, category: Category) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let removed = sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND category = ?")
            .bind(user_id)
            .bind(category.as_str())
            .execute(&mut tx)
            .await
            .context("failed to remove subscription")?
            .rows_affected();
        if removed == 0 {
            sqlx::query("INSERT INTO subscriptions (user_id, category) VALUES (?, ?)")
                .bind(user_id)
                .bind(category.as_str())
                .execute(&mut tx)
                .await
                .context("failed to add subscription")?;
        }
        tx.commit().await.context("failed to commit subscription toggle")?;
        Ok(removed == 0)
    }

    // ---- bookmarks ----

    pub async fn user_bookmarks(&self, user_id: RecipientId, limit: i64, offset: i64) -> Result<Vec<PostSummary>> {
        sqlx::query_as::<_, PostSummary>(
            r#"
            SELECT p.id, p.title, p.link, p.category, p.share_count
            FROM bookmarks b
            JOIN posts p ON b.post_id = p.id
            WHERE b.user_id = ?
            ORDER BY b.bookmarked_at DESC, b.rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("failed to list bookmarks")
    }

    /// Returns `true` when the post is bookmarked after the call.
    pub async fn toggle_bookmark(&self, user_id: RecipientId, post_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let removed = sqlx::query("DELETE FROM bookmarks WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut tx)
            .await
            .context("failed to remove bookmark")?
            .rows_affected();
        if removed == 0 {
            sqlx::query("INSERT INTO bookmarks (user_id, post_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(post_id)
                .execute(&mut tx)
                .await
                .context("failed to add bookmark")?;
        }
        tx.commit().await.context("failed to commit bookmark toggle")?;
        Ok(removed == 0)
    }

    pub async fn is_bookmarked(&self, user_id: RecipientId, post_id: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM bookmarks WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to check bookmark")?;
        Ok(found.is_some())
    }

    // ---- notifications ----

    /// Flip the notification flag. Unknown users are reported as enabled (the default).
    pub async fn toggle_notifications(&self, user_id: RecipientId) -> Result<bool> {
        let enabled = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE user_profiles
            SET notifications_enabled = CASE notifications_enabled WHEN 1 THEN 0 ELSE 1 END
            WHERE user_id = ?
            RETURNING notifications_enabled
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to toggle notifications")?;
        Ok(enabled.map_or(true, |v| v == 1))
    }

    pub async fn notifications_enabled(&self, user_id: RecipientId) -> Result<bool> {
        let enabled = sqlx::query_scalar::<_, i64>("SELECT notifications_enabled FROM user_profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to read notification status")?;
        Ok(enabled.map_or(true, |v| v == 1))
    }

    /// Every user that accepts messages; the audience of an admin broadcast.
    pub async fn notification_recipients(&self) -> Result<Vec<RecipientId>> {
        sqlx::query_scalar::<_, i64>("SELECT user_id FROM user_profiles WHERE notifications_enabled = 1 ORDER BY user_id")
            .fetch_all(&self.pool)
            .await
            .context("failed to list notification recipients")
    }

    // ---- feedback & activity ----

    pub async fn save_feedback(&self, user_id: RecipientId, message: &str) -> Result<()> {
        sqlx::query("INSERT INTO feedback (user_id, message) VALUES (?, ?)")
            .bind(user_id)
            .bind(message)
            .execute(&self.pool)
            .await
            .context("failed to save feedback")?;
        Ok(())
    }

    /// The ten most recent pending feedback messages.
    pub async fn pending_feedback(&self) -> Result<Vec<Feedback>> {
        sqlx::query_as::<_, Feedback>(
            r#"
            SELECT id, user_id, message, CAST(created_at AS TEXT) AS created_at
            FROM feedback WHERE status = 'pending'
            ORDER BY created_at DESC, id DESC LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list pending feedback")
    }

    pub async fn log_activity(&self, user_id: RecipientId, action: &str) -> Result<()> {
        sqlx::query("INSERT INTO user_activity (user_id, action) VALUES (?, ?)")
            .bind(user_id)
            .bind(action)
            .execute(&self.pool)
            .await
            .context("failed to log activity")?;
        Ok(())
    }

    // ---- stats ----

    pub async fn stats(&self) -> Result<Stats> {
        let posts = self.posts_count(None).await?;
        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT user_id) FROM user_profiles")
            .fetch_one(&self.pool)
            .await
            .context("failed to count users")?;
        let top_posts = sqlx::query_as::<_, (Option<String>, i64)>(
            "SELECT title, share_count FROM posts ORDER BY share_count DESC LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list top posts")?;
        Ok(Stats { posts, users, top_posts })
    }

    pub async fn admin_stats(&self) -> Result<AdminStats> {
        Ok(AdminStats {
            users: self.scalar("SELECT COUNT(*) FROM user_profiles").await?,
            posts: self.scalar("SELECT COUNT(*) FROM posts").await?,
            bookmarks: self.scalar("SELECT COUNT(*) FROM bookmarks").await?,
            shares: self.scalar("SELECT COUNT(*) FROM post_shares").await?,
            pending_feedback: self.scalar("SELECT COUNT(*) FROM feedback WHERE status = 'pending'").await?,
            daily_activity: self
                .scalar("SELECT COUNT(*) FROM user_activity WHERE created_at >= datetime('now', '-1 day')")
                .await?,
        })
    }

    async fn scalar(&self, sql: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to run stats query: {}", sql))
    }
}

#[async_trait::async_trait]
impl PostStore for SqliteStore {
    async fn exists(&self, id: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, String>("SELECT id FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to check existing post")?;
        Ok(found.is_some())
    }

    async fn insert(&self, post: &NewPost) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO posts (id, title, link, published, category)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.title)
        .bind(&post.link)
        .bind(post.published.map(|d| d.to_rfc3339()))
        .bind(post.category.as_str())
        .execute(&self.pool)
        .await
        .context("failed to insert post")?;
        debug!(post_id = %post.id, inserted = result.rows_affected(), "post recorded");
        Ok(())
    }

    async fn update_publish_handle(&self, id: &str, handle: i64) -> Result<()> {
        sqlx::query("UPDATE posts SET channel_message_id = ? WHERE id = ?")
            .bind(handle)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to update publish handle")?;
        Ok(())
    }

    async fn increment_share(&self, id: &str) -> Result<()> {
        self.record_share(id, None).await
    }
}

#[async_trait::async_trait]
impl SubscriberRegistry for SqliteStore {
    async fn subscribers_for(&self, category: Category) -> Result<Vec<RecipientId>> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT s.user_id FROM subscriptions s
            JOIN user_profiles u ON s.user_id = u.user_id
            WHERE s.category = ? AND u.notifications_enabled = 1
            ORDER BY s.user_id
            "#,
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .context("failed to list subscribers")
    }
}
