/*!
common/src/lib.rs

Shared configuration types and DB helper functions for Betafeed.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default file with an optional override file
- Helpers to initialize an SQLite pool and bootstrap the schema
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/posts_history.db")
    pub path: String,
}

/// News feed polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    /// Only the newest N entries are considered per tick
    pub max_entries: Option<usize>,
    pub poll_interval_seconds: Option<u64>,
    pub initial_delay_seconds: Option<u64>,
    /// Pause between two processed entries (rate-limits outbound publishing)
    pub entry_delay_seconds: Option<u64>,
    pub fetch_timeout_seconds: Option<u64>,
}

/// Article page fetching and image selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
    /// Host that article images must come from (e.g. "wabetainfo.com")
    pub image_host: Option<String>,
    /// Path fragment of the site's upload directory (e.g. "wp-content/uploads")
    pub image_path_marker: Option<String>,
    pub image_timeout_seconds: Option<u64>,
    pub image_referer: Option<String>,
    /// Static asset used when no article image can be downloaded
    pub fallback_image_url: Option<String>,
}

/// Remote abstractive summarization endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizerConfig {
    pub enabled: Option<bool>,
    pub api_url: Option<String>,
    /// Name of the env var holding the API token (token is optional)
    pub api_token_env: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub input_chars: Option<usize>,
}

/// Messaging platform (broadcast channel + direct messages)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_base: Option<String>,
    /// Name of the env var holding the bot token (required at startup)
    pub token_env: Option<String>,
    pub channel_id: String,
    pub channel_username: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Keepalive HTTP endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub enabled: Option<bool>,
    pub port: Option<u16>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub telegram: TelegramConfig,
    pub scraping: Option<ScrapingConfig>,
    pub summarizer: Option<SummarizerConfig>,
    pub server: Option<ServerConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    pub fn scraping(&self) -> ScrapingConfig {
        self.scraping.clone().unwrap_or_default()
    }

    pub fn summarizer(&self) -> SummarizerConfig {
        self.summarizer.clone().unwrap_or_default()
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Tables used by the bot. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        title TEXT,
        link TEXT,
        published TEXT,
        share_count INTEGER NOT NULL DEFAULT 0,
        category TEXT NOT NULL DEFAULT 'General',
        channel_message_id INTEGER,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        user_id INTEGER NOT NULL,
        category TEXT NOT NULL,
        PRIMARY KEY(user_id, category)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_shares (
        user_id INTEGER NOT NULL,
        post_id TEXT NOT NULL,
        shared_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(user_id, post_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_profiles (
        user_id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT,
        joined_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        notifications_enabled INTEGER NOT NULL DEFAULT 1,
        language TEXT DEFAULT 'en',
        conversation_state TEXT NOT NULL DEFAULT 'idle',
        last_active TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bookmarks (
        user_id INTEGER NOT NULL,
        post_id TEXT NOT NULL,
        bookmarked_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(user_id, post_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feedback (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        message TEXT NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        status TEXT NOT NULL DEFAULT 'pending'
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_activity (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        action TEXT NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    "#,
];

/// Create every table the bot needs (CREATE TABLE IF NOT EXISTS ...).
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .context("Failed to apply schema statement")?;
    }
    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary and return a configured
/// `SqlitePool`. Every store call is a short query, so a small pool is plenty:
/// - max_connections: 5
/// - WAL journal so readers do not block the pipeline's writes
///
/// Example:
///   let pool = init_db_pool("data/posts_history.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
