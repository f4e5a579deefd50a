use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::publisher::Publisher;
use crate::storage::{RecipientId, SqliteStore};

pub const FEEDBACK_THANKS: &str = "✅ Thank you for your feedback! We appreciate it.";
const BROADCAST_PREFIX: &str = "📢 <b>Broadcast Message</b>\n\n";

/// What a user's next free-text message means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingFeedback,
    /// Only ever honoured for the admin.
    AwaitingBroadcast,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingFeedback => "awaiting_feedback",
            ConversationState::AwaitingBroadcast => "awaiting_broadcast",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ConversationState::Idle),
            "awaiting_feedback" => Ok(ConversationState::AwaitingFeedback),
            "awaiting_broadcast" => Ok(ConversationState::AwaitingBroadcast),
            other => anyhow::bail!("unknown conversation state: {}", other),
        }
    }
}

/// Current state of a user; unknown users are idle.
pub async fn get_state(pool: &SqlitePool, user_id: RecipientId) -> Result<ConversationState> {
    let raw = sqlx::query_scalar::<_, String>("SELECT conversation_state FROM user_profiles WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read conversation state")?;
    Ok(raw.and_then(|s| s.parse().ok()).unwrap_or_default())
}

/// Persist the state, registering the user if needed.
pub async fn set_state(pool: &SqlitePool, user_id: RecipientId, state: ConversationState) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, conversation_state)
        VALUES (?, ?)
        ON CONFLICT(user_id) DO UPDATE SET conversation_state = excluded.conversation_state
        "#,
    )
    .bind(user_id)
    .bind(state.as_str())
    .execute(pool)
    .await
    .context("Failed to store conversation state")?;
    Ok(())
}

/// The user picked "send feedback"; their next message is the feedback.
pub async fn begin_feedback(pool: &SqlitePool, user_id: RecipientId) -> Result<()> {
    set_state(pool, user_id, ConversationState::AwaitingFeedback).await
}

/// The admin picked "broadcast". Returns `false` (and changes nothing) for anyone else.
pub async fn begin_broadcast(pool: &SqlitePool, admin_id: Option<RecipientId>, user_id: RecipientId) -> Result<bool> {
    if admin_id != Some(user_id) {
        return Ok(false);
    }
    set_state(pool, user_id, ConversationState::AwaitingBroadcast).await?;
    Ok(true)
}

/// Back to the main menu: forget any pending prompt.
pub async fn reset(pool: &SqlitePool, user_id: RecipientId) -> Result<()> {
    set_state(pool, user_id, ConversationState::Idle).await
}

/// Result of handling one free-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    /// Not awaited; the menu layer may treat it as it likes.
    Ignored,
    FeedbackSaved,
    Broadcast { recipients: usize, delivered: usize },
}

/// Route a free-text message according to the sender's conversation state.
/// The state is always back to idle afterwards.
pub async fn handle_text(
    store: &SqliteStore,
    publisher: &dyn Publisher,
    admin_id: Option<RecipientId>,
    user_id: RecipientId,
    text: &str,
) -> Result<TextOutcome> {
    let pool = store.pool();
    let state = get_state(pool, user_id).await?;
    if state != ConversationState::Idle {
        reset(pool, user_id).await?;
    }

    match state {
        ConversationState::Idle => Ok(TextOutcome::Ignored),
        ConversationState::AwaitingFeedback => {
            store.save_feedback(user_id, text).await?;
            publisher.send_text(user_id, FEEDBACK_THANKS).await?;
            info!("feedback received from {}", user_id);
            Ok(TextOutcome::FeedbackSaved)
        }
        ConversationState::AwaitingBroadcast if admin_id == Some(user_id) => {
            let (recipients, delivered) = broadcast(store, publisher, text).await?;
            publisher
                .send_text(user_id, &format!("✅ Broadcast sent to {} users!", delivered))
                .await?;
            Ok(TextOutcome::Broadcast { recipients, delivered })
        }
        ConversationState::AwaitingBroadcast => {
            debug!("ignoring broadcast text from non-admin {}", user_id);
            Ok(TextOutcome::Ignored)
        }
    }
}

/// Send `text` to every user with notifications enabled.
/// Returns (recipients, delivered); a failed delivery only lowers the count.
pub async fn broadcast(store: &SqliteStore, publisher: &dyn Publisher, text: &str) -> Result<(usize, usize)> {
    let recipients = store.notification_recipients().await?;
    let message = format!("{}{}", BROADCAST_PREFIX, text);

    let mut delivered = 0;
    for recipient in &recipients {
        match publisher.send_text(*recipient, &message).await {
            Ok(()) => delivered += 1,
            Err(e) => debug!("broadcast to {} failed: {:#}", recipient, e),
        }
    }
    info!("broadcast delivered to {}/{} users", delivered, recipients.len());
    Ok((recipients.len(), delivered))
}
