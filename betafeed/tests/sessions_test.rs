use anyhow::Result;
use betafeed::media::DownloadedImage;
use betafeed::publisher::{MessageHandle, Publisher};
use betafeed::sessions::{
    begin_broadcast, begin_feedback, get_state, handle_text, reset, set_state, ConversationState, TextOutcome,
    FEEDBACK_THANKS,
};
use betafeed::storage::{RecipientId, SqliteStore};
use common::ensure_schema;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Mutex;

const ADMIN: RecipientId = 42;

async fn setup_test_store() -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    ensure_schema(&pool).await.expect("ensure schema");
    SqliteStore::new(pool)
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(RecipientId, String)>>,
    failing: Vec<RecipientId>,
}

#[async_trait::async_trait]
impl Publisher for Outbox {
    async fn publish(&self, _target: &str, _caption: &str, _image: &DownloadedImage) -> Result<MessageHandle> {
        anyhow::bail!("not used in these tests")
    }

    async fn notify(&self, recipient: RecipientId, text: &str) -> Result<()> {
        if self.failing.contains(&recipient) {
            anyhow::bail!("chat not found");
        }
        self.sent.lock().unwrap().push((recipient, text.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_state_round_trip_and_default() {
    let store = setup_test_store().await;
    let pool = store.pool();

    // Unknown users are idle
    assert_eq!(get_state(pool, 7).await.unwrap(), ConversationState::Idle);

    set_state(pool, 7, ConversationState::AwaitingFeedback).await.unwrap();
    assert_eq!(get_state(pool, 7).await.unwrap(), ConversationState::AwaitingFeedback);

    // Setting state must not clobber an existing profile
    store.get_or_create_user(8, Some("reader"), Some("Ann")).await.unwrap();
    set_state(pool, 8, ConversationState::AwaitingFeedback).await.unwrap();
    let overview = store.user_profile(8).await.unwrap();
    assert_eq!(overview.profile.unwrap().username.as_deref(), Some("reader"));

    reset(pool, 7).await.unwrap();
    assert_eq!(get_state(pool, 7).await.unwrap(), ConversationState::Idle);
}

#[tokio::test]
async fn test_feedback_flow() {
    let store = setup_test_store().await;
    let outbox = Outbox::default();

    // Idle users' free text is not captured
    let outcome = handle_text(&store, &outbox, Some(ADMIN), 7, "hello").await.unwrap();
    assert_eq!(outcome, TextOutcome::Ignored);
    assert!(store.pending_feedback().await.unwrap().is_empty());

    begin_feedback(store.pool(), 7).await.unwrap();
    let outcome = handle_text(&store, &outbox, Some(ADMIN), 7, "Please add dark mode news").await.unwrap();
    assert_eq!(outcome, TextOutcome::FeedbackSaved);

    let feedback = store.pending_feedback().await.unwrap();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].user_id, 7);
    assert_eq!(feedback[0].message, "Please add dark mode news");
    assert_eq!(*outbox.sent.lock().unwrap(), vec![(7, FEEDBACK_THANKS.to_string())]);

    // Back to idle: a second message is not feedback
    assert_eq!(get_state(store.pool(), 7).await.unwrap(), ConversationState::Idle);
    let outcome = handle_text(&store, &outbox, Some(ADMIN), 7, "again").await.unwrap();
    assert_eq!(outcome, TextOutcome::Ignored);
}

#[tokio::test]
async fn test_only_admin_can_broadcast() {
    let store = setup_test_store().await;
    let outbox = Outbox::default();

    assert!(!begin_broadcast(store.pool(), Some(ADMIN), 7).await.unwrap());
    assert_eq!(get_state(store.pool(), 7).await.unwrap(), ConversationState::Idle);

    // A stale broadcast state for a non-admin is dropped, not honoured
    set_state(store.pool(), 7, ConversationState::AwaitingBroadcast).await.unwrap();
    let outcome = handle_text(&store, &outbox, Some(ADMIN), 7, "spam").await.unwrap();
    assert_eq!(outcome, TextOutcome::Ignored);
    assert_eq!(get_state(store.pool(), 7).await.unwrap(), ConversationState::Idle);
    assert!(outbox.sent.lock().unwrap().is_empty());

    // Without a configured admin nobody can broadcast
    assert!(!begin_broadcast(store.pool(), None, ADMIN).await.unwrap());
}

#[tokio::test]
async fn test_broadcast_reaches_enabled_users_and_counts_deliveries() {
    let store = setup_test_store().await;
    for user in [1, 2, 3, ADMIN] {
        store.get_or_create_user(user, None, None).await.unwrap();
    }
    // user 2 opted out, user 3 has blocked the bot
    store.toggle_notifications(2).await.unwrap();
    let outbox = Outbox {
        failing: vec![3],
        ..Default::default()
    };

    assert!(begin_broadcast(store.pool(), Some(ADMIN), ADMIN).await.unwrap());
    let outcome = handle_text(&store, &outbox, Some(ADMIN), ADMIN, "Maintenance tonight").await.unwrap();
    assert_eq!(
        outcome,
        TextOutcome::Broadcast {
            recipients: 3,
            delivered: 2
        }
    );

    let sent = outbox.sent.lock().unwrap();
    let broadcast = "📢 <b>Broadcast Message</b>\n\nMaintenance tonight".to_string();
    assert_eq!(
        *sent,
        vec![
            (1, broadcast.clone()),
            (ADMIN, broadcast),
            (ADMIN, "✅ Broadcast sent to 2 users!".to_string()),
        ]
    );
    drop(sent);
    assert_eq!(get_state(store.pool(), ADMIN).await.unwrap(), ConversationState::Idle);
}
