use betafeed::categorize::Category;
use betafeed::storage::{AdminStats, NewPost, PostStore, SqliteStore};
use chrono::{TimeZone, Utc};
use common::ensure_schema;
use sqlx::sqlite::SqlitePoolOptions;

async fn setup_test_store() -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory sqlite pool");
    ensure_schema(&pool).await.expect("ensure schema");
    SqliteStore::new(pool)
}

fn post(id: &str, category: Category) -> NewPost {
    NewPost {
        id: id.to_string(),
        title: format!("Title {}", id),
        link: format!("https://example.com/{}/", id),
        published: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
        category,
    }
}

#[tokio::test]
async fn test_insert_is_idempotent() {
    let store = setup_test_store().await;

    assert!(!store.exists("p1").await.unwrap());
    store.insert(&post("p1", Category::Android)).await.unwrap();
    assert!(store.exists("p1").await.unwrap());

    // Second insert with the same id is a no-op, even with different data
    let mut changed = post("p1", Category::Web);
    changed.title = "Other".to_string();
    store.insert(&changed).await.unwrap();

    assert_eq!(store.posts_count(None).await.unwrap(), 1);
    let stored = store.get_post("p1").await.unwrap().expect("post");
    assert_eq!(stored.title.as_deref(), Some("Title p1"));
    assert_eq!(stored.category, "Android");
    assert_eq!(stored.channel_message_id, None);
    assert!(stored.published.unwrap().starts_with("2024-01-01T10:00:00"));
}

#[tokio::test]
async fn test_publish_handle_and_shares() {
    let store = setup_test_store().await;
    store.insert(&post("p1", Category::Ios)).await.unwrap();

    store.update_publish_handle("p1", 555).await.unwrap();
    store.increment_share("p1").await.unwrap();
    store.record_share("p1", Some(7)).await.unwrap();
    store.record_share("p1", Some(7)).await.unwrap();

    let stored = store.get_post("p1").await.unwrap().expect("post");
    assert_eq!(stored.channel_message_id, Some(555));
    assert_eq!(stored.share_count, 3);

    // The per-user share row is kept once
    let overview = store.user_profile(7).await.unwrap();
    assert!(overview.profile.is_none());
    assert_eq!(overview.shares, 1);
}

#[tokio::test]
async fn test_recent_posts_paging_and_filter() {
    let store = setup_test_store().await;
    for (id, category) in [
        ("a", Category::Android),
        ("b", Category::Ios),
        ("c", Category::Android),
        ("d", Category::General),
    ] {
        store.insert(&post(id, category)).await.unwrap();
    }

    let ids = |rows: Vec<betafeed::storage::PostSummary>| rows.into_iter().map(|p| p.id).collect::<Vec<_>>();

    assert_eq!(ids(store.recent_posts(2, 0, None).await.unwrap()), vec!["d", "c"]);
    assert_eq!(ids(store.recent_posts(2, 2, None).await.unwrap()), vec!["b", "a"]);
    assert_eq!(
        ids(store.recent_posts(10, 0, Some(Category::Android)).await.unwrap()),
        vec!["c", "a"]
    );
    assert_eq!(store.posts_count(Some(Category::Android)).await.unwrap(), 2);
    assert_eq!(store.posts_count(Some(Category::Web)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_bookmarks_toggle() {
    let store = setup_test_store().await;
    store.insert(&post("p1", Category::Web)).await.unwrap();
    store.insert(&post("p2", Category::Web)).await.unwrap();

    assert!(store.toggle_bookmark(3, "p1").await.unwrap());
    assert!(store.toggle_bookmark(3, "p2").await.unwrap());
    assert!(store.is_bookmarked(3, "p1").await.unwrap());

    let bookmarks = store.user_bookmarks(3, 10, 0).await.unwrap();
    assert_eq!(bookmarks.len(), 2);
    assert_eq!(bookmarks[0].id, "p2");

    assert!(!store.toggle_bookmark(3, "p1").await.unwrap());
    assert!(!store.is_bookmarked(3, "p1").await.unwrap());
    assert_eq!(store.user_bookmarks(3, 10, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_profile_and_admin_stats() {
    let store = setup_test_store().await;
    store.get_or_create_user(1, Some("ann"), Some("Ann")).await.unwrap();
    store.get_or_create_user(1, Some("ann"), Some("Ann")).await.unwrap();
    store.get_or_create_user(2, None, None).await.unwrap();

    store.insert(&post("p1", Category::Android)).await.unwrap();
    store.insert(&post("p2", Category::Android)).await.unwrap();
    store.toggle_subscription(1, Category::Android).await.unwrap();
    store.toggle_bookmark(1, "p1").await.unwrap();
    store.record_share("p2", Some(1)).await.unwrap();
    store.save_feedback(2, "nice bot").await.unwrap();
    store.log_activity(1, "menu_news").await.unwrap();

    let overview = store.user_profile(1).await.unwrap();
    let profile = overview.profile.expect("profile");
    assert_eq!(profile.username.as_deref(), Some("ann"));
    assert_eq!(profile.notifications_enabled, 1);
    assert_eq!((overview.shares, overview.bookmarks, overview.subscriptions), (1, 1, 1));

    let stats = store.stats().await.unwrap();
    assert_eq!((stats.posts, stats.users), (2, 2));
    assert_eq!(stats.top_posts[0], (Some("Title p2".to_string()), 1));

    assert_eq!(
        store.admin_stats().await.unwrap(),
        AdminStats {
            users: 2,
            posts: 2,
            bookmarks: 1,
            shares: 1,
            pending_feedback: 1,
            daily_activity: 1,
        }
    );
    assert_eq!(store.notification_recipients().await.unwrap(), vec![1, 2]);
}
