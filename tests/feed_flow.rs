use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use snapgram::backend::MemoryBackend;
use snapgram::client::SnapgramClient;
use snapgram::config::Config;
use snapgram::domain::{ImageUpload, NewPost, NewUser, User};

async fn client_with_posts(count: usize, config: Config) -> (SnapgramClient, User) {
    let backend = Arc::new(MemoryBackend::new());
    let client = SnapgramClient::new(backend, config);
    let user = client
        .sign_up(&NewUser {
            name: "Ada Lovelace".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        })
        .await
        .unwrap();
    for i in 0..count {
        client
            .create_post(NewPost {
                creator: user.id.clone(),
                caption: format!("post number {}", i),
                image: ImageUpload {
                    filename: format!("img{}.jpg", i),
                    bytes: Bytes::from_static(b"pixels"),
                },
                location: None,
                tags: None,
            })
            .await
            .unwrap();
    }
    (client, user)
}

fn small_pages() -> Config {
    let mut config = Config::default();
    config.feed.page_size = 4;
    config
}

#[tokio::test]
async fn feed_traverses_everything_without_repeats() {
    let (client, _) = client_with_posts(10, small_pages()).await;
    let mut pager = client.feed();

    let mut seen: HashSet<String> = HashSet::new();
    let mut pages = 0;
    loop {
        let page = pager.next_page().await.unwrap();
        if page.is_empty() {
            break;
        }
        pages += 1;
        for post in &page {
            assert!(
                seen.insert(post.id.as_str().to_string()),
                "page repeated item {}",
                post.id
            );
        }
    }

    assert_eq!(seen.len(), 10);
    assert_eq!(pages, 3, "10 items at page size 4");
    assert!(pager.is_exhausted());
}

#[tokio::test]
async fn feed_orders_by_most_recent_update() {
    let (client, user) = client_with_posts(3, small_pages()).await;
    let mut pager = client.feed();
    let first_page = pager.next_page().await.unwrap();
    let oldest = first_page.last().unwrap().clone();

    // Touching the oldest post bumps it to the top of a fresh feed
    client.toggle_like(&user.id, &oldest.id).await.unwrap();

    let mut fresh = client.feed();
    let reordered = fresh.next_page().await.unwrap();
    assert_eq!(reordered[0].id, oldest.id);
}

#[tokio::test]
async fn feed_stream_yields_the_same_pages() {
    let (client, _) = client_with_posts(9, small_pages()).await;

    let pages: Vec<_> = client.feed().into_stream().collect().await;
    assert_eq!(pages.len(), 3);
    let total: usize = pages.iter().map(|p| p.as_ref().unwrap().len()).sum();
    assert_eq!(total, 9);
}

#[tokio::test]
async fn search_matches_caption_substrings() {
    let (client, user) = client_with_posts(3, Config::default()).await;
    client
        .create_post(NewPost {
            creator: user.id.clone(),
            caption: "Golden Sunrise over the bay".into(),
            image: ImageUpload {
                filename: "sunrise.jpg".into(),
                bytes: Bytes::from_static(b"pixels"),
            },
            location: None,
            tags: None,
        })
        .await
        .unwrap();

    let hits = client.search_posts("sunrise").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].caption.contains("Sunrise"));

    assert!(client.search_posts("nonexistent").await.unwrap().is_empty());
}

#[tokio::test]
async fn recent_posts_respects_the_configured_limit() {
    let mut config = Config::default();
    config.feed.recent_limit = 2;
    let (client, _) = client_with_posts(5, config).await;

    let recent = client.recent_posts().await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].caption, "post number 4", "newest first");
}

#[tokio::test]
async fn profile_views_are_cached_per_user() {
    let (client, user) = client_with_posts(2, Config::default()).await;

    let profile = client.get_user(&user.id).await.unwrap();
    assert_eq!(profile.username, "ada");

    let posts = client.posts_by_creator(&user.id).await.unwrap();
    assert_eq!(posts.len(), 2);

    let everyone = client.list_users().await.unwrap();
    assert_eq!(everyone.len(), 1);
}
