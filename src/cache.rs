// Request-response cache keyed by query identity. Entries go stale when a
// mutation touching their domain succeeds; stale entries keep their last
// value but force a refetch on the next read.
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::{Post, PostId, SaveRecord, User, UserId};

/// Stable identity of a read operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    RecentPosts,
    Feed,
    Post(PostId),
    PostsByCreator(UserId),
    SearchPosts(String),
    SavedPosts(UserId),
    CurrentUser,
    User(UserId),
    Users,
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Posts(Vec<Post>),
    Post(Post),
    Users(Vec<User>),
    User(User),
    Saves(Vec<SaveRecord>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: CachedValue,
    fresh: bool,
    fetched_at: DateTime<Utc>,
}

/// A successful write, described precisely enough to derive which read
/// keys it invalidates.
#[derive(Debug, Clone)]
pub enum Mutation {
    CreatePost { creator: UserId },
    UpdatePost { post: PostId },
    DeletePost { post: PostId, creator: UserId },
    LikePost { post: PostId },
    SavePost { user: UserId },
    UnsavePost { user: UserId },
    UpdateUser { user: UserId },
}

/// The invalidation table. Likes stay narrow on purpose: the affected
/// post is updated directly by the optimistic toggle.
pub fn invalidated_keys(mutation: &Mutation) -> Vec<QueryKey> {
    match mutation {
        Mutation::CreatePost { creator } => vec![
            QueryKey::RecentPosts,
            QueryKey::Feed,
            QueryKey::PostsByCreator(creator.clone()),
        ],
        Mutation::UpdatePost { post } => vec![
            QueryKey::Post(post.clone()),
            QueryKey::RecentPosts,
            QueryKey::Feed,
        ],
        Mutation::DeletePost { post, creator } => vec![
            QueryKey::Post(post.clone()),
            QueryKey::RecentPosts,
            QueryKey::Feed,
            QueryKey::PostsByCreator(creator.clone()),
        ],
        Mutation::LikePost { post } => vec![QueryKey::Post(post.clone())],
        Mutation::SavePost { user } | Mutation::UnsavePost { user } => vec![
            QueryKey::CurrentUser,
            QueryKey::SavedPosts(user.clone()),
        ],
        Mutation::UpdateUser { user } => {
            vec![QueryKey::CurrentUser, QueryKey::User(user.clone())]
        }
    }
}

#[derive(Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().expect("cache lock poisoned")
    }

    /// Fresh value for the key, if any. Stale entries are not returned.
    pub fn get(&self, key: &QueryKey) -> Option<CachedValue> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|e| e.fresh)
            .map(|e| e.value.clone())
    }

    /// Last-known value regardless of freshness. Used as the base for
    /// optimistic updates and for rendering while a refetch is in flight.
    pub fn peek(&self, key: &QueryKey) -> Option<CachedValue> {
        self.lock().get(key).map(|e| e.value.clone())
    }

    pub fn put(&self, key: QueryKey, value: CachedValue) {
        self.lock().insert(
            key,
            Entry {
                value,
                fresh: true,
                fetched_at: Utc::now(),
            },
        );
    }

    /// Mark a key stale; the stored value survives for `peek`.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.fresh = false;
        }
    }

    /// Drop a key entirely (e.g. the entry for a deleted post).
    pub fn remove(&self, key: &QueryKey) {
        self.lock().remove(key);
    }

    /// Drop everything. The cache reflects one identity's view of the
    /// backend; a sign-in or sign-out starts a new one.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.lock().get(key).map(|e| e.fresh).unwrap_or(false)
    }

    pub fn fetched_at(&self, key: &QueryKey) -> Option<DateTime<Utc>> {
        self.lock().get(key).map(|e| e.fetched_at)
    }

    /// Apply the invalidation rules for a mutation that just succeeded.
    pub fn apply(&self, mutation: &Mutation) {
        for key in invalidated_keys(mutation) {
            tracing::debug!(?key, "cache invalidate");
            self.invalidate(&key);
        }
        // Parameterized search results all cover the posts domain
        if matches!(
            mutation,
            Mutation::CreatePost { .. } | Mutation::UpdatePost { .. } | Mutation::DeletePost { .. }
        ) {
            let mut entries = self.lock();
            for (key, entry) in entries.iter_mut() {
                if matches!(key, QueryKey::SearchPosts(_)) {
                    entry.fresh = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: UserId::new(id),
            account_id: format!("acct-{}", id),
            name: "Ada".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            image_url: String::new(),
            bio: String::new(),
        }
    }

    #[test]
    fn get_only_returns_fresh_entries() {
        let cache = QueryCache::new();
        cache.put(QueryKey::CurrentUser, CachedValue::User(user("u1")));
        assert!(cache.get(&QueryKey::CurrentUser).is_some());

        cache.invalidate(&QueryKey::CurrentUser);
        assert!(cache.get(&QueryKey::CurrentUser).is_none());
        assert!(cache.peek(&QueryKey::CurrentUser).is_some(), "value survives");

        cache.put(QueryKey::CurrentUser, CachedValue::User(user("u1")));
        assert!(cache.is_fresh(&QueryKey::CurrentUser));
    }

    #[test]
    fn create_post_invalidates_recent_and_creator_lists() {
        let keys = invalidated_keys(&Mutation::CreatePost {
            creator: UserId::new("u1"),
        });
        assert!(keys.contains(&QueryKey::RecentPosts));
        assert!(keys.contains(&QueryKey::Feed));
        assert!(keys.contains(&QueryKey::PostsByCreator(UserId::new("u1"))));
        assert!(!keys.contains(&QueryKey::CurrentUser));
    }

    #[test]
    fn like_invalidates_nothing_broader_than_the_post() {
        let keys = invalidated_keys(&Mutation::LikePost {
            post: PostId::new("p1"),
        });
        assert_eq!(keys, vec![QueryKey::Post(PostId::new("p1"))]);
    }

    #[test]
    fn save_invalidates_current_user_and_saved_list() {
        let keys = invalidated_keys(&Mutation::SavePost {
            user: UserId::new("u1"),
        });
        assert!(keys.contains(&QueryKey::CurrentUser));
        assert!(keys.contains(&QueryKey::SavedPosts(UserId::new("u1"))));
    }

    #[test]
    fn update_user_invalidates_profile_keys() {
        let keys = invalidated_keys(&Mutation::UpdateUser {
            user: UserId::new("u2"),
        });
        assert_eq!(
            keys,
            vec![QueryKey::CurrentUser, QueryKey::User(UserId::new("u2"))]
        );
    }

    #[test]
    fn apply_marks_search_results_stale_on_post_mutations() {
        let cache = QueryCache::new();
        cache.put(
            QueryKey::SearchPosts("sunrise".into()),
            CachedValue::Posts(vec![]),
        );
        cache.apply(&Mutation::CreatePost {
            creator: UserId::new("u1"),
        });
        assert!(!cache.is_fresh(&QueryKey::SearchPosts("sunrise".into())));
    }

    #[test]
    fn clear_drops_every_entry() {
        let cache = QueryCache::new();
        cache.put(QueryKey::CurrentUser, CachedValue::User(user("u1")));
        cache.put(QueryKey::Users, CachedValue::Users(vec![]));
        cache.clear();
        assert!(cache.peek(&QueryKey::CurrentUser).is_none());
        assert!(cache.peek(&QueryKey::Users).is_none());
    }

    #[test]
    fn fetched_at_is_recorded() {
        let cache = QueryCache::new();
        cache.put(QueryKey::Users, CachedValue::Users(vec![]));
        assert!(cache.fetched_at(&QueryKey::Users).is_some());
        assert!(cache.fetched_at(&QueryKey::RecentPosts).is_none());
    }
}
