// Optimistic like/save toggling. Two-phase apply: the local prediction
// lands in the cache (with a pending marker) before the mutation is
// issued; the backend result reconciles the entry — confirmed on success,
// rolled back on failure. The cached list therefore always converges to
// the backend's list once the in-flight mutation settles.
//
// Mutations on the same post are serialized through a per-post lock so two
// rapid toggles can never compute their lists from stale state. Toggles on
// different posts proceed concurrently.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::backend::{unique_id, Backend, DocumentApi, Query};
use crate::cache::{CachedValue, Mutation, QueryCache, QueryKey};
use crate::domain::{Post, PostId, SaveId, SaveRecord, UserId};
use crate::error::AppResult;

#[derive(Debug, Clone)]
pub enum PendingInteraction {
    Like {
        prior: Vec<UserId>,
        predicted: Vec<UserId>,
    },
    Save {
        saved: bool,
    },
}

pub struct Interactions {
    backend: Arc<dyn Backend>,
    cache: Arc<QueryCache>,
    posts_collection: String,
    saves_collection: String,
    locks: Mutex<HashMap<PostId, Arc<tokio::sync::Mutex<()>>>>,
    pending: Mutex<HashMap<PostId, PendingInteraction>>,
}

impl Interactions {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<QueryCache>,
        posts_collection: impl Into<String>,
        saves_collection: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cache,
            posts_collection: posts_collection.into(),
            saves_collection: saves_collection.into(),
            locks: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn post_lock(&self, post_id: &PostId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.entry(post_id.clone()).or_default().clone()
    }

    fn set_pending(&self, post_id: &PostId, pending: PendingInteraction) {
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(post_id.clone(), pending);
    }

    fn clear_pending(&self, post_id: &PostId) {
        self.pending
            .lock()
            .expect("pending map poisoned")
            .remove(post_id);
    }

    pub fn pending(&self, post_id: &PostId) -> Option<PendingInteraction> {
        self.pending
            .lock()
            .expect("pending map poisoned")
            .get(post_id)
            .cloned()
    }

    pub fn is_pending(&self, post_id: &PostId) -> bool {
        self.pending(post_id).is_some()
    }

    /// The post the toggle starts from: the rendered (cached) state when
    /// available, otherwise fetched.
    async fn base_post(&self, post_id: &PostId) -> AppResult<(Post, bool)> {
        let key = QueryKey::Post(post_id.clone());
        if let Some(CachedValue::Post(post)) = self.cache.peek(&key) {
            return Ok((post, self.cache.is_fresh(&key)));
        }
        let doc = self
            .backend
            .get_document(&self.posts_collection, post_id.as_str())
            .await?;
        let post = Post::from_document(&doc)?;
        self.cache.put(key, CachedValue::Post(post.clone()));
        Ok((post, true))
    }

    /// Set-toggle `user`'s membership in the post's like list and push the
    /// full resulting list to the backend.
    pub async fn toggle_like(&self, user: &UserId, post_id: &PostId) -> AppResult<Post> {
        let lock = self.post_lock(post_id);
        let _guard = lock.lock().await;

        let key = QueryKey::Post(post_id.clone());
        let (post, base_was_fresh) = self.base_post(post_id).await?;
        let prior = post.liked_by.clone();
        let predicted = toggle_membership(&prior, user);

        // Optimistic-first: the visible list changes before the mutation
        // is issued.
        let mut optimistic = post.clone();
        optimistic.liked_by = predicted.clone();
        self.cache.put(key.clone(), CachedValue::Post(optimistic));
        self.set_pending(
            post_id,
            PendingInteraction::Like {
                prior: prior.clone(),
                predicted: predicted.clone(),
            },
        );

        let likes: Vec<&str> = predicted.iter().map(|u| u.as_str()).collect();
        let result = self
            .backend
            .update_document(
                &self.posts_collection,
                post_id.as_str(),
                json!({ "likes": likes }),
            )
            .await;
        self.clear_pending(post_id);

        match result {
            Ok(doc) => match Post::from_document(&doc) {
                Ok(confirmed) => {
                    self.cache.apply(&Mutation::LikePost {
                        post: post_id.clone(),
                    });
                    self.cache
                        .put(key, CachedValue::Post(confirmed.clone()));
                    Ok(confirmed)
                }
                Err(e) => {
                    // Unparseable reply: force a refetch to converge
                    self.cache.invalidate(&key);
                    Err(e)
                }
            },
            Err(e) => {
                // Roll back to the last list the backend confirmed
                let mut rolled_back = post;
                rolled_back.liked_by = prior;
                self.cache.put(key.clone(), CachedValue::Post(rolled_back));
                if !base_was_fresh {
                    self.cache.invalidate(&key);
                }
                tracing::warn!("Like toggle on {} failed, rolled back: {}", post_id, e);
                Err(e)
            }
        }
    }

    /// The user's save records, cache-through.
    pub async fn save_records(&self, user: &UserId) -> AppResult<Vec<SaveRecord>> {
        let key = QueryKey::SavedPosts(user.clone());
        if let Some(CachedValue::Saves(records)) = self.cache.get(&key) {
            return Ok(records);
        }

        let list = self
            .backend
            .list_documents(
                &self.saves_collection,
                &[Query::equal("user", user.as_str())],
            )
            .await?;
        let records = list
            .documents
            .iter()
            .map(SaveRecord::from_document)
            .collect::<AppResult<Vec<_>>>()?;
        self.cache.put(key, CachedValue::Saves(records.clone()));
        Ok(records)
    }

    pub async fn is_saved(&self, user: &UserId, post_id: &PostId) -> AppResult<bool> {
        Ok(self
            .save_records(user)
            .await?
            .iter()
            .any(|r| &r.post == post_id))
    }

    /// Create the join record if absent, delete it if present. Returns the
    /// final saved state.
    pub async fn toggle_save(&self, user: &UserId, post_id: &PostId) -> AppResult<bool> {
        let lock = self.post_lock(post_id);
        let _guard = lock.lock().await;

        let key = QueryKey::SavedPosts(user.clone());
        let records = self.save_records(user).await?;
        let existing = records.iter().find(|r| &r.post == post_id).cloned();

        match existing {
            Some(record) => {
                let remaining: Vec<SaveRecord> = records
                    .iter()
                    .filter(|r| r.id != record.id)
                    .cloned()
                    .collect();
                self.cache.put(key.clone(), CachedValue::Saves(remaining));
                self.set_pending(post_id, PendingInteraction::Save { saved: false });

                let result = self
                    .backend
                    .delete_document(&self.saves_collection, record.id.as_str())
                    .await;
                self.clear_pending(post_id);

                match result {
                    Ok(()) => {
                        self.cache.apply(&Mutation::UnsavePost { user: user.clone() });
                        Ok(false)
                    }
                    Err(e) => {
                        self.cache.put(key, CachedValue::Saves(records));
                        tracing::warn!("Unsave of {} failed, restored: {}", post_id, e);
                        Err(e)
                    }
                }
            }
            None => {
                let record_id = unique_id();
                let mut extended = records.clone();
                extended.push(SaveRecord {
                    id: SaveId::new(record_id.clone()),
                    user: user.clone(),
                    post: post_id.clone(),
                });
                self.cache.put(key.clone(), CachedValue::Saves(extended));
                self.set_pending(post_id, PendingInteraction::Save { saved: true });

                let result = self
                    .backend
                    .create_document(
                        &self.saves_collection,
                        &record_id,
                        json!({ "user": user.as_str(), "post": post_id.as_str() }),
                    )
                    .await;
                self.clear_pending(post_id);

                match result {
                    Ok(_) => {
                        self.cache.apply(&Mutation::SavePost { user: user.clone() });
                        Ok(true)
                    }
                    Err(e) => {
                        self.cache.put(key, CachedValue::Saves(records));
                        tracing::warn!("Save of {} failed, rolled back: {}", post_id, e);
                        Err(e)
                    }
                }
            }
        }
    }
}

fn toggle_membership(list: &[UserId], user: &UserId) -> Vec<UserId> {
    if list.contains(user) {
        list.iter().filter(|u| *u != user).cloned().collect()
    } else {
        let mut out = list.to_vec();
        out.push(user.clone());
        out
    }
}
