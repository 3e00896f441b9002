// Coordinates the backend, the query cache, the session store, and the
// interaction manager behind one handle. Write paths follow the
// upload-then-document order; a document failure after a successful
// upload deletes the just-uploaded file so storage never leaks.
use std::sync::Arc;

use serde_json::json;

use crate::backend::{unique_id, Backend, DocumentApi, FileApi, PreviewOptions, Query};
use crate::cache::{CachedValue, Mutation, QueryCache, QueryKey};
use crate::config::Config;
use crate::domain::{
    parse_tags, validate_caption, FileId, NewPost, Post, PostId, UpdatePost, UpdateProfile, User,
    UserId,
};
use crate::error::{AppError, AppResult};
use crate::feed::{posts_from_list, FeedPager};
use crate::interactions::Interactions;
use crate::session::SessionStore;

pub struct SnapgramClient {
    backend: Arc<dyn Backend>,
    cache: Arc<QueryCache>,
    session: SessionStore,
    interactions: Interactions,
    config: Config,
    preview: PreviewOptions,
}

impl SnapgramClient {
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Self {
        let cache = Arc::new(QueryCache::new());
        let session = SessionStore::new(backend.clone(), config.backend.users_collection.clone());
        let interactions = Interactions::new(
            backend.clone(),
            cache.clone(),
            config.backend.posts_collection.clone(),
            config.backend.saves_collection.clone(),
        );
        let preview = PreviewOptions {
            width: config.preview.width,
            height: config.preview.height,
            gravity: config.preview.gravity.clone(),
            quality: config.preview.quality,
        };
        Self {
            backend,
            cache,
            session,
            interactions,
            config,
            preview,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn interactions(&self) -> &Interactions {
        &self.interactions
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    // ------------------------------ auth ------------------------------

    /// Sign-up/sign-in/sign-out run through the session store; the cache
    /// is dropped because its entries reflect the previous identity.

    pub async fn sign_up(&self, new_user: &crate::domain::NewUser) -> AppResult<User> {
        let user = self.session.sign_up(new_user).await?;
        self.cache.clear();
        Ok(user)
    }

    pub async fn sign_in(&self, credentials: &crate::domain::Credentials) -> AppResult<User> {
        let user = self.session.sign_in(credentials).await?;
        self.cache.clear();
        Ok(user)
    }

    pub async fn sign_out(&self) {
        self.session.sign_out().await;
        self.cache.clear();
    }

    /// A fresh pager over the infinite feed.
    pub fn feed(&self) -> FeedPager {
        FeedPager::new(
            self.backend.clone(),
            self.config.backend.posts_collection.clone(),
            self.config.feed.page_size,
        )
    }

    // ------------------------- posts: writes -------------------------

    pub async fn create_post(&self, new_post: NewPost) -> AppResult<Post> {
        validate_caption(&new_post.caption)?;
        if new_post.image.bytes.is_empty() {
            return Err(AppError::Validation("An image is required".into()));
        }

        // Upload first; without a stored file there is nothing to post
        let file = self
            .backend
            .create_file(
                &unique_id(),
                &new_post.image.filename,
                new_post.image.bytes.clone(),
            )
            .await?;
        let image_url = self.backend.file_preview_url(&file.id, &self.preview);
        let tags = parse_tags(new_post.tags.as_deref());

        let data = json!({
            "creator": new_post.creator.as_str(),
            "caption": new_post.caption,
            "imageUrl": image_url,
            "imageId": file.id,
            "location": new_post.location,
            "tags": tags,
            "likes": [],
        });

        match self
            .backend
            .create_document(&self.config.backend.posts_collection, &unique_id(), data)
            .await
        {
            Ok(doc) => {
                self.cache.apply(&Mutation::CreatePost {
                    creator: new_post.creator.clone(),
                });
                let post = Post::from_document(&doc)?;
                self.cache
                    .put(QueryKey::Post(post.id.clone()), CachedValue::Post(post.clone()));
                tracing::info!("Created post {}", post.id);
                Ok(post)
            }
            Err(e) => {
                // The upload succeeded but the post does not exist; drop
                // the file so storage does not leak. Best-effort only.
                if let Err(del) = self.backend.delete_file(&file.id).await {
                    tracing::warn!("Failed to delete orphaned file {}: {}", file.id, del);
                }
                Err(e)
            }
        }
    }

    pub async fn update_post(&self, update: UpdatePost) -> AppResult<Post> {
        validate_caption(&update.caption)?;

        let replacing = update.new_image.is_some();
        let (image_id, image_url) = match &update.new_image {
            Some(image) => {
                if image.bytes.is_empty() {
                    return Err(AppError::Validation("An image is required".into()));
                }
                let file = self
                    .backend
                    .create_file(&unique_id(), &image.filename, image.bytes.clone())
                    .await?;
                let url = self.backend.file_preview_url(&file.id, &self.preview);
                (FileId::new(file.id), url)
            }
            None => (update.image_id.clone(), update.image_url.clone()),
        };

        let tags = parse_tags(update.tags.as_deref());
        let data = json!({
            "caption": update.caption,
            "imageUrl": image_url,
            "imageId": image_id.as_str(),
            "location": update.location,
            "tags": tags,
        });

        match self
            .backend
            .update_document(
                &self.config.backend.posts_collection,
                update.post_id.as_str(),
                data,
            )
            .await
        {
            Ok(doc) => {
                // The previous file goes only now, after the document
                // write has succeeded
                if replacing {
                    if let Err(e) = self.backend.delete_file(update.image_id.as_str()).await {
                        tracing::warn!(
                            "Failed to delete replaced file {}: {}",
                            update.image_id,
                            e
                        );
                    }
                }
                self.cache.apply(&Mutation::UpdatePost {
                    post: update.post_id.clone(),
                });
                let post = Post::from_document(&doc)?;
                self.cache
                    .put(QueryKey::Post(post.id.clone()), CachedValue::Post(post.clone()));
                Ok(post)
            }
            Err(e) => {
                if replacing {
                    if let Err(del) = self.backend.delete_file(image_id.as_str()).await {
                        tracing::warn!("Failed to delete new file {}: {}", image_id, del);
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn delete_post(
        &self,
        post_id: &PostId,
        image_id: &FileId,
        creator: &UserId,
    ) -> AppResult<()> {
        self.backend
            .delete_document(&self.config.backend.posts_collection, post_id.as_str())
            .await?;

        if let Err(e) = self.backend.delete_file(image_id.as_str()).await {
            tracing::warn!("Failed to delete file {} of post {}: {}", image_id, post_id, e);
        }

        self.cache.remove(&QueryKey::Post(post_id.clone()));
        self.cache.apply(&Mutation::DeletePost {
            post: post_id.clone(),
            creator: creator.clone(),
        });
        tracing::info!("Deleted post {}", post_id);
        Ok(())
    }

    pub async fn toggle_like(&self, user: &UserId, post_id: &PostId) -> AppResult<Post> {
        self.interactions.toggle_like(user, post_id).await
    }

    pub async fn toggle_save(&self, user: &UserId, post_id: &PostId) -> AppResult<bool> {
        self.interactions.toggle_save(user, post_id).await
    }

    // ------------------------- posts: reads --------------------------

    async fn cached_posts(
        &self,
        key: QueryKey,
        queries: &[Query],
    ) -> AppResult<Vec<Post>> {
        if let Some(CachedValue::Posts(posts)) = self.cache.get(&key) {
            return Ok(posts);
        }
        let list = self
            .backend
            .list_documents(&self.config.backend.posts_collection, queries)
            .await?;
        let posts = posts_from_list(&list)?;
        self.cache.put(key, CachedValue::Posts(posts.clone()));
        Ok(posts)
    }

    pub async fn recent_posts(&self) -> AppResult<Vec<Post>> {
        self.cached_posts(
            QueryKey::RecentPosts,
            &[
                Query::order_desc("$createdAt"),
                Query::limit(self.config.feed.recent_limit),
            ],
        )
        .await
    }

    pub async fn posts_by_creator(&self, creator: &UserId) -> AppResult<Vec<Post>> {
        self.cached_posts(
            QueryKey::PostsByCreator(creator.clone()),
            &[
                Query::equal("creator", creator.as_str()),
                Query::order_desc("$createdAt"),
            ],
        )
        .await
    }

    pub async fn search_posts(&self, term: &str) -> AppResult<Vec<Post>> {
        self.cached_posts(
            QueryKey::SearchPosts(term.to_string()),
            &[Query::search("caption", term)],
        )
        .await
    }

    pub async fn get_post(&self, post_id: &PostId) -> AppResult<Post> {
        let key = QueryKey::Post(post_id.clone());
        if let Some(CachedValue::Post(post)) = self.cache.get(&key) {
            return Ok(post);
        }
        let doc = self
            .backend
            .get_document(&self.config.backend.posts_collection, post_id.as_str())
            .await?;
        let post = Post::from_document(&doc)?;
        self.cache.put(key, CachedValue::Post(post.clone()));
        Ok(post)
    }

    /// The user's saved posts, most recently saved first. A save whose
    /// post has since been deleted is skipped.
    pub async fn saved_posts(&self, user: &UserId) -> AppResult<Vec<Post>> {
        let records = self.interactions.save_records(user).await?;
        let mut posts = Vec::with_capacity(records.len());
        for record in records.iter().rev() {
            match self.get_post(&record.post).await {
                Ok(post) => posts.push(post),
                Err(AppError::NotFound(_)) => {
                    tracing::debug!("Saved post {} no longer exists", record.post);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(posts)
    }

    // ------------------------------ users -----------------------------

    pub async fn current_user(&self) -> AppResult<User> {
        if let Some(CachedValue::User(user)) = self.cache.get(&QueryKey::CurrentUser) {
            return Ok(user);
        }
        if self.session.check_identity().await {
            if let Some(user) = self.session.session().await {
                self.cache
                    .put(QueryKey::CurrentUser, CachedValue::User(user.clone()));
                return Ok(user);
            }
        }
        Err(AppError::Unauthorized)
    }

    pub async fn get_user(&self, user_id: &UserId) -> AppResult<User> {
        let key = QueryKey::User(user_id.clone());
        if let Some(CachedValue::User(user)) = self.cache.get(&key) {
            return Ok(user);
        }
        let doc = self
            .backend
            .get_document(&self.config.backend.users_collection, user_id.as_str())
            .await?;
        let user = User::from_document(&doc)?;
        self.cache.put(key, CachedValue::User(user.clone()));
        Ok(user)
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        if let Some(CachedValue::Users(users)) = self.cache.get(&QueryKey::Users) {
            return Ok(users);
        }
        let list = self
            .backend
            .list_documents(
                &self.config.backend.users_collection,
                &[
                    Query::order_desc("$createdAt"),
                    Query::limit(self.config.feed.users_limit),
                ],
            )
            .await?;
        let users = list
            .documents
            .iter()
            .map(User::from_document)
            .collect::<AppResult<Vec<_>>>()?;
        self.cache.put(QueryKey::Users, CachedValue::Users(users.clone()));
        Ok(users)
    }

    pub async fn update_profile(&self, update: UpdateProfile) -> AppResult<User> {
        if update.name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".into()));
        }

        let replacing = update.new_image.is_some();
        let (image_id, image_url) = match &update.new_image {
            Some(image) => {
                let file = self
                    .backend
                    .create_file(&unique_id(), &image.filename, image.bytes.clone())
                    .await?;
                let url = self.backend.file_preview_url(&file.id, &self.preview);
                (Some(FileId::new(file.id)), url)
            }
            None => (update.image_id.clone(), update.image_url.clone()),
        };

        let data = json!({
            "name": update.name,
            "bio": update.bio,
            "imageUrl": image_url,
            "imageId": image_id.as_ref().map(|f| f.as_str()),
        });

        match self
            .backend
            .update_document(
                &self.config.backend.users_collection,
                update.user_id.as_str(),
                data,
            )
            .await
        {
            Ok(doc) => {
                if replacing {
                    if let Some(old) = &update.image_id {
                        if let Err(e) = self.backend.delete_file(old.as_str()).await {
                            tracing::warn!("Failed to delete replaced avatar {}: {}", old, e);
                        }
                    }
                }
                self.cache.apply(&Mutation::UpdateUser {
                    user: update.user_id.clone(),
                });
                let user = User::from_document(&doc)?;
                self.cache.put(
                    QueryKey::User(user.id.clone()),
                    CachedValue::User(user.clone()),
                );
                Ok(user)
            }
            Err(e) => {
                if replacing {
                    if let Some(new_file) = &image_id {
                        if let Err(del) = self.backend.delete_file(new_file.as_str()).await {
                            tracing::warn!("Failed to delete new avatar {}: {}", new_file, del);
                        }
                    }
                }
                Err(e)
            }
        }
    }
}
