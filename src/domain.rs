// Domain types - pure data, no side effects
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::Document;
use crate::error::{AppError, AppResult};

/// New types for compile-time safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveId(pub String);

impl SaveId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A user profile record. Doubles as the session snapshot held by the
/// session store once an identity check succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Id of the auth account backing this profile
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub bio: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserFields {
    account_id: String,
    name: String,
    #[serde(default)]
    username: String,
    email: String,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    bio: String,
}

impl User {
    pub fn from_document(doc: &Document) -> AppResult<Self> {
        let fields: UserFields = serde_json::from_value(doc.data.clone())?;
        Ok(Self {
            id: UserId::new(doc.id.clone()),
            account_id: fields.account_id,
            name: fields.name,
            username: fields.username,
            email: fields.email,
            image_url: fields.image_url,
            bio: fields.bio,
        })
    }
}

/// An image post. `liked_by` is the authoritative like set, kept in the
/// order users liked the post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub creator: UserId,
    pub caption: String,
    pub image_url: String,
    pub image_id: FileId,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub liked_by: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostFields {
    creator: String,
    caption: String,
    image_url: String,
    image_id: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    likes: Vec<String>,
}

impl Post {
    pub fn from_document(doc: &Document) -> AppResult<Self> {
        let fields: PostFields = serde_json::from_value(doc.data.clone())?;
        Ok(Self {
            id: PostId::new(doc.id.clone()),
            creator: UserId::new(fields.creator),
            caption: fields.caption,
            image_url: fields.image_url,
            image_id: FileId::new(fields.image_id),
            location: fields.location,
            tags: fields.tags,
            liked_by: fields.likes.into_iter().map(UserId::new).collect(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }

    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liked_by.contains(user)
    }
}

/// A saved-post join record. A save is never an attribute of the post
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub id: SaveId,
    pub user: UserId,
    pub post: PostId,
}

#[derive(Debug, Serialize, Deserialize)]
struct SaveFields {
    user: String,
    post: String,
}

impl SaveRecord {
    pub fn from_document(doc: &Document) -> AppResult<Self> {
        let fields: SaveFields = serde_json::from_value(doc.data.clone())?;
        Ok(Self {
            id: SaveId::new(doc.id.clone()),
            user: UserId::new(fields.user),
            post: PostId::new(fields.post),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Raw image bytes plus the original filename (used to guess the content
/// type on upload).
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: bytes::Bytes,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub creator: UserId,
    pub caption: String,
    pub image: ImageUpload,
    pub location: Option<String>,
    /// Comma-separated, parsed by `parse_tags`
    pub tags: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub post_id: PostId,
    pub caption: String,
    /// Current backing file; kept unless `new_image` is set
    pub image_id: FileId,
    pub image_url: String,
    pub new_image: Option<ImageUpload>,
    pub location: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateProfile {
    pub user_id: UserId,
    pub name: String,
    pub bio: String,
    pub image_id: Option<FileId>,
    pub image_url: String,
    pub new_image: Option<ImageUpload>,
}

/// Caption bounds from the post form.
const MAX_CAPTION_LEN: usize = 2200;

pub fn validate_caption(caption: &str) -> AppResult<()> {
    if caption.trim().is_empty() {
        return Err(AppError::Validation("Caption is required".into()));
    }
    if caption.len() > MAX_CAPTION_LEN {
        return Err(AppError::Validation(format!(
            "Caption must be at most {} characters",
            MAX_CAPTION_LEN
        )));
    }
    Ok(())
}

/// Parse a raw comma-separated tag string: spaces stripped, empties
/// dropped, duplicates collapsed keeping first occurrence.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let Some(raw) = raw else {
        return tags;
    };
    for tag in raw.replace(' ', "").split(',') {
        if tag.is_empty() {
            continue;
        }
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
