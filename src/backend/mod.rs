mod http;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AppResult;

pub use self::http::HttpBackend;
pub use self::memory::{FailOp, MemoryBackend};

/// The auth account as the backend reports it. Distinct from the `User`
/// profile document, which references it by `account_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// A stored document: generated id, server timestamps, and the flat
/// field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentList {
    pub total: u64,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    pub id: String,
}

/// Preview rendering parameters for image files.
#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub gravity: String,
    pub quality: u8,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 2000,
            gravity: "top".to_string(),
            quality: 100,
        }
    }
}

/// The query operators the document store supports. Ordering attributes
/// `$createdAt` / `$updatedAt` address the document timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Equal { attribute: String, value: String },
    Search { attribute: String, term: String },
    OrderDesc { attribute: String },
    Limit(u32),
    CursorAfter(String),
}

impl Query {
    pub fn equal(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Equal {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn search(attribute: impl Into<String>, term: impl Into<String>) -> Self {
        Query::Search {
            attribute: attribute.into(),
            term: term.into(),
        }
    }

    pub fn order_desc(attribute: impl Into<String>) -> Self {
        Query::OrderDesc {
            attribute: attribute.into(),
        }
    }

    pub fn limit(limit: u32) -> Self {
        Query::Limit(limit)
    }

    pub fn cursor_after(id: impl Into<String>) -> Self {
        Query::CursorAfter(id.into())
    }
}

/// Identity operations.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn create_account(&self, email: &str, password: &str, name: &str) -> AppResult<Account>;

    async fn create_session(&self, email: &str, password: &str) -> AppResult<()>;

    /// The currently authenticated account, `None` when no session is
    /// active. Absence is not an error.
    async fn current_account(&self) -> AppResult<Option<Account>>;

    async fn delete_session(&self) -> AppResult<()>;

    /// Whether a prior session token set is persisted locally. Consulted
    /// once at startup to skip the identity round trip when it cannot
    /// possibly succeed.
    fn has_persisted_session(&self) -> bool;
}

/// Document store operations.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn create_document(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> AppResult<Document>;

    async fn get_document(&self, collection: &str, document_id: &str) -> AppResult<Document>;

    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> AppResult<Document>;

    async fn delete_document(&self, collection: &str, document_id: &str) -> AppResult<()>;

    async fn list_documents(&self, collection: &str, queries: &[Query])
        -> AppResult<DocumentList>;
}

/// File store operations.
#[async_trait]
pub trait FileApi: Send + Sync {
    async fn create_file(&self, file_id: &str, filename: &str, data: Bytes) -> AppResult<FileRef>;

    fn file_preview_url(&self, file_id: &str, opts: &PreviewOptions) -> String;

    async fn delete_file(&self, file_id: &str) -> AppResult<()>;

    /// URL of a generated initials avatar, used as the default profile
    /// image at sign-up.
    fn initials_avatar_url(&self, name: &str) -> String;
}

/// The full backend contract the client is written against.
pub trait Backend: AuthApi + DocumentApi + FileApi {}

impl<T: AuthApi + DocumentApi + FileApi> Backend for T {}

/// Generate a unique id for a new document or file.
pub fn unique_id() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..20)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
