// In-process implementation of the backend contract. Evaluates the same
// query operators over stored documents, and supports one-shot failure
// injection so flow tests can exercise every error path.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::error::{AppError, AppResult};

use super::{Account, Document, DocumentList, FileRef, PreviewOptions, Query};

/// Operations a test can make fail exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOp {
    CurrentAccount,
    DeleteSession,
    CreateDocument,
    UpdateDocument,
    DeleteDocument,
    ListDocuments,
    CreateFile,
    DeleteFile,
}

#[derive(Debug, Clone)]
struct StoredAccount {
    id: String,
    email: String,
    password: String,
    name: String,
}

#[derive(Debug, Clone)]
struct StoredFile {
    filename: String,
    bytes: Bytes,
}

struct MemoryState {
    accounts: Vec<StoredAccount>,
    /// Account id of the active session, if any
    session: Option<String>,
    collections: HashMap<String, Vec<Document>>,
    files: HashMap<String, StoredFile>,
    fail: HashSet<FailOp>,
    current_account_calls: usize,
    epoch: DateTime<Utc>,
    ticks: i64,
}

impl MemoryState {
    /// Deterministic monotonic clock so ordering by timestamp is stable
    /// even when documents are written back to back.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        self.epoch + Duration::milliseconds(self.ticks)
    }

    fn take_failure(&mut self, op: FailOp) -> AppResult<()> {
        if self.fail.remove(&op) {
            return Err(AppError::Backend {
                status: 503,
                message: format!("injected failure: {:?}", op),
            });
        }
        Ok(())
    }
}

pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                accounts: Vec::new(),
                session: None,
                collections: HashMap::new(),
                files: HashMap::new(),
                fail: HashSet::new(),
                current_account_calls: 0,
                epoch: Utc::now(),
                ticks: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory backend lock poisoned")
    }

    /// Make the next call of the given operation fail.
    pub fn fail_next(&self, op: FailOp) {
        self.lock().fail.insert(op);
    }

    pub fn has_file(&self, file_id: &str) -> bool {
        self.lock().files.contains_key(file_id)
    }

    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn current_account_calls(&self) -> usize {
        self.lock().current_account_calls
    }

    pub fn stored_file(&self, file_id: &str) -> Option<(String, Bytes)> {
        self.lock()
            .files
            .get(file_id)
            .map(|f| (f.filename.clone(), f.bytes.clone()))
    }
}

fn field_matches(data: &Value, attribute: &str, value: &str) -> bool {
    match data.get(attribute) {
        Some(Value::String(s)) => s == value,
        Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(value)),
        _ => false,
    }
}

fn field_contains(data: &Value, attribute: &str, term: &str) -> bool {
    match data.get(attribute) {
        Some(Value::String(s)) => s.to_lowercase().contains(&term.to_lowercase()),
        _ => false,
    }
}

fn order_key(doc: &Document, attribute: &str) -> (DateTime<Utc>, String) {
    let ts = match attribute {
        "$updatedAt" => doc.updated_at,
        _ => doc.created_at,
    };
    (ts, doc.id.clone())
}

fn evaluate(docs: &[Document], queries: &[Query]) -> DocumentList {
    let mut results: Vec<Document> = docs.to_vec();

    for query in queries {
        match query {
            Query::Equal { attribute, value } => {
                results.retain(|d| field_matches(&d.data, attribute, value));
            }
            Query::Search { attribute, term } => {
                results.retain(|d| field_contains(&d.data, attribute, term));
            }
            _ => {}
        }
    }

    if let Some(attribute) = queries.iter().find_map(|q| match q {
        Query::OrderDesc { attribute } => Some(attribute.clone()),
        _ => None,
    }) {
        results.sort_by(|a, b| order_key(b, &attribute).cmp(&order_key(a, &attribute)));
    }

    let total = results.len() as u64;

    if let Some(cursor) = queries.iter().find_map(|q| match q {
        Query::CursorAfter(id) => Some(id.clone()),
        _ => None,
    }) {
        results = match results.iter().position(|d| d.id == cursor) {
            Some(pos) => results.split_off(pos + 1),
            // Cursor document no longer in the result set; the page ends
            None => Vec::new(),
        };
    }

    if let Some(limit) = queries.iter().find_map(|q| match q {
        Query::Limit(limit) => Some(*limit as usize),
        _ => None,
    }) {
        results.truncate(limit);
    }

    DocumentList {
        total,
        documents: results,
    }
}

#[async_trait::async_trait]
impl super::AuthApi for MemoryBackend {
    async fn create_account(&self, email: &str, password: &str, name: &str) -> AppResult<Account> {
        let mut state = self.lock();
        if state.accounts.iter().any(|a| a.email == email) {
            return Err(AppError::Backend {
                status: 409,
                message: "account already exists".into(),
            });
        }
        let account = StoredAccount {
            id: uuid::Uuid::now_v7().to_string(),
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        state.accounts.push(account.clone());
        Ok(Account {
            id: account.id,
            email: account.email,
            name: account.name,
        })
    }

    async fn create_session(&self, email: &str, password: &str) -> AppResult<()> {
        let mut state = self.lock();
        let account = state
            .accounts
            .iter()
            .find(|a| a.email == email && a.password == password)
            .cloned();
        match account {
            Some(account) => {
                state.session = Some(account.id);
                Ok(())
            }
            None => Err(AppError::Unauthorized),
        }
    }

    async fn current_account(&self) -> AppResult<Option<Account>> {
        let mut state = self.lock();
        state.current_account_calls += 1;
        state.take_failure(FailOp::CurrentAccount)?;
        let Some(session) = state.session.clone() else {
            return Ok(None);
        };
        Ok(state
            .accounts
            .iter()
            .find(|a| a.id == session)
            .map(|a| Account {
                id: a.id.clone(),
                email: a.email.clone(),
                name: a.name.clone(),
            }))
    }

    async fn delete_session(&self) -> AppResult<()> {
        let mut state = self.lock();
        state.take_failure(FailOp::DeleteSession)?;
        state.session = None;
        Ok(())
    }

    fn has_persisted_session(&self) -> bool {
        self.lock().session.is_some()
    }
}

#[async_trait::async_trait]
impl super::DocumentApi for MemoryBackend {
    async fn create_document(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> AppResult<Document> {
        let mut state = self.lock();
        state.take_failure(FailOp::CreateDocument)?;
        let now = state.now();
        let docs = state.collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.id == document_id) {
            return Err(AppError::Backend {
                status: 409,
                message: format!("document {} already exists", document_id),
            });
        }
        let doc = Document {
            id: document_id.to_string(),
            created_at: now,
            updated_at: now,
            data,
        };
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, collection: &str, document_id: &str) -> AppResult<Document> {
        let state = self.lock();
        state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == document_id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("document {}", document_id)))
    }

    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> AppResult<Document> {
        let mut state = self.lock();
        state.take_failure(FailOp::UpdateDocument)?;
        let now = state.now();
        let doc = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == document_id))
            .ok_or_else(|| AppError::NotFound(format!("document {}", document_id)))?;

        // Patch semantics: only the provided fields change
        if let (Value::Object(existing), Value::Object(updates)) = (&mut doc.data, data) {
            for (key, value) in updates {
                existing.insert(key, value);
            }
        }
        doc.updated_at = now;
        Ok(doc.clone())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.take_failure(FailOp::DeleteDocument)?;
        let docs = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| AppError::NotFound(format!("collection {}", collection)))?;
        let before = docs.len();
        docs.retain(|d| d.id != document_id);
        if docs.len() == before {
            return Err(AppError::NotFound(format!("document {}", document_id)));
        }
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> AppResult<DocumentList> {
        let mut state = self.lock();
        state.take_failure(FailOp::ListDocuments)?;
        let docs = state
            .collections
            .get(collection)
            .map(|d| d.as_slice())
            .unwrap_or(&[]);
        Ok(evaluate(docs, queries))
    }
}

#[async_trait::async_trait]
impl super::FileApi for MemoryBackend {
    async fn create_file(&self, file_id: &str, filename: &str, data: Bytes) -> AppResult<FileRef> {
        let mut state = self.lock();
        state.take_failure(FailOp::CreateFile)?;
        state.files.insert(
            file_id.to_string(),
            StoredFile {
                filename: filename.to_string(),
                bytes: data,
            },
        );
        Ok(FileRef {
            id: file_id.to_string(),
        })
    }

    fn file_preview_url(&self, file_id: &str, opts: &PreviewOptions) -> String {
        format!(
            "memory://files/{}/preview?width={}&height={}",
            file_id, opts.width, opts.height
        )
    }

    async fn delete_file(&self, file_id: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.take_failure(FailOp::DeleteFile)?;
        if state.files.remove(file_id).is_none() {
            return Err(AppError::NotFound(format!("file {}", file_id)));
        }
        Ok(())
    }

    fn initials_avatar_url(&self, name: &str) -> String {
        format!("memory://avatars/{}", name.replace(' ', "+"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthApi, DocumentApi, FileApi};
    use serde_json::json;

    #[tokio::test]
    async fn session_lifecycle() {
        let backend = MemoryBackend::new();
        backend
            .create_account("ada@example.com", "hunter2", "Ada")
            .await
            .unwrap();

        assert!(backend
            .create_session("ada@example.com", "wrong")
            .await
            .is_err());
        assert!(!backend.has_persisted_session());

        backend
            .create_session("ada@example.com", "hunter2")
            .await
            .unwrap();
        assert!(backend.has_persisted_session());

        let account = backend.current_account().await.unwrap().unwrap();
        assert_eq!(account.email, "ada@example.com");

        backend.delete_session().await.unwrap();
        assert!(backend.current_account().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_document_patches_and_bumps_updated_at() {
        let backend = MemoryBackend::new();
        let created = backend
            .create_document("posts", "p1", json!({ "caption": "a", "likes": [] }))
            .await
            .unwrap();
        let updated = backend
            .update_document("posts", "p1", json!({ "likes": ["u1"] }))
            .await
            .unwrap();
        assert_eq!(updated.data["caption"], "a", "untouched field survives");
        assert_eq!(updated.data["likes"][0], "u1");
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn list_filters_orders_and_paginates() {
        let backend = MemoryBackend::new();
        for i in 0..5 {
            backend
                .create_document(
                    "posts",
                    &format!("p{}", i),
                    json!({ "creator": if i % 2 == 0 { "u1" } else { "u2" }, "caption": format!("post {}", i) }),
                )
                .await
                .unwrap();
        }

        let mine = backend
            .list_documents("posts", &[Query::equal("creator", "u1")])
            .await
            .unwrap();
        assert_eq!(mine.total, 3);

        let page = backend
            .list_documents(
                "posts",
                &[Query::order_desc("$createdAt"), Query::limit(2)],
            )
            .await
            .unwrap();
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.documents[0].id, "p4", "newest first");

        let next = backend
            .list_documents(
                "posts",
                &[
                    Query::order_desc("$createdAt"),
                    Query::limit(2),
                    Query::cursor_after("p3"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(next.documents[0].id, "p2");
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let backend = MemoryBackend::new();
        backend
            .create_document("posts", "p1", json!({ "caption": "Golden Sunrise" }))
            .await
            .unwrap();
        backend
            .create_document("posts", "p2", json!({ "caption": "night sky" }))
            .await
            .unwrap();

        let hits = backend
            .list_documents("posts", &[Query::search("caption", "sunrise")])
            .await
            .unwrap();
        assert_eq!(hits.documents.len(), 1);
        assert_eq!(hits.documents[0].id, "p1");
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let backend = MemoryBackend::new();
        backend.fail_next(FailOp::CreateFile);
        assert!(backend
            .create_file("f1", "a.jpg", Bytes::from_static(b"x"))
            .await
            .is_err());
        assert!(backend
            .create_file("f1", "a.jpg", Bytes::from_static(b"x"))
            .await
            .is_ok());
        assert!(backend.has_file("f1"));
    }
}
