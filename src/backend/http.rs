// HTTP adapter for the hosted backend. Speaks the vendor's REST surface:
// JSON for accounts/sessions/documents, multipart for file uploads. The
// session cookies returned at sign-in are persisted under the data
// directory; that file is the client-local token set consulted at startup.
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header;
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use crate::config::BackendConfig;
use crate::error::{AppError, AppResult};

use super::{Account, Document, DocumentList, FileRef, PreviewOptions, Query};

pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    database_id: String,
    bucket_id: String,
    session_path: PathBuf,
    cookies: RwLock<Vec<String>>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, data_dir: &Path) -> AppResult<Self> {
        Url::parse(&config.endpoint)
            .map_err(|e| AppError::Validation(format!("Invalid backend endpoint: {}", e)))?;

        let session_path = data_dir.join("session.json");
        let cookies = load_cookies(&session_path);

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            database_id: config.database_id.clone(),
            bucket_id: config.bucket_id.clone(),
            session_path,
            cookies: RwLock::new(cookies),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn documents_url(&self, collection: &str) -> String {
        self.url(&format!(
            "databases/{}/collections/{}/documents",
            self.database_id, collection
        ))
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, url)
            .header("X-Appwrite-Project", &self.project_id);
        let cookies = self.cookies.read().expect("cookie store lock poisoned");
        if !cookies.is_empty() {
            req = req.header(header::COOKIE, cookies.join("; "));
        }
        req
    }

    async fn send_checked(&self, req: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| status.to_string());

        match status.as_u16() {
            401 => Err(AppError::Unauthorized),
            404 => Err(AppError::NotFound(message)),
            code => Err(AppError::Backend {
                status: code,
                message,
            }),
        }
    }

    fn set_session_cookies(&self, new_cookies: Vec<String>) {
        {
            let mut cookies = self.cookies.write().expect("cookie store lock poisoned");
            *cookies = new_cookies;
        }
        self.persist_cookies();
    }

    fn persist_cookies(&self) {
        let cookies = self.cookies.read().expect("cookie store lock poisoned");
        let result = serde_json::to_vec(&*cookies)
            .map_err(AppError::from)
            .and_then(|body| std::fs::write(&self.session_path, body).map_err(AppError::from));
        if let Err(e) = result {
            tracing::warn!("Failed to persist session tokens: {}", e);
        }
    }

    fn clear_persisted_session(&self) {
        self.cookies
            .write()
            .expect("cookie store lock poisoned")
            .clear();
        if self.session_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.session_path) {
                tracing::warn!("Failed to remove persisted session tokens: {}", e);
            }
        }
    }
}

fn load_cookies(path: &Path) -> Vec<String> {
    let Ok(body) = std::fs::read(path) else {
        return Vec::new();
    };
    serde_json::from_slice(&body).unwrap_or_default()
}

fn parse_timestamp(value: &Value, key: &str) -> AppResult<DateTime<Utc>> {
    let raw = value
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Internal(format!("document missing {}", key)))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("bad {} timestamp: {}", key, e)))
}

/// Split a raw document payload into metadata and the plain field map.
/// Metadata keys are `$`-prefixed on the wire.
fn parse_document(value: Value) -> AppResult<Document> {
    let id = value
        .get("$id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Internal("document missing $id".into()))?
        .to_string();
    let created_at = parse_timestamp(&value, "$createdAt")?;
    let updated_at = parse_timestamp(&value, "$updatedAt")?;

    let data = match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !k.starts_with('$'))
                .collect(),
        ),
        _ => return Err(AppError::Internal("document payload is not an object".into())),
    };

    Ok(Document {
        id,
        created_at,
        updated_at,
        data,
    })
}

fn parse_account(value: &Value) -> AppResult<Account> {
    let field = |key: &str| -> AppResult<String> {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| AppError::Internal(format!("account missing {}", key)))
    };
    Ok(Account {
        id: field("$id")?,
        email: field("email")?,
        name: field("name")?,
    })
}

/// The wire form of a query operator.
fn wire_query(query: &Query) -> String {
    match query {
        Query::Equal { attribute, value } => {
            format!(
                "equal(\"{}\", [{}])",
                attribute,
                Value::String(value.clone())
            )
        }
        Query::Search { attribute, term } => {
            format!(
                "search(\"{}\", [{}])",
                attribute,
                Value::String(term.clone())
            )
        }
        Query::OrderDesc { attribute } => format!("orderDesc(\"{}\")", attribute),
        Query::Limit(limit) => format!("limit({})", limit),
        Query::CursorAfter(id) => format!("cursorAfter({})", Value::String(id.clone())),
    }
}

#[async_trait::async_trait]
impl super::AuthApi for HttpBackend {
    async fn create_account(&self, email: &str, password: &str, name: &str) -> AppResult<Account> {
        let body = json!({
            "userId": super::unique_id(),
            "email": email,
            "password": password,
            "name": name,
        });
        let resp = self
            .send_checked(self.request(Method::POST, self.url("account")).json(&body))
            .await?;
        parse_account(&resp.json::<Value>().await?)
    }

    async fn create_session(&self, email: &str, password: &str) -> AppResult<()> {
        let body = json!({ "email": email, "password": password });
        let resp = self
            .send_checked(
                self.request(Method::POST, self.url("account/sessions/email"))
                    .json(&body),
            )
            .await?;

        let cookies: Vec<String> = resp
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        if !cookies.is_empty() {
            self.set_session_cookies(cookies);
        }
        Ok(())
    }

    async fn current_account(&self) -> AppResult<Option<Account>> {
        let resp = self.request(Method::GET, self.url("account")).send().await?;
        if resp.status().as_u16() == 401 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(AppError::Backend {
                status,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(Some(parse_account(&resp.json::<Value>().await?)?))
    }

    async fn delete_session(&self) -> AppResult<()> {
        let result = self
            .send_checked(self.request(Method::DELETE, self.url("account/sessions/current")))
            .await;
        // The local token set is gone either way; a dangling remote
        // session expires on its own.
        self.clear_persisted_session();
        result.map(|_| ())
    }

    fn has_persisted_session(&self) -> bool {
        !self
            .cookies
            .read()
            .expect("cookie store lock poisoned")
            .is_empty()
    }
}

#[async_trait::async_trait]
impl super::DocumentApi for HttpBackend {
    async fn create_document(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> AppResult<Document> {
        let body = json!({ "documentId": document_id, "data": data });
        let resp = self
            .send_checked(
                self.request(Method::POST, self.documents_url(collection))
                    .json(&body),
            )
            .await?;
        parse_document(resp.json::<Value>().await?)
    }

    async fn get_document(&self, collection: &str, document_id: &str) -> AppResult<Document> {
        let url = format!("{}/{}", self.documents_url(collection), document_id);
        let resp = self.send_checked(self.request(Method::GET, url)).await?;
        parse_document(resp.json::<Value>().await?)
    }

    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> AppResult<Document> {
        let url = format!("{}/{}", self.documents_url(collection), document_id);
        let body = json!({ "data": data });
        let resp = self
            .send_checked(self.request(Method::PATCH, url).json(&body))
            .await?;
        parse_document(resp.json::<Value>().await?)
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> AppResult<()> {
        let url = format!("{}/{}", self.documents_url(collection), document_id);
        self.send_checked(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> AppResult<DocumentList> {
        let params: Vec<(String, String)> = queries
            .iter()
            .map(|q| ("queries[]".to_string(), wire_query(q)))
            .collect();
        let resp = self
            .send_checked(
                self.request(Method::GET, self.documents_url(collection))
                    .query(&params),
            )
            .await?;

        let body = resp.json::<Value>().await?;
        let total = body.get("total").and_then(|t| t.as_u64()).unwrap_or(0);
        let raw = body
            .get("documents")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();
        let documents = raw
            .into_iter()
            .map(parse_document)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(DocumentList { total, documents })
    }
}

#[async_trait::async_trait]
impl super::FileApi for HttpBackend {
    async fn create_file(&self, file_id: &str, filename: &str, data: Bytes) -> AppResult<FileRef> {
        let mime = mime_guess::from_path(filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(&mime)?;
        let form = reqwest::multipart::Form::new()
            .text("fileId", file_id.to_string())
            .part("file", part);

        let url = self.url(&format!("storage/buckets/{}/files", self.bucket_id));
        let resp = self
            .send_checked(self.request(Method::POST, url).multipart(form))
            .await?;
        let body = resp.json::<Value>().await?;
        let id = body
            .get("$id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Internal("file response missing $id".into()))?
            .to_string();
        Ok(FileRef { id })
    }

    fn file_preview_url(&self, file_id: &str, opts: &PreviewOptions) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("width", &opts.width.to_string())
            .append_pair("height", &opts.height.to_string())
            .append_pair("gravity", &opts.gravity)
            .append_pair("quality", &opts.quality.to_string())
            .append_pair("project", &self.project_id)
            .finish();
        format!(
            "{}?{}",
            self.url(&format!(
                "storage/buckets/{}/files/{}/preview",
                self.bucket_id, file_id
            )),
            query
        )
    }

    async fn delete_file(&self, file_id: &str) -> AppResult<()> {
        let url = self.url(&format!(
            "storage/buckets/{}/files/{}",
            self.bucket_id, file_id
        ));
        self.send_checked(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    fn initials_avatar_url(&self, name: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("name", name)
            .append_pair("project", &self.project_id)
            .finish();
        format!("{}?{}", self.url("avatars/initials"), query)
    }
}
