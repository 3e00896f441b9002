// Infinite-feed pagination. Pages are fetched in descending update-time
// order; the cursor is the last item of the previous page. A short or
// empty page ends the feed, and an exhausted pager answers empty without
// touching the backend again.
use std::sync::Arc;

use futures::Stream;

use crate::backend::{Backend, DocumentApi, DocumentList, Query};
use crate::domain::Post;
use crate::error::AppResult;

pub fn posts_from_list(list: &DocumentList) -> AppResult<Vec<Post>> {
    list.documents.iter().map(Post::from_document).collect()
}

pub struct FeedPager {
    backend: Arc<dyn Backend>,
    posts_collection: String,
    page_size: u32,
    cursor: Option<String>,
    exhausted: bool,
}

impl FeedPager {
    pub fn new(
        backend: Arc<dyn Backend>,
        posts_collection: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            backend,
            posts_collection: posts_collection.into(),
            page_size: page_size.max(1),
            cursor: None,
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub async fn next_page(&mut self) -> AppResult<Vec<Post>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let mut queries = vec![
            Query::order_desc("$updatedAt"),
            Query::limit(self.page_size),
        ];
        if let Some(cursor) = &self.cursor {
            queries.push(Query::cursor_after(cursor.clone()));
        }

        let list = self
            .backend
            .list_documents(&self.posts_collection, &queries)
            .await?;
        let posts = posts_from_list(&list)?;

        if (posts.len() as u32) < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = posts.last() {
            self.cursor = Some(last.id.as_str().to_string());
        }
        tracing::debug!(
            page_len = posts.len(),
            exhausted = self.exhausted,
            "feed page fetched"
        );
        Ok(posts)
    }

    /// Pull-based adapter: yields non-empty pages until the feed ends.
    /// An errored fetch is yielded and the pager stays retryable.
    pub fn into_stream(self) -> impl Stream<Item = AppResult<Vec<Post>>> {
        futures::stream::unfold(self, |mut pager| async move {
            if pager.exhausted {
                return None;
            }
            match pager.next_page().await {
                Ok(posts) if posts.is_empty() => None,
                item => Some((item, pager)),
            }
        })
    }
}
