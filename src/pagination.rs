use crate::error::{ApiError, FetchError};
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Description of one list call. The page number is merged in per request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub path: String,
    pub query: Map<String, Value>,
    pub page_size: u32,
}

impl FetchRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Map::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The filters plus `limit` and `page` for one request. A `limit`
    /// already present in the filters is kept.
    pub fn query_for_page(&self, page: u32) -> Map<String, Value> {
        let mut query = self.query.clone();
        query
            .entry("limit")
            .or_insert_with(|| Value::from(self.page_size));
        query.insert("page".to_string(), Value::from(page));
        query
    }
}

/// The three shapes a Polar list endpoint may answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPage {
    /// `{ "items": [...], "pagination": { "next_page": n | null } }`
    Paginated { items: Vec<Value>, has_next: bool },
    /// A bare array. Always the last page.
    List(Vec<Value>),
    /// Any other value, wrapped as a single record. Always the last page.
    Single(Value),
}

impl FetchPage {
    pub fn from_response(response: Value) -> Self {
        match response {
            Value::Object(mut map) if map.get("items").is_some_and(Value::is_array) => {
                let has_next = map
                    .get("pagination")
                    .and_then(|p| p.get("next_page"))
                    .is_some_and(|n| !n.is_null());
                let items = match map.remove("items") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                FetchPage::Paginated { items, has_next }
            }
            Value::Array(items) => FetchPage::List(items),
            other => FetchPage::Single(other),
        }
    }
}

/// Issues one list request. Implemented by the API client and by test fakes.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, path: &str, query: &Map<String, Value>) -> Result<Value, ApiError>;
}

/// Walk pages 1, 2, 3, ... until the upstream signals exhaustion.
///
/// Requests are strictly sequential. Any transport failure aborts the walk
/// and the items gathered so far are dropped.
pub async fn fetch_all<S>(
    request: &FetchRequest,
    source: &S,
    max_pages: u32,
) -> Result<Vec<Value>, FetchError>
where
    S: PageSource + ?Sized,
{
    let mut accumulated = Vec::new();
    let mut page: u32 = 1;

    loop {
        let query = request.query_for_page(page);
        let response = source.fetch_page(&request.path, &query).await?;

        match FetchPage::from_response(response) {
            FetchPage::Paginated { items, has_next } => {
                tracing::debug!(path = %request.path, page, count = items.len(), has_next, "fetched page");
                accumulated.extend(items);
                if !has_next {
                    break;
                }
            }
            FetchPage::List(items) => {
                tracing::debug!(path = %request.path, page, count = items.len(), "fetched unpaginated list");
                accumulated.extend(items);
                break;
            }
            FetchPage::Single(record) => {
                accumulated.push(record);
                break;
            }
        }

        if page >= max_pages {
            tracing::warn!(path = %request.path, max_pages, "pagination cap reached");
            return Err(FetchError::PaginationExhausted { max_pages });
        }
        page += 1;
    }

    Ok(accumulated)
}
