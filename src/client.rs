use crate::config::Credentials;
use crate::error::ApiError;
use crate::pagination::PageSource;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

/// Thin authenticated wrapper over the Polar REST API.
pub struct PolarClient {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl PolarClient {
    pub fn new(credentials: &Credentials) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: credentials.resolved_base_url(),
            access_token: SecretString::new(credentials.access_token.expose_secret().clone()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request. An empty `body` object is not sent at all.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Map<String, Value>>,
        query: Option<&Map<String, Value>>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(self.access_token.expose_secret());

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            req = req.query(&query_pairs(query));
        }
        if let Some(body) = body.filter(|b| !b.is_empty()) {
            req = req.json(body);
        }

        tracing::debug!(%method, endpoint, "polar request");
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(%method, endpoint, %status, "polar request rejected");
            return Err(ApiError::Status { status, body: text });
        }

        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, endpoint, None, None).await
    }
}

#[async_trait]
impl PageSource for PolarClient {
    async fn fetch_page(&self, path: &str, query: &Map<String, Value>) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None, Some(query)).await
    }
}

/// Flatten scalar filters into query pairs. Arrays repeat the key.
fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(query.len());
    for (key, value) in query {
        match value {
            Value::Null => {}
            Value::Array(values) => {
                for v in values {
                    if let Some(s) = scalar_to_string(v) {
                        pairs.push((key.clone(), s));
                    }
                }
            }
            other => {
                if let Some(s) = scalar_to_string(other) {
                    pairs.push((key.clone(), s));
                }
            }
        }
    }
    pairs
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
