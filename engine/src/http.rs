//! REST implementation of the resource collaborator.
//!
//! Route layout, relative to the configured url:
//!
//! | operation   | request                    |
//! |-------------|----------------------------|
//! | fetch_all   | `GET {url}?limit=&offset=` |
//! | fetch_one   | `GET {url}/{id}`           |
//! | create      | `POST {url}`               |
//! | update      | `PUT {url}/{id}`           |
//! | delete      | `DELETE {url}/{id}`        |
//! | extra       | `{verb} {url}{path}`       |

use crate::{
    config::{HttpVerb, MethodDef, StoreConfig},
    error::Result,
    resource::Pagination,
    Error, Record, RemoteId, Resource,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resource collaborator talking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpResource {
    client: Client,
    base_url: String,
    methods: BTreeMap<String, MethodDef>,
}

impl HttpResource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            methods: BTreeMap::new(),
        }
    }

    /// Builds a resource for the url and extra methods of `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        let mut resource = Self::new(config.url.clone());
        resource.methods = config.methods.clone();
        resource
    }

    /// Registers an extra method.
    pub fn with_method(mut self, name: impl Into<String>, def: MethodDef) -> Self {
        self.methods.insert(name.into(), def);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{url}/{id}`, with the id escaped as a single path segment.
    fn item_url(&self, id: &RemoteId) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidConfig(format!("invalid url '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidConfig(format!("url '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(&id.to_string());
        Ok(url)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        Self::check(request.send().await?).await
    }

    /// Turns non-2xx responses into [`Error::Status`].
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Error::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_record(response: Response) -> Result<Record> {
        match response.json::<Value>().await? {
            Value::Object(record) => Ok(record),
            other => Err(Error::InvalidResponse(format!(
                "expected an object, got {other}"
            ))),
        }
    }
}

fn verb_method(verb: HttpVerb) -> Method {
    match verb {
        HttpVerb::Get => Method::GET,
        HttpVerb::Post => Method::POST,
        HttpVerb::Put => Method::PUT,
        HttpVerb::Patch => Method::PATCH,
        HttpVerb::Delete => Method::DELETE,
    }
}

/// Scalar params rendered as query pairs. Nested values are skipped.
fn query_pairs(params: &Record) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), rendered))
        })
        .collect()
}

#[async_trait]
impl Resource for HttpResource {
    async fn fetch_all(&self, page: Pagination) -> Result<Vec<Record>> {
        let mut query = vec![("offset", page.offset.to_string())];
        if let Some(limit) = page.limit {
            query.push(("limit", limit.to_string()));
        }
        let response = Self::send(self.client.get(&self.base_url).query(&query)).await?;
        match response.json::<Value>().await? {
            Value::Array(values) => values
                .into_iter()
                .map(|value| match value {
                    Value::Object(record) => Ok(record),
                    other => Err(Error::InvalidResponse(format!(
                        "expected an object, got {other}"
                    ))),
                })
                .collect(),
            other => Err(Error::InvalidResponse(format!(
                "expected an array, got {other}"
            ))),
        }
    }

    async fn fetch_one(&self, id: &RemoteId) -> Result<Option<Record>> {
        let response = self.client.get(self.item_url(id)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Self::read_record(response).await.map(Some)
    }

    async fn create(&self, record: Record) -> Result<Record> {
        let response = Self::send(self.client.post(&self.base_url).json(&record)).await?;
        Self::read_record(response).await
    }

    async fn update(&self, id: &RemoteId, record: Record) -> Result<Record> {
        let response = Self::send(self.client.put(self.item_url(id)?).json(&record)).await?;
        Self::read_record(response).await
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        let response = self.client.delete(self.item_url(id)?).send().await?;
        // Already gone counts as deleted.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await.map(|_| ())
    }

    async fn call(&self, method: &str, params: Record) -> Result<Value> {
        let def = self
            .methods
            .get(method)
            .ok_or_else(|| Error::UnknownMethod(method.to_string()))?;
        let url = format!("{}{}", self.base_url, def.path);
        let request = self.client.request(verb_method(def.verb), url);
        let request = match def.verb {
            HttpVerb::Get | HttpVerb::Delete => request.query(&query_pairs(&params)),
            _ => request.json(&params),
        };
        let response = Self::send(request).await?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}
