use super::wire::{FileResponse, NodesResponse};
use super::{NodeBatch, RemoteSource};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use figpack_extract::Document;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::instrument;

const TOKEN_HEADER: &str = "X-Figma-Token";
const USER_AGENT: &str = concat!("figpack/", env!("CARGO_PKG_VERSION"));

/// [`RemoteSource`] backed by the REST API.
pub struct HttpSource {
    name: String,
    client: Client,
    base_url: String,
    token: String,
}

impl HttpSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.figma.com/v1";

    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .or_raise(|| ErrorKind::Network("failed to build HTTP client".to_string()))?;
        Ok(Self {
            name: "http".to_string(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)], subject: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .query(query)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(subject.to_string()))?;
        let response = check_status(response, subject)?;
        response.json::<T>().await.or_raise(|| ErrorKind::InvalidResponse(subject.to_string()))
    }
}

fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    tracing::debug!(status = status.as_u16(), subject, "Remote source rejected request");
    exn::bail!(match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited(retry_after(response.headers())),
        StatusCode::NOT_FOUND => ErrorKind::NotFound(subject.to_string()),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ErrorKind::Forbidden(subject.to_string()),
        other => ErrorKind::Http(other.as_u16()),
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl RemoteSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn fetch_file(&self, file_key: &str, depth: u32) -> Result<Document> {
        let url = format!("{}/files/{file_key}", self.base_url);
        let subject = format!("file {file_key}");
        let response: FileResponse = self.get_json(&url, &[("depth", depth.to_string())], &subject).await?;
        Ok(response.into())
    }

    #[instrument(skip(self, ids), fields(source = %self.name, ids = ids.len()))]
    async fn fetch_nodes(&self, file_key: &str, ids: &[String], depth: u32) -> Result<NodeBatch> {
        let url = format!("{}/files/{file_key}/nodes", self.base_url);
        let subject = format!("nodes of file {file_key}");
        let query = [("ids", ids.join(",")), ("depth", depth.to_string())];
        let response: NodesResponse = self.get_json(&url, &query, &subject).await?;
        Ok(response.into())
    }
}
