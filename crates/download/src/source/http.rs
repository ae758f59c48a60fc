use super::AssetSource;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use exn::ResultExt;
use reqwest::Client;
use reqwest::header::ACCEPT;
use std::time::Duration;

const USER_AGENT: &str = concat!("figpack/", env!("CARGO_PKG_VERSION"));

/// [`AssetSource`] fetching over HTTP(S).
///
/// The size cap is checked against `Content-Length` up front and enforced
/// again while the body streams in, so an oversized asset is abandoned
/// without being buffered in full.
pub struct HttpAssetSource {
    name: String,
    client: Client,
}

impl HttpAssetSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .or_raise(|| ErrorKind::Network("failed to build HTTP client".to_string()))?;
        Ok(Self { name: "http".to_string(), client })
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Bytes> {
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, "image/*,*/*;q=0.8")
            .send()
            .await
            .or_raise(|| ErrorKind::Network(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::from_status(status.as_u16()));
        }
        if response.content_length().is_some_and(|length| length > max_bytes) {
            exn::bail!(ErrorKind::TooLarge(max_bytes));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.or_raise(|| ErrorKind::Network(url.to_string()))? {
            if u64::try_from(body.len() + chunk.len()).unwrap_or(u64::MAX) > max_bytes {
                exn::bail!(ErrorKind::TooLarge(max_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}
