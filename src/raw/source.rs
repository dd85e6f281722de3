//! Where channel actors get raw frame data from

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::RawConfig;

/// Errors that can occur while fetching a frame
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Frame request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Frame unavailable: {0}")]
    Unavailable(String),
}

/// Source of raw pixel buffers for one channel and frame
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn fetch(&self, project_id: &str, channel: u32, frame: u32) -> Result<Vec<u8>, FetchError>;
}

/// Fetches frames from `GET /api/raw/{project_id}/{channel}/{frame}`
pub struct HttpFrameSource {
    base_url: String,
    http: Client,
}

impl HttpFrameSource {
    /// Build a source from configuration
    ///
    /// `fallback_base_url` is used when the raw section does not name its own
    /// server, normally the API base URL.
    pub fn from_config(config: &RawConfig, fallback_base_url: &str) -> Result<Self, FetchError> {
        debug!(?config, %fallback_base_url, "HttpFrameSource::from_config: called");
        let http = Client::builder().timeout(config.fetch_timeout()).build()?;
        let base_url = config.base_url.as_deref().unwrap_or(fallback_base_url);
        Ok(Self::new(base_url, http))
    }

    pub fn new(base_url: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn frame_url(&self, project_id: &str, channel: u32, frame: u32) -> String {
        format!("{}/api/raw/{}/{}/{}", self.base_url, project_id, channel, frame)
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn fetch(&self, project_id: &str, channel: u32, frame: u32) -> Result<Vec<u8>, FetchError> {
        let url = self.frame_url(project_id, channel, frame);
        debug!(%url, "HttpFrameSource::fetch: called");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
