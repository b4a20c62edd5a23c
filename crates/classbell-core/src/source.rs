//! Where raw timetable payloads come from.
//!
//! The engine never interprets the payload here; it is handed to the
//! normalizer as a loose JSON value.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::SourceError;

const USER_AGENT: &str = concat!("classbell/", env!("CARGO_PKG_VERSION"));

/// Produces the raw timetable payload.
#[async_trait]
pub trait TimetableSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, SourceError>;

    /// Human-readable origin, for logs and CLI output.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: TimetableSource + ?Sized> TimetableSource for Box<T> {
    async fn fetch(&self) -> Result<Value, SourceError> {
        (**self).fetch().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Timetable API reached over HTTP with a bearer token.
///
/// The API expects a `POST` with an empty body and answers with the JSON
/// timetable array.
pub struct HttpTimetableSource {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpTimetableSource {
    pub fn new(endpoint: Url, token: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| SourceError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            endpoint,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TimetableSource for HttpTimetableSource {
    async fn fetch(&self) -> Result<Value, SourceError> {
        let endpoint = self.endpoint.to_string();
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| SourceError::MissingCredential {
                endpoint: endpoint.clone(),
            })?;

        debug!(%endpoint, "fetching timetable");
        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|source| SourceError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|e| SourceError::Decode {
            endpoint,
            message: e.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

/// A timetable payload saved as a JSON file.
pub struct FileTimetableSource {
    path: PathBuf,
}

impl FileTimetableSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TimetableSource for FileTimetableSource {
    async fn fetch(&self) -> Result<Value, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::File {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|e| SourceError::Decode {
            endpoint: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
