//! Remote schema retrieval through the GitHub contents API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{StatusCode, Url};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;

use crate::schema::RawSchemaText;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the remote schema lives.
///
/// `Debug` and `Display` never show the token.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteSchemaLocator {
    pub owner: String,
    pub repo: String,
    pub path: String,
    token: String,
    pub git_ref: Option<String>,
    pub api_url: String,
}

impl RemoteSchemaLocator {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            path: path.into(),
            token: token.into(),
            git_ref: None,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Branch, tag or commit to read from.
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `{api}/repos/{owner}/{repo}/contents/{path}[?ref={git_ref}]`
    ///
    /// Each path segment is percent-encoded, so `?` and `#` stay in the path.
    pub fn contents_url(&self) -> Result<Url, FetchError> {
        let invalid = |reason: String| FetchError::InvalidApiUrl {
            url: self.api_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(self.path.split('/').filter(|segment| !segment.is_empty()));
        if let Some(git_ref) = &self.git_ref {
            url.query_pairs_mut().append_pair("ref", git_ref);
        }
        Ok(url)
    }
}

impl fmt::Display for RemoteSchemaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.repo, self.path)?;
        if let Some(git_ref) = &self.git_ref {
            write!(f, "@{}", git_ref)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RemoteSchemaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSchemaLocator")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("path", &self.path)
            .field("token", &"<redacted>")
            .field("git_ref", &self.git_ref)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Access denied (HTTP {status}); check the token and its access to the repository")]
    Unauthorized { status: u16 },

    #[error("Unexpected HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("'{path}' is a {kind}, not a file")]
    NotAFile { path: String, kind: String },

    #[error("Failed to decode file content: {0}")]
    Decode(String),

    #[error("Invalid API URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },
}

/// Source of the remote schema text.
///
/// `Ok(None)` means the artifact does not exist at the locator.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch(&self, locator: &RemoteSchemaLocator) -> Result<Option<RawSchemaText>, FetchError>;
}

/// [`SchemaSource`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubSchemaSource {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl GitHubSchemaSource {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, locator: &RemoteSchemaLocator, accept: &'static str) -> Result<reqwest::Response, FetchError> {
        let request = self
            .client
            .get(locator.contents_url()?)
            .headers(request_headers(accept))
            .bearer_auth(locator.token());
        Ok(request.send().await?)
    }

    async fn fetch_raw(&self, locator: &RemoteSchemaLocator) -> Result<String, FetchError> {
        let response = check_status(self.get(locator, RAW_MEDIA_TYPE).await?).await?;
        let bytes = response.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SchemaSource for GitHubSchemaSource {
    async fn fetch(&self, locator: &RemoteSchemaLocator) -> Result<Option<RawSchemaText>, FetchError> {
        tracing::debug!(locator = %locator, "fetching remote schema");

        let response = self.get(locator, JSON_MEDIA_TYPE).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;

        let body: serde_json::Value = response.json().await?;
        let entry: ContentEntry = match body {
            serde_json::Value::Array(_) => {
                return Err(FetchError::NotAFile {
                    path: locator.path.clone(),
                    kind: "directory".to_string(),
                });
            }
            other => serde_json::from_value(other).map_err(|e| FetchError::Decode(e.to_string()))?,
        };

        if entry.kind != "file" {
            return Err(FetchError::NotAFile {
                path: locator.path.clone(),
                kind: entry.kind,
            });
        }

        let text = match (entry.encoding.as_deref(), entry.content.as_deref()) {
            (Some("base64"), Some(content)) => decode_base64_content(content)?,
            // Files above the inline size limit come back without content.
            (Some("none"), _) | (None, _) | (_, None) => self.fetch_raw(locator).await?,
            (Some(other), Some(_)) => {
                return Err(FetchError::Decode(format!("unsupported encoding '{}'", other)));
            }
        };

        tracing::info!(locator = %locator, bytes = text.len(), "remote schema fetched");
        Ok(Some(RawSchemaText::new(format!("github:{}", locator), text)))
    }
}

fn request_headers(accept: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("graph_gateway/", env!("CARGO_PKG_VERSION"))),
    );
    headers
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Unauthorized {
            status: status.as_u16(),
        });
    }
    let message = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    Err(FetchError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Decode the contents API's base64 payload.
///
/// Only the line breaks GitHub inserts are removed; the decoded bytes must be
/// UTF-8 and are returned unchanged.
pub fn decode_base64_content(content: &str) -> Result<String, FetchError> {
    let compact: String = content.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| FetchError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| FetchError::Decode(e.to_string()))
}
