//! Imageboard JSON client
//!
//! Fetches the board index and individual threads, and pulls clip
//! attachment URLs out of the posts.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Board API error types
#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Board returned HTTP {0}")]
    Status(StatusCode),

    #[error("Invalid response: {0}")]
    Parse(String),

    #[error("Invalid board URL: {0}")]
    InvalidUrl(String),
}

impl BoardError {
    /// The board answered and said the resource is not there
    pub fn is_gone(&self) -> bool {
        matches!(self, BoardError::Status(_))
    }
}

// =============================================================================
// Wire Format
// =============================================================================

/// `index.json` and `res/<num>.json` share the same envelope
#[derive(Debug, Deserialize)]
pub struct BoardPage {
    #[serde(default)]
    pub threads: Vec<ThreadPage>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadPage {
    #[serde(default)]
    pub posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
pub struct Post {
    pub num: PostNumber,
    #[serde(default)]
    pub comment: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<Attachment>,
}

/// Post numbers show up as integers on some boards and strings on others
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PostNumber {
    Int(u64),
    Text(String),
}

impl std::fmt::Display for PostNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostNumber::Int(n) => write!(f, "{}", n),
            PostNumber::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub path: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Attachment>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let files: Option<Vec<Attachment>> = Option::deserialize(deserializer)?;
    Ok(files.unwrap_or_default())
}

impl BoardPage {
    /// Parse a board or thread payload
    pub fn parse(body: &str) -> Result<Self, BoardError> {
        serde_json::from_str(body).map_err(|e| BoardError::Parse(format!("JSON parse error: {}", e)))
    }
}

// =============================================================================
// Clip Extraction
// =============================================================================

/// Decides which attachments are playable clips
#[derive(Debug, Clone)]
pub struct ClipMatcher {
    extensions: Vec<String>,
}

impl ClipMatcher {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// True if the attachment path ends in one of the clip extensions
    pub fn is_clip(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let Some((_, ext)) = path.rsplit_once('.') else {
            return false;
        };
        if ext.contains('/') {
            return false;
        }
        let ext = ext.to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    /// True if any attachment of the post is a clip
    pub fn has_clip(&self, post: &Post) -> bool {
        post.files.iter().any(|f| self.is_clip(&f.path))
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl Default for ClipMatcher {
    fn default() -> Self {
        Self::new(["webm", "mp4"])
    }
}

// =============================================================================
// Client
// =============================================================================

/// Board API client
pub struct BoardClient {
    base_url: Url,
    client: reqwest::Client,
}

impl BoardClient {
    /// Create a client for a board base URL such as `https://2ch.hk/b/`
    pub fn new(base_url: &str) -> Result<Self, BoardError> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: &str) -> BoardClientBuilder {
        BoardClientBuilder {
            base_url: base_url.to_string(),
            cookie: None,
            user_agent: None,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the board index
    pub fn index_url(&self) -> Result<Url, BoardError> {
        self.join("index.json")
    }

    /// Relative thread key for an opening post number
    pub fn thread_key(num: &PostNumber) -> String {
        format!("res/{}.json", num)
    }

    /// Resolve a thread key or attachment path against the board base
    pub fn join(&self, path: &str) -> Result<Url, BoardError> {
        self.base_url
            .join(path)
            .map_err(|e| BoardError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Fetch and parse the board index
    pub async fn fetch_index(&self) -> Result<BoardPage, BoardError> {
        let url = self.index_url()?;
        self.fetch_page(url).await
    }

    /// Fetch and parse a thread by its key (`res/<num>.json`)
    pub async fn fetch_thread(&self, key: &str) -> Result<BoardPage, BoardError> {
        let url = self.join(key)?;
        self.fetch_page(url).await
    }

    /// Absolute clip URLs from every post of a thread page, in post order
    pub fn extract_clips(&self, page: &BoardPage, matcher: &ClipMatcher) -> Vec<String> {
        page.threads
            .first()
            .map(|thread| {
                thread
                    .posts
                    .iter()
                    .flat_map(|post| post.files.iter())
                    .filter(|file| matcher.is_clip(&file.path))
                    .filter_map(|file| match self.join(&file.path) {
                        Ok(url) => Some(url.to_string()),
                        Err(e) => {
                            tracing::warn!(path = %file.path, error = %e, "Skipping attachment");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn fetch_page(&self, url: Url) -> Result<BoardPage, BoardError> {
        tracing::debug!(%url, "Fetching board page");
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                BoardPage::parse(&body)
            }
            status => Err(BoardError::Status(status)),
        }
    }
}

/// Builder for [`BoardClient`]
pub struct BoardClientBuilder {
    base_url: String,
    cookie: Option<String>,
    user_agent: Option<String>,
    timeout: Duration,
}

impl BoardClientBuilder {
    /// Cloudflare `cf_clearance` cookie value
    pub fn cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<BoardClient, BoardError> {
        // Url::join drops the last segment unless the base ends with a slash
        let base = if self.base_url.ends_with('/') {
            self.base_url
        } else {
            format!("{}/", self.base_url)
        };
        let base_url =
            Url::parse(&base).map_err(|e| BoardError::InvalidUrl(format!("{}: {}", base, e)))?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = self.cookie.as_deref() {
            let value = HeaderValue::from_str(&format!("cf_clearance={}", cookie))
                .map_err(|e| BoardError::InvalidUrl(format!("cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }
        if let Some(agent) = self.user_agent.as_deref() {
            let value = HeaderValue::from_str(agent)
                .map_err(|e| BoardError::InvalidUrl(format!("user agent: {}", e)))?;
            headers.insert(USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?;

        Ok(BoardClient { base_url, client })
    }
}
