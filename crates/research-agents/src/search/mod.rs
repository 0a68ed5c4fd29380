//! Search Integration
//!
//! Abstractions over web search APIs and page fetching.

mod fetch;
mod mock;
mod tavily;

pub use fetch::HttpFetcher;
pub use mock::{MockPageFetcher, MockSearchBackend};
pub use tavily::TavilyClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    /// Lenient parse; anything but "advanced" is basic
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("advanced") {
            Self::Advanced
        } else {
            Self::Basic
        }
    }
}

/// One search request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub depth: SearchDepth,
    pub max_results: u32,
    pub include_answer: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            depth: SearchDepth::Basic,
            max_results: 5,
            include_answer: true,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }

    #[must_use]
    pub const fn depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub const fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }
}

/// A single search result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    pub url: String,
    /// Snippet
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub images: Vec<Value>,
}

/// Web search backend (Strategy pattern)
///
/// Implement this for each provider: Tavily, a test double, etc.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;

    /// Backend name
    fn name(&self) -> &str;
}

/// Raw result of fetching a URL
#[derive(Clone, Debug)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}
