//! Tavily search API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{SearchBackend, SearchRequest, SearchResponse};
use crate::error::{ResearchError, Result};

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TavilyClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ResearchError::Config("Tavily API key is empty".into()));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: TAVILY_SEARCH_URL.into(),
        })
    }

    /// Point at a different endpoint (proxies, local stubs)
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchBackend for TavilyClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        tracing::debug!(query = %request.query, depth = ?request.depth, "Tavily search");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&wire::Request::from(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Tavily search failed");
            return Err(ResearchError::Search(format!("HTTP {}: {body}", status.as_u16())));
        }

        let mut parsed: SearchResponse = response.json().await?;
        if parsed.query.is_empty() {
            parsed.query.clone_from(&request.query);
        }
        Ok(parsed)
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

mod wire {
    use serde::Serialize;

    use crate::search::{SearchDepth, SearchRequest};

    #[derive(Serialize)]
    pub struct Request<'a> {
        pub query: &'a str,
        pub search_depth: SearchDepth,
        pub max_results: u32,
        pub include_answer: bool,
        pub include_raw_content: bool,
        pub include_images: bool,
        #[serde(skip_serializing_if = "<[String]>::is_empty")]
        pub include_domains: &'a [String],
        #[serde(skip_serializing_if = "<[String]>::is_empty")]
        pub exclude_domains: &'a [String],
    }

    impl<'a> From<&'a SearchRequest> for Request<'a> {
        fn from(req: &'a SearchRequest) -> Self {
            Self {
                query: &req.query,
                search_depth: req.depth,
                max_results: req.max_results,
                include_answer: req.include_answer,
                include_raw_content: false,
                include_images: false,
                include_domains: &req.include_domains,
                exclude_domains: &req.exclude_domains,
            }
        }
    }
}
