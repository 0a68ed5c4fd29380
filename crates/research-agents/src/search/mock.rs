//! Mock search backend and page fetcher
//!
//! For testing and demo purposes. Returns canned results without network access.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{FetchedPage, PageFetcher, SearchBackend, SearchHit, SearchRequest, SearchResponse};
use crate::error::{ResearchError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn slug(query: &str) -> String {
    query
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Search backend with deterministic results
#[derive(Default)]
pub struct MockSearchBackend {
    canned: HashMap<String, SearchResponse>,
    failing: HashSet<String>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl MockSearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with a fixed response
    #[must_use]
    pub fn with_response(mut self, query: impl Into<String>, response: SearchResponse) -> Self {
        self.canned.insert(query.into(), response);
        self
    }

    /// Fail every search for `query`
    #[must_use]
    pub fn fail_on(mut self, query: impl Into<String>) -> Self {
        self.failing.insert(query.into());
        self
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<SearchRequest> {
        lock(&self.requests).clone()
    }

    fn generated(request: &SearchRequest) -> SearchResponse {
        let slug = slug(&request.query);
        let count = request.max_results.min(3);
        SearchResponse {
            query: request.query.clone(),
            answer: Some(format!("Summary for {}", request.query)),
            results: (1..=count)
                .map(|i| SearchHit {
                    title: format!("{} result {i}", request.query),
                    url: format!("https://example.com/{slug}-{i}"),
                    content: format!("Snippet {i} about {}", request.query),
                    score: Some(1.0 - f64::from(i) * 0.1),
                })
                .collect(),
            images: Vec::new(),
        }
    }
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        lock(&self.requests).push(request.clone());

        if self.failing.contains(&request.query) {
            return Err(ResearchError::Search(format!("Simulated outage for '{}'", request.query)));
        }

        Ok(self
            .canned
            .get(&request.query)
            .cloned()
            .unwrap_or_else(|| Self::generated(request)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Page fetcher serving simple generated HTML
#[derive(Default)]
pub struct MockPageFetcher {
    pages: HashMap<String, FetchedPage>,
    failing: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url`
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        self.pages.insert(
            url.clone(),
            FetchedPage {
                url,
                status: 200,
                content_type: "text/html; charset=utf-8".into(),
                body: html.into(),
            },
        );
        self
    }

    /// Serve an arbitrary raw response for `url`
    #[must_use]
    pub fn with_raw(mut self, page: FetchedPage) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    #[must_use]
    pub fn fail_on(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        lock(&self.fetched).push(url.to_owned());

        if self.failing.contains(url) {
            return Err(ResearchError::Timeout);
        }

        Ok(self.pages.get(url).cloned().unwrap_or_else(|| FetchedPage {
            url: url.to_owned(),
            status: 200,
            content_type: "text/html".into(),
            body: format!(
                "<html><head><title>Page {url}</title></head>\
                 <body><nav>Menu</nav><main><p>Content of {url}</p></main></body></html>"
            ),
        }))
    }
}
