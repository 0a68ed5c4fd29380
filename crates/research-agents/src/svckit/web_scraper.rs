//! Web Scraper Tool
//!
//! Fetches a page and extracts its readable main content.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use agent_core::{Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema, tool::ParameterSchema};

use crate::search::PageFetcher;

pub const WEB_SCRAPER_TOOL: &str = "web_scraper";

pub const DEFAULT_MAX_LENGTH: usize = 8000;

const TRUNCATION_MARKER: &str = "...[truncated]";

/// Elements whose text never counts as content
const SKIPPED_TAGS: [&str; 14] = [
    "script", "style", "nav", "header", "footer", "aside", "form", "button", "iframe", "noscript", "svg", "img",
    "video", "audio",
];

/// Main-content containers, most specific first
const CONTENT_SELECTORS: [&str; 10] = [
    "main",
    "article",
    "[role='main']",
    ".main-content",
    "#main-content",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".content",
    "#content",
];

static BLANK_LINES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n\s*\n").ok());
static SPACE_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r" +").ok());

/// Extracted page content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
    /// Characters in `content`, marker included
    pub content_length: usize,
}

/// Tool that reads full page content
pub struct WebScraperTool {
    fetcher: Arc<dyn PageFetcher>,
}

impl WebScraperTool {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch `url` and extract its content. Never fails; problems come back as a failed result.
    pub async fn scrape(&self, url: &str, max_length: usize) -> ToolResult<ScrapedPage> {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!(url, error = %e, "Scrape failed");
                return ToolResult::failure(e.to_string());
            }
        };

        if page.status != 200 {
            return ToolResult::failure(format!("HTTP {}: Failed to fetch URL", page.status));
        }
        if !page.content_type.contains("text/html") && !page.content_type.contains("application/xhtml") {
            return ToolResult::failure(format!("Unsupported content type: {}", page.content_type));
        }

        ToolResult::success(extract(&page.body, &page.url, max_length))
    }
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_TAGS.contains(&name)
}

fn has_skipped_ancestor(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|el| is_skipped(el.name()))
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_owned());
                }
            }
            Node::Element(el) if is_skipped(el.name()) => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).find(|el| !has_skipped_ancestor(*el))
}

fn main_content(document: &Html) -> ElementRef<'_> {
    CONTENT_SELECTORS
        .iter()
        .find_map(|selector| select_first(document, selector))
        .or_else(|| select_first(document, "body"))
        .unwrap_or_else(|| document.root_element())
}

fn normalize(text: &str) -> String {
    let text = BLANK_LINES
        .as_ref()
        .map_or_else(|| text.to_owned(), |re| re.replace_all(text, "\n\n").into_owned());
    SPACE_RUNS
        .as_ref()
        .map_or_else(|| text.clone(), |re| re.replace_all(&text, " ").into_owned())
}

fn truncate(text: String, max_length: usize) -> String {
    if text.chars().count() > max_length {
        let cut: String = text.chars().take(max_length).collect();
        format!("{cut}{TRUNCATION_MARKER}")
    } else {
        text
    }
}

/// Pull title, meta description and main text out of an HTML document
pub fn extract(html: &str, url: &str, max_length: usize) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|el| el.text().collect::<String>().trim().to_owned())
        .unwrap_or_default();

    let description = Selector::parse("meta[name='description']")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .and_then(|el| el.value().attr("content"))
        .unwrap_or_default()
        .to_owned();

    let mut parts = Vec::new();
    collect_text(main_content(&document), &mut parts);
    let content = truncate(normalize(&parts.join("\n")), max_length);

    ScrapedPage {
        url: url.to_owned(),
        title,
        description,
        content_length: content.chars().count(),
        content,
    }
}

#[async_trait]
impl Tool for WebScraperTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: WEB_SCRAPER_TOOL.into(),
            description: "Fetch and extract the main content from a webpage URL. Use this to read the full \
content of a page when you need more details than the search snippet provides."
                .into(),
            parameters: vec![
                ParameterSchema::new("url", "string", "The URL of the webpage to scrape").required(),
                ParameterSchema::new("max_length", "integer", "Maximum content length to return")
                    .default_value(DEFAULT_MAX_LENGTH),
            ],
            category: Some("research".into()),
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let Some(url) = call.str_arg("url") else {
            return Ok(ToolResult::failure("url is required"));
        };
        let max_length = call
            .arguments
            .get("max_length")
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_LENGTH);

        Ok(self.scrape(url, max_length).await.map(|page| serde_json::to_value(page).unwrap_or_default()))
    }
}
