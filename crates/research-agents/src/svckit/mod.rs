//! Service Kit - Agent Tools
//!
//! Research tools that implement `agent_core::Tool`.

mod deep_search;
mod web_scraper;
mod web_search;

pub use deep_search::{
    DEEP_SEARCH_TOOL, DeepResearch, DeepSearchOptions, DeepSearchTool, PageExcerpt, SourceRef,
};
pub use web_scraper::{ScrapedPage, WEB_SCRAPER_TOOL, WebScraperTool, extract};
pub use web_search::{WEB_SEARCH_TOOL, WebSearchTool};
