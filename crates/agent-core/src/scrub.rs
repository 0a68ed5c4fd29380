//! Removes tool-invocation markup that models sometimes echo into prose.

use regex::Regex;

use crate::error::{AgentError, Result};

/// Strips `<tool ...>...</tool>` and `<tool .../>` for a fixed set of tool names
#[derive(Clone, Debug)]
pub struct ToolTagScrubber {
    patterns: Vec<Regex>,
    blank_runs: Regex,
}

impl ToolTagScrubber {
    pub fn new<I, S>(tool_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|e| AgentError::Config(e.to_string()));

        let mut patterns = Vec::new();
        for name in tool_names {
            let name = regex::escape(name.as_ref());
            patterns.push(compile(&format!(r"(?s)<{name}\b[^>]*>.*?</{name}>"))?);
            patterns.push(compile(&format!(r"<{name}\b[^>]*/?>"))?);
        }

        Ok(Self {
            patterns,
            blank_runs: compile(r"\n\s*\n\s*\n")?,
        })
    }

    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, "").into_owned();
        }
        // Repeat until stable so overlapping runs all collapse
        loop {
            let next = self.blank_runs.replace_all(&out, "\n\n").into_owned();
            if next == out {
                break;
            }
            out = next;
        }
        out.trim().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrubber() -> ToolTagScrubber {
        ToolTagScrubber::new(["tavily_search", "web_scraper"]).unwrap()
    }

    #[test]
    fn test_removes_paired_and_self_closing_tags() {
        let text = "Answer.\n<tavily_search query=\"x\">\nstuff\n</tavily_search>\nMore <web_scraper url=\"y\"/> text";
        assert_eq!(scrubber().scrub(text), "Answer.\n\nMore  text");
    }

    #[test]
    fn test_leaves_other_tags() {
        assert_eq!(scrubber().scrub("  <b>bold</b>  "), "<b>bold</b>");
    }

    #[test]
    fn test_collapses_blank_runs() {
        assert_eq!(scrubber().scrub("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_idempotent() {
        let s = scrubber();
        let once = s.scrub("x\n<tavily_search>q</tavily_search>\n\n\n \ny <web_scraper>");
        assert_eq!(s.scrub(&once), once);
    }
}
