// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Default cap when the caller omits `max_chars` and the embedding config
/// does not override it; mirrors `pocket_config::WebConfig::fetch_max_chars`.
pub const DEFAULT_MAX_CHARS: usize = 500_000;

#[derive(Default)]
pub struct WebFetchTool {
    pub max_chars: Option<usize>,
}

impl WebFetchTool {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars: Some(max_chars) }
    }

    fn default_max_chars(&self) -> usize {
        self.max_chars.unwrap_or(DEFAULT_MAX_CHARS)
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str { "web_fetch" }

    fn description(&self) -> &str {
        "Fetch content from a URL and convert to readable text format.\n\n\
         ## Usage\n\
         - Fetch webpage content for analysis\n\
         - Extract text from HTML pages\n\
         - Retrieve documentation or reference material\n\
         - URL must be fully-formed and valid\n\
         - Optional `selector` narrows extraction to matching CSS-selected elements\n\n\
         ## Supported\n\
         - HTTP and HTTPS URLs\n\
         - HTML content conversion to markdown\n\
         - CSS selector scoping\n\
         - Text-based content\n\n\
         ## Limitations\n\
         - No authentication support\n\
         - No binary content fetching\n\
         - No localhost or private IP access\n\
         - Read-only (no requests with side effects)\n\n\
         ## Examples\n\
         <example>\n\
         Fetch documentation:\n\
         web_fetch: url=\"https://docs.example.com/api\"\n\
         </example>\n\
         <example>\n\
         Fetch just the article body:\n\
         web_fetch: url=\"https://example.com/post\", selector=\"article\"\n\
         </example>\n\n\
         ## IMPORTANT\n\
         - Valid http/https URLs only\n\
         - Converts HTML to markdown automatically\n\
         - No authentication or side effects\n\
         - Read-only operation"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                },
                "selector": {
                    "type": "string",
                    "description": "CSS selector; when set, only matching elements are extracted"
                },
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 500000)"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Auto }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let url = match call.args.get("url").and_then(|v| v.as_str()) {
            Some(u) => u.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'url'"),
        };
        let selector = call.args.get("selector").and_then(|v| v.as_str());
        let max_chars = call.args.get("max_chars")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or_else(|| self.default_max_chars());

        debug!(url = %url, selector = ?selector, "web_fetch tool");

        match fetch_url(&url, selector, max_chars).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => ToolOutput::err(&call.id, format!("fetch error: {e}")),
        }
    }
}

async fn fetch_url(url: &str, selector: Option<&str>, max_chars: usize) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent("pocketd/1.0")
        .build()?;

    let response = client.get(url).send().await?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await?;

    let content = if content_type.contains("html") {
        let scoped = match selector {
            Some(sel) => select_html(&body, sel)?,
            None => body,
        };
        html_to_text(&scoped)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    let total_chars = content.chars().count();
    if total_chars > max_chars {
        let head: String = content.chars().take(max_chars).collect();
        Ok(format!(
            "{head}...[truncated at {max_chars} chars; total {total_chars} chars]"
        ))
    } else {
        Ok(content)
    }
}

/// Extract the inner HTML of every element matching `selector`, joined by
/// blank lines. Invalid selectors surface as an error rather than silently
/// matching nothing.
fn select_html(html: &str, selector: &str) -> anyhow::Result<String> {
    let parsed_selector = scraper::Selector::parse(selector)
        .map_err(|e| anyhow::anyhow!("invalid CSS selector {selector:?}: {e:?}"))?;
    let document = scraper::Html::parse_document(html);
    let matched: Vec<String> = document
        .select(&parsed_selector)
        .map(|el| el.html())
        .collect();
    Ok(matched.join("\n\n"))
}

/// Convert HTML to plain text using html2text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn schema_requires_url() {
        use crate::tool::Tool;
        let t = WebFetchTool::default();
        let schema = t.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v.as_str() == Some("url")));
    }

    #[test]
    fn default_max_chars_is_500k() {
        let t = WebFetchTool::default();
        assert_eq!(t.default_max_chars(), 500_000);
    }

    #[test]
    fn new_overrides_default_max_chars() {
        let t = WebFetchTool::new(1_000);
        assert_eq!(t.default_max_chars(), 1_000);
    }

    #[test]
    fn select_html_extracts_matching_elements() {
        let html = "<html><body><article>Keep me</article><aside>Drop me</aside></body></html>";
        let result = select_html(html, "article").unwrap();
        assert!(result.contains("Keep me"));
        assert!(!result.contains("Drop me"));
    }

    #[test]
    fn select_html_rejects_invalid_selector() {
        let html = "<html></html>";
        assert!(select_html(html, ":::not-a-selector").is_err());
    }

    #[tokio::test]
    async fn truncation_does_not_panic_on_multibyte_boundary() {
        // Every character is 3 bytes in UTF-8; a byte-index slice at an odd
        // offset would land mid-codepoint and panic.
        let content: String = std::iter::repeat('\u{2603}').take(10).collect();
        let result = fetch_truncate_for_test(&content, 3);
        assert!(result.starts_with("\u{2603}\u{2603}\u{2603}"));
        assert!(result.contains("truncated at 3 chars"));
    }

    /// Exercise the truncation logic in `fetch_url` without a network call.
    fn fetch_truncate_for_test(content: &str, max_chars: usize) -> String {
        let total_chars = content.chars().count();
        if total_chars > max_chars {
            let head: String = content.chars().take(max_chars).collect();
            format!("{head}...[truncated at {max_chars} chars; total {total_chars} chars]")
        } else {
            content.to_string()
        }
    }
}
