//! Web search tool. DuckDuckGo instant-answer lookups.
//!
//! Uses the keyless `api.duckduckgo.com` JSON endpoint. The abstract (when
//! present) comes first, followed by related topics, up to five results.

use async_trait::async_trait;
use inkloop_core::error::ToolError;
use inkloop_core::tool::{Tool, ToolContext, ToolResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";
const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    endpoint: String,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Point the tool at a different instant-answer endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, reqwest::Error> {
        let answer: InstantAnswer = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(collect_results(answer, MAX_RESULTS))
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Performs a web search to verify facts, check grammar rules, research style guidelines, \
         or gather reference information for editing decisions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        debug!(query, "Running web search");

        match self.search(query).await {
            Ok(results) if results.is_empty() => Ok(ToolResult::ok(format!(
                "No results found for '{query}'."
            ))),
            Ok(results) => Ok(ToolResult::ok(format_results(&results))),
            Err(e) => {
                warn!(query, error = %e, "Web search failed");
                Ok(ToolResult::failure(format!("Error: Web search failed: {e}")))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchResult {
    title: String,
    body: String,
    url: String,
}

fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] \"{}\"\n{}\nURL: {}", i + 1, r.title, r.body, r.url))
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_results(answer: InstantAnswer, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if !answer.abstract_text.is_empty() {
        results.push(SearchResult {
            title: if answer.heading.is_empty() {
                answer.abstract_source.clone()
            } else {
                answer.heading.clone()
            },
            body: answer.abstract_text,
            url: answer.abstract_url,
        });
    }

    let mut stack: Vec<RelatedTopic> = answer.related_topics.into_iter().rev().collect();
    while let Some(topic) = stack.pop() {
        if results.len() >= limit {
            break;
        }
        match topic {
            RelatedTopic::Group { topics } => stack.extend(topics.into_iter().rev()),
            RelatedTopic::Entry { text, first_url } => {
                if text.is_empty() {
                    continue;
                }
                let title = text
                    .split(" - ")
                    .next()
                    .unwrap_or(text.as_str())
                    .to_string();
                results.push(SearchResult {
                    title,
                    body: text,
                    url: first_url,
                });
            }
        }
    }

    results.truncate(limit);
    results
}

// --- Instant-answer API types ---

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractSource", default)]
    abstract_source: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
    Entry {
        #[serde(rename = "Text", default)]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
}
