//! Context buffer for tools executed by agentic models.
//!
//! Agentic models (the compound family) report the searches and code runs
//! they performed while answering. Recent results are kept in a bounded
//! buffer and summarized into a system message on the next request so
//! follow-up questions can build on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ExecutedTool, ToolKind};

/// How many entries of each kind are retained; oldest evicted first.
const MAX_RETAINED: usize = 20;

/// How many entries of each kind make it into the model-facing summary.
const SUMMARY_DEPTH: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub title: String,
    pub results: Vec<SearchHit>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeExecutionRecord {
    pub code: String,
    pub result: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AgenticContext {
    search_results: Vec<SearchRecord>,
    code_executions: Vec<CodeExecutionRecord>,
}

impl AgenticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.search_results.is_empty() && self.code_executions.is_empty()
    }

    pub fn search_results(&self) -> &[SearchRecord] {
        &self.search_results
    }

    pub fn code_executions(&self) -> &[CodeExecutionRecord] {
        &self.code_executions
    }

    /// Classify executed tools into the buffer. Payloads that are not the
    /// expected object shape are wrapped rather than dropped.
    pub fn record_tools(&mut self, tools: &[ExecutedTool]) {
        for tool in tools {
            match tool.kind {
                ToolKind::Search => {
                    let query = str_field(&tool.input, "query");
                    let results: Vec<SearchHit> = tool
                        .output
                        .get("results")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .map(|item| SearchHit {
                                    title: str_field(item, "title"),
                                    content: str_field(item, "content"),
                                    url: str_field(item, "url"),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    tracing::info!(query = %query, hits = results.len(), "recorded search result");
                    self.search_results.push(SearchRecord {
                        title: format!("Search: {query}"),
                        query,
                        results,
                        timestamp: tool.timestamp,
                    });
                }
                ToolKind::CodeExecution => {
                    tracing::info!("recorded code execution");
                    self.code_executions.push(CodeExecutionRecord {
                        code: str_field(&tool.input, "code"),
                        result: str_field(&tool.output, "result"),
                        error: str_field(&tool.output, "error"),
                        timestamp: tool.timestamp,
                    });
                }
                ToolKind::Unknown => {
                    tracing::warn!("ignoring tool invocation of unknown kind");
                }
            }
        }
        evict_oldest(&mut self.search_results);
        evict_oldest(&mut self.code_executions);
    }

    /// Markdown summary of the most recent results, for injection as a
    /// system message.
    pub fn context_for_model(&self) -> String {
        let mut out = String::new();

        if !self.search_results.is_empty() {
            out.push_str("## Recent web search results:\n\n");
            for (i, record) in tail(&self.search_results).iter().enumerate() {
                out.push_str(&format!("### Search {}: {}\n\n", i + 1, record.query));
                for hit in &record.results {
                    out.push_str(&format!(
                        "- **{}**\n  {}\n  Source: {}\n\n",
                        hit.title, hit.content, hit.url
                    ));
                }
            }
        }

        if !self.code_executions.is_empty() {
            out.push_str("## Recent code executions:\n\n");
            for (i, exec) in tail(&self.code_executions).iter().enumerate() {
                out.push_str(&format!(
                    "### Execution {}:\n\n```python\n{}\n```\n\n**Result:**\n\n",
                    i + 1,
                    exec.code
                ));
                if exec.error.is_empty() {
                    out.push_str(&format!("```\n{}\n```\n\n", exec.result));
                } else {
                    out.push_str(&format!("Error: {}\n\n", exec.error));
                }
            }
        }

        out
    }

    pub fn clear(&mut self) {
        self.search_results.clear();
        self.code_executions.clear();
    }
}

fn str_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        // A bare string payload stands in for its primary field.
        _ => match (value, key) {
            (Value::String(s), "query" | "code" | "result") => s.clone(),
            _ => String::new(),
        },
    }
}

fn evict_oldest<T>(buf: &mut Vec<T>) {
    if buf.len() > MAX_RETAINED {
        let excess = buf.len() - MAX_RETAINED;
        buf.drain(..excess);
    }
}

fn tail<T>(buf: &[T]) -> &[T] {
    &buf[buf.len().saturating_sub(SUMMARY_DEPTH)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_tool(query: &str) -> ExecutedTool {
        ExecutedTool {
            kind: ToolKind::Search,
            input: json!({"query": query}),
            output: json!({"results": [{"title": "t", "content": "c", "url": "u"}]}),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn records_search_and_code_tools() {
        let mut ctx = AgenticContext::new();
        ctx.record_tools(&[
            search_tool("rust lifetimes"),
            ExecutedTool {
                kind: ToolKind::CodeExecution,
                input: json!({"code": "print(1)"}),
                output: json!({"result": "1", "error": ""}),
                timestamp: Utc::now(),
            },
        ]);
        assert_eq!(ctx.search_results().len(), 1);
        assert_eq!(ctx.code_executions().len(), 1);
        assert_eq!(ctx.search_results()[0].query, "rust lifetimes");
        let hits = &ctx.search_results()[0].results;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "t");
        assert_eq!(hits[0].url, "u");
    }

    #[test]
    fn summary_covers_most_recent_three() {
        let mut ctx = AgenticContext::new();
        for i in 0..5 {
            ctx.record_tools(&[search_tool(&format!("query {i}"))]);
        }
        let summary = ctx.context_for_model();
        assert!(!summary.contains("query 1"));
        assert!(summary.contains("query 2"));
        assert!(summary.contains("query 4"));
    }

    #[test]
    fn buffer_evicts_oldest_beyond_cap() {
        let mut ctx = AgenticContext::new();
        for i in 0..(MAX_RETAINED + 5) {
            ctx.record_tools(&[search_tool(&format!("q{i}"))]);
        }
        assert_eq!(ctx.search_results().len(), MAX_RETAINED);
        assert_eq!(ctx.search_results()[0].query, "q5");
    }

    #[test]
    fn clear_empties_everything() {
        let mut ctx = AgenticContext::new();
        ctx.record_tools(&[search_tool("q")]);
        ctx.clear();
        assert!(ctx.is_empty());
        assert!(ctx.context_for_model().is_empty());
    }
}
