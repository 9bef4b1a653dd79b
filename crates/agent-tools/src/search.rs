//! Web Search Tool
//!
//! Google Custom Search, top three hits as a JSON array.

use agent_core::tool::{ParameterSchema, Tool, ToolDeclaration};
use agent_core::Result as CoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::argument_text;
use crate::config::SearchConfig;
use crate::error::{Result, ToolError};

pub const NO_RESULTS: &str = "No search results found.";

const MAX_RESULTS: usize = 3;

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

/// One result as handed to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// `googleSearch(query)`
pub struct GoogleSearchTool {
    client: reqwest::Client,
    config: SearchConfig,
}

impl GoogleSearchTool {
    pub const fn new(client: reqwest::Client, config: SearchConfig) -> Self {
        Self { client, config }
    }

    /// Top hits for `query`
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        tracing::debug!(query, "Google search");
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.cx_id.as_str()),
                ("q", query),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::SearchStatus(status.as_u16()));
        }

        let data: SearchResponse = response.json().await?;
        Ok(data
            .items
            .into_iter()
            .take(MAX_RESULTS)
            .map(|item| SearchHit {
                title: item.title,
                link: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: "googleSearch".into(),
            description: "Get information from the web using Google Search.".into(),
            parameters: vec![ParameterSchema::new(
                "query",
                "string",
                "The search query to use.",
                true,
            )],
        }
    }

    async fn invoke(&self, argument: Value) -> CoreResult<String> {
        let query = argument_text(&argument);
        Ok(match self.search(&query).await {
            Ok(hits) if hits.is_empty() => NO_RESULTS.into(),
            Ok(hits) => serde_json::to_string(&hits)?,
            Err(e) => {
                tracing::warn!(error = %e, "Google search failed");
                format!("Error performing search: {e}")
            }
        })
    }
}
