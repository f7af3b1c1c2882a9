//! HTTP GET query tool, the adapter behind dynamically discovered
//! search tools

use async_trait::async_trait;
use serde_json::Value;

use crate::term::Term;
use crate::tools::{
    result_metadata, Requirement, Tool, ToolParameterType, ToolParams, ToolSchema,
};
use crate::types::{Thought, ThoughtKind, ToolError};

/// Response bodies are clipped so a single fetch cannot dominate the
/// thought store.
const MAX_BODY_CHARS: usize = 8192;

pub struct WebSearchTool {
    name: String,
    endpoint: String,
    description: String,
    client: reqwest::Client,
    schema: ToolSchema,
}

impl WebSearchTool {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = ToolSchema::new().param(
            "query",
            ToolParameterType::String,
            Requirement::Always,
            "search query sent as the q parameter",
        );
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            description: description.into(),
            client: reqwest::Client::new(),
            schema,
        }
    }

    fn build_url(&self, query: &str) -> Result<reqwest::Url, ToolError> {
        let mut url = reqwest::Url::parse(&self.endpoint).map_err(|e| ToolError::Execution {
            reason: format!("invalid endpoint '{}': {}", self.endpoint, e),
        })?;
        url.query_pairs_mut().append_pair("q", query);
        Ok(url)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(
        &self,
        params: &ToolParams,
        parent: &Thought,
        agent_id: &str,
    ) -> Result<Thought, ToolError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams {
                name: self.name.clone(),
                reason: "missing string parameter 'query'".to_string(),
            })?;

        let url = self.build_url(query)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Execution {
                reason: format!("request failed: {}", e),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Execution {
                reason: format!("endpoint returned {}", status),
            });
        }
        let mut body = response.text().await.map_err(|e| ToolError::Execution {
            reason: format!("reading body failed: {}", e),
        })?;
        if let Some((cut, _)) = body.char_indices().nth(MAX_BODY_CHARS) {
            body.truncate(cut);
        }

        Ok(Thought::new(
            ThoughtKind::Input,
            Term::atom(body),
            result_metadata(parent, agent_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_appends_query() {
        let tool = WebSearchTool::new("wiki", "https://example.com/search", "test");
        let url = tool.build_url("rust agents").unwrap();
        assert_eq!(url.as_str(), "https://example.com/search?q=rust+agents");
    }

    #[test]
    fn test_invalid_endpoint_is_execution_error() {
        let tool = WebSearchTool::new("bad", "not a url", "test");
        let error = tool.build_url("x").unwrap_err();
        assert_eq!(error.kind_label(), "tool_execution");
    }
}
