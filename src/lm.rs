//! Prompt assembly and the text-generation service client.
//!
//! The service is an external collaborator with a chat-completions HTTP
//! interface: it receives assembled source text plus instructions and
//! returns schema or diagram text. Missing credentials and request failures
//! are ordinary errors for callers to recover from.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Model used when the caller does not override it.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SCHEMA_SHAPE: &str = "Return a single JSON object of the form \
{\"nodes\": [{\"id\": \"<snake_case id>\", \"label\": \"<short name>\", \
\"status\": \"added\"|\"changed\"|\"unchanged\", \"files\": [\"<relative path>\"], \
\"summary\": \"<one sentence>\"}]}. No prose or code fences.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Blocking client for the chat-completions endpoint.
pub struct LmClient {
    base_url: String,
    api_key: String,
}

impl LmClient {
    /// Build a client from the environment.
    ///
    /// Requires `OPENAI_API_KEY`; `CODEMAP_LM_BASE_URL` overrides the
    /// endpoint for compatible gateways.
    pub fn from_env() -> Result<Self> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY is not set"))?;
        let base_url = env::var("CODEMAP_LM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Produce an overview schema for a full source listing.
    pub fn generate_overview_schema(&self, combined: &str, model: &str) -> Result<String> {
        let prompt = format!(
            "Analyze this codebase and describe its architecture as nodes \
             (one node per cohesive component). Mark every node's status as \"added\".\n\
             {SCHEMA_SHAPE}\n\nSource files:\n{combined}"
        );
        self.complete(model, &prompt)
    }

    /// Update a previous overview schema from a changed-files listing.
    ///
    /// The service decides which nodes are affected; nodes untouched by the
    /// listed changes keep their identity and are marked "unchanged".
    pub fn update_overview_schema(
        &self,
        combined: &str,
        previous_schema: &str,
        model: &str,
    ) -> Result<String> {
        let prompt = format!(
            "Update this architecture schema for the source changes below. \
             Keep node ids stable. Mark nodes unaffected by the changes as \
             \"unchanged\", updated nodes as \"changed\", and new nodes as \"added\"; \
             drop nodes whose files were all deleted.\n\
             {SCHEMA_SHAPE}\n\nPrevious schema:\n{previous_schema}\n\n\
             Changed files (with change status; deleted files have no content):\n{combined}"
        );
        self.complete(model, &prompt)
    }

    /// Produce the overview diagram description for a schema.
    pub fn generate_overview_diagram(&self, schema: &str, model: &str) -> Result<String> {
        let prompt = format!(
            "Render this architecture schema as a D2 diagram: one shape per \
             node labeled with its label, edges for the relationships the \
             summaries imply. Return D2 text only, no prose or code fences.\n\n\
             Schema:\n{schema}"
        );
        self.complete(model, &prompt)
    }

    /// Produce the detailed schema for one unit of the overview.
    pub fn generate_unit_schema(
        &self,
        overview_schema: &str,
        unit_id: &str,
        model: &str,
    ) -> Result<String> {
        let prompt = format!(
            "Given this architecture schema, expand the node with id \
             \"{unit_id}\" into a detailed JSON description: \
             {{\"id\": \"{unit_id}\", \"elements\": [{{\"name\": ..., \
             \"kind\": ..., \"summary\": ...}}]}}. Return JSON only, no prose \
             or code fences.\n\nSchema:\n{overview_schema}"
        );
        self.complete(model, &prompt)
    }

    /// Produce the diagram description for one unit's detailed schema.
    pub fn generate_unit_diagram(&self, unit_schema: &str, model: &str) -> Result<String> {
        let prompt = format!(
            "Render this component description as a D2 diagram. Return D2 \
             text only, no prose or code fences.\n\n{unit_schema}"
        );
        self.complete(model, &prompt)
    }

    fn complete(&self, model: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: user,
            }],
        };
        let mut response = ureq::post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&body)
            .context("send completion request")?;
        let parsed: ChatResponse = response
            .body_mut()
            .read_json()
            .context("parse completion response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("completion response has no choices"))?;
        Ok(strip_code_fences(&content))
    }
}

/// Strip a surrounding markdown code fence from service output.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if let Some(first) = lines.first() {
        if first.trim_start().starts_with("```") {
            lines.remove(0);
        }
    }
    if let Some(last) = lines.last() {
        if last.trim_start().starts_with("```") {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}
