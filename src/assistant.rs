//! Clients for the text-translation assistant.
//!
//! An assistant only ever answers with a template identifier and parameter
//! bindings. Validation of that answer happens in [`crate::translate`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::query::Template;
use crate::scope::{Constraints, Intent};

/// Description of the only relations and columns a proposal may refer to.
pub const SCHEMA_DESCRIPTION: &str = "\
providers(provider_id TEXT, name TEXT, city TEXT, state TEXT, zip TEXT)
drg_prices(provider_id TEXT, ms_drg_code TEXT, ms_drg_description TEXT, total_discharges INTEGER, avg_covered_charges DECIMAL, avg_total_payments DECIMAL, avg_medicare_payments DECIMAL)
ratings(provider_id TEXT, rating INTEGER 1-10)
zip_centroids(zip5 TEXT, lat DOUBLE, lon DOUBLE)";

const SYSTEM_PROMPT: &str = r#"You pick a query template for questions about hospital prices and ratings.

Templates:
- "cost_ranking": providers ordered by average covered charges, cheapest first.
- "quality_ranking": providers ordered by rating, best first.

Parameters (all optional):
- "drg": MS-DRG code (e.g. "470") or words from the procedure description.
- "zip": 5-digit US ZIP code.
- "radius_km": search radius in kilometers (convert miles with 1 mi = 1.609344 km).

Return ONLY a JSON object: {"template": "<template>", "params": {...}}.
Never return SQL."#;

#[derive(Debug, Clone, Serialize)]
pub struct AssistantRequest {
    pub question: String,
    pub intent: Intent,
    pub schema: &'static str,
    pub templates: Vec<&'static str>,
    /// Constraints the scope guard already extracted.
    pub slots: Constraints,
}

impl AssistantRequest {
    pub fn new(question: &str, intent: Intent, slots: Constraints) -> Self {
        Self {
            question: question.to_string(),
            intent,
            schema: SCHEMA_DESCRIPTION,
            templates: Template::ALL.iter().map(|t| t.id()).collect(),
            slots,
        }
    }
}

/// The assistant's unvalidated answer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Proposal {
    pub template: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant did not answer within {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("assistant returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed proposal: {0}")]
    Malformed(String),
}

impl AssistantError {
    /// Whether one more attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AssistantError::Timeout(_) | AssistantError::Transport(_) => true,
            AssistantError::Status { status, .. } => is_retryable_status(*status),
            AssistantError::Malformed(_) => false,
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[async_trait]
pub trait Assistant: Send + Sync {
    fn name(&self) -> &str;

    async fn propose(&self, request: &AssistantRequest) -> Result<Proposal, AssistantError>;
}

/// Offline assistant: picks the template from the guard's intent and binds the
/// extracted slots. Deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleAssistant;

#[async_trait]
impl Assistant for RuleAssistant {
    fn name(&self) -> &str {
        "rules"
    }

    async fn propose(&self, request: &AssistantRequest) -> Result<Proposal, AssistantError> {
        let template = match request.intent {
            Intent::Quality => Template::QualityRanking,
            Intent::Cost | Intent::Unknown => Template::CostRanking,
        };
        let mut params = Map::new();
        if let Some(drg) = &request.slots.drg {
            params.insert("drg".into(), json!(drg));
        }
        if let Some(zip) = &request.slots.zip {
            params.insert("zip".into(), json!(zip));
        }
        if let Some(km) = request.slots.radius_km {
            params.insert("radius_km".into(), json!(km));
        }
        Ok(Proposal {
            template: template.id().to_string(),
            params,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'static str,
    format: &'static str,
    stream: bool,
    options: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Ollama-backed assistant using JSON mode on `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaAssistant {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaAssistant {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cost-navigator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    fn prompt(request: &AssistantRequest) -> Result<String, AssistantError> {
        let slots = serde_json::to_string(&request.slots)
            .map_err(|e| AssistantError::Malformed(e.to_string()))?;
        Ok(format!(
            "Schema:\n{}\n\nTemplates: {}\nAlready extracted: {}\n\nQuestion: {}",
            request.schema,
            request.templates.join(", "),
            slots,
            request.question
        ))
    }
}

#[async_trait]
impl Assistant for OllamaAssistant {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn propose(&self, request: &AssistantRequest) -> Result<Proposal, AssistantError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: Self::prompt(request)?,
            system: SYSTEM_PROMPT,
            format: "json",
            stream: false,
            options: json!({ "temperature": 0 }),
        };
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AssistantError::Status {
                status,
                body: truncate_for_log(&body),
            });
        }

        let out: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| AssistantError::Malformed(e.to_string()))?;
        parse_proposal(&out.response)
    }
}

/// Parses a proposal, tolerating a markdown code fence around the JSON.
pub fn parse_proposal(text: &str) -> Result<Proposal, AssistantError> {
    let json = extract_json(text)
        .ok_or_else(|| AssistantError::Malformed(truncate_for_log(text)))?;
    serde_json::from_str(json).map_err(|e| AssistantError::Malformed(e.to_string()))
}

fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                return Some(after[..end].trim());
            }
        }
    }
    None
}

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_chars = 300usize;
    match trimmed.char_indices().nth(max_chars) {
        None => trimmed.to_string(),
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
    }
}
