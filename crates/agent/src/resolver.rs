//! Intent resolution: free text → catalog operations plus parameters.
//!
//! The model is treated as an untrusted classifier. Anything short of a
//! parseable JSON object (transport error, timeout, prose, broken JSON)
//! degrades to [`ToolDecision::fallback`].

use std::sync::Arc;
use std::time::Duration;

use commander_catalog::operation::{THRESHOLD, TIME_WINDOW};
use commander_catalog::{AnalyticalOperation, Catalog, Params, ToolChoice};
use commander_core::config::LlmConfig;
use commander_llm::{complete_within, extract_json, LlmError, LlmProvider, Message};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Sampling settings shared by both model calls of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2048,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&LlmConfig> for ModelSettings {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            timeout: cfg.timeout(),
        }
    }
}

/// Which operations to run, with what parameters, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDecision {
    pub operations: Vec<ToolChoice>,
    /// Keyed by canonical operation name where the model's key resolved,
    /// otherwise by the raw key.
    pub parameters: IndexMap<String, Params>,
    pub rationale: String,
}

impl ToolDecision {
    /// Default decision: error-spike over the last hour, threshold 10.
    pub fn fallback() -> Self {
        let op = AnalyticalOperation::ErrorSpike;
        let mut params = Params::new();
        params.insert(TIME_WINDOW.into(), json!("1 hour"));
        params.insert(THRESHOLD.into(), json!(10));

        let mut parameters = IndexMap::new();
        parameters.insert(op.name().to_string(), params);

        Self {
            operations: vec![ToolChoice::Known(op)],
            parameters,
            rationale: String::new(),
        }
    }

    /// Parameters supplied for `op`, empty when the model gave none.
    pub fn params_for(&self, op: AnalyticalOperation) -> Params {
        self.parameters.get(op.name()).cloned().unwrap_or_default()
    }

    /// Parse the model's reply. Formatting noise around the object is
    /// stripped first.
    pub fn parse(raw: &str) -> Result<Self, DecisionError> {
        let body = extract_json(raw);
        let value: Value = serde_json::from_str(body)?;
        let Value::Object(object) = value else {
            return Err(DecisionError::NotAnObject);
        };
        let wire: WireDecision = serde_json::from_value(Value::Object(object))?;
        Ok(wire.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),
    #[error("decision is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("decision is not a JSON object")]
    NotAnObject,
}

/// The shape the model is asked to produce. An explicit `null` reads the
/// same as an absent field.
#[derive(Debug, Deserialize)]
struct WireDecision {
    #[serde(default)]
    tools_to_use: Option<Vec<Value>>,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
    #[serde(default)]
    reasoning: Option<Value>,
}

impl From<WireDecision> for ToolDecision {
    fn from(wire: WireDecision) -> Self {
        let operations = wire
            .tools_to_use
            .unwrap_or_default()
            .iter()
            .map(|v| match v {
                Value::String(s) => ToolChoice::parse(s),
                other => ToolChoice::Unrecognized(other.to_string()),
            })
            .collect();

        let mut parameters: IndexMap<String, Params> = IndexMap::new();
        for (key, value) in wire.parameters.unwrap_or_default() {
            let params = match value {
                Value::Object(map) => map,
                Value::Null => Params::new(),
                other => {
                    warn!(operation = %key, parameters = %other, "ignoring non-object parameters");
                    Params::new()
                }
            };
            let key = match AnalyticalOperation::from_name(&key) {
                Some(op) => op.name().to_string(),
                None => key,
            };
            parameters.entry(key).or_insert(params);
        }

        let rationale = match wire.reasoning {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Self { operations, parameters, rationale }
    }
}

const DECISION_INSTRUCTIONS: &str = r#"You are an incident response orchestrator.
Pick the operations that answer the operator's question and their parameters.

Respond with a single JSON object and nothing else:
{
  "tools_to_use": ["operation-name"],
  "parameters": {"operation-name": {"param": "value"}},
  "reasoning": "one sentence on why"
}
Use an empty "tools_to_use" list if no operation applies."#;

pub struct IntentResolver {
    provider: Arc<dyn LlmProvider>,
    catalog: Catalog,
    settings: ModelSettings,
}

impl IntentResolver {
    pub fn new(provider: Arc<dyn LlmProvider>, catalog: Catalog, settings: ModelSettings) -> Self {
        Self { provider, catalog, settings }
    }

    pub fn build_messages(&self, text: &str) -> Vec<Message> {
        let system = format!(
            "{DECISION_INSTRUCTIONS}\n\nAvailable operations:\n{}",
            self.catalog.describe()
        );
        vec![Message::system(system), Message::user(format!("User query: \"{text}\""))]
    }

    /// Never fails: every error path returns the fallback decision.
    pub async fn resolve(&self, text: &str) -> ToolDecision {
        match self.try_resolve(text).await {
            Ok(decision) => {
                info!(
                    operations =
                        ?decision.operations.iter().map(ToolChoice::name).collect::<Vec<_>>(),
                    rationale = %decision.rationale,
                    "intent resolved"
                );
                decision
            }
            Err(e) => {
                warn!(error = %e, "intent resolution failed, using fallback decision");
                ToolDecision::fallback()
            }
        }
    }

    async fn try_resolve(&self, text: &str) -> Result<ToolDecision, DecisionError> {
        let raw = complete_within(
            self.provider.as_ref(),
            self.build_messages(text),
            self.settings.temperature,
            self.settings.max_tokens,
            self.settings.timeout,
        )
        .await?;
        debug!(provider = self.provider.name(), response = %raw, "decision response");
        ToolDecision::parse(&raw)
    }
}
