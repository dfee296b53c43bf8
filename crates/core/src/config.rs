use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CommanderError;
use crate::severity::Severity;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub elastic: ElasticConfig,
    pub indices: IndexConfig,
    pub llm: LlmConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COMMANDER_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("COMMANDER_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            elastic: ElasticConfig::from_env_profiled(p),
            indices: IndexConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<(), CommanderError> {
        let endpoint = &self.elastic.endpoint;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(CommanderError::Config(format!(
                "ELASTIC_ENDPOINT must be an http(s) URL, got '{endpoint}'"
            )));
        }
        if !self.llm.is_configured() {
            return Err(CommanderError::Config(format!(
                "LLM provider '{}' is not configured (missing API key or unknown provider)",
                self.llm.provider
            )));
        }
        if self.indices.tracked_sources.is_empty() {
            return Err(CommanderError::Config("TRACKED_SOURCES is empty".into()));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  elastic:  endpoint={}, auth={}",
            self.elastic.endpoint,
            self.elastic.auth_label()
        );
        tracing::info!(
            "  indices:  logs={}, metrics={}, runbooks={}, inventory={}",
            self.indices.logs, self.indices.metrics, self.indices.runbooks, self.indices.inventory
        );
        tracing::info!("  tracked:  {}", self.indices.tracked_sources.join(","));
        tracing::info!(
            "  llm:      provider={}, configured={}, timeout={}s",
            self.llm.provider,
            self.llm.is_configured(),
            self.llm.timeout_secs
        );
        tracing::info!(
            "  notify:   slack={}, webhook={}, min_severity={}",
            self.notify.slack_webhook_url.is_some(),
            self.notify.webhook_url.is_some(),
            self.notify.min_severity
        );
    }
}

// ── Elasticsearch ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl ElasticConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            endpoint: profiled_env_or(p, "ELASTIC_ENDPOINT", "http://localhost:9200")
                .trim_end_matches('/')
                .to_string(),
            username: profiled_env_opt(p, "ELASTIC_USERNAME"),
            password: profiled_env_opt(p, "ELASTIC_PASSWORD"),
            api_key: profiled_env_opt(p, "ELASTIC_API_KEY"),
            timeout_secs: profiled_env_u64(p, "ELASTIC_TIMEOUT_SECS", 30),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn auth_label(&self) -> &'static str {
        if self.api_key.is_some() {
            "api_key"
        } else if self.username.is_some() {
            "basic"
        } else {
            "none"
        }
    }
}

// ── Index names ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub logs: String,
    pub metrics: String,
    pub runbooks: String,
    pub inventory: String,
    /// Sources compared by the ingestion-trend operation.
    pub tracked_sources: Vec<String>,
}

impl IndexConfig {
    fn from_env_profiled(p: &str) -> Self {
        let logs = profiled_env_or(p, "LOGS_INDEX", "app-logs");
        let metrics = profiled_env_or(p, "METRICS_INDEX", "system-metrics");
        let tracked_sources = match profiled_env_opt(p, "TRACKED_SOURCES") {
            Some(list) => parse_list(&list),
            None => vec![logs.clone(), metrics.clone()],
        };
        Self {
            logs,
            metrics,
            runbooks: profiled_env_or(p, "RUNBOOKS_INDEX", "runbooks"),
            inventory: profiled_env_or(p, "INVENTORY_INDEX", "service-inventory"),
            tracked_sources,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            logs: "app-logs".into(),
            metrics: "system-metrics".into(),
            runbooks: "runbooks".into(),
            inventory: "service-inventory".into(),
            tracked_sources: vec!["app-logs".into(), "system-metrics".into()],
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── LLM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini", "openai", "anthropic", "ollama"
    pub provider: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for a single model call; expiry takes the fallback path.
    pub timeout_secs: u64,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "gemini"),
            gemini_api_key: profiled_env_opt(p, "GEMINI_API_KEY"),
            gemini_model: profiled_env_or(p, "GEMINI_MODEL", "gemini-2.5-flash"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            ollama_url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            ollama_model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.1")
                .parse()
                .unwrap_or(0.1),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 2048),
            timeout_secs: profiled_env_u64(p, "LLM_TIMEOUT_SECS", 30),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "gemini" => self.gemini_api_key.is_some(),
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Notification channels ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub slack_webhook_url: Option<String>,
    pub webhook_url: Option<String>,
    /// Extra request headers for the webhook, values may reference `${VAR}`.
    #[serde(default)]
    pub webhook_headers: Vec<(String, String)>,
    /// Reports below this severity are not delivered.
    pub min_severity: Severity,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        let min_severity = profiled_env_opt(p, "NOTIFY_MIN_SEVERITY")
            .and_then(|v| match v.parse() {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring NOTIFY_MIN_SEVERITY");
                    None
                }
            })
            .unwrap_or(Severity::Info);
        Self {
            slack_webhook_url: profiled_env_opt(p, "SLACK_WEBHOOK_URL"),
            webhook_url: profiled_env_opt(p, "ALERT_WEBHOOK_URL"),
            webhook_headers: profiled_env_opt(p, "ALERT_WEBHOOK_HEADERS")
                .map(|raw| parse_headers(&raw))
                .unwrap_or_default(),
            min_severity,
        }
    }

    pub fn has_channels(&self) -> bool {
        self.slack_webhook_url.is_some() || self.webhook_url.is_some()
    }
}

/// `Name: value, Name: value`. Entries without a name or a colon are dropped.
fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let (name, value) = entry.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                tracing::warn!(entry = entry.trim(), "ignoring webhook header without a name");
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        let keys = [
            "COMMANDER_PROFILE",
            "ELASTIC_ENDPOINT",
            "ELASTIC_USERNAME",
            "LOGS_INDEX",
            "METRICS_INDEX",
            "TRACKED_SOURCES",
            "LLM_PROVIDER",
            "LLM_TIMEOUT_SECS",
            "GEMINI_API_KEY",
            "NOTIFY_MIN_SEVERITY",
            "ALERT_WEBHOOK_URL",
            "ALERT_WEBHOOK_HEADERS",
            "PROD_ELASTIC_ENDPOINT",
            "PROD_LLM_PROVIDER",
        ];
        for k in keys {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_without_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let cfg = Config::for_profile("");
        assert_eq!(cfg.profile_label(), "default");
        assert_eq!(cfg.elastic.endpoint, "http://localhost:9200");
        assert_eq!(cfg.indices.logs, "app-logs");
        assert_eq!(cfg.indices.tracked_sources, vec!["app-logs", "system-metrics"]);
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.llm.gemini_model, "gemini-2.5-flash");
        assert!(!cfg.llm.is_configured());
        assert_eq!(cfg.llm.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.notify.min_severity, Severity::Info);
        assert!(!cfg.notify.has_channels());
        assert!(cfg.notify.webhook_headers.is_empty());
    }

    #[test]
    fn webhook_headers_from_list() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("ALERT_WEBHOOK_URL", "https://alerts.test/hook");
        env::set_var(
            "ALERT_WEBHOOK_HEADERS",
            "X-Api-Key: ${ALERT_TOKEN}, X-Source:commander,, broken, : anonymous",
        );
        let cfg = Config::for_profile("");
        assert!(cfg.notify.has_channels());
        assert_eq!(
            cfg.notify.webhook_headers,
            vec![
                ("X-Api-Key".to_string(), "${ALERT_TOKEN}".to_string()),
                ("X-Source".to_string(), "commander".to_string()),
            ]
        );

        clear_env();
    }

    #[test]
    fn validate_reports_unusable_settings() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let cfg = Config::for_profile("");
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("LLM provider 'gemini' is not configured"), "{err}");

        env::set_var("GEMINI_API_KEY", "k");
        assert!(Config::for_profile("").validate().is_ok());

        env::set_var("ELASTIC_ENDPOINT", "localhost:9200");
        let err = Config::for_profile("").validate().unwrap_err().to_string();
        assert!(err.contains("ELASTIC_ENDPOINT"), "{err}");

        clear_env();
    }

    #[test]
    fn profile_prefix_takes_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("ELASTIC_ENDPOINT", "http://base:9200");
        env::set_var("PROD_ELASTIC_ENDPOINT", "https://prod.es.example.com/");
        env::set_var("LLM_PROVIDER", "ollama");

        let cfg = Config::for_profile("prod");
        assert_eq!(cfg.profile, "PROD");
        assert_eq!(cfg.elastic.endpoint, "https://prod.es.example.com");
        // No PROD_LLM_PROVIDER, falls back to the unprefixed key.
        assert_eq!(cfg.llm.provider, "ollama");
        assert!(cfg.llm.is_configured());

        clear_env();
    }

    #[test]
    fn tracked_sources_from_list() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("TRACKED_SOURCES", "app-logs, audit-logs,,nginx ");
        let cfg = Config::for_profile("");
        assert_eq!(cfg.indices.tracked_sources, vec!["app-logs", "audit-logs", "nginx"]);

        clear_env();
    }

    #[test]
    fn tracked_sources_follow_renamed_indices() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("LOGS_INDEX", "prod-logs");
        env::set_var("METRICS_INDEX", "prod-metrics");
        let cfg = Config::for_profile("");
        assert_eq!(cfg.indices.tracked_sources, vec!["prod-logs", "prod-metrics"]);

        clear_env();
    }

    #[test]
    fn invalid_numbers_and_severity_fall_back() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        env::set_var("LLM_TIMEOUT_SECS", "soon");
        env::set_var("NOTIFY_MIN_SEVERITY", "loud");
        let cfg = Config::for_profile("");
        assert_eq!(cfg.llm.timeout_secs, 30);
        assert_eq!(cfg.notify.min_severity, Severity::Info);

        env::set_var("NOTIFY_MIN_SEVERITY", "warning");
        let cfg = Config::for_profile("");
        assert_eq!(cfg.notify.min_severity, Severity::Warning);

        clear_env();
    }
}
