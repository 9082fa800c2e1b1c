//! Server configuration, loaded from environment variables at startup.

use std::collections::HashMap;
use std::time::Duration;

use eduguard_core::entities::HISTORY_LIMIT;
use eduguard_core::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use eduguard_core::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use eduguard_core::{GeminiConfig, PipelineConfig, RateLimitPolicy};

const PIPELINE_DEADLINE_MARGIN: Duration = Duration::from_secs(5);

/// Runtime configuration for eduguard-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; without `EDU_GENAI_KEY` it answers every admitted request
/// with the unavailability notice.
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://eduguard.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated allowed origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    pub enable_swagger: bool,

    /// Gemini API key. `None` leaves the model adapters unconfigured.
    pub genai_api_key: Option<String>,
    pub genai_model: String,
    pub genai_base_url: String,

    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
    pub history_limit: usize,

    /// Bearer token → user id.
    pub api_tokens: HashMap<String, String>,

    /// Accept `x-authenticated-user` from a trusted gateway.
    pub trust_identity_header: bool,

    pub request_timeout_secs: u64,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        let flag = |key: &str, default: bool| lookup(key).map(|v| is_truthy(&v)).unwrap_or(default);

        Self {
            bind_address: get("EDU_BIND", "0.0.0.0:3000"),
            database_url: get("EDU_DATABASE_URL", "sqlite://eduguard.db"),
            log_level: get("EDU_LOG", "info"),
            log_json: flag("EDU_LOG_JSON", false),
            cors_allowed_origins: lookup("EDU_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            enable_swagger: flag("EDU_ENABLE_SWAGGER", true),
            genai_api_key: lookup("EDU_GENAI_KEY")
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty()),
            genai_model: get("EDU_GENAI_MODEL", DEFAULT_MODEL),
            genai_base_url: get("EDU_GENAI_BASE_URL", DEFAULT_BASE_URL),
            rate_limit_window_secs: parse_or(&lookup, "EDU_RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW.as_secs()),
            rate_limit_max_requests: parse_or(&lookup, "EDU_RATE_LIMIT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS),
            history_limit: parse_or(&lookup, "EDU_HISTORY_LIMIT", HISTORY_LIMIT),
            api_tokens: lookup("EDU_API_TOKENS")
                .map(|v| parse_token_table(&v))
                .unwrap_or_default(),
            trust_identity_header: flag("EDU_TRUST_IDENTITY_HEADER", false),
            request_timeout_secs: parse_or(&lookup, "EDU_REQUEST_TIMEOUT_SECS", 60),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            rate_limit: RateLimitPolicy::new(
                Duration::from_secs(self.rate_limit_window_secs),
                self.rate_limit_max_requests,
            ),
            history_limit: self.history_limit,
            deadline: self.pipeline_deadline(),
        }
    }

    /// Pipeline budget, kept under the HTTP timeout so a slow model still
    /// gets a stored unavailability notice instead of a bare 408.
    pub fn pipeline_deadline(&self) -> Duration {
        self.request_timeout()
            .saturating_sub(PIPELINE_DEADLINE_MARGIN)
            .max(Duration::from_secs(1))
    }

    /// Gemini client settings, when an API key is configured.
    pub fn gemini_config(&self) -> Option<GeminiConfig> {
        self.genai_api_key.as_ref().map(|key| GeminiConfig {
            model: self.genai_model.clone(),
            base_url: self.genai_base_url.clone(),
            ..GeminiConfig::new(key.as_str())
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// Keeps secrets out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_url", &self.database_url)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("enable_swagger", &self.enable_swagger)
            .field("genai_api_key", &self.genai_api_key.as_ref().map(|_| "<redacted>"))
            .field("genai_model", &self.genai_model)
            .field("genai_base_url", &self.genai_base_url)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("history_limit", &self.history_limit)
            .field("api_tokens", &self.api_tokens.len())
            .field("trust_identity_header", &self.trust_identity_header)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse `"token:user,token2:user2"`. Malformed entries are skipped.
fn parse_token_table(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|entry| {
            let (token, user) = entry.split_once(':')?;
            let (token, user) = (token.trim(), user.trim());
            (!token.is_empty() && !user.is_empty()).then(|| (token.to_owned(), user.to_owned()))
        })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_env() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert!(cfg.enable_swagger);
        assert!(!cfg.trust_identity_header);
        assert!(cfg.gemini_config().is_none());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(60));

        let pipeline = cfg.pipeline_config();
        assert_eq!(pipeline.rate_limit, RateLimitPolicy::default());
        assert_eq!(pipeline.history_limit, 12);
        assert_eq!(pipeline.deadline, Duration::from_secs(55));
    }

    #[test]
    fn pipeline_deadline_stays_under_request_timeout() {
        let cfg = config(&[("EDU_REQUEST_TIMEOUT_SECS", "20")]);
        assert_eq!(cfg.pipeline_config().deadline, Duration::from_secs(15));

        let cfg = config(&[("EDU_REQUEST_TIMEOUT_SECS", "3")]);
        assert_eq!(cfg.pipeline_deadline(), Duration::from_secs(1));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("EDU_LOG_JSON", "TRUE"),
            ("EDU_ENABLE_SWAGGER", "0"),
            ("EDU_RATE_LIMIT_MAX_REQUESTS", " 5 "),
            ("EDU_RATE_LIMIT_WINDOW_SECS", "not-a-number"),
            ("EDU_GENAI_KEY", "secret"),
            ("EDU_GENAI_MODEL", "gemini-test"),
        ]);
        assert!(cfg.log_json);
        assert!(!cfg.enable_swagger);
        assert_eq!(cfg.rate_limit_max_requests, 5);
        assert_eq!(cfg.rate_limit_window_secs, 300);

        let gemini = cfg.gemini_config().expect("key configured");
        assert_eq!(gemini.api_key, "secret");
        assert_eq!(gemini.model, "gemini-test");
        assert_eq!(gemini.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn blank_api_key_is_unconfigured() {
        assert!(config(&[("EDU_GENAI_KEY", "  ")]).gemini_config().is_none());
    }

    #[test]
    fn token_table_skips_malformed_entries() {
        let table = parse_token_table("t1:alice, t2 : bob ,broken,:nobody,t3:");
        assert_eq!(table.len(), 2);
        assert_eq!(table["t1"], "alice");
        assert_eq!(table["t2"], "bob");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = config(&[("EDU_GENAI_KEY", "secret"), ("EDU_API_TOKENS", "tok:alice")]);
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("secret"));
        assert!(!printed.contains("alice"));
    }
}
