//! Service configuration loading and validation.
//!
//! All settings come from process environment variables with documented
//! defaults. Config is resolved once at startup; invalid values abort boot
//! rather than surfacing later as runtime surprises.

use thiserror::Error;

/// Minimum accepted length for `SESSION_SECRET`.
const MIN_SECRET_LEN: usize = 32;

/// Configuration loading or validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("missing required setting: {key}")]
    Missing { key: String },
}

/// LLM endpoint settings consumed by the gateway.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible endpoint (no trailing slash).
    pub base_url: String,
    /// Bearer token sent with every request. Empty string = no auth header.
    pub api_key: String,
    /// Model tag passed through verbatim.
    pub model: String,
    /// Default sampling temperature when no profile override applies.
    pub temperature: f32,
    /// Default output token cap when no profile override applies.
    pub max_tokens: u32,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path. `:memory:` is accepted for ephemeral runs.
    pub database_path: String,
    pub llm: LlmSettings,
    /// Opaque secret used to derive session fingerprint material.
    pub session_secret: String,
    /// Allowed CORS origins. Empty list = allow any origin.
    pub cors_origins: Vec<String>,
    /// Whether the neural scoring path may be attempted.
    pub neural_scoring_enabled: bool,
    /// Path to the ONNX scoring model.
    pub neural_model_path: String,
    /// Path to the JSON standardisation descriptor.
    pub neural_scaler_path: String,
    /// Optional override for the lender seed file. Empty = embedded seed.
    pub lender_seed_path: String,
    /// Currency symbol used in all match reason strings.
    pub currency_symbol: String,
    /// HTTP listen port.
    pub port: u16,
    /// Log verbosity passed to the tracing `EnvFilter`.
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let session_secret = env_or("SESSION_SECRET", "");
        if session_secret.is_empty() {
            return Err(ConfigError::Missing {
                key: "SESSION_SECRET".into(),
            });
        }
        if session_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "SESSION_SECRET".into(),
                reason: format!("must be at least {MIN_SECRET_LEN} characters"),
            });
        }

        let port = parse_env("PORT", 3000u16)?;
        let temperature = parse_env("LLM_TEMPERATURE", 0.7f32)?;
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfigError::Invalid {
                key: "LLM_TEMPERATURE".into(),
                reason: "must be within [0, 1]".into(),
            });
        }
        let max_tokens = parse_env("LLM_MAX_TOKENS", 1024u32)?;
        if max_tokens == 0 {
            return Err(ConfigError::Invalid {
                key: "LLM_MAX_TOKENS".into(),
                reason: "must be positive".into(),
            });
        }

        let cors_origins = env_or("CORS_ORIGINS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            database_path: env_or("DATABASE_PATH", "loanmatch.db"),
            llm: LlmSettings {
                base_url: env_or("LLM_BASE_URL", "http://localhost:11434/v1")
                    .trim_end_matches('/')
                    .to_string(),
                api_key: env_or("LLM_API_KEY", ""),
                model: env_or("LLM_MODEL", "gemini-2.0-flash"),
                temperature,
                max_tokens,
            },
            session_secret,
            cors_origins,
            neural_scoring_enabled: parse_bool("NEURAL_SCORING_ENABLED", false)?,
            neural_model_path: env_or("NEURAL_MODEL_PATH", "models/lender_scorer.onnx"),
            neural_scaler_path: env_or("NEURAL_SCALER_PATH", "models/scaler_params.json"),
            lender_seed_path: env_or("LENDER_SEED_PATH", ""),
            currency_symbol: env_or("CURRENCY_SYMBOL", "₹"),
            port,
            log_level: env_or("LOG_LEVEL", "loanmatch=info,warn"),
        })
    }
}

/// Read an env var, falling back to `default` when unset or empty.
fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Read and parse an env var, falling back to `default` when unset.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("could not parse '{}'", v.trim()),
            })
        }
        _ => Ok(default),
    }
}

/// Parse a boolean env var accepting `1/0`, `true/false`, `yes/no`.
fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
        _ => Ok(default),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default_when_unset() {
        std::env::remove_var("__LOANMATCH_TEST_UNSET__");
        assert_eq!(env_or("__LOANMATCH_TEST_UNSET__", "fallback"), "fallback");
    }

    #[test]
    fn test_env_or_value_when_set() {
        std::env::set_var("__LOANMATCH_TEST_SET__", "  value  ");
        assert_eq!(env_or("__LOANMATCH_TEST_SET__", "fallback"), "value");
        std::env::remove_var("__LOANMATCH_TEST_SET__");
    }

    #[test]
    fn test_parse_bool_variants() {
        std::env::set_var("__LOANMATCH_TEST_BOOL__", "yes");
        assert!(parse_bool("__LOANMATCH_TEST_BOOL__", false).unwrap());
        std::env::set_var("__LOANMATCH_TEST_BOOL__", "off");
        assert!(!parse_bool("__LOANMATCH_TEST_BOOL__", true).unwrap());
        std::env::set_var("__LOANMATCH_TEST_BOOL__", "maybe");
        assert!(parse_bool("__LOANMATCH_TEST_BOOL__", false).is_err());
        std::env::remove_var("__LOANMATCH_TEST_BOOL__");
    }

    #[test]
    fn test_short_session_secret_rejected() {
        std::env::set_var("SESSION_SECRET", "too-short");
        let result = AppConfig::from_env();
        assert!(matches!(result, Err(ConfigError::Invalid { ref key, .. }) if key == "SESSION_SECRET"));
        std::env::remove_var("SESSION_SECRET");
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("__LOANMATCH_TEST_PORT__", "not-a-port");
        let result: Result<u16, _> = parse_env("__LOANMATCH_TEST_PORT__", 3000);
        assert!(result.is_err());
        std::env::remove_var("__LOANMATCH_TEST_PORT__");
    }
}
