//! Environment-driven configuration
//!
//! Every knob has a default. A value that fails to parse or falls outside its
//! range is reported with a warning and replaced by the default.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 150;
pub const DEFAULT_MAX_AUTO_TURNS: u32 = 3;
pub const DEFAULT_CONTINUE_PROBABILITY: f64 = 0.75;
pub const DEFAULT_REACTION_PROBABILITY: f64 = 0.25;
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TRANSPORT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Parse { key: String, value: String },
    #[error("{key}: {value} is outside {min}..={max}")]
    OutOfRange {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Backend settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// Gateway base URL replacing the `OpenAI` host
    pub gateway: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// HTTP-level timeout for one backend call
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            gateway: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            gateway: lookup("LLM_GATEWAY").filter(|g| !g.is_empty()),
            model: lookup("DIALOGUE_MODEL")
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.model),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            request_timeout: setting::<u32>(lookup, "DIALOGUE_GENERATION_TIMEOUT_SECS", 1, 600)
                .map_or(defaults.request_timeout, |s| Duration::from_secs(u64::from(s))),
        }
    }
}

/// Scheduler and turn-taking settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Automatic messages allowed in a row before the engine waits for the user
    pub max_auto_turns: u32,
    /// Chance that a chain continues after an automatic message
    pub continue_probability: f64,
    /// Chance that another recipient reacts after a generated message
    pub reaction_probability: f64,
    /// Deadline for each backend call; a call that runs out is retried
    pub generation_timeout: Duration,
    /// Transport attempts per generation call
    pub transport_attempts: u32,
    /// First retry delay; doubles per attempt
    pub backoff_base: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_auto_turns: DEFAULT_MAX_AUTO_TURNS,
            continue_probability: DEFAULT_CONTINUE_PROBABILITY,
            reaction_probability: DEFAULT_REACTION_PROBABILITY,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            transport_attempts: DEFAULT_TRANSPORT_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_auto_turns: setting(lookup, "DIALOGUE_MAX_AUTO_TURNS", 0, 100)
                .unwrap_or(defaults.max_auto_turns),
            continue_probability: probability(lookup, "DIALOGUE_CONTINUE_PROBABILITY")
                .unwrap_or(defaults.continue_probability),
            reaction_probability: probability(lookup, "DIALOGUE_REACTION_PROBABILITY")
                .unwrap_or(defaults.reaction_probability),
            generation_timeout: setting::<u32>(lookup, "DIALOGUE_GENERATION_TIMEOUT_SECS", 1, 600)
                .map_or(defaults.generation_timeout, |s| Duration::from_secs(u64::from(s))),
            transport_attempts: setting(lookup, "DIALOGUE_TRANSPORT_ATTEMPTS", 1, 10)
                .unwrap_or(defaults.transport_attempts),
            backoff_base: setting::<u32>(lookup, "DIALOGUE_BACKOFF_MS", 0, 60_000)
                .map_or(defaults.backoff_base, |ms| Duration::from_millis(u64::from(ms))),
        }
    }
}

/// Full process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            llm: LlmConfig::from_env(),
            engine: EngineConfig::from_env(),
            port: setting(&env_lookup, "DIALOGUE_PORT", 1, u16::MAX).unwrap_or(DEFAULT_PORT),
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse `key` and check it against `min..=max`
fn parse_in_range<T>(key: &str, raw: &str, min: T, max: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Copy + Into<f64>,
{
    let value: T = raw.trim().parse().map_err(|_| ConfigError::Parse {
        key: key.to_string(),
        value: raw.to_string(),
    })?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(value)
}

fn setting<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd + Copy + Into<f64>,
{
    let raw = lookup(key)?;
    match parse_in_range(key, &raw, min, max) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring invalid setting, using default");
            None
        }
    }
}

fn probability(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<f64> {
    setting(lookup, key, 0.0, 1.0)
}
