//! Chat configuration loading, validation, and model resolution.
//!
//! Reads `coach_greg.yaml` and resolves environment variables. A missing file
//! is not an error: every field has a default, so the app runs out of the box
//! with only `OPENAI_API_KEY` provided.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;
use super::prompt::DEFAULT_PERSONA;

// ─── Constants ───────────────────────────────────────────────────────────────

/// File name searched for when locating the config.
pub const CONFIG_FILE_NAME: &str = "coach_greg.yaml";

/// Env var that points directly at a config file.
pub const CONFIG_PATH_ENV: &str = "COACH_GREG_CONFIG";

/// The only model identifier ever sent to the provider.
pub const CANONICAL_MODEL: &str = "gpt-4o-mini";

/// Legacy identifiers and the identifier they resolve to.
const MODEL_ALIASES: &[(&str, &str)] = &[("gpt-3.5-turbo", "gpt-4o-mini"), ("gpt-4", "gpt-4o")];

// ─── Public Types ────────────────────────────────────────────────────────────

/// Runtime configuration for the chat client and transcript.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Persona instruction placed at the top of the system prompt.
    pub persona: String,
    /// Provider base URL; requests go to `{base_url}/chat/completions`.
    pub base_url: String,
    /// Requested model. Resolved through the alias table, then cost-locked.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// When `false`, turns are answered by the offline mock stream.
    pub use_remote: bool,
    /// Number of transcript entries retained by the front-end.
    pub history_window: usize,
    /// Total request timeout for streaming calls.
    pub request_timeout_secs: u64,
    /// Optional secrets file. Relative paths resolve against the config file.
    pub secrets_path: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: CANONICAL_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            use_remote: true,
            history_window: 50,
            request_timeout_secs: 180,
            secrets_path: None,
        }
    }
}

impl ChatConfig {
    /// Reject values the provider or the transcript cannot work with.
    pub fn validate(&self) -> Result<(), InferenceError> {
        let reason = if self.base_url.trim().is_empty() {
            Some("base_url must not be empty".to_string())
        } else if !(0.0..=2.0).contains(&self.temperature) {
            Some(format!(
                "temperature must be within 0.0..=2.0 (got {})",
                self.temperature
            ))
        } else if self.max_tokens == 0 {
            Some("max_tokens must be greater than zero".to_string())
        } else if self.history_window == 0 {
            Some("history_window must be greater than zero".to_string())
        } else if self.request_timeout_secs == 0 {
            Some("request_timeout_secs must be greater than zero".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InferenceError::ConfigError { reason }),
            None => Ok(()),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate `coach_greg.yaml`.
///
/// Checks `COACH_GREG_CONFIG` first, then searches upward from `start`.
/// Returns `None` when neither yields an existing file.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_PATH_ENV} points at a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load, interpolate, parse, and validate a config file.
pub fn load_chat_config(path: &Path) -> Result<ChatConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config = parse_chat_config(&raw)?;

    tracing::info!(
        path = %path.display(),
        model = %config.model,
        use_remote = config.use_remote,
        "loaded chat config"
    );

    Ok(config)
}

/// Parse config YAML (after env-var interpolation) and validate it.
pub fn parse_chat_config(raw: &str) -> Result<ChatConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);

    // An empty or comment-only file deserializes to `null`.
    let config: ChatConfig = if interpolated.trim().is_empty() {
        ChatConfig::default()
    } else {
        serde_yaml::from_str::<Option<ChatConfig>>(&interpolated)
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to parse config: {e}"),
            })?
            .unwrap_or_default()
    };

    config.validate()?;
    Ok(config)
}

/// Find and load the config, falling back to defaults when no file exists.
///
/// Returns the config and the path it was loaded from (if any).
pub fn load_or_default(start: &Path) -> Result<(ChatConfig, Option<PathBuf>), InferenceError> {
    match find_config_path(start) {
        Some(path) => Ok((load_chat_config(&path)?, Some(path))),
        None => {
            tracing::info!(start = %start.display(), "no {CONFIG_FILE_NAME} found, using defaults");
            Ok((ChatConfig::default(), None))
        }
    }
}

// ─── Model Resolution ────────────────────────────────────────────────────────

/// Map a requested model through the alias table.
///
/// Unknown identifiers pass through unchanged; an empty result falls back to
/// [`CANONICAL_MODEL`].
pub fn resolve_model(requested: &str) -> String {
    let requested = requested.trim();
    let resolved = MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == requested)
        .map(|(_, target)| *target)
        .unwrap_or(requested);

    if resolved.is_empty() {
        CANONICAL_MODEL.to_string()
    } else {
        resolved.to_string()
    }
}

/// Apply the cost lock: whatever was resolved, the canonical model is sent.
pub fn lock_model(resolved: &str) -> &'static str {
    if resolved != CANONICAL_MODEL {
        tracing::debug!(
            resolved = %resolved,
            locked = CANONICAL_MODEL,
            "model overridden by cost lock"
        );
    }
    CANONICAL_MODEL
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
