use std::str::FromStr;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub edit_policy: EditPolicy,
}

/// Limits and thresholds applied to every edit turn.
#[derive(Debug, Clone, PartialEq)]
pub struct EditPolicy {
    /// Longer user messages are rejected.
    pub max_message_chars: usize,
    /// Older history entries beyond this are dropped.
    pub max_history: usize,
    /// Batches above this size get a warning.
    pub max_patches: usize,
    /// Share of résumé lines a batch may touch before it gets a warning.
    pub max_touched_ratio: f64,
    /// Attempts per agent call before giving up.
    pub max_attempts: u32,
}

impl Default for EditPolicy {
    fn default() -> Self {
        Self {
            max_message_chars: 2000,
            max_history: 50,
            max_patches: 12,
            max_touched_ratio: 0.25,
            max_attempts: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            edit_policy: EditPolicy::from_env()?,
        })
    }
}

impl EditPolicy {
    fn from_env() -> Result<Self> {
        let defaults = EditPolicy::default();
        let policy = EditPolicy {
            max_message_chars: optional_env("EDIT_MAX_MESSAGE_CHARS", defaults.max_message_chars)?,
            max_history: optional_env("EDIT_MAX_HISTORY", defaults.max_history)?,
            max_patches: optional_env("EDIT_MAX_PATCHES", defaults.max_patches)?,
            max_touched_ratio: optional_env("EDIT_MAX_TOUCHED_RATIO", defaults.max_touched_ratio)?,
            max_attempts: optional_env("EDIT_MAX_ATTEMPTS", defaults.max_attempts)?,
        };
        anyhow::ensure!(policy.max_attempts >= 1, "EDIT_MAX_ATTEMPTS must be at least 1");
        anyhow::ensure!(
            (0.0..=1.0).contains(&policy.max_touched_ratio),
            "EDIT_MAX_TOUCHED_RATIO must be between 0 and 1"
        );
        Ok(policy)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid value, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_documented_limits() {
        let policy = EditPolicy::default();
        assert_eq!(policy.max_message_chars, 2000);
        assert_eq!(policy.max_history, 50);
        assert_eq!(policy.max_patches, 12);
        assert_eq!(policy.max_touched_ratio, 0.25);
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_optional_env_falls_back_to_default() {
        let value: usize = optional_env("RESUME_EDIT_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_optional_env_rejects_garbage() {
        std::env::set_var("RESUME_EDIT_TEST_GARBAGE", "lots");
        let result: Result<u32> = optional_env("RESUME_EDIT_TEST_GARBAGE", 3);
        assert!(result.is_err());
        std::env::remove_var("RESUME_EDIT_TEST_GARBAGE");
    }
}
