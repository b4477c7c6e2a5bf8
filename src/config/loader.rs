//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern");
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with an uppercase letter or underscore and
/// contain only uppercase letters, digits, and underscores.
pub fn expand_env_vars(s: &str) -> String {
    ENV_VAR
        .replace_all(s, |cap: &regex_lite::Captures<'_>| {
            match std::env::var(&cap[1]) {
                Ok(value) => value,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => cap[0].to_string(),
                },
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("CHAT_GATE_LOADER_TEST_VAR", "test_value");
        let expanded = expand_env_vars("key: ${CHAT_GATE_LOADER_TEST_VAR}");
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("CHAT_GATE_LOADER_TEST_VAR");
    }

    #[test]
    fn test_expand_default() {
        let expanded = expand_env_vars("ttl: ${CHAT_GATE_LOADER_UNSET:-300}");
        assert_eq!(expanded, "ttl: 300");
    }

    #[test]
    fn test_unset_without_default_kept() {
        let expanded = expand_env_vars("id: ${CHAT_GATE_LOADER_UNSET_TOO}");
        assert_eq!(expanded, "id: ${CHAT_GATE_LOADER_UNSET_TOO}");
    }

    #[test]
    fn test_from_yaml() {
        let config = ConfigLoader::from_yaml(
            r#"
server:
  address: "127.0.0.1:8000"
auth:
  issuer: "https://issuer.example.com"
  client_id: "abc"
  token_source:
    type: cookie
"#,
        )
        .unwrap();

        assert_eq!(config.auth.client_id, "abc");
        assert_eq!(config.auth.token_source.label(), "cookie");
        assert!(config.metrics.enabled);
        assert!(!config.server.secure_cookies);
    }
}
