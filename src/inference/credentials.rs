//! API credential discovery.
//!
//! The key is looked up through an ordered chain of [`SecretSource`]s on every
//! request. The default chain checks the secrets file managed by the front-end
//! first and the process environment second.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::InferenceError;

/// Name of the provider credential.
pub const API_KEY_NAME: &str = "OPENAI_API_KEY";

/// Default secrets file name, looked up next to the config file.
pub const SECRETS_FILE_NAME: &str = "secrets.yaml";

/// Something that can answer "what is the value of secret `key`?".
pub trait SecretSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<String>;
}

/// `KEY: value` YAML file of secrets, re-read on every lookup.
///
/// Only top-level string entries are secrets; nested sections and other
/// scalar types are ignored. A missing or unreadable file answers `None` for
/// every key so the chain falls through to the next source.
#[derive(Debug, Clone, Default)]
pub struct SecretsFile {
    path: Option<PathBuf>,
}

impl SecretsFile {
    /// An empty store, used when no secrets file is configured.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A store backed by `path`. The file need not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current string entries of the file. A missing file is an empty map.
    pub fn read_values(&self) -> Result<HashMap<String, String>, InferenceError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(HashMap::new());
        };
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to read secrets {}: {e}", path.display()),
        })?;
        parse_secrets(&raw).map_err(|reason| InferenceError::ConfigError {
            reason: format!("failed to parse secrets {}: {reason}", path.display()),
        })
    }
}

impl SecretSource for SecretsFile {
    fn name(&self) -> &str {
        "secrets_file"
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.read_values() {
            Ok(mut values) => values.remove(key),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable secrets file");
                None
            }
        }
    }
}

fn parse_secrets(raw: &str) -> Result<HashMap<String, String>, String> {
    let mapping = match serde_yaml::from_str::<serde_yaml::Value>(raw).map_err(|e| e.to_string())? {
        serde_yaml::Value::Null => return Ok(HashMap::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => return Err("expected a mapping of KEY: value entries".to_string()),
    };

    Ok(mapping
        .into_iter()
        .filter_map(|(key, value)| match (key, value) {
            (serde_yaml::Value::String(k), serde_yaml::Value::String(v)) => Some((k, v)),
            _ => None,
        })
        .collect())
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl SecretSource for HashMap<String, String> {
    fn name(&self) -> &str {
        "map"
    }

    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Ordered chain of secret sources. The first non-empty value wins.
#[derive(Clone)]
pub struct Credentials {
    chain: Vec<Arc<dyn SecretSource>>,
}

impl Credentials {
    /// Front-end secrets first, then the environment.
    pub fn new(secrets: Arc<dyn SecretSource>) -> Self {
        Self {
            chain: vec![secrets, Arc::new(EnvSecrets)],
        }
    }

    /// Environment only.
    pub fn from_env() -> Self {
        Self {
            chain: vec![Arc::new(EnvSecrets)],
        }
    }

    /// An explicit chain, consulted in order.
    pub fn from_sources(chain: Vec<Arc<dyn SecretSource>>) -> Self {
        Self { chain }
    }

    /// Resolve the provider API key.
    ///
    /// Not cached: every call walks the chain again.
    pub fn api_key(&self) -> Result<String, InferenceError> {
        self.lookup(API_KEY_NAME)
    }

    fn lookup(&self, key: &str) -> Result<String, InferenceError> {
        for source in &self.chain {
            if let Some(value) = source.get(key).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(source = source.name(), key, "credential resolved");
                return Ok(value);
            }
        }

        Err(InferenceError::MissingCredential {
            key: key.to_string(),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "chain",
                &self.chain.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> Arc<dyn SecretSource> {
        Arc::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn test_first_source_wins() {
        let creds = Credentials::from_sources(vec![
            map(&[(API_KEY_NAME, "sk-secrets")]),
            map(&[(API_KEY_NAME, "sk-env")]),
        ]);
        assert_eq!(creds.api_key().unwrap(), "sk-secrets");
    }

    #[test]
    fn test_falls_through_to_second_source() {
        let creds = Credentials::from_sources(vec![map(&[]), map(&[(API_KEY_NAME, "sk-env")])]);
        assert_eq!(creds.api_key().unwrap(), "sk-env");
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let creds = Credentials::from_sources(vec![
            map(&[(API_KEY_NAME, "  ")]),
            map(&[(API_KEY_NAME, "sk-env")]),
        ]);
        assert_eq!(creds.api_key().unwrap(), "sk-env");
    }

    #[test]
    fn test_missing_everywhere_is_configuration_error() {
        let creds = Credentials::from_sources(vec![map(&[]), map(&[("OTHER", "x")])]);
        let err = creds.api_key().unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(err, InferenceError::MissingCredential { ref key } if key == API_KEY_NAME));
    }

    #[test]
    fn test_secrets_file_reads_string_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SECRETS_FILE_NAME);
        std::fs::write(&path, "OPENAI_API_KEY: sk-from-file\n").unwrap();

        let secrets = SecretsFile::open(&path);
        assert_eq!(secrets.get(API_KEY_NAME).as_deref(), Some("sk-from-file"));
        assert_eq!(secrets.path(), Some(path.as_path()));
    }

    #[test]
    fn test_secrets_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = SecretsFile::open(dir.path().join("nope.yaml"));
        assert!(secrets.read_values().unwrap().is_empty());
        assert!(secrets.get(API_KEY_NAME).is_none());
        assert!(SecretsFile::empty().get(API_KEY_NAME).is_none());
    }

    #[test]
    fn test_secrets_file_picks_up_later_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SECRETS_FILE_NAME);
        std::fs::write(&path, "OTHER: x\n").unwrap();

        let source: Arc<dyn SecretSource> = Arc::new(SecretsFile::open(&path));
        let creds = Credentials::from_sources(vec![source]);
        assert!(creds.api_key().is_err());

        std::fs::write(&path, "OPENAI_API_KEY: sk-added-later\n").unwrap();
        assert_eq!(creds.api_key().unwrap(), "sk-added-later");

        std::fs::remove_file(&path).unwrap();
        assert!(creds.api_key().is_err());
    }

    #[test]
    fn test_secrets_file_skips_nested_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SECRETS_FILE_NAME);
        std::fs::write(
            &path,
            "OPENAI_API_KEY: sk-abc\ndatabase:\n  host: localhost\nretries: 3\n",
        )
        .unwrap();

        let secrets = SecretsFile::open(&path);
        let values = secrets.read_values().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(secrets.get(API_KEY_NAME).as_deref(), Some("sk-abc"));
        assert!(secrets.get("database").is_none());
    }

    #[test]
    fn test_unparseable_secrets_file_falls_through_to_next_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SECRETS_FILE_NAME);
        std::fs::write(&path, "- just\n- a list\n").unwrap();

        let secrets = SecretsFile::open(&path);
        assert!(secrets.read_values().is_err());
        assert!(secrets.get(API_KEY_NAME).is_none());

        let creds = Credentials::from_sources(vec![
            Arc::new(secrets) as Arc<dyn SecretSource>,
            map(&[(API_KEY_NAME, "sk-env")]),
        ]);
        assert_eq!(creds.api_key().unwrap(), "sk-env");
    }
}
