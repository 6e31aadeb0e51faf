//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery, environment detection
//! and merging of environment-specific sections into the base document.

use super::error::{ConfigResult, ConfigurationError};
use super::WatchmanConfig;
use serde_json::Value;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 3] = ["watchman.yaml", "watchman.yml", "watchman.json"];
const ENVIRONMENT_SECTIONS: [&str; 4] = ["development", "test", "staging", "production"];

/// Loaded configuration plus the merged raw document it was parsed from
#[derive(Debug)]
pub struct ConfigManager {
    config: WatchmanConfig,
    /// Merged document handed to actions as their service configuration
    raw: Value,
    environment: String,
    config_file: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        let config_file = Self::find_config_file(&config_directory)?;
        Self::load_file_with_env(&config_file, environment).map(Arc::new)
    }

    /// Load and validate a specific configuration file
    pub fn load_file_with_env(config_file: &Path, environment: &str) -> ConfigResult<ConfigManager> {
        debug!(
            "Loading configuration for environment '{}' from file: {}",
            environment,
            config_file.display()
        );

        let raw = Self::load_and_merge_document(config_file, environment)?;
        let config: WatchmanConfig = serde_json::from_value(raw.clone()).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&raw))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            source = %config.source,
            events = config.event_handlers.len(),
            actions = config.event_handlers.action_names().len(),
            "Configuration loaded"
        );

        Ok(ConfigManager {
            config,
            raw,
            environment: environment.to_string(),
            config_file: config_file.to_path_buf(),
        })
    }

    /// Build a manager from an already-parsed configuration (no backing file)
    pub fn from_config(config: WatchmanConfig) -> ConfigResult<ConfigManager> {
        config.validate()?;
        let raw = serde_json::to_value(&config).map_err(|e| {
            ConfigurationError::validation_error(format!("Failed to serialize configuration: {e}"))
        })?;

        Ok(ConfigManager {
            config,
            raw,
            environment: Self::detect_environment(),
            config_file: PathBuf::new(),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &WatchmanConfig {
        &self.config
    }

    /// Get the merged configuration document
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Get sanitized configuration for debugging/logging that masks sensitive fields
    pub fn debug_config(&self) -> Value {
        Self::sanitize_config_for_logging(&self.raw)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Path of the file this configuration came from; empty for in-memory configuration
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("WATCHMAN_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("WATCHMAN_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    /// First of the known file names present in `config_directory`
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let candidates: Vec<PathBuf> = CONFIG_FILE_NAMES
            .iter()
            .map(|name| config_directory.join(name))
            .collect();

        match candidates.iter().find(|path| path.is_file()) {
            Some(found) => {
                debug!(config_file = %found.display(), "Found configuration file");
                Ok(found.clone())
            }
            None => Err(ConfigurationError::config_file_not_found(candidates)),
        }
    }

    /// Read the document text, refusing anything that is not a regular file under 10MB
    fn read_document(path: &Path) -> ConfigResult<String> {
        const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

        let read_error = |e| ConfigurationError::file_read_error(path.display().to_string(), e);
        let metadata = std::fs::metadata(path).map_err(read_error)?;

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "config_file",
                path.display().to_string(),
                "not a regular file",
            ));
        }
        if metadata.len() > MAX_DOCUMENT_BYTES {
            return Err(ConfigurationError::invalid_value(
                "config_file",
                format!("{} bytes", metadata.len()),
                format!("exceeds the {MAX_DOCUMENT_BYTES} byte limit"),
            ));
        }

        std::fs::read_to_string(path).map_err(read_error)
    }

    /// Parse the file and fold the section named after `environment` into the base document
    fn load_and_merge_document(config_file: &Path, environment: &str) -> ConfigResult<Value> {
        let text = Self::read_document(config_file)?;
        let document: YamlValue = serde_yaml::from_str(&text)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        let merged = Self::resolve_environment(document, environment);
        serde_json::to_value(&merged)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))
    }

    /// Strip every environment section out of `document`, then overlay the one for
    /// `environment` onto what remains
    ///
    /// Sections named after other environments never reach the merged document, so actions
    /// only ever see settings for the environment they run in.
    fn resolve_environment(document: YamlValue, environment: &str) -> YamlValue {
        let mut base = match document {
            YamlValue::Mapping(base) => base,
            other => return other,
        };

        let overrides = base.remove(environment);
        for section in ENVIRONMENT_SECTIONS {
            base.remove(section);
        }

        match overrides {
            Some(overrides) => {
                debug!(environment = %environment, "Applying environment section");
                Self::overlay(YamlValue::Mapping(base), overrides)
            }
            None => YamlValue::Mapping(base),
        }
    }

    /// Mappings merge key by key; any other override value replaces the base outright
    fn overlay(base: YamlValue, overrides: YamlValue) -> YamlValue {
        match (base, overrides) {
            (YamlValue::Mapping(mut base), YamlValue::Mapping(overrides)) => {
                for (key, value) in overrides {
                    let merged = match base.remove(&key) {
                        Some(existing) => Self::overlay(existing, value),
                        None => value,
                    };
                    base.insert(key, merged);
                }
                YamlValue::Mapping(base)
            }
            (_, replacement) => replacement,
        }
    }

    /// Sanitize configuration for safe logging by masking sensitive fields
    fn sanitize_config_for_logging(raw: &Value) -> Value {
        let mut config_json = raw.clone();
        let sensitive_patterns = ["password", "secret", "key", "token", "credential", "auth"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut Value, sensitive_patterns: &[&str]) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive && !val.is_object() && !val.is_array() {
                        *val = Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSource;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
service:
  name: watchman-test
source: cwrx
event_handlers:
  campaignCreated:
    actions:
      - send_email
      - name: update_campaign
        options:
          field: status
metrics:
  namespace: Watchman/Test
  flush_interval_ms: 5000
email:
  sender: support@example.com
  api_key: abcdef123456

production:
  metrics:
    namespace: Watchman/Production
  reload:
    interval_secs: 120
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(config_dir.join("watchman.yaml"), create_test_config_yaml()).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_discovery() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let config_file = ConfigManager::find_config_file(&config_dir).unwrap();
        assert_eq!(config_file.file_name().unwrap(), "watchman.yaml");
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigManager::find_config_file(temp_dir.path());
        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), CONFIG_FILE_NAMES.len());
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_basic_config_loading() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "development").unwrap();
        let config = manager.config();

        assert_eq!(config.service.name, "watchman-test");
        assert_eq!(config.source, EventSource::Cwrx);
        assert_eq!(config.metrics.namespace, "Watchman/Test");
        assert_eq!(config.metrics.flush_interval_ms, 5000);
        assert_eq!(config.reload.interval_secs, 30);

        let actions = config.event_handlers.actions_for("campaignCreated").unwrap();
        assert_eq!(actions[0].name(), "send_email");
        assert_eq!(actions[1].name(), "update_campaign");

        // Action-specific sections survive in the raw document
        assert_eq!(manager.raw()["email"]["sender"], "support@example.com");
        assert!(manager.raw().get("production").is_none());
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "production").unwrap();

        assert_eq!(manager.environment(), "production");
        assert_eq!(manager.config().metrics.namespace, "Watchman/Production");
        // Untouched keys in an overridden section keep their base value
        assert_eq!(manager.config().metrics.flush_interval_ms, 5000);
        assert_eq!(manager.config().reload.interval_secs, 120);
    }

    #[test]
    fn test_environment_sections_never_reach_the_merged_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watchman.yaml");
        fs::write(
            &path,
            r#"
source: watchman
mailer:
  from: ops@example.com
  retries: 2
event_handlers:
  tick:
    actions: [count, archive]
qa:
  mailer:
    from: qa@example.com
  event_handlers:
    tick:
      actions: [count]
production:
  mailer:
    from: prod@example.com
"#,
        )
        .unwrap();

        let manager = ConfigManager::load_file_with_env(&path, "qa").unwrap();
        let raw = manager.raw();

        assert_eq!(raw["mailer"]["from"], "qa@example.com");
        assert_eq!(raw["mailer"]["retries"], 2);
        assert!(raw.get("qa").is_none());
        assert!(raw.get("production").is_none());
        // Sequences are replaced, not concatenated
        let actions = manager.config().event_handlers.actions_for("tick").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name(), "count");
    }

    #[test]
    fn test_missing_source_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watchman.yaml");
        fs::write(&path, "service:\n  name: nameless\n").unwrap();

        let result = ConfigManager::load_file_with_env(&path, "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watchman.yaml");
        fs::write(&path, "source: [cwrx\n").unwrap();

        let result = ConfigManager::load_file_with_env(&path, "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_config_sanitization() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "development").unwrap();

        let sanitized = manager.debug_config();
        assert_eq!(sanitized["email"]["api_key"], "[MASKED]");
        assert_eq!(sanitized["email"]["sender"], "support@example.com");
        // The raw document itself is never modified
        assert_eq!(manager.raw()["email"]["api_key"], "abcdef123456");
    }
}
