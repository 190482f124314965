use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "wikitext.config.json";

/// Process-wide parser configuration, read once at startup and shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserConfig {
    /// Use the selective serializer when original source is available
    pub use_selser: bool,

    /// Expand `{{...}}` transclusions through the fetcher
    pub expand_templates: bool,

    pub max_expansion_depth: usize,

    /// Whole-request timeout; 0 disables it
    pub request_timeout_ms: u64,

    /// Largest removed/added pair refined to word level in round-trip reports
    pub word_diff_max_bytes: usize,

    /// Namespace prepended to template targets when fetching
    pub template_namespace: String,

    /// Extension tags handed to registered handlers
    pub extensions: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            use_selser: true,
            expand_templates: true,
            max_expansion_depth: 40,
            request_timeout_ms: 30_000,
            word_diff_max_bytes: wikitext_diff::DEFAULT_WORD_DIFF_MAX_BYTES,
            template_namespace: "Template".to_string(),
            extensions: vec!["gallery".to_string()],
        }
    }
}

impl ParserConfig {
    /// Load config from a directory, defaulting when no config file exists
    pub fn load(cwd: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_path = cwd.as_ref().join(DEFAULT_CONFIG_NAME);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            ParserConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.max_expansion_depth == 0 {
            return Err(PipelineError::config("maxExpansionDepth must be at least 1"));
        }
        if self.template_namespace.is_empty() || self.template_namespace.contains(':') {
            return Err(PipelineError::config(format!(
                "templateNamespace '{}' is not a namespace name",
                self.template_namespace
            )));
        }
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|name| name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(PipelineError::config(format!(
                "extension tag '{}' is not a valid tag name",
                bad
            )));
        }
        Ok(())
    }

    /// Whether extension tag `name` is enabled.
    pub fn extension_enabled(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "useSelser": false,
            "maxExpansionDepth": 5,
            "templateNamespace": "Vorlage",
            "extensions": []
        }"#;

        let config: ParserConfig = serde_json::from_str(json).unwrap();
        assert!(!config.use_selser);
        assert!(config.expand_templates);
        assert_eq!(config.max_expansion_depth, 5);
        assert_eq!(config.template_namespace, "Vorlage");
        assert!(config.extensions.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = ParserConfig::default();
        assert!(config.use_selser);
        assert!(config.extension_enabled("Gallery"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = ParserConfig {
            max_expansion_depth: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().code(), 400);

        let config = ParserConfig {
            extensions: vec!["bad tag".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ParserConfig::load(dir.path()).unwrap(), ParserConfig::default());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "requestTimeoutMs": 250 }"#,
        )
        .unwrap();
        assert_eq!(ParserConfig::load(dir.path()).unwrap().request_timeout_ms, 250);

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "maxExpansionDepth": 0 }"#).unwrap();
        assert!(ParserConfig::load(dir.path()).is_err());
    }
}
