use std::path::Path;

pub const DEFAULT_MAX_VARIABLE_ERRORS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid executor configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Executor wide settings. Every request may override the feature flags.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Honor `@defer` and `@stream`. When disabled both directives are ignored.
    pub enable_incremental: bool,
    /// Execute mutations with the parallel algorithm too.
    pub force_query_algorithm: bool,
    pub max_variable_errors: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enable_incremental: true,
            force_query_algorithm: false,
            max_variable_errors: DEFAULT_MAX_VARIABLE_ERRORS,
        }
    }
}

impl ExecutorConfig {
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = ExecutorConfig::from_toml("force_query_algorithm = true").unwrap();
        assert_eq!(
            config,
            ExecutorConfig {
                force_query_algorithm: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = ExecutorConfig::from_toml("enable_defer = true").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
