//! Multi-source configuration loader: defaults → TOML file → environment.

use std::path::{Path, PathBuf};

use crate::{ConfigError, PgSentryConfig};

/// Builder-style loader for [`PgSentryConfig`].
///
/// Mirrors the precedence of the original `read_config` (ini defaults
/// overlaid with the on-disk file), plus a `PGSENTRY_`-prefixed
/// environment overlay so individual settings can be pinned per host
/// without editing the shared config file.
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_file: None,
            env_prefix: "PGSENTRY".to_string(),
        }
    }

    #[must_use]
    pub fn with_config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads configuration, merging built-in defaults with the optional
    /// file and environment overrides.
    pub fn load(self) -> Result<PgSentryConfig, ConfigError> {
        let mut builder = config::Config::builder();

        let defaults = PgSentryConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        if let Some(path) = &self.config_file {
            builder = builder.add_source(
                config::File::from(path.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let built = builder.build()?;
        let config: PgSentryConfig = built.try_deserialize()?;
        Ok(config)
    }

    /// Loads configuration, falling back to built-in defaults on any error.
    #[must_use]
    pub fn load_or_default(self) -> PgSentryConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_without_file_returns_defaults() {
        let config = ConfigLoader::new().load().expect("load");
        assert_eq!(config.global.zk_hosts, "localhost:2181");
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pgsentry.toml");
        fs::write(
            &path,
            r#"
[global]
zk_hosts = "zk1:2181,zk2:2181,zk3:2181"
priority = 5

[replica]
allow_potential_data_loss = true
"#,
        )
        .unwrap();

        let config = ConfigLoader::new().with_config_file(&path).load().unwrap();
        assert_eq!(config.global.zk_hosts, "zk1:2181,zk2:2181,zk3:2181");
        assert_eq!(config.global.priority, 5);
        assert!(config.replica.allow_potential_data_loss);
    }
}
