use std::env;
use std::path::PathBuf;

use config::{ConfigError, Environment, File};

use super::models::Config;

const CONFIG_ENV_VAR: &str = "DEPLOYBOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/deploybot.toml";
const ENV_PREFIX: &str = "DEPLOYBOT";
const ENV_SEPARATOR: &str = "__";

/// Loads configuration with priority (highest to lowest): system
/// environment variables, `.env` file, TOML file, struct defaults.
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// The webhook secret never lives in the TOML file or in version control;
/// it only ever comes from the process environment.
pub(super) fn load_secrets(config: &mut Config) {
    if let Ok(secret) = env::var("DEPLOYBOT_WEBHOOK_SECRET") {
        config.webhook.secret = Some(secret);
    }
}

pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(path = %config_path.display(), "config file not found, using defaults and environment overrides");
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_defaults_only() {
        let dir = TempDir::new().unwrap();
        let config = load_from_sources(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn load_repo_bindings_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploybot.toml");
        fs::write(
            &path,
            r#"
[[repo_bindings]]
repository = "myorg/web"
hosts = ["web-01", "web-02"]
branches = ["main"]

[server]
bind_addr = "127.0.0.1:9000"
"#,
        )
        .unwrap();

        let config = load_from_sources(path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.repo_bindings.len(), 1);
        assert_eq!(config.repo_bindings[0].hosts, vec!["web-01", "web-02"]);
    }
}
