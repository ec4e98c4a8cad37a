use thiserror::Error;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("webhook secret is not configured (set DEPLOYBOT_WEBHOOK_SECRET)")]
    MissingWebhookSecret,

    #[error("repo binding {index} has an empty repository pattern")]
    EmptyRepositoryPattern { index: usize },

    #[error("repo binding {index} ({repository}) lists no hosts")]
    NoHostsForBinding { index: usize, repository: String },

    #[error("{field} must be positive, got {value}")]
    NonPositiveDuration { field: String, value: i64 },

    #[error("retention.job_ttl_days must be positive")]
    InvalidRetention,
}

/// Validates the loaded config. Called once at startup; any error is
/// fatal and the process does not start (spec §7 ConfigError).
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_webhook(config)?;
    validate_repo_bindings(config)?;
    validate_dispatch(config)?;
    validate_retention(config)?;
    Ok(())
}

fn validate_webhook(config: &Config) -> Result<(), ValidationError> {
    match &config.webhook.secret {
        Some(secret) if !secret.is_empty() => Ok(()),
        _ => Err(ValidationError::MissingWebhookSecret),
    }
}

fn validate_repo_bindings(config: &Config) -> Result<(), ValidationError> {
    for (index, binding) in config.repo_bindings.iter().enumerate() {
        if binding.repository.trim().is_empty() {
            return Err(ValidationError::EmptyRepositoryPattern { index });
        }
        if binding.hosts.is_empty() {
            return Err(ValidationError::NoHostsForBinding { index, repository: binding.repository.clone() });
        }
    }
    Ok(())
}

fn validate_dispatch(config: &Config) -> Result<(), ValidationError> {
    let d = &config.dispatch;
    if d.t_stale_secs <= 0 {
        return Err(ValidationError::NonPositiveDuration { field: "dispatch.t_stale_secs".into(), value: d.t_stale_secs });
    }
    if d.t_offline_secs <= d.t_stale_secs {
        return Err(ValidationError::NonPositiveDuration { field: "dispatch.t_offline_secs".into(), value: d.t_offline_secs });
    }
    if d.running_job_orphan_timeout_secs <= 0 {
        return Err(ValidationError::NonPositiveDuration {
            field: "dispatch.running_job_orphan_timeout_secs".into(),
            value: d.running_job_orphan_timeout_secs,
        });
    }
    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.job_ttl_days == 0 {
        return Err(ValidationError::InvalidRetention);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::WebhookConfig;

    fn base_config() -> Config {
        Config {
            server: Default::default(),
            webhook: WebhookConfig { secret: Some("s3cr3t".into()) },
            dispatch: Default::default(),
            logs: Default::default(),
            retention: Default::default(),
            telemetry: Default::default(),
            repo_bindings: Vec::new(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn missing_secret_is_fatal() {
        let mut config = base_config();
        config.webhook.secret = None;
        assert!(matches!(validate(&config), Err(ValidationError::MissingWebhookSecret)));
    }

    #[test]
    fn binding_without_hosts_is_rejected() {
        let mut config = base_config();
        config.repo_bindings.push(crate::domain::RepoBinding {
            repository: "myorg/web".into(),
            hosts: vec![],
            deploy_on_push: true,
            branches: vec![],
        });
        assert!(matches!(validate(&config), Err(ValidationError::NoHostsForBinding { .. })));
    }

    #[test]
    fn offline_threshold_must_exceed_stale_threshold() {
        let mut config = base_config();
        config.dispatch.t_offline_secs = config.dispatch.t_stale_secs;
        assert!(matches!(validate(&config), Err(ValidationError::NonPositiveDuration { .. })));
    }
}
