//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the routing prefix and page extensions
//! - Reject unsafe admin and header settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::{RouterConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("routing.prefix must be a single non-empty path segment, got '{0}'")]
    InvalidPrefix(String),

    #[error("routing.page_extensions must not be empty")]
    NoPageExtensions,

    #[error("routing.page_extensions: invalid extension '{0}'")]
    InvalidPageExtension(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroTimeout,

    #[error("admin.api_key must be set when the admin API is enabled")]
    WeakApiKey,

    #[error("security.frame_options is not a valid header value: '{0}'")]
    InvalidFrameOptions(String),

    #[error("plugins.dev: plugin '{0}' is configured more than once")]
    DuplicateDevPlugin(String),

    #[error("plugins.dev: entry with an empty plugin name")]
    EmptyDevPluginName,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let prefix = &config.routing.prefix;
    if prefix.is_empty() || prefix.contains('/') {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }

    if config.routing.page_extensions.is_empty() {
        errors.push(ValidationError::NoPageExtensions);
    }
    for ext in &config.routing.page_extensions {
        if ext.is_empty() || ext.contains('.') || ext.contains('/') {
            errors.push(ValidationError::InvalidPageExtension(ext.clone()));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::WeakApiKey);
        }
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if HeaderValue::from_str(&config.security.frame_options).is_err()
        || config.security.frame_options.is_empty()
    {
        errors.push(ValidationError::InvalidFrameOptions(
            config.security.frame_options.clone(),
        ));
    }

    let mut seen = HashSet::new();
    for dev in &config.plugins.dev {
        if dev.name.is_empty() {
            errors.push(ValidationError::EmptyDevPluginName);
        } else if !seen.insert(dev.name.as_str()) {
            errors.push(ValidationError::DuplicateDevPlugin(dev.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DevPluginConfig;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RouterConfig::default();
        config.listener.bind_address = "not an address".into();
        config.routing.prefix = "a/b".into();
        config.routing.page_extensions = vec![".jsp".into()];
        config.timeouts.request_secs = 0;
        config.admin.enabled = true;
        config.security.frame_options = "deny\n".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::WeakApiKey));
        assert!(errors.contains(&ValidationError::ZeroTimeout));
    }

    #[test]
    fn test_duplicate_dev_plugins() {
        let mut config = RouterConfig::default();
        let dev = DevPluginConfig {
            name: "foo".into(),
            web_root: PathBuf::from("/src/foo/web"),
            classes_dir: None,
        };
        config.plugins.dev = vec![dev.clone(), dev];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateDevPlugin("foo".into())]);
    }
}
