//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DispatchSection, LogOutput, LoggingConfig, SwitchboardConfig};
use std::collections::HashSet;

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchboardConfig) -> ConfigResult<()> {
    validate_dispatch_config(&config.dispatch)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates the dispatch section.
fn validate_dispatch_config(dispatch: &DispatchSection) -> ConfigResult<()> {
    if dispatch.channel_capacity == 0 {
        return Err(ConfigError::validation(
            "Channel capacity must be greater than 0",
        ));
    }

    if dispatch.send_timeout_ms == Some(0) {
        return Err(ConfigError::validation(
            "Send timeout must be greater than 0; leave it unset to wait indefinitely",
        ));
    }

    if dispatch.max_in_flight == 0 {
        return Err(ConfigError::validation(
            "Max in-flight updates must be greater than 0",
        ));
    }

    let mut seen = HashSet::new();
    for user in &dispatch.blocked_users {
        if !seen.insert(user) {
            return Err(ConfigError::validation(format!(
                "User {user} is listed twice in blocked_users"
            )));
        }
    }

    Ok(())
}

/// Validates the logging section.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "File log output requires logging.file_path",
        ));
    }

    for module in logging.filters.keys() {
        validate_filter_module(module)?;
    }

    Ok(())
}

/// Validates a module path used as a filter key.
fn validate_filter_module(module: &str) -> ConfigResult<()> {
    let valid = !module.is_empty()
        && module
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidFilter {
            module: module.to_string(),
        })
    }
}
