// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_PUSH_API_ENDPOINT: &str = "https://push.appsignal.com/1";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Already resolved agent configuration.
///
/// Discovering these values (config files, environment variables) is the job
/// of the embedding integration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Base URI of the push API
    pub push_api_endpoint: String,
    /// Push API key used to authenticate transmissions
    pub push_api_key: Option<String>,
    /// Application name
    pub name: Option<String>,
    /// Environment the configuration was resolved for
    pub environment: String,
    /// Whether monitoring is active for `environment`
    pub active: bool,
    /// Never send session data in exception reports
    pub skip_session_data: bool,
    /// Overrides the bundled root certificate
    pub ca_file_path: Option<PathBuf>,
    /// Timeout for a single transmission, transport default when unset
    pub transmit_timeout: Option<Duration>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            push_api_endpoint: DEFAULT_PUSH_API_ENDPOINT.to_string(),
            push_api_key: None,
            name: None,
            environment: "development".to_string(),
            active: false,
            skip_session_data: false,
            ca_file_path: None,
            transmit_timeout: None,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.push_api_endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "push api endpoint cannot be empty".to_string(),
            ));
        }
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ConfigError::InvalidConfig(format!(
                "push api endpoint '{endpoint}' must use http or https"
            )));
        }

        // An inactive config never transmits, so it may lack a key.
        if self.active
            && self
                .push_api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(ConfigError::InvalidConfig(format!(
                "push api key is required for active environment '{}'",
                self.environment
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_config() -> AgentConfig {
        AgentConfig {
            push_api_key: Some("abc".to_string()),
            environment: "production".to_string(),
            active: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_active_config_is_valid() {
        assert!(active_config().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_endpoint() {
        let config = AgentConfig {
            push_api_endpoint: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unsupported_scheme() {
        let config = AgentConfig {
            push_api_endpoint: "ftp://push.appsignal.com".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must use http or https"));
    }

    #[test]
    fn test_validate_active_without_key() {
        let config = AgentConfig {
            push_api_key: Some(" ".to_string()),
            ..active_config()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: push api key is required for active environment 'production'"
        );
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = AgentConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
