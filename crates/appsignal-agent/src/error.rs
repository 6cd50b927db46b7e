// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while transmitting a payload to the collector
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("Invalid endpoint uri: {0}")]
    InvalidUri(String),

    #[error("Failed to load root certificate: {0}")]
    Certificate(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors raised by configuration validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::InvalidConfig("missing push api key".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: missing push api key"
        );

        let error = TransmitError::InvalidUri("ftp://example.com".to_string());
        assert_eq!(error.to_string(), "Invalid endpoint uri: ftp://example.com");
    }

    #[test]
    fn test_encode_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = TransmitError::from(json_error);
        assert!(matches!(error, TransmitError::Encode(_)));
        assert!(error.to_string().starts_with("Failed to encode payload"));
    }
}
