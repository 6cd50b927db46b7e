// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON transmission to the push API.
//!
//! A [`Transmitter`] posts a flat JSON object (the caller's payload plus the
//! `api_key`/`agent_version` envelope) to `<base>/<action>`. HTTPS endpoints
//! are verified against a single bundled root certificate instead of the
//! platform trust store. Each call makes exactly one synchronous attempt;
//! retrying is up to the caller.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use appsignal_fips::reqwest_adapter::create_reqwest_client_builder;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::config::AgentConfig;
use crate::error::TransmitError;

/// Version reported in every transmitted payload.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Location of the bundled root certificate, relative to the crate root.
pub const CA_FILE_RELATIVE_PATH: &str = "resources/digicert_global_root_g2.pem";

/// The bundled root certificate, compiled into the binary.
pub const BUNDLED_ROOT_PEM: &[u8] = include_bytes!("../resources/digicert_global_root_g2.pem");

/// Source location of the bundled root certificate in the crate checkout.
///
/// Only meaningful where the source tree is present; transmission never
/// reads this file and uses [`BUNDLED_ROOT_PEM`] instead.
pub fn ca_file_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(CA_FILE_RELATIVE_PATH)
}

/// Transport settings derived from the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub use_tls: bool,
    pub verify_peer: bool,
    /// Replaces the bundled root as the only trust anchor.
    pub ca_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Posts payloads for one push API action.
#[derive(Debug, Clone)]
pub struct Transmitter {
    uri: Url,
    action: String,
    api_key: String,
    ca_file: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Transmitter {
    /// Creates a transmitter for `<base_uri>/<action>`.
    pub fn new(
        base_uri: &str,
        action: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, TransmitError> {
        let action = action.into();
        let mut uri = Url::parse(base_uri)
            .map_err(|err| TransmitError::InvalidUri(format!("{base_uri}: {err}")))?;
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(TransmitError::InvalidUri(format!(
                "{base_uri}: unsupported scheme"
            )));
        }
        uri.path_segments_mut()
            .map_err(|()| TransmitError::InvalidUri(format!("{base_uri}: cannot be a base")))?
            .pop_if_empty()
            .push(&action);

        Ok(Self {
            uri,
            action,
            api_key: api_key.into(),
            ca_file: None,
            timeout: None,
        })
    }

    /// Creates a transmitter for `action` from the push API settings in `config`.
    pub fn from_config(config: &AgentConfig, action: &str) -> Result<Self, TransmitError> {
        let mut transmitter = Self::new(
            &config.push_api_endpoint,
            action,
            config.push_api_key.clone().unwrap_or_default(),
        )?;
        transmitter.ca_file.clone_from(&config.ca_file_path);
        transmitter.timeout = config.transmit_timeout;
        Ok(transmitter)
    }

    /// Trusts the root certificate in `ca_file` instead of the bundled one.
    #[must_use]
    pub fn with_ca_file(mut self, ca_file: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(ca_file.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Endpoint with the action appended.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Merges the `api_key`/`agent_version` envelope with `payload`.
    ///
    /// Payload keys are merged last and win on collision.
    pub fn message(&self, payload: Map<String, Value>) -> Map<String, Value> {
        let mut message = Map::new();
        message.insert("api_key".to_string(), Value::from(self.api_key.as_str()));
        message.insert("agent_version".to_string(), Value::from(AGENT_VERSION));
        message.extend(payload);
        message
    }

    /// JSON encoding of [`Transmitter::message`].
    pub fn encoded_message(&self, payload: Map<String, Value>) -> Result<String, TransmitError> {
        Ok(serde_json::to_string(&self.message(payload))?)
    }

    /// Transport settings for the configured endpoint.
    pub fn client_settings(&self) -> ClientSettings {
        let use_tls = self.uri.scheme() == "https";
        ClientSettings {
            use_tls,
            verify_peer: use_tls,
            ca_file: self.ca_file.clone().filter(|_| use_tls),
            timeout: self.timeout,
        }
    }

    fn http_client(&self) -> Result<Client, TransmitError> {
        let settings = self.client_settings();
        let mut builder = if settings.use_tls {
            let pem = match &settings.ca_file {
                Some(ca_file) => Cow::Owned(fs::read(ca_file).map_err(|err| {
                    TransmitError::Certificate(format!("{}: {err}", ca_file.display()))
                })?),
                None => Cow::Borrowed(BUNDLED_ROOT_PEM),
            };
            create_reqwest_client_builder(&pem)
                .map_err(|err| TransmitError::TlsConfig(err.to_string()))?
        } else {
            Client::builder()
        };
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    /// Posts `payload` and returns the response status code.
    ///
    /// Transport failures are returned as errors; non-2xx statuses are not.
    pub fn transmit(&self, payload: Map<String, Value>) -> Result<u16, TransmitError> {
        let body = self.encoded_message(payload)?;
        let client = self.http_client()?;

        debug!("Transmitting {} bytes to {}", body.len(), self.uri);
        let response = client
            .post(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()?;

        let status = response.status();
        if status.is_success() {
            debug!("{status}: Transmitted to {}", self.uri);
        } else {
            error!("{status}: Push API rejected transmission to {}", self.uri);
        }
        Ok(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transmitter() -> Transmitter {
        Transmitter::new("http://www.80beans.com", "action", "the_api_key").expect("valid uri")
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_uri() {
        assert_eq!(transmitter().uri().as_str(), "http://www.80beans.com/action");
    }

    #[test]
    fn test_uri_keeps_base_path() {
        let transmitter =
            Transmitter::new("https://push.appsignal.com/1/", "markers", "key").expect("valid");
        assert_eq!(
            transmitter.uri().as_str(),
            "https://push.appsignal.com/1/markers"
        );
    }

    #[test]
    fn test_invalid_uri() {
        assert!(matches!(
            Transmitter::new("not a uri", "action", "key"),
            Err(TransmitError::InvalidUri(_))
        ));
        assert!(matches!(
            Transmitter::new("ftp://www.80beans.com", "action", "key"),
            Err(TransmitError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_message() {
        let message = transmitter().message(payload(json!({"the": "payload"})));
        assert_eq!(
            Value::Object(message),
            json!({
                "api_key": "the_api_key",
                "agent_version": AGENT_VERSION,
                "the": "payload",
            })
        );
    }

    #[test]
    fn test_message_payload_wins_on_collision() {
        let message = transmitter().message(payload(json!({"api_key": "override"})));
        assert_eq!(message.len(), 2);
        assert_eq!(message["api_key"], "override");
    }

    #[test]
    fn test_encoded_message() {
        let encoded = transmitter()
            .encoded_message(payload(json!({"a": "b"})))
            .expect("encodable");
        let decoded: Value = serde_json::from_str(&encoded).expect("valid json");
        assert_eq!(decoded["a"], "b");
        assert_eq!(decoded["api_key"], "the_api_key");
    }

    #[test]
    fn test_ca_file_path() {
        let path = ca_file_path();
        assert!(path.ends_with(CA_FILE_RELATIVE_PATH));
        assert!(path.is_file());
        assert_eq!(fs::read(path).expect("readable"), BUNDLED_ROOT_PEM);
    }

    #[test]
    fn test_bundled_root_is_embedded() {
        let pem = std::str::from_utf8(BUNDLED_ROOT_PEM).expect("utf-8 pem");
        assert!(pem.contains("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_http_client_settings() {
        let settings = transmitter().client_settings();
        assert!(!settings.use_tls);
        assert!(!settings.verify_peer);
        assert_eq!(settings.ca_file, None);
    }

    #[test]
    fn test_https_client_settings() {
        let transmitter =
            Transmitter::new("https://www.80beans.com", "action", "the_api_key").expect("valid");
        let settings = transmitter.client_settings();
        assert!(settings.use_tls);
        assert!(settings.verify_peer);
        assert_eq!(settings.ca_file, None);
        assert!(transmitter.http_client().is_ok());
    }

    #[test]
    fn test_https_client_does_not_read_ca_file_by_default() {
        let transmitter =
            Transmitter::new("https://www.80beans.com", "action", "key").expect("valid");
        assert!(transmitter.client_settings().ca_file.is_none());
        assert!(transmitter.http_client().is_ok());

        let overridden = transmitter.with_ca_file("/nonexistent/root.pem");
        assert!(matches!(
            overridden.http_client(),
            Err(TransmitError::Certificate(_))
        ));
    }

    #[test]
    fn test_ca_file_override_is_used() {
        let transmitter = Transmitter::new("https://www.80beans.com", "action", "key")
            .expect("valid")
            .with_ca_file(ca_file_path());
        assert_eq!(transmitter.client_settings().ca_file, Some(ca_file_path()));
        assert!(transmitter.http_client().is_ok());
    }

    #[test]
    fn test_ca_file_ignored_for_plain_http() {
        let transmitter = transmitter().with_ca_file("/nonexistent/root.pem");
        assert_eq!(transmitter.client_settings().ca_file, None);
        assert!(transmitter.http_client().is_ok());
    }

    #[test]
    fn test_missing_ca_file() {
        let transmitter = Transmitter::new("https://www.80beans.com", "action", "key")
            .expect("valid")
            .with_ca_file("/nonexistent/root.pem");
        assert!(matches!(
            transmitter.transmit(Map::new()),
            Err(TransmitError::Certificate(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = AgentConfig {
            push_api_key: Some("key".to_string()),
            transmit_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let transmitter = Transmitter::from_config(&config, "markers").expect("valid");
        assert_eq!(
            transmitter.uri().as_str(),
            "https://push.appsignal.com/1/markers"
        );
        assert_eq!(
            transmitter.client_settings().timeout,
            Some(Duration::from_secs(5))
        );
        assert_eq!(transmitter.message(Map::new())["api_key"], "key");
    }
}
