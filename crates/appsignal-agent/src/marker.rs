// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deploy markers.
//!
//! A deploy task resolves the environment and revision, builds a [`Marker`]
//! and calls [`notify_deploy`]. The returned [`DeployOutcome`] renders the
//! lines the task prints; transmission never aborts the surrounding deploy.

use std::fmt;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::config::AgentConfig;
use crate::transmitter::Transmitter;

/// Push API action for deploy markers.
pub const MARKERS_ACTION: &str = "markers";

const NOTIFIED: &str = "Appsignal has been notified of this deploy!";

/// A deploy notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub revision: String,
    pub user: String,
}

impl Marker {
    pub fn new(revision: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            user: user.into(),
        }
    }

    /// Payload transmitted to the markers endpoint.
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("revision".to_string(), Value::from(self.revision.as_str()));
        payload.insert("user".to_string(), Value::from(self.user.as_str()));
        payload
    }

    fn notifying_line(&self) -> String {
        format!(
            "Notifying Appsignal of deploy with: revision: {}, user: {}",
            self.revision, self.user
        )
    }
}

/// Environment names a deploy tool may define, in no particular order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployEnvironment<'a> {
    pub appsignal_env: Option<&'a str>,
    pub stage: Option<&'a str>,
    pub rack_env: Option<&'a str>,
    pub rails_env: Option<&'a str>,
}

impl DeployEnvironment<'_> {
    /// Picks the environment: `appsignal_env`, then `stage`, then
    /// `rack_env`, then `rails_env`.
    pub fn resolve(&self) -> Option<&str> {
        self.appsignal_env
            .or(self.stage)
            .or(self.rack_env)
            .or(self.rails_env)
    }
}

/// An explicit revision override beats the current source revision.
pub fn resolve_revision(revision_override: Option<&str>, current_revision: &str) -> String {
    revision_override.unwrap_or(current_revision).to_string()
}

/// Result of a deploy notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The config is not active; nothing was transmitted.
    Inactive { environment: String },
    /// The push API answered 200.
    Notified { marker: Marker },
    /// Any other status, or a transport failure.
    Failed { marker: Marker, reason: String },
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Notified { .. })
    }

    /// Lines to show the person deploying.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Inactive { environment } => vec![format!(
                "Not notifying of deploy, config is not active for environment: {environment}"
            )],
            Self::Notified { marker } => vec![marker.notifying_line(), NOTIFIED.to_string()],
            Self::Failed { marker, reason } => vec![
                marker.notifying_line(),
                format!("Something went wrong while trying to notify Appsignal: {reason}"),
            ],
        }
    }
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Transmits `marker` when `config` is active for its environment.
pub fn notify_deploy(config: &AgentConfig, marker: Marker) -> DeployOutcome {
    if !config.active {
        info!(
            "Not notifying of deploy, config is not active for environment: {}",
            config.environment
        );
        return DeployOutcome::Inactive {
            environment: config.environment.clone(),
        };
    }

    info!("{}", marker.notifying_line());
    let result = Transmitter::from_config(config, MARKERS_ACTION)
        .and_then(|transmitter| transmitter.transmit(marker.payload()));

    match result {
        Ok(200) => {
            info!("{NOTIFIED}");
            DeployOutcome::Notified { marker }
        }
        Ok(status) => {
            error!("Something went wrong while trying to notify Appsignal: {status}");
            DeployOutcome::Failed {
                marker,
                reason: status.to_string(),
            }
        }
        Err(err) => {
            error!("Something went wrong while trying to notify Appsignal: {err}");
            DeployOutcome::Failed {
                marker,
                reason: err.to_string(),
            }
        }
    }
}
