// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Whitelist based sanitization of application data.
//!
//! Everything that ends up in an exception report passes through here before
//! it leaves the process. The sanitizer never fails: values the collector
//! cannot render are replaced by a type marker or dropped.
//!
//! Four policies are provided:
//! - [`Sanitizer::sanitize`]: recursive filter for parameters and session data
//! - [`Sanitizer::sanitized_environment`]: strict allow-list over the request env
//! - [`Sanitizer::sanitized_tags`]: flat, length bounded scalar tags
//! - [`Sanitizer::sanitized_session_data`]: session extraction honouring
//!   `skip_session_data`

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Number, Value};

use crate::value::{Env, RawKey, RawMap, RawValue};

/// Maximum length of a tag key or a rendered tag value.
pub const MAX_TAG_LENGTH: usize = 100;

/// Env key under which the request session is stored.
pub const SESSION_ENV_KEY: &str = "rack.session";

/// Request environment keys that are forwarded in exception reports.
pub const ENV_METHODS: &[&str] = &[
    "CONTENT_LENGTH",
    "AUTH_TYPE",
    "GATEWAY_INTERFACE",
    "PATH_TRANSLATED",
    "REMOTE_HOST",
    "REMOTE_IDENT",
    "REMOTE_USER",
    "REQUEST_METHOD",
    "SERVER_NAME",
    "SERVER_PORT",
    "SERVER_PROTOCOL",
    "HTTP_X_REQUEST_START",
    "HTTP_X_MIDDLEWARE_START",
    "HTTP_X_QUEUE_START",
    "HTTP_X_QUEUE_TIME",
    "HTTP_X_HEROKU_QUEUE_WAIT_TIME",
    "HTTP_X_APPLICATION_START",
    "HTTP_ACCEPT",
    "HTTP_ACCEPT_CHARSET",
    "HTTP_ACCEPT_ENCODING",
    "HTTP_ACCEPT_LANGUAGE",
    "HTTP_CACHE_CONTROL",
    "HTTP_CONNECTION",
    "HTTP_USER_AGENT",
    "HTTP_FROM",
    "HTTP_NEGOTIATE",
    "HTTP_PRAGMA",
    "HTTP_REFERER",
    "HTTP_X_FORWARDED_FOR",
    "HTTP_CLIENT_IP",
];

/// A session object that has to be loaded before its entries can be read.
///
/// Implemented by framework adapters whose session store wraps the data
/// behind an accessor instead of exposing a plain mapping.
pub trait SessionAccessor: Send + Sync + fmt::Debug {
    /// Loads all entries of the session.
    fn entries(&self) -> Vec<(RawKey, RawValue)>;
}

/// Session data attached to a request.
#[derive(Debug, Clone)]
pub enum Session {
    /// A plain key/value session, sanitized as is.
    Direct(RawMap),
    /// A wrapped session whose keys are normalized to strings first.
    Accessor(Arc<dyn SessionAccessor>),
}

impl Session {
    /// Returns the session as a plain mapping.
    pub fn to_map(&self) -> RawMap {
        match self {
            Self::Direct(map) => map.clone(),
            Self::Accessor(accessor) => accessor
                .entries()
                .into_iter()
                .filter_map(|(key, value)| key.render().map(|name| (RawKey::Str(name), value)))
                .collect(),
        }
    }
}

/// Whitelist sanitizer for request and transaction data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sanitizer {
    skip_session_data: bool,
}

impl Sanitizer {
    pub fn new(skip_session_data: bool) -> Self {
        Self { skip_session_data }
    }

    pub fn skip_session_data(&self) -> bool {
        self.skip_session_data
    }

    /// Recursively sanitizes a value. Returns `None` for nil.
    ///
    /// Maps and lists are walked, nil entries are dropped, scalars pass
    /// through and anything else becomes a `#<TypeName>` marker.
    pub fn sanitize(&self, value: &RawValue) -> Option<Value> {
        match value {
            RawValue::Nil => None,
            RawValue::Bool(flag) => Some(Value::Bool(*flag)),
            RawValue::Integer(int) => Some(Value::from(*int)),
            RawValue::Float(float) => Some(
                Number::from_f64(*float)
                    .map(Value::Number)
                    .unwrap_or_else(|| inspected(value)),
            ),
            RawValue::Str(text) | RawValue::Symbol(text) => Some(Value::String(text.clone())),
            RawValue::Map(map) => Some(Value::Object(self.sanitize_map(map))),
            RawValue::List(items) => Some(Value::Array(
                items.iter().filter_map(|item| self.sanitize(item)).collect(),
            )),
            RawValue::Opaque(_) => Some(inspected(value)),
        }
    }

    /// Sanitizes every entry of a map. Entries with opaque keys or nil
    /// values are dropped.
    pub fn sanitize_map(&self, map: &RawMap) -> Map<String, Value> {
        map.iter()
            .filter_map(|(key, value)| Some((key.render()?, self.sanitize(value)?)))
            .collect()
    }

    /// Keeps only whitelisted, non-nil entries of the request environment.
    pub fn sanitized_environment<S: AsRef<str>>(
        &self,
        env: Option<&Env>,
        whitelist: &[S],
    ) -> Option<Map<String, Value>> {
        let env = env?;
        Some(
            whitelist
                .iter()
                .filter_map(|key| {
                    let key = key.as_ref();
                    let value = self.sanitize(env.get(key)?)?;
                    Some((key.to_string(), value))
                })
                .collect(),
        )
    }

    /// Keeps tags whose key is a string or symbol and whose value is a
    /// scalar, both no longer than [`MAX_TAG_LENGTH`]. Offending pairs are
    /// dropped whole.
    pub fn sanitized_tags(&self, tags: &RawMap) -> Map<String, Value> {
        tags.iter()
            .filter_map(|(key, value)| {
                let key = key.name().filter(|name| name.chars().count() <= MAX_TAG_LENGTH)?;
                Some((key.to_string(), tag_value(value)?))
            })
            .collect()
    }

    /// Extracts and sanitizes session data.
    ///
    /// Returns `None` when session data is skipped or there is no request
    /// env at all, and an empty map when the env carries no session.
    pub fn sanitized_session_data(
        &self,
        env: Option<&Env>,
        session: Option<&Session>,
    ) -> Option<Map<String, Value>> {
        if self.skip_session_data {
            return None;
        }
        if env.is_none() {
            return None;
        }
        Some(
            session
                .map(|session| self.sanitize_map(&session.to_map()))
                .unwrap_or_default(),
        )
    }
}

fn inspected(value: &RawValue) -> Value {
    Value::String(format!("#<{}>", value.type_name()))
}

fn tag_value(value: &RawValue) -> Option<Value> {
    let (rendered, sanitized) = match value {
        RawValue::Str(text) | RawValue::Symbol(text) => {
            (text.clone(), Value::String(text.clone()))
        }
        RawValue::Integer(int) => (int.to_string(), Value::from(*int)),
        RawValue::Float(float) => (float.to_string(), Value::Number(Number::from_f64(*float)?)),
        RawValue::Bool(flag) => (flag.to_string(), Value::Bool(*flag)),
        RawValue::Nil | RawValue::Map(_) | RawValue::List(_) | RawValue::Opaque(_) => {
            return None
        }
    };
    (rendered.chars().count() <= MAX_TAG_LENGTH).then_some(sanitized)
}
