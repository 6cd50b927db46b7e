// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw application data as captured from framework events.
//!
//! Instrumented frameworks hand the agent loosely typed data: request
//! parameters, the request environment, session contents and user supplied
//! tags. [`RawValue`] and [`RawKey`] model that data without losing the
//! distinctions the sanitizer cares about (strings vs. symbols, scalars vs.
//! containers, and values of types the collector cannot render at all).

use std::collections::BTreeMap;

/// Key of a [`RawMap`] entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RawKey {
    Str(String),
    Symbol(String),
    Integer(i64),
    /// A key of a type the agent cannot render, identified by its type name.
    Opaque(String),
}

impl RawKey {
    /// Creates a symbol-like key.
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// Returns the textual name for string and symbol keys.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Str(name) | Self::Symbol(name) => Some(name),
            Self::Integer(_) | Self::Opaque(_) => None,
        }
    }

    /// Renders the key as an object key, `None` for opaque keys.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Str(name) | Self::Symbol(name) => Some(name.clone()),
            Self::Integer(int) => Some(int.to_string()),
            Self::Opaque(_) => None,
        }
    }
}

impl From<&str> for RawKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RawKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for RawKey {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Ordered mapping of raw keys to raw values.
pub type RawMap = BTreeMap<RawKey, RawValue>;

/// The raw request environment (CGI style keys such as `SERVER_NAME`).
pub type Env = BTreeMap<String, RawValue>;

/// A value captured from the instrumented application.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    Map(RawMap),
    List(Vec<RawValue>),
    /// An arbitrary application object, identified by its type name.
    Opaque(String),
}

impl RawValue {
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn opaque(type_name: impl Into<String>) -> Self {
        Self::Opaque(type_name.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the contents of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&RawMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the value's type, used in the marker for unrenderable values.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Nil => "NilClass",
            Self::Bool(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::Symbol(_) => "Symbol",
            Self::Map(_) => "Hash",
            Self::List(_) => "Array",
            Self::Opaque(type_name) => type_name,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<RawMap> for RawValue {
    fn from(value: RawMap) -> Self {
        Self::Map(value)
    }
}

impl From<Vec<RawValue>> for RawValue {
    fn from(value: Vec<RawValue>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

/// Builds a [`RawMap`] from key/value pairs.
pub fn raw_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> RawMap
where
    K: Into<RawKey>,
    V: Into<RawValue>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Builds an [`Env`] from key/value pairs.
pub fn env<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Env
where
    K: Into<String>,
    V: Into<RawValue>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
