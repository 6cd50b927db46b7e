// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue start derivation.
//!
//! HTTP requests carry their queue start in a front-end proxy header such as
//! `X-Request-Start: t=1389783599600`. Background jobs carry the moment they
//! were enqueued in their event payload. Both inputs are untrusted, so every
//! parse failure degrades to [`UNKNOWN_QUEUE_START`] instead of an error.

use crate::value::{Env, RawValue};

/// Sentinel for "queue start unknown".
pub const UNKNOWN_QUEUE_START: i64 = -1;

/// Primary queue start header, as found in the request env.
pub const REQUEST_START_HEADER: &str = "HTTP_X_REQUEST_START";

/// Fallback header used when [`REQUEST_START_HEADER`] is absent.
pub const QUEUE_START_HEADER: &str = "HTTP_X_QUEUE_START";

const TIMESTAMP_MARKER: &str = "t=";

/// Parses a queue start header value into milliseconds since epoch.
///
/// An optional `t=` marker is stripped and the longest leading run of digits
/// is used; trailing content is ignored.
///
/// ```
/// use appsignal_agent::queue_start::parse_queue_start_header;
///
/// assert_eq!(parse_queue_start_header("t=1389783599600"), 1389783599600);
/// assert_eq!(parse_queue_start_header("t=1389783599600aaaa"), 1389783599600);
/// assert_eq!(parse_queue_start_header("something"), -1);
/// ```
pub fn parse_queue_start_header(value: &str) -> i64 {
    let value = value.strip_prefix(TIMESTAMP_MARKER).unwrap_or(value);
    let digits_end = value
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(value.len());
    if digits_end == 0 {
        return UNKNOWN_QUEUE_START;
    }
    // Runs too long for an i64 are treated like any other garbage.
    value[..digits_end]
        .parse::<i64>()
        .unwrap_or(UNKNOWN_QUEUE_START)
}

/// Derives the queue start of an HTTP request from its env.
pub fn http_queue_start(env: Option<&Env>) -> i64 {
    let Some(env) = env else {
        return UNKNOWN_QUEUE_START;
    };
    let header = env
        .get(REQUEST_START_HEADER)
        .filter(|value| !value.is_nil())
        .or_else(|| env.get(QUEUE_START_HEADER));

    match header.and_then(RawValue::as_str) {
        Some(value) => parse_queue_start_header(value),
        None => UNKNOWN_QUEUE_START,
    }
}

/// Derives the queue time of a background job in milliseconds.
///
/// `queue_start` and `now` are seconds since epoch. The difference is
/// truncated toward zero; results that are negative or do not fit an `i64`
/// are reported as unknown.
#[allow(clippy::cast_possible_truncation)]
pub fn background_queue_start(queue_start: Option<f64>, now: f64) -> i64 {
    let Some(queue_start) = queue_start else {
        return UNKNOWN_QUEUE_START;
    };
    let millis = ((now - queue_start) * 1000.0).trunc();
    if millis.is_finite() && millis >= 0.0 && millis < i64::MAX as f64 {
        millis as i64
    } else {
        UNKNOWN_QUEUE_START
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::env;
    use proptest::prelude::*;

    const FIXED_TIME: f64 = 1_389_783_600.0;

    #[allow(clippy::cast_possible_truncation)]
    fn slightly_earlier_time_in_ms() -> i64 {
        ((FIXED_TIME - 0.4) * 1000.0) as i64
    }

    #[test]
    fn test_without_env() {
        assert_eq!(http_queue_start(None), UNKNOWN_QUEUE_START);
    }

    #[test]
    fn test_with_no_relevant_header() {
        assert_eq!(http_queue_start(Some(&Env::new())), UNKNOWN_QUEUE_START);
    }

    #[test]
    fn test_request_start_header() {
        let request_env = env([(
            REQUEST_START_HEADER,
            format!("t={}", slightly_earlier_time_in_ms()),
        )]);
        assert_eq!(http_queue_start(Some(&request_env)), 1_389_783_599_600);
    }

    #[test]
    fn test_unparsable_content() {
        let request_env = env([(REQUEST_START_HEADER, "something")]);
        assert_eq!(http_queue_start(Some(&request_env)), UNKNOWN_QUEUE_START);
    }

    #[test]
    fn test_trailing_cruft() {
        let request_env = env([(
            REQUEST_START_HEADER,
            format!("t={}aaaa", slightly_earlier_time_in_ms()),
        )]);
        assert_eq!(http_queue_start(Some(&request_env)), 1_389_783_599_600);
    }

    #[test]
    fn test_alternate_queue_start_header() {
        let request_env = env([(
            QUEUE_START_HEADER,
            format!("t={}", slightly_earlier_time_in_ms()),
        )]);
        assert_eq!(http_queue_start(Some(&request_env)), 1_389_783_599_600);
    }

    #[test]
    fn test_request_start_wins_over_queue_start() {
        let request_env = env([
            (REQUEST_START_HEADER, "t=2000"),
            (QUEUE_START_HEADER, "t=1000"),
        ]);
        assert_eq!(http_queue_start(Some(&request_env)), 2000);
    }

    #[test]
    fn test_header_without_marker() {
        assert_eq!(parse_queue_start_header("1000000"), 1_000_000);
    }

    #[test]
    fn test_non_string_header() {
        let request_env = env([(REQUEST_START_HEADER, 12)]);
        assert_eq!(http_queue_start(Some(&request_env)), UNKNOWN_QUEUE_START);
    }

    #[test]
    fn test_overflowing_digits() {
        assert_eq!(
            parse_queue_start_header("t=99999999999999999999999"),
            UNKNOWN_QUEUE_START
        );
    }

    #[test]
    fn test_background_without_queue_start() {
        assert_eq!(background_queue_start(None, FIXED_TIME), UNKNOWN_QUEUE_START);
    }

    #[test]
    fn test_background_with_queue_start() {
        assert_eq!(
            background_queue_start(Some(FIXED_TIME - 10.0), FIXED_TIME),
            10_000
        );
    }

    #[test]
    fn test_background_truncates_toward_zero() {
        assert_eq!(background_queue_start(Some(FIXED_TIME - 0.0015), FIXED_TIME), 1);
    }

    #[test]
    fn test_background_in_the_future() {
        assert_eq!(
            background_queue_start(Some(FIXED_TIME + 5.0), FIXED_TIME),
            UNKNOWN_QUEUE_START
        );
    }

    proptest! {
        #[test]
        fn prop_leading_digits_are_parsed(
            millis in 0i64..=i64::MAX,
            cruft in "[a-zA-Z ;=]{0,8}",
        ) {
            prop_assert_eq!(parse_queue_start_header(&format!("t={millis}{cruft}")), millis);
        }

        #[test]
        fn prop_result_is_non_negative_or_unknown(header in "\\PC{0,24}") {
            let parsed = parse_queue_start_header(&header);
            prop_assert!(parsed >= 0 || parsed == UNKNOWN_QUEUE_START);
        }
    }
}
