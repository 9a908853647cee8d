//! RFC 7232 conditional request evaluation.
//!
//! Evaluation priority:
//!   1. If-Match (412 on failure)
//!   2. If-Unmodified-Since (412 on failure) -- only evaluated if If-Match is absent
//!   3. If-None-Match (304 on match)
//!   4. If-Modified-Since (304 on no-change) -- only evaluated if If-None-Match is absent
//!
//! Everything here is a pure function of the request headers, the
//! synthesized response headers and the object's modification time.

use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use http::header::{
    HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    IF_UNMODIFIED_SINCE, LAST_MODIFIED,
};
use http::HeaderMap;

/// The conditional headers of a request.  Headers set to an empty value
/// are treated as absent.
#[derive(Debug, Clone, Default)]
pub struct ConditionalHeaders {
    pub if_match: Option<HeaderValue>,
    pub if_none_match: Option<HeaderValue>,
    pub if_modified_since: Option<HeaderValue>,
    pub if_unmodified_since: Option<HeaderValue>,
}

impl ConditionalHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name| headers.get(name).filter(|v| !v.is_empty()).cloned();
        Self {
            if_match: get(IF_MATCH),
            if_none_match: get(IF_NONE_MATCH),
            if_modified_since: get(IF_MODIFIED_SINCE),
            if_unmodified_since: get(IF_UNMODIFIED_SINCE),
        }
    }
}

/// Result of checking a single precondition header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Header absent or not applicable.
    Unevaluated,
    Satisfied,
    Failed,
}

/// What the transport should do after evaluating all preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Serve the object normally.
    Proceed,
    /// Respond 412 with the headers untouched.
    PreconditionFailed,
    /// Respond 304 after [`strip_for_not_modified`].
    NotModified,
}

/// Decide between 200, 304 and 412.
///
/// `headers` is the synthesized response header set, from which the
/// current `ETag` is read.  `updated` is the object's modification time.
pub fn evaluate(
    cond: &ConditionalHeaders,
    headers: &HeaderMap,
    updated: Option<DateTime<Utc>>,
) -> Disposition {
    let etag = headers.get(ETAG).map(HeaderValue::as_bytes).unwrap_or_default();

    let mut outcome = check_if_match(cond.if_match.as_ref(), etag);
    if outcome == Outcome::Unevaluated {
        outcome = check_if_unmodified_since(cond.if_unmodified_since.as_ref(), updated);
    }
    if outcome == Outcome::Failed {
        return Disposition::PreconditionFailed;
    }

    let mut outcome = check_if_none_match(cond.if_none_match.as_ref(), etag);
    if outcome == Outcome::Unevaluated {
        outcome = check_if_modified_since(cond.if_modified_since.as_ref(), updated);
    }
    if outcome == Outcome::Failed {
        return Disposition::NotModified;
    }

    Disposition::Proceed
}

/// Remove representation metadata that must not accompany a 304
/// (RFC 7232 section 4.1).  `Last-Modified` is only kept when there is no
/// `ETag` to validate against.
pub fn strip_for_not_modified(headers: &mut HeaderMap) {
    headers.remove(CONTENT_TYPE);
    headers.remove(CONTENT_LENGTH);
    if headers.contains_key(ETAG) {
        headers.remove(LAST_MODIFIED);
    }
}

pub fn check_if_match(value: Option<&HeaderValue>, etag: &[u8]) -> Outcome {
    let Some(value) = value else {
        return Outcome::Unevaluated;
    };
    match scan_list(value.as_bytes(), |candidate| strong_match(candidate, etag)) {
        ListMatch::Wildcard | ListMatch::Matched => Outcome::Satisfied,
        ListMatch::NoMatch => Outcome::Failed,
    }
}

pub fn check_if_none_match(value: Option<&HeaderValue>, etag: &[u8]) -> Outcome {
    let Some(value) = value else {
        return Outcome::Unevaluated;
    };
    match scan_list(value.as_bytes(), |candidate| weak_match(candidate, etag)) {
        ListMatch::Wildcard | ListMatch::Matched => Outcome::Failed,
        ListMatch::NoMatch => Outcome::Satisfied,
    }
}

pub fn check_if_unmodified_since(
    value: Option<&HeaderValue>,
    updated: Option<DateTime<Utc>>,
) -> Outcome {
    match not_modified_since(value, updated) {
        None => Outcome::Unevaluated,
        Some(true) => Outcome::Satisfied,
        Some(false) => Outcome::Failed,
    }
}

pub fn check_if_modified_since(
    value: Option<&HeaderValue>,
    updated: Option<DateTime<Utc>>,
) -> Outcome {
    match not_modified_since(value, updated) {
        None => Outcome::Unevaluated,
        Some(true) => Outcome::Failed,
        Some(false) => Outcome::Satisfied,
    }
}

/// Whether the object's modification time, truncated to the second, is at
/// or before the date in `value`.  `None` when either side is missing or
/// the date doesn't parse.
fn not_modified_since(value: Option<&HeaderValue>, updated: Option<DateTime<Utc>>) -> Option<bool> {
    let updated = updated?;
    let since = httpdate::parse_http_date(value?.to_str().ok()?).ok()?;
    let since = since.duration_since(UNIX_EPOCH).ok()?.as_secs() as i64;
    // Last-Modified has no sub-second precision, so the comparison can't either.
    Some(updated.timestamp() <= since)
}

#[derive(Debug, PartialEq, Eq)]
enum ListMatch {
    Wildcard,
    Matched,
    NoMatch,
}

/// Walk a comma-separated list of entity tags, stopping at `*`, at the
/// first tag for which `is_match` holds, or at the first malformed tag.
fn scan_list(mut list: &[u8], is_match: impl Fn(&[u8]) -> bool) -> ListMatch {
    loop {
        list = list.trim_ascii();
        match list.first() {
            None => return ListMatch::NoMatch,
            Some(b',') => list = &list[1..],
            Some(b'*') => return ListMatch::Wildcard,
            Some(_) => {
                let Some((etag, remain)) = scan_etag(list) else {
                    return ListMatch::NoMatch;
                };
                if is_match(etag) {
                    return ListMatch::Matched;
                }
                list = remain;
            }
        }
    }
}

/// If a syntactically valid entity tag (`"text"` or `W/"text"`) starts
/// `s`, return it along with the remaining input.
pub fn scan_etag(s: &[u8]) -> Option<(&[u8], &[u8])> {
    let s = s.trim_ascii();
    let start = if s.starts_with(b"W/") { 2 } else { 0 };
    if s.len() - start < 2 || s[start] != b'"' {
        return None;
    }
    for (i, &c) in s.iter().enumerate().skip(start + 1) {
        match c {
            0x21 | 0x23..=0x7E | 0x80..=0xFF => {}
            b'"' => return Some((&s[..=i], &s[i + 1..])),
            _ => return None,
        }
    }
    None
}

/// Strong comparison: both tags strong and byte-equal.
pub fn strong_match(a: &[u8], b: &[u8]) -> bool {
    a == b && a.first() == Some(&b'"')
}

/// Weak comparison: equal once any `W/` prefix is dropped.
pub fn weak_match(a: &[u8], b: &[u8]) -> bool {
    strip_weak(a) == strip_weak(b)
}

fn strip_weak(tag: &[u8]) -> &[u8] {
    tag.strip_prefix(b"W/").unwrap_or(tag)
}
