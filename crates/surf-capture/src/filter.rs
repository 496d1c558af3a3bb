// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Conjunctive query filter over `NetworkEntry` records, following the
//! same predicate-chaining shape as a typical request-log filter: every
//! set field must match for an entry to pass.
use regex::Regex;
use surf_protocol::NetworkEntry;

use crate::error::CaptureError;

/// Common static-asset extensions dropped by `exclude_static`.
const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".woff", ".woff2",
    ".ttf", ".eot", ".map",
];

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub origin: Option<String>,
    pub method: Option<String>,
    pub status: Option<StatusMatch>,
    pub content_type: Option<String>,
    pub min_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub body_present: Option<bool>,
    pub exclude_static: bool,
    pub url_pattern: Option<UrlPattern>,
    pub tail: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum StatusMatch {
    Exact(u16),
    /// `Nxx` class, e.g. `4xx` matches 400..=499.
    Class(u16),
}

impl StatusMatch {
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(code) = s.parse::<u16>() {
            return Some(StatusMatch::Exact(code));
        }
        let lower = s.to_ascii_lowercase();
        if lower.len() == 3 && lower.ends_with("xx") {
            let digit = lower.as_bytes()[0];
            if digit.is_ascii_digit() {
                return Some(StatusMatch::Class((digit - b'0') as u16));
            }
        }
        None
    }

    fn matches(&self, status: u16) -> bool {
        match self {
            StatusMatch::Exact(code) => status == *code,
            StatusMatch::Class(class) => status / 100 == *class,
        }
    }
}

#[derive(Debug, Clone)]
pub enum UrlPattern {
    Regex(Regex),
    Glob(String),
    Substring(String),
}

impl UrlPattern {
    /// Parses `/regex/`, a glob containing `*`, or a plain substring.
    pub fn parse(s: &str) -> Result<Self, CaptureError> {
        if s.len() >= 2 && s.starts_with('/') && s.ends_with('/') {
            let inner = &s[1..s.len() - 1];
            return Ok(UrlPattern::Regex(Regex::new(inner)?));
        }
        if s.contains('*') {
            return Ok(UrlPattern::Glob(s.to_string()));
        }
        Ok(UrlPattern::Substring(s.to_string()))
    }

    fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Regex(re) => re.is_match(url),
            UrlPattern::Glob(pat) => glob_match(pat, url),
            UrlPattern::Substring(sub) => url.contains(sub.as_str()),
        }
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut cursor = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text[cursor..].starts_with(part) {
                return false;
            }
            cursor += part.len();
        } else if i == parts.len() - 1 {
            if !text[cursor..].ends_with(part) {
                return false;
            }
        } else {
            match text[cursor..].find(part) {
                Some(pos) => cursor += pos + part.len(),
                None => return false,
            }
        }
    }
    true
}

impl Filter {
    pub fn matches(&self, entry: &NetworkEntry) -> bool {
        if let Some(origin) = &self.origin {
            if extract_origin(&entry.url).as_deref() != Some(origin.as_str()) {
                return false;
            }
        }
        if let Some(method) = &self.method {
            if entry.method.to_ascii_uppercase() != method.to_ascii_uppercase() {
                return false;
            }
        }
        if let Some(status_match) = &self.status {
            match entry.status {
                Some(status) if status_match.matches(status) => {}
                _ => return false,
            }
        }
        if let Some(ct) = &self.content_type {
            match &entry.content_type {
                Some(actual) if actual.contains(ct.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(min_ts) = self.min_timestamp {
            if entry.timestamp < min_ts {
                return false;
            }
        }
        if let Some(want_body) = self.body_present {
            let has_body = entry.request_body_hash.is_some() || entry.response_body_hash.is_some();
            if has_body != want_body {
                return false;
            }
        }
        if self.exclude_static && is_static_asset(&entry.url) {
            return false;
        }
        if let Some(pattern) = &self.url_pattern {
            if !pattern.matches(&entry.url) {
                return false;
            }
        }
        true
    }

    /// Applies the tail-count slice, keeping the most recent `n` entries
    /// from an already-filtered, chronologically ordered list.
    pub fn apply_tail<'a>(&self, entries: &'a [NetworkEntry]) -> &'a [NetworkEntry] {
        match self.tail {
            Some(n) if n < entries.len() => &entries[entries.len() - n..],
            _ => entries,
        }
    }
}

fn is_static_asset(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn extract_origin(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme.split(['/', '?', '#']).next()?;
    let scheme = url.split_once("://").map(|(s, _)| s)?;
    Some(format!("{scheme}://{authority}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(url: &str, method: &str, status: u16) -> NetworkEntry {
        serde_json::from_value(json!({
            "id": "e1",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "url": url,
            "method": method,
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn method_match_is_case_insensitive() {
        let f = Filter { method: Some("get".into()), ..Default::default() };
        assert!(f.matches(&entry("https://a.test/x", "GET", 200)));
    }

    #[test]
    fn status_class_matches_4xx() {
        let f = Filter { status: StatusMatch::parse("4xx"), ..Default::default() };
        assert!(f.matches(&entry("https://a.test/x", "GET", 404)));
        assert!(!f.matches(&entry("https://a.test/x", "GET", 200)));
    }

    #[test]
    fn exclude_static_drops_css_and_js() {
        let f = Filter { exclude_static: true, ..Default::default() };
        assert!(!f.matches(&entry("https://a.test/app.css", "GET", 200)));
        assert!(!f.matches(&entry("https://a.test/app.js?v=2", "GET", 200)));
        assert!(f.matches(&entry("https://a.test/api/data", "GET", 200)));
    }

    #[test]
    fn url_pattern_glob_matches_middle_segment() {
        let pattern = UrlPattern::parse("*/api/*").unwrap();
        assert!(pattern.matches("https://a.test/api/data"));
        assert!(!pattern.matches("https://a.test/other/data"));
    }

    #[test]
    fn url_pattern_regex_matches() {
        let p = UrlPattern::parse("/^https://a\\.test/api/.*$/").unwrap();
        assert!(p.matches("https://a.test/api/data"));
    }

    #[test]
    fn origin_exact_match() {
        let f = Filter { origin: Some("https://a.test".into()), ..Default::default() };
        assert!(f.matches(&entry("https://a.test/x/y", "GET", 200)));
        assert!(!f.matches(&entry("https://b.test/x/y", "GET", 200)));
    }

    #[test]
    fn tail_keeps_most_recent() {
        let entries: Vec<NetworkEntry> =
            (0..5).map(|i| entry(&format!("https://a.test/{i}"), "GET", 200)).collect();
        let f = Filter { tail: Some(2), ..Default::default() };
        let tail = f.apply_tail(&entries);
        assert_eq!(tail.len(), 2);
        assert!(tail[0].url.ends_with('3'));
        assert!(tail[1].url.ends_with('4'));
    }
}
