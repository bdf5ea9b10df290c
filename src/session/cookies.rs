//! Cookie jar and anti-forgery token resolution.
//!
//! The jar is a name -> value map. Merging a batch of `Set-Cookie` directives
//! is a monotonic union: same-named keys are overwritten, keys absent from the
//! batch are kept.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Cookie carrying the URL-encoded anti-forgery token
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// Session cookies for one account, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar {
    cookies: IndexMap<String, String>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a browser `Cookie` header string such as `a=b; c=d`.
    ///
    /// Pairs without `=` or with an empty name are skipped. Values keep any
    /// further `=` characters.
    pub fn parse(header: &str) -> Self {
        let mut jar = Self::new();
        for pair in header.split(';') {
            if let Some((name, value)) = split_pair(pair) {
                jar.insert(name, value);
            }
        }
        jar
    }

    /// Insert or overwrite a single cookie.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Iterate cookies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge another jar into this one, last write wins per name.
    pub fn merge(&mut self, other: &CookieJar) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Merge raw `Set-Cookie` header values.
    ///
    /// Only the leading `name=value` segment of each directive is used;
    /// attributes such as `Path` or `Expires` are ignored.
    pub fn merge_set_cookies<I, S>(&mut self, directives: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for directive in directives {
            let directive = directive.as_ref();
            let first = directive.split(';').next().unwrap_or_default();
            if let Some((name, value)) = split_pair(first) {
                self.insert(name, value);
            }
        }
    }

    /// Copy of this jar with `directives` merged in.
    pub fn merged_with<I, S>(&self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut merged = self.clone();
        merged.merge_set_cookies(directives);
        merged
    }

    /// Serialize as a `Cookie` request header value.
    pub fn header_value(&self) -> String {
        self.iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Resolve the anti-forgery token.
    ///
    /// Prefers the URL-decoded `XSRF-TOKEN` cookie, then a `csrf-token` meta
    /// tag in `html`, else an empty string.
    pub fn xsrf_token(&self, html: &str) -> String {
        if let Some(raw) = self.get(XSRF_COOKIE) {
            return urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string());
        }
        csrf_meta_token(html).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CookieJar {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut jar = Self::new();
        for (name, value) in iter {
            jar.insert(name, value);
        }
        jar
    }
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

fn csrf_meta_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)name=["']csrf-token["']\s+content=["']([^"']+)["']"#).ok())
        .as_ref()
}

/// Extract the token from `<meta name="csrf-token" content="...">`.
pub fn csrf_meta_token(html: &str) -> Option<String> {
    csrf_meta_regex()?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
