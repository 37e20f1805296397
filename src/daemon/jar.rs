//! Cookie jar
//!
//! Cookies are keyed by (domain, path, name) and kept in insertion order,
//! which is the order they appear in a `Cookie` header. A domain starting
//! with `.` also matches its subdomains; a cookie path matches request paths
//! below it. Every stored cookie lives for one year.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Lifetime of a stored cookie
pub const COOKIE_MAX_AGE_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: DateTime<Utc>,
}

impl Cookie {
    fn same_key(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let domain = self.domain.to_ascii_lowercase();
        match domain.strip_prefix('.') {
            Some(bare) => host == bare || host.ends_with(&domain),
            None => host == domain,
        }
    }

    pub fn matches_path(&self, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        if !path.starts_with(&self.path) {
            return false;
        }
        self.path.ends_with('/')
            || path.len() == self.path.len()
            || path[self.path.len()..].starts_with('/')
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Store `name=value` for `domain` and `path`, expiring a year from now.
    ///
    /// Returns false for a pair without `=` or with an empty name.
    pub fn put(&mut self, domain: &str, path: &str, pair: &str) -> bool {
        let Some((name, value)) = pair.split_once('=') else {
            return false;
        };
        let name = name.trim();
        if name.is_empty() || domain.is_empty() {
            return false;
        }

        let path = if path.is_empty() { "/" } else { path };
        self.insert(Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            expires: Utc::now() + Duration::days(COOKIE_MAX_AGE_DAYS),
        });
        true
    }

    /// Add or replace a cookie; a replaced cookie keeps its position
    pub fn insert(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.same_key(&cookie)) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// `Cookie` header value for a request, e.g. `a=1; b=2`
    pub fn header(&mut self, host: &str, path: &str) -> String {
        let now = Utc::now();
        self.purge_expired(now);
        self.header_at(host, path, now)
    }

    pub fn header_at(&self, host: &str, path: &str, now: DateTime<Utc>) -> String {
        self.cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches_host(host) && c.matches_path(path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Drop expired cookies; returns how many went
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.cookies.len();
        self.cookies.retain(|c| !c.is_expired(now));
        before - self.cookies.len()
    }

    /// Load a jar saved with [`CookieJar::save`]; a missing file is an empty jar
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read cookie file {}", path.display()))?;
        let mut jar: CookieJar = serde_json::from_str(&text)
            .with_context(|| format!("malformed cookie file {}", path.display()))?;
        jar.purge_expired(Utc::now());
        Ok(jar)
    }

    /// Write the jar as JSON, replacing `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
            .with_context(|| format!("cannot write cookie file {}", path.display()))?;
        Ok(())
    }
}
