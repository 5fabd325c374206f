//! Attendance session windows.
//!
//! A session key identifies the window within which a subject may be
//! committed at most once. A new window opens a new write slot.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque identifier of one attendance window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How timestamps map to session keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWindow {
    /// One session per calendar day (in the timestamp's own timezone).
    Daily,
    /// Fixed-length windows of the given number of minutes, aligned to
    /// the Unix epoch. Must be non-zero.
    Minutes(u32),
}

impl SessionWindow {
    /// Session key for the window containing `t`. Deterministic: equal
    /// timestamps always map to equal keys.
    pub fn key_for<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> SessionKey
    where
        Tz::Offset: fmt::Display,
    {
        match self {
            SessionWindow::Daily => SessionKey(t.format("%Y-%m-%d").to_string()),
            SessionWindow::Minutes(minutes) => {
                let minutes = (*minutes).max(1) as i64;
                let bucket = t.timestamp().div_euclid(60 * minutes);
                SessionKey(format!("w{minutes}m-{bucket}"))
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid session window '{0}': expected 'daily' or a minute count like '45m'")]
pub struct ParseSessionWindowError(String);

impl FromStr for SessionWindow {
    type Err = ParseSessionWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("daily") {
            return Ok(SessionWindow::Daily);
        }
        let digits = trimmed.strip_suffix('m').unwrap_or(trimmed);
        match digits.parse::<u32>() {
            Ok(minutes) if minutes > 0 => Ok(SessionWindow::Minutes(minutes)),
            _ => Err(ParseSessionWindowError(s.to_string())),
        }
    }
}
