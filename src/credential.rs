//! Session cookie handling.
//!
//! A credential is the raw `Cookie` header value of a logged-in browser
//! session. The watcher only looks inside it for the account id and the
//! CSRF token; everything else is passed through untouched.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Result, WatchError};

const ACCOUNT_ID_COOKIE: &str = "DedeUserID";
const CSRF_COOKIE: &str = "bili_jct";

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"\s*;\s*").expect("valid cookie separator regex"))
}

/// Parsed session cookie
#[derive(Debug, Clone, Default)]
pub struct Credential {
    raw: String,
    fields: HashMap<String, String>,
}

impl Credential {
    /// Parse a `name=value; name=value` cookie string
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let fields = separator()
            .split(raw)
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();

        Self {
            raw: raw.to_string(),
            fields,
        }
    }

    /// The cookie header value as given
    pub fn header_value(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Numeric account id carried by the session
    pub fn account_id(&self) -> Result<u64> {
        let value = self.get(ACCOUNT_ID_COOKIE).ok_or_else(|| {
            WatchError::Credential(format!("cookie has no {ACCOUNT_ID_COOKIE}"))
        })?;
        value.parse().map_err(|_| {
            WatchError::Credential(format!("{ACCOUNT_ID_COOKIE} is not numeric: {value}"))
        })
    }

    /// CSRF token; empty for anonymous sessions
    pub fn csrf(&self) -> &str {
        self.get(CSRF_COOKIE).unwrap_or_default()
    }
}
