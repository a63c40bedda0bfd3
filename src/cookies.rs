//! Cookie normalization
//!
//! Accepts the loose formats callers pass cookies in (header-style
//! strings, JSON maps) and produces the normalized record the Storage
//! domain expects. Name-prefix rules (`__Host-`, `__Secure-`) are
//! enforced when a cookie is set.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized cookie record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie applies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Path, defaults to "/" browser-side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expiry as a unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// Secure flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// HttpOnly flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// SameSite policy: "Strict", "Lax" or "None"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    /// Priority: "Low", "Medium" or "High"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Source scheme: "Secure", "NonSecure" or "Unset"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_scheme: Option<String>,
    /// URL to associate the cookie with instead of a domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Cookie {
    /// New cookie with just name and value
    pub fn new<S: Into<String>>(name: S, value: S) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Parse a header-style string: `name=value; domain=.x.com; path=/`.
    pub fn parse_str(text: &str) -> Result<Cookie> {
        let mut cookie = Cookie::default();
        let mut saw_pair = false;

        for (i, part) in text.split(';').enumerate() {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = match part.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (part, ""),
            };
            if i == 0 {
                if value.is_empty() && !part.contains('=') {
                    return Err(Error::cookie_format(format!(
                        "cookie string must start with name=value: {}",
                        text
                    )));
                }
                cookie.name = key.to_string();
                cookie.value = value.to_string();
                saw_pair = true;
                continue;
            }
            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = Some(value.to_string()),
                "path" => cookie.path = Some(value.to_string()),
                "expires" | "expiry" => {
                    let secs: f64 = value
                        .parse()
                        .map_err(|_| Error::cookie_format(format!("bad expiry: {}", value)))?;
                    cookie.expires = Some(secs);
                }
                "secure" => cookie.secure = Some(true),
                "httponly" => cookie.http_only = Some(true),
                "samesite" => cookie.same_site = Some(value.to_string()),
                "priority" => cookie.priority = Some(value.to_string()),
                other => {
                    return Err(Error::cookie_format(format!("unknown cookie field: {}", other)))
                }
            }
        }

        if !saw_pair || cookie.name.is_empty() {
            return Err(Error::cookie_format(format!("no name=value pair in: {}", text)));
        }
        Ok(cookie)
    }

    /// Build from a JSON map. `expiry` is accepted as an alias of
    /// `expires`.
    pub fn from_value(value: &Value) -> Result<Cookie> {
        if let Some(s) = value.as_str() {
            return Self::parse_str(s);
        }
        let obj = value
            .as_object()
            .ok_or_else(|| Error::cookie_format("cookie must be a string or a map"))?;

        let mut normalized = obj.clone();
        if let Some(expiry) = normalized.remove("expiry") {
            normalized.insert("expires".to_string(), expiry);
        }

        let cookie: Cookie = serde_json::from_value(Value::Object(normalized))
            .map_err(|e| Error::cookie_format(format!("bad cookie map: {}", e)))?;
        if cookie.name.is_empty() {
            return Err(Error::cookie_format("cookie has no name"));
        }
        Ok(cookie)
    }

    /// Fill in a missing domain from the page URL the cookie is set on.
    pub fn infer_domain(&mut self, page_url: &str) {
        if self.domain.is_some() || self.url.is_some() {
            return;
        }
        if let Ok(parsed) = url::Url::parse(page_url) {
            if let Some(host) = parsed.host_str() {
                self.domain = Some(host.to_string());
            }
        }
    }

    /// Enforce the `__Host-`/`__Secure-` name-prefix rules.
    pub fn validate_prefix(&self) -> Result<()> {
        if self.name.starts_with("__Host-") {
            if self.secure != Some(true) {
                return Err(Error::cookie_format("__Host- cookies must be secure"));
            }
            if self.domain.is_some() {
                return Err(Error::cookie_format(
                    "__Host- cookies must not carry a domain",
                ));
            }
            if self.path.as_deref() != Some("/") {
                return Err(Error::cookie_format("__Host- cookies must use path=/"));
            }
        } else if self.name.starts_with("__Secure-") && self.secure != Some(true) {
            return Err(Error::cookie_format("__Secure- cookies must be secure"));
        }
        Ok(())
    }

    /// The `{name, value, domain}` projection of browser-wide cookie dumps.
    pub fn brief(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "value": self.value,
            "domain": self.domain.clone().unwrap_or_default(),
        })
    }
}

/// Normalize a caller-supplied cookie collection: a single string or map,
/// or an array of either.
pub fn normalize_cookies(input: &Value) -> Result<Vec<Cookie>> {
    match input {
        Value::Array(items) => items.iter().map(Cookie::from_value).collect(),
        other => Ok(vec![Cookie::from_value(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_header_style() {
        let c = Cookie::parse_str("sid=abc123; domain=.example.com; path=/; secure; httponly").unwrap();
        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.domain.as_deref(), Some(".example.com"));
        assert_eq!(c.path.as_deref(), Some("/"));
        assert_eq!(c.secure, Some(true));
        assert_eq!(c.http_only, Some(true));
    }

    #[test]
    fn test_parse_rejects_bare_word() {
        assert!(Cookie::parse_str("nonsense").is_err());
        assert!(Cookie::parse_str("").is_err());
    }

    #[test]
    fn test_from_map_with_expiry_alias() {
        let c = Cookie::from_value(&json!({
            "name": "a",
            "value": "1",
            "domain": "example.com",
            "expiry": 1924992000.0,
        }))
        .unwrap();
        assert_eq!(c.expires, Some(1924992000.0));
    }

    #[test]
    fn test_infer_domain() {
        let mut c = Cookie::new("a", "1");
        c.infer_domain("https://sub.example.com/page?q=1");
        assert_eq!(c.domain.as_deref(), Some("sub.example.com"));

        // Explicit domain wins
        let mut c = Cookie::from_value(&json!({"name": "a", "value": "1", "domain": "x.com"})).unwrap();
        c.infer_domain("https://y.com/");
        assert_eq!(c.domain.as_deref(), Some("x.com"));
    }

    #[test]
    fn test_host_prefix_rules() {
        let mut c = Cookie::new("__Host-sid", "x");
        assert!(c.validate_prefix().is_err());
        c.secure = Some(true);
        c.path = Some("/".to_string());
        assert!(c.validate_prefix().is_ok());
        c.domain = Some("example.com".to_string());
        assert!(c.validate_prefix().is_err());
    }

    #[test]
    fn test_secure_prefix_rule() {
        let mut c = Cookie::new("__Secure-tok", "x");
        assert!(c.validate_prefix().is_err());
        c.secure = Some(true);
        assert!(c.validate_prefix().is_ok());
    }

    #[test]
    fn test_normalize_collection() {
        let cookies = normalize_cookies(&json!([
            "a=1; domain=x.com",
            {"name": "b", "value": "2"},
        ]))
        .unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "a");
        assert_eq!(cookies[1].name, "b");
    }

    #[test]
    fn test_serializes_camel_case() {
        let c = Cookie {
            name: "a".into(),
            value: "1".into(),
            http_only: Some(true),
            same_site: Some("Lax".into()),
            ..Default::default()
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["httpOnly"], json!(true));
        assert_eq!(v["sameSite"], json!("Lax"));
        assert!(v.get("domain").is_none());
    }
}
