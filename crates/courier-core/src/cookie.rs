//! `Set-Cookie` header assembly.
//!
//! ```rust
//! use courier_core::cookie::{CookieOptions, SameSite};
//!
//! let options = CookieOptions::new()
//!     .path("/")
//!     .http_only(true)
//!     .same_site(SameSite::Strict);
//!
//! let header = options.to_header_value("session", "abc123");
//! assert_eq!(header, "session=abc123; Path=/; HttpOnly; SameSite=Strict");
//! ```

use std::fmt;
use std::time::Duration;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Sent only with same-site requests.
    Strict,
    /// Sent with same-site requests and top-level navigations.
    Lax,
    /// Sent with every request; requires `Secure`.
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

/// Attributes of a cookie set by `Response::set_cookie`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<Duration>,
    expires: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl CookieOptions {
    /// Options with no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that expire the cookie immediately.
    #[must_use]
    pub fn expired() -> Self {
        Self::new().max_age(Duration::ZERO)
    }

    /// Sets the `Domain` attribute.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the `Path` attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets `Max-Age`, truncated to whole seconds.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Sets `Expires` (an HTTP date).
    #[must_use]
    pub fn expires(mut self, date: impl Into<String>) -> Self {
        self.expires = Some(date.into());
        self
    }

    /// Sets `Secure`.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets `HttpOnly`.
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sets `SameSite`.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Renders the `Set-Cookie` value for `name=value` with these attributes.
    #[must_use]
    pub fn to_header_value(&self, name: &str, value: &str) -> String {
        let mut parts = vec![format!("{name}={value}")];

        if let Some(ref domain) = self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if let Some(ref path) = self.path {
            parts.push(format!("Path={path}"));
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={}", max_age.as_secs()));
        }
        if let Some(ref expires) = self.expires {
            parts.push(format!("Expires={expires}"));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        if let Some(same_site) = self.same_site {
            parts.push(format!("SameSite={same_site}"));
        }

        parts.join("; ")
    }
}
