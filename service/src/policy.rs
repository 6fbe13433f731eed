//! Security posture policy.
//!
//! [`SecurityPolicy`] is the single description of every defensive control the
//! server applies. Header middleware, the session cookie, the template engine
//! and the listener all read their settings from it, so turning a control off
//! is always an explicit configuration value rather than a missing line of
//! wiring.

use std::time::Duration;

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

/// How the listener talks to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Unencrypted HTTP. Only acceptable outside production.
    Plaintext,
    /// HTTPS using the configured certificate/key pair.
    Encrypted,
}

impl TransportMode {
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::Encrypted)
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plaintext => f.write_str("plaintext"),
            Self::Encrypted => f.write_str("encrypted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct XssFilterPolicy {
    /// Send `X-XSS-Protection`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Send `1; mode=block` to Internet Explorer < 9 as well. When false those
    /// browsers receive `0`, since their filter can itself be abused.
    #[serde(default = "default_true")]
    pub apply_to_legacy_browsers: bool,
}

impl Default for XssFilterPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            apply_to_legacy_browsers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CookiePolicy {
    /// Hide the session cookie from client-side scripts.
    #[serde(default = "default_true")]
    pub http_only: bool,

    /// Only send the session cookie over encrypted transport.
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Cookie lifetime in seconds. `None` keeps it for the browser session.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CookiePolicy {
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            max_age_secs: None,
        }
    }
}

/// Every security control the server applies, and its parameters.
///
/// `Default` is the hardened state: all controls on, encrypted transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Strip `X-Powered-By` from every response.
    pub disable_powered_by_header: bool,

    /// Send `X-Frame-Options` (clickjacking protection).
    pub frameguard: bool,

    /// `X-Frame-Options` value: "DENY" or "SAMEORIGIN".
    pub frame_options: String,

    /// Send headers that stop browsers and proxies caching responses.
    pub no_cache: bool,

    /// Send `Content-Security-Policy`.
    pub content_security_policy: bool,

    /// `Content-Security-Policy` header value.
    pub csp_directives: String,

    /// Send `Strict-Transport-Security`.
    pub strict_transport_security: bool,

    /// HSTS max-age in seconds (default: 31536000 = 1 year).
    pub hsts_max_age: u64,

    /// Include subdomains in HSTS.
    pub hsts_include_subdomains: bool,

    pub xss_filter: XssFilterPolicy,

    /// Send `X-Content-Type-Options: nosniff`.
    pub no_sniff: bool,

    /// Require a CSRF token on state-changing requests.
    pub csrf_protection: bool,

    pub cookie: CookiePolicy,

    /// HTML-escape every templated value.
    pub template_auto_escape: bool,

    pub transport_mode: TransportMode,
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            disable_powered_by_header: true,
            frameguard: true,
            frame_options: "SAMEORIGIN".to_string(),
            no_cache: true,
            content_security_policy: true,
            csp_directives: "default-src 'self'".to_string(),
            strict_transport_security: true,
            hsts_max_age: 31_536_000,
            hsts_include_subdomains: true,
            xss_filter: XssFilterPolicy::default(),
            no_sniff: true,
            csrf_protection: true,
            cookie: CookiePolicy::default(),
            template_auto_escape: true,
            transport_mode: TransportMode::Encrypted,
        }
    }
}

/// A policy that cannot be applied as written.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("security.cookie.secure requires security.transport_mode = \"encrypted\"; secure cookies are never sent over plaintext")]
    SecureCookieOverPlaintext,

    #[error("security.frame_options must be 'DENY' or 'SAMEORIGIN', got: '{0}'")]
    InvalidFrameOptions(String),

    #[error("security.{control} is not a valid header value: '{value}'")]
    InvalidHeaderValue {
        control: &'static str,
        value: String,
    },
}

impl SecurityPolicy {
    /// Check the policy for contradictions and malformed values.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.cookie.secure && !self.transport_mode.is_encrypted() {
            return Err(PolicyError::SecureCookieOverPlaintext);
        }

        if self.frameguard {
            let frame_opts = self.frame_options.to_uppercase();
            if frame_opts != "DENY" && frame_opts != "SAMEORIGIN" {
                return Err(PolicyError::InvalidFrameOptions(self.frame_options.clone()));
            }
        }

        if self.content_security_policy
            && (self.csp_directives.trim().is_empty()
                || HeaderValue::from_str(&self.csp_directives).is_err())
        {
            return Err(PolicyError::InvalidHeaderValue {
                control: "csp_directives",
                value: self.csp_directives.clone(),
            });
        }

        Ok(())
    }

    /// Names of the controls this policy leaves switched off.
    ///
    /// Plaintext transport counts as a disabled control.
    #[must_use]
    pub fn disabled_controls(&self) -> Vec<&'static str> {
        let controls = [
            ("disable_powered_by_header", self.disable_powered_by_header),
            ("frameguard", self.frameguard),
            ("no_cache", self.no_cache),
            ("content_security_policy", self.content_security_policy),
            ("strict_transport_security", self.strict_transport_security),
            ("xss_filter.enabled", self.xss_filter.enabled),
            (
                "xss_filter.apply_to_legacy_browsers",
                self.xss_filter.apply_to_legacy_browsers,
            ),
            ("no_sniff", self.no_sniff),
            ("csrf_protection", self.csrf_protection),
            ("cookie.http_only", self.cookie.http_only),
            ("cookie.secure", self.cookie.secure),
            ("template_auto_escape", self.template_auto_escape),
            ("transport_mode", self.transport_mode.is_encrypted()),
        ];

        controls
            .into_iter()
            .filter(|(_, enabled)| !enabled)
            .map(|(name, _)| name)
            .collect()
    }
}
