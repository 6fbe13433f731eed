//! Security headers middleware for HTTP responses.
//!
//! Each header control in [`SecurityPolicy`] maps to one or more response
//! headers. [`SecurityHeaders::from_policy`] resolves the enabled controls once
//! at startup; [`security_headers_middleware`] applies them to every response,
//! including errors produced by inner layers.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, EXPIRES, PRAGMA, STRICT_TRANSPORT_SECURITY,
            USER_AGENT, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
        },
        HeaderMap, HeaderName, HeaderValue,
    },
    middleware::{self, Next},
    response::Response,
    Extension, Router,
};
use tracing::info;

use crate::policy::{PolicyError, SecurityPolicy, XssFilterPolicy};

pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");
pub const SURROGATE_CONTROL: HeaderName = HeaderName::from_static("surrogate-control");

const NO_CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, proxy-revalidate";
const XSS_BLOCK: &str = "1; mode=block";
const XSS_OFF: &str = "0";

/// Response mutations resolved from a [`SecurityPolicy`].
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    fixed: Vec<(HeaderName, HeaderValue)>,
    xss_filter: Option<XssFilterPolicy>,
    strip_powered_by: bool,
}

impl SecurityHeaders {
    /// Resolve the header controls enabled in `policy`.
    ///
    /// # Errors
    /// Returns an error if a configured value cannot be sent as a header.
    pub fn from_policy(policy: &SecurityPolicy) -> Result<Self, PolicyError> {
        let mut fixed = Vec::new();

        if policy.frameguard {
            fixed.push((
                X_FRAME_OPTIONS,
                header_value("frame_options", &policy.frame_options.to_uppercase())?,
            ));
        }

        if policy.no_cache {
            fixed.push((CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL)));
            fixed.push((PRAGMA, HeaderValue::from_static("no-cache")));
            fixed.push((EXPIRES, HeaderValue::from_static("0")));
            fixed.push((SURROGATE_CONTROL, HeaderValue::from_static("no-store")));
        }

        if policy.content_security_policy {
            fixed.push((
                CONTENT_SECURITY_POLICY,
                header_value("csp_directives", &policy.csp_directives)?,
            ));
        }

        if policy.strict_transport_security {
            let hsts_value = if policy.hsts_include_subdomains {
                format!("max-age={}; includeSubDomains", policy.hsts_max_age)
            } else {
                format!("max-age={}", policy.hsts_max_age)
            };
            fixed.push((
                STRICT_TRANSPORT_SECURITY,
                header_value("hsts_max_age", &hsts_value)?,
            ));
        }

        if policy.no_sniff {
            fixed.push((X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")));
        }

        Ok(Self {
            fixed,
            xss_filter: policy.xss_filter.enabled.then(|| policy.xss_filter.clone()),
            strip_powered_by: policy.disable_powered_by_header,
        })
    }

    /// Apply the resolved controls to an outgoing response's headers.
    ///
    /// `user_agent` is the request's `User-Agent`, used to pick the
    /// `X-XSS-Protection` value for legacy browsers.
    pub fn apply(&self, user_agent: Option<&str>, headers: &mut HeaderMap) {
        if self.strip_powered_by {
            headers.remove(X_POWERED_BY);
        }

        for (name, value) in &self.fixed {
            headers.insert(name.clone(), value.clone());
        }

        if let Some(xss) = &self.xss_filter {
            let legacy = user_agent.is_some_and(is_legacy_ie);
            let value = if legacy && !xss.apply_to_legacy_browsers {
                XSS_OFF
            } else {
                XSS_BLOCK
            };
            headers.insert(X_XSS_PROTECTION, HeaderValue::from_static(value));
        }
    }
}

fn header_value(control: &'static str, value: &str) -> Result<HeaderValue, PolicyError> {
    HeaderValue::from_str(value).map_err(|_| PolicyError::InvalidHeaderValue {
        control,
        value: value.to_string(),
    })
}

/// Internet Explorer 8 and older, whose XSS auditor can be turned against the page.
fn is_legacy_ie(user_agent: &str) -> bool {
    user_agent
        .split("MSIE ")
        .nth(1)
        .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
        .and_then(|major| major.parse::<u32>().ok())
        .is_some_and(|major| major < 9)
}

/// Middleware to apply security headers to all responses.
///
/// Reads the resolved [`SecurityHeaders`] from an `Extension`; register it
/// with [`apply_header_controls`] so it wraps every route.
pub async fn security_headers_middleware(
    Extension(headers): Extension<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut response = next.run(request).await;
    headers.apply(user_agent.as_deref(), response.headers_mut());
    response
}

/// Register the header controls around `router`.
///
/// Enabled controls are logged here; disabled ones are reported once, with
/// the rest of [`SecurityPolicy::disabled_controls`], during startup.
pub fn apply_header_controls<S>(
    router: Router<S>,
    policy: &SecurityPolicy,
    headers: Arc<SecurityHeaders>,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let controls = [
        ("disable_powered_by_header", policy.disable_powered_by_header),
        ("frameguard", policy.frameguard),
        ("no_cache", policy.no_cache),
        ("content_security_policy", policy.content_security_policy),
        ("strict_transport_security", policy.strict_transport_security),
        ("xss_filter", policy.xss_filter.enabled),
        ("no_sniff", policy.no_sniff),
    ];
    for (control, _) in controls.into_iter().filter(|(_, enabled)| *enabled) {
        info!(control, "Header control enabled");
    }

    router
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(Extension(headers))
}
