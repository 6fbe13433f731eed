//! Session middleware.
//!
//! Sessions live in an in-process store keyed by a random identifier. The
//! identifier travels in a signed cookie whose attributes come from
//! [`CookiePolicy`].

use sha2::{Digest, Sha512};
use tower_sessions::{
    cookie::{time::Duration as CookieDuration, Key, SameSite},
    service::SignedCookie,
    Expiry, MemoryStore, SessionManagerLayer,
};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::policy::CookiePolicy;

/// Cookie name `tower-sessions` uses when none is configured. Advertising it
/// reveals the server stack, so it is never accepted.
pub const FRAMEWORK_DEFAULT_COOKIE_NAME: &str = "id";

/// Secrets shorter than this are accepted but logged as weak.
const RECOMMENDED_SECRET_LEN: usize = 32;

pub type SessionLayer = SessionManagerLayer<MemoryStore, SignedCookie>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session secret is missing; refusing to start with unsigned sessions")]
    MissingSecret,

    #[error("session cookie name '{0}' is the framework default")]
    DefaultCookieName(String),

    #[error("failed to derive session signing key: {0}")]
    Key(String),
}

/// Derive the 64-byte cookie signing key from the configured secret.
fn signing_key(secret: &str) -> Result<Key, SessionError> {
    let digest = Sha512::digest(secret.as_bytes());
    Key::try_from(digest.as_slice()).map_err(|e| SessionError::Key(e.to_string()))
}

/// Build the session layer for the given cookie policy.
///
/// # Errors
/// Returns an error if the secret is empty or the cookie name is the
/// framework default.
pub fn configure_session(
    policy: &CookiePolicy,
    config: &SessionConfig,
) -> Result<SessionLayer, SessionError> {
    let secret = config.secret.trim();
    if secret.is_empty() {
        return Err(SessionError::MissingSecret);
    }
    if secret.len() < RECOMMENDED_SECRET_LEN {
        warn!(
            length = secret.len(),
            recommended = RECOMMENDED_SECRET_LEN,
            "session secret is shorter than recommended"
        );
    }

    let cookie_name = config.session_cookie_name();
    if cookie_name == FRAMEWORK_DEFAULT_COOKIE_NAME {
        return Err(SessionError::DefaultCookieName(cookie_name.to_string()));
    }

    let expiry = match policy.max_age() {
        Some(max_age) => {
            let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            Expiry::OnInactivity(CookieDuration::seconds(secs))
        }
        None => Expiry::OnSessionEnd,
    };

    info!(
        cookie_name,
        http_only = policy.http_only,
        secure = policy.secure,
        max_age_secs = ?policy.max_age_secs,
        "Session middleware configured"
    );

    Ok(SessionManagerLayer::new(MemoryStore::default())
        .with_name(cookie_name.to_string())
        .with_path("/")
        .with_http_only(policy.http_only)
        .with_secure(policy.secure)
        .with_same_site(SameSite::Strict)
        .with_expiry(expiry)
        .with_signed(signing_key(secret)?))
}

impl SessionConfig {
    /// Trimmed cookie name as it is sent to clients.
    #[must_use]
    pub fn session_cookie_name(&self) -> &str {
        self.cookie_name.trim()
    }
}
