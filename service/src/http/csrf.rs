//! CSRF protection bound to the session.
//!
//! Each session holds a random secret. Requests with safe methods receive a
//! fresh token in the [`CsrfToken`] request extension for handlers to embed
//! in forms. Every other request must echo a token in the `_csrf` query or
//! form field, or in one of the [`CSRF_HEADERS`].
//!
//! Tokens have the form `salt.signature`, where the signature is the
//! HMAC-SHA256 of the salt under the session secret.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower_sessions::Session;
use tracing::{error, warn};

type HmacSha256 = Hmac<Sha256>;

const CSRF_SECRET_KEY: &str = "csrf.secret";

/// Form and query field carrying the token.
pub const CSRF_FIELD: &str = "_csrf";

/// Request headers checked for the token, in order.
pub const CSRF_HEADERS: [&str; 4] = ["csrf-token", "xsrf-token", "x-csrf-token", "x-xsrf-token"];

/// Largest form body the middleware buffers while looking for a `_csrf` field.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Token for the current request's session, for embedding in forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn new_secret() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

fn signature(secret: &str, salt: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any size");
    mac.update(salt.as_bytes());
    mac
}

/// Issue a new token for `secret`.
#[must_use]
pub fn issue_token(secret: &str) -> String {
    let salt = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 12]>());
    let sig = signature(secret, &salt).finalize().into_bytes();
    format!("{salt}.{}", URL_SAFE_NO_PAD.encode(sig))
}

/// Check `token` against `secret` in constant time.
#[must_use]
pub fn verify_token(secret: &str, token: &str) -> bool {
    let Some((salt, sig)) = token.split_once('.') else {
        return false;
    };
    let Ok(sig) = URL_SAFE_NO_PAD.decode(sig) else {
        return false;
    };
    signature(secret, salt).verify_slice(&sig).is_ok()
}

fn is_safe(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    CSRF_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(str::to_owned)
}

/// Find `_csrf` in an `application/x-www-form-urlencoded` string.
fn token_from_urlencoded(input: &str) -> Option<String> {
    input.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != CSRF_FIELD {
            return None;
        }
        urlencoding::decode(&value.replace('+', " "))
            .ok()
            .map(|v| v.into_owned())
    })
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

async fn session_secret(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(secret) = session.get::<String>(CSRF_SECRET_KEY).await? {
        return Ok(secret);
    }
    let secret = new_secret();
    session.insert(CSRF_SECRET_KEY, &secret).await?;
    Ok(secret)
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "invalid csrf token").into_response()
}

/// Middleware enforcing CSRF tokens on state-changing requests.
///
/// Must run inside the session layer.
pub async fn csrf_middleware(session: Session, request: Request, next: Next) -> Response {
    let secret = match session_secret(&session).await {
        Ok(secret) => secret,
        Err(err) => {
            error!(error = %err, "failed to load CSRF secret from session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut request = if is_safe(request.method()) {
        request
    } else {
        let presented = token_from_headers(request.headers())
            .or_else(|| request.uri().query().and_then(token_from_urlencoded));

        // Only a form without a header or query token has its body buffered.
        let (request, presented) = match presented {
            Some(token) => (request, Some(token)),
            None if is_form(request.headers()) => {
                let (parts, body) = request.into_parts();
                let Ok(bytes) = to_bytes(body, MAX_FORM_BYTES).await else {
                    return StatusCode::PAYLOAD_TOO_LARGE.into_response();
                };
                let token = std::str::from_utf8(&bytes)
                    .ok()
                    .and_then(token_from_urlencoded);
                (Request::from_parts(parts, Body::from(bytes)), token)
            }
            None => (request, None),
        };

        if !presented.is_some_and(|token| verify_token(&secret, &token)) {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "rejected request with missing or invalid CSRF token"
            );
            return forbidden();
        }

        request
    };

    request
        .extensions_mut()
        .insert(CsrfToken(issue_token(&secret)));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_issued_token_verifies() {
        let secret = new_secret();
        let token = issue_token(&secret);
        assert!(verify_token(&secret, &token));
    }

    #[test]
    fn test_tokens_are_salted() {
        let secret = new_secret();
        assert_ne!(issue_token(&secret), issue_token(&secret));
    }

    #[test]
    fn test_token_from_other_session_rejected() {
        let token = issue_token(&new_secret());
        assert!(!verify_token(&new_secret(), &token));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let secret = new_secret();
        for token in ["", "no-separator", ".", "salt.", "salt.!!!", "abc.ZGVhZGJlZWY"] {
            assert!(!verify_token(&secret, token), "token {token:?}");
        }
    }

    #[test]
    fn test_tampered_salt_rejected() {
        let secret = new_secret();
        let token = issue_token(&secret);
        let (_, sig) = token.split_once('.').expect("separator");
        assert!(!verify_token(&secret, &format!("other.{sig}")));
    }

    #[test]
    fn test_token_from_urlencoded() {
        assert_eq!(
            token_from_urlencoded("message=hi&_csrf=a%2Eb"),
            Some("a.b".to_string())
        );
        assert_eq!(token_from_urlencoded("message=hi"), None);
        assert_eq!(token_from_urlencoded("_csrfx=1"), None);
    }

    #[test]
    fn test_token_header_lookup_order() {
        let mut headers = HeaderMap::new();
        headers.insert("x-xsrf-token", HeaderValue::from_static("later"));
        headers.insert("csrf-token", HeaderValue::from_static("first"));
        assert_eq!(token_from_headers(&headers), Some("first".to_string()));
    }

    #[test]
    fn test_token_header_skips_non_utf8_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "csrf-token",
            HeaderValue::from_bytes(b"\xff\xfe").expect("opaque header value"),
        );
        headers.insert("x-csrf-token", HeaderValue::from_static("valid"));
        assert_eq!(token_from_headers(&headers), Some("valid".to_string()));
    }

    #[test]
    fn test_safe_methods() {
        assert!(is_safe(&Method::GET));
        assert!(is_safe(&Method::HEAD));
        assert!(is_safe(&Method::OPTIONS));
        assert!(!is_safe(&Method::POST));
        assert!(!is_safe(&Method::DELETE));
    }
}
