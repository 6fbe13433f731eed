//! Application routes.

use std::path::Path;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Extension, Form, Router,
};
use serde::{Deserialize, Serialize};
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use tower_http::services::ServeDir;
use tower_sessions::Session;
use tracing::warn;

use crate::context::AppContext;
use crate::http::CsrfToken;
use crate::templates::{Templates, ViewError};

const VISITS_KEY: &str = "visits";

// Health check handler
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

// Readiness: the shared pool can still reach Postgres
async fn readiness(State(db): State<PgPool>) -> impl IntoResponse {
    match query_scalar::<_, i32>("SELECT 1").fetch_one(&db).await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[derive(Serialize)]
struct IndexView<'a> {
    visits: u64,
    csrf_token: Option<&'a str>,
}

async fn index(
    State(templates): State<Templates>,
    session: Session,
    csrf: Option<Extension<CsrfToken>>,
) -> Result<Html<String>, ViewError> {
    let visits = match session.get::<u64>(VISITS_KEY).await {
        Ok(count) => count.unwrap_or(0) + 1,
        Err(err) => {
            warn!(error = %err, "failed to read visit count from session");
            1
        }
    };
    if let Err(err) = session.insert(VISITS_KEY, visits).await {
        warn!(error = %err, "failed to store visit count in session");
    }

    templates.html(
        "index",
        &IndexView {
            visits,
            csrf_token: csrf.as_ref().map(|Extension(token)| token.as_str()),
        },
    )
}

#[derive(Deserialize)]
struct FeedbackForm {
    message: String,
}

#[derive(Serialize)]
struct FeedbackView<'a> {
    message: &'a str,
    csrf_token: Option<&'a str>,
}

async fn submit_feedback(
    State(templates): State<Templates>,
    csrf: Option<Extension<CsrfToken>>,
    Form(form): Form<FeedbackForm>,
) -> Result<Html<String>, ViewError> {
    templates.html(
        "feedback",
        &FeedbackView {
            message: &form.message,
            csrf_token: csrf.as_ref().map(|Extension(token)| token.as_str()),
        },
    )
}

/// Views the page routes render.
pub const VIEWS: &[&str] = &["index", "feedback"];

/// Routes that use the session: the rendered pages.
///
/// Session and CSRF middleware are layered on by the caller.
pub fn pages() -> Router<AppContext> {
    Router::new()
        .route("/", get(index))
        .route("/feedback", post(submit_feedback))
}

/// Health checks and static assets. These never touch the session, so no
/// session record is created for probes or asset fetches.
pub fn public(assets_dir: &Path) -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness))
        .nest_service("/assets", ServeDir::new(assets_dir))
}
