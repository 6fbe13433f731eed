//! Per-process application context.

use axum::extract::FromRef;
use sqlx_postgres::PgPool;

use crate::templates::Templates;

/// Everything route handlers share, built once during startup and handed to
/// the router as state.
#[derive(Clone)]
pub struct AppContext {
    pub db: PgPool,
    pub templates: Templates,
}

impl FromRef<AppContext> for PgPool {
    fn from_ref(ctx: &AppContext) -> Self {
        ctx.db.clone()
    }
}

impl FromRef<AppContext> for Templates {
    fn from_ref(ctx: &AppContext) -> Self {
        ctx.templates.clone()
    }
}
