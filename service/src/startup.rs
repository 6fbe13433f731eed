//! Process startup.
//!
//! Startup is one strictly sequential pass. Any failure aborts it; nothing is
//! retried and nothing falls back to a weaker configuration.
//!
//! 1. TLS material is loaded (encrypted transport only)
//! 2. The shared database pool connects
//! 3. Header controls are resolved from the policy
//! 4. Session middleware is configured
//! 5. The template engine is loaded
//! 6. Routes are registered and wrapped in the middleware above
//! 7. The listener binds (see [`Application::run_until_stopped`])

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{middleware, Router};
use axum_server::Handle;
use sqlx_postgres::PgPool;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::context::AppContext;
use crate::db::connect_database;
use crate::http::{apply_header_controls, csrf_middleware, SecurityHeaders};
use crate::policy::PolicyError;
use crate::routes;
use crate::session::{configure_session, SessionError};
use crate::templates::{Templates, ViewError};
use crate::transport::{configure_transport, serve, Transport, TransportError};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("security policy misconfigured: {0}")]
    Policy(#[from] PolicyError),

    #[error("session configuration failed: {0}")]
    Session(#[from] SessionError),

    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx_core::error::Error),

    #[error("certificate load failed: {0}")]
    CertificateLoad(#[from] TransportError),

    #[error("template setup failed: {0}")]
    Template(#[from] ViewError),

    #[error("invalid listen address '{0}'")]
    Address(String),

    #[error("listener failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// A fully wired server that has not bound its listener yet.
pub struct Application {
    router: Router,
    transport: Transport,
    addr: SocketAddr,
    handle: Handle,
}

impl Application {
    /// Run every startup step against a freshly connected database.
    ///
    /// # Errors
    /// Returns the first fatal startup failure.
    pub async fn build(config: &Config) -> Result<Self, StartupError> {
        config.validate()?;
        let transport = configure_transport(config.security.transport_mode, &config.tls).await?;
        let db = connect_database(&config.database)
            .await
            .map_err(StartupError::DatabaseConnect)?;
        Self::assemble(config, transport, db)
    }

    /// Run the startup steps with an existing pool.
    ///
    /// # Errors
    /// Returns the first fatal startup failure.
    pub async fn build_with_pool(config: &Config, db: PgPool) -> Result<Self, StartupError> {
        config.validate()?;
        let transport = configure_transport(config.security.transport_mode, &config.tls).await?;
        Self::assemble(config, transport, db)
    }

    fn assemble(config: &Config, transport: Transport, db: PgPool) -> Result<Self, StartupError> {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let addr: SocketAddr = addr.parse().map_err(|_| StartupError::Address(addr))?;

        let router = build_router(config, db)?;

        Ok(Self {
            router,
            transport,
            addr,
            handle: Handle::new(),
        })
    }

    /// Handle for observing the bound address and triggering shutdown.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Bind the listener and serve until the handle shuts down.
    ///
    /// # Errors
    /// Returns an error if the listener cannot bind or fails while serving.
    pub async fn run_until_stopped(self) -> Result<(), StartupError> {
        info!(
            address = %self.addr,
            transport = %self.transport.mode(),
            "Starting server"
        );
        serve(self.transport, self.addr, self.router, self.handle)
            .await
            .map_err(StartupError::Serve)
    }
}

/// Wire routes and security middleware around the given pool.
///
/// Layer order, outermost first: request tracing, header controls, session,
/// CSRF, routes. Session and CSRF wrap only the page routes; health checks
/// and assets sit directly under the header controls. Header controls sit
/// outside the session and CSRF layers so their rejections carry the
/// security headers too.
///
/// # Errors
/// Returns an error if any security component cannot be configured.
pub fn build_router(config: &Config, db: PgPool) -> Result<Router, StartupError> {
    let policy = &config.security;
    for control in policy.disabled_controls() {
        warn!(control, "Security control disabled by configuration");
    }

    let headers = Arc::new(SecurityHeaders::from_policy(policy)?);
    let session = configure_session(&policy.cookie, &config.session)?;
    let templates = Templates::configure(policy.template_auto_escape, &config.templates.views_dir)?;
    templates.require(routes::VIEWS)?;

    let ctx = AppContext { db, templates };
    let mut pages = routes::pages();

    if policy.csrf_protection {
        info!("CSRF protection enabled");
        pages = pages.layer(middleware::from_fn(csrf_middleware));
    }

    let app = pages
        .layer(session)
        .merge(routes::public(&config.templates.assets_dir));
    let app = apply_header_controls(app, policy, headers);

    Ok(app.layer(TraceLayer::new_for_http()).with_state(ctx))
}

/// Resolve when the process receives Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Start graceful shutdown of `handle` once a shutdown signal arrives.
pub fn shutdown_on_signal(handle: Handle) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });
}
