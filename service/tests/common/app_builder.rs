//! Test app builder that goes through the same wiring as startup.
//!
//! [`TestAppBuilder`] assembles a [`Config`] with the hardened policy, the
//! shipped views and the fixture certificate, lets tests flip individual
//! controls, and builds the router with `startup::build_router`. The database
//! pool is lazy, so no Postgres is needed unless a handler touches it.
//!
//! # Usage
//!
//! ```ignore
//! use crate::common::app_builder::TestAppBuilder;
//!
//! #[tokio::test]
//! async fn test_without_frameguard() {
//!     let app = TestAppBuilder::new()
//!         .with_policy(|p| p.frameguard = false)
//!         .build();
//!
//!     // Use app.oneshot(...) to send requests
//! }
//! ```
//!
//! # Preset Builders
//!
//! - [`TestAppBuilder::new()`] - Hardened policy, encrypted transport
//! - [`TestAppBuilder::plaintext()`] - Plaintext transport, non-secure cookie

use axum::Router;
use posture_api::{
    config::Config,
    policy::{SecurityPolicy, TransportMode},
    startup::build_router,
};
use sqlx_postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::{fixture_cert, fixture_key, manifest_path, unreachable_database_url, TEST_SECRET};

/// Builder for test applications that mirrors startup wiring.
pub struct TestAppBuilder {
    config: Config,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    /// Hardened policy with a test secret and the fixture certificate.
    #[must_use]
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".into();
        config.database.url = unreachable_database_url();
        config.database.acquire_timeout_secs = 1;
        config.session.secret = TEST_SECRET.into();
        config.tls.cert_path = fixture_cert();
        config.tls.key_path = fixture_key();
        config.templates.views_dir = manifest_path("views");
        config.templates.assets_dir = manifest_path("assets");
        Self { config }
    }

    /// Plaintext transport with the `Secure` cookie flag off.
    #[must_use]
    pub fn plaintext() -> Self {
        Self::new().with_policy(|p| {
            p.transport_mode = TransportMode::Plaintext;
            p.cookie.secure = false;
        })
    }

    /// Adjust the security policy.
    #[must_use]
    pub fn with_policy(mut self, f: impl FnOnce(&mut SecurityPolicy)) -> Self {
        f(&mut self.config.security);
        self
    }

    /// Adjust any other part of the configuration.
    #[must_use]
    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn into_config(self) -> Config {
        self.config
    }

    /// A pool that connects on first use.
    #[allow(clippy::expect_used)]
    pub fn lazy_pool(&self) -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(&self.config.database.url)
            .expect("valid database url")
    }

    /// Build the Axum router.
    #[must_use]
    pub fn build(self) -> Router {
        let pool = self.lazy_pool();
        self.build_with_pool(pool)
    }

    /// Build the Axum router around an existing pool.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn build_with_pool(self, pool: PgPool) -> Router {
        build_router(&self.config, pool).expect("router should build")
    }
}
