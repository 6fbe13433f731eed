//! Listener transport: TLS or plaintext.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing::{debug, info, warn};

use crate::config::TlsConfig;
use crate::policy::TransportMode;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{kind} file not found: {}", path.display())]
    Missing { kind: &'static str, path: PathBuf },

    #[error("failed to load certificate/key pair ({}, {}): {source}", cert.display(), key.display())]
    Load {
        cert: PathBuf,
        key: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A transport ready to bind.
#[derive(Clone)]
pub enum Transport {
    Plaintext,
    Encrypted(RustlsConfig),
}

impl Transport {
    #[must_use]
    pub const fn mode(&self) -> TransportMode {
        match self {
            Self::Plaintext => TransportMode::Plaintext,
            Self::Encrypted(_) => TransportMode::Encrypted,
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transport({})", self.mode())
    }
}

fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none()
        && rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}

fn require_file(kind: &'static str, path: &Path) -> Result<(), TransportError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(TransportError::Missing {
            kind,
            path: path.to_path_buf(),
        })
    }
}

/// Prepare the listener transport.
///
/// In encrypted mode the PEM certificate and key are read and parsed now; a
/// missing or malformed file is an error, never a fallback to plaintext.
///
/// # Errors
/// Returns an error if a certificate file is missing or unparsable.
pub async fn configure_transport(
    mode: TransportMode,
    tls: &TlsConfig,
) -> Result<Transport, TransportError> {
    match mode {
        TransportMode::Plaintext => {
            warn!("Transport is PLAINTEXT; traffic and cookies travel unencrypted");
            Ok(Transport::Plaintext)
        }
        TransportMode::Encrypted => {
            require_file("certificate", &tls.cert_path)?;
            require_file("private key", &tls.key_path)?;

            install_crypto_provider();
            let config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|source| TransportError::Load {
                    cert: tls.cert_path.clone(),
                    key: tls.key_path.clone(),
                    source,
                })?;

            info!(
                cert_path = %tls.cert_path.display(),
                "TLS certificate loaded"
            );
            Ok(Transport::Encrypted(config))
        }
    }
}

/// Bind `addr` on `transport` and serve `router` until `handle` shuts it down.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    transport: Transport,
    addr: SocketAddr,
    router: Router,
    handle: Handle,
) -> std::io::Result<()> {
    match transport {
        Transport::Encrypted(config) => {
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(router.into_make_service())
                .await
        }
        Transport::Plaintext => {
            axum_server::bind(addr)
                .handle(handle)
                .serve(router.into_make_service())
                .await
        }
    }
}
