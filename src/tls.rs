//! TLS utilities for loading certificates and configuring mTLS.
//!
//! The server presents its own certificate and requires clients to present
//! one signed by the configured CA; the verified client certificate's
//! CommonName becomes the authorization subject (see [`crate::auth`]).

use std::path::PathBuf;

use tokio::fs;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

use crate::config::TlsConfig;

/// Error type for TLS configuration issues.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("CA certificate not found: {0}")]
    CaCertNotFound(PathBuf),

    #[error("Certificate not found: {0}")]
    CertNotFound(PathBuf),

    #[error("Private key not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
}

/// Loaded TLS materials ready for use with tonic.
///
/// Contains an identity (certificate + private key) and the CA certificate
/// used to verify peer certificates. Works for both sides of the
/// connection: the server loads its own identity, clients (including the
/// integration tests) load theirs.
#[derive(Clone)]
pub struct TlsIdentity {
    /// This endpoint's identity (certificate + private key)
    identity: Identity,
    /// CA certificate for verifying peers
    ca_cert: Certificate,
}

impl TlsIdentity {
    /// Load TLS materials from the file paths in the config.
    ///
    /// # Errors
    ///
    /// Returns an error if any file does not exist or cannot be read.
    pub async fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        // Validate paths exist before reading
        if !config.ca_file.exists() {
            return Err(TlsError::CaCertNotFound(config.ca_file.clone()));
        }
        if !config.cert_file.exists() {
            return Err(TlsError::CertNotFound(config.cert_file.clone()));
        }
        if !config.key_file.exists() {
            return Err(TlsError::KeyNotFound(config.key_file.clone()));
        }

        let ca_pem = fs::read(&config.ca_file).await?;
        let cert_pem = fs::read(&config.cert_file).await?;
        let key_pem = fs::read(&config.key_file).await?;

        let ca_cert = Certificate::from_pem(ca_pem);
        let identity = Identity::from_pem(cert_pem, key_pem);

        Ok(Self { identity, ca_cert })
    }

    /// Create server TLS config with client certificate verification (mTLS).
    ///
    /// The returned config:
    /// - Presents the server's certificate to clients
    /// - Requires clients to present a valid certificate
    /// - Verifies client certificates against the CA
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity.clone())
            .client_ca_root(self.ca_cert.clone())
    }

    /// Create client TLS config for connecting to the server.
    ///
    /// The returned config presents the client's certificate and verifies
    /// the server's certificate against the CA. Server certificates are
    /// issued for `localhost`.
    pub fn client_tls_config(&self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .domain_name("localhost")
            .ca_certificate(self.ca_cert.clone())
            .identity(self.identity.clone())
    }
}
