//! TLS Configuration and Certificate Loading
//!
//! Certificate, key and optional CA files all resolve against one directory
//! (`SSL_DIR`, default `ssl`). A relative `SSL_DIR` is taken relative to the
//! process working directory.

use crate::{Result, ServerError};
use epic_core::Environment;
use rustls::pki_types::CertificateDer;
use rustls::ServerConfig as RustlsServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::info;

pub const DEFAULT_SSL_DIR: &str = "ssl";
pub const DEFAULT_SSL_CERT: &str = "server.crt";
pub const DEFAULT_SSL_KEY: &str = "server.key";

/// Certificate files for the HTTPS listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Extra CA / intermediate certificates appended to the served chain.
    pub ca_path: Option<PathBuf>,
}

impl TlsConfig {
    /// Create a new TLS config with explicit paths
    pub fn with_certs(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ca_path: None,
        }
    }

    pub fn with_ca(mut self, ca_path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }

    /// Read `SSL_DIR`, `SSL_CERT`, `SSL_KEY` and `SSL_CA`.
    pub fn from_env(env: &Environment) -> Self {
        let dir = PathBuf::from(env.get_or("SSL_DIR", DEFAULT_SSL_DIR));
        let cert = dir.join(env.get_or("SSL_CERT", DEFAULT_SSL_CERT));
        let key = dir.join(env.get_or("SSL_KEY", DEFAULT_SSL_KEY));
        let ca = env.get_opt("SSL_CA").map(|ca| dir.join(ca));

        Self {
            cert_path: cert,
            key_path: key,
            ca_path: ca,
        }
    }

    /// Build a TLS acceptor from this config
    pub fn build_acceptor(&self) -> Result<TlsAcceptor> {
        let mut certs = read_certs(&self.cert_path)?;
        if certs.is_empty() {
            return Err(ServerError::CertificateError(format!(
                "No certificates found in {}",
                self.cert_path.display()
            )));
        }

        if let Some(ca_path) = &self.ca_path {
            let chain = read_certs(ca_path)?;
            info!("Appending {} CA certificate(s) from {}", chain.len(), ca_path.display());
            certs.extend(chain);
        }

        let key_file = open(&self.key_path, "key")?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .map_err(|e| ServerError::CertificateError(format!("Failed to read private key: {}", e)))?
            .ok_or_else(|| {
                ServerError::CertificateError(format!(
                    "No private key found in {}",
                    self.key_path.display()
                ))
            })?;

        let tls_config = RustlsServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::TlsError(format!("TLS config error: {}", e)))?;

        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }
}

fn open(path: &Path, what: &str) -> Result<File> {
    File::open(path).map_err(|e| {
        ServerError::CertificateError(format!(
            "Failed to open {} file {}: {}",
            what,
            path.display(),
            e
        ))
    })
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = open(path, "certificate")?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| {
            ServerError::CertificateError(format!(
                "Failed to parse certificates in {}: {}",
                path.display(),
                e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_defaults() {
        let config = TlsConfig::from_env(&Environment::default());
        assert_eq!(config.cert_path, Path::new("ssl").join("server.crt"));
        assert_eq!(config.key_path, Path::new("ssl").join("server.key"));
        assert_eq!(config.ca_path, None);
    }

    #[test]
    fn test_from_env_resolves_everything_against_ssl_dir() {
        let env = Environment::from_pairs([
            ("SSL_DIR", "/etc/epic/tls"),
            ("SSL_CERT", "site.pem"),
            ("SSL_KEY", "site.key"),
            ("SSL_CA", "chain.pem"),
        ]);
        let config = TlsConfig::from_env(&env);
        assert_eq!(config.cert_path, PathBuf::from("/etc/epic/tls/site.pem"));
        assert_eq!(config.key_path, PathBuf::from("/etc/epic/tls/site.key"));
        assert_eq!(config.ca_path, Some(PathBuf::from("/etc/epic/tls/chain.pem")));
    }

    #[test]
    fn test_missing_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig::with_certs(dir.path().join("none.crt"), dir.path().join("none.key"));
        let err = config.build_acceptor().err().unwrap();
        assert!(matches!(err, ServerError::CertificateError(_)));
    }

    #[test]
    fn test_empty_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("empty.crt");
        std::fs::write(&cert, "").unwrap();
        let config = TlsConfig::with_certs(&cert, dir.path().join("none.key"));
        let err = config.build_acceptor().err().unwrap();
        assert!(err.to_string().contains("No certificates found"));
    }
}
