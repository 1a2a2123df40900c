//! epic-http: HTTP/TLS plumbing for Epic applications
//!
//! Architecture:
//! ```text
//! epic-server binary
//!     └── epic (lifecycle controller)
//!         └── epic-http (this crate)
//!             ├── Middleware stack (CORS, secure headers, logging, compression)
//!             ├── HTTP → HTTPS redirect
//!             ├── Router assembly (routes → static assets → not found)
//!             ├── TLS termination (rustls)
//!             └── Listener bootstrap (HTTP + optional HTTPS / named pipe)
//! ```

pub mod middleware;
pub mod router;
pub mod server;
pub mod tls;

// Re-export main types
pub use middleware::{https_redirect_middleware, MiddlewareConfig, MiddlewareStack};
pub use router::RouterBuilder;
pub use server::{
    normalize_port, BindFailure, BoundServer, HttpServer, HttpServerBuilder, HttpsConfig,
    PortSpec, ServerConfig,
};
pub use tls::TlsConfig;

// Re-export axum for convenience - route units use this
pub use axum;
pub use tower;
pub use tower_http;

/// Error types for the HTTP server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("TLS configuration error: {0}")]
    TlsError(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Failed to bind {target}: {source}")]
    Bind {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Bind errors that should end the process with a friendly message.
    /// Everything else is meant to be propagated unchanged.
    pub fn bind_failure(&self) -> Option<BindFailure> {
        match self {
            ServerError::Bind { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => Some(BindFailure::PermissionDenied),
                std::io::ErrorKind::AddrInUse => Some(BindFailure::AddressInUse),
                _ => None,
            },
            _ => None,
        }
    }

    /// Target of a failed bind (`Port 80`, `Pipe /run/epic.sock`).
    pub fn bind_target(&self) -> Option<&str> {
        match self {
            ServerError::Bind { target, .. } => Some(target),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Prelude for convenient imports by other crates
pub mod prelude {
    pub use super::axum::{
        extract::{Json, Path, Query, State},
        response::{IntoResponse, Response},
        routing::{delete, get, post, put},
        Router,
    };
    pub use super::middleware::{MiddlewareConfig, MiddlewareStack};
    pub use super::router::RouterBuilder;
    pub use super::server::{HttpServer, HttpServerBuilder, PortSpec, ServerConfig};
    pub use super::tls::TlsConfig;
    pub use super::Result;
}
