//! HTTP/HTTPS Listener Bootstrap
//!
//! Binds one listener per configured protocol, reports `listening` through
//! the event bus, and serves the assembled application router on all of
//! them.

use crate::tls::TlsConfig;
use crate::{Result, ServerError};
use axum::Router;
use epic_core::{Environment, EpicEvent, EventBus, ListenInfo, Scheme};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// HTTP port used when neither `HTTP` nor `PORT` is set.
pub const DEFAULT_HTTP_PORT: &str = "3000";

/// Process exit status for fatal bind failures.
pub const BIND_FAILURE_EXIT_CODE: i32 = 1;

/// Pause before accepting again after a listener-level accept error.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A normalized port setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// TCP port number
    Port(u16),
    /// Named pipe (Unix domain socket path)
    Pipe(String),
    /// Negative or out-of-range number
    Invalid,
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Port(port) => write!(f, "Port {}", port),
            PortSpec::Pipe(path) => write!(f, "Pipe {}", path),
            PortSpec::Invalid => f.write_str("Invalid port"),
        }
    }
}

/// Normalize a port value: numbers become ports, anything non-numeric is a
/// named pipe, negative or oversized numbers are invalid.
pub fn normalize_port(value: &str) -> PortSpec {
    let value = value.trim();
    match value.parse::<i64>() {
        Ok(port) => u16::try_from(port).map_or(PortSpec::Invalid, PortSpec::Port),
        Err(_) if value.is_empty() => PortSpec::Invalid,
        Err(_) => PortSpec::Pipe(value.to_string()),
    }
}

/// Bind errors that terminate the process with a friendly message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindFailure {
    PermissionDenied,
    AddressInUse,
}

impl BindFailure {
    pub fn message(&self, target: &str) -> String {
        match self {
            BindFailure::PermissionDenied => format!("{} requires elevated privileges", target),
            BindFailure::AddressInUse => format!("{} is already in use", target),
        }
    }

    pub fn exit_code(&self) -> i32 {
        BIND_FAILURE_EXIT_CODE
    }
}

/// HTTPS listener settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpsConfig {
    pub port: PortSpec,
    pub tls: TlsConfig,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind host
    pub bind_host: String,
    /// Public hostname for logging/display
    pub public_host: String,
    /// HTTP listener
    pub http: PortSpec,
    /// HTTPS listener, if enabled
    pub https: Option<HttpsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            public_host: gethostname::gethostname().to_string_lossy().to_string(),
            http: normalize_port(DEFAULT_HTTP_PORT),
            https: None,
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `HTTP` (falling back to `PORT`), `HTTPS` and the TLS
    /// file settings.
    pub fn from_env(env: &Environment) -> Self {
        let http = env
            .get_opt("HTTP")
            .or_else(|| env.get_opt("PORT"))
            .unwrap_or(DEFAULT_HTTP_PORT);

        Self {
            bind_host: env.get_or("HOST", "0.0.0.0"),
            http: normalize_port(http),
            https: env.get_opt("HTTPS").map(|port| HttpsConfig {
                port: normalize_port(port),
                tls: TlsConfig::from_env(env),
            }),
            ..Self::default()
        }
    }
}

/// Central HTTP Server
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new server builder
    pub fn builder() -> HttpServerBuilder {
        HttpServerBuilder::new()
    }

    /// Server for `router` configured from the environment.
    pub fn from_env(env: &Environment, router: Router) -> Self {
        Self {
            config: ServerConfig::from_env(env),
            router,
        }
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind every configured listener, emitting `listening` for each one.
    ///
    /// TLS material is loaded before the HTTPS port is bound so a broken
    /// certificate never leaves a half-started server behind.
    pub async fn bind(self, events: &EventBus) -> Result<BoundServer> {
        let acceptor = match &self.config.https {
            Some(https) => Some(https.tls.build_acceptor()?),
            None => None,
        };

        let mut listeners = Vec::new();

        let http = bind_listener(&self.config.bind_host, &self.config.http).await?;
        announce(events, Scheme::Http, &http, &self.config.public_host);
        listeners.push(BoundListener {
            scheme: Scheme::Http,
            listener: http,
            tls: None,
        });

        if let (Some(https), Some(acceptor)) = (&self.config.https, acceptor) {
            let listener = bind_listener(&self.config.bind_host, &https.port).await?;
            announce(events, Scheme::Https, &listener, &self.config.public_host);
            listeners.push(BoundListener {
                scheme: Scheme::Https,
                listener,
                tls: Some(acceptor),
            });
        } else {
            info!("TLS disabled - using HTTP only");
        }

        Ok(BoundServer {
            listeners,
            router: self.router,
        })
    }
}

fn announce(events: &EventBus, scheme: Scheme, listener: &Listener, public_host: &str) {
    let bind = listener.describe();
    info!("{} server listening on {}", scheme.as_str().to_uppercase(), bind);
    if let Listener::Tcp(tcp) = listener {
        if let Ok(addr) = tcp.local_addr() {
            info!("Public URL: {}://{}:{}", scheme, public_host, addr.port());
        }
    }
    events.emit(EpicEvent::Listening(ListenInfo { scheme, bind }));
}

async fn bind_listener(host: &str, port: &PortSpec) -> Result<Listener> {
    match port {
        PortSpec::Port(number) => TcpListener::bind((host, *number))
            .await
            .map(Listener::Tcp)
            .map_err(|source| ServerError::Bind {
                target: port.to_string(),
                source,
            }),
        #[cfg(unix)]
        PortSpec::Pipe(path) => tokio::net::UnixListener::bind(path)
            .map(|listener| Listener::Unix(listener, path.clone()))
            .map_err(|source| ServerError::Bind {
                target: port.to_string(),
                source,
            }),
        #[cfg(not(unix))]
        PortSpec::Pipe(path) => Err(ServerError::InvalidPort(format!(
            "named pipes are not supported on this platform: {}",
            path
        ))),
        PortSpec::Invalid => Err(ServerError::InvalidPort(port.to_string())),
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, String),
}

impl Listener {
    fn describe(&self) -> String {
        match self {
            Listener::Tcp(tcp) => match tcp.local_addr() {
                Ok(addr) => format!("port {}", addr.port()),
                Err(_) => "port ?".to_string(),
            },
            #[cfg(unix)]
            Listener::Unix(_, path) => format!("pipe {}", path),
        }
    }
}

struct BoundListener {
    scheme: Scheme,
    listener: Listener,
    tls: Option<TlsAcceptor>,
}

/// Listeners that are bound but not yet accepting connections.
pub struct BoundServer {
    listeners: Vec<BoundListener>,
    router: Router,
}

impl BoundServer {
    /// TCP addresses of the bound listeners.
    pub fn local_addrs(&self) -> Vec<(Scheme, SocketAddr)> {
        self.listeners
            .iter()
            .filter_map(|bound| match &bound.listener {
                Listener::Tcp(tcp) => tcp.local_addr().ok().map(|addr| (bound.scheme, addr)),
                #[cfg(unix)]
                Listener::Unix(..) => None,
            })
            .collect()
    }

    /// Serve every listener until one of them fails.
    pub async fn serve(self) -> Result<()> {
        let mut tasks = JoinSet::new();
        for bound in self.listeners {
            tasks.spawn(run_listener(bound, self.router.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| ServerError::Io(io::Error::other(e)))??;
        }
        Ok(())
    }
}

async fn run_listener(bound: BoundListener, router: Router) -> Result<()> {
    let scheme = bound.scheme;
    match (bound.listener, bound.tls) {
        (Listener::Tcp(listener), None) => axum::serve(listener, router)
            .await
            .map_err(ServerError::Io),
        (Listener::Tcp(listener), Some(acceptor)) => loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    accept_failed(scheme, e).await;
                    continue;
                }
            };
            let acceptor = acceptor.clone();
            let router = router.clone();

            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        serve_connection(tls_stream, router, scheme, peer_addr.to_string()).await
                    }
                    Err(e) => {
                        debug!("TLS handshake error from {}: {}", peer_addr, e);
                    }
                }
            });
        },
        #[cfg(unix)]
        (Listener::Unix(listener, path), _) => loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    accept_failed(scheme, e).await;
                    continue;
                }
            };
            let router = router.clone();
            let peer = path.clone();
            tokio::spawn(serve_connection(stream, router, scheme, peer));
        },
    }
}

/// Errors tied to a single incoming connection.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Keep the listener alive: connection errors are retried at once, anything
/// else (out of file descriptors, ...) after [`ACCEPT_RETRY_DELAY`].
async fn accept_failed(scheme: Scheme, e: io::Error) {
    if is_connection_error(&e) {
        debug!("{} accept error: {}", scheme, e);
        return;
    }
    warn!("{} accept error: {}, retrying in {:?}", scheme, e, ACCEPT_RETRY_DELAY);
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

/// Serve one connection, tagging every request with the listener's scheme.
async fn serve_connection<I>(io: I, router: Router, scheme: Scheme, peer: String)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = router.map_request(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(scheme);
        request
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(service))
        .await
    {
        debug!("Connection error from {}: {}", peer, e);
    }
}

/// Builder for HttpServer
pub struct HttpServerBuilder {
    config: ServerConfig,
    router: Option<Router>,
}

impl HttpServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            router: None,
        }
    }

    /// Set bind host
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.bind_host = host.into();
        self
    }

    /// Set HTTP port
    pub fn http_port(mut self, port: PortSpec) -> Self {
        self.config.http = port;
        self
    }

    /// Enable HTTPS on `port` with the given certificates
    pub fn https(mut self, port: PortSpec, tls: TlsConfig) -> Self {
        self.config.https = Some(HttpsConfig { port, tls });
        self
    }

    /// Set public hostname
    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.config.public_host = host.into();
        self
    }

    /// Set the router
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Build the server
    pub fn build(self) -> HttpServer {
        HttpServer {
            config: self.config,
            router: self.router.unwrap_or_default(),
        }
    }
}

impl Default for HttpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epic_core::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_normalize_port() {
        assert_eq!(normalize_port("8080"), PortSpec::Port(8080));
        assert_eq!(normalize_port(" 0 "), PortSpec::Port(0));
        assert_eq!(normalize_port("-1"), PortSpec::Invalid);
        assert_eq!(normalize_port("70000"), PortSpec::Invalid);
        assert_eq!(normalize_port(""), PortSpec::Invalid);
        assert_eq!(
            normalize_port("/run/epic.sock"),
            PortSpec::Pipe("/run/epic.sock".to_string())
        );
    }

    #[test]
    fn test_port_display() {
        assert_eq!(PortSpec::Port(80).to_string(), "Port 80");
        assert_eq!(PortSpec::Pipe("epic".into()).to_string(), "Pipe epic");
    }

    #[test]
    fn test_config_from_env() {
        let env = Environment::from_pairs([("PORT", "4000")]);
        let config = ServerConfig::from_env(&env);
        assert_eq!(config.http, PortSpec::Port(4000));
        assert!(config.https.is_none());

        let env = Environment::from_pairs([("HTTP", "80"), ("PORT", "4000"), ("HTTPS", "443")]);
        let config = ServerConfig::from_env(&env);
        assert_eq!(config.http, PortSpec::Port(80));
        let https = config.https.unwrap();
        assert_eq!(https.port, PortSpec::Port(443));
        assert!(https.tls.cert_path.ends_with("server.crt"));

        let config = ServerConfig::from_env(&Environment::default());
        assert_eq!(config.http, PortSpec::Port(3000));
        assert_eq!(config.bind_host, "0.0.0.0");
    }

    #[test]
    fn test_bind_failure_messages() {
        assert_eq!(
            BindFailure::AddressInUse.message("Port 80"),
            "Port 80 is already in use"
        );
        assert_eq!(
            BindFailure::PermissionDenied.message("Port 80"),
            "Port 80 requires elevated privileges"
        );
        assert_eq!(BindFailure::AddressInUse.exit_code(), 1);
    }

    fn counting_bus() -> (EventBus, Arc<AtomicUsize>) {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        bus.on(EventKind::Listening, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (bus, count)
    }

    #[tokio::test]
    async fn test_address_in_use_is_fatal_and_silent() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let (bus, count) = counting_bus();

        let server = HttpServer::builder()
            .bind_host("127.0.0.1")
            .http_port(PortSpec::Port(port))
            .build();
        let err = match server.bind(&bus).await {
            Ok(_) => panic!("bind should fail while the port is taken"),
            Err(err) => err,
        };

        assert_eq!(err.bind_failure(), Some(BindFailure::AddressInUse));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_port_is_not_a_bind_failure() {
        let (bus, count) = counting_bus();
        let server = HttpServer::builder().http_port(PortSpec::Invalid).build();
        let err = match server.bind(&bus).await {
            Ok(_) => panic!("invalid port should not bind"),
            Err(err) => err,
        };
        assert!(matches!(err, ServerError::InvalidPort(_)));
        assert_eq!(err.bind_failure(), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_bind_emits_listening() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on(EventKind::Listening, move |event| {
            if let EpicEvent::Listening(info) = event {
                sink.lock().unwrap().push(info.clone());
            }
        });

        let bound = HttpServer::builder()
            .bind_host("127.0.0.1")
            .http_port(PortSpec::Port(0))
            .build()
            .bind(&bus)
            .await
            .unwrap();

        let addrs = bound.local_addrs();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].0, Scheme::Http);
        assert_ne!(addrs[0].1.port(), 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].scheme, Scheme::Http);
        assert_eq!(seen[0].bind, format!("port {}", addrs[0].1.port()));
    }

    #[tokio::test]
    async fn test_broken_tls_fails_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, count) = counting_bus();
        let server = HttpServer::builder()
            .bind_host("127.0.0.1")
            .http_port(PortSpec::Port(0))
            .https(
                PortSpec::Port(0),
                TlsConfig::with_certs(dir.path().join("a.crt"), dir.path().join("a.key")),
            )
            .build();

        let err = match server.bind(&bus).await {
            Ok(_) => panic!("missing certificates should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, ServerError::CertificateError(_)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_connection_errors_are_per_socket() {
        assert!(is_connection_error(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_connection_error(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_connection_error(&io::Error::other("too many open files")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_failure_backs_off_instead_of_failing() {
        let start = tokio::time::Instant::now();
        accept_failed(Scheme::Https, io::Error::from(io::ErrorKind::ConnectionReset)).await;
        assert!(start.elapsed() < ACCEPT_RETRY_DELAY);

        accept_failed(Scheme::Https, io::Error::other("too many open files")).await;
        assert!(start.elapsed() >= ACCEPT_RETRY_DELAY);
    }
}
