//! Shared Middleware Stack
//!
//! Centralized middleware configuration applied to the assembled application
//! router: CORS, secure headers, request logging, body limit, timeout,
//! compression and tracing. The HTTP→HTTPS redirect lives here too but is
//! installed by the lifecycle controller, ahead of the routes.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use epic_core::Scheme;
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, Level};

/// Default request body limit (10 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Middleware configuration
#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    /// Enable CORS (default: true)
    pub cors_enabled: bool,
    /// CORS allowed origins (None = any)
    pub cors_origins: Option<Vec<String>>,
    /// Enable request tracing (default: true)
    pub tracing_enabled: bool,
    /// Enable response compression (default: true)
    pub compression_enabled: bool,
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Enable security headers (default: true)
    pub security_headers: bool,
    /// Optional Content-Security-Policy value; not sent when `None`
    pub content_security_policy: Option<String>,
    /// Enable request logging (default: true)
    pub request_logging: bool,
    /// Maximum request body size in bytes (default: 10 MiB)
    pub body_limit: usize,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            cors_enabled: true,
            cors_origins: None,
            tracing_enabled: true,
            compression_enabled: true,
            timeout: Duration::from_secs(30),
            security_headers: true,
            content_security_policy: None,
            request_logging: true,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors_enabled = enabled;
        self
    }

    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    pub fn security_headers(mut self, enabled: bool) -> Self {
        self.security_headers = enabled;
        self
    }

    pub fn content_security_policy(mut self, policy: impl Into<String>) -> Self {
        self.content_security_policy = Some(policy.into());
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }
}

/// Middleware stack that can be applied to a router
pub struct MiddlewareStack {
    config: MiddlewareConfig,
}

impl MiddlewareStack {
    pub fn new(config: MiddlewareConfig) -> Self {
        Self { config }
    }

    /// Apply the middleware stack to a router
    pub fn apply(self, router: Router) -> Router {
        self.apply_with(router, |router| router)
    }

    /// Apply the stack with `handle_errors` wrapped directly around the body
    /// limit and timeout, so the failures those produce pass through it
    /// while the outer layers still see its responses.
    pub fn apply_with<F>(self, router: Router, handle_errors: F) -> Router
    where
        F: FnOnce(Router) -> Router,
    {
        let router = router
            .layer(DefaultBodyLimit::max(self.config.body_limit))
            .layer(TimeoutLayer::new(self.config.timeout));
        let mut router = handle_errors(router);

        // Security headers (runs first on response)
        if self.config.security_headers {
            let csp = self
                .config
                .content_security_policy
                .as_deref()
                .and_then(|policy| HeaderValue::from_str(policy).ok());
            router = router.layer(middleware::from_fn_with_state(
                csp,
                security_headers_middleware,
            ));
        }

        // Request logging
        if self.config.request_logging {
            router = router.layer(middleware::from_fn(request_logging_middleware));
        }

        // Compression
        if self.config.compression_enabled {
            router = router.layer(CompressionLayer::new());
        }

        // Tracing
        if self.config.tracing_enabled {
            router = router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            );
        }

        // CORS (outermost - runs first on request)
        if self.config.cors_enabled {
            let cors = if let Some(ref origins) = self.config.cors_origins {
                let origins: Vec<_> = origins
                    .iter()
                    .filter_map(|o| o.parse().ok())
                    .collect();
                CorsLayer::new()
                    .allow_origin(origins)
                    .allow_methods(Any)
                    .allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            };
            router = router.layer(cors);
        }

        router
    }
}

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-xss-protection", "0"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
];

/// Security headers middleware. Headers already set by a handler are kept.
async fn security_headers_middleware(
    State(csp): State<Option<HeaderValue>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    for &(name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert(HeaderValue::from_static(value));
    }
    if let Some(csp) = csp {
        headers
            .entry(header::CONTENT_SECURITY_POLICY)
            .or_insert(csp);
    }
    headers.remove(header::SERVER);

    response
}

/// Request logging middleware
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    // Log at appropriate level based on status
    if status.is_server_error() {
        tracing::error!(
            "{} {} {:?} {} - {}ms",
            method,
            uri,
            version,
            status.as_u16(),
            duration.as_millis()
        );
    } else if status.is_client_error() {
        tracing::warn!(
            "{} {} {:?} {} - {}ms",
            method,
            uri,
            version,
            status.as_u16(),
            duration.as_millis()
        );
    } else {
        tracing::info!(
            "{} {} {:?} {} - {}ms",
            method,
            uri,
            version,
            status.as_u16(),
            duration.as_millis()
        );
    }

    response
}

/// Redirect plain-HTTP requests to the same host and path over HTTPS.
///
/// Requests served by the TLS listener carry [`Scheme::Https`] in their
/// extensions; requests forwarded by a proxy are recognised by
/// `X-Forwarded-Proto: https`. Both pass through untouched.
pub async fn https_redirect_middleware(request: Request<Body>, next: Next) -> Response {
    if is_secure(&request) {
        return next.run(request).await;
    }

    let Some(host) = request_host(request.headers()) else {
        return next.run(request).await;
    };

    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("https://{}{}", host, path);
    debug!("Redirecting {} to {}", request.uri(), location);

    match HeaderValue::from_str(&location) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn is_secure(request: &Request<Body>) -> bool {
    if request.extensions().get::<Scheme>() == Some(&Scheme::Https) {
        return true;
    }
    request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Host header without its port.
fn request_host(headers: &HeaderMap) -> Option<&str> {
    let host = headers.get(header::HOST)?.to_str().ok()?.trim();
    if host.is_empty() {
        return None;
    }
    if host.starts_with('[') {
        // IPv6 literal
        return host.find(']').map(|end| &host[..=end]);
    }
    Some(host.split_once(':').map_or(host, |(name, _)| name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new().route("/", get(|| async { "home" }))
    }

    fn redirecting_app() -> Router {
        app().layer(middleware::from_fn(https_redirect_middleware))
    }

    #[tokio::test]
    async fn test_security_headers_applied() {
        let router = MiddlewareStack::new(MiddlewareConfig::default()).apply(app());
        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert!(headers.get(header::CONTENT_SECURITY_POLICY).is_none());
    }

    #[tokio::test]
    async fn test_security_headers_can_be_disabled() {
        let config = MiddlewareConfig::new()
            .security_headers(false)
            .compression(false);
        let response = MiddlewareStack::new(config).apply(app())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().get("x-frame-options").is_none());
    }

    #[tokio::test]
    async fn test_content_security_policy_header() {
        let config = MiddlewareConfig::new().content_security_policy("default-src 'self'");
        let response = MiddlewareStack::new(config).apply(app())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_SECURITY_POLICY],
            "default-src 'self'"
        );
    }

    #[tokio::test]
    async fn test_https_redirect_for_plain_http() {
        let response = redirecting_app()
            .oneshot(
                Request::get("/page?x=1")
                    .header(header::HOST, "example.com:80")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://example.com/page?x=1"
        );
    }

    #[tokio::test]
    async fn test_https_redirect_skips_secure_requests() {
        let mut request = Request::get("/")
            .header(header::HOST, "example.com")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(Scheme::Https);
        let response = redirecting_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let forwarded = Request::get("/")
            .header(header::HOST, "example.com")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        let response = redirecting_app().oneshot(forwarded).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_request_host_strips_port() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("example.com:8080"));
        assert_eq!(request_host(&headers), Some("example.com"));

        headers.insert(header::HOST, HeaderValue::from_static("[::1]:80"));
        assert_eq!(request_host(&headers), Some("[::1]"));

        headers.insert(header::HOST, HeaderValue::from_static("example.com"));
        assert_eq!(request_host(&headers), Some("example.com"));
    }
}
