//! Router Composition
//!
//! Assembles the application router: registered routes first, then the
//! theme's static assets, then a terminal not-found handler for anything
//! neither of them answers.

use axum::handler::{Handler, HandlerWithoutStateExt};
use axum::Router;
use std::path::PathBuf;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Builder for the application router
pub struct RouterBuilder<S = ()> {
    router: Router<S>,
    static_dir: Option<PathBuf>,
}

impl<S> RouterBuilder<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a new router builder
    pub fn new() -> Self {
        Self::from_router(Router::new())
    }

    /// Start from an existing router
    pub fn from_router(router: Router<S>) -> Self {
        Self {
            router,
            static_dir: None,
        }
    }

    /// Serve files from `path` for requests no route matched
    pub fn static_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(path.into());
        self
    }

    /// Build the final router. `not_found` answers whatever neither the
    /// routes nor the static directory handle, for every method.
    pub fn build<H, T>(self, not_found: H) -> Router<S>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let not_found = not_found.into_service();

        match self.static_dir {
            Some(static_dir) if static_dir.is_dir() => {
                info!("Serving static files from: {:?}", static_dir);
                self.router.fallback_service(
                    ServeDir::new(static_dir)
                        .call_fallback_on_method_not_allowed(true)
                        .fallback(not_found),
                )
            }
            Some(static_dir) => {
                warn!("Static directory not found: {:?}", static_dir);
                self.router.fallback_service(not_found)
            }
            None => self.router.fallback_service(not_found),
        }
    }
}

impl<S> Default for RouterBuilder<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
