//! Epic: a themed web application framework on axum
//!
//! ```ignore
//! use epic::prelude::*;
//!
//! let events = Arc::new(EventBus::new());
//! let mut epic = Epic::new(EpicOptions::default(), events.clone())?;
//! epic.init()?
//!     .start_view_engine(None, None)?
//!     .load_routes(error_renderer(render_error_view))?;
//! let app = epic.app()?;
//! ```
//!
//! # Modules
//!
//! - `epic`: The lifecycle controller
//! - `lifecycle`: Phases and transition errors
//! - `options`: Application and view engine options
//! - `state`: Shared request state and locals
//! - `view`: Handlebars view engine over the theme folders
//! - `errors`: HTTP errors and error rendering
//! - `routes`: Route units
//! - `uploads`: Multipart upload storage

pub mod epic;
pub mod errors;
pub mod lifecycle;
pub mod options;
pub mod routes;
pub mod state;
pub mod uploads;
pub mod view;

pub use crate::epic::Epic;
pub use errors::{
    error_renderer, render_error_view, render_error_view_with, ErrorContext, ErrorRenderer,
    HttpError,
};
pub use lifecycle::{LifecycleError, Phase};
pub use options::{CompilerOptions, EpicOptions, HelperSet, ViewEngineOptions};
pub use routes::{route_unit, FnRouteUnit, RouteUnit};
pub use state::{EpicState, RuntimeMode};
pub use uploads::{store_uploads, StoredFile, UploadSummary};
pub use view::{ViewEngine, ViewError};

// Re-export the layers below for applications
pub use epic_core;
pub use epic_http;

use std::path::PathBuf;

/// Errors raised while building an application.
#[derive(Debug, thiserror::Error)]
pub enum EpicError {
    #[error(transparent)]
    Core(#[from] epic_core::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("Failed to create {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EpicError>;

/// Prelude for applications built on Epic
pub mod prelude {
    pub use super::{
        error_renderer, render_error_view, render_error_view_with, route_unit, store_uploads,
        Epic, EpicOptions, EpicState, ErrorContext, HttpError, RouteUnit,
    };
    pub use epic_core::{EpicEvent, EventBus, EventKind, HeaderImport, HeaderKind, LinkTag, MetaTag, ScriptTag};
    pub use epic_http::axum::{
        extract::{Multipart, State},
        response::{Html, IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    pub use std::sync::Arc;
}
