//! Core types for the Epic web framework
//!
//! # Modules
//!
//! - `config`: Environment loading (`.env` + process environment)
//! - `error`: Error types and Result alias
//! - `events`: Namespaced lifecycle event bus
//! - `imports`: Theme `<meta>/<link>/<script>` declarations and rendering
//! - `theme`: Theme discovery and manifest loading

pub mod config;
pub mod error;
pub mod events;
pub mod imports;
pub mod theme;

// Re-exports
pub use config::Environment;
pub use error::{Error, Result};
pub use events::{EpicEvent, EventBus, EventKind, ListenInfo, Scheme, EVENT_NAMESPACE};
pub use imports::{
    merge_imports, HeaderImport, HeaderKind, ImportDeclarations, LinkTag, MetaTag,
    RenderedImports, ScriptTag,
};
pub use theme::{Theme, ThemeConfig, ThemeResolver, DEFAULT_THEME};
