//! Shared request state
//!
//! One `EpicState` is created per application and cloned into every
//! handler. Locals sit behind a lock so import mutations made after startup
//! are visible to later renders.

use crate::errors::{ErrorRenderer, HttpError};
use crate::view::ViewEngine;
use axum::response::Html;
use epic_core::Environment;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Variable selecting the runtime mode.
pub const RUNTIME_MODE_VAR: &str = "EPIC_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Development,
    /// Error details are withheld from rendered error pages.
    Production,
}

impl RuntimeMode {
    pub fn from_env(env: &Environment) -> Self {
        match env.get_opt(RUNTIME_MODE_VAR) {
            Some(mode) if mode.trim().eq_ignore_ascii_case("production") => {
                RuntimeMode::Production
            }
            _ => RuntimeMode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeMode::Production)
    }
}

#[derive(Clone)]
pub struct EpicState {
    inner: Arc<StateInner>,
}

struct StateInner {
    env: Arc<Environment>,
    mode: RuntimeMode,
    upload_dir: PathBuf,
    locals: RwLock<Map<String, Value>>,
    views: OnceLock<ViewEngine>,
    error_renderer: OnceLock<ErrorRenderer>,
}

impl EpicState {
    pub fn new(env: Arc<Environment>, mode: RuntimeMode, upload_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(StateInner {
                env,
                mode,
                upload_dir,
                locals: RwLock::new(Map::new()),
                views: OnceLock::new(),
                error_renderer: OnceLock::new(),
            }),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.inner.env
    }

    pub fn mode(&self) -> RuntimeMode {
        self.inner.mode
    }

    pub fn upload_dir(&self) -> &Path {
        &self.inner.upload_dir
    }

    /// Snapshot of the application locals.
    pub fn locals(&self) -> Map<String, Value> {
        self.inner
            .locals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn local(&self, key: &str) -> Option<Value> {
        self.inner
            .locals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn replace_locals(&self, locals: Map<String, Value>) {
        *self
            .inner
            .locals
            .write()
            .unwrap_or_else(PoisonError::into_inner) = locals;
    }

    pub(crate) fn set_local(&self, key: &str, value: Value) {
        self.inner
            .locals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn views(&self) -> Option<&ViewEngine> {
        self.inner.views.get()
    }

    /// Returns `false` if an engine was already installed.
    pub(crate) fn install_views(&self, engine: ViewEngine) -> bool {
        self.inner.views.set(engine).is_ok()
    }

    pub fn error_renderer(&self) -> Option<&ErrorRenderer> {
        self.inner.error_renderer.get()
    }

    pub(crate) fn install_error_renderer(&self, renderer: ErrorRenderer) -> bool {
        self.inner.error_renderer.set(renderer).is_ok()
    }

    /// Render `view` with the application locals overlaid by `data`.
    pub fn render(&self, view: &str, data: Value) -> Result<Html<String>, HttpError> {
        let views = self
            .views()
            .ok_or_else(|| HttpError::internal("View engine not started"))?;

        let mut merged = self.locals();
        if let Value::Object(data) = data {
            merged.extend(data);
        }

        views
            .render(view, &Value::Object(merged))
            .map(Html)
            .map_err(HttpError::from)
    }
}
