//! Lifecycle Controller
//!
//! `Epic` owns the theme, the environment and the router under
//! construction. Startup happens in three explicit steps:
//!
//! ```text
//! Epic::new ─► init ─► start_view_engine ─► load_routes ─► app()
//!              │                             │
//!              ├ emits initialize            ├ HTTP→HTTPS redirect (80/443)
//!              ├ upload dir, static assets   ├ route units (by name)
//!              ├ locals                      ├ 404 + error renderer
//!              └ emits initialized           └ emits ready
//! ```

use crate::errors::{error_middleware, not_found, panic_response, ErrorRenderer};
use crate::lifecycle::{self, Phase};
use crate::options::{CompilerOptions, EpicOptions, HelperSet};
use crate::routes::load_order;
use crate::state::{EpicState, RuntimeMode};
use crate::uploads::resolve_upload_dir;
use crate::view::{ViewEngine, ViewSettings};
use crate::{EpicError, Result};
use axum::middleware;
use axum::routing::MethodRouter;
use axum::Router;
use epic_core::{
    EpicEvent, EventBus, HeaderImport, HeaderKind, Environment, RenderedImports, ScriptTag, Theme,
    ThemeResolver,
};
use epic_http::{https_redirect_middleware, MiddlewareStack, RouterBuilder};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, info, warn};

pub const DEFAULT_SITE_NAME: &str = "Epic";
pub const DEFAULT_SITE_DESCRIPTION: &str =
    "A framework for powerful web applications with an axum backend and a Handlebars template engine.";
pub const DEFAULT_SITE_AUTHOR_NAME: &str = "Epic";
pub const DEFAULT_SITE_AUTHOR_CONTACT: &str = "";
pub const DEFAULT_SITE_LANG: &str = "en";
pub const DEFAULT_SITE_CHARSET: &str = "UTF-8";

/// The application lifecycle controller.
pub struct Epic {
    options: EpicOptions,
    env: Arc<Environment>,
    events: Arc<EventBus>,
    theme: Theme,
    state: EpicState,
    phase: Phase,
    router: Router<EpicState>,
    rendered: RenderedImports,
    static_dir: Option<PathBuf>,
    redirect_https: bool,
}

impl Epic {
    /// Load the environment from `options.env_file` and resolve the theme.
    pub fn new(options: EpicOptions, events: Arc<EventBus>) -> Result<Self> {
        let env = Environment::load(&options.env_file)?;
        Self::with_environment(options, env, events)
    }

    /// Like [`Epic::new`] with an already loaded environment.
    pub fn with_environment(
        options: EpicOptions,
        env: Environment,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let theme = ThemeResolver::new(&options.themes_folder)
            .seo_tags(options.view_engine.seo_tags)
            .resolve_from_env(&env)?;

        let mode = RuntimeMode::from_env(&env);
        let upload_dir = resolve_upload_dir(&env, options.default_upload_dir.as_deref());
        let env = Arc::new(env);
        let state = EpicState::new(env.clone(), mode, upload_dir);
        let rendered = theme.config.imports.render();

        info!(
            "Epic created with theme '{}' ({:?} mode)",
            theme.name, mode
        );

        Ok(Self {
            options,
            env,
            events,
            theme,
            state,
            phase: Phase::Constructed,
            router: Router::new(),
            rendered,
            static_dir: None,
            redirect_https: false,
        })
    }

    /// Prepare middleware, static assets, the upload directory and locals.
    pub fn init(&mut self) -> Result<&mut Self> {
        lifecycle::check_init(self.phase)?;
        self.events.emit(EpicEvent::Initialize);

        debug!("Middleware: {:?}", self.options.middleware);

        let upload_dir = self.state.upload_dir();
        std::fs::create_dir_all(upload_dir).map_err(|source| EpicError::Io {
            path: upload_dir.to_path_buf(),
            source,
        })?;
        debug!("Uploads stored in {}", upload_dir.display());

        let static_dir = self.theme.subdir(&self.options.static_assets_folder);
        info!("Static assets: {}", static_dir.display());
        self.static_dir = Some(static_dir);

        let locals = self.build_locals()?;
        self.state.replace_locals(locals);

        self.phase = Phase::Initialized;
        self.events.emit(EpicEvent::Initialized);
        Ok(self)
    }

    /// Compile the theme's templates. Caller helpers and compiler options
    /// are merged over the configured ones.
    pub fn start_view_engine(
        &mut self,
        helpers: Option<HelperSet>,
        compiler_options: Option<CompilerOptions>,
    ) -> Result<&mut Self> {
        lifecycle::check_start_view_engine(self.phase)?;

        let view_engine = &mut self.options.view_engine;
        let compiler_options = match compiler_options {
            Some(overrides) => view_engine.compiler_options.merge(&overrides),
            None => view_engine.compiler_options,
        };

        let settings = ViewSettings {
            views_dir: self.theme.subdir(&view_engine.views_folder),
            layouts_dir: self.theme.subdir(&view_engine.layouts_folder),
            partials_dir: self.theme.subdir(&view_engine.partials_folder),
            extname: view_engine.extname.clone(),
            default_layout: view_engine.default_layout.clone(),
            compiler_options,
        };
        // Configured helpers stay in the options until the templates compile.
        let mut engine = ViewEngine::new(settings)?;

        let mut merged_helpers = std::mem::take(&mut view_engine.helpers);
        if let Some(helpers) = helpers {
            merged_helpers.extend(helpers);
        }
        engine.register_helpers(merged_helpers);
        if !self.state.install_views(engine) {
            return Err(lifecycle::LifecycleError::EngineAlreadyStarted.into());
        }

        self.phase = Phase::ViewEngineReady;
        Ok(self)
    }

    /// Register every route unit and the terminal 404 / error handling.
    pub fn load_routes(&mut self, error_renderer: ErrorRenderer) -> Result<&mut Self> {
        lifecycle::check_load_routes(self.phase)?;

        self.redirect_https = wants_https_redirect(&self.env);
        if self.redirect_https {
            info!("Redirecting HTTP to HTTPS");
        }

        let mut units = std::mem::take(&mut self.options.routes);
        load_order(&mut units);
        for unit in &units {
            debug!("Loading route unit '{}'", unit.name());
            unit.register(self);
        }
        info!("Loaded {} route unit(s)", units.len());
        self.options.routes = units;

        if !self.state.install_error_renderer(error_renderer) {
            return Err(lifecycle::LifecycleError::RoutesAlreadyLoaded.into());
        }

        self.phase = Phase::RoutesLoaded;
        self.events.emit(EpicEvent::Ready);
        Ok(self)
    }

    // === Route registration ===

    pub fn route(&mut self, path: &str, method_router: MethodRouter<EpicState>) -> &mut Self {
        self.router = std::mem::take(&mut self.router).route(path, method_router);
        self
    }

    pub fn merge(&mut self, router: Router<EpicState>) -> &mut Self {
        self.router = std::mem::take(&mut self.router).merge(router);
        self
    }

    pub fn nest(&mut self, path: &str, router: Router<EpicState>) -> &mut Self {
        self.router = std::mem::take(&mut self.router).nest(path, router);
        self
    }

    // === Imports ===

    pub fn add_header_import(&mut self, id: impl Into<String>, import: HeaderImport) -> &mut Self {
        self.theme.config.imports.insert_header(id, import);
        self.refresh_imports();
        self
    }

    /// Remove `id` from one header collection, or all of them.
    pub fn remove_header_import(&mut self, id: &str, kind: Option<HeaderKind>) -> &mut Self {
        self.theme.config.imports.remove_header(id, kind);
        self.refresh_imports();
        self
    }

    pub fn add_footer_import(&mut self, id: impl Into<String>, tag: ScriptTag) -> &mut Self {
        self.theme.config.imports.insert_footer(id, tag);
        self.refresh_imports();
        self
    }

    pub fn remove_footer_import(&mut self, id: &str) -> &mut Self {
        self.theme.config.imports.remove_footer(id);
        self.refresh_imports();
        self
    }

    /// The assembled application: routes, static assets, 404, error
    /// rendering, HTTPS redirect and the middleware stack.
    pub fn app(&self) -> Result<Router> {
        lifecycle::check_app(self.phase)?;

        let mut builder = RouterBuilder::from_router(self.router.clone());
        if let Some(static_dir) = &self.static_dir {
            builder = builder.static_dir(static_dir.clone());
        }

        let router = builder
            .build(not_found)
            .layer(CatchPanicLayer::custom(panic_response))
            .with_state(self.state.clone());

        let state = self.state.clone();
        let redirect_https = self.redirect_https;
        let stack = MiddlewareStack::new(self.options.middleware.clone());
        Ok(stack.apply_with(router, move |router| {
            let router = router.layer(middleware::from_fn_with_state(state, error_middleware));
            if redirect_https {
                router.layer(middleware::from_fn(https_redirect_middleware))
            } else {
                router
            }
        }))
    }

    // === Accessors ===

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rendered_imports(&self) -> &RenderedImports {
        &self.rendered
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn state(&self) -> &EpicState {
        &self.state
    }

    pub fn options(&self) -> &EpicOptions {
        &self.options
    }

    pub fn locals(&self) -> Map<String, Value> {
        self.state.locals()
    }

    pub fn upload_dir(&self) -> &Path {
        self.state.upload_dir()
    }

    pub fn redirects_to_https(&self) -> bool {
        self.redirect_https
    }

    fn build_locals(&self) -> Result<Map<String, Value>> {
        let env = &self.env;
        let site = json!({
            "name": env.get_or("SITE_NAME", DEFAULT_SITE_NAME),
            "description": env.get_or("SITE_DESCRIPTION", DEFAULT_SITE_DESCRIPTION),
            "author": {
                "name": env.get_or("SITE_AUTHOR_NAME", DEFAULT_SITE_AUTHOR_NAME),
                "contact": env.get_or("SITE_AUTHOR_CONTACT", DEFAULT_SITE_AUTHOR_CONTACT),
            },
            "lang": env.get_or("SITE_LANG", DEFAULT_SITE_LANG),
            "charset": env.get_or("SITE_CHARSET", DEFAULT_SITE_CHARSET),
        });

        let mut variables = self.theme.config.variables.clone();
        for (key, value) in env.iter() {
            variables.insert(key.to_string(), Value::String(value.to_string()));
        }

        let mut locals = Map::new();
        locals.insert("site".to_string(), site);
        locals.insert("theme".to_string(), serde_json::to_value(&self.theme.config)?);
        locals.insert("env".to_string(), Value::Object(variables));
        locals.insert("imports".to_string(), serde_json::to_value(&self.rendered)?);
        locals.extend(self.options.locals.clone());
        Ok(locals)
    }

    fn refresh_imports(&mut self) {
        self.rendered = self.theme.config.imports.render();
        if self.phase >= Phase::Initialized {
            self.publish("imports", &self.rendered);
            self.publish("theme", &self.theme.config);
        }
    }

    fn publish(&self, key: &str, value: &impl Serialize) {
        match serde_json::to_value(value) {
            Ok(value) => self.state.set_local(key, value),
            Err(e) => warn!("Failed to publish local '{}': {}", key, e),
        }
    }
}

/// The redirect is only installed for the standard port pair.
fn wants_https_redirect(env: &Environment) -> bool {
    env.get_int("HTTP") == Some(80) && env.get_int("HTTPS") == Some(443)
}
