//! Epic configuration
//!
//! Options are supplied once to [`Epic::new`](crate::Epic::new). Folder
//! names are relative to the working directory (`themes_folder`) or to the
//! resolved theme directory (everything else).

use crate::routes::RouteUnit;
use epic_http::MiddlewareConfig;
use handlebars::HelperDef;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Template helpers by name. Later entries replace earlier ones.
pub type HelperSet = IndexMap<String, Box<dyn HelperDef + Send + Sync>>;

/// Handlebars compiler switches. `None` leaves the engine default in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Fail on missing fields instead of rendering nothing
    pub strict: Option<bool>,
    /// Do not indent nested partial output
    pub prevent_indent: Option<bool>,
    /// Re-read templates from disk on every render
    pub dev_mode: Option<bool>,
    /// Disable HTML escaping of `{{value}}`
    pub no_escape: Option<bool>,
}

impl CompilerOptions {
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = Some(enabled);
        self
    }

    pub fn prevent_indent(mut self, enabled: bool) -> Self {
        self.prevent_indent = Some(enabled);
        self
    }

    pub fn dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = Some(enabled);
        self
    }

    pub fn no_escape(mut self, enabled: bool) -> Self {
        self.no_escape = Some(enabled);
        self
    }

    /// Field-by-field merge; values set in `overrides` win.
    pub fn merge(&self, overrides: &CompilerOptions) -> CompilerOptions {
        CompilerOptions {
            strict: overrides.strict.or(self.strict),
            prevent_indent: overrides.prevent_indent.or(self.prevent_indent),
            dev_mode: overrides.dev_mode.or(self.dev_mode),
            no_escape: overrides.no_escape.or(self.no_escape),
        }
    }
}

pub struct ViewEngineOptions {
    /// Template file extension, including the dot
    pub extname: String,
    pub views_folder: String,
    pub layouts_folder: String,
    pub partials_folder: String,
    /// Layout applied when a render does not pick one
    pub default_layout: Option<String>,
    pub helpers: HelperSet,
    pub compiler_options: CompilerOptions,
    /// Inject `META_*` environment values as OpenGraph meta imports
    pub seo_tags: bool,
}

impl Default for ViewEngineOptions {
    fn default() -> Self {
        Self {
            extname: ".hbs".to_string(),
            views_folder: "views".to_string(),
            layouts_folder: "layouts".to_string(),
            partials_folder: "partials".to_string(),
            default_layout: Some("main".to_string()),
            helpers: HelperSet::new(),
            compiler_options: CompilerOptions::default(),
            seo_tags: false,
        }
    }
}

impl fmt::Debug for ViewEngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewEngineOptions")
            .field("extname", &self.extname)
            .field("views_folder", &self.views_folder)
            .field("layouts_folder", &self.layouts_folder)
            .field("partials_folder", &self.partials_folder)
            .field("default_layout", &self.default_layout)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("compiler_options", &self.compiler_options)
            .field("seo_tags", &self.seo_tags)
            .finish()
    }
}

/// Options for an [`Epic`](crate::Epic) application.
pub struct EpicOptions {
    /// Directory holding one sub-directory per theme
    pub themes_folder: PathBuf,
    /// Dotfile merged under the process environment
    pub env_file: PathBuf,
    pub view_engine: ViewEngineOptions,
    /// Theme folder served as static files
    pub static_assets_folder: String,
    /// Route units, invoked by `load_routes` in name order
    pub routes: Vec<Box<dyn RouteUnit>>,
    /// Upload directory when `UPLOADDIR` is not set
    pub default_upload_dir: Option<PathBuf>,
    /// Extra locals merged over the generated ones
    pub locals: Map<String, Value>,
    pub middleware: MiddlewareConfig,
}

impl Default for EpicOptions {
    fn default() -> Self {
        Self {
            themes_folder: PathBuf::from("themes"),
            env_file: PathBuf::from(epic_core::config::DEFAULT_ENV_FILE),
            view_engine: ViewEngineOptions::default(),
            static_assets_folder: "assets".to_string(),
            routes: Vec::new(),
            default_upload_dir: None,
            locals: Map::new(),
            middleware: MiddlewareConfig::default(),
        }
    }
}

impl EpicOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn themes_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.themes_folder = folder.into();
        self
    }

    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = path.into();
        self
    }

    pub fn view_engine(mut self, options: ViewEngineOptions) -> Self {
        self.view_engine = options;
        self
    }

    pub fn default_layout(mut self, layout: Option<&str>) -> Self {
        self.view_engine.default_layout = layout.map(str::to_string);
        self
    }

    pub fn helper(
        mut self,
        name: impl Into<String>,
        helper: impl HelperDef + Send + Sync + 'static,
    ) -> Self {
        self.view_engine.helpers.insert(name.into(), Box::new(helper));
        self
    }

    pub fn compiler_options(mut self, options: CompilerOptions) -> Self {
        self.view_engine.compiler_options = options;
        self
    }

    pub fn seo_tags(mut self, enabled: bool) -> Self {
        self.view_engine.seo_tags = enabled;
        self
    }

    pub fn static_assets_folder(mut self, folder: impl Into<String>) -> Self {
        self.static_assets_folder = folder.into();
        self
    }

    /// Register a route unit.
    pub fn route_unit(mut self, unit: impl RouteUnit + 'static) -> Self {
        self.routes.push(Box::new(unit));
        self
    }

    pub fn default_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_upload_dir = Some(dir.into());
        self
    }

    /// Maximum request body size, uploads included.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.middleware.body_limit = bytes;
        self
    }

    pub fn local(mut self, key: impl Into<String>, value: Value) -> Self {
        self.locals.insert(key.into(), value);
        self
    }

    pub fn middleware(mut self, config: MiddlewareConfig) -> Self {
        self.middleware = config;
        self
    }
}

impl fmt::Debug for EpicOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpicOptions")
            .field("themes_folder", &self.themes_folder)
            .field("env_file", &self.env_file)
            .field("view_engine", &self.view_engine)
            .field("static_assets_folder", &self.static_assets_folder)
            .field(
                "routes",
                &self.routes.iter().map(|unit| unit.name()).collect::<Vec<_>>(),
            )
            .field("default_upload_dir", &self.default_upload_dir)
            .field("locals", &self.locals)
            .field("middleware", &self.middleware)
            .finish()
    }
}
