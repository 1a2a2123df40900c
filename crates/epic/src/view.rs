//! Handlebars view engine
//!
//! Templates are loaded from the theme's views, layouts and partials
//! folders. Views are named by their path relative to the views folder
//! without the extension (`index`, `blog/post`), partials likewise, and
//! layouts by their relative name (`main`, `page`). A rendered view is
//! wrapped in a layout and exposed to it as `{{{body}}}`.

use crate::options::{CompilerOptions, HelperSet};
use handlebars::Handlebars;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const VIEW_PREFIX: &str = "view:";
const LAYOUT_PREFIX: &str = "layout:";

/// Key in render data that selects a layout (`"name"`) or disables it
/// (`false`).
pub const LAYOUT_KEY: &str = "layout";

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("Invalid template pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to load template {}: {source}", .path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("Failed to lookup view \"{0}\"")]
    UnknownView(String),

    #[error("Failed to lookup layout \"{0}\"")]
    UnknownLayout(String),

    #[error("Failed to render {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// Where templates live and how they are compiled.
#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub views_dir: PathBuf,
    pub layouts_dir: PathBuf,
    pub partials_dir: PathBuf,
    pub extname: String,
    pub default_layout: Option<String>,
    pub compiler_options: CompilerOptions,
}

pub struct ViewEngine {
    registry: Handlebars<'static>,
    default_layout: Option<String>,
    views: Vec<String>,
    layouts: Vec<String>,
    partials: Vec<String>,
}

impl ViewEngine {
    /// Compile every template under the configured folders. Helpers are
    /// looked up at render time and registered afterwards with
    /// [`ViewEngine::register_helpers`].
    pub fn new(settings: ViewSettings) -> Result<Self, ViewError> {
        let mut registry = Handlebars::new();
        apply_compiler_options(&mut registry, &settings.compiler_options);

        let partials = register_folder(&mut registry, &settings.partials_dir, &settings.extname, "")?;
        let layouts = register_folder(
            &mut registry,
            &settings.layouts_dir,
            &settings.extname,
            LAYOUT_PREFIX,
        )?;
        let views = register_folder(&mut registry, &settings.views_dir, &settings.extname, VIEW_PREFIX)?;

        info!(
            "View engine ready: {} views, {} layouts, {} partials",
            views.len(),
            layouts.len(),
            partials.len()
        );

        Ok(Self {
            registry,
            default_layout: settings.default_layout,
            views,
            layouts,
            partials,
        })
    }

    pub fn register_helpers(&mut self, helpers: HelperSet) {
        for (name, helper) in helpers {
            debug!("Registering template helper '{}'", name);
            self.registry.register_helper(&name, helper);
        }
    }

    pub fn views(&self) -> &[String] {
        &self.views
    }

    pub fn layouts(&self) -> &[String] {
        &self.layouts
    }

    pub fn partials(&self) -> &[String] {
        &self.partials
    }

    pub fn has_view(&self, view: &str) -> bool {
        self.registry.has_template(&format!("{VIEW_PREFIX}{view}"))
    }

    /// Render `view` with `data`, then wrap it in the selected layout.
    pub fn render(&self, view: &str, data: &Value) -> Result<String, ViewError> {
        let view_key = format!("{VIEW_PREFIX}{view}");
        if !self.registry.has_template(&view_key) {
            return Err(ViewError::UnknownView(view.to_string()));
        }
        let body = self
            .registry
            .render(&view_key, data)
            .map_err(|source| ViewError::Render {
                name: view.to_string(),
                source: Box::new(source),
            })?;

        let layout = match data.get(LAYOUT_KEY) {
            Some(Value::String(name)) => Some(name.as_str()),
            Some(Value::Bool(false)) => None,
            _ => self.default_layout.as_deref(),
        };
        let Some(layout) = layout else {
            return Ok(body);
        };

        let layout_key = format!("{LAYOUT_PREFIX}{layout}");
        if !self.registry.has_template(&layout_key) {
            return Err(ViewError::UnknownLayout(layout.to_string()));
        }

        let mut data = match data {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        data.insert("body".to_string(), Value::String(body));

        self.registry
            .render(&layout_key, &data)
            .map_err(|source| ViewError::Render {
                name: layout.to_string(),
                source: Box::new(source),
            })
    }
}

fn apply_compiler_options(registry: &mut Handlebars<'static>, options: &CompilerOptions) {
    if let Some(strict) = options.strict {
        registry.set_strict_mode(strict);
    }
    if let Some(prevent_indent) = options.prevent_indent {
        registry.set_prevent_indent(prevent_indent);
    }
    if let Some(dev_mode) = options.dev_mode {
        registry.set_dev_mode(dev_mode);
    }
    if options.no_escape == Some(true) {
        registry.register_escape_fn(handlebars::no_escape);
    }
}

/// Register every template below `dir` as `<prefix><relative name>`.
/// A missing folder registers nothing.
fn register_folder(
    registry: &mut Handlebars<'static>,
    dir: &Path,
    extname: &str,
    prefix: &str,
) -> Result<Vec<String>, ViewError> {
    if !dir.is_dir() {
        warn!("Template folder not found: {}", dir.display());
        return Ok(Vec::new());
    }

    let pattern = format!(
        "{}/**/*{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        extname
    );
    let paths = glob::glob(&pattern).map_err(|source| ViewError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable template: {}", e);
                continue;
            }
        };
        let Some(name) = template_name(dir, &path, extname) else {
            continue;
        };

        registry
            .register_template_file(&format!("{prefix}{name}"), &path)
            .map_err(|source| ViewError::Template {
                path: path.clone(),
                source: Box::new(source),
            })?;
        debug!("Registered template {}{} from {}", prefix, name, path.display());
        names.push(name);
    }

    names.sort();
    Ok(names)
}

/// `<dir>/blog/post.hbs` → `blog/post`.
fn template_name(dir: &Path, path: &Path, extname: &str) -> Option<String> {
    let relative = path.strip_prefix(dir).ok()?;
    let relative = relative.to_string_lossy().replace('\\', "/");
    relative.strip_suffix(extname).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn theme() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for folder in ["views/blog", "layouts", "partials"] {
            fs::create_dir_all(root.join(folder)).unwrap();
        }
        fs::write(root.join("views/index.hbs"), "<h1>{{title}}</h1>").unwrap();
        fs::write(root.join("views/blog/post.hbs"), "{{> byline}}{{title}}").unwrap();
        fs::write(root.join("views/notes.txt"), "ignored").unwrap();
        fs::write(root.join("layouts/main.hbs"), "<main>{{{body}}}</main>").unwrap();
        fs::write(root.join("layouts/page.hbs"), "<article>{{{body}}}</article>").unwrap();
        fs::write(root.join("partials/byline.hbs"), "by {{author}}: ").unwrap();
        dir
    }

    fn engine(root: &Path, compiler_options: CompilerOptions) -> ViewEngine {
        ViewEngine::new(ViewSettings {
            views_dir: root.join("views"),
            layouts_dir: root.join("layouts"),
            partials_dir: root.join("partials"),
            extname: ".hbs".to_string(),
            default_layout: Some("main".to_string()),
            compiler_options,
        })
        .unwrap()
    }

    #[test]
    fn test_templates_are_named_by_relative_path() {
        let dir = theme();
        let engine = engine(dir.path(), CompilerOptions::default());
        assert_eq!(engine.views(), ["blog/post", "index"]);
        assert_eq!(engine.layouts(), ["main", "page"]);
        assert_eq!(engine.partials(), ["byline"]);
        assert!(engine.has_view("blog/post"));
        assert!(!engine.has_view("notes"));
    }

    #[test]
    fn test_default_layout_wraps_body() {
        let dir = theme();
        let engine = engine(dir.path(), CompilerOptions::default());
        let html = engine.render("index", &json!({ "title": "Home" })).unwrap();
        assert_eq!(html, "<main><h1>Home</h1></main>");
    }

    #[test]
    fn test_layout_selection() {
        let dir = theme();
        let engine = engine(dir.path(), CompilerOptions::default());

        let html = engine
            .render("blog/post", &json!({ "title": "Post", "author": "Ann", "layout": "page" }))
            .unwrap();
        assert_eq!(html, "<article>by Ann: Post</article>");

        let html = engine
            .render("index", &json!({ "title": "Bare", "layout": false }))
            .unwrap();
        assert_eq!(html, "<h1>Bare</h1>");

        let err = engine
            .render("index", &json!({ "layout": "missing" }))
            .unwrap_err();
        assert!(matches!(err, ViewError::UnknownLayout(ref name) if name == "missing"));
    }

    #[test]
    fn test_unknown_view() {
        let dir = theme();
        let engine = engine(dir.path(), CompilerOptions::default());
        let err = engine.render("nope", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Failed to lookup view \"nope\"");
    }

    #[test]
    fn test_escaping_and_no_escape() {
        let dir = theme();
        let data = json!({ "title": "<b>", "layout": false });

        let escaped = engine(dir.path(), CompilerOptions::default());
        assert_eq!(escaped.render("index", &data).unwrap(), "<h1>&lt;b&gt;</h1>");

        let raw = engine(dir.path(), CompilerOptions::default().no_escape(true));
        assert_eq!(raw.render("index", &data).unwrap(), "<h1><b></h1>");
    }

    #[test]
    fn test_strict_mode_rejects_missing_fields() {
        let dir = theme();
        let strict = engine(dir.path(), CompilerOptions::default().strict(true));
        let err = strict.render("index", &json!({ "layout": false })).unwrap_err();
        assert!(matches!(err, ViewError::Render { .. }));
    }

    #[test]
    fn test_helpers_registered_after_compile() {
        let dir = theme();
        fs::write(dir.path().join("views/shout.hbs"), "{{upper title}}").unwrap();
        let mut engine = engine(dir.path(), CompilerOptions::default());

        let data = json!({ "title": "hi", "layout": false });
        assert!(engine.render("shout", &data).is_err());

        let mut helpers = HelperSet::new();
        helpers.insert("upper".to_string(), Box::new(upper));
        engine.register_helpers(helpers);
        assert_eq!(engine.render("shout", &data).unwrap(), "HI");
    }

    handlebars::handlebars_helper!(upper: |s: str| s.to_uppercase());

    #[test]
    fn test_missing_folders_register_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), CompilerOptions::default());
        assert!(engine.views().is_empty());
        assert!(engine.partials().is_empty());
    }
}
