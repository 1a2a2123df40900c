//! Theme Resolution
//!
//! A theme is a directory under the themes root holding a `config.json`
//! manifest plus views, layouts, partials and static assets.

use crate::config::Environment;
use crate::imports::{HeaderImport, ImportDeclarations, MetaTag};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Theme used when `THEME` is not set.
pub const DEFAULT_THEME: &str = "default";

/// Manifest file inside every theme directory.
pub const THEME_CONFIG_FILE: &str = "config.json";

/// Fields that can be injected as OpenGraph meta tags from `META_<FIELD>`.
pub const SEO_FIELDS: [&str; 7] = [
    "title",
    "description",
    "keywords",
    "author",
    "type",
    "url",
    "image",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub uri: String,
}

/// Parsed `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub author: ThemeAuthor,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub imports: ImportDeclarations,
}

/// A resolved theme: its location and manifest.
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,
    pub dir: PathBuf,
    pub config: ThemeConfig,
}

impl Theme {
    /// Path of a folder inside the theme (views, layouts, assets, ...).
    pub fn subdir(&self, folder: impl AsRef<Path>) -> PathBuf {
        self.dir.join(folder)
    }
}

/// Finds themes under a root directory.
#[derive(Debug, Clone)]
pub struct ThemeResolver {
    root: PathBuf,
    seo_tags: bool,
}

impl ThemeResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seo_tags: false,
        }
    }

    /// Inject `META_*` environment values as OpenGraph meta imports.
    pub fn seo_tags(mut self, enabled: bool) -> Self {
        self.seo_tags = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn theme_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Resolve the theme named by `THEME`, or [`DEFAULT_THEME`].
    pub fn resolve_from_env(&self, env: &Environment) -> Result<Theme> {
        let name = env.get_or("THEME", DEFAULT_THEME);
        self.resolve(&name, env)
    }

    /// Resolve and load `<root>/<name>/config.json`.
    pub fn resolve(&self, name: &str, env: &Environment) -> Result<Theme> {
        let dir = self.theme_dir(name);
        if !dir.is_dir() {
            return Err(Error::ThemeNotFound(dir));
        }

        let config_file = dir.join(THEME_CONFIG_FILE);
        if !config_file.is_file() {
            return Err(Error::ThemeConfigMissing(config_file));
        }

        let raw = fs::read_to_string(&config_file)?;
        let mut config: ThemeConfig =
            serde_json::from_str(&raw).map_err(|source| Error::ThemeConfigInvalid {
                path: config_file.clone(),
                source,
            })?;

        if self.seo_tags {
            inject_seo_tags(&mut config.imports, env);
        }

        info!(
            "Resolved theme '{}' v{} at {}",
            config.name,
            config.version,
            dir.display()
        );

        Ok(Theme {
            name: name.to_string(),
            dir,
            config,
        })
    }
}

/// Add one OpenGraph meta import per `META_<FIELD>` variable that is set,
/// keyed by the field name. Existing entries with that id are replaced.
pub fn inject_seo_tags(imports: &mut ImportDeclarations, env: &Environment) {
    for field in SEO_FIELDS {
        let key = format!("META_{}", field.to_uppercase());
        if let Some(value) = env.get_opt(&key) {
            debug!("Injecting SEO meta tag '{}' from {}", field, key);
            imports.insert_header(field, HeaderImport::Meta(MetaTag::open_graph(field, value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_theme(root: &Path, name: &str, config: &serde_json::Value) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(THEME_CONFIG_FILE), config.to_string()).unwrap();
        dir
    }

    #[test]
    fn test_resolve_minimal_config_has_import_sections() {
        let root = tempfile::tempdir().unwrap();
        write_theme(root.path(), "default", &json!({ "name": "Default" }));

        let theme = ThemeResolver::new(root.path())
            .resolve("default", &Environment::default())
            .unwrap();
        assert_eq!(theme.config.name, "Default");
        assert_eq!(theme.dir, root.path().join("default"));
        assert!(theme.config.imports.header.meta.is_empty());
        assert!(theme.config.imports.footer.scripts.is_empty());
        assert_eq!(theme.config.uri, None);
    }

    #[test]
    fn test_resolve_from_env_uses_theme_variable() {
        let root = tempfile::tempdir().unwrap();
        write_theme(root.path(), "dark", &json!({ "name": "Dark" }));

        let env = Environment::from_pairs([("THEME", "dark")]);
        let theme = ThemeResolver::new(root.path()).resolve_from_env(&env).unwrap();
        assert_eq!(theme.name, "dark");
    }

    #[test]
    fn test_missing_theme_directory() {
        let root = tempfile::tempdir().unwrap();
        let err = ThemeResolver::new(root.path())
            .resolve("nope", &Environment::default())
            .unwrap_err();
        assert!(matches!(&err, Error::ThemeNotFound(p) if p.ends_with("nope")));
    }

    #[test]
    fn test_missing_config_file() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("default")).unwrap();
        let err = ThemeResolver::new(root.path())
            .resolve("default", &Environment::default())
            .unwrap_err();
        assert!(matches!(&err, Error::ThemeConfigMissing(p) if p.ends_with(THEME_CONFIG_FILE)));
        assert!(err.to_string().starts_with("Theme configuration not found!"));
    }

    #[test]
    fn test_malformed_config() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("default");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(THEME_CONFIG_FILE), "{ not json").unwrap();

        let err = ThemeResolver::new(root.path())
            .resolve("default", &Environment::default())
            .unwrap_err();
        assert!(matches!(&err, Error::ThemeConfigInvalid { .. }));
        assert!(err.is_theme_error());
    }

    #[test]
    fn test_seo_tags_injected_from_env() {
        let root = tempfile::tempdir().unwrap();
        write_theme(
            root.path(),
            "default",
            &json!({
                "name": "Default",
                "imports": { "header": { "meta": {
                    "title": { "name": "title", "content": "old" },
                    "viewport": { "name": "viewport", "content": "width=device-width" }
                } } }
            }),
        );
        let env = Environment::from_pairs([("META_TITLE", "foo"), ("META_URL", "")]);

        let theme = ThemeResolver::new(root.path())
            .seo_tags(true)
            .resolve("default", &env)
            .unwrap();
        let meta = &theme.config.imports.header.meta;
        let title = &meta["title"];
        assert_eq!(title.content.as_deref(), Some("foo"));
        assert_eq!(title.property.as_deref(), Some("og:title"));
        assert_eq!(title.name.as_deref(), Some("title"));
        assert!(!meta.contains_key("url"));
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn test_seo_tags_disabled_by_default() {
        let root = tempfile::tempdir().unwrap();
        write_theme(root.path(), "default", &json!({ "name": "Default" }));
        let env = Environment::from_pairs([("META_TITLE", "foo")]);

        let theme = ThemeResolver::new(root.path()).resolve("default", &env).unwrap();
        assert!(theme.config.imports.header.meta.is_empty());
    }
}
