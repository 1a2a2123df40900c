//! Theme Import Declarations
//!
//! Themes declare the `<meta>`, `<link>` and `<script>` tags their layouts
//! should emit. Declarations live in `config.json` under `imports`:
//!
//! ```json
//! {
//!   "imports": {
//!     "header": {
//!       "meta":   { "viewport": { "name": "viewport", "content": "width=device-width" } },
//!       "link":   { "style": { "rel": "stylesheet", "href": "/css/style.css" } },
//!       "script": {}
//!     },
//!     "footer": {
//!       "scripts": { "app": { "src": "/js/app.js", "defer": true } }
//!     }
//!   }
//! }
//! ```
//!
//! Each tag kind has a closed attribute set; unknown attributes are rejected
//! when the theme is loaded. [`merge_imports`] renders the whole tree into
//! one markup string per placement and kind.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered identifier → tag map.
pub type ImportList<T> = IndexMap<String, T>;

fn is_false(value: &bool) -> bool {
    !*value
}

/// `<meta>` attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaTag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(
        default,
        rename = "http-equiv",
        alias = "httpEquiv",
        skip_serializing_if = "Option::is_none"
    )]
    pub http_equiv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemprop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl MetaTag {
    /// `<meta name=".." content="..">`
    pub fn named(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// `<meta name=".." property=".." content="..">`, as used for OpenGraph tags.
    pub fn open_graph(field: &str, content: impl Into<String>) -> Self {
        Self {
            name: Some(field.to_string()),
            property: Some(format!("og:{}", field)),
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// `<link>` attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkTag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hreflang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossorigin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrerpolicy: Option<String>,
}

impl LinkTag {
    pub fn stylesheet(href: impl Into<String>) -> Self {
        Self {
            rel: Some("stylesheet".to_string()),
            href: Some(href.into()),
            ..Default::default()
        }
    }
}

/// `<script>` attributes plus an optional inline body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptTag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub r#async: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub defer: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nomodule: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossorigin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrerpolicy: Option<String>,
    /// Inline script body, emitted verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ScriptTag {
    pub fn src(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            ..Default::default()
        }
    }
}

/// Header tag kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Meta,
    Link,
    Script,
}

impl HeaderKind {
    pub const ALL: [HeaderKind; 3] = [HeaderKind::Meta, HeaderKind::Link, HeaderKind::Script];
}

/// A header tag of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderImport {
    Meta(MetaTag),
    Link(LinkTag),
    Script(ScriptTag),
}

impl HeaderImport {
    pub fn kind(&self) -> HeaderKind {
        match self {
            HeaderImport::Meta(_) => HeaderKind::Meta,
            HeaderImport::Link(_) => HeaderKind::Link,
            HeaderImport::Script(_) => HeaderKind::Script,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderImports {
    #[serde(default)]
    pub meta: ImportList<MetaTag>,
    #[serde(default)]
    pub link: ImportList<LinkTag>,
    #[serde(default)]
    pub script: ImportList<ScriptTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FooterImports {
    #[serde(default)]
    pub scripts: ImportList<ScriptTag>,
}

/// Header and footer declarations. Both sections are always present, even
/// when the theme's JSON omits them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDeclarations {
    #[serde(default)]
    pub header: HeaderImports,
    #[serde(default)]
    pub footer: FooterImports,
}

impl ImportDeclarations {
    /// Insert or overwrite a header tag. An overwritten id keeps its position.
    pub fn insert_header(&mut self, id: impl Into<String>, import: HeaderImport) {
        let id = id.into();
        match import {
            HeaderImport::Meta(tag) => {
                self.header.meta.insert(id, tag);
            }
            HeaderImport::Link(tag) => {
                self.header.link.insert(id, tag);
            }
            HeaderImport::Script(tag) => {
                self.header.script.insert(id, tag);
            }
        }
    }

    /// Remove a header tag from one collection, or from all three when
    /// `kind` is `None`. Returns whether anything was removed.
    pub fn remove_header(&mut self, id: &str, kind: Option<HeaderKind>) -> bool {
        let kinds: &[HeaderKind] = match kind {
            Some(ref kind) => std::slice::from_ref(kind),
            None => &HeaderKind::ALL,
        };

        let mut removed = false;
        for kind in kinds {
            removed |= match kind {
                HeaderKind::Meta => self.header.meta.shift_remove(id).is_some(),
                HeaderKind::Link => self.header.link.shift_remove(id).is_some(),
                HeaderKind::Script => self.header.script.shift_remove(id).is_some(),
            };
        }
        removed
    }

    pub fn insert_footer(&mut self, id: impl Into<String>, tag: ScriptTag) {
        self.footer.scripts.insert(id.into(), tag);
    }

    pub fn remove_footer(&mut self, id: &str) -> bool {
        self.footer.scripts.shift_remove(id).is_some()
    }

    pub fn render(&self) -> RenderedImports {
        merge_imports(self)
    }
}

/// Rendered header markup, one string per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedHeader {
    pub meta: String,
    pub link: String,
    pub script: String,
}

/// Rendered footer markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedFooter {
    pub scripts: String,
}

/// Markup derived from [`ImportDeclarations`]; never edited directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedImports {
    pub header: RenderedHeader,
    pub footer: RenderedFooter,
}

/// Render every declaration, in insertion order, into fresh markup strings.
pub fn merge_imports(imports: &ImportDeclarations) -> RenderedImports {
    RenderedImports {
        header: RenderedHeader {
            meta: render_list(&imports.header.meta),
            link: render_list(&imports.header.link),
            script: render_list(&imports.header.script),
        },
        footer: RenderedFooter {
            scripts: render_list(&imports.footer.scripts),
        },
    }
}

fn render_list<T: Tag>(list: &ImportList<T>) -> String {
    list.values().map(render_tag).collect()
}

/// Attribute value; `None` renders a bare boolean attribute.
pub type Attribute<'a> = (&'static str, Option<&'a str>);

/// Markup shape of a tag kind.
pub trait Tag {
    const NAME: &'static str;
    /// Void elements have no closing tag.
    const VOID: bool;

    fn attributes(&self) -> Vec<Attribute<'_>>;

    fn text(&self) -> Option<&str> {
        None
    }
}

fn push_attr<'a>(attrs: &mut Vec<Attribute<'a>>, name: &'static str, value: &'a Option<String>) {
    if let Some(value) = value {
        attrs.push((name, Some(value.as_str())));
    }
}

fn push_flag(attrs: &mut Vec<Attribute<'_>>, name: &'static str, set: bool) {
    if set {
        attrs.push((name, None));
    }
}

impl Tag for MetaTag {
    const NAME: &'static str = "meta";
    const VOID: bool = true;

    fn attributes(&self) -> Vec<Attribute<'_>> {
        let mut attrs = Vec::new();
        push_attr(&mut attrs, "charset", &self.charset);
        push_attr(&mut attrs, "name", &self.name);
        push_attr(&mut attrs, "property", &self.property);
        push_attr(&mut attrs, "http-equiv", &self.http_equiv);
        push_attr(&mut attrs, "itemprop", &self.itemprop);
        push_attr(&mut attrs, "content", &self.content);
        attrs
    }
}

impl Tag for LinkTag {
    const NAME: &'static str = "link";
    const VOID: bool = true;

    fn attributes(&self) -> Vec<Attribute<'_>> {
        let mut attrs = Vec::new();
        push_attr(&mut attrs, "rel", &self.rel);
        push_attr(&mut attrs, "href", &self.href);
        push_attr(&mut attrs, "type", &self.r#type);
        push_attr(&mut attrs, "media", &self.media);
        push_attr(&mut attrs, "sizes", &self.sizes);
        push_attr(&mut attrs, "hreflang", &self.hreflang);
        push_attr(&mut attrs, "as", &self.r#as);
        push_attr(&mut attrs, "title", &self.title);
        push_attr(&mut attrs, "crossorigin", &self.crossorigin);
        push_attr(&mut attrs, "integrity", &self.integrity);
        push_attr(&mut attrs, "referrerpolicy", &self.referrerpolicy);
        attrs
    }
}

impl Tag for ScriptTag {
    const NAME: &'static str = "script";
    const VOID: bool = false;

    fn attributes(&self) -> Vec<Attribute<'_>> {
        let mut attrs = Vec::new();
        push_attr(&mut attrs, "id", &self.id);
        push_attr(&mut attrs, "src", &self.src);
        push_attr(&mut attrs, "type", &self.r#type);
        push_flag(&mut attrs, "async", self.r#async);
        push_flag(&mut attrs, "defer", self.defer);
        push_flag(&mut attrs, "nomodule", self.nomodule);
        push_attr(&mut attrs, "crossorigin", &self.crossorigin);
        push_attr(&mut attrs, "integrity", &self.integrity);
        push_attr(&mut attrs, "referrerpolicy", &self.referrerpolicy);
        attrs
    }

    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Outer markup of a single tag.
pub fn render_tag<T: Tag>(tag: &T) -> String {
    let mut out = format!("<{}", T::NAME);
    for (name, value) in tag.attributes() {
        match value {
            Some(value) => out.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value))),
            None => out.push_str(&format!(" {}", name)),
        }
    }
    out.push('>');

    if !T::VOID {
        if let Some(text) = tag.text() {
            out.push_str(text);
        }
        out.push_str(&format!("</{}>", T::NAME));
    }
    out
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ImportDeclarations {
        serde_json::from_value(json!({
            "header": {
                "meta": {
                    "charset": { "charset": "UTF-8" },
                    "viewport": { "name": "viewport", "content": "width=device-width" }
                },
                "link": {
                    "style": { "rel": "stylesheet", "href": "/css/style.css" }
                },
                "script": {
                    "inline": { "text": "window.epic = {};" }
                }
            },
            "footer": {
                "scripts": {
                    "app": { "src": "/js/app.js", "defer": true }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let imports: ImportDeclarations = serde_json::from_value(json!({})).unwrap();
        assert!(imports.header.meta.is_empty());
        assert!(imports.footer.scripts.is_empty());

        let imports: ImportDeclarations =
            serde_json::from_value(json!({ "header": { "link": {} } })).unwrap();
        assert!(imports.header.meta.is_empty());
        assert_eq!(imports.render(), RenderedImports::default());
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let result: Result<ImportDeclarations, _> = serde_json::from_value(json!({
            "header": { "meta": { "x": { "onload": "alert(1)" } } }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_render_markup() {
        let rendered = sample().render();
        assert_eq!(
            rendered.header.meta,
            "<meta charset=\"UTF-8\"><meta name=\"viewport\" content=\"width=device-width\">"
        );
        assert_eq!(
            rendered.header.link,
            "<link rel=\"stylesheet\" href=\"/css/style.css\">"
        );
        assert_eq!(rendered.header.script, "<script>window.epic = {};</script>");
        assert_eq!(
            rendered.footer.scripts,
            "<script src=\"/js/app.js\" defer></script>"
        );
    }

    #[test]
    fn test_render_is_idempotent() {
        let imports = sample();
        assert_eq!(merge_imports(&imports), merge_imports(&imports));
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let tag = MetaTag::named("description", "Tom & \"Jerry\" <3");
        assert_eq!(
            render_tag(&tag),
            "<meta name=\"description\" content=\"Tom &amp; &quot;Jerry&quot; &lt;3\">"
        );
    }

    #[test]
    fn test_add_then_remove_restores_markup() {
        let mut imports = sample();
        let before = imports.render();

        imports.insert_header("x", HeaderImport::Meta(MetaTag::named("x", "y")));
        assert_ne!(imports.render().header.meta, before.header.meta);

        assert!(imports.remove_header("x", None));
        assert_eq!(imports.render(), before);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut imports = sample();
        imports.insert_header(
            "charset",
            HeaderImport::Meta(MetaTag {
                charset: Some("latin1".into()),
                ..Default::default()
            }),
        );
        let ids: Vec<_> = imports.header.meta.keys().cloned().collect();
        assert_eq!(ids, vec!["charset", "viewport"]);
        assert!(imports.render().header.meta.starts_with("<meta charset=\"latin1\">"));
    }

    #[test]
    fn test_remove_header_without_kind_clears_every_collection() {
        let mut imports = ImportDeclarations::default();
        imports.insert_header("shared", HeaderImport::Meta(MetaTag::named("a", "b")));
        imports.insert_header("shared", HeaderImport::Link(LinkTag::stylesheet("/a.css")));

        assert!(imports.remove_header("shared", None));
        assert!(imports.header.meta.is_empty());
        assert!(imports.header.link.is_empty());
        assert!(!imports.remove_header("shared", None));
    }

    #[test]
    fn test_remove_header_with_kind_is_scoped() {
        let mut imports = ImportDeclarations::default();
        imports.insert_header("shared", HeaderImport::Meta(MetaTag::named("a", "b")));
        imports.insert_header("shared", HeaderImport::Script(ScriptTag::src("/a.js")));

        imports.remove_header("shared", Some(HeaderKind::Script));
        assert_eq!(imports.header.meta.len(), 1);
        assert!(imports.header.script.is_empty());
    }

    #[test]
    fn test_footer_mutations() {
        let mut imports = sample();
        imports.insert_footer("analytics", ScriptTag::src("/js/a.js"));
        assert_eq!(
            imports.render().footer.scripts,
            "<script src=\"/js/app.js\" defer></script><script src=\"/js/a.js\"></script>"
        );

        assert!(imports.remove_footer("app"));
        assert_eq!(
            imports.render().footer.scripts,
            "<script src=\"/js/a.js\"></script>"
        );
        assert!(!imports.header.script.is_empty());
    }
}
