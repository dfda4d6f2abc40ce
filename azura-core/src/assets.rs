// Front-end asset libraries and tag rendering

use crate::error::{Error, Result};
use crate::request::Request;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use rand::RngCore;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Order used by the single-file helpers.
pub const DEFAULT_ORDER: i32 = 100;

/// Attribute value on a `<script>` or `<link>` tag. `true` renders as a bare
/// attribute (`defer`), `false` drops it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Text(String),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Flag(b)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileSpec {
    Src(String),
    Attributes(BTreeMap<String, AttrValue>),
}

/// One included file: `src`/`href` plus any extra tag attributes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "FileSpec")]
pub struct AssetFile {
    attributes: Vec<(String, AttrValue)>,
}

impl AssetFile {
    /// A script file.
    pub fn script(src: impl Into<String>) -> Self {
        Self {
            attributes: vec![("src".to_string(), AttrValue::Text(src.into()))],
        }
    }

    /// A stylesheet.
    pub fn stylesheet(href: impl Into<String>) -> Self {
        Self {
            attributes: vec![("href".to_string(), AttrValue::Text(href.into()))],
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
        self
    }

    fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl From<FileSpec> for AssetFile {
    fn from(spec: FileSpec) -> Self {
        match spec {
            FileSpec::Src(src) => AssetFile::script(src),
            FileSpec::Attributes(map) => Self {
                attributes: map.into_iter().collect(),
            },
        }
    }
}

type InlineFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Inline script or style content, fixed or computed per request.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub enum InlineAsset {
    Static(String),
    Dynamic(InlineFn),
}

impl InlineAsset {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        InlineAsset::Dynamic(Arc::new(f))
    }

    fn render(&self, request: Option<&Request>) -> String {
        match (self, request) {
            (InlineAsset::Static(s), _) => s.clone(),
            (InlineAsset::Dynamic(f), Some(req)) => f(req),
            (InlineAsset::Dynamic(_), None) => String::new(),
        }
    }
}

impl From<String> for InlineAsset {
    fn from(s: String) -> Self {
        InlineAsset::Static(s)
    }
}

impl From<&str> for InlineAsset {
    fn from(s: &str) -> Self {
        InlineAsset::Static(s.to_string())
    }
}

impl fmt::Debug for InlineAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlineAsset::Static(s) => f.debug_tuple("Static").field(s).finish(),
            InlineAsset::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryFiles {
    #[serde(default)]
    pub js: Vec<AssetFile>,
    #[serde(default)]
    pub css: Vec<AssetFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryInline {
    #[serde(default)]
    pub js: Vec<InlineAsset>,
    #[serde(default)]
    pub css: Vec<InlineAsset>,
}

/// A named bundle of files and inline code with its own requirements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub files: LibraryFiles,
    #[serde(default)]
    pub inline: LibraryInline,
    #[serde(default)]
    pub require: Vec<String>,
}

impl Library {
    pub fn new(order: i32) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    pub fn js(mut self, file: AssetFile) -> Self {
        self.files.js.push(file);
        self
    }

    pub fn css(mut self, file: AssetFile) -> Self {
        self.files.css.push(file);
        self
    }

    pub fn inline_js(mut self, inline: impl Into<InlineAsset>) -> Self {
        self.inline.js.push(inline.into());
        self
    }

    pub fn inline_css(mut self, inline: impl Into<InlineAsset>) -> Self {
        self.inline.css.push(inline.into());
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.require.push(name.into());
        self
    }
}

struct Loaded {
    library: Library,
    effective_order: i32,
}

#[derive(Default)]
struct State {
    libraries: HashMap<String, Library>,
    loaded: Vec<Loaded>,
    loaded_names: HashMap<String, i32>,
    loading: HashSet<String>,
    csp_domains: Vec<String>,
}

/// Per-request asset collection.
///
/// Loading a library loads its requirements first. Output is ordered by
/// each library's order, raised where needed so a library never sorts ahead
/// of anything it requires; ties keep load order.
pub struct Assets {
    assets_url: String,
    versioned_files: HashMap<String, String>,
    csp_nonce: String,
    state: Mutex<State>,
}

static ANONYMOUS: AtomicU64 = AtomicU64::new(0);

fn anonymous_name() -> String {
    format!("_inline_{}", ANONYMOUS.fetch_add(1, Ordering::Relaxed))
}

impl Assets {
    pub fn new(assets_url: impl Into<String>) -> Self {
        let mut nonce = [0u8; 18];
        rand::rng().fill_bytes(&mut nonce);

        Self {
            assets_url: assets_url.into().trim_end_matches('/').to_string(),
            versioned_files: HashMap::new(),
            csp_nonce: STANDARD.encode(nonce),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_libraries(self, libraries: impl IntoIterator<Item = (String, Library)>) -> Self {
        for (name, library) in libraries {
            self.add_library(Some(&name), library);
        }
        self
    }

    /// Map source names to their versioned (cache-busted) file names.
    pub fn with_versioned_files(mut self, files: HashMap<String, String>) -> Self {
        self.versioned_files = files;
        self
    }

    /// Register a library without loading it. Returns its name.
    pub fn add_library(&self, name: Option<&str>, mut library: Library) -> String {
        let name = name.map(str::to_string).unwrap_or_else(anonymous_name);
        library.name = name.clone();
        self.state.lock().libraries.insert(name.clone(), library);
        name
    }

    pub fn has_library(&self, name: &str) -> bool {
        self.state.lock().libraries.contains_key(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state.lock().loaded_names.contains_key(name)
    }

    pub fn csp_nonce(&self) -> &str {
        &self.csp_nonce
    }

    /// Origins of remote assets, in first-seen order.
    pub fn csp_domains(&self) -> Vec<String> {
        self.state.lock().csp_domains.clone()
    }

    /// Load a registered library and its requirements.
    pub fn load(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::load_named(&mut state, name).map(|_| ())
    }

    /// Load an ad-hoc library definition.
    pub fn load_library(&self, mut library: Library) -> Result<()> {
        if library.name.is_empty() {
            library.name = anonymous_name();
        }
        let mut state = self.state.lock();
        Self::load_item(&mut state, library).map(|_| ())
    }

    fn load_named(state: &mut State, name: &str) -> Result<i32> {
        if let Some(order) = state.loaded_names.get(name) {
            return Ok(*order);
        }
        let library = state
            .libraries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::LibraryNotFound(name.to_string()))?;
        Self::load_item(state, library)
    }

    fn load_item(state: &mut State, library: Library) -> Result<i32> {
        if let Some(order) = state.loaded_names.get(&library.name) {
            return Ok(*order);
        }
        // A requirement cycle; the outer load will place this library.
        if !state.loading.insert(library.name.clone()) {
            return Ok(library.order);
        }

        let mut effective_order = library.order;
        for required in &library.require {
            let order = Self::load_named(state, required);
            let order = match order {
                Ok(order) => order,
                Err(e) => {
                    state.loading.remove(&library.name);
                    return Err(e);
                }
            };
            effective_order = effective_order.max(order);
        }

        state.loading.remove(&library.name);
        state
            .loaded_names
            .insert(library.name.clone(), effective_order);
        state.loaded.push(Loaded {
            library,
            effective_order,
        });
        Ok(effective_order)
    }

    pub fn add_js(&self, file: AssetFile) -> Result<()> {
        self.load_library(Library::new(DEFAULT_ORDER).js(file))
    }

    pub fn add_inline_js(&self, inline: impl Into<InlineAsset>, order: i32) -> Result<()> {
        self.load_library(Library::new(order).inline_js(inline))
    }

    pub fn add_css(&self, file: AssetFile, order: i32) -> Result<()> {
        self.load_library(Library::new(order).css(file))
    }

    pub fn add_inline_css(&self, inline: impl Into<InlineAsset>) -> Result<()> {
        self.load_library(Library::new(DEFAULT_ORDER).inline_css(inline))
    }

    fn sorted(state: &State) -> Vec<&Library> {
        let mut loaded: Vec<&Loaded> = state.loaded.iter().collect();
        loaded.sort_by_key(|l| l.effective_order);
        loaded.into_iter().map(|l| &l.library).collect()
    }

    /// `<link>` and `<style>` tags for every loaded library.
    pub fn css(&self) -> String {
        let mut state = self.state.lock();
        let mut tags = Vec::new();
        let mut domains = Vec::new();

        for library in Self::sorted(&state) {
            for file in &library.files.css {
                let attrs = self.compile_attributes(
                    file,
                    &[("rel", "stylesheet"), ("type", "text/css")],
                    &mut domains,
                );
                tags.push(format!("<link {} />", attrs));
            }
            for inline in &library.inline.css {
                let content = inline.render(None);
                if !content.is_empty() {
                    tags.push(format!(
                        "<style type=\"text/css\" nonce=\"{}\">\n{}</style>",
                        self.csp_nonce, content
                    ));
                }
            }
        }

        Self::remember_domains(&mut state, domains);
        join_tags(tags)
    }

    /// `<script>` include tags for every loaded library.
    pub fn js(&self) -> String {
        let mut state = self.state.lock();
        let mut tags = Vec::new();
        let mut domains = Vec::new();

        for library in Self::sorted(&state) {
            for file in &library.files.js {
                let attrs =
                    self.compile_attributes(file, &[("type", "text/javascript")], &mut domains);
                tags.push(format!("<script {}></script>", attrs));
            }
        }

        Self::remember_domains(&mut state, domains);
        join_tags(tags)
    }

    /// Inline `<script>` blocks, evaluating dynamic ones against `request`.
    pub fn inline_js(&self, request: &Request) -> String {
        let state = self.state.lock();
        let mut tags = Vec::new();

        for library in Self::sorted(&state) {
            for inline in &library.inline.js {
                let content = inline.render(Some(request));
                if !content.is_empty() {
                    tags.push(format!(
                        "<script type=\"text/javascript\" nonce=\"{}\">\n{}</script>",
                        self.csp_nonce, content
                    ));
                }
            }
        }
        join_tags(tags)
    }

    fn remember_domains(state: &mut State, domains: Vec<String>) {
        for domain in domains {
            if !state.csp_domains.contains(&domain) {
                state.csp_domains.push(domain);
            }
        }
    }

    fn compile_attributes(
        &self,
        file: &AssetFile,
        defaults: &[(&str, &str)],
        domains: &mut Vec<String>,
    ) -> String {
        let mut attributes: Vec<(String, AttrValue)> = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), AttrValue::from(*v)))
            .collect();

        for key in ["src", "href"] {
            if let Some(AttrValue::Text(uri)) = file.get(key) {
                attributes.push((key.to_string(), AttrValue::Text(self.resolve_url(uri, domains))));
            }
        }
        if file.get("integrity").is_some() {
            attributes.push(("crossorigin".to_string(), AttrValue::from("anonymous")));
        }

        for (key, value) in &file.attributes {
            if key == "src" || key == "href" {
                continue;
            }
            match attributes.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.clone(),
                None => attributes.push((key.clone(), value.clone())),
            }
        }

        attributes
            .into_iter()
            .filter_map(|(key, value)| match value {
                AttrValue::Flag(true) => Some(key),
                AttrValue::Flag(false) => None,
                AttrValue::Text(text) => Some(format!("{}=\"{}\"", key, text)),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn resolve_url(&self, uri: &str, domains: &mut Vec<String>) -> String {
        let uri = self
            .versioned_files
            .get(uri)
            .map(String::as_str)
            .unwrap_or(uri);

        if uri.starts_with("http://") || uri.starts_with("https://") || uri.starts_with("//") {
            if let Some(origin) = origin_of(uri) {
                domains.push(origin);
            }
            return uri.to_string();
        }
        format!("{}/{}", self.assets_url, uri.trim_start_matches('/'))
    }
}

/// `scheme://host` of a remote URL; protocol-relative URLs count as https.
fn origin_of(uri: &str) -> Option<String> {
    let absolute = match uri.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => uri.to_string(),
    };
    let url = url::Url::parse(&absolute).ok()?;
    Some(format!("{}://{}", url.scheme(), url.host_str()?))
}

fn join_tags(tags: Vec<String>) -> String {
    let mut out = tags.join("\n");
    out.push('\n');
    out
}

impl fmt::Debug for Assets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Assets")
            .field("assets_url", &self.assets_url)
            .field("libraries", &state.libraries.len())
            .field("loaded", &state.loaded.len())
            .finish()
    }
}
