// Handlebars-backed view layer

use crate::error::{Error, Result};
use crate::response::Response;
use azura_log::{debug, trace};
use azura_session::Session;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderErrorReason,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const TEMPLATE_EXTENSION: &str = "hbs";

/// Template renderer with shared data.
///
/// Templates are every `.hbs` file below the views directory, named by
/// their relative path without extension (`admin/index`). Data added with
/// [`View::add_data`] is visible to every render; pending flash messages
/// are drained from the attached session at render time.
pub struct View {
    registry: Handlebars<'static>,
    data: RwLock<Map<String, Value>>,
    session: RwLock<Option<Arc<Session>>>,
}

impl View {
    pub fn new(views_dir: impl AsRef<Path>) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_helper("escape_js", Box::new(escape_js_helper));

        let views_dir = views_dir.as_ref();
        if views_dir.is_dir() {
            load_templates(&mut registry, views_dir, views_dir)?;
        } else {
            debug!(dir = %views_dir.display(), "Views directory missing, starting with no templates");
        }

        Ok(Self {
            registry,
            data: RwLock::new(Map::new()),
            session: RwLock::new(None),
        })
    }

    /// Register a template from a string.
    pub fn register_template(&mut self, name: &str, template: &str) -> Result<()> {
        self.registry
            .register_template_string(name, template)
            .map_err(|e| Error::Template(e.to_string()))
    }

    pub fn register_helper(&mut self, name: &str, helper: Box<dyn HelperDef + Send + Sync + 'static>) {
        self.registry.register_helper(name, helper);
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }

    pub fn add_data(&self, key: impl Into<String>, value: impl Serialize) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.write().insert(key.into(), value);
            }
            Err(e) => debug!(error = %e, "Skipping view data that failed to serialize"),
        }
    }

    pub fn data(&self) -> Map<String, Value> {
        self.data.read().clone()
    }

    pub fn set_session(&self, session: Arc<Session>) {
        *self.session.write() = Some(session);
    }

    /// Render `template` with the shared data overlaid by `data`.
    pub fn render(&self, template: &str, data: Value) -> Result<String> {
        let mut context = self.data();

        if !context.contains_key("flash") {
            let flash = match self.session.read().as_ref() {
                Some(session) => serde_json::to_value(session.get_flash())?,
                None => Value::Array(Vec::new()),
            };
            context.insert("flash".to_string(), flash);
        }

        if let Value::Object(local) = data {
            context.extend(local);
        }

        trace!(template, "Rendering template");
        self.registry
            .render(template, &context)
            .map_err(|e| Error::Template(e.to_string()))
    }

    /// Render into an HTML response.
    pub fn render_to_response(&self, response: Response, template: &str, data: Value) -> Result<Response> {
        let body = self.render(template, data)?;
        Ok(response.write(body))
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("templates", &self.registry.get_templates().len())
            .field("data", &self.data.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

fn load_templates(registry: &mut Handlebars<'static>, root: &Path, dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            load_templates(registry, root, &path)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
            continue;
        }

        let name = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/");
        let template = fs::read_to_string(&path)?;
        registry
            .register_template_string(&name, template)
            .map_err(|e| Error::Template(format!("{}: {}", name, e)))?;
        trace!(template = %name, "Registered template");
    }
    Ok(())
}

/// `{{escape_js value}}`: the value as a JavaScript literal.
fn escape_js_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h
        .param(0)
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("escape_js", 0))?;
    let encoded = serde_json::to_string(param.value())
        .map_err(|e| RenderErrorReason::Other(e.to_string()))?;
    out.write(&encoded)?;
    Ok(())
}
