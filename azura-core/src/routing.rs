// Route definitions and the route table

use crate::container::Container;
use crate::error::{Error, Result};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::request::Request;
use crate::response::Response;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A route handler. Receives the request and the service container.
pub type RouteHandler =
    Arc<dyn Fn(Request, Container) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Box an async function into a [`RouteHandler`].
pub fn handler<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(Request, Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |req, container| Box::pin(f(req, container)))
}

/// A single route: methods, a `{param}` pattern, an optional name and its
/// own middleware.
#[derive(Clone)]
pub struct Route {
    methods: Vec<String>,
    pattern: String,
    name: Option<String>,
    handler: RouteHandler,
    middleware: MiddlewareChain,
}

impl Route {
    pub fn new(methods: &[&str], pattern: impl Into<String>, handler: RouteHandler) -> Self {
        Self {
            methods: methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
            pattern: pattern.into(),
            name: None,
            handler,
            middleware: MiddlewareChain::new(),
        }
    }

    /// Name the route for URL generation.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Add route-level middleware. Runs inside the application middleware.
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middleware.use_middleware(middleware);
        self
    }

    pub(crate) fn prefix_pattern(&mut self, prefix: &str) {
        let prefix = prefix.trim_end_matches('/');
        self.pattern = match self.pattern.as_str() {
            "/" if !prefix.is_empty() => prefix.to_string(),
            pattern => format!("{}{}", prefix, pattern),
        };
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    fn allows(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method || m == "ANY")
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .finish()
    }
}

/// The route a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    pub name: Option<String>,
    pub pattern: String,
    pub methods: Vec<String>,
    pub arguments: BTreeMap<String, String>,
}

/// All registered routes, indexed for matching and by name.
#[derive(Default)]
pub struct RouteTable {
    paths: matchit::Router<usize>,
    slots: Vec<Vec<usize>>,
    slot_by_pattern: HashMap<String, usize>,
    routes: Vec<Route>,
    names: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, route: Route) -> Result<()> {
        let index = self.routes.len();

        let slot = match self.slot_by_pattern.get(route.pattern()) {
            Some(slot) => *slot,
            None => {
                let slot = self.slots.len();
                self.paths
                    .insert(route.pattern(), slot)
                    .map_err(|e| Error::Bootstrap(format!("Invalid route {}: {}", route.pattern(), e)))?;
                self.slots.push(Vec::new());
                self.slot_by_pattern.insert(route.pattern().to_string(), slot);
                slot
            }
        };

        if let Some(name) = route.get_name() {
            self.names.insert(name.to_string(), index);
        }
        self.slots[slot].push(index);
        self.routes.push(route);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Route> {
        self.routes.get(index)
    }

    pub fn named(&self, name: &str) -> Option<&Route> {
        self.names.get(name).and_then(|i| self.routes.get(*i))
    }

    /// Match a method and path. `HEAD` falls back to `GET` routes.
    pub fn match_route(&self, method: &str, path: &str) -> Result<(usize, MatchedRoute)> {
        let found = self
            .paths
            .at(path)
            .map_err(|_| Error::RouteNotFound(path.to_string()))?;

        let candidates = &self.slots[*found.value];
        let pick = |wanted: &str| {
            candidates
                .iter()
                .copied()
                .find(|i| self.routes[*i].allows(wanted))
        };
        let index = pick(method)
            .or_else(|| if method == "HEAD" { pick("GET") } else { None })
            .ok_or_else(|| Error::MethodNotAllowed(format!("{} {}", method, path)))?;

        let route = &self.routes[index];
        let arguments = found
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok((
            index,
            MatchedRoute {
                name: route.name.clone(),
                pattern: route.pattern.clone(),
                methods: route.methods.clone(),
                arguments,
            },
        ))
    }

    /// Path for a named route, with `query` appended.
    pub fn relative_path_for(
        &self,
        name: &str,
        params: &BTreeMap<String, String>,
        query: &BTreeMap<String, String>,
    ) -> Result<String> {
        let route = self
            .named(name)
            .ok_or_else(|| Error::RouteGeneration(format!("Named route does not exist for name: {}", name)))?;

        let mut path = fill_pattern(route.pattern(), params)?;
        if !query.is_empty() {
            let encoded = serde_urlencoded::to_string(query)
                .map_err(|e| Error::RouteGeneration(e.to_string()))?;
            path.push('?');
            path.push_str(&encoded);
        }
        Ok(path)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .finish()
    }
}

/// Substitute `{name}` and `{*name}` placeholders.
fn fill_pattern(pattern: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let end = rest[start..]
            .find('}')
            .map(|e| start + e)
            .ok_or_else(|| Error::RouteGeneration(format!("Unterminated placeholder in {}", pattern)))?;

        let key = rest[start + 1..end].trim_start_matches('*');
        let value = params
            .get(key)
            .ok_or_else(|| Error::RouteGeneration(format!("Missing data for URL segment: {}", key)))?;
        out.push_str(value);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
