// URL-aware router over the route table

use crate::error::{Error, Result};
use crate::request::Request;
use crate::routing::{MatchedRoute, Route, RouteTable};
use azura_config::Settings;
use azura_log::{debug, trace};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use url::Url;

/// Hosts that identify an internal proxy hop rather than the public site.
const IGNORED_HOSTS: [&str; 2] = ["nginx", "localhost"];

/// Route table plus base-URL resolution and URL composition.
///
/// The container holds one router; [`Router::with_current_request`] hands
/// each request its own view of it that knows which request and route are
/// current. All views share the route table and the cached base URL.
#[derive(Clone)]
pub struct Router {
    table: Arc<RwLock<RouteTable>>,
    settings: Arc<Settings>,
    base_url: Arc<OnceLock<Url>>,
    current_request: Option<Request>,
}

impl Router {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            table: Arc::new(RwLock::new(RouteTable::new())),
            settings,
            base_url: Arc::new(OnceLock::new()),
            current_request: None,
        }
    }

    pub fn add_route(&self, route: Route) -> Result<()> {
        trace!(pattern = %route.pattern(), name = ?route.get_name(), "Adding route");
        self.table.write().insert(route)
    }

    pub fn route_count(&self) -> usize {
        self.table.read().len()
    }

    /// Match a request against the table; returns the route itself and the
    /// match details.
    pub fn match_request(&self, method: &str, path: &str) -> Result<(Route, MatchedRoute)> {
        let table = self.table.read();
        let (index, matched) = table.match_route(method, path)?;
        let route = table
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("route index {} out of range", index)))?;
        Ok((route, matched))
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.table.read().named(name).is_some()
    }

    /// A view of this router bound to `request`.
    pub fn with_current_request(&self, request: Request) -> Router {
        Router {
            table: self.table.clone(),
            settings: self.settings.clone(),
            base_url: self.base_url.clone(),
            current_request: Some(request),
        }
    }

    pub fn current_request(&self) -> Option<&Request> {
        self.current_request.as_ref()
    }

    fn current_route(&self) -> Option<Arc<MatchedRoute>> {
        self.current_request
            .as_ref()
            .and_then(|req| req.current_route().ok())
    }

    /// Public base URL, computed once and then reused.
    ///
    /// The current request wins unless its host is an internal proxy name,
    /// in which case the `base_url` setting is used.
    pub fn base_url(&self) -> Result<Url> {
        if let Some(url) = self.base_url.get() {
            return Ok(url.clone());
        }

        let url = self.resolve_base_url()?;
        debug!(base_url = %url, "Resolved base URL");
        Ok(self.base_url.get_or_init(|| url).clone())
    }

    fn resolve_base_url(&self) -> Result<Url> {
        if let Some(req) = &self.current_request {
            let uri = req.uri();
            let host = uri.host_str().unwrap_or_default();
            if !host.is_empty() && !IGNORED_HOSTS.contains(&host) {
                let mut base = uri.clone();
                base.set_path("/");
                base.set_query(None);
                base.set_fragment(None);
                return Ok(base);
            }
        }

        self.settings
            .base_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|s| Url::parse(s).ok())
            .ok_or(Error::BaseUrl)
    }

    /// Resolve `uri` against the base URL when `absolute` is set.
    ///
    /// A URI of the form `//:PORT/path` keeps the base host but switches to
    /// the given port.
    pub fn compose_url(&self, uri: &str, absolute: bool) -> Result<String> {
        if !absolute {
            return Ok(uri.to_string());
        }

        let base = self.base_url()?;

        if let Some(rest) = uri.strip_prefix("//:") {
            let (port, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            let port: u16 = port
                .parse()
                .map_err(|_| Error::RouteGeneration(format!("Invalid port in {}", uri)))?;
            let mut url = join(&base, path)?;
            url.set_port(Some(port))
                .map_err(|_| Error::RouteGeneration(format!("Cannot set port on {}", url)))?;
            return Ok(url.to_string());
        }

        Ok(join(&base, uri)?.to_string())
    }

    /// URL for a named route.
    pub fn named(
        &self,
        name: &str,
        params: &BTreeMap<String, String>,
        query: &BTreeMap<String, String>,
        absolute: bool,
    ) -> Result<String> {
        let path = self.table.read().relative_path_for(name, params, query)?;
        self.compose_url(&path, absolute)
    }

    /// URL for `name` (or the current route) with the current route's
    /// arguments as defaults for `params`.
    pub fn from_here(
        &self,
        name: Option<&str>,
        params: &BTreeMap<String, String>,
        query: &BTreeMap<String, String>,
        absolute: bool,
    ) -> Result<String> {
        let route = self.current_route();

        let name = match (name, route.as_ref().and_then(|r| r.name.as_deref())) {
            (Some(name), _) => name.to_string(),
            (None, Some(current)) => current.to_string(),
            (None, None) => {
                return Err(Error::RouteGeneration(
                    "Cannot specify a null route name if no existing route is configured.".to_string(),
                ));
            }
        };

        let mut merged = route.map(|r| r.arguments.clone()).unwrap_or_default();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.named(&name, &merged, query, absolute)
    }

    /// Like [`Router::from_here`], also carrying over the current query string.
    pub fn from_here_with_query(
        &self,
        name: Option<&str>,
        params: &BTreeMap<String, String>,
        query: &BTreeMap<String, String>,
        absolute: bool,
    ) -> Result<String> {
        let mut merged = self
            .current_request
            .as_ref()
            .map(Request::query_params)
            .unwrap_or_default();
        merged.extend(query.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.from_here(name, params, &merged, absolute)
    }
}

fn join(base: &Url, uri: &str) -> Result<Url> {
    base.join(uri)
        .map_err(|e| Error::RouteGeneration(format!("Cannot compose URL from {}: {}", uri, e)))
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_count())
            .field("base_url", &self.base_url.get().map(Url::as_str))
            .field("current_request", &self.current_request.as_ref().map(Request::path))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::attributes;
    use crate::response::Response;
    use crate::routing::handler;

    fn settings(base_url: Option<&str>) -> Arc<Settings> {
        let mut settings = Settings::new("/var/azuracast/www");
        settings.base_url = base_url.map(str::to_string);
        Arc::new(settings)
    }

    fn router(base_url: Option<&str>) -> Router {
        let router = Router::new(settings(base_url));
        for (pattern, name) in [
            ("/", "home"),
            ("/station/{station}", "stations:index"),
            ("/station/{station}/files", "stations:files"),
        ] {
            let mut route = Route::new(&["GET"], pattern, handler(|_r, _c| async { Ok(Response::new()) }));
            route.name(name);
            router.add_route(route).unwrap();
        }
        router
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_ignored_host_uses_setting() {
        let router = router(Some("https://example.test"));
        let scoped = router.with_current_request(Request::get("http://nginx/api").unwrap());

        assert_eq!(scoped.base_url().unwrap().as_str(), "https://example.test/");
    }

    #[test]
    fn test_public_host_wins_over_setting() {
        let router = router(Some("https://example.test"));
        let scoped =
            router.with_current_request(Request::get("http://example.org:8080/public/x?y=1").unwrap());

        assert_eq!(scoped.base_url().unwrap().as_str(), "http://example.org:8080/");
    }

    #[test]
    fn test_missing_base_url() {
        let router = router(None);
        assert!(matches!(router.base_url(), Err(Error::BaseUrl)));

        let scoped = router.with_current_request(Request::get("/").unwrap());
        assert!(matches!(scoped.base_url(), Err(Error::BaseUrl)));
    }

    #[test]
    fn test_base_url_is_cached_across_views() {
        let router = router(Some("https://example.test"));
        router.base_url().unwrap();

        let scoped = router.with_current_request(Request::get("http://example.org/").unwrap());
        assert_eq!(scoped.base_url().unwrap().as_str(), "https://example.test/");
    }

    #[test]
    fn test_compose_url() {
        let router = router(Some("https://example.test"));

        assert_eq!(router.compose_url("/a/b", false).unwrap(), "/a/b");
        assert_eq!(router.compose_url("/a/b", true).unwrap(), "https://example.test/a/b");
        assert_eq!(
            router.compose_url("//:8000/radio.mp3", true).unwrap(),
            "https://example.test:8000/radio.mp3"
        );
    }

    #[test]
    fn test_named() {
        let router = router(Some("https://example.test"));
        let query = params(&[("page", "2")]);

        assert_eq!(
            router
                .named("stations:files", &params(&[("station", "1")]), &query, false)
                .unwrap(),
            "/station/1/files?page=2"
        );
        assert_eq!(
            router.named("home", &BTreeMap::new(), &BTreeMap::new(), true).unwrap(),
            "https://example.test/"
        );
    }

    #[test]
    fn test_from_here_defaults_to_current_route() {
        let router = router(Some("https://example.test"));
        let (_, matched) = router.match_request("GET", "/station/7").unwrap();
        let req = Request::get("/station/7?sort=asc")
            .unwrap()
            .with_attribute(attributes::ROUTE, Arc::new(matched));
        let scoped = router.with_current_request(req);

        assert_eq!(
            scoped.from_here(None, &BTreeMap::new(), &BTreeMap::new(), false).unwrap(),
            "/station/7"
        );
        assert_eq!(
            scoped
                .from_here(Some("stations:files"), &BTreeMap::new(), &BTreeMap::new(), false)
                .unwrap(),
            "/station/7/files"
        );
        assert_eq!(
            scoped
                .from_here(None, &params(&[("station", "9")]), &BTreeMap::new(), false)
                .unwrap(),
            "/station/9"
        );
        assert_eq!(
            scoped
                .from_here_with_query(None, &BTreeMap::new(), &params(&[("page", "3")]), false)
                .unwrap(),
            "/station/7?page=3&sort=asc"
        );
    }

    #[test]
    fn test_from_here_without_route() {
        let router = router(Some("https://example.test"));

        match router.from_here(None, &BTreeMap::new(), &BTreeMap::new(), false) {
            Err(Error::RouteGeneration(msg)) => {
                assert_eq!(msg, "Cannot specify a null route name if no existing route is configured.")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
