// Inbound request context

use crate::error::{Error, Result};
use crate::router::Router;
use crate::routing::MatchedRoute;
use crate::view::View;
use azura_session::Session;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::any::{Any, type_name};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use url::Url;

/// Attribute names injected by the built-in middleware.
pub mod attributes {
    pub const ROUTER: &str = "router";
    pub const SESSION: &str = "session";
    pub const VIEW: &str = "view";
    pub const ROUTE: &str = "route";
}

/// Placeholder origin for requests built from a bare path.
const DEFAULT_ORIGIN: &str = "http://localhost";

/// One inbound HTTP call.
///
/// Built once per request and handed down the middleware chain by value;
/// middleware adds typed attributes with [`Request::with_attribute`].
#[derive(Clone)]
pub struct Request {
    method: String,
    uri: Url,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    remote_addr: Option<SocketAddr>,
    route_params: BTreeMap<String, String>,
    attributes: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Request {
    /// `uri` may be absolute or a path, which is resolved against
    /// `http://localhost`.
    pub fn new(method: impl Into<String>, uri: &str) -> Result<Self> {
        let uri = match Url::parse(uri) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(DEFAULT_ORIGIN)
                .and_then(|base| base.join(uri))
                .map_err(|e| Error::Http(format!("invalid request URI {:?}: {}", uri, e)))?,
            Err(e) => return Err(Error::Http(format!("invalid request URI {:?}: {}", uri, e))),
        };

        Ok(Self {
            method: method.into().to_ascii_uppercase(),
            uri,
            headers: HashMap::new(),
            body: Vec::new(),
            remote_addr: None,
            route_params: BTreeMap::new(),
            attributes: HashMap::new(),
        })
    }

    pub fn get(uri: &str) -> Result<Self> {
        Self::new("GET", uri)
    }

    pub fn post(uri: &str) -> Result<Self> {
        Self::new("POST", uri)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and content type.
    pub fn with_json<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    /// Set a URL-encoded form body and content type.
    pub fn with_form<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_urlencoded::to_string(value)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(body))
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_attribute<T: Send + Sync + 'static>(mut self, name: &str, value: Arc<T>) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn without_attribute(mut self, name: &str) -> Self {
        self.attributes.remove(name);
        self
    }

    pub fn with_route_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.route_params = params;
        self
    }

    /// Replace the path, keeping the query string.
    pub fn with_path(mut self, path: &str) -> Self {
        self.uri.set_path(path);
        self
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        // Only fails for scheme changes `url` refuses, such as special to non-special.
        let _ = self.uri.set_scheme(scheme);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request URI. Default ports (`http` on 80, `https` on 443) are never
    /// kept, including after a scheme rewrite.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Decoded query parameters; later duplicates win.
    pub fn query_params(&self) -> BTreeMap<String, String> {
        self.uri.query_pairs().into_owned().collect()
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.uri
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or_default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.header("cookie")?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"').to_string())
    }

    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.get(name).map(String::as_str)
    }

    pub fn route_params(&self) -> &BTreeMap<String, String> {
        &self.route_params
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Form or JSON body as a map, when the content type is one of those.
    pub fn parsed_body(&self) -> Option<Map<String, Value>> {
        let content_type = self.header("content-type")?;
        if content_type.starts_with("application/json") {
            match serde_json::from_slice(&self.body) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&self.body).ok()?;
            Some(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            )
        } else {
            None
        }
    }

    /// Body parameter, falling back to the query string.
    pub fn param(&self, key: &str) -> Option<Value> {
        self.parsed_body()
            .and_then(|mut body| body.remove(key))
            .filter(|v| !v.is_null())
            .or_else(|| self.query(key).map(Value::String))
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.param(key).is_some()
    }

    pub fn is_xhr(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }

    pub fn is_secure(&self) -> bool {
        self.uri.scheme() == "https"
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attribute_any(&self, name: &str) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.attributes.get(name)
    }

    /// Typed attribute; fails when it is absent or of another type.
    pub fn attribute<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let value = self
            .attributes
            .get(name)
            .ok_or_else(|| Error::MissingAttribute(name.to_string()))?;

        value.clone().downcast::<T>().map_err(|_| Error::AttributeType {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Set by `EnableRouter`.
    pub fn router(&self) -> Result<Arc<Router>> {
        self.attribute(attributes::ROUTER)
    }

    /// Set by `EnableSession`.
    pub fn session(&self) -> Result<Arc<Session>> {
        self.attribute(attributes::SESSION)
    }

    /// Set by `EnableView`.
    pub fn view(&self) -> Result<Arc<View>> {
        self.attribute(attributes::VIEW)
    }

    pub fn current_route(&self) -> Result<Arc<MatchedRoute>> {
        self.attribute(attributes::ROUTE)
    }

    /// Summary exposed to templates.
    pub fn template_data(&self) -> Value {
        json!({
            "method": self.method,
            "uri": self.uri().as_str(),
            "path": self.path(),
            "query": self.query_params(),
            "is_secure": self.is_secure(),
            "is_xhr": self.is_xhr(),
        })
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri.as_str())
            .field("headers", &self.headers.len())
            .field("body", &self.body.len())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}
