// Web application: route registration, dispatch and the HTTP server

use crate::container::Container;
use crate::error::{Error, Result};
use crate::error_handler::ErrorHandler;
use crate::middleware::{HandlerFn, Middleware, MiddlewareChain};
use crate::request::{Request, attributes};
use crate::response::{Body, Response};
use crate::router::Router;
use crate::routing::{Route, RouteHandler};
use azura_log::{debug, info, warn};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::io::ReaderStream;

type HyperBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Container key of the error handler.
pub const ERROR_HANDLER: &str = "errorHandler";

/// The web application.
///
/// Routes added through [`App::map`] and its shorthands are staged until
/// [`App::finalize`] commits them to the shared router. Application
/// middleware wraps every request; the first one added runs outermost.
#[derive(Clone)]
pub struct App {
    container: Container,
    router: Arc<Router>,
    middleware: MiddlewareChain,
    pending: Vec<Route>,
}

impl App {
    pub fn new(container: Container, router: Arc<Router>) -> Self {
        Self {
            container,
            router,
            middleware: MiddlewareChain::new(),
            pending: Vec::new(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Stage a route for `methods` and return it for naming and
    /// route-level middleware.
    pub fn map(&mut self, methods: &[&str], pattern: &str, handler: RouteHandler) -> &mut Route {
        let index = self.pending.len();
        self.pending.push(Route::new(methods, pattern, handler));
        &mut self.pending[index]
    }

    pub fn get(&mut self, pattern: &str, handler: RouteHandler) -> &mut Route {
        self.map(&["GET"], pattern, handler)
    }

    pub fn post(&mut self, pattern: &str, handler: RouteHandler) -> &mut Route {
        self.map(&["POST"], pattern, handler)
    }

    pub fn put(&mut self, pattern: &str, handler: RouteHandler) -> &mut Route {
        self.map(&["PUT"], pattern, handler)
    }

    pub fn patch(&mut self, pattern: &str, handler: RouteHandler) -> &mut Route {
        self.map(&["PATCH"], pattern, handler)
    }

    pub fn delete(&mut self, pattern: &str, handler: RouteHandler) -> &mut Route {
        self.map(&["DELETE"], pattern, handler)
    }

    pub fn any(&mut self, pattern: &str, handler: RouteHandler) -> &mut Route {
        self.map(&["ANY"], pattern, handler)
    }

    /// Routes staged inside `build` get `prefix` prepended to their pattern.
    pub fn group<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut App),
    {
        let start = self.pending.len();
        build(self);
        for route in &mut self.pending[start..] {
            route.prefix_pattern(prefix);
        }
        self
    }

    /// Add application middleware.
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.middleware.use_middleware(middleware);
        self
    }

    pub fn add_arc(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push_arc(middleware);
        self
    }

    /// Add middleware registered in the container under its type.
    pub fn add_from_container<M: Middleware + 'static>(&mut self) -> Result<&mut Self> {
        let middleware: Arc<dyn Middleware> = self.container.resolve::<M>()?;
        self.middleware.push_arc(middleware);
        Ok(self)
    }

    /// Commit staged routes to the router.
    pub fn finalize(&mut self) -> Result<()> {
        let count = self.pending.len();
        for route in self.pending.drain(..) {
            self.router.add_route(route)?;
        }
        debug!(routes = count, total = self.router.route_count(), "Routes committed");
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run a request through the application and render any error.
    pub async fn handle(&self, req: Request) -> Response {
        match self.dispatch(req.clone()).await {
            Ok(response) => response,
            Err(err) => self.error_handler().handle(&req, &err).await,
        }
    }

    /// Run a request through middleware and the matched route, returning
    /// errors unrendered.
    pub async fn dispatch(&self, req: Request) -> Result<Response> {
        if !self.is_finalized() {
            return Err(Error::Bootstrap(format!(
                "{} route(s) were staged but never committed.",
                self.pending.len()
            )));
        }

        // Resolve the route up front so middleware can see it. A failed match
        // is reported by the terminal handler after middleware has run.
        let req = match self.router.match_request(req.method(), req.path()) {
            Ok((_, matched)) => req.with_attribute(attributes::ROUTE, Arc::new(matched)),
            Err(_) => req,
        };

        let router = self.router.clone();
        let container = self.container.clone();
        let terminal: HandlerFn = Arc::new(move |req: Request| {
            let router = router.clone();
            let container = container.clone();
            Box::pin(async move { run_route(&router, container, req).await })
        });

        self.middleware.apply(req, terminal).await
    }

    fn error_handler(&self) -> Arc<ErrorHandler> {
        match self.container.get::<ErrorHandler>(ERROR_HANDLER) {
            Ok(handler) => handler,
            Err(e) => {
                debug!(error = %e, "No error handler registered, using defaults");
                Arc::new(ErrorHandler::new(false, false))
            }
        }
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let app = Arc::new(self);
        info!(addr = %listener.local_addr()?, "Server listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, remote) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let app = app.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let app = app.clone();
                    async move { Ok::<_, Infallible>(serve_request(&app, req, remote).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(error = %e, remote = %remote, "Connection closed with error");
                }
            });
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.router.route_count())
            .field("pending", &self.pending.len())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

async fn run_route(router: &Router, container: Container, req: Request) -> Result<Response> {
    let (route, matched) = router.match_request(req.method(), req.path())?;
    let req = req
        .with_route_params(matched.arguments.clone())
        .with_attribute(attributes::ROUTE, Arc::new(matched));

    let handler = route.handler().clone();
    let endpoint: HandlerFn = Arc::new(move |req: Request| handler(req, container.clone()));
    route.middleware().apply(req, endpoint).await
}

async fn serve_request(
    app: &App,
    req: hyper::Request<Incoming>,
    remote: SocketAddr,
) -> hyper::Response<HyperBody> {
    let head = *req.method() == hyper::Method::HEAD;
    let response = match into_request(req, remote).await {
        Ok(req) => app.handle(req).await,
        Err(e) => {
            warn!(error = %e, remote = %remote, "Rejected malformed request");
            Response::text("Bad Request").with_status(400)
        }
    };

    match into_hyper(response, head).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Failed to build response");
            let mut fallback = hyper::Response::new(full(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

async fn into_request(req: hyper::Request<Incoming>, remote: SocketAddr) -> Result<Request> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| Error::Http(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    let host = parts
        .headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = match parts.headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()) {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    let path = parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    let mut request = Request::new(parts.method.as_str(), &format!("{}://{}{}", scheme, host, path))?;
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    Ok(request.with_body(body.to_vec()).with_remote_addr(remote))
}

async fn into_hyper(response: Response, head: bool) -> Result<hyper::Response<HyperBody>> {
    let mut builder = hyper::Response::builder().status(response.status());
    for (name, value) in response.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body: HyperBody = if head {
        Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
    } else {
        match response.body() {
            Body::Bytes(bytes) => full(Bytes::from(bytes.clone())),
            Body::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                StreamBody::new(ReaderStream::new(file).map_ok(Frame::data)).boxed_unsync()
            }
        }
    };

    builder
        .body(body)
        .map_err(|e| Error::Http(format!("Invalid response: {}", e)))
}

fn full(bytes: Bytes) -> HyperBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Next, RemoveSlashes};
    use crate::routing::handler;
    use async_trait::async_trait;
    use azura_config::Settings;

    fn app() -> App {
        let settings = Arc::new(Settings::new("/srv/www"));
        App::new(Container::new(), Arc::new(Router::new(settings)))
    }

    struct SeesRoute;

    #[async_trait]
    impl Middleware for SeesRoute {
        async fn handle(&self, req: Request, next: Next) -> Result<Response> {
            let name = req
                .current_route()
                .ok()
                .and_then(|r| r.name.clone())
                .unwrap_or_default();
            Ok(next(req).await?.with_header("X-Route", name))
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_named_route() {
        let mut app = app();
        app.get(
            "/station/{id}",
            handler(|req, _| async move {
                Ok(Response::text(req.route_param("id").unwrap_or_default().to_string()))
            }),
        )
        .name("station");
        app.add(SeesRoute);
        app.finalize().unwrap();

        let res = app.handle(Request::get("/station/12").unwrap()).await;
        assert_eq!(res.status(), 200);
        assert_eq!(res.body_string(), "12");
        assert_eq!(res.header("X-Route"), Some("station"));
    }

    #[tokio::test]
    async fn test_unfinalized_app_refuses_requests() {
        let mut app = app();
        app.get("/", handler(|_, _| async { Ok(Response::new()) }));

        let err = app.dispatch(Request::get("/").unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Bootstrap(_)));
    }

    #[tokio::test]
    async fn test_missing_route_reaches_error_handler() {
        let mut app = app();
        app.post("/upload", handler(|_, _| async { Ok(Response::new()) }));
        app.finalize().unwrap();

        let res = app.handle(Request::get("/nothing").unwrap()).await;
        assert_eq!(res.status(), 404);

        let res = app.handle(Request::get("/upload").unwrap()).await;
        assert_eq!(res.status(), 405);
    }

    #[tokio::test]
    async fn test_middleware_runs_before_route_matching() {
        let mut app = app();
        app.add(RemoveSlashes);
        app.post(
            "/save",
            handler(|req, _| async move { Ok(Response::text(req.path().to_string())) }),
        );
        app.finalize().unwrap();

        let res = app.handle(Request::post("/save/").unwrap()).await;
        assert_eq!(res.body_string(), "/save");

        let res = app.handle(Request::get("/save/").unwrap()).await;
        assert_eq!(res.status(), 301);
    }

    #[tokio::test]
    async fn test_group_prefixes_patterns() {
        let mut app = app();
        app.group("/admin", |admin| {
            admin.get("/", handler(|_, _| async { Ok(Response::text("index")) }));
            admin
                .get("/users", handler(|_, _| async { Ok(Response::text("users")) }))
                .name("admin:users");
        });
        app.finalize().unwrap();

        assert_eq!(app.handle(Request::get("/admin").unwrap()).await.body_string(), "index");
        assert_eq!(
            app.router()
                .named("admin:users", &Default::default(), &Default::default(), false)
                .unwrap(),
            "/admin/users"
        );
    }

    #[tokio::test]
    async fn test_registered_error_handler_is_used() {
        let mut app = app();
        app.container()
            .instance(ERROR_HANDLER, Arc::new(ErrorHandler::new(false, true)));
        app.get("/", handler(|_, _| async { Err(Error::exception("Nope")) }));
        app.finalize().unwrap();

        let res = app.handle(Request::get("/").unwrap()).await;
        assert_eq!(res.status(), 500);
        assert_eq!(res.header("Content-Type"), Some("application/json"));
    }
}
