// Middleware pipeline and built-in request interceptors

use crate::container::Container;
use crate::error::Result;
use crate::error_handler::ErrorHandler;
use crate::request::{Request, attributes};
use crate::response::Response;
use crate::router::Router;
use crate::view::View;
use async_trait::async_trait;
use azura_log::{debug, trace, warn};
use azura_session::SessionManager;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Continuation into the rest of the chain.
pub type Next =
    Box<dyn FnOnce(Request) -> Pin<Box<dyn Future<Output = Result<Response>> + Send>> + Send>;

/// Innermost handler the chain wraps.
pub type HandlerFn =
    Arc<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Result<Response>> + Send>> + Send + Sync>;

/// A request interceptor.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: Request, next: Next) -> Result<Response>;
}

/// Ordered middleware. The first one added is the outermost.
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.push_arc(Arc::new(middleware));
    }

    pub fn push_arc(&mut self, middleware: Arc<dyn Middleware>) {
        let mut mws = (*self.middlewares).clone();
        mws.push(middleware);
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub async fn apply(&self, req: Request, handler: HandlerFn) -> Result<Response> {
        trace!(
            middleware_count = self.middlewares.len(),
            path = %req.path(),
            method = %req.method(),
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(
        &self,
        index: usize,
        req: Request,
        handler: HandlerFn,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send>> {
        match self.middlewares.get(index) {
            None => handler(req),
            Some(middleware) => {
                let middleware = middleware.clone();
                let chain = self.clone();
                Box::pin(async move {
                    middleware
                        .handle(
                            req,
                            Box::new(move |req| chain.execute_from(index + 1, req, handler)),
                        )
                        .await
                })
            }
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips a trailing slash from the path. `GET` requests are redirected
/// permanently; other methods continue with the rewritten path.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveSlashes;

#[async_trait]
impl Middleware for RemoveSlashes {
    async fn handle(&self, req: Request, next: Next) -> Result<Response> {
        let path = req.path();
        if path == "/" || !path.ends_with('/') {
            return next(req).await;
        }

        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();

        if req.method() == "GET" {
            let location = match req.query_string() {
                Some(query) => format!("{}?{}", trimmed, query),
                None => trimmed,
            };
            trace!(from = %req.path(), to = %location, "Redirecting trailing slash");
            return Ok(Response::redirect(&location, 301));
        }

        next(req.with_path(&trimmed)).await
    }
}

/// Attaches a request-scoped router as the `router` attribute.
#[derive(Debug, Clone)]
pub struct EnableRouter {
    router: Arc<Router>,
}

impl EnableRouter {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Middleware for EnableRouter {
    async fn handle(&self, req: Request, next: Next) -> Result<Response> {
        let scoped = Arc::new(self.router.with_current_request(req.clone()));
        next(req.with_attribute(attributes::ROUTER, scoped)).await
    }
}

/// Starts or resumes the session, attaches it as the `session` attribute
/// and persists it once the inner chain finishes, whether or not it failed.
///
/// With an error handler attached, failures are rendered here so a freshly
/// issued session cookie reaches the client on error pages too.
#[derive(Debug, Clone)]
pub struct EnableSession {
    manager: Arc<SessionManager>,
    error_handler: Option<Arc<ErrorHandler>>,
}

impl EnableSession {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            error_handler: None,
        }
    }

    pub fn with_error_handler(mut self, error_handler: Arc<ErrorHandler>) -> Self {
        self.error_handler = Some(error_handler);
        self
    }
}

#[async_trait]
impl Middleware for EnableSession {
    async fn handle(&self, req: Request, next: Next) -> Result<Response> {
        let cookie_name = self.manager.cookie_name();
        let session = Arc::new(self.manager.start(req.cookie(&cookie_name).as_deref()).await?);
        let secure = req.is_secure();

        let req = req.with_attribute(attributes::SESSION, session.clone());
        let result = match (next(req.clone()).await, &self.error_handler) {
            (Err(err), Some(handler)) => Ok(handler.handle(&req, &err).await),
            (result, _) => result,
        };

        if let Err(e) = self.manager.save(&session).await {
            warn!(session_id = %session.id(), error = %e, "Failed to persist session");
        }

        let response = result?;
        if !session.is_new() {
            return Ok(response);
        }

        debug!(session_id = %session.id(), "Issuing session cookie");
        Ok(response.with_added_header("Set-Cookie", session_cookie(&self.manager, session.id(), secure)))
    }
}

/// `Set-Cookie` value carrying a session ID.
pub fn session_cookie(manager: &SessionManager, id: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; Max-Age={}",
        manager.cookie_name(),
        id,
        manager.lifetime().as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Builds a view for the request and attaches it as the `view` attribute.
#[derive(Debug, Clone)]
pub struct EnableView {
    container: Container,
}

impl EnableView {
    pub fn new(container: Container) -> Self {
        Self { container }
    }
}

#[async_trait]
impl Middleware for EnableView {
    async fn handle(&self, req: Request, next: Next) -> Result<Response> {
        let view = self.container.resolve::<View>()?;
        view.add_data("request", req.template_data());
        if let Ok(session) = req.session() {
            view.set_session(session);
        }

        next(req.with_attribute(attributes::VIEW, view)).await
    }
}
