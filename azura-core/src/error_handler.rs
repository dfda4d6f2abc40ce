// Converts errors escaping the request pipeline into responses

use crate::error::Error;
use crate::middleware::session_cookie;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use azura_log::{log_at, warn};
use azura_session::{FlashLevel, Session, SessionManager};
use handlebars::Handlebars;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

const DETAILED_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
body { font-family: sans-serif; margin: 2em; color: #222; }
.kind { color: #a00; }
.location { color: #666; font-family: monospace; }
table { border-collapse: collapse; margin-bottom: 1.5em; }
th, td { text-align: left; padding: .25em 1em .25em 0; vertical-align: top; }
td { font-family: monospace; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<h2 class="kind">{{kind}}</h2>
<p class="message">{{{message}}}</p>
{{#if location}}<p class="location">{{location}}</p>{{/if}}
{{#if causes}}
<h3>Caused by</h3>
<ol>{{#each causes}}<li>{{this}}</li>{{/each}}</ol>
{{/if}}
{{#each tables}}
<h3>{{title}}</h3>
<table>{{#each rows}}<tr><th>{{key}}</th><td>{{value}}</td></tr>{{/each}}</table>
{{/each}}
</body>
</html>
"#;

const GENERIC_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>body { font-family: sans-serif; margin: 2em; color: #222; }</style>
</head>
<body>
<h1>{{title}}</h1>
<p>{{message}}</p>
</body>
</html>
"#;

/// Turns any error raised while handling a request into a response: a
/// login or home redirect for access errors, a JSON envelope for API and
/// XHR callers, or an HTML page that is detailed only when allowed.
pub struct ErrorHandler {
    show_detailed: bool,
    return_json: bool,
    router: Option<Arc<Router>>,
    sessions: Option<Arc<SessionManager>>,
    pages: Handlebars<'static>,
}

impl ErrorHandler {
    pub fn new(show_detailed: bool, return_json: bool) -> Self {
        Self {
            show_detailed,
            return_json,
            router: None,
            sessions: None,
            pages: Handlebars::new(),
        }
    }

    /// Router used to build login and home redirects.
    pub fn with_router(mut self, router: Arc<Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// Session store used to flash the reason for a redirect.
    pub fn with_sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn show_detailed(&self) -> bool {
        self.show_detailed
    }

    pub fn set_show_detailed(&mut self, show_detailed: bool) {
        self.show_detailed = show_detailed;
    }

    pub fn return_json(&self) -> bool {
        self.return_json
    }

    pub fn set_return_json(&mut self, return_json: bool) {
        self.return_json = return_json;
    }

    pub async fn handle(&self, req: &Request, err: &Error) -> Response {
        self.log(req, err);

        if req.user_agent().to_ascii_lowercase().contains("curl") {
            return Response::text(curl_message(err)).with_status(err.status_code());
        }

        let wants_json = req.is_xhr() || self.return_json;

        match err {
            Error::NotLoggedIn => return self.bounce(req, err, wants_json, "account:login", true).await,
            Error::PermissionDenied => return self.bounce(req, err, wants_json, "home", false).await,
            _ => {}
        }

        if wants_json {
            return json_response(err, self.show_detailed);
        }

        if self.show_detailed {
            self.detailed_page(err)
        } else {
            self.generic_page(err)
        }
    }

    fn log(&self, req: &Request, err: &Error) {
        let (file, line) = match err.location() {
            Some(location) => (location.file(), location.line()),
            None => ("", 0),
        };
        let context = err
            .as_exception()
            .map(|e| serde_json::to_string(&e.logging_context).unwrap_or_default())
            .unwrap_or_default();

        log_at!(
            err.level(),
            file,
            line,
            code = err.status_code(),
            method = %req.method(),
            path = %req.path(),
            context = %context,
            "{}",
            err
        );
    }

    async fn bounce(
        &self,
        req: &Request,
        err: &Error,
        wants_json: bool,
        route: &str,
        remember_referrer: bool,
    ) -> Response {
        if wants_json {
            return json_response(err, false);
        }

        let mut response = Response::redirect(&self.redirect_target(route), 302);
        if let Some(sessions) = &self.sessions {
            match flash_session(sessions, req, err, remember_referrer).await {
                Ok(Some(cookie)) => response = response.with_added_header("Set-Cookie", cookie),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Could not flash error to session"),
            }
        }
        response
    }

    fn redirect_target(&self, route: &str) -> String {
        let Some(router) = &self.router else {
            return "/".to_string();
        };
        match router.named(route, &BTreeMap::new(), &BTreeMap::new(), false) {
            Ok(url) => url,
            Err(e) => {
                warn!(route, error = %e, "Redirect route unavailable, using site root");
                "/".to_string()
            }
        }
    }

    fn detailed_page(&self, err: &Error) -> Response {
        let message = match err.as_exception().and_then(|e| e.formatted_message.clone()) {
            Some(formatted) => formatted,
            None => handlebars::html_escape(&err.to_string()),
        };
        let location = err
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let tables: Vec<Value> = err
            .as_exception()
            .map(|e| {
                e.extra_data
                    .iter()
                    .map(|(title, rows)| {
                        let rows: Vec<Value> = rows
                            .iter()
                            .map(|(key, value)| json!({ "key": key, "value": display_value(value) }))
                            .collect();
                        json!({ "title": title, "rows": rows })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let data = json!({
            "title": "An error occurred!",
            "kind": err.kind(),
            "message": message,
            "location": location,
            "causes": err.chain().into_iter().skip(1).collect::<Vec<_>>(),
            "tables": tables,
        });

        self.page(DETAILED_PAGE, &data, err)
    }

    fn generic_page(&self, err: &Error) -> Response {
        let (title, message) = match err.status_code() {
            404 => (
                "Page Not Found",
                "The page you are looking for could not be found. Check the address bar to ensure your URL is spelled correctly.",
            ),
            405 => (
                "Method not allowed",
                "The requested method is not allowed for this page.",
            ),
            _ => (
                "Application Error",
                "A website error has occurred. Sorry for the temporary inconvenience.",
            ),
        };
        self.page(GENERIC_PAGE, &json!({ "title": title, "message": message }), err)
    }

    fn page(&self, template: &str, data: &Value, err: &Error) -> Response {
        let status = err.status_code();
        match self.pages.render_template(template, data) {
            Ok(body) => Response::html(body).with_status(status),
            Err(e) => {
                warn!(error = %e, "Error page failed to render");
                Response::text(err.to_string()).with_status(status)
            }
        }
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("show_detailed", &self.show_detailed)
            .field("return_json", &self.return_json)
            .field("router", &self.router.is_some())
            .field("sessions", &self.sessions.is_some())
            .finish()
    }
}

fn curl_message(err: &Error) -> String {
    match err.location() {
        Some(location) => format!("Error: {} on {} L{}", err, location.file(), location.line()),
        None => format!("Error: {}", err),
    }
}

fn json_response(err: &Error, detailed: bool) -> Response {
    let stack_trace = if detailed { err.chain() } else { Vec::new() };
    let body = json!({
        "success": false,
        "code": err.status_code(),
        "message": err.to_string(),
        "stack_trace": stack_trace,
    });

    match Response::json(&body) {
        Ok(response) => response.with_status(err.status_code()),
        Err(_) => Response::text(err.to_string()).with_status(err.status_code()),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flashes the error into the requester's session. Returns a cookie to set
/// when the session had to be created here.
///
/// A session already attached by `EnableSession` is written to in place; that
/// middleware persists it and issues its cookie.
async fn flash_session(
    sessions: &SessionManager,
    req: &Request,
    err: &Error,
    remember_referrer: bool,
) -> crate::Result<Option<String>> {
    if let Ok(attached) = req.session() {
        flash_error(&attached, req, err, remember_referrer)?;
        return Ok(None);
    }

    let session = sessions.start(req.cookie(&sessions.cookie_name()).as_deref()).await?;
    flash_error(&session, req, err, remember_referrer)?;
    sessions.save(&session).await?;

    Ok(session
        .is_new()
        .then(|| session_cookie(sessions, session.id(), req.is_secure())))
}

fn flash_error(
    session: &Session,
    req: &Request,
    err: &Error,
    remember_referrer: bool,
) -> crate::Result<()> {
    session.flash(format!("<b>Error:</b> {}", err), FlashLevel::Error);
    if remember_referrer {
        session.set("login_referrer", req.path())?;
    }
    Ok(())
}
