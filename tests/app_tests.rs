//! Full-stack tests over the default service catalog.

use azura::testing::TestApp;
use azura::{
    AppBuilder, Assets, BuildRoutes, Environment, Error, ErrorHandler, RateLimitMiddleware,
    Request, Response, Router, SessionManager, handler,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

fn body_json(res: &Response) -> Value {
    serde_json::from_slice(res.body_bytes()).unwrap()
}

#[tokio::test]
async fn test_named_routes_resolve_through_request_router() {
    let app = TestApp::with(|builder| {
        builder.routes(|app| {
            app.group("/api", |api| {
                api.get(
                    "/station/{id}",
                    handler(|req, _| async move {
                        let router = req.router()?;
                        let mut query = BTreeMap::new();
                        query.insert("format".to_string(), "json".to_string());
                        let url = router.from_here(None, &BTreeMap::new(), &query, false)?;
                        Response::json(&json!({ "id": req.route_param("id"), "url": url }))
                    }),
                )
                .name("api:station");
            });
            Ok(())
        })
    })
    .unwrap();

    let res = app.get("/api/station/12").await.unwrap();
    assert_eq!(res.status(), 200);
    let body = body_json(&res);
    assert_eq!(body["id"], "12");
    assert_eq!(body["url"], "/api/station/12?format=json");
}

#[tokio::test]
async fn test_trailing_slash_redirects() {
    let app = TestApp::with(|builder| {
        builder.routes(|app| {
            app.get("/profile", handler(|_, _| async { Ok(Response::text("profile")) }));
            Ok(())
        })
    })
    .unwrap();

    let res = app.get("/profile/?tab=1").await.unwrap();
    assert_eq!(res.status(), 301);
    assert_eq!(res.header("Location"), Some("/profile?tab=1"));
}

#[tokio::test]
async fn test_session_survives_between_requests() {
    let app = TestApp::with(|builder| {
        builder.routes(|app| {
            app.get(
                "/visits",
                handler(|req, _| async move {
                    let session = req.session()?;
                    let visits = session.get::<u32>("visits").unwrap_or(0) + 1;
                    session.set("visits", visits)?;
                    Ok(Response::text(visits.to_string()))
                }),
            );
            Ok(())
        })
    })
    .unwrap();

    let first = app.get("/visits").await.unwrap();
    assert_eq!(first.body_string(), "1");
    let cookie = first
        .header("Set-Cookie")
        .and_then(|c| c.split(';').next())
        .unwrap()
        .to_string();

    let manager = app.container().resolve::<SessionManager>().unwrap();
    assert!(cookie.starts_with(&manager.cookie_name()));

    let second = app
        .request(Request::get("/visits").unwrap().with_header("Cookie", cookie))
        .await;
    assert_eq!(second.body_string(), "2");
    assert!(second.header("Set-Cookie").is_none());
}

#[tokio::test]
async fn test_errors_render_as_json_in_testing() {
    let app = TestApp::with(|builder| {
        builder.routes(|app| {
            app.get("/admin", handler(|_, _| async { Err(Error::NotLoggedIn) }));
            app.get(
                "/broken",
                handler(|_, _| async { Err(Error::exception("Station offline")) }),
            );
            Ok(())
        })
    })
    .unwrap();

    let res = app.get("/admin").await.unwrap();
    assert_eq!(res.status(), 403);
    let body = body_json(&res);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "You must be logged in to access this page.");

    let res = app.get("/broken").await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(body_json(&res)["message"], "Station offline");

    let res = app.post_json("/broken", &json!({})).await.unwrap();
    assert_eq!(res.status(), 405);
}

#[tokio::test]
async fn test_host_services_replace_defaults() {
    let app = TestApp::with(|builder| {
        builder
            .services(|c| {
                c.singleton_type(|_| Ok(ErrorHandler::new(false, false)));
                Ok(())
            })
            .routes(|app| {
                app.get("/broken", handler(|_, _| async { Err(Error::exception("hidden")) }));
                Ok(())
            })
    })
    .unwrap();

    let res = app.get("/broken").await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.header("Content-Type").unwrap_or_default().starts_with("text/html"));
    assert!(!res.body_string().contains("hidden"));
}

#[tokio::test]
async fn test_event_hooks_run_before_default_listener() {
    let app = TestApp::with(|builder| {
        builder.events(|dispatcher| {
            dispatcher.add_listener(10, |event: &mut BuildRoutes| {
                assert!(event.app().middleware().is_empty());
                event
                    .app_mut()
                    .get("/early", handler(|_, _| async { Ok(Response::text("early")) }));
                Ok(())
            });
        })
    })
    .unwrap();

    assert_eq!(app.app().middleware().len(), 3);
    let res = app.get("/early").await.unwrap();
    assert_eq!(res.body_string(), "early");
}

#[tokio::test]
async fn test_rate_limit_is_bypassed_in_testing() {
    let app = TestApp::with(|builder| {
        builder.routes(|app| {
            let limiter = app.container().resolve::<azura::RateLimit>()?;
            app.post("/login", handler(|_, _| async { Ok(Response::text("ok")) }))
                .add(RateLimitMiddleware::new(limiter).group("login").interval(1));
            Ok(())
        })
    })
    .unwrap();

    for _ in 0..5 {
        let res = app.post_json("/login", &json!({"user": "dj"})).await.unwrap();
        assert_eq!(res.status(), 200);
    }
}

#[tokio::test]
async fn test_assets_load_library_manifest() {
    let app = TestApp::new().unwrap();
    let config_dir = app.settings().unwrap().config_dir.clone();
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("assets.json"),
        json!({
            "jquery": {"order": 0, "files": {"js": ["dist/jquery.min.js"]}},
            "player": {
                "order": 10,
                "require": ["jquery"],
                "files": {"js": [{"src": "https://cdn.example.test/player.js", "defer": true}]}
            }
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        config_dir.join("assets_versioned.json"),
        json!({"dist/jquery.min.js": "dist/jquery.min.abc123.js"}).to_string(),
    )
    .unwrap();

    let assets = app.container().resolve::<Assets>().unwrap();
    assets.load("player").unwrap();
    let js = assets.js();

    let jquery = js.find("/static/dist/jquery.min.abc123.js").unwrap();
    let player = js.find("https://cdn.example.test/player.js").unwrap();
    assert!(jquery < player);
    assert!(assets.csp_domains().contains(&"https://cdn.example.test".to_string()));

    let fresh = app.container().get::<Assets>("assets").unwrap();
    assert!(!fresh.is_loaded("player"));
}

#[tokio::test]
async fn test_console_runs_cache_clear() {
    let dir = tempfile::tempdir().unwrap();
    let console = AppBuilder::new(dir.path().join("www"))
        .setting("app_env", "testing")
        .setting("is_docker", false)
        .environment(Environment::new())
        .logging(false)
        .build_console()
        .unwrap();

    let settings = console.get_service::<azura::Settings>("settings").unwrap();
    assert!(settings.is_cli());

    let code = console.clone().run(["azura", "cache:clear"]).await.unwrap();
    assert_eq!(code, 0);

    let err = console.get_service::<Router>("nope").unwrap_err();
    assert_eq!(err.to_string(), "Service \"nope\" not found.");
}

#[tokio::test]
async fn test_first_visit_error_keeps_flashed_session() {
    let app = TestApp::with(|builder| {
        builder
            .services(|c| {
                c.singleton_type(|c| {
                    Ok(ErrorHandler::new(false, false).with_sessions(c.resolve::<SessionManager>()?))
                });
                Ok(())
            })
            .routes(|app| {
                app.get("/admin/stations", handler(|_, _| async { Err(Error::NotLoggedIn) }));
                Ok(())
            })
    })
    .unwrap();

    let res = app.get("/admin/stations").await.unwrap();
    assert_eq!(res.status(), 302);
    let cookies = res.header_values("Set-Cookie");
    assert_eq!(cookies.len(), 1);

    let id = cookies[0]
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, v)| v.to_string())
        .unwrap();
    let manager = app.container().resolve::<SessionManager>().unwrap();
    let session = manager.load(&id).await.unwrap().unwrap();
    assert!(session.has_flash());
    assert_eq!(session.get::<String>("login_referrer").as_deref(), Some("/admin/stations"));
}
