//! End-to-end tests over a real socket.

use azura_config::Settings;
use azura_core::{
    App, Container, EnableRouter, Error, ErrorHandler, HttpClient, Request, Response, Router,
    handler,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn spawn(app: App) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        app.serve_with_shutdown(listener, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    (format!("http://{}", addr), tx)
}

fn app() -> App {
    let mut settings = Settings::new("/srv/www");
    settings.base_url = Some("https://radio.example.test".to_string());
    let container = Container::new();
    container.instance(azura_core::ERROR_HANDLER, Arc::new(ErrorHandler::new(false, true)));

    let router = Arc::new(Router::new(Arc::new(settings)));
    let mut app = App::new(container, router.clone());
    app.add(EnableRouter::new(router));
    app
}

#[tokio::test]
async fn test_serves_routes_and_json_errors() {
    let mut app = app();
    app.get(
        "/api/station/{id}",
        handler(|req, _| async move {
            let router = req.router()?;
            let url = router.from_here(None, &BTreeMap::new(), &BTreeMap::new(), true)?;
            Response::json(&serde_json::json!({
                "id": req.route_param("id"),
                "self": url,
            }))
        }),
    )
    .name("api:station");
    app.get("/api/fail", handler(|_, _| async { Err(Error::exception("Broken")) }));
    app.finalize().unwrap();

    let (base, shutdown) = spawn(app).await;
    let client = HttpClient::new().unwrap();

    let res = client.get(&format!("{}/api/station/7", base)).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["id"], "7");
    // The socket host is an ordinary address, so it becomes the base URL.
    assert!(body["self"].as_str().unwrap().ends_with("/api/station/7"));
    assert!(body["self"].as_str().unwrap().starts_with("http://127.0.0.1:"));

    let res = client.get(&format!("{}/api/fail", base)).await.unwrap();
    assert_eq!(res.status().as_u16(), 500);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Broken");

    let res = client.get(&format!("{}/missing", base)).await.unwrap();
    assert_eq!(res.status().as_u16(), 404);

    shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_forwarded_proto_marks_request_secure() {
    let mut app = app();
    app.get(
        "/scheme",
        handler(|req, _| async move {
            Ok(Response::text(if req.is_secure() { "https" } else { "http" }))
        }),
    );
    app.finalize().unwrap();

    let (base, shutdown) = spawn(app).await;
    let client = HttpClient::new().unwrap();

    let plain = client.get(&format!("{}/scheme", base)).await.unwrap();
    assert_eq!(plain.text().await.unwrap(), "http");

    let proxied = client
        .send(
            client
                .request(reqwest::Method::GET, &format!("{}/scheme", base))
                .header("X-Forwarded-Proto", "https"),
        )
        .await
        .unwrap();
    assert_eq!(proxied.text().await.unwrap(), "https");

    shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_file_download_streams_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("playlist.m3u");
    std::fs::write(&path, "#EXTM3U\nhttp://radio.example.test/stream\n").unwrap();

    let mut app = app();
    let served = path.clone();
    app.get(
        "/download",
        handler(move |_, _| {
            let served = served.clone();
            async move { Response::new().render_file(&served, None) }
        }),
    );
    app.finalize().unwrap();

    let (base, shutdown) = spawn(app).await;
    let client = HttpClient::new().unwrap();

    let res = client.get(&format!("{}/download", base)).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let disposition = res
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("attachment"));
    assert!(disposition.contains("playlist.m3u"));
    assert!(res.text().await.unwrap().starts_with("#EXTM3U"));

    shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_handle_without_socket() {
    let mut app = app();
    app.post(
        "/echo",
        handler(|req, _| async move {
            let name = req.param("name").and_then(|v| v.as_str().map(str::to_string));
            Ok(Response::text(name.unwrap_or_default()))
        }),
    );
    app.finalize().unwrap();

    let req = Request::post("/echo")
        .unwrap()
        .with_form(&[("name", "Azura")])
        .unwrap();
    let res = app.handle(req).await;
    assert_eq!(res.body_string(), "Azura");
}
