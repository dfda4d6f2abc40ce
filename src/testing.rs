//! Test harness for applications built on this crate.
//!
//! [`TestApp`] boots an [`App`] in the testing environment over a temporary
//! base directory and dispatches requests without opening a socket.

use crate::bootstrap::AppBuilder;
use crate::services::SharedKv;
use azura_cache::MemoryBackend;
use azura_config::{Environment, Settings, keys};
use azura_core::{App, Container, Request, Response, Result, type_key};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// An application booted for tests; the base directory lives as long as it does.
pub struct TestApp {
    app: App,
    dir: TempDir,
}

impl TestApp {
    /// Boot with no host routes.
    pub fn new() -> Result<Self> {
        Self::with(|builder| builder)
    }

    /// Boot after letting `configure` add hooks or settings.
    ///
    /// The base directory is `{tmp}/www`, so config files written to
    /// `{tmp}/www/config` before the first request are picked up lazily.
    pub fn with<F>(configure: F) -> Result<Self>
    where
        F: FnOnce(AppBuilder) -> AppBuilder,
    {
        let dir = tempfile::tempdir()?;
        let base_dir = dir.path().join("www");
        std::fs::create_dir_all(&base_dir)?;

        let builder = AppBuilder::new(&base_dir)
            .setting(keys::APP_ENV, "testing")
            .setting(keys::IS_DOCKER, false)
            .environment(Environment::new())
            .logging(false)
            .services(|c| {
                c.instance(type_key::<SharedKv>(), Arc::new(Arc::new(MemoryBackend::new()) as SharedKv));
                Ok(())
            });

        let app = configure(builder).build()?;
        Ok(Self { app, dir })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn container(&self) -> &Container {
        self.app.container()
    }

    pub fn settings(&self) -> Result<Arc<Settings>> {
        self.container().resolve::<Settings>()
    }

    /// Root of the temporary tree (the parent of the base directory).
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub async fn request(&self, req: Request) -> Response {
        self.app.handle(req).await
    }

    pub async fn get(&self, uri: &str) -> Result<Response> {
        Ok(self.request(Request::get(uri)?).await)
    }

    pub async fn post_json<T: Serialize>(&self, uri: &str, body: &T) -> Result<Response> {
        Ok(self.request(Request::post(uri)?.with_json(body)?).await)
    }
}

impl std::fmt::Debug for TestApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestApp")
            .field("dir", &self.dir.path())
            .finish_non_exhaustive()
    }
}
