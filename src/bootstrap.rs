//! Application bootstrap.
//!
//! [`AppBuilder`] loads settings, seeds the container, lets the host override
//! services, registers the default catalog and fires [`BuildRoutes`].

use crate::services;
use azura_config::{ConfigError, Environment, Settings, SettingsLoader, keys};
use azura_core::{
    App, BuildRoutes, ConsoleApplication, Container, Error, EventDispatcher, Result, Router,
    type_key,
};
use azura_log::{Logger, debug, info};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

type ServicesHook = Box<dyn FnOnce(&Container) -> Result<()>>;

/// Listener registration run when the event dispatcher is first built.
pub type EventsHook = Arc<dyn Fn(&mut EventDispatcher) + Send + Sync>;

/// Route registration run while the default subscriber handles [`BuildRoutes`].
pub type RoutesHook = Arc<dyn Fn(&mut App) -> Result<()> + Send + Sync>;

/// Host event hooks, stored in the container for the dispatcher factory.
#[derive(Default, Clone)]
pub struct EventHooks(Vec<EventsHook>);

impl EventHooks {
    pub fn iter(&self) -> impl Iterator<Item = &EventsHook> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Host route hooks, stored in the container for the default subscriber.
#[derive(Default, Clone)]
pub struct RouteHooks(Vec<RoutesHook>);

impl RouteHooks {
    pub fn iter(&self) -> impl Iterator<Item = &RoutesHook> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds an [`App`] or a [`ConsoleApplication`] from settings and host hooks.
///
/// ```no_run
/// use azura::{AppBuilder, Response, handler};
///
/// # async fn run() -> azura::Result<()> {
/// let app = AppBuilder::new("/var/azuracast/www")
///     .setting("is_docker", false)
///     .routes(|app| {
///         app.get("/", handler(|_, _| async { Ok(Response::text("ok")) }))
///             .name("home");
///         Ok(())
///     })
///     .build()?;
///
/// app.listen("0.0.0.0:8080").await
/// # }
/// ```
pub struct AppBuilder {
    loader: SettingsLoader,
    services: Vec<ServicesHook>,
    events: Vec<EventsHook>,
    routes: Vec<RoutesHook>,
    logging: bool,
}

impl AppBuilder {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir: PathBuf = base_dir.into();
        Self::from_settings(Map::new())
            .setting(keys::BASE_DIR, base_dir.to_string_lossy().into_owned())
    }

    /// Start from a raw settings map; `base_dir` must be among the keys.
    pub fn from_settings(settings: Map<String, Value>) -> Self {
        Self {
            loader: SettingsLoader::new().with_overrides(settings),
            services: Vec::new(),
            events: Vec::new(),
            routes: Vec::new(),
            logging: true,
        }
    }

    pub fn setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.loader = self.loader.set(key, value);
        self
    }

    /// Use a fixed environment snapshot instead of the process environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.loader = self.loader.with_environment(environment);
        self
    }

    /// Mark the process as a command-line invocation.
    pub fn cli(self) -> Self {
        self.setting(keys::IS_CLI, true)
    }

    /// Install the global logger while building. On by default.
    pub fn logging(mut self, enable: bool) -> Self {
        self.logging = enable;
        self
    }

    /// Register or replace services before the default catalog fills the gaps.
    pub fn services<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Container) -> Result<()> + 'static,
    {
        self.services.push(Box::new(hook));
        self
    }

    /// Add event listeners when the dispatcher is built.
    pub fn events<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EventDispatcher) + Send + Sync + 'static,
    {
        self.events.push(Arc::new(hook));
        self
    }

    /// Register routes after the default middleware is in place.
    pub fn routes<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut App) -> Result<()> + Send + Sync + 'static,
    {
        self.routes.push(Arc::new(hook));
        self
    }

    /// Load settings and wire the container without building routes.
    pub fn container(self) -> Result<Container> {
        let (settings, environment) = self.loader.load().map_err(|e| match e {
            missing @ ConfigError::MissingBaseDir => Error::Bootstrap(missing.to_string()),
            other => Error::Config(other),
        })?;

        let container = Container::new();
        container.instance(type_key::<Settings>(), Arc::new(settings));
        container.instance(type_key::<Environment>(), Arc::new(environment));
        container.instance(type_key::<EventHooks>(), Arc::new(EventHooks(self.events)));
        container.instance(type_key::<RouteHooks>(), Arc::new(RouteHooks(self.routes)));

        for hook in self.services {
            hook(&container)?;
        }
        services::register_defaults(&container)?;

        if self.logging {
            let logger = container.resolve::<Logger>()?;
            debug!(logger = logger.name(), level = %logger.level(), "Logger ready");
        }

        Ok(container)
    }

    /// Build the web application and fire [`BuildRoutes`].
    pub fn build(self) -> Result<App> {
        let container = self.container()?;
        let router = container.resolve::<Router>()?;
        let app = App::new(container.clone(), router.clone());

        let dispatcher = container.resolve::<EventDispatcher>()?;
        let mut app = dispatcher.dispatch(BuildRoutes::new(app))?.into_app();
        app.finalize()?;

        info!(
            routes = router.route_count(),
            middleware = app.middleware().len(),
            "Application ready"
        );
        Ok(app)
    }

    /// Build the console application for a CLI entry point.
    pub fn build_console(self) -> Result<ConsoleApplication> {
        let container = self.cli().container()?;
        let console = container.resolve::<ConsoleApplication>()?;
        Ok(console.as_ref().clone())
    }

    /// Build the console application and run it with `args` (program name first).
    pub async fn run_console<I, T>(self, args: I) -> Result<i32>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        self.build_console()?.run(args).await
    }
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder")
            .field("loader", &self.loader)
            .field("services", &self.services.len())
            .field("events", &self.events.len())
            .field("routes", &self.routes.len())
            .field("logging", &self.logging)
            .finish()
    }
}
