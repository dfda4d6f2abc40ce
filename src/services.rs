//! Default service catalog.
//!
//! Every entry is registered only when its key is still free, so hosts can
//! replace any service from an [`AppBuilder::services`](crate::AppBuilder::services)
//! hook before this runs. Factories pull their dependencies from the
//! container on first use, so registration order does not matter.

use crate::bootstrap::EventHooks;
use crate::subscriber;
use azura_cache::{Cache, KvBackend, partition};
use azura_config::{ConfigRepository, Environment, Settings};
use azura_core::console::{DEFAULT_NAME, DEFAULT_VERSION};
use azura_core::{
    Assets, ConsoleApplication, Container, EnableRouter, EnableSession, EnableView, Error,
    ErrorHandler, EventDispatcher, HttpClient, Library, RemoveSlashes, Response, Result, Router,
    View, type_key,
};
use azura_log::{LogConfig, Logger, debug, trace};
use azura_ratelimit::{RateLimit, RateLimitMiddleware};
use azura_session::{SessionManager, app_prefix};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Shared key-value backend; each feature selects its own partition.
pub type SharedKv = Arc<dyn KvBackend>;

/// Config file holding the asset library manifest.
pub const ASSETS_CONFIG: &str = "assets";
/// Config file mapping asset names to cache-busted file names.
pub const VERSIONED_ASSETS_CONFIG: &str = "assets_versioned";

pub fn register_defaults(container: &Container) -> Result<()> {
    if !container.has_type::<Settings>() {
        return Err(Error::Bootstrap("No settings registered.".to_string()));
    }
    alias(container, "settings", type_key::<Settings>())?;

    if !container.has_type::<Environment>() {
        container.instance(type_key::<Environment>(), Arc::new(Environment::from_process()));
    }
    alias(container, "environment", type_key::<Environment>())?;

    if !container.has("response") {
        container.factory("response", |c| {
            let settings = c.resolve::<Settings>()?;
            Ok(Response::new().with_version(settings.http_version.clone()))
        });
    }

    register(container, |c| Ok(Router::new(c.resolve::<Settings>()?)));
    alias(container, "router", type_key::<Router>())?;

    register(container, |c| {
        let settings = c.resolve::<Settings>()?;
        Ok(
            ErrorHandler::new(!settings.is_production(), settings.is_cli() || settings.is_testing())
                .with_router(c.resolve::<Router>()?)
                .with_sessions(c.resolve::<SessionManager>()?),
        )
    });
    alias(container, azura_core::ERROR_HANDLER, type_key::<ErrorHandler>())?;
    alias(container, "phpErrorHandler", type_key::<ErrorHandler>())?;

    register(container, |_| HttpClient::new());

    register::<SharedKv, _>(container, |c| {
        let settings = c.resolve::<Settings>()?;
        Ok(default_backend(&settings))
    });

    register(container, |c| {
        let kv = c.resolve::<SharedKv>()?;
        Ok(Cache::new(kv.select(partition::CACHE)))
    });

    register(container, |c| {
        Ok(ConfigRepository::new(c.resolve::<Settings>()?.config_dir.clone()))
    });
    alias(container, "config", type_key::<ConfigRepository>())?;

    register(container, |c| {
        Ok(ConsoleApplication::new(DEFAULT_NAME, DEFAULT_VERSION, c.clone()))
    });

    register(container, |c| {
        let mut dispatcher = EventDispatcher::new();
        subscriber::subscribe(&mut dispatcher);
        if c.has_type::<EventHooks>() {
            for hook in c.resolve::<EventHooks>()?.iter() {
                hook(&mut dispatcher);
            }
        }
        Ok(dispatcher)
    });

    register(container, |c| {
        let settings = c.resolve::<Settings>()?;
        let config = LogConfig::for_environment(
            settings.name.clone(),
            settings.is_production(),
            &settings.temp_dir,
            settings.is_docker() || settings.is_cli(),
        );
        Ok(Logger::install(config)?)
    });

    register(container, |c| Ok(EnableRouter::new(c.resolve::<Router>()?)));
    register(container, |c| {
        Ok(EnableSession::new(c.resolve::<SessionManager>()?)
            .with_error_handler(c.get::<ErrorHandler>(azura_core::ERROR_HANDLER)?))
    });
    register(container, |c| Ok(EnableView::new(c.clone())));
    register(container, |c| Ok(RateLimitMiddleware::new(c.resolve::<RateLimit>()?)));
    register(container, |_| Ok(RemoveSlashes));

    register(container, |c| {
        let kv = c.resolve::<SharedKv>()?;
        Ok(RateLimit::new(kv.select(partition::RATE_LIMIT), c.resolve::<Settings>()?))
    });

    register(container, |c| {
        let settings = c.resolve::<Settings>()?;
        let kv = c.resolve::<SharedKv>()?;
        Ok(SessionManager::new(app_prefix(&settings.base_dir), kv.select(partition::SESSION)))
    });

    if !container.has_type::<View>() {
        container.factory(type_key::<View>(), build_view);
    }
    alias(container, "view", type_key::<View>())?;

    if !container.has_type::<Assets>() {
        container.factory(type_key::<Assets>(), build_assets);
    }
    alias(container, "assets", type_key::<Assets>())?;

    #[cfg(feature = "database")]
    crate::database::register(container)?;

    debug!(services = container.keys().len(), "Default services registered");
    Ok(())
}

fn register<T, F>(container: &Container, factory: F)
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
{
    if container.has_type::<T>() {
        trace!(service = type_key::<T>(), "Keeping host-provided service");
        return;
    }
    container.singleton_type(factory);
}

fn alias(container: &Container, from: &str, to: &str) -> Result<()> {
    if container.has(from) {
        return Ok(());
    }
    container.alias(from, to)
}

#[cfg(feature = "redis")]
fn default_backend(settings: &Settings) -> SharedKv {
    Arc::new(azura_cache::RedisBackend::new(azura_cache::KvConfig::for_docker(
        settings.is_docker(),
    )))
}

#[cfg(not(feature = "redis"))]
fn default_backend(_settings: &Settings) -> SharedKv {
    Arc::new(azura_cache::MemoryBackend::new())
}

fn build_view(container: &Container) -> Result<View> {
    let settings = container.resolve::<Settings>()?;
    let view = View::new(&settings.views_dir)?;
    view.add_data("settings", settings.as_ref());

    let dispatcher = container.resolve::<EventDispatcher>()?;
    Ok(dispatcher.dispatch(azura_core::BuildView::new(view))?.into_view())
}

fn build_assets(container: &Container) -> Result<Assets> {
    let settings = container.resolve::<Settings>()?;
    let config = container.resolve::<ConfigRepository>()?;

    let libraries: BTreeMap<String, Library> = if config.has(ASSETS_CONFIG) {
        config.get_as(ASSETS_CONFIG)?
    } else {
        BTreeMap::new()
    };
    let versioned: HashMap<String, String> = if config.has(VERSIONED_ASSETS_CONFIG) {
        config.get_as(VERSIONED_ASSETS_CONFIG)?
    } else {
        HashMap::new()
    };

    Ok(Assets::new(settings.assets_url.clone())
        .with_libraries(libraries)
        .with_versioned_files(versioned))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(settings: Settings) -> Container {
        let container = Container::new();
        container.instance(type_key::<Settings>(), Arc::new(settings));
        container.instance(type_key::<Environment>(), Arc::new(Environment::new()));
        container
    }

    #[test]
    fn test_requires_settings() {
        assert!(matches!(
            register_defaults(&Container::new()),
            Err(Error::Bootstrap(_))
        ));
    }

    #[test]
    fn test_aliases_resolve_to_typed_services() {
        let container = seeded(Settings::new("/srv/www"));
        register_defaults(&container).unwrap();

        let by_alias = container.get::<Router>("router").unwrap();
        let by_type = container.resolve::<Router>().unwrap();
        assert!(Arc::ptr_eq(&by_alias, &by_type));

        let handler = container.get::<ErrorHandler>("errorHandler").unwrap();
        let php = container.get::<ErrorHandler>("phpErrorHandler").unwrap();
        assert!(Arc::ptr_eq(&handler, &php));
        assert_eq!(
            container.get::<Settings>("settings").unwrap().base_dir,
            std::path::PathBuf::from("/srv/www")
        );
    }

    #[test]
    fn test_host_services_are_kept() {
        let container = seeded(Settings::new("/srv/www"));
        container.singleton_type(|_| Ok(ErrorHandler::new(true, true)));
        register_defaults(&container).unwrap();

        let handler = container.get::<ErrorHandler>("errorHandler").unwrap();
        assert!(handler.show_detailed());
        assert!(handler.return_json());
    }

    #[test]
    fn test_error_handler_policy_follows_environment() {
        let container = seeded(Settings::new("/srv/www"));
        register_defaults(&container).unwrap();
        let handler = container.resolve::<ErrorHandler>().unwrap();
        assert!(!handler.show_detailed());
        assert!(!handler.return_json());

        let mut settings = Settings::new("/srv/www");
        settings.app_env = azura_config::AppEnv::Testing;
        let container = seeded(settings);
        register_defaults(&container).unwrap();
        let handler = container.resolve::<ErrorHandler>().unwrap();
        assert!(handler.show_detailed());
        assert!(handler.return_json());
    }

    #[test]
    fn test_view_and_response_are_rebuilt() {
        let container = seeded(Settings::new("/nonexistent/www"));
        register_defaults(&container).unwrap();

        let a = container.resolve::<View>().unwrap();
        let b = container.resolve::<View>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(a.data().contains_key("settings"));

        let response = container.get::<Response>("response").unwrap();
        assert_eq!(response.version(), "1.1");
    }

    #[tokio::test]
    async fn test_features_use_separate_partitions() {
        let container = seeded(Settings::new("/srv/www"));
        container.instance(
            type_key::<SharedKv>(),
            Arc::new(Arc::new(azura_cache::MemoryBackend::new()) as SharedKv),
        );
        register_defaults(&container).unwrap();

        let cache = container.resolve::<Cache>().unwrap();
        cache.set("rate_limit:default:10.0.0.1", &5, None).await.unwrap();

        let limiter = container.resolve::<RateLimit>().unwrap();
        limiter
            .check_ip("10.0.0.1", "default", std::time::Duration::from_secs(5), 2)
            .await
            .unwrap();
    }
}
