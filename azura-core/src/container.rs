// Lazy service container

use crate::error::{Error, Result};
use azura_log::{debug, trace};
use parking_lot::RwLock;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A resolved service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Builds a service, pulling its own dependencies from the container.
pub type Factory = Arc<dyn Fn(&Container) -> Result<Service> + Send + Sync>;

/// Upper bound on alias hops; `alias` already refuses cycles.
const MAX_ALIAS_DEPTH: usize = 32;

#[derive(Clone)]
enum Entry {
    /// Built on first access, then reused
    Singleton(Factory),
    /// Built on every access
    Transient(Factory),
    /// Redirects to another key
    Alias(String),
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    instances: HashMap<String, Service>,
}

/// Service locator keyed by name or by type name.
///
/// Factories run without the container lock held, so they are free to
/// resolve other services. Cycles between factories are not detected.
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<RwLock<Inner>>,
}

/// Key used for type-keyed registrations.
pub fn type_key<T: ?Sized + 'static>() -> &'static str {
    type_name::<T>()
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating service container");
        Self::default()
    }

    /// Register a factory; `cached` selects singleton or per-access behaviour.
    /// Replaces any previous entry under `key`.
    pub fn register<F>(&self, key: impl Into<String>, factory: F, cached: bool)
    where
        F: Fn(&Container) -> Result<Service> + Send + Sync + 'static,
    {
        let key = key.into();
        let factory: Factory = Arc::new(factory);
        let entry = if cached {
            Entry::Singleton(factory)
        } else {
            Entry::Transient(factory)
        };

        let mut inner = self.inner.write();
        inner.instances.remove(&key);
        inner.entries.insert(key.clone(), entry);
        trace!(service = %key, cached, "Service registered");
    }

    /// Register a shared service built once on first access.
    pub fn singleton<T, F>(&self, key: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.register(key, move |c| Ok(Arc::new(factory(c)?) as Service), true);
    }

    /// Register a service rebuilt on every access.
    pub fn factory<T, F>(&self, key: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.register(key, move |c| Ok(Arc::new(factory(c)?) as Service), false);
    }

    /// Register an already-built instance.
    pub fn instance<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: Arc<T>) {
        let key = key.into();
        let service: Service = value;
        let mut inner = self.inner.write();
        inner.instances.insert(key.clone(), service.clone());
        inner
            .entries
            .insert(key, Entry::Singleton(Arc::new(move |_| Ok(service.clone()))));
    }

    /// Singleton keyed by the type name of `T`.
    pub fn singleton_type<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.singleton(type_key::<T>(), factory);
    }

    /// Make `from` resolve to whatever `to` resolves to.
    pub fn alias(&self, from: impl Into<String>, to: impl Into<String>) -> Result<()> {
        let from = from.into();
        let to = to.into();

        let mut inner = self.inner.write();
        let mut cursor = to.as_str();
        for _ in 0..MAX_ALIAS_DEPTH {
            if cursor == from {
                return Err(Error::AliasCycle(from));
            }
            match inner.entries.get(cursor) {
                Some(Entry::Alias(next)) => cursor = next,
                _ => break,
            }
        }

        inner.instances.remove(&from);
        inner.entries.insert(from.clone(), Entry::Alias(to.clone()));
        trace!(alias = %from, target = %to, "Alias registered");
        Ok(())
    }

    pub fn remove_alias(&self, from: &str) {
        let mut inner = self.inner.write();
        if matches!(inner.entries.get(from), Some(Entry::Alias(_))) {
            inner.entries.remove(from);
        }
    }

    /// Whether `key` (or the key it aliases) can be resolved.
    pub fn has(&self, key: &str) -> bool {
        let inner = self.inner.read();
        Self::canonical(&inner, key).is_some()
    }

    pub fn has_type<T: ?Sized + 'static>(&self) -> bool {
        self.has(type_key::<T>())
    }

    /// Every registered key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn canonical(inner: &Inner, key: &str) -> Option<String> {
        let mut cursor = key;
        for _ in 0..MAX_ALIAS_DEPTH {
            match inner.entries.get(cursor)? {
                Entry::Alias(next) => cursor = next,
                _ => return Some(cursor.to_string()),
            }
        }
        None
    }

    /// Resolve a key to its untyped instance.
    pub fn get_any(&self, key: &str) -> Result<Service> {
        let (target, factory, cached) = {
            let inner = self.inner.read();
            let target = Self::canonical(&inner, key)
                .ok_or_else(|| Error::ServiceNotFound(key.to_string()))?;

            if let Some(instance) = inner.instances.get(&target) {
                return Ok(instance.clone());
            }

            match inner.entries.get(&target) {
                Some(Entry::Singleton(f)) => (target, f.clone(), true),
                Some(Entry::Transient(f)) => (target, f.clone(), false),
                _ => return Err(Error::ServiceNotFound(key.to_string())),
            }
        };

        trace!(service = %target, "Building service");
        let instance = factory(self).map_err(|e| {
            if e.is_application_error() {
                e
            } else {
                Error::Container {
                    id: key.to_string(),
                    source: Box::new(e),
                }
            }
        })?;

        if !cached {
            return Ok(instance);
        }

        // A concurrent build may have won; keep the first instance.
        let mut inner = self.inner.write();
        Ok(inner.instances.entry(target).or_insert(instance).clone())
    }

    /// Resolve a key and downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>> {
        self.get_any(key)?
            .downcast::<T>()
            .map_err(|_| Error::ServiceType {
                id: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Resolve the service registered under the type name of `T`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get::<T>(type_key::<T>())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Container")
            .field("entries", &inner.entries.len())
            .field("instances", &inner.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Station {
        name: String,
    }

    #[test]
    fn test_singleton_is_cached() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        container.singleton("station", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Station {
                name: "Radio".into(),
            })
        });

        let a = container.get::<Station>("station").unwrap();
        let b = container.get::<Station>("station").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name, "Radio");
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_rebuilds_every_time() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        container.factory("view", move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)));

        let a = container.get::<usize>("view").unwrap();
        let b = container.get::<usize>("view").unwrap();

        assert_eq!((*a, *b), (0, 1));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_alias_resolves_target() {
        let container = Container::new();
        container.singleton("errorHandler.real", |_| Ok(7u32));
        container.alias("errorHandler", "errorHandler.real").unwrap();
        container.alias("phpErrorHandler", "errorHandler").unwrap();

        let direct = container.get::<u32>("errorHandler.real").unwrap();
        let aliased = container.get::<u32>("phpErrorHandler").unwrap();
        assert!(Arc::ptr_eq(&direct, &aliased));
        assert!(container.has("phpErrorHandler"));

        container.remove_alias("phpErrorHandler");
        assert!(!container.has("phpErrorHandler"));
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let container = Container::new();
        container.alias("a", "b").unwrap();
        container.alias("b", "c").unwrap();

        assert!(matches!(container.alias("c", "a"), Err(Error::AliasCycle(_))));
        assert!(matches!(container.alias("d", "d"), Err(Error::AliasCycle(_))));
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let container = Container::new();
        container.alias("db", "missing").unwrap();

        assert!(matches!(
            container.get_any("nothing"),
            Err(Error::ServiceNotFound(k)) if k == "nothing"
        ));
        assert!(matches!(container.get_any("db"), Err(Error::ServiceNotFound(_))));
        assert!(!container.has("db"));
    }

    #[test]
    fn test_wrong_type() {
        let container = Container::new();
        container.singleton("settings", |_| Ok(1u8));

        assert!(matches!(
            container.get::<String>("settings"),
            Err(Error::ServiceType { .. })
        ));
    }

    #[test]
    fn test_factory_errors_are_wrapped() {
        let container = Container::new();
        container.singleton("cache", |c| {
            c.get::<u32>("redis")?;
            Ok(())
        });

        match container.get_any("cache") {
            Err(Error::Container { id, source }) => {
                assert_eq!(id, "cache");
                assert!(matches!(*source, Error::ServiceNotFound(ref k) if k == "redis"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_application_errors_pass_through() {
        let container = Container::new();
        container.singleton::<(), _>("em", |_| Err(Error::Bootstrap("no database".into())));

        assert!(matches!(container.get_any("em"), Err(Error::Bootstrap(_))));
    }

    #[test]
    fn test_nested_resolution_and_type_keys() {
        let container = Container::new();
        container.singleton_type(|_| {
            Ok(Station {
                name: "Nested".into(),
            })
        });
        container.singleton("greeting", |c| {
            let station = c.resolve::<Station>()?;
            Ok(format!("Welcome to {}", station.name))
        });

        assert!(container.has_type::<Station>());
        assert_eq!(
            *container.get::<String>("greeting").unwrap(),
            "Welcome to Nested"
        );
    }

    #[test]
    fn test_instance_and_reregistration() {
        let container = Container::new();
        container.instance("name", Arc::new(String::from("first")));
        assert_eq!(*container.get::<String>("name").unwrap(), "first");

        container.singleton("name", |_| Ok(String::from("second")));
        assert_eq!(*container.get::<String>("name").unwrap(), "second");
        assert_eq!(container.keys(), vec!["name".to_string()]);
    }
}
