//! Built-in console commands.

use async_trait::async_trait;
use azura_cache::Cache;
use azura_core::{Command, ConsoleApplication, Result};
use azura_log::info;
use clap::ArgMatches;

/// `cache:clear`: flush the application cache partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearCache;

#[async_trait]
impl Command for ClearCache {
    fn name(&self) -> &'static str {
        "cache:clear"
    }

    fn about(&self) -> &'static str {
        "Clear all application caches."
    }

    async fn execute(&self, console: &ConsoleApplication, _args: &ArgMatches) -> Result<i32> {
        let cache = console.container().resolve::<Cache>()?;
        cache.clear().await?;

        info!("Application cache cleared");
        println!("Local cache flushed.");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azura_cache::MemoryStore;
    use azura_core::{Container, type_key};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_clears_cache_partition() {
        let cache = Cache::new(Arc::new(MemoryStore::new(0)));
        cache.set("station", "KRAD", None).await.unwrap();

        let container = Container::new();
        container.instance(type_key::<Cache>(), Arc::new(cache));

        let mut console = ConsoleApplication::new("CLI", "1.0.0", container.clone());
        console.add(ClearCache);
        assert_eq!(console.run_command("cache:clear", &[]).await.unwrap(), 0);

        let cache = container.resolve::<Cache>().unwrap();
        assert!(!cache.has("station").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_cache_service_fails() {
        let mut console = ConsoleApplication::new("CLI", "1.0.0", Container::new());
        console.add(ClearCache);
        assert!(console.run_command("cache:clear", &[]).await.is_err());
    }
}
