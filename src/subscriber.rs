//! Default listeners for the lifecycle events.

use crate::bootstrap::RouteHooks;
use crate::commands::ClearCache;
use azura_core::{
    BuildConsoleCommands, BuildRoutes, EnableRouter, EnableSession, EventDispatcher,
    RemoveSlashes, Result,
};
use azura_log::debug;

/// Priority of the default listeners; host listeners above it run first.
pub const DEFAULT_PRIORITY: i32 = 0;

pub fn subscribe(dispatcher: &mut EventDispatcher) {
    dispatcher.add_listener(DEFAULT_PRIORITY, build_routes);
    dispatcher.add_listener(DEFAULT_PRIORITY, register_console_commands);
}

/// Add the default middleware, outermost first, then run the host route hooks.
fn build_routes(event: &mut BuildRoutes) -> Result<()> {
    let app = event.app_mut();
    app.add_from_container::<RemoveSlashes>()?
        .add_from_container::<EnableSession>()?
        .add_from_container::<EnableRouter>()?;

    let container = app.container().clone();
    if container.has_type::<RouteHooks>() {
        let hooks = container.resolve::<RouteHooks>()?;
        debug!(hooks = hooks.len(), "Loading application routes");
        for hook in hooks.iter() {
            hook(app)?;
        }
    }
    Ok(())
}

fn register_console_commands(event: &mut BuildConsoleCommands) -> Result<()> {
    event.console_mut().add(ClearCache);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use azura_core::{App, Container, ConsoleApplication, Router};
    use azura_config::Settings;
    use std::sync::Arc;

    #[test]
    fn test_console_gets_cache_clear() {
        let mut dispatcher = EventDispatcher::new();
        subscribe(&mut dispatcher);

        let console = ConsoleApplication::new("CLI", "1.0.0", Container::new());
        let console = dispatcher
            .dispatch(BuildConsoleCommands::new(console))
            .unwrap()
            .into_console();
        assert!(console.has("cache:clear"));
    }

    #[test]
    fn test_routes_need_default_middleware() {
        let mut dispatcher = EventDispatcher::new();
        subscribe(&mut dispatcher);

        let router = Arc::new(Router::new(Arc::new(Settings::new("/srv/www"))));
        let app = App::new(Container::new(), router);
        let err = dispatcher.dispatch(BuildRoutes::new(app)).err().unwrap();
        assert!(matches!(err, azura_core::Error::ServiceNotFound(_)));
    }
}
