// Lifecycle events and the synchronous dispatcher

use crate::application::App;
use crate::console::ConsoleApplication;
use crate::error::Result;
use crate::view::View;
use azura_log::{debug, trace};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// An event type. Listeners receive it mutably and may reshape it.
pub trait Event: Any + Send {
    const NAME: &'static str;
}

type Listener = Arc<dyn Fn(&mut dyn Any) -> Result<()> + Send + Sync>;

struct Registered {
    priority: i32,
    listener: Listener,
}

/// In-process publish/subscribe keyed by event type.
///
/// Listeners run in descending priority; equal priorities run in the order
/// they were added. The first listener error stops the dispatch.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: HashMap<TypeId, Vec<Registered>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<E, F>(&mut self, priority: i32, listener: F)
    where
        E: Event,
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(move |event: &mut dyn Any| match event.downcast_mut::<E>() {
            Some(event) => listener(event),
            None => Ok(()),
        });

        let list = self.listeners.entry(TypeId::of::<E>()).or_default();
        let position = list
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(list.len());
        list.insert(position, Registered { priority, listener });

        trace!(event = E::NAME, priority, "Listener added");
    }

    pub fn has_listeners<E: Event>(&self) -> bool {
        self.listener_count::<E>() > 0
    }

    pub fn listener_count<E: Event>(&self) -> usize {
        self.listeners.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    /// Run every listener for `E` over `event` and hand it back.
    pub fn dispatch<E: Event>(&self, mut event: E) -> Result<E> {
        let listeners = match self.listeners.get(&TypeId::of::<E>()) {
            Some(listeners) => listeners,
            None => {
                trace!(event = E::NAME, "No listeners registered");
                return Ok(event);
            }
        };

        debug!(event = E::NAME, listeners = listeners.len(), "Dispatching event");
        for registered in listeners {
            (registered.listener)(&mut event)?;
        }
        Ok(event)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.listeners.len())
            .finish()
    }
}

/// Fired once per bootstrap so listeners can add middleware and routes.
pub struct BuildRoutes {
    app: App,
}

impl BuildRoutes {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    pub fn into_app(self) -> App {
        self.app
    }
}

impl Event for BuildRoutes {
    const NAME: &'static str = "build-routes";
}

/// Fired when a view is built, before it is handed out.
pub struct BuildView {
    view: View,
}

impl BuildView {
    pub fn new(view: View) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut View {
        &mut self.view
    }

    pub fn into_view(self) -> View {
        self.view
    }
}

impl Event for BuildView {
    const NAME: &'static str = "build-view";
}

/// Fired once per CLI run so listeners can register commands.
pub struct BuildConsoleCommands {
    console: ConsoleApplication,
}

impl BuildConsoleCommands {
    pub fn new(console: ConsoleApplication) -> Self {
        Self { console }
    }

    pub fn console(&self) -> &ConsoleApplication {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut ConsoleApplication {
        &mut self.console
    }

    pub fn into_console(self) -> ConsoleApplication {
        self.console
    }
}

impl Event for BuildConsoleCommands {
    const NAME: &'static str = "build-console-commands";
}
