// Core library for the Azura framework
// Service container, request pipeline, routing, events, views and error handling

pub mod application;
pub mod assets;
pub mod console;
pub mod container;
pub mod error;
pub mod error_handler;
pub mod events;
pub mod http_client;
pub mod middleware;
pub mod normalizer;
pub mod request;
pub mod response;
pub mod router;
pub mod routing;
pub mod view;

// Re-export commonly used types
pub use application::{App, ERROR_HANDLER};
pub use assets::{AssetFile, Assets, AttrValue, InlineAsset, Library, LibraryFiles, LibraryInline};
pub use console::{Command, ConsoleApplication};
pub use container::{Container, Service, type_key};
pub use error::{AppException, Error, Result};
pub use error_handler::ErrorHandler;
pub use events::{BuildConsoleCommands, BuildRoutes, BuildView, Event, EventDispatcher};
pub use http_client::HttpClient;
pub use middleware::{
    EnableRouter, EnableSession, EnableView, HandlerFn, Middleware, MiddlewareChain, Next,
    RemoveSlashes,
};
pub use normalizer::{Entity, EntityLookup, Field, FieldInput, FieldKind, FieldValue, Repository};
pub use request::{Request, attributes};
pub use response::{Body, Response};
pub use router::Router;
pub use routing::{MatchedRoute, Route, RouteHandler, handler};
pub use view::View;

pub use async_trait::async_trait;
pub use azura_log as logging;
