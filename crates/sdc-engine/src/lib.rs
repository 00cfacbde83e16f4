//! sdc Engine
//!
//! Component runtime for server-rendered pages: registered custom tags are
//! discovered in the live tree, bound to controllers, filled with content
//! fetched from their content URL and kept up to date through refresh
//! cycles and tree reconciliation.
//!
//! # Example
//! ```rust,ignore
//! use sdc_engine::{App, AppConfig, HttpLoader};
//!
//! let config = AppConfig::default().with_env()?;
//! let app = App::new(config.clone(), Rc::new(HttpLoader::new(&config)?));
//! app.register("main-view", MainView::default);
//! app.append_markup("<main-view data-user-id=\"4\"></main-view>")?;
//! app.block_on(app.init());
//! ```

mod app;
mod cache;
mod component;
mod config;
mod controller;
mod error;
mod events;
mod http;
mod lifecycle;
mod loader;
pub mod params;
mod refresh;
mod registry;
mod value;

pub use app::{App, AppState, RegistrationBuilder};
pub use cache::{CacheStats, ContentCache};
pub use component::{ComponentId, ComponentRecord, LifecycleState, ModelHandle};
pub use config::{AppConfig, ConfigError};
pub use controller::{Controller, Hook, HookCx, Propagation, Region, RootController};
pub use error::{EngineError, EngineResult};
pub use events::{
    event_attr, split_tokens, DelegatedEvents, EventBus, EventTable, EVENT_ATTR_PREFIX, EVENT_TOKEN_PREFIX,
};
pub use http::HttpLoader;
pub use lifecycle::{NAV_LOADED_EVENT, REDIRECT_EVENT};
pub use loader::{ContentLoader, LoadFailure, LoadRequest, StaticLoader, STATUS_MOVED};
pub use params::Params;
pub use refresh::{prepare_refresh_process, ProcessHandle, RefreshProcess, REGION_PREFIX};
pub use registry::{tag_for_type, Registration, TagRegistry, MIXIN_SEPARATOR};
pub use value::Value;

// Re-export sub-crates for advanced usage
pub use sdc_dom as dom;
pub use sdc_html as html;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
