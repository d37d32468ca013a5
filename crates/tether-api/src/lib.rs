//! # tether-api
//!
//! Boundary contracts between the tether plugin core and the collaborators a
//! host embeds it with: the module bundler, the live-reload proxy server, the
//! optional HTTP middleware it attaches, and the optional in-place content
//! injector.
//!
//! The plugin core never probes the environment for optional collaborators.
//! Hosts resolve capabilities up front and hand in trait objects (or `None`)
//! through [`Collaborators`]; absence is a capability-off state, not an
//! error.
//!
//! ```text
//! host ──────────────┐
//!                    ▼
//!   Bundler ◄── tether core ──► ReloadServer
//!                    │
//!                    ├─► MiddlewareFactory (dev / hot)
//!                    └─► ContentInjector
//! ```

pub mod bundler;
pub mod change;
pub mod middleware;
pub mod server;

pub use bundler::{BuildHook, Bundler, BundlerConfig, HookCallback, PollSetting, WatchSettings};
pub use change::{ChangeDescriptor, ChangeKind, FileStats};
pub use middleware::{
    Collaborators, ContentInjector, Middleware, MiddlewareFactory, MiddlewareHandle,
};
pub use server::{ProxyConfig, ReloadServer, ServerConfig, ServerWatchOptions};

/// Boxed error type carried across collaborator boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
