//! # tether
//!
//! Wires a live-reload proxy server to a module bundler's compilation
//! lifecycle. The plugin observes two bundler hook points, configures and
//! starts the reload server once the first build finishes, attaches
//! bundler-provided middleware, and routes every file-change notification
//! through an ordered chain of resolver strategies that decides its effect:
//! recompile-and-reload, in-place content injection, or a plain reload.
//!
//! ```text
//!  Bundler ──done/compiling──► EventBus ──first `compiled`──► start sequence
//!                                 │                                │
//!                                 │                        configure + init
//!                                 ▼                                ▼
//!                          user hook table ◄──────`ready`── ReloadServer
//!                                                                  │
//!                 ResolverChain ◄───────`update`────── file changes┘
//!            (sync-reload │ injection │ user resolvers │ fallback)
//! ```
//!
//! Collaborators (the bundler, the reload server, optional middleware and
//! content injection) live behind the traits in [`tether_api`]; the host
//! resolves them up front and hands them in at construction. The library
//! emits `tracing` events and installs no subscriber; enable the `logging`
//! feature for a convenience initializer.

pub mod config;
pub mod error;
pub mod events;
pub mod options;
pub mod pipeline;
pub mod plugin;
pub mod util;

#[cfg(feature = "logging")]
pub mod logging;

pub use config::configure;
pub use error::{Error, Result};
pub use events::{EventBus, EventKind, EventPayload, Hook, HookResult, LifecycleState};
pub use options::{EventHooks, PluginOptions};
pub use pipeline::{Outcome, ResolveContext, Resolver, ResolverChain};
pub use plugin::TetherPlugin;

// Re-export the boundary contracts for hosts and collaborator implementors.
pub use tether_api as api;
