//! Plugin option resolution.
//!
//! User options arrive as a JSON value tree and are deep-merged over the
//! defaults: mappings merge recursively, sequences concatenate (defaults
//! first), scalars are overridden. Unknown keys pass through untouched.
//! Event hooks and resolvers cannot cross a serialization boundary, so they
//! are attached afterwards with [`PluginOptions::with_hook`] and
//! [`PluginOptions::with_resolver`].

use crate::error::{Error, Result};
use crate::events::{EventPayload, Hook, HookResult};
use crate::pipeline::Resolver;
use crate::util;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Standard hook names declared by default; each maps to a no-op until the
/// user supplies a callback.
const STANDARD_HOOKS: [&str; 8] = [
    "setup", "start", "ready", "update", "add", "change", "unlink", "reload",
];

/// Ordered table of user event hooks, event-name to callback.
///
/// Declaration order is observable (it decides hook wiring order), so the
/// table preserves insertion order. Re-declaring a name keeps its original
/// position.
pub struct EventHooks {
    hooks: IndexMap<String, Option<Hook>>,
}

impl Default for EventHooks {
    fn default() -> Self {
        Self::standard()
    }
}

impl EventHooks {
    /// Table with the standard lifecycle hook names declared and no
    /// callbacks attached.
    pub fn standard() -> Self {
        let mut hooks = IndexMap::new();
        for name in STANDARD_HOOKS {
            hooks.insert(name.to_string(), None);
        }
        Self { hooks }
    }

    /// Declare a hook (or replace its callback).
    pub fn set<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnMut(&EventPayload) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Some(Box::new(hook)));
    }

    /// Declared hook names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.keys().map(String::as_str)
    }

    /// Consume the table, yielding each declared name with its callback.
    pub(crate) fn drain(&mut self) -> Vec<(String, Option<Hook>)> {
        self.hooks.drain(..).collect()
    }
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, hook) in &self.hooks {
            map.entry(name, if hook.is_some() { &"fn" } else { &"noop" });
        }
        map.finish()
    }
}

/// Effective plugin configuration. Immutable after [`PluginOptions::resolve`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Origin the proxy server forwards to.
    pub proxy_url: String,
    /// Extra paths/patterns the server watches for resolver-triggering
    /// changes. Insertion order preserved.
    pub watch: Vec<String>,
    /// Enable the sync-reload resolver (recompile + reload for files inside
    /// the build context).
    pub sync: bool,
    /// Milliseconds to wait before a scheduled reload or injection fires.
    pub delay: u64,
    /// Minimum spacing between successive reload signals, in milliseconds.
    /// Zero falls back to the bundler's aggregate timeout.
    pub debounce: u64,
    /// Extensions treated as injectable markup.
    pub html_extensions: Vec<String>,
    /// Public path handed to the dev middleware.
    pub public_path: Option<String>,
    /// Register nothing: `apply` returns immediately and the plugin stays
    /// fully inert.
    pub disable: bool,
    /// Advanced reload-server override bag, deep-merged onto the derived
    /// server configuration (overrides win on scalars, arrays concatenate).
    pub server: Value,
    /// Advanced dev-middleware override bag.
    pub dev_middleware: Value,
    /// Advanced hot-middleware override bag.
    pub hot_middleware: Value,
    /// Unrecognized keys, kept untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
    /// User event hook table.
    #[serde(skip)]
    pub events: EventHooks,
    /// User resolvers, inserted after the built-ins in the given order.
    #[serde(skip)]
    pub resolvers: Vec<Resolver>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            proxy_url: "https://localhost:3000".to_string(),
            watch: Vec::new(),
            sync: true,
            delay: 50,
            debounce: 100,
            html_extensions: vec![".php".to_string(), ".html".to_string()],
            public_path: None,
            disable: false,
            server: Value::Null,
            dev_middleware: Value::Null,
            hot_middleware: Value::Null,
            extra: serde_json::Map::new(),
            events: EventHooks::standard(),
            resolvers: Vec::new(),
        }
    }
}

impl PluginOptions {
    /// Deep-merge user-supplied values over the defaults.
    ///
    /// Pure and idempotent: resolving already-resolved output again yields
    /// the same configuration.
    pub fn resolve(user: Value) -> Result<Self> {
        let defaults = serde_json::to_value(Self::default()).map_err(Error::Options)?;
        let merged = util::merge(defaults, user);
        serde_json::from_value(merged).map_err(Error::Options)
    }

    /// Attach (or replace) an event hook.
    pub fn with_hook<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: FnMut(&EventPayload) -> HookResult + Send + Sync + 'static,
    {
        self.events.set(name, hook);
        self
    }

    /// Append a user resolver.
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolvers.push(resolver);
        self
    }
}
