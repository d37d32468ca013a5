//! The live-reload proxy server side of the boundary.

use crate::change::ChangeDescriptor;
use crate::middleware::{ContentInjector, MiddlewareHandle};
use crate::BoxError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Watch options handed to the server's own file watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerWatchOptions {
    /// Skip events for files that already exist when watching begins.
    pub ignore_initial: bool,
    /// Poll instead of relying on native filesystem events.
    pub use_polling: bool,
    /// Polling interval in milliseconds.
    pub interval: u64,
    /// Polling interval for binary files, in milliseconds.
    pub binary_interval: u64,
}

impl Default for ServerWatchOptions {
    fn default() -> Self {
        Self {
            ignore_initial: true,
            use_polling: false,
            interval: 100,
            binary_interval: 300,
        }
    }
}

/// Proxy section of the server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Origin the proxy forwards to.
    pub target: String,
}

/// Configuration handed to [`ReloadServer::init`].
///
/// The serializable portion round-trips through JSON so user override bags
/// can be deep-merged onto it; middleware handles are attached separately
/// and preserve registration order.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host the server binds to, parsed from the proxy URL.
    pub host: String,
    /// Port the server binds to, parsed from the proxy URL.
    pub port: u16,
    /// Proxy settings.
    pub proxy: ProxyConfig,
    /// Minimum spacing between successive reload signals, in milliseconds.
    pub reload_debounce: u64,
    /// Settings for the server's own file watcher.
    pub watch_options: ServerWatchOptions,
    /// Paths and patterns whose changes feed the resolution pipeline.
    pub files: Vec<String>,
    /// Unrecognized override keys, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Middleware attached in registration order.
    #[serde(skip)]
    pub middleware: Vec<MiddlewareHandle>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            proxy: ProxyConfig::default(),
            reload_debounce: 0,
            watch_options: ServerWatchOptions::default(),
            files: Vec::new(),
            extra: serde_json::Map::new(),
            middleware: Vec::new(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let middleware: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("proxy", &self.proxy)
            .field("reload_debounce", &self.reload_debounce)
            .field("watch_options", &self.watch_options)
            .field("files", &self.files)
            .field("extra", &self.extra)
            .field("middleware", &middleware)
            .finish()
    }
}

/// The proxy/live-reload server collaborator.
///
/// The plugin treats it as an opaque target it configures and drives; all
/// wire-level behavior (websocket push, HTML snippet injection, the watcher
/// implementation) belongs to the server.
#[async_trait]
pub trait ReloadServer: Send + Sync {
    /// Begin serving with the given configuration. Resolves once the server
    /// has finished initializing.
    async fn init(&self, config: ServerConfig) -> Result<(), BoxError>;

    /// Request a client-facing reload of a specific file, or a full-page
    /// reload when no path is meaningful.
    async fn reload(&self, file: Option<&Path>);

    /// Display a transient status message to connected clients.
    fn notify(&self, message: &str);

    /// Register the content-injection collaborator with the server.
    fn install(&self, injector: Arc<dyn ContentInjector>, options: serde_json::Value);

    /// Subscribe to file-change notifications from the server's watcher.
    /// Each call returns an independent receiver.
    fn file_events(&self) -> mpsc::UnboundedReceiver<ChangeDescriptor>;
}
