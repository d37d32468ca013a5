//! The bundler side of the boundary.
//!
//! The plugin consumes exactly two lifecycle hook points and a read-only
//! snapshot of the bundler's static configuration; it never drives the
//! bundling process itself beyond requesting a new build.

use crate::BoxError;
use async_trait::async_trait;
use std::path::PathBuf;

/// The two compiler hook points the adapter subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildHook {
    /// A full build finished.
    Done,
    /// A new build started.
    Compiling,
}

/// Callback invoked every time a subscribed hook fires.
pub type HookCallback = Box<dyn Fn() + Send + Sync>;

/// Polling mode read from the bundler's watch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollSetting {
    /// Polling disabled; the watcher relies on native filesystem events.
    #[default]
    Disabled,
    /// Polling enabled at the watcher's default interval.
    Enabled,
    /// Polling enabled with an explicit interval in milliseconds.
    Interval(u64),
}

/// Watch-related settings snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchSettings {
    /// Polling mode.
    pub poll: PollSetting,
    /// Milliseconds the compiler aggregates changes before rebuilding.
    pub aggregate_timeout: Option<u64>,
}

/// Read-only snapshot of the bundler's static configuration.
///
/// Taken once during the start sequence; the plugin does not observe later
/// mutation of the bundler's own options.
#[derive(Debug, Clone, Default)]
pub struct BundlerConfig {
    /// Directory build output is written to.
    pub output_path: PathBuf,
    /// Root directory the bundler treats as the boundary of managed files.
    pub context: PathBuf,
    /// Dev-server-specific watch settings, when the bundler carries them.
    /// Takes precedence over [`BundlerConfig::watch`].
    pub dev_server: Option<WatchSettings>,
    /// Compiler-level watch settings.
    pub watch: WatchSettings,
}

/// The module bundler collaborator.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Subscribe to one of the two lifecycle hook points. The callback fires
    /// every time the hook does, for the lifetime of the bundler.
    fn subscribe(&self, hook: BuildHook, callback: HookCallback);

    /// Read-only snapshot of the bundler's static configuration.
    fn config(&self) -> BundlerConfig;

    /// Trigger a new build. Resolves when the build completes.
    async fn run(&self) -> Result<(), BoxError>;
}
