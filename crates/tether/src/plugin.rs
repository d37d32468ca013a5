//! The plugin shell: bundler adapter, lifecycle wiring, and the one-shot
//! start sequence.
//!
//! Control flow: the bundler's `Done` hook publishes `compiled`; the first
//! `compiled` runs the start sequence (attach middleware, derive server
//! configuration, initialize the server); once the server signals readiness
//! the resolver chain is built and the pipeline subscribes to `update`;
//! subsequent file-change notifications from the server flow through the
//! chain. Later builds publish `reload` and request a full-page reload.

use crate::config;
use crate::error::{Error, Result};
use crate::events::{EventBus, EventKind, EventPayload, LifecycleState};
use crate::options::PluginOptions;
use crate::pipeline::{ResolveContext, ResolverChain};
use crate::util;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tether_api::{
    BuildHook, Bundler, ChangeDescriptor, ChangeKind, Collaborators, MiddlewareHandle,
    ReloadServer, ServerConfig,
};

/// Wires a live-reload proxy server to a bundler's compilation lifecycle.
///
/// Construct inside the tokio runtime that will drive the plugin; scheduled
/// work (server initialization, delayed reloads, the update loop) is spawned
/// onto it.
pub struct TetherPlugin {
    inner: Arc<Inner>,
}

struct ActivePipeline {
    chain: ResolverChain,
    cx: ResolveContext,
}

struct Inner {
    options: PluginOptions,
    server: Arc<dyn ReloadServer>,
    collaborators: Collaborators,
    bus: EventBus,
    runtime: tokio::runtime::Handle,
    bundler: OnceLock<Arc<dyn Bundler>>,
    middleware: Mutex<Vec<MiddlewareHandle>>,
    pipeline: OnceLock<Arc<ActivePipeline>>,
}

impl TetherPlugin {
    /// Create a plugin instance and wire its event table.
    ///
    /// Built-in lifecycle wiring is registered ahead of the user hook table,
    /// and each declared hook name is wired twice: a diagnostic log sink
    /// first, then the user callback (a no-op when absent).
    pub fn new(
        mut options: PluginOptions,
        server: Arc<dyn ReloadServer>,
        collaborators: Collaborators,
    ) -> Self {
        let hooks = options.events.drain();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let bus = EventBus::new();
            register_builtin_events(&bus, weak);

            for (name, hook) in hooks {
                let kind = EventKind::from_name(&name);
                let log_name = name.clone();
                bus.on(
                    kind.clone(),
                    Box::new(move |_| {
                        tracing::debug!(event = %log_name, "event");
                        Ok(())
                    }),
                );
                bus.on(kind, hook.unwrap_or_else(|| Box::new(|_| Ok(()))));
            }

            Inner {
                options,
                server,
                collaborators,
                bus,
                runtime: tokio::runtime::Handle::current(),
                bundler: OnceLock::new(),
                middleware: Mutex::new(Vec::new()),
                pipeline: OnceLock::new(),
            }
        });

        Self { inner }
    }

    /// Register with the bundler. This is the adapter entry point a host
    /// calls once, in place of the bundler invoking a plugin itself.
    ///
    /// With `disable: true` this returns immediately: no hook is subscribed
    /// and the bundler handle is never retained.
    pub fn apply(&self, bundler: Arc<dyn Bundler>) {
        if self.inner.options.disable {
            tracing::debug!("plugin disabled, skipping registration");
            return;
        }
        if self.inner.bundler.set(bundler.clone()).is_err() {
            tracing::warn!("plugin already registered with a bundler");
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        bundler.subscribe(
            BuildHook::Done,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.bus.emit(&EventKind::Compiled, &EventPayload::Empty);
                }
            }),
        );

        let weak = Arc::downgrade(&self.inner);
        bundler.subscribe(
            BuildHook::Compiling,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .bus
                        .emit(&EventKind::Recompiling, &EventPayload::Empty);
                }
            }),
        );
    }

    /// Feed a file-change notification into the update pipeline directly,
    /// bypassing the server's watcher stream.
    pub fn notify_change(&self, change: ChangeDescriptor) {
        self.inner.dispatch_update(change);
    }

    /// Publish a custom event to the hook table.
    pub fn emit(&self, event: &str, payload: EventPayload) {
        self.inner.bus.emit(&EventKind::from_name(event), &payload);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.bus.state()
    }

    /// Effective configuration.
    pub fn options(&self) -> &PluginOptions {
        &self.inner.options
    }

    /// The retained bundler handle, absent until [`TetherPlugin::apply`]
    /// runs (and kept unset when the plugin is disabled).
    pub fn bundler(&self) -> Option<Arc<dyn Bundler>> {
        self.inner.bundler.get().cloned()
    }

    /// Middleware attached so far, in registration order.
    pub fn middleware(&self) -> Vec<MiddlewareHandle> {
        self.inner.middleware.lock().clone()
    }
}

/// Built-in lifecycle wiring, registered before any user hook.
fn register_builtin_events(bus: &EventBus, weak: &Weak<Inner>) {
    // First successful compilation runs the start sequence, exactly once;
    // every later one requests a full reload.
    let w = weak.clone();
    bus.once(
        EventKind::Compiled,
        Box::new(move |_| {
            let Some(inner) = w.upgrade() else {
                return Ok(());
            };
            inner.start()?;

            let w = Arc::downgrade(&inner);
            inner.bus.on(
                EventKind::Compiled,
                Box::new(move |_| {
                    if let Some(inner) = w.upgrade() {
                        inner.bus.emit(&EventKind::Reload, &EventPayload::Empty);
                    }
                    Ok(())
                }),
            );
            Ok(())
        }),
    );

    // Rebuild notifications are fire-and-forget.
    let w = weak.clone();
    bus.on(
        EventKind::Recompiling,
        Box::new(move |_| {
            if let Some(inner) = w.upgrade() {
                inner.server.notify("Rebuilding...");
            }
            Ok(())
        }),
    );

    // A reload request asks for a full-page reload.
    let w = weak.clone();
    bus.on(
        EventKind::Reload,
        Box::new(move |_| {
            if let Some(inner) = w.upgrade() {
                let server = inner.server.clone();
                inner.runtime.spawn(async move {
                    server.reload(None).await;
                });
            }
            Ok(())
        }),
    );

    // Server readiness activates the update pipeline, exactly once.
    let w = weak.clone();
    bus.once(
        EventKind::Ready,
        Box::new(move |_| {
            if let Some(inner) = w.upgrade() {
                inner.activate_pipeline();
            }
            Ok(())
        }),
    );
}

impl Inner {
    /// The one-shot start sequence: attach middleware, derive the server
    /// configuration, and kick off server initialization.
    fn start(self: &Arc<Self>) -> Result<()> {
        let Some(bundler) = self.bundler.get().cloned() else {
            // `compiled` published without a registered bundler; inert.
            return Ok(());
        };

        self.bus.advance(LifecycleState::Configured);
        self.attach_middleware(&bundler)?;

        let static_config = bundler.config();
        let middleware = self.middleware.lock().clone();
        let mut server_config = config::configure(&self.options, &static_config, &middleware)?;

        let mut files = server_config.files.clone();
        files.extend(self.options.watch.iter().cloned());
        server_config.files = util::uniq(&files);

        let server_config = Arc::new(server_config);
        self.bus
            .emit(&EventKind::Setup, &EventPayload::Config(server_config.clone()));

        self.bus.advance(LifecycleState::Started);
        self.bus.emit(&EventKind::Started, &EventPayload::Empty);

        if let Some(injector) = &self.collaborators.injector {
            self.server.install(
                injector.clone(),
                json!({ "extensions": self.options.html_extensions }),
            );
        }

        let weak = Arc::downgrade(self);
        let server = self.server.clone();
        let delay = Duration::from_millis(self.options.delay);
        let init_config = ServerConfig::clone(&server_config);
        self.runtime.spawn(async move {
            if let Err(error) = server.init(init_config).await {
                tracing::error!(%error, "reload server failed to initialize");
                return;
            }
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.bus.advance(LifecycleState::Ready);
                inner.bus.emit(&EventKind::Ready, &EventPayload::Empty);
            }
        });

        Ok(())
    }

    /// Create and register the optional middleware instances. Absent
    /// factories are skipped silently; a failing factory aborts setup.
    fn attach_middleware(&self, bundler: &Arc<dyn Bundler>) -> Result<()> {
        let mut registry = self.middleware.lock();

        if let Some(factory) = &self.collaborators.dev_middleware {
            let defaults = json!({ "public_path": self.options.public_path });
            let merged = util::merge(defaults, self.options.dev_middleware.clone());
            let handle = factory
                .create(bundler.clone(), &merged)
                .map_err(|source| Error::Middleware {
                    name: "dev".to_string(),
                    source,
                })?;
            registry.push(handle);
        } else {
            tracing::debug!("dev middleware unavailable, skipping");
        }

        if let Some(factory) = &self.collaborators.hot_middleware {
            let merged = util::merge(json!({}), self.options.hot_middleware.clone());
            let handle = factory
                .create(bundler.clone(), &merged)
                .map_err(|source| Error::Middleware {
                    name: "hot".to_string(),
                    source,
                })?;
            registry.push(handle);
        } else {
            tracing::debug!("hot middleware unavailable, skipping");
        }

        Ok(())
    }

    /// Build the resolver chain, subscribe the pipeline to `update`, and
    /// start draining the server's change stream. Runs once, at `ready`.
    fn activate_pipeline(self: &Arc<Self>) {
        let Some(bundler) = self.bundler.get().cloned() else {
            return;
        };

        let cx = ResolveContext {
            server: self.server.clone(),
            bundler: bundler.clone(),
            injector: self.collaborators.injector.clone(),
            context_dir: bundler.config().context,
            delay: Duration::from_millis(self.options.delay),
            html_extensions: self.options.html_extensions.clone().into(),
        };
        let chain = ResolverChain::build(
            self.options.sync,
            self.collaborators.injector.is_some(),
            &self.options.resolvers,
        );
        let pipeline = Arc::new(ActivePipeline { chain, cx });
        if self.pipeline.set(pipeline).is_err() {
            return;
        }

        let w = Arc::downgrade(self);
        self.bus.on(
            EventKind::Update,
            Box::new(move |payload| {
                let Some(inner) = w.upgrade() else {
                    return Ok(());
                };
                let EventPayload::Change(change) = payload else {
                    return Ok(());
                };
                let Some(pipeline) = inner.pipeline.get().cloned() else {
                    return Ok(());
                };
                let change = change.clone();
                inner.runtime.spawn(async move {
                    pipeline.chain.resolve(&pipeline.cx, &change).await;
                });
                Ok(())
            }),
        );

        let mut events = self.server.file_events();
        let w = Arc::downgrade(self);
        self.runtime.spawn(async move {
            while let Some(change) = events.recv().await {
                let Some(inner) = w.upgrade() else {
                    break;
                };
                inner.dispatch_update(change);
            }
        });
    }

    /// Publish a change on the bus: `update` first, then its raw kind.
    fn dispatch_update(&self, change: ChangeDescriptor) {
        let kind = match change.kind {
            ChangeKind::Add => EventKind::Add,
            ChangeKind::Change => EventKind::Change,
            ChangeKind::Unlink => EventKind::Unlink,
        };
        let payload = EventPayload::Change(change);
        self.bus.emit(&EventKind::Update, &payload);
        self.bus.emit(&kind, &payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tether_api::{BoxError, BundlerConfig, ContentInjector, HookCallback};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct NullServer;

    #[async_trait]
    impl ReloadServer for NullServer {
        async fn init(&self, _config: ServerConfig) -> std::result::Result<(), BoxError> {
            Ok(())
        }

        async fn reload(&self, _file: Option<&std::path::Path>) {}

        fn notify(&self, _message: &str) {}

        fn install(&self, _injector: Arc<dyn ContentInjector>, _options: serde_json::Value) {}

        fn file_events(&self) -> mpsc::UnboundedReceiver<ChangeDescriptor> {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        }
    }

    #[derive(Default)]
    struct CountingBundler {
        subscriptions: AtomicUsize,
    }

    #[async_trait]
    impl Bundler for CountingBundler {
        fn subscribe(&self, _hook: BuildHook, _callback: HookCallback) {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
        }

        fn config(&self) -> BundlerConfig {
            BundlerConfig::default()
        }

        async fn run(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_new_plugin_is_uninitialized() {
        let plugin = TetherPlugin::new(
            PluginOptions::default(),
            Arc::new(NullServer),
            Collaborators::none(),
        );
        assert_eq!(plugin.state(), LifecycleState::Uninitialized);
        assert!(plugin.bundler().is_none());
        assert!(plugin.middleware().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_plugin_never_registers() {
        let options = PluginOptions::resolve(serde_json::json!({ "disable": true })).unwrap();
        let plugin = TetherPlugin::new(options, Arc::new(NullServer), Collaborators::none());

        let bundler = Arc::new(CountingBundler::default());
        plugin.apply(bundler.clone());

        assert_eq!(bundler.subscriptions.load(Ordering::SeqCst), 0);
        assert!(plugin.bundler().is_none());
    }

    #[tokio::test]
    async fn test_apply_subscribes_both_hooks() {
        let plugin = TetherPlugin::new(
            PluginOptions::default(),
            Arc::new(NullServer),
            Collaborators::none(),
        );

        let bundler = Arc::new(CountingBundler::default());
        plugin.apply(bundler.clone());

        assert_eq!(bundler.subscriptions.load(Ordering::SeqCst), 2);
        assert!(plugin.bundler().is_some());
    }

    #[tokio::test]
    async fn test_custom_event_reaches_user_hook() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_ref = fired.clone();
        let options = PluginOptions::default().with_hook("custom-sync", move |_| {
            fired_ref.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let plugin = TetherPlugin::new(options, Arc::new(NullServer), Collaborators::none());
        plugin.emit("custom-sync", EventPayload::Empty);
        plugin.emit("custom-sync", EventPayload::Empty);

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
