//! Update resolution pipeline.
//!
//! Every detected file change runs through an ordered chain of resolver
//! strategies. All entries are invoked concurrently in one pass and each
//! independently settles with an outcome; there is no first-claim-wins
//! suppression between entries, so two resolvers whose guard conditions
//! both pass may each schedule an effect for the same change. The chain is
//! built exactly once, when the server becomes ready, and is immutable
//! afterwards.

use crate::util;
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_api::{BoxError, Bundler, ChangeDescriptor, ContentInjector, ReloadServer};
use tokio::time::sleep;

/// What a resolver decided about a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The resolver claimed the change and ran its effect.
    Handled,
    /// The change was not this resolver's concern.
    Declined,
}

/// How a resolver settles.
pub type ResolveResult = std::result::Result<Outcome, BoxError>;

/// A resolver strategy function.
pub type ResolverFn =
    dyn Fn(ResolveContext, ChangeDescriptor) -> BoxFuture<'static, ResolveResult> + Send + Sync;

/// Everything a resolver may need to act on a change.
#[derive(Clone)]
pub struct ResolveContext {
    /// Reload server handle.
    pub server: Arc<dyn ReloadServer>,
    /// Bundler handle.
    pub bundler: Arc<dyn Bundler>,
    /// Content injector, when the capability is on.
    pub injector: Option<Arc<dyn ContentInjector>>,
    /// The bundler's build-context directory.
    pub context_dir: PathBuf,
    /// Wait applied before a scheduled reload or injection fires.
    pub delay: Duration,
    /// Extensions treated as injectable markup.
    pub html_extensions: Arc<[String]>,
}

impl ResolveContext {
    /// Whether the file matches one of the configured markup extensions.
    pub fn matches_markup(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        self.html_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("context_dir", &self.context_dir)
            .field("delay", &self.delay)
            .field("html_extensions", &self.html_extensions)
            .field("injector", &self.injector.is_some())
            .finish()
    }
}

/// One entry in the resolver chain: a strategy function, or a pre-settled
/// outcome used for pass-through entries.
#[derive(Clone)]
pub enum Resolver {
    /// Invoked per change; decides independently whether to act.
    Func(Arc<ResolverFn>),
    /// Settles immediately with a fixed outcome.
    Immediate(Outcome),
}

impl Resolver {
    /// Wrap an async strategy function.
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(ResolveContext, ChangeDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolveResult> + Send + 'static,
    {
        Resolver::Func(Arc::new(move |cx, change| f(cx, change).boxed()))
    }

    /// A pre-settled entry.
    pub fn immediate(outcome: Outcome) -> Self {
        Resolver::Immediate(outcome)
    }

    fn invoke(&self, cx: ResolveContext, change: ChangeDescriptor) -> BoxFuture<'static, ResolveResult> {
        match self {
            Resolver::Func(f) => f(cx, change),
            Resolver::Immediate(outcome) => future::ready(Ok(*outcome)).boxed(),
        }
    }
}

/// Identity comparison: two entries are equal when they are the same
/// function value or the same pre-settled outcome. Used to collapse
/// duplicate references before the fallback is appended.
impl PartialEq for Resolver {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Resolver::Func(a), Resolver::Func(b)) => Arc::ptr_eq(a, b),
            (Resolver::Immediate(a), Resolver::Immediate(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Func(_) => f.write_str("Resolver::Func"),
            Resolver::Immediate(outcome) => write!(f, "Resolver::Immediate({outcome:?})"),
        }
    }
}

/// Ordered, immutable chain of resolver entries.
///
/// Built-ins take priority over user resolvers; the fallback is always
/// present and always last, so every change produces at least one effect.
pub struct ResolverChain {
    entries: Vec<Resolver>,
}

impl ResolverChain {
    /// Assemble the chain: sync-reload and content-injection built-ins when
    /// their capabilities are on, user resolvers in configuration order,
    /// identity de-duplication, then the fallback.
    pub fn build(sync: bool, has_injector: bool, user: &[Resolver]) -> Self {
        let mut entries = Vec::with_capacity(user.len() + 3);
        if sync {
            entries.push(sync_reload());
        }
        if has_injector {
            entries.push(content_injection());
        }
        entries.extend(user.iter().cloned());

        let mut entries = util::uniq(&entries);
        entries.push(fallback());
        Self { entries }
    }

    /// Chain entries, in invocation order.
    pub fn entries(&self) -> &[Resolver] {
        &self.entries
    }

    /// Number of entries, fallback included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The chain always carries at least the fallback.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Run every entry against the change, concurrently, and wait for all
    /// of them to settle.
    ///
    /// A resolver error is isolated and reported; it counts as declined and
    /// does not affect the other entries.
    pub async fn resolve(&self, cx: &ResolveContext, change: &ChangeDescriptor) -> Vec<Outcome> {
        let invocations: Vec<_> = self
            .entries
            .iter()
            .map(|entry| entry.invoke(cx.clone(), change.clone()))
            .collect();

        future::join_all(invocations)
            .await
            .into_iter()
            .map(|result| match result {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(file = %change.file.display(), %error, "resolver failed");
                    Outcome::Declined
                }
            })
            .collect()
    }
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverChain")
            .field("entries", &self.entries)
            .finish()
    }
}

/// Recompile-and-reload for files inside the build context.
fn sync_reload() -> Resolver {
    Resolver::func(|cx, change| async move {
        if !util::path_has_ancestor(&change.file, &cx.context_dir) {
            return Ok(Outcome::Declined);
        }
        cx.bundler.run().await?;
        cx.server.reload(Some(&change.file)).await;
        Ok(Outcome::Handled)
    })
}

/// Delayed in-place injection for markup files.
fn content_injection() -> Resolver {
    Resolver::func(|cx, change| async move {
        let Some(injector) = cx.injector.clone() else {
            return Ok(Outcome::Declined);
        };
        if !cx.matches_markup(&change.file) {
            return Ok(Outcome::Declined);
        }
        sleep(cx.delay).await;
        injector.inject(&change).await;
        Ok(Outcome::Handled)
    })
}

/// Delayed reload of the changed file. Never declines.
fn fallback() -> Resolver {
    Resolver::func(|cx, change| async move {
        sleep(cx.delay).await;
        cx.server.reload(Some(&change.file)).await;
        Ok(Outcome::Handled)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use tether_api::{BuildHook, BundlerConfig, ChangeKind, HookCallback, ServerConfig};
    use tokio::sync::mpsc;

    type EffectLog = Arc<Mutex<Vec<String>>>;

    struct TestServer {
        log: EffectLog,
    }

    #[async_trait]
    impl ReloadServer for TestServer {
        async fn init(&self, _config: ServerConfig) -> Result<(), BoxError> {
            Ok(())
        }

        async fn reload(&self, file: Option<&Path>) {
            let target = file
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "*".to_string());
            self.log.lock().push(format!("reload:{target}"));
        }

        fn notify(&self, message: &str) {
            self.log.lock().push(format!("notify:{message}"));
        }

        fn install(&self, _injector: Arc<dyn ContentInjector>, _options: Value) {}

        fn file_events(&self) -> mpsc::UnboundedReceiver<ChangeDescriptor> {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        }
    }

    struct TestBundler {
        log: EffectLog,
        context: PathBuf,
    }

    #[async_trait]
    impl Bundler for TestBundler {
        fn subscribe(&self, _hook: BuildHook, _callback: HookCallback) {}

        fn config(&self) -> BundlerConfig {
            BundlerConfig {
                context: self.context.clone(),
                ..BundlerConfig::default()
            }
        }

        async fn run(&self) -> Result<(), BoxError> {
            self.log.lock().push("run".to_string());
            Ok(())
        }
    }

    struct TestInjector {
        log: EffectLog,
    }

    #[async_trait]
    impl ContentInjector for TestInjector {
        async fn inject(&self, change: &ChangeDescriptor) {
            self.log
                .lock()
                .push(format!("inject:{}", change.file.display()));
        }
    }

    fn context(log: &EffectLog, with_injector: bool) -> ResolveContext {
        ResolveContext {
            server: Arc::new(TestServer { log: log.clone() }),
            bundler: Arc::new(TestBundler {
                log: log.clone(),
                context: PathBuf::from("/proj/src"),
            }),
            injector: with_injector.then(|| {
                Arc::new(TestInjector { log: log.clone() }) as Arc<dyn ContentInjector>
            }),
            context_dir: PathBuf::from("/proj/src"),
            delay: Duration::from_millis(50),
            html_extensions: vec![".php".to_string(), ".html".to_string()].into(),
        }
    }

    #[test]
    fn test_chain_always_carries_fallback() {
        let chain = ResolverChain::build(false, false, &[]);
        assert_eq!(chain.len(), 1);

        let chain = ResolverChain::build(true, true, &[]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_chain_deduplicates_by_identity() {
        let shared = Resolver::func(|_cx, _change| async { Ok(Outcome::Declined) });
        let chain = ResolverChain::build(false, false, &[shared.clone(), shared.clone()]);
        // one shared entry plus the fallback
        assert_eq!(chain.len(), 2);

        let chain = ResolverChain::build(
            false,
            false,
            &[
                Resolver::immediate(Outcome::Declined),
                Resolver::immediate(Outcome::Declined),
            ],
        );
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_distinct_functions_are_not_deduplicated() {
        let chain = ResolverChain::build(
            false,
            false,
            &[
                Resolver::func(|_cx, _change| async { Ok(Outcome::Declined) }),
                Resolver::func(|_cx, _change| async { Ok(Outcome::Declined) }),
            ],
        );
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_matches_markup() {
        let log = EffectLog::default();
        let cx = context(&log, false);
        assert!(cx.matches_markup(Path::new("/proj/views/index.html")));
        assert!(cx.matches_markup(Path::new("/proj/views/page.php")));
        assert!(!cx.matches_markup(Path::new("/proj/src/app.js")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_reloads_after_delay() {
        let log = EffectLog::default();
        let cx = context(&log, false);
        let chain = ResolverChain::build(false, false, &[]);
        let change = ChangeDescriptor::new(ChangeKind::Change, "/proj/assets/logo.png");

        let outcomes = chain.resolve(&cx, &change).await;
        assert_eq!(outcomes, vec![Outcome::Handled]);
        assert_eq!(*log.lock(), vec!["reload:/proj/assets/logo.png"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_reload_recompiles_before_reloading() {
        let log = EffectLog::default();
        let cx = context(&log, false);
        let chain = ResolverChain::build(true, false, &[]);
        let change = ChangeDescriptor::new(ChangeKind::Change, "/proj/src/app.js");

        let outcomes = chain.resolve(&cx, &change).await;
        assert_eq!(outcomes, vec![Outcome::Handled, Outcome::Handled]);

        let log = log.lock();
        let run_at = log.iter().position(|entry| entry == "run").unwrap();
        let reload_at = log
            .iter()
            .position(|entry| entry == "reload:/proj/src/app.js")
            .unwrap();
        assert!(run_at < reload_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_reload_declines_outside_context() {
        let log = EffectLog::default();
        let cx = context(&log, false);
        let chain = ResolverChain::build(true, false, &[]);
        let change = ChangeDescriptor::new(ChangeKind::Change, "/proj/other/app.js");

        let outcomes = chain.resolve(&cx, &change).await;
        assert_eq!(outcomes, vec![Outcome::Declined, Outcome::Handled]);
        assert!(!log.lock().iter().any(|entry| entry == "run"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_injection_fires_for_markup_only() {
        let log = EffectLog::default();
        let cx = context(&log, true);
        let chain = ResolverChain::build(false, true, &[]);

        let change = ChangeDescriptor::new(ChangeKind::Change, "/proj/views/index.html");
        chain.resolve(&cx, &change).await;
        assert!(log
            .lock()
            .iter()
            .any(|entry| entry == "inject:/proj/views/index.html"));

        log.lock().clear();
        let change = ChangeDescriptor::new(ChangeKind::Change, "/proj/src/app.js");
        chain.resolve(&cx, &change).await;
        assert!(!log.lock().iter().any(|entry| entry.starts_with("inject:")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_error_is_isolated() {
        let log = EffectLog::default();
        let cx = context(&log, false);
        let failing = Resolver::func(|_cx, _change| async { Err("resolver exploded".into()) });
        let chain = ResolverChain::build(false, false, &[failing]);
        let change = ChangeDescriptor::new(ChangeKind::Change, "/proj/readme.md");

        let outcomes = chain.resolve(&cx, &change).await;
        assert_eq!(outcomes, vec![Outcome::Declined, Outcome::Handled]);
        assert_eq!(*log.lock(), vec!["reload:/proj/readme.md"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_resolver_receives_change() {
        let log = EffectLog::default();
        let cx = context(&log, false);
        let seen: EffectLog = EffectLog::default();
        let seen_ref = seen.clone();
        let user = Resolver::func(move |_cx, change| {
            let seen = seen_ref.clone();
            async move {
                seen.lock().push(change.file.display().to_string());
                Ok(Outcome::Handled)
            }
        });

        let chain = ResolverChain::build(false, false, &[user]);
        let change = ChangeDescriptor::new(ChangeKind::Add, "/proj/new.txt");
        chain.resolve(&cx, &change).await;
        assert_eq!(*seen.lock(), vec!["/proj/new.txt"]);
    }
}
