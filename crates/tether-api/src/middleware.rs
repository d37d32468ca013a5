//! Optional collaborators: middleware and content injection.

use crate::bundler::Bundler;
use crate::change::ChangeDescriptor;
use crate::BoxError;
use async_trait::async_trait;
use std::sync::Arc;

/// Opaque HTTP middleware instance attached to the proxy server.
///
/// The plugin never inspects middleware internals; it only preserves
/// attachment order when handing them to the server.
pub trait Middleware: Send + Sync {
    /// Stable name used in logs and configuration diagnostics.
    fn name(&self) -> &str;
}

/// Shared middleware handle.
pub type MiddlewareHandle = Arc<dyn Middleware>;

/// Builds a middleware instance from the bundler handle and its merged
/// option bag.
///
/// Factories stand in for load-time module probing: the host resolves the
/// underlying implementation up front and the plugin only decides whether
/// and with which options to invoke it.
pub trait MiddlewareFactory: Send + Sync {
    /// Create the middleware instance.
    fn create(
        &self,
        bundler: Arc<dyn Bundler>,
        options: &serde_json::Value,
    ) -> Result<MiddlewareHandle, BoxError>;
}

/// In-place content injection collaborator.
#[async_trait]
pub trait ContentInjector: Send + Sync {
    /// Inject updated content for the changed file into connected clients.
    async fn inject(&self, change: &ChangeDescriptor);
}

/// Optional collaborator handles, resolved by the host before plugin
/// construction. A `None` field means the capability is off and related
/// setup is skipped silently.
#[derive(Clone, Default)]
pub struct Collaborators {
    /// Factory for the middleware serving fresh build output.
    pub dev_middleware: Option<Arc<dyn MiddlewareFactory>>,
    /// Factory for the hot-module update middleware.
    pub hot_middleware: Option<Arc<dyn MiddlewareFactory>>,
    /// In-place content injector.
    pub injector: Option<Arc<dyn ContentInjector>>,
}

impl Collaborators {
    /// Collaborator set with every capability off.
    pub fn none() -> Self {
        Self::default()
    }
}
