//! Error types for the tether plugin.
//!
//! Setup-time failures (bad proxy URL, malformed override bags, middleware
//! attachment) surface through these variants and propagate to the caller.
//! Run-time failures inside event handlers and resolvers are isolated and
//! reported via `tracing` instead; they never abort the plugin.

use thiserror::Error;

/// Top-level plugin error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured proxy URL could not be parsed.
    #[error("Invalid proxy URL '{url}': {source}\n\nHint: expected a full origin like https://localhost:3000")]
    InvalidProxyUrl {
        /// The offending URL string
        url: String,
        /// The underlying parse failure
        source: url::ParseError,
    },

    /// The proxy URL parsed but carries no usable host.
    #[error("Proxy URL '{0}' has no host\n\nHint: expected a full origin like https://localhost:3000")]
    ProxyUrlMissingHost(String),

    /// Merged option input does not fit the option shape.
    #[error("Invalid options: {0}\n\nHint: check the types of the supplied option values")]
    Options(#[source] serde_json::Error),

    /// The server override bag does not fit the server configuration shape.
    #[error("Invalid server overrides: {0}\n\nHint: override keys must match the server configuration shape")]
    ServerOverrides(#[source] serde_json::Error),

    /// A middleware factory failed to produce its instance.
    #[error("Middleware '{name}' failed to attach: {source}")]
    Middleware {
        /// Which middleware slot failed
        name: String,
        /// The factory's failure
        source: tether_api::BoxError,
    },

    /// The reload server reported a failure.
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias using [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
