//! Server configuration derivation.
//!
//! Translates effective plugin options plus the bundler's static
//! configuration into the configuration object handed to the reload
//! server's initialization call. Pure given consistent snapshots of its
//! inputs; attachment side effects live in the plugin shell.

use crate::error::{Error, Result};
use crate::options::PluginOptions;
use crate::util;
use serde_json::Value;
use tether_api::{
    BundlerConfig, MiddlewareHandle, PollSetting, ProxyConfig, ServerConfig, ServerWatchOptions,
    WatchSettings,
};
use url::Url;

/// Base polling interval (ms) when the bundler does not configure one.
const DEFAULT_POLL_INTERVAL: u64 = 100;
/// Cap on how far the binary-file polling interval may stretch past the
/// base interval.
const BINARY_INTERVAL_MARGIN: u64 = 200;
/// Port assumed when the proxy URL does not carry one.
const DEFAULT_PORT: u16 = 3000;

/// Build the reload-server configuration.
///
/// Host and port come from the proxy URL. Watch polling follows the most
/// explicit source: the bundler's dev-server settings, else its compiler
/// watch settings, else defaults; the user's `server` override bag is
/// merged last and wins outright. Middleware order is preserved.
pub fn configure(
    options: &PluginOptions,
    bundler: &BundlerConfig,
    middleware: &[MiddlewareHandle],
) -> Result<ServerConfig> {
    let url = Url::parse(&options.proxy_url).map_err(|source| Error::InvalidProxyUrl {
        url: options.proxy_url.clone(),
        source,
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::ProxyUrlMissingHost(options.proxy_url.clone()))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);

    let settings = watch_settings(bundler);
    let (use_polling, interval) = match settings.poll {
        PollSetting::Disabled => (false, DEFAULT_POLL_INTERVAL),
        PollSetting::Enabled => (true, DEFAULT_POLL_INTERVAL),
        PollSetting::Interval(ms) => (true, ms),
    };
    // Binary diffing is expensive; stretch its polling interval, capped so
    // slow base intervals do not starve binary updates entirely.
    let binary_interval = (3 * interval).min(interval + BINARY_INTERVAL_MARGIN);

    let reload_debounce = if options.debounce > 0 {
        options.debounce
    } else {
        settings.aggregate_timeout.unwrap_or(0)
    };

    let config = ServerConfig {
        host,
        port,
        proxy: ProxyConfig {
            target: options.proxy_url.clone(),
        },
        reload_debounce,
        watch_options: ServerWatchOptions {
            ignore_initial: true,
            use_polling,
            interval,
            binary_interval,
        },
        files: Vec::new(),
        extra: serde_json::Map::new(),
        middleware: middleware.to_vec(),
    };

    apply_overrides(config, &options.server)
}

/// Watch settings in precedence order: dev-server settings when the bundler
/// carries them, else compiler settings.
fn watch_settings(bundler: &BundlerConfig) -> WatchSettings {
    bundler.dev_server.unwrap_or(bundler.watch)
}

/// Deep-merge the user's override bag onto the derived configuration.
/// Overrides win on scalar conflict, arrays concatenate, unknown keys pass
/// through into [`ServerConfig::extra`].
fn apply_overrides(config: ServerConfig, overrides: &Value) -> Result<ServerConfig> {
    if overrides.is_null() {
        return Ok(config);
    }

    // Middleware handles do not cross the serialization boundary.
    let middleware = config.middleware.clone();
    let base = serde_json::to_value(&config).map_err(Error::ServerOverrides)?;
    let merged = util::merge(base, overrides.clone());
    let mut config: ServerConfig = serde_json::from_value(merged).map_err(Error::ServerOverrides)?;
    config.middleware = middleware;
    Ok(config)
}
