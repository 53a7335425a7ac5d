//! Server configuration for `stackadm`.
//!
//! Read once from `STACKADM_*` environment variables at startup and passed
//! explicitly from there.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use stackadm_core::autostart::DEFAULT_UNIT;
use stackadm_core::layout::ProjectLayout;
use stackadm_core::versions::DEFAULT_VERSIONS_URL;

const DEFAULT_PORT: u16 = 8888;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Deployment directory holding the `Makefile`, `.env` and `dumps/`.
    pub project_dir: PathBuf,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Seconds between setup runner ticks.
    pub runner_interval_secs: u64,
    /// Release API returning the latest component versions.
    pub versions_url: String,
    /// Timeout for the release API call, in seconds.
    pub versions_timeout_secs: u64,
    /// systemd unit removed once setup completes.
    pub autostart_unit: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `STACKADM_BIND_ADDR` — full bind address (overrides `PORT`)
    /// - `PORT` — port to bind on `0.0.0.0` (default: `8888`)
    /// - `STACKADM_PROJECT_DIR` — deployment directory (default: `.`)
    /// - `STACKADM_LOG_LEVEL` — log filter (default: `info`)
    /// - `STACKADM_RUNNER_INTERVAL` — seconds between runner ticks (default: `5`)
    /// - `STACKADM_VERSIONS_URL` — release API endpoint
    /// - `STACKADM_VERSIONS_TIMEOUT` — release API timeout in seconds (default: `10`)
    /// - `STACKADM_AUTOSTART_UNIT` — systemd unit name (default: `init-setup`)
    #[must_use]
    pub fn from_env() -> Self {
        let default_addr = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT));
        let bind_addr = if let Ok(addr) = std::env::var("STACKADM_BIND_ADDR") {
            addr.parse().unwrap_or(default_addr)
        } else if let Ok(port) = std::env::var("PORT") {
            SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(DEFAULT_PORT)))
        } else {
            default_addr
        };

        let project_dir = std::env::var("STACKADM_PROJECT_DIR")
            .map_or_else(|_| PathBuf::from("."), PathBuf::from);

        let log_level = std::env::var("STACKADM_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let runner_interval_secs = env_secs("STACKADM_RUNNER_INTERVAL", 5);
        let versions_timeout_secs = env_secs("STACKADM_VERSIONS_TIMEOUT", 10);

        let versions_url = std::env::var("STACKADM_VERSIONS_URL")
            .unwrap_or_else(|_| DEFAULT_VERSIONS_URL.to_owned());

        let autostart_unit =
            std::env::var("STACKADM_AUTOSTART_UNIT").unwrap_or_else(|_| DEFAULT_UNIT.to_owned());

        Self {
            bind_addr,
            project_dir,
            log_level,
            runner_interval_secs,
            versions_url,
            versions_timeout_secs,
            autostart_unit,
        }
    }

    #[must_use]
    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.project_dir)
    }

    #[must_use]
    pub fn runner_interval(&self) -> Duration {
        Duration::from_secs(self.runner_interval_secs)
    }

    #[must_use]
    pub fn versions_timeout(&self) -> Duration {
        Duration::from_secs(self.versions_timeout_secs)
    }
}

/// A positive number of seconds, or `default`.
fn env_secs(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&v| v > 0)
        .unwrap_or(default)
}
