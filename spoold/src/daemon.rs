use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use spool_core::StoreClient;
use tokio::task::JoinHandle;

use crate::lock::{InstanceLock, LockEvent};
use crate::sync::backoff::Backoff;
use crate::sync::dispatcher::{DispatchError, Dispatcher};
use crate::sync::queue::ReconcileReport;
use crate::sync::scanner::{DirectoryScanner, ScanError};

const DEFAULT_REMOTE_PREFIX: &str = "/";
const DEFAULT_PATTERN: &str = ".*";
const DEFAULT_LOCK_PORT: u16 = 47913;
const DEFAULT_LOCK_ATTEMPTS: u64 = 5;
const DEFAULT_SCAN_SECS: u64 = 10;
const DEFAULT_COOLDOWN_MS: u64 = 1000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub watch_dir: PathBuf,
    pub remote_url: String,
    pub remote_prefix: String,
    pub token: Option<String>,
    pub patterns: Vec<Regex>,
    pub lock_port: u16,
    pub lock_attempts: u32,
    pub scan_interval: Duration,
    pub cooldown: Duration,
    pub connect_timeout: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir();
        Self::from_lookup(|name| std::env::var(name).ok(), home.as_deref())
    }

    pub fn from_lookup<F>(lookup: F, home: Option<&Path>) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let watch_dir = lookup("SPOOL_WATCH_DIR")
            .filter(|value| !value.trim().is_empty())
            .context("SPOOL_WATCH_DIR is not set")?;
        let watch_dir = match home {
            Some(home) => expand_with_home(&watch_dir, home),
            None => PathBuf::from(watch_dir),
        };
        let remote_url = lookup("SPOOL_REMOTE_URL")
            .filter(|value| !value.trim().is_empty())
            .context("SPOOL_REMOTE_URL is not set")?;
        let remote_prefix =
            lookup("SPOOL_REMOTE_PREFIX").unwrap_or_else(|| DEFAULT_REMOTE_PREFIX.to_string());
        let token = lookup("SPOOL_TOKEN").filter(|value| !value.is_empty());
        let patterns = parse_patterns(lookup("SPOOL_PATTERNS").as_deref())?;
        let lock_port = lookup("SPOOL_LOCK_PORT")
            .and_then(|value| value.trim().parse::<u16>().ok())
            .filter(|port| *port > 0)
            .unwrap_or(DEFAULT_LOCK_PORT);
        let lock_attempts = read_u64(&lookup, "SPOOL_LOCK_ATTEMPTS", DEFAULT_LOCK_ATTEMPTS)
            .min(u64::from(u32::MAX)) as u32;
        let scan_interval =
            Duration::from_secs(read_u64(&lookup, "SPOOL_SCAN_SECS", DEFAULT_SCAN_SECS));
        let cooldown =
            Duration::from_millis(read_u64(&lookup, "SPOOL_COOLDOWN_MS", DEFAULT_COOLDOWN_MS));
        let connect_timeout = Duration::from_secs(read_u64(
            &lookup,
            "SPOOL_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        ));

        Ok(Self {
            watch_dir,
            remote_url,
            remote_prefix,
            token,
            patterns,
            lock_port,
            lock_attempts,
            scan_interval,
            cooldown,
            connect_timeout,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    lock: InstanceLock,
    scanner: DirectoryScanner,
    dispatcher: Arc<Dispatcher>,
}

impl DaemonRuntime {
    /// Takes the instance lock, then connects to the store. Either failing
    /// is fatal.
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let watch_dir = tokio::fs::canonicalize(&config.watch_dir)
            .await
            .with_context(|| format!("watch directory {:?} is not accessible", config.watch_dir))?;
        anyhow::ensure!(
            watch_dir.to_str().is_some(),
            "watch directory path is not valid UTF-8: {}",
            watch_dir.display()
        );

        let lock = InstanceLock::acquire(
            config.lock_port,
            config.lock_attempts,
            lock_backoff(),
            log_lock_event,
        )
        .await
        .context("failed to acquire instance lock")?;

        let client = StoreClient::with_connect_timeout(
            &config.remote_url,
            config.token.clone(),
            config.connect_timeout,
        )
        .context("invalid remote store configuration")?;
        client
            .ping()
            .await
            .with_context(|| format!("remote store at {} is unreachable", config.remote_url))?;

        let scanner = DirectoryScanner::new(watch_dir, config.patterns.clone());
        let dispatcher = Arc::new(Dispatcher::new(client, config.remote_prefix.clone()));

        Ok(Self {
            config,
            lock,
            scanner,
            dispatcher,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            watch_dir = %self.scanner.root().display(),
            remote = %self.config.remote_url,
            prefix = %self.config.remote_prefix,
            lock_port = self.lock.port(),
            "started"
        );

        let mut scan_handle = tokio::spawn(scan_lane(
            self.scanner.clone(),
            Arc::clone(&self.dispatcher),
            self.config.scan_interval,
        ));
        let dispatcher_for_worker = Arc::clone(&self.dispatcher);
        let cooldown = self.config.cooldown;
        let mut dispatch_handle =
            tokio::spawn(async move { dispatcher_for_worker.run(cooldown).await });

        let result = tokio::select! {
            res = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                res.context("failed waiting for shutdown signal")
            }
            res = watch_lanes(&mut scan_handle, &mut dispatch_handle) => res,
        };

        scan_handle.abort();
        dispatch_handle.abort();
        result
    }
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
