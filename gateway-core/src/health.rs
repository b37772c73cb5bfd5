//! Background health-check sweep loop (§4.G).
//!
//! One process-wide instance. Each sweep snapshots active providers,
//! probes `GET <base>/models` concurrently, applies the status/failure
//! transition table, commits, and writes a fresh backup. Started at
//! system boot when `health_check_enabled`; stopped via a termination
//! flag with a 5-second join budget, grounded on the original service's
//! `HealthChecker.start`/`stop`.

use crate::crypto;
use crate::domain::ProviderStatus;
use crate::store::Store;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: i64,
    pub backup_path: PathBuf,
}

pub struct HealthChecker {
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            handle: std::sync::Mutex::new(None),
        }
    }

    pub fn start(
        &self,
        store: Arc<Store>,
        http: Client,
        secret: String,
        config: HealthCheckConfig,
    ) {
        let shutdown = self.shutdown.clone();
        let notify = self.notify.clone();
        let handle = tokio::spawn(async move {
            info!("health checker started, interval={:?}", config.interval);
            while !shutdown.load(Ordering::SeqCst) {
                if let Err(e) = run_sweep(&store, &http, &secret, &config).await {
                    error!("health check sweep failed: {e}");
                }
                tokio::select! {
                    _ = tokio::time::sleep(config.interval) => {}
                    _ = notify.notified() => {}
                }
            }
            info!("health checker stopped");
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Signals the loop to stop and waits up to 5 seconds for it to exit.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("health check task did not stop within timeout");
            }
        }
    }
}

async fn run_sweep(
    store: &Store,
    http: &Client,
    secret: &str,
    config: &HealthCheckConfig,
) -> Result<(), crate::error::GatewayError> {
    let providers: Vec<_> = store
        .list_providers()
        .await?
        .into_iter()
        .filter(|p| p.is_active)
        .collect();

    let probes = providers.iter().map(|provider| {
        probe_one(store, http, secret, config, provider.id.clone(), provider.clone())
    });
    futures::future::join_all(probes).await;

    crate::backup::write_backup(store, &config.backup_path).await?;
    Ok(())
}

/// Outcome of a single probe (§4.G step 3), independent of any persisted
/// provider row — used both by the background sweep and by the
/// synchronous `/test` / `/test-direct` admin endpoints.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub status: ProviderStatus,
    pub latency_ms: Option<i64>,
    pub failed: bool,
}

/// `GET <base>/models` with bearer auth, classified per the §4.G outcome
/// table. `base_url` is normalised (trailing slashes stripped) before the
/// path is appended.
pub async fn probe(http: &Client, base_url: &str, api_key: &str, timeout: Duration) -> ProbeOutcome {
    let url = format!("{}/models", base_url.trim_end_matches('/'));
    let start = Instant::now();
    let outcome = http
        .get(&url)
        .timeout(timeout)
        .bearer_auth(api_key)
        .send()
        .await;
    let elapsed_ms = start.elapsed().as_millis() as i64;

    let (status, latency_ms, failed) = match outcome {
        Ok(response) if response.status().is_success() => (ProviderStatus::Online, Some(elapsed_ms), false),
        Ok(_) => (ProviderStatus::Degraded, Some(elapsed_ms), true),
        Err(e) if e.is_timeout() => (ProviderStatus::Timeout, None, true),
        Err(e) if e.is_connect() || e.is_request() => (ProviderStatus::Unreachable, None, true),
        Err(_) => (ProviderStatus::Error, None, true),
    };

    ProbeOutcome {
        status,
        latency_ms,
        failed,
    }
}

async fn probe_one(
    store: &Store,
    http: &Client,
    secret: &str,
    config: &HealthCheckConfig,
    provider_id: String,
    provider: crate::domain::Provider,
) {
    let decrypted_key = crypto::decrypt(secret, &provider.api_key_opaque).unwrap_or_default();
    let outcome = probe(http, provider.normalised_base_url(), &decrypted_key, config.timeout).await;

    let consecutive_failures = if outcome.failed {
        provider.consecutive_failures + 1
    } else {
        0
    };
    let is_healthy = !outcome.failed || consecutive_failures < config.failure_threshold;

    if let Err(e) = store
        .set_provider_health(
            &provider_id,
            outcome.status,
            outcome.latency_ms,
            consecutive_failures,
            is_healthy,
        )
        .await
    {
        error!("failed to persist health probe for provider {provider_id}: {e}");
    }
}
