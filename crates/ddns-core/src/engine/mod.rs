//! Update cycle controller
//!
//! The [`Updater`] is responsible for:
//! - Resolving the public IPv4 and IPv6 addresses
//! - Fanning pushes out to every configured provider
//! - Repeating that pass on a fixed period until stopped
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   tick / update │   Updater    │
//!   ─────────────►│    (pass)    │
//!                 └──────────────┘
//!                        │
//!         ┌──────────────┼──────────────────────┐
//!         ▼              ▼                      ▼
//! ┌──────────────┐ ┌──────────────┐    ┌──────────────────┐
//! │ IPv4 source  │ │ IPv6 source  │    │ one task per     │
//! │ (lookup)     │ │ (lookup)     │    │ provider (push)  │
//! └──────────────┘ └──────────────┘    └──────────────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. Resolve both families independently; a failed family is skipped
//! 2. Spawn one task per provider, pushing every resolved family it supports
//! 3. Join all provider tasks; failures are logged, never propagated
//!
//! ## Lifecycle
//!
//! `Idle → Scheduled → Stopped`, with no re-entry. [`Updater::run`] and
//! [`Updater::stop`] are idempotent. [`Updater::update`] runs a pass
//! directly in any state.

mod report;

pub use report::{PassReport, PushOutcome, PushStatus};

use crate::config::DdnsConfig;
use crate::error::{Error, Result};
use crate::net::{self, build_address_client, build_push_client};
use crate::provider::CompiledProvider;
use crate::traits::{AddressSource, IpVersion};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Lifecycle state of an [`Updater`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, scheduler not started
    Idle,
    /// Scheduler running
    Scheduled,
    /// Stopped; the scheduler never runs again
    Stopped,
}

/// Pre-built pieces an [`Updater`] can be assembled from
///
/// [`Updater::new`] builds these from configuration; embedders and tests can
/// supply their own address sources.
pub struct UpdaterParts {
    /// Interval between scheduled passes
    pub period: Duration,
    /// IPv4 source, `None` if that family is disabled
    pub ipv4: Option<Arc<dyn AddressSource>>,
    /// IPv6 source, `None` if that family is disabled
    pub ipv6: Option<Arc<dyn AddressSource>>,
    /// Providers, pushed in this order
    pub providers: Vec<CompiledProvider>,
    /// Client shared by every push
    pub push_client: reqwest::Client,
}

/// Dynamic DNS updater
///
/// ## Threading
///
/// All methods take `&self`; wrap the updater in an `Arc` to drive it from
/// several tasks. [`run`](Self::run) must be called from within a Tokio
/// runtime.
///
/// ## Overlapping passes
///
/// Each tick spawns its pass without waiting for the previous one, so a pass
/// slower than the period overlaps the next. Providers never mutate shared
/// state while building requests, so overlapping passes are independent.
pub struct Updater {
    shared: Arc<Shared>,
    state: Mutex<LifecycleState>,
}

struct Shared {
    period: Duration,
    ipv4: Option<Arc<dyn AddressSource>>,
    ipv6: Option<Arc<dyn AddressSource>>,
    providers: Vec<Arc<CompiledProvider>>,
    push_client: reqwest::Client,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Updater {
    /// Create an updater from configuration
    ///
    /// Builds both lookup clients, the push client and every provider. Any
    /// failure is returned; no partially configured updater is produced.
    pub fn new(config: &DdnsConfig) -> Result<Self> {
        config.validate()?;

        let mut sources: [Option<Arc<dyn AddressSource>>; 2] = [None, None];
        for (slot, version) in sources.iter_mut().zip(IpVersion::ALL) {
            if let Some(client_config) = config.address_client(version) {
                let source = build_address_client(version, &client_config)?;
                net::log_address_client(&source, &client_config);
                *slot = Some(Arc::new(source));
            }
        }
        let [ipv4, ipv6] = sources;

        let providers = config
            .provider_paths()
            .iter()
            .map(CompiledProvider::load_file)
            .collect::<Result<Vec<_>>>()?;

        let push_client = build_push_client(config.push_proxy(), config.request_timeout())?;

        Self::from_parts(UpdaterParts {
            period: config.period(),
            ipv4,
            ipv6,
            providers,
            push_client,
        })
    }

    /// Assemble an updater from pre-built parts
    pub fn from_parts(parts: UpdaterParts) -> Result<Self> {
        if parts.ipv4.is_none() && parts.ipv6.is_none() {
            return Err(Error::config("IPv4/IPv6 are all disabled"));
        }
        for (source, version) in [(&parts.ipv4, IpVersion::V4), (&parts.ipv6, IpVersion::V6)] {
            match source {
                Some(source) if source.version() != version => {
                    return Err(Error::config(format!(
                        "{} source configured in the {} slot",
                        source.version(),
                        version
                    )));
                }
                _ => {}
            }
        }
        if parts.period.is_zero() {
            return Err(Error::config("update period must be > 0"));
        }
        // The scheduler computes deadlines as `now + period`
        let now = Instant::now();
        if now
            .checked_add(parts.period)
            .and_then(|deadline| deadline.checked_add(parts.period))
            .is_none()
        {
            return Err(Error::config(format!(
                "update period {:?} is too large",
                parts.period
            )));
        }
        if parts.providers.is_empty() {
            warn!("No providers configured, passes will only resolve addresses");
        }

        info!(
            providers = parts.providers.len(),
            period = ?parts.period,
            "Updater created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                period: parts.period,
                ipv4: parts.ipv4,
                ipv6: parts.ipv6,
                providers: parts.providers.into_iter().map(Arc::new).collect(),
                push_client: parts.push_client,
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
            state: Mutex::new(LifecycleState::Idle),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    /// Names of the loaded providers, in push order
    pub fn provider_names(&self) -> Vec<&str> {
        self.shared.providers.iter().map(|p| p.name()).collect()
    }

    /// Start the background scheduler
    ///
    /// Only the first call from `Idle` starts it; every other call is a no-op.
    /// The first scheduled pass runs one period after this call.
    pub fn run(&self) {
        let mut state = self.lock_state();
        if *state != LifecycleState::Idle {
            debug!(state = ?*state, "Run ignored");
            return;
        }
        *state = LifecycleState::Scheduled;

        let shared = Arc::clone(&self.shared);
        self.shared.tasks.spawn(shared.schedule());
        info!(period = ?self.shared.period, "Scheduler started");
    }

    /// Run one pass now, independent of the scheduler
    ///
    /// After [`stop`](Self::stop) every request is cancelled immediately, so
    /// the pass resolves nothing.
    pub async fn update(&self) -> PassReport {
        self.shared.tasks.track_future(self.shared.pass()).await
    }

    /// Stop the scheduler and wait for in-flight work
    ///
    /// Cancels every in-flight lookup and push, then waits until the
    /// scheduler and all passes have exited. Safe to call repeatedly; every
    /// call waits for the drain.
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            if *state != LifecycleState::Stopped {
                info!(previous = ?*state, "Stopping updater");
                *state = LifecycleState::Stopped;
            }
        }

        self.shared.cancel.cancel();
        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        debug!("Updater drained");
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        // The scheduler holds its own reference to `shared`
        self.shared.cancel.cancel();
    }
}

impl Shared {
    async fn schedule(self: Arc<Self>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let shared = Arc::clone(&self);
                    self.tasks.spawn(async move {
                        shared.pass().await;
                    });
                }
            }
        }
    }

    fn source(&self, version: IpVersion) -> Option<&Arc<dyn AddressSource>> {
        match version {
            IpVersion::V4 => self.ipv4.as_ref(),
            IpVersion::V6 => self.ipv6.as_ref(),
        }
    }

    async fn pass(&self) -> PassReport {
        let (ipv4, ipv6) = tokio::join!(self.resolve(IpVersion::V4), self.resolve(IpVersion::V6));
        let mut report = PassReport {
            ipv4,
            ipv6,
            outcomes: Vec::new(),
        };
        if report.ipv4.is_none() && report.ipv6.is_none() {
            debug!("No address resolved, skipping push");
            return report;
        }

        let handles: Vec<_> = self
            .providers
            .iter()
            .map(|provider| {
                let push = ProviderPush {
                    provider: Arc::clone(provider),
                    client: self.push_client.clone(),
                    cancel: self.cancel.clone(),
                    ipv4: report.ipv4.clone(),
                    ipv6: report.ipv6.clone(),
                };
                self.tasks.spawn(push.run())
            })
            .collect();

        for (handle, provider) in handles.into_iter().zip(&self.providers) {
            match handle.await {
                Ok(outcomes) => report.outcomes.extend(outcomes),
                Err(e) => {
                    error!(provider = %provider.name(), "Push task aborted: {}", e);
                    for version in IpVersion::ALL {
                        if report.address(version).is_some() {
                            report.outcomes.push(PushOutcome {
                                provider: provider.name().to_string(),
                                version,
                                status: PushStatus::Failed {
                                    error: e.to_string(),
                                },
                            });
                        }
                    }
                }
            }
        }

        report
    }

    async fn resolve(&self, version: IpVersion) -> Option<String> {
        let source = self.source(version)?;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = source.current() => result,
        };

        match result {
            Ok(ip) => {
                info!(version = %version, ip = %ip, "Resolved public address");
                Some(ip)
            }
            Err(Error::Cancelled) => {
                debug!(version = %version, "Address lookup cancelled");
                None
            }
            Err(e) => {
                error!(version = %version, "Failed to get public address: {}", e);
                None
            }
        }
    }
}

/// Everything one provider task needs, owned so the task is `'static`
struct ProviderPush {
    provider: Arc<CompiledProvider>,
    client: reqwest::Client,
    cancel: CancellationToken,
    ipv4: Option<String>,
    ipv6: Option<String>,
}

impl ProviderPush {
    async fn run(self) -> Vec<PushOutcome> {
        let mut outcomes = Vec::with_capacity(2);
        for (version, ip) in [(IpVersion::V4, &self.ipv4), (IpVersion::V6, &self.ipv6)] {
            let Some(ip) = ip else {
                continue;
            };
            let status = self.push(version, ip).await;
            self.log(version, &status);
            outcomes.push(PushOutcome {
                provider: self.provider.name().to_string(),
                version,
                status,
            });
        }
        outcomes
    }

    async fn push(&self, version: IpVersion, ip: &str) -> PushStatus {
        let request = match self.provider.build_request(version, ip) {
            Ok(Some(request)) => request,
            Ok(None) => return PushStatus::Unsupported,
            Err(e) => {
                return PushStatus::Failed {
                    error: e.to_string(),
                };
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = send(&self.client, request) => result,
        };

        match result {
            Ok(body) if self.provider.is_accepted_response(&body) => PushStatus::Accepted,
            Ok(body) => PushStatus::Rejected { body },
            Err(e) => PushStatus::Failed {
                error: e.to_string(),
            },
        }
    }

    fn log(&self, version: IpVersion, status: &PushStatus) {
        let provider = self.provider.name();
        match status {
            PushStatus::Accepted => {
                info!(provider = %provider, version = %version, "Pushed address");
            }
            PushStatus::Unsupported => {
                debug!(provider = %provider, version = %version, "Family not supported, skipped");
            }
            PushStatus::Rejected { body } => {
                error!(
                    provider = %provider,
                    version = %version,
                    "Failed to push address: {}",
                    Error::UnexpectedResponse { body: body.clone() }
                );
            }
            PushStatus::Failed { error } => {
                error!(provider = %provider, version = %version, "Failed to push address: {}", error);
            }
        }
    }
}

/// Send a push request and read the whole body as text
async fn send(client: &reqwest::Client, request: reqwest::Request) -> Result<String> {
    let response = client.execute(request).await?;
    let body = response.bytes().await?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedSource(IpVersion, &'static str);

    #[async_trait]
    impl AddressSource for FixedSource {
        async fn current(&self) -> Result<String> {
            Ok(self.1.to_string())
        }

        fn version(&self) -> IpVersion {
            self.0
        }
    }

    fn parts(ipv4: Option<Arc<dyn AddressSource>>, ipv6: Option<Arc<dyn AddressSource>>) -> UpdaterParts {
        UpdaterParts {
            period: Duration::from_secs(60),
            ipv4,
            ipv6,
            providers: Vec::new(),
            push_client: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_requires_a_family() {
        let result = Updater::from_parts(parts(None, None));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_source_in_wrong_slot() {
        let v6: Arc<dyn AddressSource> = Arc::new(FixedSource(IpVersion::V6, "2001:db8::1"));
        assert!(Updater::from_parts(parts(Some(v6), None)).is_err());
    }

    #[test]
    fn test_rejects_zero_period() {
        let v4: Arc<dyn AddressSource> = Arc::new(FixedSource(IpVersion::V4, "192.0.2.1"));
        let mut parts = parts(Some(v4), None);
        parts.period = Duration::ZERO;
        assert!(Updater::from_parts(parts).is_err());
    }

    #[test]
    fn test_rejects_unschedulable_period() {
        let v4: Arc<dyn AddressSource> = Arc::new(FixedSource(IpVersion::V4, "192.0.2.1"));
        let mut parts = parts(Some(v4), None);
        parts.period = Duration::from_secs(i64::MAX as u64);
        assert!(matches!(Updater::from_parts(parts), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_with_huge_integer_period_fails_construction() {
        let config = DdnsConfig::from_toml_str(
            "period = 9223372036854775807\n[public_ipv4]\nenable = true\nurl = \"http://127.0.0.1/ip\"\n",
        )
        .unwrap();
        assert!(matches!(Updater::new(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_is_linear() {
        let v4: Arc<dyn AddressSource> = Arc::new(FixedSource(IpVersion::V4, "192.0.2.1"));
        let updater = Updater::from_parts(parts(Some(v4), None)).unwrap();
        assert_eq!(updater.state(), LifecycleState::Idle);

        updater.run();
        updater.run();
        assert_eq!(updater.state(), LifecycleState::Scheduled);

        updater.stop().await;
        updater.stop().await;
        assert_eq!(updater.state(), LifecycleState::Stopped);

        updater.run();
        assert_eq!(updater.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_update_without_providers_resolves_addresses() {
        let v4: Arc<dyn AddressSource> = Arc::new(FixedSource(IpVersion::V4, "192.0.2.1"));
        let v6: Arc<dyn AddressSource> = Arc::new(FixedSource(IpVersion::V6, "2001:db8::1"));
        let updater = Updater::from_parts(parts(Some(v4), Some(v6))).unwrap();

        let report = updater.update().await;
        assert_eq!(report.address(IpVersion::V4), Some("192.0.2.1"));
        assert_eq!(report.address(IpVersion::V6), Some("2001:db8::1"));
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_update_after_stop_is_cancelled() {
        let v4: Arc<dyn AddressSource> = Arc::new(FixedSource(IpVersion::V4, "192.0.2.1"));
        let updater = Updater::from_parts(parts(Some(v4), None)).unwrap();
        updater.stop().await;

        let report = updater.update().await;
        assert_eq!(report, PassReport::default());
    }
}
