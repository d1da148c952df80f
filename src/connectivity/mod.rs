//! Online/offline tracking and reconnection probing.
//!
//! The monitor mirrors platform connectivity signals
//! ([`ConnectionMonitor::notify_online`] / [`notify_offline`]) and, while
//! offline, schedules health-check probes spaced by the same backoff primitive
//! the retry path uses, just with longer intervals. Probing stops after
//! `max_reconnect_attempts` consecutive failures; a later online signal still
//! recovers immediately. Subscribers hear every state change synchronously,
//! plus one immediate callback with the current state at subscription time.
//!
//! [`notify_offline`]: ConnectionMonitor::notify_offline

use std::{
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle};
use url::Url;

use crate::core::{
    client::Backoff,
    telemetry::{NoopTelemetry, Severity, TelemetrySink},
};

/// Upper bound on a single reconnection probe, independent of the client's
/// request timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome check for one reconnection probe.
///
/// Boxed-future shape so implementations stay object-safe; the crate's native
/// probe is [`HttpHealthProbe`], tests can inject their own.
pub trait HealthProbe: Send + Sync {
    /// Resolves to `true` when the upstream answered the health check.
    fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// GET against a health endpoint; any 2xx counts as connectivity.
pub struct HttpHealthProbe {
    http: reqwest::Client,
    url: Url,
}

impl HttpHealthProbe {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

impl HealthProbe for HttpHealthProbe {
    fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            self.http
                .get(self.url.clone())
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
                .is_ok_and(|resp| resp.status().is_success())
        })
    }
}

/// Point-in-time connectivity view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionState {
    /// Whether the client believes it can reach the upstream.
    pub is_online: bool,
    /// Probes scheduled since connectivity was last confirmed.
    pub reconnect_attempts: u32,
}

/// Tuning for the [`ConnectionMonitor`].
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Probe spacing while offline. Default: exponential 2s doubling up to
    /// 60s, with jitter.
    pub backoff: Backoff,
    /// Consecutive failed probes before the loop gives up and waits for an
    /// explicit online signal. Default: 10.
    pub max_reconnect_attempts: u32,
    /// Initial state before any signal or probe has run. Default: online.
    pub assume_online: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::Exponential {
                base: Duration::from_secs(2),
                factor: 2.0,
                max: Duration::from_secs(60),
                jitter: true,
            },
            max_reconnect_attempts: 10,
            assume_online: true,
        }
    }
}

type ChangeCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct MonitorState {
    is_online: bool,
    reconnect_attempts: u32,
    next_subscriber_id: u64,
    subscribers: Vec<(u64, ChangeCallback)>,
    probe_task: Option<JoinHandle<()>>,
}

impl MonitorState {
    fn callbacks(&self) -> Vec<ChangeCallback> {
        self.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }
}

struct MonitorShared {
    config: MonitorConfig,
    probe: Arc<dyn HealthProbe>,
    telemetry: Arc<dyn TelemetrySink>,
    /// Runtime captured at construction, so probe tasks can be scheduled even
    /// when a signal arrives on a non-runtime thread.
    runtime: Option<Handle>,
    state: Mutex<MonitorState>,
}

impl MonitorShared {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip to online, reset the attempt counter, cancel any pending probe,
    /// and (on a real transition) tell the subscribers.
    fn confirm_online(&self, via: &str) {
        let (flipped, callbacks, task) = {
            let mut st = self.lock_state();
            let flipped = !st.is_online;
            st.is_online = true;
            st.reconnect_attempts = 0;
            (flipped, st.callbacks(), st.probe_task.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        if flipped {
            #[cfg(feature = "tracing")]
            tracing::info!(via, "connection restored");
            self.telemetry.record_event(
                "connectivity",
                "online",
                Severity::Info,
                &[("via", via.to_string())],
            );
            for cb in callbacks {
                cb(true);
            }
        }
    }
}

/// Tracks whether the upstream is reachable and drives recovery probing.
///
/// Clones share state, so a clone embedded in a client observes the same
/// signals as the handle the application keeps.
#[derive(Clone)]
pub struct ConnectionMonitor {
    shared: Arc<MonitorShared>,
}

impl ConnectionMonitor {
    /// A monitor that checks connectivity with `probe` on the given schedule.
    pub fn new(probe: Arc<dyn HealthProbe>, config: MonitorConfig) -> Self {
        Self::with_telemetry(probe, config, Arc::new(NoopTelemetry))
    }

    pub(crate) fn with_telemetry(
        probe: Arc<dyn HealthProbe>,
        config: MonitorConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let assume_online = config.assume_online;
        Self {
            shared: Arc::new(MonitorShared {
                config,
                probe,
                telemetry,
                runtime: Handle::try_current().ok(),
                state: Mutex::new(MonitorState {
                    is_online: assume_online,
                    reconnect_attempts: 0,
                    next_subscriber_id: 0,
                    subscribers: Vec::new(),
                    probe_task: None,
                }),
            }),
        }
    }

    /// Whether the client may attempt network calls right now.
    pub fn is_online(&self) -> bool {
        self.shared.lock_state().is_online
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        let st = self.shared.lock_state();
        ConnectionState {
            is_online: st.is_online,
            reconnect_attempts: st.reconnect_attempts,
        }
    }

    /// Platform-level online signal: treated as confirmed connectivity at
    /// once, cancelling any probing in flight.
    pub fn notify_online(&self) {
        self.shared.confirm_online("signal");
    }

    /// Platform-level offline signal: flips the state, tells subscribers, and
    /// starts the reconnection probe loop.
    ///
    /// Repeated signals while probing is already underway are ignored. The
    /// attempt counter is deliberately not reset here; only confirmed
    /// connectivity resets it.
    ///
    /// The probe loop runs on the tokio runtime that was current when the
    /// monitor was built, falling back to the caller's. With neither, no
    /// probing is scheduled and the monitor stays offline until an online
    /// signal; the signal itself is safe from any thread.
    pub fn notify_offline(&self) {
        let (flipped, callbacks, spawn) = {
            let mut st = self.shared.lock_state();
            let flipped = st.is_online;
            st.is_online = false;
            let idle = st.probe_task.as_ref().is_none_or(JoinHandle::is_finished);
            let spawn = flipped
                || (idle && st.reconnect_attempts < self.shared.config.max_reconnect_attempts);
            (flipped, st.callbacks(), spawn)
        };
        if flipped {
            #[cfg(feature = "tracing")]
            tracing::warn!("connection lost");
            self.shared
                .telemetry
                .record_event("connectivity", "offline", Severity::Warn, &[]);
            for cb in callbacks {
                cb(false);
            }
        }
        if spawn {
            spawn_probe_loop(&self.shared);
        }
    }

    /// Register `callback` for state changes.
    ///
    /// The callback fires once immediately with the current state, then on
    /// every transition, synchronously from whichever thread signals it. It
    /// stays registered until [`Subscription::unsubscribe`] is called;
    /// dropping the handle keeps the subscription alive.
    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let cb: ChangeCallback = Arc::new(callback);
        let (id, current) = {
            let mut st = self.shared.lock_state();
            let id = st.next_subscriber_id;
            st.next_subscriber_id += 1;
            st.subscribers.push((id, Arc::clone(&cb)));
            (id, st.is_online)
        };
        cb(current);
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }
}

/// Handle for a registered connectivity callback.
pub struct Subscription {
    id: u64,
    shared: Weak<MonitorShared>,
}

impl Subscription {
    /// Remove the callback; it will not be invoked again.
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut st = shared.lock_state();
            st.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Probe until connectivity is confirmed, the attempt budget runs out, or an
/// online signal arrives. At most one loop is live per monitor; a newer loop
/// replaces (and aborts) a stale one.
fn spawn_probe_loop(shared: &Arc<MonitorShared>) {
    // The runtime captured at construction, or the caller's. Neither means no
    // probing: the monitor stays offline until an online signal.
    let Some(runtime) = shared
        .runtime
        .clone()
        .or_else(|| Handle::try_current().ok())
    else {
        #[cfg(feature = "tracing")]
        tracing::warn!("no tokio runtime; reconnection probing skipped until an online signal");
        shared.telemetry.record_event(
            "connectivity",
            "probe_skipped",
            Severity::Warn,
            &[("reason", "no_runtime".to_string())],
        );
        return;
    };
    let task_shared = Arc::clone(shared);
    let handle = runtime.spawn(async move {
        loop {
            let (attempt, exhausted) = {
                let mut st = task_shared.lock_state();
                if st.is_online {
                    (None, false)
                } else if st.reconnect_attempts >= task_shared.config.max_reconnect_attempts {
                    (None, true)
                } else {
                    st.reconnect_attempts += 1;
                    (Some(st.reconnect_attempts - 1), false)
                }
            };
            let Some(attempt) = attempt else {
                if exhausted {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("reconnection attempts exhausted; waiting for an online signal");
                    task_shared.telemetry.record_event(
                        "connectivity",
                        "reconnect_exhausted",
                        Severity::Warn,
                        &[],
                    );
                }
                break;
            };
            tokio::time::sleep(task_shared.config.backoff.delay_for(attempt)).await;
            if task_shared.lock_state().is_online {
                break;
            }
            if task_shared.probe.check().await {
                task_shared.confirm_online("probe");
                break;
            }
            task_shared.telemetry.record_event(
                "connectivity",
                "probe_failed",
                Severity::Info,
                &[("attempt", (attempt + 1).to_string())],
            );
        }
    });
    let mut st = shared.lock_state();
    if let Some(old) = st.probe_task.replace(handle) {
        old.abort();
    }
}
