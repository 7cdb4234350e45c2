//! Probe scheduling
//!
//! Drives the probing session: single-shot sends, and a timer-driven
//! periodic loop that sweeps the previous cycle, evicts stale
//! correlation entries, then sends the next probe. One background task
//! owns the periodic timer; another owns the receive loop; both are
//! cancellable promptly, without a wake-up datagram, and stop calls are
//! idempotent.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::{EventSink, ProbeEvent, StopReason};
use crate::stats::store::SampleStore;
use crate::{CORRELATION_RETENTION, MAX_SEQUENCE, SEQUENCE_WRAP_TO};

use super::codec;
use super::correlation::CorrelationStore;
use super::listener::ProbeListener;
use super::monitor::CycleMonitor;
use super::registry::{DeviceRegistry, IdentityPolicy};
use super::transport::Transport;

/// Sentinel for "nothing sent yet this session"
const SEQ_NONE: u32 = u32::MAX;

/// Session-wide probe sequence counter
///
/// The first probe of a session carries 0; thereafter the counter
/// increments by one per probe and wraps past 65535 to 1, never back to
/// 0. Exactly one value is current at any time.
#[derive(Debug)]
pub struct SequenceCounter {
    last: AtomicU32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            last: AtomicU32::new(SEQ_NONE),
        }
    }

    /// Assign and return the next sequence, making it current
    pub fn next(&self) -> u16 {
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(Self::advance(last))
            })
            .unwrap_or_else(|v| v);
        Self::advance(prev) as u16
    }

    fn advance(last: u32) -> u32 {
        match last {
            SEQ_NONE => 0,
            v if v == u32::from(MAX_SEQUENCE) => u32::from(SEQUENCE_WRAP_TO),
            v => v + 1,
        }
    }

    /// The currently outstanding sequence, if any probe has been sent
    pub fn last_sent(&self) -> Option<u16> {
        match self.last.load(Ordering::Acquire) {
            SEQ_NONE => None,
            v => Some(v as u16),
        }
    }

    /// Forget the session's sequence history
    pub fn reset(&self) {
        self.last.store(SEQ_NONE, Ordering::Release);
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by scheduler operations
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("a periodic run is already in progress")]
    AlreadyRunning,

    #[error("transport send failed: {0}")]
    Send(#[from] std::io::Error),
}

/// Parameters of a periodic run
#[derive(Debug, Clone)]
pub struct PeriodicConfig {
    pub target: std::net::SocketAddr,
    pub broadcast: bool,
    /// Tick interval; range-validated at the configuration boundary
    pub interval: Duration,
    /// Payload text carried by every probe of the run
    pub payload: String,
    /// Probes to send when `continuous` is false
    pub iteration_limit: u32,
    /// Ignore the iteration limit and run until stopped
    pub continuous: bool,
}

struct PeriodicTask {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

struct ListenerTask {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Handle to a running receive loop
pub struct ListenerHandle {
    task: ListenerTask,
}

impl ListenerHandle {
    /// Cancel the pending receive promptly. Idempotent.
    pub fn stop(&self) {
        let _ = self.task.stop.send(true);
    }

    /// Stop and wait for the receive task to exit
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.join.await;
    }
}

/// Drives probing: owns the session state and the background tasks
pub struct ProbeScheduler<T: Transport> {
    transport: Arc<T>,
    registry: Arc<DeviceRegistry>,
    correlation: Arc<CorrelationStore>,
    monitor: Arc<CycleMonitor>,
    sequence: Arc<SequenceCounter>,
    stats: Arc<SampleStore>,
    events: Arc<dyn EventSink>,
    policy: IdentityPolicy,
    periodic: Mutex<Option<PeriodicTask>>,
}

impl<T: Transport> ProbeScheduler<T> {
    pub fn new(transport: Arc<T>, policy: IdentityPolicy, events: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            registry: Arc::new(DeviceRegistry::new()),
            correlation: Arc::new(CorrelationStore::new()),
            monitor: Arc::new(CycleMonitor::new()),
            sequence: Arc::new(SequenceCounter::new()),
            stats: Arc::new(SampleStore::new()),
            events,
            policy,
            periodic: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn correlation(&self) -> Arc<CorrelationStore> {
        Arc::clone(&self.correlation)
    }

    pub fn monitor(&self) -> Arc<CycleMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn sequence(&self) -> Arc<SequenceCounter> {
        Arc::clone(&self.sequence)
    }

    pub fn stats(&self) -> Arc<SampleStore> {
        Arc::clone(&self.stats)
    }

    /// Build the receive-path handler for this session
    pub fn listener(&self) -> ProbeListener {
        ProbeListener::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.correlation),
            Arc::clone(&self.monitor),
            Arc::clone(&self.sequence),
            Arc::clone(&self.stats),
            Arc::clone(&self.events),
            self.policy,
        )
    }

    /// Spawn the receive loop on a background task
    pub fn spawn_listener(&self) -> ListenerHandle {
        let listener = self.listener();
        let transport = Arc::clone(&self.transport);
        let (stop, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    received = transport.recv(&mut buf) => match received {
                        Ok((len, source)) => listener.handle_datagram(&buf[..len], source),
                        Err(e) => {
                            // Transient receive failure; keep listening
                            tracing::warn!(error = %e, "receive failed");
                        }
                    }
                }
            }
            tracing::info!("listener stopped");
        });

        ListenerHandle {
            task: ListenerTask { stop, join },
        }
    }

    /// Send a single probe and return its sequence number
    ///
    /// Single sends are not subject to cycle timeout accounting; the
    /// Cycle Monitor is untouched.
    pub async fn send_once(
        &self,
        target: std::net::SocketAddr,
        broadcast: bool,
        payload: &str,
    ) -> Result<u16, SchedulerError> {
        let sequence = self.sequence.next();
        self.correlation.record(sequence, Instant::now());

        let frame = codec::encode_probe(sequence, payload);
        self.transport.send(target, &frame, broadcast).await?;

        tracing::info!(sequence, target = %target, "probe sent");
        self.events.emit(&ProbeEvent::ProbeSent {
            sequence,
            timestamp: Utc::now(),
        });
        Ok(sequence)
    }

    /// Begin a timer-driven periodic run
    ///
    /// Resets the session state (sequence counter, correlation entries,
    /// responded set, per-device counters, RTT history) so every run
    /// starts from a clean measurement baseline. On each tick, before
    /// sending: stale correlation entries are evicted and the previous
    /// cycle is swept. The iteration limit is evaluated at tick start, so
    /// exactly `iteration_limit` probes go out in bounded mode.
    pub fn start_periodic(&self, config: PeriodicConfig) -> Result<(), SchedulerError> {
        let mut slot = self
            .periodic
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.join.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.sequence.reset();
        self.correlation.clear();
        self.monitor.clear();
        self.registry.reset_cycle_counters();
        self.stats.reset();

        let transport = Arc::clone(&self.transport);
        let correlation = Arc::clone(&self.correlation);
        let monitor = Arc::clone(&self.monitor);
        let registry = Arc::clone(&self.registry);
        let sequence = Arc::clone(&self.sequence);
        let events = Arc::clone(&self.events);

        tracing::info!(
            target = %config.target,
            interval_ms = config.interval.as_millis() as u64,
            iteration_limit = config.iteration_limit,
            continuous = config.continuous,
            "periodic run started"
        );

        let (stop, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + config.interval;
            let mut ticker = tokio::time::interval_at(start, config.interval);
            let mut sent: u32 = 0;

            let reason = loop {
                tokio::select! {
                    _ = stop_rx.changed() => break StopReason::Cancelled,
                    _ = ticker.tick() => {}
                }

                if !config.continuous && sent >= config.iteration_limit {
                    break StopReason::LimitReached;
                }

                // Close out the previous cycle before this one's probe.
                // The first tick of a run has no previous cycle to judge.
                if sent > 0 {
                    correlation.evict_older_than(CORRELATION_RETENTION);
                    monitor.sweep(&registry, events.as_ref());
                }

                let seq = sequence.next();
                correlation.record(seq, Instant::now());
                let frame = codec::encode_probe(seq, &config.payload);

                match transport.send(config.target, &frame, config.broadcast).await {
                    Ok(_) => {
                        tracing::debug!(sequence = seq, "probe sent");
                        events.emit(&ProbeEvent::ProbeSent {
                            sequence: seq,
                            timestamp: Utc::now(),
                        });
                    }
                    Err(e) => {
                        // Transient failure; the run continues next tick
                        tracing::warn!(sequence = seq, error = %e, "periodic send failed");
                    }
                }
                sent += 1;
            };

            tracing::info!(reason = %reason, probes_sent = sent, "periodic run stopped");
            events.emit(&ProbeEvent::RunStopped { reason });
        });

        *slot = Some(PeriodicTask { stop, join });
        self.events.emit(&ProbeEvent::RunStarted);
        Ok(())
    }

    /// Cancel the periodic timer promptly. Idempotent; probes already
    /// handed to the transport are not retracted.
    pub fn stop_periodic(&self) {
        if let Some(task) = self
            .periodic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = task.stop.send(true);
        }
    }

    /// Whether a periodic run is currently active
    pub fn is_periodic_running(&self) -> bool {
        self.periodic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.join.is_finished())
    }

    /// Wait for the current periodic run to finish, if one is active
    pub async fn join_periodic(&self) {
        let slot = self
            .periodic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = slot {
            let _ = task.join.await;
        }
    }
}
