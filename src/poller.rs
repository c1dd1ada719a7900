//! Background polling for configuration updates.
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use rand::Rng;

use crate::{ConfigurationFetcher, ConfigurationStore, Error, Result};

/// Parameters controlling the polling cadence.
#[derive(Debug, Clone, Copy)]
pub struct PollerThreadConfig {
    /// Time between fetch attempts.
    pub interval: Duration,
    /// Maximum amount subtracted from `interval` each cycle. Spreads fleets of clients started
    /// at the same moment (e.g. after a deploy) across the interval instead of having them all
    /// hit the server in lockstep.
    pub jitter: Duration,
}

impl PollerThreadConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    pub fn new() -> PollerThreadConfig {
        PollerThreadConfig::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> PollerThreadConfig {
        self.interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> PollerThreadConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            interval: PollerThreadConfig::DEFAULT_POLL_INTERVAL,
            jitter: PollerThreadConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// Outcome of the initial fetch. `None` until the first fetch succeeds, fails unrecoverably, or
/// the thread exits; transient errors keep it `None` so waiters keep waiting.
pub(crate) type FirstFetchSignal = Arc<(Mutex<Option<Result<()>>>, Condvar)>;

/// Block until the signal is published.
pub(crate) fn wait_first_fetch(signal: &FirstFetchSignal) -> Result<()> {
    let (lock, cvar) = &**signal;
    let mut slot = match lock.lock() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    loop {
        match &*slot {
            Some(result) => return result.clone(),
            None => {
                slot = match cvar.wait(slot) {
                    Ok(slot) => slot,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        }
    }
}

/// A dedicated OS thread that periodically fetches configuration and publishes it to a
/// [`ConfigurationStore`].
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,
    stop_sender: SyncSender<()>,
    first_fetch: FirstFetchSignal,
}

impl PollerThread {
    /// Start polling with the default cadence.
    pub fn start(
        fetcher: ConfigurationFetcher,
        store: Arc<ConfigurationStore>,
    ) -> std::io::Result<PollerThread> {
        PollerThread::start_with_config(fetcher, store, PollerThreadConfig::default())
    }

    /// Start polling. Returns as soon as the thread is spawned; use
    /// [`wait_for_configuration`](PollerThread::wait_for_configuration) to block until the first
    /// fetch lands.
    pub fn start_with_config(
        mut fetcher: ConfigurationFetcher,
        store: Arc<ConfigurationStore>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread> {
        // Bounded at one pending message so stop() never blocks; a second concurrent stop finds
        // the buffer full and that is fine.
        let (stop_sender, stop_receiver) = sync_channel::<()>(1);

        let first_fetch = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            let first_fetch = Arc::clone(&first_fetch);
            std::thread::Builder::new()
                .name("switchyard-poller".to_owned())
                .spawn(move || {
                    let publish = |result: Result<()>| {
                        let (lock, cvar) = &*first_fetch;
                        let mut slot = match lock.lock() {
                            Ok(slot) => slot,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        if slot.is_none() {
                            *slot = Some(result);
                            cvar.notify_all();
                        }
                    };

                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| loop {
                        match fetcher.fetch_configuration() {
                            Ok(configuration) => {
                                store.set_configuration(Arc::new(configuration));
                                publish(Ok(()));
                            }
                            Err(err @ (Error::Unauthorized | Error::InvalidBaseUrl(_))) => {
                                // Retrying cannot help; stop polling entirely.
                                log::warn!(target: "switchyard",
                                           "unrecoverable poll error, stopping poller: {err}");
                                publish(Err(err));
                                return;
                            }
                            Err(err) => {
                                log::warn!(target: "switchyard", "failed to poll configuration: {err}");
                            }
                        }

                        match stop_receiver.recv_timeout(randomized(config.interval, config.jitter))
                        {
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                            Err(RecvTimeoutError::Timeout) => {
                                // Next poll cycle.
                            }
                        }
                    }));

                    // Publish on every exit path so no waiter is left blocked.
                    match outcome {
                        Ok(()) => publish(Err(Error::PollerThreadStopped)),
                        Err(_) => publish(Err(Error::PollerThreadPanicked)),
                    }
                })?
        };

        Ok(PollerThread {
            join_handle,
            stop_sender,
            first_fetch,
        })
    }

    /// Block until the first fetch succeeds, fails unrecoverably, or the thread exits.
    pub fn wait_for_configuration(&self) -> Result<()> {
        wait_first_fetch(&self.first_fetch)
    }

    pub(crate) fn first_fetch_signal(&self) -> FirstFetchSignal {
        Arc::clone(&self.first_fetch)
    }

    /// Signal the thread to exit. Returns immediately; combine with
    /// [`join`](PollerThread::join) to wait for the exit. Safe to call multiple times and from
    /// multiple threads.
    pub fn stop(&self) {
        match self.stop_sender.try_send(()) {
            Ok(()) => {}
            // A stop is already pending or the thread is gone; either way it will not poll
            // again.
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {}
        }
    }

    /// Wait for the thread to exit. Call [`stop`](PollerThread::stop) first, or this blocks
    /// until an unrecoverable poll error.
    pub fn join(self) -> Result<()> {
        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join()
    }
}

/// Subtract a random amount up to `jitter` from `interval`, clamping at zero.
fn randomized(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    interval.saturating_sub(rand::thread_rng().gen_range(Duration::ZERO..=jitter))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::randomized;

    #[test]
    fn jitter_is_subtractive() {
        let interval = Duration::from_secs(30);
        let jitter = Duration::from_secs(3);
        for _ in 0..1000 {
            let result = randomized(interval, jitter);
            assert!(result <= interval);
            assert!(result >= interval - jitter);
        }
    }

    #[test]
    fn jitter_clamps_at_zero() {
        for _ in 0..1000 {
            let result = randomized(Duration::from_millis(1), Duration::from_secs(10));
            assert!(result <= Duration::from_millis(1));
        }
    }

    #[test]
    fn zero_jitter_keeps_the_interval() {
        assert_eq!(
            randomized(Duration::from_secs(30), Duration::ZERO),
            Duration::from_secs(30)
        );
    }
}
