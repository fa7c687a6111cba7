use crate::{ExtractError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

/// Why a scan tick fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanReason {
    /// First tick after startup, once the page has settled.
    Initial,
    /// Fixed periodic re-scan.
    Interval,
    /// Debounced tick after a burst of content-change events.
    ContentChanged,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanTriggerConfig {
    pub initial_delay: Duration,
    pub rescan_interval: Duration,
    pub change_debounce: Duration,
}

impl Default for ScanTriggerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            rescan_interval: Duration::from_secs(10),
            change_debounce: Duration::from_secs(1),
        }
    }
}

enum SchedulerCommand {
    ContentChanged,
    Shutdown,
}

/// Emits scan ticks per the trigger policy: one initial tick, periodic
/// re-scans, and a debounced tick after content changes, so lazily rendered
/// content is eventually observed exactly once.
///
/// The debounce deadline is plain loop state; a pending deadline superseded
/// by a newer change event simply moves, and dropping the scheduler cannot
/// leave a stray timer behind.
#[derive(Clone)]
pub struct ScanScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl ScanScheduler {
    #[must_use]
    pub fn start(config: ScanTriggerConfig) -> (Self, mpsc::Receiver<ScanReason>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (tick_tx, tick_rx) = mpsc::channel(16);
        spawn_schedule_loop(config, command_rx, tick_tx);
        (
            Self {
                inner: Arc::new(SchedulerInner { command_tx }),
            },
            tick_rx,
        )
    }

    /// Report that page content changed; the scan tick fires once the burst
    /// settles.
    pub async fn notify_change(&self) -> Result<()> {
        self.inner
            .command_tx
            .send(SchedulerCommand::ContentChanged)
            .await
            .map_err(|_| ExtractError::ChannelClosed)
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(SchedulerCommand::Shutdown);
        }
    }
}

fn spawn_schedule_loop(
    config: ScanTriggerConfig,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
    tick_tx: mpsc::Sender<ScanReason>,
) {
    tokio::spawn(async move {
        let mut interval_deadline = time::Instant::now() + config.initial_delay;
        let mut emitted_initial = false;
        let mut debounce_deadline: Option<time::Instant> = None;

        loop {
            let next_deadline = match debounce_deadline {
                Some(debounce) => interval_deadline.min(debounce),
                None => interval_deadline,
            };

            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::ContentChanged) => {
                            debounce_deadline =
                                Some(time::Instant::now() + config.change_debounce);
                        }
                        Some(SchedulerCommand::Shutdown) | None => break,
                    }
                }
                () = time::sleep_until(next_deadline) => {
                    let now = time::Instant::now();
                    if debounce_deadline.is_some_and(|deadline| now >= deadline) {
                        debounce_deadline = None;
                        if tick_tx.send(ScanReason::ContentChanged).await.is_err() {
                            break;
                        }
                    }
                    if now >= interval_deadline {
                        let reason = if emitted_initial {
                            ScanReason::Interval
                        } else {
                            ScanReason::Initial
                        };
                        emitted_initial = true;
                        interval_deadline = now + config.rescan_interval;
                        if tick_tx.send(reason).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn fast_config() -> ScanTriggerConfig {
        ScanTriggerConfig {
            initial_delay: Duration::from_millis(20),
            rescan_interval: Duration::from_millis(60),
            change_debounce: Duration::from_millis(30),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn emits_initial_then_interval_ticks() {
        let (_scheduler, mut ticks) = ScanScheduler::start(fast_config());

        let first = timeout(WAIT, ticks.recv()).await.expect("first tick");
        assert_eq!(first, Some(ScanReason::Initial));

        let second = timeout(WAIT, ticks.recv()).await.expect("second tick");
        assert_eq!(second, Some(ScanReason::Interval));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn change_burst_collapses_to_one_tick() {
        let config = ScanTriggerConfig {
            initial_delay: Duration::from_secs(60),
            rescan_interval: Duration::from_secs(60),
            change_debounce: Duration::from_millis(40),
        };
        let (scheduler, mut ticks) = ScanScheduler::start(config);

        for _ in 0..3 {
            scheduler.notify_change().await.expect("notify");
            time::sleep(Duration::from_millis(5)).await;
        }

        let tick = timeout(WAIT, ticks.recv()).await.expect("debounced tick");
        assert_eq!(tick, Some(ScanReason::ContentChanged));

        // The burst was coalesced; no second tick follows.
        let extra = timeout(Duration::from_millis(200), ticks.recv()).await;
        assert!(extra.is_err(), "unexpected extra tick: {extra:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_the_scheduler_stops_the_loop() {
        let (scheduler, mut ticks) = ScanScheduler::start(fast_config());
        drop(scheduler);

        loop {
            match timeout(WAIT, ticks.recv()).await.expect("closed channel") {
                Some(_) => continue,
                None => break,
            }
        }
    }
}
