use crate::{
    fallback_reply, CompletionClient, CompletionRequest, DispatchError, MessageQueue, Notifier,
    Result,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time;
use tutor_protocol::{
    now_unix_ms, ClearAck, DelayTable, DrainReport, EnqueueAck, PendingMessage, ProcessNowAck,
    QueueStatus,
};

#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Queue-size brackets consulted at arm time and for status labels.
    pub tiers: DelayTable,
}

enum QueueCommand {
    Enqueue {
        message: PendingMessage,
        ack: oneshot::Sender<EnqueueAck>,
    },
    ProcessNow {
        ack: oneshot::Sender<ProcessNowAck>,
    },
    Clear {
        ack: oneshot::Sender<ClearAck>,
    },
    Shutdown,
}

/// Handle to the adaptive dispatch loop.
///
/// The loop owns the queue, the armed deadline, and the processing flag;
/// callers talk to it over commands and observe it through a status watch
/// channel and drain-report broadcasts. At most one drain cycle runs at a
/// time: single-flight is structural, because one loop owns all state.
///
/// Scheduling: the first trigger on a non-empty idle queue arms a one-shot
/// deadline with the tier delay for the size sampled at that moment. Later
/// enqueues join the armed batch without moving the committed deadline. On
/// expiry the queue is drained atomically and each message is submitted in
/// order; a per-message failure becomes the canned fallback and the batch
/// continues. `process_now` cancels an armed deadline and drains
/// immediately; during a drain it is a no-op. After a drain, a non-empty
/// queue re-arms immediately with a freshly sampled tier delay.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    command_tx: mpsc::Sender<QueueCommand>,
    status_tx: watch::Sender<QueueStatus>,
    report_tx: broadcast::Sender<DrainReport>,
    /// Keeps the watch channel open between `status()` reads:
    /// `watch::Sender::send` drops the update once every receiver is gone.
    _status_rx: watch::Receiver<QueueStatus>,
}

impl Dispatcher {
    #[must_use]
    pub fn start(
        client: Arc<dyn CompletionClient>,
        notifier: Arc<dyn Notifier>,
        config: DispatcherConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(QueueStatus::empty());
        let (report_tx, _) = broadcast::channel(32);

        let state = DispatchLoop {
            client,
            notifier,
            tiers: config.tiers,
            queue: MessageQueue::new(),
            armed_deadline: None,
            processing: false,
            shutdown: false,
            status_tx: status_tx.clone(),
            report_tx: report_tx.clone(),
        };
        tokio::spawn(state.run(command_rx));

        Self {
            inner: Arc::new(DispatcherInner {
                command_tx,
                status_tx,
                report_tx,
                _status_rx: status_rx,
            }),
        }
    }

    /// Queue a captured message; acked with the live queue length, even
    /// while a drain cycle is running.
    pub async fn enqueue(&self, message: PendingMessage) -> Result<EnqueueAck> {
        self.request(|ack| QueueCommand::Enqueue { message, ack })
            .await
    }

    /// Ask for an immediate drain (see the state-machine notes above).
    pub async fn process_now(&self) -> Result<ProcessNowAck> {
        self.request(|ack| QueueCommand::ProcessNow { ack }).await
    }

    /// Drop everything still pending. Mid-drain, the unprocessed remainder
    /// of the batch is dropped too; the message already in flight is not
    /// recalled.
    pub async fn clear(&self) -> Result<ClearAck> {
        self.request(|ack| QueueCommand::Clear { ack }).await
    }

    #[must_use]
    pub fn status(&self) -> QueueStatus {
        self.inner.status_tx.subscribe().borrow().clone()
    }

    #[must_use]
    pub fn status_stream(&self) -> watch::Receiver<QueueStatus> {
        self.inner.status_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DrainReport> {
        self.inner.report_tx.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> QueueCommand,
    ) -> Result<T> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(build(ack_tx))
            .await
            .map_err(|_| DispatchError::NotRunning)?;
        ack_rx.await.map_err(|_| DispatchError::AckDropped)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(QueueCommand::Shutdown);
        }
    }
}

struct DispatchLoop {
    client: Arc<dyn CompletionClient>,
    notifier: Arc<dyn Notifier>,
    tiers: DelayTable,
    queue: MessageQueue,
    armed_deadline: Option<time::Instant>,
    processing: bool,
    shutdown: bool,
    status_tx: watch::Sender<QueueStatus>,
    report_tx: broadcast::Sender<DrainReport>,
}

impl DispatchLoop {
    async fn run(mut self, mut command_rx: mpsc::Receiver<QueueCommand>) {
        self.publish_status();
        while !self.shutdown {
            let deadline = self.armed_deadline;
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_idle_command(cmd),
                        None => break,
                    }
                }
                () = async {
                    if let Some(deadline) = deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if deadline.is_some() => {
                    self.armed_deadline = None;
                    self.drain(&mut command_rx).await;
                    if !self.shutdown && !self.queue.is_empty() {
                        // Messages arrived during the drain; re-arm with a
                        // freshly sampled tier delay.
                        self.arm();
                        self.publish_status();
                    }
                }
            }
        }
        log::debug!("dispatch loop stopped");
    }

    /// Commands arriving while no drain cycle is running.
    fn handle_idle_command(&mut self, cmd: QueueCommand) {
        match cmd {
            QueueCommand::Enqueue { message, ack } => {
                let queue_size = self.queue.enqueue(message);
                let _ = ack.send(EnqueueAck {
                    accepted: true,
                    queue_size,
                });
                if self.armed_deadline.is_none() {
                    self.arm();
                }
                self.publish_status();
            }
            QueueCommand::ProcessNow { ack } => {
                let reply = if self.queue.is_empty() {
                    ProcessNowAck::Empty
                } else {
                    // Cancels any armed deadline: the deadline is loop
                    // state, so there is no stray timer left to fire.
                    self.armed_deadline = Some(time::Instant::now());
                    ProcessNowAck::Started
                };
                let _ = ack.send(reply);
            }
            QueueCommand::Clear { ack } => {
                let cleared = self.queue.clear();
                self.armed_deadline = None;
                let _ = ack.send(ClearAck { cleared });
                self.publish_status();
            }
            QueueCommand::Shutdown => self.shutdown = true,
        }
    }

    fn arm(&mut self) {
        let queue_size = self.queue.len();
        if let Some(delay) = self.tiers.delay_for(queue_size) {
            log::info!(
                "queue at {queue_size}; processing in {}",
                self.tiers.label_for(queue_size)
            );
            self.armed_deadline = Some(time::Instant::now() + delay);
        }
    }

    async fn drain(&mut self, command_rx: &mut mpsc::Receiver<QueueCommand>) {
        let mut batch: VecDeque<PendingMessage> = self.queue.drain_all().into();
        let batch_size = batch.len();
        if batch_size == 0 {
            return;
        }
        let started = Instant::now();
        self.processing = true;
        self.publish_status();
        log::info!("draining {batch_size} queued message(s)");

        let mut delivered = 0usize;
        let mut fallbacks = 0usize;
        while let Some(message) = batch.pop_front() {
            if self.complete_one(&message, command_rx, &mut batch).await {
                fallbacks += 1;
            } else {
                delivered += 1;
            }
            // The live queue may have changed while the call was in flight.
            self.publish_status();
            if self.shutdown {
                break;
            }
        }
        let cleared_midway = batch_size - delivered - fallbacks;
        self.processing = false;
        self.publish_status();

        let attempted = delivered + fallbacks;
        if attempted > 0 {
            self.notifier
                .notify(&format!("Processed {attempted} student message(s)"));
        }
        let _ = self.report_tx.send(DrainReport {
            completed_at_unix_ms: now_unix_ms(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            batch_size,
            delivered,
            fallbacks,
            cleared_midway,
        });
    }

    /// Run one completion call while still servicing commands, so enqueues
    /// arriving mid-drain are appended (never lost) and control commands
    /// are acknowledged without waiting for the batch to finish.
    ///
    /// Returns true when the message was answered with the fallback.
    async fn complete_one(
        &mut self,
        message: &PendingMessage,
        command_rx: &mut mpsc::Receiver<QueueCommand>,
        batch: &mut VecDeque<PendingMessage>,
    ) -> bool {
        let request = CompletionRequest {
            sender_name: message.sender_name.clone(),
            body_text: message.body_text.clone(),
        };
        let client = Arc::clone(&self.client);
        let call = async move { client.complete(&request).await };
        tokio::pin!(call);

        loop {
            tokio::select! {
                result = &mut call => {
                    return match result {
                        Ok(reply) => {
                            log::debug!(
                                "generated reply for {} ({} chars)",
                                message.sender_name,
                                reply.chars().count()
                            );
                            false
                        }
                        Err(err) => {
                            log::warn!(
                                "completion failed for {}: {err}",
                                message.sender_name
                            );
                            let reply = fallback_reply(&message.sender_name);
                            log::debug!("fallback reply: {reply}");
                            true
                        }
                    };
                }
                cmd = command_rx.recv(), if !self.shutdown => {
                    match cmd {
                        Some(QueueCommand::Enqueue { message, ack }) => {
                            let queue_size = self.queue.enqueue(message);
                            let _ = ack.send(EnqueueAck {
                                accepted: true,
                                queue_size,
                            });
                            self.publish_status();
                        }
                        // Single-flight: a drain is already running.
                        Some(QueueCommand::ProcessNow { ack }) => {
                            let _ = ack.send(ProcessNowAck::AlreadyDraining);
                        }
                        Some(QueueCommand::Clear { ack }) => {
                            let cleared = self.queue.clear() + batch.len();
                            batch.clear();
                            let _ = ack.send(ClearAck { cleared });
                            self.publish_status();
                        }
                        Some(QueueCommand::Shutdown) | None => {
                            // Finish the in-flight message, then stop.
                            self.shutdown = true;
                        }
                    }
                }
            }
        }
    }

    fn publish_status(&self) {
        let queue_size = self.queue.len();
        let _ = self.status_tx.send(QueueStatus {
            queue_size,
            processing: self.processing,
            estimated_delay_label: self.tiers.label_for(queue_size),
        });
    }
}
