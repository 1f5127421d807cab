//! Per-peer outbound queue — coalesces want deltas into one pending message
//! and pushes it to the peer with a single reconnect-and-retry.
//!
//! Split in two halves:
//! - `PeerQueue` lives in the coordinator's registry. It owns the peer's
//!   mirror (what we have already told them) and merges deltas into the
//!   pending message.
//! - `PeerPipeline` is the peer's own task. It owns the network sender and
//!   drains the pending message when signalled.
//!
//! The pending slot is the only state both halves touch. Its lock covers a
//! merge or a swap, never network I/O.

use std::sync::Arc;
use std::time::Duration;

use exchange_core::{PeerId, WantMessage};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::batch::WantOp;
use crate::network::{MessageSender, NetworkError, NetworkPort};
use crate::wantlist::{Merge, WantEntry, WantList};

/// Pending outbound message plus the wake-up channel for the pipeline.
struct Outbox {
    pending: Mutex<Option<WantMessage>>,
    // Capacity 1: at most one wake-up outstanding, extras are dropped.
    work: mpsc::Sender<()>,
}

impl Outbox {
    fn signal(&self) {
        let _ = self.work.try_send(());
    }

    /// Take the pending message, if there is anything in it.
    async fn take(&self) -> Option<WantMessage> {
        let mut pending = self.pending.lock().await;
        match pending.take() {
            Some(message) if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

/// Timing knobs for a peer pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
}

/// Coordinator-side state for one registered peer.
pub struct PeerQueue {
    peer: PeerId,
    mirror: WantList,
    refcount: usize,
    outbox: Arc<Outbox>,
    done: CancellationToken,
}

impl PeerQueue {
    /// Create the registry entry and its (not yet spawned) pipeline.
    ///
    /// `done` ends the pipeline; pass a child of the coordinator's shutdown
    /// token so global shutdown reaches it too.
    pub fn new(
        peer: PeerId,
        network: Arc<dyn NetworkPort>,
        settings: PipelineSettings,
        done: CancellationToken,
    ) -> (Self, PeerPipeline) {
        let (work_tx, work_rx) = mpsc::channel(1);
        let outbox = Arc::new(Outbox {
            pending: Mutex::new(None),
            work: work_tx,
        });

        let queue = Self {
            peer,
            mirror: WantList::new(),
            refcount: 1,
            outbox: outbox.clone(),
            done: done.clone(),
        };
        let pipeline = PeerPipeline {
            peer,
            network,
            settings,
            outbox,
            work: work_rx,
            done,
            sender: None,
        };
        (queue, pipeline)
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn refcount(&self) -> usize {
        self.refcount
    }

    pub(crate) fn retain(&mut self) -> usize {
        self.refcount += 1;
        self.refcount
    }

    pub(crate) fn release(&mut self) -> usize {
        self.refcount = self.refcount.saturating_sub(1);
        self.refcount
    }

    /// What this peer has been told we want.
    pub fn mirror(&self) -> &WantList {
        &self.mirror
    }

    /// Fold a batch of wants/cancels into the pending message. Only
    /// operations that change the mirror are queued.
    pub async fn add_message(&mut self, ops: &[WantOp]) {
        let mut pending = self.outbox.pending.lock().await;
        let work = Self::merge_ops(&mut self.mirror, &mut *pending, ops);
        drop(pending);

        if work {
            self.outbox.signal();
        }
    }

    /// Forget everything sent so far and queue `snapshot` as a full want list.
    pub async fn resync(&mut self, snapshot: &[WantEntry]) {
        let mut pending = self.outbox.pending.lock().await;
        self.mirror = WantList::new();
        *pending = Some(WantMessage::full());

        let ops: Vec<_> = snapshot
            .iter()
            .map(|entry| WantOp {
                entry: *entry,
                cancel: false,
            })
            .collect();
        let work = Self::merge_ops(&mut self.mirror, &mut *pending, &ops);
        drop(pending);

        if work {
            self.outbox.signal();
        }
    }

    fn merge_ops(mirror: &mut WantList, pending: &mut Option<WantMessage>, ops: &[WantOp]) -> bool {
        let mut work = false;
        for op in ops {
            if op.cancel {
                if mirror.remove(&op.cid()) {
                    pending
                        .get_or_insert_with(WantMessage::incremental)
                        .cancel(op.cid());
                    work = true;
                }
                continue;
            }

            if mirror.merge(op.entry) != Merge::Unchanged {
                let priority = mirror
                    .get(&op.cid())
                    .map(|e| e.priority)
                    .unwrap_or(op.entry.priority);
                pending
                    .get_or_insert_with(WantMessage::incremental)
                    .add_entry(op.cid(), priority);
                work = true;
            }
        }
        work
    }

    /// Tell the pipeline to stop.
    pub(crate) fn shutdown(&self) {
        self.done.cancel();
    }
}

/// The peer's own send task.
pub struct PeerPipeline {
    peer: PeerId,
    network: Arc<dyn NetworkPort>,
    settings: PipelineSettings,
    outbox: Arc<Outbox>,
    work: mpsc::Receiver<()>,
    done: CancellationToken,
    sender: Option<Box<dyn MessageSender>>,
}

impl PeerPipeline {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.done.cancelled() => {
                    tracing::debug!(peer = %self.peer, "peer pipeline shutting down");
                    break;
                }

                // The outbox holds a sender too, so this never yields None.
                _ = self.work.recv() => {
                    // A cycle can sit in connect or send for minutes; termination
                    // must not wait for it.
                    let done = self.done.clone();
                    tokio::select! {
                        _ = done.cancelled() => {
                            tracing::debug!(peer = %self.peer, "peer pipeline stopped mid-send");
                            break;
                        }
                        _ = self.do_work() => {}
                    }
                }
            }
        }

        if let Some(mut sender) = self.sender.take() {
            sender.close().await;
        }
    }

    async fn do_work(&mut self) {
        if self.sender.is_none() {
            if let Err(e) = self.open_sender().await {
                tracing::info!(peer = %self.peer, error = %e, "can't open message sender");
                return;
            }
        }

        let Some(message) = self.outbox.take().await else {
            return;
        };

        let err = match self.send(&message).await {
            Ok(()) => return,
            Err(e) => e,
        };
        tracing::info!(peer = %self.peer, error = %err, "want list send failed");
        self.close_sender().await;

        // The disconnect notification may still be on its way.
        tokio::select! {
            _ = self.done.cancelled() => return,
            _ = tokio::time::sleep(self.settings.retry_delay) => {
                tracing::warn!(peer = %self.peer, "send failed but peer is still registered, retrying");
            }
        }

        if let Err(e) = self.open_sender().await {
            tracing::error!(peer = %self.peer, error = %e, "couldn't reopen sender after failed send");
            return;
        }

        if let Err(e) = self.send(&message).await {
            tracing::warn!(
                peer = %self.peer,
                error = %e,
                entries = message.entries().len(),
                "resend failed, dropping want list update"
            );
            self.close_sender().await;
        }
    }

    async fn send(&mut self, message: &WantMessage) -> Result<(), NetworkError> {
        match self.sender.as_mut() {
            Some(sender) => sender.send(message).await,
            None => Err(NetworkError::SenderClosed(self.peer)),
        }
    }

    async fn open_sender(&mut self) -> Result<(), NetworkError> {
        let timeout = self.settings.connect_timeout;
        tokio::time::timeout(timeout, self.network.connect_to(&self.peer))
            .await
            .map_err(|_| NetworkError::ConnectTimeout(self.peer, timeout))??;

        let sender = self.network.new_message_sender(&self.peer).await?;
        self.sender = Some(sender);
        Ok(())
    }

    async fn close_sender(&mut self) {
        if let Some(mut sender) = self.sender.take() {
            sender.close().await;
        }
    }
}
