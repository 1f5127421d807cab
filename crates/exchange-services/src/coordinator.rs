//! Want coordinator — owns the process-wide want list and the peer registry.
//!
//! All mutations go through one loop task (`CoordinatorLoop`). Producers
//! talk to it through the cloneable `WantCoordinator` handle: wants,
//! cancels and peer lifecycle edges are fire-and-forget, queries wait for
//! the loop's answer. Block sends bypass the loop entirely so a slow peer
//! only stalls the task that produced the block.

use std::collections::HashMap;
use std::sync::Arc;

use exchange_core::{ContentId, ExchangeConfig, PeerId, WantMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::batch::WantBatch;
use crate::envelope::BlockEnvelope;
use crate::metrics::ExchangeMetrics;
use crate::network::NetworkPort;
use crate::peer_queue::{PeerQueue, PipelineSettings};
use crate::wantlist::{SharedWantList, WantEntry};

/// Everything the loop reacts to besides its timer.
enum Event {
    Wants(WantBatch),
    Connected(PeerId),
    Disconnected(PeerId),
    Peers(oneshot::Sender<Vec<PeerId>>),
    PeerWants(PeerId, oneshot::Sender<Option<Vec<WantEntry>>>),
}

/// Handle to a running coordinator.
#[derive(Clone)]
pub struct WantCoordinator {
    events: mpsc::Sender<Event>,
    network: Arc<dyn NetworkPort>,
    wantlist: SharedWantList,
    metrics: ExchangeMetrics,
    shutdown: CancellationToken,
    max_priority: i32,
}

impl WantCoordinator {
    /// Build a coordinator and its loop. Spawn `CoordinatorLoop::run` to
    /// start it; cancelling `shutdown` stops the loop and every peer pipeline.
    pub fn new(
        network: Arc<dyn NetworkPort>,
        config: &ExchangeConfig,
        metrics: ExchangeMetrics,
        shutdown: CancellationToken,
    ) -> (Self, CoordinatorLoop) {
        let (events_tx, events_rx) = mpsc::channel(config.wants.event_buffer.max(1));
        let wantlist = SharedWantList::new();
        // Own scope so an orphaned loop can stop its pipelines without
        // cancelling the caller's token.
        let loop_scope = shutdown.child_token();

        let handle = Self {
            events: events_tx,
            network: network.clone(),
            wantlist: wantlist.clone(),
            metrics: metrics.clone(),
            shutdown,
            max_priority: config.wants.max_priority,
        };
        let run_loop = CoordinatorLoop {
            events: events_rx,
            peers: HashMap::new(),
            wantlist,
            network,
            metrics,
            shutdown: loop_scope,
            rebroadcast_interval: config.wants.rebroadcast_interval(),
            pipeline: PipelineSettings {
                connect_timeout: config.queue.connect_timeout(),
                retry_delay: config.queue.retry_delay(),
            },
        };
        (handle, run_loop)
    }

    /// Want `ids`, most urgent first. An empty `targets` tells every peer.
    ///
    /// Dropped silently if `scope` is cancelled or the coordinator shuts
    /// down before the loop accepts it.
    pub async fn request_want(&self, scope: &CancellationToken, ids: &[ContentId], targets: &[PeerId]) {
        tracing::info!(count = ids.len(), "want blocks");
        let batch = WantBatch::wants(ids, self.max_priority).with_targets(targets.to_vec());
        tokio::select! {
            _ = scope.cancelled() => {}
            _ = self.submit(Event::Wants(batch)) => {}
        }
    }

    /// Stop wanting `ids`, telling every peer.
    pub async fn request_cancel(&self, ids: &[ContentId]) {
        self.submit(Event::Wants(WantBatch::cancels(ids))).await;
    }

    pub async fn notify_connected(&self, peer: PeerId) {
        self.submit(Event::Connected(peer)).await;
    }

    pub async fn notify_disconnected(&self, peer: PeerId) {
        self.submit(Event::Disconnected(peer)).await;
    }

    /// Peers currently registered. Empty once the coordinator is shut down.
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        let (tx, rx) = oneshot::channel();
        if !self.submit(Event::Peers(tx)).await {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// What `peer` has been told we want, or `None` if it is not registered.
    pub async fn peer_wants(&self, peer: PeerId) -> Option<Vec<WantEntry>> {
        let (tx, rx) = oneshot::channel();
        if !self.submit(Event::PeerWants(peer, tx)).await {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Snapshot of the process-wide want list, read outside the loop.
    pub fn wantlist(&self) -> Vec<WantEntry> {
        self.wantlist.entries()
    }

    pub fn metrics(&self) -> &ExchangeMetrics {
        &self.metrics
    }

    /// Send one block to its peer on the caller's task and complete the
    /// envelope, whatever the outcome.
    pub async fn dispatch_block(&self, envelope: BlockEnvelope) {
        self.metrics.block_sent(envelope.block().len());

        let mut message = WantMessage::incremental();
        message.add_block(envelope.block().clone());
        tracing::info!(
            block = %envelope.block().cid(),
            peer = %envelope.peer(),
            "sending block"
        );
        if let Err(e) = self.network.send_message(envelope.peer(), message).await {
            tracing::info!(peer = %envelope.peer(), error = %e, "send block failed");
        }
        envelope.sent();
    }

    /// Hand an event to the loop unless shutdown wins. Returns whether it
    /// was accepted.
    async fn submit(&self, event: Event) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }
}

/// First tick one period after start. A stalled loop resyncs once when it
/// catches up, then keeps the period from there.
fn rebroadcast_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// The coordinator's single mutating task.
pub struct CoordinatorLoop {
    events: mpsc::Receiver<Event>,
    peers: HashMap<PeerId, PeerQueue>,
    wantlist: SharedWantList,
    network: Arc<dyn NetworkPort>,
    metrics: ExchangeMetrics,
    shutdown: CancellationToken,
    rebroadcast_interval: Duration,
    pipeline: PipelineSettings,
}

impl CoordinatorLoop {
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut rebroadcast = rebroadcast_timer(self.rebroadcast_interval);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!(peers = self.peers.len(), "want coordinator shutting down");
                    return Ok(());
                }

                _ = rebroadcast.tick() => {
                    self.rebroadcast().await;
                }

                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("all coordinator handles dropped, exiting");
                        self.shutdown.cancel();
                        return Ok(());
                    };
                    self.handle(event).await;
                }
            }
        }
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Wants(batch) => self.apply_batch(batch).await,
            Event::Connected(peer) => self.start_peer(peer).await,
            Event::Disconnected(peer) => self.stop_peer(peer),
            Event::Peers(reply) => {
                let _ = reply.send(self.peers.keys().copied().collect());
            }
            Event::PeerWants(peer, reply) => {
                let _ = reply.send(self.peers.get(&peer).map(|q| q.mirror().entries()));
            }
        }
    }

    async fn apply_batch(&mut self, batch: WantBatch) {
        for op in &batch.ops {
            if op.cancel {
                if self.wantlist.remove(&op.cid()) {
                    self.metrics.want_removed();
                }
            } else if self.wantlist.add(op.cid(), op.entry.priority) {
                self.metrics.want_added();
            }
        }

        if batch.is_broadcast() {
            for queue in self.peers.values_mut() {
                queue.add_message(&batch.ops).await;
            }
            return;
        }

        for target in &batch.targets {
            match self.peers.get_mut(target) {
                Some(queue) => queue.add_message(&batch.ops).await,
                None => {
                    tracing::warn!(peer = %target, "want list change for unregistered peer, skipping");
                }
            }
        }
    }

    /// Resend the whole want list to everyone, in case an update was lost.
    async fn rebroadcast(&mut self) {
        let snapshot = self.wantlist.entries();
        tracing::debug!(
            entries = snapshot.len(),
            peers = self.peers.len(),
            "rebroadcasting want list"
        );
        for queue in self.peers.values_mut() {
            queue.resync(&snapshot).await;
        }
    }

    async fn start_peer(&mut self, peer: PeerId) {
        if let Some(queue) = self.peers.get_mut(&peer) {
            let refcount = queue.retain();
            tracing::debug!(%peer, refcount, "peer connected again");
            return;
        }

        let (mut queue, pipeline) = PeerQueue::new(
            peer,
            self.network.clone(),
            self.pipeline,
            self.shutdown.child_token(),
        );
        // New peers get our full want list.
        queue.resync(&self.wantlist.entries()).await;

        tracing::info!(%peer, wants = queue.mirror().len(), "peer connected");
        self.peers.insert(peer, queue);
        tokio::spawn(pipeline.run());
    }

    fn stop_peer(&mut self, peer: PeerId) {
        let Some(queue) = self.peers.get_mut(&peer) else {
            tracing::debug!(%peer, "disconnect for unregistered peer");
            return;
        };

        if queue.release() > 0 {
            return;
        }

        queue.shutdown();
        self.peers.remove(&peer);
        tracing::info!(%peer, "peer disconnected");
    }
}
