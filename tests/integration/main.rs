//! Exchange integration test harness.
//!
//! Every test runs a live coordinator loop over the in-memory loopback
//! network and observes what each peer would have received on the wire.
//!
//!   cargo test --test integration
//!
//! Set RUST_LOG=debug to see the coordinator and pipeline logs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use exchange_core::{ContentId, ExchangeConfig, PeerId, WantMessage};
use exchange_services::{ExchangeMetrics, LoopbackNetwork, WantCoordinator};
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;

mod blocks;
mod peers;
mod rebroadcast;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A running coordinator plus the network it talks to.
pub struct Node {
    pub wm: WantCoordinator,
    pub net: LoopbackNetwork,
    pub registry: Registry,
    pub shutdown: CancellationToken,
}

impl Node {
    /// Start a node with fast retry timings and no periodic rebroadcast
    /// inside a test's lifetime.
    pub fn start() -> Self {
        let mut config = ExchangeConfig::default();
        config.queue.retry_delay_ms = 10;
        config.queue.connect_timeout_ms = 1_000;
        Self::start_with(config)
    }

    pub fn start_with(config: ExchangeConfig) -> Self {
        init_tracing();

        let net = LoopbackNetwork::new();
        let mut registry = Registry::default();
        let metrics = ExchangeMetrics::new(&mut registry);
        let shutdown = CancellationToken::new();
        let (wm, run_loop) =
            WantCoordinator::new(Arc::new(net.clone()), &config, metrics, shutdown.clone());
        tokio::spawn(run_loop.run());

        Self {
            wm,
            net,
            registry,
            shutdown,
        }
    }

    pub async fn want(&self, ids: &[ContentId]) {
        self.wm
            .request_want(&CancellationToken::new(), ids, &[])
            .await;
    }

    /// Wait until `peer` has received at least `count` messages.
    pub async fn messages(&self, peer: &PeerId, count: usize) -> Result<Vec<WantMessage>> {
        let net = self.net.clone();
        let peer = *peer;
        wait_for(|| {
            let net = net.clone();
            async move { net.messages(&peer).len() >= count }
        })
        .await?;
        Ok(self.net.messages(&peer))
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn cid(name: &str) -> ContentId {
    ContentId::of(name.as_bytes())
}

pub fn peer(n: u8) -> PeerId {
    PeerId::from_bytes([n; 32])
}

/// Poll `check` until it holds, for up to two seconds.
pub async fn wait_for<F, Fut>(mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bail!("condition not reached within 2s")
}

/// Give pipelines time to act on anything they were going to send.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
