//! Exchange metrics, registered once per coordinator.
//!
//! - `exchange_wantlist_total`: ids currently in the process-wide want list
//! - `exchange_sent_all_blocks_bytes`: histogram of block sizes sent

use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

const BLOCK_SIZE_BUCKETS: [f64; 6] = [
    (1u64 << 6) as f64,
    (1u64 << 10) as f64,
    (1u64 << 14) as f64,
    (1u64 << 18) as f64,
    (1u64 << 20) as f64,
    (1u64 << 22) as f64,
];

#[derive(Clone, Debug)]
pub struct ExchangeMetrics {
    wantlist_total: Gauge,
    sent_block_bytes: Histogram,
}

impl ExchangeMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let registry = registry.sub_registry_with_prefix("exchange");

        let wantlist_total = Gauge::default();
        registry.register(
            "wantlist_total",
            "Number of items in wantlist",
            wantlist_total.clone(),
        );
        let sent_block_bytes = Histogram::new(BLOCK_SIZE_BUCKETS.into_iter());
        registry.register(
            "sent_all_blocks_bytes",
            "Histogram of blocks sent by this exchange",
            sent_block_bytes.clone(),
        );

        Self {
            wantlist_total,
            sent_block_bytes,
        }
    }

    /// Metrics not attached to any registry.
    pub fn unregistered() -> Self {
        Self::new(&mut Registry::default())
    }

    pub(crate) fn want_added(&self) {
        self.wantlist_total.inc();
    }

    pub(crate) fn want_removed(&self) {
        self.wantlist_total.dec();
    }

    pub(crate) fn block_sent(&self, bytes: usize) {
        self.sent_block_bytes.observe(bytes as f64);
    }

    /// Current value of the want-list gauge.
    pub fn wantlist_size(&self) -> i64 {
        self.wantlist_total.get()
    }
}
