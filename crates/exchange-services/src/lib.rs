//! exchange-services — want-list coordination for the block exchange.
//!
//! `WantCoordinator` owns the process-wide want list and one `PeerQueue`
//! per connected peer; the network is reached through `NetworkPort`.

pub mod batch;
pub mod coordinator;
pub mod envelope;
pub mod loopback;
pub mod metrics;
pub mod network;
pub mod peer_queue;
pub mod wantlist;

pub use batch::{WantBatch, WantOp};
pub use coordinator::{CoordinatorLoop, WantCoordinator};
pub use envelope::BlockEnvelope;
pub use loopback::LoopbackNetwork;
pub use metrics::ExchangeMetrics;
pub use network::{MessageSender, NetworkError, NetworkPort};
pub use peer_queue::{PeerPipeline, PeerQueue, PipelineSettings};
pub use wantlist::{Merge, SharedWantList, WantEntry, WantList};
