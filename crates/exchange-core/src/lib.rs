//! exchange-core — shared identifiers, blocks, want messages and configuration.
//! The async exchange machinery lives in exchange-services.

pub mod block;
pub mod config;
pub mod id;
pub mod message;

pub use block::Block;
pub use config::{ConfigError, ExchangeConfig};
pub use id::{ContentId, PeerId};
pub use message::{MessageEntry, WantMessage};
