use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use exchange_core::Block;
use exchange_services::BlockEnvelope;
use prometheus_client::encoding::text::encode;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Block dispatch
// ══════════════════════════════════════════════════════════════════════════════

fn envelope(data: &'static [u8], to: PeerId, sent: &Arc<AtomicUsize>) -> BlockEnvelope {
    let sent = sent.clone();
    BlockEnvelope::new(Block::new(Bytes::from_static(data)), to, move || {
        sent.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn dispatch_completes_once_on_success() -> Result<()> {
    let node = Node::start();
    let p = peer(1);
    let sent = Arc::new(AtomicUsize::new(0));

    node.wm.dispatch_block(envelope(b"hello block", p, &sent)).await;

    assert_eq!(sent.load(Ordering::SeqCst), 1);
    let blocks = node.net.blocks(&p);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].cid(), ContentId::of(b"hello block"));

    let mut text = String::new();
    encode(&mut text, &node.registry)?;
    assert!(text.contains("exchange_sent_all_blocks_bytes_count 1"));
    Ok(())
}

#[tokio::test]
async fn dispatch_completes_once_on_failure() -> Result<()> {
    let node = Node::start();
    let p = peer(1);
    node.net.fail_one_shot_sends(true);
    let sent = Arc::new(AtomicUsize::new(0));

    node.wm.dispatch_block(envelope(b"doomed", p, &sent)).await;

    assert_eq!(sent.load(Ordering::SeqCst), 1);
    assert!(node.net.blocks(&p).is_empty());
    Ok(())
}

/// Block sends run on the caller and don't need the peer registered.
#[tokio::test]
async fn dispatch_bypasses_peer_registry() -> Result<()> {
    let node = Node::start();
    let p = peer(9);
    let sent = Arc::new(AtomicUsize::new(0));

    node.wm.dispatch_block(envelope(b"a", p, &sent)).await;
    node.wm.dispatch_block(envelope(b"b", p, &sent)).await;

    assert_eq!(sent.load(Ordering::SeqCst), 2);
    assert_eq!(node.net.blocks(&p).len(), 2);
    assert!(node.wm.connected_peers().await.is_empty());
    Ok(())
}
