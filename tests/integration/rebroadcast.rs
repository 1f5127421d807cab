use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Periodic full resync
// ══════════════════════════════════════════════════════════════════════════════

fn fast_rebroadcast() -> ExchangeConfig {
    let mut config = ExchangeConfig::default();
    config.wants.rebroadcast_interval_ms = 150;
    config.queue.retry_delay_ms = 10;
    config
}

/// After the timer fires the peer gets the whole current list as a full
/// message, including entries it was already sent.
#[tokio::test]
async fn rebroadcast_sends_full_snapshot() -> Result<()> {
    let node = Node::start_with(fast_rebroadcast());
    let p = peer(1);
    node.wm.notify_connected(p).await;
    node.want(&[cid("A"), cid("B")]).await;
    node.messages(&p, 1).await?;

    node.wm.request_cancel(&[cid("A")]).await;

    let net = node.net.clone();
    wait_for(|| {
        let net = net.clone();
        async move {
            net.messages(&p).iter().any(|m| {
                m.is_full()
                    && m.entries().len() == 1
                    && m.entry(&cid("B")).is_some_and(|e| !e.cancel)
            })
        }
    })
    .await?;

    let mirror = node.wm.peer_wants(p).await.expect("peer registered");
    assert_eq!(mirror.len(), 1);
    assert_eq!(mirror[0].cid, cid("B"));
    Ok(())
}

/// Resyncs keep flowing to a peer that has nothing new to learn.
#[tokio::test]
async fn rebroadcast_repeats_unchanged_list() -> Result<()> {
    let node = Node::start_with(fast_rebroadcast());
    let p = peer(1);
    node.want(&[cid("A")]).await;
    node.wm.notify_connected(p).await;

    let msgs = node.messages(&p, 3).await?;
    for msg in &msgs {
        assert!(msg.is_full());
        assert_eq!(msg.entries().len(), 1);
        assert!(msg.entry(&cid("A")).is_some());
    }
    Ok(())
}
