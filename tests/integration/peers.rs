use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Peer lifecycle
// ══════════════════════════════════════════════════════════════════════════════

/// A peer connected twice needs two disconnects before it is torn down.
#[tokio::test]
async fn double_connect_needs_double_disconnect() -> Result<()> {
    let node = Node::start();
    let p = peer(1);
    node.wm.notify_connected(p).await;
    node.wm.notify_connected(p).await;
    node.wm.notify_disconnected(p).await;

    assert_eq!(node.wm.connected_peers().await, vec![p]);

    node.want(&[cid("A")]).await;
    let msgs = node.messages(&p, 1).await?;
    assert!(msgs[0].entry(&cid("A")).is_some());

    node.wm.notify_disconnected(p).await;
    assert!(node.wm.connected_peers().await.is_empty());

    // The pipeline closes its sender once torn down.
    let net = node.net.clone();
    wait_for(|| {
        let net = net.clone();
        async move { net.senders_closed(&p) == 1 }
    })
    .await?;
    Ok(())
}

/// A late joiner gets the current want list as one full message.
#[tokio::test]
async fn new_peer_receives_full_list() -> Result<()> {
    let node = Node::start();
    node.want(&[cid("A"), cid("B"), cid("C")]).await;

    let p = peer(7);
    node.wm.notify_connected(p).await;

    let msgs = node.messages(&p, 1).await?;
    assert!(msgs[0].is_full());
    assert_eq!(msgs[0].entries().len(), 3);
    Ok(())
}

/// An empty want list is not sent to a new peer.
#[tokio::test]
async fn empty_list_is_not_sent() -> Result<()> {
    let node = Node::start();
    let p = peer(3);
    node.wm.notify_connected(p).await;
    settle().await;
    assert!(node.net.messages(&p).is_empty());
    Ok(())
}

/// Unreachable peers keep their pending update for the next attempt.
#[tokio::test]
async fn unreachable_peer_keeps_pending_update() -> Result<()> {
    let node = Node::start();
    let p = peer(5);
    node.net.set_unreachable(p, true);
    node.wm.notify_connected(p).await;

    node.want(&[cid("A")]).await;
    settle().await;
    assert!(node.net.messages(&p).is_empty());

    node.net.set_unreachable(p, false);
    node.want(&[cid("B")]).await;

    let msgs = node.messages(&p, 1).await?;
    assert!(msgs[0].entry(&cid("A")).is_some());
    assert!(msgs[0].entry(&cid("B")).is_some());
    Ok(())
}

/// Shutdown ends every pipeline and closes its sender.
#[tokio::test]
async fn shutdown_closes_pipelines() -> Result<()> {
    let node = Node::start();
    let (p1, p2) = (peer(1), peer(2));
    node.wm.notify_connected(p1).await;
    node.wm.notify_connected(p2).await;
    node.want(&[cid("A")]).await;
    node.messages(&p1, 1).await?;
    node.messages(&p2, 1).await?;

    node.shutdown.cancel();

    let net = node.net.clone();
    wait_for(|| {
        let net = net.clone();
        async move { net.senders_closed(&p1) == 1 && net.senders_closed(&p2) == 1 }
    })
    .await?;
    assert!(node.wm.connected_peers().await.is_empty());
    Ok(())
}

/// A connect that never completes must not pin the pipeline past shutdown.
#[tokio::test]
async fn shutdown_abandons_slow_connect() -> Result<()> {
    let node = Node::start_with(ExchangeConfig::default());
    let p = peer(1);
    node.net.set_connect_delay(p, Some(Duration::from_secs(600)));
    node.wm.notify_connected(p).await;
    node.want(&[cid("A")]).await;

    let net = node.net.clone();
    wait_for(|| {
        let net = net.clone();
        async move { net.connects_in_flight(&p) == 1 }
    })
    .await?;

    node.shutdown.cancel();

    let net = node.net.clone();
    wait_for(|| {
        let net = net.clone();
        async move { net.connects_in_flight(&p) == 0 }
    })
    .await?;
    assert!(node.net.messages(&p).is_empty());
    Ok(())
}

/// Disconnecting a peer stops its pipeline even while it is still dialing.
#[tokio::test]
async fn disconnect_abandons_slow_connect() -> Result<()> {
    let node = Node::start_with(ExchangeConfig::default());
    let (slow, other) = (peer(1), peer(2));
    node.net.set_connect_delay(slow, Some(Duration::from_secs(600)));
    node.wm.notify_connected(slow).await;
    node.wm.notify_connected(other).await;
    node.want(&[cid("A")]).await;

    let net = node.net.clone();
    wait_for(|| {
        let net = net.clone();
        async move { net.connects_in_flight(&slow) == 1 }
    })
    .await?;

    node.wm.notify_disconnected(slow).await;

    let net = node.net.clone();
    wait_for(|| {
        let net = net.clone();
        async move { net.connects_in_flight(&slow) == 0 }
    })
    .await?;
    assert_eq!(node.wm.connected_peers().await, vec![other]);
    assert!(node.messages(&other, 1).await?[0].entry(&cid("A")).is_some());
    Ok(())
}
