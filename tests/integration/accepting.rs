use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use bgpeer_session::Supervisor;

use crate::*;

/// One peer holding both an outbound and an inbound connection has both
/// counted; closing one leaves the other and triggers no dial.
#[tokio::test]
async fn both_directions_to_one_peer_are_counted() -> Result<()> {
    let supervisor = Supervisor::bind(test_config(&["127.0.0.2"])).await?;
    let remote = TcpListener::bind(("127.0.0.2", supervisor.port())).await?;
    let node = Node::launch(supervisor);

    let (mut outbound, _) = tokio::time::timeout(WAIT, remote.accept()).await??;
    greet_and_echo(&mut outbound).await?;

    let mut inbound = connect_from("127.0.0.2", node.addr).await?;
    greet_and_echo(&mut inbound).await?;

    let status = wait_for(&node.handle, "two connections", |s| {
        s.count(ip("127.0.0.2")) == 2
    })
    .await?;
    assert_eq!(status.established_active, 1);
    assert_eq!(status.established_passive, 1);
    assert!(status.accept_outstanding);

    drop(inbound);
    let status = wait_for(&node.handle, "inbound closed", |s| s.sessions_ended == 1).await?;
    assert_eq!(status.count(ip("127.0.0.2")), 1);
    assert_eq!(status.dials_in_flight, 0);

    drop(outbound);
    let (mut again, _) = tokio::time::timeout(WAIT, remote.accept()).await??;
    greet_and_echo(&mut again).await?;

    node.stop().await
}

/// Inbound peers outside the configuration are served and counted, but
/// never dialed back.
#[tokio::test]
async fn unconfigured_inbound_peer_is_never_dialed() -> Result<()> {
    let node = Node::start(test_config(&[])).await?;

    let mut client = connect_from("127.0.0.5", node.addr).await?;
    let greeting = greet_and_echo(&mut client).await?;
    assert!(greeting.ends_with(&node.addr.to_string()), "{greeting}");

    let status = wait_for(&node.handle, "inbound counted", |s| {
        s.count(ip("127.0.0.5")) == 1
    })
    .await?;
    let row = status.peer(ip("127.0.0.5")).expect("peer row");
    assert!(!row.configured);

    drop(client);
    let status = wait_for(&node.handle, "session ended", |s| s.sessions_ended == 1).await?;
    assert_eq!(status.count(ip("127.0.0.5")), 0);
    assert_eq!(status.dials_in_flight, 0);

    node.stop().await
}

/// The single accept is re-armed after every inbound connection.
#[tokio::test]
async fn accept_is_rearmed_after_each_inbound() -> Result<()> {
    let node = Node::start(test_config(&[])).await?;

    let mut clients = Vec::new();
    for src in ["127.0.0.6", "127.0.0.7", "127.0.0.8"] {
        let mut client = connect_from(src, node.addr).await?;
        greet_and_echo(&mut client).await?;
        clients.push(client);
    }

    let status = wait_for(&node.handle, "three inbound", |s| s.established_passive == 3).await?;
    assert_eq!(status.connections, 3);
    assert!(status.accept_outstanding);
    // One accept plus three sessions.
    assert_eq!(status.pending_tasks, 4);

    node.stop().await?;

    // Shutdown closes the sessions.
    for mut client in clients {
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(WAIT, client.read(&mut buf)).await?.unwrap_or(0);
        assert_eq!(n, 0);
    }
    Ok(())
}
