use std::time::Duration;

use tokio::net::TcpListener;

use bgpeer_session::{Supervisor, SupervisorError};

use crate::*;

/// Nothing listens on the peers' well-known port: every dial is refused,
/// retried after the backoff, and nothing is ever counted.
#[tokio::test]
async fn refused_dials_are_retried_without_counting() -> Result<()> {
    let node = Node::start(test_config(&["127.0.0.2", "127.0.0.3"])).await?;

    let status = wait_for(&node.handle, "several failed dials", |s| s.dial_failures >= 4).await?;
    assert_eq!(status.count(ip("127.0.0.2")), 0);
    assert_eq!(status.count(ip("127.0.0.3")), 0);
    assert_eq!(status.connections, 0);
    assert_eq!(status.established_active, 0);
    // One retry per peer, never more.
    assert_eq!(status.dials_in_flight, 2);
    assert!(status.peers.iter().all(|p| p.dialing));

    node.stop().await
}

/// A dialed session that the peer closes is redialed exactly once.
#[tokio::test]
async fn closed_active_session_is_redialed_once() -> Result<()> {
    let supervisor = Supervisor::bind(test_config(&["127.0.0.2"])).await?;
    let remote = TcpListener::bind(("127.0.0.2", supervisor.port())).await?;
    let node = Node::launch(supervisor);

    let (mut first, from) = tokio::time::timeout(WAIT, remote.accept()).await??;
    assert_eq!(from.ip(), ip("127.0.0.1"));
    assert_ne!(from.port(), node.port);
    greet_and_echo(&mut first).await?;

    let status = wait_for(&node.handle, "active connection", |s| {
        s.count(ip("127.0.0.2")) == 1
    })
    .await?;
    assert_eq!(status.established_active, 1);
    assert_eq!(status.dials_in_flight, 0);

    // Peer closes; the supervisor should come back exactly once.
    drop(first);
    let (mut second, _) = tokio::time::timeout(WAIT, remote.accept()).await??;
    greet_and_echo(&mut second).await?;

    let status = wait_for(&node.handle, "redialed connection", |s| {
        s.sessions_ended == 1 && s.established_active == 2
    })
    .await?;
    assert_eq!(status.count(ip("127.0.0.2")), 1);

    let extra = tokio::time::timeout(Duration::from_millis(300), remote.accept()).await;
    assert!(extra.is_err(), "unexpected extra dial");

    node.stop().await
}

/// A peer entry no connect can succeed on is fatal, not retried.
#[tokio::test]
async fn malformed_peer_terminates_supervisor() -> Result<()> {
    let node = Node::start(test_config(&["127.0.0.2", "0.0.0.0"])).await?;
    let handle = node.handle.clone();

    let result = node.finished().await?;
    assert!(
        matches!(result, Err(SupervisorError::FatalAddress { .. })),
        "{result:?}"
    );

    let status = handle.status();
    assert!(status.stopped);
    assert_eq!(status.pending_tasks, 0);
    Ok(())
}
