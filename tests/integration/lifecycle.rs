use std::time::Duration;

use tokio::net::TcpListener;

use bgpeer_core::PeerId;
use bgpeer_session::{Supervisor, SupervisorError};

use crate::*;

/// After removal, in-flight dial results still arrive but nothing new is
/// scheduled for the peer.
#[tokio::test]
async fn removed_peer_is_not_redialed() -> Result<()> {
    let node = Node::start(test_config(&["127.0.0.2"])).await?;
    wait_for(&node.handle, "first failure", |s| s.dial_failures >= 1).await?;

    node.handle.remove_peer(PeerId::new(ip("127.0.0.2")));
    let status = wait_for(&node.handle, "dial drained", |s| s.dials_in_flight == 0).await?;
    let row = status.peer(ip("127.0.0.2")).map(|p| p.configured);
    assert_ne!(row, Some(true));

    let failures = status.dial_failures;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let status = node.handle.status();
    assert_eq!(status.dial_failures, failures);
    assert_eq!(status.dials_in_flight, 0);

    node.stop().await
}

#[tokio::test]
async fn added_peer_is_dialed() -> Result<()> {
    let supervisor = Supervisor::bind(test_config(&[])).await?;
    let remote = TcpListener::bind(("127.0.0.2", supervisor.port())).await?;
    let node = Node::launch(supervisor);

    assert!(node.handle.add_peer(PeerId::new(ip("127.0.0.2"))));
    let (mut stream, _) = tokio::time::timeout(WAIT, remote.accept()).await??;
    greet_and_echo(&mut stream).await?;

    let status = wait_for(&node.handle, "added peer connected", |s| {
        s.count(ip("127.0.0.2")) == 1
    })
    .await?;
    assert!(status.peer(ip("127.0.0.2")).is_some_and(|p| p.configured));

    node.stop().await
}

#[tokio::test]
async fn shutdown_is_clean_with_work_outstanding() -> Result<()> {
    let node = Node::start(test_config(&["127.0.0.2", "127.0.0.3"])).await?;
    wait_for(&node.handle, "dials running", |s| s.dials_in_flight == 2).await?;
    let handle = node.handle.clone();

    node.stop().await?;

    let status = handle.status();
    assert!(status.stopped);
    assert_eq!(status.pending_tasks, 0);
    assert!(!handle.add_peer(PeerId::new(ip("127.0.0.4"))));
    Ok(())
}

#[tokio::test]
async fn busy_port_fails_bind() -> Result<()> {
    let holder = std::net::TcpListener::bind("127.0.0.1:0")?;
    let mut config = test_config(&["127.0.0.2"]);
    config.port = holder.local_addr()?.port();
    config.bind_attempts = 2;
    config.bind_retry = Duration::from_millis(20);

    match Supervisor::bind(config).await {
        Err(SupervisorError::Bind { source, .. }) => {
            assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
            Ok(())
        }
        Err(other) => bail!("expected bind error, got {other}"),
        Ok(_) => bail!("bind should fail while the port is held"),
    }
}
