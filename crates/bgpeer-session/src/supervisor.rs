//! Connection supervisor — the event loop.
//!
//! Owns the listening socket and the connection tracker. Dials, the accept,
//! and sessions run as tasks in one `JoinSet`; the loop takes their events
//! one at a time, updates the tracker, and starts whatever it asks for.
//! Waiting is bounded by the heartbeat so control messages and failures
//! are seen promptly.
//!
//! Any fatal error stops scheduling, cancels outstanding tasks via the
//! shutdown broadcast, aborts stragglers after the grace period, and is
//! returned from `run`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Interval};

use bgpeer_core::{ConnectionTracker, Followup, Origin, PeerId, SupervisorConfig};

use crate::error::SupervisorError;
use crate::event::{Event, SessionOutcome};
use crate::status::{Counters, StatusSnapshot};
use crate::{acceptor, dialer, listener, worker};

/// `None` means the task saw the shutdown signal and gave up.
type TaskOutput = Option<Result<Event, SupervisorError>>;

/// Requests into a running supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    AddPeer(PeerId),
    RemovePeer(PeerId),
    Shutdown,
}

/// Cloneable access to a supervisor from other tasks.
#[derive(Clone)]
pub struct SupervisorHandle {
    control: mpsc::UnboundedSender<Control>,
    status: watch::Receiver<StatusSnapshot>,
}

impl SupervisorHandle {
    /// Returns false if the supervisor has already exited.
    pub fn add_peer(&self, peer: PeerId) -> bool {
        self.control.send(Control::AddPeer(peer)).is_ok()
    }

    pub fn remove_peer(&self, peer: PeerId) -> bool {
        self.control.send(Control::RemovePeer(peer)).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.control.send(Control::Shutdown).is_ok()
    }

    /// Latest published snapshot.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    port: u16,
    tracker: ConnectionTracker,
    tasks: JoinSet<TaskOutput>,
    counters: Counters,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    shutdown_tx: broadcast::Sender<()>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl Supervisor {
    /// Bind the listening socket. Nothing is dialed until `run`.
    ///
    /// With `config.port == 0` the OS picks the port, and that port is
    /// then used as the well-known port for dials as well.
    pub async fn bind(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let addr = SocketAddr::new(config.listen_addr, config.port);
        let listener = listener::bind(addr, config.bind_attempts, config.bind_retry).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| SupervisorError::Bind { addr, source })?;
        tracing::info!(%local_addr, peers = config.peers.len(), "awaiting connections");

        let tracker = ConnectionTracker::new(config.peers.iter().copied());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let (status_tx, _) = watch::channel(StatusSnapshot::default());

        let supervisor = Self {
            config,
            listener: Arc::new(listener),
            local_addr,
            port: local_addr.port(),
            tracker,
            tasks: JoinSet::new(),
            counters: Counters::default(),
            control_tx,
            control_rx,
            shutdown_tx,
            status_tx,
        };
        supervisor.publish();
        Ok(supervisor)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The well-known port in use.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            control: self.control_tx.clone(),
            status: self.status_tx.subscribe(),
        }
    }

    /// Run until shutdown (`Ok`) or a fatal error (`Err`).
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let work = self.tracker.start();
        self.schedule(work);
        self.publish();

        let mut snapshot = (!self.config.snapshot_interval.is_zero())
            .then(|| time::interval(self.config.snapshot_interval));

        let result = loop {
            let step = tokio::select! {
                control = self.control_rx.recv() => match control {
                    Some(Control::Shutdown) | None => {
                        tracing::info!("shutdown requested");
                        break Ok(());
                    }
                    Some(control) => {
                        self.apply(control);
                        Ok(())
                    }
                },

                joined = time::timeout(self.config.heartbeat, self.tasks.join_next()) => {
                    match joined {
                        Err(_) => {
                            tracing::trace!(tasks = self.tasks.len(), "heartbeat");
                            Ok(())
                        }
                        // The accept is always outstanding, so this only
                        // happens if something else already went wrong.
                        Ok(None) => {
                            time::sleep(self.config.heartbeat).await;
                            Ok(())
                        }
                        Ok(Some(Err(e))) => Err(SupervisorError::TaskFailed(e)),
                        Ok(Some(Ok(None))) => Ok(()),
                        Ok(Some(Ok(Some(Err(e))))) => Err(e),
                        Ok(Some(Ok(Some(Ok(event))))) => self.dispatch(event),
                    }
                }

                _ = tick(&mut snapshot) => {
                    self.log_snapshot();
                    Ok(())
                }
            };

            if let Err(e) = step {
                tracing::error!(error = %e, "fatal error, stopping");
                break Err(e);
            }
            self.publish();
        };

        self.stop().await;
        result
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SupervisorError> {
        match event {
            Event::NewActiveConnection(conn) | Event::NewPassiveConnection(conn) => {
                conn.verify(self.port)?;
                let peer = conn.peer();
                let origin = conn.origin();
                let work = self.tracker.on_established(peer, origin)?;
                match origin {
                    Origin::Active => self.counters.established_active += 1,
                    Origin::Passive => self.counters.established_passive += 1,
                }
                tracing::info!(
                    %peer,
                    origin = origin.as_str(),
                    local = %conn.local_addr(),
                    remote = %conn.remote_addr(),
                    configured = self.tracker.is_configured(&peer),
                    connections = self.tracker.count(&peer),
                    "connected"
                );
                self.schedule(work);
                self.spawn(async move { Ok(worker::run(conn).await) });
            }

            Event::DialTimedOut { peer, reason } => {
                self.counters.dial_failures += 1;
                let work = self.tracker.on_dial_timed_out(peer)?;
                if work.is_empty() {
                    tracing::debug!(%peer, %reason, "dial failed, no retry needed");
                } else {
                    tracing::debug!(%peer, %reason, "reattempting connection");
                }
                self.schedule(work);
            }

            Event::SessionEnded {
                connection,
                outcome,
            } => {
                let peer = connection.peer();
                self.counters.sessions_ended += 1;
                let work = self.tracker.on_session_ended(peer)?;
                match &outcome {
                    SessionOutcome::Closed => {
                        tracing::info!(%peer, redial = !work.is_empty(), "session closed by peer")
                    }
                    SessionOutcome::Failed(e) => {
                        tracing::warn!(%peer, error = %e, redial = !work.is_empty(), "session failed")
                    }
                }
                connection.close();
                self.schedule(work);
            }
        }
        Ok(())
    }

    fn apply(&mut self, control: Control) {
        match control {
            Control::AddPeer(peer) => {
                let dial = self.tracker.add_peer(peer);
                tracing::info!(%peer, dialing = dial.is_some(), "peer added");
                self.schedule(dial.into_iter().collect());
            }
            Control::RemovePeer(peer) => {
                if self.tracker.remove_peer(&peer) {
                    tracing::info!(%peer, "peer removed");
                } else {
                    tracing::debug!(%peer, "remove for unknown peer ignored");
                }
            }
            Control::Shutdown => {}
        }
    }

    fn schedule(&mut self, work: Vec<Followup>) {
        for followup in work {
            match followup {
                Followup::Accept => {
                    let listener = self.listener.clone();
                    let port = self.port;
                    self.spawn(acceptor::accept_one(listener, port));
                }
                Followup::Dial(peer) => {
                    let port = self.port;
                    let timeout = self.config.dial_timeout;
                    let retry = self.config.connect_retry;
                    self.spawn(dialer::dial(peer, port, timeout, retry));
                }
            }
        }
    }

    /// Every task races its work against the shutdown broadcast.
    fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = Result<Event, SupervisorError>> + Send + 'static,
    {
        let mut shutdown = self.shutdown_tx.subscribe();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = shutdown.recv() => None,
                result = work => Some(result),
            }
        });
    }

    async fn stop(&mut self) {
        self.tracker.stop();
        let _ = self.shutdown_tx.send(());

        let tasks = &mut self.tasks;
        let drained = time::timeout(self.config.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = self.tasks.len(), "aborting tasks that ignored shutdown");
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        self.publish();
        tracing::info!(connections = self.tracker.registry().total(), "supervisor stopped");
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot::capture(&self.tracker, self.counters, self.local_addr, self.tasks.len())
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    fn log_snapshot(&self) {
        tracing::info!(
            connections = self.tracker.registry().total(),
            dials = self.tracker.dials_in_flight(),
            tasks = self.tasks.len(),
            "registry snapshot"
        );
        for (peer, count) in self.tracker.registry().iter() {
            tracing::info!(%peer, count, configured = self.tracker.is_configured(&peer), "  peer");
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}
