//! Hub engine
//!
//! `Hub` is plain synchronous state: the registration map and the broadcast
//! policy. `run` wraps it in a control loop that applies one command at a
//! time, so the map is never observed half-updated.
//!
//! Broadcast never waits on a connection. Each payload is offered with
//! `try_send`; a connection whose buffer is full (or whose session already
//! went away) is evicted on the spot and the remaining connections still get
//! the payload in the same pass.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::{Connection, ConnectionId};

/// Whether a broadcast skips the connection it originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastPolicy {
    All,
    ExcludeSender,
}

impl BroadcastPolicy {
    pub fn from_exclude_sender(exclude: bool) -> Self {
        if exclude {
            BroadcastPolicy::ExcludeSender
        } else {
            BroadcastPolicy::All
        }
    }
}

#[derive(Debug, Clone)]
pub struct Broadcast {
    pub payload: WsMessage,
    /// Connection the payload was read from, if any.
    pub origin: Option<ConnectionId>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: Vec<ConnectionId>,
}

#[derive(Debug)]
pub struct Hub {
    connections: HashMap<ConnectionId, Connection>,
    policy: BroadcastPolicy,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(BroadcastPolicy::ExcludeSender)
    }
}

impl Hub {
    pub fn new(policy: BroadcastPolicy) -> Self {
        Self {
            connections: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn register(&mut self, connection: Connection) {
        debug!(conn_id = %connection.id, "client registered");
        self.connections.insert(connection.id.clone(), connection);
    }

    /// Removes the connection and drops its sender, closing the outbound
    /// channel. Returns false if it was not registered.
    pub fn unregister(&mut self, id: &ConnectionId) -> bool {
        match self.connections.remove(id) {
            Some(_) => {
                debug!(conn_id = %id, "client unregistered");
                true
            }
            None => false,
        }
    }

    pub fn broadcast(&mut self, broadcast: &Broadcast) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, connection) in &self.connections {
            if self.policy == BroadcastPolicy::ExcludeSender
                && broadcast.origin.as_ref() == Some(id)
            {
                continue;
            }

            match connection.sender.try_send(broadcast.payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %id, "outbound buffer full, evicting slow client");
                    report.evicted.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %id, "outbound channel closed, evicting client");
                    report.evicted.push(id.clone());
                }
            }
        }

        for id in &report.evicted {
            self.connections.remove(id);
        }
        report
    }
}

pub(crate) struct Registration {
    pub connection: Connection,
    pub ack: oneshot::Sender<()>,
}

pub(crate) struct HubChannels {
    pub register: mpsc::UnboundedReceiver<Registration>,
    pub unregister: mpsc::UnboundedReceiver<ConnectionId>,
    pub broadcast: mpsc::UnboundedReceiver<Broadcast>,
    pub query: mpsc::UnboundedReceiver<oneshot::Sender<usize>>,
}

/// Control loop. Ends once every `HubHandle` has been dropped, closing all
/// remaining outbound channels.
pub(crate) async fn run(mut hub: Hub, mut channels: HubChannels) {
    info!(policy = ?hub.policy, "hub started");
    loop {
        tokio::select! {
            Some(registration) = channels.register.recv() => {
                hub.register(registration.connection);
                let _ = registration.ack.send(());
            }
            Some(id) = channels.unregister.recv() => {
                hub.unregister(&id);
            }
            Some(broadcast) = channels.broadcast.recv() => {
                let report = hub.broadcast(&broadcast);
                debug!(delivered = report.delivered, evicted = report.evicted.len(), "broadcast");
            }
            Some(reply) = channels.query.recv() => {
                let _ = reply.send(hub.len());
            }
            else => break,
        }
    }
    info!(remaining = hub.len(), "hub stopped");
}
