use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tungstenite::protocol::Message as WsMessage;

use crate::client::{Connection, ConnectionId};
use crate::hub::engine::{self, Broadcast, Hub, HubChannels, Registration};
use crate::utils::{ChatError, Result};

/// Cloneable entry point to the hub's control loop.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register: mpsc::UnboundedSender<Registration>,
    unregister: mpsc::UnboundedSender<ConnectionId>,
    broadcast: mpsc::UnboundedSender<Broadcast>,
    query: mpsc::UnboundedSender<oneshot::Sender<usize>>,
}

/// Starts the control loop for `hub` on the current runtime.
pub fn spawn_hub(hub: Hub) -> (HubHandle, JoinHandle<()>) {
    let (register_tx, register) = mpsc::unbounded_channel();
    let (unregister_tx, unregister) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast) = mpsc::unbounded_channel();
    let (query_tx, query) = mpsc::unbounded_channel();

    let task = tokio::spawn(engine::run(
        hub,
        HubChannels {
            register,
            unregister,
            broadcast,
            query,
        },
    ));

    let handle = HubHandle {
        register: register_tx,
        unregister: unregister_tx,
        broadcast: broadcast_tx,
        query: query_tx,
    };
    (handle, task)
}

impl HubHandle {
    /// Registers `connection`, returning once the hub has applied it.
    pub async fn register(&self, connection: Connection) -> Result<()> {
        let (ack, applied) = oneshot::channel();
        self.register
            .send(Registration { connection, ack })
            .map_err(|_| ChatError::HubClosed)?;
        applied.await.map_err(|_| ChatError::HubClosed)
    }

    /// Safe to call repeatedly; unknown ids are ignored by the hub.
    pub fn unregister(&self, id: &ConnectionId) {
        let _ = self.unregister.send(id.clone());
    }

    pub fn broadcast(&self, payload: WsMessage, origin: Option<ConnectionId>) -> Result<()> {
        self.broadcast
            .send(Broadcast { payload, origin })
            .map_err(|_| ChatError::HubClosed)
    }

    pub async fn connection_count(&self) -> Result<usize> {
        let (reply, count) = oneshot::channel();
        self.query.send(reply).map_err(|_| ChatError::HubClosed)?;
        count.await.map_err(|_| ChatError::HubClosed)
    }
}
