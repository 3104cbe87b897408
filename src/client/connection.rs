use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

pub type ConnectionId = String;

/// Represents a registered live connection.
///
/// Dropping the last `sender` closes the outbound channel, which is how the
/// hub tells the session's write loop to shut down.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier, `conn-<uuid>`.
    pub id: ConnectionId,

    /// Bounded channel feeding the connection's write loop.
    pub sender: mpsc::Sender<WsMessage>,
}

impl Connection {
    /// Creates a connection with a fresh id and an outbound buffer of
    /// `capacity` payloads.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: format!("conn-{}", uuid::Uuid::new_v4()),
            sender,
        };
        (connection, receiver)
    }
}
