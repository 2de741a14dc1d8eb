//! ChangeBroadcaster: one task that fans snapshots out to every client.
//!
//! Snapshots arrive in commit order.  Each one is encoded once and the same
//! bytes are queued on every client's writer.  A client whose writer is
//! gone is dropped on the spot; the others never notice.

use std::sync::Arc;

use opuscule_proto::protocol::{Message, Response, Snapshot};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// An encoded frame, shared between client writers.
pub type Payload = Arc<Vec<u8>>;

pub enum BroadcastEvent {
    Register {
        id: usize,
        tx: mpsc::UnboundedSender<Payload>,
    },
    Unregister(usize),
    Snapshot(Box<Snapshot>),
}

pub struct Broadcaster {
    events: mpsc::UnboundedReceiver<BroadcastEvent>,
    clients: Vec<(usize, mpsc::UnboundedSender<Payload>)>,
}

impl Broadcaster {
    pub fn new() -> (Self, mpsc::UnboundedSender<BroadcastEvent>) {
        let (tx, events) = mpsc::unbounded_channel();
        (
            Self {
                events,
                clients: Vec::new(),
            },
            tx,
        )
    }

    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                BroadcastEvent::Register { id, tx } => {
                    self.clients.push((id, tx));
                    debug!("Broadcaster: client {} registered ({} total)", id, self.clients.len());
                }
                BroadcastEvent::Unregister(id) => {
                    self.clients.retain(|(client, _)| *client != id);
                    debug!("Broadcaster: client {} unregistered", id);
                }
                BroadcastEvent::Snapshot(snapshot) => self.send(*snapshot),
            }
        }
        debug!("Broadcaster stopped");
    }

    fn send(&mut self, snapshot: Snapshot) {
        let payload: Payload = match Message::Response(Response::Snapshot(snapshot)).encode() {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                error!("Broadcaster: could not encode snapshot: {}", e);
                return;
            }
        };
        self.clients.retain(|(id, tx)| {
            let delivered = tx.send(payload.clone()).is_ok();
            if !delivered {
                debug!("Broadcaster: dropping client {}", id);
            }
            delivered
        });
    }
}
