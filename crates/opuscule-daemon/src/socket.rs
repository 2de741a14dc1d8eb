use std::sync::Arc;

use opuscule_proto::protocol::{Message, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::broadcaster::{BroadcastEvent, Payload};
use crate::core::DaemonEvent;

/// Frames larger than this close the connection.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub async fn bind(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind TCP socket {}: {}", addr, e))?;
    info!("TCP server listening at {}", listener.local_addr()?);
    Ok(listener)
}

pub fn start_server(
    listener: TcpListener,
    event_tx: mpsc::UnboundedSender<DaemonEvent>,
    broadcast_tx: mpsc::UnboundedSender<BroadcastEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let evt_tx = event_tx.clone();
                    let bcast_tx = broadcast_tx.clone();
                    tokio::spawn(async move {
                        handle_client(stream, id, evt_tx, bcast_tx.clone()).await;
                        let _ = bcast_tx.send(BroadcastEvent::Unregister(id));
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    client_id: usize,
    event_tx: mpsc::UnboundedSender<DaemonEvent>,
    broadcast_tx: mpsc::UnboundedSender<BroadcastEvent>,
) {
    let (mut read_half, mut write_half) = stream.into_split();

    // Snapshots and this client's error replies share one ordered writer.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Payload>();
    let writer = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if let Err(e) = write_half.write_all(&payload).await {
                debug!("Client {} write failed: {}", client_id, e);
                break;
            }
        }
    });

    if broadcast_tx
        .send(BroadcastEvent::Register {
            id: client_id,
            tx: out_tx.clone(),
        })
        .is_err()
        || event_tx.send(DaemonEvent::ClientConnected).is_err()
    {
        warn!("Daemon is shutting down, dropping client {}", client_id);
        writer.abort();
        return;
    }

    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    'session: loop {
        match read_half.read(&mut tmp).await {
            Ok(0) => {
                info!("Client {} closed connection", client_id);
                break;
            }
            Ok(n) => {
                read_buf.extend_from_slice(&tmp[..n]);

                if declared_len(&read_buf).is_some_and(|len| len > MAX_FRAME_LEN) {
                    warn!("Client {} sent an oversized frame", client_id);
                    break;
                }

                while let Some(len) = Message::frame_len(&read_buf) {
                    let frame: Vec<u8> = read_buf.drain(..len).collect();
                    let reply = match Message::decode(&frame) {
                        Ok((Message::Request(request), _)) => {
                            debug!("Client {} sent command: {}", client_id, request.command);
                            let (reply_tx, reply_rx) = oneshot::channel();
                            let event = DaemonEvent::Command {
                                client: client_id,
                                request,
                                reply: reply_tx,
                            };
                            if event_tx.send(event).is_err() {
                                warn!("DaemonEvent channel closed");
                                break 'session;
                            }
                            match reply_rx.await {
                                Ok(result) => result.err(),
                                Err(_) => break 'session,
                            }
                        }
                        Ok((Message::Response(_), _)) => {
                            Some("Clients send commands, not responses.".to_string())
                        }
                        Err(e) => {
                            warn!("Client {} sent a malformed frame: {}", client_id, e);
                            Some("Malformed command.".to_string())
                        }
                    };

                    if let Some(text) = reply {
                        match Message::Response(Response::Error { text }).encode() {
                            Ok(encoded) => {
                                let _ = out_tx.send(Arc::new(encoded));
                            }
                            Err(e) => error!("Could not encode error reply: {}", e),
                        }
                    }
                }
            }
            Err(e) => {
                error!("Read error from client {}: {}", client_id, e);
                break;
            }
        }
    }

    writer.abort();
}

fn declared_len(buf: &[u8]) -> Option<usize> {
    let header: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::Broadcaster;
    use crate::controls::Volume;
    use crate::menu::Node;
    use crate::radio::RadioState;
    use opuscule_proto::protocol::{Labels, Request, Snapshot};

    /// Stands in for the core: broadcasts on connect and on every command
    /// except "bad", which is rejected.  `advance` and `retreat` move the
    /// cursor over two lists.
    fn fake_core(
        mut events: mpsc::UnboundedReceiver<DaemonEvent>,
        broadcast_tx: mpsc::UnboundedSender<BroadcastEvent>,
    ) {
        tokio::spawn(async move {
            let mut radio = RadioState::new(10, Volume::new(50, 5));
            let root = radio.menu.root();
            for name in ["Jazz", "Rock"] {
                radio
                    .menu
                    .add_child(root, Node::submenu(Labels::new(name, "", ""), "test"));
            }
            while let Some(event) = events.recv().await {
                match event {
                    DaemonEvent::ClientConnected => {}
                    DaemonEvent::Command { request, reply, .. } => {
                        if request.command == "bad" {
                            let _ = reply.send(Err("Unknown command 'bad'.".to_string()));
                            continue;
                        }
                        match request.command.as_str() {
                            "advance" => {
                                radio.menu.advance();
                            }
                            "retreat" => {
                                radio.menu.retreat();
                            }
                            _ => {}
                        }
                        let _ = reply.send(Ok(()));
                    }
                    _ => continue,
                }
                let _ = broadcast_tx.send(BroadcastEvent::Snapshot(Box::new(radio.snapshot())));
            }
        });
    }

    async fn read_message(stream: &mut TcpStream) -> Message {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_be_bytes(header) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        let mut frame = header.to_vec();
        frame.extend_from_slice(&body);
        Message::decode(&frame).unwrap().0
    }

    async fn send(stream: &mut TcpStream, command: &str) {
        let frame = Message::Request(Request::new(command)).encode().unwrap();
        stream.write_all(&frame).await.unwrap();
    }

    fn is_snapshot(message: &Message) -> bool {
        matches!(message, Message::Response(Response::Snapshot(_)))
    }

    async fn read_snapshot(stream: &mut TcpStream) -> Snapshot {
        match read_message(stream).await {
            Message::Response(Response::Snapshot(snapshot)) => snapshot,
            other => panic!("expected a snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fan_out_with_failure_isolation() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (broadcaster, broadcast_tx) = Broadcaster::new();
        tokio::spawn(broadcaster.run());
        fake_core(event_rx, broadcast_tx.clone());

        let listener = bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        start_server(listener, event_tx, broadcast_tx);

        let mut a = TcpStream::connect(addr).await.unwrap();
        assert!(is_snapshot(&read_message(&mut a).await));

        let mut c = TcpStream::connect(addr).await.unwrap();
        assert!(is_snapshot(&read_message(&mut c).await));
        assert!(is_snapshot(&read_message(&mut a).await));

        let mut b = TcpStream::connect(addr).await.unwrap();
        for client in [&mut a, &mut c, &mut b] {
            assert!(is_snapshot(&read_message(client).await));
        }
        drop(b);

        // the rejection reaches only the sender
        send(&mut a, "bad").await;
        assert_eq!(
            read_message(&mut a).await,
            Message::Response(Response::Error {
                text: "Unknown command 'bad'.".to_string()
            })
        );

        // both survivors get the same snapshots in the same order
        send(&mut a, "advance").await;
        send(&mut a, "retreat").await;
        let first = read_snapshot(&mut a).await;
        assert_eq!(first.menu.index, 1);
        assert_eq!(read_snapshot(&mut c).await, first);
        let second = read_snapshot(&mut a).await;
        assert_eq!(second.menu.index, 0);
        assert_eq!(read_snapshot(&mut c).await, second);
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (broadcaster, broadcast_tx) = Broadcaster::new();
        tokio::spawn(broadcaster.run());
        fake_core(event_rx, broadcast_tx.clone());

        let listener = bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        start_server(listener, event_tx, broadcast_tx);

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(is_snapshot(&read_message(&mut client).await));

        let body = b"{\"not\": \"a command\"}";
        let mut frame = (body.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(body);
        client.write_all(&frame).await.unwrap();
        assert!(matches!(
            read_message(&mut client).await,
            Message::Response(Response::Error { .. })
        ));
    }
}
