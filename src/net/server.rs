//! TCP transport for the authoritative server.
//!
//! One reader task per connection funnels decoded commands into a single
//! inbound channel, in arrival order per connection. A single writer task
//! owns every write half; the simulation queues [`Outgoing`] messages and
//! never touches a socket.

use std::net::SocketAddr;

use hashbrown::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::net::protocol::{ClientCommand, ConnId, Inbound, Outgoing, Recipient};
use crate::net::wire::{self, MessageSplitter};

/// Instructions for the writer task, which exclusively owns the write halves.
enum WriterCmd {
    Attach(ConnId, OwnedWriteHalf),
    Detach(ConnId),
    Deliver(Outgoing),
}

pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.bind_address, config.port)).await?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the process shuts down; connection failures
    /// are logged and never take the server down.
    pub async fn run(
        self,
        inbound: mpsc::UnboundedSender<Inbound>,
        mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    ) {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer_rx));

        let deliver = writer_tx.clone();
        tokio::spawn(async move {
            while let Some(out) = outgoing.recv().await {
                if deliver.send(WriterCmd::Deliver(out)).is_err() {
                    break;
                }
            }
        });

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("set_nodelay failed for {addr}: {e}");
            }
            let conn: ConnId = rand::random();
            info!("connection {conn} from {addr}");

            let (read_half, write_half) = stream.into_split();
            if writer_tx.send(WriterCmd::Attach(conn, write_half)).is_err() {
                return;
            }
            if inbound.send(Inbound::Connected(conn)).is_err() {
                return;
            }
            tokio::spawn(read_loop(
                read_half,
                conn,
                inbound.clone(),
                writer_tx.clone(),
            ));
        }
    }
}

/// Per-connection reader: splits the byte stream into messages and forwards
/// decoded commands. Always ends with a synthetic disconnect event.
async fn read_loop(
    mut reader: OwnedReadHalf,
    conn: ConnId,
    inbound: mpsc::UnboundedSender<Inbound>,
    writer: mpsc::UnboundedSender<WriterCmd>,
) {
    let mut splitter = MessageSplitter::new();
    let mut buf = [0u8; 4096];
    'read: loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                splitter.extend(&buf[..n]);
                if splitter.overflowed() {
                    warn!("connection {conn} exceeded the message size cap");
                    break;
                }
                while let Some(message) = splitter.next_message() {
                    let value = match message {
                        Ok(value) => value,
                        Err(e) => {
                            warn!("connection {conn} sent invalid JSON: {e}");
                            continue;
                        }
                    };
                    match ClientCommand::decode(&value) {
                        Ok(cmd) => {
                            if inbound.send(Inbound::Command(conn, cmd)).is_err() {
                                break 'read;
                            }
                        }
                        Err(e) => warn!("connection {conn} sent a bad command: {e}"),
                    }
                }
            }
            Err(e) => {
                debug!("connection {conn} read error: {e}");
                break;
            }
        }
    }
    let _ = writer.send(WriterCmd::Detach(conn));
    let _ = inbound.send(Inbound::Disconnected(conn));
}

/// The single writer task. Sockets that fail a write are pruned; their
/// reader task surfaces the disconnect.
async fn write_loop(mut rx: mpsc::UnboundedReceiver<WriterCmd>) {
    let mut writers: HashMap<ConnId, OwnedWriteHalf> = HashMap::new();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCmd::Attach(conn, half) => {
                writers.insert(conn, half);
            }
            WriterCmd::Detach(conn) => {
                writers.remove(&conn);
            }
            WriterCmd::Deliver(out) => {
                let bytes = match wire::encode(&out.cmd.encode()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("dropping unencodable message: {e}");
                        continue;
                    }
                };
                match out.to {
                    Recipient::One(conn) => {
                        let failed = match writers.get_mut(&conn) {
                            Some(half) => half.write_all(&bytes).await.is_err(),
                            None => false,
                        };
                        if failed {
                            writers.remove(&conn);
                        }
                    }
                    Recipient::All => {
                        let mut dead = Vec::new();
                        for (conn, half) in writers.iter_mut() {
                            if half.write_all(&bytes).await.is_err() {
                                dead.push(*conn);
                            }
                        }
                        for conn in dead {
                            writers.remove(&conn);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::ServerCommand;
    use crate::util::vec2::Vec2;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    async fn local_server() -> (SocketAddr, mpsc::UnboundedReceiver<Inbound>, mpsc::UnboundedSender<Outgoing>) {
        let config = ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Default::default()
        };
        let server = Server::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(server.run(inbound_tx, outgoing_rx));
        (addr, inbound_rx, outgoing_tx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Inbound>) -> Inbound {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_commands_arrive_in_send_order() {
        let (addr, mut inbound, _outgoing) = local_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert!(matches!(next(&mut inbound).await, Inbound::Connected(_)));

        // One burst: ten commands in a single write must come out in order.
        let mut burst = Vec::new();
        for i in 0..10 {
            let cmd = ClientCommand::ProduceUnit {
                producer: format!("e{i}"),
                unit: "knight".to_string(),
            };
            burst.extend_from_slice(&wire::encode(&cmd.encode()).unwrap());
        }
        client.write_all(&burst).await.unwrap();

        for i in 0..10 {
            match next(&mut inbound).await {
                Inbound::Command(_, ClientCommand::ProduceUnit { producer, .. }) => {
                    assert_eq!(producer, format!("e{i}"));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_synthesized() {
        let (addr, mut inbound, _outgoing) = local_server().await;
        let client = TcpStream::connect(addr).await.unwrap();

        let conn = match next(&mut inbound).await {
            Inbound::Connected(conn) => conn,
            other => panic!("unexpected event: {other:?}"),
        };

        drop(client);

        match next(&mut inbound).await {
            Inbound::Disconnected(gone) => assert_eq!(gone, conn),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_targeted_delivery() {
        let (addr, mut inbound, outgoing) = local_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let conn = match next(&mut inbound).await {
            Inbound::Connected(conn) => conn,
            other => panic!("unexpected event: {other:?}"),
        };

        outgoing
            .send(Outgoing {
                to: Recipient::One(conn),
                cmd: ServerCommand::Popup {
                    text: "hello".to_string(),
                    pos: Vec2::ZERO,
                    color: [255, 255, 255],
                },
            })
            .unwrap();

        let mut splitter = MessageSplitter::new();
        let mut buf = [0u8; 1024];
        let value = loop {
            let n = timeout(Duration::from_secs(5), client.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "server closed the stream");
            splitter.extend(&buf[..n]);
            if let Some(message) = splitter.next_message() {
                break message.unwrap();
            }
        };
        let cmd = ServerCommand::decode(&value).unwrap();
        assert!(matches!(cmd, ServerCommand::Popup { .. }));
    }

    #[tokio::test]
    async fn test_bad_json_does_not_kill_the_connection() {
        let (addr, mut inbound, _outgoing) = local_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(next(&mut inbound).await, Inbound::Connected(_)));

        client.write_all(b"{garbage;").await.unwrap();
        let valid = ClientCommand::Nick {
            name: "ada".to_string(),
        };
        client
            .write_all(&wire::encode(&valid.encode()).unwrap())
            .await
            .unwrap();

        match next(&mut inbound).await {
            Inbound::Command(_, ClientCommand::Nick { name }) => assert_eq!(name, "ada"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
