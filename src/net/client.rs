//! Client-side TCP connector: channels in, channels out.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::net::protocol::{ClientCommand, ServerCommand};
use crate::net::wire::{self, MessageSplitter};

/// Connect to a server. Returns a command sender and the authoritative
/// message stream; both close when the connection drops.
pub async fn connect(
    addr: SocketAddr,
) -> std::io::Result<(
    mpsc::UnboundedSender<ClientCommand>,
    mpsc::UnboundedReceiver<ServerCommand>,
)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(write_half, cmd_rx));
    tokio::spawn(read_loop(read_half, msg_tx));
    Ok((cmd_tx, msg_rx))
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
) {
    while let Some(cmd) = commands.recv().await {
        let bytes = match wire::encode(&cmd.encode()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("dropping unencodable command: {e}");
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            debug!("server connection lost: {e}");
            return;
        }
    }
}

async fn read_loop(mut reader: OwnedReadHalf, messages: mpsc::UnboundedSender<ServerCommand>) {
    let mut splitter = MessageSplitter::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                splitter.extend(&buf[..n]);
                while let Some(message) = splitter.next_message() {
                    let value = match message {
                        Ok(value) => value,
                        Err(e) => {
                            warn!("server sent invalid JSON: {e}");
                            continue;
                        }
                    };
                    match ServerCommand::decode(&value) {
                        Ok(cmd) => {
                            if messages.send(cmd).is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("server sent an unknown message: {e}"),
                    }
                }
            }
            Err(e) => {
                debug!("server connection lost: {e}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::net::protocol::{Inbound, Outgoing, Recipient};
    use crate::net::server::Server;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_roundtrip_through_server() {
        let config = ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Default::default()
        };
        let server = Server::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(server.run(inbound_tx, outgoing_rx));

        let (commands, mut messages) = connect(addr).await.unwrap();

        let conn = match timeout(Duration::from_secs(5), inbound_rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            Inbound::Connected(conn) => conn,
            other => panic!("unexpected event: {other:?}"),
        };

        commands
            .send(ClientCommand::Nick {
                name: "ada".to_string(),
            })
            .unwrap();
        match timeout(Duration::from_secs(5), inbound_rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            Inbound::Command(_, ClientCommand::Nick { name }) => assert_eq!(name, "ada"),
            other => panic!("unexpected event: {other:?}"),
        }

        outgoing_tx
            .send(Outgoing {
                to: Recipient::One(conn),
                cmd: ServerCommand::Victory,
            })
            .unwrap();
        let msg = timeout(Duration::from_secs(5), messages.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, ServerCommand::Victory);
    }
}
