use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{BoxError, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Keeps the authority's 5 second timeout from firing while idle
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after a failed `recv_from` so a broken socket doesn't spin the task
pub const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Channels to and from the authority.
///
/// Packets queued on `outbound` are sent in order. The send task runs until
/// every clone of the sender is gone, so a final `Disconnect` is always
/// flushed.
pub struct Connection {
    pub inbound: mpsc::UnboundedReceiver<Packet>,
    pub outbound: mpsc::UnboundedSender<Packet>,
    pub local_addr: SocketAddr,
    pub server_addr: SocketAddr,
    receive_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

impl Connection {
    /// Stops receiving and waits for queued requests to go out.
    pub async fn close(self) {
        self.receive_task.abort();
        drop(self.outbound);
        if let Err(e) = self.send_task.await {
            error!("Send task failed: {}", e);
        }
    }
}

/// Binds a local socket, sends `Connect` and starts the network tasks.
pub async fn connect(
    server_addr: SocketAddr,
    name: &str,
    host: bool,
) -> Result<Connection, BoxError> {
    let bind_addr = if server_addr.ip().is_loopback() {
        "127.0.0.1:0"
    } else {
        "0.0.0.0:0"
    };
    let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
    let local_addr = socket.local_addr()?;

    info!("Connecting to {} from {}...", server_addr, local_addr);
    let connect = Packet::Connect {
        client_version: PROTOCOL_VERSION,
        name: name.to_string(),
        host,
    };
    socket.send_to(&serialize(&connect)?, server_addr).await?;

    let (inbound_tx, inbound) = mpsc::unbounded_channel();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Packet>();

    let receive_task = {
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, from)) => {
                        if from != server_addr {
                            debug!("Ignoring datagram from {}", from);
                            continue;
                        }

                        match deserialize::<Packet>(&buffer[..len]) {
                            Ok(packet) => {
                                if inbound_tx.send(packet).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Malformed packet from authority: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                    }
                }
            }
        })
    };

    let send_task = {
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                let data = match serialize(&packet) {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to encode {}: {}", packet.kind(), e);
                        continue;
                    }
                };

                if let Err(e) = socket.send_to(&data, server_addr).await {
                    error!("Failed to send {}: {}", packet.kind(), e);
                }
            }
            debug!("Send task finished");
        })
    };

    let heartbeat = outbound.downgrade();
    tokio::spawn(async move {
        let mut ticker = interval(HEARTBEAT_INTERVAL);

        loop {
            ticker.tick().await;
            let Some(outbound) = heartbeat.upgrade() else {
                break;
            };
            if outbound.send(Packet::Heartbeat).is_err() {
                break;
            }
        }
    });

    Ok(Connection {
        inbound,
        outbound,
        local_addr,
        server_addr,
        receive_task,
        send_task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_sends_connect_first() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let connection = tokio_test::assert_ok!(connect(server_addr, "tester", false).await);

        let mut buffer = [0u8; 2048];
        let (len, from) = server.recv_from(&mut buffer).await.unwrap();
        assert_eq!(from, connection.local_addr);
        assert_eq!(
            deserialize::<Packet>(&buffer[..len]).unwrap(),
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: "tester".to_string(),
                host: false,
            }
        );
    }

    #[tokio::test]
    async fn test_inbound_and_outbound_packets() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let mut connection = connect(server_addr, "tester", false).await.unwrap();

        let mut buffer = [0u8; 2048];
        let (_, client_addr) = server.recv_from(&mut buffer).await.unwrap();

        let data = serialize(&Packet::RatingSet { rating: 10 }).unwrap();
        server.send_to(&data, client_addr).await.unwrap();
        assert_eq!(
            connection.inbound.recv().await,
            Some(Packet::RatingSet { rating: 10 })
        );

        connection.outbound.send(Packet::ResyncRating).unwrap();
        loop {
            let (len, _) = server.recv_from(&mut buffer).await.unwrap();
            match deserialize::<Packet>(&buffer[..len]).unwrap() {
                Packet::Heartbeat => continue,
                packet => {
                    assert_eq!(packet, Packet::ResyncRating);
                    break;
                }
            }
        }

        connection.close().await;
    }

    #[test]
    fn test_receive_retry_is_short_backoff() {
        assert!(RECEIVE_RETRY_DELAY > Duration::ZERO);
        assert!(RECEIVE_RETRY_DELAY < HEARTBEAT_INTERVAL);
    }

    #[tokio::test]
    async fn test_receive_survives_foreign_datagrams() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let mut connection = connect(server_addr, "tester", false).await.unwrap();

        let mut buffer = [0u8; 2048];
        let (_, client_addr) = server.recv_from(&mut buffer).await.unwrap();

        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let data = serialize(&Packet::RatingSet { rating: 99 }).unwrap();
        stranger.send_to(&data, client_addr).await.unwrap();
        server.send_to(&[0xff, 0xff], client_addr).await.unwrap();

        let data = serialize(&Packet::RatingSet { rating: 10 }).unwrap();
        server.send_to(&data, client_addr).await.unwrap();
        assert_eq!(
            connection.inbound.recv().await,
            Some(Packet::RatingSet { rating: 10 })
        );

        connection.close().await;
    }
}
