// UDP transport: one socket shared by a reader task and a writer task.
// Protocol logic only ever sees bounded mpsc queues of `Message`s.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::fields;

/// Pause after a failed receive so a socket stuck in an error state does not spin.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// A datagram paired with its peer: the source for inbound, the destination for outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub addr: SocketAddr,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(addr: SocketAddr, body: Vec<u8>) -> Self {
        Self { addr, body }
    }
}

pub struct UdpTransport {
    pub local_addr: SocketAddr,
    pub inbound: mpsc::Receiver<Message>,
    pub outbound: mpsc::Sender<Message>,
}

impl UdpTransport {
    /// Binds `addr` and starts the reader and writer tasks.
    pub async fn bind(addr: impl ToSocketAddrs, config: &TransportConfig) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;

        let inbound = spawn_reader(socket.clone(), config.recv_buffer_size, config.channel_depth);
        let outbound = spawn_writer(socket, config.channel_depth);

        info!({ fields::ADDR } = %local_addr, "UDP transport bound");

        Ok(Self {
            local_addr,
            inbound,
            outbound,
        })
    }
}

/// Receives datagrams forever and publishes each one as a fresh `Message`.
/// A failed receive is logged and retried after a short pause; the task ends once
/// the receiver is dropped.
pub fn spawn_reader(
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    depth: usize,
) -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel::<Message>(depth);
    tokio::spawn(async move {
        let mut buf = vec![0u8; buffer_size];
        loop {
            let (len, src) = match socket.recv_from(&mut buf).await {
                Ok(ok) => ok,
                Err(e) => {
                    debug!(
                        { fields::ERROR } = %e,
                        "recv_from failed, continuing"
                    );
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    continue;
                }
            };

            debug!(
                { fields::ADDR } = %src,
                { fields::PACKET_SIZE } = len,
                "Datagram received"
            );

            if tx.send(Message::new(src, buf[..len].to_vec())).await.is_err() {
                debug!("Inbound queue closed, reader exiting");
                break;
            }
        }
    });
    rx
}

/// Sends every queued `Message` to its address. A failed send is logged and skipped.
pub fn spawn_writer(socket: Arc<UdpSocket>, depth: usize) -> mpsc::Sender<Message> {
    let (tx, mut rx) = mpsc::channel::<Message>(depth);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = socket.send_to(&message.body, message.addr).await {
                warn!(
                    { fields::ADDR } = %message.addr,
                    { fields::ERROR } = %e,
                    "Failed to send datagram"
                );
            }
        }
        debug!("Outbound queue closed, writer exiting");
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_loopback_delivery() {
        let config = TransportConfig::default();
        let mut a = UdpTransport::bind("127.0.0.1:0", &config).await.unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0", &config).await.unwrap();

        a.outbound
            .send(Message::new(b.local_addr, vec![4, 1, 2, 3]))
            .await
            .unwrap();
        let received = timeout(Duration::from_secs(2), b.inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.addr, a.local_addr);
        assert_eq!(received.body, vec![4, 1, 2, 3]);

        b.outbound
            .send(Message::new(a.local_addr, vec![5]))
            .await
            .unwrap();
        let received = timeout(Duration::from_secs(2), a.inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.body, vec![5]);
    }

    #[tokio::test]
    async fn test_each_datagram_gets_its_own_buffer() {
        let config = TransportConfig::default();
        let a = UdpTransport::bind("127.0.0.1:0", &config).await.unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0", &config).await.unwrap();

        a.outbound
            .send(Message::new(b.local_addr, vec![9, 9, 9, 9]))
            .await
            .unwrap();
        a.outbound
            .send(Message::new(b.local_addr, vec![1]))
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(2), b.inbound.recv())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(2), b.inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.body, vec![9, 9, 9, 9]);
        assert_eq!(second.body, vec![1]);
    }
}
