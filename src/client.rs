// Lockstep client: mirrors the server state by applying broadcast deltas.
//
// `GameClient` owns the frame counter and the state mirror. Once spawned it
// is driven by one task that interleaves inbound datagrams with commands
// from any number of `ClientHandle`s.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fields;
use crate::packet::{
    Body, CodecError, FrameAckBody, FrameUpdateBody, InputBody, JoinAckBody, JoinBody, Packet,
    PacketType,
};
use crate::state::{Input, SimulationState, StateError};
use crate::transport::Message;

const COMMAND_QUEUE_DEPTH: usize = 32;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("not joined yet")]
    NotJoined,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("outbound queue closed")]
    OutboundClosed,

    #[error("inbound queue closed")]
    InboundClosed,

    #[error("client task stopped")]
    Stopped,
}

impl ClientError {
    /// Whether the error concerns a single datagram and can be dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClientError::Codec(_) | ClientError::State(_))
    }
}

/// What a handled datagram did to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Joined { frame: u64 },
    FrameApplied { frame: u64 },
    Ignored,
}

/// Point-in-time view of the client, as returned by [`ClientHandle::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub joined: bool,
    pub frame: u64,
    pub state: Vec<u8>,
}

pub enum ClientCommand {
    Join {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Input {
        input: Input,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Snapshot {
        reply: oneshot::Sender<ClientSnapshot>,
    },
}

pub struct GameClient<S> {
    username: String,
    server_addr: SocketAddr,
    current_frame: u64,
    state: S,
    joined: bool,
    outbound: mpsc::Sender<Message>,
}

impl<S: SimulationState> GameClient<S> {
    pub fn new(
        username: impl Into<String>,
        server_addr: SocketAddr,
        state: S,
        outbound: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            username: username.into(),
            server_addr,
            current_frame: 0,
            state,
            joined: false,
            outbound,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            joined: self.joined,
            frame: self.current_frame,
            state: self.state.serialize(),
        }
    }

    /// Asks the server to admit us. We stay unjoined until the `JoinAck` arrives.
    pub async fn join(&self) -> Result<(), ClientError> {
        let join = JoinBody {
            username: self.username.clone(),
        };
        self.send(join.to_datagram()).await
    }

    /// Sends `input` tagged with the last frame we know of.
    pub async fn input(&self, input: Input) -> Result<(), ClientError> {
        if !self.joined {
            return Err(ClientError::NotJoined);
        }
        let body = InputBody {
            frame: self.current_frame,
            input,
        };
        self.send(body.to_datagram()).await
    }

    /// Decodes one datagram from the server and applies it.
    pub async fn handle_datagram(&mut self, data: &[u8]) -> Result<ClientEvent, ClientError> {
        let packet = Packet::decode(data)?;
        match packet.packet_type {
            PacketType::JoinAck => {
                let ack = JoinAckBody::decode(&packet.body)?;
                self.state.deserialize(&ack.state)?;
                self.current_frame = ack.frame;
                self.joined = true;
                info!(
                    { fields::USER_NAME } = %self.username,
                    { fields::FRAME } = ack.frame,
                    "Join acknowledged"
                );
                Ok(ClientEvent::Joined { frame: ack.frame })
            }
            PacketType::FrameUpdate => {
                if !self.joined {
                    return Ok(ClientEvent::Ignored);
                }
                let update = FrameUpdateBody::decode(&packet.body)?;
                self.state.apply_delta(&update.delta)?;
                self.current_frame = update.frame;
                debug!({ fields::FRAME } = update.frame, "Frame applied");

                let ack = FrameAckBody {
                    frame: update.frame,
                };
                self.send(ack.to_datagram()).await?;
                Ok(ClientEvent::FrameApplied {
                    frame: update.frame,
                })
            }
            other => {
                debug!(
                    { fields::PACKET_TYPE } = other.as_str(),
                    "Ignoring client-bound packet type"
                );
                Ok(ClientEvent::Ignored)
            }
        }
    }

    async fn send(&self, body: Vec<u8>) -> Result<(), ClientError> {
        self.outbound
            .send(Message::new(self.server_addr, body))
            .await
            .map_err(|_| ClientError::OutboundClosed)
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        // A dropped reply receiver just means the caller stopped waiting.
        match command {
            ClientCommand::Join { reply } => {
                let _ = reply.send(self.join().await);
            }
            ClientCommand::Input { input, reply } => {
                let _ = reply.send(self.input(input).await);
            }
            ClientCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Runs the receive loop until the inbound queue or outbound queue closes.
    /// Datagrams that fail to decode or apply are logged and dropped.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Message>,
        mut commands: mpsc::Receiver<ClientCommand>,
    ) -> Result<(), ClientError> {
        let mut commands_open = true;
        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else {
                        return Err(ClientError::InboundClosed);
                    };
                    if message.addr != self.server_addr {
                        debug!({ fields::ADDR } = %message.addr, "Ignoring datagram from unknown peer");
                        continue;
                    }
                    match self.handle_datagram(&message.body).await {
                        Ok(_) => {}
                        Err(e) if e.is_recoverable() => {
                            warn!(
                                { fields::ADDR } = %message.addr,
                                { fields::FRAME } = self.current_frame,
                                { fields::ERROR } = %e,
                                "Dropping packet"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => commands_open = false,
                    }
                }
            }
        }
    }

    /// Moves the client onto its own task and returns a handle for driving it.
    pub fn spawn(
        self,
        inbound: mpsc::Receiver<Message>,
    ) -> (ClientHandle, JoinHandle<Result<(), ClientError>>)
    where
        S: 'static,
    {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let task = tokio::spawn(self.run(inbound, rx));
        (ClientHandle { commands: tx }, task)
    }
}

/// Cloneable handle to a spawned [`GameClient`].
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    pub async fn join(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Join { reply }).await?;
        rx.await.map_err(|_| ClientError::Stopped)?
    }

    /// Fails with [`ClientError::NotJoined`] until the server has acknowledged our join.
    pub async fn input(&self, input: Input) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Input { input, reply }).await?;
        rx.await.map_err(|_| ClientError::Stopped)?
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(ClientCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    async fn request(&self, command: ClientCommand) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Stopped)
    }
}

/// Notices when the frame stops advancing, e.g. after the server evicted us.
/// The client still believes it is joined in that case, so only silence tells.
#[derive(Debug, Clone, Copy)]
pub struct ProgressWatch {
    frame: u64,
    since: Instant,
    timeout: Duration,
}

impl ProgressWatch {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            frame: 0,
            since: now,
            timeout,
        }
    }

    /// Records the latest frame. Returns true once it has been stuck for
    /// `timeout`, then starts a fresh wait so a retry fires at most once per timeout.
    pub fn observe(&mut self, frame: u64, now: Instant) -> bool {
        if frame != self.frame {
            self.frame = frame;
            self.since = now;
            return false;
        }
        if now.saturating_duration_since(self.since) >= self.timeout {
            self.since = now;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{CounterDelta, CounterState};
    use std::time::Duration;
    use tokio::time::timeout;

    fn server_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 7788))
    }

    fn client() -> (GameClient<CounterState>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let client = GameClient::new("alice", server_addr(), CounterState::default(), tx);
        (client, rx)
    }

    fn join_ack(frame: u64, counter: i64) -> Vec<u8> {
        JoinAckBody {
            frame,
            state: CounterState::new(counter).serialize(),
        }
        .to_datagram()
    }

    fn frame_update(frame: u64, diff: i64) -> Vec<u8> {
        FrameUpdateBody {
            frame,
            delta: CounterDelta::new(diff).encode(),
        }
        .to_datagram()
    }

    #[tokio::test]
    async fn test_input_before_join_is_rejected() {
        let (client, mut rx) = client();
        assert!(matches!(
            client.input(CounterDelta::new(1).encode()).await,
            Err(ClientError::NotJoined)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_sends_username() {
        let (client, mut rx) = client();
        client.join().await.unwrap();
        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.addr, server_addr());
        let packet = Packet::decode(&sent.body).unwrap();
        assert_eq!(packet.packet_type, PacketType::Join);
        assert_eq!(JoinBody::decode(&packet.body).unwrap().username, "alice");
        assert!(!client.is_joined());
    }

    #[tokio::test]
    async fn test_join_ack_adopts_snapshot_and_frame() {
        let (mut client, _rx) = client();
        let event = client.handle_datagram(&join_ack(42, 17)).await.unwrap();
        assert_eq!(event, ClientEvent::Joined { frame: 42 });
        assert!(client.is_joined());
        assert_eq!(client.current_frame(), 42);
        assert_eq!(client.state().counter(), 17);
    }

    #[tokio::test]
    async fn test_frame_update_ignored_until_joined() {
        let (mut client, mut rx) = client();
        let event = client.handle_datagram(&frame_update(1, 5)).await.unwrap();
        assert_eq!(event, ClientEvent::Ignored);
        assert_eq!(client.state().counter(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_frame_update_applies_and_acks() {
        let (mut client, mut rx) = client();
        client.handle_datagram(&join_ack(3, 10)).await.unwrap();
        let event = client.handle_datagram(&frame_update(4, -4)).await.unwrap();
        assert_eq!(event, ClientEvent::FrameApplied { frame: 4 });
        assert_eq!(client.current_frame(), 4);
        assert_eq!(client.state().counter(), 6);

        let ack = Packet::decode(&rx.try_recv().unwrap().body).unwrap();
        assert_eq!(ack.packet_type, PacketType::FrameAck);
        assert_eq!(FrameAckBody::decode(&ack.body).unwrap().frame, 4);

        client.input(CounterDelta::new(1).encode()).await.unwrap();
        let input = Packet::decode(&rx.try_recv().unwrap().body).unwrap();
        assert_eq!(InputBody::decode(&input.body).unwrap().frame, 4);
    }

    #[tokio::test]
    async fn test_bad_datagrams_are_recoverable() {
        let (mut client, _rx) = client();
        let err = client.handle_datagram(&[42]).await.unwrap_err();
        assert!(err.is_recoverable());

        client.handle_datagram(&join_ack(0, 0)).await.unwrap();
        let bad_delta = FrameUpdateBody {
            frame: 1,
            delta: vec![],
        }
        .to_datagram();
        let err = client.handle_datagram(&bad_delta).await.unwrap_err();
        assert!(matches!(err, ClientError::State(StateError::InvalidDelta(_))));
        assert!(err.is_recoverable());
        assert_eq!(client.current_frame(), 0);
    }

    #[tokio::test]
    async fn test_spawned_client_keeps_running_past_bad_datagrams() {
        let (client, mut out) = client();
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (handle, _task) = client.spawn(inbound_rx);

        assert!(matches!(
            handle.input(vec![0x02]).await,
            Err(ClientError::NotJoined)
        ));

        handle.join().await.unwrap();
        let join = out.recv().await.unwrap();
        assert_eq!(
            Packet::decode(&join.body).unwrap().packet_type,
            PacketType::Join
        );

        inbound_tx
            .send(Message::new(server_addr(), vec![]))
            .await
            .unwrap();
        inbound_tx
            .send(Message::new(server_addr(), join_ack(7, 1)))
            .await
            .unwrap();
        inbound_tx
            .send(Message::new(server_addr(), frame_update(8, 2)))
            .await
            .unwrap();

        let ack = timeout(Duration::from_secs(2), out.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            Packet::decode(&ack.body).unwrap().packet_type,
            PacketType::FrameAck
        );

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.joined);
        assert_eq!(snapshot.frame, 8);
        let mut mirror = CounterState::default();
        mirror.deserialize(&snapshot.state).unwrap();
        assert_eq!(mirror.counter(), 3);

        handle.input(CounterDelta::new(1).encode()).await.unwrap();
        let input = out.recv().await.unwrap();
        assert_eq!(
            InputBody::decode(&Packet::decode(&input.body).unwrap().body)
                .unwrap()
                .frame,
            8
        );
    }

    #[tokio::test]
    async fn test_spawned_client_stops_when_inbound_closes() {
        let (client, _out) = client();
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (handle, task) = client.spawn(inbound_rx);
        drop(inbound_tx);

        let result = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ClientError::InboundClosed)));
        assert!(matches!(handle.snapshot().await, Err(ClientError::Stopped)));
    }

    #[test]
    fn test_progress_watch_flags_stalled_frame() {
        let start = Instant::now();
        let timeout = Duration::from_secs(1);
        let mut watch = ProgressWatch::new(timeout, start);

        assert!(!watch.observe(0, start + Duration::from_millis(500)));
        assert!(!watch.observe(1, start + Duration::from_millis(900)));
        assert!(!watch.observe(1, start + Duration::from_millis(1800)));
        assert!(watch.observe(1, start + Duration::from_millis(1900)));
        // Fires again only after another full timeout.
        assert!(!watch.observe(1, start + Duration::from_millis(2500)));
        assert!(watch.observe(1, start + Duration::from_millis(2900)));
        assert!(!watch.observe(2, start + Duration::from_millis(5000)));
    }

}
