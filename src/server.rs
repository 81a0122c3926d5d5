// Authoritative lockstep server.
//
// All frame-counter, ring-buffer, roster and state mutation happens inside
// `GameServer`, which is driven from a single task: `run` multiplexes the
// tick timer, the eviction sweep and the inbound queue with `select!`.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::fields;
use crate::frame_buffer::{FrameBuffer, FrameError};
use crate::packet::{
    Body, CodecError, FrameAckBody, FrameUpdateBody, InputBody, JoinAckBody, JoinBody, Packet,
    PacketType,
};
use crate::roster::Roster;
use crate::state::{Delta, Input, SimulationState, StateError};
use crate::transport::Message;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("outbound queue closed")]
    OutboundClosed,

    #[error("inbound queue closed")]
    InboundClosed,
}

impl ServerError {
    /// Whether the error concerns a single datagram and can be dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ServerError::Codec(_) | ServerError::Frame(_))
    }
}

pub struct GameServer<S> {
    current_frame: u64,
    state: S,
    frames: FrameBuffer,
    roster: Roster,
    outbound: mpsc::Sender<Message>,
    tick_interval: Duration,
    sweep_interval: Duration,
    client_timeout: Duration,
}

impl<S: SimulationState> GameServer<S> {
    pub fn new(state: S, config: &ServerConfig, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            current_frame: 0,
            state,
            frames: FrameBuffer::new(config.frame_buffer_size),
            roster: Roster::new(),
            outbound,
            tick_interval: config.tick_interval(),
            sweep_interval: config.sweep_interval(),
            client_timeout: config.client_timeout(),
        }
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Inputs buffered so far for `frame`.
    pub fn pending_inputs(&self, frame: u64) -> Result<&[Input], FrameError> {
        self.frames.check_window(self.current_frame, frame)?;
        Ok(self.frames.slot(frame))
    }

    /// Buffers `input` for `frame`. Inputs for the same frame accumulate.
    pub fn handle_input(&mut self, frame: u64, input: Input) -> Result<(), FrameError> {
        self.frames.push(self.current_frame, frame, input)
    }

    /// Delta covering every buffered input from the current frame through `frame`.
    pub fn request_delta_since_frame(&self, frame: u64) -> Result<Delta, ServerError> {
        let inputs = self.frames.collect_through(self.current_frame, frame)?;
        Ok(self.state.generate_delta(frame, &inputs)?)
    }

    /// Advances the world by one frame and broadcasts the resulting delta.
    /// Errors here leave the state inconsistent and are fatal to the server.
    pub async fn step(&mut self) -> Result<(), ServerError> {
        let frame = self.current_frame;
        let inputs = self.frames.slot(frame);
        self.state.apply_inputs(inputs)?;
        let delta = self.state.generate_delta(frame, inputs)?;
        let input_count = inputs.len();
        self.frames.take(frame);
        self.current_frame += 1;

        let datagram = FrameUpdateBody {
            frame: self.current_frame,
            delta,
        }
        .to_datagram();

        trace!(
            { fields::FRAME } = self.current_frame,
            { fields::INPUT_COUNT } = input_count,
            { fields::PENDING_INPUTS } = self.frames.pending(),
            { fields::CLIENT_COUNT } = self.roster.len(),
            "Frame advanced"
        );

        let addrs: Vec<SocketAddr> = self.roster.addresses().collect();
        for addr in addrs {
            self.send(addr, datagram.clone()).await?;
        }
        Ok(())
    }

    /// Decodes and dispatches one inbound datagram.
    pub async fn handle_message(&mut self, message: Message) -> Result<(), ServerError> {
        let Message { addr, body } = message;
        let packet = Packet::decode(&body)?;
        let now = Instant::now();

        debug!(
            { fields::ADDR } = %addr,
            { fields::PACKET_TYPE } = packet.packet_type.as_str(),
            { fields::PACKET_SIZE } = body.len(),
            "Packet received"
        );

        match packet.packet_type {
            PacketType::Join => {
                let join = JoinBody::decode(&packet.body)?;
                self.handle_join(join, addr, now).await?;
            }
            PacketType::Input => {
                let input = InputBody::decode(&packet.body)?;
                self.roster.touch(&addr, now);
                debug!(
                    { fields::ADDR } = %addr,
                    { fields::FRAME } = input.frame,
                    { fields::DATA_LENGTH } = input.input.len(),
                    "Input received"
                );
                self.handle_input(input.frame, input.input)?;
            }
            PacketType::FrameAck => {
                let ack = FrameAckBody::decode(&packet.body)?;
                if !self.roster.acknowledge(&addr, ack.frame, now) {
                    debug!({ fields::ADDR } = %addr, "Frame ack from unknown client");
                }
            }
            PacketType::StateRequest => {
                self.roster.touch(&addr, now);
                debug!({ fields::ADDR } = %addr, "State request received");
            }
            PacketType::FrameUpdate | PacketType::JoinAck => {
                debug!(
                    { fields::ADDR } = %addr,
                    { fields::PACKET_TYPE } = packet.packet_type.as_str(),
                    "Ignoring server-bound packet type"
                );
            }
        }
        Ok(())
    }

    async fn handle_join(
        &mut self,
        join: JoinBody,
        addr: SocketAddr,
        now: Instant,
    ) -> Result<(), ServerError> {
        let replaced = self
            .roster
            .join(&join.username, addr, self.current_frame, now);
        for previous in replaced {
            debug!(
                { fields::USER_NAME } = %previous.username,
                { fields::ADDR } = %previous.address,
                "Replaced roster entry"
            );
        }

        info!(
            { fields::USER_NAME } = %join.username,
            { fields::ADDR } = %addr,
            { fields::FRAME } = self.current_frame,
            { fields::CLIENT_COUNT } = self.roster.len(),
            "Client joined"
        );

        let ack = JoinAckBody {
            frame: self.current_frame,
            state: self.state.serialize(),
        };
        self.send(addr, ack.to_datagram()).await
    }

    /// Drops clients that have been silent longer than the configured timeout.
    pub fn evict_idle_clients(&mut self, now: Instant) -> usize {
        let evicted = self.roster.evict_idle(now, self.client_timeout);
        for client in &evicted {
            info!(
                { fields::USER_NAME } = %client.username,
                { fields::ADDR } = %client.address,
                { fields::LAG } = client.lag(self.current_frame),
                "Client evicted after inactivity"
            );
        }
        evicted.len()
    }

    async fn send(&self, addr: SocketAddr, body: Vec<u8>) -> Result<(), ServerError> {
        self.outbound
            .send(Message::new(addr, body))
            .await
            .map_err(|_| ServerError::OutboundClosed)
    }

    /// Runs until a step fails or a queue closes. Bad datagrams are logged and dropped.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Message>) -> Result<(), ServerError> {
        let mut tick = interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweep = interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            { fields::TICK_INTERVAL_MS } = self.tick_interval.as_millis() as u64,
            { fields::FRAME_BUFFER_SIZE } = self.frames.capacity(),
            "Game server running"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.step().await?;
                }
                _ = sweep.tick() => {
                    self.evict_idle_clients(Instant::now());
                }
                message = inbound.recv() => {
                    let Some(message) = message else {
                        return Err(ServerError::InboundClosed);
                    };
                    let addr = message.addr;
                    match self.handle_message(message).await {
                        Ok(()) => {}
                        Err(e) if e.is_recoverable() => {
                            warn!(
                                { fields::ADDR } = %addr,
                                { fields::CURRENT_FRAME } = self.current_frame,
                                { fields::ERROR } = %e,
                                "Dropping packet"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }
}
