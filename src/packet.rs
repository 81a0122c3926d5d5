// Wire format: [1-byte packet type][body]
//
// Bodies:
// - Join:        raw UTF-8 username, no length prefix
// - JoinAck:     uvarint frame + raw state snapshot
// - Input:       uvarint frame + raw input
// - FrameUpdate: uvarint frame + raw delta (frame the delta advances the world to)
// - FrameAck:    uvarint frame
// - StateRequest: empty

use bytes::BufMut;
use thiserror::Error;

use crate::varint::{get_uvarint, put_uvarint, uvarint_len};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("malformed body: {0}")]
    MalformedBody(&'static str),
}

/// Closed set of packet types. Adding one is a protocol version change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Input = 0,
    StateRequest = 1,
    FrameUpdate = 2,
    FrameAck = 3,
    Join = 4,
    JoinAck = 5,
}

impl PacketType {
    pub const COUNT: u8 = 6;

    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Input => "input",
            PacketType::StateRequest => "state_request",
            PacketType::FrameUpdate => "frame_update",
            PacketType::FrameAck => "frame_ack",
            PacketType::Join => "join",
            PacketType::JoinAck => "join_ack",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketType::Input),
            1 => Ok(PacketType::StateRequest),
            2 => Ok(PacketType::FrameUpdate),
            3 => Ok(PacketType::FrameAck),
            4 => Ok(PacketType::Join),
            5 => Ok(PacketType::JoinAck),
            _ => Err(CodecError::MalformedPacket("unknown packet type")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, body: Vec<u8>) -> Self {
        Self { packet_type, body }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(1 + self.body.len());
        data.put_u8(self.packet_type as u8);
        data.put_slice(&self.body);
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let (&type_byte, body) = data
            .split_first()
            .ok_or(CodecError::MalformedPacket("empty datagram"))?;
        Ok(Self {
            packet_type: PacketType::try_from(type_byte)?,
            body: body.to_vec(),
        })
    }
}

/// Bodies that travel inside a [`Packet`] of a fixed type.
pub trait Body: Sized {
    const PACKET_TYPE: PacketType;

    fn encode(&self) -> Vec<u8>;

    fn decode(body: &[u8]) -> Result<Self, CodecError>;

    /// Wraps the body in its envelope and encodes both.
    fn to_datagram(&self) -> Vec<u8> {
        Packet::new(Self::PACKET_TYPE, self.encode()).encode()
    }
}

fn encode_framed(frame: u64, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(uvarint_len(frame) + payload.len());
    put_uvarint(&mut data, frame);
    data.put_slice(payload);
    data
}

fn decode_framed(body: &[u8]) -> Result<(u64, Vec<u8>), CodecError> {
    let (frame, consumed) =
        get_uvarint(body).ok_or(CodecError::MalformedBody("invalid frame varint"))?;
    Ok((frame, body[consumed..].to_vec()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinBody {
    pub username: String,
}

impl Body for JoinBody {
    const PACKET_TYPE: PacketType = PacketType::Join;

    fn encode(&self) -> Vec<u8> {
        self.username.as_bytes().to_vec()
    }

    fn decode(body: &[u8]) -> Result<Self, CodecError> {
        let username = std::str::from_utf8(body)
            .map_err(|_| CodecError::MalformedBody("username is not valid UTF-8"))?;
        Ok(Self {
            username: username.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAckBody {
    pub frame: u64,
    pub state: Vec<u8>,
}

impl Body for JoinAckBody {
    const PACKET_TYPE: PacketType = PacketType::JoinAck;

    fn encode(&self) -> Vec<u8> {
        encode_framed(self.frame, &self.state)
    }

    fn decode(body: &[u8]) -> Result<Self, CodecError> {
        let (frame, state) = decode_framed(body)?;
        Ok(Self { frame, state })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBody {
    pub frame: u64,
    pub input: Vec<u8>,
}

impl Body for InputBody {
    const PACKET_TYPE: PacketType = PacketType::Input;

    fn encode(&self) -> Vec<u8> {
        encode_framed(self.frame, &self.input)
    }

    fn decode(body: &[u8]) -> Result<Self, CodecError> {
        let (frame, input) = decode_framed(body)?;
        Ok(Self { frame, input })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameUpdateBody {
    pub frame: u64,
    pub delta: Vec<u8>,
}

impl Body for FrameUpdateBody {
    const PACKET_TYPE: PacketType = PacketType::FrameUpdate;

    fn encode(&self) -> Vec<u8> {
        encode_framed(self.frame, &self.delta)
    }

    fn decode(body: &[u8]) -> Result<Self, CodecError> {
        let (frame, delta) = decode_framed(body)?;
        Ok(Self { frame, delta })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAckBody {
    pub frame: u64,
}

impl Body for FrameAckBody {
    const PACKET_TYPE: PacketType = PacketType::FrameAck;

    fn encode(&self) -> Vec<u8> {
        encode_framed(self.frame, &[])
    }

    fn decode(body: &[u8]) -> Result<Self, CodecError> {
        let (frame, _) = decode_framed(body)?;
        Ok(Self { frame })
    }
}
