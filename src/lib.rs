// Lockstep frame synchronization over UDP.
//
// A server advances a shared simulation on a fixed tick, buffering client
// inputs per frame, and broadcasts one delta per frame that clients apply
// to their local mirror.

pub mod client;
pub mod config;
pub mod demo;
pub mod fields;
pub mod frame_buffer;
pub mod logger;
pub mod packet;
pub mod roster;
pub mod server;
pub mod state;
pub mod transport;
pub mod varint;

pub use client::{ClientError, ClientHandle, GameClient};
pub use server::{GameServer, ServerError};
pub use state::SimulationState;
pub use transport::{Message, UdpTransport};
