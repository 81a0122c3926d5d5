// Structured logging field definitions
// This module centralizes all field names used in tracing logs

// Connection & Network fields
pub const ADDR: &str = "addr";
pub const PORT: &str = "port";
pub const PACKET_SIZE: &str = "packet_size";
pub const PACKET_TYPE: &str = "packet_type";

// Client fields
pub const USER_NAME: &str = "user_name";
pub const CLIENT_COUNT: &str = "client_count";
pub const LAG: &str = "lag";

// Frame fields
pub const FRAME: &str = "frame";
pub const CURRENT_FRAME: &str = "current_frame";
pub const INPUT_COUNT: &str = "input_count";
pub const PENDING_INPUTS: &str = "pending_inputs";
pub const DATA_LENGTH: &str = "data_length";

// Operation fields
pub const ERROR: &str = "error";

// Server fields
pub const CONFIG_SOURCE: &str = "config_source";
pub const TICK_INTERVAL_MS: &str = "tick_interval_ms";
pub const FRAME_BUFFER_SIZE: &str = "frame_buffer_size";
