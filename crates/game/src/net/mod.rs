mod codec;
mod mailbox;
mod protocol;
mod publisher;
mod session;

pub use codec::{FrameBuffer, ProtocolError, decode_server, encode};
pub use mailbox::Mailbox;
pub use protocol::{
    ClientMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, EntityState, HANDSHAKE_READ_SIZE,
    HANDSHAKE_STATUS_SUCCESS, READ_CHUNK_SIZE, RETRY_BACKOFF, SNAPSHOT_INTERVAL, ServerMessage,
    StatePatch, normalize_direction, round2,
};
pub use publisher::StatePublisher;
pub use session::{ConnectError, ConnectionState, Session};
